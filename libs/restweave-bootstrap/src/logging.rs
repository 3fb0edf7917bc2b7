use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::io::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

/// Keeps the non-blocking console writer alive; dropping it flushes pending lines.
#[must_use = "dropping the guard stops console logging"]
pub struct LogGuard {
    _console: Option<tracing_appender::non_blocking::WorkerGuard>,
}

// ================= level helpers =================

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

/// Returns true if target == crate_name or target starts with "crate_name::"
fn matches_crate_prefix(target: &str, crate_name: &str) -> bool {
    target == crate_name
        || (target.starts_with(crate_name) && target[crate_name.len()..].starts_with("::"))
}

// ================= rotating writer for files =================

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct RotWriter(SharedRotate);

impl RotWriter {
    fn handle(&self) -> RotWriterHandle {
        RotWriterHandle(self.0.clone())
    }
}

#[derive(Clone)]
struct RotWriterHandle(SharedRotate);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

// A writer handle that may be None (drops writes)
struct RoutedWriterHandle(Option<RotWriterHandle>);

impl Write for RoutedWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(w) => w.write(buf),
            None => Ok(buf.len()),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Routes log records to per-subsystem files by target prefix
/// (`restweave::weave`, `restweave_synth::exec`), falling back to the default file.
#[derive(Clone, Default)]
struct MultiFileRouter {
    default: Option<RotWriter>,
    by_prefix: Vec<(String, RotWriter)>,
}

impl MultiFileRouter {
    /// The longest matching prefix wins.
    fn resolve_for(&self, target: &str) -> Option<RotWriterHandle> {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| matches_crate_prefix(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, w)| w)
            .or(self.default.as_ref())
            .map(RotWriter::handle)
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_prefix.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for MultiFileRouter {
    type Writer = RoutedWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriterHandle(self.default.as_ref().map(RotWriter::handle))
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriterHandle(self.resolve_for(meta.target()))
    }
}

// ================= config extraction =================

struct ConfigData<'a> {
    default_section: Option<&'a Section>,
    crate_sections: Vec<(String, &'a Section)>,
}

fn extract_config_data(cfg: &LoggingConfig) -> ConfigData<'_> {
    let mut crate_sections = cfg
        .iter()
        .filter(|(k, _)| k.as_str() != "default")
        .map(|(k, v)| (k.clone(), v))
        .collect::<Vec<_>>();
    crate_sections.sort_by(|a, b| a.0.cmp(&b.0));

    ConfigData {
        default_section: cfg.get("default"),
        crate_sections,
    }
}

// ================= path helpers =================

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer_at_path(
    log_path: &Path,
    max_bytes: usize,
    max_age_days: Option<u32>,
    max_backups: Option<usize>,
) -> std::io::Result<RotWriter> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Prefer MaxFiles if provided, else Age
    let limit = match max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(max_age_days.unwrap_or(1)),
        )),
    };

    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );

    Ok(RotWriter(Arc::new(Mutex::new(rot))))
}

/// Opens the section's file sink, or `None` when it has no file or the file can't be created.
fn open_section_writer(label: &str, section: &Section, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }

    let max_bytes = section.max_size_mb.unwrap_or(100) as usize * 1024 * 1024;
    let log_path = resolve_log_path(section.file.trim(), base_dir);

    match create_rotating_writer_at_path(
        &log_path,
        max_bytes,
        section.max_age_days,
        section.max_backups,
    ) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!(
                "Failed to init log file for '{}': {} ({})",
                label,
                log_path.display(),
                e
            );
            None
        }
    }
}

// ================= public init =================

/// Installs the global subscriber: console layer plus optional rotating JSON files.
/// Relative file paths resolve against `base_dir`. A second call is a no-op.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) -> LogGuard {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let data = extract_config_data(cfg);

    if data.crate_sections.is_empty() && data.default_section.is_none() {
        // INFO to console; honors RUST_LOG
        init_minimal();
        return LogGuard { _console: None };
    }

    let file_router = build_file_router(&data, base_dir);

    let console_targets = build_targets(&data, SinkKind::Console);
    let file_targets = build_targets(
        &data,
        SinkKind::File {
            has_default_file: file_router.default.is_some(),
        },
    );

    install_subscriber(console_targets, file_targets, file_router)
}

// ================= generic targets builder =================

/// Destinations we build `Targets` for; they differ in the level field
/// they read and in when a per-subsystem rule is active.
#[derive(Clone, Copy)]
enum SinkKind {
    Console,
    File { has_default_file: bool },
}

fn build_targets(config: &ConfigData, kind: SinkKind) -> Targets {
    let mut targets = match (kind, config.default_section) {
        (SinkKind::Console, Some(s)) => {
            Targets::new().with_default(level_filter(&s.console_level, LevelFilter::INFO))
        }
        (SinkKind::Console, None) => Targets::new().with_default(LevelFilter::INFO),
        // a default section with no file never writes to disk
        (SinkKind::File { .. }, Some(s)) if s.file.trim().is_empty() => {
            Targets::new().with_default(LevelFilter::OFF)
        }
        (SinkKind::File { has_default_file }, default_section) => {
            let fallback = if has_default_file {
                LevelFilter::INFO
            } else {
                LevelFilter::OFF
            };
            let level = default_section
                .map(|s| level_filter(&s.file_level, fallback))
                .unwrap_or(fallback);
            Targets::new().with_default(level)
        }
    };

    let is_file = matches!(kind, SinkKind::File { .. });
    for (crate_name, section) in &config.crate_sections {
        // file rules only apply where a file path is present
        if is_file && section.file.trim().is_empty() {
            continue;
        }
        let raw = if is_file {
            &section.file_level
        } else {
            &section.console_level
        };
        targets = targets.with_target(crate_name.clone(), level_filter(raw, LevelFilter::INFO));
    }

    targets
}

/// Empty means "not set"; "off"/"none" disable the sink.
fn level_filter(raw: &str, fallback: LevelFilter) -> LevelFilter {
    if raw.trim().is_empty() {
        return fallback;
    }
    parse_tracing_level(raw.trim())
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

// ================= building routers =================

fn build_file_router(config: &ConfigData, base_dir: &Path) -> MultiFileRouter {
    let mut router = MultiFileRouter::default();

    if let Some(section) = config.default_section {
        router.default = open_section_writer("default", section, base_dir);
    }

    for (crate_name, section) in &config.crate_sections {
        if let Some(writer) = open_section_writer(crate_name, section, base_dir) {
            router.by_prefix.push((crate_name.clone(), writer));
        }
    }

    router
}

// ================= registry & layers =================

fn install_subscriber(
    console_targets: Targets,
    file_targets: Targets,
    file_router: MultiFileRouter,
) -> LogGuard {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    // RUST_LOG acts as a global upper-bound for console/file if present.
    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    // Console writer (non-blocking stderr)
    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer_opt = if file_router.is_empty() {
        None
    } else {
        Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(file_router)
                .with_filter(file_targets),
        )
    };

    let _ = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer_opt)
        .try_init();

    LogGuard {
        _console: Some(guard),
    }
}

/// Console-only subscriber at INFO; `RUST_LOG` overrides.
pub fn init_minimal() {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env = EnvFilter::try_from_default_env().ok();
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(LevelFilter::INFO);

    let _ = Registry::default().with(env).with(console_layer).try_init();
}
