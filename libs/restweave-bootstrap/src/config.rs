use anyhow::{Context, Result};
use restweave_synth::WeavingOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment prefix for configuration overrides,
/// e.g. `RESTWEAVE__WEAVING__STRICT=false` maps to `weaving.strict`.
pub const ENV_PREFIX: &str = "RESTWEAVE__";

/// Tool configuration: weaving options, known libraries and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Options handed to every weaving run.
    #[serde(default)]
    pub weaving: WeavingOptions,
    /// Libraries the resolver knows besides the run-time library.
    #[serde(default)]
    pub references: Vec<String>,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Base directory for relative log file paths; the working directory when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    pub file: String,          // "logs/weave.log", empty for no file
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Console-only logging at `info`; a file sink is opt-in.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

/// The observable adapter is known unless configured otherwise.
fn default_references() -> Vec<String> {
    vec![restweave_synth::references::OBSERVABLE_LIBRARY.to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            weaving: WeavingOptions::default(),
            references: default_references(),
            logging: Some(default_logging_config()),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Logging stays None unless YAML/ENV provide it.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().with_context(|| {
            format!(
                "Failed to load config from {}",
                config_path.as_ref().display()
            )
        })
    }

    /// Load configuration from file or create with default values.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Directory that relative log file paths resolve against.
    pub fn log_base_dir(&self) -> PathBuf {
        match self.log_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Apply overrides from command line arguments.
    /// Returns the `--option` names that are not weaving attributes.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) -> Vec<String> {
        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }

        for name in &args.references {
            if !self.references.iter().any(|r| r == name) {
                self.references.push(name.clone());
            }
        }

        args.options
            .iter()
            .filter(|(name, value)| !self.weaving.apply_attribute(name, value))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
    /// `Name=value` weaving attributes, already split.
    pub options: Vec<(String, String)>,
    pub references: Vec<String>,
}

/// Split a `Name=value` attribute; a bare name means `true`.
pub fn parse_option(raw: &str) -> Result<(String, String)> {
    let raw = raw.trim();
    match raw.split_once('=') {
        Some((name, _)) if name.trim().is_empty() => {
            anyhow::bail!("option '{raw}' has no name")
        }
        Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
        None if raw.is_empty() => anyhow::bail!("empty option"),
        None => Ok((raw.to_string(), "true".to_string())),
    }
}
