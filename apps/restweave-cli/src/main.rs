use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use restweave_bootstrap::{parse_option, AppConfig, CliArgs};
use restweave_synth::{LibrarySet, MemoryModule, ModuleWeaver, RunError, TracingSink};

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// restweave - synthesize REST client bodies from declarative service descriptions
#[derive(Parser)]
#[command(name = "restweave")]
#[command(about = "Synthesize REST client method bodies from declarative service descriptions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a module, filling in every service stub
    Weave {
        #[command(flatten)]
        run: RunArgs,

        /// Where to write the rewritten module (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run synthesis without writing anything
    Check {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print effective configuration (YAML) and exit
    PrintConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Module description (JSON)
    module: PathBuf,

    /// Library the resolver should know about (repeatable)
    #[arg(long = "reference", value_name = "LIB")]
    references: Vec<String>,

    /// Weaving attribute, e.g. `ThrowRestExceptionOnInternetError=true` (repeatable)
    #[arg(long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,
}

impl Commands {
    fn run_args(&self) -> Option<&RunArgs> {
        match self {
            Commands::Weave { run, .. } | Commands::Check { run } => Some(run),
            Commands::PrintConfig => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let run_args = cli.command.as_ref().and_then(Commands::run_args);
    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        options: run_args
            .map(|r| r.options.iter().map(|o| parse_option(o)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default(),
        references: run_args.map(|r| r.references.clone()).unwrap_or_default(),
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (RESTWEAVE__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    let unknown_options = config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    let _log_guard = restweave_bootstrap::init_logging(&logging_config, &config.log_base_dir());

    for name in &unknown_options {
        tracing::warn!(option = %name, "ignoring unknown weaving option");
    }

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command {
        None | Some(Commands::PrintConfig) => {
            println!("{}", config.to_yaml()?);
            Ok(())
        }
        Some(Commands::Weave { run, output }) => {
            let target = output.unwrap_or_else(|| run.module.clone());
            weave(&config, &run.module, Some(&target)).await
        }
        Some(Commands::Check { run }) => weave(&config, &run.module, None).await,
    }
}

/// Weaves `module`; writes the result to `output` when given.
/// Fails when any stub could not be synthesized.
async fn weave(config: &AppConfig, module: &Path, output: Option<&Path>) -> Result<()> {
    let (libraries, unknown) = LibrarySet::from_names(&config.references);
    for name in &unknown {
        tracing::warn!(library = %name, "unknown library reference");
    }

    let mut editor = MemoryModule::load(module)?;
    let weaver = ModuleWeaver::new(
        config.weaving.clone(),
        Arc::new(libraries),
        Arc::new(TracingSink),
    );

    let report = match weaver.execute(&mut editor).await {
        Ok(report) => report,
        Err(RunError::Weave(e)) => {
            tracing::error!(trail = %e.trail.join(" > "), "{e}");
            return Err(e).with_context(|| format!("weaving {} failed", module.display()));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("weaving {} failed", module.display()));
        }
    };

    if let Some(path) = output {
        std::fs::write(path, editor.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "module written");
    }

    for failure in &report.failures {
        tracing::error!(trail = %failure.trail.join(" > "), "{failure}");
    }
    if !report.is_clean() {
        anyhow::bail!(
            "{} stub(s) in {} could not be synthesized",
            report.failures.len(),
            module.display()
        );
    }

    Ok(())
}
