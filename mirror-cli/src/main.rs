use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirror::{MarkerFiles, MirrorRunner, SyncOptions, SyncRequest};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

mod config;
mod logging;
mod output;

use config::{default_config_path, MirrorConfig};
use output::{OutputMode, Printer};

#[derive(Parser)]
#[command(name = "mirror")]
#[command(about = "One-way incremental directory mirroring")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a source directory onto a target directory
    Run {
        /// Source directory
        #[arg(required_unless_present = "job")]
        source: Option<PathBuf>,
        /// Target directory
        #[arg(required_unless_present = "job")]
        target: Option<PathBuf>,
        /// Run a job from the configuration file instead
        #[arg(short, long, conflicts_with_all = ["source", "target"])]
        job: Option<String>,
        /// Require marker files in both roots
        #[arg(long)]
        validate: bool,
        /// Report every file and directory operation
        #[arg(long)]
        details: bool,
        /// Copy modification times onto written files
        #[arg(long)]
        preserve_mtime: bool,
        /// Minimum time between status lines (e.g. "3s", "500ms")
        #[arg(long, value_parser = parse_interval)]
        interval: Option<Duration>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Create the marker files that allow a validated run
    Mark {
        /// Source directory
        source: PathBuf,
        /// Target directory
        target: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Generate {
        /// Output path (defaults to the user config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check the configuration for errors
    Validate,
}

const EXIT_OK: i32 = 0;
const EXIT_VALIDATION_FAILED: i32 = 1;
const EXIT_OPERATION_ERRORS: i32 = 2;

struct RunArgs {
    source: Option<PathBuf>,
    target: Option<PathBuf>,
    job: Option<String>,
    validate: bool,
    details: bool,
    preserve_mtime: bool,
    interval: Option<Duration>,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MirrorConfig::load_or_default(cli.config.as_ref()).await?;
    if let Some(level) = cli.log_level {
        config.logging.log_level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }

    let guard = logging::init_logging(&config.logging)?;

    let code = match cli.command {
        Commands::Run {
            source,
            target,
            job,
            validate,
            details,
            preserve_mtime,
            interval,
            json,
        } => {
            let args = RunArgs {
                source,
                target,
                job,
                validate,
                details,
                preserve_mtime,
                interval,
                json,
            };
            run(&config, args).await?
        }
        Commands::Mark { source, target } => {
            MarkerFiles::create(&source, &target).await?;
            println!("Created {}", MarkerFiles::source_marker(&source).display());
            println!("Created {}", MarkerFiles::target_marker(&target).display());
            EXIT_OK
        }
        Commands::Config { action } => {
            handle_config(&config, cli.config, action).await?;
            EXIT_OK
        }
    };

    // Flush the file writer before leaving through `exit`.
    drop(guard);
    if code != EXIT_OK {
        std::process::exit(code);
    }
    Ok(())
}

/// Run one mirror pass and return the process exit code
async fn run(config: &MirrorConfig, args: RunArgs) -> Result<i32> {
    let (request, mut options) = resolve_run(config, &args)?;
    if let Some(interval) = args.interval {
        options.report_interval = interval;
    }

    let mode = if args.json { OutputMode::Json } else { OutputMode::Text };
    let mut printer = Printer::new(mode);

    let mut runner = MirrorRunner::new(options);
    runner.setup(request)?;
    let mut mirror_run = runner.start()?;

    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    while let Some(event) = mirror_run.next_event().await {
        printer.event(&event)?;
    }

    match mirror_run.wait().await {
        Ok(stats) => {
            printer.finish(&stats, runner.is_cancelled())?;
            if printer.errors() > 0 {
                Ok(EXIT_OPERATION_ERRORS)
            } else {
                Ok(EXIT_OK)
            }
        }
        Err(e) if e.is_validation_failure() => {
            error!("Run aborted: {}", e);
            Ok(EXIT_VALIDATION_FAILED)
        }
        Err(e) => Err(e.into()),
    }
}

/// Build the request from either a configured job or the command line
fn resolve_run(config: &MirrorConfig, args: &RunArgs) -> Result<(SyncRequest, SyncOptions)> {
    let (mut request, mut options) = match &args.job {
        Some(name) => config.job(name)?.resolve(&config.defaults),
        None => {
            let source = args.source.clone().context("Source directory is required")?;
            let target = args.target.clone().context("Target directory is required")?;
            let request = SyncRequest::new(source, target)
                .validate(config.defaults.validate)
                .report_detail(config.defaults.report_detail);
            (request, config.sync_options())
        }
    };

    if args.validate {
        request = request.validate(true);
    }
    if args.details {
        request = request.report_detail(true);
        options.report_detail = true;
    }
    if args.preserve_mtime {
        options.preservation_options.preserve_mtime = true;
    }

    Ok((request, options))
}

async fn handle_config(config: &MirrorConfig, path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Generate { output } => {
            let output = output
                .or_else(default_config_path)
                .context("Could not determine a configuration directory")?;
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            MirrorConfig::default().save(&output).await?;
            println!("Configuration written to {}", output.display());
        }
        ConfigAction::Validate => {
            config.validate()?;
            match path.or_else(default_config_path) {
                Some(path) => println!("Configuration {} is valid", path.display()),
                None => println!("Configuration is valid"),
            }
        }
    }
    Ok(())
}

fn parse_interval(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
