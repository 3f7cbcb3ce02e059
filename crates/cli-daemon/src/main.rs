//! CLI entry point for the transcode monitor.
//!
//! `run` (the default) starts the long-running monitor; `compare` prints a
//! one-shot diff of the source and destination trees.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use transcode_monitor::{
    compare_trees, format_report, Config, IgnoreFilter, Monitor, PathMapper, ReportFormat,
};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Transcode Monitor - keeps a destination tree of transcoded copies in sync
#[derive(Parser, Debug)]
#[command(name = "transcode-monitor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the source tree and transcode new files (default)
    Run {
        /// Skip startup checks (ffmpeg, ffprobe, hardware flags). For testing only.
        #[arg(long)]
        skip_checks: bool,
    },
    /// Compare the source and destination trees and exit
    Compare {
        /// Report format: text, json or csv
        #[arg(long, default_value = "text")]
        format: ReportFormat,

        /// Include sources skipped for low quality
        #[arg(long)]
        show_skipped: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(format: LogFormat) -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init(),
    };
    result.map_err(|e| e.to_string())
}

async fn run(config: Config, skip_checks: bool) -> ExitCode {
    let monitor = if skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Monitor::new_without_checks(config)
    } else {
        Monitor::new(config)
    };

    let monitor = match monitor {
        Ok(monitor) => monitor,
        Err(e) => {
            error!(error = %e, "failed to initialize monitor");
            return ExitCode::FAILURE;
        }
    };

    if monitor.config.metrics.enabled {
        info!(bind = %monitor.config.metrics.bind, "serving metrics at /metrics");
    }

    match monitor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "monitor stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn compare(config: &Config, format: ReportFormat, show_skipped: bool) -> ExitCode {
    let filter = match IgnoreFilter::new(&config.scan.ignore_patterns) {
        Ok(filter) => filter,
        Err(e) => {
            error!(error = %e, "invalid ignore pattern");
            return ExitCode::from(2);
        }
    };

    let mapper = PathMapper::from_config(config);
    let report = compare_trees(&mapper, &filter)
        .and_then(|result| Ok((format_report(&result, format, show_skipped)?, result)));

    match report {
        Ok((text, result)) => {
            println!("{}", text);
            ExitCode::from(result.exit_code())
        }
        Err(e) => {
            error!(error = %e, "comparison failed");
            ExitCode::from(2)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match Config::load(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match args.command.unwrap_or(Command::Run { skip_checks: false }) {
        Command::Run { skip_checks } => run(config, skip_checks).await,
        Command::Compare {
            format,
            show_skipped,
        } => compare(&config, format, show_skipped),
    }
}
