use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use plex_monitor::config::MonitorConfig;
use plex_monitor::telemetry::{self, LogFormat, Telemetry};

#[derive(Parser)]
#[command(
    name = "plex-monitor",
    about = "Health-check proxy that republishes a Plex Media Server's status as JSON",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, value_name = "PATH")]
    config_file: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log filter directives (e.g. `debug`, `plex_monitor=trace`); overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let telemetry = Telemetry::start();

    // Usage errors exit 1 rather than clap's default 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = telemetry::init_logging(cli.log_format, cli.log_level.as_deref()) {
        eprintln!("error: invalid --log-level: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli, telemetry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, telemetry: Telemetry) -> Result<()> {
    info!(version = telemetry.version(), "plex-monitor starting up");

    let config_path = std::fs::canonicalize(&cli.config_file).unwrap_or(cli.config_file);
    info!(path = %config_path.display(), "using configuration file");

    let config = MonitorConfig::load(&config_path)?;
    info!(elapsed_ms = telemetry.uptime().as_millis() as u64, "configuration ready");

    let shutdown = CancellationToken::new();
    plex_monitor::shutdown::spawn_signal_listener(shutdown.clone());

    plex_monitor::run(config, telemetry, shutdown).await?;
    Ok(())
}
