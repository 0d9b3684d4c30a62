//! Logging setup and the per-process runtime context.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::Span;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Output format of the log stream on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global tracing subscriber.
///
/// `level` takes precedence over `RUST_LOG`; with neither set the filter is
/// `info`.
pub fn init_logging(format: LogFormat, level: Option<&str>) -> Result<(), ParseError> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder
            .with_ansi(std::io::stderr().is_terminal())
            .init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// Context handed to the dispatcher and lifecycle at construction: process
/// start instant and the build version.
#[derive(Debug, Clone)]
pub struct Telemetry {
    started: Instant,
    version: &'static str,
}

impl Telemetry {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Time since the process started.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span covering one inbound request.
    pub fn request_span(&self, route: &'static str, source: Option<SocketAddr>) -> Span {
        let source = source.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string());
        tracing::info_span!("request", route, %source)
    }
}
