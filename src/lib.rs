//! plex-monitor -- health-check proxy for a Plex Media Server.
//!
//! Each request to `/status` or `/health` probes the server's `/identity`
//! endpoint and republishes the outcome as JSON or a bare status code for
//! uptime dashboards and alerting.

pub mod api;
pub mod config;
pub mod interpret;
pub mod monitor;
pub mod probe;
pub mod shutdown;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::state::AppState;
use crate::config::{ConfigError, MonitorConfig};
use crate::monitor::Monitor;
use crate::probe::{IdentityProbe, ProbeError};
use crate::telemetry::Telemetry;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the monitor for `config`: one probe client bound to the configured
/// upstream and trust mode.
pub fn build_monitor(config: &MonitorConfig, telemetry: Telemetry) -> Result<Monitor, ServeError> {
    let probe = IdentityProbe::new(
        config.identity_endpoint(),
        config.trust_mode(),
        config.probe_timeout(),
    )?;
    Ok(Monitor::new(Arc::new(probe), telemetry))
}

/// Bind the configured listener and serve until `shutdown` is cancelled.
pub async fn run(
    config: MonitorConfig,
    telemetry: Telemetry,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let monitor = build_monitor(&config, telemetry)?;
    info!(endpoint = %monitor.endpoint(), trust = %config.trust_mode(), "upstream configured");

    let (host, port) = config.listen_target()?;
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|source| ServeError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;

    serve(listener, monitor, shutdown).await
}

/// Serve the monitor API on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    monitor: Monitor,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let addr = listener.local_addr().map_err(ServeError::Serve)?;
    info!(
        %addr,
        startup_ms = monitor.telemetry().uptime().as_millis() as u64,
        "plex-monitor listening"
    );

    let app = api::router(AppState::new(monitor));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .map_err(ServeError::Serve)?;

    info!("server stopped");
    Ok(())
}
