//! The request-side capability object: a bound probe plus the runtime context.
//!
//! Every call runs a fresh probe. Nothing is cached or shared between
//! requests, so concurrent callers never observe each other.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, Instrument};

use crate::interpret::{self, StatusEnvelope, ROOT_MARKER};
use crate::probe::Probe;
use crate::telemetry::Telemetry;

/// Binary verdict of the cheap liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unavailable,
}

/// Outcome of a `/status` request.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub envelope: StatusEnvelope,
    /// Serialized JSON body, newline terminated.
    pub body: Bytes,
}

pub struct Monitor {
    probe: Arc<dyn Probe>,
    telemetry: Telemetry,
}

impl Monitor {
    pub fn new(probe: Arc<dyn Probe>, telemetry: Telemetry) -> Self {
        Self { probe, telemetry }
    }

    /// URL of the monitored identity endpoint.
    pub fn endpoint(&self) -> &str {
        self.probe.endpoint()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Probe the upstream and build the JSON envelope.
    pub async fn status(&self, source: Option<SocketAddr>) -> StatusReport {
        let span = self.telemetry.request_span("/status", source);
        async {
            info!("received status request");
            let result = self.probe.probe().await;
            let (envelope, body) = interpret::interpret(&result);
            info!(
                status = %envelope.status,
                version = %envelope.version,
                duration_ms = envelope.request_duration,
                "status request served"
            );
            StatusReport { envelope, body }
        }
        .instrument(span)
        .await
    }

    /// Probe the upstream and only check that the body looks like an identity
    /// document.
    pub async fn health(&self, source: Option<SocketAddr>) -> Health {
        let span = self.telemetry.request_span("/health", source);
        async {
            let result = self.probe.probe().await;
            let health = if result.body_contains(ROOT_MARKER) {
                Health::Healthy
            } else {
                Health::Unavailable
            };
            info!(
                ?health,
                duration_ms = result.elapsed.as_millis() as u64,
                "health request served"
            );
            health
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::interpret::UpstreamStatus;
    use crate::probe::ProbeResult;
    use chrono::Utc;
    use std::time::{Duration, Instant};

    pub(crate) const IDENTITY: &str = r#"<MediaContainer size="0" claimed="1" machineIdentifier="abc" version="1.32.5.7516-8f4248874"/>"#;

    /// Upstream double with a fixed body and an artificial delay.
    pub(crate) struct FakeProbe {
        pub body: Option<&'static str>,
        pub delay: Duration,
    }

    impl FakeProbe {
        pub(crate) fn answering(body: &'static str) -> Self {
            Self {
                body: Some(body),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                body: None,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl Probe for FakeProbe {
        fn endpoint(&self) -> &str {
            "http://fake.invalid:32400/identity"
        }

        async fn probe(&self) -> ProbeResult {
            let started_at = Utc::now();
            let start = Instant::now();
            tokio::time::sleep(self.delay).await;
            ProbeResult {
                body: self.body.map(|b| Bytes::from_static(b.as_bytes())),
                elapsed: start.elapsed(),
                started_at,
            }
        }
    }

    fn monitor(probe: FakeProbe) -> Monitor {
        Monitor::new(Arc::new(probe), Telemetry::start())
    }

    #[tokio::test]
    async fn test_status_reports_up_for_identity_document() {
        let report = monitor(FakeProbe::answering(IDENTITY)).status(None).await;

        assert_eq!(report.envelope.status, UpstreamStatus::Up);
        assert_eq!(report.envelope.version, "1.32.5.7516");
    }

    #[tokio::test]
    async fn test_status_reports_down_for_failed_probe() {
        let source = Some("192.0.2.7:51000".parse().unwrap());
        let report = monitor(FakeProbe::failing()).status(source).await;

        assert_eq!(report.envelope.status, UpstreamStatus::Down);
        assert_eq!(report.envelope.version, "");
    }

    #[tokio::test]
    async fn test_request_duration_tracks_probe_delay() {
        let probe = FakeProbe {
            body: Some(IDENTITY),
            delay: Duration::from_millis(120),
        };
        let before = Utc::now();
        let report = monitor(probe).status(None).await;

        assert!(report.envelope.request_duration >= 120);
        assert!(report.envelope.request_time >= before);
    }

    #[tokio::test]
    async fn test_health_follows_root_marker() {
        assert_eq!(
            monitor(FakeProbe::answering(IDENTITY)).health(None).await,
            Health::Healthy
        );
        assert_eq!(
            monitor(FakeProbe::answering("<html>login</html>")).health(None).await,
            Health::Unavailable
        );
        assert_eq!(monitor(FakeProbe::failing()).health(None).await, Health::Unavailable);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let monitor = Arc::new(monitor(FakeProbe {
            body: Some(IDENTITY),
            delay: Duration::from_millis(50),
        }));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let monitor = monitor.clone();
                tokio::spawn(async move { monitor.status(None).await })
            })
            .collect();

        for task in tasks {
            let report = task.await.unwrap();
            assert_eq!(report.envelope.status, UpstreamStatus::Up);
            assert!(report.envelope.request_duration >= 50);
        }
    }
}
