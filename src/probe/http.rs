use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::{error_chain, Probe, ProbeError, ProbeResult, TrustMode};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// HTTP probe against a Plex `/identity` endpoint.
///
/// One client is built per process and reused for every probe; the trust mode
/// is fixed at construction.
pub struct IdentityProbe {
    client: Client,
    endpoint: String,
    trust: TrustMode,
}

impl IdentityProbe {
    pub fn new(
        endpoint: impl Into<String>,
        trust: TrustMode,
        timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let endpoint = endpoint.into();
        let insecure = trust == TrustMode::Insecure;
        if insecure {
            warn!(
                %endpoint,
                "TLS certificate and hostname verification disabled for upstream probes"
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(insecure)
            .danger_accept_invalid_hostnames(insecure)
            .build()
            .map_err(ProbeError::Build)?;

        Ok(Self {
            client,
            endpoint,
            trust,
        })
    }

    pub fn trust_mode(&self) -> TrustMode {
        self.trust
    }

    async fn fetch(&self) -> Result<Bytes, ProbeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/xml")
            .send()
            .await
            .map_err(ProbeError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }

        response.bytes().await.map_err(ProbeError::from_transport)
    }
}

#[async_trait::async_trait]
impl Probe for IdentityProbe {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn probe(&self) -> ProbeResult {
        info!(endpoint = %self.endpoint, trust = %self.trust, "probing upstream");

        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.fetch().await;
        let elapsed = start.elapsed();

        let body = match result {
            Ok(body) => {
                debug!(bytes = body.len(), elapsed_ms = elapsed.as_millis() as u64, "upstream answered");
                Some(body)
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    kind = e.kind(),
                    error = %error_chain(&e),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "upstream probe failed"
                );
                None
            }
        };

        ProbeResult {
            body,
            elapsed,
            started_at,
        }
    }
}
