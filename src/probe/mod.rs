//! Upstream probe: one HTTP GET against the identity endpoint, timed.
//!
//! Failures never propagate as errors. A probe that could not fetch a body
//! yields a [`ProbeResult`] whose `body` is `None`.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod http;

pub use self::http::IdentityProbe;

/// Whether TLS certificates presented by the upstream are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode {
    Verify,
    Insecure,
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustMode::Verify => write!(f, "verify"),
            TrustMode::Insecure => write!(f, "insecure"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("upstream answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl ProbeError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Build(_) => "build",
            ProbeError::Connect(_) => "connect",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Status(_) => "status",
            ProbeError::Body(_) => "body",
            ProbeError::Request(_) => "request",
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout(err)
        } else if err.is_connect() {
            ProbeError::Connect(err)
        } else if let Some(status) = err.status() {
            ProbeError::Status(status)
        } else if err.is_body() || err.is_decode() {
            ProbeError::Body(err)
        } else {
            ProbeError::Request(err)
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Raw response body, or `None` when the probe failed.
    pub body: Option<Bytes>,
    /// Wall-clock span of request plus body read.
    pub elapsed: Duration,
    /// When the probe was initiated.
    pub started_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn is_failure(&self) -> bool {
        self.body.is_none()
    }

    /// True when the raw body contains `marker` as a byte substring.
    pub fn body_contains(&self, marker: &str) -> bool {
        let needle = marker.as_bytes();
        match &self.body {
            Some(body) if !needle.is_empty() => body.windows(needle.len()).any(|w| w == needle),
            _ => false,
        }
    }
}

/// A source of upstream probe results.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// URL being probed, for logging and the landing page.
    fn endpoint(&self) -> &str;

    async fn probe(&self) -> ProbeResult;
}

/// Render an error and its source chain on one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !out.contains(&cause_text) {
            out.push_str(": ");
            out.push_str(&cause_text);
        }
        source = cause.source();
    }
    out
}
