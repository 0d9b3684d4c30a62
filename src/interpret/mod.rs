//! Turns a [`ProbeResult`] into the JSON status envelope served on `/status`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::probe::ProbeResult;

pub mod identity;

pub use self::identity::{parse_identity, IdentityDocument, IdentityParseError, ROOT_MARKER};

/// Reachability of the upstream as reported to callers.
///
/// Serialized as the strings `"Up"` and `"Down"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpstreamStatus {
    Up,
    Down,
}

impl std::fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamStatus::Up => write!(f, "Up"),
            UpstreamStatus::Down => write!(f, "Down"),
        }
    }
}

/// The JSON body of `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusEnvelope {
    pub status: UpstreamStatus,
    /// Upstream version with the build suffix removed; empty when unknown.
    pub version: String,
    /// Probe duration in whole milliseconds.
    pub request_duration: u64,
    /// When the probe started, UTC.
    pub request_time: DateTime<Utc>,
}

/// Strip the build-hash suffix from a Plex version by keeping everything
/// before the first `-`, so `1.32.5.7516-8f4248874` becomes `1.32.5.7516`.
pub fn normalize_version(raw: &str) -> &str {
    raw.split_once('-').map_or(raw, |(head, _)| head)
}

/// Build the normalized record for one probe.
pub fn evaluate(result: &ProbeResult) -> StatusEnvelope {
    let request_duration = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX);

    let (status, version) = match result.body.as_deref().map(parse_identity) {
        None => (UpstreamStatus::Down, String::new()),
        Some(Err(e)) => {
            debug!(error = %e, "upstream body is not an identity document");
            (UpstreamStatus::Down, String::new())
        }
        Some(Ok(doc)) => {
            debug!(
                machine_identifier = doc.machine_identifier.as_deref().unwrap_or(""),
                size = ?doc.size,
                claimed = ?doc.claimed,
                raw_version = doc.version.as_deref().unwrap_or(""),
                "parsed identity document"
            );
            let version = doc
                .version
                .as_deref()
                .map(normalize_version)
                .unwrap_or_default()
                .to_string();
            (UpstreamStatus::Up, version)
        }
    };

    StatusEnvelope {
        status,
        version,
        request_duration,
        request_time: result.started_at,
    }
}

/// Serialize `value` as a newline-terminated JSON document. A serialization
/// failure yields `{"Error":"<message>"}` instead.
pub fn encode<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(mut body) => {
            body.push(b'\n');
            Bytes::from(body)
        }
        Err(e) => {
            error!(error = %e, "failed to serialize status envelope");
            let mut body = serde_json::json!({ "Error": e.to_string() }).to_string();
            body.push('\n');
            Bytes::from(body)
        }
    }
}

/// Probe result in, JSON envelope out.
pub fn interpret(result: &ProbeResult) -> (StatusEnvelope, Bytes) {
    let envelope = evaluate(result);
    let body = encode(&envelope);
    (envelope, body)
}
