//! YAML configuration for plex-monitor.
//!
//! The file is read exactly once at startup. Only the listener fields and the
//! probe timeout have defaults; every other field must be present.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::probe::TrustMode;

/// Address the API binds to when `ListenAddress` is absent.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Port the API binds to when `ListenPort` is absent or zero.
pub const DEFAULT_LISTEN_PORT: u16 = 33131;

/// Upper bound on a single upstream probe when `ProbeTimeoutSeconds` is absent.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Path of the identity resource on the upstream server.
pub const IDENTITY_PATH: &str = "/identity";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse config: {0}")]
    Yaml(#[source] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration for the monitor process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitorConfig {
    /// Hostname or IP of the Plex server, optionally with an `http://` or
    /// `https://` scheme prefix. The port lives in `PlexPort`.
    pub plex_address: String,
    pub plex_port: u16,
    /// Skip certificate chain and hostname verification for the probe.
    #[serde(rename = "IgnoreSSL", default)]
    pub ignore_ssl: bool,
    /// IP address or hostname the API binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

impl MonitorConfig {
    /// Load and validate configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Yaml(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(path = %path.display(), "loaded monitor configuration");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content).map_err(ConfigError::Yaml)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Empty listen fields fall back to the defaults, matching an absent key.
    fn apply_defaults(&mut self) {
        if self.listen_address.trim().is_empty() {
            info!(listen_address = DEFAULT_LISTEN_ADDRESS, "using default listen address");
            self.listen_address = default_listen_address();
        }
        if self.listen_port == 0 {
            info!(listen_port = DEFAULT_LISTEN_PORT, "using default listen port");
            self.listen_port = DEFAULT_LISTEN_PORT;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let address = self.plex_address.trim();
        if let Some((scheme, _)) = address.split_once("://") {
            if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "PlexAddress scheme must be http or https, got {scheme:?}"
                )));
            }
        }
        let host = strip_scheme(address);
        if host.is_empty() {
            return Err(ConfigError::Invalid("PlexAddress must not be empty".into()));
        }
        if host.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "PlexAddress must be a bare host, got {:?}",
                self.plex_address
            )));
        }
        if host.contains(':') && host.parse::<std::net::Ipv6Addr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "PlexAddress must not carry a port, use PlexPort instead (got {:?})",
                self.plex_address
            )));
        }
        if self.plex_port == 0 {
            return Err(ConfigError::Invalid("PlexPort must be between 1 and 65535".into()));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "ProbeTimeoutSeconds must be at least 1".into(),
            ));
        }
        self.listen_host()?;
        Ok(())
    }

    /// Fully qualified URL of the upstream identity resource.
    pub fn identity_endpoint(&self) -> String {
        let address = self.plex_address.trim().trim_end_matches('/');
        let (scheme, host) = match address.split_once("://") {
            Some((scheme, host)) => (scheme.to_ascii_lowercase(), host),
            None => ("http".to_string(), address),
        };
        if host.parse::<std::net::Ipv6Addr>().is_ok() {
            return format!("{scheme}://[{host}]:{}{IDENTITY_PATH}", self.plex_port);
        }
        format!("{scheme}://{host}:{}{IDENTITY_PATH}", self.plex_port)
    }

    /// Host part of the listener: an IP literal or a resolvable hostname.
    pub fn listen_host(&self) -> Result<&str, ConfigError> {
        let host = self.listen_address.trim();
        if host.parse::<IpAddr>().is_ok() || is_hostname(host) {
            Ok(host)
        } else {
            Err(ConfigError::Invalid(format!(
                "ListenAddress {:?} is neither an IP address nor a hostname",
                self.listen_address
            )))
        }
    }

    /// `host:port` the API listener binds to, as passed to the resolver.
    pub fn listen_target(&self) -> Result<(String, u16), ConfigError> {
        Ok((self.listen_host()?.to_string(), self.listen_port))
    }

    pub fn trust_mode(&self) -> TrustMode {
        if self.ignore_ssl {
            TrustMode::Insecure
        } else {
            TrustMode::Verify
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

fn is_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn strip_scheme(address: &str) -> &str {
    match address.split_once("://") {
        Some((_, host)) => host.trim_end_matches('/'),
        None => address.trim_end_matches('/'),
    }
}
