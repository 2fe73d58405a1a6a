//! Configuration system (layered: code > env > config file).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, TetherError};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const TERMINATE_SEGMENT: &str = "terminate";

/// Streaming protocol spoken by the remote agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum TransportKind {
    /// Server-sent `event:`/`data:` frames with typed JSON events.
    #[default]
    #[serde(rename = "ag-ui", alias = "agui")]
    #[strum(to_string = "ag-ui", serialize = "agui")]
    AgUi,
}

impl TransportKind {
    /// Parse a configured transport name.
    pub fn parse(name: &str) -> Result<Self> {
        name.trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| TetherError::UnknownTransport(name.to_string()))
    }
}

/// Adapter configuration.
///
/// Resolution order:
/// 1. Values set in code
/// 2. Environment variables (`TETHER_*`, `.env` honored)
/// 3. The TOML config file (`<config dir>/tether/config.toml`)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Run endpoint receiving one POST per run.
    pub endpoint: String,
    /// Endpoint notified on disconnect; derived from `endpoint` when unset.
    pub terminate_endpoint: Option<String>,
    pub transport: TransportKind,
    pub api_key: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub model: Option<String>,
    /// Conversation thread; a fresh id is generated when unset.
    pub thread_id: Option<String>,
    pub connect_timeout_secs: u64,
    /// Whole-request timeout. Unset by default since runs stream for a long time.
    pub request_timeout_secs: Option<u64>,
}

impl fmt::Debug for TetherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TetherConfig")
            .field("endpoint", &self.endpoint)
            .field("terminate_endpoint", &self.terminate_endpoint)
            .field("transport", &self.transport)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("model", &self.model)
            .field("thread_id", &self.thread_id)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            terminate_endpoint: None,
            transport: TransportKind::default(),
            api_key: None,
            headers: BTreeMap::new(),
            model: None,
            thread_id: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: None,
        }
    }
}

impl TetherConfig {
    /// Config pointing at `endpoint` with defaults elsewhere.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Default config file location, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tether")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the config file (when present) and overlay the environment.
    pub fn load() -> Result<Self> {
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        base.with_env()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| TetherError::Configuration(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Overlay `TETHER_*` environment variables onto this config.
    pub fn with_env(mut self) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        if let Ok(endpoint) = std::env::var("TETHER_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("TETHER_TERMINATE_ENDPOINT") {
            self.terminate_endpoint = Some(endpoint);
        }
        if let Ok(transport) = std::env::var("TETHER_TRANSPORT") {
            self.transport = TransportKind::parse(&transport)?;
        }
        if let Ok(key) = std::env::var("TETHER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("TETHER_MODEL") {
            self.model = Some(model);
        }
        if let Ok(thread_id) = std::env::var("TETHER_THREAD_ID") {
            self.thread_id = Some(thread_id);
        }
        if let Ok(secs) = std::env::var("TETHER_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = secs.parse().map_err(|_| {
                TetherError::Configuration(format!(
                    "TETHER_CONNECT_TIMEOUT_SECS must be an integer, got '{secs}'"
                ))
            })?;
        }
        Ok(self)
    }

    /// Check that the config can drive an adapter.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(TetherError::Configuration(
                "endpoint is not set (TETHER_ENDPOINT)".into(),
            ));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(TetherError::Configuration(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Endpoint for the best-effort terminate notification.
    ///
    /// Defaults to the sibling `terminate` path of the run endpoint.
    pub fn terminate_url(&self) -> String {
        if let Some(url) = &self.terminate_endpoint {
            return url.clone();
        }
        let trimmed = self.endpoint.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((base, _)) if !base.ends_with('/') => format!("{base}/{TERMINATE_SEGMENT}"),
            _ => format!("{trimmed}/{TERMINATE_SEGMENT}"),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_url_is_sibling_of_endpoint() {
        let config = TetherConfig::new("http://localhost:8000/api/agent/run");
        assert_eq!(config.terminate_url(), "http://localhost:8000/api/agent/terminate");
        let config = TetherConfig::new("http://localhost:8000/api/agent/run/");
        assert_eq!(config.terminate_url(), "http://localhost:8000/api/agent/terminate");
    }

    #[test]
    fn terminate_url_for_bare_host_appends() {
        let config = TetherConfig::new("http://localhost:8000");
        assert_eq!(config.terminate_url(), "http://localhost:8000/terminate");
    }

    #[test]
    fn explicit_terminate_url_wins() {
        let mut config = TetherConfig::new("http://a/run");
        config.terminate_endpoint = Some("http://b/stop".into());
        assert_eq!(config.terminate_url(), "http://b/stop");
    }

    #[test]
    fn transport_parses_aliases() {
        assert_eq!(TransportKind::parse("ag-ui").unwrap(), TransportKind::AgUi);
        assert_eq!(TransportKind::parse(" AGUI ").unwrap(), TransportKind::AgUi);
        assert!(matches!(
            TransportKind::parse("carrier-pigeon"),
            Err(TetherError::UnknownTransport(name)) if name == "carrier-pigeon"
        ));
        assert_eq!(TransportKind::AgUi.to_string(), "ag-ui");
    }

    #[test]
    fn validate_rejects_missing_or_non_http_endpoint() {
        assert!(TetherConfig::default().validate().is_err());
        assert!(TetherConfig::new("ftp://x").validate().is_err());
        assert!(TetherConfig::new("https://x/run").validate().is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = TetherConfig::new("http://x");
        config.api_key = Some("sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
