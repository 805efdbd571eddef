use std::path::Path;
use std::time::Duration;

use cumulus_protocol::constants::DEFAULT_PACKET_TIMEOUTS;
use cumulus_transfer::{DEFAULT_CHUNK_SIZE, UploadSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;

/// Client settings, loadable from JSON. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend, e.g. `https://api.example.com`.
    pub server_url: String,
    pub app_id: String,
    /// Shared secret used to sign dispatcher packets.
    pub secret: String,
    pub app_version: String,
    /// Per-attempt timeouts of the packet retry ladder, in seconds.
    pub packet_timeouts_secs: Vec<u64>,
    pub upload: UploadConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            app_id: String::new(),
            secret: String::new(),
            app_version: "1.0.0".into(),
            packet_timeouts_secs: DEFAULT_PACKET_TIMEOUTS
                .iter()
                .map(Duration::as_secs)
                .collect(),
            upload: UploadConfig::default(),
        }
    }
}

/// Upload tuning, mirrored into [`UploadSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub chunk_size: usize,
    /// Zero disables the low-transfer-rate check.
    pub low_transfer_rate_timeout_secs: u64,
    /// Bytes per second.
    pub low_transfer_rate_threshold: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let settings = UploadSettings::default();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            low_transfer_rate_timeout_secs: settings.low_transfer_rate_timeout.as_secs(),
            low_transfer_rate_threshold: settings.low_transfer_rate_threshold,
        }
    }
}

impl UploadConfig {
    pub fn to_settings(&self) -> UploadSettings {
        UploadSettings {
            chunk_size: self.chunk_size,
            low_transfer_rate_timeout: Duration::from_secs(self.low_transfer_rate_timeout_secs),
            low_transfer_rate_threshold: self.low_transfer_rate_threshold,
        }
    }
}

impl ClientConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&data)?;
        debug!(path = %path.display(), server = %config.server_url, "loaded client config");
        Ok(config)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.server_url.is_empty() {
            return Err(ClientError::Config("server_url is required".into()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(ClientError::Config(format!(
                "server_url must be an http(s) URL: {}",
                self.server_url
            )));
        }
        if self.packet_timeouts_secs.contains(&0) {
            return Err(ClientError::Config(
                "packet timeouts must be at least one second".into(),
            ));
        }
        Ok(())
    }

    /// The retry ladder; an empty list falls back to the defaults.
    pub fn packet_timeouts(&self) -> Vec<Duration> {
        if self.packet_timeouts_secs.is_empty() {
            return DEFAULT_PACKET_TIMEOUTS.to_vec();
        }
        self.packet_timeouts_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}
