use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_CONFIG_PATH: &str = "hydra.yaml";

/// Top-level config (hydra.yaml + HYDRA_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Read downloaded files from disk instead of HTTP GET (Bot API server
    /// running in local mode).
    #[serde(default)]
    pub local_mode: bool,
    /// The sole authorized Telegram user.
    #[serde(default)]
    pub admin_id: i64,
    pub token: String,
    /// Optional HTTP(S) proxy for Telegram traffic.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Page size for /link and /chat keyboards.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Vendor accounts mapped to forum archive supergroups.
    #[serde(default)]
    pub archive: Vec<ArchiveChat>,
    #[serde(default)]
    pub telegraph: TelegraphConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            local_mode: false,
            admin_id: 0,
            token: String::new(),
            proxy: None,
            page_size: default_page_size(),
            archive: Vec::new(),
            telegraph: TelegraphConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveChat {
    pub vendor: String,
    pub uid: String,
    pub chat_id: i64,
}

/// Telegraph keys are recognized for config compatibility; the publication
/// path itself is not wired up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegraphConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// host:port the WebSocket server binds to.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Shared secret vendor adapters must present on upgrade.
    #[serde(default)]
    pub secret: String,
    /// Request/response round-trip budget, in seconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,
}

impl ServiceConfig {
    pub fn send_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.send_timeout)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            secret: String::new(),
            send_timeout: default_send_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_send_timeout() -> u64 {
    DEFAULT_SEND_TIMEOUT_SECS
}
fn default_addr() -> String {
    "127.0.0.1:11235".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load config from a YAML file with HYDRA_* env overrides
    /// (double underscore separates nesting: HYDRA_MASTER__ADMIN_ID).
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);

        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("HYDRA_").split("__"))
            .extract()
            .map_err(|e| BridgeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "master": { "token": "t", "admin_id": 42 },
            "service": { "addr": "0.0.0.0:9000", "secret": "s" }
        }))
        .unwrap();

        assert_eq!(config.master.api_url, DEFAULT_API_URL);
        assert_eq!(config.master.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.service.send_timeout, DEFAULT_SEND_TIMEOUT_SECS);
        assert_eq!(
            config.service.send_timeout_duration(),
            Duration::from_secs(180)
        );
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn archive_entries_parse() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "master": {
                "token": "t",
                "archive": [ { "vendor": "qq", "uid": "9999", "chat_id": -100555 } ]
            }
        }))
        .unwrap();
        assert_eq!(config.master.archive.len(), 1);
        assert_eq!(config.master.archive[0].chat_id, -100_555);
    }
}
