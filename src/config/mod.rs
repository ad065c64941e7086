//! Process configuration
//!
//! Loaded once at startup from a TOML file with `STREAM_AUTOPILOT_`
//! environment overlays. Runtime-mutable engine configuration (automation,
//! stream checker, profile snapshots) lives in the JSON store instead and is
//! edited through the HTTP surface.

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream IPTV management service
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout; every upstream call is bounded by this
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Retry budget for transient failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Page size used when scanning paginated list endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding all persisted JSON state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment overlays
    ///
    /// Environment variables prefixed `STREAM_AUTOPILOT_` override file
    /// values (`STREAM_AUTOPILOT_UPSTREAM__BASE_URL` etc.); `CONFIG_DIR`
    /// overrides the storage directory for compatibility with container
    /// deployments.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let mut config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STREAM_AUTOPILOT_").split("__"))
            .extract()?;

        if let Ok(dir) = std::env::var("CONFIG_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.upstream.base_url.is_empty() {
            anyhow::bail!("upstream.base_url must not be empty");
        }
        url::Url::parse(&self.upstream.base_url)
            .map_err(|e| anyhow::anyhow!("upstream.base_url is not a valid URL: {e}"))?;
        if self.upstream.request_timeout_seconds == 0 {
            anyhow::bail!("upstream.request_timeout_seconds must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = Figment::new()
            .merge(Toml::string(
                r#"
                [upstream]
                base_url = "http://upstream.local:9191"
                username = "ops"
                password = "secret"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 8321);
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.upstream.retry_attempts, 3);
    }
}
