use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        let base_url = self.client.base_url.trim();
        if base_url.is_empty() {
            return Err("client.base_url must not be empty".into());
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err("client.base_url must be an http(s) URL".into());
        }
        if self.client.timeout_ms == 0 {
            return Err("client.timeout_ms must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// API root; resource URIs are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Pre-acquired access token sent as `Authorization: Bearer`.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_base_url() -> String {
    "https://graph.microsoft.com/beta".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("graphsync/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `~/.graphsync/config.toml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".graphsync").join("config.toml"))
}

pub mod loader {
    use super::*;
    use config::{Config, Environment, File};
    use std::path::Path;

    /// Loads configuration from `path` (or the default location), then
    /// applies `GRAPHSYNC__SECTION__KEY` environment overrides and validates
    /// the result. A missing file is not an error.
    pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, String> {
        let mut builder = Config::builder();
        let file = path.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(file) = file
            && file.exists()
        {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., GRAPHSYNC__CLIENT__TIMEOUT_MS=5000
        builder = builder.add_source(
            Environment::with_prefix("GRAPHSYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: ClientConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
