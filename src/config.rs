//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::exchange::Platform;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transit: TransitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transit encryption between caller and service
#[derive(Debug, Clone, Deserialize)]
pub struct TransitConfig {
    /// Process-wide transit key (legacy env: PWD_DECRYPT_KEY)
    #[serde(default = "default_transit_key")]
    pub key: String,

    /// Accept a caller password that does not open with the transit key
    /// as plaintext. Off by default: a bad password fails loudly.
    #[serde(default)]
    pub legacy_plaintext_fallback: bool,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            key: default_transit_key(),
            legacy_plaintext_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_store_file")]
    pub file_name: String,
}

impl StorageConfig {
    /// Full path of the JSON store document
    pub fn store_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.file_name)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_store_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Transport timeout per exchange request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Signed request validity window (Binance, Bybit)
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,

    /// Base URL overrides keyed by platform id
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            recv_window_ms: default_recv_window_ms(),
            endpoints: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_transit_key() -> String {
    "jf324!@423fdQW".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_store_file() -> String {
    "custody.json".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_recv_window_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("transit.key", default_transit_key())?
            .set_default("storage.data_dir", default_data_dir())?
            .set_default("exchange.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CUSTODY_)
            .add_source(
                config::Environment::with_prefix("CUSTODY")
                    .separator("__")
                    .try_parsing(true),
            );

        // Deployments still export the transit key under its old name
        if let Ok(key) = std::env::var("PWD_DECRYPT_KEY") {
            builder = builder.set_override("transit.key", key)?;
        }

        let settings = builder.build().context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.transit.key.is_empty() {
            anyhow::bail!("transit.key must not be empty");
        }

        if self.exchange.timeout_ms == 0 {
            anyhow::bail!("exchange.timeout_ms must be positive");
        }

        if self.storage.file_name.is_empty() {
            anyhow::bail!("storage.file_name must not be empty");
        }

        for (platform, endpoint) in &self.exchange.endpoints {
            platform
                .parse::<Platform>()
                .with_context(|| format!("Unknown platform in exchange.endpoints: {}", platform))?;
            url::Url::parse(endpoint)
                .with_context(|| format!("Invalid endpoint URL for {}: {}", platform, endpoint))?;
        }

        if self.transit.legacy_plaintext_fallback {
            tracing::warn!(
                "transit.legacy_plaintext_fallback is enabled - unsealed caller passwords are accepted"
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let mut endpoints: Vec<String> = self
            .exchange
            .endpoints
            .iter()
            .map(|(platform, url)| format!("{}={}", platform, mask_url(url)))
            .collect();
        endpoints.sort();

        format!(
            r#"Configuration:
  Transit:
    key: {}
    legacy_plaintext_fallback: {}
  Storage:
    path: {}
  Exchange:
    timeout: {}ms
    recv_window: {}ms
    endpoints: {:?}
  Logging:
    level: {}
    json: {}
"#,
            if self.transit.key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.transit.legacy_plaintext_fallback,
            self.storage.store_path().display(),
            self.exchange.timeout_ms,
            self.exchange.recv_window_ms,
            endpoints,
            self.logging.level,
            self.logging.json,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transit: TransitConfig::default(),
            storage: StorageConfig::default(),
            exchange: ExchangeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.exchange.timeout_ms, 30_000);
        assert!(!config.transit.legacy_plaintext_fallback);
        assert_eq!(config.storage.store_path(), Path::new("data").join("custody.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.toml");
        std::fs::write(
            &path,
            r#"
[storage]
data_dir = "/var/lib/custody"

[exchange]
timeout_ms = 5000

[exchange.endpoints]
binance = "https://testnet.binance.vision"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, "/var/lib/custody");
        assert_eq!(config.exchange.timeout_ms, 5000);
        assert_eq!(
            config.exchange.endpoints.get("binance").map(String::as_str),
            Some("https://testnet.binance.vision")
        );
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let mut config = Config::default();
        config
            .exchange
            .endpoints
            .insert("kraken".to_string(), "https://api.kraken.com".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .exchange
            .endpoints
            .insert("okx".to_string(), "not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked_display_hides_transit_key() {
        let config = Config::default();
        let shown = config.masked_display();
        assert!(!shown.contains(&config.transit.key));
        assert!(shown.contains("***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
