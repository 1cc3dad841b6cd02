use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_top_senders")]
    pub default_top_senders: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_top_senders: default_top_senders(),
        }
    }
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.5
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_top_senders() -> usize {
    10
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.user_id.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "mailbox.user_id cannot be empty".to_string(),
            ));
        }

        // messages.list rejects maxResults above 500
        if self.mailbox.page_size == 0 || self.mailbox.page_size > 500 {
            return Err(GmailError::ConfigError(
                "mailbox.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.mailbox.request_timeout_secs == 0 {
            return Err(GmailError::ConfigError(
                "mailbox.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_retries > 10 {
            return Err(GmailError::ConfigError(
                "retry.max_retries cannot exceed 10".to_string(),
            ));
        }

        if self.retry.multiplier < 1.0 {
            return Err(GmailError::ConfigError(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(GmailError::ConfigError(
                "retry.jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retry.max_delay_secs.saturating_mul(1000) < self.retry.initial_delay_ms {
            return Err(GmailError::ConfigError(
                "retry.max_delay_secs cannot be shorter than retry.initial_delay_ms".to_string(),
            ));
        }

        if self.display.default_top_senders == 0 {
            return Err(GmailError::ConfigError(
                "display.default_top_senders must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.mailbox.user_id, "me");
        assert_eq!(config.mailbox.page_size, 500);
        assert_eq!(config.mailbox.request_timeout_secs, 30);

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.retry.jitter, 0.5);

        assert_eq!(config.display.default_top_senders, 10);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_user() {
        let mut config = Config::default();
        config.mailbox.user_id = "  ".to_string();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("user_id cannot be empty"));
    }

    #[test]
    fn test_config_validation_page_size_bounds() {
        let mut config = Config::default();

        config.mailbox.page_size = 0;
        assert!(config.validate().is_err());

        config.mailbox.page_size = 501;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("between 1 and 500"));

        config.mailbox.page_size = 1;
        assert!(config.validate().is_ok());

        config.mailbox.page_size = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_retry_values() {
        let mut config = Config::default();
        config.retry.jitter = 1.5;
        assert!(config.validate().unwrap_err().to_string().contains("retry.jitter"));

        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().unwrap_err().to_string().contains("retry.multiplier"));

        let mut config = Config::default();
        config.retry.max_retries = 11;
        assert!(config.validate().unwrap_err().to_string().contains("cannot exceed 10"));

        let mut config = Config::default();
        config.retry.max_retries = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_max_delay_shorter_than_initial() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 5000;
        config.retry.max_delay_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_huge_max_delay() {
        let mut config = Config::default();
        config.retry.max_delay_secs = u64::MAX;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.mailbox.page_size = 100;
        config.display.default_top_senders = 25;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.mailbox.page_size, 100);
        assert_eq!(loaded.display.default_top_senders, 25);
        assert_eq!(loaded.retry.max_retries, config.retry.max_retries);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-gmail-cleaner-config-12345.toml");

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.mailbox.user_id, "me");
        assert_eq!(config.retry.max_retries, 5);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[retry]
max_retries = 3

[mailbox]
user_id = "someone@example.com"
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.mailbox.user_id, "someone@example.com");

        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.mailbox.page_size, 500);
        assert_eq!(config.display.default_top_senders, 10);
    }

    #[tokio::test]
    async fn test_config_load_rejects_invalid_values() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "[mailbox]\npage_size = 0\n").await.unwrap();
        assert!(Config::load(path).await.is_err());
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.mailbox.page_size, 500);
    }
}
