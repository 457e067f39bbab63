use crate::error::{Result, ScrapeError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Application configuration, loaded from `config.toml` with environment
/// overrides for secrets. Every field has a default so a missing config file
/// still yields a usable configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scrape: ScrapeConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Festival website base URL
    pub base_url: String,
    /// Directory for canonical current-state files
    pub current_dir: String,
    /// Directory for daily snapshots
    pub snapshot_dir: String,
    /// Directory for converted output files
    pub output_dir: String,
    /// Year assumed when parsing listing dates without one
    pub default_year: i32,
    /// Rendering proxy API key (overridable via FRINGE_RENDER_API_KEY)
    pub render_api_key: Option<String>,
    /// Minimum delay between proxy requests in milliseconds
    pub request_delay_ms: u64,
    /// JavaScript rendering wait time in milliseconds
    pub js_wait_ms: u64,
    /// Maximum fetch attempts per page for retryable failures
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Recipient address for update reports; reports are skipped when unset
    pub to: Option<String>,
    /// Sender address (defaults to the SMTP username)
    pub from: Option<String>,
    pub smtp_host: String,
    /// 587 for STARTTLS, 465 for implicit TLS
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    /// Overridable via FRINGE_SMTP_PASSWORD
    pub smtp_password: Option<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.edfringe.com".to_string(),
            current_dir: "data/current".to_string(),
            snapshot_dir: "data/snapshots".to_string(),
            output_dir: "data/raw".to_string(),
            default_year: 2026,
            render_api_key: None,
            request_delay_ms: 2000,
            js_wait_ms: 15000,
            max_retries: 3,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            to: None,
            from: None,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scrape: ScrapeConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ScrapeError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("FRINGE_RENDER_API_KEY") {
            if !key.trim().is_empty() {
                self.scrape.render_api_key = Some(key);
            }
        }
        if let Ok(password) = std::env::var("FRINGE_SMTP_PASSWORD") {
            if !password.trim().is_empty() {
                self.email.smtp_password = Some(password);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_config_missing() {
        let config = Config::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.scrape.base_url, "https://www.edfringe.com");
        assert_eq!(config.scrape.request_delay_ms, 2000);
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [scrape]
            default_year = 2027
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scrape.default_year, 2027);
        assert_eq!(parsed.scrape.snapshot_dir, "data/snapshots");
    }
}
