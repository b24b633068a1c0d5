//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Check loop timing
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Where the state files live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification fan-out settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Entry validation rules for the news listing
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.schedule.news_interval_secs == 0 {
            return Err(AppError::validation(
                "schedule.news_interval_secs must be > 0",
            ));
        }
        if self.delivery.max_concurrent == 0 {
            return Err(AppError::validation("delivery.max_concurrent must be > 0"));
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(AppError::validation("storage.data_dir is empty"));
        }
        Ok(())
    }
}

/// Timing of the page check loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between two automatic checks
    #[serde(default = "defaults::news_interval")]
    pub news_interval_secs: u64,
}

impl ScheduleConfig {
    pub fn news_interval(&self) -> Duration {
        Duration::from_secs(self.news_interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            news_interval_secs: defaults::news_interval(),
        }
    }
}

/// Location of the durable state files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `subscribers.json`, `seen.json` and `stats.json`
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// Notification fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum concurrent sends while broadcasting one item
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Validation rules applied to every candidate entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Shorter titles are navigation labels, not news
    #[serde(default = "defaults::min_title_len")]
    pub min_title_len: usize,

    /// Lowercase phrases marking boilerplate link text
    #[serde(default = "defaults::placeholder_titles")]
    pub placeholder_titles: Vec<String>,

    /// Lowercase substrings marking links that are never news
    #[serde(default = "defaults::excluded_url_patterns")]
    pub excluded_url_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_title_len: defaults::min_title_len(),
            placeholder_titles: defaults::placeholder_titles(),
            excluded_url_patterns: defaults::excluded_url_patterns(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn news_interval() -> u64 {
        1800
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn max_concurrent() -> usize {
        5
    }

    // Filter defaults
    pub fn min_title_len() -> usize {
        10
    }
    pub fn placeholder_titles() -> Vec<String> {
        [
            "home",
            "cerca",
            "contatti",
            "privacy",
            "cookie",
            "accessibilità",
            "vai al contenuto",
            "menu principale",
            "ultime comunicazioni",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
    pub fn excluded_url_patterns() -> Vec<String> {
        [
            "javascript:",
            "mailto:",
            "#content",
            "#tab",
            "cookie-policy",
            "privacy-policy",
            "accessibilita",
            "/cerca",
            "/search",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.schedule.news_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.delivery.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [schedule]
            news_interval_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.schedule.news_interval_secs, 600);
        assert_eq!(config.delivery.max_concurrent, 5);
        assert_eq!(config.filters.min_title_len, 10);
        assert!(config.filters.excluded_url_patterns.contains(&"mailto:".to_string()));
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let config = Config::load_or_default("/nonexistent/config.toml");
        assert_eq!(config.schedule.news_interval_secs, 1800);
    }
}
