// src/config.rs

//! Fixed constants and runtime configuration loading.
//!
//! The TOML file carries tunables, the environment carries the bot token and
//! the optional `NEWS_INTERVAL` override.

use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::Config;

/// The single page being watched.
pub const SOURCE_URL: &str = "https://www.mim.gov.it/web/usr-lombardia";

/// Client signature sent with every page request.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; MiMWatcher/1.0)";

/// Upper bound for one page request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Period of the inbound command loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const INTERVAL_ENV: &str = "NEWS_INTERVAL";

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(raw) = std::env::var(INTERVAL_ENV) {
        config.schedule.news_interval_secs = parse_interval(&raw)?;
    }
    Ok(())
}

fn parse_interval(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| AppError::config(format!("{INTERVAL_ENV}={raw:?} is not a number: {e}")))
}

/// Read the bot token. An absent or blank token is a configuration error.
pub fn bot_token() -> Result<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::config(format!("{TOKEN_ENV} is not set")))
}

/// Load the config file, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}
