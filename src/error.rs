// src/error.rs

//! Unified error handling for the watcher.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Page retrieval failed (network, timeout or bad status)
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Durable state could not be written
    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    /// Telegram Bot API rejected a request
    #[error("Telegram error: {0}")]
    Telegram(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a URL.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error for a file.
    pub fn storage(path: &Path, message: impl fmt::Display) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Telegram API error.
    pub fn telegram(message: impl fmt::Display) -> Self {
        Self::Telegram(message.to_string())
    }
}
