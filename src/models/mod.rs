// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod news;
mod stats;
mod subscriber;

// Re-export all public types
pub use config::{Config, DeliveryConfig, FilterConfig, ScheduleConfig, StorageConfig};
pub use news::{NewsItem, item_key};
pub use stats::{Stats, StatsPatch};
pub use subscriber::{ChatId, Subscriber};
