//! Service layer for the watcher.
//!
//! This module contains the external-facing pieces of the pipeline:
//! - Page retrieval (`PageFetcher`, `HttpFetcher`)
//! - News listing parsing (`ItemExtractor`)
//! - Telegram messaging (`Messenger`, `TelegramClient`)

mod extractor;
mod fetcher;
mod telegram;

pub use extractor::ItemExtractor;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use telegram::{InboundCommand, Messenger, TelegramClient};
