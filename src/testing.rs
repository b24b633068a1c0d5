//! In-memory fakes for the fetch and messaging boundaries.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::ChatId;
use crate::services::{InboundCommand, Messenger, PageFetcher};

/// Render a listing page the extractor recognises.
pub fn listing_page(entries: &[(&str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, url)| {
            format!(r#"<li class="asset-tab-home"><a href="{url}">{title}</a></li>"#)
        })
        .collect();
    format!(
        r#"<html><body><a href="https://example.gov.it/">Home</a>
        <div id="tab-container-news"><ul>{items}</ul></div></body></html>"#
    )
}

/// Serves a programmable page and records how it was called.
pub struct StaticFetcher {
    page: Mutex<std::result::Result<String, String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            page: Mutex::new(Ok(String::new())),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_page(&self, html: impl Into<String>) {
        *self.page.lock().unwrap() = Ok(html.into());
    }

    pub fn fail_with(&self, message: &str) {
        *self.page.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let page = self.page.lock().unwrap().clone();
        page.map_err(|message| AppError::fetch(url, message))
    }
}

/// Records outgoing messages and serves queued inbound commands.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: Mutex<HashSet<ChatId>>,
    inbox: Mutex<Vec<InboundCommand>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful sends, in completion order.
    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }

    /// Make every send to `chat_id` fail.
    pub fn fail_for(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn push_command(&self, chat_id: ChatId, text: &str) {
        self.inbox.lock().unwrap().push(InboundCommand {
            chat_id,
            text: text.to_string(),
        });
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(AppError::telegram("Forbidden: bot was blocked by the user"));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn receive_pending_commands(&self) -> Result<Vec<InboundCommand>> {
        Ok(std::mem::take(&mut *self.inbox.lock().unwrap()))
    }
}
