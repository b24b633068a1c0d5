// src/pipeline/commands.rs

//! Chat command handling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ChatId, StatsPatch};
use crate::pipeline::messages;
use crate::pipeline::watch::Watcher;
use crate::services::{InboundCommand, Messenger};
use crate::storage::Store;

/// A recognised chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Help,
    Stats,
    Last,
    Next,
    Force,
    Unknown(String),
}

impl Command {
    /// Parse the first word of a message. Case-insensitive; a trailing
    /// `@botname` is ignored.
    pub fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or("").to_lowercase();

        match name.as_str() {
            "/start" | "/subscribe" => Self::Subscribe,
            "/stop" | "/unsubscribe" => Self::Unsubscribe,
            "/help" => Self::Help,
            "/stats" | "/status" => Self::Stats,
            "/last" => Self::Last,
            "/next" => Self::Next,
            "/force" => Self::Force,
            _ => Self::Unknown(text.trim().to_string()),
        }
    }
}

/// Time left before the next timer-driven check, or `None` if it is due.
pub fn next_check_in(next: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    (next? - now)
        .to_std()
        .ok()
        .filter(|left| !left.is_zero())
}

/// Answers chat commands against the shared store.
pub struct CommandHandler {
    store: Arc<Store>,
    watcher: Arc<Watcher>,
    messenger: Arc<dyn Messenger>,
    news_interval: Duration,
}

impl CommandHandler {
    pub fn new(
        watcher: Arc<Watcher>,
        messenger: Arc<dyn Messenger>,
        news_interval: Duration,
    ) -> Self {
        Self {
            store: Arc::clone(watcher.store()),
            watcher,
            messenger,
            news_interval,
        }
    }

    /// Handle one inbound message. Failures are logged and, where possible,
    /// reported back to the chat.
    pub async fn handle(&self, inbound: &InboundCommand) {
        let chat_id = inbound.chat_id;
        let command = Command::parse(&inbound.text);
        log::info!("Command {:?} from {}", command, chat_id);

        if let Err(e) = self.store.record_stats(StatsPatch::new().command()).await {
            log::warn!("Could not count command: {}", e);
        }

        let replies = match self.respond(chat_id, command).await {
            Ok(replies) => replies,
            Err(e) => {
                log::error!("Command from {} failed: {}", chat_id, e);
                vec![messages::internal_error()]
            }
        };

        for reply in replies {
            self.reply(chat_id, &reply).await;
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_message(chat_id, text).await {
            log::warn!("Reply to {} failed: {}", chat_id, e);
        }
    }

    async fn respond(&self, chat_id: ChatId, command: Command) -> Result<Vec<String>> {
        let replies = match command {
            Command::Subscribe => {
                if self.store.add_subscriber(chat_id).await? {
                    log::info!("New subscriber: {}", chat_id);
                    let count = self.store.subscriber_count().await;
                    let mut replies = vec![messages::welcome(count, self.news_interval)];
                    if let Some(latest) = self.store.stats().await.latest_news() {
                        replies.push(messages::last_item(Some(&latest), None));
                    }
                    replies
                } else {
                    let count = self.store.subscriber_count().await;
                    vec![messages::already_subscribed(count, self.news_interval)]
                }
            }
            Command::Unsubscribe => {
                if self.store.remove_subscriber(chat_id).await? {
                    log::info!("Subscriber removed: {}", chat_id);
                    vec![messages::goodbye(self.store.subscriber_count().await)]
                } else {
                    vec![messages::not_subscribed()]
                }
            }
            Command::Help => {
                let count = self.store.subscriber_count().await;
                vec![messages::help(count, self.news_interval)]
            }
            Command::Stats => {
                let stats = self.store.stats().await;
                let summary = self.store.summary().await;
                vec![messages::stats(&stats, &summary, self.news_interval, Utc::now())]
            }
            Command::Last => {
                let latest = self.store.stats().await.latest_news();
                let last_seen = self.store.last_seen().await;
                vec![messages::last_item(latest.as_ref(), last_seen.as_deref())]
            }
            Command::Next => {
                let last_check = self.store.stats().await.last_check_at;
                let remaining = next_check_in(self.watcher.next_timed_check(), Utc::now());
                vec![messages::next_check(remaining, last_check, self.news_interval)]
            }
            Command::Force => {
                log::info!("Forced check requested by {}", chat_id);
                self.reply(chat_id, &messages::force_started()).await;
                let outcome = self.watcher.run_cycle().await?;
                vec![messages::force_outcome(&outcome)]
            }
            Command::Unknown(text) => vec![messages::unknown(&text)],
        };
        Ok(replies)
    }
}
