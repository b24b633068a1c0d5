//! Operational counters surfaced through `/stats`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::NewsItem;

/// Rolling statistics, persisted as `stats.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    /// When the current process started
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub total_news_sent: u64,
    #[serde(default)]
    pub total_commands_processed: u64,
    #[serde(default)]
    pub last_check_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_news_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Top new entry of the most recent cycle that found news
    #[serde(default)]
    pub last_news_title: Option<String>,
    #[serde(default)]
    pub last_news_url: Option<String>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_checks: 0,
            total_news_sent: 0,
            total_commands_processed: 0,
            last_check_at: None,
            last_news_at: None,
            last_error_at: None,
            last_error: None,
            last_news_title: None,
            last_news_url: None,
        }
    }
}

impl Stats {
    /// Merge a patch: counters are incremented, timestamps and messages replaced.
    pub fn apply(&mut self, patch: &StatsPatch) {
        self.total_checks += patch.checks;
        self.total_news_sent += patch.news_sent;
        self.total_commands_processed += patch.commands_processed;

        if let Some(at) = patch.started_at {
            self.started_at = at;
        }
        if let Some(at) = patch.checked_at {
            self.last_check_at = Some(at);
        }
        if let Some(at) = patch.news_at {
            self.last_news_at = Some(at);
        }
        if let Some((at, message)) = &patch.error {
            self.last_error_at = Some(*at);
            self.last_error = Some(message.clone());
        }
        if let Some(item) = &patch.latest {
            self.last_news_title = Some(item.title.clone());
            self.last_news_url = Some(item.url.clone());
        }
    }

    /// The latest news entry recorded by a cycle, if any.
    pub fn latest_news(&self) -> Option<NewsItem> {
        match (&self.last_news_title, &self.last_news_url) {
            (Some(title), Some(url)) => Some(NewsItem::new(title.clone(), url.clone())),
            _ => None,
        }
    }
}

/// A partial update for [`Stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsPatch {
    pub checks: u64,
    pub news_sent: u64,
    pub commands_processed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub checked_at: Option<DateTime<Utc>>,
    pub news_at: Option<DateTime<Utc>>,
    pub error: Option<(DateTime<Utc>, String)>,
    pub latest: Option<NewsItem>,
}

impl StatsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// One completed check at `at`.
    pub fn check(mut self, at: DateTime<Utc>) -> Self {
        self.checks += 1;
        self.checked_at = Some(at);
        self
    }

    pub fn news_sent(mut self, count: u64, at: DateTime<Utc>) -> Self {
        self.news_sent += count;
        self.news_at = Some(at);
        self
    }

    pub fn command(mut self) -> Self {
        self.commands_processed += 1;
        self
    }

    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn error(mut self, at: DateTime<Utc>, message: impl Into<String>) -> Self {
        self.error = Some((at, message.into()));
        self
    }

    pub fn latest(mut self, item: &NewsItem) -> Self {
        self.latest = Some(item.clone());
        self
    }
}
