//! Durable watcher state.
//!
//! Three independent JSON documents live in the data directory:
//!
//! ```text
//! data/
//! ├── subscribers.json      # [{ "id": 123, "subscribed_at": "..." }, ...]
//! ├── seen.json             # ["https://...", ...] newest first
//! └── stats.json            # { "started_at": "...", "total_checks": 0, ... }
//! ```
//!
//! [`Store`] is the only writer. Each mutation holds the store lock while it
//! writes the affected file, and only commits the change in memory once the
//! write succeeded.

pub mod local;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChatId, Stats, StatsPatch, Subscriber};

pub use local::JsonFile;

/// File locations for the three record sets.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub subscribers: PathBuf,
    pub seen: PathBuf,
    pub stats: PathBuf,
}

impl StorePaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            subscribers: dir.join("subscribers.json"),
            seen: dir.join("seen.json"),
            stats: dir.join("stats.json"),
        }
    }
}

/// Read-only snapshot used by `/help`, `/stats` and the `info` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub subscriber_count: usize,
    pub seen_count: usize,
    pub last_seen: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    subscribers: BTreeMap<ChatId, Subscriber>,
    /// Newest first
    seen: Vec<String>,
    seen_index: HashSet<String>,
    stats: Stats,
}

/// Shared, file-backed store for subscribers, seen items and stats.
#[derive(Debug)]
pub struct Store {
    subscribers_file: JsonFile,
    seen_file: JsonFile,
    stats_file: JsonFile,
    state: Mutex<State>,
}

impl Store {
    /// Restore all record sets. Missing or corrupt files start empty.
    pub async fn load(paths: StorePaths) -> Self {
        let subscribers_file = JsonFile::new(paths.subscribers);
        let seen_file = JsonFile::new(paths.seen);
        let stats_file = JsonFile::new(paths.stats);

        let subscribers: Vec<Subscriber> = subscribers_file.read_or_default().await;
        let seen_raw: Vec<String> = seen_file.read_or_default().await;
        let stats: Stats = stats_file.read_or_default().await;

        let mut seen = Vec::with_capacity(seen_raw.len());
        let mut seen_index = HashSet::with_capacity(seen_raw.len());
        for key in seen_raw {
            if seen_index.insert(key.clone()) {
                seen.push(key);
            }
        }

        let subscribers: BTreeMap<ChatId, Subscriber> =
            subscribers.into_iter().map(|s| (s.id, s)).collect();

        log::info!(
            "Loaded {} subscribers and {} seen items",
            subscribers.len(),
            seen.len()
        );

        Self {
            subscribers_file,
            seen_file,
            stats_file,
            state: Mutex::new(State {
                subscribers,
                seen,
                seen_index,
                stats,
            }),
        }
    }

    /// Store rooted at `dir` with the standard file names.
    pub async fn open(dir: impl AsRef<Path>) -> Self {
        Self::load(StorePaths::in_dir(dir)).await
    }

    async fn flush<T: serde::Serialize + ?Sized>(file: &JsonFile, value: &T) -> Result<()> {
        file.write(value).await.inspect_err(|e| {
            log::error!("STATE NOT SAVED, change discarded: {}", e);
        })
    }

    // --- Subscribers ---

    /// Add a subscriber. Returns `false` if it was already present.
    pub async fn add_subscriber(&self, id: ChatId) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.subscribers.contains_key(&id) {
            return Ok(false);
        }

        let mut next = state.subscribers.clone();
        next.insert(id, Subscriber::new(id));
        Self::flush(&self.subscribers_file, &next.values().collect::<Vec<_>>()).await?;
        state.subscribers = next;

        log::info!("Subscriber added: {}", id);
        Ok(true)
    }

    /// Remove a subscriber. Returns `false` if it was not present.
    pub async fn remove_subscriber(&self, id: ChatId) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.subscribers.contains_key(&id) {
            return Ok(false);
        }

        let mut next = state.subscribers.clone();
        next.remove(&id);
        Self::flush(&self.subscribers_file, &next.values().collect::<Vec<_>>()).await?;
        state.subscribers = next;

        log::info!("Subscriber removed: {}", id);
        Ok(true)
    }

    /// Current subscriber ids in ascending order.
    pub async fn list_subscribers(&self) -> Vec<ChatId> {
        self.state.lock().await.subscribers.keys().copied().collect()
    }

    pub async fn is_subscriber(&self, id: ChatId) -> bool {
        self.state.lock().await.subscribers.contains_key(&id)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    // --- Seen items ---

    /// Record an item identifier. Returns `false` if it was already seen.
    pub async fn mark_seen(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.seen_index.contains(key) {
            return Ok(false);
        }

        let mut next = Vec::with_capacity(state.seen.len() + 1);
        next.push(key.to_string());
        next.extend(state.seen.iter().cloned());
        Self::flush(&self.seen_file, &next).await?;

        state.seen = next;
        state.seen_index.insert(key.to_string());
        Ok(true)
    }

    pub async fn is_seen(&self, key: &str) -> bool {
        self.state.lock().await.seen_index.contains(key)
    }

    /// The most recently recorded identifier.
    pub async fn last_seen(&self) -> Option<String> {
        self.state.lock().await.seen.first().cloned()
    }

    pub async fn seen_count(&self) -> usize {
        self.state.lock().await.seen.len()
    }

    /// Forget every seen item. Returns how many were removed.
    pub async fn reset_seen(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.seen.len();

        Self::flush(&self.seen_file, &Vec::<String>::new()).await?;
        state.seen.clear();
        state.seen_index.clear();

        log::info!("Seen-set reset, {} items forgotten", removed);
        Ok(removed)
    }

    // --- Stats ---

    /// Merge `patch` into the stats record and return the result.
    pub async fn record_stats(&self, patch: StatsPatch) -> Result<Stats> {
        let mut state = self.state.lock().await;

        let mut next = state.stats.clone();
        next.apply(&patch);
        Self::flush(&self.stats_file, &next).await?;
        state.stats = next.clone();

        Ok(next)
    }

    pub async fn stats(&self) -> Stats {
        self.state.lock().await.stats.clone()
    }

    pub async fn summary(&self) -> StoreSummary {
        let state = self.state.lock().await;
        StoreSummary {
            subscriber_count: state.subscribers.len(),
            seen_count: state.seen.len(),
            last_seen: state.seen.first().cloned(),
        }
    }
}
