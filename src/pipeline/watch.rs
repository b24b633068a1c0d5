// src/pipeline/watch.rs

//! Change detection and notification.
//!
//! One cycle fetches the page, extracts its items, and for every item whose
//! identifier is not in the seen-set: records it as seen, then sends it to
//! the current subscribers. Marking happens before sending, so a crash mid
//! broadcast can under-deliver an item but never deliver it twice.

use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{ChatId, Config, NewsItem, StatsPatch};
use crate::pipeline::messages;
use crate::services::{ItemExtractor, Messenger, PageFetcher};
use crate::storage::Store;
use crate::utils::truncate;

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Valid entries on the page
    pub extracted: usize,
    /// Entries not seen before
    pub new_items: usize,
    /// Successful sends across all new items
    pub sent: u64,
    /// Failed sends across all new items
    pub failed: u64,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The page could not be retrieved; nothing changed besides stats
    FetchFailed(String),
    /// The page had no valid entry
    NoItems,
    Completed(CycleReport),
}

/// Runs check cycles against the shared store.
pub struct Watcher {
    store: Arc<Store>,
    fetcher: Arc<dyn PageFetcher>,
    messenger: Arc<dyn Messenger>,
    extractor: ItemExtractor,
    source_url: String,
    max_concurrent: usize,
    /// Held for the whole of a cycle; timer and `/force` cycles queue on it.
    cycle_lock: Mutex<()>,
    /// When the timer loop starts its next cycle. Forced cycles leave it alone.
    next_timed_check: SyncMutex<Option<DateTime<Utc>>>,
}

impl Watcher {
    pub fn new(
        config: &Config,
        source_url: impl Into<String>,
        store: Arc<Store>,
        fetcher: Arc<dyn PageFetcher>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            fetcher,
            messenger,
            extractor: ItemExtractor::new(&config.filters)?,
            source_url: source_url.into(),
            max_concurrent: config.delivery.max_concurrent.max(1),
            cycle_lock: Mutex::new(()),
            next_timed_check: SyncMutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Called by the timer loop on each tick with its period.
    pub fn schedule_next_check(&self, period: Duration) {
        let next = TimeDelta::from_std(period)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        *self
            .next_timed_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn next_timed_check(&self) -> Option<DateTime<Utc>> {
        *self
            .next_timed_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one fetch → extract → detect → notify pass.
    ///
    /// Transport failures are reported as [`CycleOutcome::FetchFailed`];
    /// `Err` means durable state could not be written.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let _guard = self.cycle_lock.lock().await;
        log::info!("Checking {}", self.source_url);

        let html = match self.fetcher.fetch(&self.source_url).await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Page fetch failed, retrying next cycle: {}", e);
                let now = Utc::now();
                self.store
                    .record_stats(StatsPatch::new().check(now).error(now, e.to_string()))
                    .await?;
                return Ok(CycleOutcome::FetchFailed(e.to_string()));
            }
        };

        let items = self.extractor.extract(&html);
        if items.is_empty() {
            log::warn!("No valid news entry found on {}", self.source_url);
            self.store
                .record_stats(StatsPatch::new().check(Utc::now()))
                .await?;
            return Ok(CycleOutcome::NoItems);
        }

        let mut report = CycleReport {
            extracted: items.len(),
            ..CycleReport::default()
        };

        let mut latest: Option<&NewsItem> = None;
        for item in &items {
            let key = item.key();
            if self.store.is_seen(&key).await {
                continue;
            }
            if !self.store.mark_seen(&key).await? {
                continue;
            }

            report.new_items += 1;
            latest.get_or_insert(item);
            log::info!("New item: {}", truncate(&item.title, 80));

            let (sent, failed) = self.broadcast(item).await;
            report.sent += sent;
            report.failed += failed;
        }

        let now = Utc::now();
        let mut patch = StatsPatch::new().check(now);
        if let Some(item) = latest {
            patch = patch.news_sent(report.sent, now).latest(item);
        }
        self.store.record_stats(patch).await?;

        if report.new_items == 0 {
            log::info!("No news ({} items on page, all seen)", report.extracted);
        } else {
            log::info!(
                "{} new items, {} messages sent, {} failed",
                report.new_items,
                report.sent,
                report.failed
            );
        }
        Ok(CycleOutcome::Completed(report))
    }

    /// Send `item` to every current subscriber. Returns (sent, failed).
    async fn broadcast(&self, item: &NewsItem) -> (u64, u64) {
        let subscribers = self.store.list_subscribers().await;
        if subscribers.is_empty() {
            log::info!("No subscribers to notify");
            return (0, 0);
        }

        let text = messages::news_notification(item, Local::now());
        let text = text.as_str();
        let results: Vec<(ChatId, Result<()>)> = stream::iter(subscribers)
            .map(move |chat_id| async move {
                (chat_id, self.messenger.send_message(chat_id, text).await)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut sent = 0;
        let mut failed = 0;
        for (chat_id, result) in results {
            match result {
                Ok(()) => {
                    sent += 1;
                    log::debug!("Notified {}", chat_id);
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("Failed to notify {}: {}", chat_id, e);
                }
            }
        }
        (sent, failed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::testing::{RecordingMessenger, StaticFetcher, listing_page};

    const URL: &str = "https://example.gov.it/news";

    struct Fixture {
        _tmp: TempDir,
        store: Arc<Store>,
        fetcher: Arc<StaticFetcher>,
        messenger: Arc<RecordingMessenger>,
        watcher: Arc<Watcher>,
    }

    async fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(Store::open(tmp.path()).await);
        let fetcher = Arc::new(StaticFetcher::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let watcher = Arc::new(
            Watcher::new(
                &Config::default(),
                URL,
                Arc::clone(&store),
                fetcher.clone(),
                messenger.clone(),
            )
            .unwrap(),
        );
        Fixture {
            _tmp: tmp,
            store,
            fetcher,
            messenger,
            watcher,
        }
    }

    const A: (&str, &str) = ("Primo avviso ai docenti", "https://example.gov.it/a");
    const B: (&str, &str) = ("Secondo avviso alle scuole", "https://example.gov.it/b");
    const C: (&str, &str) = ("Terzo avviso sulle graduatorie", "https://example.gov.it/c");

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let f = fixture().await;

        f.fetcher.set_page(listing_page(&[A, B]));
        let outcome = f.watcher.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Completed(CycleReport { new_items: 2, sent: 0, .. })
        ));
        assert!(f.store.is_seen(A.1).await);
        assert!(f.store.is_seen(B.1).await);
        assert!(f.messenger.sent().is_empty());

        f.store.add_subscriber(1).await.unwrap();

        f.fetcher.set_page(listing_page(&[A, B, C]));
        f.watcher.run_cycle().await.unwrap();

        let sent = f.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1);
        assert!(sent[0].1.contains(C.0));
        assert_eq!(f.store.seen_count().await, 3);
    }

    #[tokio::test]
    async fn test_latest_news_is_top_of_batch() {
        let f = fixture().await;

        f.fetcher.set_page(listing_page(&[B, A]));
        f.watcher.run_cycle().await.unwrap();
        let latest = f.store.stats().await.latest_news().unwrap();
        assert_eq!(latest.title, B.0);
        assert_eq!(latest.url, B.1);

        // A cycle without news keeps the previous record.
        f.watcher.run_cycle().await.unwrap();
        assert_eq!(f.store.stats().await.latest_news().unwrap().url, B.1);

        f.fetcher.set_page(listing_page(&[C, B, A]));
        f.watcher.run_cycle().await.unwrap();
        assert_eq!(f.store.stats().await.latest_news().unwrap().url, C.1);
    }

    #[tokio::test]
    async fn test_forced_cycle_keeps_timer_schedule() {
        let f = fixture().await;
        assert_eq!(f.watcher.next_timed_check(), None);

        f.watcher.schedule_next_check(Duration::from_secs(600));
        let scheduled = f.watcher.next_timed_check().unwrap();
        let ahead = scheduled - Utc::now();
        assert!(ahead.num_seconds() > 590 && ahead.num_seconds() <= 600);

        f.fetcher.set_page(listing_page(&[A]));
        f.watcher.run_cycle().await.unwrap();
        assert_eq!(f.watcher.next_timed_check(), Some(scheduled));
    }

    #[tokio::test]
    async fn test_repeated_cycle_is_idempotent() {
        let f = fixture().await;
        f.store.add_subscriber(1).await.unwrap();
        f.store.add_subscriber(2).await.unwrap();
        f.fetcher.set_page(listing_page(&[A, B]));

        f.watcher.run_cycle().await.unwrap();
        assert_eq!(f.messenger.sent().len(), 4);
        let seen_before = f.store.seen_count().await;

        let outcome = f.watcher.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Completed(CycleReport { new_items: 0, sent: 0, .. })
        ));
        assert_eq!(f.messenger.sent().len(), 4);
        assert_eq!(f.store.seen_count().await, seen_before);
    }

    #[tokio::test]
    async fn test_no_duplicate_sends_across_cycles() {
        let f = fixture().await;
        f.store.add_subscriber(10).await.unwrap();
        f.store.add_subscriber(20).await.unwrap();

        for page in [vec![A], vec![A, B], vec![B, A], vec![C, B, A], vec![C]] {
            f.fetcher.set_page(listing_page(&page));
            f.watcher.run_cycle().await.unwrap();
        }

        let mut pairs: Vec<(ChatId, String)> = f
            .messenger
            .sent()
            .into_iter()
            .map(|(chat, text)| {
                let url = [A, B, C]
                    .iter()
                    .find(|(_, url)| text.contains(url))
                    .map(|(_, url)| url.to_string())
                    .unwrap();
                (chat, url)
            })
            .collect();
        let total = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(total, 6);
        assert_eq!(pairs.len(), 6);
    }

    #[tokio::test]
    async fn test_subscriber_failure_does_not_block_others() {
        let f = fixture().await;
        f.store.add_subscriber(1).await.unwrap();
        f.store.add_subscriber(2).await.unwrap();
        f.store.add_subscriber(3).await.unwrap();
        f.messenger.fail_for(2);
        f.fetcher.set_page(listing_page(&[A]));

        let outcome = f.watcher.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Completed(CycleReport { new_items: 1, sent: 2, failed: 1, .. })
        ));
        assert!(f.store.is_seen(A.1).await);

        let mut recipients: Vec<ChatId> = f.messenger.sent().into_iter().map(|(c, _)| c).collect();
        recipients.sort();
        assert_eq!(recipients, vec![1, 3]);

        // The failed subscriber is not retried for the same item.
        f.watcher.run_cycle().await.unwrap();
        assert_eq!(f.messenger.sent().len(), 2);
        assert_eq!(f.store.stats().await.total_news_sent, 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_changes_only_stats() {
        let f = fixture().await;
        f.store.add_subscriber(1).await.unwrap();
        f.fetcher.fail_with("connection refused");

        let outcome = f.watcher.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::FetchFailed(_)));
        assert_eq!(f.store.seen_count().await, 0);
        assert!(f.messenger.sent().is_empty());

        let stats = f.store.stats().await;
        assert_eq!(stats.total_checks, 1);
        assert!(stats.last_error.unwrap().contains("connection refused"));
        assert!(stats.last_error_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_page_records_check() {
        let f = fixture().await;
        f.fetcher.set_page("<html><body><p>Manutenzione</p></body></html>");

        let outcome = f.watcher.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoItems);
        let stats = f.store.stats().await;
        assert_eq!(stats.total_checks, 1);
        assert!(stats.last_check_at.is_some());
        assert!(stats.last_news_at.is_none());
    }

    #[tokio::test]
    async fn test_seen_survives_restart_mid_broadcast() {
        // Simulates a crash after mark_seen: the item is on disk as seen,
        // so a restarted watcher does not send it again.
        let tmp = TempDir::new().unwrap();
        {
            let store = Store::open(tmp.path()).await;
            store.add_subscriber(1).await.unwrap();
            store.mark_seen(A.1).await.unwrap();
        }

        let store = Arc::new(Store::open(tmp.path()).await);
        let fetcher = Arc::new(StaticFetcher::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let watcher = Watcher::new(
            &Config::default(),
            URL,
            Arc::clone(&store),
            fetcher.clone(),
            messenger.clone(),
        )
        .unwrap();

        fetcher.set_page(listing_page(&[A, B]));
        watcher.run_cycle().await.unwrap();

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains(B.1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cycles_never_overlap() {
        let f = fixture().await;
        f.store.add_subscriber(1).await.unwrap();
        f.fetcher.set_page(listing_page(&[A, B]));
        f.fetcher.set_delay(Duration::from_millis(50));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let watcher = Arc::clone(&f.watcher);
            handles.push(tokio::spawn(async move { watcher.run_cycle().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(f.fetcher.max_in_flight(), 1);
        assert_eq!(f.fetcher.calls(), 4);
        assert_eq!(f.messenger.sent().len(), 2);
        assert_eq!(f.store.stats().await.total_checks, 4);
    }
}
