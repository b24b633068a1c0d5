// src/pipeline/schedule.rs

//! The two long-running loops: timed checks and command polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::Result;
use crate::pipeline::commands::CommandHandler;
use crate::pipeline::watch::{CycleOutcome, Watcher};
use crate::services::Messenger;

/// Drives the watcher and the command handler until shutdown.
pub struct Scheduler {
    watcher: Arc<Watcher>,
    handler: Arc<CommandHandler>,
    messenger: Arc<dyn Messenger>,
    news_interval: Duration,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        watcher: Arc<Watcher>,
        handler: Arc<CommandHandler>,
        messenger: Arc<dyn Messenger>,
        news_interval: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            watcher,
            handler,
            messenger,
            news_interval,
            poll_interval,
        }
    }

    /// Start both loops. The first check runs immediately.
    pub fn spawn(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let checks = tokio::spawn(check_loop(Arc::clone(&self.watcher), self.news_interval));
        let commands = tokio::spawn(command_loop(
            Arc::clone(&self.messenger),
            Arc::clone(&self.handler),
            self.poll_interval,
        ));
        (checks, commands)
    }

    /// Run until Ctrl-C, then stop both loops.
    pub async fn run(self) -> Result<()> {
        log::info!(
            "Watching every {}s, polling commands every {}s",
            self.news_interval.as_secs(),
            self.poll_interval.as_secs()
        );
        let (mut checks, mut commands) = self.spawn();

        let result = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                log::info!("Shutdown requested");
                signal.map_err(Into::into)
            }
            joined = &mut checks => {
                log::error!("Check loop exited: {:?}", joined);
                Ok(())
            }
            joined = &mut commands => {
                log::error!("Command loop exited: {:?}", joined);
                Ok(())
            }
        };

        checks.abort();
        commands.abort();
        result
    }
}

async fn check_loop(watcher: Arc<Watcher>, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        watcher.schedule_next_check(period);
        match watcher.run_cycle().await {
            Ok(CycleOutcome::FetchFailed(reason)) => log::warn!("Check skipped: {}", reason),
            Ok(outcome) => log::debug!("Check finished: {:?}", outcome),
            Err(e) => log::error!("Check failed: {}", e),
        }
    }
}

async fn command_loop(
    messenger: Arc<dyn Messenger>,
    handler: Arc<CommandHandler>,
    period: Duration,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match messenger.receive_pending_commands().await {
            Ok(commands) => {
                for command in &commands {
                    handler.handle(command).await;
                }
            }
            Err(e) => log::warn!("Polling commands failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::Config;
    use crate::storage::Store;
    use crate::testing::{RecordingMessenger, StaticFetcher, listing_page};

    #[tokio::test]
    async fn test_loops_check_and_answer() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(Store::open(tmp.path()).await);
        let fetcher = Arc::new(StaticFetcher::new());
        let messenger = Arc::new(RecordingMessenger::new());
        fetcher.set_page(listing_page(&[(
            "Mobilità del personale docente",
            "https://example.gov.it/mobilita",
        )]));
        messenger.push_command(8, "/help");

        let watcher = Arc::new(
            Watcher::new(
                &Config::default(),
                "https://example.gov.it/news",
                Arc::clone(&store),
                fetcher.clone(),
                messenger.clone(),
            )
            .unwrap(),
        );
        let handler = Arc::new(CommandHandler::new(
            Arc::clone(&watcher),
            messenger.clone(),
            Duration::from_secs(1800),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&watcher),
            handler,
            messenger.clone(),
            Duration::from_millis(20),
            Duration::from_millis(10),
        );

        let (checks, commands) = scheduler.spawn();
        time::sleep(Duration::from_millis(150)).await;
        checks.abort();
        commands.abort();

        assert!(fetcher.calls() >= 2);
        assert!(store.is_seen("https://example.gov.it/mobilita").await);
        assert_eq!(messenger.sent_to(8).len(), 1);
        assert!(store.stats().await.total_checks >= 2);
        assert!(watcher.next_timed_check().is_some());
    }
}
