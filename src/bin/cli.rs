//! MiM Watcher CLI
//!
//! Runs the watcher bot, or one of its maintenance commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use mim_watcher::{
    config::{self, POLL_INTERVAL, SOURCE_URL},
    error::Result,
    models::{Config, StatsPatch},
    pipeline::{CommandHandler, CycleOutcome, Scheduler, Watcher},
    services::{HttpFetcher, ItemExtractor, Messenger, PageFetcher, TelegramClient},
    storage::Store,
    utils::format_timestamp,
};

/// MiM Watcher - USR Lombardia news notifier
#[derive(Parser, Debug)]
#[command(
    name = "mim-watcher",
    version,
    about = "Telegram notifier for USR Lombardia news"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Data directory (overrides storage.data_dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Default)]
enum Command {
    /// Watch the page and answer commands until Ctrl-C
    #[default]
    Run,

    /// Run a single check cycle and exit
    Check,

    /// Print the items currently on the page without touching stored state
    Preview,

    /// Validate configuration
    Validate,

    /// Show stored subscribers, seen items and stats
    Info,

    /// Forget every seen item
    ResetSeen,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or_default() {
        Command::Validate => validate(&cli.config)?,

        Command::Preview => {
            let config = config::load_config(&cli.config)?;
            preview(&config).await?;
        }

        Command::Run => {
            log::info!("MiM Watcher starting...");
            let (config, store) = open(&cli.config, cli.data_dir.clone()).await?;
            store
                .record_stats(StatsPatch::new().started(Utc::now()))
                .await?;

            let (watcher, messenger) = build_watcher(&config, Arc::clone(&store))?;
            let interval = config.schedule.news_interval();
            let handler = Arc::new(CommandHandler::new(
                Arc::clone(&watcher),
                Arc::clone(&messenger),
                interval,
            ));

            Scheduler::new(watcher, handler, messenger, interval, POLL_INTERVAL)
                .run()
                .await?;
        }

        Command::Check => {
            let (config, store) = open(&cli.config, cli.data_dir.clone()).await?;
            let (watcher, _) = build_watcher(&config, Arc::clone(&store))?;
            match watcher.run_cycle().await? {
                CycleOutcome::FetchFailed(reason) => log::warn!("Page unreachable: {}", reason),
                CycleOutcome::NoItems => log::warn!("No news found on the page"),
                CycleOutcome::Completed(report) => log::info!(
                    "{} items on page, {} new, {} sent, {} failed",
                    report.extracted,
                    report.new_items,
                    report.sent,
                    report.failed
                ),
            }
        }

        Command::Info => {
            let (_, store) = open(&cli.config, cli.data_dir.clone()).await?;
            let summary = store.summary().await;
            let stats = store.stats().await;
            let never = || "never".to_string();

            log::info!("Subscribers: {}", summary.subscriber_count);
            log::info!("Seen items: {}", summary.seen_count);
            log::info!(
                "Last seen: {}",
                summary.last_seen.unwrap_or_else(|| "none".to_string())
            );
            if let Some(item) = stats.latest_news() {
                log::info!("Latest news: {} ({})", item.title, item.url);
            }
            log::info!("Started: {}", format_timestamp(stats.started_at));
            log::info!("Checks: {}", stats.total_checks);
            log::info!("News sent: {}", stats.total_news_sent);
            log::info!("Commands processed: {}", stats.total_commands_processed);
            log::info!(
                "Last check: {}",
                stats.last_check_at.map_or_else(never, format_timestamp)
            );
            if let (Some(at), Some(error)) = (stats.last_error_at, stats.last_error) {
                log::info!("Last error: {} ({})", error, format_timestamp(at));
            }
        }

        Command::ResetSeen => {
            let (_, store) = open(&cli.config, cli.data_dir.clone()).await?;
            let removed = store.reset_seen().await?;
            log::info!("Forgot {} seen items", removed);
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Load the config and open the store in its data directory.
async fn open(config_path: &Path, data_dir: Option<PathBuf>) -> Result<(Config, Arc<Store>)> {
    let config = config::load_config(config_path)?;
    let data_dir = data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    log::info!("Data directory: {}", data_dir.display());
    let store = Arc::new(Store::open(&data_dir).await);
    Ok((config, store))
}

fn build_watcher(
    config: &Config,
    store: Arc<Store>,
) -> Result<(Arc<Watcher>, Arc<dyn Messenger>)> {
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramClient::new(&config::bot_token()?)?);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new()?);
    let watcher = Watcher::new(config, SOURCE_URL, store, fetcher, Arc::clone(&messenger))?;
    Ok((Arc::new(watcher), messenger))
}

async fn preview(config: &Config) -> Result<()> {
    let extractor = ItemExtractor::new(&config.filters)?;
    let html = HttpFetcher::new()?.fetch(SOURCE_URL).await?;
    let items = extractor.extract(&html);

    log::info!("{} items on {}", items.len(), SOURCE_URL);
    for (i, item) in items.iter().enumerate() {
        let date = item
            .date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "--/--/----".to_string());
        println!("{:>2}. [{}] {}\n    {}", i + 1, date, item.title, item.url);
    }
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    log::info!("Validating configuration...");

    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        log::warn!("{} not found, checking defaults", path.display());
        Config::default()
    };
    config::apply_env_overrides(&mut config)?;

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    log::info!("✓ Config OK");

    match config::bot_token() {
        Ok(_) => log::info!("✓ {} is set", config::TOKEN_ENV),
        Err(e) => log::warn!("{}", e),
    }

    log::info!("All validations passed!");
    Ok(())
}
