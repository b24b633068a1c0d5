//! Watcher operations.
//!
//! - `Watcher::run_cycle`: Fetch the page, detect new items, notify subscribers
//! - `CommandHandler::handle`: Answer one chat command
//! - `Scheduler::run`: Drive both on timers until shutdown

pub mod commands;
pub mod messages;
pub mod schedule;
pub mod watch;

pub use commands::{Command, CommandHandler};
pub use schedule::Scheduler;
pub use watch::{CycleOutcome, CycleReport, Watcher};
