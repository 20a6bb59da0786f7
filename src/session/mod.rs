//! Session plumbing around the engine.
//!
//! - `runner`: the single-threaded tick loop and its command channel
//! - `control`: config file polling and the command console
//! - `stats`: session counters with on-disk totals

pub mod control;
pub mod runner;
pub mod stats;

pub use control::{configure_command, parse_console_line, spawn_config_watcher, spawn_console};
pub use runner::{Command, RunReport, Runner, StopReason};
pub use stats::{
    create_shared_stats, create_shared_stats_with_persistence, SessionStats, SessionStatsSnapshot,
    SharedSessionStats,
};
