//! ServiceX: a modular, database-driven IRC bot.
//!
//! All connection parameters, channel lists, and plugin enablement live
//! in a SQLite database; the bot is reconfigured at runtime through IRC
//! commands that write back to that database.

pub mod command;
pub mod db;
pub mod network;
pub mod output;
pub mod plugin;
pub mod plugins;
pub mod scheduler;
pub mod session;
pub mod timefmt;

/// Version string reported in CTCP VERSION replies and the help text.
pub const VERSION_REPLY: &str = concat!("ServiceX ", env!("CARGO_PKG_VERSION"), " (rust/tokio)");
