//! # HOPR Watcher
//!
//! Watches a HOPR node and its Safe for balance changes. Each poll fetches
//! the node's balances, compares them with the previous snapshot and emits
//! notifications for received funds or a native balance that dropped below
//! the configured minimum.

pub mod balances;
pub mod client;
pub mod config;
pub mod error;
pub mod notifications;
pub mod poller;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use balances::{
    dispatch_balance_notifications, observe_node_balances, observe_node_balances_with,
    ObserveNodeBalances,
};
pub use client::{BalanceApi, NodeApiClient, NodeTarget};
pub use config::WatcherConfig;
pub use error::{Result, WatcherError};
pub use notifications::{
    handle_balance_notification, BalanceEvent, NotificationEvent, NotificationOptions,
    NotificationSink, NotificationSource, NotificationStore, Severity,
};
pub use poller::{observe_data, DataFetcher, FnFetcher, ObserveData, PollOutcome, PollPermit, Poller};
pub use types::{format_units, BalanceSnapshot, MinimumBalanceThresholds, TokenAmount};
pub use watcher::BalanceWatcher;

/// Current version of the watcher
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
