//! Scheduling side of the balance observer
//!
//! [`BalanceWatcher`] owns the previous snapshot and drives
//! [`observe_node_balances`] on an interval until shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    balances::{observe_node_balances_with, ObserveNodeBalances},
    client::{BalanceApi, NodeApiClient},
    config::WatcherConfig,
    notifications::{NotificationOptions, NotificationSink},
    poller::{PollOutcome, Poller},
    types::{BalanceSnapshot, MinimumBalanceThresholds},
    Result, WatcherError,
};

/// Periodically polls one node's balances and delivers notifications
pub struct BalanceWatcher {
    api: Arc<dyn BalanceApi>,
    sink: Arc<dyn NotificationSink>,
    poller: Poller,
    previous: Arc<RwLock<Option<BalanceSnapshot>>>,
    active: AtomicBool,
    api_endpoint: Option<String>,
    api_token: Option<String>,
    minimum_node_balances: MinimumBalanceThresholds,
    options: NotificationOptions,
    interval: Duration,
}

impl BalanceWatcher {
    /// Create a watcher around explicit collaborators
    pub fn new(
        config: &WatcherConfig,
        api: Arc<dyn BalanceApi>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        Ok(Self {
            api,
            sink,
            poller: Poller::new(),
            previous: Arc::new(RwLock::new(None)),
            active: AtomicBool::new(config.polling.enabled),
            api_endpoint: config.node.api_endpoint.clone(),
            api_token: config.node.api_token.clone(),
            minimum_node_balances: config.minimum_balances()?,
            options: NotificationOptions {
                toast_timeout: config.toast_timeout(),
                funding_url: config.notifications.funding_url.clone(),
            },
            interval: config.poll_interval(),
        })
    }

    /// Create a watcher talking to the configured node over HTTP
    pub fn from_config(config: &WatcherConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let api = NodeApiClient::new(config.request_timeout())?;
        Self::new(config, Arc::new(api), sink)
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Turn polling on or off; takes effect at the next poll
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        info!(active, "Balance polling toggled");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Last persisted snapshot
    pub async fn latest(&self) -> Option<BalanceSnapshot> {
        self.previous.read().await.clone()
    }

    /// Run a single balance poll
    pub async fn poll_once(&self) -> PollOutcome {
        if !self.is_active() || self.api_endpoint.is_none() {
            return PollOutcome::Inactive;
        }

        let permit = match self.poller.try_acquire() {
            Some(permit) => permit,
            None => {
                debug!("Previous balance poll still in flight, skipping");
                return PollOutcome::Busy;
            }
        };

        // Read only once the permit is held so the last persisted poll is seen
        let previous = self.previous.read().await.clone();
        let slot = Arc::clone(&self.previous);

        observe_node_balances_with(
            &permit,
            ObserveNodeBalances {
                previous_state: previous.as_ref(),
                api_endpoint: self.api_endpoint.as_deref(),
                api_token: self.api_token.as_deref(),
                active: self.is_active(),
                minimum_node_balances: &self.minimum_node_balances,
                api: self.api.as_ref(),
                sink: self.sink.as_ref(),
                options: &self.options,
                update_previous_data: move |snapshot: BalanceSnapshot| async move {
                    *slot.write().await = Some(snapshot);
                },
            },
        )
        .await
    }

    /// Run a single poll and return the fetched balances
    ///
    /// Fails with [`WatcherError::NoBalances`] when the poll did not persist
    /// a fresh snapshot, for example because the node could not be reached.
    pub async fn fetch_once(&self) -> Result<BalanceSnapshot> {
        let outcome = self.poll_once().await;
        if !outcome.persisted() {
            return Err(WatcherError::no_balances(outcome.as_str()));
        }

        self.latest()
            .await
            .ok_or_else(|| WatcherError::no_balances(outcome.as_str()))
    }

    /// Poll on the configured interval until `shutdown` is cancelled
    ///
    /// The first poll runs immediately. Ticks missed while a poll was slow
    /// are skipped, not replayed.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            endpoint = self.api_endpoint.as_deref().unwrap_or("<unset>"),
            "Starting balance watcher"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let outcome = self.poll_once().await;
                    debug!(outcome = outcome.as_str(), "Scheduled balance poll");
                }
            }
        }

        info!("Balance watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockBalanceApi;
    use crate::notifications::NotificationStore;

    fn snapshot(native: &str) -> BalanceSnapshot {
        BalanceSnapshot {
            native: native.parse().unwrap(),
            ..BalanceSnapshot::default()
        }
    }

    fn config() -> WatcherConfig {
        let mut config = WatcherConfig::default();
        config.node.api_endpoint = Some("http://localhost:3001".to_string());
        config
    }

    #[tokio::test]
    async fn test_previous_snapshot_read_after_claiming_poll() {
        let persisted_elsewhere = snapshot("2000000000000000000");

        let mut api = MockBalanceApi::new();
        let returned = persisted_elsewhere.clone();
        api.expect_get_balances()
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let store = NotificationStore::new(10, 8);
        let watcher = Arc::new(
            BalanceWatcher::new(&config(), Arc::new(api), Arc::new(store.clone())).unwrap(),
        );

        // Hold the snapshot like a poll that is about to persist its result
        let mut slot = watcher.previous.write().await;
        let poll = tokio::spawn({
            let watcher = Arc::clone(&watcher);
            async move { watcher.poll_once().await }
        });

        for _ in 0..10 {
            if watcher.poller.is_in_flight() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(watcher.poller.is_in_flight());

        // A second poll backs off without touching the snapshot
        let second = tokio::time::timeout(Duration::from_secs(1), watcher.poll_once()).await;
        assert_eq!(second, Ok(PollOutcome::Busy));

        *slot = Some(persisted_elsewhere.clone());
        drop(slot);

        assert_eq!(poll.await.unwrap(), PollOutcome::Unchanged);
        assert!(store.is_empty().await);
        assert_eq!(watcher.latest().await, Some(persisted_elsewhere));
    }

    #[tokio::test]
    async fn test_fetch_once_requires_fresh_balances() {
        let mut api = MockBalanceApi::new();
        api.expect_get_balances()
            .times(1)
            .returning(|_| Err(WatcherError::node_api(503, "node is starting")));

        let store = NotificationStore::new(10, 8);
        let watcher = BalanceWatcher::new(&config(), Arc::new(api), Arc::new(store)).unwrap();

        let err = watcher.fetch_once().await.unwrap_err();
        assert_eq!(err.category(), "poll");
        assert_eq!(err.to_string(), "No balances fetched: poll outcome no_data");

        watcher.set_active(false);
        let err = watcher.fetch_once().await.unwrap_err();
        assert!(matches!(err, WatcherError::NoBalances { outcome: "inactive" }));
    }
}
