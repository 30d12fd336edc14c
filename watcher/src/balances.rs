//! Balance observer: binds the generic poller to the node balance endpoint

use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

use crate::{
    client::{BalanceApi, NodeTarget},
    notifications::{handle_balance_notification, NotificationOptions, NotificationSink},
    poller::{DataFetcher, ObserveData, PollOutcome, PollPermit, Poller},
    types::{BalanceSnapshot, MinimumBalanceThresholds},
};

/// Inputs of one [`observe_node_balances`] call
pub struct ObserveNodeBalances<'a, U> {
    /// Last persisted snapshot, `None` before the first successful poll
    pub previous_state: Option<&'a BalanceSnapshot>,

    /// Node API base URL; polling never proceeds without it
    pub api_endpoint: Option<&'a str>,

    pub api_token: Option<&'a str>,

    /// Caller-side switch for polling
    pub active: bool,

    /// Floor below which the low-balance warning fires
    pub minimum_node_balances: &'a MinimumBalanceThresholds,

    pub api: &'a dyn BalanceApi,

    pub sink: &'a dyn NotificationSink,

    pub options: &'a NotificationOptions,

    /// Single writer of the caller-owned snapshot
    pub update_previous_data: U,
}

/// Fetches balances for one node, turning every failure into `None`
struct BalanceFetcher<'a> {
    api: &'a dyn BalanceApi,
    target: Option<NodeTarget>,
}

#[async_trait]
impl DataFetcher<BalanceSnapshot> for BalanceFetcher<'_> {
    async fn fetch(&self) -> Option<BalanceSnapshot> {
        let target = self.target.as_ref()?;

        match self.api.get_balances(target).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    endpoint = %target.api_endpoint,
                    category = e.category(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Failed to fetch node balances"
                );
                None
            }
        }
    }
}

/// Poll node and Safe balances once and report meaningful changes
///
/// Runs only when `active` is set and an endpoint is configured. Any field
/// change counts as different; which notifications that produces is decided
/// by [`handle_balance_notification`].
pub async fn observe_node_balances<U, UFut>(
    poller: &Poller,
    request: ObserveNodeBalances<'_, U>,
) -> PollOutcome
where
    U: FnOnce(BalanceSnapshot) -> UFut,
    UFut: Future<Output = ()>,
{
    if !request.active || request.api_endpoint.is_none() {
        return PollOutcome::Inactive;
    }

    match poller.try_acquire() {
        Some(permit) => observe_node_balances_with(&permit, request).await,
        None => {
            debug!("Previous balance poll still in flight, skipping");
            PollOutcome::Busy
        }
    }
}

/// [`observe_node_balances`] for a caller already holding the poll permit
///
/// Lets the caller read `previous_state` after claiming the permit.
pub async fn observe_node_balances_with<U, UFut>(
    permit: &PollPermit<'_>,
    request: ObserveNodeBalances<'_, U>,
) -> PollOutcome
where
    U: FnOnce(BalanceSnapshot) -> UFut,
    UFut: Future<Output = ()>,
{
    let ObserveNodeBalances {
        previous_state,
        api_endpoint,
        api_token,
        active,
        minimum_node_balances,
        api,
        sink,
        options,
        update_previous_data,
    } = request;

    let fetcher = BalanceFetcher {
        api,
        target: api_endpoint.map(|endpoint| NodeTarget::new(endpoint, api_token.map(str::to_string))),
    };

    let outcome = permit
        .observe(ObserveData {
            active: active && api_endpoint.is_some(),
            previous_data: previous_state,
            fetcher: &fetcher,
            is_data_different: |prev: Option<&BalanceSnapshot>, new: &BalanceSnapshot| {
                prev != Some(new)
            },
            notification_handler: move |new: BalanceSnapshot| async move {
                dispatch_balance_notifications(
                    previous_state,
                    &new,
                    minimum_node_balances,
                    sink,
                    options,
                )
                .await;
            },
            update_previous_data,
        })
        .await;

    debug!(outcome = outcome.as_str(), "Balance poll finished");
    outcome
}

/// Decide on and deliver the notifications for one balance transition
///
/// Delivery failures are logged and skipped so one bad send cannot hide the
/// remaining events. Returns how many notifications were delivered.
pub async fn dispatch_balance_notifications(
    prev_node_balances: Option<&BalanceSnapshot>,
    new_node_balances: &BalanceSnapshot,
    minimum_node_balances: &MinimumBalanceThresholds,
    sink: &dyn NotificationSink,
    options: &NotificationOptions,
) -> usize {
    let events = handle_balance_notification(prev_node_balances, new_node_balances, minimum_node_balances);

    let mut delivered = 0;
    for event in &events {
        match sink.send_notification(event.to_notification(options)).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(error = %e, source = %event.source(), "Failed to deliver notification"),
        }
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockBalanceApi;
    use crate::notifications::{NotificationSource, NotificationStore};
    use crate::types::TokenAmount;
    use crate::WatcherError;
    use std::sync::{Arc, Mutex};

    fn snapshot(native: &str, safe_native: &str, safe_hopr: &str) -> BalanceSnapshot {
        BalanceSnapshot {
            native: native.parse().unwrap(),
            hopr: TokenAmount::zero(),
            safe_native: safe_native.parse().unwrap(),
            safe_hopr: safe_hopr.parse().unwrap(),
        }
    }

    fn recorder() -> (
        Arc<Mutex<Vec<BalanceSnapshot>>>,
        impl FnOnce(BalanceSnapshot) -> std::future::Ready<()>,
    ) {
        let slot = Arc::new(Mutex::new(Vec::new()));
        let writer = slot.clone();
        (slot, move |snapshot: BalanceSnapshot| {
            writer.lock().unwrap().push(snapshot);
            std::future::ready(())
        })
    }

    #[tokio::test]
    async fn test_end_to_end_one_token_received() {
        let prev = snapshot("1000000000000000000", "0", "0");
        let new = snapshot("2000000000000000000", "0", "0");
        let minimum = snapshot("1000000000000", "0", "0");

        let mut api = MockBalanceApi::new();
        let returned = new.clone();
        api.expect_get_balances()
            .withf(|target| {
                target.api_endpoint == "http://localhost:3001"
                    && target.api_token.as_deref() == Some("token")
            })
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let store = NotificationStore::new(10, 8);
        let (persisted, update) = recorder();

        let outcome = observe_node_balances(
            &Poller::new(),
            ObserveNodeBalances {
                previous_state: Some(&prev),
                api_endpoint: Some("http://localhost:3001"),
                api_token: Some("token"),
                active: true,
                minimum_node_balances: &minimum,
                api: &api,
                sink: &store,
                options: &NotificationOptions::default(),
                update_previous_data: update,
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Changed);
        assert_eq!(*persisted.lock().unwrap(), vec![new]);

        let notifications = store.list().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].source, NotificationSource::Node);
        assert_eq!(notifications[0].name, "Node received 1 xDai");
    }

    #[tokio::test]
    async fn test_missing_endpoint_never_fetches() {
        let mut api = MockBalanceApi::new();
        api.expect_get_balances().times(0);

        let store = NotificationStore::new(10, 8);
        let minimum = snapshot("0", "0", "0");
        let (persisted, update) = recorder();

        let outcome = observe_node_balances(
            &Poller::new(),
            ObserveNodeBalances {
                previous_state: None,
                api_endpoint: None,
                api_token: Some("token"),
                active: true,
                minimum_node_balances: &minimum,
                api: &api,
                sink: &store,
                options: &NotificationOptions::default(),
                update_previous_data: update,
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Inactive);
        assert!(persisted.lock().unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_previous() {
        let mut api = MockBalanceApi::new();
        api.expect_get_balances()
            .times(1)
            .returning(|_| Err(WatcherError::node_api(401, "INVALID_TOKEN")));

        let store = NotificationStore::new(10, 8);
        let prev = snapshot("100", "0", "0");
        let minimum = snapshot("1000", "0", "0");
        let (persisted, update) = recorder();

        let outcome = observe_node_balances(
            &Poller::new(),
            ObserveNodeBalances {
                previous_state: Some(&prev),
                api_endpoint: Some("http://localhost:3001"),
                api_token: None,
                active: true,
                minimum_node_balances: &minimum,
                api: &api,
                sink: &store,
                options: &NotificationOptions::default(),
                update_previous_data: update,
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::NoData);
        assert!(persisted.lock().unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unchanged_persists_silently() {
        let current = snapshot("500", "0", "0");
        let minimum = snapshot("1000", "0", "0");

        let mut api = MockBalanceApi::new();
        let returned = current.clone();
        api.expect_get_balances()
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let store = NotificationStore::new(10, 8);
        let (persisted, update) = recorder();

        let outcome = observe_node_balances(
            &Poller::new(),
            ObserveNodeBalances {
                previous_state: Some(&current),
                api_endpoint: Some("http://localhost:3001"),
                api_token: None,
                active: true,
                minimum_node_balances: &minimum,
                api: &api,
                sink: &store,
                options: &NotificationOptions::default(),
                update_previous_data: update,
            },
        )
        .await;

        // Below the minimum, but identical snapshots never reach the dispatcher
        assert_eq!(outcome, PollOutcome::Unchanged);
        assert_eq!(*persisted.lock().unwrap(), vec![current]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_busy_poller_never_fetches() {
        let mut api = MockBalanceApi::new();
        api.expect_get_balances().times(0);

        let store = NotificationStore::new(10, 8);
        let minimum = snapshot("0", "0", "0");
        let (persisted, update) = recorder();

        let poller = Poller::new();
        let _permit = poller.try_acquire().unwrap();

        let outcome = observe_node_balances(
            &poller,
            ObserveNodeBalances {
                previous_state: None,
                api_endpoint: Some("http://localhost:3001"),
                api_token: None,
                active: true,
                minimum_node_balances: &minimum,
                api: &api,
                sink: &store,
                options: &NotificationOptions::default(),
                update_previous_data: update,
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Busy);
        assert!(persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_counts_deliveries() {
        let store = NotificationStore::new(10, 8);
        let delivered = dispatch_balance_notifications(
            Some(&snapshot("100", "0", "0")),
            &snapshot("200", "5", "7"),
            &snapshot("10", "0", "0"),
            &store,
            &NotificationOptions::default(),
        )
        .await;

        assert_eq!(delivered, 3);
        assert_eq!(store.unseen_count().await, 3);
    }
}
