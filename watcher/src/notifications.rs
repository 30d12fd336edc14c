//! Balance notification decisions and delivery
//!
//! [`handle_balance_notification`] is a pure function from a balance
//! transition to the events worth telling the operator about. Turning those
//! events into user-facing [`NotificationEvent`]s and delivering them is kept
//! separate so the decision logic can be tested on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{BalanceSnapshot, MinimumBalanceThresholds, TokenAmount, HOPR_SYMBOL, NATIVE_SYMBOL};
use crate::Result;

/// Where a notification originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSource {
    Node,
    Safe,
}

impl NotificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSource::Node => "node",
            NotificationSource::Safe => "safe",
        }
    }
}

impl std::fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// A balance transition worth reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceEvent {
    /// The node's native balance fell below the configured minimum
    NativeBalanceTooLow {
        balance: TokenAmount,
        minimum: TokenAmount,
    },

    /// The node received native tokens
    NodeNativeReceived(TokenAmount),

    /// The Safe received native tokens
    SafeNativeReceived(TokenAmount),

    /// The Safe received wrapped HOPR tokens
    SafeHoprReceived(TokenAmount),
}

/// Presentation settings applied when an event becomes a notification
#[derive(Debug, Clone, Default)]
pub struct NotificationOptions {
    /// Lifetime of balance-increase toasts
    pub toast_timeout: Option<Duration>,

    /// Page linked from the low-balance warning
    pub funding_url: Option<String>,
}

impl BalanceEvent {
    pub fn source(&self) -> NotificationSource {
        match self {
            BalanceEvent::NativeBalanceTooLow { .. } | BalanceEvent::NodeNativeReceived(_) => {
                NotificationSource::Node
            }
            BalanceEvent::SafeNativeReceived(_) | BalanceEvent::SafeHoprReceived(_) => {
                NotificationSource::Safe
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            BalanceEvent::NativeBalanceTooLow { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Human readable message with amounts formatted losslessly
    pub fn message(&self) -> String {
        match self {
            BalanceEvent::NativeBalanceTooLow { balance, minimum } => format!(
                "Node {} balance is too low: {} {}, at least {} {} is required",
                NATIVE_SYMBOL,
                balance.formatted(),
                NATIVE_SYMBOL,
                minimum.formatted(),
                NATIVE_SYMBOL,
            ),
            BalanceEvent::NodeNativeReceived(delta) => {
                format!("Node received {} {}", delta.formatted(), NATIVE_SYMBOL)
            }
            BalanceEvent::SafeNativeReceived(delta) => {
                format!("Safe received {} {}", delta.formatted(), NATIVE_SYMBOL)
            }
            BalanceEvent::SafeHoprReceived(delta) => {
                format!("Safe received {} {}", delta.formatted(), HOPR_SYMBOL)
            }
        }
    }

    /// Build the user-facing notification for this event
    ///
    /// Warnings stay until dismissed and carry the funding link; increases
    /// use the configured toast timeout.
    pub fn to_notification(&self, options: &NotificationOptions) -> NotificationEvent {
        let (url, timeout) = match self {
            BalanceEvent::NativeBalanceTooLow { .. } => (options.funding_url.clone(), None),
            _ => (None, options.toast_timeout),
        };

        NotificationEvent::new(self.source(), self.severity(), self.message(), url, timeout)
    }
}

/// Decide which balance notifications a transition produces
///
/// A native balance under the minimum is reported alone and suppresses
/// everything else. Without a previous snapshot there is no baseline, so
/// nothing else is reported. Otherwise each of the node native, Safe native
/// and Safe HOPR balances is checked independently and every increase yields
/// one event carrying the exact base-unit delta. Decreases are never
/// reported.
pub fn handle_balance_notification(
    prev_node_balances: Option<&BalanceSnapshot>,
    new_node_balances: &BalanceSnapshot,
    minimum_node_balances: &MinimumBalanceThresholds,
) -> Vec<BalanceEvent> {
    if new_node_balances.native < minimum_node_balances.native {
        return vec![BalanceEvent::NativeBalanceTooLow {
            balance: new_node_balances.native.clone(),
            minimum: minimum_node_balances.native.clone(),
        }];
    }

    let prev = match prev_node_balances {
        Some(prev) => prev,
        None => return Vec::new(),
    };

    let mut events = Vec::new();

    if let Some(delta) = increase(&prev.native, &new_node_balances.native) {
        events.push(BalanceEvent::NodeNativeReceived(delta));
    }

    if let Some(delta) = increase(&prev.safe_native, &new_node_balances.safe_native) {
        events.push(BalanceEvent::SafeNativeReceived(delta));
    }

    if let Some(delta) = increase(&prev.safe_hopr, &new_node_balances.safe_hopr) {
        events.push(BalanceEvent::SafeHoprReceived(delta));
    }

    events
}

fn increase(prev: &TokenAmount, new: &TokenAmount) -> Option<TokenAmount> {
    if new > prev {
        new.checked_sub(prev)
    } else {
        None
    }
}

/// A single user-facing alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub source: NotificationSource,
    pub severity: Severity,
    pub name: String,
    pub url: Option<String>,
    pub timeout: Option<Duration>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        source: NotificationSource,
        severity: Severity,
        name: String,
        url: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            severity,
            name,
            url,
            timeout,
            seen: false,
            created_at: Utc::now(),
        }
    }
}

/// Receives notifications; delivery is fire-and-forget from the caller's side
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_notification(&self, notification: NotificationEvent) -> Result<()>;
}

/// In-memory notification store with toast fan-out
///
/// Keeps the most recent notifications (oldest dropped first) and forwards
/// every new one to toast subscribers.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    history: Arc<RwLock<VecDeque<NotificationEvent>>>,
    max_history: usize,
    toast_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationStore {
    pub fn new(max_history: usize, channel_capacity: usize) -> Self {
        let (toast_tx, _) = broadcast::channel(channel_capacity.max(1));

        Self {
            history: Arc::new(RwLock::new(VecDeque::new())),
            max_history: max_history.max(1),
            toast_tx,
        }
    }

    /// Receive toasts for notifications sent after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.toast_tx.subscribe()
    }

    /// All retained notifications, newest first
    pub async fn list(&self) -> Vec<NotificationEvent> {
        self.history.read().await.iter().rev().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }

    pub async fn unseen_count(&self) -> usize {
        self.history.read().await.iter().filter(|n| !n.seen).count()
    }

    /// Mark one notification as seen; returns false if it is unknown
    pub async fn mark_seen(&self, id: Uuid) -> bool {
        let mut history = self.history.write().await;
        match history.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.seen = true;
                true
            }
            None => false,
        }
    }

    pub async fn mark_all_seen(&self) {
        let mut history = self.history.write().await;
        for notification in history.iter_mut() {
            notification.seen = true;
        }
    }

    /// Remove one notification; returns it if it was present
    pub async fn remove(&self, id: Uuid) -> Option<NotificationEvent> {
        let mut history = self.history.write().await;
        let index = history.iter().position(|n| n.id == id)?;
        history.remove(index)
    }

    pub async fn clear(&self) {
        self.history.write().await.clear();
        debug!("Notification history cleared");
    }
}

#[async_trait]
impl NotificationSink for NotificationStore {
    async fn send_notification(&self, notification: NotificationEvent) -> Result<()> {
        match notification.severity {
            Severity::Warning => warn!(
                source = %notification.source,
                id = %notification.id,
                "{}",
                notification.name
            ),
            Severity::Info => info!(
                source = %notification.source,
                id = %notification.id,
                "{}",
                notification.name
            ),
        }

        {
            let mut history = self.history.write().await;
            history.push_back(notification.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // No subscribers only means nobody is showing toasts right now
        if self.toast_tx.send(notification).is_err() {
            debug!("No toast subscribers");
        }

        Ok(())
    }
}
