//! Generic fetch, compare, notify, persist primitive
//!
//! [`observe_data`] performs one poll of any resource: it fetches the current
//! value, asks the caller whether it differs from the last stored value,
//! notifies on a difference and hands the fresh value back for persistence.
//! It owns no state; the previous value lives with the caller and is only
//! changed through the `update_previous_data` callback.
//!
//! [`Poller`] wraps the same operation with an in-flight flag so that a
//! scheduler firing faster than the fetch resolves cannot run two polls of
//! the same resource concurrently.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Produces the current value of a polled resource
///
/// Implementations swallow their own failures and return `None`, which the
/// poller treats as "nothing to report this cycle".
#[async_trait]
pub trait DataFetcher<T>: Send + Sync {
    async fn fetch(&self) -> Option<T>;
}

/// Adapts an async closure into a [`DataFetcher`]
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<T, F, Fut> DataFetcher<T> for FnFetcher<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Option<T>> + Send,
{
    async fn fetch(&self) -> Option<T> {
        (self.0)().await
    }
}

/// What a single poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `active` was false; nothing was fetched
    Inactive,

    /// Another poll through the same [`Poller`] was still running
    Busy,

    /// The fetcher produced no value; previous data is retained
    NoData,

    /// A value was fetched and persisted without notifying
    Unchanged,

    /// A value was fetched, the notification handler ran, then it was persisted
    Changed,
}

impl PollOutcome {
    /// Whether the previous data was replaced
    pub fn persisted(&self) -> bool {
        matches!(self, PollOutcome::Unchanged | PollOutcome::Changed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Inactive => "inactive",
            PollOutcome::Busy => "busy",
            PollOutcome::NoData => "no_data",
            PollOutcome::Unchanged => "unchanged",
            PollOutcome::Changed => "changed",
        }
    }
}

/// Inputs of one [`observe_data`] call
pub struct ObserveData<'a, T, D, N, U> {
    /// Polling is skipped entirely while false
    pub active: bool,

    /// Last persisted value, if any
    pub previous_data: Option<&'a T>,

    /// Source of the new value
    pub fetcher: &'a dyn DataFetcher<T>,

    /// Decides whether the new value warrants a notification
    pub is_data_different: D,

    /// Invoked with the new value when it differs
    pub notification_handler: N,

    /// Invoked with the new value after every successful fetch
    pub update_previous_data: U,
}

/// Run one poll: fetch, compare, notify on change, then persist
///
/// Each callback runs at most once, and the notification always completes
/// before the persist callback starts.
pub async fn observe_data<T, D, N, NFut, U, UFut>(
    request: ObserveData<'_, T, D, N, U>,
) -> PollOutcome
where
    T: Clone,
    D: FnOnce(Option<&T>, &T) -> bool,
    N: FnOnce(T) -> NFut,
    NFut: Future<Output = ()>,
    U: FnOnce(T) -> UFut,
    UFut: Future<Output = ()>,
{
    let ObserveData {
        active,
        previous_data,
        fetcher,
        is_data_different,
        notification_handler,
        update_previous_data,
    } = request;

    if !active {
        trace!("Poll skipped, observer inactive");
        return PollOutcome::Inactive;
    }

    let new_data = match fetcher.fetch().await {
        Some(data) => data,
        None => {
            debug!("Fetcher returned no data, keeping previous value");
            return PollOutcome::NoData;
        }
    };

    let outcome = if is_data_different(previous_data, &new_data) {
        notification_handler(new_data.clone()).await;
        PollOutcome::Changed
    } else {
        PollOutcome::Unchanged
    };

    update_previous_data(new_data).await;

    outcome
}

/// Serialises polls of one resource
#[derive(Debug, Default)]
pub struct Poller {
    in_flight: AtomicBool,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a poll is currently running
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the right to poll, or `None` while another poll holds it
    ///
    /// Callers that read their previous value should do so after claiming,
    /// so a poll that just finished is never compared against stale data.
    pub fn try_acquire(&self) -> Option<PollPermit<'_>> {
        PollPermit::acquire(&self.in_flight)
    }

    /// [`observe_data`] guarded against overlapping invocations
    ///
    /// Returns [`PollOutcome::Busy`] without fetching when a previous poll
    /// through this handle has not finished.
    pub async fn poll<T, D, N, NFut, U, UFut>(
        &self,
        request: ObserveData<'_, T, D, N, U>,
    ) -> PollOutcome
    where
        T: Clone,
        D: FnOnce(Option<&T>, &T) -> bool,
        N: FnOnce(T) -> NFut,
        NFut: Future<Output = ()>,
        U: FnOnce(T) -> UFut,
        UFut: Future<Output = ()>,
    {
        if !request.active {
            return PollOutcome::Inactive;
        }

        match self.try_acquire() {
            Some(permit) => permit.observe(request).await,
            None => {
                debug!("Previous poll still in flight, skipping");
                PollOutcome::Busy
            }
        }
    }
}

/// Exclusive hold on a [`Poller`]; the flag clears when this is dropped
#[derive(Debug)]
pub struct PollPermit<'a>(&'a AtomicBool);

impl<'a> PollPermit<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }

    /// Run [`observe_data`] while holding the permit
    pub async fn observe<T, D, N, NFut, U, UFut>(
        &self,
        request: ObserveData<'_, T, D, N, U>,
    ) -> PollOutcome
    where
        T: Clone,
        D: FnOnce(Option<&T>, &T) -> bool,
        N: FnOnce(T) -> NFut,
        NFut: Future<Output = ()>,
        U: FnOnce(T) -> UFut,
        UFut: Future<Output = ()>,
    {
        observe_data(request).await
    }
}

impl Drop for PollPermit<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
