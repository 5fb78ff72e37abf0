// Single-flight token refresh coordination

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::{AbortHandle, JoinHandle};

/// Shared outcome of a refresh: the new credential, or `None` if it failed
pub type RefreshOutcome = Shared<BoxFuture<'static, Option<String>>>;

/// The refresh currently in flight
struct PendingRefresh {
    generation: u64,
    outcome: RefreshOutcome,
    abort: AbortHandle,
}

/// Guarantees at most one outstanding refresh and fans its result out
///
/// State machine: `Idle -> Refreshing -> Idle`. The transition out of `Idle`
/// happens under the slot lock, so only the first caller to find the slot
/// empty starts a refresh; everyone else gets a clone of the same outcome.
#[derive(Default)]
pub struct RefreshCoordinator {
    slot: Mutex<Option<PendingRefresh>>,
    generations: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock().is_some()
    }

    /// Number of refreshes started over the coordinator's lifetime
    pub fn started(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    /// Join the in-flight refresh, or start one with `start`
    ///
    /// `start` receives the generation of the new refresh and must return the
    /// spawned task performing it. The task is expected to call
    /// [`RefreshCoordinator::finish`] with that generation once done.
    pub fn join_or_start<F>(&self, start: F) -> RefreshOutcome
    where
        F: FnOnce(u64) -> JoinHandle<Option<String>>,
    {
        let mut slot = self.lock();

        if let Some(pending) = slot.as_ref() {
            tracing::debug!(
                generation = pending.generation,
                "Refresh already in flight, joining"
            );
            return pending.outcome.clone();
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "Starting token refresh");

        let handle = start(generation);
        let abort = handle.abort_handle();
        // A cancelled or panicked task resolves like a failed refresh
        let outcome = handle
            .map(|joined| joined.ok().flatten())
            .boxed()
            .shared();

        *slot = Some(PendingRefresh {
            generation,
            outcome: outcome.clone(),
            abort,
        });

        outcome
    }

    /// Return to `Idle` once the refresh of `generation` has completed
    pub fn finish(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.as_ref().map(|p| p.generation) == Some(generation) {
            *slot = None;
            tracing::debug!(generation, "Token refresh finished");
        }
    }

    /// Abort the in-flight refresh, if any, and return to `Idle`
    pub fn cancel(&self) {
        if let Some(pending) = self.lock().take() {
            tracing::debug!(generation = pending.generation, "Aborting token refresh");
            pending.abort.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingRefresh>> {
        // The slot is only ever replaced wholesale, a poisoned lock is still consistent
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
