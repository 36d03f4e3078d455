use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TradeLogError};

#[derive(Default)]
struct GuardState {
    in_flight: HashSet<String>,
    rechecks: HashMap<String, (u64, CancellationToken)>,
    next_generation: u64,
}

/// Per-counterparty concurrency bookkeeping.
///
/// Holds the set of ids with a fetch in flight and the pending
/// re-verification timer for each id. Starting a fetch cancels that id's
/// pending timer; [`RefreshGuard::shutdown`] cancels all of them.
#[derive(Clone, Default)]
pub struct RefreshGuard {
    state: Arc<Mutex<GuardState>>,
    shutdown: CancellationToken,
}

/// Proof that the holder owns the only fetch for `id`. Released on drop.
pub struct FetchPermit {
    state: Arc<Mutex<GuardState>>,
    id: String,
}

/// A scheduled re-verification. The task waits on `token`.
#[derive(Debug, Clone)]
pub struct RecheckTicket {
    pub id: String,
    pub token: CancellationToken,
    generation: u64,
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the fetch slot for `id`, cancelling any pending re-verification.
    pub fn try_acquire(&self, id: &str) -> Result<FetchPermit> {
        let mut state = lock(&self.state);
        if !state.in_flight.insert(id.to_string()) {
            return Err(TradeLogError::FetchInProgress(id.to_string()));
        }
        if let Some((_, token)) = state.rechecks.remove(id) {
            token.cancel();
            tracing::debug!(counterparty_id = %id, "Cancelled pending re-verification");
        }
        Ok(FetchPermit {
            state: Arc::clone(&self.state),
            id: id.to_string(),
        })
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        lock(&self.state).in_flight.contains(id)
    }

    /// Register a re-verification for `id`, replacing any earlier one.
    /// After shutdown the returned ticket is already cancelled.
    pub fn schedule_recheck(&self, id: &str) -> RecheckTicket {
        let token = self.shutdown.child_token();
        let mut state = lock(&self.state);
        state.next_generation += 1;
        let generation = state.next_generation;
        if token.is_cancelled() {
            return RecheckTicket {
                id: id.to_string(),
                token,
                generation,
            };
        }
        if let Some((_, previous)) = state
            .rechecks
            .insert(id.to_string(), (generation, token.clone()))
        {
            previous.cancel();
        }
        RecheckTicket {
            id: id.to_string(),
            token,
            generation,
        }
    }

    /// Forget a ticket whose timer fired. A newer ticket for the same id is kept.
    pub fn complete_recheck(&self, ticket: &RecheckTicket) {
        let mut state = lock(&self.state);
        if state
            .rechecks
            .get(&ticket.id)
            .is_some_and(|(generation, _)| *generation == ticket.generation)
        {
            state.rechecks.remove(&ticket.id);
        }
    }

    pub fn pending_rechecks(&self) -> usize {
        lock(&self.state).rechecks.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every pending re-verification and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut state = lock(&self.state);
        let cancelled = state.rechecks.len();
        state.rechecks.clear();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled pending re-verifications");
        }
    }
}

impl FetchPermit {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for FetchPermit {
    fn drop(&mut self) {
        lock(&self.state).in_flight.remove(&self.id);
    }
}
