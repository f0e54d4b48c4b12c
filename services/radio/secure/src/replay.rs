//! Restart/message counter management and replay rejection.
//!
//! One guard per association. The sender side hands out strictly increasing
//! counter pairs and persists before handing each one out; the receiver side
//! remembers the highest authenticated pair and rejects anything not above it.

use crate::counters::{CounterPair, COUNTER_MAX};
use crate::SecureError;
use radio_storage::{AssocId, CounterSlot, CounterStore};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Upper bound of the random message counter seed at each restart epoch
pub const MESSAGE_SEED_MAX: u32 = 0xff;

/// How the sender's message counter is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterPersistence {
    /// Only the restart counter is stored; every process start is a new epoch
    #[default]
    Volatile,
    /// The full pair is stored on every transmission and resumed on start
    Durable,
}

/// Result of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Strictly newer than anything accepted so far
    Accepted,
    /// Not newer; drop before decrypting
    Replayed,
}

#[derive(Debug, Default)]
struct GuardState {
    /// Next pair to transmit with; `None` until the first send of this process
    tx_next: Option<CounterPair>,
    /// Highest pair authenticated from the peer
    rx_last: Option<CounterPair>,
}

/// Per-association counter state
pub struct ReplayGuard {
    assoc: AssocId,
    store: Arc<dyn CounterStore>,
    persistence: CounterPersistence,
    state: Mutex<GuardState>,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("assoc", &self.assoc)
            .field("persistence", &self.persistence)
            .field("state", &*self.state())
            .finish()
    }
}

impl ReplayGuard {
    /// Open the guard, loading the receiver's last accepted pair.
    ///
    /// The sender epoch starts lazily on the first `next_counters` call, so a
    /// receive-only association never consumes restart counter values.
    pub fn open(
        assoc: AssocId,
        store: Arc<dyn CounterStore>,
        persistence: CounterPersistence,
    ) -> Result<Self, SecureError> {
        let rx_last = store
            .read_counter_bytes(assoc, CounterSlot::RxLastAccepted)?
            .map(|b| CounterPair::from_bytes(&b));
        debug!(%assoc, ?rx_last, "replay guard opened");
        Ok(Self {
            assoc,
            store,
            persistence,
            state: Mutex::new(GuardState {
                tx_next: None,
                rx_last,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Association this guard belongs to
    pub fn assoc_id(&self) -> AssocId {
        self.assoc
    }

    /// Persistence mode of the sender counters
    pub fn persistence(&self) -> CounterPersistence {
        self.persistence
    }

    /// Counter pair for the next outgoing frame.
    ///
    /// The advanced state is durable before this returns, so power loss can
    /// only skip a value, never reuse one.
    pub fn next_counters(&self) -> Result<CounterPair, SecureError> {
        let mut state = self.state();
        let current = match state.tx_next {
            Some(pair) => pair,
            None => self.start_epoch()?,
        };
        let Some(next) = current.successor() else {
            warn!(assoc = %self.assoc, "counter space exhausted; key must be replaced");
            state.tx_next = Some(current);
            return Err(SecureError::CounterSpaceExhausted);
        };

        let record = match self.persistence {
            // Restart changes only on message overflow; unchanged bytes are not rewritten.
            CounterPersistence::Volatile => CounterPair::new(next.restart, 0),
            CounterPersistence::Durable => next,
        };
        self.store
            .write_counter_bytes_if_changed(self.assoc, CounterSlot::Tx, &record.to_bytes())?;
        state.tx_next = Some(next);
        Ok(current)
    }

    /// Begin a restart epoch: bump the stored restart counter (zero at true
    /// first use) and seed the message counter.
    fn start_epoch(&self) -> Result<CounterPair, SecureError> {
        let stored = self
            .store
            .read_counter_bytes(self.assoc, CounterSlot::Tx)?
            .map(|b| CounterPair::from_bytes(&b));
        let seed = rand::thread_rng().gen_range(0..=MESSAGE_SEED_MAX);

        let first = match (self.persistence, stored) {
            (_, None) => CounterPair::new(0, seed),
            (CounterPersistence::Durable, Some(pair)) => pair,
            (CounterPersistence::Volatile, Some(pair)) => {
                if pair.restart >= COUNTER_MAX {
                    warn!(assoc = %self.assoc, "restart counter exhausted; key must be replaced");
                    return Err(SecureError::CounterSpaceExhausted);
                }
                CounterPair::new(pair.restart + 1, seed)
            }
        };

        let record = match self.persistence {
            CounterPersistence::Volatile => CounterPair::new(first.restart, 0),
            CounterPersistence::Durable => first,
        };
        self.store
            .write_counter_bytes_if_changed(self.assoc, CounterSlot::Tx, &record.to_bytes())?;
        info!(assoc = %self.assoc, restart = first.restart, "transmit epoch started");
        Ok(first)
    }

    /// Check a received pair against the last accepted one. Does not change state.
    pub fn accept_if_fresh(&self, pair: CounterPair) -> Freshness {
        match self.state().rx_last {
            Some(last) if pair <= last => Freshness::Replayed,
            _ => Freshness::Accepted,
        }
    }

    /// Record a pair as accepted; call only after the frame authenticated.
    ///
    /// Rechecks freshness under the lock so two concurrent decodes of the same
    /// pair cannot both commit.
    pub fn commit(&self, pair: CounterPair) -> Result<(), SecureError> {
        let mut state = self.state();
        if matches!(state.rx_last, Some(last) if pair <= last) {
            return Err(SecureError::ReplayRejected);
        }
        self.store.write_counter_bytes_if_changed(
            self.assoc,
            CounterSlot::RxLastAccepted,
            &pair.to_bytes(),
        )?;
        state.rx_last = Some(pair);
        Ok(())
    }

    /// Reject everything from restart epochs below `restart`.
    ///
    /// One-way: a lower value than one already required has no effect.
    pub fn require_restart_at_least(&self, restart: u32) -> Result<(), SecureError> {
        if restart == 0 {
            return Ok(());
        }
        let floor = CounterPair::new(restart.min(COUNTER_MAX) - 1, COUNTER_MAX);
        let mut state = self.state();
        if matches!(state.rx_last, Some(last) if last >= floor) {
            return Ok(());
        }
        self.store.write_counter_bytes_if_changed(
            self.assoc,
            CounterSlot::RxLastAccepted,
            &floor.to_bytes(),
        )?;
        state.rx_last = Some(floor);
        info!(assoc = %self.assoc, restart, "receiver restart floor raised");
        Ok(())
    }

    /// Highest pair accepted from the peer
    pub fn last_accepted(&self) -> Option<CounterPair> {
        self.state().rx_last
    }

    /// Forget all counters, as when a new key is installed.
    ///
    /// The next transmission starts again at restart counter zero.
    pub fn reset_for_new_key(&self) -> Result<(), SecureError> {
        let mut state = self.state();
        self.store.erase_counter_bytes(self.assoc, CounterSlot::Tx)?;
        self.store
            .erase_counter_bytes(self.assoc, CounterSlot::RxLastAccepted)?;
        *state = GuardState::default();
        info!(assoc = %self.assoc, "counters reset for new key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_storage::MemoryCounterStore;

    fn guard(store: &Arc<MemoryCounterStore>, mode: CounterPersistence) -> ReplayGuard {
        ReplayGuard::open(AssocId(0x42), store.clone(), mode).unwrap()
    }

    #[test]
    fn test_first_use_starts_at_restart_zero() {
        let store = Arc::new(MemoryCounterStore::new());
        let g = guard(&store, CounterPersistence::Volatile);
        let first = g.next_counters().unwrap();
        assert_eq!(first.restart, 0);
        assert!(first.message <= MESSAGE_SEED_MAX);
    }

    #[test]
    fn test_counters_strictly_increase() {
        let store = Arc::new(MemoryCounterStore::new());
        let g = guard(&store, CounterPersistence::Volatile);
        let mut prev = g.next_counters().unwrap();
        for _ in 0..500 {
            let next = g.next_counters().unwrap();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_volatile_epochs_never_overlap() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut seen = Vec::new();
        for epoch in 0..4u32 {
            let g = guard(&store, CounterPersistence::Volatile);
            for _ in 0..20 {
                let pair = g.next_counters().unwrap();
                assert_eq!(pair.restart, epoch);
                seen.push(pair);
            }
        }
        let mut sorted = seen.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, seen);
    }

    #[test]
    fn test_volatile_mode_writes_only_on_restart_change() {
        let store = Arc::new(MemoryCounterStore::new());
        let g = guard(&store, CounterPersistence::Volatile);
        for _ in 0..50 {
            g.next_counters().unwrap();
        }
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_durable_mode_resumes() {
        let store = Arc::new(MemoryCounterStore::new());
        let last = {
            let g = guard(&store, CounterPersistence::Durable);
            g.next_counters().unwrap();
            g.next_counters().unwrap()
        };
        let g = guard(&store, CounterPersistence::Durable);
        let resumed = g.next_counters().unwrap();
        assert_eq!(resumed, last.successor().unwrap());
    }

    #[test]
    fn test_message_overflow_carries_into_restart() {
        let store = Arc::new(MemoryCounterStore::new());
        store
            .write_counter_bytes_if_changed(
                AssocId(0x42),
                CounterSlot::Tx,
                &CounterPair::new(5, COUNTER_MAX).to_bytes(),
            )
            .unwrap();
        let g = guard(&store, CounterPersistence::Durable);
        assert_eq!(g.next_counters().unwrap(), CounterPair::new(5, COUNTER_MAX));
        assert_eq!(g.next_counters().unwrap(), CounterPair::new(6, 0));
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let store = Arc::new(MemoryCounterStore::new());
        store
            .write_counter_bytes_if_changed(
                AssocId(0x42),
                CounterSlot::Tx,
                &CounterPair::new(COUNTER_MAX, COUNTER_MAX - 1).to_bytes(),
            )
            .unwrap();
        let g = guard(&store, CounterPersistence::Durable);
        assert_eq!(
            g.next_counters().unwrap(),
            CounterPair::new(COUNTER_MAX, COUNTER_MAX - 1)
        );
        assert!(matches!(g.next_counters(), Err(SecureError::CounterSpaceExhausted)));
        assert!(matches!(g.next_counters(), Err(SecureError::CounterSpaceExhausted)));

        let volatile = guard(&store, CounterPersistence::Volatile);
        assert!(matches!(
            volatile.next_counters(),
            Err(SecureError::CounterSpaceExhausted)
        ));
    }

    #[test]
    fn test_replay_rejected_after_commit() {
        let store = Arc::new(MemoryCounterStore::new());
        let g = guard(&store, CounterPersistence::Volatile);
        let pair = CounterPair::new(1, 10);

        assert_eq!(g.accept_if_fresh(pair), Freshness::Accepted);
        // Checking alone does not advance state.
        assert_eq!(g.accept_if_fresh(pair), Freshness::Accepted);

        g.commit(pair).unwrap();
        assert_eq!(g.accept_if_fresh(pair), Freshness::Replayed);
        assert_eq!(g.accept_if_fresh(CounterPair::new(0, 500)), Freshness::Replayed);
        assert_eq!(g.accept_if_fresh(CounterPair::new(1, 11)), Freshness::Accepted);
        assert!(matches!(g.commit(pair), Err(SecureError::ReplayRejected)));
    }

    #[test]
    fn test_last_accepted_survives_reopen() {
        let store = Arc::new(MemoryCounterStore::new());
        guard(&store, CounterPersistence::Volatile)
            .commit(CounterPair::new(2, 3))
            .unwrap();
        let g = guard(&store, CounterPersistence::Volatile);
        assert_eq!(g.last_accepted(), Some(CounterPair::new(2, 3)));
        assert_eq!(g.accept_if_fresh(CounterPair::new(2, 3)), Freshness::Replayed);
    }

    #[test]
    fn test_restart_ratchet_is_one_way() {
        let store = Arc::new(MemoryCounterStore::new());
        let g = guard(&store, CounterPersistence::Volatile);

        g.require_restart_at_least(3).unwrap();
        assert_eq!(g.accept_if_fresh(CounterPair::new(2, COUNTER_MAX)), Freshness::Replayed);
        assert_eq!(g.accept_if_fresh(CounterPair::new(3, 0)), Freshness::Accepted);

        g.require_restart_at_least(1).unwrap();
        assert_eq!(g.accept_if_fresh(CounterPair::new(2, 0)), Freshness::Replayed);

        g.commit(CounterPair::new(7, 1)).unwrap();
        g.require_restart_at_least(4).unwrap();
        assert_eq!(g.last_accepted(), Some(CounterPair::new(7, 1)));
    }

    #[test]
    fn test_reset_for_new_key() {
        let store = Arc::new(MemoryCounterStore::new());
        {
            let g = guard(&store, CounterPersistence::Volatile);
            g.next_counters().unwrap();
        }
        let g = guard(&store, CounterPersistence::Volatile);
        assert_eq!(g.next_counters().unwrap().restart, 1);
        g.commit(CounterPair::new(9, 9)).unwrap();

        g.reset_for_new_key().unwrap();
        assert_eq!(g.last_accepted(), None);
        assert_eq!(g.next_counters().unwrap().restart, 0);
    }
}
