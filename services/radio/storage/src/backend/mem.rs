//! In-memory storage backend for development and testing

use crate::{AssocId, CounterBytes, CounterSlot, CounterStore, StorageError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-memory counter store
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    /// (association, slot) -> record
    records: DashMap<(AssocId, CounterSlot), CounterBytes>,
    /// Physical writes performed, for wear accounting
    writes: AtomicU64,
}

impl MemoryCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that actually changed a record
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl CounterStore for MemoryCounterStore {
    fn read_counter_bytes(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
    ) -> Result<Option<CounterBytes>, StorageError> {
        Ok(self.records.get(&(assoc, slot)).map(|v| *v))
    }

    fn write_counter_bytes_if_changed(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
        bytes: &CounterBytes,
    ) -> Result<bool, StorageError> {
        match self.records.entry((assoc, slot)) {
            Entry::Occupied(mut e) => {
                if e.get() == bytes {
                    return Ok(false);
                }
                e.insert(*bytes);
            }
            Entry::Vacant(e) => {
                e.insert(*bytes);
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("counter write assoc={} slot={}", assoc, slot);
        Ok(true)
    }

    fn erase_counter_bytes(&self, assoc: AssocId, slot: CounterSlot) -> Result<(), StorageError> {
        debug!("counter erase assoc={} slot={}", assoc, slot);
        self.records.remove(&(assoc, slot));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryCounterStore::new();
        let assoc = AssocId(0xaaaa_aaaa_5555_0000);

        assert_eq!(store.read_counter_bytes(assoc, CounterSlot::Tx).unwrap(), None);

        let rec = [0, 0, 1, 0, 0, 9];
        assert!(store.write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &rec).unwrap());
        assert_eq!(store.read_counter_bytes(assoc, CounterSlot::Tx).unwrap(), Some(rec));
        assert_eq!(
            store.read_counter_bytes(assoc, CounterSlot::RxLastAccepted).unwrap(),
            None
        );
    }

    #[test]
    fn test_memory_store_skips_unchanged_writes() {
        let store = MemoryCounterStore::new();
        let assoc = AssocId(1);
        let rec = [0, 0, 0, 0, 0, 1];

        assert!(store.write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &rec).unwrap());
        assert!(!store.write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &rec).unwrap());
        assert_eq!(store.write_count(), 1);

        store.erase_counter_bytes(assoc, CounterSlot::Tx).unwrap();
        assert_eq!(store.read_counter_bytes(assoc, CounterSlot::Tx).unwrap(), None);
    }
}
