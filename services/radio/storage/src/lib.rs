//! Non-volatile counter storage for secure radio associations.
//!
//! This crate provides the persistence seam used by the replay guard: a
//! handful of bytes per association and slot, read once at start-up and
//! rewritten only when they change, so flash/EEPROM wear stays low. Backends
//! are pluggable (in-memory for tests, file-based for hosts).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Size of one persisted counter record: 3 bytes restart + 3 bytes message
pub const COUNTER_RECORD_LEN: usize = 6;

/// One persisted counter record, most significant byte first
pub type CounterBytes = [u8; COUNTER_RECORD_LEN];

/// Association identifier (leading 8 bytes of the peer node ID)
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssocId(pub u64);

impl fmt::Display for AssocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Which counter record of an association
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CounterSlot {
    /// Next counters this node will transmit with
    Tx,
    /// Highest counters accepted from the peer
    RxLastAccepted,
}

impl CounterSlot {
    /// Stable name used for file names and logs
    pub fn as_str(self) -> &'static str {
        match self {
            CounterSlot::Tx => "tx",
            CounterSlot::RxLastAccepted => "rx",
        }
    }
}

impl fmt::Display for CounterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),
    /// Invalid operation
    #[error("Invalid operation: {0}")]
    Invalid(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent counter storage.
///
/// Writes must be durable when the call returns: callers rely on that to
/// never transmit with a counter value that could be reused after power loss.
pub trait CounterStore: Send + Sync {
    /// Read a record; `None` if never written
    fn read_counter_bytes(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
    ) -> Result<Option<CounterBytes>, StorageError>;

    /// Write a record unless it already holds these bytes.
    ///
    /// Returns true if a physical write happened.
    fn write_counter_bytes_if_changed(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
        bytes: &CounterBytes,
    ) -> Result<bool, StorageError>;

    /// Forget a record, so the next read returns `None`
    fn erase_counter_bytes(&self, assoc: AssocId, slot: CounterSlot) -> Result<(), StorageError>;
}

impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    fn read_counter_bytes(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
    ) -> Result<Option<CounterBytes>, StorageError> {
        (**self).read_counter_bytes(assoc, slot)
    }

    fn write_counter_bytes_if_changed(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
        bytes: &CounterBytes,
    ) -> Result<bool, StorageError> {
        (**self).write_counter_bytes_if_changed(assoc, slot, bytes)
    }

    fn erase_counter_bytes(&self, assoc: AssocId, slot: CounterSlot) -> Result<(), StorageError> {
        (**self).erase_counter_bytes(assoc, slot)
    }
}

/// Storage backend configuration
#[derive(Clone, Debug, Default)]
pub enum StorageMode {
    /// In-memory storage (dev/tests only; nothing survives a restart)
    #[default]
    InMemory,
    /// One small file per association and slot
    File {
        /// Data directory path
        data_dir: String,
        /// Fsync each write before returning
        fsync: bool,
    },
}

// Re-export backend implementations
pub use backend::file::{FileCounterStore, FileStoreConfig};
pub use backend::mem::MemoryCounterStore;

/// Create a counter store from configuration
pub fn open_store(mode: StorageMode) -> Result<Arc<dyn CounterStore>, StorageError> {
    match mode {
        StorageMode::InMemory => Ok(Arc::new(MemoryCounterStore::new())),
        StorageMode::File { data_dir, fsync } => {
            let config = FileStoreConfig {
                data_dir: data_dir.into(),
                fsync,
            };
            Ok(Arc::new(FileCounterStore::new(config)?))
        }
    }
}
