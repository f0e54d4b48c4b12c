//! File-based storage backend with checksummed records

use crate::{AssocId, CounterBytes, CounterSlot, CounterStore, StorageError};
use crc32fast::Hasher;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for the file-based counter store
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    /// Base data directory
    pub data_dir: PathBuf,
    /// Fsync each record (and its directory) before a write returns
    pub fsync: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./otradio-data"),
            fsync: true,
        }
    }
}

/// On-disk record
#[derive(Serialize, Deserialize, Debug)]
struct CounterRecord {
    counters: CounterBytes,
    crc32: u32,
}

impl CounterRecord {
    fn new(counters: CounterBytes) -> Self {
        Self {
            counters,
            crc32: Self::compute_crc(&counters),
        }
    }

    fn compute_crc(counters: &CounterBytes) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(counters);
        hasher.finalize()
    }

    fn verify(&self) -> bool {
        self.crc32 == Self::compute_crc(&self.counters)
    }
}

/// File-based counter store.
///
/// Records live at `<data_dir>/assoc/<id>/<slot>.json` and are replaced via
/// write-to-temp then rename, so a torn write leaves the previous value.
pub struct FileCounterStore {
    config: FileStoreConfig,
    /// Last value known to be on disk, to skip unchanged writes
    cache: DashMap<(AssocId, CounterSlot), CounterBytes>,
}

impl FileCounterStore {
    /// Create a store, creating the data directory if needed
    pub fn new(config: FileStoreConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir)?;
        info!("Counter store at {:?}", config.data_dir);
        Ok(Self {
            config,
            cache: DashMap::new(),
        })
    }

    fn assoc_dir(&self, assoc: AssocId) -> PathBuf {
        self.config.data_dir.join("assoc").join(assoc.to_string())
    }

    fn record_path(&self, assoc: AssocId, slot: CounterSlot) -> PathBuf {
        self.assoc_dir(assoc).join(format!("{}.json", slot))
    }

    fn load_record(&self, path: &Path) -> Result<Option<CounterBytes>, StorageError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CounterRecord = serde_json::from_str(&content).map_err(|e| {
            StorageError::Corruption(format!("Invalid counter record {:?}: {}", path, e))
        })?;
        if !record.verify() {
            return Err(StorageError::Corruption(format!(
                "Checksum mismatch in counter record {:?}",
                path
            )));
        }
        Ok(Some(record.counters))
    }

    fn store_record(&self, path: &Path, counters: &CounterBytes) -> Result<(), StorageError> {
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::Invalid(format!("No parent for {:?}", path)))?;
        std::fs::create_dir_all(dir)?;

        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec(&CounterRecord::new(*counters))?;
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&content)?;
            if self.config.fsync {
                file.sync_all()?;
            }
        }
        std::fs::rename(&tmp, path)?;
        if self.config.fsync {
            // Make the rename itself durable.
            if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
                warn!("Failed to sync directory {:?}: {}", dir, e);
            }
        }
        Ok(())
    }
}

impl CounterStore for FileCounterStore {
    fn read_counter_bytes(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
    ) -> Result<Option<CounterBytes>, StorageError> {
        if let Some(v) = self.cache.get(&(assoc, slot)) {
            return Ok(Some(*v));
        }
        let loaded = self.load_record(&self.record_path(assoc, slot))?;
        if let Some(counters) = loaded {
            self.cache.insert((assoc, slot), counters);
        }
        Ok(loaded)
    }

    fn write_counter_bytes_if_changed(
        &self,
        assoc: AssocId,
        slot: CounterSlot,
        bytes: &CounterBytes,
    ) -> Result<bool, StorageError> {
        if self.read_counter_bytes(assoc, slot)?.as_ref() == Some(bytes) {
            return Ok(false);
        }
        debug!("counter write assoc={} slot={}", assoc, slot);
        self.store_record(&self.record_path(assoc, slot), bytes)?;
        self.cache.insert((assoc, slot), *bytes);
        Ok(true)
    }

    fn erase_counter_bytes(&self, assoc: AssocId, slot: CounterSlot) -> Result<(), StorageError> {
        debug!("counter erase assoc={} slot={}", assoc, slot);
        self.cache.remove(&(assoc, slot));
        match std::fs::remove_file(self.record_path(assoc, slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileCounterStore {
        FileCounterStore::new(FileStoreConfig {
            data_dir: dir.path().to_path_buf(),
            fsync: false,
        })
        .unwrap()
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let assoc = AssocId(0x0102_0304_0506_0708);
        let rec = [0, 0, 0x2a, 0, 0x03, 0x19];

        {
            let store = store_in(&dir);
            assert!(store.write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &rec).unwrap());
            assert!(!store.write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &rec).unwrap());
        }

        let store = store_in(&dir);
        assert_eq!(store.read_counter_bytes(assoc, CounterSlot::Tx).unwrap(), Some(rec));
        assert_eq!(
            store.read_counter_bytes(assoc, CounterSlot::RxLastAccepted).unwrap(),
            None
        );
    }

    #[test]
    fn test_file_store_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let assoc = AssocId(7);
        {
            let store = store_in(&dir);
            store
                .write_counter_bytes_if_changed(assoc, CounterSlot::Tx, &[0, 0, 1, 0, 0, 2])
                .unwrap();
        }
        let path = dir.path().join("assoc").join(assoc.to_string()).join("tx.json");
        let tampered = serde_json::to_vec(&CounterRecord {
            counters: [0, 0, 0, 0, 0, 0],
            crc32: 1,
        })
        .unwrap();
        std::fs::write(&path, tampered).unwrap();

        let store = store_in(&dir);
        assert!(matches!(
            store.read_counter_bytes(assoc, CounterSlot::Tx),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_file_store_erase() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let assoc = AssocId(9);
        store
            .write_counter_bytes_if_changed(assoc, CounterSlot::RxLastAccepted, &[1; 6])
            .unwrap();
        store.erase_counter_bytes(assoc, CounterSlot::RxLastAccepted).unwrap();
        store.erase_counter_bytes(assoc, CounterSlot::RxLastAccepted).unwrap();

        let reopened = store_in(&dir);
        assert_eq!(
            reopened.read_counter_bytes(assoc, CounterSlot::RxLastAccepted).unwrap(),
            None
        );
    }
}
