//! Configuration handling for the radio tool.
//!
//! Settings come from a YAML file, then environment variables, then
//! command-line flags.

use anyhow::{bail, Context, Result};
use radio_secure::{
    AssociationTable, CounterPersistence, Direction, NodeId, PaddingProfile, SecureFrameCodec,
    SecurityAssociation, SharedKey,
};
use radio_storage::{CounterStore, StorageMode};
use radio_wire::{MAX_RX_ID_LEN, SMALL_FRAME_MAX_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Radio tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Largest frame length byte sent or accepted
    pub max_frame_len: u8,
    /// Leading ID bytes carried in transmitted headers
    pub tx_id_len: usize,
    /// Secure body padding
    pub padding: PaddingProfile,
    /// IV direction bit for secure traffic
    pub direction: Direction,
    /// How transmit counters are persisted
    pub counter_persistence: CounterPersistence,
    /// Counter storage
    pub storage: StorageConfig,
    /// This node's ID (hex, 6 to 8 bytes)
    pub node_id: Option<String>,
    /// This node's transmit key (hex, 16 bytes)
    pub key: Option<String>,
    /// Peers we accept secure frames from
    pub associations: Vec<AssociationConfig>,
    /// How often `listen` logs receiver counters, e.g. "30s"
    pub stats_interval: String,
}

/// Counter storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// "memory" or "file"
    pub mode: String,
    /// Data directory for file storage
    pub data_dir: String,
    /// Fsync every counter write
    pub fsync: bool,
    /// Permit secure transmission with memory storage (tests and benches only)
    pub allow_memory_tx: bool,
}

/// One receive association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// Peer node ID (hex, 6 to 8 bytes)
    pub node_id: String,
    /// Shared key (hex, 16 bytes)
    pub key: String,
    /// Reject peer frames from restart epochs below this one
    #[serde(default)]
    pub min_restart: Option<u32>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: "file".to_string(),
            data_dir: "./otradio-data".to_string(),
            fsync: true,
            allow_memory_tx: false,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            max_frame_len: SMALL_FRAME_MAX_LEN,
            tx_id_len: 4,
            padding: PaddingProfile::default(),
            direction: Direction::default(),
            counter_persistence: CounterPersistence::default(),
            storage: StorageConfig::default(),
            node_id: None,
            key: None,
            associations: Vec::new(),
            stats_interval: "30s".to_string(),
        }
    }
}

impl RadioConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: RadioConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_environment_overrides();
        config.validate()?;

        info!(
            "Final radio configuration: max_frame_len={}, tx_id_len={}, padding={:?}, counters={:?}, storage={}, associations={}",
            config.max_frame_len,
            config.tx_id_len,
            config.padding,
            config.counter_persistence,
            config.storage.mode,
            config.associations.len()
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(node_id) = std::env::var("OTRADIO_NODE_ID") {
            self.node_id = Some(node_id);
            info!("Node ID overridden by environment");
        }

        if let Ok(key) = std::env::var("OTRADIO_KEY") {
            self.key = Some(key);
            info!("Key overridden by environment");
        }

        if let Ok(max) = std::env::var("OTRADIO_MAX_FRAME_LEN") {
            if let Ok(max) = max.parse::<u8>() {
                self.max_frame_len = max;
                info!("Max frame length overridden by environment: {}", max);
            }
        }

        if let Ok(dir) = std::env::var("OTRADIO_DATA_DIR") {
            self.storage.mode = "file".to_string();
            self.storage.data_dir = dir;
            info!("Data directory overridden by environment: {}", self.storage.data_dir);
        }
    }

    /// Check ranges that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_len < 4 {
            bail!("max_frame_len must be at least 4, got {}", self.max_frame_len);
        }
        if self.tx_id_len > MAX_RX_ID_LEN {
            bail!("tx_id_len must be at most {}, got {}", MAX_RX_ID_LEN, self.tx_id_len);
        }
        self.storage_mode()?;
        self.stats_interval()?;
        Ok(())
    }

    /// Storage backend selection
    pub fn storage_mode(&self) -> Result<StorageMode> {
        match self.storage.mode.as_str() {
            "memory" => Ok(StorageMode::InMemory),
            "file" => Ok(StorageMode::File {
                data_dir: self.storage.data_dir.clone(),
                fsync: self.storage.fsync,
            }),
            other => bail!("Invalid storage mode: {}. Use 'memory' or 'file'", other),
        }
    }

    /// Receiver stats logging interval
    pub fn stats_interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.stats_interval)
            .with_context(|| format!("Invalid stats_interval {:?}", self.stats_interval))
    }

    /// Secure codec for these settings
    pub fn codec(&self) -> SecureFrameCodec {
        SecureFrameCodec::new()
            .padding(self.padding)
            .max_frame_len(self.max_frame_len)
            .direction(self.direction)
    }

    /// This node's transmit association, if an ID and key are configured
    pub fn own_association(
        &self,
        store: Arc<dyn CounterStore>,
    ) -> Result<Option<SecurityAssociation>> {
        let (Some(node_id), Some(key)) = (&self.node_id, &self.key) else {
            return Ok(None);
        };
        // Memory counters restart at zero on every run, repeating IVs under the same key.
        if matches!(self.storage_mode()?, StorageMode::InMemory) && !self.storage.allow_memory_tx {
            bail!(
                "Refusing to transmit with memory counter storage; use storage mode 'file' \
                 or set storage.allow_memory_tx for tests"
            );
        }
        let assoc = SecurityAssociation::open(
            parse_node_id(node_id)?,
            parse_key(key)?,
            store,
            self.counter_persistence,
        )?;
        Ok(Some(assoc))
    }

    /// Receive associations, with restart floors applied
    pub fn association_table(&self, store: Arc<dyn CounterStore>) -> Result<AssociationTable> {
        let mut table = AssociationTable::new();
        for entry in &self.associations {
            let assoc = SecurityAssociation::open(
                parse_node_id(&entry.node_id)?,
                parse_key(&entry.key)?,
                store.clone(),
                self.counter_persistence,
            )?;
            if let Some(min_restart) = entry.min_restart {
                assoc.guard().require_restart_at_least(min_restart)?;
            }
            table
                .insert(assoc)
                .with_context(|| format!("association {}", entry.node_id))?;
        }
        Ok(table)
    }
}

/// Parse a hex node ID
pub fn parse_node_id(s: &str) -> Result<NodeId> {
    let bytes = hex::decode(s.trim()).with_context(|| format!("node id {:?} is not hex", s))?;
    Ok(NodeId::new(&bytes)?)
}

/// Parse a hex 128-bit key
pub fn parse_key(s: &str) -> Result<SharedKey> {
    let bytes = hex::decode(s.trim()).context("key is not hex")?;
    Ok(SharedKey::from_slice(&bytes)?)
}
