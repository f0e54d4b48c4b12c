//! Node identities, shared keys and per-peer security associations.

use crate::nonce::ID_PREFIX_LEN;
use crate::replay::{CounterPersistence, ReplayGuard};
use crate::SecureError;
use radio_storage::{AssocId, CounterStore};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// AES-128 key length
pub const KEY_LEN: usize = 16;

/// Persistent node identifier, 6 to 8 bytes, most significant first
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeId(SmallVec<[u8; 8]>);

impl NodeId {
    /// Shortest usable ID: enough to fill the IV prefix
    pub const MIN_LEN: usize = ID_PREFIX_LEN;
    /// Longest ID carried by a receiver
    pub const MAX_LEN: usize = 8;

    /// Wrap ID bytes
    pub fn new(bytes: &[u8]) -> Result<Self, SecureError> {
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&bytes.len()) {
            return Err(SecureError::InvalidKey("node id must be 6 to 8 bytes"));
        }
        Ok(Self(SmallVec::from_slice(bytes)))
    }

    /// Raw ID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Leading bytes folded into the IV
    pub fn prefix6(&self) -> [u8; ID_PREFIX_LEN] {
        let mut out = [0u8; ID_PREFIX_LEN];
        out.copy_from_slice(&self.0[..ID_PREFIX_LEN]);
        out
    }

    /// Whether a header ID (possibly empty) is a prefix of this ID
    pub fn matches_header_id(&self, id: &[u8]) -> bool {
        self.0.starts_with(id)
    }

    /// Storage key: the ID left-aligned in a big-endian u64
    pub fn assoc_id(&self) -> AssocId {
        let mut b = [0u8; 8];
        b[..self.0.len()].copy_from_slice(&self.0);
        AssocId(u64::from_be_bytes(b))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

/// 128-bit shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    /// Wrap key bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Key from a slice that must be exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SecureError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| SecureError::InvalidKey("key must be 16 bytes"))?;
        Ok(Self(key))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// The shared-secret relationship with one node and its counter state.
///
/// `node_id` is the ID carried (in part) in frame headers: this node's own
/// ID for the transmit association, the peer's ID for receive associations.
#[derive(Debug)]
pub struct SecurityAssociation {
    node_id: NodeId,
    key: SharedKey,
    guard: ReplayGuard,
}

impl SecurityAssociation {
    /// Open an association, loading persisted counters from `store`
    pub fn open(
        node_id: NodeId,
        key: SharedKey,
        store: Arc<dyn CounterStore>,
        persistence: CounterPersistence,
    ) -> Result<Self, SecureError> {
        let guard = ReplayGuard::open(node_id.assoc_id(), store, persistence)?;
        Ok(Self {
            node_id,
            key,
            guard,
        })
    }

    /// Node ID
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Shared key
    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    /// Counter state
    pub fn guard(&self) -> &ReplayGuard {
        &self.guard
    }

    /// Install a new key; counters restart from first use.
    pub fn rekey(&mut self, key: SharedKey) -> Result<(), SecureError> {
        self.guard.reset_for_new_key()?;
        self.key = key;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_storage::MemoryCounterStore;

    #[test]
    fn test_node_id_bounds() {
        assert!(NodeId::new(&[1, 2, 3, 4, 5]).is_err());
        assert!(NodeId::new(&[0; 9]).is_err());
        let id = NodeId::new(&[0xaa, 0xaa, 0xaa, 0xaa, 0x55, 0x55, 0x01]).unwrap();
        assert_eq!(id.prefix6(), [0xaa, 0xaa, 0xaa, 0xaa, 0x55, 0x55]);
        assert_eq!(id.to_string(), "aaaaaaaa555501");
        assert_eq!(id.assoc_id(), AssocId(0xaaaa_aaaa_5555_0100));
    }

    #[test]
    fn test_header_id_prefix_match() {
        let id = NodeId::new(&[0xaa, 0xaa, 0xaa, 0xaa, 0x55, 0x55]).unwrap();
        assert!(id.matches_header_id(&[]));
        assert!(id.matches_header_id(&[0xaa, 0xaa, 0xaa, 0xaa]));
        assert!(!id.matches_header_id(&[0xaa, 0xab]));
        assert!(!id.matches_header_id(&[0xaa, 0xaa, 0xaa, 0xaa, 0x55, 0x55, 0x00]));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SharedKey::from_slice(&[7u8; 16]).unwrap();
        assert_eq!(format!("{:?}", key), "SharedKey(..)");
        assert!(SharedKey::from_slice(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_rekey_resets_counters() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let node = NodeId::new(&[1, 2, 3, 4, 5, 6]).unwrap();
        let open = || {
            SecurityAssociation::open(
                node.clone(),
                SharedKey::new([0; 16]),
                store.clone(),
                CounterPersistence::Volatile,
            )
            .unwrap()
        };
        open().guard().next_counters().unwrap();
        let mut assoc = open();
        assert_eq!(assoc.guard().next_counters().unwrap().restart, 1);

        assoc.rekey(SharedKey::new([1; 16])).unwrap();
        assert_eq!(assoc.key().as_bytes(), &[1; 16]);
        assert_eq!(assoc.guard().next_counters().unwrap().restart, 0);
    }
}
