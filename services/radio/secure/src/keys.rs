//! Association lookup by header ID prefix.
//!
//! A header may carry only a few leading ID bytes, so several associations can
//! match one frame. All of them are tried in insertion order; the first that
//! authenticates wins.

use crate::aead::AeadPrimitive;
use crate::association::{NodeId, SecurityAssociation, SharedKey};
use crate::codec::{SecureBody, SecureFrameCodec};
use crate::SecureError;
use radio_wire::Frame;
use std::sync::Arc;
use tracing::{debug, info};

/// Known associations, searched by header ID prefix
#[derive(Debug, Default)]
pub struct AssociationTable {
    entries: Vec<Arc<SecurityAssociation>>,
}

impl AssociationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an association; node IDs must be unique
    pub fn insert(
        &mut self,
        assoc: SecurityAssociation,
    ) -> Result<Arc<SecurityAssociation>, SecureError> {
        if self.get(assoc.node_id()).is_some() {
            return Err(SecureError::InvalidKey("duplicate node id"));
        }
        info!(node = %assoc.node_id(), "association added");
        let assoc = Arc::new(assoc);
        self.entries.push(assoc.clone());
        Ok(assoc)
    }

    /// Number of associations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are none
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Association for an exact node ID
    pub fn get(&self, node_id: &NodeId) -> Option<&Arc<SecurityAssociation>> {
        self.entries.iter().find(|a| a.node_id() == node_id)
    }

    /// Associations whose node ID starts with `header_id`, in insertion order
    pub fn candidates<'a>(
        &'a self,
        header_id: &'a [u8],
    ) -> impl Iterator<Item = &'a Arc<SecurityAssociation>> + 'a {
        self.entries
            .iter()
            .filter(move |a| a.node_id().matches_header_id(header_id))
    }

    /// Key of the first association matching `header_id`
    pub fn lookup_key(&self, header_id: &[u8]) -> Option<&SharedKey> {
        self.entries
            .iter()
            .find(|a| a.node_id().matches_header_id(header_id))
            .map(|a| a.key())
    }

    /// Decode a secure frame against every matching association.
    ///
    /// Key-independent failures (malformed trailer, storage) stop the search;
    /// authentication, replay and padding failures move on to the next
    /// candidate. With no candidate at all the result is `UnknownNode`.
    pub fn decode<A: AeadPrimitive>(
        &self,
        codec: &SecureFrameCodec<A>,
        frame: &Frame<'_>,
    ) -> Result<(Arc<SecurityAssociation>, SecureBody), SecureError> {
        let mut last_err = None;
        for assoc in self.candidates(frame.id()) {
            match codec.decode(frame, assoc) {
                Ok(body) => return Ok((assoc.clone(), body)),
                Err(e @ (SecureError::Wire(_) | SecureError::Storage(_))) => return Err(e),
                Err(e) => {
                    debug!(node = %assoc.node_id(), reason = %e, "candidate rejected frame");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(SecureError::UnknownNode))
    }
}
