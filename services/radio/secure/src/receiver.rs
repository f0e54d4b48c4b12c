//! Inbound pipeline: structural check, then CRC or secure decode.
//!
//! Every dropped frame is counted by category; the counters are the only
//! operator-visible signal. Drops are logged without frame contents.

use crate::aead::{AeadPrimitive, Aes128GcmPrimitive};
use crate::association::NodeId;
use crate::codec::{SecureBody, SecureFrameCodec};
use crate::keys::AssociationTable;
use crate::link::RadioLink;
use crate::SecureError;
use radio_wire::{verify_crc_trailer, Frame, FrameType, OFrameBody, WireError};
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A frame that passed every check
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    /// Frame type
    pub frame_type: FrameType,
    /// Whether the frame was authenticated
    pub secure: bool,
    /// Header sequence number
    pub seq_num: u8,
    /// Header ID bytes
    pub id: SmallVec<[u8; 8]>,
    /// Full ID of the authenticated sender; `None` for insecure frames
    pub node_id: Option<NodeId>,
    /// Plaintext body
    pub body: SecureBody,
}

impl ReceivedFrame {
    /// Parse the body as an 'O' frame, if it is one
    pub fn o_frame(&self) -> Option<Result<OFrameBody, WireError>> {
        (self.frame_type == FrameType::O_FRAME).then(|| OFrameBody::decode(&self.body))
    }
}

/// Drop counters
#[derive(Debug, Default)]
pub struct ReceiverStats {
    received: AtomicU64,
    accepted: AtomicU64,
    malformed: AtomicU64,
    crc_mismatch: AtomicU64,
    unknown_node: AtomicU64,
    replayed: AtomicU64,
    auth_failed: AtomicU64,
    padding_invalid: AtomicU64,
    other: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStatsSnapshot {
    /// Buffers handed in
    pub received: u64,
    /// Frames delivered
    pub accepted: u64,
    /// Failed the structural check or secure trailer checks
    pub malformed: u64,
    /// Insecure frames with a bad CRC
    pub crc_mismatch: u64,
    /// Secure frames with no matching association
    pub unknown_node: u64,
    /// Stale counters
    pub replayed: u64,
    /// Tag did not verify under any candidate key
    pub auth_failed: u64,
    /// Authenticated but inconsistent padding
    pub padding_invalid: u64,
    /// Anything else (storage, key material)
    pub other: u64,
}

impl ReceiverStatsSnapshot {
    /// Total frames dropped
    pub fn dropped(&self) -> u64 {
        self.malformed
            + self.crc_mismatch
            + self.unknown_node
            + self.replayed
            + self.auth_failed
            + self.padding_invalid
            + self.other
    }
}

impl ReceiverStats {
    fn record_drop(&self, err: &SecureError) {
        let counter = match err {
            SecureError::Wire(WireError::CrcMismatch) => &self.crc_mismatch,
            SecureError::Wire(_) => &self.malformed,
            SecureError::UnknownNode => &self.unknown_node,
            SecureError::ReplayRejected => &self.replayed,
            SecureError::AuthenticationFailed => &self.auth_failed,
            SecureError::PaddingInvalid => &self.padding_invalid,
            _ => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            crc_mismatch: self.crc_mismatch.load(Ordering::Relaxed),
            unknown_node: self.unknown_node.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            auth_failed: self.auth_failed.load(Ordering::Relaxed),
            padding_invalid: self.padding_invalid.load(Ordering::Relaxed),
            other: self.other.load(Ordering::Relaxed),
        }
    }
}

/// Receive pipeline over a set of associations
pub struct FrameReceiver<A = Aes128GcmPrimitive> {
    codec: SecureFrameCodec<A>,
    table: Arc<AssociationTable>,
    stats: ReceiverStats,
}

impl<A: AeadPrimitive> FrameReceiver<A> {
    /// Create a receiver
    pub fn new(codec: SecureFrameCodec<A>, table: Arc<AssociationTable>) -> Self {
        Self {
            codec,
            table,
            stats: ReceiverStats::default(),
        }
    }

    /// Drop counters
    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Run one buffer through the pipeline, counting the outcome
    pub fn process(&self, buf: &[u8]) -> Result<ReceivedFrame, SecureError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let result = self.process_inner(buf);
        match &result {
            Ok(_) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.record_drop(e);
                debug!(len = buf.len(), reason = %e, "dropping frame");
            }
        }
        result
    }

    fn process_inner(&self, buf: &[u8]) -> Result<ReceivedFrame, SecureError> {
        let frame = Frame::decode(buf, self.codec.max_fl())?;
        let (node_id, body) = if frame.is_secure() {
            let (assoc, body) = self.table.decode(&self.codec, &frame)?;
            (Some(assoc.node_id().clone()), body)
        } else {
            if !verify_crc_trailer(&frame) {
                return Err(WireError::CrcMismatch.into());
            }
            (None, SecureBody::from_slice(frame.body()))
        };
        Ok(ReceivedFrame {
            frame_type: frame.frame_type(),
            secure: frame.is_secure(),
            seq_num: frame.seq_num(),
            id: SmallVec::from_slice(frame.id()),
            node_id,
            body,
        })
    }

    /// Receive from `link` until it closes, handing accepted frames to `on_frame`.
    pub async fn run<L, F>(&self, link: &L, mut on_frame: F) -> std::io::Result<()>
    where
        L: RadioLink + ?Sized,
        F: FnMut(ReceivedFrame) + Send,
    {
        info!("receiver started");
        loop {
            match link.receive_bytes().await {
                Ok(Some(buf)) => {
                    if let Ok(frame) = self.process(&buf) {
                        on_frame(frame);
                    }
                }
                Ok(None) => {
                    info!("radio link closed");
                    return Ok(());
                }
                Err(e) => {
                    error!("radio link receive failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{SecurityAssociation, SharedKey};
    use crate::link::LoopbackLink;
    use crate::nonce::Direction;
    use crate::replay::CounterPersistence;
    use radio_storage::{CounterStore, MemoryCounterStore};
    use radio_wire::{FrameBuilder, OFrameFlags, SMALL_FRAME_MAX_LEN};

    const PUBLISHED: &str = "3ecf94aaaaaaaa20b345f92969570cb8286614b4f069b00871dad8fe47c1c353834888037d587575\
                             00002a000319293b3152c326d26dd08d701e4b680dcb80";

    fn vector_receiver() -> FrameReceiver {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let mut table = AssociationTable::new();
        table
            .insert(
                SecurityAssociation::open(
                    NodeId::new(&[0xaa, 0xaa, 0xaa, 0xaa, 0x55, 0x55]).unwrap(),
                    SharedKey::new([0; 16]),
                    store,
                    CounterPersistence::Volatile,
                )
                .unwrap(),
            )
            .unwrap();
        FrameReceiver::new(
            SecureFrameCodec::new().direction(Direction::Receiving),
            Arc::new(table),
        )
    }

    #[test]
    fn test_pipeline_counts_each_category() {
        let rx = vector_receiver();
        let secure = hex::decode(PUBLISHED).unwrap();

        let frame = rx.process(&secure).unwrap();
        assert!(frame.secure);
        assert_eq!(frame.seq_num, 9);
        assert_eq!(frame.node_id.as_ref().unwrap().to_string(), "aaaaaaaa5555");
        let body = frame.o_frame().unwrap().unwrap();
        assert!(body.flags.contains(OFrameFlags::STATS_PRESENT));
        assert_eq!(body.stats_json().unwrap()["b"], 1);

        assert!(matches!(rx.process(&secure), Err(SecureError::ReplayRejected)));
        assert!(rx.process(&[0x00, 0x01]).is_err());
        assert!(rx.process(&hex::decode("084f020000010002").unwrap()).is_err());

        let mut bad_crc = hex::decode("084f02808102000123").unwrap();
        bad_crc[8] = 0x24;
        assert!(matches!(
            rx.process(&bad_crc),
            Err(SecureError::Wire(WireError::CrcMismatch))
        ));

        let mut foreign = secure.clone();
        foreign[3] = 0xbb;
        assert!(matches!(rx.process(&foreign), Err(SecureError::UnknownNode)));

        let stats = rx.stats().snapshot();
        assert_eq!(stats.received, 6);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.replayed, 1);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.crc_mismatch, 1);
        assert_eq!(stats.unknown_node, 1);
        assert_eq!(stats.dropped(), 5);
    }

    #[test]
    fn test_insecure_frame_passes_through() {
        let rx = vector_receiver();
        let frame = rx
            .process(&hex::decode("0e4f028081087f117b2262223a3161").unwrap())
            .unwrap();
        assert!(!frame.secure);
        assert!(frame.node_id.is_none());
        assert_eq!(&frame.id[..], &[0x80, 0x81]);
        assert_eq!(frame.o_frame().unwrap().unwrap().valve_pc, None);
    }

    #[tokio::test]
    async fn test_run_over_loopback() {
        let rx = vector_receiver();
        let (a, b) = LoopbackLink::pair(8);

        let insecure = FrameBuilder::new(FrameType::O_FRAME)
            .id(vec![0x80, 0x81])
            .body(vec![0x00, 0x01])
            .build(SMALL_FRAME_MAX_LEN)
            .unwrap();
        a.send_bytes(insecure).await.unwrap();
        a.send_bytes(bytes::Bytes::from_static(&[0xff, 0xff])).await.unwrap();
        a.send_bytes(hex::decode(PUBLISHED).unwrap().into()).await.unwrap();
        drop(a);

        let mut got = Vec::new();
        rx.run(&b, |f| got.push(f)).await.unwrap();

        assert_eq!(got.len(), 2);
        assert!(!got[0].secure);
        assert!(got[1].secure);
        assert_eq!(rx.stats().snapshot().malformed, 1);
    }
}
