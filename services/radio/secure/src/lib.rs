//! Secure radio frames: AES-GCM with replay protection across restarts.
//!
//! This crate layers authenticated encryption over the `radio-wire`
//! envelope. The IV is never sent whole: it is rebuilt from the header ID,
//! the association's pre-shared node ID and the counters carried in the
//! trailer.
//!
//! ## Components
//!
//! - **Nonce assembly**: ID prefix, direction bit, restart and message counters
//! - **Replay guard**: persisted sender counters, receiver freshness check
//! - **Secure codec**: padding, AAD selection, trailer layout
//! - **Receive pipeline**: multi-candidate key lookup and drop counters
//!
//! ## Trailer Format
//!
//! ```text
//! +-------------+-------------+----------+------+
//! | restart (3) | message (3) | tag (16) | 0x80 |
//! +-------------+-------------+----------+------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod association;
pub mod codec;
pub mod counters;
pub mod error;
pub mod keys;
pub mod link;
pub mod nonce;
pub mod padding;
pub mod receiver;
pub mod replay;

// Re-export main types
pub use aead::{AeadPrimitive, Aes128GcmPrimitive, TAG_LEN};
pub use association::{NodeId, SecurityAssociation, SharedKey, KEY_LEN};
pub use codec::{SecureBody, SecureFrameCodec, FORMAT_AES128_GCM};
pub use counters::{CounterPair, COUNTER_MAX};
pub use error::SecureError;
pub use keys::AssociationTable;
pub use link::{LoopbackLink, RadioLink};
pub use nonce::{build_iv, Direction, ID_PREFIX_LEN, IV_LEN};
pub use padding::{pad, unpad, PaddingProfile, MAX_PAD_COUNT};
pub use receiver::{FrameReceiver, ReceivedFrame, ReceiverStats, ReceiverStatsSnapshot};
pub use replay::{CounterPersistence, Freshness, ReplayGuard, MESSAGE_SEED_MAX};
