//! Small-frame radio envelope: structural checks, CRC7 trailer, and 'O' frame bodies.
//!
//! This crate provides the carrier-agnostic frame layer used by low-power
//! sensor and valve nodes. It lets a receiver reject malformed or
//! uninteresting frames cheaply, before spending time on CRC or crypto.
//!
//! ## Features
//!
//! - **Fast Structural Check**: bounded, non-allocating, safe on noisy buffers
//! - **Zero-Copy Decode**: `Frame` borrows header, body and trailer slices
//! - **CRC7 Trailer**: Koopman 0x5B, never 0x00 or 0xff on the wire
//! - **'O' Frame Bodies**: valve position, status flags, compact JSON stats
//!
//! ## Wire Format
//!
//! ```text
//! +-------+-------------+----------------+----------+------+----------+-------------+
//! | fl    | type|secure | seq<<4 | idLen | id (il)  | bl   | body(bl) | trailer(tl) |
//! +-------+-------------+----------------+----------+------+----------+-------------+
//! tl = fl - 3 - il - bl
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod body;
pub mod codec;
pub mod crc;
pub mod error;
pub mod frame;
pub mod header;

// Re-export main types
pub use body::{OFrameBody, OFrameFlags, Occupancy, MAX_SECURE_BODY_LEN, VALVE_INVALID};
pub use codec::{append_crc_trailer, decode_insecure, verify_crc_trailer, FrameBuilder};
pub use crc::{crc7_5b, crc7_5b_finalize, crc7_5b_update, Crc7, CRC7_INIT};
pub use error::WireError;
pub use frame::{validate_structure, Frame, FrameLayout};
pub use header::{
    encode_header, FrameHeader, FrameType, INSECURE_TRAILER_LEN, MAX_BODY_LEN, MAX_FRAME_LEN,
    MAX_ID_LEN, MAX_RX_ID_LEN, SECURE_TRAILER_LEN, SMALL_FRAME_MAX_LEN,
};
