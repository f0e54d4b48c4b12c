//! AES-GCM IV assembly.
//!
//! ```text
//! +------------------+------------------+------------------+
//! | id prefix (6)    | restart (3, BE)  | message (3, BE)  |
//! +------------------+------------------+------------------+
//! ```
//!
//! The top bit of the sixth ID byte is replaced by the direction bit, which
//! is never transmitted.

use serde::{Deserialize, Serialize};

/// IV length for AES-GCM
pub const IV_LEN: usize = 12;

/// ID bytes folded into the IV
pub const ID_PREFIX_LEN: usize = 6;

const DIRECTION_BIT: u8 = 0x80;

/// Which way a key is being used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic from the owner of the ID
    #[default]
    Sending,
    /// Back-channel traffic to the owner of the ID
    Receiving,
}

/// Build the 12-byte IV.
pub fn build_iv(
    id_prefix: &[u8; ID_PREFIX_LEN],
    restart: &[u8; 3],
    message: &[u8; 3],
    direction: Direction,
) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    iv[..6].copy_from_slice(id_prefix);
    match direction {
        Direction::Sending => iv[5] |= DIRECTION_BIT,
        Direction::Receiving => iv[5] &= !DIRECTION_BIT,
    }
    iv[6..9].copy_from_slice(restart);
    iv[9..12].copy_from_slice(message);
    iv
}
