//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Structural integrity check failed; drop silently
    #[error("malformed frame")]
    Malformed,

    /// Insecure frame CRC trailer did not match
    #[error("crc mismatch")]
    CrcMismatch,

    /// Field out of range while encoding a header
    #[error("invalid length: {0}")]
    InvalidLength(&'static str),

    /// Frame type code is reserved (0x00 or 0x7f)
    #[error("invalid frame type {0:#04x}")]
    InvalidType(u8),

    /// 'O' frame body could not be parsed or built
    #[error("invalid body: {0}")]
    Body(&'static str),
}
