//! Secure frame error types.

use radio_storage::StorageError;
use radio_wire::WireError;
use thiserror::Error;

/// Secure layer errors
#[derive(Error, Debug)]
pub enum SecureError {
    /// Envelope-level failure (malformed, bad CRC, bad length)
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Counter persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Counters not newer than the last accepted pair
    #[error("replayed or stale counters")]
    ReplayRejected,

    /// Tag did not verify
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Authenticated plaintext carried an inconsistent pad count
    #[error("invalid padding")]
    PaddingInvalid,

    /// Restart and message counters are used up for this key
    #[error("counter space exhausted; key must be replaced")]
    CounterSpaceExhausted,

    /// The AEAD primitive refused to encrypt
    #[error("encryption failed")]
    EncryptionFailed,

    /// No association matches the header ID
    #[error("no association for node id")]
    UnknownNode,

    /// Bad key or node ID material
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),
}

impl SecureError {
    /// True when the error needs out-of-band action rather than a dropped frame.
    ///
    /// Receive-side failures are never fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SecureError::CounterSpaceExhausted | SecureError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exhaustion_and_storage_are_fatal() {
        assert!(SecureError::CounterSpaceExhausted.is_fatal());
        assert!(SecureError::Storage(StorageError::Invalid("x".into())).is_fatal());

        for e in [
            SecureError::ReplayRejected,
            SecureError::AuthenticationFailed,
            SecureError::PaddingInvalid,
            SecureError::UnknownNode,
            SecureError::Wire(WireError::Malformed),
            SecureError::Wire(WireError::CrcMismatch),
        ] {
            assert!(!e.is_fatal(), "{e}");
        }
    }
}
