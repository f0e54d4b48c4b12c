//! The AES-GCM primitive seam.
//!
//! The codec treats the cipher as an opaque in-place encrypt/decrypt given
//! key, IV and associated data, with a detached 16-byte tag.

use crate::association::SharedKey;
use crate::nonce::IV_LEN;
use crate::SecureError;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce, Tag};

/// Authentication tag length
pub const TAG_LEN: usize = 16;

/// Authenticated encryption with detached tag
pub trait AeadPrimitive: Send + Sync {
    /// Encrypt `buf` in place and return the tag
    fn encrypt(
        &self,
        key: &SharedKey,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        buf: &mut [u8],
    ) -> Result<[u8; TAG_LEN], SecureError>;

    /// Verify and decrypt `buf` in place.
    ///
    /// On failure the contents of `buf` are unspecified and must be discarded.
    fn decrypt(
        &self,
        key: &SharedKey,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        buf: &mut [u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<(), SecureError>;
}

/// AES-128-GCM from the `aes-gcm` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes128GcmPrimitive;

impl AeadPrimitive for Aes128GcmPrimitive {
    fn encrypt(
        &self,
        key: &SharedKey,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        buf: &mut [u8],
    ) -> Result<[u8; TAG_LEN], SecureError> {
        let cipher = Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| SecureError::InvalidKey("key must be 16 bytes"))?;
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buf)
            .map_err(|_| SecureError::EncryptionFailed)?;
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    fn decrypt(
        &self,
        key: &SharedKey,
        iv: &[u8; IV_LEN],
        aad: &[u8],
        buf: &mut [u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<(), SecureError> {
        let cipher = Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| SecureError::InvalidKey("key must be 16 bytes"))?;
        cipher
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, buf, Tag::from_slice(tag))
            .map_err(|_| SecureError::AuthenticationFailed)
    }
}
