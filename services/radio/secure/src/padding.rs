//! Plaintext padding for secure bodies.
//!
//! The body is extended with zero bytes to 15 mod 16, then one byte holding
//! the number of zero bytes added. The pad count never exceeds 31, so its
//! top three bits are always clear.

use crate::SecureError;
use radio_wire::{WireError, MAX_SECURE_BODY_LEN};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Largest pad count; larger values or reserved bits are rejected
pub const MAX_PAD_COUNT: u8 = 31;

const PAD_RESERVED_BITS: u8 = 0xe0;

/// Padded plaintext; two AES blocks fit inline
pub type PaddedBody = SmallVec<[u8; 32]>;

/// How far to pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingProfile {
    /// Always 32 bytes, hiding the body length; bodies up to 31 bytes
    #[default]
    Fixed32,
    /// Smallest multiple of 16 that holds the body and the count byte
    Block16,
}

impl PaddingProfile {
    /// Padded length for a body of `len` bytes
    pub fn padded_len(self, len: usize) -> Result<usize, SecureError> {
        match self {
            PaddingProfile::Fixed32 if len <= MAX_SECURE_BODY_LEN => Ok(32),
            PaddingProfile::Fixed32 => {
                Err(WireError::InvalidLength("body too long for 32-byte padding").into())
            }
            PaddingProfile::Block16 => Ok((len / 16 + 1) * 16),
        }
    }
}

/// Pad `body` according to `profile`
pub fn pad(body: &[u8], profile: PaddingProfile) -> Result<PaddedBody, SecureError> {
    let padded_len = profile.padded_len(body.len())?;
    let pad_count = padded_len - 1 - body.len();
    let mut out = PaddedBody::with_capacity(padded_len);
    out.extend_from_slice(body);
    out.resize(padded_len - 1, 0);
    out.push(pad_count as u8);
    Ok(out)
}

/// Strip padding in place, accepting either profile.
///
/// The pad bytes themselves must be zero.
pub fn unpad(buf: &mut PaddedBody) -> Result<(), SecureError> {
    let Some(&count) = buf.last() else {
        return Err(SecureError::PaddingInvalid);
    };
    if count & PAD_RESERVED_BITS != 0 || count as usize + 1 > buf.len() {
        return Err(SecureError::PaddingInvalid);
    }
    let len = buf.len() - 1 - count as usize;
    if buf[len..buf.len() - 1].iter().any(|&b| b != 0) {
        return Err(SecureError::PaddingInvalid);
    }
    buf.truncate(len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed32_matches_published_plaintext() {
        let body = hex::decode("7f117b2262223a31").unwrap();
        let padded = pad(&body, PaddingProfile::Fixed32).unwrap();
        assert_eq!(padded.len(), 32);
        assert_eq!(&padded[..8], &body[..]);
        assert!(padded[8..31].iter().all(|&b| b == 0));
        assert_eq!(padded[31], 0x17);
    }

    #[test]
    fn test_block16_lengths() {
        assert_eq!(PaddingProfile::Block16.padded_len(0).unwrap(), 16);
        assert_eq!(PaddingProfile::Block16.padded_len(15).unwrap(), 16);
        assert_eq!(PaddingProfile::Block16.padded_len(16).unwrap(), 32);
        let padded = pad(&[1, 2, 3], PaddingProfile::Block16).unwrap();
        assert_eq!(padded.len(), 16);
        assert_eq!(padded[15], 12);
    }

    #[test]
    fn test_unpad_roundtrip_all_small_bodies() {
        for profile in [PaddingProfile::Fixed32, PaddingProfile::Block16] {
            for len in 0..=MAX_SECURE_BODY_LEN {
                let body: Vec<u8> = (0..len as u8).collect();
                let mut padded = pad(&body, profile).unwrap();
                assert_eq!(padded.len() % 16, 0);
                unpad(&mut padded).unwrap();
                assert_eq!(&padded[..], &body[..]);
            }
        }
    }

    #[test]
    fn test_unpad_rejects_inconsistent_counts() {
        let mut reserved = PaddedBody::from_slice(&[0u8; 15]);
        reserved.push(0x20);
        assert!(matches!(unpad(&mut reserved), Err(SecureError::PaddingInvalid)));

        let mut too_long = PaddedBody::from_slice(&[0u8; 15]);
        too_long.push(16);
        assert!(matches!(unpad(&mut too_long), Err(SecureError::PaddingInvalid)));

        assert!(unpad(&mut PaddedBody::new()).is_err());

        let mut dirty = pad(&[1, 2, 3], PaddingProfile::Block16).unwrap();
        dirty[10] = 0x01;
        assert!(matches!(unpad(&mut dirty), Err(SecureError::PaddingInvalid)));

        let mut zero_count = PaddedBody::from_slice(&[0xffu8; 15]);
        zero_count.push(0);
        unpad(&mut zero_count).unwrap();
        assert_eq!(zero_count.len(), 15);
        assert!(pad(&[0u8; 32], PaddingProfile::Fixed32).is_err());
    }
}
