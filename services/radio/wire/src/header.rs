//! Frame header layout and bit-packed field accessors.
//!
//! ```text
//! [fl][type|secure][seq<<4|idLen][id x idLen][bl]
//! ```
//!
//! `fl` counts every byte after itself. The packed bytes are read and written
//! through the small functions below rather than through struct layout, so
//! encode and decode stay symmetric.

use crate::WireError;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Smallest legal value of the frame length byte
pub const MIN_FRAME_LEN: u8 = 4;

/// Largest frame length byte for the small-frame profile
pub const SMALL_FRAME_MAX_LEN: u8 = 63;

/// Largest frame length byte the envelope can express
pub const MAX_FRAME_LEN: u8 = 255;

/// Largest ID length expressible in the header nibble
pub const MAX_ID_LEN: usize = 15;

/// Largest ID length accepted by the structural check
pub const MAX_RX_ID_LEN: usize = 8;

/// Largest body length byte
pub const MAX_BODY_LEN: usize = 251;

/// Trailer length of an insecure frame (one CRC byte)
pub const INSECURE_TRAILER_LEN: usize = 1;

/// Trailer length of an AES-GCM-128 secure frame:
/// restart(3) + message(3) + tag(16) + format(1)
pub const SECURE_TRAILER_LEN: usize = 23;

/// Secure bit in the type byte
pub const SECURE_BIT: u8 = 0x80;

/// Frame type code (7 bits, never 0x00 or 0x7f)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameType(u8);

impl FrameType {
    /// 'O': valve percent, flags and optional JSON stats
    pub const O_FRAME: FrameType = FrameType(b'O');
    /// '!': secure "I'm alive" beacon with empty body
    pub const BEACON: FrameType = FrameType(b'!');

    /// Validate and wrap a raw 7-bit type code
    pub fn new(code: u8) -> Result<Self, WireError> {
        if code & SECURE_BIT != 0 || !type_code_allowed(code) {
            return Err(WireError::InvalidType(code));
        }
        Ok(Self(code))
    }

    /// Wrap a code already checked by `validate_structure`
    pub(crate) const fn from_checked_code(code: u8) -> Self {
        Self(code)
    }

    /// Raw 7-bit code
    pub fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "'{}'", self.0 as char)
        } else {
            write!(f, "{:#04x}", self.0)
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FrameType::new(value)
    }
}

/// True unless the (already masked) type code is reserved.
#[inline]
pub const fn type_code_allowed(code: u8) -> bool {
    code != 0x00 && code != 0x7f
}

/// Type code with the secure bit masked out.
#[inline]
pub const fn type_code(type_byte: u8) -> u8 {
    type_byte & !SECURE_BIT
}

/// Secure flag of the type byte.
#[inline]
pub const fn is_secure(type_byte: u8) -> bool {
    type_byte & SECURE_BIT != 0
}

/// Pack type code and secure flag into the type byte.
#[inline]
pub const fn pack_type_byte(code: u8, secure: bool) -> u8 {
    (code & !SECURE_BIT) | if secure { SECURE_BIT } else { 0 }
}

/// Sequence number (high nibble).
#[inline]
pub const fn seq_num(seq_il_byte: u8) -> u8 {
    seq_il_byte >> 4
}

/// ID length (low nibble).
#[inline]
pub const fn id_len(seq_il_byte: u8) -> u8 {
    seq_il_byte & 0x0f
}

/// Pack sequence number (mod 16) and ID length.
#[inline]
pub const fn pack_seq_il(seq: u8, il: u8) -> u8 {
    ((seq & 0x0f) << 4) | (il & 0x0f)
}

/// Trailer length implied by the secure flag.
#[inline]
pub const fn trailer_len_for(secure: bool) -> usize {
    if secure {
        SECURE_TRAILER_LEN
    } else {
        INSECURE_TRAILER_LEN
    }
}

/// Header fields of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame length byte (excludes itself)
    pub fl: u8,
    /// Type code
    pub frame_type: FrameType,
    /// Secure flag
    pub secure: bool,
    /// Sequence number mod 16
    pub seq_num: u8,
    /// Leading bytes of the sender (or recipient) ID
    pub id: SmallVec<[u8; 8]>,
    /// Body length as transmitted
    pub body_len: u8,
}

impl FrameHeader {
    /// Build a header, deriving `fl` from the trailer length implied by `secure`.
    ///
    /// Fails with `InvalidLength` if the ID or body is too long or `fl` would
    /// exceed 255.
    pub fn new(
        frame_type: FrameType,
        secure: bool,
        seq_num: u8,
        id: &[u8],
        body_len: usize,
    ) -> Result<Self, WireError> {
        if id.len() > MAX_ID_LEN {
            return Err(WireError::InvalidLength("id longer than 15 bytes"));
        }
        if body_len > MAX_BODY_LEN {
            return Err(WireError::InvalidLength("body longer than 251 bytes"));
        }
        let fl = 3 + id.len() + body_len + trailer_len_for(secure);
        if fl > MAX_FRAME_LEN as usize {
            return Err(WireError::InvalidLength("frame longer than 255 bytes"));
        }
        Ok(Self {
            fl: fl as u8,
            frame_type,
            secure,
            seq_num: seq_num & 0x0f,
            id: SmallVec::from_slice(id),
            body_len: body_len as u8,
        })
    }

    /// Encoded header size in bytes, including the length byte
    pub fn encoded_len(&self) -> usize {
        4 + self.id.len()
    }

    /// Trailer length implied by `fl`
    pub fn trailer_len(&self) -> usize {
        self.fl as usize - 3 - self.id.len() - self.body_len as usize
    }

    /// Encode the header bytes (length byte through body length byte)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.fl);
        buf.put_u8(pack_type_byte(self.frame_type.code(), self.secure));
        buf.put_u8(pack_seq_il(self.seq_num, self.id.len() as u8));
        buf.put_slice(&self.id);
        buf.put_u8(self.body_len);
    }
}

/// Encode a header per the envelope rules.
///
/// `type_code` is validated after masking out the secure bit.
pub fn encode_header(
    type_code: u8,
    secure: bool,
    seq_num: u8,
    id: &[u8],
    body_len: usize,
) -> Result<BytesMut, WireError> {
    let frame_type = FrameType::new(type_code & !SECURE_BIT)
        .map_err(|_| WireError::InvalidLength("reserved frame type"))?;
    let header = FrameHeader::new(frame_type, secure, seq_num, id, body_len)?;
    let mut buf = BytesMut::with_capacity(header.fl as usize + 1);
    header.encode(&mut buf);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_roundtrip() {
        for code in 1..0x7fu8 {
            for secure in [false, true] {
                let b = pack_type_byte(code, secure);
                assert_eq!(type_code(b), code);
                assert_eq!(is_secure(b), secure);
            }
        }
        for seq in 0..16u8 {
            for il in 0..16u8 {
                let b = pack_seq_il(seq, il);
                assert_eq!(seq_num(b), seq);
                assert_eq!(id_len(b), il);
            }
        }
    }

    #[test]
    fn test_frame_type_rejects_reserved() {
        assert!(FrameType::new(0x00).is_err());
        assert!(FrameType::new(0x7f).is_err());
        assert!(FrameType::new(0xcf).is_err());
        assert_eq!(FrameType::try_from(b'O').unwrap(), FrameType::O_FRAME);
        assert_eq!(FrameType::O_FRAME.to_string(), "'O'");
    }

    #[test]
    fn test_encode_header_scenario() {
        let buf = encode_header(b'O', false, 0, &[0x80, 0x81], 2).unwrap();
        assert_eq!(&buf[..], &hex::decode("084f02808102").unwrap()[..]);
    }

    #[test]
    fn test_encode_header_secure() {
        let buf = encode_header(b'O', true, 9, &[0xaa; 4], 32).unwrap();
        assert_eq!(&buf[..], &hex::decode("3ecf94aaaaaaaa20").unwrap()[..]);
    }

    #[test]
    fn test_encode_header_masks_secure_bit_before_type_check() {
        assert!(matches!(
            encode_header(0xff, true, 0, &[], 0),
            Err(WireError::InvalidLength(_))
        ));
        assert!(matches!(
            encode_header(0x80, false, 0, &[], 0),
            Err(WireError::InvalidLength(_))
        ));
        assert!(encode_header(0xcf, true, 0, &[], 0).is_ok());
    }

    #[test]
    fn test_encode_header_limits() {
        assert!(encode_header(b'O', false, 0, &[0u8; 16], 0).is_err());
        assert!(encode_header(b'O', false, 0, &[], 252).is_err());
        // 3 + 8 + 251 + 1 > 255
        assert!(encode_header(b'O', false, 0, &[0u8; 8], 251).is_err());
        // 3 + 0 + 251 + 1 == 255
        let buf = encode_header(b'O', false, 0, &[], 251).unwrap();
        assert_eq!(buf[0], 255);
    }

    #[test]
    fn test_trailer_len() {
        let h = FrameHeader::new(FrameType::O_FRAME, true, 3, &[1, 2, 3, 4], 32).unwrap();
        assert_eq!(h.trailer_len(), SECURE_TRAILER_LEN);
        assert_eq!(h.encoded_len(), 8);
    }
}
