//! Structural integrity checks and the decoded frame view.
//!
//! `validate_structure` is the cheap pre-CRC, pre-crypto gate. Each of its
//! steps only relies on fields proven sane by the step before, so it can be
//! run on a noisy or partially received buffer without indexing past
//! `fl + 1` bytes. It allocates nothing and touches nothing but its input.

use crate::header::{
    id_len, is_secure, seq_num, type_code, type_code_allowed, FrameType, INSECURE_TRAILER_LEN,
    MAX_RX_ID_LEN, MIN_FRAME_LEN,
};
use crate::WireError;

/// Field offsets and lengths established by the structural check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Frame length byte
    pub fl: u8,
    /// Number of ID bytes in the header
    pub id_len: u8,
    /// Body length as transmitted
    pub body_len: u8,
    /// Trailer length derived from the other fields
    pub trailer_len: u8,
    /// Secure flag from the type byte
    pub secure: bool,
}

impl FrameLayout {
    /// Total frame size in bytes including the length byte
    pub fn total_len(&self) -> usize {
        self.fl as usize + 1
    }

    /// Header size in bytes including the length and body length bytes
    pub fn header_len(&self) -> usize {
        4 + self.id_len as usize
    }

    /// Offset of the first body byte
    pub fn body_offset(&self) -> usize {
        self.header_len()
    }

    /// Offset of the first trailer byte
    pub fn trailer_offset(&self) -> usize {
        self.header_len() + self.body_len as usize
    }
}

/// Fast structural validation of a raw frame buffer.
///
/// `max_fl` caps the frame length byte (63 for the small-frame profile).
/// Bytes beyond `fl + 1` are ignored.
pub fn validate_structure(buf: &[u8], max_fl: u8) -> Result<FrameLayout, WireError> {
    // 1. Frame length in range and fully present.
    let fl = *buf.first().ok_or(WireError::Malformed)?;
    if fl < MIN_FRAME_LEN || fl > max_fl || buf.len() < fl as usize + 1 {
        return Err(WireError::Malformed);
    }

    // 2. Type byte.
    let type_byte = buf[1];
    if !type_code_allowed(type_code(type_byte)) || matches!(type_byte, 0x00 | 0x80 | 0xff) {
        return Err(WireError::Malformed);
    }
    let secure = is_secure(type_byte);

    // 3. ID length.
    let il = id_len(buf[2]);
    if il as usize > MAX_RX_ID_LEN || il > fl - 4 {
        return Err(WireError::Malformed);
    }

    // 4. Body and trailer lengths; 3 + il <= fl - 1 so the index is in bounds.
    let bl = buf[3 + il as usize];
    if bl > fl - 4 - il {
        return Err(WireError::Malformed);
    }
    let tl = fl - 3 - il - bl;
    if tl < 1 || (!secure && tl as usize != INSECURE_TRAILER_LEN) {
        return Err(WireError::Malformed);
    }
    if matches!(buf[fl as usize], 0x00 | 0xff) {
        return Err(WireError::Malformed);
    }

    Ok(FrameLayout {
        fl,
        id_len: il,
        body_len: bl,
        trailer_len: tl,
        secure,
    })
}

/// Borrowed view over a structurally valid frame.
///
/// Header fields are parsed for length only; for secure frames nothing here
/// is trustworthy until the trailer authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    raw: &'a [u8],
    layout: FrameLayout,
}

impl<'a> Frame<'a> {
    /// Validate and split a raw buffer without copying.
    pub fn decode(buf: &'a [u8], max_fl: u8) -> Result<Self, WireError> {
        let layout = validate_structure(buf, max_fl)?;
        Ok(Self {
            raw: &buf[..layout.total_len()],
            layout,
        })
    }

    /// Layout established by the structural check
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Frame type code
    pub fn frame_type(&self) -> FrameType {
        // The structural check already rejected reserved codes.
        FrameType::from_checked_code(type_code(self.raw[1]))
    }

    /// Raw 7-bit type code
    pub fn type_code(&self) -> u8 {
        type_code(self.raw[1])
    }

    /// Secure flag
    pub fn is_secure(&self) -> bool {
        self.layout.secure
    }

    /// Sequence number mod 16
    pub fn seq_num(&self) -> u8 {
        seq_num(self.raw[2])
    }

    /// ID bytes carried in the header
    pub fn id(&self) -> &'a [u8] {
        &self.raw[3..3 + self.layout.id_len as usize]
    }

    /// Body length as transmitted
    pub fn body_len(&self) -> usize {
        self.layout.body_len as usize
    }

    /// Body bytes (ciphertext for secure frames)
    pub fn body(&self) -> &'a [u8] {
        &self.raw[self.layout.body_offset()..self.layout.trailer_offset()]
    }

    /// Trailer bytes
    pub fn trailer(&self) -> &'a [u8] {
        &self.raw[self.layout.trailer_offset()..]
    }

    /// Header bytes from the length byte through the body length byte
    pub fn header_bytes(&self) -> &'a [u8] {
        &self.raw[..self.layout.header_len()]
    }

    /// Header and body, i.e. everything the CRC covers
    pub fn header_and_body(&self) -> &'a [u8] {
        &self.raw[..self.layout.trailer_offset()]
    }

    /// Whole frame including the length byte
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }
}
