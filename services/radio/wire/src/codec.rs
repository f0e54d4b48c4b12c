//! Encoding and decoding of insecure frames.
//!
//! This module provides the frame builder and the CRC7 trailer helpers used
//! by frames whose secure bit is clear.

use crate::crc::Crc7;
use crate::frame::Frame;
use crate::header::{FrameHeader, FrameType};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Append the CRC7 trailer to a buffer holding header and body.
///
/// The CRC covers every byte from the frame length byte to the end of the body.
pub fn append_crc_trailer(header_and_body: &mut BytesMut) {
    let mut hasher = Crc7::new();
    hasher.update(header_and_body);
    header_and_body.put_u8(hasher.finalize());
}

/// Recompute and compare the CRC7 trailer of an insecure frame.
pub fn verify_crc_trailer(frame: &Frame<'_>) -> bool {
    if frame.is_secure() {
        return false;
    }
    let mut hasher = Crc7::new();
    hasher.update(frame.header_and_body());
    frame.trailer() == [hasher.finalize()]
}

/// Structural check followed by CRC verification.
pub fn decode_insecure(buf: &[u8], max_fl: u8) -> Result<Frame<'_>, WireError> {
    let frame = Frame::decode(buf, max_fl)?;
    if frame.is_secure() {
        return Err(WireError::Malformed);
    }
    if !verify_crc_trailer(&frame) {
        debug!(len = frame.as_bytes().len(), "dropping frame: crc mismatch");
        return Err(WireError::CrcMismatch);
    }
    Ok(frame)
}

/// Frame builder for insecure frames
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    frame_type: FrameType,
    seq_num: u8,
    id: Bytes,
    body: Bytes,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            seq_num: 0,
            id: Bytes::new(),
            body: Bytes::new(),
        }
    }

    /// Set sequence number (taken mod 16)
    pub fn seq_num(mut self, seq: u8) -> Self {
        self.seq_num = seq & 0x0f;
        self
    }

    /// Set the leading ID bytes carried in the header
    pub fn id(mut self, id: impl Into<Bytes>) -> Self {
        self.id = id.into();
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the frame: header, body, CRC7 trailer.
    ///
    /// `max_fl` caps the frame length byte, as for the receiver.
    pub fn build(self, max_fl: u8) -> Result<Bytes, WireError> {
        let header = FrameHeader::new(
            self.frame_type,
            false,
            self.seq_num,
            &self.id,
            self.body.len(),
        )?;
        if header.fl > max_fl {
            return Err(WireError::InvalidLength("frame longer than profile maximum"));
        }

        let mut buf = BytesMut::with_capacity(header.fl as usize + 1);
        header.encode(&mut buf);
        buf.put_slice(&self.body);
        append_crc_trailer(&mut buf);

        Ok(buf.freeze())
    }
}
