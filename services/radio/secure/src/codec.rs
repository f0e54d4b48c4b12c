//! Secure frame encode and decode.
//!
//! ```text
//! header (AAD) | ciphertext (bl) | restart(3) | message(3) | tag(16) | 0x80
//! ```
//!
//! The header, including the length byte, is authenticated but not
//! encrypted. Header fields are parsed for lengths before decryption but are
//! not trusted until the tag verifies.

use crate::aead::{AeadPrimitive, Aes128GcmPrimitive, TAG_LEN};
use crate::association::SecurityAssociation;
use crate::counters::CounterPair;
use crate::nonce::{build_iv, Direction};
use crate::padding::{pad, unpad, PaddedBody, PaddingProfile};
use crate::replay::Freshness;
use crate::SecureError;
use bytes::{BufMut, Bytes, BytesMut};
use radio_wire::{Frame, FrameHeader, FrameType, WireError, SMALL_FRAME_MAX_LEN};
use tracing::debug;

/// Final trailer byte for AES-128-GCM with a 16-byte tag
pub const FORMAT_AES128_GCM: u8 = 0x80;

const COUNTERS_LEN: usize = 6;

/// Decrypted body of a secure frame
pub type SecureBody = PaddedBody;

/// Secure frame codec
#[derive(Debug, Clone)]
pub struct SecureFrameCodec<A = Aes128GcmPrimitive> {
    aead: A,
    padding: PaddingProfile,
    max_fl: u8,
    direction: Direction,
}

impl SecureFrameCodec<Aes128GcmPrimitive> {
    /// AES-128-GCM codec with the small-frame profile and fixed 32-byte padding
    pub fn new() -> Self {
        Self::with_primitive(Aes128GcmPrimitive)
    }
}

impl Default for SecureFrameCodec<Aes128GcmPrimitive> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AeadPrimitive> SecureFrameCodec<A> {
    /// Codec over a custom AEAD primitive
    pub fn with_primitive(aead: A) -> Self {
        Self {
            aead,
            padding: PaddingProfile::default(),
            max_fl: SMALL_FRAME_MAX_LEN,
            direction: Direction::default(),
        }
    }

    /// Set the padding profile used on encode
    pub fn padding(mut self, padding: PaddingProfile) -> Self {
        self.padding = padding;
        self
    }

    /// Set the largest frame length byte produced or accepted
    pub fn max_frame_len(mut self, max_fl: u8) -> Self {
        self.max_fl = max_fl;
        self
    }

    /// Set the IV direction bit for traffic handled by this codec
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Largest frame length byte
    pub fn max_fl(&self) -> u8 {
        self.max_fl
    }

    /// Encode a secure frame.
    ///
    /// `id` is the header ID and must be a prefix of the association's node
    /// ID; the remainder of the IV prefix comes from the association.
    pub fn encode(
        &self,
        frame_type: FrameType,
        id: &[u8],
        body: &[u8],
        assoc: &SecurityAssociation,
    ) -> Result<Bytes, SecureError> {
        let mut plaintext = pad(body, self.padding)?;
        self.seal(frame_type, id, &mut plaintext, assoc)
    }

    /// Encode an authenticated, empty-bodied beacon
    pub fn encode_beacon(
        &self,
        id: &[u8],
        assoc: &SecurityAssociation,
    ) -> Result<Bytes, SecureError> {
        self.seal(FrameType::BEACON, id, &mut PaddedBody::new(), assoc)
    }

    fn seal(
        &self,
        frame_type: FrameType,
        id: &[u8],
        plaintext: &mut PaddedBody,
        assoc: &SecurityAssociation,
    ) -> Result<Bytes, SecureError> {
        if !assoc.node_id().matches_header_id(id) {
            return Err(WireError::InvalidLength("header id is not a prefix of the node id").into());
        }
        // Size check before taking counters, so an oversized frame costs none.
        let mut header = FrameHeader::new(frame_type, true, 0, id, plaintext.len())?;
        if header.fl > self.max_fl {
            return Err(WireError::InvalidLength("frame longer than profile maximum").into());
        }

        let counters = assoc.guard().next_counters()?;
        header.seq_num = counters.seq_num();
        let iv = build_iv(
            &assoc.node_id().prefix6(),
            &counters.restart_bytes(),
            &counters.message_bytes(),
            self.direction,
        );

        let mut buf = BytesMut::with_capacity(header.fl as usize + 1);
        header.encode(&mut buf);
        let tag = self.aead.encrypt(assoc.key(), &iv, &buf, plaintext)?;

        buf.put_slice(&plaintext[..]);
        buf.put_slice(&counters.to_bytes());
        buf.put_slice(&tag);
        buf.put_u8(FORMAT_AES128_GCM);
        Ok(buf.freeze())
    }

    /// Decode a structurally valid secure frame for one association.
    ///
    /// Counters are committed only after the tag verifies and the padding
    /// is consistent.
    pub fn decode(
        &self,
        frame: &Frame<'_>,
        assoc: &SecurityAssociation,
    ) -> Result<SecureBody, SecureError> {
        let (counters, tag) = Self::split_trailer(frame)?;
        if !assoc.node_id().matches_header_id(frame.id()) {
            return Err(SecureError::UnknownNode);
        }
        if assoc.guard().accept_if_fresh(counters) == Freshness::Replayed {
            return Err(SecureError::ReplayRejected);
        }

        let iv = build_iv(
            &assoc.node_id().prefix6(),
            &counters.restart_bytes(),
            &counters.message_bytes(),
            self.direction,
        );
        let mut body = SecureBody::from_slice(frame.body());
        self.aead
            .decrypt(assoc.key(), &iv, frame.header_bytes(), &mut body, &tag)?;

        if !body.is_empty() {
            unpad(&mut body)?;
        }
        assoc.guard().commit(counters)?;
        Ok(body)
    }

    /// Checks that need no key: trailer format, body alignment, seq/counter
    /// agreement. Returns the trailer counters and tag.
    fn split_trailer(frame: &Frame<'_>) -> Result<(CounterPair, [u8; TAG_LEN]), SecureError> {
        let trailer = frame.trailer();
        if !frame.is_secure()
            || trailer.len() != COUNTERS_LEN + TAG_LEN + 1
            || trailer[COUNTERS_LEN + TAG_LEN] != FORMAT_AES128_GCM
            || frame.body_len() % 16 != 0
        {
            return Err(WireError::Malformed.into());
        }

        let mut raw = [0u8; COUNTERS_LEN];
        raw.copy_from_slice(&trailer[..COUNTERS_LEN]);
        let counters = CounterPair::from_bytes(&raw);
        if counters.seq_num() != frame.seq_num() {
            debug!(seq = frame.seq_num(), "dropping secure frame: seq does not match counters");
            return Err(WireError::Malformed.into());
        }

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&trailer[COUNTERS_LEN..COUNTERS_LEN + TAG_LEN]);
        Ok((counters, tag))
    }
}
