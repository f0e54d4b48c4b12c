//! 'O' frame body: valve position, status flags and optional JSON stats.
//!
//! ```text
//! byte 0   bit 7 call-for-heat, bits 6..0 valve percent (0x7f = no valve)
//! byte 1   bit 7 fault, 6 low battery, 5 tamper, 4 stats present,
//!          bits 3..2 occupancy, bit 1 frost risk, bit 0 always sent as 1
//! byte 2.. compact JSON object with the closing '}' omitted
//! ```
//!
//! The stats-present flag is informational; the decoder looks at the body
//! length to decide whether stats follow.

use crate::WireError;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Byte 0 value meaning "no valve / position unknown"
pub const VALVE_INVALID: u8 = 0x7f;

/// Largest plaintext body that fits a small secure frame
pub const MAX_SECURE_BODY_LEN: usize = 31;

/// Bit 0 of the flags byte, always set on transmit
const FLAGS_BIT0: u8 = 0x01;

const OCCUPANCY_SHIFT: u8 = 2;
const OCCUPANCY_MASK: u8 = 0x03 << OCCUPANCY_SHIFT;

bitflags! {
    /// Status bits of the 'O' frame flags byte (occupancy excluded)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OFrameFlags: u8 {
        /// Device reports a fault
        const FAULT = 1 << 7;
        /// Battery low
        const LOW_BATTERY = 1 << 6;
        /// Tamper detected
        const TAMPER = 1 << 5;
        /// JSON stats follow the two fixed bytes
        const STATS_PRESENT = 1 << 4;
        /// Frost risk at the device
        const FROST_RISK = 1 << 1;
    }
}

/// Two-bit occupancy report
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    /// Not reported
    Unreported = 0,
    /// Probably vacant
    Vacant = 1,
    /// Possibly occupied
    Possibly = 2,
    /// Likely occupied
    Likely = 3,
}

impl From<u8> for Occupancy {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => Occupancy::Unreported,
            1 => Occupancy::Vacant,
            2 => Occupancy::Possibly,
            _ => Occupancy::Likely,
        }
    }
}

/// Decoded 'O' frame body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OFrameBody {
    /// Valve percent open (0..=100), or `None` for no valve
    pub valve_pc: Option<u8>,
    /// Call for heat
    pub call_for_heat: bool,
    /// Status flags
    pub flags: OFrameFlags,
    /// Occupancy report
    pub occupancy: Occupancy,
    /// Stats fragment as transmitted: starts with '{', no closing '}'
    pub stats: Option<String>,
}

impl OFrameBody {
    /// Body with no valve, no stats, nothing reported
    pub fn empty() -> Self {
        Self {
            valve_pc: None,
            call_for_heat: false,
            flags: OFrameFlags::empty(),
            occupancy: Occupancy::Unreported,
            stats: None,
        }
    }

    /// Set the valve position (percent open)
    pub fn with_valve(mut self, pc: u8) -> Result<Self, WireError> {
        if pc > 100 {
            return Err(WireError::Body("valve percent above 100"));
        }
        self.valve_pc = Some(pc);
        Ok(self)
    }

    /// Attach stats from a JSON object.
    ///
    /// The object is serialised compactly and its closing brace dropped.
    pub fn with_stats(mut self, stats: &serde_json::Map<String, serde_json::Value>) -> Result<Self, WireError> {
        let json = serde_json::to_string(stats).map_err(|_| WireError::Body("stats not serialisable"))?;
        let fragment = json
            .strip_suffix('}')
            .ok_or(WireError::Body("stats not a JSON object"))?;
        self.stats = Some(fragment.to_string());
        Ok(self)
    }

    /// Stats re-closed and parsed as JSON, if present and well formed
    pub fn stats_json(&self) -> Option<serde_json::Value> {
        let fragment = self.stats.as_deref()?;
        serde_json::from_str(&format!("{}}}", fragment)).ok()
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        2 + self.stats.as_ref().map_or(0, |s| s.len())
    }

    /// Encode the body
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        let valve = match self.valve_pc {
            Some(pc) if pc <= 100 => pc,
            Some(_) => return Err(WireError::Body("valve percent above 100")),
            None => VALVE_INVALID,
        };
        buf.put_u8(valve | if self.call_for_heat { 0x80 } else { 0 });

        let mut flags = self.flags - OFrameFlags::STATS_PRESENT;
        if self.stats.is_some() {
            flags |= OFrameFlags::STATS_PRESENT;
        }
        buf.put_u8(flags.bits() | ((self.occupancy as u8) << OCCUPANCY_SHIFT) | FLAGS_BIT0);

        if let Some(ref stats) = self.stats {
            if !stats.starts_with('{') || stats.ends_with('}') {
                return Err(WireError::Body("stats must open with '{' and omit the closing '}'"));
            }
            buf.put_slice(stats.as_bytes());
        }

        Ok(buf.freeze())
    }

    /// Decode a body
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < 2 {
            return Err(WireError::Body("'O' body shorter than 2 bytes"));
        }

        let valve_raw = data[0] & 0x7f;
        let valve_pc = match valve_raw {
            VALVE_INVALID => None,
            pc if pc <= 100 => Some(pc),
            _ => return Err(WireError::Body("valve percent above 100")),
        };
        let call_for_heat = data[0] & 0x80 != 0;

        let flags = OFrameFlags::from_bits_truncate(data[1]);
        let occupancy = Occupancy::from((data[1] & OCCUPANCY_MASK) >> OCCUPANCY_SHIFT);

        let stats = if data.len() > 2 {
            if data[2] != b'{' {
                return Err(WireError::Body("stats do not start with '{'"));
            }
            let text = std::str::from_utf8(&data[2..]).map_err(|_| WireError::Body("stats not UTF-8"))?;
            Some(text.to_string())
        } else {
            None
        };

        Ok(Self {
            valve_pc,
            call_for_heat,
            flags,
            occupancy,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_no_stats() {
        let body = OFrameBody::decode(&[0x00, 0x01]).unwrap();
        assert_eq!(body.valve_pc, Some(0));
        assert!(!body.call_for_heat);
        assert!(body.flags.is_empty());
        assert_eq!(body.occupancy, Occupancy::Unreported);
        assert!(body.stats.is_none());
    }

    #[test]
    fn test_decode_with_stats() {
        let body = OFrameBody::decode(&hex::decode("7f117b2262223a31").unwrap()).unwrap();
        assert_eq!(body.valve_pc, None);
        assert!(body.flags.contains(OFrameFlags::STATS_PRESENT));
        assert_eq!(body.stats.as_deref(), Some("{\"b\":1"));
        assert_eq!(body.stats_json().unwrap()["b"], 1);
    }

    #[test]
    fn test_stats_present_bit_is_not_authoritative() {
        // Stats bytes present, flag clear.
        let body = OFrameBody::decode(b"\x00\x01{\"b\":1").unwrap();
        assert!(!body.flags.contains(OFrameFlags::STATS_PRESENT));
        assert_eq!(body.stats.as_deref(), Some("{\"b\":1"));
        // Flag set, no stats bytes.
        let body = OFrameBody::decode(&[0x00, 0x11]).unwrap();
        assert!(body.stats.is_none());
    }

    #[test]
    fn test_encode_matches_scenarios() {
        assert_eq!(&OFrameBody::empty().with_valve(0).unwrap().encode().unwrap()[..], &[0x00, 0x01]);

        let mut stats = serde_json::Map::new();
        stats.insert("b".to_string(), serde_json::json!(1));
        let body = OFrameBody::empty().with_stats(&stats).unwrap();
        assert_eq!(&body.encode().unwrap()[..], &hex::decode("7f117b2262223a31").unwrap()[..]);
    }

    #[test]
    fn test_flags_and_occupancy_roundtrip() {
        let mut body = OFrameBody::empty().with_valve(65).unwrap();
        body.call_for_heat = true;
        body.flags = OFrameFlags::LOW_BATTERY | OFrameFlags::FROST_RISK;
        body.occupancy = Occupancy::Likely;

        let encoded = body.encode().unwrap();
        assert_eq!(encoded[0], 0x80 | 65);
        assert_eq!(encoded[1], 0x40 | 0x0c | 0x02 | 0x01);
        assert_eq!(OFrameBody::decode(&encoded).unwrap(), body);
    }

    #[test]
    fn test_rejects_bad_bodies() {
        assert!(OFrameBody::decode(&[0x00]).is_err());
        assert!(OFrameBody::decode(&[101, 0x01]).is_err());
        assert!(OFrameBody::decode(b"\x00\x11x").is_err());
        assert!(OFrameBody::empty().with_valve(101).is_err());
    }
}
