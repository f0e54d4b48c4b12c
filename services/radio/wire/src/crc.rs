//! 7-bit CRC for insecure frame trailers.
//!
//! Generator polynomial 0x5B in Koopman notation (0x37 in normal form,
//! x^7 + x^5 + x^4 + x^2 + x + 1), initialised to 0x7f. A raw result of zero
//! is sent as 0x80 so the last byte of a frame is never 0x00 or 0xff.
//!
//! Everything here is `const`-friendly, non-allocating and free of shared
//! state, so it is safe to call from a receive fast path.

/// Initial CRC state
pub const CRC7_INIT: u8 = 0x7f;

/// Normal-form generator for Koopman 0x5B
const CRC7_POLY: u8 = 0x37;

/// Substitute for a zero CRC on the wire
const CRC7_ZERO_SUBSTITUTE: u8 = 0x80;

/// Fold one byte into the running CRC state (MSB first).
///
/// Only the low 7 bits of `crc` are significant; the result is always
/// in `0..=0x7f`.
#[inline]
pub const fn crc7_5b_update(crc: u8, datum: u8) -> u8 {
    let mut crc = crc;
    let mut mask = 0x80u8;
    while mask != 0 {
        let mut bit = (crc & 0x40) != 0;
        if (datum & mask) != 0 {
            bit = !bit;
        }
        crc <<= 1;
        if bit {
            crc ^= CRC7_POLY;
        }
        mask >>= 1;
    }
    crc & 0x7f
}

/// Map the final CRC state to its on-the-wire byte.
#[inline]
pub const fn crc7_5b_finalize(crc: u8) -> u8 {
    if crc == 0 {
        CRC7_ZERO_SUBSTITUTE
    } else {
        crc
    }
}

/// Compute the finalized CRC7 over a byte slice.
pub fn crc7_5b(bytes: &[u8]) -> u8 {
    let mut hasher = Crc7::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Incremental CRC7 hasher, shaped like `crc32fast::Hasher`.
#[derive(Debug, Clone, Copy)]
pub struct Crc7 {
    state: u8,
}

impl Crc7 {
    /// Create a hasher in the initial state
    pub const fn new() -> Self {
        Self { state: CRC7_INIT }
    }

    /// Feed more bytes
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = crc7_5b_update(self.state, b);
        }
    }

    /// Raw 7-bit state (before zero substitution)
    pub fn state(&self) -> u8 {
        self.state
    }

    /// Finalized trailer byte; never 0x00 or 0xff
    pub fn finalize(self) -> u8 {
        crc7_5b_finalize(self.state)
    }
}

impl Default for Crc7 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_frames() {
        let plain = hex::decode("084f028081020001").unwrap();
        assert_eq!(crc7_5b(&plain), 0x23);

        let stats = hex::decode("0e4f028081087f117b2262223a31").unwrap();
        assert_eq!(crc7_5b(&stats), 0x61);
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let data = hex::decode("0e4f028081087f117b2262223a31").unwrap();
        let mut hasher = Crc7::new();
        hasher.update(&data[..5]);
        hasher.update(&data[5..]);
        assert_eq!(hasher.finalize(), crc7_5b(&data));
    }

    #[test]
    fn test_finalize_never_0x00_or_0xff() {
        for state in 0..=0xffu8 {
            let out = crc7_5b_finalize(crc7_5b_update(state, 0));
            assert_ne!(out, 0x00);
            assert_ne!(out, 0xff);
        }
        assert_eq!(crc7_5b_finalize(0), 0x80);
    }

    #[test]
    fn test_update_stays_in_seven_bits() {
        for state in 0..=0x7fu8 {
            for datum in 0..=0xffu8 {
                assert!(crc7_5b_update(state, datum) <= 0x7f);
            }
        }
    }

    #[test]
    fn test_single_byte_sweep_never_forbidden() {
        for a in 0..=0xffu8 {
            for b in [0x00u8, 0x55, 0xaa, 0xff] {
                let v = crc7_5b(&[a, b]);
                assert!(v != 0x00 && v != 0xff);
            }
        }
    }
}
