//! Restart/message counter pairs.

use radio_storage::CounterBytes;
use std::fmt;

/// Largest value of a 24-bit counter
pub const COUNTER_MAX: u32 = 0x00ff_ffff;

/// A (restart, message) pair, ordered with the restart counter most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterPair {
    /// Restart counter (24 bits)
    pub restart: u32,
    /// Message counter (24 bits)
    pub message: u32,
}

impl CounterPair {
    /// Counters of a key that has never been used
    pub const ZERO: CounterPair = CounterPair { restart: 0, message: 0 };

    /// The last pair; never used on air, marks an exhausted key
    pub const EXHAUSTED: CounterPair = CounterPair {
        restart: COUNTER_MAX,
        message: COUNTER_MAX,
    };

    /// Build a pair, masking each counter to 24 bits
    pub const fn new(restart: u32, message: u32) -> Self {
        Self {
            restart: restart & COUNTER_MAX,
            message: message & COUNTER_MAX,
        }
    }

    /// Restart counter, most significant byte first
    pub fn restart_bytes(&self) -> [u8; 3] {
        be24(self.restart)
    }

    /// Message counter, most significant byte first
    pub fn message_bytes(&self) -> [u8; 3] {
        be24(self.message)
    }

    /// Header sequence number implied by the message counter
    pub fn seq_num(&self) -> u8 {
        (self.message & 0x0f) as u8
    }

    /// Trailer/storage form: restart then message, both big-endian
    pub fn to_bytes(&self) -> CounterBytes {
        let mut out = [0u8; 6];
        out[..3].copy_from_slice(&self.restart_bytes());
        out[3..].copy_from_slice(&self.message_bytes());
        out
    }

    /// Parse the trailer/storage form
    pub fn from_bytes(bytes: &CounterBytes) -> Self {
        let restart = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let message = u32::from_be_bytes([0, bytes[3], bytes[4], bytes[5]]);
        Self { restart, message }
    }

    /// Next pair in sequence; `None` once the space is used up.
    ///
    /// Message overflow carries into the restart counter.
    pub fn successor(&self) -> Option<CounterPair> {
        if *self >= Self::EXHAUSTED {
            return None;
        }
        if self.message < COUNTER_MAX {
            Some(CounterPair::new(self.restart, self.message + 1))
        } else {
            Some(CounterPair::new(self.restart + 1, 0))
        }
    }
}

impl fmt::Display for CounterPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}:{:06x}", self.restart, self.message)
    }
}

fn be24(v: u32) -> [u8; 3] {
    let b = v.to_be_bytes();
    [b[1], b[2], b[3]]
}
