//! Counter pairs
//!
//! Every key maps to two signed 64-bit counters. What they mean depends on the
//! key: node and relationship counts keep the count in `second`, index
//! statistics are `{updates, size}` and index samples `{unique, size}`.
//!
//! Updates are relative. A pair is only ever combined with a delta by
//! addition, which makes merge order irrelevant.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Encoded counter pair size in bytes
pub const COUNTER_PAIR_SIZE: usize = 16;

/// Two 64-bit counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterPair {
    /// First counter (unused for entity counts, `updates` / `unique` for indexes)
    pub first: i64,
    /// Second counter (the count for entity keys, `size` for indexes)
    pub second: i64,
}

impl CounterPair {
    /// The all-zero pair
    pub const ZERO: CounterPair = CounterPair {
        first: 0,
        second: 0,
    };

    /// Create a pair
    pub const fn new(first: i64, second: i64) -> Self {
        CounterPair { first, second }
    }

    /// Pair carrying an entity count (`{0, count}`)
    pub const fn count(count: i64) -> Self {
        CounterPair {
            first: 0,
            second: count,
        }
    }

    /// True when both counters are zero
    pub fn is_zero(&self) -> bool {
        self.first == 0 && self.second == 0
    }

    /// Wrapping addition of a delta
    ///
    /// Counters are statistics; overflow wraps instead of panicking in release
    /// and debug builds alike.
    pub fn add_delta(&mut self, delta: CounterPair) {
        self.first = self.first.wrapping_add(delta.first);
        self.second = self.second.wrapping_add(delta.second);
    }

    /// Encode as two big-endian i64
    pub fn encode(&self) -> [u8; COUNTER_PAIR_SIZE] {
        let mut bytes = [0u8; COUNTER_PAIR_SIZE];
        bytes[0..8].copy_from_slice(&self.first.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.second.to_be_bytes());
        bytes
    }

    /// Decode from two big-endian i64
    ///
    /// Returns `None` if fewer than [`COUNTER_PAIR_SIZE`] bytes are given.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < COUNTER_PAIR_SIZE {
            return None;
        }
        Some(CounterPair {
            first: i64::from_be_bytes(bytes[0..8].try_into().ok()?),
            second: i64::from_be_bytes(bytes[8..16].try_into().ok()?),
        })
    }
}

impl Add for CounterPair {
    type Output = CounterPair;

    fn add(mut self, rhs: CounterPair) -> CounterPair {
        self.add_delta(rhs);
        self
    }
}

impl AddAssign for CounterPair {
    fn add_assign(&mut self, rhs: CounterPair) {
        self.add_delta(rhs);
    }
}

impl Neg for CounterPair {
    type Output = CounterPair;

    fn neg(self) -> CounterPair {
        CounterPair {
            first: self.first.wrapping_neg(),
            second: self.second.wrapping_neg(),
        }
    }
}

impl Sub for CounterPair {
    type Output = CounterPair;

    fn sub(self, rhs: CounterPair) -> CounterPair {
        self + (-rhs)
    }
}

impl SubAssign for CounterPair {
    fn sub_assign(&mut self, rhs: CounterPair) {
        self.add_delta(-rhs);
    }
}

impl From<(i64, i64)> for CounterPair {
    fn from((first, second): (i64, i64)) -> Self {
        CounterPair { first, second }
    }
}
