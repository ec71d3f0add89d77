// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `units` module provides definitions for common units.

use std::cmp::Ordering;
use std::fmt;

/// A `TimeStamp` represents an instantaneous instant in time since the start of a stream. One
/// `TimeStamp` "tick" is `1 / timescale` seconds, where the timescale is a property of the stream
/// the timestamp belongs to.
pub type TimeStamp = u64;

/// A `Duration` indicates a positive span of time in ticks of the owning stream's timescale.
pub type Duration = u64;

/// `Time` is an exact non-negative rational number of seconds.
///
/// Extraction window endpoints and split durations are compared against timestamps from streams
/// with arbitrary timescales, and accumulate across many chunks. Both operations must be exact,
/// so `Time` is stored as a numerator/denominator pair and all conversions use 128-bit widening
/// products.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Time {
    /// The numerator, in `1 / den` seconds.
    pub num: u64,
    /// The denominator.
    pub den: u64,
}

impl Time {
    /// Zero seconds.
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Creates a new `Time`. Panics if the denominator is 0.
    pub fn new(num: u64, den: u64) -> Self {
        if den == 0 {
            panic!("Time cannot have a 0 denominator");
        }
        Time { num, den }
    }

    /// Creates a `Time` from a number of milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Time { num: millis, den: 1000 }
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Convert to a timestamp in the given timescale, rounding down.
    pub fn to_scale(&self, timescale: u32) -> TimeStamp {
        // The product requires up-to 96 bits (64-bit numerator * 32-bit timescale).
        let num = u128::from(self.num) * u128::from(timescale);
        (num / u128::from(self.den)) as TimeStamp
    }

    /// Convert to a whole number of microseconds, rounding down.
    pub fn to_micros(&self) -> u64 {
        self.to_scale(1_000_000) as u64
    }

    /// Convert to a whole number of milliseconds, rounding down.
    pub fn to_millis(&self) -> u64 {
        self.to_scale(1000) as u64
    }

    /// Compare against a timestamp expressed in the given timescale.
    pub fn cmp_ts(&self, ts: TimeStamp, timescale: u32) -> Ordering {
        // self.num / self.den <=> ts / timescale, cross-multiplied in 128 bits.
        let lhs = u128::from(self.num) * u128::from(timescale);
        let rhs = u128::from(ts) * u128::from(self.den);
        lhs.cmp(&rhs)
    }

    /// The exact sum of two times, reduced so repeated accumulation does not overflow.
    pub fn add(&self, other: Time) -> Time {
        let g = gcd(self.den, other.den);
        let den = self.den / g * other.den;
        let num = self.num * (other.den / g) + other.num * (self.den / g);
        Time::new(num, den).reduced()
    }

    /// The absolute distance, in the given timescale, between this time and a timestamp.
    pub fn distance_ts(&self, ts: TimeStamp, timescale: u32) -> u64 {
        let lhs = u128::from(self.num) * u128::from(timescale);
        let rhs = u128::from(ts) * u128::from(self.den);
        let diff = if lhs > rhs { lhs - rhs } else { rhs - lhs };
        (diff / u128::from(self.den)) as u64
    }

    fn reduced(self) -> Time {
        let g = gcd(self.num, self.den);
        if g <= 1 {
            self
        }
        else {
            Time { num: self.num / g, den: self.den / g }
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.num, self.den)
    }
}

/// Rescale a timestamp from one timescale to another, rounding down.
///
/// The intermediate product requires up-to 96 bits (64-bit timestamp * 32-bit timescale), so the
/// multiplication is widened to 128 bits.
pub fn rescale_ts(ts: TimeStamp, from: u32, to: u32) -> TimeStamp {
    if from == to {
        return ts;
    }
    let num = u128::from(ts) * u128::from(to);
    (num / u128::from(from)) as TimeStamp
}

/// Compare two timestamps expressed in different timescales.
pub fn cmp_ts(a: TimeStamp, a_scale: u32, b: TimeStamp, b_scale: u32) -> Ordering {
    let lhs = u128::from(a) * u128::from(b_scale);
    let rhs = u128::from(b) * u128::from(a_scale);
    lhs.cmp(&rhs)
}

/// Convert a timestamp to microseconds, rounding down.
pub fn ts_to_micros(ts: TimeStamp, timescale: u32) -> u64 {
    rescale_ts(ts, timescale, 1_000_000)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{cmp_ts, rescale_ts, Time};

    #[test]
    fn verify_time_to_scale() {
        // 2.5 s at 90 kHz.
        assert_eq!(Time::from_millis(2500).to_scale(90_000), 225_000);
        // 1/3 s at 48 kHz rounds down.
        assert_eq!(Time::new(1, 3).to_scale(48_000), 16_000);
        assert_eq!(Time::new(2, 3).to_scale(48_000), 32_000);
        // Large timestamps do not overflow.
        let t = Time::new(u64::MAX / 1000, 1);
        assert_eq!(t.to_scale(1000), (u64::MAX / 1000) * 1000);
    }

    #[test]
    fn verify_time_cmp_ts() {
        let t = Time::from_millis(4000);
        assert_eq!(t.cmp_ts(359_999, 90_000), Ordering::Greater);
        assert_eq!(t.cmp_ts(360_000, 90_000), Ordering::Equal);
        assert_eq!(t.cmp_ts(360_001, 90_000), Ordering::Less);
    }

    #[test]
    fn verify_time_add() {
        let a = Time::from_millis(2500);
        let b = Time::new(1, 4);
        let sum = a.add(b);
        assert_eq!(sum.cmp_ts(2750, 1000), Ordering::Equal);

        // Repeated accumulation stays reduced.
        let mut acc = Time::ZERO;
        for _ in 0..1_000 {
            acc = acc.add(Time::from_millis(2500));
        }
        assert_eq!(acc, Time::new(2500, 1));
    }

    #[test]
    fn verify_rescale_ts() {
        assert_eq!(rescale_ts(90_000, 90_000, 48_000), 48_000);
        assert_eq!(rescale_ts(1, 3, 1_000_000), 333_333);
        assert_eq!(rescale_ts(u64::MAX / 4, 1000, 4000), u64::MAX - 3);
    }

    #[test]
    fn verify_cmp_ts() {
        assert_eq!(cmp_ts(90_000, 90_000, 48_000, 48_000), Ordering::Equal);
        assert_eq!(cmp_ts(90_001, 90_000, 48_000, 48_000), Ordering::Greater);
        assert_eq!(cmp_ts(89_999, 90_000, 48_000, 48_000), Ordering::Less);
    }
}
