// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `range` module parses textual extraction range endpoints into typed descriptors.

use splice_core::units::Time;

/// How the engine carves the input into chunks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtractMode {
    /// Pass everything through, applying only the emission filters and pacing.
    None,
    /// Extract one or more explicit ranges.
    Range,
    /// Start a new chunk at every stream access point.
    Sap,
    /// Start a new chunk whenever the estimated chunk size reaches a byte target.
    Size,
    /// Start a new chunk every fixed duration.
    Dur,
}

/// The state of the current extraction range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// No range is active.
    None,
    /// A range with both endpoints.
    Closed,
    /// A range with a start but no end.
    Open,
    /// All ranges have been extracted.
    Done,
}

/// Rounding policy applied when snapping a range start to an access point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Rounding {
    /// Use the last access point at or before the requested start.
    #[default]
    Before,
    /// Use the first access point at or after the requested start.
    After,
    /// Use whichever access point is closest to the requested start.
    Closest,
}

/// A parsed range endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangeSpec {
    /// A position in seconds.
    Time(Time),
    /// A 1-based frame index.
    Frame(u64),
    /// Split at every stream access point.
    Sap,
    /// Split every fixed duration.
    Dur(Time),
    /// Split at a byte-size target.
    Size(u64),
}

/// Parse one textual range endpoint.
///
/// Accepted forms:
/// * `Thh:mm:ss[.ms]`, `Tmm:ss[.ms]`, `Ts[.ms]` — a clock time.
/// * `Fn` — a 1-based frame index.
/// * `RAP` or `SAP` — split at every access point.
/// * `Dn` or `Dn/d` — split every `n` milliseconds, or every `n/d` seconds.
/// * `Sn`, with optional `k`, `m`, or `g` suffix — split at a byte-size target.
/// * A plain number or fraction — a position in seconds.
///
/// Returns `None` when the endpoint cannot be understood.
pub fn parse_range_spec(spec: &str) -> Option<RangeSpec> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }

    if spec.eq_ignore_ascii_case("RAP") || spec.eq_ignore_ascii_case("SAP") {
        return Some(RangeSpec::Sap);
    }

    let head = spec.chars().next()?;
    let rest = &spec[head.len_utf8()..];

    match head {
        'T' | 't' => parse_clock(rest).map(RangeSpec::Time),
        'F' | 'f' => rest.parse::<u64>().ok().map(RangeSpec::Frame),
        'D' | 'd' => parse_dur(rest).map(RangeSpec::Dur),
        'S' | 's' => parse_size(rest).map(RangeSpec::Size),
        _ => parse_seconds(spec).map(RangeSpec::Time),
    }
}

/// Parse `hh:mm:ss[.ms]`, `mm:ss[.ms]`, or `s[.ms]`.
fn parse_clock(s: &str) -> Option<Time> {
    let mut parts = s.split(':').rev();

    let seconds = parts.next()?;
    let (secs, frac) = parse_decimal(seconds)?;

    let mut whole = secs;
    if let Some(mins) = parts.next() {
        let mins: u64 = mins.parse().ok()?;
        whole = whole.checked_add(mins.checked_mul(60)?)?;
    }
    if let Some(hours) = parts.next() {
        let hours: u64 = hours.parse().ok()?;
        whole = whole.checked_add(hours.checked_mul(3600)?)?;
    }
    if parts.next().is_some() {
        return None;
    }

    Some(combine(whole, frac))
}

/// Parse `n` (milliseconds) or `n/d` (seconds).
fn parse_dur(s: &str) -> Option<Time> {
    if let Some((num, den)) = s.split_once('/') {
        let num: u64 = num.parse().ok()?;
        let den: u64 = den.parse().ok()?;
        if den == 0 {
            return None;
        }
        Some(Time::new(num, den))
    }
    else {
        let millis: u64 = s.parse().ok()?;
        Some(Time::from_millis(millis))
    }
}

/// Parse a byte count with an optional binary magnitude suffix.
fn parse_size(s: &str) -> Option<u64> {
    let (digits, mult) = match s.chars().last()? {
        'k' | 'K' => (&s[..s.len() - 1], 1u64 << 10),
        'm' | 'M' => (&s[..s.len() - 1], 1u64 << 20),
        'g' | 'G' => (&s[..s.len() - 1], 1u64 << 30),
        _ => (s, 1),
    };
    let count: u64 = digits.parse().ok()?;
    count.checked_mul(mult).filter(|size| *size > 0)
}

/// Parse a plain number of seconds: an integer, a decimal, or a fraction.
fn parse_seconds(s: &str) -> Option<Time> {
    if let Some((num, den)) = s.split_once('/') {
        let num: u64 = num.parse().ok()?;
        let den: u64 = den.parse().ok()?;
        if den == 0 {
            return None;
        }
        return Some(Time::new(num, den));
    }

    let (whole, frac) = parse_decimal(s)?;
    Some(combine(whole, frac))
}

/// Split `s[.frac]` into the whole part and the fraction as a `Time`.
fn parse_decimal(s: &str) -> Option<(u64, Option<Time>)> {
    if let Some((whole, frac)) = s.split_once('.') {
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        if frac.is_empty() || frac.len() > 9 {
            return None;
        }
        let num: u64 = frac.parse().ok()?;
        let den = 10u64.pow(frac.len() as u32);
        Some((whole, Some(Time::new(num, den))))
    }
    else {
        let whole: u64 = s.parse().ok()?;
        Some((whole, None))
    }
}

fn combine(whole: u64, frac: Option<Time>) -> Time {
    match frac {
        Some(frac) => Time::new(whole, 1).add(frac),
        None => Time::new(whole, 1),
    }
}
