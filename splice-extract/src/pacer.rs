// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pacer` module holds back packet emission so wall-clock time advances in lockstep with
//! media time.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use log::warn;

/// Real-time pacing mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RealTimeMode {
    /// No pacing: emit as fast as the downstream accepts.
    #[default]
    Off,
    /// Pace each stream against its own clock anchor.
    On,
    /// Pace all streams against a single shared anchor. The first stream to emit establishes it.
    Sync,
}

/// Slack, in microseconds, allowed between media time and wall-clock time before emission is
/// held back. Also the rescheduling quantum requested from the caller when packets are pending.
pub const RT_PRECISION_US: u64 = 2_000;

/// A monotonic microsecond clock.
pub trait Clock {
    fn now_micros(&self) -> u64;
}

/// The wall clock, counted from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// A manually advanced clock for tests and simulations.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by a number of microseconds.
    pub fn advance(&self, micros: u64) {
        self.now.set(self.now.get() + micros);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }
}

/// The media/wall-clock correspondence established by the first emitted packet.
#[derive(Copy, Clone, Debug)]
pub struct Anchor {
    /// The media time of the first packet, in microseconds.
    pub cts_us: u64,
    /// The wall-clock time the first packet was emitted at, in microseconds.
    pub sys_us: u64,
}

/// The outcome of a pacing check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    /// The packet may be emitted now.
    Send,
    /// The packet is early by the given number of microseconds.
    Wait(u64),
}

/// Check whether a packet with the given media time may be emitted.
///
/// The first call through an unset anchor establishes the correspondence and always passes. A
/// packet whose media time precedes the anchor is emitted immediately with a warning; the anchor
/// is not moved.
pub fn gate(anchor: &mut Option<Anchor>, now_us: u64, cts_us: u64, speed: f64) -> Gate {
    let anchor = match anchor {
        Some(anchor) => anchor,
        None => {
            *anchor = Some(Anchor { cts_us, sys_us: now_us });
            return Gate::Send;
        }
    };

    if cts_us < anchor.cts_us {
        warn!("packet media time {}us precedes the pacing anchor, sending immediately", cts_us);
        return Gate::Send;
    }

    let media_elapsed = ((cts_us - anchor.cts_us) as f64 / speed.abs()) as u64;
    let real_elapsed = now_us - anchor.sys_us;

    if real_elapsed + RT_PRECISION_US >= media_elapsed {
        Gate::Send
    }
    else {
        Gate::Wait(media_elapsed - real_elapsed)
    }
}
