// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `packet` module defines the packet structure.

use std::sync::Arc;

use bitflags::bitflags;

use crate::units::{Duration, TimeStamp};

/// The stream access point (SAP) class of a packet.
///
/// A SAP is a packet from which decoding can begin without reference to earlier packets. Classes
/// 1 through 4 describe increasing dependency allowances; class 1 is a clean random access point,
/// while class 4 requires gradual decoder refresh.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SapType {
    /// Not an access point. The packet depends on earlier packets.
    #[default]
    None,
    /// A clean random access point.
    Type1,
    /// A random access point where the first packet in presentation order is not the SAP itself.
    Type2,
    /// An open-GOP random access point. Some following packets in decode order may reference
    /// earlier packets, but can be discarded.
    Type3,
    /// A gradual decoder refresh starting point.
    Type4,
}

impl SapType {
    /// Returns true if decoding may start at this packet (classes 1, 2, and 3).
    pub fn is_sync(&self) -> bool {
        matches!(self, SapType::Type1 | SapType::Type2 | SapType::Type3)
    }

    /// The numeric class, with 0 denoting a non-SAP packet.
    pub fn class(&self) -> u8 {
        match self {
            SapType::None => 0,
            SapType::Type1 => 1,
            SapType::Type2 => 2,
            SapType::Type3 => 3,
            SapType::Type4 => 4,
        }
    }
}

bitflags! {
    /// Flags describing the coding dependencies of a packet.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct DepFlags: u8 {
        /// The packet is a leading picture: it precedes its random access point in presentation
        /// order and may be undecodable after a seek.
        const LEADING        = 1 << 0;
        /// The packet depends on other packets.
        const DEPENDS_ON     = 1 << 1;
        /// No other packet depends on this packet. Dropping it does not affect decoding of the
        /// rest of the stream.
        const NON_REFERENCE  = 1 << 2;
        /// The packet carries redundant coding.
        const REDUNDANT      = 1 << 3;
    }
}

/// Properties attached to a packet at a chunk boundary.
#[derive(Clone, Debug, Default)]
pub struct PacketProps {
    /// The 1-based index of the chunk this packet starts.
    pub file_number: Option<u32>,
    /// A textual label for the chunk this packet starts, suitable for use in a file name.
    pub file_suffix: Option<String>,
    /// Marks the packet as resuming output after a previous chunk.
    pub period_resume: bool,
    /// Caller-provided properties for the chunk this packet starts.
    pub custom: Vec<(String, String)>,
}

impl PacketProps {
    pub fn is_empty(&self) -> bool {
        self.file_number.is_none()
            && self.file_suffix.is_none()
            && !self.period_resume
            && self.custom.is_empty()
    }
}

/// A `Packet` contains a discrete amount of encoded or raw data for a single stream.
///
/// # Timing
///
/// * **Composition Timestamp (CTS):** the time, in the stream's timescale, at which the decoded
///   packet should be presented.
/// * **Decode Timestamp (DTS):** the time at which the packet should be decoded. Optional; when
///   absent the CTS orders the packet.
/// * **Duration:** the presentation duration of the packet in the stream's timescale.
///
/// # Sharing
///
/// The payload is reference counted. Cloning a packet, or building a new packet over
/// [`Packet::share_data`], never copies payload bytes.
#[derive(Clone)]
pub struct Packet {
    /// The stream ID.
    stream_id: u32,
    /// The composition timestamp in timescale units.
    pub cts: TimeStamp,
    /// The decode timestamp in timescale units, if signalled.
    pub dts: Option<TimeStamp>,
    /// The duration in timescale units.
    pub dur: Duration,
    /// The stream access point class.
    pub sap: SapType,
    /// Coding dependency flags.
    pub deps: DepFlags,
    /// The producer of this packet requires it to be consumed or copied before the next packet
    /// is fetched.
    pub blocking_ref: bool,
    /// Boundary properties.
    pub props: PacketProps,
    /// The packet data buffer.
    data: Arc<[u8]>,
}

impl Packet {
    /// Create a new packet.
    pub fn new(stream_id: u32, cts: TimeStamp, dur: Duration, data: impl Into<Arc<[u8]>>) -> Self {
        Packet {
            stream_id,
            cts,
            dts: None,
            dur,
            sap: SapType::None,
            deps: DepFlags::empty(),
            blocking_ref: false,
            props: PacketProps::default(),
            data: data.into(),
        }
    }

    /// The identifier of the stream this packet belongs to.
    #[inline]
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Get an immutable slice to the packet data buffer.
    #[inline]
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    /// The size of the packet data buffer in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get a new reference to the packet data buffer without copying it.
    #[inline]
    pub fn share_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Replace the packet data buffer.
    pub fn set_data(&mut self, data: impl Into<Arc<[u8]>>) {
        self.data = data.into();
    }

    /// The decode timestamp, falling back to the composition timestamp when absent.
    #[inline]
    pub fn dts_or_cts(&self) -> TimeStamp {
        self.dts.unwrap_or(self.cts)
    }

    /// Provide the decode timestamp.
    pub fn with_dts(mut self, dts: TimeStamp) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Provide the stream access point class.
    pub fn with_sap(mut self, sap: SapType) -> Self {
        self.sap = sap;
        self
    }

    /// Provide the coding dependency flags.
    pub fn with_deps(mut self, deps: DepFlags) -> Self {
        self.deps = deps;
        self
    }

    /// Mark the packet as a blocking reference.
    pub fn with_blocking_ref(mut self, blocking: bool) -> Self {
        self.blocking_ref = blocking;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Packet, SapType};

    #[test]
    fn verify_shared_payload() {
        let pck = Packet::new(1, 0, 100, vec![1u8, 2, 3]).with_sap(SapType::Type1);

        let clone = pck.clone();
        assert!(Arc::ptr_eq(&pck.share_data(), &clone.share_data()));
        assert_eq!(clone.buf(), &[1, 2, 3]);
        assert!(clone.sap.is_sync());
    }

    #[test]
    fn verify_dts_fallback() {
        let pck = Packet::new(1, 500, 100, vec![]);
        assert_eq!(pck.dts_or_cts(), 500);
        let pck = pck.with_dts(400);
        assert_eq!(pck.dts_or_cts(), 400);
    }
}
