// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `memory` module provides queue-backed in-memory implementations of the stream traits,
//! used by tests and demo applications.

use crate::packet::Packet;
use crate::stream::{StreamEvent, StreamInfo, StreamSink, StreamSource};

/// A `StreamSource` backed by a pre-built list of packets.
///
/// `PLAY` events reposition delivery the way a coarse-seeking demuxer would: to the latest sync
/// packet at or before the requested start, so a consumer always has a decodable lead-in.
pub struct MemorySource {
    info: StreamInfo,
    packets: Vec<Packet>,
    cursor: usize,
    closed: bool,
    discard: bool,
    /// Every event received, oldest first.
    pub events: Vec<StreamEvent>,
}

impl MemorySource {
    /// Create a source over a list of packets. The source reports EOS after the last packet.
    pub fn new(info: StreamInfo, packets: Vec<Packet>) -> Self {
        MemorySource { info, packets, cursor: 0, closed: true, discard: false, events: Vec::new() }
    }

    /// Create a source that never reports EOS even when drained, for incremental feeding.
    pub fn new_open(info: StreamInfo, packets: Vec<Packet>) -> Self {
        MemorySource { closed: false, ..Self::new(info, packets) }
    }

    /// Append a packet to the end of the delivery list.
    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Report EOS once the delivery list is drained.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn seek_to(&mut self, start_secs: f64) {
        let timescale = self.info.timescale;
        let target = (start_secs.max(0.0) * f64::from(timescale)) as u64;

        // First packet at or past the target.
        let mut pos = self.packets.partition_point(|p| p.dts_or_cts() < target);

        // Back up to the nearest preceding sync packet so decoding can restart.
        while pos > 0 {
            if self.packets[pos - 1].sap.is_sync() {
                pos -= 1;
                break;
            }
            pos -= 1;
        }

        self.cursor = pos;
    }
}

impl StreamSource for MemorySource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_packet(&mut self) -> Option<Packet> {
        if self.discard {
            self.cursor = self.packets.len();
            return None;
        }
        let pck = self.packets.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(pck)
    }

    fn is_eos(&self) -> bool {
        self.closed && self.cursor >= self.packets.len()
    }

    fn send_event(&mut self, event: StreamEvent) {
        if let StreamEvent::Play { start, .. } = event {
            self.seek_to(start);
        }
        self.events.push(event);
    }

    fn set_discard(&mut self, discard: bool) {
        self.discard = discard;
    }
}

/// A `StreamSink` collecting every delivered packet.
#[derive(Default)]
pub struct MemorySink {
    /// Delivered packets, oldest first.
    pub packets: Vec<Packet>,
    /// The last delay declared on the sink, if any.
    pub delay: Option<i64>,
    /// The last sync-point declaration, if any.
    pub has_sync: Option<bool>,
    /// Whether EOS was signalled.
    pub eos: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamSink for MemorySink {
    fn send(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    fn set_delay(&mut self, delay: i64) {
        self.delay = Some(delay);
    }

    fn set_has_sync(&mut self, has_sync: bool) {
        self.has_sync = Some(has_sync);
    }

    fn set_eos(&mut self) {
        self.eos = true;
    }
}
