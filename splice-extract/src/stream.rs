// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-stream extraction state.

use std::collections::VecDeque;

use splice_core::packet::Packet;
use splice_core::stream::{
    AudioFormat, CodecKind, SeekCapability, StreamSink, StreamSource, StreamType,
};
use splice_core::units::{rescale_ts, Duration, TimeStamp};

use crate::pacer::Anchor;

/// Progress of a stream towards the start cut of the current range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StartState {
    /// The start cut has not been located yet.
    Pending,
    /// A start cut candidate was selected.
    Found,
    /// The stream ended before the start cut; it contributes nothing to this range.
    EosBeforeStart,
    /// The stream carries a single informational packet re-emitted at every chunk start.
    ReinsertSingle,
}

/// Position of a packet relative to the current range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PacketPos {
    /// The packet ends at or before the range start.
    Before,
    /// The packet overlaps the range.
    Inside,
    /// The packet starts at or after the range end. For a splittable stream, `keep` holds the
    /// duration between the packet start and the end cut when the cut falls inside the packet.
    After { keep: Option<Duration> },
}

/// All extraction state owned by one stream.
pub(crate) struct StreamCtx {
    pub src: Box<dyn StreamSource>,
    pub sink: Box<dyn StreamSink>,

    // Cached stream properties.
    pub id: u32,
    pub timescale: u32,
    pub stream_type: StreamType,
    pub codec: CodecKind,
    pub audio: Option<AudioFormat>,
    /// Positive declared delay folded into every timestamp read. Negative declared delays are
    /// decoder-side composition offsets and stay in the stream.
    pub tk_delay: u64,
    /// The codec allows sub-packet slicing: by duration for text, by sample count for raw audio.
    pub can_split: bool,
    /// Timestamps carry no decode reordering.
    pub is_raw: bool,
    pub seekable: bool,

    // Access point history.
    /// True while every packet seen so far was an access point. Flips false permanently on the
    /// first non-SAP packet; such a stream then requires SAP-aligned cuts.
    pub all_saps: bool,
    pub prev_sap_ts: Option<TimeStamp>,

    // Packet retention.
    /// Packets held back for cut decisions, in arrival order.
    pub queue: VecDeque<Packet>,
    /// A fetched packet not yet admitted to the current range; the first packet of the next
    /// chunk, or a packet parked while the end cut is being adjusted.
    pub pending: Option<Packet>,
    /// A packet straddling the end cut, retained so its tail re-enters the next range.
    pub split_pck: Option<Packet>,
    /// The first packet, retained while it is the only packet ever seen. Streams carrying a
    /// single informational packet re-emit a clone of it at every chunk start.
    pub reinsert_single: Option<Packet>,
    /// Total packets fetched from the source.
    pub nb_frames: u64,
    /// Packets offered to the emission filters.
    pub nb_frames_out: u64,

    // Current range state.
    pub start_state: StartState,
    /// The selected start cut timestamp.
    pub sap_start_ts: Option<TimeStamp>,
    /// The media timestamp mapped to the start of the current output chunk.
    pub ts_at_range_start: Option<TimeStamp>,
    /// Media time consumed by previous chunks. Added to every emitted timestamp so successive
    /// chunks form a continuous output timeline; only ever increases.
    pub ts_at_range_end: u64,
    /// Timestamp of the first packet past the end cut, once seen.
    pub range_end_ts: Option<TimeStamp>,
    /// Ticks already consumed at the head of the first queued packet.
    pub split_start: u64,
    /// Ticks retained of the last queued packet, when the end cut falls inside it.
    pub split_end: u64,
    /// The boundary packet of the current chunk has been emitted and decorated.
    pub first_pck_sent: bool,
    /// The media end (timestamp plus duration) of the last packet emitted in the current
    /// chunk, before timeline rewriting.
    pub chunk_media_end: TimeStamp,
    /// A PLAY event was observed on the output side of this stream.
    pub play_seen: bool,
    /// The stream participates in playback. Cleared by a STOP event.
    pub is_playing: bool,
    /// The source reported EOS.
    pub in_eos: bool,

    // Real-time pacing anchor, when each stream paces independently.
    pub rt_anchor: Option<Anchor>,
}

impl StreamCtx {
    pub fn new(src: Box<dyn StreamSource>, sink: Box<dyn StreamSink>, force_raw: bool) -> Self {
        let info = src.info().clone();

        let is_raw = force_raw || info.codec == CodecKind::Raw;
        let can_split = match info.stream_type {
            StreamType::Text => true,
            StreamType::Audio => is_raw && info.audio.is_some(),
            _ => false,
        };

        StreamCtx {
            id: info.id,
            timescale: info.timescale,
            stream_type: info.stream_type,
            codec: info.codec,
            audio: info.audio,
            tk_delay: info.delay.max(0) as u64,
            can_split,
            is_raw,
            seekable: info.seek == SeekCapability::Seekable,
            src,
            sink,
            all_saps: true,
            prev_sap_ts: None,
            queue: VecDeque::new(),
            pending: None,
            split_pck: None,
            reinsert_single: None,
            nb_frames: 0,
            nb_frames_out: 0,
            start_state: StartState::Pending,
            sap_start_ts: None,
            ts_at_range_start: None,
            ts_at_range_end: 0,
            range_end_ts: None,
            split_start: 0,
            split_end: 0,
            first_pck_sent: false,
            chunk_media_end: 0,
            play_seen: false,
            is_playing: true,
            in_eos: false,
            rt_anchor: None,
        }
    }

    /// The decision timestamp of a packet: DTS when present, else CTS, plus the stream delay.
    pub fn ts_of(&self, pck: &Packet) -> TimeStamp {
        pck.dts_or_cts() + self.tk_delay
    }

    /// Whether a packet may serve as a cut point for this stream.
    pub fn effective_sap(&self, pck: &Packet, nosap: bool) -> bool {
        nosap || self.is_raw || pck.sap.is_sync()
    }

    /// The end timestamp of the last queued packet, if any.
    pub fn last_queued_end(&self) -> Option<TimeStamp> {
        self.queue.back().map(|pck| self.ts_of(pck) + pck.dur)
    }

    /// Convert a tick count of this stream into audio sample frames.
    pub fn ticks_to_samples(&self, ticks: u64) -> u64 {
        match &self.audio {
            Some(audio) if audio.sample_rate != self.timescale => {
                rescale_ts(ticks, self.timescale, audio.sample_rate)
            }
            _ => ticks,
        }
    }

    /// Whether the stream has exhausted its input for the current range.
    pub fn intake_done(&self) -> bool {
        !self.is_playing
            || self.in_eos
            || self.range_end_ts.is_some()
            || matches!(self.start_state, StartState::EosBeforeStart | StartState::ReinsertSingle)
    }

    /// Reset the transient state of the current range, keeping the cumulative output timeline
    /// offset and the access point history.
    pub fn reset_range_state(&mut self) {
        if self.start_state != StartState::ReinsertSingle {
            self.start_state = StartState::Pending;
        }
        self.sap_start_ts = None;
        self.ts_at_range_start = None;
        self.range_end_ts = None;
        self.split_start = 0;
        self.split_end = 0;
        self.first_pck_sent = false;
        self.chunk_media_end = 0;
    }

    /// Forget buffered input after the source has been repositioned.
    pub fn reset_after_seek(&mut self) {
        self.queue.clear();
        self.pending = None;
        self.split_pck = None;
        self.prev_sap_ts = None;
        self.rt_anchor = None;
        self.in_eos = false;
    }
}
