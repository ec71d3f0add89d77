// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The emitter: dequeues decided packets, rewrites their timestamps onto the continuous output
//! timeline, slices boundary packets of raw audio streams, and attaches chunk boundary
//! properties.

use log::warn;

use splice_core::errors::Result;
use splice_core::packet::{DepFlags, Packet};
use splice_core::stream::{CodecKind, StreamType};
use splice_core::units::{rescale_ts, ts_to_micros, Duration};

use crate::filter::Extractor;
use crate::pacer::{gate, Gate, RealTimeMode};
use crate::range::ExtractMode;
use crate::stream::StartState;

impl Extractor {
    /// Drain the queue of every stream, as far as the chunk bounds and the pacer allow.
    pub(crate) fn emit_streams(&mut self) -> Result<()> {
        let bounded = self.mode != ExtractMode::Range;

        for i in 0..self.streams.len() {
            loop {
                let st = &self.streams[i];
                if !st.is_playing {
                    break;
                }
                let Some(front) = st.queue.front() else {
                    break;
                };

                // In the split modes the queue looks ahead past the cut; packets of the next
                // chunk stay queued.
                if bounded {
                    match st.range_end_ts {
                        Some(end) if st.ts_of(front) < end => (),
                        _ => break,
                    }
                }

                if !self.filter_verdict(i, front) {
                    let st = &mut self.streams[i];
                    st.nb_frames_out += 1;
                    let pck = st.queue.pop_front().unwrap();
                    st.chunk_media_end = st.chunk_media_end.max(st.ts_of(&pck) + pck.dur);
                    if st.split_start > 0 {
                        if let Some(start) = st.ts_at_range_start {
                            st.ts_at_range_start = Some(start + st.split_start);
                        }
                        st.split_start = 0;
                    }
                    continue;
                }

                let cts_us = ts_to_micros(front.cts + st.tk_delay, st.timescale);
                if !self.pace_ts(i, cts_us) {
                    break;
                }

                let st = &mut self.streams[i];
                st.nb_frames_out += 1;
                let pck = st.queue.pop_front().unwrap();
                let is_last = st.queue.is_empty();
                self.send_packet(i, pck, is_last);
            }
        }
        Ok(())
    }

    /// Whether the head packet passes the emission filters. Pure: the caller commits the
    /// per-stream candidate counter when it actually consumes the packet.
    pub(crate) fn filter_verdict(&self, i: usize, pck: &Packet) -> bool {
        let st = &self.streams[i];

        if !self.opts.saps.is_empty() && !self.opts.saps.contains(&pck.sap.class()) {
            return false;
        }
        if self.opts.refs && pck.deps.contains(DepFlags::NON_REFERENCE) {
            return false;
        }
        if self.mode != ExtractMode::Range && !self.opts.frames.is_empty() {
            let idx = st.nb_frames_out + 1;
            if !self.opts.frames.contains(&idx) {
                return false;
            }
        }
        true
    }

    /// Gate a packet with the given media time on the real-time pacer. Returns false when
    /// emission must pause; the pending wait is recorded for rescheduling.
    pub(crate) fn pace_ts(&mut self, i: usize, cts_us: u64) -> bool {
        if self.opts.rt == RealTimeMode::Off {
            return true;
        }

        let now = self.clock.now_micros();
        let speed = self.opts.speed;

        let anchor = if self.opts.rt == RealTimeMode::Sync {
            &mut self.sync_anchor
        }
        else {
            &mut self.streams[i].rt_anchor
        };

        match gate(anchor, now, cts_us, speed) {
            Gate::Send => true,
            Gate::Wait(us) => {
                self.reschedule_us = Some(self.reschedule_us.map_or(us, |cur| cur.min(us)));
                false
            }
        }
    }

    /// Rewrite one packet onto the output timeline and deliver it.
    fn send_packet(&mut self, i: usize, mut pck: Packet, is_last: bool) {
        let st = &mut self.streams[i];

        let ts = st.ts_of(&pck);
        let orig_dur = pck.dur;

        // Boundary trims: `head` ticks were consumed by the previous chunk, and when the end
        // cut falls inside the last packet only the first `tail` ticks belong to this chunk.
        let head = st.split_start;
        let tail = if is_last && st.split_end > 0 { st.split_end } else { 0 };
        let kept_end = if tail > 0 { tail } else { orig_dur };
        let mut dur: Duration = kept_end.saturating_sub(head);

        if (head > 0 || tail > 0) && st.stream_type == StreamType::Audio {
            if let Some(audio) = st.audio {
                // In both layouts the frame count is the payload size over one frame's bytes.
                let total = (pck.buf().len() / audio.bytes_per_frame().max(1)) as u64;

                let first = st.ticks_to_samples(head).min(total);
                let last =
                    if tail > 0 { st.ticks_to_samples(tail).min(total) } else { total };
                let last = last.max(first);

                pck.set_data(slice_samples(pck.buf(), &audio, total, first, last));

                // Keep the duration exact in sample terms when the timescale differs from
                // the sample rate.
                if audio.sample_rate != st.timescale {
                    dur = rescale_ts(last - first, audio.sample_rate, st.timescale);
                }
            }
        }

        // Map the packet onto the continuous output timeline: media time consumed by earlier
        // chunks, minus the media position this chunk started at.
        let start = st.ts_at_range_start.unwrap_or(ts);
        let shift = st.ts_at_range_end as i128 - start as i128;

        pck.cts = clamp_ts(pck.cts as i128 + st.tk_delay as i128 + shift);
        if st.is_raw {
            pck.dts = Some(pck.cts);
        }
        else if let Some(dts) = pck.dts {
            pck.dts = Some(clamp_ts(dts as i128 + st.tk_delay as i128 + shift));
        }

        // An informational packet re-emitted at a chunk start covers at most the chunk span.
        if st.start_state == StartState::ReinsertSingle {
            if let Some(end) = st.range_end_ts {
                dur = dur.min(end.saturating_sub(ts));
            }
        }
        pck.dur = dur;

        if head > 0 {
            if let Some(range_start) = st.ts_at_range_start {
                st.ts_at_range_start = Some(range_start + head);
            }
            st.split_start = 0;
        }
        if tail > 0 {
            st.split_end = 0;
        }
        st.chunk_media_end = st.chunk_media_end.max(ts + kept_end);

        // Timecode samples carry an absolute frame counter: advance it by the visual frames
        // emitted before this chunk so the chunk starts at the right timecode.
        if st.codec == CodecKind::Timecode && self.opts.tcmdrw && pck.buf().len() >= 4 {
            let mut data = pck.buf().to_vec();
            let counter = u32::from_be_bytes([data[0], data[1], data[2], data[3]])
                .wrapping_add(self.tmcd_frames_at_range_start as u32);
            data[..4].copy_from_slice(&counter.to_be_bytes());
            pck.set_data(data);
        }

        if st.stream_type == StreamType::Visual && st.codec != CodecKind::Timecode {
            self.nb_video_frames_since_start += 1;
        }

        if !st.first_pck_sent {
            st.first_pck_sent = true;
            if self.opts.splitrange {
                let number = if self.mode == ExtractMode::Range {
                    self.cur_range_idx
                }
                else {
                    self.file_idx
                };
                pck.props.file_number = Some(number);
                pck.props.file_suffix = Some(self.cur_suffix.clone());
                pck.props.period_resume = number > 1;
                pck.props.custom = self.cur_props.clone();
            }
        }

        st.sink.send(pck);
    }
}

/// Clamp a rewritten timestamp to zero, warning on underflow.
fn clamp_ts(value: i128) -> u64 {
    if value < 0 {
        warn!("rewritten timestamp is negative ({}), clamping to zero", value);
        0
    }
    else {
        value as u64
    }
}

/// Copy the sample range `[first, last)` out of a raw audio payload.
fn slice_samples(
    buf: &[u8],
    audio: &splice_core::stream::AudioFormat,
    total: u64,
    first: u64,
    last: u64,
) -> Vec<u8> {
    let bps = audio.bytes_per_sample as usize;

    if audio.planar {
        // One contiguous plane of `total` samples per channel.
        let mut out = Vec::with_capacity((last - first) as usize * audio.bytes_per_frame());
        for channel in 0..audio.channels as usize {
            let plane = channel * total as usize * bps;
            let from = plane + first as usize * bps;
            let to = plane + last as usize * bps;
            out.extend_from_slice(&buf[from.min(buf.len())..to.min(buf.len())]);
        }
        out
    }
    else {
        let bpf = audio.bytes_per_frame();
        let from = first as usize * bpf;
        let to = last as usize * bpf;
        buf[from.min(buf.len())..to.min(buf.len())].to_vec()
    }
}
