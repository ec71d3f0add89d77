// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chunk planning for the access point, duration, and size split modes: picking the common end
//! cut of the next chunk from the queued access points of every stream.

use std::cmp::Ordering;

use log::warn;

use splice_core::errors::{unsupported_error, Result};
use splice_core::units::{cmp_ts, rescale_ts, TimeStamp};

use crate::filter::Extractor;
use crate::range::{ExtractMode, Rounding};
use crate::stream::StartState;

/// A cut candidate: a timestamp and the timescale it is expressed in.
type Cut = (TimeStamp, u32);

impl Extractor {
    pub(crate) fn process_split(&mut self) -> Result<()> {
        if !self.in_range {
            self.fetch_split_inputs()?;
            self.plan_chunk();
        }

        if self.in_range {
            self.emit_streams()?;
            self.check_split_completion()?;
        }
        else if self.all_inputs_finished() {
            self.finish_all();
        }
        Ok(())
    }

    fn all_inputs_finished(&self) -> bool {
        self.streams
            .iter()
            .all(|st| (st.in_eos || !st.is_playing) && st.queue.is_empty())
    }

    /// Pull every available packet into the per-stream queues.
    fn fetch_split_inputs(&mut self) -> Result<()> {
        let nosap = self.opts.nosap;

        for i in 0..self.streams.len() {
            loop {
                let st = &mut self.streams[i];
                if !st.is_playing || st.in_eos {
                    break;
                }

                let pck = st
                    .pending
                    .take()
                    .or_else(|| st.src.next_packet().inspect(|_| st.nb_frames += 1));

                let Some(pck) = pck else {
                    if st.src.is_eos() {
                        st.in_eos = true;
                        if st.nb_frames == 1 && st.reinsert_single.is_some() {
                            st.start_state = StartState::ReinsertSingle;
                            st.queue.clear();
                        }
                    }
                    break;
                };

                // Splitting by size or duration retains packets across ticks to plan the cut,
                // which is incompatible with a producer that demands immediate consumption.
                if pck.blocking_ref
                    && matches!(self.mode, ExtractMode::Size | ExtractMode::Dur)
                {
                    warn!("stream {} delivers blocking references, aborting", self.streams[i].id);
                    return unsupported_error(
                        "size and duration splitting cannot retain blocking packet references",
                    );
                }

                let st = &mut self.streams[i];
                let ts = st.ts_of(&pck);
                if st.effective_sap(&pck, nosap) {
                    st.prev_sap_ts = Some(ts);
                }
                else {
                    st.all_saps = false;
                }

                if st.nb_frames == 1 && st.reinsert_single.is_none() {
                    st.reinsert_single = Some(pck.clone());
                }
                else if st.nb_frames > 1 {
                    st.reinsert_single = None;
                }

                st.queue.push_back(pck);
            }
        }
        Ok(())
    }

    /// Try to compute the common end cut of the next chunk. Commits the cut and enters
    /// emission when every stream can honour it.
    fn plan_chunk(&mut self) {
        let nosap = self.opts.nosap;

        // Per-stream candidates, split by whether the stream needs SAP-aligned cuts.
        let mut aligned: Option<Cut> = None;
        let mut free: Option<Cut> = None;

        for st in &self.streams {
            if !st.is_playing || st.start_state == StartState::ReinsertSingle {
                continue;
            }

            let candidate = match self.mode {
                ExtractMode::Dur => {
                    // The first access point at or after the nominal chunk end.
                    let Some(end) = self.cur_end else { continue };
                    st.queue
                        .iter()
                        .filter(|pck| st.effective_sap(pck, nosap))
                        .map(|pck| st.ts_of(pck))
                        .find(|ts| end.cmp_ts(*ts, st.timescale) != Ordering::Greater)
                }
                _ => {
                    // The next access point strictly after the chunk head, skipping one more
                    // GOP for every size probe that came up short.
                    let head = st.queue.front().map(|pck| st.ts_of(pck));
                    head.and_then(|head| {
                        st.queue
                            .iter()
                            .filter(|pck| st.effective_sap(pck, nosap))
                            .map(|pck| st.ts_of(pck))
                            .filter(|ts| *ts > head)
                            .nth(self.gop_depth as usize)
                    })
                }
            };

            let slot = if st.all_saps { &mut free } else { &mut aligned };
            if let Some(ts) = candidate {
                let better = slot.map_or(true, |(best, scale)| {
                    cmp_ts(ts, st.timescale, best, scale) == Ordering::Less
                });
                if better {
                    *slot = Some((ts, st.timescale));
                }
            }
        }

        let candidate = aligned.or(free);
        let any_eos = self.streams.iter().any(|st| st.in_eos && st.is_playing);

        let (mut cut, flush) = match candidate {
            Some(cut) => (cut, false),
            None if any_eos => {
                // A stream ended with content still queued: flush everything in one final
                // chunk, cut at the latest queued media end.
                let last = self
                    .streams
                    .iter()
                    .filter_map(|st| st.last_queued_end().map(|end| (end, st.timescale)))
                    .max_by(|a, b| cmp_ts(a.0, a.1, b.0, b.1));
                match last {
                    Some(cut) => (cut, true),
                    None => return,
                }
            }
            None => return,
        };

        // Every live stream must have queued content up to the cut before it is committed.
        if !flush {
            for st in &self.streams {
                if !st.is_playing || st.in_eos || st.start_state == StartState::ReinsertSingle {
                    continue;
                }
                let covered = st
                    .last_queued_end()
                    .is_some_and(|end| cmp_ts(end, st.timescale, cut.0, cut.1) != Ordering::Less);
                if !covered {
                    return;
                }
            }
        }

        if self.mode == ExtractMode::Size && !flush {
            match self.adjust_size_cut(cut) {
                Some(chosen) => cut = chosen,
                None => return,
            }
        }

        self.commit_cut(cut);
    }

    /// Grow or settle a size-split cut. Returns the cut to commit, or `None` when another GOP
    /// of input is needed first.
    fn adjust_size_cut(&mut self, cut: Cut) -> Option<Cut> {
        let total = self.queued_size_until(cut);

        if total < self.split_size {
            let advanced = self.prev_min_ts.map_or(true, |(ts, scale, _)| {
                cmp_ts(cut.0, cut.1, ts, scale) == Ordering::Greater
            });
            if advanced {
                // Remember this candidate as the under-target bracket and ask for one more
                // GOP.
                self.prev_min_ts = Some((cut.0, cut.1, total));
                self.gop_depth += 1;
            }
            return None;
        }

        // The estimate crossed the target: settle between the bracketing candidates.
        let chosen = match (self.opts.xround, self.prev_min_ts) {
            (Rounding::Before, Some((ts, scale, _))) => (ts, scale),
            (Rounding::Closest, Some((ts, scale, prev_size))) => {
                if self.split_size - prev_size <= total - self.split_size {
                    (ts, scale)
                }
                else {
                    cut
                }
            }
            _ => cut,
        };
        Some(chosen)
    }

    /// Total queued payload bytes, across all streams, of packets starting before the cut.
    fn queued_size_until(&self, cut: Cut) -> u64 {
        self.streams
            .iter()
            .flat_map(|st| {
                st.queue
                    .iter()
                    .filter(|pck| {
                        cmp_ts(st.ts_of(pck), st.timescale, cut.0, cut.1) == Ordering::Less
                    })
                    .map(|pck| pck.size() as u64)
            })
            .sum()
    }

    /// Commit the cut: mark the chunk bounds on every stream and enter emission.
    fn commit_cut(&mut self, cut: Cut) {
        let chunk_start = self.cur_start;

        for i in 0..self.streams.len() {
            let st = &mut self.streams[i];
            if !st.is_playing {
                continue;
            }

            let cut_st = rescale_ts(cut.0, cut.1, st.timescale);

            if st.start_state == StartState::ReinsertSingle {
                // Re-emit the informational packet, clamped to the span of this chunk.
                if let Some(pck) = st.reinsert_single.clone() {
                    let ts = st.ts_of(&pck);
                    let span = cut_st.saturating_sub(chunk_start.to_scale(st.timescale));
                    st.ts_at_range_start = Some(ts);
                    st.chunk_media_end = ts;
                    st.range_end_ts = Some(ts + span);
                    st.queue.push_back(pck);
                }
                continue;
            }

            st.range_end_ts = Some(cut_st);
            if st.ts_at_range_start.is_none() {
                let head = st.queue.front().map(|pck| st.ts_of(pck)).unwrap_or(cut_st);
                st.ts_at_range_start = Some(head);
                st.chunk_media_end = head;
            }
        }

        self.min_ts = Some(cut);
        self.prev_min_ts = None;
        self.gop_depth = 0;
        self.in_range = true;
        self.tmcd_frames_at_range_start = self.nb_video_frames_since_start;
    }

    fn check_split_completion(&mut self) -> Result<()> {
        let all_done = self.streams.iter().all(|st| {
            if !st.is_playing {
                return true;
            }
            match st.range_end_ts {
                Some(end) => st.queue.front().map_or(true, |pck| st.ts_of(pck) >= end),
                None => true,
            }
        });
        if !all_done {
            return Ok(());
        }

        let Some(cut) = self.min_ts else {
            return Ok(());
        };

        // Accumulate each stream's consumed span and rebase the next chunk on the cut, so the
        // output timeline stays continuous.
        for st in &mut self.streams {
            if !st.is_playing {
                continue;
            }
            if st.start_state == StartState::ReinsertSingle {
                if let (Some(start), Some(end)) = (st.ts_at_range_start, st.range_end_ts) {
                    st.ts_at_range_end += end.saturating_sub(start);
                }
                st.range_end_ts = None;
                st.first_pck_sent = false;
                continue;
            }

            let cut_st = rescale_ts(cut.0, cut.1, st.timescale);
            if let Some(start) = st.ts_at_range_start {
                st.ts_at_range_end += cut_st.max(start) - start;
                st.ts_at_range_start = Some(cut_st);
            }
            st.range_end_ts = None;
            st.split_start = 0;
            st.split_end = 0;
            st.first_pck_sent = false;
            st.chunk_media_end = cut_st;
        }

        self.in_range = false;

        if self.all_inputs_finished() {
            self.finish_all();
            return Ok(());
        }
        self.load_range(false)
    }
}
