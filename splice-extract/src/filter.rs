// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The extraction engine: a multi-stream filter that rewrites framed media streams onto a
//! continuous output timeline covering one or more extraction windows, optionally paced in real
//! time, filtered by access point class or frame index, and split into chunks by duration, size,
//! or at access point boundaries.

use std::cmp::Ordering;

use log::{info, warn};

use splice_core::errors::{invalid_option_error, unseekable_error, Result};
use splice_core::packet::Packet;
use splice_core::stream::{CodecKind, StreamEvent, StreamSink, StreamSource, StreamType};
use splice_core::units::{cmp_ts, rescale_ts, ts_to_micros, Time, TimeStamp};

use crate::pacer::{Clock, RealTimeMode, SystemClock, RT_PRECISION_US};
use crate::range::{parse_range_spec, ExtractMode, RangeKind, RangeSpec, Rounding};
use crate::stream::{PacketPos, StartState, StreamCtx};

/// `ExtractorOptions` is the full configuration surface of the extraction engine.
#[derive(Clone, Debug)]
pub struct ExtractorOptions {
    /// Real-time pacing mode. Default: `Off`.
    pub rt: RealTimeMode,
    /// Playback speed multiplier used by the pacer. Must be positive. Default: `1.0`.
    pub speed: f64,
    /// When non-empty, keep only packets whose SAP class is listed; class 0 keeps non-SAP
    /// packets. Default: empty (keep all).
    pub saps: Vec<u8>,
    /// Drop packets no other packet depends on. Default: `false`.
    pub refs: bool,
    /// Treat all streams as raw: every packet is an access point and carries no decode
    /// reordering. Default: `false`.
    pub raw: bool,
    /// When non-empty and no ranges are being extracted, keep only the listed 1-based frame
    /// indices of each stream. Default: empty.
    pub frames: Vec<u64>,
    /// Extraction range start points. See [`parse_range_spec`] for the accepted forms. The
    /// first entry selects the extraction mode. Default: empty (passthrough).
    pub xs: Vec<String>,
    /// Extraction range end points, paired with `xs` by index. A missing end leaves the range
    /// open, unless a further start follows, in which case that start doubles as this range's
    /// end. Default: empty.
    pub xe: Vec<String>,
    /// Rounding policy applied when snapping a range start to an access point. Default:
    /// `Before`.
    pub xround: Rounding,
    /// Snap the end of each range to the frame before the next access point of the first
    /// visual stream, instead of cutting at the requested time. Default: `false`.
    pub xadjust: bool,
    /// Treat every packet as an access point. Default: `false`.
    pub nosap: bool,
    /// Attach `FileNumber` and `FileSuffix` properties to the first packet of every chunk.
    /// Default: `false`.
    pub splitrange: bool,
    /// Safety rewind, in seconds, applied when repositioning upstream sources. Default: `10.0`.
    pub seeksafe: f64,
    /// Rewrite timecode sample payloads so each chunk starts at the correct timecode. Default:
    /// `true`.
    pub tcmdrw: bool,
    /// Extra `name=value` properties attached to the first packet of each range, one
    /// comma-separated list per range. Default: empty.
    pub props: Vec<String>,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        ExtractorOptions {
            rt: RealTimeMode::Off,
            speed: 1.0,
            saps: Vec::new(),
            refs: false,
            raw: false,
            frames: Vec::new(),
            xs: Vec::new(),
            xe: Vec::new(),
            xround: Rounding::Before,
            xadjust: false,
            nosap: false,
            splitrange: false,
            seeksafe: 10.0,
            tcmdrw: true,
            props: Vec::new(),
        }
    }
}

/// The outcome of one `process` tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// More work may be possible; call again when an input has data or an output has capacity.
    Continue,
    /// Packets are pending on the pacer; call again after the given number of microseconds.
    Reschedule(u64),
    /// All configured ranges have been extracted and every output is at EOS.
    Eos,
}

/// The media range extraction and splitting engine.
///
/// An `Extractor` owns a set of stream source/sink pairs and is driven by repeated calls to
/// [`Extractor::process`]. Each tick pulls as many input packets as it can, decides cut points,
/// and sends as many output packets as pacing and the current range allow.
pub struct Extractor {
    pub(crate) opts: ExtractorOptions,
    pub(crate) streams: Vec<StreamCtx>,

    pub(crate) mode: ExtractMode,
    pub(crate) range_kind: RangeKind,

    /// The current range start, for time-based ranges.
    pub(crate) cur_start: Time,
    /// The current range end; `None` while the range is open.
    pub(crate) cur_end: Option<Time>,
    /// 1-based frame range bounds, for frame-based ranges.
    pub(crate) start_frame: Option<u64>,
    pub(crate) end_frame: Option<u64>,
    /// The current range is expressed in frame indices.
    pub(crate) frame_range: bool,

    /// Fixed chunk length in duration-split mode.
    pub(crate) extract_dur: Time,
    /// Target chunk size in bytes in size-split mode.
    pub(crate) split_size: u64,

    /// Index of the next `xs` entry to load.
    next_range_idx: usize,
    /// 1-based index of the current range, used as `FileNumber` in range mode.
    pub(crate) cur_range_idx: u32,
    /// 1-based index of the current chunk in split modes.
    pub(crate) file_idx: u32,
    /// The `FileSuffix` value for the current chunk.
    pub(crate) cur_suffix: String,
    /// Parsed per-range properties for the current range.
    pub(crate) cur_props: Vec<(String, String)>,

    /// True while the current chunk is being emitted. No stream accepts new input packets
    /// while set.
    pub(crate) in_range: bool,
    /// The common start cut of the current range has been resolved.
    start_resolved: bool,
    /// Non-video intake is paused until the first visual stream locates its SAP-aligned end
    /// cut.
    pub(crate) wait_video_range_adjust: bool,

    /// The committed common end cut in split modes.
    pub(crate) min_ts: Option<(TimeStamp, u32)>,
    /// The previous end cut candidate bracketing a size-split estimate, with its estimated
    /// size.
    pub(crate) prev_min_ts: Option<(TimeStamp, u32, u64)>,
    /// Extra GOPs to include before re-evaluating a size split.
    pub(crate) gop_depth: u32,

    /// Visual frames emitted since the start of the session, and its snapshot at the start of
    /// the current chunk, used to rewrite timecode samples.
    pub(crate) nb_video_frames_since_start: u64,
    pub(crate) tmcd_frames_at_range_start: u64,

    pub(crate) clock: Box<dyn Clock>,
    /// The shared pacing anchor when all streams pace against a single clock.
    pub(crate) sync_anchor: Option<crate::pacer::Anchor>,
    /// The smallest pending pacer wait this tick, in microseconds.
    pub(crate) reschedule_us: Option<u64>,

    /// End state of the previous range, used to decide whether loading the next range needs a
    /// seek.
    prev_end: Option<Time>,

    started: bool,
    pub(crate) finished: bool,
}

impl Extractor {
    /// Create an extractor. The extraction mode is selected by the first `xs` entry; with no
    /// `xs` entries the extractor passes packets through, applying only the emission filters
    /// and pacing.
    pub fn new(opts: ExtractorOptions) -> Result<Self> {
        Self::with_clock(opts, Box::new(SystemClock::new()))
    }

    /// Create an extractor pacing against the provided clock.
    pub fn with_clock(opts: ExtractorOptions, clock: Box<dyn Clock>) -> Result<Self> {
        if !(opts.speed > 0.0) {
            return invalid_option_error("speed must be positive");
        }

        let mut extract_dur = Time::ZERO;
        let mut split_size = 0;

        let mode = match opts.xs.first().map(|spec| parse_range_spec(spec)) {
            None => ExtractMode::None,
            Some(None) => {
                warn!("unrecognized range start {:?}, disabling extraction", opts.xs[0]);
                ExtractMode::None
            }
            Some(Some(RangeSpec::Sap)) => ExtractMode::Sap,
            Some(Some(RangeSpec::Dur(dur))) => {
                if dur.is_zero() {
                    return invalid_option_error("split duration must be positive");
                }
                extract_dur = dur;
                ExtractMode::Dur
            }
            Some(Some(RangeSpec::Size(size))) => {
                split_size = size;
                ExtractMode::Size
            }
            Some(Some(RangeSpec::Time(_))) | Some(Some(RangeSpec::Frame(_))) => ExtractMode::Range,
        };

        Ok(Extractor {
            opts,
            streams: Vec::new(),
            mode,
            range_kind: RangeKind::None,
            cur_start: Time::ZERO,
            cur_end: None,
            start_frame: None,
            end_frame: None,
            frame_range: false,
            extract_dur,
            split_size,
            next_range_idx: 0,
            cur_range_idx: 0,
            file_idx: 1,
            cur_suffix: String::new(),
            cur_props: Vec::new(),
            in_range: false,
            start_resolved: false,
            wait_video_range_adjust: false,
            min_ts: None,
            prev_min_ts: None,
            gop_depth: 0,
            nb_video_frames_since_start: 0,
            tmcd_frames_at_range_start: 0,
            clock,
            sync_anchor: None,
            reschedule_us: None,
            prev_end: None,
            started: false,
            finished: false,
        })
    }

    /// The active extraction mode.
    pub fn mode(&self) -> ExtractMode {
        self.mode
    }

    /// Register a source/sink pair. All streams must be registered before the first call to
    /// [`Extractor::process`].
    pub fn add_stream(&mut self, src: Box<dyn StreamSource>, sink: Box<dyn StreamSink>) {
        let mut st = StreamCtx::new(src, sink, self.opts.raw);

        // A positive declared delay is folded into the rewritten timestamps, so the output
        // stream no longer carries it.
        if self.mode == ExtractMode::Range && st.tk_delay > 0 {
            st.sink.set_delay(0);
        }

        // When SAP filtering strips everything that is not a clean sync point, the output no
        // longer has distinct sync points to declare.
        if !self.opts.saps.is_empty() && self.opts.saps.iter().all(|class| (1..=2).contains(class))
        {
            st.sink.set_has_sync(false);
        }

        self.streams.push(st);
    }

    /// Handle a playback control event received on an output stream, forwarding it to the
    /// matching input.
    ///
    /// The first PLAY of each stream is rewritten so upstream starts delivering slightly before
    /// the first range.
    pub fn handle_output_event(&mut self, stream_id: u32, event: StreamEvent) {
        self.ensure_started();

        let rewrite = self.mode == ExtractMode::Range && !self.frame_range;
        let (cur_start, seeksafe) = (self.cur_start, self.opts.seeksafe);

        let Some(st) = self.streams.iter_mut().find(|st| st.id == stream_id) else {
            return;
        };

        match event {
            StreamEvent::Play { start, speed } => {
                let start = if rewrite && !st.play_seen {
                    (cur_start.as_secs_f64() - seeksafe).max(0.0)
                }
                else {
                    start
                };
                st.play_seen = true;
                st.is_playing = true;
                st.src.send_event(StreamEvent::Play { start, speed });
            }
            StreamEvent::Stop => {
                st.is_playing = false;
                st.src.send_event(StreamEvent::Stop);
            }
        }
    }

    /// Run one cooperative tick: pull available input, advance cut decisions, and emit as many
    /// output packets as pacing and the current range allow.
    pub fn process(&mut self) -> Result<ProcessStatus> {
        if self.finished {
            return Ok(ProcessStatus::Eos);
        }

        self.ensure_started();
        self.reschedule_us = None;

        let res = match self.mode {
            ExtractMode::None => self.process_passthrough(),
            ExtractMode::Range => self.process_range(),
            ExtractMode::Sap | ExtractMode::Size | ExtractMode::Dur => self.process_split(),
        };

        if let Err(err) = res {
            self.finished = true;
            return Err(err);
        }

        if self.finished {
            return Ok(ProcessStatus::Eos);
        }
        if self.reschedule_us.is_some() {
            return Ok(ProcessStatus::Reschedule(RT_PRECISION_US));
        }
        Ok(ProcessStatus::Continue)
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            if self.mode == ExtractMode::Range {
                if let Err(err) = self.load_range(true) {
                    warn!("failed to load first range: {}", err);
                    self.finished = true;
                }
            }
            else if self.mode != ExtractMode::None {
                if self.mode == ExtractMode::Dur {
                    self.cur_end = Some(self.extract_dur);
                }
                self.cur_suffix = "0".to_string();
            }
        }
    }

    // ---- range loading ------------------------------------------------------------------

    /// Advance to the next chunk configuration. Called at start-up and whenever a chunk
    /// completes.
    pub(crate) fn load_range(&mut self, init: bool) -> Result<()> {
        match self.mode {
            ExtractMode::Dur => {
                // The nominal boundaries advance by exactly the split duration; the realized
                // cut snaps to the next access point.
                self.cur_start = self.cur_end.unwrap_or(Time::ZERO);
                self.cur_end = Some(self.cur_start.add(self.extract_dur));
                self.file_idx += 1;
                self.min_ts = None;
                self.cur_suffix = self.cur_start.to_millis().to_string();
                Ok(())
            }
            ExtractMode::Sap | ExtractMode::Size => {
                if let Some((ts, scale)) = self.min_ts {
                    self.cur_start = Time::new(ts, u64::from(scale));
                }
                self.min_ts = None;
                self.prev_min_ts = None;
                self.gop_depth = 0;
                self.file_idx += 1;
                self.cur_suffix = self.cur_start.to_millis().to_string();
                Ok(())
            }
            ExtractMode::Range => self.load_next_range(init),
            ExtractMode::None => Ok(()),
        }
    }

    fn load_next_range(&mut self, init: bool) -> Result<()> {
        loop {
            let idx = self.next_range_idx;

            if idx >= self.opts.xs.len() {
                self.range_kind = RangeKind::Done;
                self.finish_all();
                return Ok(());
            }
            self.next_range_idx += 1;

            let start = match parse_range_spec(&self.opts.xs[idx]) {
                Some(spec) => spec,
                None => {
                    warn!("unrecognized range start {:?}, skipping range", self.opts.xs[idx]);
                    continue;
                }
            };

            let was_frame = self.frame_range;
            let prev_end = self.prev_end;

            match start {
                RangeSpec::Time(time) => {
                    self.frame_range = false;
                    self.cur_start = time;
                    self.start_frame = None;
                    self.end_frame = None;
                    self.cur_end = self.parse_range_end(idx).and_then(|spec| match spec {
                        RangeSpec::Time(end) => Some(end),
                        _ => {
                            warn!("range end type does not match its start, leaving range open");
                            None
                        }
                    });
                }
                RangeSpec::Frame(frame) => {
                    self.frame_range = true;
                    self.start_frame = Some(frame);
                    self.end_frame = self.parse_range_end(idx).and_then(|spec| match spec {
                        RangeSpec::Frame(end) => Some(end),
                        _ => {
                            warn!("range end type does not match its start, leaving range open");
                            None
                        }
                    });
                    self.cur_end = None;
                }
                _ => {
                    warn!("split specifier {:?} inside a range list, skipping", self.opts.xs[idx]);
                    continue;
                }
            }

            self.range_kind =
                if self.cur_end.is_some() || self.end_frame.is_some() { RangeKind::Closed }
                else { RangeKind::Open };

            self.cur_range_idx = idx as u32 + 1;
            self.cur_suffix = self.format_suffix(idx);
            self.cur_props = self.parse_props(idx);

            // Decide whether upstream must be repositioned: going backwards past the safety
            // margin, or switching from frame addressing back to time addressing.
            if !init {
                let mut need_seek = was_frame && !self.frame_range;
                if let (false, Some(prev_end)) = (self.frame_range, prev_end) {
                    let start_us = self.cur_start.to_micros();
                    let safe_us = (self.opts.seeksafe * 1_000_000.0) as u64;
                    if start_us + safe_us < prev_end.to_micros() {
                        need_seek = true;
                    }
                }
                if need_seek {
                    self.issue_seek()?;
                }
            }

            self.prev_end = if self.frame_range { None } else { self.cur_end };

            self.wait_video_range_adjust = self.opts.xadjust
                && self.range_kind == RangeKind::Closed
                && !self.frame_range
                && self.streams.iter().any(|st| st.stream_type == StreamType::Visual);

            for st in &mut self.streams {
                st.reset_range_state();
            }
            self.start_resolved = false;

            return Ok(());
        }
    }

    /// The effective end of range `idx`: its `xe` entry when present, otherwise the following
    /// start when one exists (which then doubles as this range's end).
    fn parse_range_end(&self, idx: usize) -> Option<RangeSpec> {
        if let Some(raw) = self.opts.xe.get(idx) {
            let spec = parse_range_spec(raw);
            if spec.is_none() {
                warn!("unrecognized range end {:?}, leaving range open", raw);
            }
            return spec;
        }
        self.opts.xs.get(idx + 1).and_then(|raw| parse_range_spec(raw))
    }

    fn format_suffix(&self, idx: usize) -> String {
        if self.frame_range {
            // Frame endpoints have no natural millisecond form: concatenate the raw endpoint
            // text, made file-name safe.
            let sanitize = |s: &str| s.replace([':', '/'], ".");
            match self.opts.xe.get(idx) {
                Some(end) => format!("{}_{}", sanitize(&self.opts.xs[idx]), sanitize(end)),
                None => sanitize(&self.opts.xs[idx]),
            }
        }
        else {
            match self.cur_end {
                Some(end) => format!("{}-{}", self.cur_start.to_millis(), end.to_millis()),
                None => self.cur_start.to_millis().to_string(),
            }
        }
    }

    fn parse_props(&self, idx: usize) -> Vec<(String, String)> {
        let Some(list) = self.opts.props.get(idx) else {
            return Vec::new();
        };
        list.split(',')
            .filter_map(|item| {
                let (name, value) = item.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Reposition every source slightly before the current range start.
    fn issue_seek(&mut self) -> Result<()> {
        if let Some(st) = self.streams.iter().find(|st| !st.seekable) {
            warn!("range requires seeking but stream {} is not seekable, aborting", st.id);
            self.range_kind = RangeKind::Done;
            self.finish_all();
            return unseekable_error("out-of-order ranges on an unseekable source");
        }

        let start = (self.cur_start.as_secs_f64() - self.opts.seeksafe).max(0.0);
        info!("repositioning sources to {:.3}s", start);

        let speed = self.opts.speed;
        for st in &mut self.streams {
            st.src.send_event(StreamEvent::Stop);
            st.src.send_event(StreamEvent::Play { start, speed });
            st.reset_after_seek();
        }
        self.sync_anchor = None;
        Ok(())
    }

    /// Send EOS on every output and release the inputs.
    pub(crate) fn finish_all(&mut self) {
        for st in &mut self.streams {
            st.queue.clear();
            st.pending = None;
            st.split_pck = None;
            st.sink.set_eos();
            st.src.send_event(StreamEvent::Stop);
            st.src.set_discard(true);
        }
        self.finished = true;
    }

    // ---- passthrough --------------------------------------------------------------------

    fn process_passthrough(&mut self) -> Result<()> {
        for i in 0..self.streams.len() {
            loop {
                let st = &mut self.streams[i];
                if !st.is_playing {
                    break;
                }
                let Some(pck) = st.pending.take().or_else(|| {
                    st.src.next_packet().inspect(|_| st.nb_frames += 1)
                }) else {
                    if st.src.is_eos() && !st.in_eos {
                        st.in_eos = true;
                        st.sink.set_eos();
                    }
                    break;
                };

                if !self.filter_verdict(i, &pck) {
                    self.streams[i].nb_frames_out += 1;
                    continue;
                }

                let st = &self.streams[i];
                let cts_us = ts_to_micros(pck.cts + st.tk_delay, st.timescale);
                if !self.pace_ts(i, cts_us) {
                    self.streams[i].pending = Some(pck);
                    break;
                }

                let st = &mut self.streams[i];
                st.nb_frames_out += 1;
                if st.stream_type == StreamType::Visual && st.codec != CodecKind::Timecode {
                    self.nb_video_frames_since_start += 1;
                }
                st.sink.send(pck);
            }
        }

        if self.streams.iter().all(|st| st.in_eos || !st.is_playing) {
            self.finished = true;
        }
        Ok(())
    }

    // ---- range extraction ---------------------------------------------------------------

    fn process_range(&mut self) -> Result<()> {
        if self.range_kind == RangeKind::Done {
            return Ok(());
        }

        if !self.in_range {
            self.fetch_range_inputs();

            if !self.start_resolved {
                self.try_resolve_start();
            }
            else {
                // The start of this range was already resolved in an earlier tick; newly
                // fetched packets extend the current chunk.
                self.in_range = true;
            }
        }

        if self.in_range {
            self.emit_streams()?;
            self.check_range_completion()?;
        }
        Ok(())
    }

    /// Pull packets for every stream still collecting input for the current range.
    fn fetch_range_inputs(&mut self) {
        for i in 0..self.streams.len() {
            loop {
                let st = &mut self.streams[i];
                if st.intake_done() {
                    break;
                }

                let pck = st
                    .split_pck
                    .take()
                    .or_else(|| st.pending.take())
                    .or_else(|| st.src.next_packet().inspect(|_| st.nb_frames += 1));

                let Some(pck) = pck else {
                    if st.src.is_eos() {
                        self.handle_range_eos(i);
                    }
                    break;
                };

                if !self.decide_packet(i, pck) {
                    break;
                }
            }
        }
    }

    fn handle_range_eos(&mut self, i: usize) {
        // The end cut can no longer be adjusted once the owning stream is over; unpark the
        // other streams.
        if self.adjust_owner() == Some(i) {
            self.wait_video_range_adjust = false;
        }

        let st = &mut self.streams[i];
        st.in_eos = true;

        // A stream carrying exactly one informational packet re-emits it at every chunk start
        // instead of contributing a cut, whatever the packet's position in the range.
        if st.nb_frames == 1 && st.reinsert_single.is_some() {
            st.start_state = StartState::ReinsertSingle;
            st.sap_start_ts = None;
            st.queue.clear();
            return;
        }

        match st.start_state {
            StartState::Pending => {
                st.start_state = StartState::EosBeforeStart;
                st.queue.clear();
            }
            // The end cut will never be seen: the chunk flushes to the end of the stream.
            _ => (),
        }
    }

    /// Route one fetched packet through the per-packet range decision. Returns false when the
    /// stream should stop fetching this tick.
    fn decide_packet(&mut self, i: usize, pck: Packet) -> bool {
        let adjust_owner = self.adjust_owner();
        let st = &mut self.streams[i];

        let ts = st.ts_of(&pck);
        let is_sap = st.effective_sap(&pck, self.opts.nosap);
        if !is_sap {
            st.all_saps = false;
        }

        // Track the single-packet case: keep a reference to the first packet until a second
        // one proves the stream is a regular stream.
        if st.nb_frames == 1 && st.reinsert_single.is_none() && st.queue.is_empty() {
            st.reinsert_single = Some(pck.clone());
        }
        else if st.nb_frames > 1 {
            st.reinsert_single = None;
        }

        let pos = self.classify(i, &pck, ts);
        let st = &mut self.streams[i];

        match pos {
            PacketPos::Before => {
                if is_sap {
                    st.prev_sap_ts = Some(ts);
                    // A later access point before the start supersedes everything queued up
                    // to it: earlier packets can no longer begin the range.
                    if self.streams.len() == 1 || !self.streams[i].all_saps {
                        self.purge_queues_before(ts, self.streams[i].timescale);
                    }
                }
                self.streams[i].queue.push_back(pck);
                true
            }
            PacketPos::Inside => {
                if st.start_state == StartState::Pending {
                    if st.sap_start_ts.is_some() {
                        // The start was selected earlier; the stream was only waiting for
                        // more packets to reach the common cut.
                        st.start_state = StartState::Found;
                    }
                    else if is_sap || self.frame_range {
                        let sel = self.select_start(i, ts);
                        let st = &mut self.streams[i];
                        st.sap_start_ts = Some(sel);
                        st.start_state = StartState::Found;
                    }
                }
                self.streams[i].queue.push_back(pck);
                true
            }
            PacketPos::After { keep } => {
                if self.opts.xadjust && self.wait_video_range_adjust && !self.frame_range {
                    if adjust_owner == Some(i) {
                        if is_sap {
                            // The adjusted end is this access point; every stream now cuts
                            // against it.
                            self.cur_end = Some(Time::new(ts, u64::from(st.timescale)));
                            self.wait_video_range_adjust = false;
                            let st = &mut self.streams[i];
                            st.range_end_ts = Some(ts);
                            st.pending = Some(pck);
                            return false;
                        }
                        // Not an access point: the chunk extends past the nominal end.
                        st.queue.push_back(pck);
                        return true;
                    }
                    // Park the packet until the visual stream fixes the real end.
                    st.pending = Some(pck);
                    return false;
                }

                match keep {
                    Some(keep_dur) => {
                        // The end cut falls inside this packet: emit its head in this chunk
                        // and carry the packet so its tail re-enters the next range.
                        st.range_end_ts = Some(ts + keep_dur);
                        if keep_dur > 0 {
                            st.split_end = keep_dur;
                            st.queue.push_back(pck.clone());
                        }
                        st.split_pck = Some(pck);
                    }
                    None => {
                        st.range_end_ts = Some(ts);
                        st.pending = Some(pck);
                    }
                }
                false
            }
        }
    }

    /// Position of a packet relative to the current range bounds.
    fn classify(&self, i: usize, pck: &Packet, ts: TimeStamp) -> PacketPos {
        let st = &self.streams[i];

        if self.frame_range {
            // Frame-addressed ranges cut exactly at the requested indices: a range covers the
            // zero-based frames `[start, end)` of the stream.
            let idx = st.nb_frames;
            let start = self.start_frame.unwrap_or(0);
            if idx <= start {
                return PacketPos::Before;
            }
            if let Some(end) = self.end_frame {
                if idx > end {
                    return PacketPos::After { keep: None };
                }
            }
            return PacketPos::Inside;
        }

        let scale = st.timescale;

        // Entirely before the start: the packet ends at or before it.
        let before = if pck.dur > 0 {
            self.cur_start.cmp_ts(ts + pck.dur, scale) != Ordering::Less
        }
        else {
            self.cur_start.cmp_ts(ts, scale) == Ordering::Greater
        };
        if before {
            return PacketPos::Before;
        }

        if let Some(end) = self.cur_end {
            if end.cmp_ts(ts, scale) != Ordering::Greater {
                return PacketPos::After { keep: None };
            }
            if st.can_split {
                let end_ts = end.to_scale(scale);
                if ts + pck.dur > end_ts {
                    return PacketPos::After { keep: Some(end_ts - ts) };
                }
            }
        }

        PacketPos::Inside
    }

    /// Select the start cut for a stream whose first in-range access point is at `ts`.
    fn select_start(&self, i: usize, ts: TimeStamp) -> TimeStamp {
        let st = &self.streams[i];
        let scale = st.timescale;

        // Frame-addressed ranges begin exactly at the first in-range packet.
        if self.frame_range {
            return ts;
        }

        // Splittable streams cut exactly at the requested start, inside a packet if need be.
        if st.can_split {
            let start_ts = self.cur_start.to_scale(scale);
            if start_ts < ts {
                return ts;
            }
            return start_ts;
        }

        let exact = self.cur_start.cmp_ts(ts, scale) == Ordering::Equal;

        match self.opts.xround {
            Rounding::After => ts,
            Rounding::Before if exact => ts,
            Rounding::Before => st.prev_sap_ts.unwrap_or(ts),
            Rounding::Closest => match st.prev_sap_ts {
                Some(prev) => {
                    let d_prev = self.cur_start.distance_ts(prev, scale);
                    let d_this = self.cur_start.distance_ts(ts, scale);
                    if d_prev < d_this {
                        prev
                    }
                    else {
                        ts
                    }
                }
                None => ts,
            },
        }
    }

    /// Drop queued packets, on every stream, that end at or before the given timestamp.
    fn purge_queues_before(&mut self, ts: TimeStamp, scale: u32) {
        for st in &mut self.streams {
            while let Some(front) = st.queue.front() {
                let end = st.ts_of(front) + front.dur;
                if cmp_ts(end, st.timescale, ts, scale) != Ordering::Greater {
                    st.queue.pop_front();
                }
                else {
                    break;
                }
            }
        }
    }

    /// Once every playing stream has taken a position on the start cut, pick the common cut,
    /// trim the queues to it, and begin emitting.
    fn try_resolve_start(&mut self) {
        let undecided = self
            .streams
            .iter()
            .any(|st| st.is_playing && st.start_state == StartState::Pending);
        if undecided {
            return;
        }

        if self.streams.iter().all(|st| {
            !st.is_playing || st.start_state == StartState::EosBeforeStart
        }) {
            warn!("all streams ended before the requested start, nothing to extract");
            self.range_kind = RangeKind::Done;
            self.finish_all();
            return;
        }

        // The common cut: the earliest selected start among streams that need SAP-aligned
        // cuts; failing that, among the remaining streams; failing that, the requested start.
        let vote = |all_saps: bool| {
            self.streams
                .iter()
                .filter(|st| st.start_state == StartState::Found && st.all_saps == all_saps)
                .filter_map(|st| st.sap_start_ts.map(|ts| (ts, st.timescale)))
                .min_by(|a, b| cmp_ts(a.0, a.1, b.0, b.1))
        };
        let (min_ts, min_scale) = vote(false)
            .or_else(|| vote(true))
            .unwrap_or((self.cur_start.to_scale(1_000_000), 1_000_000));

        for i in 0..self.streams.len() {
            let st = &mut self.streams[i];
            match st.start_state {
                StartState::Found => (),
                StartState::ReinsertSingle => {
                    self.reinsert_single_clone(i, min_ts, min_scale);
                    continue;
                }
                _ => continue,
            }

            let min_st = rescale_ts(min_ts, min_scale, st.timescale);

            // Trim everything that ends at or before the common cut.
            while let Some(front) = st.queue.front() {
                let fts = st.ts_of(front);
                let drop = if front.dur > 0 {
                    fts + front.dur <= min_st
                }
                else {
                    fts < min_st
                };
                if drop {
                    st.queue.pop_front();
                }
                else {
                    break;
                }
            }

            let Some(front) = st.queue.front() else {
                if st.in_eos {
                    st.start_state = StartState::EosBeforeStart;
                    continue;
                }
                // Everything queued ended before the common cut: more packets are needed
                // before this stream can take its position.
                st.start_state = StartState::Pending;
                return;
            };

            let fts = st.ts_of(front);
            if st.can_split && fts < min_st {
                st.split_start = min_st - fts;
            }
            st.ts_at_range_start = Some(fts);
            st.chunk_media_end = fts;

            // A stream whose first retained packet lands after the common cut starts late
            // within the chunk; declare the offset so downstream keeps the streams aligned.
            if fts > min_st {
                let delay = (fts - min_st) as i64;
                st.sink.set_delay(delay);
            }
        }

        self.start_resolved = true;
        self.in_range = true;
        self.tmcd_frames_at_range_start = self.nb_video_frames_since_start;
    }

    /// Queue a fresh clone of a single-packet stream's packet for the current chunk.
    fn reinsert_single_clone(&mut self, i: usize, min_ts: TimeStamp, min_scale: u32) {
        let st = &mut self.streams[i];
        let Some(pck) = st.reinsert_single.clone() else {
            return;
        };

        let ts = st.ts_of(&pck);
        st.ts_at_range_start = Some(ts);
        st.chunk_media_end = ts;

        if let Some(end) = self.cur_end {
            let min_st = rescale_ts(min_ts, min_scale, st.timescale);
            let end_st = end.to_scale(st.timescale);
            let span = end_st.saturating_sub(min_st);
            st.range_end_ts = Some(ts + span);
        }

        st.queue.push_back(pck);
    }

    /// Index of the stream owning end-cut adjustment: the first visual stream.
    pub(crate) fn adjust_owner(&self) -> Option<usize> {
        self.streams.iter().position(|st| st.stream_type == StreamType::Visual)
    }

    fn check_range_completion(&mut self) -> Result<()> {
        let all_done = self.streams.iter().all(|st| match st.start_state {
            StartState::EosBeforeStart => true,
            StartState::ReinsertSingle => st.queue.is_empty(),
            StartState::Found => {
                st.queue.is_empty()
                    && (st.range_end_ts.is_some() || st.in_eos || !st.is_playing)
            }
            StartState::Pending => !st.is_playing,
        });

        if !all_done {
            // Streams with drained queues and no end in sight need more input before the
            // chunk can finish.
            let starved = self.streams.iter().any(|st| {
                st.start_state == StartState::Found
                    && st.queue.is_empty()
                    && st.range_end_ts.is_none()
                    && !st.in_eos
                    && st.is_playing
            });
            if starved {
                self.in_range = false;
            }
            return Ok(());
        }

        // The chunk is complete: accumulate each stream's consumed span so the next chunk
        // continues the output timeline, then move to the next range.
        for st in &mut self.streams {
            if let Some(start) = st.ts_at_range_start {
                let end = st.range_end_ts.unwrap_or(st.chunk_media_end).max(start);
                st.ts_at_range_end += end - start;
            }
        }

        self.in_range = false;
        self.load_range(false)
    }
}
