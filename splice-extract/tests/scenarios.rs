// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end extraction scenarios over deterministic synthetic streams.
//!
//! Fixtures: 25 fps video at a 90 kHz timescale with an access point every 12 frames, and
//! 48 kHz raw audio in 1024-sample packets.

use std::cell::RefCell;
use std::rc::Rc;

use splice_core::memory::{MemorySink, MemorySource};
use splice_core::packet::{Packet, SapType};
use splice_core::stream::{
    AudioFormat, CodecKind, SeekCapability, StreamEvent, StreamInfo, StreamSink, StreamType,
};
use splice_extract::pacer::ManualClock;
use splice_extract::{Extractor, ExtractorOptions, ProcessStatus, RealTimeMode, Rounding};

const VIDEO_SCALE: u32 = 90_000;
const FRAME: u64 = 3_600;
const GOP: u64 = 12;
const AUDIO_RATE: u32 = 48_000;
const APACKET: u64 = 1_024;

// ---- fixtures -------------------------------------------------------------------------------

/// One video frame per packet; the payload starts with the frame index so content can be
/// traced through cuts.
fn video_source(id: u32, frames: u64) -> MemorySource {
    let info = StreamInfo::new(id, StreamType::Visual, VIDEO_SCALE);
    let packets = (0..frames)
        .map(|i| {
            let sap = if i % GOP == 0 { SapType::Type1 } else { SapType::None };
            let mut payload = vec![0u8; 1_000];
            payload[..8].copy_from_slice(&i.to_be_bytes());
            Packet::new(id, i * FRAME, FRAME, payload).with_dts(i * FRAME).with_sap(sap)
        })
        .collect();
    MemorySource::new(info, packets)
}

fn audio_info(id: u32, planar: bool) -> StreamInfo {
    let audio =
        AudioFormat { sample_rate: AUDIO_RATE, channels: 2, bytes_per_sample: 2, planar };
    StreamInfo::new(id, StreamType::Audio, AUDIO_RATE)
        .with_codec(CodecKind::Raw)
        .with_audio(audio)
}

fn audio_source(id: u32, packets: u64) -> MemorySource {
    let info = audio_info(id, false);
    let packets = (0..packets)
        .map(|i| {
            let bytes = APACKET as usize * 4;
            Packet::new(id, i * APACKET, APACKET, vec![0u8; bytes]).with_sap(SapType::Type1)
        })
        .collect();
    MemorySource::new(info, packets)
}

fn frame_index(pck: &Packet) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&pck.buf()[..8]);
    u64::from_be_bytes(bytes)
}

// ---- harness --------------------------------------------------------------------------------

struct Shared(Rc<RefCell<MemorySink>>);

impl StreamSink for Shared {
    fn send(&mut self, packet: Packet) {
        self.0.borrow_mut().send(packet);
    }
    fn set_delay(&mut self, delay: i64) {
        self.0.borrow_mut().set_delay(delay);
    }
    fn set_has_sync(&mut self, has_sync: bool) {
        self.0.borrow_mut().set_has_sync(has_sync);
    }
    fn set_eos(&mut self) {
        self.0.borrow_mut().set_eos();
    }
}

fn sink() -> (Rc<RefCell<MemorySink>>, Box<Shared>) {
    let inner = Rc::new(RefCell::new(MemorySink::new()));
    (inner.clone(), Box::new(Shared(inner)))
}

fn run(extractor: &mut Extractor) {
    for _ in 0..10_000 {
        match extractor.process().expect("process tick") {
            ProcessStatus::Eos => return,
            _ => (),
        }
    }
    panic!("extractor did not reach EOS");
}

fn range_opts(xs: &[&str], xe: &[&str]) -> ExtractorOptions {
    ExtractorOptions {
        xs: xs.iter().map(|s| s.to_string()).collect(),
        xe: xe.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn assert_dts_monotone(packets: &[Packet]) {
    let mut prev = None;
    for pck in packets {
        let dts = pck.dts.unwrap_or(pck.cts);
        if let Some(prev) = prev {
            assert!(dts >= prev, "output timestamps regressed: {} < {}", dts, prev);
        }
        prev = Some(dts);
    }
}

// ---- range extraction -----------------------------------------------------------------------

#[test]
fn single_closed_range_starts_on_sync_frame() {
    // Extract [4s, 8s) with default rounding. The video cut lands on the last access point at
    // or before 4s: frame 96 at ts 345600. The audio stream is trimmed to the same instant,
    // sample 184320.
    let mut extractor = Extractor::new(range_opts(&["T0:00:04"], &["T0:00:08"])).unwrap();

    let (video, vsink) = sink();
    let (audio, asink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    extractor.add_stream(Box::new(audio_source(2, 1_406)), asink);
    run(&mut extractor);

    let video = video.borrow();
    let audio = audio.borrow();
    assert!(video.eos && audio.eos);

    // Frames 96..=199 survive; the first one is the access point the cut selected.
    assert_eq!(video.packets.len(), 104);
    assert_eq!(frame_index(&video.packets[0]), 96);
    assert!(video.packets[0].sap.is_sync());

    // The output timeline restarts at zero and stays dense.
    for (k, pck) in video.packets.iter().enumerate() {
        assert_eq!(pck.cts, k as u64 * FRAME);
    }
    assert_dts_monotone(&video.packets);

    // Audio spans the same media range: 4.16s starting at sample 184320.
    assert_eq!(audio.packets.len(), 195);
    assert_eq!(audio.packets[0].cts, 0);
    let samples: u64 = audio.packets.iter().map(|p| p.dur).sum();
    assert_eq!(samples, 199_680);

    // Both streams start exactly at the common cut, so no compensating delay is declared.
    assert_eq!(video.delay, None);
    assert_eq!(audio.delay, None);
}

#[test]
fn rounding_after_and_closest() {
    // With `after` rounding the cut is the first access point at or past 4s: frame 108.
    let mut opts = range_opts(&["T0:00:04"], &["T0:00:08"]);
    opts.xround = Rounding::After;
    let mut extractor = Extractor::new(opts).unwrap();
    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert_eq!(frame_index(&video.packets[0]), 108);
    assert_eq!(video.packets.len(), 92);

    // From 4.2s, frame 108 (4.32s) is closer than frame 96 (3.84s).
    let mut opts = range_opts(&["T0:00:04.2"], &["T0:00:08"]);
    opts.xround = Rounding::Closest;
    let mut extractor = Extractor::new(opts).unwrap();
    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    assert_eq!(frame_index(&video.borrow().packets[0]), 108);
}

#[test]
fn two_ranges_attach_boundary_properties() {
    let mut opts = range_opts(&["T0:00:02", "T0:00:10"], &["T0:00:03", "T0:00:11"]);
    opts.splitrange = true;
    opts.props = vec!["period=ad".to_string()];
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();

    // Chunk 1: frames 48..=74, chunk 2: frames 240..=274.
    assert_eq!(video.packets.len(), 27 + 35);
    assert_eq!(frame_index(&video.packets[0]), 48);
    assert_eq!(frame_index(&video.packets[27]), 240);

    let first = &video.packets[0].props;
    assert_eq!(first.file_number, Some(1));
    assert_eq!(first.file_suffix.as_deref(), Some("2000-3000"));
    assert!(!first.period_resume);
    assert_eq!(first.custom, vec![("period".to_string(), "ad".to_string())]);

    let second = &video.packets[27].props;
    assert_eq!(second.file_number, Some(2));
    assert_eq!(second.file_suffix.as_deref(), Some("10000-11000"));
    assert!(second.period_resume);

    // Non-boundary packets carry no chunk properties.
    assert!(video.packets[1].props.file_number.is_none());

    // The second chunk continues the output timeline where the first left off.
    assert_eq!(video.packets[27].cts, 27 * FRAME);
    assert_dts_monotone(&video.packets);
}

#[test]
fn frame_range_is_exact() {
    // Frames [100, 200) of the stream, regardless of access points.
    let mut extractor = Extractor::new(range_opts(&["F100"], &["F200"])).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert_eq!(video.packets.len(), 100);
    assert_eq!(frame_index(&video.packets[0]), 100);
    assert_eq!(frame_index(video.packets.last().unwrap()), 199);
    assert_eq!(video.packets[0].cts, 0);
}

#[test]
fn open_range_past_eos_is_graceful() {
    // A 30s file cannot reach a 1h start: no packets, a clean EOS, no panic.
    let mut extractor = Extractor::new(range_opts(&["T1:00:00"], &[])).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert!(video.packets.is_empty());
    assert!(video.eos);
}

#[test]
fn identity_open_range_preserves_stream() {
    // An open range from zero re-emits everything; payloads pass through by reference.
    let mut extractor = Extractor::new(range_opts(&["0"], &[])).unwrap();

    let (video, vsink) = sink();
    let (audio, asink) = sink();
    let input = video_source(1, 250);
    extractor.add_stream(Box::new(input), vsink);
    extractor.add_stream(Box::new(audio_source(2, 468)), asink);
    run(&mut extractor);

    let video = video.borrow();
    let audio = audio.borrow();
    assert_eq!(video.packets.len(), 250);
    assert_eq!(audio.packets.len(), 468);
    for (i, pck) in video.packets.iter().enumerate() {
        assert_eq!(pck.cts, i as u64 * FRAME);
        assert_eq!(frame_index(pck), i as u64);
    }
    for (i, pck) in audio.packets.iter().enumerate() {
        assert_eq!(pck.cts, i as u64 * APACKET);
        assert_eq!(pck.dur, APACKET);
    }
}

#[test]
fn positive_delay_folds_into_timestamps() {
    // A declared +0.1s video delay is folded into the cut decisions and cleared on the
    // output; the audio loses the 0.1s of samples the video never covers.
    let mut extractor = Extractor::new(range_opts(&["0"], &[])).unwrap();

    let info = StreamInfo::new(1, StreamType::Visual, VIDEO_SCALE).with_delay(9_000);
    let packets = (0..250)
        .map(|i| {
            let sap = if i % GOP == 0 { SapType::Type1 } else { SapType::None };
            Packet::new(1, i * FRAME, FRAME, vec![0u8; 16]).with_dts(i * FRAME).with_sap(sap)
        })
        .collect();
    let (video, vsink) = sink();
    extractor.add_stream(Box::new(MemorySource::new(info, packets)), vsink);

    let (audio, asink) = sink();
    extractor.add_stream(Box::new(audio_source(2, 468)), asink);
    run(&mut extractor);

    let video = video.borrow();
    let audio = audio.borrow();

    // The delay property was cleared up front and the video timeline still starts at zero.
    assert_eq!(video.delay, Some(0));
    assert_eq!(video.packets[0].cts, 0);

    // 9000 video ticks are 4800 audio samples: four whole packets and 704 samples of the
    // fifth are dropped.
    assert_eq!(audio.packets[0].dur, APACKET - 704);
    assert_eq!(audio.packets[0].buf().len(), (APACKET as usize - 704) * 4);
    assert_eq!(audio.packets[0].cts, 0);
}

// ---- sub-packet audio cuts ------------------------------------------------------------------

#[test]
fn audio_cut_inside_packets_interleaved() {
    // [4s, 7.99s): both boundaries land inside 1024-sample packets.
    let mut extractor = Extractor::new(range_opts(&["T0:00:04"], &["T0:00:07.99"])).unwrap();

    let (audio, asink) = sink();
    extractor.add_stream(Box::new(audio_source(1, 1_406)), asink);
    run(&mut extractor);

    let audio = audio.borrow();
    assert_eq!(audio.packets.len(), 188);

    // Head packet: 512 samples survive of the packet straddling 4s.
    assert_eq!(audio.packets[0].dur, 512);
    assert_eq!(audio.packets[0].buf().len(), 512 * 4);
    assert_eq!(audio.packets[0].cts, 0);

    // Tail packet: 544 samples reach up to 7.99s.
    let last = audio.packets.last().unwrap();
    assert_eq!(last.dur, 544);
    assert_eq!(last.buf().len(), 544 * 4);

    let samples: u64 = audio.packets.iter().map(|p| p.dur).sum();
    assert_eq!(samples, 191_520);
    assert_dts_monotone(&audio.packets);
}

#[test]
fn audio_cut_inside_packets_planar() {
    let mut extractor = Extractor::new(range_opts(&["T0:00:04"], &["T0:00:07.99"])).unwrap();

    // Planar layout: each packet holds the left plane then the right plane, marked so the
    // slices can be checked per channel.
    let info = audio_info(1, true);
    let packets = (0..1_406)
        .map(|i| {
            let plane = APACKET as usize * 2;
            let mut payload = vec![0xAAu8; plane];
            payload.extend(std::iter::repeat(0xBB).take(plane));
            Packet::new(1, i * APACKET, APACKET, payload).with_sap(SapType::Type1)
        })
        .collect();
    let (audio, asink) = sink();
    extractor.add_stream(Box::new(MemorySource::new(info, packets)), asink);
    run(&mut extractor);

    let audio = audio.borrow();

    // 512 samples per channel, each channel's plane sliced separately.
    let head = &audio.packets[0];
    assert_eq!(head.dur, 512);
    assert_eq!(head.buf().len(), 512 * 4);
    assert!(head.buf()[..1024].iter().all(|b| *b == 0xAA));
    assert!(head.buf()[1024..].iter().all(|b| *b == 0xBB));

    let last = audio.packets.last().unwrap();
    assert_eq!(last.buf().len(), 544 * 4);
    assert!(last.buf()[..1088].iter().all(|b| *b == 0xAA));
    assert!(last.buf()[1088..].iter().all(|b| *b == 0xBB));
}

// ---- end adjustment -------------------------------------------------------------------------

#[test]
fn adjusted_end_extends_to_next_video_sync() {
    // [2s, 3s) with end adjustment: 3s is mid-GOP, so the chunk extends to just before the
    // next video access point at frame 84 (3.36s), and the audio follows the adjusted cut.
    let mut opts = range_opts(&["T0:00:02"], &["T0:00:03"]);
    opts.xadjust = true;
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    let (audio, asink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    extractor.add_stream(Box::new(audio_source(2, 1_406)), asink);
    run(&mut extractor);

    let video = video.borrow();
    let audio = audio.borrow();

    // Frames 48..=83: up to, not including, the adjusted-end access point.
    assert_eq!(video.packets.len(), 36);
    assert_eq!(frame_index(&video.packets[0]), 48);
    assert_eq!(frame_index(video.packets.last().unwrap()), 83);

    // Audio covers [1.92s, 3.36s): 69120 samples.
    let samples: u64 = audio.packets.iter().map(|p| p.dur).sum();
    assert_eq!(samples, 69_120);
    assert_eq!(audio.packets.last().unwrap().dur, 512);
}

// ---- seeking --------------------------------------------------------------------------------

#[test]
fn out_of_order_ranges_reposition_upstream() {
    let mut opts = range_opts(&["T0:00:10", "T0:00:02"], &["T0:00:11", "T0:00:03"]);
    opts.seeksafe = 1.0;
    let mut extractor = Extractor::new(opts).unwrap();

    let source = video_source(1, 750);
    let (video, vsink) = sink();
    extractor.add_stream(Box::new(source), vsink);
    run(&mut extractor);

    let video = video.borrow();

    // Chunk 1 covers [9.6s, 11s), chunk 2 [1.92s, 3s).
    assert_eq!(video.packets.len(), 35 + 27);
    assert_eq!(frame_index(&video.packets[0]), 240);
    assert_eq!(frame_index(&video.packets[35]), 48);

    // The rewound chunk still lands after the first on the output timeline.
    assert_eq!(video.packets[35].cts, 35 * FRAME);
    assert_dts_monotone(&video.packets);
}

#[test]
fn out_of_order_ranges_fail_on_unseekable_source() {
    let mut opts = range_opts(&["T0:00:10", "T0:00:02"], &["T0:00:11", "T0:00:03"]);
    opts.seeksafe = 1.0;
    let mut extractor = Extractor::new(opts).unwrap();

    let info = StreamInfo::new(1, StreamType::Visual, VIDEO_SCALE)
        .with_seek(SeekCapability::Unseekable);
    let packets = (0..750)
        .map(|i| {
            let sap = if i % GOP == 0 { SapType::Type1 } else { SapType::None };
            Packet::new(1, i * FRAME, FRAME, vec![]).with_sap(sap)
        })
        .collect();
    let (video, vsink) = sink();
    extractor.add_stream(Box::new(MemorySource::new(info, packets)), vsink);

    let mut failed = false;
    for _ in 0..10_000 {
        match extractor.process() {
            Ok(ProcessStatus::Eos) => break,
            Ok(_) => (),
            Err(err) => {
                failed = true;
                assert!(matches!(err, splice_core::errors::Error::Unseekable(_)));
                break;
            }
        }
    }
    assert!(failed, "extraction should abort on the second range");

    // The first range was still delivered before the abort.
    assert_eq!(video.borrow().packets.len(), 35);
    assert!(video.borrow().eos);
}

// ---- split modes ----------------------------------------------------------------------------

#[test]
fn duration_split_follows_nominal_grid() {
    // 2.5s chunks over 10s of media. The nominal grid advances by exactly 2.5s; each
    // realized cut is the first video access point at or past the grid line.
    let mut opts = range_opts(&["D2500"], &[]);
    opts.splitrange = true;
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    let (audio, asink) = sink();
    extractor.add_stream(Box::new(video_source(1, 250)), vsink);
    extractor.add_stream(Box::new(audio_source(2, 468)), asink);
    run(&mut extractor);

    let video = video.borrow();
    let audio = audio.borrow();
    assert_eq!(video.packets.len(), 250);
    assert_eq!(audio.packets.len(), 468);

    // Chunk boundaries carry the nominal grid times: 0, 2500, 5000, 7500.
    let bounds: Vec<(usize, u32, String)> = video
        .packets
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            p.props.file_number.map(|n| (i, n, p.props.file_suffix.clone().unwrap()))
        })
        .collect();
    let suffixes: Vec<&str> = bounds.iter().map(|(_, _, s)| s.as_str()).collect();
    assert_eq!(suffixes, ["0", "2500", "5000", "7500"]);
    assert_eq!(bounds.iter().map(|(_, n, _)| *n).collect::<Vec<_>>(), [1, 2, 3, 4]);

    // Cuts snap to access points: chunks of 72, 60, 60, and the 58-frame tail.
    let starts: Vec<usize> = bounds.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(starts, [0, 72, 132, 192]);
    for start in &starts {
        assert!(video.packets[*start].sap.is_sync());
    }

    // Contiguous split output keeps the input timeline.
    for (i, pck) in video.packets.iter().enumerate() {
        assert_eq!(pck.cts, i as u64 * FRAME);
    }
    assert_dts_monotone(&audio.packets);
}

#[test]
fn sap_split_cuts_every_gop() {
    let mut opts = range_opts(&["SAP"], &[]);
    opts.splitrange = true;
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 48)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert_eq!(video.packets.len(), 48);

    let starts: Vec<usize> = video
        .packets
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.props.file_number.map(|_| i))
        .collect();
    assert_eq!(starts, [0, 12, 24, 36]);
}

#[test]
fn size_split_closest_balances_chunks() {
    // 1000-byte frames against a 100 KiB target: 96000 bytes undershoots by 6400, 108000
    // overshoots by 5600, so `closest` settles every cut at nine GOPs.
    let mut opts = range_opts(&["S100k"], &[]);
    opts.splitrange = true;
    opts.xround = Rounding::Closest;
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert_eq!(video.packets.len(), 750);

    let starts: Vec<usize> = video
        .packets
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.props.file_number.map(|_| i))
        .collect();
    assert_eq!(starts, [0, 108, 216, 324, 432, 540, 648]);

    // Every full chunk carries 108000 payload bytes; the tail flushes the rest.
    for window in starts.windows(2) {
        let bytes: usize =
            video.packets[window[0]..window[1]].iter().map(|p| p.buf().len()).sum();
        assert_eq!(bytes, 108_000);
    }
}

#[test]
fn size_split_before_stays_under_target() {
    let mut opts = range_opts(&["S100k"], &[]);
    opts.splitrange = true;
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    let starts: Vec<usize> = video
        .packets
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.props.file_number.map(|_| i))
        .collect();

    // Every settled chunk stays at or under the byte target.
    for window in starts.windows(2) {
        let bytes: usize =
            video.packets[window[0]..window[1]].iter().map(|p| p.buf().len()).sum();
        assert!(bytes <= 100 * 1024, "chunk of {} bytes exceeds the target", bytes);
    }
}

// ---- reinsertion and timecode ---------------------------------------------------------------

#[test]
fn single_packet_stream_reinserts_each_chunk() {
    let mut extractor =
        Extractor::new(range_opts(&["T0:00:02", "T0:00:10"], &["T0:00:03", "T0:00:11"]))
            .unwrap();

    let (_video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);

    // A still-image track: one packet covering the whole presentation.
    let info = StreamInfo::new(2, StreamType::Visual, VIDEO_SCALE);
    let still = Packet::new(2, 0, 750 * FRAME, vec![7u8; 32]).with_sap(SapType::Type1);
    let (image, isink) = sink();
    extractor.add_stream(Box::new(MemorySource::new(info, vec![still])), isink);
    run(&mut extractor);

    let image = image.borrow();
    assert_eq!(image.packets.len(), 2);

    // Each copy opens its chunk and covers at most the chunk span.
    assert_eq!(image.packets[0].cts, 0);
    assert_eq!(image.packets[0].dur, 97_200);
    assert_eq!(image.packets[1].cts, 97_200);
    assert_eq!(image.packets[1].dur, 126_000);
}

#[test]
fn timecode_payloads_restart_each_chunk() {
    let mut extractor =
        Extractor::new(range_opts(&["T0:00:02", "T0:00:10"], &["T0:00:03", "T0:00:11"]))
            .unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);

    // A timecode track: one sample per frame whose payload is a frame counter.
    let info =
        StreamInfo::new(2, StreamType::Visual, VIDEO_SCALE).with_codec(CodecKind::Timecode);
    let packets = (0..750)
        .map(|i| {
            Packet::new(2, i * FRAME, FRAME, 100u32.to_be_bytes().to_vec())
                .with_sap(SapType::Type1)
        })
        .collect();
    let (tmcd, tsink) = sink();
    extractor.add_stream(Box::new(MemorySource::new(info, packets)), tsink);
    run(&mut extractor);

    let video = video.borrow();
    let tmcd = tmcd.borrow();
    assert_eq!(video.packets.len(), 27 + 35);

    let counter = |pck: &Packet| {
        u32::from_be_bytes([pck.buf()[0], pck.buf()[1], pck.buf()[2], pck.buf()[3]])
    };

    // The first chunk starts from the source counter; the second is advanced by the 27
    // video frames emitted before it.
    assert_eq!(counter(&tmcd.packets[0]), 100);
    let second_chunk_at = tmcd.packets.iter().position(|p| p.cts >= 97_200).unwrap();
    assert_eq!(counter(&tmcd.packets[second_chunk_at]), 127);
}

// ---- events and pacing ----------------------------------------------------------------------

#[test]
fn play_event_rewinds_to_range_start() {
    let mut opts = range_opts(&["T0:00:30"], &[]);
    opts.seeksafe = 10.0;
    let mut extractor = Extractor::new(opts).unwrap();

    let (_, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);

    // The first PLAY is rewritten to land `seeksafe` ahead of the range start.
    extractor.handle_output_event(1, StreamEvent::Play { start: 0.0, speed: 1.0 });
    run(&mut extractor);
}

#[test]
fn stopped_stream_is_excluded() {
    let mut extractor = Extractor::new(range_opts(&["T0:00:04"], &["T0:00:08"])).unwrap();

    let (video, vsink) = sink();
    let (audio, asink) = sink();
    extractor.add_stream(Box::new(video_source(1, 750)), vsink);
    extractor.add_stream(Box::new(audio_source(2, 1_406)), asink);

    extractor.handle_output_event(2, StreamEvent::Stop);
    run(&mut extractor);

    assert_eq!(video.borrow().packets.len(), 104);
    assert!(audio.borrow().packets.is_empty());
}

#[test]
fn real_time_pacing_holds_packets_back() {
    let clock = ManualClock::new();
    let opts = ExtractorOptions { rt: RealTimeMode::On, ..Default::default() };
    let mut extractor =
        Extractor::with_clock(opts, Box::new(clock.clone())).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 5)), vsink);

    // The first packet anchors the clock; the second is 40ms of media away.
    match extractor.process().unwrap() {
        ProcessStatus::Reschedule(_) => (),
        status => panic!("expected a reschedule, got {:?}", status),
    }
    assert_eq!(video.borrow().packets.len(), 1);

    // Just short of the precision window nothing new is emitted.
    clock.advance(37_000);
    extractor.process().unwrap();
    assert_eq!(video.borrow().packets.len(), 1);

    // Inside the window the next frame passes.
    clock.advance(1_000);
    extractor.process().unwrap();
    assert_eq!(video.borrow().packets.len(), 2);

    // Far in the future everything drains and the stream finishes.
    clock.advance(1_000_000);
    let status = extractor.process().unwrap();
    assert_eq!(video.borrow().packets.len(), 5);
    assert_eq!(status, ProcessStatus::Eos);
}

#[test]
fn sap_filter_keeps_only_sync_frames() {
    // No ranges: a pure filtering pass keeping access points only.
    let opts = ExtractorOptions { saps: vec![1], ..Default::default() };
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 48)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    assert_eq!(video.packets.len(), 4);
    assert!(video.packets.iter().all(|p| p.sap.is_sync()));
    assert_eq!(video.has_sync, Some(false));
}

#[test]
fn frame_whitelist_filters_passthrough() {
    let opts = ExtractorOptions { frames: vec![1, 3, 5], ..Default::default() };
    let mut extractor = Extractor::new(opts).unwrap();

    let (video, vsink) = sink();
    extractor.add_stream(Box::new(video_source(1, 10)), vsink);
    run(&mut extractor);

    let video = video.borrow();
    let indices: Vec<u64> = video.packets.iter().map(frame_index).collect();
    assert_eq!(indices, [0, 2, 4]);
}
