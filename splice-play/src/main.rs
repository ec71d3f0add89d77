// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Runs the extraction engine over a synthetic audio/video pair and prints the emitted chunks.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use log::error;

use splice::core::memory::{MemorySink, MemorySource};
use splice::core::packet::{Packet, SapType};
use splice::core::stream::{
    AudioFormat, CodecKind, StreamInfo, StreamSink, StreamType,
};
use splice::extract::{Extractor, ExtractorOptions, ProcessStatus, RealTimeMode, Rounding};

/// Video fixture: 25 fps at a 90 kHz timescale with an access point every 12 frames.
const VIDEO_TIMESCALE: u32 = 90_000;
const VIDEO_FRAME_DUR: u64 = 3_600;
const VIDEO_GOP: u64 = 12;

/// Audio fixture: 48 kHz stereo in 1024-sample packets.
const AUDIO_RATE: u32 = 48_000;
const AUDIO_PACKET: u64 = 1_024;

fn main() {
    pretty_env_logger::init();

    let matches = Command::new("splice-play")
        .version("0.1.0")
        .about("Extract ranges from a synthetic media pair with Splice")
        .arg(
            Arg::new("xs")
                .long("xs")
                .value_name("SPECS")
                .help("Comma-separated range starts or a split rule (T.., F.., D.., S.., SAP)"),
        )
        .arg(Arg::new("xe").long("xe").value_name("SPECS").help("Comma-separated range ends"))
        .arg(
            Arg::new("xround")
                .long("xround")
                .value_name("MODE")
                .value_parser(["before", "after", "closest"])
                .default_value("before")
                .help("Start cut rounding policy"),
        )
        .arg(
            Arg::new("xadjust")
                .long("xadjust")
                .action(ArgAction::SetTrue)
                .help("Snap each range end to the next video access point"),
        )
        .arg(
            Arg::new("splitrange")
                .long("splitrange")
                .action(ArgAction::SetTrue)
                .help("Attach FileNumber/FileSuffix to the first packet of each chunk"),
        )
        .arg(
            Arg::new("nosap")
                .long("nosap")
                .action(ArgAction::SetTrue)
                .help("Treat every packet as an access point"),
        )
        .arg(
            Arg::new("rt")
                .long("rt")
                .value_name("MODE")
                .value_parser(["off", "on", "sync"])
                .default_value("off")
                .help("Real-time pacing mode"),
        )
        .arg(
            Arg::new("speed")
                .long("speed")
                .value_name("FACTOR")
                .default_value("1.0")
                .help("Playback speed multiplier for pacing"),
        )
        .arg(
            Arg::new("duration")
                .long("duration")
                .value_name("SECONDS")
                .default_value("30")
                .help("Length of the generated media"),
        )
        .get_matches();

    let opts = ExtractorOptions {
        xs: split_list(matches.get_one::<String>("xs")),
        xe: split_list(matches.get_one::<String>("xe")),
        xround: match matches.get_one::<String>("xround").map(String::as_str) {
            Some("after") => Rounding::After,
            Some("closest") => Rounding::Closest,
            _ => Rounding::Before,
        },
        xadjust: matches.get_flag("xadjust"),
        splitrange: matches.get_flag("splitrange"),
        nosap: matches.get_flag("nosap"),
        rt: match matches.get_one::<String>("rt").map(String::as_str) {
            Some("on") => RealTimeMode::On,
            Some("sync") => RealTimeMode::Sync,
            _ => RealTimeMode::Off,
        },
        speed: matches.get_one::<String>("speed").and_then(|s| s.parse().ok()).unwrap_or(1.0),
        ..Default::default()
    };

    let secs: u64 =
        matches.get_one::<String>("duration").and_then(|s| s.parse().ok()).unwrap_or(30);

    let mut extractor = match Extractor::new(opts) {
        Ok(extractor) => extractor,
        Err(err) => {
            error!("failed to create extractor: {}", err);
            std::process::exit(1);
        }
    };

    let video_out = Rc::new(RefCell::new(MemorySink::new()));
    let audio_out = Rc::new(RefCell::new(MemorySink::new()));

    extractor.add_stream(
        Box::new(make_video(1, secs)),
        Box::new(SharedSink { name: "video", inner: video_out.clone() }),
    );
    extractor.add_stream(
        Box::new(make_audio(2, secs)),
        Box::new(SharedSink { name: "audio", inner: audio_out.clone() }),
    );

    loop {
        match extractor.process() {
            Ok(ProcessStatus::Continue) => (),
            Ok(ProcessStatus::Reschedule(us)) => thread::sleep(Duration::from_micros(us)),
            Ok(ProcessStatus::Eos) => break,
            Err(err) => {
                error!("extraction failed: {}", err);
                std::process::exit(1);
            }
        }
    }

    let video = video_out.borrow();
    let audio = audio_out.borrow();
    println!(
        "done: {} video packets, {} audio packets emitted",
        video.packets.len(),
        audio.packets.len()
    );
}

fn split_list(arg: Option<&String>) -> Vec<String> {
    arg.map(|s| s.split(',').map(str::to_string).collect()).unwrap_or_default()
}

fn make_video(id: u32, secs: u64) -> MemorySource {
    let info = StreamInfo::new(id, StreamType::Visual, VIDEO_TIMESCALE);
    let packets = (0..secs * 25)
        .map(|i| {
            let sap = if i % VIDEO_GOP == 0 { SapType::Type1 } else { SapType::None };
            let ts = i * VIDEO_FRAME_DUR;
            Packet::new(id, ts, VIDEO_FRAME_DUR, vec![0u8; 1_000])
                .with_dts(ts)
                .with_sap(sap)
        })
        .collect();
    MemorySource::new(info, packets)
}

fn make_audio(id: u32, secs: u64) -> MemorySource {
    let audio =
        AudioFormat { sample_rate: AUDIO_RATE, channels: 2, bytes_per_sample: 2, planar: false };
    let info = StreamInfo::new(id, StreamType::Audio, AUDIO_RATE)
        .with_codec(CodecKind::Raw)
        .with_audio(audio);

    let nb_packets = secs * u64::from(AUDIO_RATE) / AUDIO_PACKET;
    let packets = (0..nb_packets)
        .map(|i| {
            let ts = i * AUDIO_PACKET;
            let bytes = (AUDIO_PACKET as usize) * audio.bytes_per_frame();
            Packet::new(id, ts, AUDIO_PACKET, vec![0u8; bytes]).with_sap(SapType::Type1)
        })
        .collect();
    MemorySource::new(info, packets)
}

/// A sink that prints chunk boundaries as they are emitted and stores the packets for the final
/// summary.
struct SharedSink {
    name: &'static str,
    inner: Rc<RefCell<MemorySink>>,
}

impl StreamSink for SharedSink {
    fn send(&mut self, packet: Packet) {
        if let Some(number) = packet.props.file_number {
            println!(
                "[{}] chunk {} ({}) starts at cts {}",
                self.name,
                number,
                packet.props.file_suffix.as_deref().unwrap_or(""),
                packet.cts,
            );
        }
        self.inner.borrow_mut().send(packet);
    }

    fn set_delay(&mut self, delay: i64) {
        self.inner.borrow_mut().set_delay(delay);
    }

    fn set_has_sync(&mut self, has_sync: bool) {
        self.inner.borrow_mut().set_has_sync(has_sync);
    }

    fn set_eos(&mut self) {
        println!("[{}] end of stream", self.name);
        self.inner.borrow_mut().set_eos();
    }
}
