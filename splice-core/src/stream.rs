// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `stream` module provides the traits and support structures connecting a filter to the
//! streams it consumes and produces.

use crate::packet::Packet;

/// The coarse type of a stream.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamType {
    /// A video, image, or scene description stream.
    Visual,
    /// An audio stream.
    Audio,
    /// A subtitle or timed-text stream.
    Text,
    /// Any other stream type.
    Other,
}

/// The coarse class of codec carried by a stream, as far as a packet-level filter needs to know.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CodecKind {
    /// Uncompressed samples. Raw packets may be sliced at any sample boundary.
    Raw,
    /// A timecode track whose payload is a big-endian frame counter.
    Timecode,
    /// Any coded bitstream.
    Coded,
}

/// The sample layout of a raw audio stream.
#[derive(Copy, Clone, Debug)]
pub struct AudioFormat {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u32,
    /// Size of one sample of one channel in bytes.
    pub bytes_per_sample: u32,
    /// If true, each channel's samples are packed contiguously (planar layout). Otherwise sample
    /// frames interleave all channels.
    pub planar: bool,
}

impl AudioFormat {
    /// The size in bytes of one sample frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample as usize * self.channels as usize
    }
}

/// Whether the producing end of a stream can be repositioned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekCapability {
    /// The source can restart delivery from an arbitrary time.
    Seekable,
    /// The source delivers packets in one forward pass only.
    Unseekable,
}

/// Static properties of a stream.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// A unique identifier for the stream.
    pub id: u32,
    /// The coarse stream type.
    pub stream_type: StreamType,
    /// The codec class.
    pub codec: CodecKind,
    /// Ticks per second used to express the stream's timestamps.
    pub timescale: u32,
    /// The declared presentation delay in timescale units. Positive values shift presentation
    /// later; negative values are decoder-side composition offsets.
    pub delay: i64,
    /// Raw audio layout, for `CodecKind::Raw` audio streams.
    pub audio: Option<AudioFormat>,
    /// Whether the source can be repositioned.
    pub seek: SeekCapability,
}

impl StreamInfo {
    /// Instantiate stream info with a given ID, type, and timescale.
    pub fn new(id: u32, stream_type: StreamType, timescale: u32) -> Self {
        StreamInfo {
            id,
            stream_type,
            codec: CodecKind::Coded,
            timescale,
            delay: 0,
            audio: None,
            seek: SeekCapability::Seekable,
        }
    }

    /// Provide the codec class.
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Provide the declared delay.
    pub fn with_delay(mut self, delay: i64) -> Self {
        self.delay = delay;
        self
    }

    /// Provide the raw audio layout.
    pub fn with_audio(mut self, audio: AudioFormat) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Provide the seek capability.
    pub fn with_seek(mut self, seek: SeekCapability) -> Self {
        self.seek = seek;
        self
    }
}

/// Playback control events travelling from a consumer towards a producer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Start or restart delivery.
    Play {
        /// The requested start position in seconds.
        start: f64,
        /// The playback speed multiplier.
        speed: f64,
    },
    /// Stop delivery.
    Stop,
}

/// The producing end of a stream, as consumed by a filter.
///
/// All operations are non-blocking: [`StreamSource::next_packet`] returns `None` when no packet
/// is available right now, which is distinct from the end of the stream signalled by
/// [`StreamSource::is_eos`].
pub trait StreamSource {
    /// Get the static properties of the stream.
    fn info(&self) -> &StreamInfo;

    /// Fetch the next packet, if one is available.
    fn next_packet(&mut self) -> Option<Packet>;

    /// Returns true when no more packets will ever be produced at the current position.
    fn is_eos(&self) -> bool;

    /// Send a playback control event upstream.
    fn send_event(&mut self, event: StreamEvent);

    /// When set, the source may discard pending data instead of delivering it.
    fn set_discard(&mut self, discard: bool);
}

/// The consuming end of a stream, as fed by a filter.
pub trait StreamSink {
    /// Deliver a packet downstream.
    fn send(&mut self, packet: Packet);

    /// Declare the presentation delay of the output stream in timescale units.
    fn set_delay(&mut self, delay: i64);

    /// Declare whether the output stream still contains distinct sync points.
    fn set_has_sync(&mut self, has_sync: bool);

    /// Signal that no more packets will be delivered.
    fn set_eos(&mut self);
}
