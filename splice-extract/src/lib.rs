// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Media range extraction and stream splitting for Project Splice.
//!
//! The [`Extractor`] is a multi-stream filter: it consumes framed media streams through the
//! `splice-core` stream traits and emits an equivalent set of streams rewritten to a continuous
//! timeline covering one or more extraction windows. Output can optionally be paced in real
//! time, filtered by access point class or frame index, and split into chunks by duration,
//! output size, or at every access point boundary.
//!
//! Extraction windows and split rules are given textually through
//! [`ExtractorOptions::xs`]/[`ExtractorOptions::xe`]; see [`range::parse_range_spec`] for the
//! accepted forms. The engine is driven by repeated calls to [`Extractor::process`] from a
//! single-threaded cooperative scheduler: every operation is non-blocking, and a tick reports
//! back whether more work is possible, a pacing delay is pending, or all output reached EOS.

mod emit;
mod filter;
mod planner;
mod stream;

pub mod pacer;
pub mod range;

pub use filter::{Extractor, ExtractorOptions, ProcessStatus};
pub use pacer::RealTimeMode;
pub use range::{ExtractMode, RangeKind, Rounding};
