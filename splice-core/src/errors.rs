// Splice
// Copyright (c) 2026 The Project Splice Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Splice.
#[derive(Debug)]
pub enum Error {
    /// An operation requires seeking the source stream backwards, but the stream cannot be
    /// seeked.
    Unseekable(&'static str),
    /// An unsupported combination of stream and extraction settings was encountered.
    Unsupported(&'static str),
    /// An option carries an invalid value.
    InvalidOption(&'static str),
    /// A default or user-defined limit was reached.
    LimitError(&'static str),
    Other(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Unseekable(msg) => {
                write!(f, "stream is not seekable: {}", msg)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::InvalidOption(msg) => {
                write!(f, "invalid option: {}", msg)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::Other(msg) => {
                write!(f, "other error: {}", msg)
            }
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an unseekable error.
pub fn unseekable_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Unseekable(msg))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create an invalid option error.
pub fn invalid_option_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidOption(msg))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}
