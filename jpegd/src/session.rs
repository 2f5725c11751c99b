// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt;

use crate::{api::ProgressMonitor, error::ErrorReporter};

/// Global state of a decompression session.
///
/// The numeric values are stable and appear in bad-state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum DecompressState {
    /// Waiting for the first `read_header`/`consume_input` call.
    Start = 200,
    /// Reading the marker-delimited header.
    InHeader = 201,
    /// First SOS seen; parameters may be adjusted before `start_decompress`.
    Ready = 202,
    /// Absorbing all scans of a multi-scan file before output.
    Preload = 203,
    /// Running dummy output passes.
    Prescan = 204,
    /// `read_scanlines` is legal.
    Scanning = 205,
    /// `read_raw_data` is legal.
    RawOk = 206,
    /// Buffered-image mode, between output passes.
    BufImage = 207,
    /// Buffered-image mode, after `finish_output`.
    BufPost = 208,
    /// Reading the whole file for `read_coefficients`.
    RdCoefs = 209,
    /// Output done; waiting for EOI.
    Stopping = 210,
}

impl DecompressState {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for DecompressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.code(), self)
    }
}

/// Global state of a compression parameter context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressState {
    Start = 100,
}

impl fmt::Display for CompressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", *self as u16, self)
    }
}

/// Capabilities shared by decode and encode sessions.
pub trait CodecSession {
    fn error_reporter(&self) -> &ErrorReporter;

    fn error_reporter_mut(&mut self) -> &mut ErrorReporter;

    /// Installs (or removes) an advisory progress observer.
    fn set_progress_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>);

    /// Abandons the current datastream; the session can be reused.
    fn abort(&mut self);

    /// Releases the session for good.
    fn destroy(self)
    where
        Self: Sized,
    {
    }

    fn num_warnings(&self) -> usize {
        self.error_reporter().num_warnings()
    }
}
