// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

mod decompressor;
mod input;
pub mod options;
pub mod progress;

pub use decompressor::*;
pub use input::*;
pub use options::*;
pub use progress::{Progress, ProgressMonitor};

pub use crate::{
    input_controller::InputStatus,
    marker_reader::{MarkerProcessor, SavedMarker},
    master::OutputInfo,
};

/// Result of an operation that reads from the byte source. `NeedsMoreInput`
/// means the source ran dry; the caller should supply more bytes and call
/// the same operation again. No work is lost by suspending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingResult<T> {
    Complete { result: T },
    NeedsMoreInput,
}

impl<T> ProcessingResult<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, ProcessingResult::Complete { .. })
    }

    pub fn complete(self) -> Option<T> {
        match self {
            ProcessingResult::Complete { result } => Some(result),
            ProcessingResult::NeedsMoreInput => None,
        }
    }
}

/// What `read_header` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// A frame and its first scan header; decompression can start.
    Image,
    /// An abbreviated datastream holding only tables. They are kept for
    /// the datastreams that follow.
    TablesOnly,
}
