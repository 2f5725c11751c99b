// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::{
    headers::{ColorSpace, tables::TableClass},
    session::{CompressState, DecompressState},
    util::tracing_wrappers::*,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Improper call to decompressor in state {0}")]
    BadState(DecompressState),
    #[error("Improper call to compressor in state {0}")]
    BadCompressState(CompressState),
    #[error("Bogus virtual array access: rows {start}..{end} of {rows}")]
    BadVirtualAccess {
        start: usize,
        end: usize,
        rows: usize,
    },
    #[error("Buffer passed to JPEG library is too small: {0} rows, need {1}")]
    BufferSize(usize, usize),
    #[error("Output row too short: {0} bytes, need {1}")]
    RowTooShort(usize, usize),
    #[error("Wrong number of buffers: got {0}, expected {1}")]
    WrongBufferCount(usize, usize),
    #[error("Application transferred too few scanlines: {0} of {1}")]
    TooLittleData(u32, u32),
    #[error("Cannot transcode due to multiple use of quantization table {0}")]
    MismatchedQuantTable(usize),
    #[error("Quantization table {0} was not defined")]
    NoQuantTable(usize),
    #[error("{0:?} Huffman table {1} was not defined")]
    NoHuffTable(TableClass, usize),
    #[error("Not a JPEG file: starts with {0:#04x} {1:#04x}")]
    NoSoi(u8, u8),
    #[error("Input file is empty")]
    InputEmpty,
    #[error("Invalid JPEG file structure: two SOI markers")]
    DuplicateSoi,
    #[error("Invalid JPEG file structure: two SOF markers")]
    DuplicateSof,
    #[error("Invalid JPEG file structure: SOS before SOF")]
    SosNoSof,
    #[error("Invalid JPEG file structure: missing SOS marker")]
    SofNoSos,
    #[error("Unsupported JPEG process: SOF type {0:#04x}")]
    SofUnsupported(u8),
    #[error("Arithmetic coding is not supported")]
    ArithmeticNotSupported,
    #[error("Bogus marker length {length} for marker {marker:#04x}")]
    BadLength { marker: u8, length: usize },
    #[error("Unsupported JPEG data precision {0}")]
    BadPrecision(u8),
    #[error("Too many color components: {0}, max {1}")]
    ComponentCount(usize, usize),
    #[error("Invalid component ID {0} in SOS")]
    BadComponentId(u8),
    #[error("Too many components in scan: {0}, max {1}")]
    ScanComponentCount(usize, usize),
    #[error("Bogus DQT index {0}")]
    DqtIndex(usize),
    #[error("Bogus DQT precision {0}")]
    DqtPrecision(u8),
    #[error("Bogus DHT index {0:#04x}")]
    DhtIndex(u8),
    #[error("Bogus Huffman table index {0} in SOS")]
    SosTableIndex(usize),
    #[error("Bogus Huffman table definition")]
    BadHuffTable,
    #[error("Empty JPEG image (DNL not supported)")]
    EmptyImage,
    #[error("Maximum supported image dimension is {max} pixels, got {0}x{1}", max = crate::MAX_DIMENSION)]
    ImageTooBig(u32, u32),
    #[error("Bogus sampling factors {0}x{1}")]
    BadSampling(usize, usize),
    #[error("Sampling factors too large for interleaved scan: {0} blocks in MCU")]
    BadMcuSize(usize),
    #[error("Invalid progressive parameters Ss={0} Se={1} Ah={2} Al={3}")]
    BadProgression(u8, u8, u8, u8),
    #[error("Unsupported marker type {0:#04x}")]
    UnknownMarker(u8),
    #[error("Didn't expect more than one scan")]
    EoiExpected,
    #[error("JPEG datastream contains no image")]
    NoImage,
    #[error("Bogus JPEG colorspace {0:?} for {1} components")]
    BadColorSpace(ColorSpace, usize),
    #[error("Unsupported color conversion request from {0:?} to {1:?}")]
    ConversionNotSupported(ColorSpace, ColorSpace),
    #[error("Fractional sampling not implemented: component {0}")]
    FractionalSampling(usize),
    #[error("Invalid scale fraction {0}/{1}")]
    BadScale(u32, u32),
    #[error("Cannot quantize to fewer than {0} colors")]
    QuantFewColors(usize),
    #[error("Cannot quantize to more than {0} colors")]
    QuantManyColors(usize),
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    // Generic arithmetic overflow. Prefer using other errors if possible.
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable conditions: processing continues with best-effort output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("Unknown Adobe color transform code {0}")]
    AdobeTransform(u8),
    #[error("Inconsistent progression sequence for component {component} coefficient {coefficient}")]
    BogusProgression { component: usize, coefficient: usize },
    #[error("Corrupt JPEG data: {0} extraneous bytes before marker {1:#04x}")]
    ExtraneousData(usize, u8),
    #[error("Corrupt JPEG data: premature end of data segment")]
    HitMarker,
    #[error("Corrupt JPEG data: bad Huffman code")]
    HuffBadCode,
    #[error("Corrupt JPEG data: found marker {0:#04x} instead of RST{1}")]
    MustResync(u8, u8),
    #[error("Premature end of JPEG file")]
    JpegEof,
    #[error("Application transferred too many scanlines")]
    TooMuchData,
    #[error("Invalid SOS parameters for sequential JPEG")]
    NotSequential,
}

/// Receives every warning reported by a session.
pub trait MessageSink {
    fn warning(&mut self, warning: &Warning);
}

impl<F: FnMut(&Warning)> MessageSink for F {
    fn warning(&mut self, warning: &Warning) {
        self(warning)
    }
}

/// Central sink for recoverable warnings of one session.
#[derive(Default)]
pub struct ErrorReporter {
    num_warnings: usize,
    last_warning: Option<Warning>,
    sink: Option<Box<dyn MessageSink>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: Option<Box<dyn MessageSink>>) {
        self.sink = sink;
    }

    pub fn warn(&mut self, warning: Warning) {
        // Only the first warning of a datastream is logged loudly.
        if self.num_warnings == 0 {
            warn!("{warning}");
        } else {
            debug!("{warning}");
        }
        self.num_warnings += 1;
        if let Some(sink) = self.sink.as_mut() {
            sink.warning(&warning);
        }
        self.last_warning = Some(warning);
    }

    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    pub fn last_warning(&self) -> Option<&Warning> {
        self.last_warning.as_ref()
    }

    /// Called at the start of every datastream.
    pub fn reset(&mut self) {
        self.num_warnings = 0;
        self.last_warning = None;
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use test_log::test;

    use super::*;
    use crate::session::DecompressState;

    #[test]
    fn bad_state_mentions_code() {
        let msg = Error::BadState(DecompressState::Ready).to_string();
        assert!(msg.contains("202"), "{msg}");
    }

    #[test]
    fn warnings_are_counted_and_forwarded() {
        let seen = Rc::new(RefCell::new(vec![]));
        let seen2 = seen.clone();
        let mut reporter = ErrorReporter::new();
        reporter.set_sink(Some(Box::new(move |w: &Warning| {
            seen2.borrow_mut().push(w.clone())
        })));
        reporter.warn(Warning::HitMarker);
        reporter.warn(Warning::AdobeTransform(7));
        assert_eq!(reporter.num_warnings(), 2);
        assert_eq!(reporter.last_warning(), Some(&Warning::AdobeTransform(7)));
        assert_eq!(seen.borrow().len(), 2);
        reporter.reset();
        assert_eq!(reporter.num_warnings(), 0);
        assert!(reporter.last_warning().is_none());
    }
}
