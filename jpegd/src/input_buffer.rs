// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    api::JpegSource,
    error::{Error, ErrorReporter, Result, Warning},
    headers::markers::Marker,
    util::tracing_wrappers::*,
};

/// Bytes requested from the source at once while reading entropy-coded data.
const READ_CHUNK: usize = 4096;

/// Bytes pulled from the caller's source but not yet consumed by the decoder.
///
/// Lives as long as the decompressor, so bytes read past the end of one
/// datastream are still there when the next one starts.
#[derive(Debug, Default)]
pub struct InputBuffer {
    data: Vec<u8>,
    pos: usize,
    start_of_file: bool,
    eof_warned: bool,
}

impl InputBuffer {
    /// Prepares for a new datastream.
    pub fn init(&mut self) {
        self.start_of_file = true;
        self.eof_warned = false;
    }

    pub fn available(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    pub fn consume(&mut self, count: usize) {
        debug_assert!(self.pos + count <= self.data.len());
        self.pos += count;
        if self.pos == self.data.len() {
            self.data.clear();
            self.pos = 0;
        }
    }

    /// Gives unconsumed bytes back to the source where it supports it.
    pub fn term(&mut self, source: &mut dyn JpegSource) -> Result<()> {
        let leftover = self.data.len() - self.pos;
        if leftover == 0 {
            return Ok(());
        }
        let given_back = source.unconsume(leftover)?.min(leftover);
        trace!("{leftover} bytes left after datastream, {given_back} given back");
        self.data.truncate(self.data.len() - given_back);
        if self.pos == self.data.len() {
            self.data.clear();
            self.pos = 0;
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
    }
}

/// Everything needed to pull bytes during one decoder call.
pub(crate) struct InputSource<'a> {
    pub buffer: &'a mut InputBuffer,
    pub source: &'a mut dyn JpegSource,
    pub reporter: &'a mut ErrorReporter,
}

impl InputSource<'_> {
    pub fn data(&self) -> &[u8] {
        self.buffer.available()
    }

    pub fn consume(&mut self, count: usize) {
        self.buffer.consume(count)
    }

    pub fn warn(&mut self, warning: Warning) {
        self.reporter.warn(warning)
    }

    /// Makes at least `min` bytes available, reading no more than needed.
    /// Returns false if the caller must suspend.
    pub fn fill(&mut self, min: usize) -> Result<bool> {
        self.fill_impl(min, false)
    }

    /// Makes more bytes available than there are now.
    pub fn fill_more(&mut self) -> Result<bool> {
        let min = self.buffer.available().len() + 1;
        self.fill_impl(min, true)
    }

    fn fill_impl(&mut self, min: usize, read_ahead: bool) -> Result<bool> {
        while self.buffer.available().len() < min {
            self.buffer.compact();
            let have = self.buffer.data.len();
            let need = min - have;
            let request = if read_ahead { need.max(READ_CHUNK) } else { need };
            self.buffer.data.resize(have + request, 0);
            let got = match self.source.read(&mut self.buffer.data[have..]) {
                Ok(got) => got,
                Err(e) => {
                    self.buffer.data.truncate(have);
                    return Err(e.into());
                }
            };
            self.buffer.data.truncate(have + got);
            if got > 0 {
                self.buffer.start_of_file = false;
                continue;
            }
            if !self.source.is_complete() {
                return Ok(false);
            }
            if self.buffer.start_of_file && have == 0 {
                return Err(Error::InputEmpty);
            }
            // Out of data for good: pretend the datastream ends here.
            if !self.buffer.eof_warned {
                self.buffer.eof_warned = true;
                self.reporter.warn(Warning::JpegEof);
            }
            self.buffer.data.extend([0xff, Marker::Eoi as u8]);
        }
        Ok(true)
    }

    /// Skips `count` bytes, returning how many could be skipped right now.
    pub fn skip(&mut self, count: usize) -> Result<usize> {
        let buffered = self.buffer.available().len().min(count);
        self.buffer.consume(buffered);
        if buffered == count {
            return Ok(count);
        }
        let skipped = self.source.skip(count - buffered)?;
        if skipped > 0 {
            self.buffer.start_of_file = false;
        }
        Ok(buffered + skipped)
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::api::IncrementalSource;

    #[test]
    fn fill_suspends_until_data_arrives() {
        let mut buffer = InputBuffer::default();
        buffer.init();
        let mut reporter = ErrorReporter::new();
        let mut source = IncrementalSource::new();
        source.push(&[1, 2]);
        {
            let mut input = InputSource {
                buffer: &mut buffer,
                source: &mut source,
                reporter: &mut reporter,
            };
            assert!(!input.fill(3).unwrap());
            assert_eq!(input.data(), &[1, 2]);
        }
        source.push(&[3]);
        let mut input = InputSource {
            buffer: &mut buffer,
            source: &mut source,
            reporter: &mut reporter,
        };
        assert!(input.fill(3).unwrap());
        input.consume(2);
        assert_eq!(input.data(), &[3]);
    }

    #[test]
    fn empty_source_is_fatal() {
        let mut buffer = InputBuffer::default();
        buffer.init();
        let mut reporter = ErrorReporter::new();
        let mut source: &[u8] = &[];
        let mut input = InputSource {
            buffer: &mut buffer,
            source: &mut source,
            reporter: &mut reporter,
        };
        assert!(matches!(input.fill(2), Err(Error::InputEmpty)));
    }

    #[test]
    fn truncated_source_gets_fake_eoi() {
        let mut buffer = InputBuffer::default();
        buffer.init();
        let mut reporter = ErrorReporter::new();
        let mut source: &[u8] = &[0x12];
        let mut input = InputSource {
            buffer: &mut buffer,
            source: &mut source,
            reporter: &mut reporter,
        };
        assert!(input.fill(3).unwrap());
        assert_eq!(input.data(), &[0x12, 0xff, 0xd9]);
        assert_eq!(reporter.num_warnings(), 1);
        assert_eq!(reporter.last_warning(), Some(&Warning::JpegEof));
    }

    #[test]
    fn skip_spans_buffer_and_source() {
        let mut buffer = InputBuffer::default();
        buffer.init();
        let mut reporter = ErrorReporter::new();
        let data = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let mut source: &[u8] = &data;
        let mut input = InputSource {
            buffer: &mut buffer,
            source: &mut source,
            reporter: &mut reporter,
        };
        assert!(input.fill(2).unwrap());
        assert_eq!(input.skip(5).unwrap(), 5);
        assert!(input.fill(1).unwrap());
        assert_eq!(input.data()[0], 5);
    }
}
