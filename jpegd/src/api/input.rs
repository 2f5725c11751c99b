// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, Error, Read, Seek},
};

pub trait JpegSource {
    /// Fills `buf` with as many bytes as are available right now, returning the
    /// number of bytes written. Returning 0 means the decoder should suspend
    /// unless [`JpegSource::is_complete`] is true.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Returns true iff it is known that no more bytes will ever be available.
    fn is_complete(&mut self) -> bool;

    /// Discards up to `count` bytes, returning how many were skipped.
    fn skip(&mut self, count: usize) -> Result<usize, Error> {
        let mut scratch = [0u8; 256];
        let mut skipped = 0;
        while skipped < count {
            let len = (count - skipped).min(scratch.len());
            let n = self.read(&mut scratch[..len])?;
            if n == 0 {
                break;
            }
            skipped += n;
        }
        Ok(skipped)
    }

    /// Un-consumes read bytes. This will only be called at the end of a
    /// datastream, to give back bytes read past EOI. Returns how many bytes
    /// were actually given back; the decoder keeps the rest buffered for the
    /// next datastream. The provided implementation gives back nothing.
    fn unconsume(&mut self, _count: usize) -> Result<usize, Error> {
        Ok(0)
    }
}

impl JpegSource for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        Read::read(self, buf)
    }

    fn is_complete(&mut self) -> bool {
        true
    }

    fn skip(&mut self, count: usize) -> Result<usize, Error> {
        let count = count.min(self.len());
        *self = &self[count..];
        Ok(count)
    }
}

impl<R: Read + Seek> JpegSource for BufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        Read::read(self, buf)
    }

    fn is_complete(&mut self) -> bool {
        matches!(self.fill_buf(), Ok(b) if b.is_empty())
    }

    fn unconsume(&mut self, count: usize) -> Result<usize, Error> {
        self.seek_relative(-(count as i64))?;
        Ok(count)
    }
}

/// A source the caller feeds incrementally. Reads return 0 while no data is
/// queued, which makes the decoder suspend until [`IncrementalSource::push`]
/// or [`IncrementalSource::finish`] is called.
#[derive(Debug, Default)]
pub struct IncrementalSource {
    data: VecDeque<u8>,
    finished: bool,
}

impl IncrementalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Declares that no more bytes will be pushed.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn queued(&self) -> usize {
        self.data.len()
    }
}

impl JpegSource for IncrementalSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let n = buf.len().min(self.data.len());
        for (dst, src) in buf.iter_mut().zip(self.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn is_complete(&mut self) -> bool {
        self.finished && self.data.is_empty()
    }

    fn unconsume(&mut self, _count: usize) -> Result<usize, Error> {
        // The given-back bytes are gone from the queue; the decoder keeps them.
        Ok(0)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use test_log::test;

    use super::*;

    #[test]
    fn slice_source() {
        let data = [1u8, 2, 3, 4, 5];
        let mut src: &[u8] = &data;
        let mut buf = [0; 2];
        assert_eq!(JpegSource::read(&mut src, &mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(JpegSource::skip(&mut src, 2).unwrap(), 2);
        assert_eq!(JpegSource::read(&mut src, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
        assert!(src.is_complete());
    }

    #[test]
    fn buf_reader_gives_back_bytes() {
        let mut src = BufReader::new(Cursor::new(vec![9u8, 8, 7]));
        let mut buf = [0; 3];
        assert_eq!(JpegSource::read(&mut src, &mut buf).unwrap(), 3);
        assert!(src.is_complete());
        assert_eq!(src.unconsume(2).unwrap(), 2);
        assert!(!src.is_complete());
        let mut one = [0; 1];
        assert_eq!(JpegSource::read(&mut src, &mut one).unwrap(), 1);
        assert_eq!(one[0], 8);
    }

    #[test]
    fn incremental_source_suspends() {
        let mut src = IncrementalSource::new();
        let mut buf = [0; 4];
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert!(!src.is_complete());
        src.push(&[1, 2]);
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        src.finish();
        assert!(src.is_complete());
    }
}
