// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::Warning,
    marker_reader::{MarkerScan, scan_for_marker},
};

/// Bits fetched from the input but not yet decoded. Stored in the low
/// `bits_left` bits of `buffer`, most significant first.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BitState {
    buffer: u64,
    bits_left: u32,
}

const MAX_FILL: u32 = 56;

/// MSB-first reader over entropy-coded bytes with 0xFF00 unstuffing.
///
/// All fallible reads return `None` when the buffered bytes run out before
/// a marker is seen; the caller retries once more input is available. After
/// a marker, missing bits read as zeros.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    state: BitState,
    pub unread_marker: Option<u8>,
    pub insufficient_data: bool,
    pub warnings: Vec<Warning>,
}

impl<'a> BitReader<'a> {
    pub fn new(
        data: &'a [u8],
        state: BitState,
        unread_marker: Option<u8>,
        insufficient_data: bool,
    ) -> Self {
        Self {
            data,
            pos: 0,
            state,
            unread_marker,
            insufficient_data,
            warnings: vec![],
        }
    }

    /// Number of input bytes moved into the bit buffer so far.
    pub fn bytes_consumed(&self) -> usize {
        self.pos
    }

    pub fn state(&self) -> BitState {
        self.state
    }

    fn load_bytes(&mut self) {
        while self.state.bits_left <= MAX_FILL && self.unread_marker.is_none() {
            let Some(&byte) = self.data.get(self.pos) else {
                return;
            };
            if byte != 0xff {
                self.pos += 1;
                self.push_byte(byte);
                continue;
            }
            let Some(&next) = self.data.get(self.pos + 1) else {
                return;
            };
            match next {
                0 => {
                    self.pos += 2;
                    self.push_byte(0xff);
                }
                // Fill byte: drop one 0xFF and look again.
                0xff => self.pos += 1,
                code => {
                    self.pos += 2;
                    self.unread_marker = Some(code);
                }
            }
        }
    }

    fn push_byte(&mut self, byte: u8) {
        self.state.buffer = (self.state.buffer << 8) | byte as u64;
        self.state.bits_left += 8;
    }

    /// Loads up to `nbits` bits without inventing any. Fails only if more
    /// input is needed.
    pub fn fill_soft(&mut self, nbits: u32) -> Option<()> {
        if self.state.bits_left < nbits {
            self.load_bytes();
        }
        if self.state.bits_left >= nbits || self.unread_marker.is_some() {
            Some(())
        } else {
            None
        }
    }

    fn pad_with_zeros(&mut self) {
        if !self.insufficient_data {
            self.warnings.push(Warning::HitMarker);
            self.insufficient_data = true;
        }
        while self.state.bits_left <= MAX_FILL {
            self.state.buffer <<= 8;
            self.state.bits_left += 8;
        }
    }

    /// Guarantees `nbits` readable bits, padding with zeros after a marker.
    pub fn ensure(&mut self, nbits: u32) -> Option<()> {
        self.fill_soft(nbits)?;
        if self.state.bits_left < nbits {
            self.pad_with_zeros();
        }
        Some(())
    }

    /// Returns the next `nbits` (at most 16) bits; bits missing before a
    /// marker read as zero.
    pub fn peek_padded(&self, nbits: u32) -> u32 {
        let avail = self.state.bits_left.min(nbits);
        if avail == 0 {
            return 0;
        }
        let v = (self.state.buffer >> (self.state.bits_left - avail)) & ((1u64 << avail) - 1);
        (v as u32) << (nbits - avail)
    }

    pub fn skip_bits(&mut self, nbits: u32) {
        if self.state.bits_left < nbits {
            self.pad_with_zeros();
        }
        self.state.bits_left -= nbits;
    }

    pub fn get_bits(&mut self, nbits: u32) -> Option<u32> {
        if nbits == 0 {
            return Some(0);
        }
        self.ensure(nbits)?;
        let v = self.peek_padded(nbits);
        self.state.bits_left -= nbits;
        Some(v)
    }

    pub fn get_bit(&mut self) -> Option<bool> {
        Some(self.get_bits(1)? != 0)
    }

    /// Drops buffered bits at a restart boundary, returning how many whole
    /// bytes were thrown away.
    pub fn discard_bits(&mut self) -> usize {
        let bytes = (self.state.bits_left / 8) as usize;
        self.state = BitState::default();
        bytes
    }

    /// Advances to the next marker and records it as unread.
    pub fn next_marker(&mut self, already_discarded: usize) -> Option<u8> {
        match scan_for_marker(&self.data[self.pos..]) {
            MarkerScan::Found {
                consumed,
                discarded,
                code,
            } => {
                self.pos += consumed;
                let discarded = discarded + already_discarded;
                if discarded != 0 {
                    self.warnings
                        .push(Warning::ExtraneousData(discarded, code));
                }
                self.unread_marker = Some(code);
                Some(code)
            }
            MarkerScan::Incomplete { .. } => None,
        }
    }
}

/// Sign-extends a `size`-bit magnitude category value.
pub(crate) fn extend(value: u32, size: u32) -> i32 {
    if size == 0 {
        return 0;
    }
    let value = value as i32;
    if value < (1 << (size - 1)) {
        value + (-1 << size) + 1
    } else {
        value
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn reads_msb_first_and_unstuffs() {
        let data = [0b1010_0000, 0xff, 0x00, 0x0f];
        let mut r = BitReader::new(&data, BitState::default(), None, false);
        assert_eq!(r.get_bits(3), Some(0b101));
        assert_eq!(r.get_bits(5), Some(0));
        assert_eq!(r.get_bits(8), Some(0xff));
        assert_eq!(r.get_bits(4), Some(0));
        assert_eq!(r.get_bits(4), Some(0xf));
        // Out of data with no marker seen: the caller must suspend.
        assert_eq!(r.get_bits(4), None);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn marker_pads_zeros_once() {
        let data = [0xf0, 0xff, 0xd9];
        let mut r = BitReader::new(&data, BitState::default(), None, false);
        assert_eq!(r.get_bits(4), Some(0xf));
        assert_eq!(r.get_bits(8), Some(0));
        assert_eq!(r.get_bits(16), Some(0));
        assert_eq!(r.unread_marker, Some(0xd9));
        assert_eq!(r.warnings, vec![Warning::HitMarker]);
        assert!(r.insufficient_data);
        assert_eq!(r.bytes_consumed(), 3);
    }

    #[test]
    fn fill_bytes_are_skipped() {
        let data = [0xff, 0xff, 0xff, 0x00, 0x12];
        let mut r = BitReader::new(&data, BitState::default(), None, false);
        assert_eq!(r.get_bits(16), Some(0xff12));
    }

    #[test]
    fn restart_marker_search() {
        let data = [0x00, 0xff, 0xd3, 0x55];
        let mut r = BitReader::new(&data, BitState::default(), None, false);
        assert_eq!(r.next_marker(0), Some(0xd3));
        assert_eq!(r.warnings, vec![Warning::ExtraneousData(1, 0xd3)]);
        assert_eq!(r.bytes_consumed(), 3);
        let mut r = BitReader::new(&data[..2], BitState::default(), None, false);
        assert_eq!(r.next_marker(0), None);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(extend(0, 1), -1);
        assert_eq!(extend(1, 1), 1);
        assert_eq!(extend(0b010, 3), -5);
        assert_eq!(extend(0b110, 3), 6);
        assert_eq!(extend(0, 0), 0);
    }
}
