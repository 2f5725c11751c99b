// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::bit_reader::BitReader;
use crate::{
    error::{Error, Result, Warning},
    headers::tables::HuffmanTable,
};

const LOOKAHEAD_BITS: u32 = 8;

/// Decoding form of a [`HuffmanTable`].
#[derive(Debug, Clone)]
pub(crate) struct HuffmanLookup {
    /// Largest code of each length, -1 if none.
    maxcode: [i32; 18],
    /// Added to a code of length `l` to get its index in `huffval`.
    valoffset: [i32; 17],
    huffval: [u8; 256],
    look_nbits: [u8; 1 << LOOKAHEAD_BITS],
    look_sym: [u8; 1 << LOOKAHEAD_BITS],
}

impl HuffmanLookup {
    pub fn new(table: &HuffmanTable, is_dc: bool) -> Result<HuffmanLookup> {
        let mut huffsize = Vec::with_capacity(257);
        for l in 1..=16u8 {
            let count = table.bits[l as usize] as usize;
            if huffsize.len() + count > 256 {
                return Err(Error::BadHuffTable);
            }
            huffsize.extend(std::iter::repeat_n(l, count));
        }
        let num_symbols = huffsize.len();
        if table.huffval.len() < num_symbols {
            return Err(Error::BadHuffTable);
        }

        // Canonical code assignment.
        let mut huffcode = Vec::with_capacity(num_symbols);
        let mut code = 0u32;
        let mut p = 0;
        let mut si = huffsize.first().copied().unwrap_or(0) as u32;
        while p < num_symbols {
            while p < num_symbols && huffsize[p] as u32 == si {
                huffcode.push(code);
                code += 1;
                p += 1;
            }
            // No code may be all ones.
            if code >= (1 << si) {
                return Err(Error::BadHuffTable);
            }
            code <<= 1;
            si += 1;
        }

        let mut maxcode = [-1i32; 18];
        let mut valoffset = [0i32; 17];
        let mut p = 0;
        for l in 1..=16 {
            let count = table.bits[l] as usize;
            if count > 0 {
                valoffset[l] = p as i32 - huffcode[p] as i32;
                p += count;
                maxcode[l] = huffcode[p - 1] as i32;
            }
        }
        // Sentinel so that the slow path always terminates.
        maxcode[17] = 0xFFFFF;

        let mut look_nbits = [0u8; 1 << LOOKAHEAD_BITS];
        let mut look_sym = [0u8; 1 << LOOKAHEAD_BITS];
        let mut p = 0;
        for l in 1..=LOOKAHEAD_BITS {
            for _ in 0..table.bits[l as usize] {
                let shift = LOOKAHEAD_BITS - l;
                let first = (huffcode[p] << shift) as usize;
                for look in first..first + (1 << shift) {
                    look_nbits[look] = l as u8;
                    look_sym[look] = table.huffval[p];
                }
                p += 1;
            }
        }

        if is_dc && table.huffval[..num_symbols].iter().any(|&s| s > 15) {
            return Err(Error::BadHuffTable);
        }

        let mut huffval = [0u8; 256];
        huffval[..num_symbols].copy_from_slice(&table.huffval[..num_symbols]);
        Ok(HuffmanLookup {
            maxcode,
            valoffset,
            huffval,
            look_nbits,
            look_sym,
        })
    }

    /// Decodes one symbol. Corrupt codes decode as symbol 0 with a warning.
    pub fn decode(&self, br: &mut BitReader) -> Option<u8> {
        br.fill_soft(16)?;
        let peek = br.peek_padded(16);
        let look = (peek >> (16 - LOOKAHEAD_BITS)) as usize;
        let nbits = self.look_nbits[look];
        if nbits != 0 {
            br.skip_bits(nbits as u32);
            return Some(self.look_sym[look]);
        }
        let mut l = LOOKAHEAD_BITS as usize + 1;
        while l <= 16 && (peek >> (16 - l)) as i32 > self.maxcode[l] {
            l += 1;
        }
        if l > 16 {
            br.skip_bits(16);
            br.warnings.push(Warning::HuffBadCode);
            return Some(0);
        }
        br.skip_bits(l as u32);
        let code = (peek >> (16 - l)) as i32;
        Some(self.huffval[((code + self.valoffset[l]) & 0xff) as usize])
    }
}
