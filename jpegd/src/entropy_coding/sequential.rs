// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{
    DecodeState, ScanTables,
    bit_reader::{BitReader, extend},
};
use crate::{DCTSIZE2, headers::tables::JPEG_NATURAL_ORDER, virtual_array::Block};

/// Decodes one MCU of a sequential (baseline or extended) scan.
pub(super) fn decode_mcu(
    br: &mut BitReader,
    state: &mut DecodeState,
    tables: &ScanTables,
    membership: &[usize],
    mcu: &mut [Block],
) -> Option<()> {
    for (block, &ci) in mcu.iter_mut().zip(membership) {
        let (dc, ac) = (&tables.dc[ci], &tables.ac[ci]);

        let s = dc.decode(br)? as u32;
        let diff = if s != 0 { extend(br.get_bits(s)?, s) } else { 0 };
        let value = state.last_dc_val[ci].wrapping_add(diff);
        state.last_dc_val[ci] = value;
        block[0] = value as i16;

        let mut k = 1;
        while k < DCTSIZE2 {
            let rs = ac.decode(br)?;
            let r = (rs >> 4) as usize;
            let s = (rs & 15) as u32;
            if s != 0 {
                k += r;
                let v = extend(br.get_bits(s)?, s);
                block[JPEG_NATURAL_ORDER[k]] = v as i16;
            } else {
                if r != 15 {
                    break;
                }
                k += 15;
            }
            k += 1;
        }
    }
    Some(())
}
