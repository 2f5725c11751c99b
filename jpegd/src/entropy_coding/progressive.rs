// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Successive approximation and spectral selection decoding. Each routine
//! decodes into blocks that already hold the result of earlier scans.

use super::{
    DecodeState, ScanTables,
    bit_reader::{BitReader, extend},
};
use crate::{
    error::Warning,
    headers::{ScanInfo, tables::JPEG_NATURAL_ORDER},
    virtual_array::Block,
};

pub(super) fn decode_dc_first(
    br: &mut BitReader,
    state: &mut DecodeState,
    tables: &ScanTables,
    scan: &ScanInfo,
    mcu: &mut [Block],
) -> Option<()> {
    for (block, &ci) in mcu.iter_mut().zip(&scan.mcu_membership) {
        let s = tables.dc[ci].decode(br)? as u32;
        let diff = if s != 0 { extend(br.get_bits(s)?, s) } else { 0 };
        let value = state.last_dc_val[ci].wrapping_add(diff);
        state.last_dc_val[ci] = value;
        block[0] = value.wrapping_shl(scan.al as u32) as i16;
    }
    Some(())
}

pub(super) fn decode_dc_refine(
    br: &mut BitReader,
    scan: &ScanInfo,
    mcu: &mut [Block],
) -> Option<()> {
    let p1 = 1i16 << scan.al;
    for block in mcu.iter_mut() {
        if br.get_bit()? {
            block[0] |= p1;
        }
    }
    Some(())
}

pub(super) fn decode_ac_first(
    br: &mut BitReader,
    state: &mut DecodeState,
    tables: &ScanTables,
    scan: &ScanInfo,
    block: &mut Block,
) -> Option<()> {
    if state.eobrun > 0 {
        state.eobrun -= 1;
        return Some(());
    }
    let ac = &tables.ac[0];
    let se = scan.se as usize;
    let mut k = scan.ss as usize;
    while k <= se {
        let rs = ac.decode(br)?;
        let r = (rs >> 4) as u32;
        let s = (rs & 15) as u32;
        if s != 0 {
            k += r as usize;
            let v = extend(br.get_bits(s)?, s);
            block[JPEG_NATURAL_ORDER[k]] = v.wrapping_shl(scan.al as u32) as i16;
        } else if r == 15 {
            k += 15;
        } else {
            let mut run = 1u32 << r;
            if r != 0 {
                run += br.get_bits(r)?;
            }
            state.eobrun = run - 1;
            break;
        }
        k += 1;
    }
    Some(())
}

/// Refines one block. Coefficients that are already nonzero get a
/// correction bit each time the run passes over them.
pub(super) fn decode_ac_refine(
    br: &mut BitReader,
    state: &mut DecodeState,
    tables: &ScanTables,
    scan: &ScanInfo,
    block: &mut Block,
) -> Option<()> {
    let p1 = 1i16 << scan.al;
    let m1 = -1i16 << scan.al;
    let se = scan.se as usize;
    let mut k = scan.ss as usize;

    if state.eobrun == 0 {
        let ac = &tables.ac[0];
        while k <= se {
            let rs = ac.decode(br)?;
            let mut r = (rs >> 4) as i32;
            let mut value = 0i16;
            if rs & 15 != 0 {
                if rs & 15 != 1 {
                    br.warnings.push(Warning::HuffBadCode);
                }
                value = if br.get_bit()? { p1 } else { m1 };
            } else if r != 15 {
                let mut run = 1u32 << r;
                if r != 0 {
                    run += br.get_bits(r as u32)?;
                }
                state.eobrun = run;
                break;
            }
            // Skip `r` zero-history coefficients, refining nonzero ones.
            while k <= se {
                let coef = &mut block[JPEG_NATURAL_ORDER[k]];
                if *coef != 0 {
                    refine(br, coef, p1, m1)?;
                } else {
                    r -= 1;
                    if r < 0 {
                        break;
                    }
                }
                k += 1;
            }
            if value != 0 {
                block[JPEG_NATURAL_ORDER[k]] = value;
            }
            k += 1;
        }
    }

    if state.eobrun > 0 {
        while k <= se {
            let coef = &mut block[JPEG_NATURAL_ORDER[k]];
            if *coef != 0 {
                refine(br, coef, p1, m1)?;
            }
            k += 1;
        }
        state.eobrun -= 1;
    }
    Some(())
}

fn refine(br: &mut BitReader, coef: &mut i16, p1: i16, m1: i16) -> Option<()> {
    if br.get_bit()? && *coef & p1 == 0 {
        *coef = if *coef >= 0 {
            coef.wrapping_add(p1)
        } else {
            coef.wrapping_add(m1)
        };
    }
    Some(())
}
