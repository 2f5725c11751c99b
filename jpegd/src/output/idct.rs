// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use crate::{DCTSIZE, headers::tables::QuantTable, virtual_array::Block};

/// Scaled inverse DCT. A block is reconstructed at 1, 2, 4 or 8 samples per
/// side from its lowest-frequency coefficients, which is equivalent to a box
/// filtered full-size reconstruction up to rounding.
pub(crate) struct InverseDct {
    /// `basis[log2(n)][x][u]`: half of `C(u) * cos((2x + 1) u pi / 2n)`.
    basis: [[[f32; DCTSIZE]; DCTSIZE]; 4],
}

impl Default for InverseDct {
    fn default() -> Self {
        Self::new()
    }
}

impl InverseDct {
    pub fn new() -> Self {
        let mut basis = [[[0.0; DCTSIZE]; DCTSIZE]; 4];
        for (log, table) in basis.iter_mut().enumerate() {
            let n = 1 << log;
            for x in 0..n {
                for u in 0..n {
                    let c = if u == 0 { FRAC_1_SQRT_2 } else { 1.0 };
                    let angle = (2 * x + 1) as f32 * u as f32 * PI / (2 * n) as f32;
                    table[x][u] = 0.5 * c * angle.cos();
                }
            }
        }
        Self { basis }
    }

    /// Writes a `size` x `size` tile to `out`, rows `stride` bytes apart.
    /// Without a quantization table the tile is mid-gray.
    pub fn transform(
        &self,
        coefs: &Block,
        quant: Option<&QuantTable>,
        size: usize,
        out: &mut [u8],
        stride: usize,
    ) {
        debug_assert!(size.is_power_of_two() && size <= DCTSIZE);
        let Some(quant) = quant else {
            for y in 0..size {
                out[y * stride..y * stride + size].fill(128);
            }
            return;
        };
        let basis = &self.basis[size.trailing_zeros() as usize];

        let mut dequant = [[0.0f32; DCTSIZE]; DCTSIZE];
        for v in 0..size {
            for u in 0..size {
                let k = v * DCTSIZE + u;
                dequant[v][u] = coefs[k] as f32 * quant.values[k] as f32;
            }
        }

        // Columns first, then rows.
        let mut tmp = [[0.0f32; DCTSIZE]; DCTSIZE];
        for y in 0..size {
            for u in 0..size {
                tmp[y][u] = (0..size).map(|v| basis[y][v] * dequant[v][u]).sum();
            }
        }
        for y in 0..size {
            let row = &mut out[y * stride..y * stride + size];
            for (x, sample) in row.iter_mut().enumerate() {
                let value: f32 = (0..size).map(|u| basis[x][u] * tmp[y][u]).sum();
                *sample = (value + 128.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::DCTSIZE2;

    fn flat_quant(q: u16) -> QuantTable {
        QuantTable::new([q; DCTSIZE2])
    }

    #[test]
    fn dc_only_is_flat_at_every_size() {
        let idct = InverseDct::new();
        let mut block = [0i16; DCTSIZE2];
        block[0] = 40;
        for size in [1, 2, 4, 8] {
            let mut out = vec![0u8; 64];
            idct.transform(&block, Some(&flat_quant(2)), size, &mut out, 8);
            for y in 0..size {
                assert!(out[y * 8..y * 8 + size].iter().all(|&s| s == 138), "{size}");
            }
        }
    }

    #[test]
    fn horizontal_ramp() {
        let idct = InverseDct::new();
        let mut block = [0i16; DCTSIZE2];
        block[1] = 100;
        let mut out = vec![0u8; 64];
        idct.transform(&block, Some(&flat_quant(1)), 8, &mut out, 8);
        for y in 0..8 {
            let row = &out[y * 8..y * 8 + 8];
            assert!(row.windows(2).all(|w| w[0] > w[1]));
            assert_eq!(row, &out[..8]);
        }
    }

    #[test]
    fn output_is_clamped() {
        let idct = InverseDct::new();
        let mut block = [0i16; DCTSIZE2];
        block[0] = i16::MAX;
        let mut out = vec![0u8; 4];
        idct.transform(&block, Some(&flat_quant(255)), 2, &mut out, 2);
        assert_eq!(out, vec![255; 4]);
    }

    #[test]
    fn missing_table_gives_gray() {
        let idct = InverseDct::new();
        let block = [7i16; DCTSIZE2];
        let mut out = vec![0u8; 16];
        idct.transform(&block, None, 4, &mut out, 4);
        assert_eq!(out, vec![128; 16]);
    }
}
