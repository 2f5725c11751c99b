// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    coefficients::SampleRows,
    error::{Error, Result},
    headers::{ComponentInfo, Headers},
};

/// How one component is brought to the output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsampler {
    /// The output color space ignores the component.
    Unused,
    FullSize,
    /// Triangle filter, 2:1 horizontally.
    H2V1Fancy,
    /// Triangle filter, 2:1 vertically.
    H1V2Fancy,
    /// Triangle filter, 2:1 in both directions.
    H2V2Fancy,
    /// Sample replication by integral factors.
    Replicate { h: usize, v: usize },
}

impl Upsampler {
    pub fn select(headers: &Headers, index: usize, fancy: bool) -> Result<Upsampler> {
        let comp = &headers.components[index];
        let min_dct = headers.min_dct_scaled_size;
        let do_fancy = fancy && min_dct > 1;
        let h_in = comp.h_samp_factor * comp.dct_scaled_size / min_dct;
        let v_in = comp.v_samp_factor * comp.dct_scaled_size / min_dct;
        let (h_out, v_out) = (headers.max_h_samp_factor, headers.max_v_samp_factor);

        Ok(if !comp.component_needed {
            Upsampler::Unused
        } else if h_in == h_out && v_in == v_out {
            Upsampler::FullSize
        } else if h_in * 2 == h_out && v_in == v_out && do_fancy && comp.downsampled_width > 2 {
            Upsampler::H2V1Fancy
        } else if h_in == h_out && v_in * 2 == v_out && do_fancy {
            Upsampler::H1V2Fancy
        } else if h_in * 2 == h_out && v_in * 2 == v_out && do_fancy && comp.downsampled_width > 2
        {
            Upsampler::H2V2Fancy
        } else if h_in > 0 && v_in > 0 && h_out % h_in == 0 && v_out % v_in == 0 {
            Upsampler::Replicate {
                h: h_out / h_in,
                v: v_out / v_in,
            }
        } else {
            return Err(Error::FractionalSampling(index));
        })
    }

    pub fn needs_context(self) -> bool {
        matches!(self, Upsampler::H1V2Fancy | Upsampler::H2V2Fancy)
    }

    /// Produces `out.rows` rows of `out_width` samples.
    pub fn run(self, input: &ComponentRows, out: &mut SampleRows, out_width: usize) {
        match self {
            Upsampler::Unused => {}
            Upsampler::FullSize => {
                for y in 0..out.rows {
                    out.row_mut(y)[..out_width].copy_from_slice(&input.row(y as isize)[..out_width]);
                }
            }
            Upsampler::Replicate { h, v } => {
                for y in 0..out.rows {
                    let src = input.row((y / v) as isize);
                    for (x, sample) in out.row_mut(y)[..out_width].iter_mut().enumerate() {
                        *sample = src[x / h];
                    }
                }
            }
            Upsampler::H2V1Fancy => {
                let mut tmp = vec![0u8; 2 * input.width];
                for y in 0..out.rows {
                    h2v1_fancy(&input.row(y as isize)[..input.width], &mut tmp);
                    out.row_mut(y)[..out_width].copy_from_slice(&tmp[..out_width]);
                }
            }
            Upsampler::H1V2Fancy => {
                for y in 0..out.rows {
                    let r = (y / 2) as isize;
                    let (neighbor, bias) = if y % 2 == 0 { (r - 1, 1) } else { (r + 1, 2) };
                    h1v2_fancy(
                        &input.row(r)[..out_width],
                        &input.row(neighbor)[..out_width],
                        bias,
                        &mut out.row_mut(y)[..out_width],
                    );
                }
            }
            Upsampler::H2V2Fancy => {
                let mut tmp = vec![0u8; 2 * input.width];
                for y in 0..out.rows {
                    let r = (y / 2) as isize;
                    let neighbor = if y % 2 == 0 { r - 1 } else { r + 1 };
                    h2v2_fancy(
                        &input.row(r)[..input.width],
                        &input.row(neighbor)[..input.width],
                        &mut tmp,
                    );
                    out.row_mut(y)[..out_width].copy_from_slice(&tmp[..out_width]);
                }
            }
        }
    }
}

/// One iMCU row of a component plus its vertical context. Rows past the
/// bottom of the image repeat the last real row; the row above the first
/// one repeats it.
pub(crate) struct ComponentRows<'a> {
    pub above: Option<&'a [u8]>,
    pub rows: &'a SampleRows,
    /// Rows of `rows` that lie inside the image.
    pub valid: usize,
    pub below: Option<&'a [u8]>,
    /// Samples per row inside the image.
    pub width: usize,
}

impl<'a> ComponentRows<'a> {
    pub fn new(
        comp: &ComponentInfo,
        imcu_row: usize,
        above: Option<&'a [u8]>,
        rows: &'a SampleRows,
        below: Option<&'a [u8]>,
    ) -> Self {
        let first = imcu_row * rows.rows;
        let valid = comp.downsampled_height.saturating_sub(first).clamp(1, rows.rows);
        Self {
            above,
            rows,
            valid,
            below,
            width: comp.downsampled_width,
        }
    }

    pub fn row(&self, r: isize) -> &'a [u8] {
        if r < 0 {
            return self.above.unwrap_or_else(|| self.rows.row(0));
        }
        let r = r as usize;
        if r < self.valid {
            return self.rows.row(r);
        }
        match self.below {
            Some(below) if r >= self.rows.rows => below,
            _ => self.rows.row(self.valid - 1),
        }
    }
}

fn h2v1_fancy(input: &[u8], out: &mut [u8]) {
    let n = input.len();
    out[0] = input[0];
    out[1] = ((input[0] as u32 * 3 + input[1] as u32 + 2) >> 2) as u8;
    for c in 1..n - 1 {
        let v = input[c] as u32 * 3;
        out[2 * c] = ((v + input[c - 1] as u32 + 1) >> 2) as u8;
        out[2 * c + 1] = ((v + input[c + 1] as u32 + 2) >> 2) as u8;
    }
    out[2 * n - 2] = ((input[n - 1] as u32 * 3 + input[n - 2] as u32 + 1) >> 2) as u8;
    out[2 * n - 1] = input[n - 1];
}

/// Rounding alternates between output rows so that errors do not pile up
/// in one direction.
fn h1v2_fancy(near: &[u8], far: &[u8], bias: u32, out: &mut [u8]) {
    for ((out, &near), &far) in out.iter_mut().zip(near).zip(far) {
        *out = ((near as u32 * 3 + far as u32 + bias) >> 2) as u8;
    }
}

/// `near` is the input row the output row lies in, `far` the closest other
/// input row.
fn h2v2_fancy(near: &[u8], far: &[u8], out: &mut [u8]) {
    let n = near.len();
    let colsum = |c: usize| near[c] as u32 * 3 + far[c] as u32;
    let mut this = colsum(0);
    let mut next = colsum(1);
    out[0] = ((this * 4 + 8) >> 4) as u8;
    out[1] = ((this * 3 + next + 7) >> 4) as u8;
    let mut last = this;
    this = next;
    for c in 1..n - 1 {
        next = colsum(c + 1);
        out[2 * c] = ((this * 3 + last + 8) >> 4) as u8;
        out[2 * c + 1] = ((this * 3 + next + 7) >> 4) as u8;
        last = this;
        this = next;
    }
    out[2 * n - 2] = ((this * 3 + last + 8) >> 4) as u8;
    out[2 * n - 1] = ((this * 4 + 7) >> 4) as u8;
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn headers(sampling: &[(usize, usize)], min_dct: usize, width: usize) -> Headers {
        let max_h = sampling.iter().map(|s| s.0).max().unwrap();
        let max_v = sampling.iter().map(|s| s.1).max().unwrap();
        Headers {
            max_h_samp_factor: max_h,
            max_v_samp_factor: max_v,
            min_dct_scaled_size: min_dct,
            components: sampling
                .iter()
                .map(|&(h, v)| ComponentInfo {
                    h_samp_factor: h,
                    v_samp_factor: v,
                    dct_scaled_size: min_dct,
                    downsampled_width: width * h / max_h,
                    component_needed: true,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn selection() {
        let h = headers(&[(1, 2), (1, 1)], 8, 64);
        assert_eq!(Upsampler::select(&h, 0, true).unwrap(), Upsampler::FullSize);
        assert_eq!(Upsampler::select(&h, 1, true).unwrap(), Upsampler::H1V2Fancy);
        assert!(Upsampler::H1V2Fancy.needs_context());
        assert_eq!(
            Upsampler::select(&h, 1, false).unwrap(),
            Upsampler::Replicate { h: 1, v: 2 }
        );
        let h = headers(&[(2, 2), (1, 1), (1, 2), (1, 1)], 8, 64);
        assert_eq!(Upsampler::select(&h, 0, true).unwrap(), Upsampler::FullSize);
        assert_eq!(Upsampler::select(&h, 1, true).unwrap(), Upsampler::H2V2Fancy);
        assert_eq!(Upsampler::select(&h, 2, true).unwrap(), Upsampler::H2V1Fancy);
        assert_eq!(
            Upsampler::select(&h, 1, false).unwrap(),
            Upsampler::Replicate { h: 2, v: 2 }
        );
        // Fancy filtering is pointless at 1/8 scale.
        let h = headers(&[(2, 2), (1, 1)], 1, 64);
        assert_eq!(
            Upsampler::select(&h, 1, true).unwrap(),
            Upsampler::Replicate { h: 2, v: 2 }
        );
    }

    #[test]
    fn fractional_ratio_is_rejected() {
        let h = headers(&[(3, 1), (2, 1)], 8, 60);
        assert!(matches!(
            Upsampler::select(&h, 1, true),
            Err(Error::FractionalSampling(1))
        ));
    }

    #[test]
    fn unneeded_component() {
        let mut h = headers(&[(1, 1), (1, 1)], 8, 8);
        h.components[1].component_needed = false;
        assert_eq!(Upsampler::select(&h, 1, true).unwrap(), Upsampler::Unused);
    }

    #[test]
    fn h2v1_triangle_filter() {
        let mut out = [0u8; 6];
        h2v1_fancy(&[0, 100, 200], &mut out);
        assert_eq!(out, [0, 25, 75, 125, 175, 200]);
    }

    #[test]
    fn h1v2_triangle_filter_across_context_rows() {
        let comp = ComponentInfo {
            downsampled_width: 2,
            downsampled_height: 4,
            ..Default::default()
        };
        let mut rows = SampleRows::new(2, 2).unwrap();
        rows.row_mut(0).fill(40);
        rows.row_mut(1).fill(80);
        let ctx = ComponentRows::new(&comp, 1, Some(&[0, 0]), &rows, Some(&[200, 200]));
        let mut out = SampleRows::new(2, 4).unwrap();
        Upsampler::H1V2Fancy.run(&ctx, &mut out, 2);
        let column: Vec<u8> = (0..4).map(|y| out.row(y)[0]).collect();
        // (3 * 40 + 0 + 1) / 4, (3 * 40 + 80 + 2) / 4, (3 * 80 + 40 + 1) / 4,
        // (3 * 80 + 200 + 2) / 4
        assert_eq!(column, [30, 50, 70, 110]);
    }

    #[test]
    fn h2v2_flat_input_stays_flat() {
        let row = [77u8; 5];
        let mut out = [0u8; 10];
        h2v2_fancy(&row, &row, &mut out);
        assert_eq!(out, [77; 10]);
    }

    #[test]
    fn bottom_rows_replicate() {
        let comp = ComponentInfo {
            downsampled_width: 2,
            downsampled_height: 10,
            ..Default::default()
        };
        let mut rows = SampleRows::new(2, 8).unwrap();
        for y in 0..8 {
            rows.row_mut(y).fill(y as u8);
        }
        let ctx = ComponentRows::new(&comp, 1, Some(&[42, 42]), &rows, None);
        assert_eq!(ctx.valid, 2);
        assert_eq!(ctx.row(-1), &[42, 42]);
        assert_eq!(ctx.row(1), &[1, 1]);
        assert_eq!(ctx.row(5), &[1, 1]);
        assert_eq!(ctx.row(8), &[1, 1]);

        let ctx = ComponentRows::new(&comp, 0, None, &rows, Some(&[9, 9]));
        assert_eq!(ctx.row(-1), &[0, 0]);
        assert_eq!(ctx.row(8), &[9, 9]);
    }

    #[test]
    fn replicate_2x2() {
        let comp = ComponentInfo {
            downsampled_width: 2,
            downsampled_height: 2,
            ..Default::default()
        };
        let mut rows = SampleRows::new(2, 2).unwrap();
        rows.row_mut(0).copy_from_slice(&[1, 2]);
        rows.row_mut(1).copy_from_slice(&[3, 4]);
        let ctx = ComponentRows::new(&comp, 0, None, &rows, None);
        let mut out = SampleRows::new(4, 3).unwrap();
        Upsampler::Replicate { h: 2, v: 2 }.run(&ctx, &mut out, 3);
        assert_eq!(out.row(0), &[1, 1, 2, 0]);
        assert_eq!(out.row(1), &[1, 1, 2, 0]);
        assert_eq!(out.row(2), &[3, 3, 4, 0]);
    }
}
