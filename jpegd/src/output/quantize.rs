// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Color quantization to a palette of at most 256 colors.

use crate::{
    api::DitherMode,
    error::{Error, Result},
    headers::ColorSpace,
    util::tracing_wrappers::*,
};

pub const MAX_COLORS: usize = 256;
const MAX_QUANT_COMPONENTS: usize = 4;
/// Smallest palette the two-pass quantizer builds.
const MIN_TWO_PASS_COLORS: usize = 8;

/// Side of the ordered dither pattern.
const ODITHER_SIZE: usize = 16;

pub(crate) enum Quantizer {
    OnePass(OnePass),
    TwoPass(TwoPass),
}

impl Quantizer {
    /// Palette as one list of values per output component.
    pub fn colormap(&self) -> &[Vec<u8>] {
        match self {
            Quantizer::OnePass(q) => &q.colormap,
            Quantizer::TwoPass(q) => &q.colormap,
        }
    }

    pub fn start_pass(&mut self, is_prescan: bool) {
        match self {
            Quantizer::OnePass(q) => q.start_pass(),
            Quantizer::TwoPass(q) => q.start_pass(is_prescan),
        }
    }

    /// Records the colors of one row during the statistics pass.
    pub fn prescan(&mut self, row: &[u8], width: usize) {
        if let Quantizer::TwoPass(q) = self {
            q.prescan(row, width);
        }
    }

    pub fn quantize(&mut self, row: &[u8], out: &mut [u8], width: usize) {
        match self {
            Quantizer::OnePass(q) => q.quantize(row, out, width),
            Quantizer::TwoPass(q) => q.quantize(row, out, width),
        }
    }

    pub fn finish_pass(&mut self) {
        if let Quantizer::TwoPass(q) = self {
            q.finish_pass();
        }
    }
}

/// Value of the `i`-th of `n` evenly spaced levels.
fn output_value(i: usize, max: usize) -> u8 {
    ((i * 255 + max / 2) / max) as u8
}

/// Largest input value that maps to level `i`.
fn largest_input_value(i: usize, max: usize) -> usize {
    ((2 * i + 1) * 255 + max) / (2 * max)
}

/// Caps a propagated Floyd-Steinberg error: identity up to 16, half slope
/// up to 48, flat beyond.
fn limit_error(e: i32) -> i32 {
    let m = e.abs();
    let limited = if m < 16 {
        m
    } else if m < 48 {
        16 + (m - 16) / 2
    } else {
        32
    };
    limited * e.signum()
}

/// Error terms carried to the next row of a Floyd-Steinberg pass, scaled by
/// 16. Column `x` uses entry `x + 1`; the ends are spare.
#[derive(Default)]
struct FsErrors {
    errors: Vec<i32>,
    odd_row: bool,
}

impl FsErrors {
    fn reset(&mut self) {
        self.errors.fill(0);
        self.odd_row = false;
    }

    /// Makes room for `width` columns of `channels` interleaved terms.
    fn ensure(&mut self, width: usize, channels: usize) {
        let len = (width + 2) * channels;
        if self.errors.len() < len {
            self.errors.resize(len, 0);
        }
    }
}

/// Distributes the quantization error of one pixel: 7/16 to the next pixel
/// in scan order and 3/16, 5/16, 1/16 to the row below. `below` and
/// `below_prev` hold the partial sums of the columns under this pixel and
/// the previous one. Returns the finished term of the column behind and the
/// carry into the next pixel.
fn spread_error(err: i32, below: &mut i32, below_prev: &mut i32) -> (i32, i32) {
    let behind = *below_prev + err * 3;
    *below_prev = *below + err * 5;
    *below = err;
    (behind, err * 7)
}

enum OnePassDither {
    None,
    Ordered(Vec<[[i32; ODITHER_SIZE]; ODITHER_SIZE]>),
    /// One error row per component.
    FloydSteinberg(Vec<FsErrors>),
}

/// Uniform color cube, optionally dithered.
pub(crate) struct OnePass {
    colormap: Vec<Vec<u8>>,
    /// Per component, sample value to the component's share of the index.
    colorindex: Vec<[u16; 256]>,
    dither: OnePassDither,
    row: usize,
}

impl OnePass {
    pub fn new(
        num_components: usize,
        desired: usize,
        out_color_space: ColorSpace,
        dither: DitherMode,
    ) -> Result<OnePass> {
        if num_components > MAX_QUANT_COMPONENTS {
            return Err(Error::NotImplemented(
                "color quantization of more than 4 components",
            ));
        }
        if desired > MAX_COLORS {
            return Err(Error::QuantManyColors(MAX_COLORS));
        }
        let ncolors = select_ncolors(num_components, desired, out_color_space)?;
        let total: usize = ncolors.iter().product();
        debug!("one-pass quantization to {ncolors:?} = {total} colors");

        let mut colormap = vec![vec![0u8; total]; num_components];
        let mut colorindex = vec![[0u16; 256]; num_components];
        let mut blkdist = total;
        for c in 0..num_components {
            let nci = ncolors[c];
            let blksize = blkdist;
            blkdist /= nci;
            for j in 0..nci {
                let value = output_value(j, nci - 1);
                let mut ptr = j * blkdist;
                while ptr < total {
                    colormap[c][ptr..ptr + blkdist].fill(value);
                    ptr += blksize;
                }
            }
            let mut level = 0;
            let mut limit = largest_input_value(0, nci - 1);
            for v in 0..256 {
                while v > limit {
                    level += 1;
                    limit = largest_input_value(level, nci - 1);
                }
                colorindex[c][v] = (level * blkdist) as u16;
            }
        }

        let dither = match dither {
            DitherMode::None => OnePassDither::None,
            DitherMode::Ordered => {
                OnePassDither::Ordered(ncolors.iter().map(|&n| dither_matrix(n)).collect())
            }
            DitherMode::FloydSteinberg => OnePassDither::FloydSteinberg(
                (0..num_components).map(|_| FsErrors::default()).collect(),
            ),
        };
        Ok(OnePass {
            colormap,
            colorindex,
            dither,
            row: 0,
        })
    }

    fn start_pass(&mut self) {
        self.row = 0;
        if let OnePassDither::FloydSteinberg(fs) = &mut self.dither {
            fs.iter_mut().for_each(FsErrors::reset);
        }
    }

    fn quantize(&mut self, row: &[u8], out: &mut [u8], width: usize) {
        let nc = self.colorindex.len();
        let dither_row = self.row % ODITHER_SIZE;
        match &mut self.dither {
            OnePassDither::FloydSteinberg(fs) => {
                out[..width].fill(0);
                for (c, errors) in fs.iter_mut().enumerate() {
                    quantize_fs_component(
                        row,
                        out,
                        width,
                        nc,
                        c,
                        &self.colorindex[c],
                        &self.colormap[c],
                        errors,
                    );
                }
            }
            dither => {
                for (x, (pixel, index)) in
                    row.chunks_exact(nc).zip(out[..width].iter_mut()).enumerate()
                {
                    let mut sum = 0u16;
                    for (c, &sample) in pixel.iter().enumerate() {
                        let v = match &*dither {
                            OnePassDither::Ordered(d) => (sample as i32
                                + d[c][dither_row][x % ODITHER_SIZE])
                                .clamp(0, 255) as usize,
                            _ => sample as usize,
                        };
                        sum += self.colorindex[c][v];
                    }
                    *index = sum as u8;
                }
            }
        }
        self.row += 1;
    }
}

/// Adds component `c`'s share of the palette index to `out`, diffusing the
/// error serpentine: left to right on even rows, right to left on odd ones.
fn quantize_fs_component(
    row: &[u8],
    out: &mut [u8],
    width: usize,
    nc: usize,
    c: usize,
    colorindex: &[u16; 256],
    colormap: &[u8],
    fs: &mut FsErrors,
) {
    if width == 0 {
        return;
    }
    fs.ensure(width, 1);
    let odd = fs.odd_row;
    let (mut carry, mut below, mut below_prev) = (0, 0, 0);
    for i in 0..width {
        let x = if odd { width - 1 - i } else { i };
        let slot = x + 1;
        let behind = if odd { slot + 1 } else { slot - 1 };
        let adjust = (carry + fs.errors[slot] + 8) >> 4;
        let v = (row[x * nc + c] as i32 + adjust).clamp(0, 255);
        let code = colorindex[v as usize];
        out[x] += code as u8;
        let err = v - colormap[code as usize] as i32;
        let (finished, next) = spread_error(err, &mut below, &mut below_prev);
        fs.errors[behind] = finished;
        carry = next;
    }
    let last = if odd { 1 } else { width };
    fs.errors[last] = below_prev;
    fs.odd_row = !odd;
}

/// Chooses the number of levels per component so that their product is at
/// most `desired`, favoring green, then red, then blue for RGB output.
fn select_ncolors(
    num_components: usize,
    desired: usize,
    out_color_space: ColorSpace,
) -> Result<Vec<usize>> {
    let mut iroot = 1usize;
    let mut temp;
    loop {
        iroot += 1;
        temp = iroot.pow(num_components as u32);
        if temp > desired {
            break;
        }
    }
    iroot -= 1;
    if iroot < 2 {
        return Err(Error::QuantFewColors(temp));
    }

    let mut ncolors = vec![iroot; num_components];
    let mut total = iroot.pow(num_components as u32);
    let rgb = out_color_space == ColorSpace::Rgb && num_components == 3;
    loop {
        let mut changed = false;
        for i in 0..num_components {
            let j = if rgb { [1, 0, 2][i] } else { i };
            let grown = total / ncolors[j] * (ncolors[j] + 1);
            if grown > desired {
                break;
            }
            ncolors[j] += 1;
            total = grown;
            changed = true;
        }
        if !changed {
            return Ok(ncolors);
        }
    }
}

/// 16x16 Bayer matrix entry: bit-reversed interleave of `x ^ y` and `y`.
fn bayer(x: usize, y: usize) -> usize {
    let a = x ^ y;
    let mut v = 0;
    for bit in 0..4 {
        v |= ((a >> bit) & 1) << (2 * bit);
        v |= ((y >> bit) & 1) << (2 * bit + 1);
    }
    (v as u8).reverse_bits() as usize
}

/// Zero-mean dither offsets spanning one quantization step of a component
/// with `ncolors` levels.
fn dither_matrix(ncolors: usize) -> [[i32; ODITHER_SIZE]; ODITHER_SIZE] {
    let cells = (ODITHER_SIZE * ODITHER_SIZE) as i32;
    let den = 2 * cells * (ncolors as i32 - 1);
    let mut m = [[0; ODITHER_SIZE]; ODITHER_SIZE];
    for (y, row) in m.iter_mut().enumerate() {
        for (x, value) in row.iter_mut().enumerate() {
            let num = (cells - 1 - 2 * bayer(x, y) as i32) * 255;
            // Division truncates toward zero, keeping the pattern symmetric.
            *value = num / den;
        }
    }
    m
}

const C0_SHIFT: usize = 3;
const C1_SHIFT: usize = 2;
const C2_SHIFT: usize = 3;
const C0_SCALE: i64 = 2;
const C1_SCALE: i64 = 3;
const C2_SCALE: i64 = 1;
const HIST_C0: usize = 256 >> C0_SHIFT;
const HIST_C1: usize = 256 >> C1_SHIFT;
const HIST_C2: usize = 256 >> C2_SHIFT;

fn cell(r: u8, g: u8, b: u8) -> usize {
    ((r as usize >> C0_SHIFT) * HIST_C1 + (g as usize >> C1_SHIFT)) * HIST_C2
        + (b as usize >> C2_SHIFT)
}

#[derive(Debug, Clone, Copy)]
struct ColorBox {
    min: [usize; 3],
    max: [usize; 3],
    volume: i64,
    colorcount: i64,
}

/// Median-cut palette built from a histogram gathered in a prescan pass.
pub(crate) struct TwoPass {
    desired: usize,
    /// Pixel counts during the prescan; afterwards, palette index plus one
    /// of each cell's nearest color, zero until first needed.
    histogram: Vec<u16>,
    colormap: Vec<Vec<u8>>,
    prescanning: bool,
    /// Floyd-Steinberg state when dithering; any dither mode diffuses
    /// error here.
    fs: Option<FsErrors>,
}

impl TwoPass {
    pub fn new(desired: usize, dither: DitherMode) -> Result<TwoPass> {
        if desired < MIN_TWO_PASS_COLORS {
            return Err(Error::QuantFewColors(MIN_TWO_PASS_COLORS));
        }
        if desired > MAX_COLORS {
            return Err(Error::QuantManyColors(MAX_COLORS));
        }
        let mut histogram = vec![];
        histogram.try_reserve_exact(HIST_C0 * HIST_C1 * HIST_C2)?;
        histogram.resize(HIST_C0 * HIST_C1 * HIST_C2, 0);
        Ok(TwoPass {
            desired,
            histogram,
            colormap: vec![vec![]; 3],
            prescanning: false,
            fs: (dither != DitherMode::None).then(FsErrors::default),
        })
    }

    fn start_pass(&mut self, is_prescan: bool) {
        self.prescanning = is_prescan;
        if is_prescan {
            self.histogram.fill(0);
        } else if let Some(fs) = &mut self.fs {
            fs.reset();
        }
    }

    fn prescan(&mut self, row: &[u8], width: usize) {
        for pixel in row.chunks_exact(3).take(width) {
            let count = &mut self.histogram[cell(pixel[0], pixel[1], pixel[2])];
            *count = count.saturating_add(1);
        }
    }

    fn finish_pass(&mut self) {
        if !self.prescanning {
            return;
        }
        self.prescanning = false;
        let boxes = self.median_cut();
        let mut colormap = vec![Vec::with_capacity(boxes.len()); 3];
        for b in &boxes {
            let color = self.box_color(b);
            for c in 0..3 {
                colormap[c].push(color[c]);
            }
        }
        debug!("two-pass quantization selected {} colors", boxes.len());
        self.colormap = colormap;
        // From now on the histogram caches nearest colors.
        self.histogram.fill(0);
    }

    fn count(&self, c0: usize, c1: usize, c2: usize) -> u16 {
        self.histogram[(c0 * HIST_C1 + c1) * HIST_C2 + c2]
    }

    fn update_box(&self, b: &mut ColorBox) {
        let nonzero_in = |b: &ColorBox, axis: usize, v: usize| {
            let mut lo = b.min;
            let mut hi = b.max;
            lo[axis] = v;
            hi[axis] = v;
            (lo[0]..=hi[0]).any(|c0| {
                (lo[1]..=hi[1]).any(|c1| (lo[2]..=hi[2]).any(|c2| self.count(c0, c1, c2) != 0))
            })
        };
        for axis in 0..3 {
            while b.min[axis] < b.max[axis] && !nonzero_in(b, axis, b.min[axis]) {
                b.min[axis] += 1;
            }
            while b.max[axis] > b.min[axis] && !nonzero_in(b, axis, b.max[axis]) {
                b.max[axis] -= 1;
            }
        }
        let d = self.scaled_extent(b);
        b.volume = d.iter().map(|d| d * d).sum();
        let mut colorcount = 0;
        for c0 in b.min[0]..=b.max[0] {
            for c1 in b.min[1]..=b.max[1] {
                for c2 in b.min[2]..=b.max[2] {
                    if self.count(c0, c1, c2) != 0 {
                        colorcount += 1;
                    }
                }
            }
        }
        b.colorcount = colorcount;
    }

    fn scaled_extent(&self, b: &ColorBox) -> [i64; 3] {
        [
            (((b.max[0] - b.min[0]) << C0_SHIFT) as i64) * C0_SCALE,
            (((b.max[1] - b.min[1]) << C1_SHIFT) as i64) * C1_SCALE,
            (((b.max[2] - b.min[2]) << C2_SHIFT) as i64) * C2_SCALE,
        ]
    }

    fn median_cut(&self) -> Vec<ColorBox> {
        let mut first = ColorBox {
            min: [0; 3],
            max: [HIST_C0 - 1, HIST_C1 - 1, HIST_C2 - 1],
            volume: 0,
            colorcount: 0,
        };
        self.update_box(&mut first);
        let mut boxes = vec![first];
        while boxes.len() < self.desired {
            // Split by population first, then by volume.
            let pick = if boxes.len() * 2 <= self.desired {
                boxes
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| b.volume > 0)
                    .max_by_key(|(i, b)| (b.colorcount, std::cmp::Reverse(*i)))
            } else {
                boxes
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| b.volume > 0)
                    .max_by_key(|(i, b)| (b.volume, std::cmp::Reverse(*i)))
            };
            let Some((i, _)) = pick else {
                break;
            };
            let mut b1 = boxes[i];
            let mut b2 = b1;
            let d = self.scaled_extent(&b1);
            // Ties favor green, then red.
            let mut axis = 1;
            if d[0] > d[1] {
                axis = 0;
            }
            if d[2] > d[axis] {
                axis = 2;
            }
            let mid = (b1.min[axis] + b1.max[axis]) / 2;
            b1.max[axis] = mid;
            b2.min[axis] = mid + 1;
            self.update_box(&mut b1);
            self.update_box(&mut b2);
            boxes[i] = b1;
            boxes.push(b2);
        }
        boxes
    }

    fn box_color(&self, b: &ColorBox) -> [u8; 3] {
        let mut total = 0u64;
        let mut sums = [0u64; 3];
        for c0 in b.min[0]..=b.max[0] {
            for c1 in b.min[1]..=b.max[1] {
                for c2 in b.min[2]..=b.max[2] {
                    let count = self.count(c0, c1, c2) as u64;
                    if count == 0 {
                        continue;
                    }
                    total += count;
                    sums[0] += (((c0 << C0_SHIFT) + ((1 << C0_SHIFT) >> 1)) as u64) * count;
                    sums[1] += (((c1 << C1_SHIFT) + ((1 << C1_SHIFT) >> 1)) as u64) * count;
                    sums[2] += (((c2 << C2_SHIFT) + ((1 << C2_SHIFT) >> 1)) as u64) * count;
                }
            }
        }
        if total == 0 {
            // Only possible for an empty histogram; use the box center.
            return [
                ((b.min[0] + b.max[0]) << C0_SHIFT >> 1) as u8,
                ((b.min[1] + b.max[1]) << C1_SHIFT >> 1) as u8,
                ((b.min[2] + b.max[2]) << C2_SHIFT >> 1) as u8,
            ];
        }
        sums.map(|s| ((s + total / 2) / total) as u8)
    }

    fn nearest(&self, r: u8, g: u8, b: u8) -> usize {
        let center = |v: u8, shift: usize| ((v as i64 >> shift) << shift) + ((1 << shift) >> 1);
        let (r, g, b) = (center(r, C0_SHIFT), center(g, C1_SHIFT), center(b, C2_SHIFT));
        let mut best = (i64::MAX, 0);
        for i in 0..self.colormap[0].len() {
            let dr = (r - self.colormap[0][i] as i64) * C0_SCALE;
            let dg = (g - self.colormap[1][i] as i64) * C1_SCALE;
            let db = (b - self.colormap[2][i] as i64) * C2_SCALE;
            let dist = dr * dr + dg * dg + db * db;
            if dist < best.0 {
                best = (dist, i);
            }
        }
        best.1
    }

    /// Palette index of the color nearest to the cell of `rgb`.
    fn lookup(&mut self, rgb: [u8; 3]) -> u8 {
        let idx = cell(rgb[0], rgb[1], rgb[2]);
        if self.histogram[idx] == 0 {
            self.histogram[idx] = self.nearest(rgb[0], rgb[1], rgb[2]) as u16 + 1;
        }
        (self.histogram[idx] - 1) as u8
    }

    fn quantize(&mut self, row: &[u8], out: &mut [u8], width: usize) {
        match self.fs.take() {
            Some(mut fs) => {
                self.quantize_fs(row, out, width, &mut fs);
                self.fs = Some(fs);
            }
            None => {
                for (pixel, index) in row.chunks_exact(3).zip(out[..width].iter_mut()) {
                    *index = self.lookup([pixel[0], pixel[1], pixel[2]]);
                }
            }
        }
    }

    /// Serpentine Floyd-Steinberg over all three channels at once, with
    /// propagated errors capped by `limit_error`.
    fn quantize_fs(&mut self, row: &[u8], out: &mut [u8], width: usize, fs: &mut FsErrors) {
        if width == 0 {
            return;
        }
        fs.ensure(width, 3);
        let odd = fs.odd_row;
        let mut carry = [0i32; 3];
        let mut below = [0i32; 3];
        let mut below_prev = [0i32; 3];
        for i in 0..width {
            let x = if odd { width - 1 - i } else { i };
            let slot = x + 1;
            let behind = if odd { slot + 1 } else { slot - 1 };
            let mut rgb = [0u8; 3];
            for c in 0..3 {
                let adjust = limit_error((carry[c] + fs.errors[slot * 3 + c] + 8) >> 4);
                rgb[c] = (row[x * 3 + c] as i32 + adjust).clamp(0, 255) as u8;
            }
            let index = self.lookup(rgb);
            out[x] = index;
            for c in 0..3 {
                let err = rgb[c] as i32 - self.colormap[c][index as usize] as i32;
                let (finished, next) = spread_error(err, &mut below[c], &mut below_prev[c]);
                fs.errors[behind * 3 + c] = finished;
                carry[c] = next;
            }
        }
        let last = if odd { 1 } else { width };
        fs.errors[last * 3..last * 3 + 3].copy_from_slice(&below_prev);
        fs.odd_row = !odd;
    }
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    use super::*;

    #[test]
    fn ncolors_favor_green() {
        assert_eq!(
            select_ncolors(3, 256, ColorSpace::Rgb).unwrap(),
            vec![6, 7, 6]
        );
        assert_eq!(select_ncolors(1, 16, ColorSpace::Grayscale).unwrap(), vec![16]);
        assert!(matches!(
            select_ncolors(3, 7, ColorSpace::Rgb),
            Err(Error::QuantFewColors(8))
        ));
    }

    #[test]
    fn gray_levels_are_evenly_spaced() {
        let q = OnePass::new(1, 3, ColorSpace::Grayscale, DitherMode::None).unwrap();
        assert_eq!(q.colormap, vec![vec![0, 128, 255]]);
        let mut q = Quantizer::OnePass(q);
        let mut out = [0u8; 4];
        // Level 1 covers 65..=191.
        q.quantize(&[10, 100, 191, 192], &mut out, 4);
        assert_eq!(out, [0, 1, 1, 2]);
    }

    #[test]
    fn bayer_is_a_permutation() {
        let mut seen = [false; 256];
        for y in 0..16 {
            for x in 0..16 {
                seen[bayer(x, y)] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(bayer(0, 0), 0);
        let m = dither_matrix(2);
        let sum: i32 = m.iter().flatten().sum();
        assert!(sum.abs() < 256);
    }

    #[test]
    fn ordered_dither_mixes_levels() {
        let mut q = Quantizer::OnePass(
            OnePass::new(1, 2, ColorSpace::Grayscale, DitherMode::Ordered).unwrap(),
        );
        let mut ones = 0;
        for _ in 0..16 {
            let mut out = [0u8; 16];
            q.quantize(&[128; 16], &mut out, 16);
            ones += out.iter().filter(|&&i| i == 1).count();
        }
        assert!((96..=160).contains(&ones), "{ones}");
    }

    #[test]
    fn error_limit_is_piecewise_linear() {
        assert_eq!(limit_error(10), 10);
        assert_eq!(limit_error(20), 18);
        assert_eq!(limit_error(-47), -31);
        assert_eq!(limit_error(100), 32);
        assert_eq!(limit_error(-255), -32);
    }

    #[test]
    fn floyd_steinberg_carries_error_right() {
        let mut q = Quantizer::OnePass(
            OnePass::new(1, 2, ColorSpace::Grayscale, DitherMode::FloydSteinberg).unwrap(),
        );
        let mut out = [0u8; 4];
        // 100 rounds down, leaving 7/16 of 100 for the next pixel: 144
        // rounds up, and so on.
        q.quantize(&[100; 4], &mut out, 4);
        assert_eq!(out, [0, 1, 0, 0]);
    }

    #[test]
    fn floyd_steinberg_preserves_mean() {
        let mut q = Quantizer::OnePass(
            OnePass::new(1, 2, ColorSpace::Grayscale, DitherMode::FloydSteinberg).unwrap(),
        );
        q.start_pass(false);
        let mut ones = 0;
        for _ in 0..16 {
            let mut out = [0u8; 16];
            q.quantize(&[128; 16], &mut out, 16);
            ones += out.iter().filter(|&&i| i == 1).count();
        }
        assert!((112..=144).contains(&ones), "{ones}");
    }

    #[test]
    fn two_pass_floyd_steinberg_mixes_colors() {
        let mut q = Quantizer::TwoPass(TwoPass::new(8, DitherMode::FloydSteinberg).unwrap());
        let palette_row: Vec<u8> = [[0u8; 3], [255; 3]]
            .iter()
            .cycle()
            .take(8)
            .flatten()
            .copied()
            .collect();
        q.start_pass(true);
        q.prescan(&palette_row, 8);
        q.finish_pass();
        assert_eq!(q.colormap()[0].len(), 2);
        q.start_pass(false);
        let mut white = 0;
        for _ in 0..4 {
            let mut out = [0u8; 16];
            q.quantize(&[128; 48], &mut out, 16);
            white += out
                .iter()
                .filter(|&&i| q.colormap()[0][i as usize] > 128)
                .count();
        }
        assert!((20..=44).contains(&white), "{white}");
    }

    #[test]
    fn two_pass_finds_exact_palette() {
        let mut q = Quantizer::TwoPass(TwoPass::new(8, DitherMode::None).unwrap());
        let colors = [[255u8, 0, 0], [0, 255, 0], [0, 0, 255], [250, 250, 250]];
        let row: Vec<u8> = colors.iter().cycle().take(64).flatten().copied().collect();
        q.start_pass(true);
        q.prescan(&row, 64);
        q.finish_pass();
        assert_eq!(q.colormap()[0].len(), 4);
        q.start_pass(false);
        let mut out = [0u8; 64];
        q.quantize(&row, &mut out, 64);
        for (x, &i) in out.iter().enumerate() {
            let i = i as usize;
            let mapped = [q.colormap()[0][i], q.colormap()[1][i], q.colormap()[2][i]];
            let want = colors[x % 4];
            for c in 0..3 {
                assert!((mapped[c] as i32 - want[c] as i32).abs() <= 4, "{mapped:?} {want:?}");
            }
        }
    }

    #[test]
    fn two_pass_respects_color_limit() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let row: Vec<u8> = (0..3 * 500).map(|_| rng.random()).collect();
        let mut q = Quantizer::TwoPass(TwoPass::new(16, DitherMode::None).unwrap());
        q.start_pass(true);
        q.prescan(&row, 500);
        q.finish_pass();
        assert_eq!(q.colormap()[0].len(), 16);
        q.start_pass(false);
        let mut out = vec![0u8; 500];
        q.quantize(&row, &mut out, 500);
        assert!(out.iter().all(|&i| i < 16));
    }

    #[test]
    fn two_pass_limits() {
        assert!(matches!(TwoPass::new(4, DitherMode::None), Err(Error::QuantFewColors(8))));
        assert!(matches!(TwoPass::new(300, DitherMode::None), Err(Error::QuantManyColors(256))));
    }
}
