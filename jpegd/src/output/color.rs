// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::{Error, Result},
    headers::{ColorSpace, ComponentInfo},
};

const SCALEBITS: i32 = 16;
const ONE_HALF: i32 = 1 << (SCALEBITS - 1);

const fn fix(x: f64) -> i32 {
    (x * (1 << SCALEBITS) as f64 + 0.5) as i32
}

/// Color deconversion from the JPEG color space to the output one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorConverter {
    /// Interleaves the components unchanged.
    Identity(usize),
    /// Takes the first component only.
    Grayscale,
    YccToRgb,
    GrayToRgb,
    RgbToGray,
    YcckToCmyk,
}

impl ColorConverter {
    /// Picks the conversion and returns it with the number of output
    /// components it produces.
    pub fn select(
        jpeg_color_space: ColorSpace,
        out_color_space: ColorSpace,
        num_components: usize,
    ) -> Result<(ColorConverter, usize)> {
        let consistent = match jpeg_color_space.num_components() {
            Some(n) => n == num_components,
            None => num_components >= 1,
        };
        if !consistent {
            return Err(Error::BadColorSpace(jpeg_color_space, num_components));
        }
        let unsupported = Error::ConversionNotSupported(jpeg_color_space, out_color_space);
        use ColorSpace::*;
        Ok(match (out_color_space, jpeg_color_space) {
            (Grayscale, Grayscale | YCbCr) => (ColorConverter::Grayscale, 1),
            (Grayscale, Rgb) => (ColorConverter::RgbToGray, 1),
            (Grayscale, _) => return Err(unsupported),
            (Rgb, YCbCr) => (ColorConverter::YccToRgb, 3),
            (Rgb, Grayscale) => (ColorConverter::GrayToRgb, 3),
            (Rgb, Rgb) => (ColorConverter::Identity(3), 3),
            (Rgb, _) => return Err(unsupported),
            (Cmyk, Ycck) => (ColorConverter::YcckToCmyk, 4),
            (Cmyk, Cmyk) => (ColorConverter::Identity(4), 4),
            (Cmyk, _) => return Err(unsupported),
            (out, jpeg) if out == jpeg => (ColorConverter::Identity(num_components), num_components),
            _ => return Err(unsupported),
        })
    }

    /// Clears `component_needed` on components the conversion never reads.
    pub fn mark_unneeded(self, components: &mut [ComponentInfo]) {
        if self == ColorConverter::Grayscale {
            for comp in components.iter_mut().skip(1) {
                comp.component_needed = false;
            }
        }
    }

    /// Converts `width` pixels from planar `input` rows to interleaved output.
    pub fn convert(self, input: &[&[u8]], out: &mut [u8], width: usize) {
        match self {
            ColorConverter::Identity(n) => {
                for (x, pixel) in out.chunks_exact_mut(n).take(width).enumerate() {
                    for (c, sample) in pixel.iter_mut().enumerate() {
                        *sample = input[c][x];
                    }
                }
            }
            ColorConverter::Grayscale => out[..width].copy_from_slice(&input[0][..width]),
            ColorConverter::GrayToRgb => {
                for (pixel, &g) in out.chunks_exact_mut(3).zip(&input[0][..width]) {
                    pixel.fill(g);
                }
            }
            ColorConverter::YccToRgb => {
                for x in 0..width {
                    let rgb = ycc_to_rgb(input[0][x], input[1][x], input[2][x]);
                    out[3 * x..3 * x + 3].copy_from_slice(&rgb);
                }
            }
            ColorConverter::RgbToGray => {
                for x in 0..width {
                    out[x] = rgb_to_gray(input[0][x], input[1][x], input[2][x]);
                }
            }
            ColorConverter::YcckToCmyk => {
                for x in 0..width {
                    let [r, g, b] = ycc_to_rgb(input[0][x], input[1][x], input[2][x]);
                    out[4 * x..4 * x + 4].copy_from_slice(&[255 - r, 255 - g, 255 - b, input[3][x]]);
                }
            }
        }
    }
}

fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as i32;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = y + ((fix(1.40200) * cr + ONE_HALF) >> SCALEBITS);
    let g = y + ((-fix(0.34414) * cb + ONE_HALF - fix(0.71414) * cr) >> SCALEBITS);
    let b = y + ((fix(1.77200) * cb + ONE_HALF) >> SCALEBITS);
    [r, g, b].map(|v| v.clamp(0, 255) as u8)
}

fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    ((fix(0.29900) * r as i32 + fix(0.58700) * g as i32 + fix(0.11400) * b as i32 + ONE_HALF)
        >> SCALEBITS) as u8
}

/// Combined 2:1 horizontal replication and YCbCr to RGB conversion for one
/// output row; `cb` and `cr` hold half as many samples as `y`.
pub(crate) fn merged_ycc_rgb(y: &[u8], cb: &[u8], cr: &[u8], out: &mut [u8], width: usize) {
    for x in 0..width {
        let rgb = ycc_to_rgb(y[x], cb[x / 2], cr[x / 2]);
        out[3 * x..3 * x + 3].copy_from_slice(&rgb);
    }
}
