// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::headers::ColorSpace;

/// Default palette size when color quantization is enabled.
pub const DEFAULT_DESIRED_COLORS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherMode {
    /// Map every pixel to its nearest palette color.
    None,
    /// Add a fixed 16x16 threshold pattern before mapping. Two-pass
    /// quantization uses Floyd-Steinberg instead.
    Ordered,
    /// Serpentine Floyd-Steinberg error diffusion.
    #[default]
    FloydSteinberg,
}

/// Caller-settable decompression parameters.
///
/// Filled with defaults guessed from the headers when the first scan
/// header is read, and frozen once decompression starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParams {
    pub out_color_space: ColorSpace,
    /// Output is scaled by `scale_num / scale_denom`, rounded to a supported
    /// factor of 1/8, 1/4, 1/2 or 1.
    pub scale_num: u32,
    pub scale_denom: u32,
    /// Allows output passes against any scan via `start_output`.
    pub buffered_image: bool,
    /// Deliver downsampled component planes through `read_raw_data`.
    pub raw_data_out: bool,
    pub do_fancy_upsampling: bool,
    /// Co-sited chroma siting. Not supported; decompression fails if set.
    pub ccir601_sampling: bool,
    pub quantize_colors: bool,
    /// Two-pass quantization builds a palette fitted to the image. Only
    /// available for three-component output.
    pub two_pass_quantize: bool,
    pub dither_mode: DitherMode,
    pub desired_number_of_colors: usize,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            out_color_space: ColorSpace::Unknown,
            scale_num: 1,
            scale_denom: 1,
            buffered_image: false,
            raw_data_out: false,
            do_fancy_upsampling: true,
            ccir601_sampling: false,
            quantize_colors: false,
            two_pass_quantize: true,
            dither_mode: DitherMode::FloydSteinberg,
            desired_number_of_colors: DEFAULT_DESIRED_COLORS,
        }
    }
}
