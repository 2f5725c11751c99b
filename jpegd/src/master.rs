// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Output pass orchestration: dimension computation, selection of the
//! output modules, dummy passes for two-pass quantization and progress
//! pass accounting.

use crate::{
    DCTSIZE,
    api::{DitherMode, JpegSource, OutputParams, progress::Progress},
    coefficients::SampleRows,
    error::{Error, ErrorReporter, Result, Warning},
    headers::{ColorSpace, Headers},
    input_controller::{InputController, InputStatus},
    output::{
        Conversion, OutputPipeline,
        color::ColorConverter,
        quantize::{OnePass, Quantizer, TwoPass},
        sample_buffers,
        upsample::Upsampler,
    },
    util::{div_round_up, tracing_wrappers::*},
};

/// Dimensions of the image as delivered to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputInfo {
    pub output_width: usize,
    pub output_height: usize,
    /// Components per pixel after color conversion.
    pub out_color_components: usize,
    /// Components per pixel actually returned: 1 when quantizing.
    pub output_components: usize,
    /// Recommended number of rows per `read_scanlines` call.
    pub rec_outbuf_height: usize,
}

/// Picks the JPEG color space from the component count and markers, and
/// the default parameters for it.
pub(crate) fn default_decompress_parms(
    headers: &mut Headers,
    reporter: &mut ErrorReporter,
) -> OutputParams {
    let ids: Vec<u8> = headers.components.iter().map(|c| c.id).collect();
    headers.jpeg_color_space = match ids.len() {
        1 => ColorSpace::Grayscale,
        3 => {
            if headers.jfif.is_some() {
                ColorSpace::YCbCr
            } else if let Some(transform) = headers.adobe_transform {
                match transform {
                    0 => ColorSpace::Rgb,
                    1 => ColorSpace::YCbCr,
                    t => {
                        reporter.warn(Warning::AdobeTransform(t));
                        ColorSpace::YCbCr
                    }
                }
            } else if ids == [1, 2, 3] {
                ColorSpace::YCbCr
            } else if ids == [b'R', b'G', b'B'] {
                ColorSpace::Rgb
            } else {
                trace!("unrecognized component ids {ids:?}, assuming YCbCr");
                ColorSpace::YCbCr
            }
        }
        4 => match headers.adobe_transform {
            None | Some(0) => ColorSpace::Cmyk,
            Some(2) => ColorSpace::Ycck,
            Some(t) => {
                reporter.warn(Warning::AdobeTransform(t));
                ColorSpace::Ycck
            }
        },
        _ => ColorSpace::Unknown,
    };
    let out_color_space = match headers.jpeg_color_space {
        ColorSpace::Grayscale => ColorSpace::Grayscale,
        ColorSpace::Rgb | ColorSpace::YCbCr => ColorSpace::Rgb,
        ColorSpace::Cmyk | ColorSpace::Ycck => ColorSpace::Cmyk,
        ColorSpace::Unknown => ColorSpace::Unknown,
    };
    debug!(
        "jpeg color space {:?}, default output {out_color_space:?}",
        headers.jpeg_color_space
    );
    OutputParams {
        out_color_space,
        ..OutputParams::default()
    }
}

/// Computes output dimensions and per-component DCT scaling for the
/// requested scale. Depends only on the parameters, so repeated calls give
/// the same result.
pub(crate) fn calc_output_dimensions(
    headers: &mut Headers,
    params: &OutputParams,
) -> Result<OutputInfo> {
    let (num, denom) = (params.scale_num, params.scale_denom);
    if num == 0 || denom == 0 {
        return Err(Error::BadScale(num, denom));
    }
    let min_dct = if num * 8 <= denom {
        1
    } else if num * 4 <= denom {
        2
    } else if num * 2 <= denom {
        4
    } else {
        DCTSIZE
    };
    headers.min_dct_scaled_size = min_dct;
    let (width, height) = (headers.image_width as usize, headers.image_height as usize);
    let (max_h, max_v) = (headers.max_h_samp_factor, headers.max_v_samp_factor);

    for comp in headers.components.iter_mut() {
        // Low-resolution components get part of their upsampling for free
        // from a larger inverse DCT.
        let mut size = min_dct;
        while size < DCTSIZE
            && comp.h_samp_factor * size * 2 <= max_h * min_dct
            && comp.v_samp_factor * size * 2 <= max_v * min_dct
        {
            size *= 2;
        }
        comp.dct_scaled_size = size;
        comp.downsampled_width = div_round_up(width * comp.h_samp_factor * size, max_h * DCTSIZE);
        comp.downsampled_height =
            div_round_up(height * comp.v_samp_factor * size, max_v * DCTSIZE);
    }

    let out_color_components = match params.out_color_space {
        ColorSpace::Grayscale => 1,
        ColorSpace::Rgb | ColorSpace::YCbCr => 3,
        ColorSpace::Cmyk | ColorSpace::Ycck => 4,
        ColorSpace::Unknown => headers.num_components(),
    };
    let info = OutputInfo {
        output_width: div_round_up(width * min_dct, DCTSIZE),
        output_height: div_round_up(height * min_dct, DCTSIZE),
        out_color_components,
        output_components: if params.quantize_colors {
            1
        } else {
            out_color_components
        },
        rec_outbuf_height: if use_merged_upsample(headers, params, out_color_components) {
            max_v
        } else {
            1
        },
    };
    Ok(info)
}

/// Whether the fused upsample and color conversion path applies.
pub(crate) fn use_merged_upsample(
    headers: &Headers,
    params: &OutputParams,
    out_color_components: usize,
) -> bool {
    if params.do_fancy_upsampling || params.ccir601_sampling {
        return false;
    }
    if headers.jpeg_color_space != ColorSpace::YCbCr
        || headers.num_components() != 3
        || params.out_color_space != ColorSpace::Rgb
        || out_color_components != 3
    {
        return false;
    }
    let c = &headers.components;
    if c[0].h_samp_factor != 2
        || c[1].h_samp_factor != 1
        || c[2].h_samp_factor != 1
        || c[0].v_samp_factor > 2
        || c[1].v_samp_factor != 1
        || c[2].v_samp_factor != 1
    {
        return false;
    }
    c.iter()
        .all(|comp| comp.dct_scaled_size == headers.min_dct_scaled_size)
}

/// Per-decompression output state.
pub(crate) struct Master {
    pub info: OutputInfo,
    /// Scanline pipeline; `None` in raw mode.
    pub pipeline: Option<OutputPipeline>,
    /// Raw-mode IDCT output.
    pub raw_rows: Vec<SampleRows>,
    is_dummy_pass: bool,
    /// Two-pass quantization whose palette is not chosen yet.
    needs_prescan: bool,
    pass_number: u32,
}

impl Master {
    /// Selects the modules for all output passes of this decompression.
    pub fn new(
        headers: &mut Headers,
        params: &OutputParams,
        has_multiple_scans: bool,
        progress: &mut Progress,
    ) -> Result<Master> {
        let info = calc_output_dimensions(headers, params)?;
        for comp in headers.components.iter_mut() {
            comp.component_needed = true;
        }

        let mut pipeline = None;
        let mut raw_rows = vec![];
        let mut two_pass = false;
        if params.raw_data_out {
            if params.quantize_colors {
                return Err(Error::NotImplemented("color quantization of raw data"));
            }
            raw_rows = sample_buffers(headers)?;
        } else {
            if params.ccir601_sampling {
                return Err(Error::NotImplemented("CCIR601 sampling"));
            }
            let conversion = if use_merged_upsample(headers, params, info.out_color_components) {
                Conversion::MergedYcc {
                    v: headers.components[0].v_samp_factor,
                }
            } else {
                let (converter, n) = ColorConverter::select(
                    headers.jpeg_color_space,
                    params.out_color_space,
                    headers.num_components(),
                )?;
                if n != info.out_color_components {
                    return Err(Error::ConversionNotSupported(
                        headers.jpeg_color_space,
                        params.out_color_space,
                    ));
                }
                converter.mark_unneeded(&mut headers.components);
                Conversion::Separate(converter)
            };
            let upsamplers = match conversion {
                Conversion::MergedYcc { .. } => vec![Upsampler::Unused; headers.num_components()],
                Conversion::Separate(_) => (0..headers.num_components())
                    .map(|c| Upsampler::select(headers, c, params.do_fancy_upsampling))
                    .collect::<Result<_>>()?,
            };
            let quantizer = if params.quantize_colors {
                // Only three-component output gets a fitted palette.
                if params.two_pass_quantize && info.out_color_components == 3 {
                    two_pass = true;
                    Some(Quantizer::TwoPass(TwoPass::new(
                        params.desired_number_of_colors,
                        params.dither_mode,
                    )?))
                } else {
                    Some(Quantizer::OnePass(OnePass::new(
                        info.out_color_components,
                        params.desired_number_of_colors,
                        params.out_color_space,
                        params.dither_mode,
                    )?))
                }
            } else {
                None
            };
            if two_pass && params.dither_mode == DitherMode::Ordered {
                trace!("two-pass quantization dithers with Floyd-Steinberg instead of ordered");
            }
            pipeline = Some(OutputPipeline::new(
                headers, &info, conversion, upsamplers, quantizer,
            )?);
        }

        let mut pass_number = 0;
        if !params.buffered_image && has_multiple_scans {
            // The preload input pass counts as the first pass.
            let nscans = if headers.progressive_mode {
                2 + 3 * headers.num_components()
            } else {
                headers.num_components()
            };
            *progress = Progress {
                pass_counter: 0,
                pass_limit: (headers.total_imcu_rows * nscans) as u64,
                completed_passes: 0,
                total_passes: if two_pass { 3 } else { 2 },
            };
            pass_number = 1;
        }

        debug!(
            "output {}x{} with {} components, raw {}",
            info.output_width, info.output_height, info.output_components, params.raw_data_out
        );
        Ok(Master {
            info,
            pipeline,
            raw_rows,
            is_dummy_pass: false,
            needs_prescan: two_pass,
            pass_number,
        })
    }

    pub fn is_dummy_pass(&self) -> bool {
        self.is_dummy_pass
    }

    /// Sets up the next output pass, which may be a dummy pass.
    pub fn prepare_for_output_pass(
        &mut self,
        input: &mut InputController,
        progress: &mut Progress,
        buffered_image: bool,
    ) {
        if self.is_dummy_pass {
            self.is_dummy_pass = false;
        } else {
            self.is_dummy_pass = self.needs_prescan;
        }
        if let Some(pipeline) = &mut self.pipeline {
            pipeline.start_pass(self.is_dummy_pass);
        }
        input.coef.start_output_pass();

        progress.completed_passes = self.pass_number;
        progress.total_passes = self.pass_number + if self.is_dummy_pass { 2 } else { 1 };
        // Buffered-image output may be followed by more input.
        if buffered_image && !input.eoi_reached {
            progress.total_passes += 1;
        }
        trace!(
            "output pass {} (dummy: {})",
            self.pass_number, self.is_dummy_pass
        );
    }

    pub fn finish_output_pass(&mut self) {
        if let Some(pipeline) = &mut self.pipeline {
            pipeline.finish_pass();
        }
        if self.is_dummy_pass {
            self.needs_prescan = false;
        }
        self.pass_number += 1;
    }
}

/// Decodes input until iMCU row `output_imcu_row` of scan
/// `output_scan_number` is available, then inverse-DCTs it into `out`.
/// Returns false if the source suspended first.
pub(crate) fn decompress_data(
    input: &mut InputController,
    headers: &mut Headers,
    source: &mut dyn JpegSource,
    reporter: &mut ErrorReporter,
    output_scan_number: &mut u32,
    out: &mut [SampleRows],
) -> Result<bool> {
    while !input.eoi_reached
        && (headers.input_scan_number < *output_scan_number
            || (headers.input_scan_number == *output_scan_number
                && input.coef.input_imcu_row <= input.coef.output_imcu_row))
    {
        match input.consume_input(headers, source, reporter)? {
            InputStatus::Suspended => return Ok(false),
            InputStatus::ReachedEoi => {
                clamp_output_scan(headers, output_scan_number);
                break;
            }
            _ => {}
        }
    }
    input.coef.decompress_row(headers, out)?;
    Ok(true)
}

/// Output cannot refer to scans that will never arrive.
pub(crate) fn clamp_output_scan(headers: &Headers, output_scan_number: &mut u32) {
    *output_scan_number = (*output_scan_number).min(headers.input_scan_number);
}
