// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Turns inverse-DCT output into application scanlines.
//!
//! Decoded iMCU rows arrive one at a time. When an upsampler needs the
//! first row of the next iMCU row as context, processing lags one iMCU row
//! behind decoding.

pub(crate) mod color;
pub(crate) mod idct;
pub(crate) mod quantize;
pub(crate) mod upsample;

use color::{ColorConverter, merged_ycc_rgb};
use quantize::Quantizer;
use upsample::{ComponentRows, Upsampler};

use crate::{
    coefficients::SampleRows,
    error::{Error, Result},
    headers::Headers,
    master::OutputInfo,
    util::tracing_wrappers::*,
};

/// Color deconversion of one output pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    Separate(ColorConverter),
    /// Box upsampling of 2:1 horizontal (and `v`:1 vertical) chroma fused
    /// with YCbCr to RGB conversion.
    MergedYcc { v: usize },
}

/// Allocates one IDCT output buffer per component.
pub(crate) fn sample_buffers(headers: &Headers) -> Result<Vec<SampleRows>> {
    headers
        .components
        .iter()
        .map(|comp| {
            let blocks = crate::util::round_up(comp.width_in_blocks, comp.h_samp_factor);
            SampleRows::for_component(comp, blocks)
        })
        .collect()
}

pub(crate) struct OutputPipeline {
    upsamplers: Vec<Upsampler>,
    conversion: Conversion,
    quantizer: Option<Quantizer>,
    needs_context: bool,
    info: OutputInfo,
    /// Output rows per iMCU row.
    rows_per_imcu: usize,
    /// Decoded samples of the iMCU row being processed, and of the one
    /// after it when context is needed.
    cur: Vec<SampleRows>,
    next: Vec<SampleRows>,
    cur_ready: bool,
    next_ready: bool,
    /// Last sample row of the previous iMCU row, per component.
    above: Vec<Vec<u8>>,
    has_above: bool,
    upsampled: Vec<SampleRows>,
    pixels: SampleRows,
    /// Quantized rows; unused without a quantizer.
    indexed: SampleRows,
    rows_buffered: usize,
    row_pos: usize,
    /// Next iMCU row to process.
    imcu_row: usize,
    total_imcu_rows: usize,
    prescan: bool,
}

impl OutputPipeline {
    pub fn new(
        headers: &Headers,
        info: &OutputInfo,
        conversion: Conversion,
        upsamplers: Vec<Upsampler>,
        quantizer: Option<Quantizer>,
    ) -> Result<Self> {
        let rows = headers.imcu_output_rows();
        let needs_context = upsamplers.iter().any(|u| u.needs_context());
        let upsampled = upsamplers
            .iter()
            .map(|u| match u {
                Upsampler::Unused => SampleRows::new(0, rows),
                _ => SampleRows::new(info.output_width, rows),
            })
            .collect::<Result<Vec<_>>>()?;
        let above = if needs_context {
            sample_buffers(headers)?
                .iter()
                .map(|b| vec![0; b.stride])
                .collect()
        } else {
            vec![]
        };
        let indexed_stride = if quantizer.is_some() {
            info.output_width
        } else {
            0
        };
        debug!(
            "output pipeline: {conversion:?}, upsamplers {upsamplers:?}, context {needs_context}, quantize {}",
            quantizer.is_some()
        );
        Ok(Self {
            upsamplers,
            conversion,
            quantizer,
            needs_context,
            info: *info,
            rows_per_imcu: rows,
            cur: sample_buffers(headers)?,
            next: if needs_context {
                sample_buffers(headers)?
            } else {
                vec![]
            },
            cur_ready: false,
            next_ready: false,
            above,
            has_above: false,
            upsampled,
            pixels: SampleRows::new(info.output_width * info.out_color_components, rows)?,
            indexed: SampleRows::new(indexed_stride, rows)?,
            rows_buffered: 0,
            row_pos: 0,
            imcu_row: 0,
            total_imcu_rows: headers.total_imcu_rows,
            prescan: false,
        })
    }

    pub fn quantizer(&self) -> Option<&Quantizer> {
        self.quantizer.as_ref()
    }

    pub fn start_pass(&mut self, is_prescan: bool) {
        self.prescan = is_prescan;
        self.cur_ready = false;
        self.next_ready = false;
        self.has_above = false;
        self.rows_buffered = 0;
        self.row_pos = 0;
        self.imcu_row = 0;
        if let Some(q) = &mut self.quantizer {
            q.start_pass(is_prescan);
        }
    }

    pub fn finish_pass(&mut self) {
        if let Some(q) = &mut self.quantizer {
            q.finish_pass();
        }
    }

    /// Buffers the next decompressed iMCU row must be written to, if the
    /// pipeline cannot make progress without it.
    pub fn pending_input(&mut self) -> Option<&mut [SampleRows]> {
        if self.row_pos < self.rows_buffered || self.imcu_row >= self.total_imcu_rows {
            return None;
        }
        if !self.cur_ready {
            return Some(&mut self.cur);
        }
        if self.needs_context && !self.next_ready && self.imcu_row + 1 < self.total_imcu_rows {
            return Some(&mut self.next);
        }
        None
    }

    /// Marks the buffers returned by `pending_input` as filled.
    pub fn commit_input(&mut self) {
        if !self.cur_ready {
            self.cur_ready = true;
        } else {
            self.next_ready = true;
        }
    }

    fn can_process(&self) -> bool {
        self.cur_ready
            && (!self.needs_context || self.next_ready || self.imcu_row + 1 >= self.total_imcu_rows)
    }

    /// Produces rows into `out` (or discards them when `out` is `None`, as
    /// dummy passes do) until `max` rows are done or more decoded input is
    /// needed. Returns the number of rows produced.
    pub fn run(
        &mut self,
        headers: &Headers,
        mut out: Option<&mut [&mut [u8]]>,
        max: usize,
    ) -> Result<usize> {
        let row_len = self.info.output_width * self.info.output_components;
        let mut max = max;
        if let Some(out) = &out {
            max = max.min(out.len());
            if let Some(short) = out.iter().take(max).find(|r| r.len() < row_len) {
                return Err(Error::RowTooShort(short.len(), row_len));
            }
        }
        let mut done = 0;
        while done < max {
            if self.row_pos < self.rows_buffered {
                let n = (self.rows_buffered - self.row_pos).min(max - done);
                if let Some(out) = &mut out {
                    let src = if self.quantizer.is_some() {
                        &self.indexed
                    } else {
                        &self.pixels
                    };
                    for i in 0..n {
                        out[done + i][..row_len]
                            .copy_from_slice(&src.row(self.row_pos + i)[..row_len]);
                    }
                }
                self.row_pos += n;
                done += n;
            } else if self.imcu_row < self.total_imcu_rows && self.can_process() {
                self.process_row(headers);
            } else {
                break;
            }
        }
        Ok(done)
    }

    fn process_row(&mut self, headers: &Headers) {
        let r_out = self.rows_per_imcu;
        let first = self.imcu_row * r_out;
        let out_rows = r_out.min(self.info.output_height.saturating_sub(first));
        let width = self.info.output_width;
        trace!("processing iMCU row {} ({out_rows} rows)", self.imcu_row);

        match self.conversion {
            Conversion::MergedYcc { v } => {
                for y in 0..out_rows {
                    merged_ycc_rgb(
                        self.cur[0].row(y),
                        self.cur[1].row(y / v),
                        self.cur[2].row(y / v),
                        self.pixels.row_mut(y),
                        width,
                    );
                }
            }
            Conversion::Separate(converter) => {
                let has_next = self.next_ready;
                for (c, up) in self.upsamplers.iter().enumerate() {
                    if *up == Upsampler::Unused {
                        continue;
                    }
                    let above = (self.needs_context && self.has_above).then(|| &self.above[c][..]);
                    let below = has_next.then(|| self.next[c].row(0));
                    let ctx = ComponentRows::new(
                        &headers.components[c],
                        self.imcu_row,
                        above,
                        &self.cur[c],
                        below,
                    );
                    up.run(&ctx, &mut self.upsampled[c], width);
                }
                for y in 0..out_rows {
                    let input: Vec<&[u8]> = self.upsampled.iter().map(|u| u.row(y)).collect();
                    converter.convert(&input, self.pixels.row_mut(y), width);
                }
            }
        }

        if let Some(q) = &mut self.quantizer {
            for y in 0..out_rows {
                if self.prescan {
                    q.prescan(self.pixels.row(y), width);
                } else {
                    q.quantize(self.pixels.row(y), self.indexed.row_mut(y), width);
                }
            }
        }

        if self.needs_context {
            for (above, cur) in self.above.iter_mut().zip(&self.cur) {
                if cur.rows > 0 {
                    above.copy_from_slice(cur.row(cur.rows - 1));
                }
            }
            self.has_above = true;
            std::mem::swap(&mut self.cur, &mut self.next);
        }
        self.cur_ready = self.needs_context && self.next_ready;
        self.next_ready = false;
        self.imcu_row += 1;
        self.rows_buffered = out_rows;
        self.row_pos = 0;
    }
}

/// Checks that `planes` can hold one iMCU row of every component.
pub(crate) fn check_raw_buffers(headers: &Headers, planes: &[&mut [&mut [u8]]]) -> Result<()> {
    if planes.len() < headers.num_components() {
        return Err(Error::WrongBufferCount(planes.len(), headers.num_components()));
    }
    for (c, plane) in planes.iter().enumerate().take(headers.num_components()) {
        let comp = &headers.components[c];
        let rows = headers.imcu_sample_rows(c);
        if plane.len() < rows {
            return Err(Error::BufferSize(plane.len(), rows));
        }
        let width = comp.width_in_blocks * comp.dct_scaled_size;
        if let Some(short) = plane.iter().take(rows).find(|r| r.len() < width) {
            return Err(Error::RowTooShort(short.len(), width));
        }
    }
    Ok(())
}

/// Copies one decoded iMCU row into caller planes, `v_samp_factor *
/// dct_scaled_size` rows of `width_in_blocks * dct_scaled_size` samples per
/// component.
pub(crate) fn copy_raw_rows(
    headers: &Headers,
    samples: &[SampleRows],
    planes: &mut [&mut [&mut [u8]]],
) {
    for ((comp, rows), plane) in headers.components.iter().zip(samples).zip(planes.iter_mut()) {
        let width = comp.width_in_blocks * comp.dct_scaled_size;
        for (y, dst) in plane.iter_mut().take(rows.rows).enumerate() {
            dst[..width].copy_from_slice(&rows.row(y)[..width]);
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::headers::{ColorSpace, ComponentInfo};

    fn gray_headers(width: usize, height: usize) -> (Headers, OutputInfo) {
        let blocks_w = width.div_ceil(8);
        let blocks_h = height.div_ceil(8);
        let headers = Headers {
            max_h_samp_factor: 1,
            max_v_samp_factor: 1,
            min_dct_scaled_size: 8,
            total_imcu_rows: blocks_h,
            jpeg_color_space: ColorSpace::Grayscale,
            components: vec![ComponentInfo {
                h_samp_factor: 1,
                v_samp_factor: 1,
                width_in_blocks: blocks_w,
                height_in_blocks: blocks_h,
                dct_scaled_size: 8,
                downsampled_width: width,
                downsampled_height: height,
                component_needed: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        let info = OutputInfo {
            output_width: width,
            output_height: height,
            out_color_components: 1,
            output_components: 1,
            rec_outbuf_height: 1,
        };
        (headers, info)
    }

    #[test]
    fn rows_flow_through() {
        let (headers, info) = gray_headers(10, 12);
        let mut p = OutputPipeline::new(
            &headers,
            &info,
            Conversion::Separate(ColorConverter::Grayscale),
            vec![Upsampler::FullSize],
            None,
        )
        .unwrap();
        p.start_pass(false);
        let mut rows = vec![vec![0u8; 10]; 12];
        let mut out: Vec<&mut [u8]> = rows.iter_mut().map(|r| &mut r[..]).collect();

        // Nothing decoded yet.
        assert_eq!(p.run(&headers, Some(&mut out[..]), 12).unwrap(), 0);
        for imcu in 0..2 {
            let bufs = p.pending_input().unwrap();
            for y in 0..8 {
                bufs[0].row_mut(y).fill((imcu * 8 + y) as u8);
            }
            p.commit_input();
            // Without context one decoded row is enough to make progress.
            assert!(p.pending_input().is_none());
            let start = imcu * 8;
            let n = p.run(&headers, Some(&mut out[start..]), 12 - start).unwrap();
            assert_eq!(n, if imcu == 0 { 8 } else { 4 });
        }
        assert!(p.pending_input().is_none());
        drop(out);
        for (y, row) in rows.iter().enumerate() {
            assert_eq!(row, &vec![y as u8; 10]);
        }
    }

    #[test]
    fn context_row_is_required_before_processing() {
        let mut headers = Headers {
            max_h_samp_factor: 2,
            max_v_samp_factor: 2,
            min_dct_scaled_size: 8,
            total_imcu_rows: 2,
            ..Default::default()
        };
        for (h, w) in [(2, 32), (1, 16)] {
            headers.components.push(ComponentInfo {
                h_samp_factor: h,
                v_samp_factor: h,
                width_in_blocks: w / 8,
                height_in_blocks: w / 8,
                dct_scaled_size: 8,
                downsampled_width: w,
                downsampled_height: w,
                component_needed: true,
                ..Default::default()
            });
        }
        let info = OutputInfo {
            output_width: 32,
            output_height: 32,
            out_color_components: 2,
            output_components: 2,
            rec_outbuf_height: 1,
        };
        let ups = vec![
            Upsampler::select(&headers, 0, true).unwrap(),
            Upsampler::select(&headers, 1, true).unwrap(),
        ];
        assert_eq!(ups[1], Upsampler::H2V2Fancy);
        let mut p = OutputPipeline::new(
            &headers,
            &info,
            Conversion::Separate(ColorConverter::Identity(2)),
            ups,
            None,
        )
        .unwrap();
        p.start_pass(true);
        p.pending_input().unwrap();
        p.commit_input();
        assert_eq!(p.run(&headers, None, 32).unwrap(), 0);
        p.pending_input().unwrap();
        p.commit_input();
        // The second row was decoded as context and is the last one.
        assert_eq!(p.run(&headers, None, 32).unwrap(), 32);
        assert!(p.pending_input().is_none());
    }

    #[test]
    fn short_output_row_is_rejected() {
        let (headers, info) = gray_headers(10, 8);
        let mut p = OutputPipeline::new(
            &headers,
            &info,
            Conversion::Separate(ColorConverter::Grayscale),
            vec![Upsampler::FullSize],
            None,
        )
        .unwrap();
        let mut row = [0u8; 9];
        let mut out: Vec<&mut [u8]> = vec![&mut row];
        assert!(matches!(
            p.run(&headers, Some(&mut out[..]), 1),
            Err(Error::RowTooShort(9, 10))
        ));
    }

    #[test]
    fn raw_buffer_checks() {
        let (headers, _) = gray_headers(10, 8);
        let mut rows = vec![vec![0u8; 16]; 8];
        let mut plane: Vec<&mut [u8]> = rows.iter_mut().map(|r| &mut r[..]).collect();
        check_raw_buffers(&headers, &[&mut plane[..]]).unwrap();
        assert!(matches!(
            check_raw_buffers(&headers, &[&mut plane[..7]]),
            Err(Error::BufferSize(7, 8))
        ));
        assert!(matches!(
            check_raw_buffers(&headers, &[]),
            Err(Error::WrongBufferCount(0, 1))
        ));

        let mut samples = sample_buffers(&headers).unwrap();
        samples[0].row_mut(3).fill(7);
        copy_raw_rows(&headers, &samples, &mut [&mut plane[..]]);
        assert_eq!(rows[3], vec![7; 16]);
    }
}
