// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Parameter side of a compression session, filled from a decompression
//! session for lossless transcoding.

use crate::{
    MAX_COMPONENTS, NUM_HUFF_TBLS, NUM_QUANT_TBLS,
    api::{Decompressor, JpegSource, ProgressMonitor, progress::ProgressTracker},
    error::{Error, ErrorReporter, Result},
    headers::{
        ColorSpace, JfifInfo,
        tables::{HuffmanTable, QuantTable, TableClass},
    },
    session::{CodecSession, CompressState},
    util::tracing_wrappers::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressComponent {
    pub id: u8,
    pub h_samp_factor: usize,
    pub v_samp_factor: usize,
    pub quant_tbl_no: usize,
    pub dc_tbl_no: usize,
    pub ac_tbl_no: usize,
}

/// Compression parameters. Encoding itself is not provided; the context
/// only carries what a transcoder needs to describe its output.
pub struct CompressContext {
    state: CompressState,
    reporter: ErrorReporter,
    progress: ProgressTracker,
    pub image_width: u32,
    pub image_height: u32,
    pub data_precision: u8,
    pub in_color_space: ColorSpace,
    pub jpeg_color_space: ColorSpace,
    pub components: Vec<CompressComponent>,
    pub quant_tables: [Option<QuantTable>; NUM_QUANT_TBLS],
    pub dc_huff_tables: [Option<HuffmanTable>; NUM_HUFF_TBLS],
    pub ac_huff_tables: [Option<HuffmanTable>; NUM_HUFF_TBLS],
    pub write_jfif_header: bool,
    pub write_adobe_marker: bool,
    pub jfif: JfifInfo,
}

impl Default for CompressContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressContext {
    pub fn new() -> Self {
        Self {
            state: CompressState::Start,
            reporter: ErrorReporter::new(),
            progress: ProgressTracker::default(),
            image_width: 0,
            image_height: 0,
            data_precision: 8,
            in_color_space: ColorSpace::Unknown,
            jpeg_color_space: ColorSpace::Unknown,
            components: vec![],
            quant_tables: Default::default(),
            dc_huff_tables: Default::default(),
            ac_huff_tables: Default::default(),
            write_jfif_header: false,
            write_adobe_marker: false,
            jfif: JfifInfo {
                major_version: 1,
                minor_version: 1,
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> CompressState {
        self.state
    }

    /// Installs the standard Huffman tables in slots 0 and 1.
    fn set_default_huffman_tables(&mut self) {
        for slot in 0..2 {
            self.dc_huff_tables[slot] = HuffmanTable::standard(TableClass::Dc, slot);
            self.ac_huff_tables[slot] = HuffmanTable::standard(TableClass::Ac, slot);
        }
    }

    /// Component ids, sampling and table slots conventional for `space`,
    /// plus the matching marker choice.
    fn set_color_space(&mut self, space: ColorSpace, num_components: usize) {
        self.jpeg_color_space = space;
        self.write_jfif_header = matches!(space, ColorSpace::Grayscale | ColorSpace::YCbCr);
        self.write_adobe_marker = matches!(
            space,
            ColorSpace::Rgb | ColorSpace::Cmyk | ColorSpace::Ycck
        );
        let comp = |id: u8, samp: usize, tbl: usize| CompressComponent {
            id,
            h_samp_factor: samp,
            v_samp_factor: samp,
            quant_tbl_no: tbl,
            dc_tbl_no: tbl,
            ac_tbl_no: tbl,
        };
        self.components = match space {
            ColorSpace::Grayscale => vec![comp(1, 1, 0)],
            ColorSpace::Rgb => b"RGB".iter().map(|&id| comp(id, 1, 0)).collect(),
            ColorSpace::YCbCr => vec![comp(1, 2, 0), comp(2, 1, 1), comp(3, 1, 1)],
            ColorSpace::Cmyk => b"CMYK".iter().map(|&id| comp(id, 1, 0)).collect(),
            ColorSpace::Ycck => vec![comp(1, 2, 0), comp(2, 1, 1), comp(3, 1, 1), comp(4, 2, 0)],
            ColorSpace::Unknown => (0..num_components).map(|i| comp(i as u8, 1, 0)).collect(),
        };
    }
}

/// Copies what a lossless transcode must preserve from `src` into `dst`:
/// dimensions, color space, precision, quantization tables and the
/// per-component ids, sampling factors and table slots. Huffman slots are
/// the defaults for the color space, not the source's.
///
/// Fails if a component was decoded with a table that differs from the one
/// now in its slot, since the slot cannot hold both.
pub fn copy_critical_parameters<S: JpegSource>(
    src: &Decompressor<S>,
    dst: &mut CompressContext,
) -> Result<()> {
    if dst.state != CompressState::Start {
        return Err(Error::BadCompressState(dst.state));
    }
    let headers = src.headers();
    dst.image_width = headers.image_width;
    dst.image_height = headers.image_height;
    dst.in_color_space = headers.jpeg_color_space;
    dst.set_default_huffman_tables();
    dst.set_color_space(headers.jpeg_color_space, headers.num_components());
    dst.data_precision = headers.data_precision;

    for (dst_table, src_table) in dst.quant_tables.iter_mut().zip(&headers.quant_tables) {
        if let Some(table) = src_table {
            *dst_table = Some(QuantTable::new(table.values));
        }
    }

    let n = headers.num_components();
    if !(1..=MAX_COMPONENTS).contains(&n) {
        return Err(Error::ComponentCount(n, MAX_COMPONENTS));
    }
    dst.components.resize(n, CompressComponent::default());
    for (out, comp) in dst.components.iter_mut().zip(&headers.components) {
        out.id = comp.id;
        out.h_samp_factor = comp.h_samp_factor;
        out.v_samp_factor = comp.v_samp_factor;
        out.quant_tbl_no = comp.quant_tbl_no;
        let slot = headers
            .quant_tables
            .get(comp.quant_tbl_no)
            .and_then(Option::as_ref)
            .ok_or(Error::NoQuantTable(comp.quant_tbl_no))?;
        if let Some(latched) = &comp.quant_table {
            if latched.values != slot.values {
                return Err(Error::MismatchedQuantTable(comp.quant_tbl_no));
            }
        }
    }

    if let Some(jfif) = headers.jfif {
        if jfif.major_version == 1 {
            dst.jfif.major_version = jfif.major_version;
            dst.jfif.minor_version = jfif.minor_version;
        }
        dst.jfif.density_unit = jfif.density_unit;
        dst.jfif.x_density = jfif.x_density;
        dst.jfif.y_density = jfif.y_density;
    }
    debug!(
        "copied {}x{} {:?} frame with {n} components",
        dst.image_width, dst.image_height, dst.jpeg_color_space
    );
    Ok(())
}

impl CodecSession for CompressContext {
    fn error_reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    fn error_reporter_mut(&mut self) -> &mut ErrorReporter {
        &mut self.reporter
    }

    fn set_progress_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.progress.set_monitor(monitor);
    }

    fn abort(&mut self) {
        self.state = CompressState::Start;
    }
}
