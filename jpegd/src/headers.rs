// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

pub mod markers;
pub mod tables;

use num_derive::FromPrimitive;

use crate::{DCTSIZE2, NUM_HUFF_TBLS, NUM_QUANT_TBLS};
use tables::{HuffmanTable, QuantTable, TableClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
pub enum ColorSpace {
    #[default]
    Unknown = 0,
    Grayscale = 1,
    Rgb = 2,
    YCbCr = 3,
    Cmyk = 4,
    Ycck = 5,
}

impl ColorSpace {
    /// Number of channels the color space implies, if fixed.
    pub fn num_components(self) -> Option<usize> {
        match self {
            ColorSpace::Grayscale => Some(1),
            ColorSpace::Rgb | ColorSpace::YCbCr => Some(3),
            ColorSpace::Cmyk | ColorSpace::Ycck => Some(4),
            ColorSpace::Unknown => None,
        }
    }
}

/// Contents of an APP0 JFIF marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JfifInfo {
    pub major_version: u8,
    pub minor_version: u8,
    pub density_unit: u8,
    pub x_density: u16,
    pub y_density: u16,
}

/// Per-component frame data plus the geometry derived from it.
#[derive(Debug, Clone, Default)]
pub struct ComponentInfo {
    pub id: u8,
    pub index: usize,
    pub h_samp_factor: usize,
    pub v_samp_factor: usize,
    pub quant_tbl_no: usize,
    pub dc_tbl_no: usize,
    pub ac_tbl_no: usize,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    /// Side of the inverse DCT output for this component (1, 2, 4 or 8).
    pub dct_scaled_size: usize,
    pub downsampled_width: usize,
    pub downsampled_height: usize,
    /// Cleared when the output color space ignores this component.
    pub component_needed: bool,
    pub mcu_width: usize,
    pub mcu_height: usize,
    pub mcu_blocks: usize,
    pub mcu_sample_width: usize,
    pub last_col_width: usize,
    pub last_row_height: usize,
    /// Copy of the quantization table taken when the component first
    /// appears in a scan.
    pub quant_table: Option<QuantTable>,
}

/// Parameters of the scan currently being decoded.
#[derive(Debug, Clone, Default)]
pub struct ScanInfo {
    /// Indices into `Headers::components`.
    pub components: Vec<usize>,
    pub ss: u8,
    pub se: u8,
    pub ah: u8,
    pub al: u8,
    pub mcus_per_row: usize,
    pub mcu_rows_in_scan: usize,
    pub blocks_in_mcu: usize,
    /// For each block of an MCU, its position in `components`.
    pub mcu_membership: Vec<usize>,
}

/// Everything the marker reader learns about a datastream.
#[derive(Debug, Default)]
pub struct Headers {
    pub quant_tables: [Option<QuantTable>; NUM_QUANT_TBLS],
    pub dc_huff_tables: [Option<HuffmanTable>; NUM_HUFF_TBLS],
    pub ac_huff_tables: [Option<HuffmanTable>; NUM_HUFF_TBLS],
    pub image_width: u32,
    pub image_height: u32,
    pub data_precision: u8,
    pub jpeg_color_space: ColorSpace,
    pub components: Vec<ComponentInfo>,
    pub progressive_mode: bool,
    pub arith_code: bool,
    pub restart_interval: u16,
    pub jfif: Option<JfifInfo>,
    pub adobe_transform: Option<u8>,
    pub scan: ScanInfo,
    /// Progressive only: current known precision of every coefficient,
    /// -1 until a scan covers it.
    pub coef_bits: Vec<[i32; DCTSIZE2]>,
    pub max_h_samp_factor: usize,
    pub max_v_samp_factor: usize,
    pub min_dct_scaled_size: usize,
    pub total_imcu_rows: usize,
    pub input_scan_number: u32,
}

impl Headers {
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn huffman_table(&self, class: TableClass, slot: usize) -> Option<&HuffmanTable> {
        let tables = match class {
            TableClass::Dc => &self.dc_huff_tables,
            TableClass::Ac => &self.ac_huff_tables,
        };
        tables.get(slot)?.as_ref()
    }

    pub(crate) fn huffman_table_mut(
        &mut self,
        class: TableClass,
        slot: usize,
    ) -> Option<&mut Option<HuffmanTable>> {
        match class {
            TableClass::Dc => self.dc_huff_tables.get_mut(slot),
            TableClass::Ac => self.ac_huff_tables.get_mut(slot),
        }
    }

    /// Forgets per-image data. Tables survive for abbreviated streams.
    pub(crate) fn reset_image(&mut self) {
        self.components.clear();
        self.scan = ScanInfo::default();
        self.coef_bits.clear();
        self.input_scan_number = 0;
    }

    /// Resets the per-datastream hints found between SOI and SOF.
    pub(crate) fn reset_on_soi(&mut self) {
        self.restart_interval = 0;
        self.jfif = None;
        self.adobe_transform = None;
        self.jpeg_color_space = ColorSpace::Unknown;
        self.progressive_mode = false;
        self.arith_code = false;
    }

    /// Number of sample rows of component `c` in one iMCU row, after scaling.
    pub fn imcu_sample_rows(&self, c: usize) -> usize {
        let comp = &self.components[c];
        comp.v_samp_factor * comp.dct_scaled_size
    }

    /// Number of output rows produced per iMCU row.
    pub fn imcu_output_rows(&self) -> usize {
        self.max_v_samp_factor * self.min_dct_scaled_size
    }
}
