// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Coefficient controller: moves MCUs from the entropy decoder into the
//! full-image coefficient arrays, and iMCU rows from there through the
//! inverse DCT.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    DCTSIZE2, MAX_BLOCKS_IN_MCU,
    entropy_coding::EntropyDecoder,
    error::{Error, Result},
    headers::{ComponentInfo, Headers},
    input_buffer::InputSource,
    input_controller::InputStatus,
    marker_reader::MarkerReader,
    output::idct::InverseDct,
    util::{round_up, tracing_wrappers::*},
    virtual_array::{Block, VirtualBlockArray},
};

/// Samples of one component for one iMCU row.
#[derive(Debug, Clone, Default)]
pub(crate) struct SampleRows {
    pub stride: usize,
    pub rows: usize,
    pub data: Vec<u8>,
}

impl SampleRows {
    pub fn new(stride: usize, rows: usize) -> Result<Self> {
        let len = stride.checked_mul(rows).ok_or(Error::ArithmeticOverflow)?;
        let mut data = vec![];
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self { stride, rows, data })
    }

    /// Buffer sized for one iMCU row of `comp`.
    pub fn for_component(comp: &ComponentInfo, blocks_per_row: usize) -> Result<Self> {
        Self::new(
            blocks_per_row * comp.dct_scaled_size,
            comp.v_samp_factor * comp.dct_scaled_size,
        )
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.stride..(y + 1) * self.stride]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.stride..(y + 1) * self.stride]
    }
}

pub(crate) struct CoefController {
    arrays: Vec<VirtualBlockArray>,
    /// Resume point within the current iMCU row.
    mcu_ctr: usize,
    mcu_vert_offset: usize,
    mcu_rows_per_imcu_row: usize,
    pub input_imcu_row: usize,
    pub output_imcu_row: usize,
    mcu: [Block; MAX_BLOCKS_IN_MCU],
    idct: InverseDct,
}

impl Default for CoefController {
    fn default() -> Self {
        Self::new()
    }
}

impl CoefController {
    pub fn new() -> Self {
        Self {
            arrays: vec![],
            mcu_ctr: 0,
            mcu_vert_offset: 0,
            mcu_rows_per_imcu_row: 0,
            input_imcu_row: 0,
            output_imcu_row: 0,
            mcu: [[0; DCTSIZE2]; MAX_BLOCKS_IN_MCU],
            idct: InverseDct::new(),
        }
    }

    /// Allocates one whole-image array per component.
    pub fn allocate(&mut self, headers: &Headers) -> Result<()> {
        self.arrays.clear();
        for comp in &headers.components {
            self.arrays.push(VirtualBlockArray::new(
                round_up(comp.width_in_blocks, comp.h_samp_factor),
                round_up(comp.height_in_blocks, comp.v_samp_factor),
            )?);
        }
        Ok(())
    }

    pub fn release(&mut self) {
        self.arrays = vec![];
    }

    pub fn arrays(&self) -> &[VirtualBlockArray] {
        &self.arrays
    }

    pub fn start_input_pass(&mut self, headers: &Headers) {
        self.input_imcu_row = 0;
        self.start_imcu_row(headers);
    }

    fn start_imcu_row(&mut self, headers: &Headers) {
        let scan = &headers.scan;
        self.mcu_rows_per_imcu_row = if scan.components.len() > 1 {
            1
        } else {
            let comp = &headers.components[scan.components[0]];
            if self.input_imcu_row + 1 < headers.total_imcu_rows {
                comp.v_samp_factor
            } else {
                comp.last_row_height
            }
        };
        self.mcu_ctr = 0;
        self.mcu_vert_offset = 0;
    }

    /// Decodes the rest of the current iMCU row of the current scan.
    pub fn consume_data(
        &mut self,
        src: &mut InputSource,
        markers: &mut MarkerReader,
        entropy: &mut EntropyDecoder,
        headers: &Headers,
    ) -> Result<InputStatus> {
        let scan = &headers.scan;
        for yoffset in self.mcu_vert_offset..self.mcu_rows_per_imcu_row {
            for col in self.mcu_ctr..scan.mcus_per_row {
                let mut blkn = 0;
                for &ci in &scan.components {
                    let comp = &headers.components[ci];
                    let rows = self.arrays[ci]
                        .access(self.input_imcu_row * comp.v_samp_factor, comp.v_samp_factor)?;
                    let start_col = col * comp.mcu_width;
                    for y in 0..comp.mcu_height {
                        let row = &rows.row(y + yoffset)[start_col..start_col + comp.mcu_width];
                        self.mcu[blkn..blkn + comp.mcu_width].copy_from_slice(row);
                        blkn += comp.mcu_width;
                    }
                }

                if !entropy.decode_mcu(src, markers, headers, &mut self.mcu[..blkn])? {
                    self.mcu_vert_offset = yoffset;
                    self.mcu_ctr = col;
                    return Ok(InputStatus::Suspended);
                }

                let mut blkn = 0;
                for &ci in &scan.components {
                    let comp = &headers.components[ci];
                    let mut rows = self.arrays[ci]
                        .access_mut(self.input_imcu_row * comp.v_samp_factor, comp.v_samp_factor)?;
                    let start_col = col * comp.mcu_width;
                    for y in 0..comp.mcu_height {
                        let row = &mut rows.row(y + yoffset)[start_col..start_col + comp.mcu_width];
                        row.copy_from_slice(&self.mcu[blkn..blkn + comp.mcu_width]);
                        blkn += comp.mcu_width;
                    }
                }
            }
            self.mcu_ctr = 0;
        }

        self.input_imcu_row += 1;
        if self.input_imcu_row < headers.total_imcu_rows {
            self.start_imcu_row(headers);
            return Ok(InputStatus::RowCompleted);
        }
        trace!("scan {} complete", headers.input_scan_number);
        Ok(InputStatus::ScanCompleted)
    }

    pub fn start_output_pass(&mut self) {
        self.output_imcu_row = 0;
    }

    /// Runs the inverse DCT over iMCU row `output_imcu_row` of every needed
    /// component and advances to the next row.
    pub fn decompress_row(&mut self, headers: &Headers, out: &mut [SampleRows]) -> Result<()> {
        let row = self.output_imcu_row;
        let total = headers.total_imcu_rows;
        let idct = &self.idct;
        let jobs = headers.components.iter().zip(&self.arrays).zip(out.iter_mut());

        #[cfg(feature = "parallel")]
        jobs.collect::<Vec<_>>()
            .into_par_iter()
            .try_for_each(|((comp, array), out)| idct_component(idct, comp, array, row, total, out))?;
        #[cfg(not(feature = "parallel"))]
        for ((comp, array), out) in jobs {
            idct_component(idct, comp, array, row, total, out)?;
        }

        self.output_imcu_row += 1;
        Ok(())
    }
}

fn idct_component(
    idct: &InverseDct,
    comp: &ComponentInfo,
    array: &VirtualBlockArray,
    imcu_row: usize,
    total_imcu_rows: usize,
    out: &mut SampleRows,
) -> Result<()> {
    if !comp.component_needed {
        return Ok(());
    }
    let block_rows = if imcu_row + 1 < total_imcu_rows {
        comp.v_samp_factor
    } else {
        match comp.height_in_blocks % comp.v_samp_factor {
            0 => comp.v_samp_factor,
            n => n,
        }
    };
    let size = comp.dct_scaled_size;
    let rows = array.access(imcu_row * comp.v_samp_factor, block_rows)?;
    for by in 0..block_rows {
        for (bx, block) in rows.row(by).iter().take(comp.width_in_blocks).enumerate() {
            let offset = by * size * out.stride + bx * size;
            idct.transform(
                block,
                comp.quant_table.as_ref(),
                size,
                &mut out.data[offset..],
                out.stride,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::headers::tables::QuantTable;

    fn component(width_in_blocks: usize, height_in_blocks: usize) -> ComponentInfo {
        ComponentInfo {
            h_samp_factor: 2,
            v_samp_factor: 2,
            width_in_blocks,
            height_in_blocks,
            dct_scaled_size: 8,
            component_needed: true,
            quant_table: Some(QuantTable::new([1; DCTSIZE2])),
            ..Default::default()
        }
    }

    #[test]
    fn arrays_are_padded_to_sampling_factors() {
        let headers = Headers {
            components: vec![component(3, 5)],
            ..Default::default()
        };
        let mut coef = CoefController::new();
        coef.allocate(&headers).unwrap();
        assert_eq!(coef.arrays()[0].blocks_per_row(), 4);
        assert_eq!(coef.arrays()[0].rows(), 6);
    }

    #[test]
    fn last_row_only_transforms_valid_blocks() {
        let headers = Headers {
            components: vec![component(3, 3)],
            total_imcu_rows: 2,
            ..Default::default()
        };
        let mut coef = CoefController::new();
        coef.allocate(&headers).unwrap();
        {
            let mut rows = coef.arrays[0].access_mut(2, 2).unwrap();
            rows.row(0)[0][0] = 80;
            rows.row(1)[0][0] = 80;
        }
        let comp = &headers.components[0];
        let mut out = vec![SampleRows::for_component(comp, 4).unwrap()];
        coef.output_imcu_row = 1;
        coef.decompress_row(&headers, &mut out).unwrap();
        assert_eq!(coef.output_imcu_row, 2);
        // Block row 2 is real, block row 3 is padding and stays untouched.
        assert_eq!(out[0].row(0)[0], 138);
        assert_eq!(out[0].row(8)[0], 0);
        // The fourth block column is padding too.
        assert_eq!(out[0].row(0)[24], 0);
        assert_eq!(out[0].row(0)[16], 128);
    }

    #[test]
    fn unneeded_components_are_skipped() {
        let mut comp = component(1, 1);
        comp.component_needed = false;
        let headers = Headers {
            components: vec![comp],
            total_imcu_rows: 1,
            ..Default::default()
        };
        let mut coef = CoefController::new();
        coef.allocate(&headers).unwrap();
        let mut out = vec![SampleRows::for_component(&headers.components[0], 2).unwrap()];
        coef.decompress_row(&headers, &mut out).unwrap();
        assert!(out[0].data.iter().all(|&s| s == 0));
    }
}
