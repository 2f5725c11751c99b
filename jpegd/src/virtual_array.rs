// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::{
    DCTSIZE2,
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// Quantized DCT coefficients of one 8x8 block, in natural order.
pub type Block = [i16; DCTSIZE2];

/// Full-image coefficient storage for one component.
///
/// Rows are block rows; every row holds `blocks_per_row` blocks. All rows
/// are materialized up front and start out zeroed.
pub struct VirtualBlockArray {
    blocks_per_row: usize,
    rows: usize,
    data: Vec<Block>,
}

impl Debug for VirtualBlockArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blocks {}x{}", self.blocks_per_row, self.rows)
    }
}

/// A window of consecutive block rows.
#[derive(Clone, Copy)]
pub struct BlockRows<'a> {
    blocks_per_row: usize,
    data: &'a [Block],
}

pub struct BlockRowsMut<'a> {
    blocks_per_row: usize,
    data: &'a mut [Block],
}

impl VirtualBlockArray {
    pub fn new(blocks_per_row: usize, rows: usize) -> Result<VirtualBlockArray> {
        let total = blocks_per_row
            .checked_mul(rows)
            .ok_or(Error::ArithmeticOverflow)?;
        debug!("allocating {blocks_per_row}x{rows} coefficient blocks");
        let mut data = vec![];
        data.try_reserve_exact(total)?;
        data.resize(total, [0; DCTSIZE2]);
        Ok(VirtualBlockArray {
            blocks_per_row,
            rows,
            data,
        })
    }

    pub fn blocks_per_row(&self) -> usize {
        self.blocks_per_row
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn check_window(&self, start: usize, count: usize) -> Result<std::ops::Range<usize>> {
        match start.checked_add(count) {
            Some(end) if end <= self.rows => {
                Ok(start * self.blocks_per_row..end * self.blocks_per_row)
            }
            _ => Err(Error::BadVirtualAccess {
                start,
                end: start.saturating_add(count),
                rows: self.rows,
            }),
        }
    }

    /// Returns rows `start..start + count`, failing if the window leaves the array.
    pub fn access(&self, start: usize, count: usize) -> Result<BlockRows<'_>> {
        let range = self.check_window(start, count)?;
        Ok(BlockRows {
            blocks_per_row: self.blocks_per_row,
            data: &self.data[range],
        })
    }

    pub fn access_mut(&mut self, start: usize, count: usize) -> Result<BlockRowsMut<'_>> {
        let range = self.check_window(start, count)?;
        Ok(BlockRowsMut {
            blocks_per_row: self.blocks_per_row,
            data: &mut self.data[range],
        })
    }
}

impl<'a> BlockRows<'a> {
    pub fn num_rows(&self) -> usize {
        self.data.len().checked_div(self.blocks_per_row).unwrap_or(0)
    }

    pub fn row(&self, row: usize) -> &'a [Block] {
        let start = row * self.blocks_per_row;
        &self.data[start..start + self.blocks_per_row]
    }
}

impl BlockRowsMut<'_> {
    pub fn num_rows(&self) -> usize {
        self.data.len().checked_div(self.blocks_per_row).unwrap_or(0)
    }

    pub fn row(&mut self, row: usize) -> &mut [Block] {
        let start = row * self.blocks_per_row;
        &mut self.data[start..start + self.blocks_per_row]
    }
}
