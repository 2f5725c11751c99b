// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![deny(unsafe_code)]
pub mod api;
pub mod coefficients;
pub mod entropy_coding;
pub mod error;
pub mod headers;
pub mod input_buffer;
pub mod input_controller;
pub mod marker_reader;
pub mod master;
pub mod output;
pub mod session;
pub mod transcode;
pub mod util;
pub mod virtual_array;

/// Side of a DCT block.
pub const DCTSIZE: usize = 8;
/// Number of coefficients in a DCT block.
pub const DCTSIZE2: usize = DCTSIZE * DCTSIZE;
pub const NUM_QUANT_TBLS: usize = 4;
pub const NUM_HUFF_TBLS: usize = 4;
pub const MAX_COMPONENTS: usize = 10;
pub const MAX_COMPS_IN_SCAN: usize = 4;
pub const MAX_SAMP_FACTOR: usize = 4;
pub const MAX_BLOCKS_IN_MCU: usize = 10;
pub const MAX_DIMENSION: u32 = 65500;
