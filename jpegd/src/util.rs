// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

mod rounding;
pub mod tracing_wrappers;

pub use rounding::*;
