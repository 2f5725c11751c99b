// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    DCTSIZE, MAX_BLOCKS_IN_MCU, MAX_COMPONENTS, MAX_COMPS_IN_SCAN, MAX_DIMENSION, MAX_SAMP_FACTOR,
    api::JpegSource,
    coefficients::CoefController,
    entropy_coding::EntropyDecoder,
    error::{Error, ErrorReporter, Result},
    headers::Headers,
    input_buffer::{InputBuffer, InputSource},
    marker_reader::{MarkerReader, MarkerStatus},
    util::{div_round_up, tracing_wrappers::*},
};

/// Outcome of one unit of input work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// The source has no more bytes right now.
    Suspended,
    /// A new scan header was read.
    ReachedSos,
    /// The end of the datastream was reached.
    ReachedEoi,
    /// An iMCU row of the current scan was completed.
    RowCompleted,
    /// The last iMCU row of the current scan was completed.
    ScanCompleted,
}

/// Feeds the input side one scan at a time: markers between scans, MCUs
/// within them.
pub(crate) struct InputController {
    pub buffer: InputBuffer,
    pub markers: MarkerReader,
    pub coef: CoefController,
    entropy: EntropyDecoder,
    pub has_multiple_scans: bool,
    pub eoi_reached: bool,
    inheaders: bool,
    /// Set between start and finish of a scan's input pass.
    in_scan: bool,
}

impl Default for InputController {
    fn default() -> Self {
        Self::new()
    }
}

impl InputController {
    pub fn new() -> Self {
        Self {
            buffer: InputBuffer::default(),
            markers: MarkerReader::new(),
            coef: CoefController::new(),
            entropy: EntropyDecoder::new(),
            has_multiple_scans: false,
            eoi_reached: false,
            inheaders: true,
            in_scan: false,
        }
    }

    /// Prepares for a new datastream.
    pub fn reset(&mut self, headers: &mut Headers, reporter: &mut ErrorReporter) {
        self.has_multiple_scans = false;
        self.eoi_reached = false;
        self.inheaders = true;
        self.in_scan = false;
        self.markers.reset();
        self.coef.release();
        headers.reset_image();
        reporter.reset();
    }

    pub fn consume_input(
        &mut self,
        headers: &mut Headers,
        source: &mut dyn JpegSource,
        reporter: &mut ErrorReporter,
    ) -> Result<InputStatus> {
        if self.in_scan {
            let mut src = InputSource {
                buffer: &mut self.buffer,
                source,
                reporter,
            };
            let status =
                self.coef
                    .consume_data(&mut src, &mut self.markers, &mut self.entropy, headers)?;
            if status == InputStatus::ScanCompleted {
                self.finish_input_pass();
            }
            return Ok(status);
        }
        self.consume_markers(headers, source, reporter)
    }

    fn consume_markers(
        &mut self,
        headers: &mut Headers,
        source: &mut dyn JpegSource,
        reporter: &mut ErrorReporter,
    ) -> Result<InputStatus> {
        if self.eoi_reached {
            return Ok(InputStatus::ReachedEoi);
        }
        let status = {
            let mut src = InputSource {
                buffer: &mut self.buffer,
                source,
                reporter: &mut *reporter,
            };
            self.markers.read_markers(&mut src, headers)?
        };
        match status {
            MarkerStatus::Suspended => Ok(InputStatus::Suspended),
            MarkerStatus::ReachedSos => {
                if self.inheaders {
                    self.initial_setup(headers)?;
                    self.inheaders = false;
                    // The first scan's input pass starts once the output
                    // side has been set up.
                } else {
                    if !self.has_multiple_scans {
                        return Err(Error::EoiExpected);
                    }
                    self.start_input_pass(headers, reporter)?;
                }
                Ok(InputStatus::ReachedSos)
            }
            MarkerStatus::ReachedEoi => {
                self.eoi_reached = true;
                if self.inheaders && self.markers.saw_sof() {
                    return Err(Error::SofNoSos);
                }
                debug!("EOI after {} scans", headers.input_scan_number);
                Ok(InputStatus::ReachedEoi)
            }
        }
    }

    /// Validates the frame and computes the geometry every later stage uses.
    fn initial_setup(&mut self, headers: &mut Headers) -> Result<()> {
        if headers.image_width > MAX_DIMENSION || headers.image_height > MAX_DIMENSION {
            return Err(Error::ImageTooBig(headers.image_width, headers.image_height));
        }
        if headers.image_width == 0 || headers.image_height == 0 || headers.components.is_empty() {
            return Err(Error::EmptyImage);
        }
        if headers.data_precision != 8 {
            return Err(Error::BadPrecision(headers.data_precision));
        }
        if headers.num_components() > MAX_COMPONENTS {
            return Err(Error::ComponentCount(headers.num_components(), MAX_COMPONENTS));
        }

        headers.max_h_samp_factor = 1;
        headers.max_v_samp_factor = 1;
        for comp in &headers.components {
            for factor in [comp.h_samp_factor, comp.v_samp_factor] {
                if !(1..=MAX_SAMP_FACTOR).contains(&factor) {
                    return Err(Error::BadSampling(factor, MAX_SAMP_FACTOR));
                }
            }
            headers.max_h_samp_factor = headers.max_h_samp_factor.max(comp.h_samp_factor);
            headers.max_v_samp_factor = headers.max_v_samp_factor.max(comp.v_samp_factor);
        }

        headers.min_dct_scaled_size = DCTSIZE;
        let (width, height) = (
            headers.image_width as usize,
            headers.image_height as usize,
        );
        let (max_h, max_v) = (headers.max_h_samp_factor, headers.max_v_samp_factor);
        for comp in headers.components.iter_mut() {
            comp.dct_scaled_size = DCTSIZE;
            comp.width_in_blocks = div_round_up(width * comp.h_samp_factor, max_h * DCTSIZE);
            comp.height_in_blocks = div_round_up(height * comp.v_samp_factor, max_v * DCTSIZE);
            comp.downsampled_width = div_round_up(width * comp.h_samp_factor, max_h);
            comp.downsampled_height = div_round_up(height * comp.v_samp_factor, max_v);
            comp.component_needed = true;
            comp.quant_table = None;
        }
        headers.total_imcu_rows = div_round_up(height, max_v * DCTSIZE);

        self.has_multiple_scans =
            headers.scan.components.len() < headers.num_components() || headers.progressive_mode;
        if headers.progressive_mode {
            headers.coef_bits = vec![[-1; 64]; headers.num_components()];
        }
        debug!(
            "frame {width}x{height}, max sampling {max_h}x{max_v}, {} iMCU rows, multiple scans: {}",
            headers.total_imcu_rows, self.has_multiple_scans
        );
        Ok(())
    }

    /// Sets up MCU geometry, quantization tables and the entropy decoder for
    /// the scan whose header was just read.
    pub fn start_input_pass(
        &mut self,
        headers: &mut Headers,
        reporter: &mut ErrorReporter,
    ) -> Result<()> {
        per_scan_setup(headers)?;
        latch_quant_tables(headers)?;
        self.entropy.start_pass(headers, reporter)?;
        self.coef.start_input_pass(headers);
        self.in_scan = true;
        Ok(())
    }

    pub fn finish_input_pass(&mut self) {
        self.in_scan = false;
    }

    pub fn inheaders(&self) -> bool {
        self.inheaders
    }

    /// Gives unread bytes back to the source at the end of a datastream.
    pub fn term_source(&mut self, source: &mut dyn JpegSource) -> Result<()> {
        self.buffer.term(source)
    }
}

fn per_scan_setup(headers: &mut Headers) -> Result<()> {
    let n = headers.scan.components.len();
    let mut membership = Vec::with_capacity(MAX_BLOCKS_IN_MCU);
    if n == 1 {
        let comp = &mut headers.components[headers.scan.components[0]];
        comp.mcu_width = 1;
        comp.mcu_height = 1;
        comp.mcu_blocks = 1;
        comp.mcu_sample_width = comp.dct_scaled_size;
        comp.last_col_width = 1;
        comp.last_row_height = match comp.height_in_blocks % comp.v_samp_factor {
            0 => comp.v_samp_factor,
            rows => rows,
        };
        headers.scan.mcus_per_row = comp.width_in_blocks;
        headers.scan.mcu_rows_in_scan = comp.height_in_blocks;
        membership.push(0);
    } else {
        if n == 0 || n > MAX_COMPS_IN_SCAN {
            return Err(Error::ComponentCount(n, MAX_COMPS_IN_SCAN));
        }
        let (max_h, max_v) = (headers.max_h_samp_factor, headers.max_v_samp_factor);
        headers.scan.mcus_per_row =
            div_round_up(headers.image_width as usize, max_h * DCTSIZE);
        headers.scan.mcu_rows_in_scan =
            div_round_up(headers.image_height as usize, max_v * DCTSIZE);
        for (pos, &ci) in headers.scan.components.iter().enumerate() {
            let comp = &mut headers.components[ci];
            comp.mcu_width = comp.h_samp_factor;
            comp.mcu_height = comp.v_samp_factor;
            comp.mcu_blocks = comp.mcu_width * comp.mcu_height;
            comp.mcu_sample_width = comp.mcu_width * comp.dct_scaled_size;
            comp.last_col_width = match comp.width_in_blocks % comp.mcu_width {
                0 => comp.mcu_width,
                cols => cols,
            };
            comp.last_row_height = match comp.height_in_blocks % comp.mcu_height {
                0 => comp.mcu_height,
                rows => rows,
            };
            if membership.len() + comp.mcu_blocks > MAX_BLOCKS_IN_MCU {
                return Err(Error::BadMcuSize(membership.len() + comp.mcu_blocks));
            }
            membership.extend(std::iter::repeat_n(pos, comp.mcu_blocks));
        }
    }
    headers.scan.blocks_in_mcu = membership.len();
    headers.scan.mcu_membership = membership;
    Ok(())
}

/// Copies each scan component's quantization table the first time the
/// component appears, so later DQT segments cannot change it.
fn latch_quant_tables(headers: &mut Headers) -> Result<()> {
    for &ci in &headers.scan.components {
        let comp = &mut headers.components[ci];
        if comp.quant_table.is_some() {
            continue;
        }
        let slot = comp.quant_tbl_no;
        let table = headers
            .quant_tables
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::NoQuantTable(slot))?;
        table.sent_table = true;
        comp.quant_table = Some(table.clone());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::headers::{ComponentInfo, ScanInfo, tables::QuantTable};

    fn frame(width: u32, height: u32, sampling: &[(usize, usize)]) -> Headers {
        Headers {
            image_width: width,
            image_height: height,
            data_precision: 8,
            components: sampling
                .iter()
                .enumerate()
                .map(|(index, &(h, v))| ComponentInfo {
                    index,
                    id: index as u8 + 1,
                    h_samp_factor: h,
                    v_samp_factor: v,
                    ..Default::default()
                })
                .collect(),
            scan: ScanInfo {
                components: (0..sampling.len()).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn geometry_for_420() {
        let mut headers = frame(35, 19, &[(2, 2), (1, 1), (1, 1)]);
        let mut ctl = InputController::new();
        ctl.initial_setup(&mut headers).unwrap();
        assert_eq!(headers.total_imcu_rows, 2);
        let c = &headers.components;
        assert_eq!((c[0].width_in_blocks, c[0].height_in_blocks), (5, 3));
        assert_eq!((c[1].width_in_blocks, c[1].height_in_blocks), (3, 2));
        assert_eq!((c[1].downsampled_width, c[1].downsampled_height), (18, 10));
        assert!(!ctl.has_multiple_scans);

        per_scan_setup(&mut headers).unwrap();
        assert_eq!(headers.scan.mcus_per_row, 3);
        assert_eq!(headers.scan.blocks_in_mcu, 6);
        assert_eq!(headers.scan.mcu_membership, vec![0, 0, 0, 0, 1, 2]);
        assert_eq!(headers.components[0].last_col_width, 1);
        assert_eq!(headers.components[0].last_row_height, 1);
    }

    #[test]
    fn single_component_scan_geometry() {
        let mut headers = frame(35, 19, &[(2, 2), (1, 1), (1, 1)]);
        headers.scan.components = vec![0];
        let mut ctl = InputController::new();
        ctl.initial_setup(&mut headers).unwrap();
        assert!(ctl.has_multiple_scans);
        per_scan_setup(&mut headers).unwrap();
        assert_eq!(headers.scan.mcus_per_row, 5);
        assert_eq!(headers.scan.mcu_rows_in_scan, 3);
        assert_eq!(headers.scan.mcu_membership, vec![0]);
        assert_eq!(headers.components[0].last_row_height, 1);
    }

    #[test]
    fn frame_validation() {
        let mut ctl = InputController::new();
        let mut headers = frame(70000, 8, &[(1, 1)]);
        let err = ctl.initial_setup(&mut headers).unwrap_err();
        assert!(matches!(err, Error::ImageTooBig(70000, 8)));
        assert_eq!(
            err.to_string(),
            "Maximum supported image dimension is 65500 pixels, got 70000x8"
        );
        let mut headers = frame(8, 8, &[(1, 1)]);
        headers.data_precision = 12;
        assert!(matches!(
            ctl.initial_setup(&mut headers),
            Err(Error::BadPrecision(12))
        ));
        let mut headers = frame(8, 8, &[(5, 1)]);
        assert!(matches!(
            ctl.initial_setup(&mut headers),
            Err(Error::BadSampling(5, _))
        ));
        let mut headers = frame(8, 8, &[(1, 1); 11]);
        assert!(matches!(
            ctl.initial_setup(&mut headers),
            Err(Error::ComponentCount(11, MAX_COMPONENTS))
        ));
    }

    #[test]
    fn oversized_mcu_is_rejected() {
        let mut headers = frame(64, 64, &[(4, 2), (2, 2), (1, 1)]);
        let mut ctl = InputController::new();
        ctl.initial_setup(&mut headers).unwrap();
        assert!(matches!(
            per_scan_setup(&mut headers),
            Err(Error::BadMcuSize(12))
        ));
    }

    #[test]
    fn quant_tables_latch_once() {
        let mut headers = frame(8, 8, &[(1, 1)]);
        headers.quant_tables[0] = Some(QuantTable::new([3; 64]));
        latch_quant_tables(&mut headers).unwrap();
        headers.quant_tables[0] = Some(QuantTable::new([9; 64]));
        latch_quant_tables(&mut headers).unwrap();
        let latched = headers.components[0].quant_table.as_ref().unwrap();
        assert_eq!(latched.values[0], 3);

        headers.components[0].quant_table = None;
        headers.components[0].quant_tbl_no = 2;
        assert!(matches!(
            latch_quant_tables(&mut headers),
            Err(Error::NoQuantTable(2))
        ));
    }
}
