// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{
    HeaderKind, JpegSource, OutputParams, ProcessingResult,
    progress::{Progress, ProgressMonitor, ProgressTracker},
};
use crate::{
    error::{Error, ErrorReporter, Result, Warning},
    headers::Headers,
    input_controller::{InputController, InputStatus},
    marker_reader::{MarkerProcessor, SavedMarker},
    master::{self, Master, OutputInfo},
    output::{check_raw_buffers, copy_raw_rows},
    session::{CodecSession, DecompressState},
    util::tracing_wrappers::*,
    virtual_array::VirtualBlockArray,
};

/// A decompression session reading JPEG datastreams from `S`.
///
/// Every operation that needs bytes may return
/// [`ProcessingResult::NeedsMoreInput`]; supply more data to the source and
/// call the same operation again. Calls made in a state that does not allow
/// them fail with [`Error::BadState`].
pub struct Decompressor<S: JpegSource> {
    source: S,
    state: DecompressState,
    headers: Headers,
    input: InputController,
    params: OutputParams,
    output: OutputInfo,
    master: Option<Master>,
    reporter: ErrorReporter,
    progress: ProgressTracker,
    output_scanline: usize,
    output_scan_number: u32,
}

impl<S: JpegSource> Decompressor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: DecompressState::Start,
            headers: Headers::default(),
            input: InputController::new(),
            params: OutputParams::default(),
            output: OutputInfo::default(),
            master: None,
            reporter: ErrorReporter::new(),
            progress: ProgressTracker::default(),
            output_scanline: 0,
            output_scan_number: 0,
        }
    }

    pub fn state(&self) -> DecompressState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Frame, table and scan data read so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn params(&self) -> &OutputParams {
        &self.params
    }

    /// Decompression parameters, adjustable between `read_header` and
    /// `start_decompress`.
    pub fn params_mut(&mut self) -> Result<&mut OutputParams> {
        self.require(&[DecompressState::Ready])?;
        Ok(&mut self.params)
    }

    /// Output dimensions as of the last computation.
    pub fn output_info(&self) -> &OutputInfo {
        &self.output
    }

    pub fn output_scanline(&self) -> usize {
        self.output_scanline
    }

    pub fn input_scan_number(&self) -> u32 {
        self.headers.input_scan_number
    }

    pub fn output_scan_number(&self) -> u32 {
        self.output_scan_number
    }

    pub fn input_imcu_row(&self) -> usize {
        self.input.coef.input_imcu_row
    }

    pub fn output_imcu_row(&self) -> usize {
        self.input.coef.output_imcu_row
    }

    pub fn progress(&self) -> &Progress {
        &self.progress.progress
    }

    /// Palette of the current output pass when quantizing colors.
    pub fn colormap(&self) -> Option<&[Vec<u8>]> {
        let quantizer = self.master.as_ref()?.pipeline.as_ref()?.quantizer()?;
        Some(quantizer.colormap())
    }

    pub fn saved_markers(&self) -> &[SavedMarker] {
        self.input.markers.saved_markers()
    }

    /// Keeps APPn/COM markers with code `marker`, truncated to
    /// `length_limit` bytes, for `saved_markers`.
    pub fn save_markers(&mut self, marker: u8, length_limit: usize) -> Result<()> {
        self.input.markers.save_markers(marker, length_limit)
    }

    pub fn set_marker_processor(
        &mut self,
        marker: u8,
        processor: Option<Box<dyn MarkerProcessor>>,
    ) -> Result<()> {
        self.input.markers.set_processor(marker, processor)
    }

    fn require(&self, states: &[DecompressState]) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::BadState(self.state))
        }
    }

    fn consume(&mut self) -> Result<InputStatus> {
        let status =
            self.input
                .consume_input(&mut self.headers, &mut self.source, &mut self.reporter)?;
        if status == InputStatus::ReachedEoi && !self.input.inheaders() {
            master::clamp_output_scan(&self.headers, &mut self.output_scan_number);
        }
        Ok(status)
    }

    /// Absorbs input without producing output: markers in the header,
    /// otherwise one iMCU row or one marker segment sequence at a time.
    pub fn consume_input(&mut self) -> Result<InputStatus> {
        use DecompressState::*;
        match self.state {
            Start | InHeader => {
                if self.state == Start {
                    self.input.reset(&mut self.headers, &mut self.reporter);
                    self.input.buffer.init();
                    self.output_scanline = 0;
                    self.output_scan_number = 0;
                    self.progress.progress = Progress::default();
                    self.state = InHeader;
                }
                let status = self.consume()?;
                if status == InputStatus::ReachedSos {
                    self.params =
                        master::default_decompress_parms(&mut self.headers, &mut self.reporter);
                    self.state = Ready;
                }
                Ok(status)
            }
            Ready => Ok(InputStatus::ReachedSos),
            Preload | Prescan | Scanning | RawOk | BufImage | BufPost | Stopping => self.consume(),
            RdCoefs => Err(Error::BadState(self.state)),
        }
    }

    /// Reads markers up to the first scan header. With `require_image`
    /// false, a datastream holding only tables completes as
    /// [`HeaderKind::TablesOnly`] and the session is reset for the next one.
    pub fn read_header(&mut self, require_image: bool) -> Result<ProcessingResult<HeaderKind>> {
        self.require(&[DecompressState::Start, DecompressState::InHeader])?;
        match self.consume_input()? {
            InputStatus::ReachedSos => Ok(ProcessingResult::Complete {
                result: HeaderKind::Image,
            }),
            InputStatus::ReachedEoi => {
                if require_image {
                    return Err(Error::NoImage);
                }
                debug!("tables-only datastream");
                self.abort();
                Ok(ProcessingResult::Complete {
                    result: HeaderKind::TablesOnly,
                })
            }
            _ => Ok(ProcessingResult::NeedsMoreInput),
        }
    }

    /// Computes the output dimensions for the current parameters.
    pub fn calc_output_dimensions(&mut self) -> Result<OutputInfo> {
        self.require(&[DecompressState::Ready])?;
        self.output = master::calc_output_dimensions(&mut self.headers, &self.params)?;
        Ok(self.output)
    }

    pub fn has_multiple_scans(&self) -> Result<bool> {
        if self.state < DecompressState::Ready {
            return Err(Error::BadState(self.state));
        }
        Ok(self.input.has_multiple_scans)
    }

    /// Whether EOI has been read.
    pub fn input_complete(&self) -> bool {
        self.input.eoi_reached
    }

    fn start_first_scan(&mut self) -> Result<()> {
        self.input.coef.allocate(&self.headers)?;
        self.input
            .start_input_pass(&mut self.headers, &mut self.reporter)
    }

    /// Absorbs input until `consume` reports EOI, counting work for the
    /// progress monitor.
    fn absorb_all_input(&mut self) -> Result<bool> {
        loop {
            self.progress.notify();
            match self.consume()? {
                InputStatus::Suspended => return Ok(false),
                InputStatus::ReachedEoi => return Ok(true),
                InputStatus::RowCompleted | InputStatus::ReachedSos => {
                    let p = &mut self.progress.progress;
                    p.pass_counter += 1;
                    if p.pass_counter >= p.pass_limit {
                        // More scans than estimated.
                        p.pass_limit += self.headers.total_imcu_rows as u64;
                    }
                }
                InputStatus::ScanCompleted => {}
            }
        }
    }

    /// Selects the output modules and, for multi-scan files in normal
    /// mode, absorbs the whole datastream before any output.
    pub fn start_decompress(&mut self) -> Result<ProcessingResult<()>> {
        use DecompressState::*;
        if self.state == Ready {
            let master = Master::new(
                &mut self.headers,
                &self.params,
                self.input.has_multiple_scans,
                &mut self.progress.progress,
            )?;
            self.output = master.info;
            self.master = Some(master);
            self.start_first_scan()?;
            if self.params.buffered_image {
                self.state = BufImage;
                return Ok(ProcessingResult::Complete { result: () });
            }
            self.state = Preload;
        }
        if self.state == Preload {
            if self.input.has_multiple_scans && !self.absorb_all_input()? {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
            self.output_scan_number = self.headers.input_scan_number;
        } else if self.state != Prescan {
            return Err(Error::BadState(self.state));
        }
        self.output_pass_setup()
    }

    /// Starts an output pass and runs any dummy passes it needs.
    fn output_pass_setup(&mut self) -> Result<ProcessingResult<()>> {
        let master = self.master.as_mut().ok_or(Error::BadState(self.state))?;
        if self.state != DecompressState::Prescan {
            master.prepare_for_output_pass(
                &mut self.input,
                &mut self.progress.progress,
                self.params.buffered_image,
            );
            self.output_scanline = 0;
            self.state = DecompressState::Prescan;
        }
        while self.master.as_ref().is_some_and(|m| m.is_dummy_pass()) {
            let height = self.output.output_height;
            while self.output_scanline < height {
                self.progress
                    .report(self.output_scanline as u64, height as u64);
                let (rows, _) = self.pump_rows(None, height - self.output_scanline)?;
                if rows == 0 {
                    return Ok(ProcessingResult::NeedsMoreInput);
                }
                self.output_scanline += rows;
            }
            let master = self.master.as_mut().ok_or(Error::BadState(self.state))?;
            master.finish_output_pass();
            master.prepare_for_output_pass(
                &mut self.input,
                &mut self.progress.progress,
                self.params.buffered_image,
            );
            self.output_scanline = 0;
        }
        self.state = if self.params.raw_data_out {
            DecompressState::RawOk
        } else {
            DecompressState::Scanning
        };
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Moves up to `max` rows through the output pipeline, decoding iMCU
    /// rows as needed. Returns the rows produced and whether the source
    /// suspended.
    fn pump_rows(&mut self, mut out: Option<&mut [&mut [u8]]>, max: usize) -> Result<(usize, bool)> {
        let pipeline = self
            .master
            .as_mut()
            .and_then(|m| m.pipeline.as_mut())
            .ok_or(Error::BadState(self.state))?;
        let mut done = 0;
        loop {
            let target = out.as_mut().map(|o| &mut o[done..]);
            done += pipeline.run(&self.headers, target, max - done)?;
            if done >= max {
                return Ok((done, false));
            }
            let Some(buffers) = pipeline.pending_input() else {
                return Ok((done, false));
            };
            if !master::decompress_data(
                &mut self.input,
                &mut self.headers,
                &mut self.source,
                &mut self.reporter,
                &mut self.output_scan_number,
                buffers,
            )? {
                return Ok((done, true));
            }
            pipeline.commit_input();
        }
    }

    /// Reads up to `out.len()` scanlines, each at least `output_width *
    /// output_components` bytes. Returns the number of rows written, or
    /// `NeedsMoreInput` if none could be produced yet.
    pub fn read_scanlines(&mut self, out: &mut [&mut [u8]]) -> Result<ProcessingResult<usize>> {
        self.require(&[DecompressState::Scanning])?;
        let height = self.output.output_height;
        if self.output_scanline >= height {
            self.reporter.warn(Warning::TooMuchData);
            return Ok(ProcessingResult::Complete { result: 0 });
        }
        self.progress
            .report(self.output_scanline as u64, height as u64);
        let max = out.len().min(height - self.output_scanline);
        let (rows, suspended) = self.pump_rows(Some(out), max)?;
        self.output_scanline += rows;
        if rows == 0 && suspended {
            return Ok(ProcessingResult::NeedsMoreInput);
        }
        Ok(ProcessingResult::Complete { result: rows })
    }

    /// Reads one iMCU row of downsampled data: for each component,
    /// `v_samp_factor * dct_scaled_size` rows of `width_in_blocks *
    /// dct_scaled_size` samples. Returns the number of output rows the
    /// data corresponds to.
    pub fn read_raw_data(
        &mut self,
        planes: &mut [&mut [&mut [u8]]],
    ) -> Result<ProcessingResult<usize>> {
        self.require(&[DecompressState::RawOk])?;
        let height = self.output.output_height;
        if self.output_scanline >= height {
            self.reporter.warn(Warning::TooMuchData);
            return Ok(ProcessingResult::Complete { result: 0 });
        }
        self.progress
            .report(self.output_scanline as u64, height as u64);
        check_raw_buffers(&self.headers, planes)?;
        let master = self.master.as_mut().ok_or(Error::BadState(self.state))?;
        if !master::decompress_data(
            &mut self.input,
            &mut self.headers,
            &mut self.source,
            &mut self.reporter,
            &mut self.output_scan_number,
            &mut master.raw_rows,
        )? {
            return Ok(ProcessingResult::NeedsMoreInput);
        }
        copy_raw_rows(&self.headers, &master.raw_rows, planes);
        let lines = self.headers.imcu_output_rows();
        self.output_scanline = (self.output_scanline + lines).min(height);
        Ok(ProcessingResult::Complete { result: lines })
    }

    /// Completes decompression: checks all rows were read, then reads to
    /// EOI and resets the session for the next datastream.
    pub fn finish_decompress(&mut self) -> Result<ProcessingResult<()>> {
        use DecompressState::*;
        match self.state {
            Scanning | RawOk if !self.params.buffered_image => {
                if self.output_scanline < self.output.output_height {
                    return Err(Error::TooLittleData(
                        self.output_scanline as u32,
                        self.output.output_height as u32,
                    ));
                }
                if let Some(master) = self.master.as_mut() {
                    master.finish_output_pass();
                }
                self.state = Stopping;
            }
            BufImage => self.state = Stopping,
            Stopping => {}
            _ => return Err(Error::BadState(self.state)),
        }
        while !self.input.eoi_reached {
            if self.consume()? == InputStatus::Suspended {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
        }
        self.input.term_source(&mut self.source)?;
        debug!(
            "datastream finished with {} warnings",
            self.reporter.num_warnings()
        );
        self.abort();
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Buffered-image mode: starts an output pass that shows scan
    /// `scan_number`, clamped to the scans that exist.
    pub fn start_output(&mut self, scan_number: u32) -> Result<ProcessingResult<()>> {
        self.require(&[DecompressState::BufImage, DecompressState::Prescan])?;
        let mut scan = scan_number.max(1);
        if self.input.eoi_reached {
            scan = scan.min(self.headers.input_scan_number);
        }
        self.output_scan_number = scan;
        self.output_pass_setup()
    }

    /// Buffered-image mode: ends the current output pass and reads input
    /// up to the start of the next scan or EOI.
    pub fn finish_output(&mut self) -> Result<ProcessingResult<()>> {
        use DecompressState::*;
        match self.state {
            Scanning | RawOk if self.params.buffered_image => {
                if let Some(master) = self.master.as_mut() {
                    master.finish_output_pass();
                }
                self.state = BufPost;
            }
            BufPost => {}
            _ => return Err(Error::BadState(self.state)),
        }
        while self.headers.input_scan_number <= self.output_scan_number && !self.input.eoi_reached
        {
            if self.consume()? == InputStatus::Suspended {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
        }
        self.state = BufImage;
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Reads the whole datastream into coefficient arrays, one per
    /// component, without producing pixels.
    pub fn read_coefficients(&mut self) -> Result<ProcessingResult<&[VirtualBlockArray]>> {
        use DecompressState::*;
        if self.state == Ready {
            // Always a buffered-image operation.
            self.params.buffered_image = true;
            self.start_first_scan()?;
            let nscans = if self.headers.progressive_mode {
                2 + 3 * self.headers.num_components()
            } else if self.input.has_multiple_scans {
                self.headers.num_components()
            } else {
                1
            };
            self.progress.progress = Progress {
                pass_counter: 0,
                pass_limit: (self.headers.total_imcu_rows * nscans) as u64,
                completed_passes: 0,
                total_passes: 1,
            };
            self.state = RdCoefs;
        }
        if self.state == RdCoefs {
            if !self.absorb_all_input()? {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
            self.state = Stopping;
        }
        if matches!(self.state, Stopping | BufImage) && self.params.buffered_image {
            return Ok(ProcessingResult::Complete {
                result: self.input.coef.arrays(),
            });
        }
        Err(Error::BadState(self.state))
    }
}

impl<S: JpegSource> CodecSession for Decompressor<S> {
    fn error_reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    fn error_reporter_mut(&mut self) -> &mut ErrorReporter {
        &mut self.reporter
    }

    fn set_progress_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.progress.set_monitor(monitor);
    }

    /// Returns to the start state. Tables and bytes already pulled from the
    /// source are kept; saved markers and per-image state are dropped.
    fn abort(&mut self) {
        trace!("abort in state {}", self.state);
        self.state = DecompressState::Start;
        self.master = None;
        self.input.markers.reset();
        self.input.coef.release();
        self.input.finish_input_pass();
    }
}
