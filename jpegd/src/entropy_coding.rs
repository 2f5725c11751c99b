// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Huffman entropy decoding, one MCU at a time.
//!
//! Decoding an MCU either succeeds completely or leaves every piece of
//! decoder state untouched, so a decoder that runs out of input can simply
//! try the same MCU again once more bytes arrive.

mod bit_reader;
mod huffman;
mod progressive;
mod sequential;

use bit_reader::{BitReader, BitState};
use huffman::HuffmanLookup;

use crate::{
    MAX_BLOCKS_IN_MCU, MAX_COMPS_IN_SCAN,
    error::{Error, ErrorReporter, Result, Warning},
    headers::{Headers, ScanInfo, markers::RST0, tables::HuffmanTable, tables::TableClass},
    input_buffer::InputSource,
    marker_reader::{MarkerReader, ResyncAction, resync_action},
    util::tracing_wrappers::*,
    virtual_array::Block,
};

/// State carried from one MCU to the next.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DecodeState {
    /// DC predictor of each component, by position in the scan.
    pub last_dc_val: [i32; MAX_COMPS_IN_SCAN],
    pub eobrun: u32,
}

/// Decoding tables of the current scan, by position in the scan. Only the
/// tables the scan actually uses are present.
#[derive(Debug, Default)]
pub(crate) struct ScanTables {
    pub dc: Vec<HuffmanLookup>,
    pub ac: Vec<HuffmanLookup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

/// Everything a single MCU attempt may change.
#[derive(Clone, Copy)]
struct Progress {
    state: DecodeState,
    restarts_to_go: u32,
    next_restart_num: u8,
}

pub(crate) struct EntropyDecoder {
    kind: ScanKind,
    tables: ScanTables,
    bits: BitState,
    insufficient_data: bool,
    state: DecodeState,
    restart_interval: u32,
    restarts_to_go: u32,
    scratch: [Block; MAX_BLOCKS_IN_MCU],
}

impl Default for EntropyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropyDecoder {
    pub fn new() -> Self {
        Self {
            kind: ScanKind::Sequential,
            tables: ScanTables::default(),
            bits: BitState::default(),
            insufficient_data: false,
            state: DecodeState::default(),
            restart_interval: 0,
            restarts_to_go: 0,
            scratch: [[0; 64]; MAX_BLOCKS_IN_MCU],
        }
    }

    /// Validates the scan parameters and builds its tables.
    pub fn start_pass(&mut self, headers: &mut Headers, reporter: &mut ErrorReporter) -> Result<()> {
        self.kind = if headers.progressive_mode {
            check_progression(headers, reporter)?
        } else {
            let scan = &headers.scan;
            if scan.ss != 0 || scan.se != 63 || scan.ah != 0 || scan.al != 0 {
                reporter.warn(Warning::NotSequential);
            }
            ScanKind::Sequential
        };

        let (need_dc, need_ac) = match self.kind {
            ScanKind::Sequential => (true, true),
            ScanKind::DcFirst => (true, false),
            ScanKind::DcRefine => (false, false),
            ScanKind::AcFirst | ScanKind::AcRefine => (false, true),
        };
        let mut tables = ScanTables::default();
        for i in 0..headers.scan.components.len() {
            let comp = &headers.components[headers.scan.components[i]];
            let (dc_slot, ac_slot) = (comp.dc_tbl_no, comp.ac_tbl_no);
            if need_dc {
                let table = table_or_default(headers, TableClass::Dc, dc_slot)?;
                tables.dc.push(HuffmanLookup::new(table, true)?);
            }
            if need_ac {
                let table = table_or_default(headers, TableClass::Ac, ac_slot)?;
                tables.ac.push(HuffmanLookup::new(table, false)?);
            }
        }
        self.tables = tables;

        self.bits = BitState::default();
        self.insufficient_data = false;
        self.state = DecodeState::default();
        self.restart_interval = headers.restart_interval as u32;
        self.restarts_to_go = self.restart_interval;
        trace!("entropy pass {:?}, restart interval {}", self.kind, self.restart_interval);
        Ok(())
    }

    /// Decodes the next MCU of the scan into `mcu`, which holds
    /// `blocks_in_mcu` blocks. Returns false if more input is needed, in
    /// which case nothing has changed.
    pub fn decode_mcu(
        &mut self,
        src: &mut InputSource,
        markers: &mut MarkerReader,
        headers: &Headers,
        mcu: &mut [Block],
    ) -> Result<bool> {
        let scan = &headers.scan;
        let scratch = &mut self.scratch[..mcu.len()];
        loop {
            match self.kind {
                ScanKind::Sequential => scratch.iter_mut().for_each(|b| *b = [0; 64]),
                _ => scratch.copy_from_slice(mcu),
            }
            let mut progress = Progress {
                state: self.state,
                restarts_to_go: self.restarts_to_go,
                next_restart_num: markers.next_restart_num,
            };
            let mut br = BitReader::new(
                src.data(),
                self.bits,
                markers.unread_marker,
                self.insufficient_data,
            );
            let done = decode_one(
                self.kind,
                &self.tables,
                self.restart_interval,
                &mut br,
                &mut progress,
                scan,
                scratch,
            )
            .is_some();
            if !done {
                drop(br);
                if !src.fill_more()? {
                    return Ok(false);
                }
                continue;
            }

            let consumed = br.bytes_consumed();
            let warnings = std::mem::take(&mut br.warnings);
            self.bits = br.state();
            self.insufficient_data = br.insufficient_data;
            markers.unread_marker = br.unread_marker;
            drop(br);

            src.consume(consumed);
            for warning in warnings {
                src.warn(warning);
            }
            self.state = progress.state;
            self.restarts_to_go = progress.restarts_to_go;
            markers.next_restart_num = progress.next_restart_num;
            mcu.copy_from_slice(scratch);
            return Ok(true);
        }
    }
}

fn table_or_default(headers: &mut Headers, class: TableClass, slot: usize) -> Result<&HuffmanTable> {
    let entry = headers
        .huffman_table_mut(class, slot)
        .ok_or(Error::NoHuffTable(class, slot))?;
    if entry.is_none() {
        // Motion-JPEG streams commonly omit the standard tables.
        let standard = HuffmanTable::standard(class, slot).ok_or(Error::NoHuffTable(class, slot))?;
        debug!("using standard {class:?} table {slot}");
        *entry = Some(standard);
    }
    entry.as_ref().ok_or(Error::NoHuffTable(class, slot))
}

/// Validates a progressive scan and updates the coefficient precision
/// bookkeeping.
fn check_progression(headers: &mut Headers, reporter: &mut ErrorReporter) -> Result<ScanKind> {
    let ScanInfo {
        ss, se, ah, al, ..
    } = headers.scan;
    let is_dc = ss == 0;
    let mut bad = if is_dc {
        se != 0
    } else {
        ss > se || se > 63 || headers.scan.components.len() != 1
    };
    if ah != 0 && al != ah.wrapping_sub(1) {
        bad = true;
    }
    if al > 13 {
        bad = true;
    }
    if bad {
        return Err(Error::BadProgression(ss, se, ah, al));
    }

    for &ci in &headers.scan.components {
        let coef_bits = &mut headers.coef_bits[ci];
        if !is_dc && coef_bits[0] < 0 {
            reporter.warn(Warning::BogusProgression {
                component: ci,
                coefficient: 0,
            });
        }
        for (k, bits) in coef_bits
            .iter_mut()
            .enumerate()
            .take(se as usize + 1)
            .skip(ss as usize)
        {
            if ah as i32 != (*bits).max(0) {
                reporter.warn(Warning::BogusProgression {
                    component: ci,
                    coefficient: k,
                });
            }
            *bits = al as i32;
        }
    }

    Ok(match (is_dc, ah == 0) {
        (true, true) => ScanKind::DcFirst,
        (true, false) => ScanKind::DcRefine,
        (false, true) => ScanKind::AcFirst,
        (false, false) => ScanKind::AcRefine,
    })
}

fn decode_one(
    kind: ScanKind,
    tables: &ScanTables,
    restart_interval: u32,
    br: &mut BitReader,
    progress: &mut Progress,
    scan: &ScanInfo,
    mcu: &mut [Block],
) -> Option<()> {
    if restart_interval != 0 && progress.restarts_to_go == 0 {
        process_restart(br, progress, restart_interval)?;
    }

    // After a premature marker the rest of the segment decodes as zeros,
    // except that refinement bits stay readable as zeros anyway.
    if !br.insufficient_data || kind == ScanKind::DcRefine {
        let state = &mut progress.state;
        match kind {
            ScanKind::Sequential => {
                sequential::decode_mcu(br, state, tables, &scan.mcu_membership, mcu)?
            }
            ScanKind::DcFirst => progressive::decode_dc_first(br, state, tables, scan, mcu)?,
            ScanKind::DcRefine => progressive::decode_dc_refine(br, scan, mcu)?,
            ScanKind::AcFirst => progressive::decode_ac_first(br, state, tables, scan, &mut mcu[0])?,
            ScanKind::AcRefine => {
                progressive::decode_ac_refine(br, state, tables, scan, &mut mcu[0])?
            }
        }
    }

    if restart_interval != 0 {
        progress.restarts_to_go -= 1;
    }
    Some(())
}

/// Reads the expected restart marker, resynchronizing if something else
/// shows up, and resets the predictors.
fn process_restart(br: &mut BitReader, progress: &mut Progress, interval: u32) -> Option<()> {
    let discarded = br.discard_bits();
    let mut marker = match br.unread_marker {
        Some(marker) => marker,
        None => br.next_marker(discarded)?,
    };
    let desired = progress.next_restart_num;
    if marker == RST0 + desired {
        br.unread_marker = None;
    } else {
        br.warnings.push(Warning::MustResync(marker, desired));
        loop {
            match resync_action(marker, desired) {
                ResyncAction::Discard => {
                    br.unread_marker = None;
                    break;
                }
                ResyncAction::Advance => marker = br.next_marker(0)?,
                ResyncAction::Stop => break,
            }
        }
    }
    progress.next_restart_num = (desired + 1) & 7;

    progress.state = DecodeState::default();
    progress.restarts_to_go = interval;
    if br.unread_marker.is_none() {
        br.insufficient_data = false;
    }
    Some(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::{
        api::{IncrementalSource, JpegSource},
        headers::ComponentInfo,
        input_buffer::InputBuffer,
    };

    fn bytes(bits: &str) -> Vec<u8> {
        let mut bits = bits.to_string();
        while bits.len() % 8 != 0 {
            bits.push('1');
        }
        bits.as_bytes()
            .chunks(8)
            .map(|c| c.iter().fold(0u8, |acc, &b| (acc << 1) | (b - b'0')))
            .collect()
    }

    /// One component, DC codes of 4 bits and AC codes of 8 bits, each equal
    /// to the symbol value.
    fn headers(progressive: bool) -> Headers {
        let mut dc_bits = [0u8; 16];
        dc_bits[3] = 12;
        let mut ac_bits = [0u8; 16];
        ac_bits[7] = 255;
        let mut headers = Headers {
            progressive_mode: progressive,
            components: vec![ComponentInfo {
                h_samp_factor: 1,
                v_samp_factor: 1,
                ..Default::default()
            }],
            scan: ScanInfo {
                components: vec![0],
                se: 63,
                blocks_in_mcu: 1,
                mcu_membership: vec![0],
                ..Default::default()
            },
            ..Default::default()
        };
        headers.dc_huff_tables[0] = Some(HuffmanTable::new(
            &dc_bits,
            &(0..12).collect::<Vec<u8>>(),
        ));
        headers.ac_huff_tables[0] = Some(HuffmanTable::new(
            &ac_bits,
            &(0..255).collect::<Vec<u8>>(),
        ));
        if progressive {
            headers.coef_bits = vec![[-1; 64]];
        }
        headers
    }

    struct Harness {
        buffer: InputBuffer,
        reporter: ErrorReporter,
        markers: MarkerReader,
        decoder: EntropyDecoder,
    }

    impl Harness {
        fn new(headers: &mut Headers) -> Self {
            let mut buffer = InputBuffer::default();
            buffer.init();
            let mut reporter = ErrorReporter::new();
            let mut decoder = EntropyDecoder::new();
            decoder.start_pass(headers, &mut reporter).unwrap();
            Self {
                buffer,
                reporter,
                markers: MarkerReader::new(),
                decoder,
            }
        }

        fn decode(
            &mut self,
            source: &mut dyn JpegSource,
            headers: &Headers,
            mcu: &mut [Block],
        ) -> Result<bool> {
            let mut src = InputSource {
                buffer: &mut self.buffer,
                source,
                reporter: &mut self.reporter,
            };
            self.decoder
                .decode_mcu(&mut src, &mut self.markers, headers, mcu)
        }
    }

    #[test]
    fn suspends_then_resumes_mid_mcu() {
        let mut headers = headers(false);
        let mut h = Harness::new(&mut headers);
        // DC category 2 with bits "11", AC symbol 0x01 with bit "0", EOB.
        let data = bytes("0010110000000100000000000");
        let mut source = IncrementalSource::new();
        source.push(&data[..1]);
        let mut mcu = [[7i16; 64]];
        assert!(!h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(mcu[0][0], 7);
        source.push(&data[1..]);
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(mcu[0][0], 3);
        assert_eq!(mcu[0][1], -1);
        assert!(mcu[0][2..].iter().all(|&c| c == 0));
        assert_eq!(h.reporter.num_warnings(), 0);
    }

    #[test]
    fn predictor_resets_at_restart() {
        let mut headers = headers(false);
        headers.restart_interval = 1;
        let mut h = Harness::new(&mut headers);
        // Two MCUs with DC diff +3, separated by RST0.
        let mcu_bits = "00101100000000";
        let mut data = bytes(mcu_bits);
        data.extend([0xff, 0xd0]);
        data.extend(bytes(mcu_bits));
        data.extend([0xff, 0xd9]);
        let mut source: &[u8] = &data;
        let mut mcu = [[0i16; 64]];
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(mcu[0][0], 3);
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(mcu[0][0], 3);
        assert_eq!(h.markers.next_restart_num, 1);
        assert_eq!(h.reporter.num_warnings(), 0);
    }

    #[test]
    fn wrong_restart_number_resyncs() {
        let mut headers = headers(false);
        headers.restart_interval = 1;
        let mut h = Harness::new(&mut headers);
        let mcu_bits = "00101100000000";
        let mut data = bytes(mcu_bits);
        // RST5 where RST0 is expected: discarded and decoding continues.
        data.extend([0xff, 0xd5]);
        data.extend(bytes(mcu_bits));
        data.extend([0xff, 0xd9]);
        let mut source: &[u8] = &data;
        let mut mcu = [[0i16; 64]];
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(mcu[0][0], 3);
        assert_eq!(
            h.reporter.last_warning(),
            Some(&Warning::MustResync(0xd5, 0))
        );
    }

    #[test]
    fn premature_marker_zero_fills() {
        let mut headers = headers(false);
        let mut h = Harness::new(&mut headers);
        let data = [0xff, 0xd9];
        let mut source: &[u8] = &data;
        let mut mcu = [[5i16; 64]];
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert!(mcu[0].iter().all(|&c| c == 0));
        assert_eq!(h.reporter.last_warning(), Some(&Warning::HitMarker));
        assert_eq!(h.markers.unread_marker, Some(0xd9));
        // Later MCUs are skipped without further warnings.
        assert!(h.decode(&mut source, &headers, &mut mcu).unwrap());
        assert_eq!(h.reporter.num_warnings(), 1);
    }

    #[test]
    fn invalid_progression_is_fatal() {
        let mut headers = headers(true);
        headers.scan.ss = 0;
        headers.scan.se = 5;
        let mut reporter = ErrorReporter::new();
        let mut decoder = EntropyDecoder::new();
        assert!(matches!(
            decoder.start_pass(&mut headers, &mut reporter),
            Err(Error::BadProgression(0, 5, 0, 0))
        ));

        headers.scan.se = 0;
        headers.scan.ah = 3;
        headers.scan.al = 1;
        assert!(decoder.start_pass(&mut headers, &mut reporter).is_err());
    }

    #[test]
    fn ac_before_dc_warns() {
        let mut headers = headers(true);
        headers.scan.ss = 1;
        headers.scan.se = 2;
        let mut reporter = ErrorReporter::new();
        let mut decoder = EntropyDecoder::new();
        decoder.start_pass(&mut headers, &mut reporter).unwrap();
        assert_eq!(
            reporter.last_warning(),
            Some(&Warning::BogusProgression {
                component: 0,
                coefficient: 0
            })
        );
        assert_eq!(&headers.coef_bits[0][..4], &[-1, 0, 0, -1]);
    }

    #[test]
    fn sequential_scan_params_warn() {
        let mut headers = headers(false);
        headers.scan.al = 1;
        let mut reporter = ErrorReporter::new();
        EntropyDecoder::new()
            .start_pass(&mut headers, &mut reporter)
            .unwrap();
        assert_eq!(reporter.last_warning(), Some(&Warning::NotSequential));
    }

    #[test]
    fn missing_table_falls_back_to_standard() {
        let mut headers = headers(false);
        headers.dc_huff_tables[0] = None;
        let mut reporter = ErrorReporter::new();
        EntropyDecoder::new()
            .start_pass(&mut headers, &mut reporter)
            .unwrap();
        assert!(headers.dc_huff_tables[0].is_some());

        headers.components[0].ac_tbl_no = 3;
        assert!(matches!(
            EntropyDecoder::new().start_pass(&mut headers, &mut reporter),
            Err(Error::NoHuffTable(TableClass::Ac, 3))
        ));
    }
}
