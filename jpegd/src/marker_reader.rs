// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;

use crate::{
    DCTSIZE2, MAX_COMPS_IN_SCAN, NUM_HUFF_TBLS, NUM_QUANT_TBLS,
    error::{Error, Result, Warning},
    headers::{
        ComponentInfo, Headers, JfifInfo, ScanInfo,
        markers::{APP0, APP14, Marker, RST0, app_slot, is_restart},
        tables::{HuffmanTable, QuantTable, TableClass},
    },
    input_buffer::InputSource,
    util::tracing_wrappers::*,
};

const NUM_APP_SLOTS: usize = 17;
const JFIF_HEADER_LEN: usize = 14;
const ADOBE_HEADER_LEN: usize = 12;

/// Caller-supplied handler for an APPn or COM marker. It replaces the default
/// skip/save behavior for that marker code.
pub trait MarkerProcessor {
    fn process(&mut self, marker: u8, payload: &[u8], headers: &Headers) -> Result<()>;
}

impl<F: FnMut(u8, &[u8], &Headers) -> Result<()>> MarkerProcessor for F {
    fn process(&mut self, marker: u8, payload: &[u8], headers: &Headers) -> Result<()> {
        self(marker, payload, headers)
    }
}

/// An APPn/COM marker retained for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMarker {
    pub marker: u8,
    /// Payload length in the file, excluding the length field.
    pub original_length: usize,
    /// Payload, truncated to the configured limit.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    Suspended,
    ReachedSos,
    ReachedEoi,
}

pub(crate) enum MarkerScan {
    Found {
        consumed: usize,
        discarded: usize,
        code: u8,
    },
    Incomplete {
        consumed: usize,
        discarded: usize,
    },
}

/// Looks for the next marker in `data`, skipping garbage, fill bytes and
/// stuffed zeros.
pub(crate) fn scan_for_marker(data: &[u8]) -> MarkerScan {
    let mut pos = 0;
    let mut discarded = 0;
    loop {
        while pos < data.len() && data[pos] != 0xff {
            pos += 1;
            discarded += 1;
        }
        let first_ff = pos;
        while pos < data.len() && data[pos] == 0xff {
            pos += 1;
        }
        if pos >= data.len() {
            // Keep one 0xFF so that the marker byte can be paired with it later.
            let consumed = if first_ff < data.len() {
                data.len() - 1
            } else {
                data.len()
            };
            return MarkerScan::Incomplete {
                consumed,
                discarded,
            };
        }
        let code = data[pos];
        pos += 1;
        if code != 0 {
            return MarkerScan::Found {
                consumed: pos,
                discarded,
                code,
            };
        }
        discarded += 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResyncAction {
    /// Drop the marker and resume decoding.
    Discard,
    /// Scan forward to the next marker and decide again.
    Advance,
    /// Leave the marker unread; the decoder sees an empty segment.
    Stop,
}

/// Decides how to recover when `marker` shows up where RST`desired` was expected.
pub(crate) fn resync_action(marker: u8, desired: u8) -> ResyncAction {
    if marker < Marker::Sof0 as u8 {
        ResyncAction::Advance
    } else if !is_restart(marker) {
        ResyncAction::Stop
    } else if marker == RST0 + ((desired + 1) & 7) || marker == RST0 + ((desired + 2) & 7) {
        ResyncAction::Stop
    } else if marker == RST0 + (desired.wrapping_sub(1) & 7)
        || marker == RST0 + (desired.wrapping_sub(2) & 7)
    {
        ResyncAction::Advance
    } else {
        ResyncAction::Discard
    }
}

pub struct MarkerReader {
    saw_soi: bool,
    saw_sof: bool,
    pub(crate) next_restart_num: u8,
    discarded_bytes: usize,
    /// Marker code read from the input but not yet processed.
    pub(crate) unread_marker: Option<u8>,
    skip_remaining: usize,
    save_limits: [usize; NUM_APP_SLOTS],
    processors: [Option<Box<dyn MarkerProcessor>>; NUM_APP_SLOTS],
    saved_markers: Vec<SavedMarker>,
}

impl Default for MarkerReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerReader {
    pub fn new() -> Self {
        Self {
            saw_soi: false,
            saw_sof: false,
            next_restart_num: 0,
            discarded_bytes: 0,
            unread_marker: None,
            skip_remaining: 0,
            save_limits: [0; NUM_APP_SLOTS],
            processors: array_init::array_init(|_| None),
            saved_markers: vec![],
        }
    }

    /// Prepares for a new datastream. Save limits and processors are kept.
    pub fn reset(&mut self) {
        self.saw_soi = false;
        self.saw_sof = false;
        self.next_restart_num = 0;
        self.discarded_bytes = 0;
        self.unread_marker = None;
        self.skip_remaining = 0;
        self.saved_markers.clear();
    }

    pub fn saw_sof(&self) -> bool {
        self.saw_sof
    }

    pub fn saved_markers(&self) -> &[SavedMarker] {
        &self.saved_markers
    }

    pub fn save_markers(&mut self, marker: u8, length_limit: usize) -> Result<()> {
        let slot = app_slot(marker).ok_or(Error::UnknownMarker(marker))?;
        self.save_limits[slot] = length_limit.min(u16::MAX as usize - 2);
        Ok(())
    }

    pub fn set_processor(
        &mut self,
        marker: u8,
        processor: Option<Box<dyn MarkerProcessor>>,
    ) -> Result<()> {
        let slot = app_slot(marker).ok_or(Error::UnknownMarker(marker))?;
        self.processors[slot] = processor;
        Ok(())
    }

    /// Reads markers until SOS or EOI, or until the input runs dry.
    pub(crate) fn read_markers(
        &mut self,
        src: &mut InputSource,
        headers: &mut Headers,
    ) -> Result<MarkerStatus> {
        loop {
            if self.skip_remaining > 0 {
                let skipped = src.skip(self.skip_remaining)?;
                self.skip_remaining -= skipped;
                if self.skip_remaining > 0 {
                    if src.data().is_empty() && src.source.is_complete() {
                        // Truncated segment; the next marker read hits the end.
                        self.skip_remaining = 0;
                    } else if !src.fill(1)? {
                        return Ok(MarkerStatus::Suspended);
                    } else {
                        continue;
                    }
                }
                self.unread_marker = None;
                continue;
            }
            let marker = match self.unread_marker {
                Some(marker) => marker,
                None => {
                    let found = if self.saw_soi {
                        self.next_marker(src)?
                    } else {
                        self.first_marker(src)?
                    };
                    match found {
                        Some(marker) => marker,
                        None => return Ok(MarkerStatus::Suspended),
                    }
                }
            };
            match self.process_marker(marker, src, headers)? {
                Step::Continue => {}
                Step::Suspend => return Ok(MarkerStatus::Suspended),
                Step::Sos => return Ok(MarkerStatus::ReachedSos),
                Step::Eoi => return Ok(MarkerStatus::ReachedEoi),
            }
        }
    }

    fn first_marker(&mut self, src: &mut InputSource) -> Result<Option<u8>> {
        if !src.fill(2)? {
            return Ok(None);
        }
        let (c, c2) = (src.data()[0], src.data()[1]);
        if c != 0xff || c2 != Marker::Soi as u8 {
            return Err(Error::NoSoi(c, c2));
        }
        src.consume(2);
        self.unread_marker = Some(c2);
        Ok(Some(c2))
    }

    fn next_marker(&mut self, src: &mut InputSource) -> Result<Option<u8>> {
        loop {
            if !src.fill(2)? {
                // A single byte may still be garbage we can drop now.
                if let MarkerScan::Incomplete {
                    consumed,
                    discarded,
                } = scan_for_marker(src.data())
                {
                    src.consume(consumed);
                    self.discarded_bytes += discarded;
                }
                return Ok(None);
            }
            match scan_for_marker(src.data()) {
                MarkerScan::Found {
                    consumed,
                    discarded,
                    code,
                } => {
                    src.consume(consumed);
                    self.discarded_bytes += discarded;
                    if self.discarded_bytes != 0 {
                        src.warn(Warning::ExtraneousData(self.discarded_bytes, code));
                        self.discarded_bytes = 0;
                    }
                    self.unread_marker = Some(code);
                    return Ok(Some(code));
                }
                MarkerScan::Incomplete {
                    consumed,
                    discarded,
                } => {
                    src.consume(consumed);
                    self.discarded_bytes += discarded;
                    if !src.fill_more()? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Returns the total length of the segment at the head of the input once
    /// all of it is buffered.
    fn buffered_segment(src: &mut InputSource, marker: u8) -> Result<Option<usize>> {
        if !src.fill(2)? {
            return Ok(None);
        }
        let length = BigEndian::read_u16(src.data()) as usize;
        if length < 2 {
            return Err(Error::BadLength { marker, length });
        }
        if !src.fill(length)? {
            return Ok(None);
        }
        Ok(Some(length))
    }

    fn process_marker(
        &mut self,
        marker: u8,
        src: &mut InputSource,
        headers: &mut Headers,
    ) -> Result<Step> {
        let Some(kind) = Marker::from_u8(marker) else {
            return Err(Error::UnknownMarker(marker));
        };
        match kind {
            Marker::Soi => {
                if self.saw_soi {
                    return Err(Error::DuplicateSoi);
                }
                trace!("SOI");
                headers.reset_on_soi();
                self.saw_soi = true;
                self.unread_marker = None;
                return Ok(Step::Continue);
            }
            Marker::Eoi => {
                trace!("EOI");
                self.unread_marker = None;
                return Ok(Step::Eoi);
            }
            Marker::Rst0
            | Marker::Rst1
            | Marker::Rst2
            | Marker::Rst3
            | Marker::Rst4
            | Marker::Rst5
            | Marker::Rst6
            | Marker::Rst7
            | Marker::Tem => {
                trace!("ignoring stray marker {marker:#04x}");
                self.unread_marker = None;
                return Ok(Step::Continue);
            }
            Marker::Sof9 | Marker::Sof10 => return Err(Error::ArithmeticNotSupported),
            Marker::Sof3
            | Marker::Sof5
            | Marker::Sof6
            | Marker::Sof7
            | Marker::Jpg
            | Marker::Sof11
            | Marker::Sof13
            | Marker::Sof14
            | Marker::Sof15 => return Err(Error::SofUnsupported(marker)),
            Marker::Dac | Marker::Dnl => {
                if !src.fill(2)? {
                    return Ok(Step::Suspend);
                }
                let length = BigEndian::read_u16(src.data()) as usize;
                if length < 2 {
                    return Err(Error::BadLength { marker, length });
                }
                trace!("skipping marker {marker:#04x}, length {length}");
                src.consume(2);
                self.skip_remaining = length - 2;
                if self.skip_remaining == 0 {
                    self.unread_marker = None;
                }
                return Ok(Step::Continue);
            }
            Marker::Dhp | Marker::Exp | Marker::Jpg0 | Marker::Jpg13 => {
                return Err(Error::UnknownMarker(marker));
            }
            Marker::App0
            | Marker::App1
            | Marker::App2
            | Marker::App3
            | Marker::App4
            | Marker::App5
            | Marker::App6
            | Marker::App7
            | Marker::App8
            | Marker::App9
            | Marker::App10
            | Marker::App11
            | Marker::App12
            | Marker::App13
            | Marker::App14
            | Marker::App15
            | Marker::Com => return self.process_app(marker, src, headers),
            Marker::Sof0
            | Marker::Sof1
            | Marker::Sof2
            | Marker::Dht
            | Marker::Dqt
            | Marker::Dri
            | Marker::Sos => {}
        }

        let Some(length) = Self::buffered_segment(src, marker)? else {
            return Ok(Step::Suspend);
        };
        let payload = &src.data()[2..length];
        let step = match kind {
            Marker::Sof0 | Marker::Sof1 => {
                self.get_sof(marker, payload, headers, false)?;
                Step::Continue
            }
            Marker::Sof2 => {
                self.get_sof(marker, payload, headers, true)?;
                Step::Continue
            }
            Marker::Dht => {
                get_dht(marker, payload, headers)?;
                Step::Continue
            }
            Marker::Dqt => {
                get_dqt(marker, payload, headers)?;
                Step::Continue
            }
            Marker::Dri => {
                if payload.len() != 2 {
                    return Err(Error::BadLength { marker, length });
                }
                headers.restart_interval = BigEndian::read_u16(payload);
                trace!("restart interval {}", headers.restart_interval);
                Step::Continue
            }
            _ => {
                self.get_sos(marker, payload, headers)?;
                Step::Sos
            }
        };
        src.consume(length);
        self.unread_marker = None;
        Ok(step)
    }

    fn get_sof(
        &mut self,
        marker: u8,
        payload: &[u8],
        headers: &mut Headers,
        progressive: bool,
    ) -> Result<()> {
        if self.saw_sof {
            return Err(Error::DuplicateSof);
        }
        let length = payload.len() + 2;
        if payload.len() < 6 {
            return Err(Error::BadLength { marker, length });
        }
        let num_components = payload[5] as usize;
        if payload.len() != 6 + num_components * 3 {
            return Err(Error::BadLength { marker, length });
        }
        let height = BigEndian::read_u16(&payload[1..3]) as u32;
        let width = BigEndian::read_u16(&payload[3..5]) as u32;
        if width == 0 || height == 0 || num_components == 0 {
            return Err(Error::EmptyImage);
        }
        headers.data_precision = payload[0];
        headers.image_height = height;
        headers.image_width = width;
        headers.progressive_mode = progressive;
        headers.arith_code = false;
        headers.components = payload[6..]
            .chunks_exact(3)
            .enumerate()
            .map(|(index, c)| ComponentInfo {
                id: c[0],
                index,
                h_samp_factor: (c[1] >> 4) as usize,
                v_samp_factor: (c[1] & 15) as usize,
                quant_tbl_no: c[2] as usize,
                component_needed: true,
                ..Default::default()
            })
            .collect();
        debug!(
            "SOF{}: {width}x{height}, {num_components} components, precision {}",
            marker - Marker::Sof0 as u8,
            headers.data_precision
        );
        self.saw_sof = true;
        Ok(())
    }

    fn get_sos(&mut self, marker: u8, payload: &[u8], headers: &mut Headers) -> Result<()> {
        if !self.saw_sof {
            return Err(Error::SosNoSof);
        }
        let length = payload.len() + 2;
        let n = *payload.first().ok_or(Error::BadLength { marker, length })? as usize;
        if n == 0 || n > MAX_COMPS_IN_SCAN {
            return Err(Error::ScanComponentCount(n, MAX_COMPS_IN_SCAN));
        }
        if payload.len() != n * 2 + 4 {
            return Err(Error::BadLength { marker, length });
        }
        let mut components = Vec::with_capacity(n);
        for sel in payload[1..1 + 2 * n].chunks_exact(2) {
            let (id, tables) = (sel[0], sel[1]);
            let ci = headers
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or(Error::BadComponentId(id))?;
            if components.contains(&ci) {
                return Err(Error::BadComponentId(id));
            }
            let (dc, ac) = ((tables >> 4) as usize, (tables & 15) as usize);
            if dc >= NUM_HUFF_TBLS {
                return Err(Error::SosTableIndex(dc));
            }
            if ac >= NUM_HUFF_TBLS {
                return Err(Error::SosTableIndex(ac));
            }
            let comp = &mut headers.components[ci];
            comp.dc_tbl_no = dc;
            comp.ac_tbl_no = ac;
            components.push(ci);
        }
        let params = &payload[1 + 2 * n..];
        headers.scan = ScanInfo {
            components,
            ss: params[0],
            se: params[1],
            ah: params[2] >> 4,
            al: params[2] & 15,
            ..Default::default()
        };
        self.next_restart_num = 0;
        headers.input_scan_number += 1;
        debug!(
            "SOS #{}: {n} components, Ss={} Se={} Ah={} Al={}",
            headers.input_scan_number,
            headers.scan.ss,
            headers.scan.se,
            headers.scan.ah,
            headers.scan.al
        );
        Ok(())
    }

    fn process_app(
        &mut self,
        marker: u8,
        src: &mut InputSource,
        headers: &mut Headers,
    ) -> Result<Step> {
        let Some(slot) = app_slot(marker) else {
            return Err(Error::UnknownMarker(marker));
        };
        if let Some(processor) = self.processors[slot].as_mut() {
            let Some(length) = Self::buffered_segment(src, marker)? else {
                return Ok(Step::Suspend);
            };
            processor.process(marker, &src.data()[2..length], headers)?;
            src.consume(length);
            self.unread_marker = None;
            return Ok(Step::Continue);
        }

        if !src.fill(2)? {
            return Ok(Step::Suspend);
        }
        let length = BigEndian::read_u16(src.data()) as usize;
        if length < 2 {
            return Err(Error::BadLength { marker, length });
        }
        let datalen = length - 2;
        let examine_len = match marker {
            APP0 => JFIF_HEADER_LEN,
            APP14 => ADOBE_HEADER_LEN,
            _ => 0,
        };
        let limit = self.save_limits[slot];
        let wanted = datalen.min(limit.max(examine_len));
        if !src.fill(2 + wanted)? {
            return Ok(Step::Suspend);
        }
        let head = &src.data()[2..2 + wanted];
        match marker {
            APP0 => examine_app0(head, headers),
            APP14 => examine_app14(head, headers),
            _ => trace!("marker {marker:#04x}, length {datalen}"),
        }
        if limit > 0 {
            self.saved_markers.push(SavedMarker {
                marker,
                original_length: datalen,
                data: head[..datalen.min(limit)].to_vec(),
            });
        }
        src.consume(2 + wanted);
        self.skip_remaining = datalen - wanted;
        if self.skip_remaining == 0 {
            self.unread_marker = None;
        }
        Ok(Step::Continue)
    }
}

enum Step {
    Continue,
    Suspend,
    Sos,
    Eoi,
}

fn examine_app0(head: &[u8], headers: &mut Headers) {
    if head.len() >= JFIF_HEADER_LEN && head.starts_with(b"JFIF\0") {
        let jfif = JfifInfo {
            major_version: head[5],
            minor_version: head[6],
            density_unit: head[7],
            x_density: BigEndian::read_u16(&head[8..10]),
            y_density: BigEndian::read_u16(&head[10..12]),
        };
        debug!("JFIF {}.{:02}: {jfif:?}", jfif.major_version, jfif.minor_version);
        headers.jfif = Some(jfif);
    } else if head.len() >= 6 && head.starts_with(b"JFXX\0") {
        trace!("JFIF extension marker, type {:#04x}", head[5]);
    } else {
        trace!("unknown APP0 marker");
    }
}

fn examine_app14(head: &[u8], headers: &mut Headers) {
    if head.len() >= ADOBE_HEADER_LEN && head.starts_with(b"Adobe") {
        let transform = head[11];
        debug!(
            "Adobe APP14: version {}, transform {transform}",
            BigEndian::read_u16(&head[5..7])
        );
        headers.adobe_transform = Some(transform);
    } else {
        trace!("unknown APP14 marker");
    }
}

fn get_dht(marker: u8, payload: &[u8], headers: &mut Headers) -> Result<()> {
    let mut rest = payload;
    while !rest.is_empty() {
        if rest.len() < 17 {
            return Err(Error::BadLength {
                marker,
                length: payload.len() + 2,
            });
        }
        let index = rest[0];
        let counts: &[u8; 16] = rest[1..17].try_into().map_err(|_| Error::BadHuffTable)?;
        let count: usize = counts.iter().map(|&c| c as usize).sum();
        if count > 256 || count > rest.len() - 17 {
            return Err(Error::BadHuffTable);
        }
        let (class, slot) = if index & 0x10 != 0 {
            (TableClass::Ac, (index - 0x10) as usize)
        } else {
            (TableClass::Dc, index as usize)
        };
        let table = headers
            .huffman_table_mut(class, slot)
            .ok_or(Error::DhtIndex(index))?;
        trace!("DHT {class:?} {slot}: {count} symbols");
        *table = Some(HuffmanTable::new(counts, &rest[17..17 + count]));
        rest = &rest[17 + count..];
    }
    Ok(())
}

fn get_dqt(marker: u8, payload: &[u8], headers: &mut Headers) -> Result<()> {
    let mut rest = payload;
    while !rest.is_empty() {
        let precision = rest[0] >> 4;
        let slot = (rest[0] & 15) as usize;
        if slot >= NUM_QUANT_TBLS {
            return Err(Error::DqtIndex(slot));
        }
        if precision > 1 {
            return Err(Error::DqtPrecision(precision));
        }
        let size = DCTSIZE2 * (precision as usize + 1);
        if rest.len() < 1 + size {
            return Err(Error::BadLength {
                marker,
                length: payload.len() + 2,
            });
        }
        let mut zigzag = [0u16; DCTSIZE2];
        if precision == 0 {
            for (v, &b) in zigzag.iter_mut().zip(rest[1..1 + size].iter()) {
                *v = b as u16;
            }
        } else {
            BigEndian::read_u16_into(&rest[1..1 + size], &mut zigzag);
        }
        trace!("DQT {slot}, precision {precision}");
        headers.quant_tables[slot] = Some(QuantTable::from_zigzag(&zigzag));
        rest = &rest[1 + size..];
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use test_log::test;

    use super::*;
    use crate::{
        api::{IncrementalSource, JpegSource},
        error::ErrorReporter,
        input_buffer::InputBuffer,
    };

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xff, marker];
        out.extend(((payload.len() + 2) as u16).to_be_bytes());
        out.extend(payload);
        out
    }

    fn sof(marker: u8, comps: &[(u8, u8)]) -> Vec<u8> {
        let mut p = vec![8, 0, 16, 0, 16, comps.len() as u8];
        for &(id, hv) in comps {
            p.extend([id, hv, 0]);
        }
        segment(marker, &p)
    }

    fn sos(ids: &[u8]) -> Vec<u8> {
        let mut p = vec![ids.len() as u8];
        for &id in ids {
            p.extend([id, 0x00]);
        }
        p.extend([0, 63, 0]);
        segment(0xda, &p)
    }

    fn soi() -> Vec<u8> {
        vec![0xff, 0xd8]
    }

    struct Harness {
        reader: MarkerReader,
        headers: Headers,
        buffer: InputBuffer,
        reporter: ErrorReporter,
    }

    impl Harness {
        fn new() -> Self {
            let mut buffer = InputBuffer::default();
            buffer.init();
            Self {
                reader: MarkerReader::new(),
                headers: Headers::default(),
                buffer,
                reporter: ErrorReporter::new(),
            }
        }

        fn run(&mut self, source: &mut dyn JpegSource) -> Result<MarkerStatus> {
            let mut src = InputSource {
                buffer: &mut self.buffer,
                source,
                reporter: &mut self.reporter,
            };
            self.reader.read_markers(&mut src, &mut self.headers)
        }
    }

    fn read_all(data: &[u8]) -> (Harness, Result<MarkerStatus>) {
        let mut h = Harness::new();
        let mut src = data;
        let res = h.run(&mut src);
        (h, res)
    }

    #[test]
    fn missing_soi() {
        let (_, res) = read_all(&[0x12, 0x34, 0xff, 0xd8]);
        assert!(matches!(res, Err(Error::NoSoi(0x12, 0x34))));
    }

    #[test]
    fn duplicate_soi() {
        let (_, res) = read_all(&[0xff, 0xd8, 0xff, 0xd8]);
        assert!(matches!(res, Err(Error::DuplicateSoi)));
    }

    #[test]
    fn sos_before_sof() {
        let mut data = soi();
        data.extend(sos(&[1]));
        let (_, res) = read_all(&data);
        assert!(matches!(res, Err(Error::SosNoSof)));
    }

    #[test]
    fn duplicate_sof() {
        let mut data = soi();
        data.extend(sof(0xc0, &[(1, 0x11)]));
        data.extend(sof(0xc0, &[(1, 0x11)]));
        let (_, res) = read_all(&data);
        assert!(matches!(res, Err(Error::DuplicateSof)));
    }

    #[test]
    fn unsupported_sof() {
        let mut data = soi();
        data.extend(sof(0xc3, &[(1, 0x11)]));
        assert!(matches!(read_all(&data).1, Err(Error::SofUnsupported(0xc3))));
        let mut data = soi();
        data.extend(sof(0xc9, &[(1, 0x11)]));
        assert!(matches!(
            read_all(&data).1,
            Err(Error::ArithmeticNotSupported)
        ));
    }

    #[test]
    fn bad_sof_length() {
        let mut data = soi();
        data.extend(segment(0xc0, &[8, 0, 16, 0, 16, 2, 1, 0x11, 0]));
        assert!(matches!(
            read_all(&data).1,
            Err(Error::BadLength { marker: 0xc0, .. })
        ));
    }

    #[test]
    fn unknown_scan_component() {
        let mut data = soi();
        data.extend(sof(0xc0, &[(1, 0x11)]));
        data.extend(sos(&[7]));
        assert!(matches!(read_all(&data).1, Err(Error::BadComponentId(7))));
    }

    #[test]
    fn tables_and_frame() {
        let mut data = soi();
        let mut dqt = vec![0x00];
        dqt.extend(1..=64u8);
        dqt.push(0x11);
        for i in 0..64u16 {
            dqt.extend((i + 256).to_be_bytes());
        }
        data.extend(segment(0xdb, &dqt));
        let mut dht = vec![0x11];
        let mut counts = [0u8; 16];
        counts[1] = 3;
        dht.extend(counts);
        dht.extend([0x00, 0x01, 0xf0]);
        data.extend(segment(0xc4, &dht));
        data.extend(segment(0xdd, &[0, 5]));
        data.extend(sof(0xc2, &[(1, 0x22), (2, 0x11), (3, 0x11)]));
        data.extend(sos(&[1, 2, 3]));
        let (h, res) = read_all(&data);
        assert_eq!(res.unwrap(), MarkerStatus::ReachedSos);
        let q0 = h.headers.quant_tables[0].as_ref().unwrap();
        assert_eq!(q0.values[0], 1);
        assert_eq!(q0.values[8], 3);
        assert_eq!(h.headers.quant_tables[1].as_ref().unwrap().values[1], 257);
        let ac1 = h.headers.huffman_table(TableClass::Ac, 1).unwrap();
        assert_eq!(ac1.huffval, vec![0x00, 0x01, 0xf0]);
        assert_eq!(h.headers.restart_interval, 5);
        assert!(h.headers.progressive_mode);
        assert_eq!(h.headers.components[0].h_samp_factor, 2);
        assert_eq!(h.headers.scan.components, vec![0, 1, 2]);
        assert_eq!(h.headers.input_scan_number, 1);
    }

    #[test]
    fn bad_tables() {
        let mut data = soi();
        data.extend(segment(0xdb, &[0x04]));
        assert!(matches!(read_all(&data).1, Err(Error::DqtIndex(4))));

        let mut data = soi();
        let mut dht = vec![0x00];
        let mut counts = [0u8; 16];
        counts[0] = 5;
        dht.extend(counts);
        dht.extend([0, 1]);
        data.extend(segment(0xc4, &dht));
        assert!(matches!(read_all(&data).1, Err(Error::BadHuffTable)));

        let mut data = soi();
        let mut dht = vec![0x24];
        dht.extend([0u8; 16]);
        data.extend(segment(0xc4, &dht));
        assert!(matches!(read_all(&data).1, Err(Error::DhtIndex(0x24))));

        let mut data = soi();
        data.extend(segment(0xdd, &[0, 5, 0]));
        assert!(matches!(
            read_all(&data).1,
            Err(Error::BadLength { marker: 0xdd, .. })
        ));
    }

    #[test]
    fn jfif_and_adobe_detection() {
        let mut data = soi();
        data.extend(segment(
            0xe0,
            &[b'J', b'F', b'I', b'F', 0, 1, 2, 1, 0, 72, 0, 96, 0, 0],
        ));
        data.extend(segment(
            0xee,
            &[b'A', b'd', b'o', b'b', b'e', 0, 100, 0, 0, 0, 0, 2],
        ));
        data.extend([0xff, 0xd9]);
        let (h, res) = read_all(&data);
        assert_eq!(res.unwrap(), MarkerStatus::ReachedEoi);
        let jfif = h.headers.jfif.unwrap();
        assert_eq!(jfif.major_version, 1);
        assert_eq!(jfif.minor_version, 2);
        assert_eq!(jfif.x_density, 72);
        assert_eq!(jfif.y_density, 96);
        assert_eq!(h.headers.adobe_transform, Some(2));
    }

    #[test]
    fn saved_markers_are_truncated() {
        let mut data = soi();
        data.extend(segment(0xe1, b"Exif\0\0abcdefgh"));
        data.extend(segment(0xfe, b"hi"));
        data.extend(segment(0xe2, b"not saved"));
        data.extend([0xff, 0xd9]);
        let mut h = Harness::new();
        h.reader.save_markers(0xe1, 6).unwrap();
        h.reader.save_markers(0xfe, 100).unwrap();
        assert!(h.reader.save_markers(0xdb, 1).is_err());
        let mut src: &[u8] = &data;
        assert_eq!(h.run(&mut src).unwrap(), MarkerStatus::ReachedEoi);
        let saved = h.reader.saved_markers();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].marker, 0xe1);
        assert_eq!(saved[0].original_length, 14);
        assert_eq!(saved[0].data, b"Exif\0\0");
        assert_eq!(saved[1].data, b"hi");
        h.reader.reset();
        assert!(h.reader.saved_markers().is_empty());
    }

    #[test]
    fn processor_sees_payload_and_headers() {
        let mut data = soi();
        data.extend(sof(0xc0, &[(1, 0x11)]));
        data.extend(segment(0xe5, b"payload"));
        data.extend([0xff, 0xd9]);
        let seen = Rc::new(RefCell::new(vec![]));
        let seen2 = seen.clone();
        let mut h = Harness::new();
        h.reader
            .set_processor(
                0xe5,
                Some(Box::new(move |m: u8, p: &[u8], hdr: &Headers| {
                    seen2.borrow_mut().push((m, p.to_vec(), hdr.image_width));
                    Ok(())
                })),
            )
            .unwrap();
        let mut src: &[u8] = &data;
        assert_eq!(h.run(&mut src).unwrap(), MarkerStatus::ReachedEoi);
        assert_eq!(*seen.borrow(), vec![(0xe5, b"payload".to_vec(), 16)]);
    }

    #[test]
    fn extraneous_bytes_warn() {
        let mut data = soi();
        data.extend([1, 2, 3]);
        data.extend([0xff, 0xd9]);
        let (h, res) = read_all(&data);
        assert_eq!(res.unwrap(), MarkerStatus::ReachedEoi);
        assert_eq!(
            h.reporter.last_warning(),
            Some(&Warning::ExtraneousData(3, 0xd9))
        );
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let mut data = soi();
        data.extend(segment(0xe1, &[7; 40]));
        data.extend(segment(0xdb, &[0; 65]));
        data.extend(sof(0xc0, &[(1, 0x11), (2, 0x11), (3, 0x11)]));
        data.extend(sos(&[1, 2, 3]));
        let (whole, res) = read_all(&data);
        assert_eq!(res.unwrap(), MarkerStatus::ReachedSos);

        let mut h = Harness::new();
        h.reader.save_markers(0xe1, 10).unwrap();
        let mut source = IncrementalSource::new();
        let mut status = MarkerStatus::Suspended;
        for b in data.iter() {
            assert_eq!(status, MarkerStatus::Suspended);
            source.push(&[*b]);
            status = h.run(&mut source).unwrap();
        }
        assert_eq!(status, MarkerStatus::ReachedSos);
        assert_eq!(h.headers.scan.components, whole.headers.scan.components);
        assert_eq!(h.headers.quant_tables, whole.headers.quant_tables);
        assert_eq!(h.reader.saved_markers()[0].data, vec![7; 10]);
    }

    #[test]
    fn resync_policy() {
        // Expected RST2.
        assert_eq!(resync_action(0xd2 + 1, 2), ResyncAction::Stop);
        assert_eq!(resync_action(0xd2 + 2, 2), ResyncAction::Stop);
        assert_eq!(resync_action(0xd1, 2), ResyncAction::Advance);
        assert_eq!(resync_action(0xd0, 2), ResyncAction::Advance);
        assert_eq!(resync_action(0xd6, 2), ResyncAction::Discard);
        assert_eq!(resync_action(0xd9, 2), ResyncAction::Stop);
        assert_eq!(resync_action(0x05, 2), ResyncAction::Advance);
        // Wraparound: expected RST0, RST7 is the previous one.
        assert_eq!(resync_action(0xd7, 0), ResyncAction::Advance);
    }

    #[test]
    fn marker_scan_skips_stuffing() {
        match scan_for_marker(&[1, 0xff, 0x00, 0xff, 0xff, 0xd3, 9]) {
            MarkerScan::Found {
                consumed,
                discarded,
                code,
            } => {
                assert_eq!((consumed, discarded, code), (6, 3, 0xd3));
            }
            MarkerScan::Incomplete { .. } => panic!("marker not found"),
        }
        assert!(matches!(
            scan_for_marker(&[1, 2, 0xff, 0xff]),
            MarkerScan::Incomplete {
                consumed: 3,
                discarded: 2
            }
        ));
    }
}
