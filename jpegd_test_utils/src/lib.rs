// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Helpers for tests: an approximate-equality assertion and a writer for
//! small JPEG datastreams built from given coefficients.
//!
//! The writer uses fixed-length Huffman codes: 4 bits for every DC symbol
//! and 8 bits for every AC symbol, the code being the symbol value itself.

#[macro_export]
macro_rules! assert_almost_eq {
    ($left:expr, $right:expr, $max_error:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                let diff = if *left_val > *right_val {
                    *left_val - *right_val
                } else {
                    *right_val - *left_val
                };
                if !(diff <= $max_error) {
                    panic!(
                        "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n max_error: `{:?}`",
                        left_val, right_val, $max_error
                    );
                }
            }
        }
    };
}

/// Zigzag position to natural-order index.
pub const NATURAL_ORDER: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

pub type Block = [i16; 64];

#[derive(Debug, Clone, Copy)]
pub struct FrameComponent {
    pub id: u8,
    pub h: usize,
    pub v: usize,
    /// Quantization and Huffman table slot (0 or 1).
    pub table: usize,
}

/// Quantized DCT coefficients of a whole frame, natural order, on a block
/// grid padded to whole MCUs.
#[derive(Debug, Clone)]
pub struct TestImage {
    pub width: usize,
    pub height: usize,
    pub components: Vec<FrameComponent>,
    pub blocks: Vec<Vec<Block>>,
}

impl TestImage {
    /// Components get ids 1, 2, ...; the first uses table slot 0, the
    /// others slot 1.
    pub fn new(width: usize, height: usize, sampling: &[(usize, usize)]) -> Self {
        let components: Vec<FrameComponent> = sampling
            .iter()
            .enumerate()
            .map(|(i, &(h, v))| FrameComponent {
                id: i as u8 + 1,
                h,
                v,
                table: usize::from(i > 0),
            })
            .collect();
        let mut image = Self {
            width,
            height,
            components,
            blocks: vec![],
        };
        image.blocks = (0..sampling.len())
            .map(|c| vec![[0; 64]; image.blocks_wide(c) * image.blocks_high(c)])
            .collect();
        image
    }

    fn max_h(&self) -> usize {
        self.components.iter().map(|c| c.h).max().unwrap_or(1)
    }

    fn max_v(&self) -> usize {
        self.components.iter().map(|c| c.v).max().unwrap_or(1)
    }

    pub fn mcus_wide(&self) -> usize {
        self.width.div_ceil(8 * self.max_h())
    }

    pub fn mcus_high(&self) -> usize {
        self.height.div_ceil(8 * self.max_v())
    }

    pub fn blocks_wide(&self, c: usize) -> usize {
        self.mcus_wide() * self.components[c].h
    }

    pub fn blocks_high(&self, c: usize) -> usize {
        self.mcus_high() * self.components[c].v
    }

    /// Blocks of component `c` that cover image samples.
    pub fn width_in_blocks(&self, c: usize) -> usize {
        (self.width * self.components[c].h).div_ceil(self.max_h()).div_ceil(8)
    }

    pub fn height_in_blocks(&self, c: usize) -> usize {
        (self.height * self.components[c].v).div_ceil(self.max_v()).div_ceil(8)
    }

    pub fn block(&self, c: usize, bx: usize, by: usize) -> &Block {
        &self.blocks[c][by * self.blocks_wide(c) + bx]
    }

    pub fn block_mut(&mut self, c: usize, bx: usize, by: usize) -> &mut Block {
        let wide = self.blocks_wide(c);
        &mut self.blocks[c][by * wide + bx]
    }

    /// Sets every block of component `c` to a flat level: with unit
    /// quantization, a DC of `8 * (level - 128)` decodes to `level`.
    pub fn fill_flat(&mut self, c: usize, level: u8) {
        for block in self.blocks[c].iter_mut() {
            *block = [0; 64];
            block[0] = 8 * (level as i16 - 128);
        }
    }

    /// Fills all components with deterministic pseudo-random low-frequency
    /// content.
    pub fn fill_pattern(&mut self, seed: u32) {
        let mut state = seed | 1;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        for blocks in self.blocks.iter_mut() {
            for block in blocks.iter_mut() {
                *block = [0; 64];
                block[0] = (next() % 1201) as i16 - 600;
                for k in 1..10 {
                    let v = (next() % 61) as i16 - 30;
                    block[NATURAL_ORDER[k]] = if next() % 3 == 0 { 0 } else { v };
                }
                if next() % 4 == 0 {
                    block[NATURAL_ORDER[40]] = (next() % 9) as i16 - 4;
                }
            }
        }
    }
}

/// Parameters of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    pub components: Vec<usize>,
    pub ss: u8,
    pub se: u8,
    pub ah: u8,
    pub al: u8,
}

impl ScanSpec {
    pub fn sequential(components: Vec<usize>) -> Self {
        Self {
            components,
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
        }
    }

    pub fn progressive(components: Vec<usize>, ss: u8, se: u8, ah: u8, al: u8) -> Self {
        Self {
            components,
            ss,
            se,
            ah,
            al,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub jfif: bool,
    pub adobe_transform: Option<u8>,
    pub progressive: bool,
    /// MCUs between restart markers; 0 for none.
    pub restart_interval: u16,
    /// Every quantization table entry.
    pub quant: u8,
    /// Scans in order. Empty means one interleaved sequential scan.
    pub scans: Vec<ScanSpec>,
    /// APPn/COM segments written after the JFIF/Adobe markers.
    pub extra_markers: Vec<(u8, Vec<u8>)>,
    pub write_tables: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            jfif: true,
            adobe_transform: None,
            progressive: false,
            restart_interval: 0,
            quant: 1,
            scans: vec![],
            extra_markers: vec![],
            write_tables: true,
        }
    }
}

impl EncodeOptions {
    /// Spectral selection and successive approximation over every band
    /// kind: DC first, AC first, AC refinement and DC refinement.
    pub fn progressive_scans(num_components: usize) -> Vec<ScanSpec> {
        let all: Vec<usize> = (0..num_components).collect();
        let mut scans = vec![ScanSpec::progressive(all.clone(), 0, 0, 0, 1)];
        for c in 0..num_components {
            scans.push(ScanSpec::progressive(vec![c], 1, 5, 0, 1));
            scans.push(ScanSpec::progressive(vec![c], 6, 63, 0, 0));
        }
        for c in 0..num_components {
            scans.push(ScanSpec::progressive(vec![c], 1, 5, 1, 0));
        }
        scans.push(ScanSpec::progressive(all, 0, 0, 1, 0));
        scans
    }
}

struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: vec![],
            acc: 0,
            nbits: 0,
        }
    }

    fn put(&mut self, value: u32, nbits: u32) {
        for i in (0..nbits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1);
            self.nbits += 1;
            if self.nbits == 8 {
                let byte = self.acc as u8;
                self.out.push(byte);
                if byte == 0xff {
                    self.out.push(0);
                }
                self.acc = 0;
                self.nbits = 0;
            }
        }
    }

    /// Pads the last byte with one bits.
    fn flush(&mut self) {
        if self.nbits > 0 {
            self.put(0x7f, 8 - self.nbits);
        }
    }
}

fn category(v: i32) -> u32 {
    32 - v.unsigned_abs().leading_zeros()
}

fn extra_bits(v: i32, size: u32) -> u32 {
    let bits = (if v < 0 { v - 1 } else { v }) as u32;
    bits & ((1 << size) - 1)
}

/// `v` divided by `2^al`, rounding toward zero as the point transform does.
fn point_transform(v: i16, al: u8) -> i32 {
    let v = v as i32;
    if v < 0 { -((-v) >> al) } else { v >> al }
}

struct ScanEncoder<'a> {
    bits: BitWriter,
    scan: &'a ScanSpec,
    last_dc: Vec<i32>,
}

impl ScanEncoder<'_> {
    fn encode_block(&mut self, slot: usize, block: &Block) {
        let scan = self.scan;
        if scan.ss == 0 {
            if scan.ah == 0 {
                let dc = (block[0] as i32) >> scan.al;
                let diff = dc - self.last_dc[slot];
                self.last_dc[slot] = dc;
                let s = category(diff);
                self.bits.put(s, 4);
                self.bits.put(extra_bits(diff, s), s);
            } else {
                self.bits.put(((block[0] as i32) >> scan.al) as u32 & 1, 1);
            }
            if scan.se == 0 {
                return;
            }
        }
        let start = scan.ss.max(1) as usize;
        if scan.ah == 0 {
            self.encode_ac_first(block, start);
        } else {
            self.encode_ac_refine(block, start);
        }
    }

    fn encode_ac_first(&mut self, block: &Block, start: usize) {
        let scan = self.scan;
        let mut run = 0;
        for k in start..=scan.se as usize {
            let v = point_transform(block[NATURAL_ORDER[k]], scan.al);
            if v == 0 {
                run += 1;
                continue;
            }
            while run > 15 {
                self.bits.put(0xf0, 8);
                run -= 16;
            }
            let s = category(v);
            self.bits.put((run << 4) | s, 8);
            self.bits.put(extra_bits(v, s), s);
            run = 0;
        }
        if run > 0 {
            self.bits.put(0x00, 8);
        }
    }

    fn encode_ac_refine(&mut self, block: &Block, start: usize) {
        let scan = self.scan;
        let se = scan.se as usize;
        let abs: Vec<u32> = (0..64)
            .map(|k| (block[NATURAL_ORDER[k]].unsigned_abs() as u32) >> scan.al)
            .collect();
        let eob = (start..=se).filter(|&k| abs[k] == 1).max().unwrap_or(0);
        let mut run = 0;
        let mut pending: Vec<u32> = vec![];
        for k in start..=se {
            let temp = abs[k];
            if temp == 0 {
                run += 1;
                continue;
            }
            while run > 15 && k <= eob {
                self.bits.put(0xf0, 8);
                run -= 16;
                for b in pending.drain(..) {
                    self.bits.put(b, 1);
                }
            }
            if temp > 1 {
                pending.push(temp & 1);
                continue;
            }
            self.bits.put((run << 4) | 1, 8);
            self.bits.put(u32::from(block[NATURAL_ORDER[k]] >= 0), 1);
            for b in pending.drain(..) {
                self.bits.put(b, 1);
            }
            run = 0;
        }
        if run > 0 || !pending.is_empty() {
            self.bits.put(0x00, 8);
            for b in pending.drain(..) {
                self.bits.put(b, 1);
            }
        }
    }
}

fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.extend([0xff, marker]);
    out.extend(((payload.len() + 2) as u16).to_be_bytes());
    out.extend(payload);
}

/// DHT payload for both table slots: DC codes of 4 bits for symbols 0..=11,
/// AC codes of 8 bits for symbols 0..=254.
pub fn test_huffman_tables() -> Vec<u8> {
    let mut payload = vec![];
    for slot in 0..2u8 {
        payload.push(slot);
        let mut counts = [0u8; 16];
        counts[3] = 12;
        payload.extend(counts);
        payload.extend(0..12u8);
    }
    for slot in 0..2u8 {
        payload.push(0x10 | slot);
        let mut counts = [0u8; 16];
        counts[7] = 255;
        payload.extend(counts);
        payload.extend(0..255u8);
    }
    payload
}

fn quant_tables(value: u8) -> Vec<u8> {
    let mut payload = vec![];
    for slot in 0..2u8 {
        payload.push(slot);
        payload.extend([value; 64]);
    }
    payload
}

/// Writes a complete datastream for `image`.
pub fn encode(image: &TestImage, options: &EncodeOptions) -> Vec<u8> {
    let mut out = vec![0xff, 0xd8];
    if options.jfif {
        segment(&mut out, 0xe0, b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00");
    }
    if let Some(transform) = options.adobe_transform {
        let mut payload = b"Adobe\x00\x64\x00\x00\x00\x00".to_vec();
        payload.push(transform);
        segment(&mut out, 0xee, &payload);
    }
    for (marker, payload) in &options.extra_markers {
        segment(&mut out, *marker, payload);
    }
    if options.write_tables {
        segment(&mut out, 0xdb, &quant_tables(options.quant));
    }

    let mut sof = vec![8];
    sof.extend((image.height as u16).to_be_bytes());
    sof.extend((image.width as u16).to_be_bytes());
    sof.push(image.components.len() as u8);
    for comp in &image.components {
        sof.extend([comp.id, ((comp.h << 4) | comp.v) as u8, comp.table as u8]);
    }
    segment(&mut out, if options.progressive { 0xc2 } else { 0xc0 }, &sof);
    if options.write_tables {
        segment(&mut out, 0xc4, &test_huffman_tables());
    }
    if options.restart_interval > 0 {
        segment(&mut out, 0xdd, &options.restart_interval.to_be_bytes());
    }

    let default_scan = [ScanSpec::sequential((0..image.components.len()).collect())];
    let scans = if options.scans.is_empty() {
        &default_scan[..]
    } else {
        &options.scans[..]
    };
    for scan in scans {
        let mut sos = vec![scan.components.len() as u8];
        for &c in &scan.components {
            let t = image.components[c].table as u8;
            sos.extend([image.components[c].id, (t << 4) | t]);
        }
        sos.extend([scan.ss, scan.se, (scan.ah << 4) | scan.al]);
        segment(&mut out, 0xda, &sos);
        out.extend(encode_scan(image, scan, options.restart_interval));
    }
    out.extend([0xff, 0xd9]);
    out
}

fn encode_scan(image: &TestImage, scan: &ScanSpec, restart_interval: u16) -> Vec<u8> {
    // Each MCU is a list of (slot in scan, component, block x, block y).
    let mut mcus: Vec<Vec<(usize, usize, usize, usize)>> = vec![];
    if scan.components.len() == 1 {
        let c = scan.components[0];
        for by in 0..image.height_in_blocks(c) {
            for bx in 0..image.width_in_blocks(c) {
                mcus.push(vec![(0, c, bx, by)]);
            }
        }
    } else {
        for my in 0..image.mcus_high() {
            for mx in 0..image.mcus_wide() {
                let mut mcu = vec![];
                for (slot, &c) in scan.components.iter().enumerate() {
                    let comp = image.components[c];
                    for v in 0..comp.v {
                        for h in 0..comp.h {
                            mcu.push((slot, c, mx * comp.h + h, my * comp.v + v));
                        }
                    }
                }
                mcus.push(mcu);
            }
        }
    }

    let mut enc = ScanEncoder {
        bits: BitWriter::new(),
        scan,
        last_dc: vec![0; scan.components.len()],
    };
    let mut restart = 0u8;
    for (i, mcu) in mcus.iter().enumerate() {
        if restart_interval > 0 && i > 0 && i % restart_interval as usize == 0 {
            enc.bits.flush();
            enc.bits.out.extend([0xff, 0xd0 + restart]);
            restart = (restart + 1) % 8;
            enc.last_dc.fill(0);
        }
        for &(slot, c, bx, by) in mcu {
            enc.encode_block(slot, image.block(c, bx, by));
        }
    }
    enc.bits.flush();
    enc.bits.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_integers() {
        assert_almost_eq!(100, 101, 2);
        assert_almost_eq!(777u32, 770, 7);
    }

    #[test]
    fn test_panic() {
        let result = std::panic::catch_unwind(|| {
            assert_almost_eq!(100, 105, 2);
        });
        assert!(result.is_err());
    }

    #[test]
    fn bit_writer_stuffs_and_pads() {
        let mut w = BitWriter::new();
        w.put(0xff, 8);
        w.put(0b101, 3);
        w.flush();
        assert_eq!(w.out, vec![0xff, 0x00, 0xbf]);
    }

    #[test]
    fn categories() {
        assert_eq!(category(0), 0);
        assert_eq!(category(-1), 1);
        assert_eq!(category(5), 3);
        assert_eq!(extra_bits(-3, 2), 0b00);
        assert_eq!(extra_bits(3, 2), 0b11);
        assert_eq!(point_transform(-3, 1), -1);
    }

    #[test]
    fn geometry() {
        let image = TestImage::new(17, 9, &[(2, 2), (1, 1), (1, 1)]);
        assert_eq!((image.mcus_wide(), image.mcus_high()), (2, 1));
        assert_eq!(image.blocks_wide(0), 4);
        assert_eq!(image.width_in_blocks(0), 3);
        assert_eq!(image.width_in_blocks(1), 2);
        assert_eq!(image.height_in_blocks(1), 1);
    }

    #[test]
    fn stream_structure() {
        let image = TestImage::new(8, 8, &[(1, 1)]);
        let data = encode(&image, &EncodeOptions::default());
        assert_eq!(&data[..2], &[0xff, 0xd8]);
        assert_eq!(&data[data.len() - 2..], &[0xff, 0xd9]);
        // A zero block is DC category 0 (0000) then EOB (00000000).
        assert_eq!(data[data.len() - 4..data.len() - 2], [0x00, 0x0f]);
    }
}
