// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Uncompressed coefficient coding with the scan structure of the real entropy coders.
//!
//! First scans of a band store every coefficient as a big-endian 16-bit value, shifted right by
//! `al`; DC values are coded as differences from the previous block of the same component.
//! Refinement scans store one byte per coefficient holding the next bit and the sign.

use super::{EntropyDecoder, EntropyEncoder};
use crate::{
    Block, MAX_COMPS_IN_SCAN, NATURAL_ORDER,
    error::Result,
    headers::{ScanInfo, ScanLayout, TableSet},
    io::{EntropyReader, EntropyWriter},
    util::tracing_wrappers::*,
};

/// Per-pass parameters shared by both directions.
#[derive(Debug, Default, Clone)]
struct PassInfo {
    ss: usize,
    se: usize,
    ah: u8,
    al: u8,
    /// Scan component of every block in an MCU.
    membership: Vec<usize>,
}

impl PassInfo {
    fn new(scan: &ScanInfo, layout: &ScanLayout) -> Self {
        Self {
            ss: scan.ss as usize,
            se: scan.se as usize,
            ah: scan.ah,
            al: scan.al,
            membership: layout.membership.clone(),
        }
    }

    fn refinement(&self) -> bool {
        self.ah != 0
    }

    fn first_ac(&self) -> usize {
        self.ss.max(1)
    }
}

/// `value` with its magnitude shifted right by `al`.
fn shift_magnitude(value: i16, al: u8) -> i16 {
    let magnitude = (value as i32).abs() >> al;
    (if value < 0 { -magnitude } else { magnitude }) as i16
}

#[derive(Debug, Default)]
pub struct PlainEntropyDecoder {
    pass: PassInfo,
    last_dc: [i16; MAX_COMPS_IN_SCAN],
    values: Vec<u16>,
}

impl PlainEntropyDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntropyDecoder for PlainEntropyDecoder {
    fn start_pass(
        &mut self,
        scan: &ScanInfo,
        layout: &ScanLayout,
        _tables: &TableSet,
    ) -> Result<()> {
        self.pass = PassInfo::new(scan, layout);
        self.last_dc = [0; MAX_COMPS_IN_SCAN];
        trace!(?scan, "plain entropy decoder pass");
        Ok(())
    }

    fn restart(&mut self) {
        self.last_dc = [0; MAX_COMPS_IN_SCAN];
    }

    fn decode_mcu(&mut self, reader: &mut EntropyReader<'_>, blocks: &mut [Block]) -> Result<bool> {
        let pass = &self.pass;
        // Everything is read before anything is stored, so running out of input leaves both the
        // blocks and the predictors untouched.
        self.values.clear();
        for _ in 0..blocks.len() {
            if pass.refinement() {
                for _ in pass.ss..=pass.se {
                    let Some(byte) = reader.read_byte()? else {
                        return Ok(false);
                    };
                    self.values.push(byte as u16);
                }
            } else {
                let count = usize::from(pass.ss == 0) + (pass.first_ac()..=pass.se).count();
                for _ in 0..count {
                    let Some(v) = reader.read_u16()? else {
                        return Ok(false);
                    };
                    self.values.push(v);
                }
            }
        }

        let mut values = self.values.iter().copied();
        for (block, &comp) in blocks.iter_mut().zip(pass.membership.iter()) {
            if pass.refinement() {
                for k in pass.ss..=pass.se {
                    let byte = values.next().unwrap_or(0);
                    let (bit, negative) = (byte & 1, byte & 2 != 0);
                    let coef = &mut block[NATURAL_ORDER[k]];
                    if k == 0 {
                        *coef |= (bit << pass.al) as i16;
                    } else if bit != 0 {
                        let step = 1i16 << pass.al;
                        *coef = match *coef {
                            0 if negative => -step,
                            0 => step,
                            c if c < 0 => c - step,
                            c => c + step,
                        };
                    }
                }
                continue;
            }
            if pass.ss == 0 {
                let diff = values.next().unwrap_or(0) as i16;
                let dc = self.last_dc[comp].wrapping_add(diff);
                self.last_dc[comp] = dc;
                block[0] = dc.wrapping_shl(pass.al as u32);
            }
            for k in pass.first_ac()..=pass.se {
                let v = values.next().unwrap_or(0) as i16;
                block[NATURAL_ORDER[k]] = v.wrapping_shl(pass.al as u32);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct PlainEntropyEncoder {
    pass: PassInfo,
    last_dc: [i16; MAX_COMPS_IN_SCAN],
}

impl PlainEntropyEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntropyEncoder for PlainEntropyEncoder {
    fn start_pass(
        &mut self,
        scan: &ScanInfo,
        layout: &ScanLayout,
        _tables: &TableSet,
    ) -> Result<()> {
        self.pass = PassInfo::new(scan, layout);
        self.last_dc = [0; MAX_COMPS_IN_SCAN];
        Ok(())
    }

    fn encode_mcu(&mut self, writer: &mut EntropyWriter<'_>, blocks: &[Block]) -> Result<()> {
        let pass = &self.pass;
        for (block, &comp) in blocks.iter().zip(pass.membership.iter()) {
            if pass.refinement() {
                for k in pass.ss..=pass.se {
                    let c = block[NATURAL_ORDER[k]];
                    let bit = if k == 0 {
                        (c >> pass.al) & 1
                    } else {
                        ((c as i32).abs() >> pass.al) as i16 & 1
                    };
                    writer.emit_byte(bit as u8 | (((c < 0) as u8) << 1))?;
                }
                continue;
            }
            if pass.ss == 0 {
                let dc = block[0] >> pass.al;
                writer.emit_u16(dc.wrapping_sub(self.last_dc[comp]) as u16)?;
                self.last_dc[comp] = dc;
            }
            for k in pass.first_ac()..=pass.se {
                writer.emit_u16(shift_magnitude(block[NATURAL_ORDER[k]], pass.al) as u16)?;
            }
        }
        Ok(())
    }

    fn restart(&mut self, _writer: &mut EntropyWriter<'_>) -> Result<()> {
        self.last_dc = [0; MAX_COMPS_IN_SCAN];
        Ok(())
    }

    fn finish_pass(&mut self, _writer: &mut EntropyWriter<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    use super::*;
    use crate::{
        BLOCK_SIZE,
        headers::{ComponentInfo, FrameHeader},
        io::{MemorySource, SuspendingSource, VecDestination},
    };

    fn layout() -> (FrameHeader, ScanLayout) {
        let comps = vec![ComponentInfo::new(1, 2, 1, 0), ComponentInfo::new(2, 1, 1, 0)];
        let frame = FrameHeader::new(16, 8, true, comps).unwrap();
        let layout = ScanLayout::new(&frame, &[0, 1]).unwrap();
        (frame, layout)
    }

    fn random_blocks(rng: &mut XorShiftRng, n: usize) -> Vec<Block> {
        (0..n)
            .map(|_| array_init::array_init(|_| rng.random_range(-300..300)))
            .collect()
    }

    /// Codes `blocks` with the successive approximation `script` and decodes them again.
    fn code(script: &[ScanInfo], blocks: &[Block]) -> Result<Vec<Block>> {
        let (_, layout) = layout();
        let tables = TableSet::default();
        let mut decoded = vec![[0; BLOCK_SIZE]; blocks.len()];
        for scan in script {
            let mut dest = VecDestination::new();
            let mut encoder = PlainEntropyEncoder::new();
            encoder.start_pass(scan, &layout, &tables)?;
            let mut writer = EntropyWriter::new(&mut dest);
            encoder.encode_mcu(&mut writer, blocks)?;
            encoder.finish_pass(&mut writer)?;
            writer.flush()?;
            let data = dest.into_inner();

            let mut src = MemorySource::new(&data);
            let mut decoder = PlainEntropyDecoder::new();
            decoder.start_pass(scan, &layout, &tables)?;
            let mut reader = EntropyReader::new(&mut src, false);
            assert!(decoder.decode_mcu(&mut reader, &mut decoded)?);
            assert!(!reader.hit_marker());
        }
        Ok(decoded)
    }

    #[test]
    fn successive_approximation_reconstructs_exactly() -> Result<()> {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let script = [
            ScanInfo::progressive(vec![0, 1], 0, 0, 0, 2),
            ScanInfo::progressive(vec![0, 1], 0, 0, 2, 1),
            ScanInfo::progressive(vec![0, 1], 1, 63, 0, 3),
            ScanInfo::progressive(vec![0, 1], 0, 0, 1, 0),
            ScanInfo::progressive(vec![0, 1], 1, 63, 3, 2),
            ScanInfo::progressive(vec![0, 1], 1, 63, 2, 1),
            ScanInfo::progressive(vec![0, 1], 1, 63, 1, 0),
        ];
        for _ in 0..10 {
            let blocks = random_blocks(&mut rng, 3);
            assert_eq!(code(&script, &blocks)?, blocks);
        }
        Ok(())
    }

    #[test]
    fn partial_precision_truncates_toward_zero() -> Result<()> {
        let mut block = [0; BLOCK_SIZE];
        block[0] = -7;
        block[1] = -7;
        block[8] = 5;
        let script = [
            ScanInfo::progressive(vec![0, 1], 0, 0, 0, 1),
            ScanInfo::progressive(vec![0, 1], 1, 63, 0, 1),
        ];
        let decoded = code(&script, &[block; 3])?;
        // DC uses an arithmetic shift, AC the magnitude.
        assert_eq!(decoded[0][0], -8);
        assert_eq!(decoded[0][1], -6);
        assert_eq!(decoded[0][8], 4);
        Ok(())
    }

    #[test]
    fn suspension_leaves_state_untouched() -> Result<()> {
        let (_, layout) = layout();
        let tables = TableSet::default();
        let scan = ScanInfo::progressive(vec![0, 1], 0, 0, 0, 0);
        let mut dest = VecDestination::new();
        let mut encoder = PlainEntropyEncoder::new();
        encoder.start_pass(&scan, &layout, &tables)?;
        let mut writer = EntropyWriter::new(&mut dest);
        let mut mcu = [[0; BLOCK_SIZE]; 3];
        for dc in [10, 20] {
            mcu.iter_mut().for_each(|b| b[0] = dc);
            encoder.encode_mcu(&mut writer, &mcu)?;
        }
        writer.flush()?;
        let data = dest.into_inner();

        let mut src = SuspendingSource::new();
        let mut decoder = PlainEntropyDecoder::new();
        decoder.start_pass(&scan, &layout, &tables)?;
        src.push(&data[..9]);
        let mut out = [[0; BLOCK_SIZE]; 3];
        {
            let mut reader = EntropyReader::new(&mut src, false);
            assert!(decoder.decode_mcu(&mut reader, &mut out)?);
            reader.commit();
        }
        {
            let mut reader = EntropyReader::new(&mut src, false);
            assert!(!decoder.decode_mcu(&mut reader, &mut out)?);
        }
        src.push(&data[9..]);
        let mut reader = EntropyReader::new(&mut src, false);
        assert!(decoder.decode_mcu(&mut reader, &mut out)?);
        assert!(out.iter().all(|b| b[0] == 20));
        Ok(())
    }
}
