// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Pluggable processing stages.
//!
//! The core only orchestrates: it decides when each stage runs and on which data, and never looks
//! at how coefficients are coded, transformed or converted. Each role is a trait; the decompressor
//! and the compressor hold boxed trait objects chosen when processing starts.

pub mod color;
pub mod dct;
pub mod plain_entropy;
pub mod sampling;

pub use color::{ColorConverter, ColorDeconverter, select_converter, select_deconverter};
pub use dct::FloatDct;
pub use plain_entropy::{PlainEntropyDecoder, PlainEntropyEncoder};
pub use sampling::{BoxDownsampler, BoxUpsampler, Downsampler, Upsampler};

use crate::{
    BLOCK_DIM, BLOCK_SIZE, Block,
    error::Result,
    headers::{QuantTable, ScanInfo, ScanLayout, TableSet},
    io::{EntropyReader, EntropyWriter},
    util::vec_helpers::try_filled,
};

pub trait EntropyDecoder {
    fn start_pass(&mut self, scan: &ScanInfo, layout: &ScanLayout, tables: &TableSet)
    -> Result<()>;

    /// Resets the decoder state at a restart boundary.
    fn restart(&mut self);

    /// Decodes one MCU into `blocks`, which hold the coefficients decoded by earlier scans. Returns
    /// `false` if the reader ran out of input; the decoder state must then be unchanged, the caller
    /// discards `blocks` and retries the same MCU later.
    fn decode_mcu(&mut self, reader: &mut EntropyReader<'_>, blocks: &mut [Block]) -> Result<bool>;
}

pub trait EntropyEncoder {
    fn start_pass(&mut self, scan: &ScanInfo, layout: &ScanLayout, tables: &TableSet)
    -> Result<()>;

    fn encode_mcu(&mut self, writer: &mut EntropyWriter<'_>, blocks: &[Block]) -> Result<()>;

    /// Flushes pending output and resets the encoder state. Called right before a restart marker.
    fn restart(&mut self, writer: &mut EntropyWriter<'_>) -> Result<()>;

    fn finish_pass(&mut self, writer: &mut EntropyWriter<'_>) -> Result<()>;
}

/// Dequantized coefficients of one block, natural order.
pub type DequantBlock = [i32; BLOCK_SIZE];

/// An 8x8 block of samples.
pub type SampleBlock = [[u8; BLOCK_DIM]; BLOCK_DIM];

pub trait InverseTransform {
    fn inverse(&mut self, coefficients: &DequantBlock, output: &mut SampleBlock);
}

pub trait ForwardTransform {
    /// Transforms and quantizes one block.
    fn forward(&mut self, samples: &SampleBlock, quant: &QuantTable, output: &mut Block);
}

/// A rectangle of 8-bit samples of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(Self {
            width,
            height,
            data: try_filled(width * height, 0)?,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    /// Copies a block of samples to block position (`bx`, `by`).
    pub fn put_block(&mut self, bx: usize, by: usize, block: &SampleBlock) {
        for (dy, src) in block.iter().enumerate() {
            let x0 = bx * BLOCK_DIM;
            self.row_mut(by * BLOCK_DIM + dy)[x0..x0 + BLOCK_DIM].copy_from_slice(src);
        }
    }

    pub fn get_block(&self, bx: usize, by: usize, block: &mut SampleBlock) {
        for (dy, dst) in block.iter_mut().enumerate() {
            let x0 = bx * BLOCK_DIM;
            dst.copy_from_slice(&self.row(by * BLOCK_DIM + dy)[x0..x0 + BLOCK_DIM]);
        }
    }

    /// Replicates the last valid column and row into the padding.
    pub fn replicate_edges(&mut self, valid_width: usize, valid_height: usize) {
        if valid_width == 0 || valid_height == 0 {
            return;
        }
        for y in 0..valid_height.min(self.height) {
            let row = self.row_mut(y);
            let edge = row[valid_width - 1];
            row[valid_width..].fill(edge);
        }
        for y in valid_height..self.height {
            let (done, rest) = self.data.split_at_mut(y * self.width);
            rest[..self.width].copy_from_slice(&done[(valid_height - 1) * self.width..][..self.width]);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn plane_blocks_and_edges() -> Result<()> {
        let mut plane = Plane::new(16, 16)?;
        let block: SampleBlock = array_init::array_init(|y| [y as u8; BLOCK_DIM]);
        plane.put_block(1, 0, &block);
        let mut back = [[0; BLOCK_DIM]; BLOCK_DIM];
        plane.get_block(1, 0, &mut back);
        assert_eq!(back, block);

        plane.row_mut(2)[4] = 9;
        plane.replicate_edges(5, 3);
        assert_eq!(plane.row(2)[15], 9);
        assert_eq!(plane.row(15)[4], 9);
        assert_eq!(plane.row(15)[3], 0);
        Ok(())
    }
}
