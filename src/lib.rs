// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![deny(unsafe_code)]
pub mod decode;
pub mod encode;
pub mod error;
pub mod headers;
pub mod io;
pub mod markers;
pub mod memory;
pub mod report;
pub mod stages;
pub mod util;

pub const BLOCK_DIM: usize = 8;
pub const BLOCK_SIZE: usize = BLOCK_DIM * BLOCK_DIM;

/// Quantized transform coefficients of one block, in natural (row-major) order.
pub type Block = [i16; BLOCK_SIZE];

/// Components in one frame.
pub const MAX_COMPONENTS: usize = 10;
/// Components in one scan.
pub const MAX_COMPS_IN_SCAN: usize = 4;
/// Blocks in one interleaved MCU.
pub const MAX_BLOCKS_IN_MCU: usize = 10;
pub const MAX_SAMP_FACTOR: u8 = 4;
pub const NUM_QUANT_TABLES: usize = 4;
pub const NUM_ENTROPY_TABLES: usize = 4;

/// `NATURAL_ORDER[k]` is the natural-order position of the `k`-th coefficient in zigzag order.
pub const NATURAL_ORDER: [usize; BLOCK_SIZE] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Outcome of an operation that may run out of input before completing.
///
/// `NeedsMoreInput` is not an error: nothing observable has changed except for input bytes that
/// were consumed, and the operation can be called again once more data is available.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessingResult<T> {
    Complete { result: T },
    NeedsMoreInput,
}

impl<T> ProcessingResult<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, ProcessingResult::Complete { .. })
    }

    /// Returns the result, or `None` if more input is needed.
    pub fn complete(self) -> Option<T> {
        match self {
            ProcessingResult::Complete { result } => Some(result),
            ProcessingResult::NeedsMoreInput => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_is_a_permutation() {
        let mut seen = [false; BLOCK_SIZE];
        for &k in NATURAL_ORDER.iter() {
            assert!(!seen[k]);
            seen[k] = true;
        }
        // The zigzag walk visits the first row and column in alternating diagonals.
        assert_eq!(&NATURAL_ORDER[..6], &[0, 1, 8, 16, 9, 2]);
        assert_eq!(NATURAL_ORDER[BLOCK_SIZE - 1], BLOCK_SIZE - 1);
    }
}
