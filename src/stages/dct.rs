// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use super::{DequantBlock, ForwardTransform, InverseTransform, SampleBlock};
use crate::{BLOCK_DIM, Block, headers::QuantTable};

const CENTER: f32 = 128.0;

/// Separable floating point 8x8 DCT.
pub struct FloatDct {
    /// `basis[u][x]` is the orthonormal DCT-II basis function `u` sampled at `x`.
    basis: [[f32; BLOCK_DIM]; BLOCK_DIM],
}

impl Default for FloatDct {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FloatDct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "float DCT {BLOCK_DIM}x{BLOCK_DIM}")
    }
}

impl FloatDct {
    pub fn new() -> Self {
        let basis = array_init::array_init(|u| {
            let scale = 0.5 * if u == 0 { FRAC_1_SQRT_2 } else { 1.0 };
            array_init::array_init(|x| {
                scale * ((2 * x + 1) as f32 * u as f32 * PI / (2 * BLOCK_DIM) as f32).cos()
            })
        });
        Self { basis }
    }

    /// Applies `basis` (or its transpose) along both dimensions of `block`.
    fn transform_2d(&self, block: &mut [[f32; BLOCK_DIM]; BLOCK_DIM], forward: bool) {
        let apply = |input: &[f32; BLOCK_DIM]| -> [f32; BLOCK_DIM] {
            array_init::array_init(|i| {
                (0..BLOCK_DIM)
                    .map(|j| {
                        let b = if forward {
                            self.basis[i][j]
                        } else {
                            self.basis[j][i]
                        };
                        b * input[j]
                    })
                    .sum()
            })
        };
        for row in block.iter_mut() {
            *row = apply(row);
        }
        for x in 0..BLOCK_DIM {
            let column: [f32; BLOCK_DIM] = array_init::array_init(|y| block[y][x]);
            for (y, v) in apply(&column).into_iter().enumerate() {
                block[y][x] = v;
            }
        }
    }
}

impl InverseTransform for FloatDct {
    fn inverse(&mut self, coefficients: &DequantBlock, output: &mut SampleBlock) {
        let mut block: [[f32; BLOCK_DIM]; BLOCK_DIM] =
            array_init::array_init(|v| array_init::array_init(|u| coefficients[v * BLOCK_DIM + u] as f32));
        self.transform_2d(&mut block, false);
        for (out_row, row) in output.iter_mut().zip(block.iter()) {
            for (out, &v) in out_row.iter_mut().zip(row.iter()) {
                *out = (v + CENTER).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

impl ForwardTransform for FloatDct {
    fn forward(&mut self, samples: &SampleBlock, quant: &QuantTable, output: &mut Block) {
        let mut block: [[f32; BLOCK_DIM]; BLOCK_DIM] =
            array_init::array_init(|y| array_init::array_init(|x| samples[y][x] as f32 - CENTER));
        self.transform_2d(&mut block, true);
        for (k, out) in output.iter_mut().enumerate() {
            let q = quant.values[k].max(1) as f32;
            *out = (block[k / BLOCK_DIM][k % BLOCK_DIM] / q)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn flat_block() {
        let mut dct = FloatDct::new();
        let mut coefficients = [0; BLOCK_SIZE];
        dct.forward(&[[200; BLOCK_DIM]; BLOCK_DIM], &QuantTable::flat(1), &mut coefficients);
        assert_eq!(coefficients[0], 576);
        assert!(coefficients[1..].iter().all(|&c| c == 0));

        let dequant: DequantBlock = array_init::array_init(|k| coefficients[k] as i32);
        let mut samples = [[0; BLOCK_DIM]; BLOCK_DIM];
        dct.inverse(&dequant, &mut samples);
        assert_eq!(samples, [[200; BLOCK_DIM]; BLOCK_DIM]);
    }

    #[test]
    fn unit_quantizer_round_trip_is_near_lossless() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let mut dct = FloatDct::new();
        for _ in 0..20 {
            let samples: SampleBlock =
                array_init::array_init(|_| array_init::array_init(|_| rng.random_range(0..=255)));
            let mut coefficients = [0; BLOCK_SIZE];
            dct.forward(&samples, &QuantTable::flat(1), &mut coefficients);
            let dequant: DequantBlock = array_init::array_init(|k| coefficients[k] as i32);
            let mut back = [[0; BLOCK_DIM]; BLOCK_DIM];
            dct.inverse(&dequant, &mut back);
            for (a, b) in samples.iter().flatten().zip(back.iter().flatten()) {
                assert!(a.abs_diff(*b) <= 2, "{a} vs {b}");
            }
        }
    }
}
