// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Display;

use super::Plane;
use crate::error::{Error, Result};

pub trait Upsampler: Display {
    /// Fills all of `output` from `input`.
    fn upsample(&mut self, input: &Plane, output: &mut Plane);
}

pub trait Downsampler: Display {
    /// Fills all of `output` from `input`, which must cover at least the same area at full
    /// resolution.
    fn downsample(&mut self, input: &Plane, output: &mut Plane);
}

fn ratio(max: u8, samp: u8) -> Result<usize> {
    if samp == 0 || max % samp != 0 {
        return Err(Error::FractionalSampling(samp, max));
    }
    Ok((max / samp) as usize)
}

/// Nearest-neighbor upsampling by integral factors.
#[derive(Debug, Clone, Copy)]
pub struct BoxUpsampler {
    h_ratio: usize,
    v_ratio: usize,
}

impl BoxUpsampler {
    /// Upsampler for a component with sampling factors `h`x`v` in a frame whose largest factors
    /// are `max_h`x`max_v`.
    pub fn new(max_h: u8, max_v: u8, h: u8, v: u8) -> Result<Self> {
        Ok(Self {
            h_ratio: ratio(max_h, h)?,
            v_ratio: ratio(max_v, v)?,
        })
    }
}

impl Display for BoxUpsampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "box upsampling {}x{}", self.h_ratio, self.v_ratio)
    }
}

impl Upsampler for BoxUpsampler {
    fn upsample(&mut self, input: &Plane, output: &mut Plane) {
        for y in 0..output.height() {
            let src = input.row(y / self.v_ratio);
            let dst = output.row_mut(y);
            if self.h_ratio == 1 {
                let n = dst.len();
                dst.copy_from_slice(&src[..n]);
                continue;
            }
            for (chunk, &v) in dst.chunks_mut(self.h_ratio).zip(src.iter()) {
                chunk.fill(v);
            }
        }
    }
}

/// Box-filter averaging by integral factors.
#[derive(Debug, Clone, Copy)]
pub struct BoxDownsampler {
    h_ratio: usize,
    v_ratio: usize,
}

impl BoxDownsampler {
    pub fn new(max_h: u8, max_v: u8, h: u8, v: u8) -> Result<Self> {
        Ok(Self {
            h_ratio: ratio(max_h, h)?,
            v_ratio: ratio(max_v, v)?,
        })
    }
}

impl Display for BoxDownsampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "box downsampling {}x{}", self.h_ratio, self.v_ratio)
    }
}

impl Downsampler for BoxDownsampler {
    fn downsample(&mut self, input: &Plane, output: &mut Plane) {
        let area = (self.h_ratio * self.v_ratio) as u32;
        for y in 0..output.height() {
            let rows: Vec<&[u8]> = (0..self.v_ratio)
                .map(|dy| input.row(y * self.v_ratio + dy))
                .collect();
            for (x, out) in output.row_mut(y).iter_mut().enumerate() {
                let x0 = x * self.h_ratio;
                let sum: u32 = rows
                    .iter()
                    .flat_map(|row| row[x0..x0 + self.h_ratio].iter())
                    .map(|&v| v as u32)
                    .sum();
                *out = ((sum + area / 2) / area) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn box_filters() -> Result<()> {
        let mut full = Plane::new(4, 2)?;
        full.row_mut(0).copy_from_slice(&[0, 2, 10, 10]);
        full.row_mut(1).copy_from_slice(&[4, 6, 20, 20]);
        let mut half = Plane::new(2, 1)?;
        BoxDownsampler::new(2, 2, 1, 1)?.downsample(&full, &mut half);
        assert_eq!(half.row(0), &[3, 15]);

        let mut back = Plane::new(4, 2)?;
        BoxUpsampler::new(2, 2, 1, 1)?.upsample(&half, &mut back);
        assert_eq!(back.row(1), &[3, 3, 15, 15]);
        Ok(())
    }

    #[test]
    fn fractional_ratios_are_rejected() {
        assert!(matches!(
            BoxUpsampler::new(3, 1, 2, 1),
            Err(Error::FractionalSampling(2, 3))
        ));
        assert!(BoxDownsampler::new(4, 2, 2, 1).is_ok());
    }
}
