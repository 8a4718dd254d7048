// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::QuantTable;
use crate::{
    BLOCK_DIM, MAX_COMPONENTS, MAX_SAMP_FACTOR,
    error::{Error, Result},
    util::round_up,
};

/// Largest accepted image dimension.
pub const MAX_DIMENSION: usize = 65500;

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
    pub id: u8,
    pub h_samp: u8,
    pub v_samp: u8,
    pub quant_index: usize,
    pub dc_table: usize,
    pub ac_table: usize,
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    pub downsampled_width: usize,
    pub downsampled_height: usize,
    /// Quantization table latched when the component's first scan started.
    pub quant: Option<QuantTable>,
}

impl ComponentInfo {
    pub fn new(id: u8, h_samp: u8, v_samp: u8, quant_index: usize) -> Self {
        Self {
            id,
            h_samp,
            v_samp,
            quant_index,
            dc_table: 0,
            ac_table: 0,
            width_in_blocks: 0,
            height_in_blocks: 0,
            downsampled_width: 0,
            downsampled_height: 0,
            quant: None,
        }
    }

    /// Width of the coefficient arrays: a whole number of MCUs.
    pub fn padded_width_in_blocks(&self) -> usize {
        round_up(self.width_in_blocks, self.h_samp as usize)
    }

    pub fn padded_height_in_blocks(&self) -> usize {
        round_up(self.height_in_blocks, self.v_samp as usize)
    }
}

/// Frame-level geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    pub precision: u8,
    pub width: usize,
    pub height: usize,
    pub progressive: bool,
    pub components: Vec<ComponentInfo>,
    pub max_h: u8,
    pub max_v: u8,
    /// Number of row-bands (iMCU rows) in the image.
    pub total_imcu_rows: usize,
}

impl FrameHeader {
    /// Validates the frame parameters and derives the per-component geometry.
    pub fn new(
        width: usize,
        height: usize,
        progressive: bool,
        mut components: Vec<ComponentInfo>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage(width, height));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::ImageTooBig(width, height));
        }
        if components.is_empty() || components.len() > MAX_COMPONENTS {
            return Err(Error::ComponentCount(components.len(), MAX_COMPONENTS));
        }
        for c in components.iter() {
            let valid = 1..=MAX_SAMP_FACTOR;
            if !valid.contains(&c.h_samp) || !valid.contains(&c.v_samp) {
                return Err(Error::BadSampling(c.h_samp, c.v_samp));
            }
        }
        let max_h = components.iter().map(|c| c.h_samp).max().unwrap_or(1);
        let max_v = components.iter().map(|c| c.v_samp).max().unwrap_or(1);
        let (mh, mv) = (max_h as usize, max_v as usize);
        for c in components.iter_mut() {
            let (h, v) = (c.h_samp as usize, c.v_samp as usize);
            c.width_in_blocks = (width * h).div_ceil(mh * BLOCK_DIM);
            c.height_in_blocks = (height * v).div_ceil(mv * BLOCK_DIM);
            c.downsampled_width = (width * h).div_ceil(mh);
            c.downsampled_height = (height * v).div_ceil(mv);
            c.quant = None;
        }
        Ok(Self {
            precision: 8,
            width,
            height,
            progressive,
            components,
            max_h,
            max_v,
            total_imcu_rows: height.div_ceil(mv * BLOCK_DIM),
        })
    }

    /// Pixel rows in one iMCU row.
    pub fn imcu_height(&self) -> usize {
        self.max_v as usize * BLOCK_DIM
    }

    /// Pixel columns in one interleaved MCU.
    pub fn mcu_pixel_width(&self) -> usize {
        self.max_h as usize * BLOCK_DIM
    }

    /// Index of the component with identifier `id`.
    pub fn component_index(&self, id: u8) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn subsampled_geometry() -> Result<()> {
        let frame = FrameHeader::new(
            33,
            17,
            false,
            vec![
                ComponentInfo::new(1, 2, 2, 0),
                ComponentInfo::new(2, 1, 1, 1),
                ComponentInfo::new(3, 1, 1, 1),
            ],
        )?;
        assert_eq!(frame.total_imcu_rows, 2);
        let y = &frame.components[0];
        assert_eq!((y.width_in_blocks, y.height_in_blocks), (5, 3));
        assert_eq!((y.padded_width_in_blocks(), y.padded_height_in_blocks()), (6, 4));
        let cb = &frame.components[1];
        assert_eq!((cb.width_in_blocks, cb.height_in_blocks), (3, 2));
        assert_eq!((cb.downsampled_width, cb.downsampled_height), (17, 9));
        Ok(())
    }

    #[test]
    fn rejects_bad_frames() {
        let one = || vec![ComponentInfo::new(1, 1, 1, 0)];
        assert!(matches!(
            FrameHeader::new(0, 8, false, one()),
            Err(Error::EmptyImage(0, 8))
        ));
        assert!(matches!(
            FrameHeader::new(70000, 8, false, one()),
            Err(Error::ImageTooBig(..))
        ));
        assert!(matches!(
            FrameHeader::new(8, 8, false, vec![ComponentInfo::new(1, 5, 1, 0)]),
            Err(Error::BadSampling(5, 1))
        ));
        assert!(matches!(
            FrameHeader::new(8, 8, false, vec![]),
            Err(Error::ComponentCount(0, _))
        ));
    }
}
