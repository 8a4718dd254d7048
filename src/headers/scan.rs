// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::FrameHeader;
use crate::{
    BLOCK_SIZE, MAX_BLOCKS_IN_MCU, MAX_COMPS_IN_SCAN,
    error::{Error, Result},
    report::Warning,
};

/// Parameters of one scan: the components it covers and, for progressive images, the
/// coefficient band `ss..=se` (zigzag positions) and the successive approximation bit positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    /// Frame component indices in scan order.
    pub components: Vec<usize>,
    pub ss: u8,
    pub se: u8,
    pub ah: u8,
    pub al: u8,
}

impl ScanInfo {
    /// A full-precision scan over all coefficients.
    pub fn sequential(components: Vec<usize>) -> Self {
        Self {
            components,
            ss: 0,
            se: BLOCK_SIZE as u8 - 1,
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

    pub fn is_dc(&self) -> bool {
        self.ss == 0
    }

    pub fn is_refinement(&self) -> bool {
        self.ah != 0
    }

    fn is_full(&self) -> bool {
        self.ss == 0 && self.se as usize == BLOCK_SIZE - 1 && self.ah == 0 && self.al == 0
    }
}

/// Checks the parameters of a scan found in a datastream.
///
/// Invalid progressive parameters are fatal. A sequential scan with progressive parameters is
/// normalized to a full scan and reported as a warning.
pub fn check_scan_parameters(scan: &mut ScanInfo, progressive: bool) -> Result<Option<Warning>> {
    if progressive {
        let mut invalid = if scan.is_dc() {
            scan.se != 0
        } else {
            scan.ss > scan.se || scan.se as usize >= BLOCK_SIZE || scan.components.len() != 1
        };
        if scan.ah != 0 && scan.al + 1 != scan.ah {
            invalid = true;
        }
        if scan.al > 13 {
            invalid = true;
        }
        if invalid {
            return Err(Error::BadProgression(scan.ss, scan.se, scan.ah, scan.al));
        }
        Ok(None)
    } else if !scan.is_full() {
        *scan = ScanInfo::sequential(std::mem::take(&mut scan.components));
        Ok(Some(Warning::NotSequential))
    } else {
        Ok(None)
    }
}

/// Checks a complete scan script for a frame.
///
/// Components must appear in frame order within each scan. Sequential scripts must send every
/// component exactly once. Progressive scripts must send DC before AC for each component and
/// continue successive approximation exactly where the previous scan of each coefficient stopped.
pub fn validate_script(frame: &FrameHeader, script: &[ScanInfo]) -> Result<()> {
    let Some(first) = script.first() else {
        return Err(Error::BadScanScript(0));
    };
    let progressive = !first.is_full();
    let num_components = frame.components.len();
    let mut last_bitpos = vec![[-1i32; BLOCK_SIZE]; num_components];
    let mut component_sent = vec![false; num_components];

    for (scanno, scan) in script.iter().enumerate() {
        let ncomps = scan.components.len();
        if ncomps == 0 || ncomps > MAX_COMPS_IN_SCAN {
            return Err(Error::ComponentCount(ncomps, MAX_COMPS_IN_SCAN));
        }
        for (i, &c) in scan.components.iter().enumerate() {
            if c >= num_components || (i > 0 && c <= scan.components[i - 1]) {
                return Err(Error::BadScanScript(scanno));
            }
        }
        let bad = || Error::BadProgression(scan.ss, scan.se, scan.ah, scan.al);
        if progressive {
            let (ss, se) = (scan.ss as usize, scan.se as usize);
            if ss >= BLOCK_SIZE || se < ss || se >= BLOCK_SIZE || scan.ah > 10 || scan.al > 10 {
                return Err(bad());
            }
            if ss == 0 {
                if se != 0 {
                    return Err(bad());
                }
            } else if ncomps != 1 {
                return Err(bad());
            }
            for &c in scan.components.iter() {
                let bitpos = &mut last_bitpos[c];
                if ss != 0 && bitpos[0] < 0 {
                    return Err(bad());
                }
                for coef in bitpos[ss..=se].iter_mut() {
                    if *coef < 0 {
                        if scan.ah != 0 {
                            return Err(bad());
                        }
                    } else if scan.ah as i32 != *coef || scan.al + 1 != scan.ah {
                        return Err(bad());
                    }
                    *coef = scan.al as i32;
                }
            }
        } else {
            if !scan.is_full() {
                return Err(bad());
            }
            for &c in scan.components.iter() {
                if component_sent[c] {
                    return Err(Error::BadScanScript(scanno));
                }
                component_sent[c] = true;
            }
        }
    }

    let complete = if progressive {
        last_bitpos.iter().all(|b| b[0] >= 0)
    } else {
        component_sent.iter().all(|&s| s)
    };
    if !complete {
        return Err(Error::BadScanScript(script.len()));
    }
    Ok(())
}

/// MCU geometry of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    /// Frame component indices in scan order.
    pub components: Vec<usize>,
    pub mcus_per_row: usize,
    /// Blocks per MCU horizontally and vertically, per scan component.
    pub mcu_width: Vec<usize>,
    pub mcu_height: Vec<usize>,
    /// Scan component of every block of an MCU, in coding order.
    pub membership: Vec<usize>,
}

impl ScanLayout {
    pub fn new(frame: &FrameHeader, components: &[usize]) -> Result<Self> {
        if components.is_empty() || components.len() > MAX_COMPS_IN_SCAN {
            return Err(Error::ComponentCount(components.len(), MAX_COMPS_IN_SCAN));
        }
        if components.len() == 1 {
            let comp = &frame.components[components[0]];
            return Ok(Self {
                components: components.to_vec(),
                mcus_per_row: comp.width_in_blocks,
                mcu_width: vec![1],
                mcu_height: vec![1],
                membership: vec![0],
            });
        }
        let mut membership = vec![];
        let mut mcu_width = vec![];
        let mut mcu_height = vec![];
        for (i, &c) in components.iter().enumerate() {
            let comp = &frame.components[c];
            let (h, v) = (comp.h_samp as usize, comp.v_samp as usize);
            mcu_width.push(h);
            mcu_height.push(v);
            membership.extend(std::iter::repeat_n(i, h * v));
        }
        if membership.len() > MAX_BLOCKS_IN_MCU {
            return Err(Error::McuTooLarge(membership.len()));
        }
        Ok(Self {
            components: components.to_vec(),
            mcus_per_row: frame.width.div_ceil(frame.mcu_pixel_width()),
            mcu_width,
            mcu_height,
            membership,
        })
    }

    pub fn is_interleaved(&self) -> bool {
        self.components.len() > 1
    }

    pub fn blocks_in_mcu(&self) -> usize {
        self.membership.len()
    }

    /// MCU rows making up iMCU row `imcu_row`.
    pub fn mcu_rows_in_imcu_row(&self, frame: &FrameHeader, imcu_row: usize) -> usize {
        if self.is_interleaved() {
            return 1;
        }
        let comp = &frame.components[self.components[0]];
        let v = comp.v_samp as usize;
        if imcu_row + 1 < frame.total_imcu_rows {
            v
        } else {
            match comp.height_in_blocks % v {
                0 => v,
                rest => rest,
            }
        }
    }

    /// Position of every block of one MCU in coding order, as `(scan component, block row within
    /// the iMCU row, block column)`.
    pub fn block_positions(
        &self,
        mcu_col: usize,
        mcu_row: usize,
    ) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.components.len()).flat_map(move |i| {
            let (w, h) = (self.mcu_width[i], self.mcu_height[i]);
            (0..h).flat_map(move |y| (0..w).map(move |x| (i, mcu_row * h + y, mcu_col * w + x)))
        })
    }

    /// Total MCUs in iMCU row `imcu_row`.
    pub fn mcus_in_imcu_row(&self, frame: &FrameHeader, imcu_row: usize) -> usize {
        self.mcus_per_row * self.mcu_rows_in_imcu_row(frame, imcu_row)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::headers::ComponentInfo;

    fn frame(sampling: &[(u8, u8)], width: usize, height: usize) -> FrameHeader {
        let comps = sampling
            .iter()
            .enumerate()
            .map(|(i, &(h, v))| ComponentInfo::new(i as u8 + 1, h, v, 0))
            .collect();
        FrameHeader::new(width, height, false, comps).unwrap()
    }

    #[test]
    fn interleaved_layout() -> Result<()> {
        let f = frame(&[(2, 2), (1, 1), (1, 1)], 40, 24);
        let layout = ScanLayout::new(&f, &[0, 1, 2])?;
        assert_eq!(layout.mcus_per_row, 3);
        assert_eq!(layout.membership, vec![0, 0, 0, 0, 1, 2]);
        assert_eq!(layout.mcus_in_imcu_row(&f, 1), 3);
        let second: Vec<_> = layout.block_positions(1, 0).collect();
        assert_eq!(
            second,
            vec![(0, 0, 2), (0, 0, 3), (0, 1, 2), (0, 1, 3), (1, 0, 1), (2, 0, 1)]
        );
        Ok(())
    }

    #[test]
    fn non_interleaved_last_row_is_short() -> Result<()> {
        let f = frame(&[(2, 2), (1, 1)], 40, 24);
        let layout = ScanLayout::new(&f, &[0])?;
        // 3 block rows: the second iMCU row only has one.
        assert_eq!(layout.mcus_per_row, 5);
        assert_eq!(layout.mcu_rows_in_imcu_row(&f, 0), 2);
        assert_eq!(layout.mcu_rows_in_imcu_row(&f, 1), 1);
        Ok(())
    }

    #[test]
    fn oversized_mcu() {
        let f = frame(&[(4, 2), (2, 2)], 64, 16);
        assert!(matches!(
            ScanLayout::new(&f, &[0, 1]),
            Err(Error::McuTooLarge(12))
        ));
    }

    #[test]
    fn progressive_script_rules() {
        let f = frame(&[(1, 1), (1, 1), (1, 1)], 8, 8);
        let dc = ScanInfo::progressive(vec![0, 1, 2], 0, 0, 1, 0);
        let dc_first = ScanInfo::progressive(vec![0, 1, 2], 0, 0, 0, 1);
        let ac = |c| ScanInfo::progressive(vec![c], 1, 63, 0, 0);
        let good = vec![dc_first.clone(), ac(0), ac(1), ac(2), dc.clone()];
        assert!(validate_script(&f, &good).is_ok());
        // AC before DC.
        assert!(validate_script(&f, &[ac(0), dc_first.clone()]).is_err());
        // Refinement without a first scan.
        assert!(validate_script(&f, std::slice::from_ref(&dc)).is_err());
        // Components out of order.
        let swapped = ScanInfo::progressive(vec![1, 0, 2], 0, 0, 0, 0);
        assert!(matches!(
            validate_script(&f, &[swapped]),
            Err(Error::BadScanScript(0))
        ));
    }

    #[test]
    fn sequential_script_rules() {
        let f = frame(&[(1, 1), (1, 1)], 8, 8);
        let s = |c: Vec<usize>| ScanInfo::sequential(c);
        assert!(validate_script(&f, &[s(vec![0]), s(vec![1])]).is_ok());
        assert!(validate_script(&f, &[s(vec![0])]).is_err());
        assert!(validate_script(&f, &[s(vec![0, 1]), s(vec![1])]).is_err());
    }

    #[test]
    fn stream_scan_checks() -> Result<()> {
        let mut bad = ScanInfo::progressive(vec![0, 1], 1, 5, 0, 0);
        assert!(check_scan_parameters(&mut bad, true).is_err());
        let mut odd = ScanInfo::progressive(vec![0], 0, 0, 0, 1);
        assert_eq!(check_scan_parameters(&mut odd, false)?, Some(Warning::NotSequential));
        assert_eq!(odd, ScanInfo::sequential(vec![0]));
        Ok(())
    }
}
