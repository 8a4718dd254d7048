// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    BLOCK_SIZE, Block, NATURAL_ORDER,
    error::{Error, Result},
    headers::{FrameHeader, QuantTable, ScanInfo},
    memory::{BlockArrayId, MemoryManager, PoolId},
    report::{Diagnostics, Warning},
    stages::DequantBlock,
};

/// Whole-image coefficient arrays, one per component, plus the precision map of progressive
/// images.
pub(super) struct CoefficientStore {
    arrays: Vec<BlockArrayId>,
    coef_bits: Option<Vec<[i32; BLOCK_SIZE]>>,
}

impl CoefficientStore {
    /// Requests the arrays; they are realized together with everything else of the image.
    pub(super) fn new(memory: &mut MemoryManager, frame: &FrameHeader) -> Result<Self> {
        let arrays = frame
            .components
            .iter()
            .map(|c| {
                memory.request_block_array(
                    PoolId::Image,
                    c.padded_width_in_blocks(),
                    c.padded_height_in_blocks(),
                    c.v_samp as usize,
                    true,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let coef_bits = frame
            .progressive
            .then(|| vec![[-1; BLOCK_SIZE]; frame.components.len()]);
        Ok(Self { arrays, coef_bits })
    }

    pub(super) fn array(&self, component: usize) -> Result<BlockArrayId> {
        self.arrays
            .get(component)
            .copied()
            .ok_or(Error::ComponentCount(component, self.arrays.len()))
    }

    pub(super) fn coef_bits(&self) -> Option<&[[i32; BLOCK_SIZE]]> {
        self.coef_bits.as_deref()
    }

    /// Records that `scan` has been fully decoded.
    ///
    /// Every covered coefficient must continue exactly where the previous scan left it. Anything
    /// else is a warning; precision never gets worse, so a scan that claims less precision than
    /// is already known leaves the map alone.
    pub(super) fn complete_scan(&mut self, scan: &ScanInfo, diag: &mut Diagnostics) -> Result<()> {
        let Some(coef_bits) = self.coef_bits.as_mut() else {
            return Ok(());
        };
        let (ss, se, al) = (scan.ss as usize, scan.se as usize, scan.al as i32);
        for &component in scan.components.iter() {
            let bits = &mut coef_bits[component];
            if ss != 0 && bits[0] < 0 {
                diag.warn(Warning::BogusProgression {
                    component,
                    coefficient: 0,
                })?;
            }
            for (coefficient, bit) in bits.iter_mut().enumerate().take(se + 1).skip(ss) {
                let expected = (*bit).max(0);
                if scan.ah as i32 != expected || (*bit >= 0 && al > *bit) {
                    diag.warn(Warning::BogusProgression {
                        component,
                        coefficient,
                    })?;
                }
                if *bit < 0 || al < *bit {
                    *bit = al;
                }
            }
        }
        Ok(())
    }

    /// Dequantizes `block` of `component` into natural order. Coefficients no scan has covered
    /// yet read as zero.
    pub(super) fn dequantize(
        &self,
        component: usize,
        block: &Block,
        quant: &QuantTable,
        out: &mut DequantBlock,
    ) {
        let bits = self.coef_bits.as_ref().map(|b| &b[component]);
        for (k, &pos) in NATURAL_ORDER.iter().enumerate() {
            out[pos] = if bits.is_none_or(|b| b[k] >= 0) {
                block[pos] as i32 * quant.values[pos] as i32
            } else {
                0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::{headers::ComponentInfo, memory::MemoryLimits, report::Diagnostics};

    fn store(progressive: bool) -> Result<(MemoryManager, CoefficientStore)> {
        let mut memory = MemoryManager::new(MemoryLimits::default());
        let comps = vec![ComponentInfo::new(1, 2, 2, 0), ComponentInfo::new(2, 1, 1, 0)];
        let frame = FrameHeader::new(20, 10, progressive, comps)?;
        let store = CoefficientStore::new(&mut memory, &frame)?;
        Ok((memory, store))
    }

    #[test]
    fn arrays_cover_whole_mcus() -> Result<()> {
        let (memory, store) = store(false)?;
        assert_eq!(memory.dimensions(store.array(0)?)?, (4, 2));
        assert_eq!(memory.dimensions(store.array(1)?)?, (2, 1));
        assert!(store.array(2).is_err());
        assert!(store.coef_bits().is_none());
        Ok(())
    }

    #[test]
    fn precision_only_improves() -> Result<()> {
        let (_, mut store) = store(true)?;
        let mut diag = Diagnostics::default();
        store.complete_scan(&ScanInfo::progressive(vec![0, 1], 0, 0, 0, 1), &mut diag)?;
        store.complete_scan(&ScanInfo::progressive(vec![0], 1, 5, 0, 2), &mut diag)?;
        assert_eq!(diag.num_warnings(), 0);
        let bits = store.coef_bits().unwrap();
        assert_eq!(bits[0][0], 1);
        assert_eq!(&bits[0][1..6], &[2; 5]);
        assert_eq!(bits[0][6], -1);
        assert_eq!(bits[1][1], -1);

        // Claims to refine from 3 to 3: the known precision of 2 stays.
        store.complete_scan(&ScanInfo::progressive(vec![0], 1, 1, 3, 3), &mut diag)?;
        assert_eq!(diag.num_warnings(), 1);
        assert_eq!(store.coef_bits().unwrap()[0][1], 2);
        Ok(())
    }

    #[test]
    fn ac_before_dc_is_reported() -> Result<()> {
        let (_, mut store) = store(true)?;
        let mut diag = Diagnostics::default();
        store.complete_scan(&ScanInfo::progressive(vec![1], 1, 63, 0, 0), &mut diag)?;
        assert_eq!(diag.num_warnings(), 1);
        Ok(())
    }

    #[test]
    fn uncovered_coefficients_read_as_zero() -> Result<()> {
        let (_, mut store) = store(true)?;
        let mut diag = Diagnostics::default();
        store.complete_scan(&ScanInfo::progressive(vec![0, 1], 0, 0, 0, 0), &mut diag)?;
        let block: Block = [3; BLOCK_SIZE];
        let mut out = [0; BLOCK_SIZE];
        store.dequantize(0, &block, &QuantTable::flat(2), &mut out);
        assert_eq!(out[0], 6);
        assert!(out[1..].iter().all(|&v| v == 0));
        Ok(())
    }
}
