// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    MAX_COMPS_IN_SCAN,
    error::{Error, Result},
    headers::{ColorSpace, ComponentInfo, QuantTable, ScanInfo, TableSet},
    memory::MemoryLimits,
};

/// Distance between restart markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartInterval {
    Mcus(usize),
    /// In MCU rows of each scan.
    Rows(usize),
}

impl RestartInterval {
    /// The interval in MCUs for a scan with `mcus_per_row` MCUs per row.
    pub fn in_mcus(self, mcus_per_row: usize) -> usize {
        match self {
            RestartInterval::Mcus(n) => n,
            RestartInterval::Rows(n) => n.saturating_mul(mcus_per_row).min(u16::MAX as usize),
        }
    }
}

/// Everything that describes the datastream to produce.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CompressParams {
    pub width: usize,
    pub height: usize,
    /// Samples per input pixel.
    pub input_components: usize,
    pub in_color_space: ColorSpace,
    pub jpeg_color_space: ColorSpace,
    pub components: Vec<ComponentInfo>,
    pub tables: TableSet,
    pub restart: Option<RestartInterval>,
    /// `None` writes one sequential scan of all components.
    pub scan_script: Option<Vec<ScanInfo>>,
    pub write_jfif_header: bool,
    pub write_adobe_marker: bool,
    pub memory: MemoryLimits,
}

impl Default for CompressParams {
    fn default() -> Self {
        Self::new(0, 0, ColorSpace::Grayscale, ColorSpace::Grayscale)
    }
}

impl CompressParams {
    pub fn new(
        width: usize,
        height: usize,
        in_color_space: ColorSpace,
        jpeg_color_space: ColorSpace,
    ) -> Self {
        let mut params = Self {
            width,
            height,
            input_components: in_color_space.num_components().unwrap_or(1),
            in_color_space,
            jpeg_color_space,
            components: vec![],
            tables: TableSet::default(),
            restart: None,
            scan_script: None,
            write_jfif_header: false,
            write_adobe_marker: false,
            memory: MemoryLimits::default(),
        };
        params.set_color_space(jpeg_color_space);
        params
    }

    /// Installs the usual component layout and header markers for storing `space`. Chroma
    /// components are subsampled 2x2 and use the second set of tables. Every referenced
    /// quantization table is set to a step of one.
    pub fn set_color_space(&mut self, space: ColorSpace) {
        let comp = |id: u8, samp: u8, table: usize| {
            let mut c = ComponentInfo::new(id, samp, samp, table);
            c.dc_table = table;
            c.ac_table = table;
            c
        };
        self.jpeg_color_space = space;
        self.write_jfif_header = false;
        self.write_adobe_marker = false;
        self.components = match space {
            ColorSpace::Grayscale => {
                self.write_jfif_header = true;
                vec![comp(1, 1, 0)]
            }
            ColorSpace::YCbCr => {
                self.write_jfif_header = true;
                vec![comp(1, 2, 0), comp(2, 1, 1), comp(3, 1, 1)]
            }
            ColorSpace::Rgb => {
                self.write_adobe_marker = true;
                b"RGB".iter().map(|&id| comp(id, 1, 0)).collect()
            }
            ColorSpace::Cmyk => {
                self.write_adobe_marker = true;
                b"CMYK".iter().map(|&id| comp(id, 1, 0)).collect()
            }
            ColorSpace::Ycck => {
                self.write_adobe_marker = true;
                vec![comp(1, 2, 0), comp(2, 1, 1), comp(3, 1, 1), comp(4, 2, 0)]
            }
            ColorSpace::Unknown => (0..self.input_components)
                .map(|i| comp(i as u8, 1, 0))
                .collect(),
        };
        for c in self.components.iter() {
            if self.tables.quant[c.quant_index].is_none() {
                self.tables.quant[c.quant_index] = Some(QuantTable::flat(1));
            }
        }
    }

    /// Value of the transform flag of the Adobe marker.
    pub(super) fn adobe_transform(&self) -> u8 {
        match self.jpeg_color_space {
            ColorSpace::YCbCr => 1,
            ColorSpace::Ycck => 2,
            _ => 0,
        }
    }

    /// The scans to write.
    pub(super) fn script(&self) -> Result<Vec<ScanInfo>> {
        if let Some(script) = self.scan_script.as_ref() {
            return Ok(script.clone());
        }
        let n = self.components.len();
        if n > MAX_COMPS_IN_SCAN {
            return Err(Error::ComponentCount(n, MAX_COMPS_IN_SCAN));
        }
        Ok(vec![ScanInfo::sequential((0..n).collect())])
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn color_space_defaults() {
        let params = CompressParams::new(16, 16, ColorSpace::Rgb, ColorSpace::YCbCr);
        assert_eq!(params.input_components, 3);
        assert!(params.write_jfif_header);
        assert_eq!(params.components[0].h_samp, 2);
        assert_eq!(params.components[2].ac_table, 1);
        assert!(params.tables.quant[1].is_some());
        assert!(params.tables.quant[2].is_none());

        let rgb = CompressParams::new(16, 16, ColorSpace::Rgb, ColorSpace::Rgb);
        let ids: Vec<u8> = rgb.components.iter().map(|c| c.id).collect();
        assert_eq!(ids, b"RGB");
        assert_eq!(rgb.adobe_transform(), 0);
        assert!(rgb.write_adobe_marker);
    }

    #[test]
    fn restart_interval_in_rows() {
        assert_eq!(RestartInterval::Rows(2).in_mcus(5), 10);
        assert_eq!(RestartInterval::Mcus(3).in_mcus(5), 3);
        assert_eq!(RestartInterval::Rows(70000).in_mcus(5), 65535);
    }

    #[test]
    fn default_script() -> Result<()> {
        let params = CompressParams::new(8, 8, ColorSpace::Cmyk, ColorSpace::Cmyk);
        assert_eq!(params.script()?, vec![ScanInfo::sequential(vec![0, 1, 2, 3])]);
        let mut wide = CompressParams::new(8, 8, ColorSpace::Unknown, ColorSpace::Unknown);
        wide.input_components = 5;
        wide.set_color_space(ColorSpace::Unknown);
        assert!(wide.script().is_err());
        Ok(())
    }
}
