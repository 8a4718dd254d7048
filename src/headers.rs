// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Image-level descriptors shared by the decompressor, the compressor and the marker collaborators.

mod component;
mod scan;
mod tables;

pub use component::{ComponentInfo, FrameHeader};
pub use scan::{ScanInfo, ScanLayout, check_scan_parameters, validate_script};
pub use tables::{EntropyTable, QuantTable, TableSet};

use crate::{
    error::Result,
    report::{Diagnostics, Warning},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Unknown,
    Grayscale,
    Rgb,
    YCbCr,
    Cmyk,
    Ycck,
}

impl ColorSpace {
    /// Number of channels, if fixed by the color space.
    pub fn num_components(self) -> Option<usize> {
        match self {
            ColorSpace::Unknown => None,
            ColorSpace::Grayscale => Some(1),
            ColorSpace::Rgb | ColorSpace::YCbCr => Some(3),
            ColorSpace::Cmyk | ColorSpace::Ycck => Some(4),
        }
    }
}

/// An APPn or COM segment kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMarker {
    pub code: u8,
    /// Payload length in the datastream.
    pub original_length: usize,
    /// Retained payload, at most the configured length limit.
    pub data: Vec<u8>,
}

/// Number of marker codes whose segments can be saved: APP0..APP15 and COM.
pub const NUM_SAVEABLE_MARKERS: usize = 17;

/// Everything the marker reader learns about the datastream being decoded.
#[derive(Debug, Default)]
pub struct StreamHeaders {
    pub frame: Option<FrameHeader>,
    /// Survives across datastreams, so abbreviated streams can use tables loaded earlier.
    pub tables: TableSet,
    /// In MCUs; zero disables restart markers.
    pub restart_interval: usize,
    /// Most recent SOS.
    pub scan: Option<ScanInfo>,
    pub saved_markers: Vec<SavedMarker>,
    /// Length limit per saveable marker; `None` skips the segment.
    pub save_limits: [Option<usize>; NUM_SAVEABLE_MARKERS],
    pub saw_jfif: bool,
    pub adobe_transform: Option<u8>,
    premature_end_warned: bool,
}

impl StreamHeaders {
    /// Forgets everything specific to the previous datastream.
    pub fn reset(&mut self) {
        self.frame = None;
        self.restart_interval = 0;
        self.scan = None;
        self.saved_markers.clear();
        self.saw_jfif = false;
        self.adobe_transform = None;
        self.premature_end_warned = false;
    }

    /// Warns once per datastream that the input ended early.
    pub fn warn_premature_end(&mut self, diag: &mut Diagnostics) -> Result<()> {
        if self.premature_end_warned {
            return Ok(());
        }
        self.premature_end_warned = true;
        diag.warn(Warning::PrematureEnd)
    }

    /// Guesses the color space of the stored data, as the reference library does.
    pub fn default_color_space(&self) -> ColorSpace {
        let Some(frame) = self.frame.as_ref() else {
            return ColorSpace::Unknown;
        };
        let ids: Vec<u8> = frame.components.iter().map(|c| c.id).collect();
        match ids.len() {
            1 => ColorSpace::Grayscale,
            3 => {
                if self.saw_jfif {
                    ColorSpace::YCbCr
                } else if let Some(transform) = self.adobe_transform {
                    if transform == 0 {
                        ColorSpace::Rgb
                    } else {
                        ColorSpace::YCbCr
                    }
                } else if ids == [b'R', b'G', b'B'] {
                    ColorSpace::Rgb
                } else {
                    ColorSpace::YCbCr
                }
            }
            4 => match self.adobe_transform {
                Some(2) => ColorSpace::Ycck,
                _ => ColorSpace::Cmyk,
            },
            _ => ColorSpace::Unknown,
        }
    }
}
