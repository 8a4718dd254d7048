// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Display;

use crate::{
    error::{Error, Result},
    headers::ColorSpace,
};

/// Turns one row of every stored component into one interleaved output row.
pub trait ColorDeconverter: Display {
    fn out_components(&self) -> usize;

    /// `inputs` has one row per stored component, each at least `output.len() /
    /// out_components()` samples long.
    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]);
}

/// Turns one interleaved input row into one row of every stored component.
pub trait ColorConverter: Display {
    fn in_components(&self) -> usize;

    fn convert(&mut self, input: &[u8], outputs: &mut [&mut [u8]]);
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Full-range BT.601 as defined by JFIF.
fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let (y, cb, cr) = (y as f32, cb as f32 - 128.0, cr as f32 - 128.0);
    [
        clamp_u8(cr.mul_add(1.402, y)),
        clamp_u8(cr.mul_add(-0.714136, cb.mul_add(-0.344136, y))),
        clamp_u8(cb.mul_add(1.772, y)),
    ]
}

fn rgb_to_ycc(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    [
        clamp_u8(0.299 * r + 0.587 * g + 0.114 * b),
        clamp_u8(-0.168736 * r - 0.331264 * g + 0.5 * b + 128.0),
        clamp_u8(0.5 * r - 0.418688 * g - 0.081312 * b + 128.0),
    ]
}

/// Interleaves components without changing them.
pub struct Interleave {
    components: usize,
}

impl Display for Interleave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interleave {} components", self.components)
    }
}

impl ColorDeconverter for Interleave {
    fn out_components(&self) -> usize {
        self.components
    }

    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]) {
        for (x, pixel) in output.chunks_exact_mut(self.components).enumerate() {
            for (out, input) in pixel.iter_mut().zip(inputs.iter()) {
                *out = input[x];
            }
        }
    }
}

impl ColorConverter for Interleave {
    fn in_components(&self) -> usize {
        self.components
    }

    fn convert(&mut self, input: &[u8], outputs: &mut [&mut [u8]]) {
        for (x, pixel) in input.chunks_exact(self.components).enumerate() {
            for (&v, output) in pixel.iter().zip(outputs.iter_mut()) {
                output[x] = v;
            }
        }
    }
}

pub struct YcbcrToRgb;

impl Display for YcbcrToRgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "YCbCr to RGB")
    }
}

impl ColorDeconverter for YcbcrToRgb {
    fn out_components(&self) -> usize {
        3
    }

    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]) {
        let [row_y, row_cb, row_cr] = inputs else {
            panic!("incorrect number of channels; expected 3, found {}", inputs.len());
        };
        for (x, pixel) in output.chunks_exact_mut(3).enumerate() {
            pixel.copy_from_slice(&ycc_to_rgb(row_y[x], row_cb[x], row_cr[x]));
        }
    }
}

/// Keeps only the first component: luma of YCbCr, or a plain gray channel.
pub struct FirstComponent;

impl Display for FirstComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "first component only")
    }
}

impl ColorDeconverter for FirstComponent {
    fn out_components(&self) -> usize {
        1
    }

    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]) {
        let n = output.len();
        output.copy_from_slice(&inputs[0][..n]);
    }
}

pub struct GrayToRgb;

impl Display for GrayToRgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "grayscale to RGB")
    }
}

impl ColorDeconverter for GrayToRgb {
    fn out_components(&self) -> usize {
        3
    }

    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]) {
        for (pixel, &v) in output.chunks_exact_mut(3).zip(inputs[0].iter()) {
            pixel.fill(v);
        }
    }
}

/// Adobe-style YCCK: inverted CMY coded as YCbCr, K passed through.
pub struct YcckToCmyk;

impl Display for YcckToCmyk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "YCCK to CMYK")
    }
}

impl ColorDeconverter for YcckToCmyk {
    fn out_components(&self) -> usize {
        4
    }

    fn convert(&mut self, inputs: &[&[u8]], output: &mut [u8]) {
        let [row_y, row_cb, row_cr, row_k] = inputs else {
            panic!("incorrect number of channels; expected 4, found {}", inputs.len());
        };
        for (x, pixel) in output.chunks_exact_mut(4).enumerate() {
            let [r, g, b] = ycc_to_rgb(row_y[x], row_cb[x], row_cr[x]);
            pixel.copy_from_slice(&[255 - r, 255 - g, 255 - b, row_k[x]]);
        }
    }
}

pub struct RgbToYcbcr;

impl Display for RgbToYcbcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RGB to YCbCr")
    }
}

impl ColorConverter for RgbToYcbcr {
    fn in_components(&self) -> usize {
        3
    }

    fn convert(&mut self, input: &[u8], outputs: &mut [&mut [u8]]) {
        let [row_y, row_cb, row_cr] = outputs else {
            panic!("incorrect number of channels; expected 3, found {}", outputs.len());
        };
        for (x, pixel) in input.chunks_exact(3).enumerate() {
            let [y, cb, cr] = rgb_to_ycc(pixel[0], pixel[1], pixel[2]);
            (row_y[x], row_cb[x], row_cr[x]) = (y, cb, cr);
        }
    }
}

pub struct RgbToGray;

impl Display for RgbToGray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RGB to grayscale")
    }
}

impl ColorConverter for RgbToGray {
    fn in_components(&self) -> usize {
        3
    }

    fn convert(&mut self, input: &[u8], outputs: &mut [&mut [u8]]) {
        for (out, pixel) in outputs[0].iter_mut().zip(input.chunks_exact(3)) {
            *out = rgb_to_ycc(pixel[0], pixel[1], pixel[2])[0];
        }
    }
}

/// Keeps the first channel of interleaved input pixels of `stride` channels.
pub struct ExtractFirst {
    stride: usize,
}

impl Display for ExtractFirst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "first of {} channels", self.stride)
    }
}

impl ColorConverter for ExtractFirst {
    fn in_components(&self) -> usize {
        self.stride
    }

    fn convert(&mut self, input: &[u8], outputs: &mut [&mut [u8]]) {
        for (out, pixel) in outputs[0].iter_mut().zip(input.chunks_exact(self.stride)) {
            *out = pixel[0];
        }
    }
}

fn check_count(space: ColorSpace, num_components: usize) -> Result<()> {
    match space.num_components() {
        Some(n) if n != num_components => Err(Error::ConversionNotSupported(num_components)),
        _ => Ok(()),
    }
}

/// Picks the conversion from the stored color space to the requested output color space.
pub fn select_deconverter(
    stored: ColorSpace,
    out: ColorSpace,
    num_components: usize,
) -> Result<Box<dyn ColorDeconverter>> {
    check_count(stored, num_components)?;
    Ok(match (stored, out) {
        (ColorSpace::YCbCr, ColorSpace::Rgb) => Box::new(YcbcrToRgb),
        (ColorSpace::YCbCr, ColorSpace::Grayscale) => Box::new(FirstComponent),
        (ColorSpace::Grayscale, ColorSpace::Rgb) => Box::new(GrayToRgb),
        (ColorSpace::Ycck, ColorSpace::Cmyk) => Box::new(YcckToCmyk),
        (a, b) if a == b => Box::new(Interleave {
            components: num_components,
        }),
        _ => return Err(Error::ConversionNotSupported(num_components)),
    })
}

/// Picks the conversion from the input color space to the stored color space.
pub fn select_converter(
    input: ColorSpace,
    stored: ColorSpace,
    input_components: usize,
) -> Result<Box<dyn ColorConverter>> {
    check_count(input, input_components)?;
    Ok(match (input, stored) {
        (ColorSpace::Rgb, ColorSpace::YCbCr) => Box::new(RgbToYcbcr),
        (ColorSpace::Rgb, ColorSpace::Grayscale) => Box::new(RgbToGray),
        (ColorSpace::YCbCr, ColorSpace::Grayscale) => Box::new(ExtractFirst { stride: 3 }),
        (a, b) if a == b => Box::new(Interleave {
            components: input_components,
        }),
        _ => return Err(Error::ConversionNotSupported(input_components)),
    })
}
