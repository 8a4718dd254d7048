// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Decompressor, InputStatus};
use crate::{
    BLOCK_DIM, BLOCK_SIZE, ProcessingResult,
    error::{Error, Result},
    headers::{ColorSpace, FrameHeader},
    io::Source,
    stages::{
        BoxUpsampler, ColorDeconverter, Plane, SampleBlock, Upsampler, select_deconverter,
    },
    util::tracing_wrappers::*,
};

/// Output-side state: counters of the current output pass and the buffers of one iMCU row.
#[derive(Default)]
pub(super) struct OutputState {
    pub(super) scan_number: usize,
    /// iMCU rows reconstructed in this pass.
    pub(super) imcu_row: usize,
    pub(super) scanline: usize,
    color: Option<Box<dyn ColorDeconverter>>,
    upsamplers: Vec<Box<dyn Upsampler>>,
    /// Samples of one iMCU row per component, at component resolution.
    component_planes: Vec<Plane>,
    /// The same at full resolution.
    upsampled: Vec<Plane>,
    rows_ready: usize,
    next_row: usize,
}

impl OutputState {
    pub(super) fn new(frame: &FrameHeader, stored: ColorSpace, out: ColorSpace) -> Result<Self> {
        let color = select_deconverter(stored, out, frame.components.len())?;
        let full_width = frame.width.div_ceil(frame.mcu_pixel_width()) * frame.mcu_pixel_width();
        let mut upsamplers: Vec<Box<dyn Upsampler>> = vec![];
        let mut component_planes = vec![];
        let mut upsampled = vec![];
        for comp in frame.components.iter() {
            let upsampler = BoxUpsampler::new(frame.max_h, frame.max_v, comp.h_samp, comp.v_samp)?;
            debug!(id = comp.id, %upsampler, "selected upsampler");
            upsamplers.push(Box::new(upsampler));
            component_planes.push(Plane::new(
                comp.padded_width_in_blocks() * BLOCK_DIM,
                comp.v_samp as usize * BLOCK_DIM,
            )?);
            upsampled.push(Plane::new(full_width, frame.imcu_height())?);
        }
        debug!(?stored, ?out, %color, "selected color conversion");
        Ok(Self {
            color: Some(color),
            upsamplers,
            component_planes,
            upsampled,
            ..Default::default()
        })
    }

    pub(super) fn components(&self) -> usize {
        self.color.as_ref().map_or(0, |c| c.out_components())
    }

    fn emit_row(&mut self, width: usize, out: &mut [u8]) {
        let y = self.next_row;
        let inputs: Vec<&[u8]> = self.upsampled.iter().map(|p| &p.row(y)[..width]).collect();
        if let Some(color) = self.color.as_mut() {
            color.convert(&inputs, out);
        }
        self.next_row += 1;
        self.scanline += 1;
    }
}

impl Decompressor {
    pub(super) fn start_output_pass(&mut self) {
        let output = &mut self.output;
        output.imcu_row = 0;
        output.scanline = 0;
        output.rows_ready = 0;
        output.next_row = 0;
    }

    pub(super) fn read_scanlines_impl(
        &mut self,
        src: &mut dyn Source,
        out: &mut [u8],
    ) -> Result<ProcessingResult<usize>> {
        let (width, height) = {
            let frame = self.frame()?;
            (frame.width, frame.height)
        };
        let stride = width * self.output.components();
        let max_rows = out.len().checked_div(stride).unwrap_or(0);
        let mut produced = 0;
        while produced < max_rows && self.output.scanline < height {
            if self.output.next_row == self.output.rows_ready {
                if !self.input_ahead_of_output(src)? {
                    break;
                }
                self.reconstruct_imcu_row()?;
            }
            let row = &mut out[produced * stride..(produced + 1) * stride];
            self.output.emit_row(width, row);
            produced += 1;
        }
        if produced == 0 && max_rows > 0 && self.output.scanline < height {
            return Ok(ProcessingResult::NeedsMoreInput);
        }
        Ok(ProcessingResult::Complete { result: produced })
    }

    /// Drives the input side until it has finished the iMCU row the output side needs next.
    /// Returns `false` on suspension.
    fn input_ahead_of_output(&mut self, src: &mut dyn Source) -> Result<bool> {
        loop {
            let (input, output) = (&self.input, &self.output);
            let behind = input.scan_number < output.scan_number
                || (input.scan_number == output.scan_number && input.imcu_row <= output.imcu_row);
            if !behind || input.eoi_reached {
                return Ok(true);
            }
            if self.consume(src)? == InputStatus::Suspended {
                return Ok(false);
            }
        }
    }

    /// Reconstructs the next iMCU row from the coefficient arrays.
    fn reconstruct_imcu_row(&mut self) -> Result<()> {
        let Decompressor {
            headers,
            memory,
            idct,
            coefficients,
            output,
            ..
        } = self;
        let frame = headers.frame.as_ref().ok_or(Error::NoImage)?;
        let Some(store) = coefficients.as_ref() else {
            return Err(Error::BadState("read_scanlines", "Scanning"));
        };
        let imcu_row = output.imcu_row;
        let mut dequantized = [0; BLOCK_SIZE];
        let mut samples: SampleBlock = [[0; BLOCK_DIM]; BLOCK_DIM];
        for (c, comp) in frame.components.iter().enumerate() {
            let v = comp.v_samp as usize;
            let view = memory.access(store.array(c)?, imcu_row * v, v)?;
            let plane = &mut output.component_planes[c];
            for (by, blocks) in view.iter().enumerate() {
                for (bx, block) in blocks.iter().enumerate() {
                    match comp.quant.as_ref() {
                        Some(quant) => {
                            store.dequantize(c, block, quant, &mut dequantized);
                            idct.inverse(&dequantized, &mut samples);
                        }
                        // No scan of this component has been seen yet.
                        None => samples = [[128; BLOCK_DIM]; BLOCK_DIM],
                    }
                    plane.put_block(bx, by, &samples);
                }
            }
            output.upsamplers[c].upsample(&output.component_planes[c], &mut output.upsampled[c]);
        }
        let imcu_height = frame.imcu_height();
        output.rows_ready = imcu_height.min(frame.height - imcu_row * imcu_height);
        output.next_row = 0;
        output.imcu_row += 1;
        trace!(imcu_row, scan = output.scan_number, "reconstructed iMCU row");
        Ok(())
    }
}
