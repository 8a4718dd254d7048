// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Compression: scanlines are converted, downsampled and transformed into whole-image coefficient
//! arrays one iMCU row at a time. The first scan is written while scanlines arrive, the rest of
//! the scan script is written from the arrays at the end.

mod params;

pub use params::{CompressParams, RestartInterval};

use crate::{
    BLOCK_DIM, BLOCK_SIZE, MAX_BLOCKS_IN_MCU,
    error::{Error, Result},
    headers::{FrameHeader, ScanInfo, ScanLayout, validate_script},
    io::{Destination, EntropyWriter},
    markers::{
        JpegMarkerWriter, MarkerWriter,
        codes::{APP0, APP14, RST0},
    },
    memory::{BlockArrayId, MemoryManager, PoolId},
    report::{Diagnostics, ErrorReporter, Progress, ProgressMonitor},
    stages::{
        BoxDownsampler, ColorConverter, Downsampler, EntropyEncoder, FloatDct, ForwardTransform,
        PlainEntropyEncoder, Plane, SampleBlock, select_converter,
    },
    util::tracing_wrappers::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Scanning,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Start => "Start",
            State::Scanning => "Scanning",
        }
    }
}

/// Per-scan output state.
struct Pass {
    index: usize,
    layout: ScanLayout,
    restart_interval: usize,
    restarts_to_go: usize,
    next_restart_num: u8,
}

/// Buffers and stages that only exist between `start_compress` and `finish_compress`.
struct Image {
    frame: FrameHeader,
    script: Vec<ScanInfo>,
    arrays: Vec<BlockArrayId>,
    color: Box<dyn ColorConverter>,
    downsamplers: Vec<Box<dyn Downsampler>>,
    /// One iMCU row of every component at full resolution, then downsampled.
    full_planes: Vec<Plane>,
    component_planes: Vec<Plane>,
    rows_in_band: usize,
    next_scanline: usize,
    imcu_row: usize,
    pass: Option<Pass>,
}

/// A compression context.
pub struct Compressor {
    params: CompressParams,
    state: State,
    diag: Diagnostics,
    memory: MemoryManager,
    marker_writer: Box<dyn MarkerWriter>,
    entropy: Box<dyn EntropyEncoder>,
    fdct: Box<dyn ForwardTransform>,
    image: Option<Image>,
}

impl Compressor {
    pub fn new(params: CompressParams) -> Result<Self> {
        let memory = MemoryManager::new(params.memory.clone());
        Ok(Self {
            params,
            state: State::Start,
            diag: Diagnostics::default(),
            memory,
            marker_writer: Box::new(JpegMarkerWriter::new()),
            entropy: Box::new(PlainEntropyEncoder::new()),
            fdct: Box::new(FloatDct::new()),
            image: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.diag.set_reporter(reporter);
        self
    }

    pub fn with_progress_monitor(mut self, monitor: Box<dyn ProgressMonitor>) -> Self {
        self.diag.set_monitor(Some(monitor));
        self
    }

    pub fn with_marker_writer(mut self, writer: Box<dyn MarkerWriter>) -> Self {
        self.marker_writer = writer;
        self
    }

    pub fn with_entropy_encoder(mut self, encoder: Box<dyn EntropyEncoder>) -> Self {
        self.entropy = encoder;
        self
    }

    pub fn with_forward_transform(mut self, fdct: Box<dyn ForwardTransform>) -> Self {
        self.fdct = fdct;
        self
    }

    /// Parameters can be changed between images.
    pub fn params_mut(&mut self) -> Result<&mut CompressParams> {
        match self.state {
            State::Start => Ok(&mut self.params),
            _ => Err(self.bad_state("params_mut")),
        }
    }

    fn bad_state(&self, op: &'static str) -> Error {
        Error::BadState(op, self.state.name())
    }

    fn image_mut(&mut self) -> Result<&mut Image> {
        self.image
            .as_mut()
            .ok_or(Error::BadState("write_scanlines", "Start"))
    }

    /// Validates the parameters, allocates the image and writes the file header.
    ///
    /// With `write_all_tables` every table is written; otherwise tables already marked as sent,
    /// e.g. by [`Self::write_tables`], are left out.
    pub fn start_compress(
        &mut self,
        dest: &mut dyn Destination,
        write_all_tables: bool,
    ) -> Result<()> {
        let result = self.start_compress_impl(dest, write_all_tables);
        self.diag.check(result)
    }

    fn start_compress_impl(
        &mut self,
        dest: &mut dyn Destination,
        write_all_tables: bool,
    ) -> Result<()> {
        if self.state != State::Start {
            return Err(self.bad_state("start_compress"));
        }
        if write_all_tables {
            self.params.tables.mark_all_sent(false);
        }
        self.diag.reset();
        // Left over from a failed start.
        self.memory.release_pool(PoolId::Image);
        self.memory.set_limits(self.params.memory.clone());
        let params = &self.params;
        let script = params.script()?;
        let progressive = script.first().is_some_and(|s| {
            s.ss != 0 || s.se as usize != BLOCK_SIZE - 1 || s.ah != 0 || s.al != 0
        });
        let mut frame = FrameHeader::new(
            params.width,
            params.height,
            progressive,
            params.components.clone(),
        )?;
        validate_script(&frame, &script)?;
        for comp in frame.components.iter_mut() {
            comp.quant = Some(params.tables.quant_table(comp.quant_index)?.clone());
        }

        let color = select_converter(
            params.in_color_space,
            params.jpeg_color_space,
            params.input_components,
        )?;
        let num_components = frame.components.len();
        if params
            .jpeg_color_space
            .num_components()
            .is_some_and(|n| n != num_components)
        {
            return Err(Error::ConversionNotSupported(num_components));
        }
        debug!(%color, progressive, scans = script.len(), "starting compression");
        let full_width = frame.width.div_ceil(frame.mcu_pixel_width()) * frame.mcu_pixel_width();
        let mut arrays = vec![];
        let mut downsamplers: Vec<Box<dyn Downsampler>> = vec![];
        let mut full_planes = vec![];
        let mut component_planes = vec![];
        for comp in frame.components.iter() {
            arrays.push(self.memory.request_block_array(
                PoolId::Image,
                comp.padded_width_in_blocks(),
                comp.padded_height_in_blocks(),
                comp.v_samp as usize,
                false,
            )?);
            downsamplers.push(Box::new(BoxDownsampler::new(
                frame.max_h,
                frame.max_v,
                comp.h_samp,
                comp.v_samp,
            )?));
            full_planes.push(Plane::new(full_width, frame.imcu_height())?);
            component_planes.push(Plane::new(
                comp.padded_width_in_blocks() * BLOCK_DIM,
                comp.v_samp as usize * BLOCK_DIM,
            )?);
        }
        self.memory.realize_arrays()?;

        dest.init();
        self.marker_writer.reset();
        self.marker_writer.write_file_header(dest)?;
        if params.write_jfif_header {
            // Version 1.01, no density units, 1:1 aspect ratio, no thumbnail.
            let jfif = [b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0];
            self.marker_writer.write_marker(dest, APP0, &jfif)?;
        }
        if params.write_adobe_marker {
            let mut adobe = *b"Adobe\0\x64\0\0\0\0\0";
            adobe[11] = params.adobe_transform();
            self.marker_writer.write_marker(dest, APP14, &adobe)?;
        }
        self.diag.set_total_passes(script.len());
        self.image = Some(Image {
            frame,
            script,
            arrays,
            color,
            downsamplers,
            full_planes,
            component_planes,
            rows_in_band: 0,
            next_scanline: 0,
            imcu_row: 0,
            pass: None,
        });
        self.state = State::Scanning;
        Ok(())
    }

    /// Writes an application or comment marker. Only allowed before the first scanline.
    pub fn write_marker(&mut self, dest: &mut dyn Destination, code: u8, data: &[u8]) -> Result<()> {
        let result = match self.image.as_ref() {
            Some(image) if image.next_scanline == 0 && image.pass.is_none() => {
                self.marker_writer.write_marker(dest, code, data)
            }
            _ => Err(self.bad_state("write_marker")),
        };
        self.diag.check(result)
    }

    /// Compresses as many of `rows` as the image still needs and returns how many were taken.
    /// Each row holds `width * input_components` interleaved samples.
    pub fn write_scanlines(&mut self, dest: &mut dyn Destination, rows: &[&[u8]]) -> Result<usize> {
        let result = if self.state == State::Scanning {
            self.write_scanlines_impl(dest, rows)
        } else {
            Err(self.bad_state("write_scanlines"))
        };
        self.diag.check(result)
    }

    fn write_scanlines_impl(&mut self, dest: &mut dyn Destination, rows: &[&[u8]]) -> Result<usize> {
        let row_len = self.params.width * self.params.input_components;
        if self.image_mut()?.pass.is_none() {
            let Compressor {
                params,
                marker_writer,
                image,
                ..
            } = self;
            if let Some(image) = image.as_ref() {
                marker_writer.write_frame_header(dest, &image.frame, &mut params.tables)?;
            }
            self.start_pass(dest, 0)?;
        }
        let image = self.image_mut()?;
        let (width, height) = (image.frame.width, image.frame.height);
        let imcu_height = image.frame.imcu_height();
        let mut taken = 0;
        for row in rows {
            let image = self.image_mut()?;
            if image.next_scanline == height {
                break;
            }
            if row.len() < row_len {
                return Err(Error::ShortScanline(row.len(), row_len));
            }
            let y = image.rows_in_band;
            let mut outputs: Vec<&mut [u8]> = image
                .full_planes
                .iter_mut()
                .map(|p| &mut p.row_mut(y)[..width])
                .collect();
            image.color.convert(&row[..row_len], &mut outputs);
            image.rows_in_band += 1;
            image.next_scanline += 1;
            taken += 1;
            if image.rows_in_band == imcu_height || image.next_scanline == height {
                self.compress_band()?;
                let imcu_row = self.image_mut()?.imcu_row;
                self.encode_imcu_row(dest, imcu_row - 1)?;
            }
        }
        Ok(taken)
    }

    /// Turns the buffered iMCU row into coefficients.
    fn compress_band(&mut self) -> Result<()> {
        let Compressor {
            memory,
            fdct,
            image,
            diag,
            ..
        } = self;
        let Some(image) = image.as_mut() else {
            return Err(Error::BadState("write_scanlines", "Start"));
        };
        let valid_rows = image.rows_in_band;
        let mut samples: SampleBlock = [[0; BLOCK_DIM]; BLOCK_DIM];
        for (c, comp) in image.frame.components.iter().enumerate() {
            image.full_planes[c].replicate_edges(image.frame.width, valid_rows);
            image.downsamplers[c].downsample(&image.full_planes[c], &mut image.component_planes[c]);
            let quant = comp.quant.as_ref().ok_or(Error::NoQuantTable(comp.quant_index))?;
            let v = comp.v_samp as usize;
            let mut view = memory.access_mut(image.arrays[c], image.imcu_row * v, v)?;
            let plane = &image.component_planes[c];
            for by in 0..v {
                for (bx, block) in view.row_mut(by).iter_mut().enumerate() {
                    plane.get_block(bx, by, &mut samples);
                    fdct.forward(&samples, quant, block);
                }
            }
        }
        image.rows_in_band = 0;
        image.imcu_row += 1;
        diag.advance_pass(image.imcu_row);
        Ok(())
    }

    fn start_pass(&mut self, dest: &mut dyn Destination, index: usize) -> Result<()> {
        let Compressor {
            params,
            marker_writer,
            entropy,
            image,
            diag,
            ..
        } = self;
        let Some(image) = image.as_mut() else {
            return Err(Error::BadState("finish_compress", "Start"));
        };
        let scan = &image.script[index];
        let layout = ScanLayout::new(&image.frame, &scan.components)?;
        let restart_interval = params
            .restart
            .map_or(0, |r| r.in_mcus(layout.mcus_per_row));
        marker_writer.write_scan_header(
            dest,
            &image.frame,
            scan,
            &mut params.tables,
            restart_interval,
        )?;
        entropy.start_pass(scan, &layout, &params.tables)?;
        debug!(index, ?scan, restart_interval, "starting output pass");
        image.pass = Some(Pass {
            index,
            layout,
            restart_interval,
            restarts_to_go: restart_interval,
            next_restart_num: 0,
        });
        diag.begin_pass(image.frame.total_imcu_rows);
        Ok(())
    }

    /// Entropy-codes iMCU row `imcu_row` of the current scan.
    fn encode_imcu_row(&mut self, dest: &mut dyn Destination, imcu_row: usize) -> Result<()> {
        let Compressor {
            memory,
            entropy,
            image,
            ..
        } = self;
        let Some(image) = image.as_mut() else {
            return Err(Error::BadState("write_scanlines", "Start"));
        };
        let Some(pass) = image.pass.as_mut() else {
            return Err(Error::BadState("write_scanlines", "Scanning"));
        };
        let layout = &pass.layout;
        let requests: Vec<_> = layout
            .components
            .iter()
            .map(|&c| {
                let v = image.frame.components[c].v_samp as usize;
                (image.arrays[c], imcu_row * v, v)
            })
            .collect();
        let views = memory.access_many_mut(&requests)?;
        let mut mcu = [[0i16; BLOCK_SIZE]; MAX_BLOCKS_IN_MCU];
        let mcu = &mut mcu[..layout.blocks_in_mcu()];
        let mut writer = EntropyWriter::new(dest);
        for mcu_row in 0..layout.mcu_rows_in_imcu_row(&image.frame, imcu_row) {
            for mcu_col in 0..layout.mcus_per_row {
                if pass.restart_interval != 0 {
                    if pass.restarts_to_go == 0 {
                        entropy.restart(&mut writer)?;
                        writer.emit_marker(RST0 + pass.next_restart_num)?;
                        pass.next_restart_num = (pass.next_restart_num + 1) & 7;
                        pass.restarts_to_go = pass.restart_interval;
                    }
                    pass.restarts_to_go -= 1;
                }
                for (block, (i, row, col)) in mcu.iter_mut().zip(layout.block_positions(mcu_col, mcu_row))
                {
                    *block = views[i].row(row)[col];
                }
                entropy.encode_mcu(&mut writer, mcu)?;
            }
        }
        writer.flush()
    }

    fn finish_pass(&mut self, dest: &mut dyn Destination) -> Result<()> {
        let mut writer = EntropyWriter::new(dest);
        self.entropy.finish_pass(&mut writer)?;
        writer.flush()?;
        self.diag.end_pass();
        Ok(())
    }

    /// Writes the remaining scans and the end of the datastream, then releases the image.
    pub fn finish_compress(&mut self, dest: &mut dyn Destination) -> Result<()> {
        let result = self.finish_compress_impl(dest);
        self.diag.check(result)
    }

    fn finish_compress_impl(&mut self, dest: &mut dyn Destination) -> Result<()> {
        if self.state != State::Scanning {
            return Err(self.bad_state("finish_compress"));
        }
        let image = self.image_mut()?;
        if image.next_scanline < image.frame.height || image.pass.is_none() {
            return Err(Error::TooLittleData);
        }
        let (num_scans, total_imcu_rows) = (image.script.len(), image.frame.total_imcu_rows);
        self.finish_pass(dest)?;
        for index in 1..num_scans {
            self.start_pass(dest, index)?;
            for imcu_row in 0..total_imcu_rows {
                self.encode_imcu_row(dest, imcu_row)?;
                self.diag.advance_pass(imcu_row + 1);
            }
            self.finish_pass(dest)?;
        }
        self.marker_writer.write_file_trailer(dest)?;
        dest.term()?;
        debug!(passes = self.diag.progress().completed_passes, "compression complete");
        self.abort();
        Ok(())
    }

    /// Writes an abbreviated datastream with every defined table and marks them as sent.
    pub fn write_tables(&mut self, dest: &mut dyn Destination) -> Result<()> {
        let result = if self.state == State::Start {
            dest.init();
            self.marker_writer
                .write_tables_only(dest, &mut self.params.tables)
                .and_then(|_| dest.term())
        } else {
            Err(self.bad_state("write_tables"))
        };
        self.diag.check(result)
    }

    /// Marks every table as sent (or not), which decides whether the next image repeats them.
    pub fn suppress_tables(&mut self, suppress: bool) {
        self.params.tables.mark_all_sent(suppress);
    }

    /// Abandons the current image, if any.
    pub fn abort(&mut self) {
        self.memory.release_pool(PoolId::Image);
        self.image = None;
        self.state = State::Start;
    }

    pub fn next_scanline(&self) -> usize {
        self.image.as_ref().map_or(0, |i| i.next_scanline)
    }

    pub fn progress(&self) -> Progress {
        self.diag.progress()
    }

    /// Index of the scan being written.
    pub fn current_scan(&self) -> Option<usize> {
        self.image.as_ref().and_then(|i| i.pass.as_ref()).map(|p| p.index)
    }
}
