// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Decompression: the input side consumes markers and scans into whole-image coefficient arrays,
//! the output side reconstructs scanlines from them.

mod coefficients;
mod input;
mod output;

use coefficients::CoefficientStore;
use input::InputState;
use output::OutputState;

use crate::{
    Block, ProcessingResult,
    error::{Error, Result},
    headers::{ColorSpace, FrameHeader, SavedMarker, StreamHeaders},
    io::Source,
    markers::{JpegMarkerReader, MarkerReader, codes::saveable_slot},
    memory::{ArrayView, MemoryLimits, MemoryManager, MemoryStats, PoolId},
    report::{Diagnostics, ErrorReporter, Progress, ProgressMonitor},
    stages::{EntropyDecoder, FloatDct, InverseTransform, PlainEntropyDecoder},
    util::tracing_wrappers::*,
};

/// Result of [`Decompressor::read_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    Suspended,
    /// The frame header and the first scan header have been read.
    HeaderOk,
    /// The datastream ended without an image; any tables it defined have been kept.
    TablesOnly,
}

/// Result of [`Decompressor::consume_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Suspended,
    ReachedSos,
    ReachedEoi,
    /// One more iMCU row of the current scan has been decoded.
    RowCompleted,
    ScanCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    InHeader,
    Ready,
    Preload,
    Scanning,
    BufferedImage,
    BufferedPost,
    ReadingCoefficients,
    Stopping,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Start => "Start",
            State::InHeader => "InHeader",
            State::Ready => "Ready",
            State::Preload => "Preload",
            State::Scanning => "Scanning",
            State::BufferedImage => "BufferedImage",
            State::BufferedPost => "BufferedPost",
            State::ReadingCoefficients => "ReadingCoefficients",
            State::Stopping => "Stopping",
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    /// Lets the application run one output pass per scan, see [`Decompressor::start_output`].
    pub buffered_image: bool,
    /// Color space of the scanlines. `None` picks the natural choice for the stored color space.
    pub out_color_space: Option<ColorSpace>,
    pub memory: MemoryLimits,
}

/// A decompression context.
///
/// Every operation checks the call sequence and fails with [`Error::BadState`] when it is called
/// at the wrong time. Operations that need input take the source as an argument and report
/// suspension instead of blocking; calling them again with more data resumes exactly where they
/// stopped.
pub struct Decompressor {
    options: DecompressOptions,
    state: State,
    diag: Diagnostics,
    memory: MemoryManager,
    headers: StreamHeaders,
    marker_reader: Box<dyn MarkerReader>,
    entropy: Box<dyn EntropyDecoder>,
    idct: Box<dyn InverseTransform>,
    input: InputState,
    coefficients: Option<CoefficientStore>,
    output: OutputState,
}

impl Decompressor {
    pub fn new(options: DecompressOptions) -> Self {
        let memory = MemoryManager::new(options.memory.clone());
        Self {
            options,
            state: State::Start,
            diag: Diagnostics::default(),
            memory,
            headers: StreamHeaders::default(),
            marker_reader: Box::new(JpegMarkerReader::new()),
            entropy: Box::new(PlainEntropyDecoder::new()),
            idct: Box::new(FloatDct::new()),
            input: InputState::default(),
            coefficients: None,
            output: OutputState::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.diag.set_reporter(reporter);
        self
    }

    pub fn with_progress_monitor(mut self, monitor: Box<dyn ProgressMonitor>) -> Self {
        self.diag.set_monitor(Some(monitor));
        self
    }

    pub fn with_marker_reader(mut self, reader: Box<dyn MarkerReader>) -> Self {
        self.marker_reader = reader;
        self
    }

    pub fn with_entropy_decoder(mut self, decoder: Box<dyn EntropyDecoder>) -> Self {
        self.entropy = decoder;
        self
    }

    pub fn with_inverse_transform(mut self, idct: Box<dyn InverseTransform>) -> Self {
        self.idct = idct;
        self
    }

    /// Options take effect at the next [`Self::start_decompress`].
    pub fn options_mut(&mut self) -> &mut DecompressOptions {
        &mut self.options
    }

    fn bad_state(&self, op: &'static str) -> Error {
        Error::BadState(op, self.state.name())
    }

    fn frame(&self) -> Result<&FrameHeader> {
        self.headers.frame.as_ref().ok_or(Error::NoImage)
    }

    /// Reads markers up to the first scan.
    ///
    /// If the datastream holds only tables, `require_image` makes that an error; otherwise the
    /// context is reset for the next datastream and the tables stay loaded.
    pub fn read_header(&mut self, src: &mut dyn Source, require_image: bool) -> Result<HeaderStatus> {
        let result = self.read_header_impl(src, require_image);
        self.diag.check(result)
    }

    fn read_header_impl(&mut self, src: &mut dyn Source, require_image: bool) -> Result<HeaderStatus> {
        if !matches!(self.state, State::Start | State::InHeader) {
            return Err(self.bad_state("read_header"));
        }
        Ok(match self.consume_input_impl(src)? {
            InputStatus::ReachedSos => HeaderStatus::HeaderOk,
            InputStatus::ReachedEoi => {
                if require_image {
                    return Err(Error::NoImage);
                }
                self.abort();
                HeaderStatus::TablesOnly
            }
            InputStatus::Suspended => HeaderStatus::Suspended,
            // Only reachable once decompression has started.
            InputStatus::RowCompleted | InputStatus::ScanCompleted => {
                return Err(self.bad_state("read_header"));
            }
        })
    }

    /// Advances the input side by one step: a marker run, an iMCU row or the end of a scan.
    pub fn consume_input(&mut self, src: &mut dyn Source) -> Result<InputStatus> {
        let result = self.consume_input_impl(src);
        self.diag.check(result)
    }

    fn consume_input_impl(&mut self, src: &mut dyn Source) -> Result<InputStatus> {
        match self.state {
            State::Start => {
                debug!("starting a new datastream");
                self.diag.reset();
                self.headers.reset();
                self.marker_reader.reset();
                self.input = InputState::default();
                src.init();
                self.state = State::InHeader;
                self.consume_input_impl(src)
            }
            State::InHeader => {
                let status = self.consume_markers(src)?;
                if status == InputStatus::ReachedSos {
                    self.state = State::Ready;
                }
                Ok(status)
            }
            State::Ready => Ok(InputStatus::ReachedSos),
            State::Preload
            | State::Scanning
            | State::BufferedImage
            | State::BufferedPost
            | State::ReadingCoefficients
            | State::Stopping => self.consume(src),
        }
    }

    /// Sets up decompression and, unless in buffered-image mode, absorbs every scan of a
    /// multi-scan image before the first scanline can be read.
    pub fn start_decompress(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        let result = self.start_decompress_impl(src);
        self.diag.check(result)
    }

    fn start_decompress_impl(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        if self.state == State::Ready {
            self.master_setup(true)?;
            if self.options.buffered_image {
                self.state = State::BufferedImage;
                return Ok(ProcessingResult::Complete { result: () });
            }
            self.state = State::Preload;
        }
        if self.state != State::Preload {
            return Err(self.bad_state("start_decompress"));
        }
        if self.input.has_multiple_scans {
            loop {
                match self.consume(src)? {
                    InputStatus::Suspended => return Ok(ProcessingResult::NeedsMoreInput),
                    InputStatus::ReachedEoi => break,
                    _ => {}
                }
            }
        }
        self.output.scan_number = self.input.scan_number;
        self.start_output_pass();
        self.state = State::Scanning;
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Allocates the coefficient arrays, selects the stages and starts the first input pass.
    fn master_setup(&mut self, with_output: bool) -> Result<()> {
        self.memory.set_limits(self.options.memory.clone());
        let frame = self.headers.frame.as_ref().ok_or(Error::NoImage)?;
        let num_components = frame.components.len();
        let total_passes = if frame.progressive {
            2 + 3 * num_components
        } else if self.input.has_multiple_scans {
            num_components
        } else {
            1
        };
        let store = CoefficientStore::new(&mut self.memory, frame)?;
        if with_output {
            let stored = self.headers.default_color_space();
            let out = self
                .options
                .out_color_space
                .unwrap_or_else(|| default_out_color_space(stored));
            self.output = OutputState::new(frame, stored, out)?;
        }
        self.coefficients = Some(store);
        self.memory.realize_arrays()?;
        self.diag.set_total_passes(total_passes);
        self.start_input_pass()
    }

    /// Reads up to `out.len() / row_stride` scanlines of interleaved samples into `out`.
    ///
    /// Returns the number of scanlines produced, or `NeedsMoreInput` if input ran out before a
    /// single one could be.
    pub fn read_scanlines(
        &mut self,
        src: &mut dyn Source,
        out: &mut [u8],
    ) -> Result<ProcessingResult<usize>> {
        let result = if self.state == State::Scanning {
            self.read_scanlines_impl(src, out)
        } else {
            Err(self.bad_state("read_scanlines"))
        };
        self.diag.check(result)
    }

    /// Starts an output pass showing the image as of the end of scan `scan_number`.
    pub fn start_output(&mut self, scan_number: usize) -> Result<()> {
        let result = if self.state == State::BufferedImage {
            let mut scan_number = scan_number.max(1);
            if self.input.eoi_reached {
                scan_number = scan_number.min(self.input.scan_number);
            }
            debug!(scan_number, "starting output pass");
            self.output.scan_number = scan_number;
            self.start_output_pass();
            self.state = State::Scanning;
            Ok(())
        } else {
            Err(self.bad_state("start_output"))
        };
        self.diag.check(result)
    }

    /// Ends an output pass in buffered-image mode and absorbs input up to the next scan.
    pub fn finish_output(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        let result = self.finish_output_impl(src);
        self.diag.check(result)
    }

    fn finish_output_impl(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        if self.state == State::Scanning && self.options.buffered_image {
            self.state = State::BufferedPost;
        } else if self.state != State::BufferedPost {
            return Err(self.bad_state("finish_output"));
        }
        while self.input.scan_number <= self.output.scan_number && !self.input.eoi_reached {
            if self.consume(src)? == InputStatus::Suspended {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
        }
        self.state = State::BufferedImage;
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Reads the rest of the datastream and releases the image.
    pub fn finish_decompress(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        let result = self.finish_decompress_impl(src);
        self.diag.check(result)
    }

    fn finish_decompress_impl(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        match self.state {
            State::Scanning if !self.options.buffered_image => {
                let height = self.frame()?.height;
                if self.output.scanline < height {
                    return Err(Error::TooLittleData);
                }
                self.state = State::Stopping;
            }
            State::BufferedImage => self.state = State::Stopping,
            State::Stopping => {}
            _ => return Err(self.bad_state("finish_decompress")),
        }
        while !self.input.eoi_reached {
            if self.consume(src)? == InputStatus::Suspended {
                return Ok(ProcessingResult::NeedsMoreInput);
            }
        }
        src.term();
        debug!(warnings = self.diag.num_warnings(), "datastream complete");
        self.abort();
        Ok(ProcessingResult::Complete { result: () })
    }

    /// Reads the whole datastream into the coefficient arrays without reconstructing samples.
    /// Afterwards the arrays can be read with [`Self::coefficient_rows`] until
    /// [`Self::finish_decompress`].
    pub fn read_coefficients(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        let result = self.read_coefficients_impl(src);
        self.diag.check(result)
    }

    fn read_coefficients_impl(&mut self, src: &mut dyn Source) -> Result<ProcessingResult<()>> {
        if self.state == State::Ready {
            self.master_setup(false)?;
            self.state = State::ReadingCoefficients;
        }
        if self.state == State::ReadingCoefficients {
            loop {
                match self.consume(src)? {
                    InputStatus::Suspended => return Ok(ProcessingResult::NeedsMoreInput),
                    InputStatus::ReachedEoi => break,
                    _ => {}
                }
            }
            self.state = State::Stopping;
        }
        if self.state == State::Stopping && self.coefficients.is_some() {
            Ok(ProcessingResult::Complete { result: () })
        } else {
            Err(self.bad_state("read_coefficients"))
        }
    }

    /// Rows of quantized coefficients of `component`, in block rows.
    pub fn coefficient_rows(
        &mut self,
        component: usize,
        start_row: usize,
        num_rows: usize,
    ) -> Result<ArrayView<'_, Block>> {
        let array = match (&self.coefficients, self.state) {
            (Some(store), State::Stopping | State::BufferedImage) => store.array(component)?,
            _ => return Err(self.bad_state("coefficient_rows")),
        };
        self.memory.access(array, start_row, num_rows)
    }

    /// Abandons the current image. Tables and marker settings are kept.
    pub fn abort(&mut self) {
        self.memory.release_pool(PoolId::Image);
        self.coefficients = None;
        self.output = OutputState::default();
        self.state = State::Start;
    }

    /// Keeps APPn and COM segments with `code`, truncated to `length_limit` bytes; `None` stops
    /// saving them.
    pub fn save_markers(&mut self, code: u8, length_limit: Option<usize>) -> Result<()> {
        let result = match saveable_slot(code) {
            Some(slot) => {
                self.headers.save_limits[slot] = length_limit;
                Ok(())
            }
            None => Err(Error::BadMarker(code)),
        };
        self.diag.check(result)
    }

    pub fn saved_markers(&self) -> &[SavedMarker] {
        &self.headers.saved_markers
    }

    pub fn clear_saved_markers(&mut self) {
        self.headers.saved_markers.clear();
    }

    pub fn headers(&self) -> &StreamHeaders {
        &self.headers
    }

    pub fn has_multiple_scans(&self) -> Result<bool> {
        match self.state {
            State::Start | State::InHeader => Err(self.bad_state("has_multiple_scans")),
            _ => Ok(self.input.has_multiple_scans),
        }
    }

    /// Whether the end of the datastream has been reached.
    pub fn input_complete(&self) -> bool {
        self.input.eoi_reached
    }

    /// Precision of every coefficient of every component, in zigzag order, for progressive
    /// images: -1 until the first scan covering it, then the `al` of the latest scan.
    pub fn coef_bits(&self) -> Option<&[[i32; crate::BLOCK_SIZE]]> {
        self.coefficients.as_ref().and_then(|c| c.coef_bits())
    }

    pub fn num_warnings(&self) -> usize {
        self.diag.num_warnings()
    }

    /// Progress of the input side. Each scan is one pass; output passes are not counted.
    pub fn progress(&self) -> Progress {
        self.diag.progress()
    }

    /// Scans started so far and iMCU rows decoded in the current one.
    pub fn input_position(&self) -> (usize, usize) {
        (self.input.scan_number, self.input.imcu_row)
    }

    /// Scan shown by the current output pass and iMCU rows reconstructed in it.
    pub fn output_position(&self) -> (usize, usize) {
        (self.output.scan_number, self.output.imcu_row)
    }

    pub fn output_scanline(&self) -> usize {
        self.output.scanline
    }

    /// Samples per output pixel.
    pub fn output_components(&self) -> usize {
        self.output.components()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }
}

fn default_out_color_space(stored: ColorSpace) -> ColorSpace {
    match stored {
        ColorSpace::YCbCr => ColorSpace::Rgb,
        ColorSpace::Ycck => ColorSpace::Cmyk,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::{
        encode::Compressor,
        io::{MemorySource, SuspendingSource, VecDestination},
        util::test::{compress, gradient, gray_params},
    };

    fn gray_stream(width: usize, height: usize) -> Vec<u8> {
        compress(gray_params(width, height), &gradient(width, height, 1)).unwrap()
    }

    #[test]
    fn call_sequence_is_enforced() -> Result<()> {
        let data = gray_stream(8, 8);
        let mut src = MemorySource::new(&data);
        let mut d = Decompressor::new(DecompressOptions::default());
        let mut out = [0u8; 8];
        assert!(matches!(
            d.read_scanlines(&mut src, &mut out),
            Err(Error::BadState("read_scanlines", "Start"))
        ));
        assert!(d.has_multiple_scans().is_err());
        assert_eq!(d.read_header(&mut src, true)?, HeaderStatus::HeaderOk);
        assert!(matches!(
            d.finish_decompress(&mut src),
            Err(Error::BadState("finish_decompress", "Ready"))
        ));
        assert!(matches!(d.start_output(1), Err(Error::BadState(..))));
        Ok(())
    }

    #[test]
    fn single_block_image() -> Result<()> {
        let data = gray_stream(8, 8);
        let mut src = MemorySource::new(&data);
        let mut d = Decompressor::new(DecompressOptions::default());
        assert_eq!(d.read_header(&mut src, true)?, HeaderStatus::HeaderOk);
        assert!(!d.has_multiple_scans()?);
        assert!(d.start_decompress(&mut src)?.is_complete());
        let mut out = vec![0u8; 64];
        assert_eq!(d.read_scanlines(&mut src, &mut out)?.complete(), Some(8));
        assert_eq!(d.output_position(), (1, 1));
        assert!(d.finish_decompress(&mut src)?.is_complete());
        assert_eq!(d.num_warnings(), 0);
        let expected = gradient(8, 8, 1);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!(a.abs_diff(*b) <= 2);
        }
        Ok(())
    }

    #[test]
    fn tables_only_datastream() -> Result<()> {
        let mut params = gray_params(8, 8);
        params.tables.quant[1] = Some(crate::headers::QuantTable::flat(9));
        let mut compressor = Compressor::new(params)?;
        let mut dest = VecDestination::new();
        compressor.write_tables(&mut dest)?;
        let data = dest.into_inner();

        let mut d = Decompressor::new(DecompressOptions::default());
        let mut src = MemorySource::new(&data);
        assert!(matches!(d.read_header(&mut src, true), Err(Error::NoImage)));
        let mut d = Decompressor::new(DecompressOptions::default());
        let mut src = MemorySource::new(&data);
        assert_eq!(d.read_header(&mut src, false)?, HeaderStatus::TablesOnly);
        assert_eq!(d.headers().tables.quant[1].as_ref().unwrap().values, [9; 64]);
        Ok(())
    }

    #[test]
    fn header_suspends_without_losing_state() -> Result<()> {
        let data = gray_stream(16, 16);
        let mut src = SuspendingSource::new();
        let mut d = Decompressor::new(DecompressOptions::default());
        let mut fed = 0;
        loop {
            match d.read_header(&mut src, true)? {
                HeaderStatus::Suspended => {
                    src.push(&data[fed..fed + 1]);
                    fed += 1;
                }
                HeaderStatus::HeaderOk => break,
                HeaderStatus::TablesOnly => unreachable!(),
            }
        }
        assert_eq!(d.headers().frame.as_ref().unwrap().width, 16);
        Ok(())
    }

    #[test]
    fn saved_markers_outlive_the_image() -> Result<()> {
        let mut compressor = Compressor::new(gray_params(8, 8))?;
        let mut dest = VecDestination::new();
        compressor.start_compress(&mut dest, true)?;
        compressor.write_marker(&mut dest, 0xfe, b"a comment")?;
        let rows = gradient(8, 8, 1);
        let rows: Vec<&[u8]> = rows.chunks(8).collect();
        compressor.write_scanlines(&mut dest, &rows)?;
        compressor.finish_compress(&mut dest)?;
        let data = dest.into_inner();

        let mut d = Decompressor::new(DecompressOptions::default());
        d.save_markers(0xfe, Some(4))?;
        assert!(d.save_markers(0xd8, None).is_err());
        let mut src = MemorySource::new(&data);
        d.read_header(&mut src, true)?;
        d.start_decompress(&mut src)?;
        let mut out = vec![0; 64];
        d.read_scanlines(&mut src, &mut out)?;
        d.finish_decompress(&mut src)?;
        assert_eq!(d.saved_markers().len(), 1);
        assert_eq!(d.saved_markers()[0].data, b"a co");
        assert_eq!(d.saved_markers()[0].original_length, 9);
        d.clear_saved_markers();
        assert!(d.saved_markers().is_empty());
        Ok(())
    }
}
