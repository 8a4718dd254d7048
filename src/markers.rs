// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Marker segment collaborators.
//!
//! The core never parses marker syntax itself; it drives a [`MarkerReader`] while decoding and a
//! [`MarkerWriter`] while encoding, and only consumes their effects on the shared descriptors.

pub mod codes;
mod reader;
mod writer;

pub use reader::JpegMarkerReader;
pub use writer::JpegMarkerWriter;

use crate::{
    error::Result,
    headers::{FrameHeader, ScanInfo, StreamHeaders, TableSet},
    io::{Destination, Source},
    report::Diagnostics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    Suspended,
    ReachedSos,
    ReachedEoi,
}

pub trait MarkerReader {
    /// Forgets everything about the previous datastream.
    fn reset(&mut self);

    /// Processes markers until the start of a scan or the end of the image. Every segment is
    /// applied to `headers` only once it is completely available, so suspension loses nothing.
    fn read_markers(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<MarkerStatus>;

    /// Reads the next expected restart marker, resynchronizing if another marker is found.
    /// Returns `false` on suspension.
    fn read_restart_marker(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<bool>;

    /// A marker that has been read from the source but not yet processed. Entropy-coded data is
    /// over while one is pending.
    fn unread_marker(&self) -> Option<u8>;

    fn saw_sof(&self) -> bool;
}

pub trait MarkerWriter {
    /// Forgets what was written to the previous datastream.
    fn reset(&mut self);

    fn write_file_header(&mut self, dest: &mut dyn Destination) -> Result<()>;

    /// Writes unsent quantization tables used by the frame, then the frame header.
    fn write_frame_header(
        &mut self,
        dest: &mut dyn Destination,
        frame: &FrameHeader,
        tables: &mut TableSet,
    ) -> Result<()>;

    /// Writes unsent entropy tables needed by the scan, the restart interval if it changed, then
    /// the scan header.
    fn write_scan_header(
        &mut self,
        dest: &mut dyn Destination,
        frame: &FrameHeader,
        scan: &ScanInfo,
        tables: &mut TableSet,
        restart_interval: usize,
    ) -> Result<()>;

    fn write_file_trailer(&mut self, dest: &mut dyn Destination) -> Result<()>;

    /// Writes an abbreviated datastream holding every defined table and no image.
    fn write_tables_only(&mut self, dest: &mut dyn Destination, tables: &mut TableSet)
    -> Result<()>;

    /// Writes an arbitrary marker segment.
    fn write_marker(&mut self, dest: &mut dyn Destination, code: u8, data: &[u8]) -> Result<()>;
}
