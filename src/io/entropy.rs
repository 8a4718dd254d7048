// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Destination, Fill, Source, fill_to};
use crate::error::Result;

/// Byte-level reader for entropy-coded segments.
///
/// Reads are tentative: nothing is consumed from the source until [`EntropyReader::commit`], so a
/// unit that runs out of input halfway can be retried from the same position. Stuffed `0xff 0x00`
/// pairs read as `0xff`. A marker ends the segment: it stays in the source for the marker reader,
/// and every read past it returns zero. The same happens at the end of a complete source.
pub struct EntropyReader<'a> {
    src: &'a mut dyn Source,
    pos: usize,
    at_marker: bool,
    hit_marker: bool,
    premature_end: bool,
}

impl<'a> EntropyReader<'a> {
    /// `marker_pending` is set if a marker has already been read from the source and not yet
    /// processed; the segment is over in that case.
    pub fn new(src: &'a mut dyn Source, marker_pending: bool) -> Self {
        Self {
            src,
            pos: 0,
            at_marker: marker_pending,
            hit_marker: false,
            premature_end: false,
        }
    }

    fn end_of_segment(&mut self, premature: bool) -> Option<u8> {
        self.at_marker = true;
        self.hit_marker = true;
        self.premature_end |= premature;
        Some(0)
    }

    /// Returns the next data byte, or `None` if the source has to be refilled first.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.at_marker {
            return Ok(self.end_of_segment(false));
        }
        match fill_to(&mut *self.src, self.pos + 1)? {
            Fill::Ready => {}
            Fill::Suspend => return Ok(None),
            Fill::Exhausted => return Ok(self.end_of_segment(true)),
        }
        let byte = self.src.bytes()[self.pos];
        if byte != 0xff {
            self.pos += 1;
            return Ok(Some(byte));
        }
        // Look past any fill bytes.
        let mut next = self.pos + 1;
        loop {
            match fill_to(&mut *self.src, next + 1)? {
                Fill::Ready => {}
                Fill::Suspend => return Ok(None),
                Fill::Exhausted => return Ok(self.end_of_segment(true)),
            }
            match self.src.bytes()[next] {
                0xff => next += 1,
                0 => {
                    self.pos = next + 1;
                    return Ok(Some(0xff));
                }
                _ => return Ok(self.end_of_segment(false)),
            }
        }
    }

    /// Reads a big-endian 16-bit value.
    pub fn read_u16(&mut self) -> Result<Option<u16>> {
        let Some(hi) = self.read_byte()? else {
            return Ok(None);
        };
        let Some(lo) = self.read_byte()? else {
            return Ok(None);
        };
        Ok(Some(u16::from_be_bytes([hi, lo])))
    }

    /// Consumes everything read so far.
    pub fn commit(&mut self) {
        self.src.consume(self.pos);
        self.pos = 0;
    }

    /// Whether a read ran into a marker or the end of data, i.e. returned made-up zeros.
    pub fn hit_marker(&self) -> bool {
        self.hit_marker
    }

    /// Whether a read ran into the end of a complete source.
    pub fn premature_end(&self) -> bool {
        self.premature_end
    }
}

const FLUSH_THRESHOLD: usize = 4096;

/// Byte-level writer for entropy-coded segments; stuffs a zero after every `0xff` data byte.
pub struct EntropyWriter<'a> {
    dest: &'a mut dyn Destination,
    buf: Vec<u8>,
}

impl<'a> EntropyWriter<'a> {
    pub fn new(dest: &'a mut dyn Destination) -> Self {
        Self {
            dest,
            buf: Vec::new(),
        }
    }

    pub fn emit_byte(&mut self, byte: u8) -> Result<()> {
        self.buf.push(byte);
        if byte == 0xff {
            self.buf.push(0);
        }
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    pub fn emit_u16(&mut self, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.emit_byte(hi)?;
        self.emit_byte(lo)
    }

    /// Writes a marker without stuffing.
    pub fn emit_marker(&mut self, code: u8) -> Result<()> {
        self.buf.extend_from_slice(&[0xff, code]);
        Ok(())
    }

    /// Hands buffered bytes to the destination. Must be called before the writer is dropped.
    pub fn flush(&mut self) -> Result<()> {
        self.dest.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}
