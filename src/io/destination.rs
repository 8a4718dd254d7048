// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};

/// Push interface for compressed output.
///
/// The destination exposes a window of free space. When it is full the core calls
/// [`Destination::empty_buffer`]; a destination that cannot make room fails the operation, output
/// suspension is not supported.
pub trait Destination {
    fn init(&mut self) {}

    /// Free space that can be written right now.
    fn space(&mut self) -> &mut [u8];

    /// Marks the first `n` bytes of [`Destination::space`] as written.
    fn commit(&mut self, n: usize);

    /// Makes room. Returns `false` if the sink cannot accept more data.
    fn empty_buffer(&mut self) -> Result<bool>;

    /// Flushes whatever is left. Called once at the end of a datastream.
    fn term(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let space = self.space();
            if space.is_empty() {
                if !self.empty_buffer()? {
                    return Err(Error::DestinationFull);
                }
                continue;
            }
            let n = space.len().min(data.len());
            space[..n].copy_from_slice(&data[..n]);
            self.commit(n);
            data = &data[n..];
        }
        Ok(())
    }
}

/// Collects output in a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct VecDestination {
    buf: Vec<u8>,
    len: usize,
}

const GROW_CHUNK: usize = 4096;

impl VecDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }
}

impl Destination for VecDestination {
    fn space(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    fn empty_buffer(&mut self) -> Result<bool> {
        let grow = self.buf.len().max(GROW_CHUNK);
        self.buf.try_reserve(grow)?;
        self.buf.resize(self.buf.len() + grow, 0);
        Ok(true)
    }
}

/// Writes into a caller-provided buffer of fixed size.
#[derive(Debug)]
pub struct SliceDestination<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> SliceDestination<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub fn written(&self) -> usize {
        self.len
    }
}

impl Destination for SliceDestination<'_> {
    fn space(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.buf.len());
    }

    fn empty_buffer(&mut self) -> Result<bool> {
        Ok(false)
    }
}
