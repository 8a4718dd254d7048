// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{error::Result, markers::codes::RST0, util::tracing_wrappers::*};

/// What to do after a restart marker other than the expected one was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncAction {
    /// Discard the marker and resume decoding right after it.
    DiscardMarker,
    /// Discard the marker, scan forward to the next marker and decide again.
    ScanForward,
    /// Leave the marker in place. Entropy data reads as zeros until it is reached in sequence.
    LeaveMarker,
}

/// Resynchronization policy of the reference library: markers that are probably ahead of the
/// expected one are left alone, markers that are probably behind are skipped.
pub fn default_resync_action(marker: u8, desired: u8) -> ResyncAction {
    let rst = |n: u8| RST0 + (n & 7);
    if marker < 0xc0 {
        // Not a valid marker at all.
        ResyncAction::ScanForward
    } else if !(RST0..=RST0 + 7).contains(&marker) {
        ResyncAction::LeaveMarker
    } else if marker == rst(desired.wrapping_add(1)) || marker == rst(desired.wrapping_add(2)) {
        ResyncAction::LeaveMarker
    } else if marker == rst(desired.wrapping_sub(1)) || marker == rst(desired.wrapping_sub(2)) {
        ResyncAction::ScanForward
    } else {
        ResyncAction::DiscardMarker
    }
}

/// Pull interface for compressed input.
///
/// The source exposes a window of unconsumed bytes. When the core needs more it calls
/// [`Source::fill_buffer`], which appends to the window; unconsumed bytes are never dropped, so the
/// core can parse ahead without consuming and commit only complete units.
pub trait Source {
    fn init(&mut self) {}

    /// Unconsumed bytes that are available right now.
    fn bytes(&self) -> &[u8];

    /// Marks the first `n` bytes of the window as consumed.
    fn consume(&mut self, n: usize);

    /// Makes more bytes available. Returns `false` if no bytes can be added right now.
    fn fill_buffer(&mut self) -> Result<bool>;

    /// Whether the window already contains every byte that will ever arrive.
    fn is_complete(&self) -> bool;

    /// Discards up to `n` bytes, filling as needed. Returns how many were discarded; fewer than `n`
    /// means the source ran out.
    fn skip(&mut self, n: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            let available = self.bytes().len().min(n - skipped);
            if available == 0 {
                if !self.fill_buffer()? {
                    break;
                }
                continue;
            }
            self.consume(available);
            skipped += available;
        }
        Ok(skipped)
    }

    /// Decides how to recover after `marker` was found where restart marker `desired` (0..8)
    /// was expected.
    fn resync_to_restart(&mut self, marker: u8, desired: u8) -> ResyncAction {
        default_resync_action(marker, desired)
    }

    fn term(&mut self) {}
}

/// A source over a complete in-memory datastream.
#[derive(Debug, Clone)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Source for MemorySource<'_> {
    fn bytes(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    fn fill_buffer(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn is_complete(&self) -> bool {
        true
    }
}

/// A source fed incrementally by the application.
///
/// Pushed bytes become visible to the core on its next [`Source::fill_buffer`] call. Until
/// [`SuspendingSource::finish`] is called, running out of bytes suspends the core.
#[derive(Debug, Default, Clone)]
pub struct SuspendingSource {
    window: Vec<u8>,
    start: usize,
    incoming: Vec<u8>,
    consumed: usize,
    finished: bool,
}

impl SuspendingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }

    /// No more data will be pushed.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.consumed
    }
}

impl Source for SuspendingSource {
    fn bytes(&self) -> &[u8] {
        &self.window[self.start..]
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.window.len() - self.start);
        self.start += n;
        self.consumed += n;
    }

    fn fill_buffer(&mut self) -> Result<bool> {
        if self.incoming.is_empty() {
            return Ok(false);
        }
        self.window.drain(..self.start);
        self.start = 0;
        self.window.try_reserve(self.incoming.len())?;
        self.window.append(&mut self.incoming);
        trace!(buffered = self.window.len(), "source refilled");
        Ok(true)
    }

    fn is_complete(&self) -> bool {
        self.finished && self.incoming.is_empty()
    }
}
