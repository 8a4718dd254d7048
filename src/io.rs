// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Pull-based byte source and sink used by the codec core.
//!
//! Both directions expose a byte window that the core manipulates directly. A [`Source`] that has
//! no bytes right now makes the core return a suspension status; a [`Destination`] that cannot make
//! room is a fatal error.

mod destination;
mod entropy;
mod source;

pub use destination::{Destination, SliceDestination, VecDestination};
pub use entropy::{EntropyReader, EntropyWriter};
pub use source::{MemorySource, ResyncAction, Source, SuspendingSource, default_resync_action};

use crate::error::Result;

/// Outcome of waiting for a number of bytes to be buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    Ready,
    /// Fewer bytes are available right now; retry later.
    Suspend,
    /// Fewer bytes are available and no more will ever arrive.
    Exhausted,
}

/// Fills `src` until at least `n` unconsumed bytes are buffered.
pub(crate) fn fill_to<S: Source + ?Sized>(src: &mut S, n: usize) -> Result<Fill> {
    while src.bytes().len() < n {
        if !src.fill_buffer()? {
            return Ok(if src.is_complete() {
                Fill::Exhausted
            } else {
                Fill::Suspend
            });
        }
    }
    Ok(Fill::Ready)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn fill_to_distinguishes_suspension_from_end() -> Result<()> {
        let mut src = SuspendingSource::new();
        src.push(&[1, 2]);
        assert_eq!(fill_to(&mut src, 2)?, Fill::Ready);
        assert_eq!(fill_to(&mut src, 3)?, Fill::Suspend);
        src.push(&[3]);
        assert_eq!(fill_to(&mut src, 3)?, Fill::Ready);
        src.finish();
        assert_eq!(fill_to(&mut src, 4)?, Fill::Exhausted);
        Ok(())
    }
}
