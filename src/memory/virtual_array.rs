// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::ops::Range;

use crate::{
    error::{Error, Result},
    util::tracing_wrappers::*,
};

use super::{ArrayElement, backing_store::BackingStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct IoCounters {
    pub page_outs: usize,
    pub page_ins: usize,
}

/// Control block of one virtual array. Rows `cur_start_row..cur_start_row + rows_in_mem` are
/// resident in `buffer`; everything below `first_undef_row` that is not resident lives in `store`.
pub struct VirtualArray<T: ArrayElement> {
    pub(super) width: usize,
    pub(super) rows: usize,
    pub(super) max_access: usize,
    pre_zero: bool,
    // Zero until the array is realized.
    rows_in_mem: usize,
    buffer: Vec<Vec<T>>,
    cur_start_row: usize,
    first_undef_row: usize,
    dirty: bool,
    store: Option<Box<dyn BackingStore>>,
}

impl<T: ArrayElement> VirtualArray<T> {
    pub(super) fn new(width: usize, rows: usize, max_access: usize, pre_zero: bool) -> Self {
        Self {
            width,
            rows,
            max_access,
            pre_zero,
            rows_in_mem: 0,
            buffer: Vec::new(),
            cur_start_row: 0,
            first_undef_row: 0,
            dirty: false,
            store: None,
        }
    }

    pub(super) fn is_realized(&self) -> bool {
        self.rows_in_mem != 0
    }

    pub(super) fn row_bytes(&self) -> usize {
        self.width * T::BYTES
    }

    /// Bytes needed to keep one access window resident.
    pub(super) fn space_per_minheight(&self) -> usize {
        self.max_access * self.row_bytes()
    }

    /// Bytes needed to keep the whole array resident.
    pub(super) fn maximum_space(&self) -> usize {
        self.rows * self.row_bytes()
    }

    pub(super) fn resident_bytes(&self) -> usize {
        self.rows_in_mem * self.row_bytes()
    }

    pub(super) fn is_backed(&self) -> bool {
        self.store.is_some()
    }

    /// Allocates the resident window. `store` must be present iff `rows_in_mem < rows`.
    pub(super) fn realize(
        &mut self,
        rows_in_mem: usize,
        store: Option<Box<dyn BackingStore>>,
        max_alloc_chunk: usize,
    ) -> Result<()> {
        let row_bytes = self.row_bytes();
        if row_bytes > max_alloc_chunk {
            return Err(Error::AllocationTooLarge(row_bytes, max_alloc_chunk));
        }
        debug_assert!(rows_in_mem > 0 && rows_in_mem <= self.rows);
        debug_assert_eq!(store.is_some(), rows_in_mem < self.rows);
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(rows_in_mem)?;
        for _ in 0..rows_in_mem {
            let mut row = Vec::new();
            row.try_reserve_exact(self.width)?;
            row.resize(self.width, T::ZERO);
            buffer.push(row);
        }
        trace!(
            width = self.width,
            rows = self.rows,
            rows_in_mem,
            "realized virtual array"
        );
        self.buffer = buffer;
        self.rows_in_mem = rows_in_mem;
        self.store = store;
        Ok(())
    }

    /// Transfers the defined part of the resident window to or from the backing store.
    fn transfer(&mut self, writing: bool, counters: &mut IoCounters) -> Result<()> {
        let row_bytes = self.row_bytes();
        let end = (self.cur_start_row + self.rows_in_mem)
            .min(self.first_undef_row)
            .min(self.rows);
        if end <= self.cur_start_row {
            return Ok(());
        }
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let mut bytes = vec![0u8; row_bytes];
        for row in self.cur_start_row..end {
            let offset = (row * row_bytes) as u64;
            let resident = &mut self.buffer[row - self.cur_start_row];
            if writing {
                T::write_bytes(resident, &mut bytes);
                store.write(offset, &bytes)?;
            } else {
                store.read(offset, &mut bytes)?;
                T::read_bytes(&bytes, resident);
            }
        }
        if writing {
            counters.page_outs += 1;
        } else {
            counters.page_ins += 1;
        }
        Ok(())
    }

    /// Makes rows `start..start + num` resident and returns their position in the buffer.
    pub(super) fn prepare(
        &mut self,
        start: usize,
        num: usize,
        writable: bool,
        counters: &mut IoCounters,
    ) -> Result<Range<usize>> {
        let end = start
            .checked_add(num)
            .ok_or(Error::BadVirtualAccess(start, usize::MAX, self.rows, self.max_access))?;
        if end > self.rows || num > self.max_access || !self.is_realized() {
            return Err(Error::BadVirtualAccess(
                start,
                end,
                self.rows,
                self.max_access,
            ));
        }

        if start < self.cur_start_row || end > self.cur_start_row + self.rows_in_mem {
            if self.store.is_none() {
                return Err(Error::BadVirtualAccess(
                    start,
                    end,
                    self.rows,
                    self.max_access,
                ));
            }
            if self.dirty {
                self.transfer(true, counters)?;
                self.dirty = false;
            }
            // Moving forward loads starting at the target, moving backward puts the target at the
            // top of the window.
            self.cur_start_row = if start > self.cur_start_row {
                start.min(self.rows - self.rows_in_mem)
            } else {
                end.saturating_sub(self.rows_in_mem)
            };
            trace!(start, end, cur_start_row = self.cur_start_row, "paging window");
            self.transfer(false, counters)?;
        }

        if self.first_undef_row < end {
            let undef_start = if self.first_undef_row < start {
                if writable {
                    // Writers may not skip over rows.
                    return Err(Error::BadVirtualAccess(
                        start,
                        end,
                        self.rows,
                        self.max_access,
                    ));
                }
                start
            } else {
                self.first_undef_row
            };
            if writable {
                self.first_undef_row = end;
            }
            if self.pre_zero {
                for row in undef_start..end {
                    self.buffer[row - self.cur_start_row].fill(T::ZERO);
                }
            } else if !writable {
                return Err(Error::BadVirtualAccess(
                    start,
                    end,
                    self.rows,
                    self.max_access,
                ));
            }
        }
        if writable {
            self.dirty = true;
        }
        let offset = start - self.cur_start_row;
        Ok(offset..offset + num)
    }

    pub(super) fn rows(&self, range: Range<usize>) -> &[Vec<T>] {
        &self.buffer[range]
    }

    pub(super) fn rows_mut(&mut self, range: Range<usize>) -> &mut [Vec<T>] {
        &mut self.buffer[range]
    }
}
