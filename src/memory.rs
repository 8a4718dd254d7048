// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Pooled allocation of virtual arrays.
//!
//! A virtual array is a 2-D array of sample rows or coefficient block rows that is addressed as if
//! it were fully resident. Only rows inside the declared access window can be requested at once;
//! when the arrays of a context do not fit in the advisory memory limit, each of them keeps a
//! window of rows resident and pages the rest through a [`BackingStore`].
//!
//! Arrays are never freed individually. Each array belongs to a pool, and releasing a pool releases
//! all of its arrays and invalidates their handles.

mod backing_store;
mod virtual_array;

use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

pub use backing_store::{
    BackingStore, BackingStoreKind, MemoryBackingStore, TempFileBackingStore,
};
use backing_store::open_backing_store;
use virtual_array::{IoCounters, VirtualArray};

use crate::{
    BLOCK_SIZE, Block,
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// Lifetime class of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolId {
    /// Lives as long as the owning context.
    Permanent,
    /// Lives for one datastream.
    Image,
}

impl PoolId {
    fn index(self) -> usize {
        match self {
            PoolId::Permanent => 0,
            PoolId::Image => 1,
        }
    }
}

/// Memory configuration of a context.
#[derive(Debug, Clone)]
pub struct MemoryLimits {
    /// Advisory limit on the bytes used by virtual array buffers. `None` keeps every array fully
    /// resident.
    pub max_memory_to_use: Option<usize>,
    /// Largest single buffer the manager will allocate.
    pub max_alloc_chunk: usize,
    /// Storage used for the non-resident part of arrays.
    pub backing_store: BackingStoreKind,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_memory_to_use: None,
            max_alloc_chunk: 1_000_000_000,
            backing_store: BackingStoreKind::Memory,
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// Element types that virtual arrays can hold.
pub trait ArrayElement: private::Sealed + Copy + 'static {
    /// Size of one element in the backing store.
    const BYTES: usize;
    const ZERO: Self;

    fn write_bytes(items: &[Self], out: &mut [u8]);
    fn read_bytes(bytes: &[u8], out: &mut [Self]);

    #[doc(hidden)]
    fn arrays(pool: &Pool) -> &Vec<VirtualArray<Self>>;
    #[doc(hidden)]
    fn arrays_mut(pool: &mut Pool) -> &mut Vec<VirtualArray<Self>>;
}

impl private::Sealed for u8 {}
impl ArrayElement for u8 {
    const BYTES: usize = 1;
    const ZERO: u8 = 0;

    fn write_bytes(items: &[u8], out: &mut [u8]) {
        out.copy_from_slice(items);
    }

    fn read_bytes(bytes: &[u8], out: &mut [u8]) {
        out.copy_from_slice(bytes);
    }

    fn arrays(pool: &Pool) -> &Vec<VirtualArray<u8>> {
        &pool.samples
    }

    fn arrays_mut(pool: &mut Pool) -> &mut Vec<VirtualArray<u8>> {
        &mut pool.samples
    }
}

impl private::Sealed for Block {}
impl ArrayElement for Block {
    const BYTES: usize = BLOCK_SIZE * 2;
    const ZERO: Block = [0; BLOCK_SIZE];

    fn write_bytes(items: &[Block], out: &mut [u8]) {
        for (block, chunk) in items.iter().zip(out.chunks_exact_mut(Self::BYTES)) {
            LittleEndian::write_i16_into(block, chunk);
        }
    }

    fn read_bytes(bytes: &[u8], out: &mut [Block]) {
        for (block, chunk) in out.iter_mut().zip(bytes.chunks_exact(Self::BYTES)) {
            LittleEndian::read_i16_into(chunk, block);
        }
    }

    fn arrays(pool: &Pool) -> &Vec<VirtualArray<Block>> {
        &pool.blocks
    }

    fn arrays_mut(pool: &mut Pool) -> &mut Vec<VirtualArray<Block>> {
        &mut pool.blocks
    }
}

/// Handle of a virtual array. Valid until its pool is released.
#[derive(Debug)]
pub struct ArrayId<T> {
    pool: PoolId,
    generation: u32,
    index: usize,
    _ph: PhantomData<fn() -> T>,
}

impl<T> Clone for ArrayId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArrayId<T> {}

impl<T> PartialEq for ArrayId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool && self.generation == other.generation && self.index == other.index
    }
}

impl<T> Eq for ArrayId<T> {}

impl<T> ArrayId<T> {
    pub fn pool(&self) -> PoolId {
        self.pool
    }
}

pub type SampleArrayId = ArrayId<u8>;
pub type BlockArrayId = ArrayId<Block>;

/// Read-only view of resident rows.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a, T> {
    rows: &'a [Vec<T>],
}

impl<'a, T> ArrayView<'a, T> {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &'a [T] {
        &self.rows[row]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        self.rows.iter().map(|r| r.as_slice())
    }
}

/// Writable view of resident rows.
#[derive(Debug)]
pub struct ArrayViewMut<'a, T> {
    rows: &'a mut [Vec<T>],
}

impl<T> ArrayViewMut<'_, T> {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.rows[row]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.rows[row]
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.rows.iter_mut().map(|r| r.as_mut_slice())
    }
}

#[derive(Default)]
#[doc(hidden)]
pub struct Pool {
    generation: u32,
    samples: Vec<VirtualArray<u8>>,
    blocks: Vec<VirtualArray<Block>>,
}

impl Pool {
    fn resident_bytes(&self) -> usize {
        self.samples.iter().map(|a| a.resident_bytes()).sum::<usize>()
            + self.blocks.iter().map(|a| a.resident_bytes()).sum::<usize>()
    }
}

/// Observable memory manager counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes held by resident windows of realized arrays.
    pub resident_bytes: usize,
    /// Number of live arrays that use a backing store.
    pub backed_arrays: usize,
    /// Window write-backs performed so far.
    pub page_outs: usize,
    /// Window loads performed so far.
    pub page_ins: usize,
}

pub struct MemoryManager {
    limits: MemoryLimits,
    pools: [Pool; 2],
    counters: IoCounters,
    pending: bool,
}

impl MemoryManager {
    pub fn new(limits: MemoryLimits) -> Self {
        Self {
            limits,
            pools: Default::default(),
            counters: IoCounters::default(),
            pending: false,
        }
    }

    pub fn limits(&self) -> &MemoryLimits {
        &self.limits
    }

    /// Applies to arrays realized after the call.
    pub fn set_limits(&mut self, limits: MemoryLimits) {
        self.limits = limits;
    }

    pub fn request_sample_array(
        &mut self,
        pool: PoolId,
        samples_per_row: usize,
        num_rows: usize,
        max_access: usize,
        pre_zero: bool,
    ) -> Result<SampleArrayId> {
        self.request_array(pool, samples_per_row, num_rows, max_access, pre_zero)
    }

    pub fn request_block_array(
        &mut self,
        pool: PoolId,
        blocks_per_row: usize,
        num_rows: usize,
        max_access: usize,
        pre_zero: bool,
    ) -> Result<BlockArrayId> {
        self.request_array(pool, blocks_per_row, num_rows, max_access, pre_zero)
    }

    /// Registers an array. Its memory is allocated by the next [`Self::realize_arrays`] or by
    /// the first access.
    pub fn request_array<T: ArrayElement>(
        &mut self,
        pool: PoolId,
        width: usize,
        rows: usize,
        max_access: usize,
        pre_zero: bool,
    ) -> Result<ArrayId<T>> {
        if width == 0 || rows == 0 || max_access == 0 {
            return Err(Error::BadVirtualAccess(0, max_access, rows, max_access));
        }
        width
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(T::BYTES))
            .ok_or(Error::VirtualArrayTooLarge(width, rows))?;
        let p = &mut self.pools[pool.index()];
        let arrays = T::arrays_mut(p);
        arrays.try_reserve(1)?;
        arrays.push(VirtualArray::new(
            width,
            rows,
            max_access.min(rows),
            pre_zero,
        ));
        self.pending = true;
        Ok(ArrayId {
            pool,
            generation: p.generation,
            index: T::arrays(p).len() - 1,
            _ph: PhantomData,
        })
    }

    /// Allocates the resident windows of every array requested since the last call.
    ///
    /// If everything fits in `max_memory_to_use` all arrays are fully resident. Otherwise every
    /// pending array that does not fit gets the same number of access windows in memory and a
    /// backing store for the rest.
    pub fn realize_arrays(&mut self) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        let mut space_per_minheight = 0usize;
        let mut maximum_space = 0usize;
        for pool in self.pools.iter() {
            for a in pool.samples.iter().filter(|a| !a.is_realized()) {
                space_per_minheight = space_per_minheight.saturating_add(a.space_per_minheight());
                maximum_space = maximum_space.saturating_add(a.maximum_space());
            }
            for a in pool.blocks.iter().filter(|a| !a.is_realized()) {
                space_per_minheight = space_per_minheight.saturating_add(a.space_per_minheight());
                maximum_space = maximum_space.saturating_add(a.maximum_space());
            }
        }
        self.pending = false;
        if space_per_minheight == 0 {
            return Ok(());
        }
        let allocated: usize = self.pools.iter().map(|p| p.resident_bytes()).sum();
        let max_minheights = match self.limits.max_memory_to_use {
            None => usize::MAX,
            Some(limit) => {
                let avail = limit.saturating_sub(allocated);
                if avail >= maximum_space {
                    usize::MAX
                } else {
                    (avail / space_per_minheight).max(1)
                }
            }
        };
        debug!(
            space_per_minheight,
            maximum_space, max_minheights, "realizing virtual arrays"
        );
        let limits = self.limits.clone();
        for pool in self.pools.iter_mut() {
            for a in pool.samples.iter_mut().filter(|a| !a.is_realized()) {
                realize_one(a, max_minheights, &limits)?;
            }
            for a in pool.blocks.iter_mut().filter(|a| !a.is_realized()) {
                realize_one(a, max_minheights, &limits)?;
            }
        }
        Ok(())
    }

    fn array_mut<T: ArrayElement>(&mut self, id: ArrayId<T>) -> Result<&mut VirtualArray<T>> {
        let pool = &mut self.pools[id.pool.index()];
        if pool.generation != id.generation {
            return Err(Error::StaleArrayHandle);
        }
        T::arrays_mut(pool)
            .get_mut(id.index)
            .ok_or(Error::StaleArrayHandle)
    }

    /// Width and height of an array.
    pub fn dimensions<T: ArrayElement>(&self, id: ArrayId<T>) -> Result<(usize, usize)> {
        let pool = &self.pools[id.pool.index()];
        if pool.generation != id.generation {
            return Err(Error::StaleArrayHandle);
        }
        let a = T::arrays(pool).get(id.index).ok_or(Error::StaleArrayHandle)?;
        Ok((a.width, a.rows))
    }

    /// Read-only access to `num_rows` rows starting at `start_row`.
    pub fn access<T: ArrayElement>(
        &mut self,
        id: ArrayId<T>,
        start_row: usize,
        num_rows: usize,
    ) -> Result<ArrayView<'_, T>> {
        self.realize_arrays()?;
        let mut counters = self.counters;
        let array = self.array_mut(id)?;
        let range = array.prepare(start_row, num_rows, false, &mut counters);
        self.counters = counters;
        let range = range?;
        let array = self.array_mut(id)?;
        Ok(ArrayView {
            rows: array.rows(range),
        })
    }

    /// Writable access to `num_rows` rows starting at `start_row`.
    pub fn access_mut<T: ArrayElement>(
        &mut self,
        id: ArrayId<T>,
        start_row: usize,
        num_rows: usize,
    ) -> Result<ArrayViewMut<'_, T>> {
        self.realize_arrays()?;
        let mut counters = self.counters;
        let array = self.array_mut(id)?;
        let range = array.prepare(start_row, num_rows, true, &mut counters);
        self.counters = counters;
        let range = range?;
        let array = self.array_mut(id)?;
        Ok(ArrayViewMut {
            rows: array.rows_mut(range),
        })
    }

    /// Writable access to several distinct arrays at once. Each request is
    /// `(array, start_row, num_rows)`; views are returned in request order.
    pub fn access_many_mut<T: ArrayElement>(
        &mut self,
        requests: &[(ArrayId<T>, usize, usize)],
    ) -> Result<Vec<ArrayViewMut<'_, T>>> {
        self.realize_arrays()?;
        let mut ranges = Vec::with_capacity(requests.len());
        for (i, &(id, start, num)) in requests.iter().enumerate() {
            if requests[..i].iter().any(|r| r.0 == id) {
                return Err(Error::BadVirtualAccess(start, start + num, 0, 0));
            }
            let mut counters = self.counters;
            let range = self.array_mut(id)?.prepare(start, num, true, &mut counters);
            self.counters = counters;
            ranges.push(range?);
        }
        let mut views: Vec<Option<ArrayViewMut<'_, T>>> = (0..requests.len()).map(|_| None).collect();
        for (pool_id, pool) in [PoolId::Permanent, PoolId::Image]
            .into_iter()
            .zip(self.pools.iter_mut())
        {
            let generation = pool.generation;
            for (index, array) in T::arrays_mut(pool).iter_mut().enumerate() {
                let found = requests.iter().position(|(id, _, _)| {
                    id.pool == pool_id && id.generation == generation && id.index == index
                });
                if let Some(j) = found {
                    views[j] = Some(ArrayViewMut {
                        rows: array.rows_mut(ranges[j].clone()),
                    });
                }
            }
        }
        views
            .into_iter()
            .map(|v| v.ok_or(Error::StaleArrayHandle))
            .collect()
    }

    /// Releases every array of `pool`. Handles from that pool become stale; handles from the other
    /// pool are unaffected.
    pub fn release_pool(&mut self, pool: PoolId) {
        let p = &mut self.pools[pool.index()];
        debug!(
            ?pool,
            arrays = p.samples.len() + p.blocks.len(),
            "releasing pool"
        );
        p.samples.clear();
        p.blocks.clear();
        p.generation = p.generation.wrapping_add(1);
    }

    pub fn stats(&self) -> MemoryStats {
        let backed_arrays = self
            .pools
            .iter()
            .map(|p| {
                p.samples.iter().filter(|a| a.is_backed()).count()
                    + p.blocks.iter().filter(|a| a.is_backed()).count()
            })
            .sum();
        MemoryStats {
            resident_bytes: self.pools.iter().map(|p| p.resident_bytes()).sum(),
            backed_arrays,
            page_outs: self.counters.page_outs,
            page_ins: self.counters.page_ins,
        }
    }
}

fn realize_one<T: ArrayElement>(
    array: &mut VirtualArray<T>,
    max_minheights: usize,
    limits: &MemoryLimits,
) -> Result<()> {
    let minheights = array.rows.div_ceil(array.max_access);
    if minheights <= max_minheights {
        array.realize(array.rows, None, limits.max_alloc_chunk)
    } else {
        let rows_in_mem = (max_minheights * array.max_access).min(array.rows);
        let store = open_backing_store(limits.backing_store)?;
        array.realize(rows_in_mem, Some(store), limits.max_alloc_chunk)
    }
}
