// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{error::Result, util::tracing_wrappers::*};

/// Scratch storage for the parts of a virtual array that are not resident.
///
/// Contents only need to live as long as the array that owns the store. Offsets are byte offsets
/// of row-major pages keyed by logical row index.
pub trait BackingStore {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
}

/// Which kind of backing store to open for arrays that do not fit in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackingStoreKind {
    /// A separate in-process buffer. Keeps the resident window small without touching the
    /// filesystem.
    #[default]
    Memory,
    /// A temporary file in [`std::env::temp_dir`], deleted when the array is released.
    TempFile,
}

pub(crate) fn open_backing_store(kind: BackingStoreKind) -> Result<Box<dyn BackingStore>> {
    debug!(?kind, "opening backing store");
    Ok(match kind {
        BackingStoreKind::Memory => Box::new(MemoryBackingStore::new()),
        BackingStoreKind::TempFile => Box::new(TempFileBackingStore::create()?),
    })
}

#[derive(Debug, Default)]
pub struct MemoryBackingStore {
    data: Vec<u8>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackingStore for MemoryBackingStore {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.try_reserve(end - self.data.len())?;
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }
}

static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
pub struct TempFileBackingStore {
    file: File,
    path: PathBuf,
}

impl TempFileBackingStore {
    pub fn create() -> Result<Self> {
        loop {
            let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "jpeg_core_{}_{}.tmp",
                std::process::id(),
                n
            ));
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => return Ok(Self { file, path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl BackingStore for TempFileBackingStore {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

impl Drop for TempFileBackingStore {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn BackingStore) -> Result<()> {
        store.write(4, &[1, 2, 3])?;
        store.write(0, &[9, 9, 9, 9])?;
        let mut buf = [0u8; 7];
        store.read(0, &mut buf)?;
        assert_eq!(buf, [9, 9, 9, 9, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn memory_store() -> Result<()> {
        let mut store = MemoryBackingStore::new();
        exercise(&mut store)?;
        let mut past_end = [0u8; 2];
        assert!(store.read(6, &mut past_end).is_err());
        Ok(())
    }

    #[test]
    fn temp_file_store_is_removed_on_drop() -> Result<()> {
        let mut store = TempFileBackingStore::create()?;
        exercise(&mut store)?;
        let path = store.path.clone();
        assert!(path.exists());
        drop(store);
        assert!(!path.exists());
        Ok(())
    }
}
