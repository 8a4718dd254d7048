// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use num_derive::{FromPrimitive, ToPrimitive};
use thiserror::Error;

use crate::report::Warning;

/// Stable numeric identifiers for every message the library can produce.
/// Applications that replace the message texts key their tables on these.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum MessageCode {
    OutOfMemory = 1,
    AllocationTooLarge,
    BadPool,
    StaleArrayHandle,
    BadVirtualAccess,
    VirtualArrayTooLarge,
    BackingStore,
    BadState,
    NoImage,
    TooLittleData,
    EmptyImage,
    ImageTooBig,
    ComponentCount,
    BadComponentId,
    BadSampling,
    FractionalSampling,
    McuTooLarge,
    BadQuantTableIndex,
    NoQuantTable,
    BadEntropyTableIndex,
    NoEntropyTable,
    BadPrecision,
    BadProgression,
    BadScanScript,
    SofDuplicate,
    SofNoSos,
    SosNoSof,
    EoiExpected,
    SoiDuplicate,
    NoSoi,
    BadLength,
    BadMarker,
    UnsupportedSof,
    BadDqt,
    BadDht,
    ResyncFailed,
    DestinationFull,
    BadMarkerWrite,
    ConversionNotSupported,
    CorruptData,
    ShortScanline,
    ExtraneousBytes = 100,
    MustResync,
    HitMarker,
    PrematureEnd,
    BogusProgression,
    NotSequential,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("Allocation of {0} bytes exceeds the single allocation limit of {1} bytes")]
    AllocationTooLarge(usize, usize),
    #[error("Invalid pool id {0}")]
    BadPool(usize),
    #[error("Virtual array handle refers to a released pool")]
    StaleArrayHandle,
    #[error("Bogus virtual array access: rows {0}..{1} of {2}, access window {3}")]
    BadVirtualAccess(usize, usize, usize, usize),
    #[error("Virtual array of {0}x{1} elements is too large")]
    VirtualArrayTooLarge(usize, usize),
    #[error("Backing store I/O failed: {0}")]
    BackingStore(#[from] std::io::Error),
    #[error("Improper call to {0} in state {1}")]
    BadState(&'static str, &'static str),
    #[error("Datastream contains no image")]
    NoImage,
    #[error("Application transferred too few scanlines")]
    TooLittleData,
    #[error("Empty image: {0}x{1}")]
    EmptyImage(usize, usize),
    #[error("Image too big: {0}x{1}")]
    ImageTooBig(usize, usize),
    #[error("Invalid number of components: {0}, max is {1}")]
    ComponentCount(usize, usize),
    #[error("Invalid component id {0} in scan")]
    BadComponentId(u8),
    #[error("Bogus sampling factors {0}x{1}")]
    BadSampling(u8, u8),
    #[error("Fractional sampling ratio not implemented: {0} into {1}")]
    FractionalSampling(u8, u8),
    #[error("Sampling factors too large for interleaved scan: {0} blocks per MCU")]
    McuTooLarge(usize),
    #[error("Bogus quantization table index {0}")]
    BadQuantTableIndex(usize),
    #[error("Quantization table {0} was not defined")]
    NoQuantTable(usize),
    #[error("Bogus entropy table index {0}")]
    BadEntropyTableIndex(usize),
    #[error("Entropy table {1} for class {0} was not defined")]
    NoEntropyTable(u8, usize),
    #[error("Unsupported data precision {0}")]
    BadPrecision(u8),
    #[error("Invalid progressive parameters Ss={0} Se={1} Ah={2} Al={3}")]
    BadProgression(u8, u8, u8, u8),
    #[error("Invalid scan script at entry {0}")]
    BadScanScript(usize),
    #[error("Invalid JPEG file structure: two SOF markers")]
    SofDuplicate,
    #[error("Invalid JPEG file structure: missing SOS marker")]
    SofNoSos,
    #[error("Invalid JPEG file structure: SOS before SOF")]
    SosNoSof,
    #[error("Didn't expect more than one scan")]
    EoiExpected,
    #[error("Invalid JPEG file structure: two SOI markers")]
    SoiDuplicate,
    #[error("Not a JPEG file: starts with 0x{0:02x} 0x{1:02x}")]
    NoSoi(u8, u8),
    #[error("Bogus marker length {0}")]
    BadLength(usize),
    #[error("Unsupported marker type 0x{0:02x}")]
    BadMarker(u8),
    #[error("Unsupported SOF marker type 0x{0:02x}")]
    UnsupportedSof(u8),
    #[error("Bogus DQT segment")]
    BadDqt,
    #[error("Bogus DHT segment")]
    BadDht,
    #[error("Failed to resynchronize at restart marker {0}")]
    ResyncFailed(u8),
    #[error("Output destination is full")]
    DestinationFull,
    #[error("Bogus marker code 0x{0:02x} for an application marker")]
    BadMarkerWrite(u8),
    #[error("Unsupported color conversion: {0} components")]
    ConversionNotSupported(usize),
    #[error("Corrupt data: {0}")]
    CorruptData(Warning),
    #[error("Scanline holds {0} samples, expected {1}")]
    ShortScanline(usize, usize),
}

impl Error {
    pub fn code(&self) -> MessageCode {
        match self {
            Error::OutOfMemory(_) => MessageCode::OutOfMemory,
            Error::AllocationTooLarge(..) => MessageCode::AllocationTooLarge,
            Error::BadPool(_) => MessageCode::BadPool,
            Error::StaleArrayHandle => MessageCode::StaleArrayHandle,
            Error::BadVirtualAccess(..) => MessageCode::BadVirtualAccess,
            Error::VirtualArrayTooLarge(..) => MessageCode::VirtualArrayTooLarge,
            Error::BackingStore(_) => MessageCode::BackingStore,
            Error::BadState(..) => MessageCode::BadState,
            Error::NoImage => MessageCode::NoImage,
            Error::TooLittleData => MessageCode::TooLittleData,
            Error::EmptyImage(..) => MessageCode::EmptyImage,
            Error::ImageTooBig(..) => MessageCode::ImageTooBig,
            Error::ComponentCount(..) => MessageCode::ComponentCount,
            Error::BadComponentId(_) => MessageCode::BadComponentId,
            Error::BadSampling(..) => MessageCode::BadSampling,
            Error::FractionalSampling(..) => MessageCode::FractionalSampling,
            Error::McuTooLarge(_) => MessageCode::McuTooLarge,
            Error::BadQuantTableIndex(_) => MessageCode::BadQuantTableIndex,
            Error::NoQuantTable(_) => MessageCode::NoQuantTable,
            Error::BadEntropyTableIndex(_) => MessageCode::BadEntropyTableIndex,
            Error::NoEntropyTable(..) => MessageCode::NoEntropyTable,
            Error::BadPrecision(_) => MessageCode::BadPrecision,
            Error::BadProgression(..) => MessageCode::BadProgression,
            Error::BadScanScript(_) => MessageCode::BadScanScript,
            Error::SofDuplicate => MessageCode::SofDuplicate,
            Error::SofNoSos => MessageCode::SofNoSos,
            Error::SosNoSof => MessageCode::SosNoSof,
            Error::EoiExpected => MessageCode::EoiExpected,
            Error::SoiDuplicate => MessageCode::SoiDuplicate,
            Error::NoSoi(..) => MessageCode::NoSoi,
            Error::BadLength(_) => MessageCode::BadLength,
            Error::BadMarker(_) => MessageCode::BadMarker,
            Error::UnsupportedSof(_) => MessageCode::UnsupportedSof,
            Error::BadDqt => MessageCode::BadDqt,
            Error::BadDht => MessageCode::BadDht,
            Error::ResyncFailed(_) => MessageCode::ResyncFailed,
            Error::DestinationFull => MessageCode::DestinationFull,
            Error::BadMarkerWrite(_) => MessageCode::BadMarkerWrite,
            Error::ConversionNotSupported(_) => MessageCode::ConversionNotSupported,
            Error::CorruptData(_) => MessageCode::CorruptData,
            Error::ShortScanline(..) => MessageCode::ShortScanline,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
