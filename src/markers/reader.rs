// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;

use super::{
    MarkerReader, MarkerStatus,
    codes::{APP0, APP14, EOI, MarkerCode, RST0, saveable_slot},
};
use crate::{
    BLOCK_SIZE, MAX_COMPS_IN_SCAN, NUM_ENTROPY_TABLES, NUM_QUANT_TABLES,
    error::{Error, Result},
    headers::{
        ComponentInfo, EntropyTable, FrameHeader, QuantTable, SavedMarker, ScanInfo,
        StreamHeaders,
    },
    io::{Fill, ResyncAction, Source, fill_to},
    report::{Diagnostics, Warning},
    util::tracing_wrappers::*,
};

enum Segment {
    /// The whole segment, length field included, is buffered.
    Ready(usize),
    Suspend,
    Exhausted,
}

fn buffer_segment(src: &mut dyn Source) -> Result<Segment> {
    match fill_to(src, 2)? {
        Fill::Ready => {}
        Fill::Suspend => return Ok(Segment::Suspend),
        Fill::Exhausted => return Ok(Segment::Exhausted),
    }
    let length = BigEndian::read_u16(src.bytes()) as usize;
    if length < 2 {
        return Err(Error::BadLength(length));
    }
    Ok(match fill_to(src, length)? {
        Fill::Ready => Segment::Ready(length),
        Fill::Suspend => Segment::Suspend,
        Fill::Exhausted => Segment::Exhausted,
    })
}

/// Reader for the standard marker syntax.
#[derive(Debug, Default)]
pub struct JpegMarkerReader {
    saw_soi: bool,
    saw_sof: bool,
    unread_marker: Option<u8>,
    next_restart_num: u8,
    discarded_bytes: usize,
    skip_remaining: usize,
    resync_warned: bool,
}

impl JpegMarkerReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_of_data(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<u8> {
        headers.warn_premature_end(diag)?;
        let rest = src.bytes().len();
        src.consume(rest);
        self.skip_remaining = 0;
        Ok(EOI)
    }

    fn first_marker(&mut self, src: &mut dyn Source) -> Result<Option<u8>> {
        let fill = fill_to(src, 2)?;
        if fill == Fill::Suspend {
            return Ok(None);
        }
        let bytes = src.bytes();
        let b0 = bytes.first().copied().unwrap_or(0);
        let b1 = bytes.get(1).copied().unwrap_or(0);
        if fill == Fill::Exhausted || b0 != 0xff || MarkerCode::from_u8(b1) != Some(MarkerCode::Soi)
        {
            return Err(Error::NoSoi(b0, b1));
        }
        src.consume(2);
        Ok(Some(b1))
    }

    /// Finds the next marker, skipping garbage and fill bytes.
    fn next_marker(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<Option<u8>> {
        loop {
            loop {
                match fill_to(src, 1)? {
                    Fill::Ready => {}
                    Fill::Suspend => return Ok(None),
                    Fill::Exhausted => return self.end_of_data(src, headers, diag).map(Some),
                }
                let bytes = src.bytes();
                let garbage = bytes.iter().position(|&b| b == 0xff).unwrap_or(bytes.len());
                if garbage == 0 {
                    break;
                }
                self.discarded_bytes += garbage;
                src.consume(garbage);
            }
            let mut n = 1;
            let code = loop {
                match fill_to(src, n + 1)? {
                    Fill::Ready => {}
                    Fill::Suspend => return Ok(None),
                    Fill::Exhausted => return self.end_of_data(src, headers, diag).map(Some),
                }
                match src.bytes()[n] {
                    0xff => n += 1,
                    c => break c,
                }
            };
            src.consume(n + 1);
            if code == 0 {
                // Stuffed zero outside of entropy-coded data.
                self.discarded_bytes += 2;
                continue;
            }
            if self.discarded_bytes != 0 {
                let count = std::mem::take(&mut self.discarded_bytes);
                diag.warn(Warning::ExtraneousBytes {
                    count,
                    marker: code,
                })?;
            }
            return Ok(Some(code));
        }
    }

    fn get_soi(&mut self, headers: &mut StreamHeaders) -> Result<()> {
        if self.saw_soi {
            return Err(Error::SoiDuplicate);
        }
        debug!("SOI");
        self.saw_soi = true;
        headers.restart_interval = 0;
        headers.saw_jfif = false;
        headers.adobe_transform = None;
        Ok(())
    }

    fn get_sof(&mut self, body: &[u8], headers: &mut StreamHeaders, code: u8) -> Result<()> {
        if self.saw_sof {
            return Err(Error::SofDuplicate);
        }
        if body.len() < 6 {
            return Err(Error::BadLength(body.len() + 2));
        }
        let precision = body[0];
        let height = BigEndian::read_u16(&body[1..3]) as usize;
        let width = BigEndian::read_u16(&body[3..5]) as usize;
        let num_components = body[5] as usize;
        if body.len() != 6 + 3 * num_components {
            return Err(Error::BadLength(body.len() + 2));
        }
        if precision != 8 {
            return Err(Error::BadPrecision(precision));
        }
        let components = body[6..]
            .chunks_exact(3)
            .map(|c| ComponentInfo::new(c[0], c[1] >> 4, c[1] & 15, c[2] as usize))
            .collect();
        let progressive = MarkerCode::from_u8(code) == Some(MarkerCode::Sof2);
        let frame = FrameHeader::new(width, height, progressive, components)?;
        debug!(width, height, num_components, progressive, "SOF");
        headers.frame = Some(frame);
        self.saw_sof = true;
        Ok(())
    }

    fn get_sos(&mut self, body: &[u8], headers: &mut StreamHeaders) -> Result<()> {
        let frame = match headers.frame.as_mut() {
            Some(frame) if self.saw_sof => frame,
            _ => return Err(Error::SosNoSof),
        };
        let n = body.first().copied().unwrap_or(0) as usize;
        if n == 0 || n > MAX_COMPS_IN_SCAN || body.len() != 4 + 2 * n {
            return Err(Error::BadLength(body.len() + 2));
        }
        let mut components = Vec::with_capacity(n);
        for c in body[1..1 + 2 * n].chunks_exact(2) {
            let index = frame
                .component_index(c[0])
                .filter(|i| !components.contains(i))
                .ok_or(Error::BadComponentId(c[0]))?;
            let comp = &mut frame.components[index];
            comp.dc_table = (c[1] >> 4) as usize;
            comp.ac_table = (c[1] & 15) as usize;
            components.push(index);
        }
        let tail = &body[1 + 2 * n..];
        let scan = ScanInfo::progressive(components, tail[0], tail[1], tail[2] >> 4, tail[2] & 15);
        debug!(?scan, "SOS");
        headers.scan = Some(scan);
        self.next_restart_num = 0;
        Ok(())
    }

    fn get_dqt(&mut self, mut body: &[u8], headers: &mut StreamHeaders) -> Result<()> {
        while let Some((&n, rest)) = body.split_first() {
            let (precision, index) = (n >> 4, (n & 15) as usize);
            if index >= NUM_QUANT_TABLES {
                return Err(Error::BadQuantTableIndex(index));
            }
            let size = match precision {
                0 => BLOCK_SIZE,
                1 => 2 * BLOCK_SIZE,
                _ => return Err(Error::BadDqt),
            };
            if rest.len() < size {
                return Err(Error::BadDqt);
            }
            let zigzag: [u16; BLOCK_SIZE] = array_init::array_init(|k| {
                if precision == 0 {
                    rest[k] as u16
                } else {
                    BigEndian::read_u16(&rest[2 * k..])
                }
            });
            trace!(index, precision, "DQT");
            headers.tables.quant[index] = Some(QuantTable::from_zigzag(&zigzag));
            body = &rest[size..];
        }
        Ok(())
    }

    fn get_dht(&mut self, mut body: &[u8], headers: &mut StreamHeaders) -> Result<()> {
        while let Some((&n, rest)) = body.split_first() {
            let (class, index) = (n >> 4, (n & 15) as usize);
            if class > 1 {
                return Err(Error::BadDht);
            }
            if index >= NUM_ENTROPY_TABLES {
                return Err(Error::BadEntropyTableIndex(index));
            }
            if rest.len() < 16 {
                return Err(Error::BadDht);
            }
            let mut bits = [0u8; 17];
            bits[1..].copy_from_slice(&rest[..16]);
            let count: usize = bits.iter().map(|&b| b as usize).sum();
            if rest.len() < 16 + count {
                return Err(Error::BadDht);
            }
            let table = EntropyTable::new(bits, &rest[16..16 + count])?;
            trace!(class, index, count, "DHT");
            let slot = if class == 0 {
                &mut headers.tables.dc
            } else {
                &mut headers.tables.ac
            };
            slot[index] = Some(table);
            body = &rest[16 + count..];
        }
        Ok(())
    }

    fn get_dri(&mut self, body: &[u8], headers: &mut StreamHeaders) -> Result<()> {
        if body.len() != 2 {
            return Err(Error::BadLength(body.len() + 2));
        }
        headers.restart_interval = BigEndian::read_u16(body) as usize;
        debug!(interval = headers.restart_interval, "DRI");
        Ok(())
    }

    fn get_app(&mut self, body: &[u8], headers: &mut StreamHeaders, code: u8) {
        if code == APP0 && body.starts_with(b"JFIF\0") {
            headers.saw_jfif = true;
        }
        if code == APP14 && body.len() >= 12 && body.starts_with(b"Adobe") {
            headers.adobe_transform = Some(body[11]);
        }
        if let Some(limit) = saveable_slot(code).and_then(|slot| headers.save_limits[slot]) {
            let kept = body.len().min(limit);
            trace!(code, length = body.len(), kept, "saving marker");
            headers.saved_markers.push(SavedMarker {
                code,
                original_length: body.len(),
                data: body[..kept].to_vec(),
            });
        }
    }

    fn resync(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
        mut marker: u8,
    ) -> Result<bool> {
        let desired = self.next_restart_num;
        if !self.resync_warned {
            self.resync_warned = true;
            diag.warn(Warning::MustResync {
                found: marker,
                expected: desired,
            })?;
        }
        loop {
            match src.resync_to_restart(marker, desired) {
                ResyncAction::DiscardMarker => {
                    self.unread_marker = None;
                    return Ok(true);
                }
                ResyncAction::LeaveMarker => return Ok(true),
                ResyncAction::ScanForward => {
                    self.unread_marker = None;
                    match self.next_marker(src, headers, diag)? {
                        Some(m) => {
                            self.unread_marker = Some(m);
                            marker = m;
                        }
                        None => return Ok(false),
                    }
                }
            }
        }
    }
}

impl MarkerReader for JpegMarkerReader {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn read_markers(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<MarkerStatus> {
        loop {
            if self.skip_remaining > 0 {
                let skipped = src.skip(self.skip_remaining)?;
                self.skip_remaining -= skipped;
                if self.skip_remaining > 0 {
                    if !src.is_complete() {
                        return Ok(MarkerStatus::Suspended);
                    }
                    self.unread_marker = Some(self.end_of_data(src, headers, diag)?);
                } else {
                    self.unread_marker = None;
                }
                continue;
            }
            let marker = match self.unread_marker {
                Some(m) => m,
                None => {
                    let found = if self.saw_soi {
                        self.next_marker(src, headers, diag)?
                    } else {
                        self.first_marker(src)?
                    };
                    let Some(m) = found else {
                        return Ok(MarkerStatus::Suspended);
                    };
                    self.unread_marker = Some(m);
                    m
                }
            };
            let Some(code) = MarkerCode::from_u8(marker) else {
                return Err(Error::BadMarker(marker));
            };
            match code {
                MarkerCode::Soi => self.get_soi(headers)?,
                MarkerCode::Eoi => {
                    debug!("EOI");
                    self.unread_marker = None;
                    return Ok(MarkerStatus::ReachedEoi);
                }
                MarkerCode::Rst0
                | MarkerCode::Rst1
                | MarkerCode::Rst2
                | MarkerCode::Rst3
                | MarkerCode::Rst4
                | MarkerCode::Rst5
                | MarkerCode::Rst6
                | MarkerCode::Rst7
                | MarkerCode::Tem => {
                    trace!(marker, "parameterless marker");
                }
                MarkerCode::Sof3
                | MarkerCode::Sof5
                | MarkerCode::Sof6
                | MarkerCode::Sof7
                | MarkerCode::Jpg
                | MarkerCode::Sof9
                | MarkerCode::Sof10
                | MarkerCode::Sof11
                | MarkerCode::Sof13
                | MarkerCode::Sof14
                | MarkerCode::Sof15 => return Err(Error::UnsupportedSof(marker)),
                MarkerCode::Sof0
                | MarkerCode::Sof1
                | MarkerCode::Sof2
                | MarkerCode::Sos
                | MarkerCode::Dqt
                | MarkerCode::Dht
                | MarkerCode::Dri
                | MarkerCode::Dac
                | MarkerCode::Dnl
                | MarkerCode::App0
                | MarkerCode::App1
                | MarkerCode::App2
                | MarkerCode::App3
                | MarkerCode::App4
                | MarkerCode::App5
                | MarkerCode::App6
                | MarkerCode::App7
                | MarkerCode::App8
                | MarkerCode::App9
                | MarkerCode::App10
                | MarkerCode::App11
                | MarkerCode::App12
                | MarkerCode::App13
                | MarkerCode::App14
                | MarkerCode::App15
                | MarkerCode::Com => {
                    // Only APP0 and APP14 are inspected when nobody asked for them.
                    let wanted = match saveable_slot(marker) {
                        Some(slot) => {
                            headers.save_limits[slot].is_some() || marker == APP0 || marker == APP14
                        }
                        None => !matches!(code, MarkerCode::Dac | MarkerCode::Dnl),
                    };
                    if !wanted {
                        match fill_to(&mut *src, 2)? {
                            Fill::Ready => {}
                            Fill::Suspend => return Ok(MarkerStatus::Suspended),
                            Fill::Exhausted => {
                                self.unread_marker = Some(self.end_of_data(src, headers, diag)?);
                                continue;
                            }
                        }
                        let length = BigEndian::read_u16(src.bytes()) as usize;
                        if length < 2 {
                            return Err(Error::BadLength(length));
                        }
                        trace!(marker, length, "skipping marker");
                        self.skip_remaining = length;
                        continue;
                    }
                    let length = match buffer_segment(src)? {
                        Segment::Ready(length) => length,
                        Segment::Suspend => return Ok(MarkerStatus::Suspended),
                        Segment::Exhausted => {
                            self.unread_marker = Some(self.end_of_data(src, headers, diag)?);
                            continue;
                        }
                    };
                    let body = &src.bytes()[2..length];
                    match code {
                        MarkerCode::Sof0 | MarkerCode::Sof1 | MarkerCode::Sof2 => {
                            self.get_sof(body, headers, marker)?
                        }
                        MarkerCode::Sos => self.get_sos(body, headers)?,
                        MarkerCode::Dqt => self.get_dqt(body, headers)?,
                        MarkerCode::Dht => self.get_dht(body, headers)?,
                        MarkerCode::Dri => self.get_dri(body, headers)?,
                        _ => self.get_app(body, headers, marker),
                    }
                    src.consume(length);
                    if code == MarkerCode::Sos {
                        self.unread_marker = None;
                        return Ok(MarkerStatus::ReachedSos);
                    }
                }
                _ => return Err(Error::BadMarker(marker)),
            }
            self.unread_marker = None;
        }
    }

    fn read_restart_marker(
        &mut self,
        src: &mut dyn Source,
        headers: &mut StreamHeaders,
        diag: &mut Diagnostics,
    ) -> Result<bool> {
        let marker = match self.unread_marker {
            Some(m) => m,
            None => match self.next_marker(src, headers, diag)? {
                Some(m) => {
                    self.unread_marker = Some(m);
                    m
                }
                None => return Ok(false),
            },
        };
        if marker == RST0 + self.next_restart_num {
            trace!(marker, "restart marker");
            self.unread_marker = None;
        } else if !self.resync(src, headers, diag, marker)? {
            return Ok(false);
        }
        self.resync_warned = false;
        self.next_restart_num = (self.next_restart_num + 1) & 7;
        Ok(true)
    }

    fn unread_marker(&self) -> Option<u8> {
        self.unread_marker
    }

    fn saw_sof(&self) -> bool {
        self.saw_sof
    }
}
