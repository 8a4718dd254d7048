// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{
    MarkerWriter,
    codes::{DHT, DQT, DRI, EOI, SOF0, SOF1, SOF2, SOI, SOS, is_saveable},
};
use crate::{
    error::{Error, Result},
    headers::{EntropyTable, FrameHeader, QuantTable, ScanInfo, TableSet},
    io::Destination,
    util::tracing_wrappers::*,
};

fn write_segment(dest: &mut dyn Destination, code: u8, body: &[u8]) -> Result<()> {
    let length = body.len() + 2;
    if length > u16::MAX as usize {
        return Err(Error::BadLength(length));
    }
    let mut header = [0xff, code, 0, 0];
    header[2..].copy_from_slice(&(length as u16).to_be_bytes());
    dest.write_all(&header)?;
    dest.write_all(body)
}

fn write_bare_marker(dest: &mut dyn Destination, code: u8) -> Result<()> {
    dest.write_all(&[0xff, code])
}

fn needs_16_bits(table: &QuantTable) -> bool {
    table.values.iter().any(|&v| v > 255)
}

fn write_dqt(dest: &mut dyn Destination, index: usize, table: &mut QuantTable) -> Result<()> {
    let wide = needs_16_bits(table);
    let mut body = Vec::with_capacity(129);
    body.push(((wide as u8) << 4) | index as u8);
    for v in table.to_zigzag() {
        if wide {
            body.extend_from_slice(&v.to_be_bytes());
        } else {
            body.push(v as u8);
        }
    }
    trace!(index, wide, "writing DQT");
    write_segment(dest, DQT, &body)?;
    table.sent = true;
    Ok(())
}

fn write_dht(
    dest: &mut dyn Destination,
    class: u8,
    index: usize,
    table: &mut EntropyTable,
) -> Result<()> {
    let mut body = Vec::with_capacity(17 + table.values().len());
    body.push((class << 4) | index as u8);
    body.extend_from_slice(&table.bits()[1..]);
    body.extend_from_slice(table.values());
    trace!(class, index, "writing DHT");
    write_segment(dest, DHT, &body)?;
    table.sent = true;
    Ok(())
}

/// Writer for the standard marker syntax.
#[derive(Debug, Default)]
pub struct JpegMarkerWriter {
    last_restart_interval: usize,
}

impl JpegMarkerWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerWriter for JpegMarkerWriter {
    fn reset(&mut self) {
        self.last_restart_interval = 0;
    }

    fn write_file_header(&mut self, dest: &mut dyn Destination) -> Result<()> {
        self.last_restart_interval = 0;
        write_bare_marker(dest, SOI)
    }

    fn write_frame_header(
        &mut self,
        dest: &mut dyn Destination,
        frame: &FrameHeader,
        tables: &mut TableSet,
    ) -> Result<()> {
        let mut extended = false;
        for comp in frame.components.iter() {
            let index = comp.quant_index;
            tables.quant_table(index)?;
            if let Some(table) = tables.quant[index].as_mut() {
                extended |= needs_16_bits(table);
                if !table.sent {
                    write_dqt(dest, index, table)?;
                }
            }
            extended |= comp.dc_table > 1 || comp.ac_table > 1;
        }
        let code = if frame.progressive {
            SOF2
        } else if extended {
            SOF1
        } else {
            SOF0
        };
        let mut body = Vec::with_capacity(6 + 3 * frame.components.len());
        body.push(frame.precision);
        body.extend_from_slice(&(frame.height as u16).to_be_bytes());
        body.extend_from_slice(&(frame.width as u16).to_be_bytes());
        body.push(frame.components.len() as u8);
        for comp in frame.components.iter() {
            body.extend_from_slice(&[
                comp.id,
                (comp.h_samp << 4) | comp.v_samp,
                comp.quant_index as u8,
            ]);
        }
        debug!(code, width = frame.width, height = frame.height, "writing SOF");
        write_segment(dest, code, &body)
    }

    fn write_scan_header(
        &mut self,
        dest: &mut dyn Destination,
        frame: &FrameHeader,
        scan: &ScanInfo,
        tables: &mut TableSet,
        restart_interval: usize,
    ) -> Result<()> {
        for &c in scan.components.iter() {
            let comp = &frame.components[c];
            let (needs_dc, needs_ac) = if !frame.progressive {
                (true, true)
            } else if scan.is_dc() {
                (!scan.is_refinement(), false)
            } else {
                (false, true)
            };
            let dc = tables.dc.get_mut(comp.dc_table).and_then(Option::as_mut);
            if let Some(table) = dc.filter(|t| needs_dc && !t.sent) {
                write_dht(dest, 0, comp.dc_table, table)?;
            }
            let ac = tables.ac.get_mut(comp.ac_table).and_then(Option::as_mut);
            if let Some(table) = ac.filter(|t| needs_ac && !t.sent) {
                write_dht(dest, 1, comp.ac_table, table)?;
            }
        }
        if restart_interval != self.last_restart_interval {
            let interval = u16::try_from(restart_interval)
                .map_err(|_| Error::BadLength(restart_interval))?;
            write_segment(dest, DRI, &interval.to_be_bytes())?;
            self.last_restart_interval = restart_interval;
        }
        let mut body = Vec::with_capacity(4 + 2 * scan.components.len());
        body.push(scan.components.len() as u8);
        for &c in scan.components.iter() {
            let comp = &frame.components[c];
            body.extend_from_slice(&[comp.id, ((comp.dc_table as u8) << 4) | comp.ac_table as u8]);
        }
        body.extend_from_slice(&[scan.ss, scan.se, (scan.ah << 4) | scan.al]);
        trace!(?scan, "writing SOS");
        write_segment(dest, SOS, &body)
    }

    fn write_file_trailer(&mut self, dest: &mut dyn Destination) -> Result<()> {
        write_bare_marker(dest, EOI)
    }

    fn write_tables_only(
        &mut self,
        dest: &mut dyn Destination,
        tables: &mut TableSet,
    ) -> Result<()> {
        write_bare_marker(dest, SOI)?;
        for (index, table) in tables.quant.iter_mut().enumerate() {
            if let Some(table) = table {
                write_dqt(dest, index, table)?;
            }
        }
        for (class, set) in [(0, &mut tables.dc), (1, &mut tables.ac)] {
            for (index, table) in set.iter_mut().enumerate() {
                if let Some(table) = table {
                    write_dht(dest, class, index, table)?;
                }
            }
        }
        write_bare_marker(dest, EOI)
    }

    fn write_marker(&mut self, dest: &mut dyn Destination, code: u8, data: &[u8]) -> Result<()> {
        if !is_saveable(code) {
            return Err(Error::BadMarkerWrite(code));
        }
        write_segment(dest, code, data)
    }
}
