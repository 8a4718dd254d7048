// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Decompressor, InputStatus};
use crate::{
    BLOCK_SIZE, MAX_BLOCKS_IN_MCU,
    error::{Error, Result},
    headers::{ScanInfo, ScanLayout, check_scan_parameters},
    io::{EntropyReader, Source},
    markers::MarkerStatus,
    report::Warning,
    util::tracing_wrappers::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum Phase {
    /// Between scans.
    #[default]
    Markers,
    /// Inside entropy-coded data.
    Scan,
    /// Every iMCU row of the scan has been decoded; completion is reported on the next call.
    ScanEnd,
}

/// Input-side bookkeeping. Everything needed to resume after suspension lives here.
#[derive(Debug, Default)]
pub(super) struct InputState {
    pub(super) phase: Phase,
    pub(super) first_scan_seen: bool,
    pub(super) has_multiple_scans: bool,
    pub(super) eoi_reached: bool,
    /// Scans started so far.
    pub(super) scan_number: usize,
    /// iMCU rows of the current scan decoded so far.
    pub(super) imcu_row: usize,
    scan: Option<ScanInfo>,
    layout: Option<ScanLayout>,
    /// MCU row within the iMCU row and MCU within that row to decode next.
    mcu_row: usize,
    mcu_col: usize,
    restart_interval: usize,
    restarts_to_go: usize,
    hit_marker_warned: bool,
}

impl Decompressor {
    /// One step of the input side once the header has been read.
    pub(super) fn consume(&mut self, src: &mut dyn Source) -> Result<InputStatus> {
        match self.input.phase {
            Phase::Markers => self.consume_markers(src),
            Phase::Scan => self.consume_data(src),
            Phase::ScanEnd => {
                self.finish_input_pass()?;
                Ok(InputStatus::ScanCompleted)
            }
        }
    }

    pub(super) fn consume_markers(&mut self, src: &mut dyn Source) -> Result<InputStatus> {
        if self.input.eoi_reached {
            return Ok(InputStatus::ReachedEoi);
        }
        let status = self
            .marker_reader
            .read_markers(src, &mut self.headers, &mut self.diag)?;
        Ok(match status {
            MarkerStatus::Suspended => InputStatus::Suspended,
            MarkerStatus::ReachedSos => {
                self.input.scan_number += 1;
                if !self.input.first_scan_seen {
                    self.initial_setup()?;
                } else {
                    if !self.input.has_multiple_scans {
                        return Err(Error::EoiExpected);
                    }
                    self.start_input_pass()?;
                }
                InputStatus::ReachedSos
            }
            MarkerStatus::ReachedEoi => {
                self.input.eoi_reached = true;
                if !self.input.first_scan_seen {
                    if self.marker_reader.saw_sof() {
                        return Err(Error::SofNoSos);
                    }
                } else if self.output.scan_number > self.input.scan_number {
                    self.output.scan_number = self.input.scan_number;
                }
                InputStatus::ReachedEoi
            }
        })
    }

    fn initial_setup(&mut self) -> Result<()> {
        let frame = self.frame()?;
        let scan = self.headers.scan.as_ref().ok_or(Error::SosNoSof)?;
        let has_multiple_scans = frame.progressive || scan.components.len() < frame.components.len();
        debug!(
            width = frame.width,
            height = frame.height,
            progressive = frame.progressive,
            has_multiple_scans,
            "frame header"
        );
        self.input.first_scan_seen = true;
        self.input.has_multiple_scans = has_multiple_scans;
        Ok(())
    }

    /// Prepares for the entropy-coded data of the scan whose header was just read.
    pub(super) fn start_input_pass(&mut self) -> Result<()> {
        let mut scan = self.headers.scan.clone().ok_or(Error::SosNoSof)?;
        let frame = self.headers.frame.as_mut().ok_or(Error::NoImage)?;
        let warning = check_scan_parameters(&mut scan, frame.progressive)?;
        // Tables may be redefined between scans; a component keeps the table it started with.
        for &c in scan.components.iter() {
            let comp = &mut frame.components[c];
            if comp.quant.is_none() {
                comp.quant = Some(self.headers.tables.quant_table(comp.quant_index)?.clone());
            }
        }
        let layout = ScanLayout::new(frame, &scan.components)?;
        let total_imcu_rows = frame.total_imcu_rows;
        if let Some(warning) = warning {
            self.diag.warn(warning)?;
        }
        self.entropy.start_pass(&scan, &layout, &self.headers.tables)?;
        debug!(
            scan_number = self.input.scan_number,
            ?scan,
            mcus_per_row = layout.mcus_per_row,
            "starting input pass"
        );

        let input = &mut self.input;
        input.scan = Some(scan);
        input.layout = Some(layout);
        input.imcu_row = 0;
        input.mcu_row = 0;
        input.mcu_col = 0;
        input.restart_interval = self.headers.restart_interval;
        input.restarts_to_go = input.restart_interval;
        input.hit_marker_warned = false;
        input.phase = Phase::Scan;
        self.diag.begin_pass(total_imcu_rows);
        Ok(())
    }

    /// Decodes the rest of the current iMCU row.
    fn consume_data(&mut self, src: &mut dyn Source) -> Result<InputStatus> {
        let Decompressor {
            headers,
            diag,
            memory,
            marker_reader,
            entropy,
            input,
            coefficients,
            ..
        } = self;
        let (Some(layout), Some(store)) = (input.layout.as_ref(), coefficients.as_ref()) else {
            return Err(Error::BadState("consume_input", "Scanning"));
        };
        let frame = headers.frame.as_ref().ok_or(Error::NoImage)?;
        let mcu_rows = layout.mcu_rows_in_imcu_row(frame, input.imcu_row);
        let total_imcu_rows = frame.total_imcu_rows;
        let requests = layout
            .components
            .iter()
            .map(|&c| {
                let v = frame.components[c].v_samp as usize;
                Ok((store.array(c)?, input.imcu_row * v, v))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut views = memory.access_many_mut(&requests)?;

        let mut mcu = [[0i16; BLOCK_SIZE]; MAX_BLOCKS_IN_MCU];
        let mcu = &mut mcu[..layout.blocks_in_mcu()];
        while input.mcu_row < mcu_rows {
            while input.mcu_col < layout.mcus_per_row {
                if input.restart_interval != 0 && input.restarts_to_go == 0 {
                    if !marker_reader.read_restart_marker(src, headers, diag)? {
                        return Ok(InputStatus::Suspended);
                    }
                    entropy.restart();
                    input.restarts_to_go = input.restart_interval;
                    input.hit_marker_warned = false;
                }

                let positions = layout.block_positions(input.mcu_col, input.mcu_row);
                for (block, (i, row, col)) in mcu.iter_mut().zip(positions) {
                    *block = views[i].row(row)[col];
                }
                let mut reader = EntropyReader::new(src, marker_reader.unread_marker().is_some());
                if !entropy.decode_mcu(&mut reader, mcu)? {
                    trace!(
                        imcu_row = input.imcu_row,
                        mcu_row = input.mcu_row,
                        mcu_col = input.mcu_col,
                        "suspended inside scan"
                    );
                    return Ok(InputStatus::Suspended);
                }
                reader.commit();
                let (premature_end, hit_marker) = (reader.premature_end(), reader.hit_marker());
                let positions = layout.block_positions(input.mcu_col, input.mcu_row);
                for (block, (i, row, col)) in mcu.iter().zip(positions) {
                    views[i].row_mut(row)[col] = *block;
                }

                if premature_end {
                    headers.warn_premature_end(diag)?;
                } else if hit_marker && !input.hit_marker_warned {
                    input.hit_marker_warned = true;
                    diag.warn(Warning::HitMarker)?;
                }
                if input.restart_interval != 0 {
                    input.restarts_to_go -= 1;
                }
                input.mcu_col += 1;
            }
            input.mcu_col = 0;
            input.mcu_row += 1;
        }
        input.mcu_row = 0;
        input.imcu_row += 1;
        diag.advance_pass(input.imcu_row);
        if input.imcu_row == total_imcu_rows {
            input.phase = Phase::ScanEnd;
        }
        Ok(InputStatus::RowCompleted)
    }

    fn finish_input_pass(&mut self) -> Result<()> {
        if let (Some(store), Some(scan)) = (self.coefficients.as_mut(), self.input.scan.as_ref()) {
            store.complete_scan(scan, &mut self.diag)?;
        }
        debug!(scan_number = self.input.scan_number, "input pass complete");
        self.diag.end_pass();
        self.input.phase = Phase::Markers;
        Ok(())
    }
}
