// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    BLOCK_SIZE, NATURAL_ORDER, NUM_ENTROPY_TABLES, NUM_QUANT_TABLES,
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    /// Quantizer steps in natural order.
    pub values: [u16; BLOCK_SIZE],
    /// Set once the table has been written to the current datastream.
    pub sent: bool,
}

impl QuantTable {
    pub fn new(values: [u16; BLOCK_SIZE]) -> Self {
        Self {
            values,
            sent: false,
        }
    }

    pub fn flat(step: u16) -> Self {
        Self::new([step; BLOCK_SIZE])
    }

    pub fn from_zigzag(zigzag: &[u16; BLOCK_SIZE]) -> Self {
        let mut values = [0; BLOCK_SIZE];
        for (k, &v) in zigzag.iter().enumerate() {
            values[NATURAL_ORDER[k]] = v;
        }
        Self::new(values)
    }

    pub fn to_zigzag(&self) -> [u16; BLOCK_SIZE] {
        array_init::array_init(|k| self.values[NATURAL_ORDER[k]])
    }
}

/// Code-length counts and symbol values of an entropy coding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyTable {
    /// `bits[n]` is the number of codes of length `n`; `bits[0]` is unused.
    bits: [u8; 17],
    values: Vec<u8>,
    pub sent: bool,
}

impl EntropyTable {
    pub fn new(bits: [u8; 17], values: &[u8]) -> Result<Self> {
        let count: usize = bits[1..].iter().map(|&b| b as usize).sum();
        if bits[0] != 0 || count > 256 || count != values.len() {
            return Err(Error::BadDht);
        }
        Ok(Self {
            bits,
            values: values.to_vec(),
            sent: false,
        })
    }

    pub fn bits(&self) -> &[u8; 17] {
        &self.bits
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSet {
    pub quant: [Option<QuantTable>; NUM_QUANT_TABLES],
    pub dc: [Option<EntropyTable>; NUM_ENTROPY_TABLES],
    pub ac: [Option<EntropyTable>; NUM_ENTROPY_TABLES],
}

impl TableSet {
    pub fn quant_table(&self, index: usize) -> Result<&QuantTable> {
        if index >= NUM_QUANT_TABLES {
            return Err(Error::BadQuantTableIndex(index));
        }
        self.quant[index].as_ref().ok_or(Error::NoQuantTable(index))
    }

    /// `class` is 0 for DC tables and 1 for AC tables.
    pub fn entropy_table(&self, class: u8, index: usize) -> Result<&EntropyTable> {
        if index >= NUM_ENTROPY_TABLES {
            return Err(Error::BadEntropyTableIndex(index));
        }
        let slot = if class == 0 { &self.dc } else { &self.ac };
        slot[index].as_ref().ok_or(Error::NoEntropyTable(class, index))
    }

    /// Sets the `sent` flag of every defined table.
    pub fn mark_all_sent(&mut self, sent: bool) {
        for t in self.quant.iter_mut().flatten() {
            t.sent = sent;
        }
        for t in self.dc.iter_mut().chain(self.ac.iter_mut()).flatten() {
            t.sent = sent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_round_trip() {
        let zigzag: [u16; BLOCK_SIZE] = array_init::array_init(|k| k as u16 + 1);
        let table = QuantTable::from_zigzag(&zigzag);
        assert_eq!(table.values[8], 3);
        assert_eq!(table.to_zigzag(), zigzag);
    }

    #[test]
    fn entropy_table_counts_must_match() {
        let mut bits = [0u8; 17];
        bits[2] = 3;
        assert!(EntropyTable::new(bits, &[0, 1, 2]).is_ok());
        assert!(matches!(
            EntropyTable::new(bits, &[0, 1]),
            Err(Error::BadDht)
        ));
    }

    #[test]
    fn table_lookup_errors() {
        let mut tables = TableSet::default();
        assert!(matches!(tables.quant_table(4), Err(Error::BadQuantTableIndex(4))));
        assert!(matches!(tables.quant_table(2), Err(Error::NoQuantTable(2))));
        assert!(matches!(
            tables.entropy_table(1, 0),
            Err(Error::NoEntropyTable(1, 0))
        ));
        tables.quant[2] = Some(QuantTable::flat(1));
        tables.mark_all_sent(true);
        assert!(tables.quant_table(2).unwrap().sent);
    }
}
