// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;

pub const SOF0: u8 = 0xc0;
pub const SOF1: u8 = 0xc1;
pub const SOF2: u8 = 0xc2;
pub const DHT: u8 = 0xc4;
pub const RST0: u8 = 0xd0;
pub const SOI: u8 = 0xd8;
pub const EOI: u8 = 0xd9;
pub const SOS: u8 = 0xda;
pub const DQT: u8 = 0xdb;
pub const DRI: u8 = 0xdd;
pub const APP0: u8 = 0xe0;
pub const APP14: u8 = 0xee;
pub const APP15: u8 = 0xef;
pub const COM: u8 = 0xfe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum MarkerCode {
    Tem = 0x01,
    Sof0 = 0xc0,
    Sof1,
    Sof2,
    Sof3,
    Dht,
    Sof5,
    Sof6,
    Sof7,
    Jpg,
    Sof9,
    Sof10,
    Sof11,
    Dac,
    Sof13,
    Sof14,
    Sof15,
    Rst0,
    Rst1,
    Rst2,
    Rst3,
    Rst4,
    Rst5,
    Rst6,
    Rst7,
    Soi,
    Eoi,
    Sos,
    Dqt,
    Dnl,
    Dri,
    Dhp,
    Exp,
    App0,
    App1,
    App2,
    App3,
    App4,
    App5,
    App6,
    App7,
    App8,
    App9,
    App10,
    App11,
    App12,
    App13,
    App14,
    App15,
    Jpg0,
    Jpg1,
    Jpg2,
    Jpg3,
    Jpg4,
    Jpg5,
    Jpg6,
    Jpg7,
    Jpg8,
    Jpg9,
    Jpg10,
    Jpg11,
    Jpg12,
    Jpg13,
    Com,
}

/// Whether `code` is an APPn or COM marker, the ones whose segments can be saved or written by
/// the application.
pub fn is_saveable(code: u8) -> bool {
    (APP0..=APP15).contains(&code) || code == COM
}

/// Slot of a saveable marker in per-marker tables: APP0..APP15, then COM.
pub fn saveable_slot(code: u8) -> Option<usize> {
    match code {
        APP0..=APP15 => Some((code - APP0) as usize),
        COM => Some(16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn codes_match_constants() {
        assert_eq!(MarkerCode::from_u8(SOS), Some(MarkerCode::Sos));
        assert_eq!(MarkerCode::from_u8(RST0 + 7), Some(MarkerCode::Rst7));
        assert_eq!(MarkerCode::from_u8(APP14), Some(MarkerCode::App14));
        assert_eq!(MarkerCode::from_u8(COM), Some(MarkerCode::Com));
        assert_eq!(MarkerCode::from_u8(0xff), None);
        assert_eq!(MarkerCode::from_u8(0x02), None);
        assert_eq!(saveable_slot(COM), Some(16));
        assert!(!is_saveable(SOF0));
    }
}
