// Copyright (c) the jpegd Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;

/// JPEG marker codes (the byte following 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Marker {
    Sof0 = 0xc0,
    Sof1 = 0xc1,
    Sof2 = 0xc2,
    Sof3 = 0xc3,
    Dht = 0xc4,
    Sof5 = 0xc5,
    Sof6 = 0xc6,
    Sof7 = 0xc7,
    Jpg = 0xc8,
    Sof9 = 0xc9,
    Sof10 = 0xca,
    Sof11 = 0xcb,
    Dac = 0xcc,
    Sof13 = 0xcd,
    Sof14 = 0xce,
    Sof15 = 0xcf,
    Rst0 = 0xd0,
    Rst1 = 0xd1,
    Rst2 = 0xd2,
    Rst3 = 0xd3,
    Rst4 = 0xd4,
    Rst5 = 0xd5,
    Rst6 = 0xd6,
    Rst7 = 0xd7,
    Soi = 0xd8,
    Eoi = 0xd9,
    Sos = 0xda,
    Dqt = 0xdb,
    Dnl = 0xdc,
    Dri = 0xdd,
    Dhp = 0xde,
    Exp = 0xdf,
    App0 = 0xe0,
    App1 = 0xe1,
    App2 = 0xe2,
    App3 = 0xe3,
    App4 = 0xe4,
    App5 = 0xe5,
    App6 = 0xe6,
    App7 = 0xe7,
    App8 = 0xe8,
    App9 = 0xe9,
    App10 = 0xea,
    App11 = 0xeb,
    App12 = 0xec,
    App13 = 0xed,
    App14 = 0xee,
    App15 = 0xef,
    Jpg0 = 0xf0,
    Jpg13 = 0xfd,
    Com = 0xfe,
    Tem = 0x01,
}

pub const RST0: u8 = Marker::Rst0 as u8;
pub const APP0: u8 = Marker::App0 as u8;
pub const APP14: u8 = Marker::App14 as u8;
pub const COM: u8 = Marker::Com as u8;

/// Whether `code` may carry application data (APPn or COM).
pub fn is_app_or_com(code: u8) -> bool {
    (APP0..=APP0 + 15).contains(&code) || code == COM
}

/// Index into per-marker configuration: APP0..APP15 map to 0..16, COM to 16.
pub(crate) fn app_slot(code: u8) -> Option<usize> {
    if (APP0..=APP0 + 15).contains(&code) {
        Some((code - APP0) as usize)
    } else if code == COM {
        Some(16)
    } else {
        None
    }
}

pub fn is_restart(code: u8) -> bool {
    (RST0..=RST0 + 7).contains(&code)
}

#[cfg(test)]
mod test {
    use num_traits::FromPrimitive;
    use test_log::test;

    use super::*;

    #[test]
    fn marker_codes() {
        assert_eq!(Marker::from_u8(0xd8), Some(Marker::Soi));
        assert_eq!(Marker::from_u8(0xee), Some(Marker::App14));
        assert_eq!(Marker::from_u8(0x02), None);
        assert!(is_app_or_com(0xe5));
        assert!(is_app_or_com(0xfe));
        assert!(!is_app_or_com(0xdb));
        assert_eq!(app_slot(0xef), Some(15));
        assert_eq!(app_slot(COM), Some(16));
        assert!(is_restart(0xd7));
        assert!(!is_restart(0xd8));
    }
}
