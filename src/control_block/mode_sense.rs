// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MODE SENSE (10) CDB filler.

use crate::control_block::common::CDB10_LEN;

pub const MODE_SENSE_10: u8 = 0x5A;

/// Page Control (PC) for MODE SENSE byte 2 (bits 7..6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PageControl {
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

#[inline]
fn pc_bits(pc: PageControl) -> u8 {
    (pc as u8) << 6
}

/// Fill a MODE SENSE(10) CDB into `cdb[0..10]`.
/// Layout:
///   [0]=0x5A, [1]=LLBAA<<4 | DBD<<3, [2]=PC(7..6)|PAGE(5..0), [3]=SUBPAGE,
///   [4..7]=0, [7..9]=ALLOC_LEN(be), [9]=CONTROL
#[inline]
pub fn fill_mode_sense10(
    cdb: &mut [u8; 16],
    dbd: bool,
    pc: PageControl,
    page_code: u8,
    allocation_len: u16,
) -> usize {
    cdb.fill(0);
    cdb[0] = MODE_SENSE_10;
    cdb[1] = (dbd as u8) << 3;
    cdb[2] = pc_bits(pc) | (page_code & 0x3F);
    cdb[7..9].copy_from_slice(&allocation_len.to_be_bytes());
    CDB10_LEN
}

/// MODE SENSE(10) for current values with block descriptors disabled.
#[inline]
pub fn fill_mode_sense10_simple(cdb: &mut [u8; 16], page_code: u8, allocation_len: u16) -> usize {
    fill_mode_sense10(cdb, true, PageControl::Current, page_code, allocation_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_pages_current() {
        let mut cdb = [0u8; 16];
        assert_eq!(fill_mode_sense10_simple(&mut cdb, 0x3F, 0x0100), 10);
        assert_eq!(&cdb[..10], &[0x5A, 0x08, 0x3F, 0, 0, 0, 0, 0x01, 0x00, 0]);
    }

    #[test]
    fn page_control_bits() {
        let mut cdb = [0u8; 16];
        fill_mode_sense10(&mut cdb, false, PageControl::Saved, 0x21, 24);
        assert_eq!(cdb[1], 0);
        assert_eq!(cdb[2], 0xE1);
    }
}
