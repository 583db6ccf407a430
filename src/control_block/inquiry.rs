// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6) CDB filler for the enclosure's standard inquiry data.
//!
//! CDB layout (SPC-4):
//!   [0] = 0x12 (INQUIRY)
//!   [1] = EVPD (bit 0)
//!   [2] = Page Code, 0 when EVPD=0
//!   [3..5] = Allocation Length (BE u16)
//!   [5] = Control

use crate::control_block::common::CDB6_LEN;

pub const INQUIRY_OPCODE: u8 = 0x12;

/// Fill a standard INQUIRY (EVPD=0) CDB.
#[inline]
pub fn fill_inquiry_standard(cdb: &mut [u8; 16], allocation_len: u16, control: u8) -> usize {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    cdb[5] = control;
    CDB6_LEN
}

/// Fill an INQUIRY CDB for a vital product data page.
#[inline]
pub fn fill_inquiry_vpd(cdb: &mut [u8; 16], page_code: u8, allocation_len: u16) -> usize {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x01;
    cdb[2] = page_code;
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    CDB6_LEN
}
