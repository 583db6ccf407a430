// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MODE SELECT (10) CDB filler.
//!
//! Layout:
//!   [0]=0x55, [1]=PF<<4 | SP, [2..7]=0, [7..9]=PARAM_LIST_LEN(be), [9]=CONTROL

use crate::control_block::common::CDB10_LEN;

pub const MODE_SELECT_10: u8 = 0x55;

#[inline]
pub fn fill_mode_select10(cdb: &mut [u8; 16], save_pages: bool, parameter_len: u16) -> usize {
    cdb.fill(0);
    cdb[0] = MODE_SELECT_10;
    cdb[1] = 0x10 | save_pages as u8;
    cdb[7..9].copy_from_slice(&parameter_len.to_be_bytes());
    CDB10_LEN
}
