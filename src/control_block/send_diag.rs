// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SEND DIAGNOSTIC (1Dh).
//!
//! CDB layout:
//!   [0] = 0x1D
//!   [1] = PF (bit 4); SelfTest and the offline bits stay 0
//!   [2] = reserved
//!   [3..5] = Parameter List Length (BE u16)
//!   [5] = Control

use crate::control_block::common::CDB6_LEN;

pub const SEND_DIAGNOSTIC_OPCODE: u8 = 0x1D;

const PF: u8 = 0x10;

#[inline]
pub fn fill_send_diagnostic(cdb: &mut [u8; 16], parameter_len: u16) -> usize {
    cdb.fill(0);
    cdb[0] = SEND_DIAGNOSTIC_OPCODE;
    cdb[1] = PF;
    cdb[3..5].copy_from_slice(&parameter_len.to_be_bytes());
    CDB6_LEN
}
