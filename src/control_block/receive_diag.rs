// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RECEIVE DIAGNOSTIC RESULTS (1Ch).
//!
//! CDB layout:
//!   [0] = 0x1C
//!   [1] = PCV (bit 0), set so the page code is honoured
//!   [2] = Page Code
//!   [3..5] = Allocation Length (BE u16)
//!   [5] = Control

use crate::control_block::common::CDB6_LEN;

pub const RECEIVE_DIAGNOSTIC_OPCODE: u8 = 0x1C;

#[inline]
pub fn fill_receive_diagnostic(cdb: &mut [u8; 16], page_code: u8, allocation_len: u16) -> usize {
    cdb.fill(0);
    cdb[0] = RECEIVE_DIAGNOSTIC_OPCODE;
    cdb[1] = 0x01; // PCV
    cdb[2] = page_code;
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    CDB6_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_page_request() {
        let mut cdb = [0u8; 16];
        assert_eq!(fill_receive_diagnostic(&mut cdb, 0x01, 4096), 6);
        assert_eq!(&cdb[..6], &[0x1C, 0x01, 0x01, 0x10, 0x00, 0x00]);
    }
}
