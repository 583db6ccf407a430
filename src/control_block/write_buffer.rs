// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! WRITE BUFFER (10). Same layout as READ BUFFER with opcode 3Bh and a
//! parameter list length in bytes 6..9.

use anyhow::Result;

use crate::control_block::common::{CDB10_LEN, put_u24};

pub const WRITE_BUFFER_OPCODE: u8 = 0x3B;
pub const WRITE_BUFFER_MODE_DATA: u8 = 0x02;

pub fn fill_write_buffer(
    cdb: &mut [u8; 16],
    buf_id: u8,
    offset: u32,
    parameter_len: u32,
) -> Result<usize> {
    cdb.fill(0);
    cdb[0] = WRITE_BUFFER_OPCODE;
    cdb[1] = WRITE_BUFFER_MODE_DATA;
    cdb[2] = buf_id;
    put_u24(cdb, 3, offset)?;
    put_u24(cdb, 6, parameter_len)?;
    Ok(CDB10_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_write_layout() -> Result<()> {
        let mut cdb = [0u8; 16];
        fill_write_buffer(&mut cdb, 9, 0x40, 0x200)?;
        assert_eq!(&cdb[..10], &[0x3B, 0x02, 0x09, 0, 0, 0x40, 0, 0x02, 0x00, 0]);
        Ok(())
    }
}
