// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ BUFFER (10).
//!
//! CDB layout:
//!   [0] = 0x3C
//!   [1] = Mode (bits 4..0)
//!   [2] = Buffer ID
//!   [3..6] = Buffer Offset (BE u24)
//!   [6..9] = Allocation Length (BE u24)
//!   [9] = Control

use anyhow::Result;

use crate::control_block::common::{CDB10_LEN, put_u24};

pub const READ_BUFFER_OPCODE: u8 = 0x3C;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadBufferMode {
    Data = 0x02,
    /// Returns the 4-byte buffer descriptor (offset boundary, capacity).
    Descriptor = 0x03,
}

pub fn fill_read_buffer(
    cdb: &mut [u8; 16],
    mode: ReadBufferMode,
    buf_id: u8,
    offset: u32,
    allocation_len: u32,
) -> Result<usize> {
    cdb.fill(0);
    cdb[0] = READ_BUFFER_OPCODE;
    cdb[1] = mode as u8 & 0x1F;
    cdb[2] = buf_id;
    put_u24(cdb, 3, offset)?;
    put_u24(cdb, 6, allocation_len)?;
    Ok(CDB10_LEN)
}
