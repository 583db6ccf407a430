// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared CDB helpers. All fillers write into a zero-padded 16-byte buffer
//! and return the number of bytes the command actually uses.

use anyhow::{Result, ensure};

pub const CDB6_LEN: usize = 6;
pub const CDB10_LEN: usize = 10;

/// Largest value a 3-byte CDB field can carry.
pub const U24_MAX: u32 = 0x00FF_FFFF;

/// Store `v` big-endian into three bytes starting at `at`.
#[inline]
pub fn put_u24(cdb: &mut [u8; 16], at: usize, v: u32) -> Result<()> {
    ensure!(v <= U24_MAX, "value 0x{v:X} does not fit a 24-bit CDB field");
    let b = v.to_be_bytes();
    cdb[at..at + 3].copy_from_slice(&b[1..]);
    Ok(())
}

/// A filled CDB plus its significant length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cdb {
    pub bytes: [u8; 16],
    pub len: usize,
}

impl Cdb {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }
}
