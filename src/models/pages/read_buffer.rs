// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ BUFFER descriptor data (mode 03h).

use anyhow::{Result, bail};
use serde::Serialize;

pub const READ_BUFFER_DESC_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadBufferDescriptor {
    /// Offsets must be multiples of `2^offset_boundary`.
    pub offset_boundary: u8,
    pub capacity: u32,
}

impl ReadBufferDescriptor {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < READ_BUFFER_DESC_LEN {
            bail!("read buffer descriptor too short: {}", buf.len());
        }
        Ok(Self {
            offset_boundary: buf[0],
            capacity: u32::from_be_bytes([0, buf[1], buf[2], buf[3]]),
        })
    }

    pub fn to_bytes(self) -> [u8; READ_BUFFER_DESC_LEN] {
        let c = self.capacity.to_be_bytes();
        [self.offset_boundary, c[1], c[2], c[3]]
    }
}

/// Bytes a read of `requested` at `offset` returns from a buffer of
/// `capacity` bytes into an allocation of `allocation` bytes.
#[inline]
pub fn read_len(offset: u32, requested: u32, capacity: u32, allocation: u32) -> u32 {
    requested
        .min(capacity.saturating_sub(offset))
        .min(allocation)
}
