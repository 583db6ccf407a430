// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Download Microcode Control (0Eh, send) and Status (0Eh, receive).
//!
//! Control page layout, image data follows the header:
//!
//! ```text
//!   [0]      page code 0Eh
//!   [1]      subenclosure id
//!   [2..4]   page length
//!   [4..8]   generation code
//!   [8]      mode (0Eh download/defer, 0Fh activate)
//!   [11]     buffer id
//!   [12..16] buffer offset
//!   [16..20] total image length
//!   [20..24] transfer length
//! ```
//!
//! The status page carries one 16-byte descriptor at offset 8.

use anyhow::{Result, bail, ensure};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U32},
};

use crate::models::{
    common::{PAGE_HEADER_LEN, PageCode, PageHeader},
    pages::EsesPage,
};

pub const DL_CONTROL_HEADER_LEN: usize = 24;
pub const DL_CONTROL_MAX_PAGE_LEN: usize = 4096;
/// Image bytes that fit in one control page.
pub const DL_CONTROL_MAX_DATA_LEN: usize = DL_CONTROL_MAX_PAGE_LEN - DL_CONTROL_HEADER_LEN;
/// Image bytes per tunnelled control page (kept a multiple of 8).
pub const DL_TUNNEL_MAX_DATA_LEN: usize = 2000 & 0x0FF8;

/// The download status page may report four bytes more than its length
/// field accounts for.
pub const DL_STATUS_SIZE_SLACK: u32 = 4;

const DL_STATUS_DESC_LEN: usize = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DownloadMode {
    /// Download and defer activation.
    Download = 0x0E,
    Activate = 0x0F,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Default)]
pub struct DownloadControlTail {
    pub mode: u8,
    reserved: [u8; 2],
    pub buffer_id: u8,
    pub buffer_offset: U32<BigEndian>,
    pub image_length: U32<BigEndian>,
    pub transfer_length: U32<BigEndian>,
}

/// One Download Microcode control page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadControl {
    pub subencl_id: u8,
    pub mode: DownloadMode,
    pub buffer_id: u8,
    pub buffer_offset: u32,
    pub image_length: u32,
    pub chunk: Bytes,
}

impl DownloadControl {
    pub fn activate(subencl_id: u8) -> Self {
        Self {
            subencl_id,
            mode: DownloadMode::Activate,
            buffer_id: 0,
            buffer_offset: 0,
            image_length: 0,
            chunk: Bytes::new(),
        }
    }

    /// Next chunk of `image` after `sent` bytes, at most `max_data` long.
    pub fn next_chunk(subencl_id: u8, image: &Bytes, sent: u32, max_data: usize) -> Result<Self> {
        let sent_usize = sent as usize;
        ensure!(
            sent_usize < image.len(),
            "image of {} bytes already fully sent ({sent})",
            image.len()
        );
        let len = (image.len() - sent_usize).min(max_data);
        Ok(Self {
            subencl_id,
            mode: DownloadMode::Download,
            buffer_id: 0,
            buffer_offset: sent,
            image_length: u32::try_from(image.len())?,
            chunk: image.slice(sent_usize..sent_usize + len),
        })
    }

    pub fn page_size(&self) -> usize {
        DL_CONTROL_HEADER_LEN + self.chunk.len()
    }

    /// Serialize into `buf`, which must be exactly `page_size()` long.
    pub fn write_into(&self, buf: &mut [u8], generation_code: u16) -> Result<()> {
        ensure!(
            self.chunk.len() <= DL_CONTROL_MAX_DATA_LEN,
            "download chunk {} exceeds {DL_CONTROL_MAX_DATA_LEN}",
            self.chunk.len()
        );
        ensure!(buf.len() == self.page_size(), "download page buffer size mismatch");
        PageHeader::write(
            buf,
            PageCode::DownloadMicrocode as u8,
            self.subencl_id,
            self.page_size(),
            generation_code,
        )?;
        let tail = DownloadControlTail {
            mode: self.mode as u8,
            buffer_id: self.buffer_id,
            buffer_offset: U32::new(self.buffer_offset),
            image_length: U32::new(self.image_length),
            transfer_length: U32::new(self.chunk.len() as u32),
            ..Default::default()
        };
        buf[PAGE_HEADER_LEN..DL_CONTROL_HEADER_LEN].copy_from_slice(tail.as_bytes());
        buf[DL_CONTROL_HEADER_LEN..].copy_from_slice(&self.chunk);
        Ok(())
    }

    pub fn encode(&self, generation_code: u16) -> Result<BytesMut> {
        let mut buf = BytesMut::zeroed(self.page_size());
        self.write_into(&mut buf, generation_code)?;
        Ok(buf)
    }
}

/// Host-side firmware operation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum FwStatus {
    #[default]
    None,
    InProgress,
    Fail,
}

/// Detail accompanying [`FwStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum FwExtStatus {
    #[default]
    None,
    ImageLoaded,
    ErrPage,
    ErrChecksum,
    ErrActivate,
    ErrNoImage,
    Timeout,
    RequiresStatusPage,
    Busy,
    TunnelProcessing,
    Unknown,
}

/// Fold an ESES download status code into the tracked status pair.
pub fn map_download_status(code: u8, prev: (FwStatus, FwExtStatus)) -> (FwStatus, FwExtStatus) {
    match code {
        0x00 => (FwStatus::None, FwExtStatus::None),
        0x10 => (FwStatus::InProgress, FwExtStatus::None),
        0x01..=0x03 | 0x70 => match prev {
            // keep the failure, the expander reported no reason for it
            (FwStatus::Fail, _) => (FwStatus::Fail, FwExtStatus::None),
            (_, ext) => (FwStatus::InProgress, ext),
        },
        0x13 => (FwStatus::None, FwExtStatus::ImageLoaded),
        0x80 => (FwStatus::Fail, FwExtStatus::ErrPage),
        0x81 => (FwStatus::Fail, FwExtStatus::ErrChecksum),
        0x83 | 0x84 | 0xF0 => (FwStatus::Fail, FwExtStatus::ErrActivate),
        0x85 => (FwStatus::Fail, FwExtStatus::ErrNoImage),
        _ => (FwStatus::Fail, FwExtStatus::Unknown),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadStatusPage {
    pub header: PageHeader,
    pub subencl_id: u8,
    pub status: u8,
    pub addl_status: u8,
    pub max_size: u32,
    pub expected_buffer_id: u8,
    pub expected_buffer_offset: u32,
}

impl EsesPage for DownloadStatusPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

impl DownloadStatusPage {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        if header.page_code != PageCode::DownloadMicrocode as u8 {
            bail!(
                "expected download status page 0x0E, got 0x{:02X}",
                header.page_code
            );
        }
        let Some(d) = buf.get(PAGE_HEADER_LEN..PAGE_HEADER_LEN + DL_STATUS_DESC_LEN) else {
            bail!(
                "download status descriptor truncated: page has {} bytes",
                buf.len()
            );
        };
        Ok(Self {
            header,
            subencl_id: d[1],
            status: d[2],
            addl_status: d[3],
            max_size: u32::from_be_bytes([d[4], d[5], d[6], d[7]]),
            expected_buffer_id: d[11],
            expected_buffer_offset: u32::from_be_bytes([d[12], d[13], d[14], d[15]]),
        })
    }
}
