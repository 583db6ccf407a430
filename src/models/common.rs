// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Page header, page codes and the enclosure vocabulary (element types,
//! component types, sides) shared by every page codec.
//!
//! ESES page header layout:
//!
//! ```text
//!   [0]     page code
//!   [1]     page-specific byte
//!   [2..4]  page length (BE), counts the bytes after byte 3
//!   [4..8]  generation code (BE), low 16 bits significant
//! ```

use anyhow::{Result, anyhow};
use serde::Serialize;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32},
};

/// Size of the common page header.
pub const PAGE_HEADER_LEN: usize = 8;
/// The page length field excludes the first four bytes of the page.
pub const PAGE_SIZE_ADJUST: u32 = 4;
/// Ceiling for any diagnostic page transfer.
pub const MAX_DIAG_PAGE_SIZE: u32 = 4096;

/// ESES diagnostic page codes handled by the engine.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageCode {
    Configuration = 0x01,
    EnclosureControlStatus = 0x02,
    StringOut = 0x04,
    Threshold = 0x05,
    ElementDescriptor = 0x07,
    EnclosureBusy = 0x09,
    AdditionalStatus = 0x0A,
    DownloadMicrocode = 0x0E,
    EmcEnclosure = 0x10,
    EmcStatistics = 0x11,
    TunnelDiagnostic = 0x83,
}

#[derive(Debug, Error)]
#[error("unknown ESES page code: 0x{0:02x}")]
pub struct UnknownPageCode(pub u8);

impl From<PageCode> for u8 {
    #[inline]
    fn from(p: PageCode) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for PageCode {
    type Error = UnknownPageCode;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        use PageCode::*;
        Ok(match v {
            0x01 => Configuration,
            0x02 => EnclosureControlStatus,
            0x04 => StringOut,
            0x05 => Threshold,
            0x07 => ElementDescriptor,
            0x09 => EnclosureBusy,
            0x0A => AdditionalStatus,
            0x0E => DownloadMicrocode,
            0x10 => EmcEnclosure,
            0x11 => EmcStatistics,
            0x83 => TunnelDiagnostic,
            other => return Err(UnknownPageCode(other)),
        })
    }
}

impl PageCode {
    /// Pages whose bytes 4..8 hold the enclosure generation code and must
    /// match the value learned from the Configuration page.
    #[inline]
    pub fn carries_generation(self) -> bool {
        !matches!(
            self,
            PageCode::Configuration | PageCode::EnclosureBusy | PageCode::TunnelDiagnostic
        )
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug)]
pub struct PageHeaderRaw {
    pub page_code: u8,
    pub specific: u8,
    pub page_length: U16<BigEndian>,
    pub generation_code: U32<BigEndian>,
}

/// Decoded common page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageHeader {
    pub page_code: u8,
    pub specific: u8,
    /// Full page size: the on-wire length field plus four.
    pub page_length: u32,
    pub generation_code: u16,
}

impl PageHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (raw, _) = PageHeaderRaw::ref_from_prefix(buf).map_err(|_| {
            anyhow!("page header: need ≥ {PAGE_HEADER_LEN} bytes, got {}", buf.len())
        })?;
        Ok(Self {
            page_code: raw.page_code,
            specific: raw.specific,
            page_length: raw.page_length.get() as u32 + PAGE_SIZE_ADJUST,
            generation_code: raw.generation_code.get() as u16,
        })
    }

    /// Write an 8-byte header for a page of `page_size` total bytes.
    pub fn write(
        buf: &mut [u8],
        page_code: u8,
        specific: u8,
        page_size: usize,
        generation_code: u16,
    ) -> Result<()> {
        let len = u16::try_from(page_size.saturating_sub(PAGE_SIZE_ADJUST as usize))
            .map_err(|_| anyhow!("page size {page_size} does not fit the length field"))?;
        let have = buf.len();
        let (raw, _) = PageHeaderRaw::mut_from_prefix(buf).map_err(|_| {
            anyhow!("page header: need ≥ {PAGE_HEADER_LEN} bytes, got {have}")
        })?;
        raw.page_code = page_code;
        raw.specific = specific;
        raw.page_length = U16::new(len);
        raw.generation_code = U32::new(generation_code as u32);
        Ok(())
    }
}

/// SES element types that appear in type descriptor headers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementType {
    PowerSupply = 0x02,
    Cooling = 0x03,
    TempSensor = 0x04,
    Alarm = 0x06,
    EscElectronics = 0x07,
    Ups = 0x0B,
    Display = 0x0C,
    Enclosure = 0x0E,
    Language = 0x10,
    ArrayDeviceSlot = 0x17,
    SasExpander = 0x18,
    SasConnector = 0x19,
    ExpanderPhy = 0x81,
}

#[derive(Debug, Error)]
#[error("unknown element type: 0x{0:02x}")]
pub struct UnknownElementType(pub u8);

impl TryFrom<u8> for ElementType {
    type Error = UnknownElementType;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        use ElementType::*;
        Ok(match v {
            0x02 => PowerSupply,
            0x03 => Cooling,
            0x04 => TempSensor,
            0x06 => Alarm,
            0x07 => EscElectronics,
            0x0B => Ups,
            0x0C => Display,
            0x0E => Enclosure,
            0x10 => Language,
            0x17 => ArrayDeviceSlot,
            0x18 => SasExpander,
            0x19 => SasConnector,
            0x81 => ExpanderPhy,
            other => return Err(UnknownElementType(other)),
        })
    }
}

/// Subenclosure types in the Configuration page.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubenclosureType {
    PowerSupply = 0x02,
    Cooling = 0x03,
    Lcc = 0x07,
    Ups = 0x0B,
    Chassis = 0x0E,
    Other(u8),
}

impl From<u8> for SubenclosureType {
    fn from(v: u8) -> Self {
        match v {
            0x02 => Self::PowerSupply,
            0x03 => Self::Cooling,
            0x07 => Self::Lcc,
            0x0B => Self::Ups,
            0x0E => Self::Chassis,
            other => Self::Other(other),
        }
    }
}

/// Component kinds tracked by the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComponentType {
    Enclosure,
    Lcc,
    PowerSupply,
    Cooling,
    TempSensor,
    DriveSlot,
    ExpanderPhy,
    Connector,
    Expander,
    Sps,
    Display,
}

impl ComponentType {
    /// Map an element type onto the component that owns its elements.
    pub fn from_element(t: ElementType) -> Option<Self> {
        Some(match t {
            ElementType::PowerSupply => Self::PowerSupply,
            ElementType::Cooling => Self::Cooling,
            ElementType::TempSensor => Self::TempSensor,
            ElementType::EscElectronics => Self::Lcc,
            ElementType::Ups => Self::Sps,
            ElementType::Display => Self::Display,
            ElementType::Enclosure => Self::Enclosure,
            ElementType::ArrayDeviceSlot => Self::DriveSlot,
            ElementType::SasExpander => Self::Expander,
            ElementType::SasConnector => Self::Connector,
            ElementType::ExpanderPhy => Self::ExpanderPhy,
            ElementType::Alarm | ElementType::Language => return None,
        })
    }
}

/// Side ids assigned while processing the Configuration page.
pub const SIDE_A: u8 = 0;
pub const SIDE_B: u8 = 1;
pub const SIDE_MIDPLANE: u8 = 0x1F;
pub const SIDE_INVALID: u8 = 0xFF;

/// Element status codes from the common status byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElementStatusCode {
    Unsupported = 0x0,
    Ok = 0x1,
    Critical = 0x2,
    NonCritical = 0x3,
    Unrecoverable = 0x4,
    NotInstalled = 0x5,
    Unknown = 0x6,
    Unavailable = 0x7,
    Reserved(u8),
}

impl From<u8> for ElementStatusCode {
    fn from(v: u8) -> Self {
        match v & 0x0F {
            0x0 => Self::Unsupported,
            0x1 => Self::Ok,
            0x2 => Self::Critical,
            0x3 => Self::NonCritical,
            0x4 => Self::Unrecoverable,
            0x5 => Self::NotInstalled,
            0x6 => Self::Unknown,
            0x7 => Self::Unavailable,
            other => Self::Reserved(other),
        }
    }
}

impl From<ElementStatusCode> for u8 {
    fn from(c: ElementStatusCode) -> u8 {
        match c {
            ElementStatusCode::Unsupported => 0x0,
            ElementStatusCode::Ok => 0x1,
            ElementStatusCode::Critical => 0x2,
            ElementStatusCode::NonCritical => 0x3,
            ElementStatusCode::Unrecoverable => 0x4,
            ElementStatusCode::NotInstalled => 0x5,
            ElementStatusCode::Unknown => 0x6,
            ElementStatusCode::Unavailable => 0x7,
            ElementStatusCode::Reserved(v) => v,
        }
    }
}

impl ElementStatusCode {
    /// Present means installed, whatever its health.
    #[inline]
    pub fn is_inserted(self) -> bool {
        !matches!(
            self,
            ElementStatusCode::NotInstalled | ElementStatusCode::Unsupported
        )
    }
}

pub(crate) fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() && b != 0 { b as char } else { ' ' })
        .collect();
    s.trim().to_string()
}
