// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Standard INQUIRY data with the ESES vendor-specific fields.
//!
//! ```text
//!   [0]       peripheral qualifier / device type (0Dh enclosure services)
//!   [8..16]   vendor id
//!   [16..32]  product id
//!   [32..36]  product revision
//!   [36..52]  enclosure serial number
//!   [52..54]  platform type (BE)
//! ```

use anyhow::{Result, bail};
use serde::Serialize;

use crate::{cfg::enums::PlatformKind, models::common::trim_ascii};

pub const ESES_INQUIRY_MIN_LEN: usize = 54;

/// Serial number reported while the enclosure has not read its midplane.
pub const SERIAL_NOT_READY: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EsesInquiry {
    pub device_type: u8,
    pub vendor_id: String,
    pub product_id: String,
    pub product_rev: String,
    pub serial_number: String,
    pub platform_code: u16,
}

impl EsesInquiry {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < ESES_INQUIRY_MIN_LEN {
            bail!(
                "ESES INQUIRY data too short: {} < {ESES_INQUIRY_MIN_LEN}",
                buf.len()
            );
        }
        Ok(Self {
            device_type: buf[0] & 0x1F,
            vendor_id: trim_ascii(&buf[8..16]),
            product_id: trim_ascii(&buf[16..32]),
            product_rev: trim_ascii(&buf[32..36]),
            serial_number: trim_ascii(&buf[36..52]),
            platform_code: u16::from_be_bytes([buf[52], buf[53]]),
        })
    }

    /// The enclosure answers before it knows its own identity.
    #[inline]
    pub fn serial_unknown(&self) -> bool {
        self.serial_number.is_empty() || self.serial_number == SERIAL_NOT_READY
    }

    pub fn platform(&self) -> Option<PlatformKind> {
        platform_from_code(self.platform_code)
    }
}

/// Platform-type field values for the platforms with wiring tables.
pub fn platform_from_code(code: u16) -> Option<PlatformKind> {
    match code {
        0x000D => Some(PlatformKind::Viper),
        0x0008 => Some(PlatformKind::Pinecone),
        0x0003 => Some(PlatformKind::Magnum),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inquiry(serial: &[u8; 16], platform: u16) -> Vec<u8> {
        let mut b = vec![0u8; 56];
        b[0] = 0x0D;
        b[8..16].copy_from_slice(b"EMC     ");
        b[16..32].copy_from_slice(b"ESES Enclosure  ");
        b[32..36].copy_from_slice(b"0001");
        b[36..52].copy_from_slice(serial);
        b[52..54].copy_from_slice(&platform.to_be_bytes());
        b
    }

    #[test]
    fn viper_platform() {
        let i = EsesInquiry::parse(&inquiry(b"US1D1234500001  ", 0x000D)).expect("parse");
        assert_eq!(i.device_type, 0x0D);
        assert_eq!(i.vendor_id, "EMC");
        assert_eq!(i.serial_number, "US1D1234500001");
        assert_eq!(i.platform(), Some(PlatformKind::Viper));
        assert!(!i.serial_unknown());
    }

    #[test]
    fn unknown_serial() {
        let i = EsesInquiry::parse(&inquiry(b"UNKNOWN         ", 0x000D)).expect("parse");
        assert!(i.serial_unknown());
    }
}
