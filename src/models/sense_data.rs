// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::{Context, Result, bail};

use crate::models::scsi::SenseTriple;

/// Sense data must be ≥ 18 bytes for fixed format.
pub const FIXED_MIN_LEN: usize = 18;

/// Current-error response code (fixed format).
pub const RESPONSE_CODE_CURRENT: u8 = 0x70;
/// Deferred-error response code (fixed format).
pub const RESPONSE_CODE_DEFERRED: u8 = 0x71;

/// Fixed-format sense data (SPC-4 table 43)
#[derive(Default, PartialEq)]
pub struct SenseData {
    pub valid: bool,        // bit7 of byte0
    pub response_code: u8,  // low-7 bits of byte0
    pub sense_key: u8,      // low-4 bits of byte2
    pub ili: bool,          // bit5 of byte2
    pub eom: bool,          // bit6 of byte2
    pub filemark: bool,     // bit7 of byte2
    pub information: u32,   // bytes 3-6
    pub additional_len: u8, // byte7
    pub cmd_specific: u32,  // bytes 8-11
    pub asc: u8,            // Additional Sense Code
    pub ascq: u8,           // Additional Sense Code Qualifier
    /// Sense-key specific field pointer (bytes 15..17), valid when SKSV set.
    pub field_pointer: Option<u16>,
}

impl SenseData {
    /// Parse *fixed-format* sense-data (SPC-4 § 4.5.3).
    ///
    /// Only response codes 70h/71h are accepted; anything else means the
    /// target did not return usable error information.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            bail!("sense buffer too small: {} < {FIXED_MIN_LEN}", buf.len());
        }

        let response_code = buf[0] & 0x7F;
        if response_code != RESPONSE_CODE_CURRENT && response_code != RESPONSE_CODE_DEFERRED
        {
            bail!("unsupported sense response code: {response_code:#04x}");
        }

        let information = u32::from_be_bytes(
            buf[3..7]
                .try_into()
                .context("failed to read Information field (bytes 3‥6)")?,
        );
        let cmd_specific = u32::from_be_bytes(
            buf[8..12]
                .try_into()
                .context("failed to read Cmd-specific field (bytes 8‥11)")?,
        );

        let field_pointer =
            (buf[15] & 0x80 != 0).then(|| u16::from_be_bytes([buf[16], buf[17]]));

        Ok(Self {
            valid: buf[0] & 0x80 != 0,
            response_code,
            sense_key: buf[2] & 0x0F,
            ili: buf[2] & 0x20 != 0,
            eom: buf[2] & 0x40 != 0,
            filemark: buf[2] & 0x80 != 0,
            information,
            additional_len: buf[7],
            cmd_specific,
            asc: buf[12],
            ascq: buf[13],
            field_pointer,
        })
    }

    #[inline]
    pub fn triple(&self) -> SenseTriple {
        SenseTriple::new(self.sense_key, self.asc, self.ascq)
    }
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("valid", &self.valid)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &format_args!("{:#x}", self.sense_key))
            .field("information", &self.information)
            .field("cmd_specific", &self.cmd_specific)
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("field_pointer", &self.field_pointer)
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

/// Return a description for the ASC/ASCQ pairs an enclosure reports.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    hot_table(asc, ascq).unwrap_or("UNSPECIFIED / vendor specific")
}

fn hot_table(asc: u8, ascq: u8) -> Option<&'static str> {
    Some(match (asc, ascq) {
        (0x00, 0x00) => "No additional sense information",
        (0x04, 0x01) => "Logical unit is in process of becoming ready",
        (0x20, 0x00) => "Invalid command operation code",
        (0x24, 0x00) => "Invalid field in CDB",
        (0x26, 0x00) => "Invalid field in parameter list",
        (0x29, _) => "Power on, reset, or bus device reset occurred",
        (0x2A, 0x01) => "Mode parameters changed",
        (0x35, 0x01) => "Unsupported enclosure function",
        (0x35, 0x02) => "Enclosure services unavailable",
        (0x35, 0x03) => "Enclosure services transfer failure",
        (0x35, 0x04) => "Enclosure services transfer refused",
        (0x35, 0x05) => "Enclosure services checksum error",
        (0x3F, 0x00) => "Target operating conditions have changed",
        (0x47, _) => "SCSI parity error",
        _ => return None,
    })
}
