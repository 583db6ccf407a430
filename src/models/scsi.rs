// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI-level completion values: the status byte, the sense key, the
//! transport request status and the outcome tuple the validator consumes.

use core::fmt;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// The 1-byte SCSI status returned with every completed command (SAM-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScsiStatus {
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    /// Any other status codes defined in SAM-x or reserved
    Other(u8),
}

impl From<u8> for ScsiStatus {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ScsiStatus::Good,
            0x02 => ScsiStatus::CheckCondition,
            0x04 => ScsiStatus::ConditionMet,
            0x08 => ScsiStatus::Busy,
            0x18 => ScsiStatus::ReservationConflict,
            0x28 => ScsiStatus::TaskSetFull,
            0x30 => ScsiStatus::AcaActive,
            0x40 => ScsiStatus::TaskAborted,
            other => ScsiStatus::Other(other),
        }
    }
}

impl From<ScsiStatus> for u8 {
    fn from(s: ScsiStatus) -> u8 {
        match s {
            ScsiStatus::Good => 0x00,
            ScsiStatus::CheckCondition => 0x02,
            ScsiStatus::ConditionMet => 0x04,
            ScsiStatus::Busy => 0x08,
            ScsiStatus::ReservationConflict => 0x18,
            ScsiStatus::TaskSetFull => 0x28,
            ScsiStatus::AcaActive => 0x30,
            ScsiStatus::TaskAborted => 0x40,
            ScsiStatus::Other(b) => b,
        }
    }
}

/// Sense key, bits 0..3 of byte 2 in fixed-format sense data (SPC-4 Table 52).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SenseKey {
    NoSense = 0x00,
    RecoveredError = 0x01,
    NotReady = 0x02,
    MediumError = 0x03,
    HardwareError = 0x04,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
    DataProtect = 0x07,
    BlankCheck = 0x08,
    VendorSpecific = 0x09,
    CopyAborted = 0x0A,
    AbortedCommand = 0x0B,
    VolumeOverflow = 0x0D,
    Miscompare = 0x0E,
    Completed = 0x0F,
}

#[derive(Debug, Error)]
#[error("invalid sense key: 0x{0:02x}")]
pub struct UnknownSenseKey(pub u8);

impl TryFrom<u8> for SenseKey {
    type Error = UnknownSenseKey;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        use SenseKey::*;
        Ok(match b & 0x0F {
            0x00 => NoSense,
            0x01 => RecoveredError,
            0x02 => NotReady,
            0x03 => MediumError,
            0x04 => HardwareError,
            0x05 => IllegalRequest,
            0x06 => UnitAttention,
            0x07 => DataProtect,
            0x08 => BlankCheck,
            0x09 => VendorSpecific,
            0x0A => CopyAborted,
            0x0B => AbortedCommand,
            0x0D => VolumeOverflow,
            0x0E => Miscompare,
            0x0F => Completed,
            other => return Err(UnknownSenseKey(other)),
        })
    }
}

/// Status reported by the port/transport layer for the request itself,
/// independent of the SCSI status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestStatus {
    Success,
    Busy,
    DataUnderrun,
    Error,
}

/// (sense key, ASC, ASCQ) as carried back to the caller.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SenseTriple {
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl SenseTriple {
    pub const fn new(sense_key: u8, asc: u8, ascq: u8) -> Self {
        Self {
            sense_key,
            asc,
            ascq,
        }
    }
}

impl fmt::Debug for SenseTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SenseTriple(key={:#x}, asc={:#04x}, ascq={:#04x})",
            self.sense_key, self.asc, self.ascq
        )
    }
}

/// Everything the response validator needs to know about one completion.
#[derive(Debug, Clone)]
pub struct ScsiOutcome {
    pub scsi_status: ScsiStatus,
    pub request_status: RequestStatus,
    pub transferred: u32,
    pub sense: Bytes,
}

impl ScsiOutcome {
    /// GOOD status, successful request, `transferred` bytes moved.
    pub fn good(transferred: u32) -> Self {
        Self {
            scsi_status: ScsiStatus::Good,
            request_status: RequestStatus::Success,
            transferred,
            sense: Bytes::new(),
        }
    }

    /// CHECK CONDITION carrying the given raw sense buffer.
    pub fn check_condition(sense: Bytes) -> Self {
        Self {
            scsi_status: ScsiStatus::CheckCondition,
            request_status: RequestStatus::Success,
            transferred: 0,
            sense,
        }
    }
}
