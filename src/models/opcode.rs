// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Enclosure operations and the SCSI command family each one travels as.
//!
//! Every diagnostic-page operation maps to exactly one ESES page code; the
//! only exception is `RawReceiveDiagnostic`, whose page is chosen by the
//! caller.

use core::fmt;

use serde::Serialize;

use crate::models::common::PageCode;

/// SCSI command family a request is carried by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommandFamily {
    Inquiry,
    ReceiveDiagnostic,
    SendDiagnostic,
    ModeSense,
    ModeSelect,
    ReadBuffer,
    WriteBuffer,
}

impl CommandFamily {
    /// True when the command moves data from the enclosure to the host.
    #[inline]
    pub fn is_data_in(self) -> bool {
        matches!(
            self,
            CommandFamily::Inquiry
                | CommandFamily::ReceiveDiagnostic
                | CommandFamily::ModeSense
                | CommandFamily::ReadBuffer
        )
    }

    /// CDB operation code.
    pub fn opcode(self) -> u8 {
        match self {
            CommandFamily::Inquiry => 0x12,
            CommandFamily::ReceiveDiagnostic => 0x1C,
            CommandFamily::SendDiagnostic => 0x1D,
            CommandFamily::ModeSense => 0x5A,
            CommandFamily::ModeSelect => 0x55,
            CommandFamily::ReadBuffer => 0x3C,
            CommandFamily::WriteBuffer => 0x3B,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    GetInquiryData,
    ValidateIdentity,
    GetConfiguration,
    GetSasEnclosureType,
    GetStatus,
    GetAdditionalStatus,
    GetEmcSpecificStatus,
    GetTraceBufferInfo,
    GetDownloadStatus,
    DownloadFirmware,
    SetEmcSpecificControl,
    SetTraceBufferInfoControl,
    SetEnclosureControl,
    StringOut,
    ThresholdIn,
    ThresholdOut,
    EmcStatisticsControl,
    GetEmcStatistics,
    ModeSense,
    ModeSelect,
    ReadBuffer,
    ReadResume,
    WriteResume,
    RawInquiry,
    RawReceiveDiagnostic,
    SpsInBuffer,
    SpsEeprom,
    GetResumePromSize,
    TunnelGetConfiguration,
    TunnelDownloadFirmware,
    TunnelGetDownloadStatus,
    GetTunnelCommandStatus,
}

impl Operation {
    pub fn family(self) -> CommandFamily {
        use Operation::*;
        match self {
            GetInquiryData | ValidateIdentity | RawInquiry => CommandFamily::Inquiry,
            GetConfiguration
            | GetSasEnclosureType
            | GetStatus
            | GetAdditionalStatus
            | GetEmcSpecificStatus
            | GetTraceBufferInfo
            | GetDownloadStatus
            | ThresholdIn
            | GetEmcStatistics
            | RawReceiveDiagnostic
            | GetTunnelCommandStatus => CommandFamily::ReceiveDiagnostic,
            DownloadFirmware
            | SetEmcSpecificControl
            | SetTraceBufferInfoControl
            | SetEnclosureControl
            | StringOut
            | ThresholdOut
            | EmcStatisticsControl
            | TunnelGetConfiguration
            | TunnelDownloadFirmware
            | TunnelGetDownloadStatus => CommandFamily::SendDiagnostic,
            ModeSense => CommandFamily::ModeSense,
            ModeSelect => CommandFamily::ModeSelect,
            ReadBuffer | ReadResume | SpsEeprom | GetResumePromSize => {
                CommandFamily::ReadBuffer
            },
            WriteResume | SpsInBuffer => CommandFamily::WriteBuffer,
        }
    }

    /// Fixed ESES page code for diagnostic-page operations.
    pub fn page_code(self) -> Option<PageCode> {
        use Operation::*;
        Some(match self {
            GetConfiguration | GetSasEnclosureType => PageCode::Configuration,
            GetStatus | SetEnclosureControl => PageCode::EnclosureControlStatus,
            StringOut => PageCode::StringOut,
            ThresholdIn | ThresholdOut => PageCode::Threshold,
            GetAdditionalStatus => PageCode::AdditionalStatus,
            GetDownloadStatus | DownloadFirmware => PageCode::DownloadMicrocode,
            GetEmcSpecificStatus
            | SetEmcSpecificControl
            | GetTraceBufferInfo
            | SetTraceBufferInfoControl => PageCode::EmcEnclosure,
            EmcStatisticsControl | GetEmcStatistics => PageCode::EmcStatistics,
            TunnelGetConfiguration
            | TunnelDownloadFirmware
            | TunnelGetDownloadStatus
            | GetTunnelCommandStatus => PageCode::TunnelDiagnostic,
            GetInquiryData | ValidateIdentity | RawInquiry | RawReceiveDiagnostic
            | ModeSense | ModeSelect | ReadBuffer | ReadResume | WriteResume
            | SpsInBuffer | SpsEeprom | GetResumePromSize => return None,
        })
    }

    /// Firmware download/activate commands run under the firmware timeout.
    #[inline]
    pub fn is_firmware(self) -> bool {
        matches!(
            self,
            Operation::DownloadFirmware | Operation::TunnelDownloadFirmware
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
