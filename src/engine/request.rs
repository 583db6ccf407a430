// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed requests, request frames and the caller-facing result.

use bytes::Bytes;
use serde::Serialize;

use crate::{
    engine::{buffer_id::BufferTarget, fup::FirmwareTarget, retry::RetryAdvice},
    models::{
        opcode::Operation,
        pages::{
            emc::{EmcControlPage, TraceBufAction},
            encl_status::ControlElement,
            mode_param::ModeParamList,
            threshold::ThresholdOut,
        },
        scsi::SenseTriple,
        status::EnclosureStatus,
    },
};

/// Firmware download or activation aimed at one component image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOp {
    /// Sends the next chunk of `image`; repeat until the result is no
    /// longer `MoreProcessingRequired`.
    Download {
        target: FirmwareTarget,
        side: u8,
        image: Bytes,
    },
    Activate {
        target: FirmwareTarget,
        side: u8,
    },
}

impl FirmwareOp {
    pub fn target(&self) -> (FirmwareTarget, u8) {
        match self {
            FirmwareOp::Download { target, side, .. } | FirmwareOp::Activate { target, side } => {
                (*target, *side)
            },
        }
    }
}

/// One enclosure operation with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetInquiryData,
    ValidateIdentity,
    GetConfiguration,
    GetSasEnclosureType,
    GetStatus,
    GetAdditionalStatus,
    GetEmcSpecificStatus,
    /// Trace buffer records, truncated to `allocation` bytes.
    GetTraceBufferInfo {
        allocation: u32,
    },
    GetDownloadStatus,
    DownloadFirmware(FirmwareOp),
    SetEmcSpecificControl(EmcControlPage),
    SetTraceBufferInfoControl {
        buf_id: u8,
        action: TraceBufAction,
        elem_index: u8,
    },
    SetEnclosureControl(Vec<ControlElement>),
    StringOut {
        text: Bytes,
        echo: bool,
    },
    ThresholdIn,
    ThresholdOut(ThresholdOut),
    EmcStatisticsControl {
        elem_offsets: Vec<u8>,
    },
    GetEmcStatistics,
    ModeSense {
        page_code: u8,
    },
    ModeSelect(ModeParamList),
    ReadBuffer {
        buf_id: u8,
        offset: u32,
        length: u32,
    },
    ReadResume {
        target: BufferTarget,
        offset: u32,
        length: u32,
    },
    WriteResume {
        target: BufferTarget,
        offset: u32,
        data: Bytes,
    },
    RawInquiry {
        evpd: bool,
        page_code: u8,
        allocation: u16,
    },
    RawReceiveDiagnostic {
        page_code: u8,
        allocation: u32,
    },
    SpsInBuffer {
        data: Bytes,
    },
    SpsEeprom {
        offset: u32,
        length: u32,
    },
    GetResumePromSize {
        target: BufferTarget,
    },
    TunnelGetConfiguration,
    TunnelDownloadFirmware(FirmwareOp),
    TunnelGetDownloadStatus,
    GetTunnelCommandStatus,
}

impl Request {
    pub fn operation(&self) -> Operation {
        use Request as R;
        match self {
            R::GetInquiryData => Operation::GetInquiryData,
            R::ValidateIdentity => Operation::ValidateIdentity,
            R::GetConfiguration => Operation::GetConfiguration,
            R::GetSasEnclosureType => Operation::GetSasEnclosureType,
            R::GetStatus => Operation::GetStatus,
            R::GetAdditionalStatus => Operation::GetAdditionalStatus,
            R::GetEmcSpecificStatus => Operation::GetEmcSpecificStatus,
            R::GetTraceBufferInfo { .. } => Operation::GetTraceBufferInfo,
            R::GetDownloadStatus => Operation::GetDownloadStatus,
            R::DownloadFirmware(_) => Operation::DownloadFirmware,
            R::SetEmcSpecificControl(_) => Operation::SetEmcSpecificControl,
            R::SetTraceBufferInfoControl { .. } => Operation::SetTraceBufferInfoControl,
            R::SetEnclosureControl(_) => Operation::SetEnclosureControl,
            R::StringOut { .. } => Operation::StringOut,
            R::ThresholdIn => Operation::ThresholdIn,
            R::ThresholdOut(_) => Operation::ThresholdOut,
            R::EmcStatisticsControl { .. } => Operation::EmcStatisticsControl,
            R::GetEmcStatistics => Operation::GetEmcStatistics,
            R::ModeSense { .. } => Operation::ModeSense,
            R::ModeSelect(_) => Operation::ModeSelect,
            R::ReadBuffer { .. } => Operation::ReadBuffer,
            R::ReadResume { .. } => Operation::ReadResume,
            R::WriteResume { .. } => Operation::WriteResume,
            R::RawInquiry { .. } => Operation::RawInquiry,
            R::RawReceiveDiagnostic { .. } => Operation::RawReceiveDiagnostic,
            R::SpsInBuffer { .. } => Operation::SpsInBuffer,
            R::SpsEeprom { .. } => Operation::SpsEeprom,
            R::GetResumePromSize { .. } => Operation::GetResumePromSize,
            R::TunnelGetConfiguration => Operation::TunnelGetConfiguration,
            R::TunnelDownloadFirmware(_) => Operation::TunnelDownloadFirmware,
            R::TunnelGetDownloadStatus => Operation::TunnelGetDownloadStatus,
            R::GetTunnelCommandStatus => Operation::GetTunnelCommandStatus,
        }
    }

    /// Tunnelled requests whose outcome arrives through a later
    /// `GetTunnelCommandStatus`.
    #[inline]
    pub fn is_tunnelled_send(&self) -> bool {
        matches!(
            self,
            Request::TunnelGetConfiguration
                | Request::TunnelDownloadFirmware(_)
                | Request::TunnelGetDownloadStatus
        )
    }
}

/// A request plus the bookkeeping that travels with it through retries
/// and continuations.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub request: Request,
    /// Assigned by the engine on submit.
    pub correlation: u64,
    /// 0 on first submission, bumped by the caller on each retry.
    pub attempt: u32,
    /// Request this one continues, e.g. the tunnelled download a tunnel
    /// status poll reports on.
    pub parent: Option<Box<RequestFrame>>,
}

impl RequestFrame {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            correlation: 0,
            attempt: 0,
            parent: None,
        }
    }

    /// Same request, next attempt.
    pub fn retry(&self) -> Self {
        Self {
            request: self.request.clone(),
            correlation: 0,
            attempt: self.attempt + 1,
            parent: self.parent.clone(),
        }
    }

    /// Continuation frame for `request` carrying `self` as its parent.
    pub fn child(self, request: Request) -> Self {
        Self {
            request,
            correlation: 0,
            attempt: 0,
            parent: Some(Box::new(self)),
        }
    }
}

/// Outcome of one `execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: EnclosureStatus,
    pub operation: Operation,
    pub correlation: u64,
    pub sense: Option<SenseTriple>,
    /// Inbound bytes for operations that return data to the caller.
    #[serde(skip)]
    pub data: Option<Bytes>,
    /// Device model values changed while applying the response.
    pub model_updates: usize,
    pub retry: RetryAdvice,
}

impl CommandResult {
    pub fn new(status: EnclosureStatus, operation: Operation, correlation: u64) -> Self {
        Self {
            status,
            operation,
            correlation,
            sense: None,
            data: None,
            model_updates: 0,
            retry: RetryAdvice::default(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
