// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! What a caller should do after an operation completed with a given
//! status. The engine itself never retries; it reports the advice in
//! `CommandResult::retry`.

use serde::Serialize;

use crate::models::{opcode::Operation, status::EnclosureStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum RetryDecision {
    #[default]
    NoAction,
    Retry,
    Fail,
}

/// Pending-flag change that accompanies a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum RetryEffect {
    #[default]
    None,
    ClearSpsSupported,
    MarkModeUnsupported,
    MarkEmcControlNeeded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryAdvice {
    pub decision: RetryDecision,
    pub effect: RetryEffect,
}

impl RetryAdvice {
    const fn of(decision: RetryDecision) -> Self {
        Self {
            decision,
            effect: RetryEffect::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryContext {
    pub max_retry: u32,
    /// The configuration is known and the enclosure can take control pages.
    pub enclosure_ready: bool,
    /// Image bytes already accepted by the enclosure in this download.
    pub fw_bytes: u32,
}

/// Advice for `op` finishing with `status` on attempt `attempt` (0-based).
pub fn decide(
    op: Operation,
    status: EnclosureStatus,
    attempt: u32,
    ctx: &RetryContext,
) -> RetryAdvice {
    use EnclosureStatus as S;
    use RetryDecision::*;
    let exhausted = attempt + 1 >= ctx.max_retry;

    let advice = match op {
        Operation::ModeSense | Operation::ModeSelect => match status {
            S::Ok | S::UnsupportedPageHandled | S::FunctionUnsupported => RetryAdvice::of(NoAction),
            S::ParameterInvalid | S::EdalFailed | S::LifecycleFailed | S::BuildCdbFailed => {
                RetryAdvice::of(Fail)
            },
            S::IllegalRequest if op == Operation::ModeSelect => RetryAdvice {
                decision: NoAction,
                effect: RetryEffect::ClearSpsSupported,
            },
            S::IllegalRequest => RetryAdvice::of(Fail),
            _ if exhausted => RetryAdvice {
                decision: NoAction,
                effect: RetryEffect::MarkModeUnsupported,
            },
            _ => RetryAdvice::of(Retry),
        },
        Operation::GetConfiguration
        | Operation::GetSasEnclosureType
        | Operation::GetAdditionalStatus
        | Operation::GetEmcSpecificStatus
        | Operation::GetInquiryData
        | Operation::ValidateIdentity => match status {
            S::Ok | S::UnsupportedPageHandled => RetryAdvice::of(NoAction),
            S::ParameterInvalid
            | S::EdalFailed
            | S::LifecycleFailed
            | S::FunctionUnsupported
            | S::BuildCdbFailed => RetryAdvice::of(Fail),
            _ => RetryAdvice::of(Retry),
        },
        Operation::GetDownloadStatus => match status {
            S::Busy | S::CdbRequestFailed => RetryAdvice::of(Retry),
            _ => RetryAdvice::of(NoAction),
        },
        Operation::DownloadFirmware | Operation::TunnelDownloadFirmware => match status {
            S::Busy | S::CdbRequestFailed => RetryAdvice::of(Retry),
            S::Ok | S::MoreProcessingRequired => RetryAdvice::of(NoAction),
            _ if attempt == 0 && ctx.fw_bytes == 0 => RetryAdvice::of(Retry),
            _ => RetryAdvice::of(NoAction),
        },
        // accepted by the peer; the caller polls GetTunnelCommandStatus
        Operation::TunnelGetConfiguration | Operation::TunnelGetDownloadStatus
            if matches!(status, S::Ok | S::MoreProcessingRequired) =>
        {
            RetryAdvice::of(NoAction)
        },
        Operation::SetEmcSpecificControl if !ctx.enclosure_ready => RetryAdvice {
            decision: NoAction,
            effect: RetryEffect::MarkEmcControlNeeded,
        },
        _ => match status {
            S::Ok
            | S::UnsupportedPageHandled
            | S::ParameterInvalid
            | S::FunctionUnsupported
            | S::HardwareError => RetryAdvice::of(NoAction),
            S::EdalFailed | S::LifecycleFailed | S::BuildCdbFailed => RetryAdvice::of(Fail),
            _ => RetryAdvice::of(Retry),
        },
    };

    // nothing is retried past the ceiling
    if advice.decision == Retry && exhausted {
        return RetryAdvice {
            decision: Fail,
            ..advice
        };
    }
    advice
}
