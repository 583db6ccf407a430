// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sense data to recovery action.
//!
//! `classify` only looks at the sense triple; `handle` folds in the
//! operation, since an unsupported page means something different for a
//! mapping page than for a mode page.

use serde::Serialize;

use crate::models::{opcode::Operation, scsi::SenseKey, status::EnclosureStatus};

/// Coarse error class derived from (sense key, ASC, ASCQ).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnclosureError {
    NoError,
    TargetOperatingConditionsChanged,
    DeviceReset,
    ModeParamChanged,
    UnitAttention,
    UnsupportedEnclosureFunction,
    ServicesTransferRefused,
    IllegalRequest,
    HardwareError,
    HardwareErrorParity,
    NotReady,
    AbortedCmd,
    UnexpectedSenseKey,
}

/// Pending-flag request produced by a classified failure. The engine owns
/// the flags and applies the request atomically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SideEffect {
    #[default]
    None,
    MarkConfigUnknown,
    MarkModeSenseNeeded,
    RunFallbackMapping,
    MarkModePageUnsupported,
}

const ASC_OPERATING_CONDITIONS_CHANGED: u8 = 0x3F;
const ASC_POWER_ON_RESET: u8 = 0x29;
const ASC_PARAMETERS_CHANGED: u8 = 0x2A;
const ASCQ_MODE_PARAMETERS_CHANGED: u8 = 0x01;
const ASC_ENCLOSURE_SERVICES: u8 = 0x35;
const ASCQ_UNSUPPORTED_FUNCTION: u8 = 0x01;
const ASCQ_TRANSFER_REFUSED: u8 = 0x04;
const ASC_PARITY: u8 = 0x47;

pub fn classify(sense_key: u8, asc: u8, ascq: u8) -> EnclosureError {
    use EnclosureError as E;
    let Ok(key) = SenseKey::try_from(sense_key) else {
        return E::UnexpectedSenseKey;
    };
    match key {
        SenseKey::NoSense => E::NoError,
        SenseKey::UnitAttention => match (asc, ascq) {
            (ASC_OPERATING_CONDITIONS_CHANGED, 0x00) => E::TargetOperatingConditionsChanged,
            (ASC_POWER_ON_RESET, _) => E::DeviceReset,
            (ASC_PARAMETERS_CHANGED, ASCQ_MODE_PARAMETERS_CHANGED) => E::ModeParamChanged,
            _ => E::UnitAttention,
        },
        SenseKey::IllegalRequest => match (asc, ascq) {
            (ASC_ENCLOSURE_SERVICES, ASCQ_UNSUPPORTED_FUNCTION) => {
                E::UnsupportedEnclosureFunction
            },
            (ASC_ENCLOSURE_SERVICES, ASCQ_TRANSFER_REFUSED) => E::ServicesTransferRefused,
            _ => E::IllegalRequest,
        },
        SenseKey::RecoveredError if asc == ASC_PARITY => E::HardwareErrorParity,
        SenseKey::RecoveredError | SenseKey::HardwareError => E::HardwareError,
        SenseKey::NotReady => E::NotReady,
        SenseKey::AbortedCommand => E::AbortedCmd,
        _ => E::UnexpectedSenseKey,
    }
}

pub fn handle(op: Operation, err: EnclosureError) -> (EnclosureStatus, SideEffect) {
    use EnclosureError as E;
    match err {
        E::TargetOperatingConditionsChanged | E::DeviceReset | E::ServicesTransferRefused => {
            (EnclosureStatus::CmdFailed, SideEffect::MarkConfigUnknown)
        },
        E::ModeParamChanged => (EnclosureStatus::CmdFailed, SideEffect::MarkModeSenseNeeded),
        E::UnsupportedEnclosureFunction => match op {
            Operation::GetAdditionalStatus | Operation::GetEmcSpecificStatus => (
                EnclosureStatus::UnsupportedPageHandled,
                SideEffect::RunFallbackMapping,
            ),
            Operation::ModeSense | Operation::ModeSelect => (
                EnclosureStatus::UnsupportedPageHandled,
                SideEffect::MarkModePageUnsupported,
            ),
            _ => (EnclosureStatus::FunctionUnsupported, SideEffect::None),
        },
        E::IllegalRequest => (EnclosureStatus::IllegalRequest, SideEffect::None),
        E::HardwareError => (EnclosureStatus::HardwareError, SideEffect::None),
        E::HardwareErrorParity => (EnclosureStatus::ChecksumError, SideEffect::None),
        E::NoError => (EnclosureStatus::Busy, SideEffect::None),
        E::UnitAttention | E::NotReady | E::AbortedCmd | E::UnexpectedSenseKey => {
            (EnclosureStatus::CmdFailed, SideEffect::None)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_attention_sub_codes() {
        assert_eq!(classify(0x06, 0x3F, 0x00), EnclosureError::TargetOperatingConditionsChanged);
        assert_eq!(classify(0x06, 0x29, 0x02), EnclosureError::DeviceReset);
        assert_eq!(classify(0x06, 0x2A, 0x01), EnclosureError::ModeParamChanged);
        assert_eq!(classify(0x06, 0x3F, 0x01), EnclosureError::UnitAttention);
    }

    #[test]
    fn recovered_parity_is_checksum() {
        let e = classify(0x01, 0x47, 0x00);
        assert_eq!(e, EnclosureError::HardwareErrorParity);
        assert_eq!(handle(Operation::GetStatus, e).0, EnclosureStatus::ChecksumError);
    }
}
