// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::common::ComponentType;

/// Result taxonomy every enclosure operation resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnclosureStatus {
    Ok,
    Busy,
    CmdFailed,
    IllegalRequest,
    HardwareError,
    ChecksumError,
    AllocatedMemoryInsufficient,
    FunctionUnsupported,
    ConfigurationUnknown,
    PageInvalid,
    ParameterInvalid,
    LifecycleFailed,
    PacketFailed,
    BuildCdbFailed,
    BuildPageFailed,
    MemAllocFailed,
    MoreProcessingRequired,
    CdbRequestFailed,
    UnsupportedPageHandled,
    CtrlCodeUnsupported,
    ComponentNotFound,
    EdalFailed,
}

impl EnclosureStatus {
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, EnclosureStatus::Ok)
    }

    /// Busy and ConfigurationUnknown clear once the engine re-synchronizes.
    #[inline]
    pub fn is_locally_recoverable(self) -> bool {
        matches!(
            self,
            EnclosureStatus::Busy | EnclosureStatus::ConfigurationUnknown
        )
    }
}

impl fmt::Display for EnclosureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Failure while turning a request into a CDB plus outbound buffer.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("operation {0} is not supported by the command builder")]
    Unsupported(&'static str),
    #[error("failed to build page: {0}")]
    Page(String),
    #[error("failed to build CDB: {0}")]
    Cdb(String),
    #[error("failed to allocate {0} bytes")]
    Alloc(usize),
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error("component {0:?} #{1} not found")]
    ComponentNotFound(ComponentType, usize),
    #[error("device model lookup failed: {0}")]
    Model(#[from] ModelError),
}

impl From<&BuildError> for EnclosureStatus {
    fn from(e: &BuildError) -> Self {
        match e {
            BuildError::Unsupported(_) => EnclosureStatus::CtrlCodeUnsupported,
            BuildError::Page(_) => EnclosureStatus::BuildPageFailed,
            BuildError::Cdb(_) => EnclosureStatus::BuildCdbFailed,
            BuildError::Alloc(_) => EnclosureStatus::MemAllocFailed,
            BuildError::Parameter(_) => EnclosureStatus::ParameterInvalid,
            BuildError::ComponentNotFound(..) => EnclosureStatus::ComponentNotFound,
            BuildError::Model(m) => m.into(),
        }
    }
}

/// Failure reported by the transport shim when a command cannot be
/// submitted or never completes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport rejected submit: {0}")]
    Rejected(String),
    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport I/O failure: {0}")]
    Io(String),
}

impl From<&TransportError> for EnclosureStatus {
    fn from(e: &TransportError) -> Self {
        match e {
            TransportError::Rejected(_) => EnclosureStatus::PacketFailed,
            TransportError::Timeout(_) | TransportError::Io(_) => {
                EnclosureStatus::CdbRequestFailed
            },
        }
    }
}

/// Failure reported by the device model store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("component {0:?} #{1} not found")]
    NotFound(ComponentType, usize),
    #[error("attribute {attr} missing on {ty:?} #{index}")]
    AttributeMissing {
        ty: ComponentType,
        index: usize,
        attr: &'static str,
    },
    #[error("attribute {attr} on {ty:?} #{index} has unexpected type")]
    TypeMismatch {
        ty: ComponentType,
        index: usize,
        attr: &'static str,
    },
}

impl From<&ModelError> for EnclosureStatus {
    fn from(e: &ModelError) -> Self {
        match e {
            ModelError::NotFound(..) | ModelError::AttributeMissing { .. } => {
                EnclosureStatus::ComponentNotFound
            },
            ModelError::TypeMismatch { .. } => EnclosureStatus::EdalFailed,
        }
    }
}
