// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Boundary to the port/transport shim that actually moves CDBs to the
//! enclosure.

use std::{future::Future, time::Duration};

use bytes::Bytes;

use crate::{
    control_block::common::Cdb,
    models::{
        scsi::{RequestStatus, ScsiOutcome, ScsiStatus},
        status::TransportError,
    },
};

/// One SCSI command handed to the transport.
///
/// `data_out` is moved in for write-direction commands. `data_in` is an
/// empty vector whose capacity is the response allocation; the transport
/// fills it and hands it back in the completion.
#[derive(Debug)]
pub struct ScsiRequest {
    pub port_id: u32,
    pub target_id: u32,
    pub correlation: u64,
    pub cdb: Cdb,
    pub data_out: Bytes,
    pub data_in: Vec<u8>,
    pub timeout: Duration,
}

impl ScsiRequest {
    /// Bytes the transport may place into `data_in`.
    #[inline]
    pub fn data_in_capacity(&self) -> usize {
        self.data_in.capacity()
    }
}

/// Asynchronous completion of a [`ScsiRequest`].
#[derive(Debug, Clone)]
pub struct ScsiCompletion {
    /// Must echo the request's correlation token.
    pub correlation: u64,
    pub scsi_status: u8,
    pub sense: Bytes,
    pub transferred: u32,
    pub request_status: RequestStatus,
    pub data_in: Bytes,
}

impl ScsiCompletion {
    /// GOOD completion returning `data`.
    pub fn good(correlation: u64, data: Bytes) -> Self {
        Self {
            correlation,
            scsi_status: 0x00,
            sense: Bytes::new(),
            transferred: data.len() as u32,
            request_status: RequestStatus::Success,
            data_in: data,
        }
    }

    /// CHECK CONDITION with the given sense buffer and no data.
    pub fn check_condition(correlation: u64, sense: Bytes) -> Self {
        Self {
            correlation,
            scsi_status: ScsiStatus::CheckCondition.into(),
            sense,
            transferred: 0,
            request_status: RequestStatus::Success,
            data_in: Bytes::new(),
        }
    }

    pub fn outcome(&self) -> ScsiOutcome {
        ScsiOutcome {
            scsi_status: ScsiStatus::from(self.scsi_status),
            request_status: self.request_status,
            transferred: self.transferred,
            sense: self.sense.clone(),
        }
    }
}

/// Port-level SCSI executor used by the engine.
pub trait Transport: Send + Sync {
    fn submit(
        &self,
        request: ScsiRequest,
    ) -> impl Future<Output = Result<ScsiCompletion, TransportError>> + Send;
}
