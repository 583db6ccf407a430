// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Response validation.
//!
//! Pure function of its inputs. Checks run in a fixed order and the first
//! failing one decides the verdict:
//!
//! 1. SCSI status, with sense decode and classification on failure
//! 2. transport request status
//! 3. page code (an Enclosure Busy page means `Busy`)
//! 4. page length against the allocation
//! 5. page length against the transferred byte count
//! 6. generation code against the held value

use serde::Serialize;
use tracing::warn;

use crate::{
    engine::classifier::{SideEffect, classify, handle},
    models::{
        common::{PageCode, PageHeader},
        opcode::Operation,
        pages::download::DL_STATUS_SIZE_SLACK,
        scsi::{RequestStatus, ScsiOutcome, ScsiStatus, SenseTriple},
        sense_data::SenseData,
        status::EnclosureStatus,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub status: EnclosureStatus,
    pub sense: Option<SenseTriple>,
    pub effect: SideEffect,
}

impl Verdict {
    const OK: Self = Self::plain(EnclosureStatus::Ok);

    const fn plain(status: EnclosureStatus) -> Self {
        Self {
            status,
            sense: None,
            effect: SideEffect::None,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Validate one completion.
///
/// `expected_page` is `None` for commands that do not return a diagnostic
/// page (INQUIRY, MODE SENSE, READ BUFFER); for those only the status
/// checks apply. `held_generation` is `None` while the configuration is
/// unknown, which makes every generation-carrying page stale.
pub fn validate(
    op: Operation,
    expected_page: Option<u8>,
    outcome: &ScsiOutcome,
    page: &[u8],
    allocation: u32,
    held_generation: Option<u16>,
) -> Verdict {
    match outcome.scsi_status {
        ScsiStatus::Good => {},
        ScsiStatus::Busy | ScsiStatus::TaskSetFull => {
            return Verdict::plain(EnclosureStatus::Busy);
        },
        _ => return check_sense(op, &outcome.sense),
    }

    match outcome.request_status {
        RequestStatus::Success | RequestStatus::DataUnderrun => {},
        RequestStatus::Busy => return Verdict::plain(EnclosureStatus::Busy),
        RequestStatus::Error => return Verdict::plain(EnclosureStatus::CdbRequestFailed),
    }

    match expected_page {
        Some(code) => check_page(code, outcome.transferred, page, allocation, held_generation),
        None => Verdict::OK,
    }
}

fn check_sense(op: Operation, sense: &[u8]) -> Verdict {
    let Ok(data) = SenseData::parse(sense) else {
        // nothing to classify, let the caller try again
        return Verdict::plain(EnclosureStatus::Busy);
    };
    let triple = data.triple();
    let err = classify(triple.sense_key, triple.asc, triple.ascq);
    let (status, effect) = handle(op, err);
    warn!(%op, ?triple, ?err, %status, "command failed with sense data");
    Verdict {
        status,
        sense: Some(triple),
        effect,
    }
}

fn check_page(
    expected: u8,
    transferred: u32,
    page: &[u8],
    allocation: u32,
    held_generation: Option<u16>,
) -> Verdict {
    let busy = PageCode::EnclosureBusy as u8;
    if expected != busy && page.first() == Some(&busy) {
        return Verdict::plain(EnclosureStatus::Busy);
    }
    let Ok(header) = PageHeader::parse(page) else {
        return Verdict::plain(EnclosureStatus::PageInvalid);
    };

    if header.page_code != expected {
        return if header.page_code == busy {
            Verdict::plain(EnclosureStatus::Busy)
        } else {
            Verdict::plain(EnclosureStatus::PageInvalid)
        };
    }

    if header.page_length > allocation {
        return Verdict::plain(EnclosureStatus::AllocatedMemoryInsufficient);
    }

    let slack = if expected == PageCode::DownloadMicrocode as u8 {
        DL_STATUS_SIZE_SLACK
    } else {
        0
    };
    if transferred != header.page_length && transferred != header.page_length + slack {
        return Verdict::plain(EnclosureStatus::PageInvalid);
    }

    let carries_generation = PageCode::try_from(expected).is_ok_and(PageCode::carries_generation);
    if carries_generation && held_generation != Some(header.generation_code) {
        return Verdict {
            status: EnclosureStatus::ConfigurationUnknown,
            sense: None,
            effect: SideEffect::MarkConfigUnknown,
        };
    }
    Verdict::OK
}
