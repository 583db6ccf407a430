//! Wire-level data structures: page codecs, SCSI completion values and the
//! enclosure vocabulary.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Page header, page codes, element and component types.
pub mod common;
/// Named component attributes of the device model.
pub mod element;
/// Enclosure operations and their SCSI command families.
pub mod opcode;
/// ESES diagnostic page codecs.
pub mod pages;
/// SCSI status, sense key and completion outcome.
pub mod scsi;
/// Fixed-format sense data parsing.
pub mod sense_data;
/// Caller-facing status taxonomy and typed errors.
pub mod status;
