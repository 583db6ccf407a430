//! SCSI CDB fillers for the commands the enclosure engine issues.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod common;
pub mod inquiry;
pub mod mode_select;
pub mod mode_sense;
pub mod read_buffer;
pub mod receive_diag;
pub mod send_diag;
pub mod write_buffer;
