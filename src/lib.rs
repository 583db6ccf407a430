//! Command/response engine for EMC ESES (SCSI Enclosure Services) enclosures.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line parsing, and logging.
pub mod cfg;
/// SCSI CDB fillers for the commands the engine issues.
pub mod control_block;
/// The enclosure engine: admission, build, submit, validate and apply.
pub mod engine;
/// Wire formats: diagnostic pages, sense data and the status taxonomy.
pub mod models;
/// State machine driving one command through its lifecycle.
pub mod state_machine;
