//! The enclosure command/response engine and the policies it applies.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Decoded pages turned into device model writes.
pub mod apply;
/// Generational slot arena for in-flight requests.
pub mod arena;
/// Buffer id lookup for resume PROM reads and writes.
pub mod buffer_id;
/// Request to CDB plus outbound page.
pub mod builder;
/// Sense data classification and per-operation handling.
pub mod classifier;
/// The engine itself.
pub mod enclosure;
/// Firmware upgrade tracking.
pub mod fup;
/// Admission control.
pub mod gate;
/// Built-in platform wiring tables used when the enclosure cannot map.
pub mod mapping;
/// Device model boundary.
pub mod model;
/// Caller-facing requests and results.
pub mod request;
/// Retry advice.
pub mod retry;
/// SCSI transport boundary.
pub mod transport;
/// Completion and page validation.
pub mod validator;
