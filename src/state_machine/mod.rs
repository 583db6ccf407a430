//! State machines driving enclosure commands through their lifecycle.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Lifecycle of one enclosure command.
pub mod command_states;
/// Common structures and traits for state machines.
pub mod common;
