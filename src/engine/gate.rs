// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Outstanding-request admission gate.
//!
//! The counter is bumped before it is compared with the ceiling, so two
//! racing submitters can never both slip past the last free slot. A
//! rejected submitter releases its increment through the same guard an
//! admitted one does.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use tracing::debug;

#[derive(Debug)]
pub struct AdmissionGate {
    count: AtomicU32,
    max: u32,
    current_opcode: AtomicU8,
}

/// Holds one unit of the gate counter until dropped.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AdmissionGate {
    pub fn new(max: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            max,
            current_opcode: AtomicU8::new(0),
        }
    }

    /// Admit a request carrying CDB `opcode`, or `None` when the ceiling is
    /// reached.
    pub fn try_admit(&self, opcode: u8) -> Option<GateGuard<'_>> {
        let prev = self.count.fetch_add(1, Ordering::AcqRel);
        let guard = GateGuard { gate: self };
        if prev >= self.max {
            debug!(outstanding = prev, max = self.max, "admission rejected");
            return None;
        }
        self.current_opcode.store(opcode, Ordering::Release);
        Some(guard)
    }

    /// Requests admitted and not yet released, clamped to the ceiling.
    /// A rejected submitter's transient increment never shows here; see
    /// [`Self::raw_count`] for the unclamped counter.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        self.count.load(Ordering::Acquire).min(self.max)
    }

    /// Unclamped counter, including rejected submitters that have not yet
    /// dropped their increment. Diagnostics only.
    #[inline]
    pub fn raw_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// CDB opcode of the most recently admitted request.
    #[inline]
    pub fn current_opcode(&self) -> u8 {
        self.current_opcode.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max(&self) -> u32 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_then_release() {
        let gate = AdmissionGate::new(2);
        let a = gate.try_admit(0x1C).expect("first");
        let _b = gate.try_admit(0x1D).expect("second");
        assert!(gate.try_admit(0x12).is_none());
        assert_eq!(gate.outstanding(), 2);
        assert_eq!(gate.current_opcode(), 0x1D);
        drop(a);
        assert_eq!(gate.outstanding(), 1);
        assert!(gate.try_admit(0x12).is_some());
    }

    #[test]
    fn rejected_increment_shows_only_in_raw_count() {
        let gate = AdmissionGate::new(1);
        let _a = gate.try_admit(0x1C).expect("first");
        // a submitter between its increment and its rejection
        gate.count.fetch_add(1, Ordering::AcqRel);
        assert_eq!(gate.outstanding(), 1);
        assert_eq!(gate.raw_count(), 2);
        gate.count.fetch_sub(1, Ordering::AcqRel);

        assert!(gate.try_admit(0x1D).is_none());
        assert_eq!(gate.raw_count(), 1);
    }
}
