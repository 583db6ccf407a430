// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Firmware update tracking: download progress, activation timeout and
//! revision change detection.
//!
//! ```text
//!   Idle -> Downloading -> Activating -> Done
//!                               \-> Failed
//! ```
//!
//! The tracker never reads a clock on its own; callers pass `now`, so the
//! activation ceiling can be exercised with paused tokio time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    cfg::enums::EsesVersion,
    models::{
        common::ComponentType,
        element::{Attribute, ComponentRef},
        pages::download::{FwExtStatus, FwStatus, map_download_status},
        status::BuildError,
    },
};

/// Ride-through window after an activate, covering the expander reset.
pub const ACTIVATE_GRACE: Duration = Duration::from_secs(35);

/// Image a firmware update is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FirmwareTarget {
    LccMain,
    LccExpander,
    LccBootLoader,
    LccInitString,
    LccFpga,
    PowerSupply,
    Cooling,
    Sps,
    SpsSecondary,
    SpsBattery,
}

impl FirmwareTarget {
    pub fn component_type(self) -> ComponentType {
        match self {
            Self::LccMain
            | Self::LccExpander
            | Self::LccBootLoader
            | Self::LccInitString
            | Self::LccFpga => ComponentType::Lcc,
            Self::PowerSupply => ComponentType::PowerSupply,
            Self::Cooling => ComponentType::Cooling,
            Self::Sps | Self::SpsSecondary | Self::SpsBattery => ComponentType::Sps,
        }
    }

    /// Number of valid sides (component positions) for the target.
    pub fn side_limit(self) -> u8 {
        match self.component_type() {
            ComponentType::PowerSupply => 4,
            ComponentType::Cooling => 3,
            _ => 2,
        }
    }

    /// Component holding the subenclosure id and revision for `side`.
    pub fn component(self, side: u8) -> Result<ComponentRef, BuildError> {
        if side >= self.side_limit() {
            return Err(BuildError::Parameter(format!(
                "side {side} invalid for {self:?} (limit {})",
                self.side_limit()
            )));
        }
        Ok(ComponentRef::new(self.component_type(), side as usize))
    }

    pub fn revision_attr(self) -> Attribute {
        match self {
            Self::LccExpander => Attribute::FwRevisionExpander,
            Self::LccBootLoader => Attribute::FwRevisionBootLoader,
            Self::LccInitString => Attribute::FwRevisionInitString,
            Self::LccFpga => Attribute::FwRevisionFpga,
            Self::SpsSecondary => Attribute::FwRevisionSecondary,
            Self::SpsBattery => Attribute::FwRevisionBattery,
            Self::LccMain | Self::PowerSupply | Self::Cooling | Self::Sps => {
                Attribute::FwRevision
            },
        }
    }
}

/// Longest an activation may take before the update is declared failed.
pub fn activation_ceiling(target: FirmwareTarget, version: EsesVersion) -> Duration {
    use FirmwareTarget as T;
    let secs = match (target, version) {
        (T::LccMain | T::LccFpga | T::LccInitString | T::LccExpander, EsesVersion::Cdes1) => 70,
        (T::LccMain | T::LccFpga | T::LccInitString | T::LccExpander, EsesVersion::Cdes2) => 335,
        (T::LccBootLoader, _) => 70,
        (_, EsesVersion::Cdes1) => 300,
        (_, EsesVersion::Cdes2) => 600,
    };
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum FupPhase {
    #[default]
    Idle,
    Downloading,
    Activating,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FupOperation {
    Download,
    Activate,
}

#[derive(Debug, Clone)]
pub struct FirmwareUpdateContext {
    pub operation: FupOperation,
    pub target: FirmwareTarget,
    pub side: u8,
    pub status: FwStatus,
    pub additional_status: FwExtStatus,
    pub retry_count: u32,
    pub bytes_transferred: u32,
    pub start_time: Instant,
    pub use_tunnelling: bool,
    /// Revision seen when the activate was issued.
    pub activation_revision: Option<String>,
}

#[derive(Debug, Default)]
pub struct FupTracker {
    phase: FupPhase,
    ctx: Option<FirmwareUpdateContext>,
    grace_until: Option<Instant>,
    version: EsesVersion,
}

impl FupTracker {
    pub fn new(version: EsesVersion) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    #[inline]
    pub fn phase(&self) -> FupPhase {
        self.phase
    }

    pub fn status(&self) -> FwStatus {
        self.ctx.as_ref().map(|c| c.status).unwrap_or_default()
    }

    pub fn additional_status(&self) -> FwExtStatus {
        self.ctx
            .as_ref()
            .map(|c| c.additional_status)
            .unwrap_or_default()
    }

    pub fn context(&self) -> Option<&FirmwareUpdateContext> {
        self.ctx.as_ref()
    }

    pub fn bytes_transferred(&self) -> u32 {
        self.ctx.as_ref().map_or(0, |c| c.bytes_transferred)
    }

    /// True when the in-progress download aims at `target`/`side`.
    pub fn is_downloading(&self, target: FirmwareTarget, side: u8) -> bool {
        self.phase == FupPhase::Downloading
            && self
                .ctx
                .as_ref()
                .is_some_and(|c| c.target == target && c.side == side)
    }

    pub fn begin_download(
        &mut self,
        target: FirmwareTarget,
        side: u8,
        use_tunnelling: bool,
        now: Instant,
    ) {
        debug!(?target, side, use_tunnelling, "firmware download started");
        self.phase = FupPhase::Downloading;
        self.ctx = Some(FirmwareUpdateContext {
            operation: FupOperation::Download,
            target,
            side,
            status: FwStatus::InProgress,
            additional_status: FwExtStatus::None,
            retry_count: 0,
            bytes_transferred: 0,
            start_time: now,
            use_tunnelling,
            activation_revision: None,
        });
    }

    pub fn chunk_sent(&mut self, bytes: u32) {
        if let Some(c) = self.ctx.as_mut() {
            c.bytes_transferred = c.bytes_transferred.saturating_add(bytes);
        }
    }

    /// Record a successfully submitted activate. Returns `true` when this
    /// call armed the reset grace window.
    pub fn begin_activate(
        &mut self,
        target: FirmwareTarget,
        side: u8,
        current_revision: Option<String>,
        now: Instant,
    ) -> bool {
        let prev = self.ctx.take();
        self.ctx = Some(FirmwareUpdateContext {
            operation: FupOperation::Activate,
            target,
            side,
            status: FwStatus::InProgress,
            additional_status: FwExtStatus::None,
            retry_count: 0,
            bytes_transferred: prev.as_ref().map_or(0, |c| c.bytes_transferred),
            start_time: now,
            use_tunnelling: prev.is_some_and(|c| c.use_tunnelling),
            activation_revision: current_revision,
        });
        self.phase = FupPhase::Activating;
        if self.grace_active(now) {
            return false;
        }
        self.grace_until = Some(now + ACTIVATE_GRACE);
        true
    }

    #[inline]
    pub fn grace_active(&self, now: Instant) -> bool {
        self.grace_until.is_some_and(|t| now < t)
    }

    /// Fold one Download-Status observation into the tracker.
    ///
    /// `current_revision` is the revision the configuration currently
    /// reports for the target; it only matters while activating.
    pub fn observe_status(
        &mut self,
        code: u8,
        current_revision: Option<&str>,
        now: Instant,
    ) -> FupPhase {
        let version = self.version;
        let Some(c) = self.ctx.as_mut() else {
            return self.phase;
        };
        c.retry_count = 0;
        let (status, ext) = map_download_status(code, (c.status, c.additional_status));
        c.status = status;
        c.additional_status = ext;

        if status == FwStatus::Fail {
            warn!(code, ?ext, target = ?c.target, "firmware update failed");
            self.phase = FupPhase::Failed;
            return self.phase;
        }
        if self.phase != FupPhase::Activating {
            return self.phase;
        }

        let changed = match (c.activation_revision.as_deref(), current_revision) {
            (Some(before), Some(now_rev)) => before != now_rev,
            _ => false,
        };
        if changed {
            info!(target = ?c.target, side = c.side, "firmware revision changed, activation done");
            c.status = FwStatus::None;
            c.additional_status = FwExtStatus::None;
            self.phase = FupPhase::Done;
        } else if now.duration_since(c.start_time) > activation_ceiling(c.target, version) {
            warn!(target = ?c.target, side = c.side, "firmware activation timed out");
            c.status = FwStatus::Fail;
            c.additional_status = FwExtStatus::Timeout;
            self.phase = FupPhase::Failed;
        }
        self.phase
    }

    /// A Download-Status read itself failed. The first failure is retried;
    /// a repeat ends the update.
    pub fn status_read_failed(&mut self) -> FupPhase {
        let Some(c) = self.ctx.as_mut() else {
            return self.phase;
        };
        c.retry_count += 1;
        if c.retry_count > 1 {
            c.status = FwStatus::Fail;
            c.additional_status = FwExtStatus::RequiresStatusPage;
            self.phase = FupPhase::Failed;
        }
        self.phase
    }

    /// Back to `Idle`, keeping the grace window.
    pub fn reset(&mut self) {
        self.phase = FupPhase::Idle;
        self.ctx = None;
    }
}
