// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{EsesVersion, PlatformKind, SideId, YesNo},
    models::common::MAX_DIAG_PAGE_SIZE,
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Command engine limits and timeouts.
    pub engine: EngineConfig,
    /// Addressing of the enclosure's SES target on the transport.
    pub target: TargetConfig,
    /// Hardware knowledge used when the enclosure cannot report it.
    pub platform: PlatformConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(rename = "MaxOutstandingRequests")]
    /// Ceiling of the admission gate.
    pub max_outstanding_requests: u32,

    #[serde(rename = "PageTimeout", with = "serde_millis")]
    /// Timeout for every command except firmware download/activate.
    pub page_timeout: Duration,

    #[serde(rename = "FirmwareTimeout", with = "serde_millis")]
    /// Timeout for firmware download and activate commands.
    pub firmware_timeout: Duration,

    #[serde(rename = "MaxCommandRetry", default = "default_max_retry")]
    /// Retry ceiling consulted by the retry policy.
    pub max_command_retry: u32,

    #[serde(rename = "DiagPageAllocation", default = "default_diag_allocation")]
    /// Response buffer size for RECEIVE DIAGNOSTIC RESULTS.
    pub diag_page_allocation: u32,

    #[serde(rename = "EsesVersion", default)]
    /// Protocol revision of the enclosure firmware.
    pub eses_version: EsesVersion,

    #[serde(rename = "InFlightSlots", default = "default_in_flight_slots")]
    /// Size of the in-flight request arena.
    pub in_flight_slots: usize,
}

fn default_max_retry() -> u32 {
    3
}

fn default_diag_allocation() -> u32 {
    MAX_DIAG_PAGE_SIZE
}

fn default_in_flight_slots() -> usize {
    64
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TargetConfig {
    #[serde(rename = "PortId")]
    pub port_id: u32,
    #[serde(rename = "TargetId")]
    pub target_id: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PlatformConfig {
    #[serde(rename = "Platform", default, skip_serializing_if = "Option::is_none")]
    /// Platform to assume until INQUIRY reports one.
    pub platform: Option<PlatformKind>,

    #[serde(rename = "LocalSide")]
    /// LCC the engine talks through.
    pub local_side: SideId,

    #[serde(rename = "SpsDevSupported", default = "default_no")]
    /// Desired EENP "SPS device supported" flag.
    pub sps_dev_supported: YesNo,

    #[serde(rename = "IncludeDriveConnectors", default = "default_no")]
    /// Desired EENP "include drive connectors" flag.
    pub include_drive_connectors: YesNo,
}

fn default_no() -> YesNo {
    YesNo::No
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        let e = &mut self.engine;
        ensure!(
            e.max_outstanding_requests >= 1,
            "MaxOutstandingRequests must be >= 1"
        );
        ensure!(!e.page_timeout.is_zero(), "PageTimeout must be > 0");
        ensure!(!e.firmware_timeout.is_zero(), "FirmwareTimeout must be > 0");
        ensure!(e.in_flight_slots >= 1, "InFlightSlots must be >= 1");

        // A diagnostic page never exceeds 4 KiB; larger allocations are clamped.
        if e.diag_page_allocation > MAX_DIAG_PAGE_SIZE {
            e.diag_page_allocation = MAX_DIAG_PAGE_SIZE;
        }
        ensure!(
            e.diag_page_allocation >= 8,
            "DiagPageAllocation must hold at least a page header"
        );

        // The arena must be able to hold every admitted request.
        if e.in_flight_slots < e.max_outstanding_requests as usize {
            e.in_flight_slots = e.max_outstanding_requests as usize;
        }
        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
