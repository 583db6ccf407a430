// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use eses_engine::{
    cfg::{
        cli::resolve_config_path,
        config::Config,
        enums::{EsesVersion, PlatformKind, SideId},
        logger::{LogSettings, dump_json, init_logger},
    },
    models::pages::{DecodeContext, DiagnosticPage},
};
use serial_test::serial;

fn load() -> Result<Config> {
    resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")
}

#[test]
fn test_config_load() -> Result<()> {
    let cfg = load()?;
    assert_eq!(cfg.engine.max_outstanding_requests, 4);
    assert_eq!(cfg.engine.page_timeout, Duration::from_secs(30));
    assert_eq!(cfg.engine.firmware_timeout, Duration::from_secs(120));
    assert_eq!(cfg.engine.eses_version, EsesVersion::Cdes2);
    assert_eq!(cfg.engine.diag_page_allocation, 4096);
    assert_eq!(cfg.target.target_id, 1);
    assert_eq!(cfg.platform.platform, Some(PlatformKind::Viper));
    assert_eq!(cfg.platform.local_side, SideId::A);
    assert!(cfg.platform.sps_dev_supported.as_bool());
    assert!(!cfg.platform.include_drive_connectors.as_bool());
    Ok(())
}

#[test]
fn test_config_normalizes_limits() -> Result<()> {
    let mut cfg = load()?;
    cfg.engine.diag_page_allocation = 1 << 20;
    cfg.engine.max_outstanding_requests = 32;
    cfg.engine.in_flight_slots = 8;
    cfg.validate_and_normalize()?;
    assert_eq!(cfg.engine.diag_page_allocation, 4096);
    assert_eq!(cfg.engine.in_flight_slots, 32);
    Ok(())
}

#[test]
fn test_config_rejects_zero_limits() -> Result<()> {
    let mut cfg = load()?;
    cfg.engine.max_outstanding_requests = 0;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = load()?;
    cfg.engine.page_timeout = Duration::ZERO;
    assert!(cfg.validate_and_normalize().is_err());
    Ok(())
}

#[test]
fn test_config_missing_file() {
    assert!(resolve_config_path("tests/no_such_config.yaml").is_err());
}

#[test]
fn test_logger_settings_parse() -> Result<()> {
    let s = LogSettings::from_file("tests/config_logger.yaml")?;
    assert_eq!(s.level, "debug");
    assert_eq!(s.output, "stdout");
    let file = s.file.context("file section")?;
    assert_eq!(file.rotation_frequency.as_deref(), Some("daily"));
    Ok(())
}

#[test]
#[serial]
fn test_logger_installs_once() -> Result<()> {
    let _guard = init_logger("tests/config_logger.yaml")?;
    tracing::info!(component = "unit", "logger up");
    // the global subscriber can only be set once per process
    assert!(init_logger("tests/config_logger.yaml").is_err());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_dump_json_writes_decoded_page() -> Result<()> {
    let raw = [0x0Eu8, 0, 0, 20, 0, 0, 0, 9, 0, 1, 0x13, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let page = DiagnosticPage::decode(&raw, DecodeContext::new(EsesVersion::Cdes2, &[]))?;

    let dir = std::env::temp_dir().join(format!("eses-engine-{}", std::process::id()));
    let path = dir.join("download_status.json");
    dump_json(&path, &page).await?;

    let text = tokio::fs::read_to_string(&path).await?;
    let v: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(v["DownloadStatusPage"]["status"], 0x13);
    assert_eq!(v["DownloadStatusPage"]["header"]["generation_code"], 9);
    tokio::fs::remove_dir_all(&dir).await?;
    Ok(())
}
