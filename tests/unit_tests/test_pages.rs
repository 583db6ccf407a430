// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;

use anyhow::{Context, Result};
use eses_engine::{
    cfg::enums::EsesVersion,
    models::{
        common::{ElementStatusCode, SubenclosureType},
        pages::{
            DecodeContext, DiagnosticPage, EsesPage,
            config::ConfigPage,
            download::{DownloadStatusPage, FwExtStatus, FwStatus, map_download_status},
            encl_status::{EnclosureStatusPage, StatusDetail},
        },
    },
};
use hex::FromHex;

fn load_fixture(path: &str) -> Result<Vec<u8>> {
    let s = fs::read_to_string(path)?;
    let cleaned = s.trim().replace(|c: char| c.is_whitespace(), "");
    Ok(Vec::from_hex(&cleaned)?)
}

fn config() -> Result<ConfigPage> {
    let raw = load_fixture("tests/unit_tests/fixtures/pages/config_cdes2.hex")?;
    ConfigPage::parse(&raw, EsesVersion::Cdes2)
}

#[test]
fn test_config_page_layout() -> Result<()> {
    let page = config()?;
    assert_eq!(page.header.generation_code, 5);
    assert_eq!(page.num_secondary_subencls, 1);
    assert_eq!(page.subenclosures.len(), 2);

    let chassis = page.primary().context("no primary subenclosure")?;
    assert_eq!(chassis.subencl_type, SubenclosureType::Chassis);
    assert_eq!(chassis.product_id, "VIPER DAE");
    assert_eq!(chassis.serial_number, "CHS0001");
    assert_eq!(chassis.buffers.len(), 1);
    assert!(chassis.buffers[0].writable);
    assert_eq!(chassis.buffers[0].buf_id, 4);

    let lcc = page.subenclosure(1).context("no LCC subenclosure")?;
    assert_eq!(lcc.subencl_type, SubenclosureType::Lcc);
    assert_eq!(lcc.side, 0);
    assert_eq!(lcc.versions.len(), 1);
    assert_eq!(lcc.versions[0].comp_type, 6);
    assert_eq!(lcc.versions[0].revision, "1.23");
    assert!(!lcc.buffers[0].writable);

    let idx: Vec<(u8, u8, u16)> = page
        .groups
        .iter()
        .map(|g| (g.elem_type, g.first_elem_index, g.byte_offset))
        .collect();
    assert_eq!(
        idx,
        [(0x0E, 0, 8), (0x17, 1, 16), (0x07, 4, 32), (0x04, 5, 40)]
    );
    assert_eq!(page.status_slot_count(), 10);
    Ok(())
}

#[test]
fn test_config_page_truncated() -> Result<()> {
    let raw = load_fixture("tests/unit_tests/fixtures/pages/config_cdes2.hex")?;
    let err = ConfigPage::parse(&raw[..100], EsesVersion::Cdes2)
        .expect_err("page cut inside the second subenclosure");
    assert!(format!("{err:#}").contains("subenclosure"), "{err:#}");
    Ok(())
}

#[test]
fn test_status_page_elements() -> Result<()> {
    let cfg = config()?;
    let raw = load_fixture("tests/unit_tests/fixtures/pages/encl_status.hex")?;
    let page = EnclosureStatusPage::parse(&raw, DecodeContext::new(EsesVersion::Cdes2, &cfg.groups))?;

    assert!(page.summary.critical);
    assert!(!page.summary.unrecoverable);
    assert_eq!(page.elements.len(), 10);
    assert_eq!(page.individual().count(), 6);

    let s0 = page.element(1).context("slot 0")?;
    assert_eq!(s0.code, ElementStatusCode::Ok);
    assert!(matches!(s0.detail, StatusDetail::ArrayDeviceSlot { ok: true, .. }));

    let s1 = page.element(2).context("slot 1")?;
    assert_eq!(s1.code, ElementStatusCode::NotInstalled);

    let s2 = page.element(3).context("slot 2")?;
    assert_eq!(s2.code, ElementStatusCode::Critical);
    assert!(matches!(
        s2.detail,
        StatusDetail::ArrayDeviceSlot {
            fault_sensed: true,
            ..
        }
    ));

    let esc = page.element(4).context("esc")?;
    assert!(matches!(esc.detail, StatusDetail::EscElectronics { report: true, .. }));

    let temp = page.element(5).context("temp sensor")?;
    assert!(matches!(
        temp.detail,
        StatusDetail::TempSensor {
            temperature: Some(31),
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_status_page_shorter_than_layout() -> Result<()> {
    let cfg = config()?;
    let raw = load_fixture("tests/unit_tests/fixtures/pages/encl_status.hex")?;
    let mut short = raw[..40].to_vec();
    short[2..4].copy_from_slice(&36u16.to_be_bytes());
    assert!(
        EnclosureStatusPage::parse(&short, DecodeContext::new(EsesVersion::Cdes2, &cfg.groups))
            .is_err()
    );
    Ok(())
}

#[test]
fn test_dispatch_by_page_code() -> Result<()> {
    let cfg = config()?;
    let ctx = DecodeContext::new(EsesVersion::Cdes2, &cfg.groups);

    let raw = load_fixture("tests/unit_tests/fixtures/pages/encl_status.hex")?;
    let page = DiagnosticPage::decode(&raw, ctx)?;
    assert!(matches!(page, DiagnosticPage::EnclosureStatusPage(_)));
    assert_eq!(page.header().page_code, 0x02);
    assert_eq!(page.generation_code(), 5);

    let raw = load_fixture("tests/unit_tests/fixtures/pages/download_status.hex")?;
    let page = DiagnosticPage::decode(&raw, ctx)?;
    assert!(matches!(page, DiagnosticPage::DownloadStatusPage(_)));

    // String Out is send-only
    assert!(DiagnosticPage::decode(&[0x04, 0, 0, 4, 0, 0, 0, 0], ctx).is_err());
    Ok(())
}

#[test]
fn test_download_status_page() -> Result<()> {
    let raw = load_fixture("tests/unit_tests/fixtures/pages/download_status.hex")?;
    let page = DownloadStatusPage::parse(&raw)?;
    assert_eq!(page.subencl_id, 1);
    assert_eq!(page.status, 0x13);
    assert_eq!(
        map_download_status(page.status, (FwStatus::InProgress, FwExtStatus::None)),
        (FwStatus::None, FwExtStatus::ImageLoaded)
    );
    Ok(())
}

#[test]
fn test_download_status_keeps_earlier_failure() {
    let failed = (FwStatus::Fail, FwExtStatus::ErrChecksum);
    assert_eq!(
        map_download_status(0x01, failed),
        (FwStatus::Fail, FwExtStatus::None)
    );
    assert_eq!(map_download_status(0x85, Default::default()).1, FwExtStatus::ErrNoImage);
    assert_eq!(map_download_status(0x42, Default::default()).1, FwExtStatus::Unknown);
}
