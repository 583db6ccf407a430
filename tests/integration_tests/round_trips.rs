// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, ensure};
use bytes::Bytes;
use eses_engine::{
    cfg::enums::{EsesVersion, SideId},
    engine::{buffer_id::BufferTarget, enclosure::PendingFlags, request::Request},
    models::{
        pages::mode_param::{EENP_PAGE_CODE, ModeParamList},
        status::EnclosureStatus,
    },
};

use crate::integration_tests::common::{SimEnclosure, engine_with, load_config};

#[tokio::test]
async fn sensed_eenp_mismatch_asks_for_select() -> Result<()> {
    let engine = engine_with(load_config()?, SimEnclosure::new(EsesVersion::Cdes2));
    assert!(engine.pending_flags().contains(PendingFlags::MODE_SENSE_NEEDED));

    let r = engine
        .execute(Request::ModeSense {
            page_code: EENP_PAGE_CODE,
        })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);

    let flags = engine.pending_flags();
    assert!(!flags.contains(PendingFlags::MODE_SENSE_NEEDED));
    assert!(flags.contains(PendingFlags::MODE_SELECT_NEEDED));
    Ok(())
}

#[tokio::test]
async fn mode_select_then_sense_returns_the_same_pages() -> Result<()> {
    let engine = engine_with(load_config()?, SimEnclosure::new(EsesVersion::Cdes2));
    ensure!(
        engine
            .execute(Request::ModeSense {
                page_code: EENP_PAGE_CODE
            })
            .await
            .is_ok(),
        "initial mode sense"
    );

    let desired = engine.desired_mode_pages();
    let eenp = desired.eenp().context("desired list has no EENP page")?;
    assert!(eenp.sps_dev_supported);
    assert!(!eenp.include_drive_connectors);

    let r = engine.execute(Request::ModeSelect(desired.clone())).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert!(!engine.pending_flags().contains(PendingFlags::MODE_SELECT_NEEDED));

    let r = engine
        .execute(Request::ModeSense {
            page_code: EENP_PAGE_CODE,
        })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    let sensed = ModeParamList::parse(&r.data.context("mode sense returned no data")?)?;
    assert_eq!(sensed, desired);
    assert!(!engine.pending_flags().contains(PendingFlags::MODE_SELECT_NEEDED));
    Ok(())
}

#[tokio::test]
async fn resume_write_reads_back() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let payload = Bytes::from_static(b"RESUME-PROM");
    let r = engine
        .execute(Request::WriteResume {
            target: BufferTarget::Midplane,
            offset: 2,
            data: payload.clone(),
        })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);

    let r = engine
        .execute(Request::ReadResume {
            target: BufferTarget::Midplane,
            offset: 2,
            length: payload.len() as u32,
        })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data, Some(payload));

    let r = engine
        .execute(Request::GetResumePromSize {
            target: BufferTarget::Midplane,
        })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    let expected = sim.with(|s| s.buffers.get(&4).map_or(0, Vec::len)) as u32;
    assert_eq!(r.data.as_deref(), Some(&expected.to_be_bytes()[..]));
    Ok(())
}

#[tokio::test]
async fn resume_write_needs_a_writable_buffer() -> Result<()> {
    let engine = engine_with(load_config()?, SimEnclosure::new(EsesVersion::Cdes2));
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    // LCC A only exposes a read-only buffer
    let r = engine
        .execute(Request::WriteResume {
            target: BufferTarget::Lcc(SideId::A),
            offset: 0,
            data: Bytes::from_static(b"x"),
        })
        .await;
    assert_ne!(r.status, EnclosureStatus::Ok);
    assert_eq!(engine.in_flight_count(), 0);
    Ok(())
}
