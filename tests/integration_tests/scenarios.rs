// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end engine behavior against the simulated enclosure.

use std::{sync::Arc, time::Duration};

use anyhow::{Result, ensure};
use bytes::Bytes;
use eses_engine::{
    cfg::enums::{EsesVersion, PlatformKind},
    engine::{
        enclosure::PendingFlags,
        fup::{FirmwareTarget, FupPhase},
        model::DeviceModel,
        request::{FirmwareOp, Request},
        retry::RetryDecision,
    },
    models::{
        common::ComponentType,
        element::{Attribute, ComponentRef},
        pages::download::{FwExtStatus, FwStatus},
        scsi::{RequestStatus, SenseTriple},
        status::EnclosureStatus,
    },
};
use tokio::sync::{Semaphore, mpsc};

use crate::integration_tests::common::{
    Injected, SimEnclosure, SimEngine, engine, engine_with, load_config, sense,
};

async fn wait_outstanding(engine: &SimEngine, n: u32) -> Result<()> {
    for _ in 0..10_000 {
        if engine.outstanding_count() == n {
            return Ok(());
        }
        tokio::task::yield_now().await;
    }
    anyhow::bail!("outstanding never reached {n}, is {}", engine.outstanding_count())
}

#[tokio::test]
async fn inquiry_identifies_platform_once_serial_is_known() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.platform.platform = None;
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    sim.with(|s| s.serial = "UNKNOWN".into());
    let engine = engine_with(cfg, sim.clone());

    let r = engine.execute(Request::GetInquiryData).await;
    assert_eq!(r.status, EnclosureStatus::Busy);
    assert_eq!(engine.platform(), None);

    sim.with(|s| s.serial = "FCNCH0972C1234".into());
    let r = engine.execute(Request::GetInquiryData).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(engine.platform(), Some(PlatformKind::Viper));
    Ok(())
}

#[tokio::test]
async fn read_buffer_truncates_at_capacity() -> Result<()> {
    let engine = engine()?;

    let r = engine
        .execute(Request::ReadBuffer { buf_id: 4, offset: 4, length: 3 })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data.as_deref(), Some(&[4u8, 5, 6][..]));

    let r = engine
        .execute(Request::ReadBuffer { buf_id: 4, offset: 8, length: 9 })
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data.as_deref(), Some(&[8u8, 9][..]));
    Ok(())
}

#[tokio::test]
async fn unit_attention_forces_configuration_refresh() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());

    assert!(engine.execute(Request::GetConfiguration).await.is_ok());
    assert_eq!(engine.generation_code(), Some(1));

    sim.inject(Injected::CheckCondition(sense(0x06, 0x3F, 0x00)));
    sim.with(|s| s.generation = 2);
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::CmdFailed);
    assert_eq!(r.sense, Some(SenseTriple::new(0x06, 0x3F, 0x00)));
    assert!(engine.pending_flags().contains(PendingFlags::CONFIG_UNKNOWN));
    assert_eq!(engine.generation_code(), None);

    let r = engine.execute(Request::GetConfiguration).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(engine.generation_code(), Some(2));
    assert!(!engine.pending_flags().contains(PendingFlags::CONFIG_UNKNOWN));
    Ok(())
}

#[tokio::test]
async fn eleventh_request_is_turned_away() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.engine.max_outstanding_requests = 10;
    cfg.engine.in_flight_slots = 16;
    let hold = Arc::new(Semaphore::new(0));
    let sim = SimEnclosure::new(EsesVersion::Cdes2).held(hold.clone());
    let engine = Arc::new(engine_with(cfg, sim));

    let (tx, mut rx) = mpsc::unbounded_channel();
    for _ in 0..10 {
        let (e, tx) = (engine.clone(), tx.clone());
        tokio::spawn(async move {
            let _ = tx.send(e.execute(Request::GetInquiryData).await.status);
        });
    }
    wait_outstanding(&engine, 10).await?;

    let r = engine.execute(Request::GetInquiryData).await;
    assert_eq!(r.status, EnclosureStatus::Busy);
    assert_eq!(engine.outstanding_count(), 10);

    hold.add_permits(1);
    let first = rx.recv().await;
    assert_eq!(first, Some(EnclosureStatus::Ok));
    assert_eq!(engine.outstanding_count(), 9);

    // the freed slot admits the next request
    let (e, tx2) = (engine.clone(), tx.clone());
    tokio::spawn(async move {
        let _ = tx2.send(e.execute(Request::GetInquiryData).await.status);
    });
    wait_outstanding(&engine, 10).await?;

    hold.add_permits(16);
    for _ in 0..10 {
        assert_eq!(rx.recv().await, Some(EnclosureStatus::Ok));
    }
    assert_eq!(engine.outstanding_count(), 0);
    assert_eq!(engine.in_flight_count(), 0);
    Ok(())
}

#[tokio::test]
async fn admission_rejects_exactly_the_overflow() -> Result<()> {
    const N: usize = 25;
    let mut cfg = load_config()?;
    cfg.engine.max_outstanding_requests = 10;
    cfg.engine.in_flight_slots = 10;
    let hold = Arc::new(Semaphore::new(0));
    let engine = Arc::new(engine_with(
        cfg,
        SimEnclosure::new(EsesVersion::Cdes2).held(hold.clone()),
    ));

    let (tx, mut rx) = mpsc::unbounded_channel();
    for _ in 0..N {
        let (e, tx) = (engine.clone(), tx.clone());
        tokio::spawn(async move {
            let _ = tx.send(e.execute(Request::GetInquiryData).await.status);
        });
    }
    drop(tx);

    let mut busy = 0;
    while busy < N - 10 {
        let Some(status) = rx.recv().await else { break };
        assert_eq!(status, EnclosureStatus::Busy);
        assert!(engine.outstanding_count() <= 10);
        busy += 1;
    }
    assert_eq!(busy, N - 10);

    hold.add_permits(N);
    let mut ok = 0;
    while let Some(status) = rx.recv().await {
        assert_eq!(status, EnclosureStatus::Ok);
        ok += 1;
    }
    assert_eq!(ok, 10);
    assert_eq!(engine.outstanding_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lcc_activation_without_revision_change_times_out() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.engine.eses_version = EsesVersion::Cdes1;
    let sim = SimEnclosure::new(EsesVersion::Cdes1);
    let engine = engine_with(cfg, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let lcc = ComponentRef::new(ComponentType::Lcc, 0);
    assert_eq!(engine.model().get_text(lcc, Attribute::FwRevision)?, "0.54");

    let r = engine
        .execute(Request::DownloadFirmware(FirmwareOp::Activate {
            target: FirmwareTarget::LccMain,
            side: 0,
        }))
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(engine.fup_phase().await, FupPhase::Activating);

    sim.with(|s| s.download_status = 0x10);
    tokio::time::advance(Duration::from_secs(40)).await;
    assert!(engine.execute(Request::GetDownloadStatus).await.is_ok());
    assert_eq!(engine.fup_phase().await, FupPhase::Activating);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(engine.execute(Request::GetDownloadStatus).await.is_ok());
    assert_eq!(engine.fup_phase().await, FupPhase::Failed);
    assert_eq!(engine.fup_status().await, FwStatus::Fail);
    assert_eq!(engine.fup_additional_status().await, FwExtStatus::Timeout);
    Ok(())
}

#[tokio::test]
async fn firmware_image_goes_out_in_chunks() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let image = Bytes::from(vec![0x5A; 9000]);
    let op = FirmwareOp::Download {
        target: FirmwareTarget::LccMain,
        side: 0,
        image,
    };
    let mut statuses = Vec::new();
    for _ in 0..5 {
        let r = engine.execute(Request::DownloadFirmware(op.clone())).await;
        statuses.push(r.status);
        if r.status != EnclosureStatus::MoreProcessingRequired {
            break;
        }
    }
    assert_eq!(
        statuses,
        [
            EnclosureStatus::MoreProcessingRequired,
            EnclosureStatus::MoreProcessingRequired,
            EnclosureStatus::Ok,
        ]
    );
    assert_eq!(engine.fup_phase().await, FupPhase::Downloading);

    let sizes: Vec<usize> = sim.with(|s| s.sent_pages.iter().map(Bytes::len).collect());
    assert_eq!(sizes, [4096, 4096, 24 + 9000 - 2 * 4072]);
    Ok(())
}

#[tokio::test]
async fn transport_faults_surface_as_statuses() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());

    sim.inject(Injected::Reject);
    assert_eq!(
        engine.execute(Request::GetInquiryData).await.status,
        EnclosureStatus::PacketFailed
    );

    sim.inject(Injected::WrongCorrelation);
    assert_eq!(
        engine.execute(Request::GetInquiryData).await.status,
        EnclosureStatus::CdbRequestFailed
    );

    sim.inject(Injected::Busy);
    let r = engine.execute(Request::GetInquiryData).await;
    assert_eq!(r.status, EnclosureStatus::Busy);
    assert_eq!(r.retry.decision, RetryDecision::Retry);

    assert_eq!(engine.in_flight_count(), 0);
    Ok(())
}

#[tokio::test]
async fn port_request_status_overrides_good_scsi_status() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    sim.inject(Injected::RequestStatus(RequestStatus::Busy));
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::Busy);
    assert_eq!(r.model_updates, 0);

    sim.inject(Injected::RequestStatus(RequestStatus::Error));
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::CdbRequestFailed);
    assert_eq!(r.model_updates, 0);

    // a short transfer still carries a whole page
    sim.inject(Injected::RequestStatus(RequestStatus::DataUnderrun));
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert!(r.model_updates > 0);

    assert_eq!(engine.outstanding_count(), 0);
    Ok(())
}

#[tokio::test]
async fn trace_buffer_info_truncates_to_allocation() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");
    sim.with(|s| s.emc_status_page = Some(s.trace_buffer_page(&[(3, 1, 5), (4, 0, 5)])));

    // record count, then (buf_id, action, elem_index) per buffer
    let r = engine.execute(Request::GetTraceBufferInfo { allocation: 64 }).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data.as_deref(), Some(&[2u8, 3, 1, 5, 4, 0, 5][..]));

    let r = engine.execute(Request::GetTraceBufferInfo { allocation: 4 }).await;
    assert_eq!(r.status, EnclosureStatus::AllocatedMemoryInsufficient);
    assert_eq!(r.data.as_deref(), Some(&[2u8, 3, 1, 5][..]));
    Ok(())
}
