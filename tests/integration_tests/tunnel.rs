// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, ensure};
use bytes::Bytes;
use eses_engine::{
    cfg::enums::EsesVersion,
    engine::{enclosure::PendingFlags, model::DeviceModel, request::Request, retry::RetryDecision},
    models::{
        common::ComponentType,
        element::{Attribute, ComponentRef},
        status::EnclosureStatus,
    },
};

use crate::integration_tests::common::{Injected, SimEnclosure, engine_with, load_config};

#[tokio::test]
async fn tunnelled_download_status_completes_through_polls() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let payload = sim.with(|s| {
        s.download_status = 0x13;
        let p = s.download_status_page();
        s.tunnel_payload = p.clone();
        p
    });

    let r = engine.execute(Request::TunnelGetDownloadStatus).await;
    assert_eq!(r.status, EnclosureStatus::MoreProcessingRequired);
    assert_eq!(r.retry.decision, RetryDecision::NoAction);
    assert_eq!(sim.with(|s| s.sent_pages.last().map(|p| p[0])), Some(0x83));

    let r = engine.execute(Request::GetTunnelCommandStatus).await;
    assert_eq!(r.status, EnclosureStatus::MoreProcessingRequired);
    assert_eq!(r.retry.decision, RetryDecision::Retry);

    let r = engine.execute(Request::GetTunnelCommandStatus).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data, Some(Bytes::from(payload)));

    // nothing left parked: a further poll has no parent to report on
    sim.with(|s| s.tunnel_payload = vec![0x0E, 0, 0, 0]);
    let r = engine.execute(Request::GetTunnelCommandStatus).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert_eq!(r.data.as_deref(), Some(&[0x0Eu8, 0, 0, 0][..]));
    Ok(())
}

#[tokio::test]
async fn foreign_completion_is_dropped() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());

    sim.inject(Injected::WrongCorrelation);
    let r = engine.execute(Request::GetConfiguration).await;
    assert_eq!(r.status, EnclosureStatus::CdbRequestFailed);
    assert_eq!(engine.generation_code(), None);
    assert_eq!(engine.in_flight_count(), 0);
    Ok(())
}

#[tokio::test]
async fn rejected_transport_reports_packet_failure() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    sim.inject(Injected::Reject);
    let r = engine.execute(Request::TunnelGetConfiguration).await;
    assert_eq!(r.status, EnclosureStatus::PacketFailed);
    assert_eq!(engine.outstanding_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unsupported_additional_status_falls_back_to_platform_map() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    sim.with(|s| s.addl_status_supported = false);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let r = engine.execute(Request::GetAdditionalStatus).await;
    assert_eq!(r.status, EnclosureStatus::UnsupportedPageHandled);

    let flags = engine.pending_flags();
    assert!(flags.contains(PendingFlags::ADDL_STATUS_UNSUPPORTED));
    assert!(flags.contains(PendingFlags::FALLBACK_MAPPED));
    assert!(!flags.contains(PendingFlags::MAPPING_UPDATE));

    let model = engine.model();
    let get = |ty, i, attr| model.get_u8(ComponentRef::new(ty, i), attr);
    let is = |ty, i, attr| model.get_bool(ComponentRef::new(ty, i), attr);

    // Viper side-A slot wiring for the four slots the enclosure reports
    let phys = (0..4)
        .map(|slot| get(ComponentType::DriveSlot, slot, Attribute::PhyIndex))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(phys, [20, 22, 23, 21]);

    // 20 connector elements, 10 per LCC, in groups of entire + 4 lanes
    assert_eq!(model.component_count(ComponentType::Connector), 20);
    assert_eq!(get(ComponentType::Connector, 2, Attribute::Side)?, 0);
    assert_eq!(get(ComponentType::Connector, 2, Attribute::ConnectorId)?, 0);
    assert!(!is(ComponentType::Connector, 2, Attribute::EntireConnector)?);
    assert_eq!(get(ComponentType::Connector, 2, Attribute::PhyIndex)?, 5);
    assert!(is(ComponentType::Connector, 2, Attribute::IsLocal)?);

    assert_eq!(get(ComponentType::Connector, 15, Attribute::Side)?, 1);
    assert_eq!(get(ComponentType::Connector, 15, Attribute::ConnectorId)?, 1);
    assert!(is(ComponentType::Connector, 15, Attribute::EntireConnector)?);
    assert!(!is(ComponentType::Connector, 15, Attribute::IsLocal)?);
    assert_eq!(get(ComponentType::Connector, 17, Attribute::PhyIndex)?, 1);

    assert!(is(ComponentType::Lcc, 0, Attribute::IsLocal)?);
    assert!(!is(ComponentType::Lcc, 1, Attribute::IsLocal)?);
    Ok(())
}

#[tokio::test]
async fn tunnelled_configuration_is_polled_after_send() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    let r = engine.execute(Request::TunnelGetConfiguration).await;
    assert_eq!(r.status, EnclosureStatus::MoreProcessingRequired);
    assert_eq!(r.retry.decision, RetryDecision::NoAction);
    assert_eq!(sim.with(|s| s.sent_pages.len()), 1);

    let r = engine.execute(Request::GetTunnelCommandStatus).await;
    assert_eq!(r.status, EnclosureStatus::MoreProcessingRequired);
    assert_eq!(r.retry.decision, RetryDecision::Retry);
    assert_eq!(sim.with(|s| s.sent_pages.len()), 1);
    Ok(())
}

#[tokio::test]
async fn truncated_additional_status_descriptor_is_page_invalid() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    // descriptor length 0 claims less than its own 4-byte header
    sim.with(|s| s.addl_status_page = Some(vec![0x0A, 0, 0, 8, 0, 0, 0, 1, 0x11, 0, 0, 0]));
    let r = engine.execute(Request::GetAdditionalStatus).await;
    assert_eq!(r.status, EnclosureStatus::PageInvalid);
    assert_eq!(r.model_updates, 0);
    assert!(!engine.pending_flags().contains(PendingFlags::MAPPING_UPDATE));
    assert_eq!(engine.outstanding_count(), 0);
    Ok(())
}
