// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, ensure};
use eses_engine::{
    cfg::enums::EsesVersion,
    engine::{enclosure::PendingFlags, model::DeviceModel, request::Request},
    models::{
        common::ComponentType,
        element::{Attribute, ComponentRef},
        pages::encl_status::{ControlAction, ControlElement},
        status::EnclosureStatus,
    },
};

use crate::integration_tests::common::{SimEnclosure, engine_with, load_config};

fn slot(n: usize) -> ComponentRef {
    ComponentRef::new(ComponentType::DriveSlot, n)
}

#[tokio::test]
async fn stale_status_page_leaves_model_untouched() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");
    assert_eq!(engine.model().component_count(ComponentType::DriveSlot), 4);

    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert!(r.model_updates > 0);
    let model = engine.model();
    assert!(!model.get_bool(slot(1), Attribute::Inserted)?);
    assert!(model.get_bool(slot(2), Attribute::Inserted)?);

    // enclosure moved on without us reading the new configuration
    sim.with(|s| {
        s.page_generation = Some(7);
        s.empty_slot = 2;
    });
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::ConfigurationUnknown);
    assert_eq!(r.model_updates, 0);
    assert!(!model.get_bool(slot(1), Attribute::Inserted)?);
    assert!(model.get_bool(slot(2), Attribute::Inserted)?);
    assert!(engine.pending_flags().contains(PendingFlags::CONFIG_UNKNOWN));
    assert_eq!(engine.generation_code(), None);

    // every generation-carrying page is stale until the refresh
    sim.with(|s| s.page_generation = None);
    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::ConfigurationUnknown);

    sim.with(|s| s.generation = 7);
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "refresh");
    assert_eq!(engine.generation_code(), Some(7));

    let r = engine.execute(Request::GetStatus).await;
    assert_eq!(r.status, EnclosureStatus::Ok);
    assert!(model.get_bool(slot(1), Attribute::Inserted)?);
    assert!(!model.get_bool(slot(2), Attribute::Inserted)?);
    Ok(())
}

#[tokio::test]
async fn control_pages_carry_the_held_generation() -> Result<()> {
    let sim = SimEnclosure::new(EsesVersion::Cdes2);
    let engine = engine_with(load_config()?, sim.clone());
    sim.with(|s| s.generation = 0x1234);
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");

    // element 2 is the second drive slot
    let r = engine
        .execute(Request::SetEnclosureControl(vec![ControlElement::new(
            2,
            ControlAction::Identify(true),
        )]))
        .await;
    assert_eq!(r.status, EnclosureStatus::Ok);

    let sent = sim.with(|s| s.sent_pages.last().cloned());
    let sent = sent.ok_or_else(|| anyhow::anyhow!("no page sent"))?;
    assert_eq!(sent[0], 0x02);
    assert_eq!(&sent[4..8], &0x1234u32.to_be_bytes());
    Ok(())
}

#[tokio::test]
async fn temperature_lands_in_the_model() -> Result<()> {
    let engine = engine_with(load_config()?, SimEnclosure::new(EsesVersion::Cdes2));
    ensure!(engine.execute(Request::GetConfiguration).await.is_ok(), "config");
    ensure!(engine.execute(Request::GetStatus).await.is_ok(), "status");

    let sensor = ComponentRef::new(ComponentType::TempSensor, 0);
    let attrs = engine.model().attributes_of(sensor);
    assert!(
        attrs.iter().any(|(a, _)| *a == Attribute::Temperature),
        "no temperature in {attrs:?}"
    );
    Ok(())
}
