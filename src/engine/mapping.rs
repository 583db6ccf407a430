// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Built-in wiring tables and the analytic phy/slot/connector mapping used
//! when the enclosure does not report Additional Element Status or the EMC
//! Enclosure status page.
//!
//! Connector elements are laid out per LCC as groups of `lanes + 1`: one
//! entire-connector element followed by one element per lane. The first
//! half of the connector elements belongs to LCC A, the rest to LCC B.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::info;

use crate::{
    cfg::enums::{PlatformKind, SideId},
    engine::model::DeviceModel,
    models::{
        common::ComponentType,
        element::{AttrWrite, Attribute},
        status::ModelError,
    },
};

/// Connector lane wired to nothing.
pub const PHY_UNDEFINED: u8 = 0xFF;

#[derive(Debug)]
pub struct PlatformTable {
    pub kind: PlatformKind,
    pub num_slots: usize,
    pub num_phys: usize,
    /// Connector elements in the whole enclosure.
    pub encl_connectors: usize,
    /// Connector elements per LCC.
    pub lcc_connectors: usize,
    pub lanes_per_connector: usize,
    /// Drive slot to expander phy index, per side.
    pub slot_phy: [&'static [u8]; 2],
    /// Entire connector to the phy index of each lane.
    pub connector_phy: &'static [[u8; 4]],
}

impl PlatformTable {
    /// Phy id reported for an expander phy index. The supported platforms
    /// number their phys in index order.
    #[inline]
    pub fn phy_id(&self, phy_index: u8) -> u8 {
        phy_index
    }

    pub fn slot_to_phy(&self, side: SideId, slot: usize) -> Option<u8> {
        self.slot_phy[side.index() as usize].get(slot).copied()
    }

    /// Phy behind `lane` (1-based) of entire connector `connector`.
    pub fn connector_lane_phy(&self, connector: usize, lane: usize) -> Option<u8> {
        let phy = *self.connector_phy.get(connector)?.get(lane.checked_sub(1)?)?;
        (phy != PHY_UNDEFINED).then_some(phy)
    }
}

static TABLES: Lazy<HashMap<PlatformKind, PlatformTable>> = Lazy::new(|| {
    [
        PlatformTable {
            kind: PlatformKind::Viper,
            num_slots: 15,
            num_phys: 36,
            encl_connectors: 20,
            lcc_connectors: 10,
            lanes_per_connector: 4,
            slot_phy: [
                &[20, 22, 23, 21, 19, 18, 17, 16, 15, 14, 13, 12, 11, 10, 9],
                &[9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 21, 23, 22, 20],
            ],
            connector_phy: &[[4, 5, 6, 7], [0, 1, 2, 3]],
        },
        PlatformTable {
            kind: PlatformKind::Pinecone,
            num_slots: 12,
            num_phys: 24,
            encl_connectors: 20,
            lcc_connectors: 10,
            lanes_per_connector: 4,
            slot_phy: [
                &[19, 20, 21, 22, 15, 18, 23, 16, 17, 14, 13, 12],
                &[12, 13, 14, 17, 16, 23, 18, 15, 22, 21, 20, 19],
            ],
            connector_phy: &[[0, 1, 2, 3], [4, 5, 6, 7]],
        },
        PlatformTable {
            kind: PlatformKind::Magnum,
            num_slots: 15,
            num_phys: 24,
            encl_connectors: 10,
            lcc_connectors: 5,
            lanes_per_connector: 4,
            slot_phy: [
                &[4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18],
                &[4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18],
            ],
            connector_phy: &[[0, 1, 2, 3], [PHY_UNDEFINED; 4]],
        },
    ]
    .into_iter()
    .map(|t| (t.kind, t))
    .collect()
});

pub fn platform_table(kind: PlatformKind) -> Option<&'static PlatformTable> {
    TABLES.get(&kind)
}

/// Position of connector element `i` (0-based, enclosure wide).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorSlot {
    pub side: SideId,
    /// Entire connector number within the LCC.
    pub connector_id: usize,
    /// 0 for the entire-connector element, 1..=lanes for a lane.
    pub lane: usize,
}

pub fn connector_slot(table: &PlatformTable, total: usize, i: usize) -> ConnectorSlot {
    let side = if i < total / 2 { SideId::A } else { SideId::B };
    let per_lcc = table.lcc_connectors.max(1);
    let pos = i % per_lcc;
    let group = table.lanes_per_connector + 1;
    ConnectorSlot {
        side,
        connector_id: pos / group,
        lane: pos % group,
    }
}

/// Write the mapping attributes derivable from `table` into `model`.
/// Returns the number of values that changed.
pub fn apply_fallback(
    model: &dyn DeviceModel,
    table: &PlatformTable,
    local_side: SideId,
) -> Result<usize, ModelError> {
    let ensure_count = |ty, n| {
        if model.component_count(ty) == 0 {
            model.set_component_count(ty, n);
        }
        model.component_count(ty)
    };
    let slots = ensure_count(ComponentType::DriveSlot, table.num_slots).min(table.num_slots);
    let connectors = ensure_count(ComponentType::Connector, table.encl_connectors);
    let phys = ensure_count(ComponentType::ExpanderPhy, table.num_phys);

    let mut writes = Vec::with_capacity(2 * slots + 4 * connectors + 2 * phys + 2);
    for slot in 0..slots {
        let Some(phy) = table.slot_to_phy(local_side, slot) else {
            continue;
        };
        writes.push(AttrWrite::new(ComponentType::DriveSlot, slot, Attribute::SlotNumber, slot as u8));
        writes.push(AttrWrite::new(ComponentType::DriveSlot, slot, Attribute::PhyIndex, phy));
    }

    for i in 0..connectors {
        let cs = connector_slot(table, connectors, i);
        let is_local = cs.side == local_side;
        writes.push(AttrWrite::new(ComponentType::Connector, i, Attribute::Side, cs.side.index()));
        writes.push(AttrWrite::new(ComponentType::Connector, i, Attribute::IsLocal, is_local));
        writes.push(AttrWrite::new(
            ComponentType::Connector,
            i,
            Attribute::ConnectorId,
            cs.connector_id as u8,
        ));
        writes.push(AttrWrite::new(
            ComponentType::Connector,
            i,
            Attribute::EntireConnector,
            cs.lane == 0,
        ));
        if let Some(phy) = table.connector_lane_phy(cs.connector_id, cs.lane) {
            writes.push(AttrWrite::new(ComponentType::Connector, i, Attribute::PhyIndex, phy));
        }
    }

    for p in 0..phys {
        let idx = p as u8;
        writes.push(AttrWrite::new(ComponentType::ExpanderPhy, p, Attribute::PhyIndex, idx));
        writes.push(AttrWrite::new(ComponentType::ExpanderPhy, p, Attribute::PhyId, table.phy_id(idx)));
    }

    for side in [SideId::A, SideId::B] {
        if (side.index() as usize) < model.component_count(ComponentType::Lcc) {
            writes.push(AttrWrite::new(
                ComponentType::Lcc,
                side.index() as usize,
                Attribute::IsLocal,
                side == local_side,
            ));
        }
    }

    let changed = model.apply_batch(writes)?;
    info!(platform = %table.kind, %local_side, changed, "applied fallback mapping");
    Ok(changed)
}
