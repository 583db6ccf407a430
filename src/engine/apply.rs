// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Translation of decoded pages into device model writes.
//!
//! Element indices map onto components by first occurrence: the n-th
//! element of a given component type across all groups, in group order, is
//! component n of that type.

use std::collections::HashMap;

use crate::{
    cfg::enums::SideId,
    models::{
        common::{ComponentType, SubenclosureType},
        element::{AttrValue, AttrWrite, Attribute, ComponentRef},
        pages::{
            addl_status::{AdditionalStatusPage, AddlInfo},
            config::{ConfigPage, ElementGroup, Subenclosure},
            emc::EmcStatusPage,
            encl_status::{EnclosureStatusPage, StatusDetail},
            statistics::{ElementCounters, StatisticsPage},
            threshold::ThresholdInPage,
        },
    },
};

/// Buffer type of the resume PROM / EEPROM in buffer descriptors.
const BUF_TYPE_EEPROM: u8 = 0;
const NO_ELEMENT: u8 = 0xFF;

/// Component owning `elem_index` under the given layout.
pub fn component_of(groups: &[ElementGroup], elem_index: u8) -> Option<ComponentRef> {
    let mut seen: HashMap<ComponentType, usize> = HashMap::new();
    for g in groups {
        let Some(ty) = g.element_type().and_then(ComponentType::from_element) else {
            continue;
        };
        let base = seen.entry(ty).or_default();
        if g.contains(elem_index) {
            let n = (elem_index - g.first_elem_index) as usize;
            return Some(ComponentRef::new(ty, *base + n));
        }
        *base += g.num_possible_elems as usize;
    }
    None
}

/// Component counts implied by the layout.
pub fn component_counts(groups: &[ElementGroup]) -> Vec<(ComponentType, usize)> {
    let mut counts: Vec<(ComponentType, usize)> = Vec::new();
    for g in groups {
        let Some(ty) = g.element_type().and_then(ComponentType::from_element) else {
            continue;
        };
        match counts.iter_mut().find(|(t, _)| *t == ty) {
            Some((_, n)) => *n += g.num_possible_elems as usize,
            None => counts.push((ty, g.num_possible_elems as usize)),
        }
    }
    counts
}

fn subencl_component_type(t: SubenclosureType) -> Option<ComponentType> {
    match t {
        SubenclosureType::Lcc => Some(ComponentType::Lcc),
        SubenclosureType::PowerSupply => Some(ComponentType::PowerSupply),
        SubenclosureType::Cooling => Some(ComponentType::Cooling),
        SubenclosureType::Ups => Some(ComponentType::Sps),
        SubenclosureType::Chassis => Some(ComponentType::Enclosure),
        SubenclosureType::Other(_) => None,
    }
}

/// First component of the subenclosure's own type that lives in it.
fn subencl_component(groups: &[ElementGroup], s: &Subenclosure) -> Option<ComponentRef> {
    let ty = subencl_component_type(s.subencl_type)?;
    groups
        .iter()
        .filter(|g| g.subencl_id == s.subencl_id && g.num_possible_elems > 0)
        .filter(|g| g.element_type().and_then(ComponentType::from_element) == Some(ty))
        .find_map(|g| component_of(groups, g.first_elem_index))
}

fn revision_attr(comp_type: u8) -> Option<Attribute> {
    Some(match comp_type {
        0 => Attribute::FwRevisionExpander,
        1 => Attribute::FwRevisionBootLoader,
        2 => Attribute::FwRevisionInitString,
        3 => Attribute::FwRevisionFpga,
        4 | 6 | 7 | 8 => Attribute::FwRevision,
        10 => Attribute::FwRevisionSecondary,
        11 => Attribute::FwRevisionBattery,
        _ => return None,
    })
}

fn put(w: &mut Vec<AttrWrite>, c: ComponentRef, attr: Attribute, v: impl Into<AttrValue>) {
    w.push(AttrWrite {
        target: c,
        attr,
        value: v.into(),
    });
}

/// Topology, revisions and buffer ids from a Configuration page.
pub fn config_writes(page: &ConfigPage, local_side: SideId) -> Vec<AttrWrite> {
    let groups = &page.groups;
    let mut w = Vec::new();

    for g in groups {
        for n in 0..g.num_possible_elems {
            let idx = g.first_elem_index + n;
            if let Some(c) = component_of(groups, idx) {
                put(&mut w, c, Attribute::ElemIndex, idx);
                put(&mut w, c, Attribute::SubenclId, g.subencl_id);
            }
        }
    }

    for s in &page.subenclosures {
        let Some(c) = subencl_component(groups, s) else {
            continue;
        };
        if !s.serial_number.is_empty() {
            put(&mut w, c, Attribute::SerialNumber, s.serial_number.as_str());
        }
        if !s.product_id.is_empty() {
            put(&mut w, c, Attribute::ProductId, s.product_id.as_str());
        }
        if c.ty == ComponentType::Lcc {
            put(&mut w, c, Attribute::Side, s.side);
            put(&mut w, c, Attribute::IsLocal, s.side == local_side.index());
        }
        if c.ty == ComponentType::PowerSupply {
            let subelems: usize = groups
                .iter()
                .filter(|g| g.subencl_id == s.subencl_id)
                .filter(|g| {
                    g.element_type().and_then(ComponentType::from_element)
                        == Some(ComponentType::PowerSupply)
                })
                .map(|g| g.num_possible_elems as usize)
                .sum();
            put(&mut w, c, Attribute::PsSubelementCount, subelems as u8);
        }
        for v in &s.versions {
            if let Some(attr) = revision_attr(v.comp_type) {
                put(&mut w, c, attr, v.revision.as_str());
            }
        }
        if let Some(b) = s.buffers.iter().find(|b| b.buf_type == BUF_TYPE_EEPROM) {
            put(&mut w, c, Attribute::BufferId, b.buf_id);
            if b.writable {
                put(&mut w, c, Attribute::BufferIdWritable, b.buf_id);
            }
        }
    }
    w
}

/// Health and presence from the Enclosure Status page.
pub fn status_writes(page: &EnclosureStatusPage, groups: &[ElementGroup]) -> Vec<AttrWrite> {
    let mut w = Vec::new();
    for e in page.individual() {
        let Some(c) = e.elem_index.and_then(|i| component_of(groups, i)) else {
            continue;
        };
        put(&mut w, c, Attribute::StatusCode, u8::from(e.code));
        put(&mut w, c, Attribute::Inserted, e.code.is_inserted());
        put(&mut w, c, Attribute::Swap, e.swap);
        put(&mut w, c, Attribute::PrdFail, e.prdfail);
        match e.detail {
            StatusDetail::PowerSupply { ident, off, fail, .. } => {
                put(&mut w, c, Attribute::Identify, ident);
                put(&mut w, c, Attribute::PoweredOff, off);
                put(&mut w, c, Attribute::Faulted, fail);
            },
            StatusDetail::Cooling { ident, speed_rpm, fail, .. } => {
                put(&mut w, c, Attribute::Identify, ident);
                put(&mut w, c, Attribute::FanSpeedRpm, speed_rpm);
                put(&mut w, c, Attribute::Faulted, fail);
            },
            StatusDetail::TempSensor { ident, temperature, .. } => {
                put(&mut w, c, Attribute::Identify, ident);
                if let Some(t) = temperature {
                    put(&mut w, c, Attribute::Temperature, t);
                }
            },
            StatusDetail::EscElectronics { ident, fail, .. }
            | StatusDetail::SasExpander { ident, fail }
            | StatusDetail::SasConnector { ident, fail, .. }
            | StatusDetail::Display { ident, fail, .. }
            | StatusDetail::Ups { ident, fail, .. } => {
                put(&mut w, c, Attribute::Identify, ident);
                put(&mut w, c, Attribute::Faulted, fail);
            },
            StatusDetail::ArrayDeviceSlot {
                ident,
                device_off,
                fault_sensed,
                ..
            } => {
                put(&mut w, c, Attribute::Identify, ident);
                put(&mut w, c, Attribute::PoweredOff, device_off);
                put(&mut w, c, Attribute::Faulted, fault_sensed);
            },
            StatusDetail::ExpanderPhy { phy_id, link_ready, .. } => {
                put(&mut w, c, Attribute::PhyId, phy_id);
                put(&mut w, c, Attribute::LinkReady, link_ready);
            },
            StatusDetail::Enclosure {
                ident,
                failure_indication,
                ..
            } => {
                put(&mut w, c, Attribute::Identify, ident);
                put(&mut w, c, Attribute::Faulted, failure_indication);
            },
            StatusDetail::Raw(_) => {},
        }
    }
    w
}

/// Phy, slot and connector mapping plus SAS addresses.
pub fn addl_status_writes(page: &AdditionalStatusPage, groups: &[ElementGroup]) -> Vec<AttrWrite> {
    let mut w = Vec::new();
    for d in page.descriptors.iter().filter(|d| d.elem_index_present && !d.invalid) {
        let Some(c) = component_of(groups, d.elem_index) else {
            continue;
        };
        match &d.info {
            AddlInfo::ArrayDeviceSlot {
                slot_number, phys, ..
            } => {
                put(&mut w, c, Attribute::SlotNumber, *slot_number);
                if let Some(p) = phys.first() {
                    put(&mut w, c, Attribute::SasAddress, p.sas_address);
                    put(&mut w, c, Attribute::AttachedSasAddress, p.attached_sas_address);
                    put(&mut w, c, Attribute::PhyId, p.phy_id);
                }
            },
            AddlInfo::SasExpander { sas_address, phys } => {
                put(&mut w, c, Attribute::SasAddress, *sas_address);
                for (i, p) in phys.iter().enumerate() {
                    let phy_index = i as u8;
                    let phy = ComponentRef::new(ComponentType::ExpanderPhy, i);
                    put(&mut w, phy, Attribute::PhyIndex, phy_index);
                    if p.connector_elem_index != NO_ELEMENT {
                        put(&mut w, phy, Attribute::ConnectorIndex, p.connector_elem_index);
                        if let Some(conn) = component_of(groups, p.connector_elem_index) {
                            put(&mut w, conn, Attribute::PhyIndex, phy_index);
                        }
                    }
                    if let Some(other) = (p.other_elem_index != NO_ELEMENT)
                        .then(|| component_of(groups, p.other_elem_index))
                        .flatten()
                        .filter(|o| o.ty == ComponentType::DriveSlot)
                    {
                        put(&mut w, other, Attribute::PhyIndex, phy_index);
                    }
                }
            },
            AddlInfo::EscElectronics { phys } => {
                if let Some(p) = phys.first() {
                    put(&mut w, c, Attribute::SasAddress, p.sas_address);
                }
            },
            AddlInfo::Other { .. } => {},
        }
    }
    w
}

/// Connector attachment, trace buffers and shutdown reason.
pub fn emc_status_writes(page: &EmcStatusPage, groups: &[ElementGroup]) -> Vec<AttrWrite> {
    let mut w = Vec::new();
    let encl = ComponentRef::new(ComponentType::Enclosure, 0);
    put(&mut w, encl, Attribute::ShutdownReason, page.shutdown_reason);

    for s in page.sas_connectors() {
        let Some(c) = component_of(groups, s.conn_elem_index) else {
            continue;
        };
        put(&mut w, c, Attribute::AttachedSasAddress, s.attached_sas_address);
        put(&mut w, c, Attribute::ConnectorId, s.conn_id);
        put(&mut w, c, Attribute::AttachedSubenclId, s.attached_subencl_id);
    }

    let mut traces = 0u8;
    for t in page.trace_buffers() {
        traces = traces.saturating_add(1);
        if let Some(c) = component_of(groups, t.elem_index) {
            put(&mut w, c, Attribute::TraceBufferStatus, t.action);
        }
    }
    put(&mut w, encl, Attribute::TraceBufferCount, traces);
    w
}

fn counter(
    w: &mut Vec<AttrWrite>,
    c: ComponentRef,
    name: &'static str,
    v: impl Into<AttrValue>,
) {
    put(w, c, Attribute::Counter(name), v);
}

pub fn statistics_writes(page: &StatisticsPage, groups: &[ElementGroup]) -> Vec<AttrWrite> {
    let mut w = Vec::new();
    for e in &page.elements {
        let Some(c) = e.elem_index.and_then(|i| component_of(groups, i)) else {
            continue;
        };
        match &e.counters {
            ElementCounters::PowerSupply {
                dc_over,
                dc_under,
                fail,
                over_temp_fail,
                ac_fail,
                dc_fail,
            } => {
                counter(&mut w, c, "dc_over", *dc_over);
                counter(&mut w, c, "dc_under", *dc_under);
                counter(&mut w, c, "fail", *fail);
                counter(&mut w, c, "over_temp_fail", *over_temp_fail);
                counter(&mut w, c, "ac_fail", *ac_fail);
                counter(&mut w, c, "dc_fail", *dc_fail);
            },
            ElementCounters::Cooling { fail } => counter(&mut w, c, "fail", *fail),
            ElementCounters::TempSensor {
                over_temp_fail,
                over_temp_warn,
            } => {
                counter(&mut w, c, "over_temp_fail", *over_temp_fail);
                counter(&mut w, c, "over_temp_warn", *over_temp_warn);
            },
            ElementCounters::ExpanderPhy(p) => {
                counter(&mut w, c, "invalid_dword", p.invalid_dword);
                counter(&mut w, c, "disparity_error", p.disparity_error);
                counter(&mut w, c, "loss_dword_sync", p.loss_dword_sync);
                counter(&mut w, c, "phy_reset_fail", p.phy_reset_fail);
                counter(&mut w, c, "code_violation", p.code_violation);
                counter(&mut w, c, "phy_change", p.phy_change);
                counter(&mut w, c, "crc_pmon_accum", p.crc_pmon_accum);
                counter(&mut w, c, "in_connect_crc", p.in_connect_crc);
            },
            ElementCounters::ArrayDeviceSlot {
                insert_count,
                power_down_count,
            } => {
                counter(&mut w, c, "insert_count", *insert_count);
                counter(&mut w, c, "power_down_count", *power_down_count);
            },
            ElementCounters::SasExpander { exp_change } => {
                counter(&mut w, c, "exp_change", *exp_change)
            },
            ElementCounters::Raw(_) => {},
        }
    }
    w
}

pub fn threshold_writes(page: &ThresholdInPage, groups: &[ElementGroup]) -> Vec<AttrWrite> {
    let mut w = Vec::new();
    for e in &page.elements {
        let Some(c) = e.elem_index.and_then(|i| component_of(groups, i)) else {
            continue;
        };
        let t = e.thresholds;
        put(&mut w, c, Attribute::ThresholdHighCritical, t.high_critical);
        put(&mut w, c, Attribute::ThresholdHighWarning, t.high_warning);
        put(&mut w, c, Attribute::ThresholdLowWarning, t.low_warning);
        put(&mut w, c, Attribute::ThresholdLowCritical, t.low_critical);
    }
    w
}

/// Compact trace buffer records: a count byte, then `[buf_id, action,
/// elem_index]` per buffer.
pub fn trace_buffer_records(page: &EmcStatusPage) -> Vec<u8> {
    let bufs: Vec<_> = page.trace_buffers().collect();
    let mut out = Vec::with_capacity(1 + 3 * bufs.len());
    out.push(bufs.len().min(u8::MAX as usize) as u8);
    for t in bufs {
        out.extend_from_slice(&[t.buf_id, t.action, t.elem_index]);
    }
    out
}
