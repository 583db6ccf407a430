// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Enclosure Status (02h, receive) and Enclosure Control (02h, send).
//!
//! Both pages are an 8-byte header followed by one 4-byte element per slot
//! of the configuration layout: for every type descriptor header an overall
//! element, then `num_possible_elems` individual elements.

use anyhow::{Result, anyhow, bail, ensure};
use bytes::BytesMut;
use serde::Serialize;

use crate::models::{
    common::{ElementStatusCode, ElementType, PAGE_HEADER_LEN, PageCode, PageHeader},
    pages::{DecodeContext, EsesPage},
};

const ELEM_LEN: usize = 4;

/// Byte 1 of the status page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnclosureSummary {
    pub unrecoverable: bool,
    pub critical: bool,
    pub non_critical: bool,
    pub info: bool,
}

impl From<u8> for EnclosureSummary {
    fn from(b: u8) -> Self {
        Self {
            unrecoverable: b & 0x01 != 0,
            critical: b & 0x02 != 0,
            non_critical: b & 0x04 != 0,
            info: b & 0x08 != 0,
        }
    }
}

/// Element-specific bytes 1..3 decoded according to the element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusDetail {
    PowerSupply {
        ident: bool,
        dc_over_current: bool,
        dc_under_voltage: bool,
        dc_over_voltage: bool,
        dc_fail: bool,
        ac_fail: bool,
        temp_warn: bool,
        over_temp_fail: bool,
        off: bool,
        requested_on: bool,
        fail: bool,
    },
    Cooling {
        ident: bool,
        /// Fan speed in RPM.
        speed_rpm: u16,
        speed_code: u8,
        off: bool,
        requested_on: bool,
        fail: bool,
    },
    TempSensor {
        ident: bool,
        /// Degrees Celsius; `None` when the sensor reports 0.
        temperature: Option<i16>,
        over_temp_warning: bool,
        over_temp_failure: bool,
    },
    EscElectronics {
        ident: bool,
        fail: bool,
        /// Set on the LCC that produced the page.
        report: bool,
        hot_swap: bool,
    },
    ArrayDeviceSlot {
        ok: bool,
        ident: bool,
        remove: bool,
        ready_to_insert: bool,
        do_not_remove: bool,
        device_off: bool,
        fault_requested: bool,
        fault_sensed: bool,
    },
    ExpanderPhy {
        expander_index: u8,
        phy_id: u8,
        force_disabled: bool,
        carrier_detect: bool,
        sata_spinup_hold: bool,
        spinup_enabled: bool,
        link_ready: bool,
        phy_ready: bool,
    },
    SasConnector {
        ident: bool,
        connector_type: u8,
        physical_link: u8,
        fail: bool,
    },
    SasExpander {
        ident: bool,
        fail: bool,
    },
    Ups {
        battery_status: u8,
        ac_fail: bool,
        dc_fail: bool,
        ups_fail: bool,
        warn: bool,
        interface_fail: bool,
        battery_fail: bool,
        fail: bool,
        ident: bool,
    },
    Enclosure {
        ident: bool,
        warning_indication: bool,
        failure_indication: bool,
        time_until_power_cycle: u8,
        warning_requested: bool,
        failure_requested: bool,
        power_off_duration: u8,
    },
    Display {
        ident: bool,
        fail: bool,
        mode: u8,
        character: u8,
    },
    Raw([u8; 3]),
}

impl StatusDetail {
    fn decode(elem_type: Option<ElementType>, e: &[u8]) -> Self {
        let bit = |byte: usize, n: u8| e[byte] & (1 << n) != 0;
        match elem_type {
            Some(ElementType::PowerSupply) => StatusDetail::PowerSupply {
                ident: bit(1, 7),
                dc_over_current: bit(2, 1),
                dc_under_voltage: bit(2, 2),
                dc_over_voltage: bit(2, 3),
                dc_fail: bit(3, 0),
                ac_fail: bit(3, 1),
                temp_warn: bit(3, 2),
                over_temp_fail: bit(3, 3),
                off: bit(3, 4),
                requested_on: bit(3, 5),
                fail: bit(3, 6),
            },
            Some(ElementType::Cooling) => StatusDetail::Cooling {
                ident: bit(1, 7),
                speed_rpm: ((((e[1] & 0x03) as u16) << 8) | e[2] as u16) * 10,
                speed_code: e[3] & 0x07,
                off: bit(3, 4),
                requested_on: bit(3, 5),
                fail: bit(3, 6),
            },
            Some(ElementType::TempSensor) => StatusDetail::TempSensor {
                ident: bit(1, 7),
                temperature: (e[2] != 0).then(|| e[2] as i16 - 20),
                over_temp_warning: bit(3, 2),
                over_temp_failure: bit(3, 3),
            },
            Some(ElementType::EscElectronics) => StatusDetail::EscElectronics {
                ident: bit(1, 7),
                fail: bit(1, 6),
                report: bit(2, 0),
                hot_swap: bit(3, 7),
            },
            Some(ElementType::ArrayDeviceSlot) => StatusDetail::ArrayDeviceSlot {
                ok: bit(1, 7),
                ident: bit(2, 1),
                remove: bit(2, 2),
                ready_to_insert: bit(2, 3),
                do_not_remove: bit(2, 6),
                device_off: bit(3, 4),
                fault_requested: bit(3, 5),
                fault_sensed: bit(3, 6),
            },
            Some(ElementType::ExpanderPhy) => StatusDetail::ExpanderPhy {
                expander_index: e[1],
                phy_id: e[2] & 0x7F,
                force_disabled: bit(2, 7),
                carrier_detect: bit(3, 3),
                sata_spinup_hold: bit(3, 4),
                spinup_enabled: bit(3, 5),
                link_ready: bit(3, 6),
                phy_ready: bit(3, 7),
            },
            Some(ElementType::SasConnector) => StatusDetail::SasConnector {
                ident: bit(1, 7),
                connector_type: e[1] & 0x7F,
                physical_link: e[2],
                fail: bit(3, 6),
            },
            Some(ElementType::SasExpander) => StatusDetail::SasExpander {
                ident: bit(1, 7),
                fail: bit(1, 6),
            },
            Some(ElementType::Ups) => StatusDetail::Ups {
                battery_status: e[1],
                interface_fail: bit(2, 0),
                warn: bit(2, 1),
                ups_fail: bit(2, 2),
                dc_fail: bit(2, 3),
                ac_fail: bit(2, 4),
                battery_fail: bit(3, 1),
                fail: bit(3, 6),
                ident: bit(3, 7),
            },
            Some(ElementType::Enclosure) => StatusDetail::Enclosure {
                ident: bit(1, 7),
                warning_indication: bit(2, 0),
                failure_indication: bit(2, 1),
                time_until_power_cycle: e[2] >> 2,
                warning_requested: bit(3, 0),
                failure_requested: bit(3, 1),
                power_off_duration: e[3] >> 2,
            },
            Some(ElementType::Display) => StatusDetail::Display {
                ident: bit(1, 7),
                fail: bit(1, 6),
                mode: e[1] & 0x03,
                character: e[2],
            },
            Some(ElementType::Alarm | ElementType::Language) | None => {
                StatusDetail::Raw([e[1], e[2], e[3]])
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementStatus {
    pub elem_type: u8,
    pub subencl_id: u8,
    /// `None` for the overall element of a group.
    pub elem_index: Option<u8>,
    pub code: ElementStatusCode,
    pub swap: bool,
    pub prdfail: bool,
    pub detail: StatusDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnclosureStatusPage {
    pub header: PageHeader,
    pub summary: EnclosureSummary,
    pub elements: Vec<ElementStatus>,
}

impl EsesPage for EnclosureStatusPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

impl EnclosureStatusPage {
    pub fn parse(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::EnclosureControlStatus as u8,
            "expected enclosure status page 0x02, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        let mut elements = Vec::new();
        for g in ctx.groups {
            let elem_type = g.element_type();
            for slot in 0..=g.num_possible_elems as usize {
                let off = g.byte_offset as usize + slot * ELEM_LEN;
                let Some(e) = buf.get(off..off + ELEM_LEN).filter(|_| off + ELEM_LEN <= end)
                else {
                    bail!(
                        "status element at {off} for type 0x{:02X} beyond page end {end}",
                        g.elem_type
                    );
                };
                elements.push(ElementStatus {
                    elem_type: g.elem_type,
                    subencl_id: g.subencl_id,
                    elem_index: slot.checked_sub(1).map(|n| g.first_elem_index + n as u8),
                    code: ElementStatusCode::from(e[0]),
                    swap: e[0] & 0x10 != 0,
                    prdfail: e[0] & 0x40 != 0,
                    detail: StatusDetail::decode(elem_type, e),
                });
            }
        }
        Ok(Self {
            header,
            summary: EnclosureSummary::from(header.specific),
            elements,
        })
    }

    /// Individual (non-overall) elements only.
    pub fn individual(&self) -> impl Iterator<Item = &ElementStatus> {
        self.elements.iter().filter(|e| e.elem_index.is_some())
    }

    pub fn element(&self, elem_index: u8) -> Option<&ElementStatus> {
        self.elements
            .iter()
            .find(|e| e.elem_index == Some(elem_index))
    }
}

/// What to ask of a single element in the Enclosure Control page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlAction {
    Identify(bool),
    Fault(bool),
    /// Array device slot power.
    DeviceOff(bool),
    /// Cooling requested speed code (0..=7).
    FanSpeed(u8),
    DisplayCharacter(u8),
    /// Enclosure power cycle request with delay and off duration (0..=63).
    PowerCycle { delay: u8, off_duration: u8 },
    /// Common `disable` bit, used for expander phys.
    Disable(bool),
    /// Element-specific bytes as-is.
    Raw([u8; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlElement {
    pub elem_index: u8,
    pub action: ControlAction,
}

impl ControlElement {
    pub fn new(elem_index: u8, action: ControlAction) -> Self {
        Self { elem_index, action }
    }

    fn encode(&self, elem_type: Option<ElementType>, e: &mut [u8]) -> Result<()> {
        use ElementType as T;
        // SELECT
        e[0] |= 0x80;
        let set = |e: &mut [u8], byte: usize, n: u8, on: bool| {
            if on {
                e[byte] |= 1 << n;
            } else {
                e[byte] &= !(1 << n);
            }
        };
        match (self.action, elem_type) {
            (ControlAction::Identify(on), Some(T::ArrayDeviceSlot)) => set(e, 2, 1, on),
            (
                ControlAction::Identify(on),
                Some(
                    T::PowerSupply
                    | T::Cooling
                    | T::TempSensor
                    | T::EscElectronics
                    | T::SasConnector
                    | T::Enclosure
                    | T::Display,
                ),
            ) => set(e, 1, 7, on),
            (ControlAction::Fault(on), Some(T::ArrayDeviceSlot)) => set(e, 3, 5, on),
            (ControlAction::Fault(on), Some(T::PowerSupply | T::Cooling | T::SasConnector)) => {
                set(e, 3, 6, on)
            },
            (ControlAction::Fault(on), Some(T::EscElectronics | T::Display)) => {
                set(e, 1, 6, on)
            },
            (ControlAction::Fault(on), Some(T::Enclosure)) => set(e, 3, 1, on),
            (ControlAction::DeviceOff(on), Some(T::ArrayDeviceSlot)) => set(e, 3, 4, on),
            (ControlAction::FanSpeed(code), Some(T::Cooling)) => {
                ensure!(code <= 7, "fan speed code {code} out of range");
                e[3] = (e[3] & !0x07) | code | 0x20;
            },
            (ControlAction::DisplayCharacter(c), Some(T::Display)) => {
                e[1] = (e[1] & !0x03) | 0x02;
                e[2] = c;
            },
            (ControlAction::PowerCycle { delay, off_duration }, Some(T::Enclosure)) => {
                ensure!(
                    delay < 64 && off_duration < 64,
                    "power cycle delay/duration out of range"
                );
                e[2] = 0x40 | delay;
                e[3] = (e[3] & 0x03) | (off_duration << 2);
            },
            (ControlAction::Disable(on), Some(_)) => set(e, 0, 5, on),
            (ControlAction::Raw(b), _) => e[1..4].copy_from_slice(&b),
            (action, t) => bail!("control {action:?} not applicable to element type {t:?}"),
        }
        Ok(())
    }
}

/// Serialize an Enclosure Control page covering the full configuration
/// layout, with only the given elements selected.
pub fn encode_control_page(
    ctx: DecodeContext<'_>,
    generation_code: u16,
    elements: &[ControlElement],
) -> Result<BytesMut> {
    let slots: usize = ctx
        .groups
        .iter()
        .map(|g| 1 + g.num_possible_elems as usize)
        .sum();
    let size = PAGE_HEADER_LEN + slots * ELEM_LEN;
    let mut buf = BytesMut::zeroed(size);
    PageHeader::write(
        &mut buf,
        PageCode::EnclosureControlStatus as u8,
        0,
        size,
        generation_code,
    )?;
    for ce in elements {
        let g = ctx
            .group_of(ce.elem_index)
            .ok_or_else(|| anyhow!("element index {} not in configuration", ce.elem_index))?;
        let off = g.element_offset(ce.elem_index - g.first_elem_index);
        ce.encode(g.element_type(), &mut buf[off..off + ELEM_LEN])?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::enums::EsesVersion,
        models::pages::config::{TypeDescriptorHeader, element_groups},
    };

    #[test]
    fn slot_fault_sets_select_and_fault_bits() {
        let hdrs = [TypeDescriptorHeader {
            elem_type: 0x17,
            num_possible_elems: 4,
            subencl_id: 0,
            text_len: 0,
        }];
        let groups = element_groups(&hdrs).expect("groups");
        let ctx = DecodeContext::new(EsesVersion::Cdes1, &groups);
        let page = encode_control_page(
            ctx,
            0x0042,
            &[ControlElement::new(2, ControlAction::Fault(true))],
        )
        .expect("encode");
        assert_eq!(page.len(), 8 + 5 * 4);
        assert_eq!(&page[0..8], &[0x02, 0, 0x00, 0x18, 0, 0, 0, 0x42]);
        // overall at 8, slot 0 at 12, slot 2 at 20
        assert_eq!(&page[20..24], &[0x80, 0x00, 0x00, 0x20]);
        assert!(page[12..20].iter().all(|b| *b == 0));
    }
}
