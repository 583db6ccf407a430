// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Named attributes the engine reads and writes on indexed components of
//! the device model.

use core::fmt;

use serde::Serialize;

use crate::models::common::ComponentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Attribute {
    // topology, from the Configuration page
    ElemIndex,
    SubenclId,
    Side,
    IsLocal,
    FwRevision,
    FwRevisionExpander,
    FwRevisionBootLoader,
    FwRevisionInitString,
    FwRevisionFpga,
    /// SPS secondary processor and battery pack images.
    FwRevisionSecondary,
    FwRevisionBattery,
    BufferId,
    BufferIdWritable,
    SerialNumber,
    ProductId,
    /// Power supplies count sub-elements per side.
    PsSubelementCount,

    // health, from the Status page
    StatusCode,
    Inserted,
    Faulted,
    Swap,
    PrdFail,
    Identify,
    PoweredOff,
    Temperature,
    FanSpeedRpm,

    // phy/slot/connector mapping
    SasAddress,
    AttachedSasAddress,
    PhyIndex,
    PhyId,
    SlotNumber,
    ConnectorIndex,
    ConnectorId,
    EntireConnector,
    AttachedSubenclId,
    LinkReady,

    // EMC pages
    TraceBufferCount,
    TraceBufferStatus,
    ShutdownReason,
    Counter(&'static str),
    ThresholdHighCritical,
    ThresholdHighWarning,
    ThresholdLowWarning,
    ThresholdLowCritical,

    // enclosure level
    PlatformType,
    EnclosureSerial,
}

impl Attribute {
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Counter(n) => n,
            Attribute::ElemIndex => "elem_index",
            Attribute::SubenclId => "subencl_id",
            Attribute::Side => "side",
            Attribute::IsLocal => "is_local",
            Attribute::FwRevision => "fw_revision",
            Attribute::FwRevisionExpander => "fw_revision_expander",
            Attribute::FwRevisionBootLoader => "fw_revision_boot_loader",
            Attribute::FwRevisionInitString => "fw_revision_init_string",
            Attribute::FwRevisionFpga => "fw_revision_fpga",
            Attribute::FwRevisionSecondary => "fw_revision_secondary",
            Attribute::FwRevisionBattery => "fw_revision_battery",
            Attribute::BufferId => "buffer_id",
            Attribute::BufferIdWritable => "buffer_id_writable",
            Attribute::SerialNumber => "serial_number",
            Attribute::ProductId => "product_id",
            Attribute::PsSubelementCount => "ps_subelement_count",
            Attribute::StatusCode => "status_code",
            Attribute::Inserted => "inserted",
            Attribute::Faulted => "faulted",
            Attribute::Swap => "swap",
            Attribute::PrdFail => "prdfail",
            Attribute::Identify => "identify",
            Attribute::PoweredOff => "powered_off",
            Attribute::Temperature => "temperature",
            Attribute::FanSpeedRpm => "fan_speed_rpm",
            Attribute::SasAddress => "sas_address",
            Attribute::AttachedSasAddress => "attached_sas_address",
            Attribute::PhyIndex => "phy_index",
            Attribute::PhyId => "phy_id",
            Attribute::SlotNumber => "slot_number",
            Attribute::ConnectorIndex => "connector_index",
            Attribute::ConnectorId => "connector_id",
            Attribute::EntireConnector => "entire_connector",
            Attribute::AttachedSubenclId => "attached_subencl_id",
            Attribute::LinkReady => "link_ready",
            Attribute::TraceBufferCount => "trace_buffer_count",
            Attribute::TraceBufferStatus => "trace_buffer_status",
            Attribute::ShutdownReason => "shutdown_reason",
            Attribute::ThresholdHighCritical => "threshold_high_critical",
            Attribute::ThresholdHighWarning => "threshold_high_warning",
            Attribute::ThresholdLowWarning => "threshold_low_warning",
            Attribute::ThresholdLowCritical => "threshold_low_critical",
            Attribute::PlatformType => "platform_type",
            Attribute::EnclosureSerial => "enclosure_serial",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttrValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I16(i16),
    Text(String),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            AttrValue::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::U8(v) => Some(*v as u32),
            AttrValue::U16(v) => Some(*v as u32),
            AttrValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<u8> for AttrValue {
    fn from(v: u8) -> Self {
        AttrValue::U8(v)
    }
}

impl From<u16> for AttrValue {
    fn from(v: u16) -> Self {
        AttrValue::U16(v)
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        AttrValue::U32(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::U64(v)
    }
}

impl From<i16> for AttrValue {
    fn from(v: i16) -> Self {
        AttrValue::I16(v)
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

/// Address of one component in the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ComponentRef {
    pub ty: ComponentType,
    pub index: usize,
}

impl ComponentRef {
    #[inline]
    pub const fn new(ty: ComponentType, index: usize) -> Self {
        Self { ty, index }
    }
}

/// One queued write of a bulk update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrWrite {
    pub target: ComponentRef,
    pub attr: Attribute,
    pub value: AttrValue,
}

impl AttrWrite {
    pub fn new(ty: ComponentType, index: usize, attr: Attribute, value: impl Into<AttrValue>) -> Self {
        Self {
            target: ComponentRef::new(ty, index),
            attr,
            value: value.into(),
        }
    }
}
