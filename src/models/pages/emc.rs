// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EMC Enclosure status/control page (10h).
//!
//! ```text
//!   [0..8]   common header
//!   [10]     shutdown reason (bits 0..6), partial (bit 7)
//!   [11]     number of information element groups
//!   [12..]   groups: { type, count, element size } + count * size bytes
//! ```
//!
//! The control direction has the same layout. `partial` in a control page
//! asks the enclosure to restart its shutdown timer.

use anyhow::{Result, bail, ensure};
use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::models::{
    common::{ElementType, MAX_DIAG_PAGE_SIZE, PageCode, PageHeader, trim_ascii},
    pages::{DecodeContext, EsesPage},
};

pub const FIRST_GROUP_OFFSET: usize = 12;
pub const GROUP_HEADER_LEN: usize = 3;
pub const SAS_CONN_ELEM_LEN: u8 = 14;
pub const TRACE_BUF_ELEM_LEN: u8 = 29;
pub const ENCL_TIME_ELEM_LEN: u8 = 8;
pub const GENERAL_ELEM_LEN: u8 = 4;
pub const PS_ELEM_LEN: u8 = 5;
pub const SPS_ELEM_LEN: u8 = 6;
pub const TIME_ZONE_UNSPECIFIED: u8 = 96;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InfoElemType {
    SasConnector = 0,
    TraceBuffer = 1,
    EnclosureTime = 2,
    General = 3,
    DrivePower = 4,
    PowerSupply = 5,
    Sps = 6,
}

impl TryFrom<u8> for InfoElemType {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::SasConnector,
            1 => Self::TraceBuffer,
            2 => Self::EnclosureTime,
            3 => Self::General,
            4 => Self::DrivePower,
            5 => Self::PowerSupply,
            6 => Self::Sps,
            other => bail!("unknown info element type {other}"),
        })
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortUse {
    Unknown = 0,
    Upstream = 1,
    Downstream = 2,
    Universal = 3,
}

impl From<u8> for PortUse {
    fn from(v: u8) -> Self {
        match v & 0x03 {
            1 => Self::Upstream,
            2 => Self::Downstream,
            3 => Self::Universal,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SasConnInfo {
    pub conn_elem_index: u8,
    pub attached_sas_address: u64,
    pub port_use: PortUse,
    pub port_type: u8,
    pub wide_port_id: u8,
    pub recovery: bool,
    pub enabled: bool,
    pub conn_id: u8,
    pub attached_phy_id: u8,
    pub attached_subencl_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceBufInfo {
    pub buf_id: u8,
    pub action: u8,
    pub elem_index: u8,
    pub revision: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnclTimeInfo {
    pub valid: bool,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub time_zone: u8,
    pub milliseconds: u32,
}

/// General info element, decoded by the type of the element it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeneralInfo {
    ArrayDeviceSlot {
        elem_index: u8,
        fru: bool,
        battery_backed: bool,
        power_cycle: bool,
        duration: u8,
    },
    Expander {
        elem_index: u8,
        fru: bool,
        reset_reason: u8,
    },
    TempSensor {
        elem_index: u8,
        fru: bool,
        valid: bool,
        temperature: u16,
    },
    EscElectronics {
        elem_index: u8,
        fru: bool,
        ecb_fault: bool,
    },
    Common {
        elem_index: u8,
        fru: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PsInfo {
    pub elem_index: u8,
    pub input_power_valid: bool,
    pub low_power_mode_b: bool,
    pub low_power_mode_a: bool,
    pub margining_test_mode: u8,
    pub margining_test_results: u8,
    pub input_power: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpsInfo {
    pub elem_index: u8,
    pub battime_valid: bool,
    pub status_valid: bool,
    pub status: u16,
    pub battime: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InfoGroup {
    SasConnectors(Vec<SasConnInfo>),
    TraceBuffers(Vec<TraceBufInfo>),
    EnclosureTime(EnclTimeInfo),
    General(Vec<GeneralInfo>),
    PowerSupplies(Vec<PsInfo>),
    Sps(Vec<SpsInfo>),
    /// Group kinds kept as raw element bytes.
    Raw { kind: u8, elems: Vec<Vec<u8>> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmcStatusPage {
    pub header: PageHeader,
    pub shutdown_reason: u8,
    pub partial: bool,
    pub groups: Vec<InfoGroup>,
}

impl EsesPage for EmcStatusPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

#[inline]
fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

impl EmcStatusPage {
    pub fn parse(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::EmcEnclosure as u8,
            "expected EMC enclosure page 0x10, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        ensure!(end >= FIRST_GROUP_OFFSET, "EMC page shorter than its fixed header");
        let page = &buf[..end];

        let num_groups = page[11] as usize;
        let mut groups = Vec::with_capacity(num_groups);
        let mut off = FIRST_GROUP_OFFSET;
        for _ in 0..num_groups {
            ensure!(
                off + GROUP_HEADER_LEN <= end,
                "info element group header at {off} beyond page end {end}"
            );
            let (kind, count, size) = (page[off], page[off + 1] as usize, page[off + 2] as usize);
            let body_start = off + GROUP_HEADER_LEN;
            let body_end = body_start + count * size;
            ensure!(
                body_end <= end,
                "info element group type {kind} ({count} x {size}) runs past page end"
            );
            let elems: Vec<&[u8]> = page[body_start..body_end].chunks_exact(size.max(1)).collect();
            groups.push(parse_group(kind, size, &elems, ctx)?);
            off = body_end;
        }

        Ok(Self {
            header,
            shutdown_reason: page[10] & 0x7F,
            partial: page[10] & 0x80 != 0,
            groups,
        })
    }

    pub fn sas_connectors(&self) -> impl Iterator<Item = &SasConnInfo> {
        self.groups.iter().flat_map(|g| match g {
            InfoGroup::SasConnectors(v) => v.as_slice(),
            _ => &[][..],
        })
    }

    pub fn trace_buffers(&self) -> impl Iterator<Item = &TraceBufInfo> {
        self.groups.iter().flat_map(|g| match g {
            InfoGroup::TraceBuffers(v) => v.as_slice(),
            _ => &[][..],
        })
    }

    pub fn sps(&self) -> impl Iterator<Item = &SpsInfo> {
        self.groups.iter().flat_map(|g| match g {
            InfoGroup::Sps(v) => v.as_slice(),
            _ => &[][..],
        })
    }
}

fn need(size: usize, min: u8, what: &str) -> Result<()> {
    ensure!(
        size >= min as usize,
        "{what} info element size {size} below {min}"
    );
    Ok(())
}

fn parse_group(kind: u8, size: usize, elems: &[&[u8]], ctx: DecodeContext<'_>) -> Result<InfoGroup> {
    let Ok(t) = InfoElemType::try_from(kind) else {
        return Ok(InfoGroup::Raw {
            kind,
            elems: elems.iter().map(|e| e.to_vec()).collect(),
        });
    };
    Ok(match t {
        InfoElemType::SasConnector => {
            // Older firmware omits the attached subenclosure id byte.
            need(size, SAS_CONN_ELEM_LEN - 1, "SAS connector")?;
            InfoGroup::SasConnectors(
                elems
                    .iter()
                    .map(|e| SasConnInfo {
                        conn_elem_index: e[0],
                        attached_sas_address: u64::from_be_bytes([
                            e[1], e[2], e[3], e[4], e[5], e[6], e[7], e[8],
                        ]),
                        port_use: PortUse::from(e[9] >> 4),
                        port_type: e[9] >> 6,
                        wide_port_id: e[10] & 0x0F,
                        recovery: e[10] & 0x10 != 0,
                        enabled: e[10] & 0x20 != 0,
                        conn_id: e[11],
                        attached_phy_id: e[12],
                        attached_subencl_id: e.get(13).copied().unwrap_or(0xFF),
                    })
                    .collect(),
            )
        },
        InfoElemType::TraceBuffer => {
            need(size, TRACE_BUF_ELEM_LEN, "trace buffer")?;
            InfoGroup::TraceBuffers(
                elems
                    .iter()
                    .map(|e| TraceBufInfo {
                        buf_id: e[0],
                        action: e[1],
                        elem_index: e[2],
                        revision: trim_ascii(&e[3..8]),
                        timestamp: trim_ascii(&e[8..29]),
                    })
                    .collect(),
            )
        },
        InfoElemType::EnclosureTime => {
            need(size, ENCL_TIME_ELEM_LEN, "enclosure time")?;
            let Some(e) = elems.first() else {
                bail!("enclosure time group without elements");
            };
            InfoGroup::EnclosureTime(EnclTimeInfo {
                valid: e[0] & 0x80 != 0,
                year: e[0] & 0x7F,
                month: e[1],
                day: e[2],
                time_zone: e[3],
                milliseconds: u32::from_be_bytes([e[4], e[5], e[6], e[7]]),
            })
        },
        InfoElemType::General => {
            need(size, GENERAL_ELEM_LEN, "general")?;
            InfoGroup::General(elems.iter().map(|e| parse_general(e, ctx)).collect())
        },
        InfoElemType::PowerSupply => {
            need(size, PS_ELEM_LEN, "power supply")?;
            InfoGroup::PowerSupplies(
                elems
                    .iter()
                    .map(|e| PsInfo {
                        elem_index: e[0],
                        input_power_valid: e[1] & 0x01 != 0,
                        low_power_mode_b: e[1] & 0x02 != 0,
                        low_power_mode_a: e[1] & 0x04 != 0,
                        margining_test_mode: (e[1] >> 3) & 0x0F,
                        margining_test_results: e[2],
                        input_power: be16(&e[3..5]),
                    })
                    .collect(),
            )
        },
        InfoElemType::Sps => {
            need(size, SPS_ELEM_LEN, "SPS")?;
            InfoGroup::Sps(
                elems
                    .iter()
                    .map(|e| SpsInfo {
                        elem_index: e[0],
                        battime_valid: e[1] & 0x40 != 0,
                        status_valid: e[1] & 0x80 != 0,
                        status: be16(&e[2..4]),
                        battime: be16(&e[4..6]),
                    })
                    .collect(),
            )
        },
        InfoElemType::DrivePower => InfoGroup::Raw {
            kind,
            elems: elems.iter().map(|e| e.to_vec()).collect(),
        },
    })
}

fn parse_general(e: &[u8], ctx: DecodeContext<'_>) -> GeneralInfo {
    let elem_index = e[0];
    let fru = e[1] & 0x80 != 0;
    match ctx.group_of(elem_index).and_then(|g| g.element_type()) {
        Some(ElementType::ArrayDeviceSlot) => GeneralInfo::ArrayDeviceSlot {
            elem_index,
            fru,
            battery_backed: e[1] & 0x40 != 0,
            power_cycle: e[2] & 0x80 != 0,
            duration: e[2] & 0x7F,
        },
        Some(ElementType::SasExpander) => GeneralInfo::Expander {
            elem_index,
            fru,
            reset_reason: e[1] & 0x0F,
        },
        Some(ElementType::TempSensor) => GeneralInfo::TempSensor {
            elem_index,
            fru,
            valid: e[1] & 0x01 != 0,
            temperature: be16(&e[2..4]),
        },
        Some(ElementType::EscElectronics) => GeneralInfo::EscElectronics {
            elem_index,
            fru,
            ecb_fault: e[1] & 0x01 != 0,
        },
        _ => GeneralInfo::Common { elem_index, fru },
    }
}

/// Trace buffer actions a control element may request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceBufAction {
    NoChange = 0,
    Clear = 2,
    Save = 4,
}

/// PS margining test mode control codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarginingControl {
    NoChange = 0x00,
    StartTest = 0x01,
    StopTest = 0x02,
    ClearResults = 0x03,
    DisableAutoTest = 0x04,
    EnableAutoTest = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SasConnControl {
    pub conn_elem_index: u8,
    pub upstream: bool,
    pub wide_port_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrivePowerCycle {
    pub elem_index: u8,
    /// Half-second units; 0 selects the enclosure default of 5 s.
    pub duration: u8,
}

/// One information element group to place in a control page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EmcControlGroup {
    SasConnectors(Vec<SasConnControl>),
    TraceBuffer {
        buf_id: u8,
        action: TraceBufAction,
        /// Index of the local SAS expander element.
        elem_index: u8,
    },
    EnclosureTime(NaiveDateTime),
    /// Clears the reset reason on each listed expander element.
    ClearResetReason(Vec<u8>),
    DrivePowerCycle(Vec<DrivePowerCycle>),
    PsMargining(Vec<(u8, MarginingControl)>),
    Sps(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmcControlPage {
    pub reset_shutdown_timer: bool,
    pub groups: Vec<EmcControlGroup>,
}

impl EmcControlPage {
    pub fn encode(&self, generation_code: u16) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(MAX_DIAG_PAGE_SIZE as usize);
        buf.put_bytes(0, FIRST_GROUP_OFFSET);
        let mut num_groups: u8 = 0;
        for g in &self.groups {
            if encode_group(g, &mut buf)? {
                num_groups += 1;
            }
        }
        ensure!(
            buf.len() <= MAX_DIAG_PAGE_SIZE as usize,
            "EMC control page of {} bytes exceeds {MAX_DIAG_PAGE_SIZE}",
            buf.len()
        );
        let size = buf.len();
        PageHeader::write(&mut buf, PageCode::EmcEnclosure as u8, 0, size, generation_code)?;
        buf[10] = if self.reset_shutdown_timer { 0x80 } else { 0 };
        buf[11] = num_groups;
        Ok(buf)
    }
}

fn put_group_header(buf: &mut BytesMut, kind: InfoElemType, count: usize, size: u8) -> Result<()> {
    let count = u8::try_from(count).map_err(|_| anyhow::anyhow!("too many info elements: {count}"))?;
    buf.put_u8(kind as u8);
    buf.put_u8(count);
    buf.put_u8(size);
    Ok(())
}

/// Returns false when the group had nothing to write.
fn encode_group(g: &EmcControlGroup, buf: &mut BytesMut) -> Result<bool> {
    match g {
        EmcControlGroup::SasConnectors(v) => {
            if v.is_empty() {
                return Ok(false);
            }
            put_group_header(buf, InfoElemType::SasConnector, v.len(), SAS_CONN_ELEM_LEN)?;
            for c in v {
                ensure!(c.wide_port_id < 16, "wide port id {} out of range", c.wide_port_id);
                let port_use = if c.upstream { PortUse::Upstream } else { PortUse::Downstream };
                buf.put_u8(c.conn_elem_index);
                buf.put_u64(0);
                buf.put_u8((port_use as u8) << 4);
                buf.put_u8(c.wide_port_id);
                buf.put_bytes(0, 3);
            }
        },
        EmcControlGroup::TraceBuffer {
            buf_id,
            action,
            elem_index,
        } => {
            put_group_header(buf, InfoElemType::TraceBuffer, 1, TRACE_BUF_ELEM_LEN)?;
            buf.put_u8(*buf_id);
            buf.put_u8(*action as u8);
            buf.put_u8(*elem_index);
            buf.put_bytes(0, TRACE_BUF_ELEM_LEN as usize - 3);
        },
        EmcControlGroup::EnclosureTime(t) => {
            put_group_header(buf, InfoElemType::EnclosureTime, 1, ENCL_TIME_ELEM_LEN)?;
            let ms = t.num_seconds_from_midnight() * 1000 + t.nanosecond() / 1_000_000;
            buf.put_u8(0x80 | (t.year().rem_euclid(100) as u8));
            buf.put_u8(t.month() as u8);
            buf.put_u8(t.day() as u8);
            buf.put_u8(TIME_ZONE_UNSPECIFIED);
            buf.put_u32(ms);
        },
        EmcControlGroup::ClearResetReason(v) => {
            if v.is_empty() {
                return Ok(false);
            }
            put_group_header(buf, InfoElemType::General, v.len(), GENERAL_ELEM_LEN)?;
            for idx in v {
                buf.put_u8(*idx);
                buf.put_bytes(0, 3);
            }
        },
        EmcControlGroup::DrivePowerCycle(v) => {
            if v.is_empty() {
                return Ok(false);
            }
            put_group_header(buf, InfoElemType::General, v.len(), GENERAL_ELEM_LEN)?;
            for d in v {
                ensure!(d.duration < 0x80, "power cycle duration {} out of range", d.duration);
                buf.put_u8(d.elem_index);
                buf.put_u8(0);
                buf.put_u8(0x80 | d.duration);
                buf.put_u8(0);
            }
        },
        EmcControlGroup::PsMargining(v) => {
            if v.is_empty() {
                return Ok(false);
            }
            put_group_header(buf, InfoElemType::PowerSupply, v.len(), PS_ELEM_LEN)?;
            for (idx, mode) in v {
                buf.put_u8(*idx);
                buf.put_u8((*mode as u8) << 3);
                buf.put_bytes(0, 3);
            }
        },
        EmcControlGroup::Sps(v) => {
            if v.is_empty() {
                return Ok(false);
            }
            put_group_header(buf, InfoElemType::Sps, v.len(), SPS_ELEM_LEN)?;
            for idx in v {
                buf.put_u8(*idx);
                buf.put_bytes(0, SPS_ELEM_LEN as usize - 1);
            }
        },
    }
    Ok(true)
}
