// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EMC Statistics page (11h).
//!
//! After the header comes a run of `{ elem_offset, stats_len, data }`
//! records; `elem_offset` is the element's slot in the Enclosure Status
//! page (overall elements included) and the next record starts
//! `2 + stats_len` bytes later. The counter layout depends on the element
//! type of that slot.

use anyhow::{Result, ensure};
use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::models::{
    common::{ElementType, PAGE_HEADER_LEN, PageCode, PageHeader},
    pages::{DecodeContext, EsesPage},
};

const COMMON_FIELD_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhyCounters {
    pub invalid_dword: u32,
    pub disparity_error: u32,
    pub loss_dword_sync: u32,
    pub phy_reset_fail: u32,
    pub code_violation: u32,
    pub phy_change: u8,
    pub crc_pmon_accum: u16,
    pub in_connect_crc: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementCounters {
    PowerSupply {
        dc_over: u8,
        dc_under: u8,
        fail: u8,
        over_temp_fail: u8,
        ac_fail: u8,
        dc_fail: u8,
    },
    Cooling {
        fail: u8,
    },
    TempSensor {
        over_temp_fail: u8,
        over_temp_warn: u8,
    },
    ExpanderPhy(PhyCounters),
    ArrayDeviceSlot {
        insert_count: u8,
        power_down_count: u8,
    },
    SasExpander {
        exp_change: u16,
    },
    /// Unknown element or a record shorter than its type requires.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementStatistics {
    pub elem_offset: u8,
    pub elem_type: Option<u8>,
    /// Individual element index, `None` for an overall element.
    pub elem_index: Option<u8>,
    pub counters: ElementCounters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsPage {
    pub header: PageHeader,
    pub elements: Vec<ElementStatistics>,
}

impl EsesPage for StatisticsPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

#[inline]
fn be32(d: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([d[at], d[at + 1], d[at + 2], d[at + 3]])
}

#[inline]
fn be16(d: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([d[at], d[at + 1]])
}

fn decode_counters(t: Option<ElementType>, d: &[u8]) -> ElementCounters {
    match t {
        Some(ElementType::PowerSupply) if d.len() >= 6 => ElementCounters::PowerSupply {
            dc_over: d[0],
            dc_under: d[1],
            fail: d[2],
            over_temp_fail: d[3],
            ac_fail: d[4],
            dc_fail: d[5],
        },
        Some(ElementType::Cooling) if !d.is_empty() => ElementCounters::Cooling { fail: d[0] },
        Some(ElementType::TempSensor) if d.len() >= 2 => ElementCounters::TempSensor {
            over_temp_fail: d[0],
            over_temp_warn: d[1],
        },
        Some(ElementType::ExpanderPhy) if d.len() >= 26 => {
            // d[0] reserved
            ElementCounters::ExpanderPhy(PhyCounters {
                invalid_dword: be32(d, 1),
                disparity_error: be32(d, 5),
                loss_dword_sync: be32(d, 9),
                phy_reset_fail: be32(d, 13),
                code_violation: be32(d, 17),
                phy_change: d[21],
                crc_pmon_accum: be16(d, 22),
                in_connect_crc: be16(d, 24),
            })
        },
        Some(ElementType::ArrayDeviceSlot) if d.len() >= 2 => ElementCounters::ArrayDeviceSlot {
            insert_count: d[0],
            power_down_count: d[1],
        },
        Some(ElementType::SasExpander) if d.len() >= 2 => ElementCounters::SasExpander {
            exp_change: be16(d, 0),
        },
        _ => ElementCounters::Raw(d.to_vec()),
    }
}

impl StatisticsPage {
    pub fn parse(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::EmcStatistics as u8,
            "expected EMC statistics page 0x11, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        let mut elements = Vec::new();
        let mut off = PAGE_HEADER_LEN;
        while off + COMMON_FIELD_LEN <= end {
            let elem_offset = buf[off];
            let len = buf[off + 1] as usize;
            let data_start = off + COMMON_FIELD_LEN;
            ensure!(
                data_start + len <= end,
                "statistics record at {off} ({len} bytes) runs past page end {end}"
            );
            let slot = ctx.group_at_offset(PAGE_HEADER_LEN + 4 * elem_offset as usize);
            let elem_type = slot.and_then(|(g, _)| g.element_type());
            elements.push(ElementStatistics {
                elem_offset,
                elem_type: slot.map(|(g, _)| g.elem_type),
                elem_index: slot.and_then(|(g, n)| n.map(|n| g.first_elem_index + n)),
                counters: decode_counters(elem_type, &buf[data_start..data_start + len]),
            });
            off = data_start + len;
        }
        Ok(Self { header, elements })
    }

    pub fn for_index(&self, elem_index: u8) -> Option<&ElementStatistics> {
        self.elements
            .iter()
            .find(|e| e.elem_index == Some(elem_index))
    }
}

/// Statistics control page: one zero-length record per element whose
/// counters should be cleared, addressed by status-page slot.
pub fn encode_statistics_control(generation_code: u16, elem_offsets: &[u8]) -> Result<BytesMut> {
    let size = PAGE_HEADER_LEN + COMMON_FIELD_LEN * elem_offsets.len();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_bytes(0, PAGE_HEADER_LEN);
    for off in elem_offsets {
        buf.put_u8(*off);
        buf.put_u8(0);
    }
    PageHeader::write(&mut buf, PageCode::EmcStatistics as u8, 0, size, generation_code)?;
    Ok(buf)
}
