// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Threshold In (05h, receive) and Threshold Out (05h, send).
//!
//! Same slot layout as the Enclosure Status page; every 4-byte element is
//! `[high critical, high warning, low warning, low critical]`.

use anyhow::{Result, anyhow, bail, ensure};
use bytes::BytesMut;
use serde::Serialize;

use crate::models::{
    common::{PAGE_HEADER_LEN, PageCode, PageHeader},
    pages::{DecodeContext, EsesPage},
};

const ELEM_LEN: usize = 4;
const INVOP: u8 = 0x10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub high_critical: u8,
    pub high_warning: u8,
    pub low_warning: u8,
    pub low_critical: u8,
}

impl Thresholds {
    fn from_slice(e: &[u8]) -> Self {
        Self {
            high_critical: e[0],
            high_warning: e[1],
            low_warning: e[2],
            low_critical: e[3],
        }
    }

    fn to_bytes(self) -> [u8; ELEM_LEN] {
        [
            self.high_critical,
            self.high_warning,
            self.low_warning,
            self.low_critical,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdElement {
    pub elem_type: u8,
    pub subencl_id: u8,
    pub elem_index: Option<u8>,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdInPage {
    pub header: PageHeader,
    /// The enclosure rejected the last Threshold Out page.
    pub invalid_operation: bool,
    pub elements: Vec<ThresholdElement>,
}

impl EsesPage for ThresholdInPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

impl ThresholdInPage {
    pub fn parse(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::Threshold as u8,
            "expected threshold page 0x05, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        let mut elements = Vec::new();
        for g in ctx.groups {
            for slot in 0..=g.num_possible_elems as usize {
                let off = g.byte_offset as usize + slot * ELEM_LEN;
                if off + ELEM_LEN > end {
                    bail!(
                        "threshold element at {off} for type 0x{:02X} beyond page end {end}",
                        g.elem_type
                    );
                }
                elements.push(ThresholdElement {
                    elem_type: g.elem_type,
                    subencl_id: g.subencl_id,
                    elem_index: slot.checked_sub(1).map(|n| g.first_elem_index + n as u8),
                    thresholds: Thresholds::from_slice(&buf[off..off + ELEM_LEN]),
                });
            }
        }
        Ok(Self {
            header,
            invalid_operation: header.specific & INVOP != 0,
            elements,
        })
    }

    pub fn element(&self, elem_index: u8) -> Option<&ThresholdElement> {
        self.elements
            .iter()
            .find(|e| e.elem_index == Some(elem_index))
    }
}

/// Thresholds to push for one element type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdOut {
    pub elem_type: u8,
    /// Written to the overall element of the group owned by `subencl_id`.
    pub overall: Option<Thresholds>,
    pub subencl_id: u8,
    pub elements: Vec<(u8, Thresholds)>,
}

impl ThresholdOut {
    /// Serialize a full-layout Threshold Out page.
    pub fn encode(&self, ctx: DecodeContext<'_>, generation_code: u16) -> Result<BytesMut> {
        let slots: usize = ctx
            .groups
            .iter()
            .map(|g| 1 + g.num_possible_elems as usize)
            .sum();
        let size = PAGE_HEADER_LEN + slots * ELEM_LEN;
        let mut buf = BytesMut::zeroed(size);
        PageHeader::write(&mut buf, PageCode::Threshold as u8, 0, size, generation_code)?;

        if let Some(overall) = self.overall {
            let g = ctx
                .groups
                .iter()
                .find(|g| g.elem_type == self.elem_type && g.subencl_id == self.subencl_id)
                .ok_or_else(|| {
                    anyhow!(
                        "no group of type 0x{:02X} in subenclosure {}",
                        self.elem_type,
                        self.subencl_id
                    )
                })?;
            let off = g.byte_offset as usize;
            buf[off..off + ELEM_LEN].copy_from_slice(&overall.to_bytes());
        }
        for (idx, t) in &self.elements {
            let g = ctx
                .group_of(*idx)
                .filter(|g| g.elem_type == self.elem_type)
                .ok_or_else(|| {
                    anyhow!("element {idx} is not a 0x{:02X} element", self.elem_type)
                })?;
            let off = g.element_offset(idx - g.first_elem_index);
            buf[off..off + ELEM_LEN].copy_from_slice(&t.to_bytes());
        }
        Ok(buf)
    }
}
