//! ESES diagnostic page codecs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use enum_dispatch::enum_dispatch;
use serde::Serialize;

use crate::{
    cfg::enums::EsesVersion,
    models::common::{PageCode, PageHeader},
};

/// Additional Element Status page (0Ah).
pub mod addl_status;
/// Configuration page (01h) and element group layout.
pub mod config;
/// Download Microcode control/status pages (0Eh).
pub mod download;
/// EMC Enclosure status/control page (10h).
pub mod emc;
/// Enclosure Status/Control page (02h).
pub mod encl_status;
/// Standard INQUIRY data with the ESES vendor-specific fields.
pub mod inquiry;
/// EMC mode pages (20h/21h) and the mode parameter list.
pub mod mode_param;
/// READ BUFFER descriptor data.
pub mod read_buffer;
/// EMC Statistics status/control page (11h).
pub mod statistics;
/// String Out page (04h).
pub mod string_out;
/// Threshold In/Out page (05h).
pub mod threshold;
/// Tunnel diagnostic pages (83h).
pub mod tunnel;

use addl_status::AdditionalStatusPage;
use config::{ConfigPage, ElementGroup};
use download::DownloadStatusPage;
use emc::EmcStatusPage;
use encl_status::EnclosureStatusPage;
use statistics::StatisticsPage;
use threshold::ThresholdInPage;
use tunnel::TunnelStatusPage;

#[enum_dispatch]
pub trait EsesPage {
    fn header(&self) -> &PageHeader;

    fn generation_code(&self) -> u16 {
        self.header().generation_code
    }
}

/// Layout knowledge needed to decode element-indexed pages.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub version: EsesVersion,
    pub groups: &'a [ElementGroup],
}

impl<'a> DecodeContext<'a> {
    pub fn new(version: EsesVersion, groups: &'a [ElementGroup]) -> Self {
        Self { version, groups }
    }

    /// Group owning `elem_index`, if the configuration knows it.
    pub fn group_of(&self, elem_index: u8) -> Option<&'a ElementGroup> {
        self.groups.iter().find(|g| g.contains(elem_index))
    }

    /// Group whose overall or individual element sits at `byte_offset`
    /// in the status page, plus the position inside the group
    /// (`None` for the overall element).
    pub fn group_at_offset(&self, byte_offset: usize) -> Option<(&'a ElementGroup, Option<u8>)> {
        self.groups.iter().find_map(|g| {
            let start = g.byte_offset as usize;
            let end = start + 4 * (1 + g.num_possible_elems as usize);
            if byte_offset < start || byte_offset >= end || (byte_offset - start) % 4 != 0 {
                return None;
            }
            let slot = (byte_offset - start) / 4;
            Some((g, slot.checked_sub(1).map(|n| n as u8)))
        })
    }
}

/// Any status-direction page the engine decodes.
#[enum_dispatch(EsesPage)]
#[derive(Debug, Clone, Serialize)]
pub enum DiagnosticPage {
    ConfigPage(ConfigPage),
    EnclosureStatusPage(EnclosureStatusPage),
    AdditionalStatusPage(AdditionalStatusPage),
    EmcStatusPage(EmcStatusPage),
    StatisticsPage(StatisticsPage),
    ThresholdInPage(ThresholdInPage),
    DownloadStatusPage(DownloadStatusPage),
    TunnelStatusPage(TunnelStatusPage),
}

impl DiagnosticPage {
    /// Decode a page by the code in its header.
    ///
    /// Element-indexed pages need the groups from a previously decoded
    /// Configuration page; with an empty `ctx.groups` they still decode but
    /// elements cannot be attributed to a type.
    pub fn decode(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        let code = PageCode::try_from(header.page_code)?;
        Ok(match code {
            PageCode::Configuration => ConfigPage::parse(buf, ctx.version)?.into(),
            PageCode::EnclosureControlStatus => EnclosureStatusPage::parse(buf, ctx)?.into(),
            PageCode::AdditionalStatus => AdditionalStatusPage::parse(buf, ctx)?.into(),
            PageCode::EmcEnclosure => EmcStatusPage::parse(buf, ctx)?.into(),
            PageCode::EmcStatistics => StatisticsPage::parse(buf, ctx)?.into(),
            PageCode::Threshold => ThresholdInPage::parse(buf, ctx)?.into(),
            PageCode::DownloadMicrocode => DownloadStatusPage::parse(buf)?.into(),
            PageCode::TunnelDiagnostic => TunnelStatusPage::parse(buf)?.into(),
            other => bail!("page {other:?} has no status decoder"),
        })
    }
}
