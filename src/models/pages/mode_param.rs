// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Mode parameter list (MODE SENSE/SELECT 10) and the EMC mode pages.
//!
//! The list starts with an 8-byte header (`[0..2]` mode data length,
//! reserved on select; `[6..8]` block descriptor length), followed by mode
//! pages of `[0]` PS/SPF/page code, `[1]` page length, then the body.

use anyhow::{Result, bail, ensure};
use bytes::{BufMut, BytesMut};
use serde::Serialize;

pub const MODE_PARAM_HDR_LEN: usize = 8;
pub const MODE_PAGE_HDR_LEN: usize = 2;
/// EMC mode pages are 16 bytes including their header.
pub const EMC_MODE_PAGE_LEN: usize = 16;

pub const EEP_PAGE_CODE: u8 = 0x20;
pub const EENP_PAGE_CODE: u8 = 0x21;
pub const ALL_PAGES: u8 = 0x3F;

/// EMC ESES persistent mode page (20h).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EepPage {
    pub bad_exp_recovery_enabled: bool,
    pub ha_mode: bool,
    pub ssu_disable: bool,
    pub disable_indicator_ctrl: bool,
}

impl EepPage {
    fn decode(b: u8) -> Self {
        Self {
            bad_exp_recovery_enabled: b & 0x10 != 0,
            ha_mode: b & 0x20 != 0,
            ssu_disable: b & 0x40 != 0,
            disable_indicator_ctrl: b & 0x80 != 0,
        }
    }

    fn encode(self) -> u8 {
        (self.bad_exp_recovery_enabled as u8) << 4
            | (self.ha_mode as u8) << 5
            | (self.ssu_disable as u8) << 6
            | (self.disable_indicator_ctrl as u8) << 7
    }
}

/// EMC ESES non-persistent mode page (21h).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EenpPage {
    pub sps_dev_supported: bool,
    pub include_drive_connectors: bool,
    pub disable_auto_shutdown: bool,
    pub disable_auto_cooling_ctrl: bool,
    pub activity_led_ctrl: bool,
    pub test_mode: bool,
}

impl EenpPage {
    fn decode(b: u8) -> Self {
        Self {
            sps_dev_supported: b & 0x01 != 0,
            include_drive_connectors: b & 0x08 != 0,
            disable_auto_shutdown: b & 0x10 != 0,
            disable_auto_cooling_ctrl: b & 0x20 != 0,
            activity_led_ctrl: b & 0x40 != 0,
            test_mode: b & 0x80 != 0,
        }
    }

    fn encode(self) -> u8 {
        self.sps_dev_supported as u8
            | (self.include_drive_connectors as u8) << 3
            | (self.disable_auto_shutdown as u8) << 4
            | (self.disable_auto_cooling_ctrl as u8) << 5
            | (self.activity_led_ctrl as u8) << 6
            | (self.test_mode as u8) << 7
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModePage {
    Eep(EepPage),
    Eenp(EenpPage),
    Other { page_code: u8, body: Vec<u8> },
}

impl ModePage {
    pub fn page_code(&self) -> u8 {
        match self {
            ModePage::Eep(_) => EEP_PAGE_CODE,
            ModePage::Eenp(_) => EENP_PAGE_CODE,
            ModePage::Other { page_code, .. } => *page_code,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModeParamList {
    pub pages: Vec<ModePage>,
}

impl ModeParamList {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < MODE_PARAM_HDR_LEN {
            bail!("mode parameter header truncated: {} bytes", buf.len());
        }
        // mode data length excludes its own two bytes
        let end = (u16::from_be_bytes([buf[0], buf[1]]) as usize + 2).min(buf.len());
        let blk_desc_len = u16::from_be_bytes([buf[6], buf[7]]) as usize;
        let mut off = MODE_PARAM_HDR_LEN + blk_desc_len;
        let mut pages = Vec::new();
        while off + MODE_PAGE_HDR_LEN <= end {
            let code = buf[off] & 0x3F;
            let len = buf[off + 1] as usize;
            let body_start = off + MODE_PAGE_HDR_LEN;
            ensure!(
                body_start + len <= end,
                "mode page 0x{code:02X} at {off} runs past list end {end}"
            );
            let body = &buf[body_start..body_start + len];
            pages.push(match (code, body.first()) {
                (EEP_PAGE_CODE, Some(b)) => ModePage::Eep(EepPage::decode(*b)),
                (EENP_PAGE_CODE, Some(b)) => ModePage::Eenp(EenpPage::decode(*b)),
                _ => ModePage::Other {
                    page_code: code,
                    body: body.to_vec(),
                },
            });
            off = body_start + len;
        }
        Ok(Self { pages })
    }

    /// Serialize for MODE SELECT (mode data length and PS bits zero).
    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(MODE_PARAM_HDR_LEN + EMC_MODE_PAGE_LEN * 2);
        buf.put_bytes(0, MODE_PARAM_HDR_LEN);
        for p in &self.pages {
            match p {
                ModePage::Eep(e) => put_emc_page(&mut buf, EEP_PAGE_CODE, e.encode()),
                ModePage::Eenp(e) => put_emc_page(&mut buf, EENP_PAGE_CODE, e.encode()),
                ModePage::Other { page_code, body } => {
                    buf.put_u8(page_code & 0x3F);
                    buf.put_u8(u8::try_from(body.len())?);
                    buf.put_slice(body);
                },
            }
        }
        Ok(buf)
    }

    pub fn eep(&self) -> Option<EepPage> {
        self.pages.iter().find_map(|p| match p {
            ModePage::Eep(e) => Some(*e),
            _ => None,
        })
    }

    pub fn eenp(&self) -> Option<EenpPage> {
        self.pages.iter().find_map(|p| match p {
            ModePage::Eenp(e) => Some(*e),
            _ => None,
        })
    }
}

fn put_emc_page(buf: &mut BytesMut, code: u8, flags: u8) {
    buf.put_u8(code);
    buf.put_u8((EMC_MODE_PAGE_LEN - MODE_PAGE_HDR_LEN) as u8);
    buf.put_u8(flags);
    buf.put_bytes(0, EMC_MODE_PAGE_LEN - MODE_PAGE_HDR_LEN - 1);
}

/// Wrap a MODE SELECT parameter list into the shape MODE SENSE returns.
pub fn as_sense_data(select: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        select.len() >= MODE_PARAM_HDR_LEN,
        "mode parameter list truncated"
    );
    let mut out = select.to_vec();
    let data_len = u16::try_from(out.len() - 2)?;
    out[0..2].copy_from_slice(&data_len.to_be_bytes());
    Ok(out)
}
