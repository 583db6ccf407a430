// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Additional Element Status page (0Ah).
//!
//! Each descriptor: `[0]` protocol id (bits 0..3) / EIP (bit 4) /
//! invalid (bit 7), `[1]` descriptor length (next = this + len + 2),
//! `[3]` element index, protocol-specific info from byte 4.
//!
//! SAS expander and ESC electronics descriptors share a descriptor type;
//! which one applies comes from the element type the configuration assigns
//! to the element index.

use anyhow::{Result, bail, ensure};
use serde::Serialize;

use crate::models::{
    common::{ElementType, PAGE_HEADER_LEN, PageCode, PageHeader},
    pages::{DecodeContext, EsesPage},
};

pub const PROTOCOL_SAS: u8 = 0x06;

const DESC_HDR_LEN: usize = 4;
const SLOT_PHY_DESC_LEN: usize = 28;
const EXP_PHY_DESC_LEN: usize = 2;
const ESC_PHY_DESC_LEN: usize = 12;
const SAS_EXP_HDR_LEN: usize = 12;
const ESC_HDR_LEN: usize = 4;

/// Phy descriptor inside an array device slot descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotPhy {
    pub device_type: u8,
    pub attached_sas_address: u64,
    pub sas_address: u64,
    pub phy_id: u8,
}

/// Connector/other element pair for one expander phy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpanderPhy {
    pub connector_elem_index: u8,
    pub other_elem_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EscPhy {
    pub phy_id: u8,
    pub connector_elem_index: u8,
    pub other_elem_index: u8,
    pub sas_address: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AddlInfo {
    ArrayDeviceSlot {
        not_all_phys: bool,
        slot_number: u8,
        phys: Vec<SlotPhy>,
    },
    SasExpander {
        sas_address: u64,
        phys: Vec<ExpanderPhy>,
    },
    EscElectronics {
        phys: Vec<EscPhy>,
    },
    /// Non-SAS protocol or element type this codec does not interpret.
    Other {
        protocol_id: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddlDescriptor {
    pub elem_index: u8,
    pub elem_index_present: bool,
    pub invalid: bool,
    pub info: AddlInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalStatusPage {
    pub header: PageHeader,
    pub descriptors: Vec<AddlDescriptor>,
}

impl EsesPage for AdditionalStatusPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

#[inline]
fn be_u64(b: &[u8]) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[..8]);
    u64::from_be_bytes(a)
}

impl AdditionalStatusPage {
    pub fn parse(buf: &[u8], ctx: DecodeContext<'_>) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::AdditionalStatus as u8,
            "expected additional status page 0x0A, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        let page = &buf[..end];

        let mut descriptors = Vec::new();
        let mut off = PAGE_HEADER_LEN;
        while off + DESC_HDR_LEN <= end {
            let d = &page[off..];
            ensure!(
                d[1] as usize + 2 >= DESC_HDR_LEN,
                "descriptor at {off} has length {}, shorter than its own header",
                d[1]
            );
            let next = off + d[1] as usize + 2;
            ensure!(
                next <= end,
                "descriptor at {off} with length {} runs past page end {end}",
                d[1]
            );
            let protocol_id = d[0] & 0x0F;
            let elem_index = d[3];
            let body = &page[off + DESC_HDR_LEN..next];
            let info = if protocol_id == PROTOCOL_SAS {
                let elem_type = ctx.group_of(elem_index).and_then(|g| g.element_type());
                parse_sas_info(body, elem_type)?
            } else {
                AddlInfo::Other { protocol_id }
            };
            descriptors.push(AddlDescriptor {
                elem_index,
                elem_index_present: d[0] & 0x10 != 0,
                invalid: d[0] & 0x80 != 0,
                info,
            });
            off = next;
        }
        Ok(Self {
            header,
            descriptors,
        })
    }

    pub fn descriptor(&self, elem_index: u8) -> Option<&AddlDescriptor> {
        self.descriptors.iter().find(|d| d.elem_index == elem_index)
    }
}

fn parse_sas_info(p: &[u8], elem_type: Option<ElementType>) -> Result<AddlInfo> {
    ensure!(p.len() >= 2, "SAS protocol info shorter than 2 bytes");
    let num = p[0] as usize;
    let desc_type = p[1] >> 6;
    match (desc_type, elem_type) {
        (0, _) => {
            ensure!(p.len() >= 4, "array slot info header truncated");
            let mut phys = Vec::with_capacity(num);
            for i in 0..num {
                let s = 4 + i * SLOT_PHY_DESC_LEN;
                let Some(ph) = p.get(s..s + SLOT_PHY_DESC_LEN) else {
                    bail!("slot phy descriptor {i} truncated");
                };
                phys.push(SlotPhy {
                    device_type: (ph[0] >> 4) & 0x07,
                    attached_sas_address: be_u64(&ph[4..12]),
                    sas_address: be_u64(&ph[12..20]),
                    phy_id: ph[20],
                });
            }
            Ok(AddlInfo::ArrayDeviceSlot {
                not_all_phys: p[1] & 0x01 != 0,
                slot_number: p[3],
                phys,
            })
        },
        (1, Some(ElementType::SasExpander)) => {
            ensure!(p.len() >= SAS_EXP_HDR_LEN, "SAS expander info header truncated");
            let mut phys = Vec::with_capacity(num);
            for i in 0..num {
                let s = SAS_EXP_HDR_LEN + i * EXP_PHY_DESC_LEN;
                let Some(ph) = p.get(s..s + EXP_PHY_DESC_LEN) else {
                    bail!("expander phy descriptor {i} truncated");
                };
                phys.push(ExpanderPhy {
                    connector_elem_index: ph[0],
                    other_elem_index: ph[1],
                });
            }
            Ok(AddlInfo::SasExpander {
                sas_address: be_u64(&p[4..12]),
                phys,
            })
        },
        (1, Some(ElementType::EscElectronics)) => {
            let mut phys = Vec::with_capacity(num);
            for i in 0..num {
                let s = ESC_HDR_LEN + i * ESC_PHY_DESC_LEN;
                let Some(ph) = p.get(s..s + ESC_PHY_DESC_LEN) else {
                    bail!("ESC electronics phy descriptor {i} truncated");
                };
                phys.push(EscPhy {
                    phy_id: ph[0],
                    connector_elem_index: ph[2],
                    other_elem_index: ph[3],
                    sas_address: be_u64(&ph[4..12]),
                });
            }
            Ok(AddlInfo::EscElectronics { phys })
        },
        _ => Ok(AddlInfo::Other {
            protocol_id: PROTOCOL_SAS,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::enums::EsesVersion,
        models::pages::config::{TypeDescriptorHeader, element_groups},
    };

    #[test]
    fn expander_descriptor_uses_config_element_type() {
        let groups = element_groups(&[TypeDescriptorHeader {
            elem_type: 0x18,
            num_possible_elems: 1,
            subencl_id: 0,
            text_len: 0,
        }])
        .expect("groups");
        let mut page = vec![0x0A, 0, 0, 0, 0, 0, 0, 0];
        // hdr: SAS + EIP, len, rsvd, elem 0
        page.extend_from_slice(&[0x16, 2 + 12 + 4, 0, 0]);
        page.extend_from_slice(&[2, 0x40, 0, 0]);
        page.extend_from_slice(&0x5000_0970_0000_1234u64.to_be_bytes());
        page.extend_from_slice(&[3, 0xFF, 4, 0xFF]);
        let len = (page.len() - 4) as u16;
        page[2..4].copy_from_slice(&len.to_be_bytes());

        let p = AdditionalStatusPage::parse(
            &page,
            DecodeContext::new(EsesVersion::Cdes1, &groups),
        )
        .expect("parse");
        assert_eq!(p.descriptors.len(), 1);
        match &p.descriptors[0].info {
            AddlInfo::SasExpander { sas_address, phys } => {
                assert_eq!(*sas_address, 0x5000_0970_0000_1234);
                assert_eq!(phys[1].connector_elem_index, 4);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn descriptor_shorter_than_its_header_is_rejected() {
        let page = [0x0A, 0, 0, 8, 0, 0, 0, 5, 0x11, 0x00, 0x00, 0x00];
        for len in [0u8, 1] {
            let mut p = page;
            p[9] = len;
            let err = AdditionalStatusPage::parse(&p, DecodeContext::new(EsesVersion::Cdes2, &[]))
                .expect_err("descriptor length below header size");
            assert!(format!("{err:#}").contains("shorter than its own header"), "{err:#}");
        }
    }
}
