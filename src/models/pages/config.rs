// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Configuration diagnostic page (01h).
//!
//! ```text
//!   [0]     01h
//!   [1]     number of secondary subenclosures
//!   [2..4]  page length
//!   [4..8]  generation code
//!   [8..]   subenclosure descriptors (primary first), variable length,
//!           next = this + desc_len + 4
//!   ...     type descriptor headers, 4 bytes each
//!   ...     type descriptor texts
//! ```
//!
//! Walking the type descriptor headers in order yields the element groups:
//! element indices are assigned contiguously across groups, and each group
//! owns one overall element plus `num_possible_elems` individual elements
//! in the Enclosure Status page.

use anyhow::{Result, bail, ensure};
use serde::Serialize;

use crate::{
    cfg::enums::EsesVersion,
    models::{
        common::{ElementType, PAGE_HEADER_LEN, PageCode, PageHeader, SubenclosureType, trim_ascii},
        pages::EsesPage,
    },
};

const SUBENCL_FIXED_LEN: usize = 64;
const VER_DESC_LEN: usize = 20;
const BUF_DESC_LEN: usize = 4;
const TYPE_HDR_LEN: usize = 4;
const STATUS_ELEM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub elem_index: u8,
    pub comp_type: u8,
    pub downloadable: bool,
    pub updated: bool,
    pub main: bool,
    pub revision: String,
    /// Component identifier, CDES-1 only.
    pub identifier: String,
    pub buf_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferDescriptor {
    pub buf_id: u8,
    pub buf_type: u8,
    pub writable: bool,
    pub buf_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subenclosure {
    pub subencl_id: u8,
    pub num_type_desc_headers: u8,
    pub logical_id: u64,
    pub vendor_id: String,
    pub product_id: String,
    pub product_rev: String,
    pub subencl_type: SubenclosureType,
    pub side: u8,
    pub fru: bool,
    pub serial_number: String,
    pub versions: Vec<VersionDescriptor>,
    pub buffers: Vec<BufferDescriptor>,
    pub text: String,
}

impl Subenclosure {
    /// Placeholder descriptors carry a blank vendor id.
    #[inline]
    pub fn is_present(&self) -> bool {
        !self.vendor_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeDescriptorHeader {
    pub elem_type: u8,
    pub num_possible_elems: u8,
    pub subencl_id: u8,
    pub text_len: u8,
}

/// One type descriptor header resolved against the status page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementGroup {
    pub elem_type: u8,
    pub num_possible_elems: u8,
    pub subencl_id: u8,
    pub first_elem_index: u8,
    /// Offset of the overall element in the status/control page.
    pub byte_offset: u16,
}

impl ElementGroup {
    #[inline]
    pub fn element_type(&self) -> Option<ElementType> {
        ElementType::try_from(self.elem_type).ok()
    }

    /// Page offset of the `n`-th individual element of this group.
    #[inline]
    pub fn element_offset(&self, n: u8) -> usize {
        self.byte_offset as usize + STATUS_ELEM_LEN * (1 + n as usize)
    }

    #[inline]
    pub fn contains(&self, elem_index: u8) -> bool {
        elem_index >= self.first_elem_index
            && (elem_index as u16) < self.first_elem_index as u16 + self.num_possible_elems as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPage {
    pub header: PageHeader,
    pub num_secondary_subencls: u8,
    pub subenclosures: Vec<Subenclosure>,
    pub type_headers: Vec<TypeDescriptorHeader>,
    pub type_texts: Vec<String>,
    pub groups: Vec<ElementGroup>,
}

impl EsesPage for ConfigPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

impl ConfigPage {
    pub fn parse(buf: &[u8], version: EsesVersion) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        ensure!(
            header.page_code == PageCode::Configuration as u8,
            "expected configuration page 0x01, got 0x{:02X}",
            header.page_code
        );
        let end = (header.page_length as usize).min(buf.len());
        let page = &buf[..end];

        let mut off = PAGE_HEADER_LEN;
        let total = header.specific as usize + 1;
        let mut subenclosures = Vec::with_capacity(total);
        for _ in 0..total {
            let (sub, next) = parse_subenclosure(page, off, version)?;
            subenclosures.push(sub);
            off = next;
        }

        let num_hdrs: usize = subenclosures
            .iter()
            .map(|s| s.num_type_desc_headers as usize)
            .sum();
        let mut type_headers = Vec::with_capacity(num_hdrs);
        for _ in 0..num_hdrs {
            ensure!(
                off + TYPE_HDR_LEN <= page.len(),
                "type descriptor header at {off} runs past page end {}",
                page.len()
            );
            type_headers.push(TypeDescriptorHeader {
                elem_type: page[off],
                num_possible_elems: page[off + 1],
                subencl_id: page[off + 2],
                text_len: page[off + 3],
            });
            off += TYPE_HDR_LEN;
        }

        let mut type_texts = Vec::with_capacity(num_hdrs);
        for h in &type_headers {
            let len = h.text_len as usize;
            let text = page.get(off..off + len).map(trim_ascii).unwrap_or_default();
            type_texts.push(text);
            off += len;
        }

        let groups = element_groups(&type_headers)?;

        Ok(Self {
            header,
            num_secondary_subencls: header.specific,
            subenclosures,
            type_headers,
            type_texts,
            groups,
        })
    }

    pub fn primary(&self) -> Option<&Subenclosure> {
        self.subenclosures.first()
    }

    pub fn subenclosure(&self, id: u8) -> Option<&Subenclosure> {
        self.subenclosures.iter().find(|s| s.subencl_id == id)
    }

    /// Group that owns the given element index.
    pub fn group_of(&self, elem_index: u8) -> Option<&ElementGroup> {
        self.groups.iter().find(|g| g.contains(elem_index))
    }

    /// Total 4-byte slots in the status/control page (overall + individual).
    pub fn status_slot_count(&self) -> usize {
        self.groups
            .iter()
            .map(|g| 1 + g.num_possible_elems as usize)
            .sum()
    }

    /// Size in bytes of the Enclosure Status/Control page for this layout.
    pub fn status_page_size(&self) -> usize {
        PAGE_HEADER_LEN + STATUS_ELEM_LEN * self.status_slot_count()
    }
}

fn parse_subenclosure(
    page: &[u8],
    off: usize,
    version: EsesVersion,
) -> Result<(Subenclosure, usize)> {
    if off + SUBENCL_FIXED_LEN > page.len() {
        bail!(
            "subenclosure descriptor at {off} truncated: need {SUBENCL_FIXED_LEN}, have {}",
            page.len().saturating_sub(off)
        );
    }
    let d = &page[off..];
    let next = off + d[3] as usize + 4;
    ensure!(
        next <= page.len(),
        "subenclosure descriptor length {} runs past page end",
        d[3]
    );

    let num_ver = d[63] as usize;
    let mut p = SUBENCL_FIXED_LEN;
    let mut versions = Vec::with_capacity(num_ver);
    for _ in 0..num_ver {
        let v = d
            .get(p..p + VER_DESC_LEN)
            .ok_or_else(|| anyhow::anyhow!("version descriptor at {} truncated", off + p))?;
        versions.push(parse_version_desc(v, version));
        p += VER_DESC_LEN;
    }

    let num_buf = *d.get(p).unwrap_or(&0) as usize;
    p += 1;
    let mut buffers = Vec::with_capacity(num_buf);
    for _ in 0..num_buf {
        let b = d
            .get(p..p + BUF_DESC_LEN)
            .ok_or_else(|| anyhow::anyhow!("buffer descriptor at {} truncated", off + p))?;
        buffers.push(BufferDescriptor {
            buf_id: b[0],
            buf_type: b[1] & 0x7F,
            writable: b[1] & 0x80 != 0,
            buf_index: b[2],
        });
        p += BUF_DESC_LEN;
    }

    let num_vpd = *d.get(p).unwrap_or(&0) as usize;
    p += 1 + num_vpd;
    let text_len = *d.get(p).unwrap_or(&0) as usize;
    p += 1;
    let text = d.get(p..p + text_len).map(trim_ascii).unwrap_or_default();

    let sub = Subenclosure {
        subencl_id: d[1],
        num_type_desc_headers: d[2],
        logical_id: u64::from_be_bytes([d[4], d[5], d[6], d[7], d[8], d[9], d[10], d[11]]),
        vendor_id: trim_ascii(&d[12..20]),
        product_id: trim_ascii(&d[20..36]),
        product_rev: trim_ascii(&d[36..40]),
        subencl_type: SubenclosureType::from(d[40]),
        side: d[41] & 0x1F,
        fru: d[41] & 0x80 != 0,
        serial_number: trim_ascii(&d[47..63]),
        versions,
        buffers,
        text,
    };
    Ok((sub, next))
}

fn parse_version_desc(v: &[u8], version: EsesVersion) -> VersionDescriptor {
    let rev_len = version.revision_len();
    let identifier = match version {
        EsesVersion::Cdes1 => trim_ascii(&v[7..19]),
        EsesVersion::Cdes2 => String::new(),
    };
    VersionDescriptor {
        elem_index: v[0],
        comp_type: v[1] & 0x1F,
        downloadable: v[1] & 0x20 != 0,
        updated: v[1] & 0x40 != 0,
        main: v[1] & 0x80 != 0,
        revision: trim_ascii(&v[2..2 + rev_len]),
        identifier,
        buf_id: v[19],
    }
}

/// Resolve type descriptor headers into element groups with contiguous
/// element indices and status-page offsets.
pub fn element_groups(headers: &[TypeDescriptorHeader]) -> Result<Vec<ElementGroup>> {
    let mut groups = Vec::with_capacity(headers.len());
    let mut next_index: u16 = 0;
    let mut offset = PAGE_HEADER_LEN;
    for h in headers {
        ensure!(
            next_index + h.num_possible_elems as u16 <= 0x100,
            "element index overflow in group type 0x{:02X}",
            h.elem_type
        );
        let byte_offset =
            u16::try_from(offset).map_err(|_| anyhow::anyhow!("status page too large"))?;
        groups.push(ElementGroup {
            elem_type: h.elem_type,
            num_possible_elems: h.num_possible_elems,
            subencl_id: h.subencl_id,
            first_elem_index: next_index as u8,
            byte_offset,
        });
        next_index += h.num_possible_elems as u16;
        offset += STATUS_ELEM_LEN * (1 + h.num_possible_elems as usize);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_assign_contiguous_indices_and_offsets() {
        let hdrs = [
            TypeDescriptorHeader {
                elem_type: 0x17,
                num_possible_elems: 15,
                subencl_id: 0,
                text_len: 0,
            },
            TypeDescriptorHeader {
                elem_type: 0x02,
                num_possible_elems: 2,
                subencl_id: 1,
                text_len: 0,
            },
        ];
        let g = element_groups(&hdrs).expect("groups");
        assert_eq!(g[0].first_elem_index, 0);
        assert_eq!(g[0].byte_offset, 8);
        assert_eq!(g[1].first_elem_index, 15);
        assert_eq!(g[1].byte_offset, 8 + 4 * 16);
        assert_eq!(g[1].element_offset(1), 8 + 4 * 16 + 8);
        assert!(g[1].contains(16));
        assert!(!g[1].contains(17));
    }
}
