// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tunnel Diagnostic pages (83h).
//!
//! The local ESC forwards an embedded SCSI command to its peer. The send
//! page wraps either a SEND DIAGNOSTIC plus a download control page or a
//! bare RECEIVE DIAGNOSTIC RESULTS:
//!
//! ```text
//!   [0]      83h
//!   [1]      protocol (bits 0-1), request type (bits 2-4)
//!   [2..4]   page length
//!   [4..6]   embedded command length
//!   [6..8]   embedded data length
//!   [8..16]  destination SAS address (0 = peer)
//!   [16..22] embedded CDB
//!   [22..]   embedded data (download control page + image)
//! ```
//!
//! The status page answers with a 9-byte header, the tunnelled data and an
//! optional response holding the SCSI status and sense of the remote
//! command.

use anyhow::{Result, bail, ensure};
use bytes::BytesMut;
use serde::Serialize;

use crate::{
    control_block::{
        common::CDB6_LEN, receive_diag::fill_receive_diagnostic, send_diag::fill_send_diagnostic,
    },
    models::{
        common::{MAX_DIAG_PAGE_SIZE, PAGE_SIZE_ADJUST, PageCode, PageHeader},
        pages::{
            EsesPage,
            download::{DL_CONTROL_HEADER_LEN, DL_TUNNEL_MAX_DATA_LEN, DownloadControl},
        },
        scsi::SenseTriple,
    },
};

const TUNNEL_HDR_LEN: usize = 16;
/// Tunnel header plus embedded 6-byte CDB.
pub const TUNNEL_RECEIVE_PAGE_LEN: usize = TUNNEL_HDR_LEN + CDB6_LEN;
/// Offset of the image data in a tunnelled download page.
pub const TUNNEL_DL_DATA_OFFSET: usize = TUNNEL_RECEIVE_PAGE_LEN + DL_CONTROL_HEADER_LEN;
const CMD_STATUS_HDR_LEN: usize = 9;
/// A response this short carries only sense data, no status byte.
const SENSE_ONLY_RESPONSE_LEN: usize = 18;

const PROT_SCSI: u8 = 0x2;
const RQST_LOCAL_PEER: u8 = 0x1;

#[inline]
fn protocol_byte() -> u8 {
    PROT_SCSI | (RQST_LOCAL_PEER << 2)
}

fn write_tunnel_header(buf: &mut [u8], page_size: usize, data_len: usize) -> Result<()> {
    let page_len = u16::try_from(page_size - PAGE_SIZE_ADJUST as usize)?;
    buf[0] = PageCode::TunnelDiagnostic as u8;
    buf[1] = protocol_byte();
    buf[2..4].copy_from_slice(&page_len.to_be_bytes());
    buf[4..6].copy_from_slice(&(CDB6_LEN as u16).to_be_bytes());
    buf[6..8].copy_from_slice(&u16::try_from(data_len)?.to_be_bytes());
    Ok(())
}

/// Wrap a download/activate control page for the peer ESC.
pub fn encode_tunnel_download(page: &DownloadControl, generation_code: u16) -> Result<BytesMut> {
    ensure!(
        page.chunk.len() <= DL_TUNNEL_MAX_DATA_LEN,
        "tunnelled chunk {} exceeds {DL_TUNNEL_MAX_DATA_LEN}",
        page.chunk.len()
    );
    let data_len = page.page_size();
    let size = TUNNEL_RECEIVE_PAGE_LEN + data_len;
    let mut buf = BytesMut::zeroed(size);
    write_tunnel_header(&mut buf, size, data_len)?;

    let mut cdb = [0u8; 16];
    fill_send_diagnostic(&mut cdb, u16::try_from(data_len)?);
    buf[TUNNEL_HDR_LEN..TUNNEL_RECEIVE_PAGE_LEN].copy_from_slice(&cdb[..CDB6_LEN]);
    page.write_into(&mut buf[TUNNEL_RECEIVE_PAGE_LEN..], generation_code)?;
    Ok(buf)
}

/// Ask the peer ESC to run RECEIVE DIAGNOSTIC RESULTS for `page_code`.
pub fn encode_tunnel_receive(page_code: PageCode) -> Result<BytesMut> {
    let mut buf = BytesMut::zeroed(TUNNEL_RECEIVE_PAGE_LEN);
    write_tunnel_header(&mut buf, TUNNEL_RECEIVE_PAGE_LEN, 0)?;
    let mut cdb = [0u8; 16];
    fill_receive_diagnostic(&mut cdb, page_code as u8, MAX_DIAG_PAGE_SIZE as u16);
    buf[TUNNEL_HDR_LEN..].copy_from_slice(&cdb[..CDB6_LEN]);
    Ok(buf)
}

/// Progress of the tunnelled command as reported by the local ESC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TunnelState {
    Success,
    ProcessingLocal,
    ProcessingPeer,
    Aborted,
    FailResources,
    FailComm,
    FailCollision,
    FailRequestInvalid,
    FailBusy,
    Other(u8),
}

impl From<u8> for TunnelState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Success,
            1 => Self::ProcessingLocal,
            2 => Self::ProcessingPeer,
            3 => Self::Aborted,
            4 => Self::FailResources,
            5 => Self::FailComm,
            6 => Self::FailCollision,
            7 => Self::FailRequestInvalid,
            8 => Self::FailBusy,
            other => Self::Other(other),
        }
    }
}

impl TunnelState {
    #[inline]
    pub fn is_processing(self) -> bool {
        matches!(self, Self::ProcessingLocal | Self::ProcessingPeer)
    }
}

/// Outcome of the remote command carried in the response area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TunnelResponse {
    pub scsi_status: u8,
    pub sense: Option<SenseTriple>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelStatusPage {
    pub header: PageHeader,
    pub state: TunnelState,
    /// Page returned by the remote command (for example a download status
    /// page), empty when the command moved no data.
    pub data: Vec<u8>,
    pub response: Option<TunnelResponse>,
}

impl EsesPage for TunnelStatusPage {
    fn header(&self) -> &PageHeader {
        &self.header
    }
}

fn sense_at(s: &[u8]) -> Option<SenseTriple> {
    (s.len() >= 14).then(|| SenseTriple::new(s[2] & 0x0F, s[12], s[13]))
}

impl TunnelStatusPage {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = PageHeader::parse(buf)?;
        if header.page_code != PageCode::TunnelDiagnostic as u8 {
            bail!("expected tunnel status page 0x83, got 0x{:02X}", header.page_code);
        }
        ensure!(
            buf.len() >= CMD_STATUS_HDR_LEN,
            "tunnel command status header truncated: {} bytes",
            buf.len()
        );
        let state = TunnelState::from(buf[4]);
        let data_len = u16::from_be_bytes([buf[5], buf[6]]) as usize;
        let resp_len = u16::from_be_bytes([buf[7], buf[8]]) as usize;
        if state != TunnelState::Success {
            return Ok(Self {
                header,
                state,
                data: Vec::new(),
                response: None,
            });
        }

        let data_end = CMD_STATUS_HDR_LEN + data_len;
        let Some(data) = buf.get(CMD_STATUS_HDR_LEN..data_end) else {
            bail!("tunnel data of {data_len} bytes runs past page end {}", buf.len());
        };
        let response = if resp_len == 0 {
            None
        } else {
            let Some(r) = buf.get(data_end..data_end + resp_len) else {
                bail!("tunnel response of {resp_len} bytes runs past page end");
            };
            // older ESC firmware omits the status byte
            Some(if resp_len <= SENSE_ONLY_RESPONSE_LEN {
                TunnelResponse {
                    scsi_status: 0x02,
                    sense: sense_at(r),
                }
            } else {
                TunnelResponse {
                    scsi_status: r[0],
                    sense: sense_at(&r[1..]),
                }
            })
        };
        Ok(Self {
            header,
            state,
            data: data.to_vec(),
            response,
        })
    }

    /// True when the remote command completed with GOOD status.
    pub fn remote_good(&self) -> bool {
        self.state == TunnelState::Success
            && self.response.is_none_or(|r| r.scsi_status == 0x00)
    }
}
