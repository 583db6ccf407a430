// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request to wire command: CDB, outbound page, allocation and timeout.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::{
    cfg::{config::EngineConfig, enums::SideId},
    control_block::{
        common::Cdb,
        inquiry::{fill_inquiry_standard, fill_inquiry_vpd},
        mode_select::fill_mode_select10,
        mode_sense::fill_mode_sense10_simple,
        read_buffer::{ReadBufferMode, fill_read_buffer},
        receive_diag::fill_receive_diagnostic,
        send_diag::fill_send_diagnostic,
        write_buffer::fill_write_buffer,
    },
    engine::{
        buffer_id::resolve_buffer_id,
        model::DeviceModel,
        request::{FirmwareOp, Request},
    },
    models::{
        common::{ComponentType, MAX_DIAG_PAGE_SIZE, PageCode},
        element::{Attribute, ComponentRef},
        pages::{
            DecodeContext,
            config::ElementGroup,
            download::{DL_CONTROL_MAX_DATA_LEN, DL_TUNNEL_MAX_DATA_LEN, DownloadControl},
            emc::{EmcControlGroup, EmcControlPage},
            encl_status::encode_control_page,
            read_buffer::READ_BUFFER_DESC_LEN,
            statistics::encode_statistics_control,
            string_out::encode_string_out,
            tunnel::{encode_tunnel_download, encode_tunnel_receive},
        },
        status::BuildError,
    },
};

/// Allocation for standard INQUIRY data.
pub const INQUIRY_ALLOCATION: u16 = 0xFF;
/// Allocation for a MODE SENSE(10) of the EMC pages.
pub const MODE_SENSE_ALLOCATION: u16 = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct BuiltCommand {
    pub cdb: Cdb,
    pub direction: Direction,
    pub data_out: Bytes,
    /// Data-in bytes to allocate (0 for data-out commands).
    pub allocation_length: u32,
    pub timeout: Duration,
    /// Diagnostic page the response must carry.
    pub expected_page: Option<u8>,
    /// Image bytes carried by a download page.
    pub fw_chunk: Option<u32>,
}

/// Engine state the builder reads.
pub struct BuildEnv<'a> {
    pub cfg: &'a EngineConfig,
    /// `None` while the configuration is unknown.
    pub generation: Option<u16>,
    pub groups: &'a [ElementGroup],
    pub model: &'a dyn DeviceModel,
    /// Image bytes already sent in the current download.
    pub fw_sent: u32,
    pub local_side: SideId,
}

impl BuildEnv<'_> {
    #[inline]
    fn gen_code(&self) -> u16 {
        self.generation.unwrap_or(0)
    }

    fn decode_ctx(&self) -> Result<DecodeContext<'_>, BuildError> {
        if self.groups.is_empty() {
            return Err(BuildError::Page(
                "configuration layout unknown, cannot lay out the page".into(),
            ));
        }
        Ok(DecodeContext::new(self.cfg.eses_version, self.groups))
    }
}

fn page_err(e: anyhow::Error) -> BuildError {
    BuildError::Page(format!("{e:#}"))
}

fn cdb_err(e: anyhow::Error) -> BuildError {
    BuildError::Cdb(format!("{e:#}"))
}

fn receive(page: u8, allocation: u32, timeout: Duration) -> BuiltCommand {
    let allocation = allocation.min(MAX_DIAG_PAGE_SIZE);
    let mut cdb = Cdb::default();
    cdb.len = fill_receive_diagnostic(&mut cdb.bytes, page, allocation as u16);
    BuiltCommand {
        cdb,
        direction: Direction::In,
        data_out: Bytes::new(),
        allocation_length: allocation,
        timeout,
        expected_page: Some(page),
        fw_chunk: None,
    }
}

fn send(page: BytesMut, timeout: Duration) -> Result<BuiltCommand, BuildError> {
    let len = u16::try_from(page.len())
        .map_err(|_| BuildError::Cdb(format!("parameter list of {} bytes", page.len())))?;
    let mut cdb = Cdb::default();
    cdb.len = fill_send_diagnostic(&mut cdb.bytes, len);
    Ok(BuiltCommand {
        cdb,
        direction: Direction::Out,
        data_out: page.freeze(),
        allocation_length: 0,
        timeout,
        expected_page: None,
        fw_chunk: None,
    })
}

fn read_buffer(
    mode: ReadBufferMode,
    buf_id: u8,
    offset: u32,
    length: u32,
    timeout: Duration,
) -> Result<BuiltCommand, BuildError> {
    let mut cdb = Cdb::default();
    cdb.len = fill_read_buffer(&mut cdb.bytes, mode, buf_id, offset, length).map_err(cdb_err)?;
    Ok(BuiltCommand {
        cdb,
        direction: Direction::In,
        data_out: Bytes::new(),
        allocation_length: length,
        timeout,
        expected_page: None,
        fw_chunk: None,
    })
}

fn write_buffer(
    buf_id: u8,
    offset: u32,
    data: &Bytes,
    timeout: Duration,
) -> Result<BuiltCommand, BuildError> {
    let len = u32::try_from(data.len()).map_err(|_| BuildError::Cdb("write too large".into()))?;
    let mut cdb = Cdb::default();
    cdb.len = fill_write_buffer(&mut cdb.bytes, buf_id, offset, len).map_err(cdb_err)?;
    Ok(BuiltCommand {
        cdb,
        direction: if data.is_empty() {
            Direction::None
        } else {
            Direction::Out
        },
        data_out: data.clone(),
        allocation_length: 0,
        timeout,
        expected_page: None,
        fw_chunk: None,
    })
}

fn inquiry(cdb_len: usize, cdb: [u8; 16], allocation: u16, timeout: Duration) -> BuiltCommand {
    BuiltCommand {
        cdb: Cdb {
            bytes: cdb,
            len: cdb_len,
        },
        direction: Direction::In,
        data_out: Bytes::new(),
        allocation_length: allocation as u32,
        timeout,
        expected_page: None,
        fw_chunk: None,
    }
}

/// Download/activate control page for `op`.
fn download_page(
    op: &FirmwareOp,
    env: &BuildEnv<'_>,
    max_data: usize,
) -> Result<DownloadControl, BuildError> {
    let (target, side) = op.target();
    let comp = target.component(side)?;
    let subencl_id = env.model.get_u8(comp, Attribute::SubenclId)?;
    match op {
        FirmwareOp::Activate { .. } => Ok(DownloadControl::activate(subencl_id)),
        FirmwareOp::Download { image, .. } => {
            if image.is_empty() {
                return Err(BuildError::Parameter("empty firmware image".into()));
            }
            DownloadControl::next_chunk(subencl_id, image, env.fw_sent, max_data)
                .map_err(page_err)
        },
    }
}

fn sps_ref() -> ComponentRef {
    ComponentRef::new(ComponentType::Sps, 0)
}

/// Build the wire command for `request`.
///
/// Any partially built page is dropped with the error.
pub fn build(request: &Request, env: &BuildEnv<'_>) -> Result<BuiltCommand, BuildError> {
    let op = request.operation();
    let timeout = if op.is_firmware() {
        env.cfg.firmware_timeout
    } else {
        env.cfg.page_timeout
    };
    let diag_alloc = env.cfg.diag_page_allocation;
    let gen_code = env.gen_code();

    match request {
        Request::GetInquiryData | Request::ValidateIdentity => {
            let mut cdb = [0u8; 16];
            let len = fill_inquiry_standard(&mut cdb, INQUIRY_ALLOCATION, 0);
            Ok(inquiry(len, cdb, INQUIRY_ALLOCATION, timeout))
        },
        Request::RawInquiry {
            evpd,
            page_code,
            allocation,
        } => {
            let mut cdb = [0u8; 16];
            let len = if *evpd {
                fill_inquiry_vpd(&mut cdb, *page_code, *allocation)
            } else if *page_code != 0 {
                return Err(BuildError::Parameter(
                    "page code requires the EVPD bit".into(),
                ));
            } else {
                fill_inquiry_standard(&mut cdb, *allocation, 0)
            };
            Ok(inquiry(len, cdb, *allocation, timeout))
        },

        Request::GetConfiguration
        | Request::GetSasEnclosureType
        | Request::GetStatus
        | Request::GetAdditionalStatus
        | Request::GetEmcSpecificStatus
        | Request::GetTraceBufferInfo { .. }
        | Request::GetDownloadStatus
        | Request::ThresholdIn
        | Request::GetEmcStatistics
        | Request::GetTunnelCommandStatus => {
            let page = op
                .page_code()
                .ok_or(BuildError::Unsupported("receive without page code"))?;
            Ok(receive(page as u8, diag_alloc, timeout))
        },
        Request::RawReceiveDiagnostic {
            page_code,
            allocation,
        } => {
            if *page_code == PageCode::StringOut as u8 {
                return Err(BuildError::Unsupported("string out page is send-only"));
            }
            Ok(receive(*page_code, *allocation, timeout))
        },

        Request::DownloadFirmware(fw) => {
            let page = download_page(fw, env, DL_CONTROL_MAX_DATA_LEN)?;
            let chunk = page.chunk.len() as u32;
            let mut built = send(page.encode(gen_code).map_err(page_err)?, timeout)?;
            built.fw_chunk = matches!(fw, FirmwareOp::Download { .. }).then_some(chunk);
            Ok(built)
        },
        Request::TunnelDownloadFirmware(fw) => {
            let page = download_page(fw, env, DL_TUNNEL_MAX_DATA_LEN)?;
            let chunk = page.chunk.len() as u32;
            let mut built = send(
                encode_tunnel_download(&page, gen_code).map_err(page_err)?,
                timeout,
            )?;
            built.fw_chunk = matches!(fw, FirmwareOp::Download { .. }).then_some(chunk);
            Ok(built)
        },
        Request::TunnelGetConfiguration => send(
            encode_tunnel_receive(PageCode::Configuration).map_err(page_err)?,
            timeout,
        ),
        Request::TunnelGetDownloadStatus => send(
            encode_tunnel_receive(PageCode::DownloadMicrocode).map_err(page_err)?,
            timeout,
        ),

        Request::SetEmcSpecificControl(page) => {
            send(page.encode(gen_code).map_err(page_err)?, timeout)
        },
        Request::SetTraceBufferInfoControl {
            buf_id,
            action,
            elem_index,
        } => {
            let page = EmcControlPage {
                reset_shutdown_timer: false,
                groups: vec![EmcControlGroup::TraceBuffer {
                    buf_id: *buf_id,
                    action: *action,
                    elem_index: *elem_index,
                }],
            };
            send(page.encode(gen_code).map_err(page_err)?, timeout)
        },
        Request::SetEnclosureControl(elements) => {
            if elements.is_empty() {
                return Err(BuildError::Parameter("no control elements".into()));
            }
            let page = encode_control_page(env.decode_ctx()?, gen_code, elements)
                .map_err(page_err)?;
            send(page, timeout)
        },
        Request::StringOut { text, echo } => {
            send(encode_string_out(text, *echo).map_err(page_err)?, timeout)
        },
        Request::ThresholdOut(t) => {
            send(t.encode(env.decode_ctx()?, gen_code).map_err(page_err)?, timeout)
        },
        Request::EmcStatisticsControl { elem_offsets } => send(
            encode_statistics_control(gen_code, elem_offsets).map_err(page_err)?,
            timeout,
        ),

        Request::ModeSense { page_code } => {
            let mut cdb = Cdb::default();
            cdb.len = fill_mode_sense10_simple(&mut cdb.bytes, *page_code, MODE_SENSE_ALLOCATION);
            Ok(BuiltCommand {
                cdb,
                direction: Direction::In,
                data_out: Bytes::new(),
                allocation_length: MODE_SENSE_ALLOCATION as u32,
                timeout,
                expected_page: None,
                fw_chunk: None,
            })
        },
        Request::ModeSelect(list) => {
            let data = list.encode().map_err(page_err)?;
            let len = u16::try_from(data.len())
                .map_err(|_| BuildError::Cdb("mode parameter list too long".into()))?;
            let mut cdb = Cdb::default();
            cdb.len = fill_mode_select10(&mut cdb.bytes, false, len);
            Ok(BuiltCommand {
                cdb,
                direction: Direction::Out,
                data_out: data.freeze(),
                allocation_length: 0,
                timeout,
                expected_page: None,
                fw_chunk: None,
            })
        },

        Request::ReadBuffer {
            buf_id,
            offset,
            length,
        } => read_buffer(ReadBufferMode::Data, *buf_id, *offset, *length, timeout),
        Request::ReadResume {
            target,
            offset,
            length,
        } => {
            let buf_id = resolve_buffer_id(env.model, *target, false)?;
            read_buffer(ReadBufferMode::Data, buf_id, *offset, *length, timeout)
        },
        Request::GetResumePromSize { target } => {
            let buf_id = resolve_buffer_id(env.model, *target, false)?;
            read_buffer(
                ReadBufferMode::Descriptor,
                buf_id,
                0,
                READ_BUFFER_DESC_LEN as u32,
                timeout,
            )
        },
        Request::WriteResume {
            target,
            offset,
            data,
        } => {
            let buf_id = resolve_buffer_id(env.model, *target, true)?;
            write_buffer(buf_id, *offset, data, timeout)
        },
        Request::SpsEeprom { offset, length } => {
            let buf_id = env.model.get_u8(sps_ref(), Attribute::BufferId)?;
            read_buffer(ReadBufferMode::Data, buf_id, *offset, *length, timeout)
        },
        Request::SpsInBuffer { data } => {
            let buf_id = env.model.get_u8(sps_ref(), Attribute::BufferIdWritable)?;
            write_buffer(buf_id, 0, data, timeout)
        },
    }
}
