// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Simulated enclosure behind the `Transport` boundary.
//!
//! Layout served by the simulator (element indices in brackets):
//!   subencl 0 chassis: Enclosure x1 [0], ArrayDeviceSlot x4 [1..5]
//!   subencl 1 LCC A:   EscElectronics x1 [5], TempSensor x1 [6]
//!   subencl 2 LCC B:   EscElectronics x1 [7]
//!   subencl 3 PS:      PowerSupply x2 [8..10]
//!   subencl 4 fans:    Cooling x2 [10..12]

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use bytes::Bytes;
use eses_engine::{
    cfg::{config::Config, enums::EsesVersion},
    engine::{
        enclosure::EnclosureEngine,
        model::InMemoryModel,
        transport::{ScsiCompletion, ScsiRequest, Transport},
    },
    models::{pages::mode_param::as_sense_data, scsi::RequestStatus, status::TransportError},
};
use tokio::sync::Semaphore;

pub fn test_path() -> String {
    std::env::var("TEST_CONFIG").unwrap_or_else(|_| "tests/config.yaml".into())
}

pub fn load_config() -> Result<Config> {
    let pb = PathBuf::from(test_path());
    Config::load_from_file(&pb).with_context(|| format!("failed to load {pb:?}"))
}

pub type SimEngine = EnclosureEngine<SimEnclosure, InMemoryModel>;

pub fn engine_with(cfg: Config, sim: SimEnclosure) -> SimEngine {
    EnclosureEngine::new(cfg, sim, Arc::new(InMemoryModel::new()))
}

pub fn engine() -> Result<SimEngine> {
    Ok(engine_with(load_config()?, SimEnclosure::new(EsesVersion::Cdes2)))
}

/// Fixed-format sense data.
pub fn sense(key: u8, asc: u8, ascq: u8) -> Bytes {
    let mut s = vec![0u8; 18];
    s[0] = 0x70;
    s[2] = key;
    s[7] = 10;
    s[12] = asc;
    s[13] = ascq;
    Bytes::from(s)
}

fn put_ascii(dst: &mut [u8], s: &str) {
    dst.fill(b' ');
    let n = s.len().min(dst.len());
    dst[..n].copy_from_slice(&s.as_bytes()[..n]);
}

fn header(code: u8, specific: u8, size: usize, generation: u16) -> Vec<u8> {
    let mut p = vec![0u8; size];
    p[0] = code;
    p[1] = specific;
    p[2..4].copy_from_slice(&((size - 4) as u16).to_be_bytes());
    p[4..8].copy_from_slice(&(generation as u32).to_be_bytes());
    p
}

struct SubenclSpec {
    id: u8,
    ty: u8,
    side: u8,
    product: &'static str,
    serial: &'static str,
    /// (comp_type, revision)
    versions: Vec<(u8, String)>,
    /// (buf_id, writable)
    buffer: Option<(u8, bool)>,
    /// (element type, count)
    types: Vec<(u8, u8)>,
}

fn subencl_descriptor(s: &SubenclSpec, version: EsesVersion) -> Vec<u8> {
    let mut d = vec![0u8; 64];
    d[1] = s.id;
    d[2] = s.types.len() as u8;
    d[4..12].copy_from_slice(&(0x5000_0970_0000_0000u64 + s.id as u64).to_be_bytes());
    put_ascii(&mut d[12..20], "EMC");
    put_ascii(&mut d[20..36], s.product);
    put_ascii(&mut d[36..40], "0001");
    d[40] = s.ty;
    d[41] = s.side;
    put_ascii(&mut d[47..63], s.serial);
    d[63] = s.versions.len() as u8;
    for (comp_type, rev) in &s.versions {
        let mut v = vec![0u8; 20];
        v[1] = *comp_type | 0x80;
        let rev_len = version.revision_len();
        put_ascii(&mut v[2..2 + rev_len], rev);
        d.extend_from_slice(&v);
    }
    match s.buffer {
        Some((id, writable)) => {
            d.push(1);
            d.extend_from_slice(&[id, if writable { 0x80 } else { 0 }, 0, 0]);
        },
        None => d.push(0),
    }
    d.push(0); // vpd pages
    d.push(0); // text length
    d[3] = (d.len() - 4) as u8;
    d
}

/// Mutable enclosure state; every field is what the enclosure would report.
pub struct SimState {
    pub version: EsesVersion,
    pub generation: u16,
    /// Generation the status pages carry; tracks `generation` unless a test
    /// overrides it.
    pub page_generation: Option<u16>,
    pub serial: String,
    pub platform_code: u16,
    pub lcc_revision: String,
    /// Drive slot reported as not installed.
    pub empty_slot: usize,
    pub buffers: HashMap<u8, Vec<u8>>,
    pub mode_pages: Option<Vec<u8>>,
    pub download_status: u8,
    pub addl_status_supported: bool,
    /// Raw Additional Element Status page served when supported.
    pub addl_status_page: Option<Vec<u8>>,
    /// Raw EMC Enclosure status page; unsupported when unset.
    pub emc_status_page: Option<Vec<u8>>,
    /// Tunnel states reported by successive tunnel status polls.
    pub tunnel_states: VecDeque<u8>,
    /// Page the peer returns once a tunnelled receive succeeds.
    pub tunnel_payload: Vec<u8>,
    /// One-shot completions consumed before normal handling.
    pub injected: VecDeque<Injected>,
    pub sent_pages: Vec<Bytes>,
    pub submits: usize,
}

pub enum Injected {
    CheckCondition(Bytes),
    Busy,
    Reject,
    WrongCorrelation,
    /// GOOD status with this port request status on an otherwise normal reply.
    RequestStatus(RequestStatus),
}

#[derive(Clone)]
pub struct SimEnclosure {
    pub state: Arc<Mutex<SimState>>,
    /// When set, each submit waits for one permit before completing.
    pub hold: Option<Arc<Semaphore>>,
}

impl SimEnclosure {
    pub fn new(version: EsesVersion) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert(4, (0u8..10).collect());
        Self {
            state: Arc::new(Mutex::new(SimState {
                version,
                generation: 1,
                page_generation: None,
                serial: "FCNCH0972C1234".into(),
                platform_code: 0x000D,
                lcc_revision: "0.54".into(),
                empty_slot: 1,
                buffers,
                mode_pages: None,
                download_status: 0x00,
                addl_status_supported: true,
                addl_status_page: None,
                emc_status_page: None,
                tunnel_states: VecDeque::new(),
                tunnel_payload: Vec::new(),
                injected: VecDeque::new(),
                sent_pages: Vec::new(),
                submits: 0,
            })),
            hold: None,
        }
    }

    pub fn held(mut self, sem: Arc<Semaphore>) -> Self {
        self.hold = Some(sem);
        self
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st)
    }

    pub fn inject(&self, i: Injected) {
        self.with(|s| s.injected.push_back(i));
    }

    fn answer(&self, req: &ScsiRequest) -> Result<ScsiCompletion, TransportError> {
        let corr = req.correlation;
        let cdb = &req.cdb.bytes;
        let alloc = req.data_in_capacity();
        self.with(|s| {
            s.submits += 1;
            let mut request_status = RequestStatus::Success;
            match s.injected.pop_front() {
                Some(Injected::CheckCondition(sense)) => {
                    return Ok(ScsiCompletion::check_condition(corr, sense));
                },
                Some(Injected::Busy) => {
                    let mut c = ScsiCompletion::good(corr, Bytes::new());
                    c.scsi_status = 0x08;
                    return Ok(c);
                },
                Some(Injected::Reject) => {
                    return Err(TransportError::Rejected("port offline".into()));
                },
                Some(Injected::WrongCorrelation) => {
                    return Ok(ScsiCompletion::good(corr ^ 0xFFFF, Bytes::new()));
                },
                Some(Injected::RequestStatus(rs)) => request_status = rs,
                None => {},
            }

            let data = match cdb[0] {
                0x12 => s.inquiry(),
                0x1C => match s.receive(cdb[2]) {
                    Ok(p) => p,
                    Err(sense) => return Ok(ScsiCompletion::check_condition(corr, sense)),
                },
                0x1D => {
                    s.send(&req.data_out);
                    Vec::new()
                },
                0x5A => s.mode_sense(),
                0x55 => {
                    s.mode_pages = Some(req.data_out.to_vec());
                    Vec::new()
                },
                0x3C => s.read_buffer(cdb),
                0x3B => {
                    s.write_buffer(cdb, &req.data_out);
                    Vec::new()
                },
                _ => return Ok(ScsiCompletion::check_condition(corr, sense(0x05, 0x20, 0x00))),
            };
            let mut data = data;
            data.truncate(alloc);
            let mut c = ScsiCompletion::good(corr, Bytes::from(data));
            c.request_status = request_status;
            Ok(c)
        })
    }
}

impl SimState {
    fn page_generation(&self) -> u16 {
        self.page_generation.unwrap_or(self.generation)
    }

    fn layout(&self) -> Vec<SubenclSpec> {
        vec![
            SubenclSpec {
                id: 0,
                ty: 0x0E,
                side: 0x1F,
                product: "VIPER DAE",
                serial: "FCNCH0972C1234",
                versions: Vec::new(),
                buffer: Some((4, true)),
                types: vec![(0x0E, 1), (0x17, 4)],
            },
            SubenclSpec {
                id: 1,
                ty: 0x07,
                side: 0,
                product: "LCC",
                serial: "LCC-A-0001",
                versions: vec![(6, self.lcc_revision.clone())],
                buffer: Some((7, false)),
                types: vec![(0x07, 1), (0x04, 1)],
            },
            SubenclSpec {
                id: 2,
                ty: 0x07,
                side: 1,
                product: "LCC",
                serial: "LCC-B-0001",
                versions: vec![(6, "0.54".into())],
                buffer: None,
                types: vec![(0x07, 1)],
            },
            SubenclSpec {
                id: 3,
                ty: 0x02,
                side: 0,
                product: "PS",
                serial: "PS-0001",
                versions: vec![(4, "1.10".into())],
                buffer: Some((9, true)),
                types: vec![(0x02, 2)],
            },
            SubenclSpec {
                id: 4,
                ty: 0x03,
                side: 0,
                product: "FAN",
                serial: "FAN-0001",
                versions: Vec::new(),
                buffer: None,
                types: vec![(0x03, 2)],
            },
        ]
    }

    pub fn config_page(&self) -> Vec<u8> {
        let subs = self.layout();
        let mut body = Vec::new();
        for s in &subs {
            body.extend(subencl_descriptor(s, self.version));
        }
        for s in &subs {
            for (ty, n) in &s.types {
                body.extend_from_slice(&[*ty, *n, s.id, 0]);
            }
        }
        let mut p = header(0x01, (subs.len() - 1) as u8, 8 + body.len(), self.generation);
        p[8..].copy_from_slice(&body);
        p
    }

    /// Slots in the status page: one overall plus the individuals per group.
    fn status_slots(&self) -> Vec<(u8, bool)> {
        let mut slots = Vec::new();
        for s in self.layout() {
            for (ty, n) in s.types {
                slots.push((ty, true));
                slots.extend(std::iter::repeat_n((ty, false), n as usize));
            }
        }
        slots
    }

    pub fn status_page(&self) -> Vec<u8> {
        let slots = self.status_slots();
        let mut p = header(0x02, 0, 8 + 4 * slots.len(), self.page_generation());
        let mut slot_no = 0;
        for (i, (ty, overall)) in slots.iter().enumerate() {
            let e = &mut p[8 + 4 * i..12 + 4 * i];
            if *overall {
                continue;
            }
            e[0] = 0x01;
            if *ty == 0x17 {
                if slot_no == self.empty_slot {
                    e[0] = 0x05;
                }
                slot_no += 1;
            }
            if *ty == 0x04 {
                e[2] = 20 + 25; // 25 degrees C
            }
        }
        p
    }

    pub fn download_status_page(&self) -> Vec<u8> {
        let mut p = header(0x0E, 0, 24, self.page_generation());
        p[9] = 1;
        p[10] = self.download_status;
        p
    }

    /// EMC Enclosure status page holding one trace buffer group.
    pub fn trace_buffer_page(&self, buffers: &[(u8, u8, u8)]) -> Vec<u8> {
        const ELEM: usize = 29;
        let mut p = header(0x10, 0, 12 + 3 + ELEM * buffers.len(), self.page_generation());
        p[11] = 1;
        p[12..15].copy_from_slice(&[1, buffers.len() as u8, ELEM as u8]);
        for (i, (buf_id, action, elem_index)) in buffers.iter().enumerate() {
            let e = &mut p[15 + ELEM * i..15 + ELEM * (i + 1)];
            e[..3].copy_from_slice(&[*buf_id, *action, *elem_index]);
            put_ascii(&mut e[3..8], "1.23");
            put_ascii(&mut e[8..29], "2025-01-01 00:00:00");
        }
        p
    }

    fn tunnel_status_page(&mut self) -> Vec<u8> {
        let state = self.tunnel_states.pop_front().unwrap_or(0);
        let data = if state == 0 {
            self.tunnel_payload.clone()
        } else {
            Vec::new()
        };
        let size = 9 + data.len();
        let mut p = vec![0u8; size];
        p[0] = 0x83;
        p[2..4].copy_from_slice(&((size - 4) as u16).to_be_bytes());
        p[4] = state;
        p[5..7].copy_from_slice(&(data.len() as u16).to_be_bytes());
        p[9..].copy_from_slice(&data);
        p
    }

    fn inquiry(&self) -> Vec<u8> {
        let mut d = vec![0u8; 56];
        d[0] = 0x0D;
        put_ascii(&mut d[8..16], "EMC");
        put_ascii(&mut d[16..32], "ESES Enclosure");
        put_ascii(&mut d[32..36], "0001");
        put_ascii(&mut d[36..52], &self.serial);
        d[52..54].copy_from_slice(&self.platform_code.to_be_bytes());
        d
    }

    fn receive(&mut self, page: u8) -> Result<Vec<u8>, Bytes> {
        match page {
            0x01 => Ok(self.config_page()),
            0x02 => Ok(self.status_page()),
            0x0A if self.addl_status_supported => {
                self.addl_status_page.clone().ok_or_else(|| sense(0x05, 0x35, 0x01))
            },
            0x10 => self.emc_status_page.clone().ok_or_else(|| sense(0x05, 0x35, 0x01)),
            0x0E => Ok(self.download_status_page()),
            0x83 => Ok(self.tunnel_status_page()),
            _ => Err(sense(0x05, 0x35, 0x01)),
        }
    }

    fn send(&mut self, page: &Bytes) {
        self.sent_pages.push(page.clone());
        if page.first() == Some(&0x83) {
            self.tunnel_states.push_back(1);
            self.tunnel_states.push_back(0);
        }
    }

    fn mode_sense(&self) -> Vec<u8> {
        match &self.mode_pages {
            Some(select) => as_sense_data(select).unwrap_or_default(),
            None => {
                let mut d = vec![0u8; 8 + 16];
                d[1] = 22;
                d[8] = 0x21;
                d[9] = 14;
                d
            },
        }
    }

    fn read_buffer(&self, cdb: &[u8; 16]) -> Vec<u8> {
        let u24 = |at: usize| u32::from_be_bytes([0, cdb[at], cdb[at + 1], cdb[at + 2]]) as usize;
        let buf = self.buffers.get(&cdb[2]).cloned().unwrap_or_default();
        if cdb[1] & 0x1F == 0x03 {
            let cap = (buf.len() as u32).to_be_bytes();
            return vec![0, cap[1], cap[2], cap[3]];
        }
        let (offset, len) = (u24(3), u24(6));
        let end = (offset + len).min(buf.len());
        buf.get(offset..end).map(<[u8]>::to_vec).unwrap_or_default()
    }

    fn write_buffer(&mut self, cdb: &[u8; 16], data: &[u8]) {
        let offset = u32::from_be_bytes([0, cdb[3], cdb[4], cdb[5]]) as usize;
        let buf = self.buffers.entry(cdb[2]).or_default();
        if buf.len() < offset + data.len() {
            buf.resize(offset + data.len(), 0);
        }
        buf[offset..offset + data.len()].copy_from_slice(data);
    }
}

impl Transport for SimEnclosure {
    async fn submit(&self, request: ScsiRequest) -> Result<ScsiCompletion, TransportError> {
        if let Some(sem) = &self.hold {
            let permit = sem
                .acquire()
                .await
                .map_err(|_| TransportError::Rejected("simulator closed".into()))?;
            permit.forget();
        }
        self.answer(&request)
    }
}
