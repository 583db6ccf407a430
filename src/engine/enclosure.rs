// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The enclosure command/response engine.
//!
//! One `execute` runs one request end to end: admission, CDB build,
//! transport submit, validation, and application of the response to the
//! device model. The engine never retries on its own; the result carries
//! retry advice instead.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock,
    atomic::{AtomicU32, Ordering},
};

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info, warn};

use crate::{
    cfg::{
        config::Config,
        enums::{PlatformKind, SideId},
    },
    engine::{
        apply,
        arena::{Arena, Handle},
        builder::{BuildEnv, BuiltCommand, Direction, build},
        classifier::{SideEffect, classify, handle},
        fup::{FirmwareTarget, FupPhase, FupTracker},
        gate::AdmissionGate,
        mapping::{apply_fallback, platform_table},
        model::DeviceModel,
        request::{CommandResult, FirmwareOp, Request, RequestFrame},
        retry::{RetryContext, RetryEffect, decide},
        transport::{ScsiCompletion, ScsiRequest, Transport},
        validator::{Verdict, validate},
    },
    models::{
        common::ComponentType,
        element::{AttrValue, AttrWrite, Attribute, ComponentRef},
        opcode::Operation,
        pages::{
            DecodeContext,
            addl_status::AdditionalStatusPage,
            config::{ConfigPage, ElementGroup},
            download::{DownloadStatusPage, FwExtStatus, FwStatus},
            emc::EmcStatusPage,
            encl_status::EnclosureStatusPage,
            inquiry::EsesInquiry,
            mode_param::{EenpPage, ModePage, ModeParamList},
            read_buffer::ReadBufferDescriptor,
            statistics::StatisticsPage,
            threshold::ThresholdInPage,
            tunnel::TunnelStatusPage,
        },
        status::{BuildError, EnclosureStatus},
    },
    state_machine::{command_states::CommandCtx, common::StateMachineCtx},
};

bitflags::bitflags! {
    /// Follow-up work discovered while handling responses. The scheduler
    /// that owns the engine reads these and issues the matching requests.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PendingFlags: u32 {
        const CONFIG_UNKNOWN          = 1 << 0;
        const MODE_SENSE_NEEDED       = 1 << 1;
        const MODE_SELECT_NEEDED      = 1 << 2;
        /// MODE SENSE/SELECT of the EMC pages will never succeed.
        const MODE_UNSUPPORTED        = 1 << 3;
        const ADDL_STATUS_UNSUPPORTED = 1 << 4;
        const EMC_STATUS_UNSUPPORTED  = 1 << 5;
        /// Additional status applied, waiting for the EMC status page.
        const MAPPING_UPDATE          = 1 << 6;
        const EMC_CONTROL_NEEDED      = 1 << 7;
        /// Mapping came from the built-in platform tables.
        const FALLBACK_MAPPED         = 1 << 8;
    }
}

const GENERATION_UNKNOWN: u32 = u32::MAX;

#[derive(Debug)]
struct InFlight {
    operation: Operation,
}

/// Frees the in-flight slot when the command is done with it.
struct InFlightGuard<'a> {
    arena: &'a Mutex<Arena<InFlight>>,
    handle: Handle,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut arena = self.arena.lock().unwrap_or_else(PoisonError::into_inner);
        arena.remove(self.handle);
    }
}

#[derive(Debug, Default)]
struct Identity {
    platform: Option<PlatformKind>,
    serial: Option<String>,
    sensed_modes: Option<ModeParamList>,
    desired_eenp: EenpPage,
}

pub struct EnclosureEngine<T, M> {
    cfg: Config,
    transport: T,
    model: Arc<M>,
    gate: AdmissionGate,
    in_flight: Mutex<Arena<InFlight>>,
    generation: AtomicU32,
    pending: AtomicU32,
    groups: RwLock<Arc<Vec<ElementGroup>>>,
    identity: Mutex<Identity>,
    fup: tokio::sync::Mutex<FupTracker>,
    parked_tunnel: tokio::sync::Mutex<Option<RequestFrame>>,
}

impl<T: Transport, M: DeviceModel> EnclosureEngine<T, M> {
    pub fn new(cfg: Config, transport: T, model: Arc<M>) -> Self {
        let desired_eenp = EenpPage {
            sps_dev_supported: cfg.platform.sps_dev_supported.as_bool(),
            include_drive_connectors: cfg.platform.include_drive_connectors.as_bool(),
            ..Default::default()
        };
        let initial = PendingFlags::CONFIG_UNKNOWN | PendingFlags::MODE_SENSE_NEEDED;
        Self {
            gate: AdmissionGate::new(cfg.engine.max_outstanding_requests),
            in_flight: Mutex::new(Arena::with_capacity(cfg.engine.in_flight_slots)),
            generation: AtomicU32::new(GENERATION_UNKNOWN),
            pending: AtomicU32::new(initial.bits()),
            groups: RwLock::new(Arc::new(Vec::new())),
            identity: Mutex::new(Identity {
                platform: cfg.platform.platform,
                desired_eenp,
                ..Default::default()
            }),
            fup: tokio::sync::Mutex::new(FupTracker::new(cfg.engine.eses_version)),
            parked_tunnel: tokio::sync::Mutex::new(None),
            cfg,
            transport,
            model,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Requests currently admitted by the gate.
    #[inline]
    pub fn outstanding_count(&self) -> u32 {
        self.gate.outstanding()
    }

    /// CDB opcode of the most recently admitted request.
    #[inline]
    pub fn current_opcode(&self) -> u8 {
        self.gate.current_opcode()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn pending_flags(&self) -> PendingFlags {
        PendingFlags::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    /// Clear flags the caller has acted on.
    pub fn clear_pending(&self, flags: PendingFlags) {
        self.pending.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    fn set_pending(&self, flags: PendingFlags) {
        self.pending.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Generation code learned from the last Configuration page, `None`
    /// while the configuration is unknown.
    pub fn generation_code(&self) -> Option<u16> {
        if self.pending_flags().contains(PendingFlags::CONFIG_UNKNOWN) {
            return None;
        }
        match self.generation.load(Ordering::Acquire) {
            GENERATION_UNKNOWN => None,
            g => Some(g as u16),
        }
    }

    fn mark_config_unknown(&self) {
        self.set_pending(PendingFlags::CONFIG_UNKNOWN);
        self.generation.store(GENERATION_UNKNOWN, Ordering::Release);
    }

    pub fn element_groups(&self) -> Arc<Vec<ElementGroup>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn platform(&self) -> Option<PlatformKind> {
        self.identity().platform
    }

    fn identity(&self) -> MutexGuard<'_, Identity> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn fup_phase(&self) -> FupPhase {
        self.fup.lock().await.phase()
    }

    pub async fn fup_status(&self) -> FwStatus {
        self.fup.lock().await.status()
    }

    pub async fn fup_additional_status(&self) -> FwExtStatus {
        self.fup.lock().await.additional_status()
    }

    /// Forget a finished or failed firmware update.
    pub async fn fup_reset(&self) {
        self.fup.lock().await.reset();
    }

    /// Mode parameter list a MODE SELECT should push: the last sensed pages
    /// with the EENP flags replaced by the desired ones.
    pub fn desired_mode_pages(&self) -> ModeParamList {
        let id = self.identity();
        let mut list = id.sensed_modes.clone().unwrap_or_default();
        list.pages.retain(|p| !matches!(p, ModePage::Other { .. }));
        match list.pages.iter_mut().find(|p| matches!(p, ModePage::Eenp(_))) {
            Some(p) => *p = ModePage::Eenp(id.desired_eenp),
            None => list.pages.push(ModePage::Eenp(id.desired_eenp)),
        }
        list
    }

    /// Run one request.
    pub async fn execute(&self, request: Request) -> CommandResult {
        self.execute_frame(RequestFrame::new(request)).await
    }

    /// Run one request frame; use this for retries (`RequestFrame::retry`)
    /// and continuations that carry a parent.
    pub async fn execute_frame(&self, mut frame: RequestFrame) -> CommandResult {
        let op = frame.request.operation();
        let opcode = op.family().opcode();

        // declared first so it is released last
        let Some(_gate) = self.gate.try_admit(opcode) else {
            let mut r = CommandResult::new(EnclosureStatus::Busy, op, 0);
            self.finish(&frame, &mut r).await;
            return r;
        };

        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(InFlight { operation: op });
        let Ok(handle) = inserted else {
            debug!(%op, "no free in-flight slot");
            let mut r = CommandResult::new(EnclosureStatus::Busy, op, 0);
            self.finish(&frame, &mut r).await;
            return r;
        };
        let _slot = InFlightGuard {
            arena: &self.in_flight,
            handle,
        };

        let correlation = handle.to_token();
        frame.correlation = correlation;
        if op == Operation::GetTunnelCommandStatus && frame.parent.is_none() {
            frame.parent = self.parked_tunnel.lock().await.take().map(Box::new);
        }

        let span = debug_span!("enclosure_cmd", correlation, %op, attempt = frame.attempt);
        let mut ctx = CommandCtx::new(self, frame);
        let mut result = match ctx.execute().instrument(span).await {
            Ok(r) => r,
            Err(e) => {
                warn!(%op, correlation, "command lifecycle failed: {e:#}");
                CommandResult::new(EnclosureStatus::LifecycleFailed, op, correlation)
            },
        };
        let frame = ctx.into_frame();
        self.finish(&frame, &mut result).await;
        self.park_or_release_tunnel(frame, &result).await;
        result
    }

    /// Attach retry advice and apply its flag effect.
    async fn finish(&self, frame: &RequestFrame, result: &mut CommandResult) {
        let fw_bytes = self.fup.lock().await.bytes_transferred();
        let ctx = RetryContext {
            max_retry: self.cfg.engine.max_command_retry,
            enclosure_ready: !self.pending_flags().contains(PendingFlags::CONFIG_UNKNOWN),
            fw_bytes,
        };
        result.retry = decide(result.operation, result.status, frame.attempt, &ctx);
        match result.retry.effect {
            RetryEffect::None => {},
            RetryEffect::ClearSpsSupported => {
                self.identity().desired_eenp.sps_dev_supported = false;
            },
            RetryEffect::MarkModeUnsupported => self.set_pending(PendingFlags::MODE_UNSUPPORTED),
            RetryEffect::MarkEmcControlNeeded => {
                self.set_pending(PendingFlags::EMC_CONTROL_NEEDED)
            },
        }
    }

    /// A tunnelled send that went out is parked until a tunnel status poll
    /// reports on it; a poll still in progress keeps its parent parked.
    async fn park_or_release_tunnel(&self, frame: RequestFrame, result: &CommandResult) {
        let keep = if frame.request.is_tunnelled_send() {
            result.status == EnclosureStatus::MoreProcessingRequired || result.is_ok()
        } else {
            false
        };
        let op = frame.request.operation();
        if keep {
            let mut parked = frame;
            parked.parent = None;
            *self.parked_tunnel.lock().await = Some(parked);
        } else if op == Operation::GetTunnelCommandStatus
            && result.status == EnclosureStatus::MoreProcessingRequired
        {
            if let Some(parent) = frame.parent {
                *self.parked_tunnel.lock().await = Some(*parent);
            }
        }
    }

    // ---- steps driven by CommandCtx ----

    pub(crate) async fn build_command(
        &self,
        frame: &RequestFrame,
    ) -> Result<BuiltCommand, BuildError> {
        let groups = self.element_groups();
        let fw_sent = {
            let mut fup = self.fup.lock().await;
            match &frame.request {
                Request::DownloadFirmware(FirmwareOp::Download { target, side, .. })
                | Request::TunnelDownloadFirmware(FirmwareOp::Download { target, side, .. }) => {
                    if !fup.is_downloading(*target, *side) {
                        let tunnel = frame.request.is_tunnelled_send();
                        fup.begin_download(*target, *side, tunnel, Instant::now());
                    }
                    fup.bytes_transferred()
                },
                _ => 0,
            }
        };
        let env = BuildEnv {
            cfg: &self.cfg.engine,
            generation: self.generation_code(),
            groups: &groups,
            model: &*self.model,
            fw_sent,
            local_side: self.cfg.platform.local_side,
        };
        build(&frame.request, &env)
    }

    pub(crate) async fn submit(
        &self,
        correlation: u64,
        built: &mut BuiltCommand,
    ) -> Result<ScsiCompletion, EnclosureStatus> {
        let mut data_in = Vec::new();
        if built.direction == Direction::In {
            data_in
                .try_reserve_exact(built.allocation_length as usize)
                .map_err(|_| EnclosureStatus::MemAllocFailed)?;
        }
        let request = ScsiRequest {
            port_id: self.cfg.target.port_id,
            target_id: self.cfg.target.target_id,
            correlation,
            cdb: built.cdb,
            data_out: std::mem::take(&mut built.data_out),
            data_in,
            timeout: built.timeout,
        };
        debug!(opcode = built.cdb.opcode(), len = request.data_out.len(), "submit");

        let completion = match tokio::time::timeout(built.timeout, self.transport.submit(request))
            .await
        {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                warn!("transport error: {e}");
                return Err((&e).into());
            },
            Err(_) => {
                warn!(timeout = ?built.timeout, "command timed out");
                return Err(EnclosureStatus::CdbRequestFailed);
            },
        };

        let owner = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(Handle::from_token(completion.correlation))
            .map(|f| f.operation);
        if completion.correlation != correlation || owner.is_none() {
            warn!(
                expected = correlation,
                got = completion.correlation,
                owner = ?owner,
                "completion for an unknown request"
            );
            return Err(EnclosureStatus::CdbRequestFailed);
        }
        Ok(completion)
    }

    pub(crate) fn check(
        &self,
        frame: &RequestFrame,
        built: &BuiltCommand,
        completion: &ScsiCompletion,
    ) -> Verdict {
        validate(
            frame.request.operation(),
            built.expected_page,
            &completion.outcome(),
            &completion.data_in,
            built.allocation_length,
            self.generation_code(),
        )
    }

    /// Apply a side effect requested by the classifier or the validator.
    /// Returns the status to report instead, if it changes.
    pub(crate) fn apply_effect(&self, op: Operation, effect: SideEffect) -> Option<EnclosureStatus> {
        match effect {
            SideEffect::None => None,
            SideEffect::MarkConfigUnknown => {
                info!(%op, "configuration marked unknown");
                self.mark_config_unknown();
                None
            },
            SideEffect::MarkModeSenseNeeded => {
                self.set_pending(PendingFlags::MODE_SENSE_NEEDED);
                None
            },
            SideEffect::MarkModePageUnsupported => {
                self.set_pending(PendingFlags::MODE_UNSUPPORTED);
                None
            },
            SideEffect::RunFallbackMapping => {
                let flag = if op == Operation::GetAdditionalStatus {
                    PendingFlags::ADDL_STATUS_UNSUPPORTED
                } else {
                    PendingFlags::EMC_STATUS_UNSUPPORTED
                };
                self.set_pending(flag);
                let Some(table) = self.platform().and_then(platform_table) else {
                    warn!(%op, "page unsupported and no platform table to fall back on");
                    return Some(EnclosureStatus::FunctionUnsupported);
                };
                match apply_fallback(&*self.model, table, self.cfg.platform.local_side) {
                    Ok(_) => {
                        self.set_pending(PendingFlags::FALLBACK_MAPPED);
                        self.clear_pending(PendingFlags::MAPPING_UPDATE);
                        None
                    },
                    Err(e) => {
                        warn!(%op, "fallback mapping failed: {e}");
                        Some((&e).into())
                    },
                }
            },
        }
    }

    /// A command did not complete cleanly.
    pub(crate) async fn on_failure(&self, frame: &RequestFrame, status: EnclosureStatus) {
        if !matches!(
            frame.request,
            Request::GetDownloadStatus | Request::TunnelGetDownloadStatus
        ) {
            return;
        }
        let mut fup = self.fup.lock().await;
        if !matches!(fup.phase(), FupPhase::Downloading | FupPhase::Activating) {
            return;
        }
        // the expander reset after an activate drops commands for a while
        if fup.grace_active(Instant::now()) {
            debug!(%status, "download status read failed inside activation grace window");
            return;
        }
        fup.status_read_failed();
    }

    /// Decode and apply a validated response. `data` is the inbound bytes
    /// trimmed to the transferred count.
    pub(crate) async fn apply(
        &self,
        frame: &RequestFrame,
        built: &BuiltCommand,
        data: Bytes,
        result: &mut CommandResult,
    ) {
        let op = frame.request.operation();
        let outcome = self.apply_inner(frame, built, &data, result).await;
        match outcome {
            Ok(status) => result.status = status,
            Err(status) => {
                warn!(%op, %status, "response could not be applied");
                result.status = status;
            },
        }
        if result.data.is_none() && built.direction == Direction::In {
            result.data = Some(data);
        }
    }

    fn batch(&self, writes: Vec<AttrWrite>) -> Result<usize, EnclosureStatus> {
        self.model.apply_batch(writes).map_err(|e| (&e).into())
    }

    async fn apply_inner(
        &self,
        frame: &RequestFrame,
        built: &BuiltCommand,
        data: &Bytes,
        result: &mut CommandResult,
    ) -> Result<EnclosureStatus, EnclosureStatus> {
        use EnclosureStatus as S;
        let version = self.cfg.engine.eses_version;
        let groups = self.element_groups();
        let ctx = DecodeContext::new(version, &groups);
        let invalid = |e: anyhow::Error| {
            debug!("page decode failed: {e:#}");
            S::PageInvalid
        };

        match &frame.request {
            Request::GetInquiryData => {
                let inq = EsesInquiry::parse(data).map_err(invalid)?;
                if inq.serial_unknown() {
                    debug!("enclosure serial not known yet");
                    return Ok(S::Busy);
                }
                let mut id = self.identity();
                if let Some(p) = inq.platform() {
                    id.platform = Some(p);
                }
                id.serial = Some(inq.serial_number.clone());
                info!(platform = ?id.platform, serial = %inq.serial_number, "enclosure identified");
                Ok(S::Ok)
            },
            Request::ValidateIdentity => {
                let inq = EsesInquiry::parse(data).map_err(invalid)?;
                if inq.serial_unknown() {
                    return Ok(S::Busy);
                }
                let held = self.identity().serial.replace(inq.serial_number.clone());
                match held {
                    Some(s) if s != inq.serial_number => {
                        warn!(held = %s, reported = %inq.serial_number, "enclosure identity changed");
                        self.mark_config_unknown();
                        Ok(S::ConfigurationUnknown)
                    },
                    _ => Ok(S::Ok),
                }
            },
            Request::GetConfiguration | Request::GetSasEnclosureType => {
                let page = ConfigPage::parse(data, version).map_err(invalid)?;
                if matches!(frame.request, Request::GetConfiguration) {
                    for (ty, n) in apply::component_counts(&page.groups) {
                        self.model.set_component_count(ty, n);
                    }
                    let writes = apply::config_writes(&page, self.cfg.platform.local_side);
                    result.model_updates = self.batch(writes)?;
                } else if let Some(p) = page.primary() {
                    result.data = Some(Bytes::from(p.product_id.clone().into_bytes()));
                }
                self.adopt_configuration(page);
                Ok(S::Ok)
            },
            Request::GetStatus => {
                let page = EnclosureStatusPage::parse(data, ctx).map_err(invalid)?;
                result.model_updates = self.batch(apply::status_writes(&page, &groups))?;
                debug!(updates = result.model_updates, "status applied");
                Ok(S::Ok)
            },
            Request::GetAdditionalStatus => {
                let page = AdditionalStatusPage::parse(data, ctx).map_err(invalid)?;
                result.model_updates = self.batch(apply::addl_status_writes(&page, &groups))?;
                self.set_pending(PendingFlags::MAPPING_UPDATE);
                Ok(S::Ok)
            },
            Request::GetEmcSpecificStatus => {
                let page = EmcStatusPage::parse(data, ctx).map_err(invalid)?;
                result.model_updates = self.batch(apply::emc_status_writes(&page, &groups))?;
                self.clear_pending(PendingFlags::MAPPING_UPDATE);
                Ok(S::Ok)
            },
            Request::GetTraceBufferInfo { allocation } => {
                let page = EmcStatusPage::parse(data, ctx).map_err(invalid)?;
                let mut records = apply::trace_buffer_records(&page);
                let status = if records.len() > *allocation as usize {
                    records.truncate(*allocation as usize);
                    S::AllocatedMemoryInsufficient
                } else {
                    S::Ok
                };
                result.data = Some(Bytes::from(records));
                Ok(status)
            },
            Request::GetDownloadStatus => {
                let page = DownloadStatusPage::parse(data).map_err(invalid)?;
                self.observe_download_status(&page).await;
                Ok(S::Ok)
            },
            Request::ThresholdIn => {
                let page = ThresholdInPage::parse(data, ctx).map_err(invalid)?;
                result.model_updates = self.batch(apply::threshold_writes(&page, &groups))?;
                Ok(S::Ok)
            },
            Request::GetEmcStatistics => {
                let page = StatisticsPage::parse(data, ctx).map_err(invalid)?;
                result.model_updates = self.batch(apply::statistics_writes(&page, &groups))?;
                Ok(S::Ok)
            },
            Request::ModeSense { .. } => {
                let list = ModeParamList::parse(data).map_err(invalid)?;
                let mut id = self.identity();
                let mismatch = list.eenp().is_some_and(|e| e != id.desired_eenp);
                id.sensed_modes = Some(list);
                drop(id);
                self.clear_pending(PendingFlags::MODE_SENSE_NEEDED);
                if mismatch {
                    debug!("sensed EENP flags differ from desired");
                    self.set_pending(PendingFlags::MODE_SELECT_NEEDED);
                }
                Ok(S::Ok)
            },
            Request::ModeSelect(_) => {
                self.clear_pending(PendingFlags::MODE_SELECT_NEEDED);
                Ok(S::Ok)
            },
            Request::SetEmcSpecificControl(_) => {
                self.clear_pending(PendingFlags::EMC_CONTROL_NEEDED);
                Ok(S::Ok)
            },
            Request::GetResumePromSize { .. } => {
                let desc = ReadBufferDescriptor::parse(data).map_err(invalid)?;
                result.data = Some(Bytes::copy_from_slice(&desc.capacity.to_be_bytes()));
                Ok(S::Ok)
            },
            Request::DownloadFirmware(fw) => self.firmware_sent(fw, built, false).await,
            Request::TunnelDownloadFirmware(fw) => {
                self.firmware_sent(fw, built, true).await?;
                Ok(S::MoreProcessingRequired)
            },
            Request::TunnelGetConfiguration | Request::TunnelGetDownloadStatus => {
                Ok(S::MoreProcessingRequired)
            },
            Request::GetTunnelCommandStatus => {
                let page = TunnelStatusPage::parse(data).map_err(invalid)?;
                self.tunnel_status(frame, page, result).await
            },
            Request::SetTraceBufferInfoControl { .. }
            | Request::SetEnclosureControl(_)
            | Request::StringOut { .. }
            | Request::ThresholdOut(_)
            | Request::EmcStatisticsControl { .. }
            | Request::ReadBuffer { .. }
            | Request::ReadResume { .. }
            | Request::WriteResume { .. }
            | Request::RawInquiry { .. }
            | Request::RawReceiveDiagnostic { .. }
            | Request::SpsInBuffer { .. }
            | Request::SpsEeprom { .. } => Ok(S::Ok),
        }
    }

    fn adopt_configuration(&self, page: ConfigPage) {
        let generation = page.header.generation_code;
        *self.groups.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(page.groups);
        self.generation.store(generation as u32, Ordering::Release);
        self.clear_pending(PendingFlags::CONFIG_UNKNOWN);
        info!(generation, "configuration refreshed");
    }

    fn target_revision(&self, target: FirmwareTarget, side: u8) -> Option<String> {
        let comp = target.component(side).ok()?;
        self.model.get_text(comp, target.revision_attr()).ok()
    }

    async fn observe_download_status(&self, page: &DownloadStatusPage) {
        let mut fup = self.fup.lock().await;
        let revision = fup
            .context()
            .and_then(|c| self.target_revision(c.target, c.side));
        let phase = fup.observe_status(page.status, revision.as_deref(), Instant::now());
        debug!(code = page.status, ?phase, "download status observed");
    }

    async fn firmware_sent(
        &self,
        fw: &FirmwareOp,
        built: &BuiltCommand,
        tunnelled: bool,
    ) -> Result<EnclosureStatus, EnclosureStatus> {
        let mut fup = self.fup.lock().await;
        match fw {
            FirmwareOp::Download { image, .. } => {
                fup.chunk_sent(built.fw_chunk.unwrap_or(0));
                let sent = fup.bytes_transferred() as usize;
                debug!(sent, total = image.len(), tunnelled, "firmware chunk accepted");
                Ok(if sent < image.len() {
                    EnclosureStatus::MoreProcessingRequired
                } else {
                    EnclosureStatus::Ok
                })
            },
            FirmwareOp::Activate { target, side } => {
                let revision = self.target_revision(*target, *side);
                let armed = fup.begin_activate(*target, *side, revision, Instant::now());
                info!(?target, side, armed, tunnelled, "firmware activation started");
                Ok(EnclosureStatus::Ok)
            },
        }
    }

    async fn tunnel_status(
        &self,
        frame: &RequestFrame,
        page: TunnelStatusPage,
        result: &mut CommandResult,
    ) -> Result<EnclosureStatus, EnclosureStatus> {
        use EnclosureStatus as S;
        if page.state.is_processing() {
            debug!(state = ?page.state, "tunnelled command still processing");
            return Ok(S::MoreProcessingRequired);
        }
        if !page.remote_good() {
            let status = match page.response.and_then(|r| r.sense) {
                Some(t) => {
                    result.sense = Some(t);
                    handle(
                        frame
                            .parent
                            .as_ref()
                            .map_or(Operation::GetTunnelCommandStatus, |p| p.request.operation()),
                        classify(t.sense_key, t.asc, t.ascq),
                    )
                    .0
                },
                None => S::CmdFailed,
            };
            warn!(state = ?page.state, %status, "tunnelled command failed");
            return Ok(status);
        }

        let remote = Bytes::from(page.data);
        let Some(parent) = frame.parent.as_deref() else {
            result.data = Some(remote);
            return Ok(S::Ok);
        };
        match &parent.request {
            Request::TunnelDownloadFirmware(FirmwareOp::Download { image, .. }) => {
                let sent = self.fup.lock().await.bytes_transferred() as usize;
                Ok(if sent < image.len() {
                    S::MoreProcessingRequired
                } else {
                    S::Ok
                })
            },
            Request::TunnelGetDownloadStatus => {
                let page = DownloadStatusPage::parse(&remote).map_err(|_| S::PageInvalid)?;
                self.observe_download_status(&page).await;
                result.data = Some(remote);
                Ok(S::Ok)
            },
            Request::TunnelGetConfiguration => {
                let peer = ConfigPage::parse(&remote, self.cfg.engine.eses_version)
                    .map_err(|_| S::PageInvalid)?;
                result.model_updates = self.apply_peer_config(&peer)?;
                result.data = Some(remote);
                Ok(S::Ok)
            },
            _ => Ok(S::Ok),
        }
    }

    /// Peer LCC revisions as reported through the tunnel.
    fn apply_peer_config(&self, peer: &ConfigPage) -> Result<usize, EnclosureStatus> {
        let peer_side: SideId = self.cfg.platform.local_side.peer();
        let Some(primary) = peer.primary() else {
            return Ok(0);
        };
        let lcc = ComponentRef::new(ComponentType::Lcc, peer_side.index() as usize);
        let mut changed = 0;
        for v in primary.versions.iter().filter(|v| v.comp_type == 6) {
            changed += self
                .model
                .set_attribute(lcc, Attribute::FwRevision, AttrValue::from(v.revision.as_str()))
                .map(usize::from)
                .map_err(|e| EnclosureStatus::from(&e))?;
        }
        Ok(changed)
    }
}
