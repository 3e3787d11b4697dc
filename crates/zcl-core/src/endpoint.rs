//! Zigbee endpoint: clusters, callbacks, reporting and alarm slots

use crate::arena::Handle;
use crate::attribute::{Access, Attribute};
use crate::cluster::{
    id, identify_attrs, on_off_attrs, Cluster, ClusterRole, ClusterTable, OnOffCommand,
};
use crate::error::{AccessKind, Missing, ZclError};
use crate::reporting::{ReportDestination, ReportState, ReportingInfo};
use crate::stack::{FrameKind, InboundCommand, Opcode, OutboundFrame};
use std::sync::Arc;
use zcl_types::{Address, AttrValue, CodecError, GlobalCommand, ZclStatus};

/// Lowest application endpoint id
pub const MIN_ENDPOINT: u8 = 1;
/// Highest application endpoint id
pub const MAX_ENDPOINT: u8 = 240;

pub const DEFAULT_REPORTING_CAPACITY: usize = 16;
pub const DEFAULT_ALARM_CAPACITY: usize = 4;

/// Something the application should know about
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A cluster-specific command arrived
    Command {
        cluster_id: u16,
        command_id: u8,
        payload: Vec<u8>,
    },
    /// A remote peer wrote an attribute
    AttributeWritten {
        cluster_id: u16,
        attr_id: u16,
        value: AttrValue,
    },
    /// A report arrived on a client cluster
    ReportReceived {
        cluster_id: u16,
        attr_id: u16,
        source: Address,
        value: AttrValue,
    },
    /// A receive-side binding went silent
    ReportTimeout {
        cluster_id: u16,
        attr_id: u16,
        source: Address,
    },
}

impl DeviceEvent {
    /// The error condition carried by advisory events
    #[must_use]
    pub fn as_error(&self) -> Option<ZclError> {
        match self {
            DeviceEvent::ReportTimeout {
                cluster_id,
                attr_id,
                source,
            } => Some(ZclError::ReportTimeout {
                cluster_id: *cluster_id,
                attr_id: *attr_id,
                source_addr: *source,
            }),
            _ => None,
        }
    }
}

/// Application callback for device events
pub trait DeviceHandler: Send + Sync {
    fn handle(&self, event: &DeviceEvent);
}

impl<F> DeviceHandler for F
where
    F: Fn(&DeviceEvent) + Send + Sync,
{
    fn handle(&self, event: &DeviceEvent) {
        self(event);
    }
}

/// Application callback for identify start (non-zero) and stop (zero)
pub trait IdentifyHandler: Send + Sync {
    fn identify(&self, param: u16);
}

impl<F> IdentifyHandler for F
where
    F: Fn(u16) + Send + Sync,
{
    fn identify(&self, param: u16) {
        self(param);
    }
}

/// Callback queued while the endpoint lock is held
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Notification {
    Identify(u16),
    Device(DeviceEvent),
}

/// Continuous-value-change alarm slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmVariable {
    pub endpoint: u8,
    pub cluster_id: u16,
    pub attr_id: u16,
    pub alarm_buf_id: u8,
    pub in_use: bool,
}

/// Simple descriptor of an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleDescriptor {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    /// Only the low 4 bits are meaningful
    pub device_version: u8,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
}

impl SimpleDescriptor {
    /// Serialize in the over-the-air layout
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 2 * (self.in_clusters.len() + self.out_clusters.len()));
        buf.push(self.endpoint);
        buf.extend_from_slice(&self.profile_id.to_le_bytes());
        buf.extend_from_slice(&self.device_id.to_le_bytes());
        buf.push(self.device_version & 0x0F);
        for clusters in [&self.in_clusters, &self.out_clusters] {
            let count = u8::try_from(clusters.len()).unwrap_or(u8::MAX);
            buf.push(count);
            for cluster in clusters.iter().take(usize::from(count)) {
                buf.extend_from_slice(&cluster.to_le_bytes());
            }
        }
        buf
    }

    /// Parse the over-the-air layout
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < 6 {
            return Err(CodecError::TooShort {
                needed: 6,
                actual: data.len(),
            });
        }

        let endpoint = data[0];
        let profile_id = u16::from_le_bytes([data[1], data[2]]);
        let device_id = u16::from_le_bytes([data[3], data[4]]);
        let device_version = data[5] & 0x0F;
        let mut idx = 6;

        let mut lists = [Vec::new(), Vec::new()];
        for list in &mut lists {
            let Some(&count) = data.get(idx) else {
                return Err(CodecError::TooShort {
                    needed: idx + 1,
                    actual: data.len(),
                });
            };
            idx += 1;

            let needed = idx + 2 * usize::from(count);
            if data.len() < needed {
                return Err(CodecError::TooShort {
                    needed,
                    actual: data.len(),
                });
            }
            for _ in 0..count {
                list.push(u16::from_le_bytes([data[idx], data[idx + 1]]));
                idx += 2;
            }
        }
        let [in_clusters, out_clusters] = lists;

        Ok(Self {
            endpoint,
            profile_id,
            device_id,
            device_version,
            in_clusters,
            out_clusters,
        })
    }
}

/// Result of a reporting poll
#[derive(Debug, Default)]
pub(crate) struct PollOutcome {
    pub reports: Vec<OutboundFrame>,
    pub timeouts: usize,
}

/// Result of handling an inbound command
#[derive(Debug)]
pub(crate) struct CommandOutcome {
    pub status: ZclStatus,
    pub response: Option<OutboundFrame>,
}

/// A local application endpoint
pub struct Endpoint {
    id: u8,
    profile_id: u16,
    device_id: u16,
    device_version: u8,
    clusters: ClusterTable,
    device_handler: Option<Arc<dyn DeviceHandler>>,
    identify_handler: Option<Arc<dyn IdentifyHandler>>,
    reporting: Vec<ReportingInfo>,
    reporting_capacity: usize,
    alarms: Vec<AlarmVariable>,
    identify_deadline: Option<u32>,
    pending: Vec<Notification>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("profile_id", &format_args!("{:#06x}", self.profile_id))
            .field("device_id", &format_args!("{:#06x}", self.device_id))
            .field("clusters", &self.clusters.len())
            .field("reporting", &self.reporting.len())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Create an endpoint. Ids outside 1..=240 are rejected.
    pub fn new(id: u8, profile_id: u16) -> Result<Self, ZclError> {
        if !(MIN_ENDPOINT..=MAX_ENDPOINT).contains(&id) {
            return Err(ZclError::InvalidArgument(format!(
                "endpoint id {id} outside {MIN_ENDPOINT}..={MAX_ENDPOINT}"
            )));
        }
        Ok(Self {
            id,
            profile_id,
            device_id: 0,
            device_version: 0,
            clusters: ClusterTable::new(id),
            device_handler: None,
            identify_handler: None,
            reporting: Vec::new(),
            reporting_capacity: DEFAULT_REPORTING_CAPACITY,
            alarms: vec![AlarmVariable::default(); DEFAULT_ALARM_CAPACITY],
            identify_deadline: None,
            pending: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_device(mut self, device_id: u16, device_version: u8) -> Self {
        self.device_id = device_id;
        self.device_version = device_version & 0x0F;
        self
    }

    /// Resize the reporting and alarm slot tables
    #[must_use]
    pub fn with_capacities(mut self, reporting: usize, alarms: usize) -> Self {
        self.reporting_capacity = reporting;
        self.alarms.resize(alarms, AlarmVariable::default());
        self
    }

    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[must_use]
    pub fn profile_id(&self) -> u16 {
        self.profile_id
    }

    #[must_use]
    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    #[must_use]
    pub fn device_version(&self) -> u8 {
        self.device_version
    }

    #[must_use]
    pub fn clusters(&self) -> &ClusterTable {
        &self.clusters
    }

    pub fn add_cluster(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attrs: Vec<Attribute>,
        manuf_code: Option<u16>,
    ) -> Result<Handle, ZclError> {
        self.clusters.add_cluster(cluster_id, role, attrs, manuf_code)
    }

    pub fn insert_cluster(&mut self, cluster: Cluster) -> Result<Handle, ZclError> {
        self.clusters.insert(cluster)
    }

    /// Remove a cluster and cancel its reporting entries.
    /// Returns how many entries were cancelled.
    pub fn remove_cluster(&mut self, cluster_id: u16, role: ClusterRole) -> Result<usize, ZclError> {
        self.clusters.remove(cluster_id, role)?;
        let before = self.reporting.len();
        self.reporting
            .retain(|r| !(r.cluster_id == cluster_id && r.role == role));
        let cancelled = before - self.reporting.len();
        if cluster_id == id::IDENTIFY && role == ClusterRole::Server {
            self.identify_deadline = None;
        }
        tracing::info!(
            "Endpoint {}: removed cluster {:#06x} ({:?}), cancelled {} reporting entries",
            self.id,
            cluster_id,
            role,
            cancelled
        );
        Ok(cancelled)
    }

    /// Run every pending cluster init hook.
    ///
    /// Hooks run with the endpoint locked when called through the registry.
    pub fn initialize_clusters(&mut self) {
        for cluster in self.clusters.iter_mut().filter(|c| !c.is_initialized()) {
            if let Err(e) = cluster.initialize() {
                tracing::warn!("Endpoint {}: {}", self.id, e);
            }
        }
    }

    pub fn set_device_handler(&mut self, handler: Arc<dyn DeviceHandler>) {
        self.device_handler = Some(handler);
    }

    pub fn set_identify_handler(&mut self, handler: Arc<dyn IdentifyHandler>) {
        self.identify_handler = Some(handler);
    }

    #[must_use]
    pub fn device_handler(&self) -> Option<Arc<dyn DeviceHandler>> {
        self.device_handler.clone()
    }

    #[must_use]
    pub fn identify_handler(&self) -> Option<Arc<dyn IdentifyHandler>> {
        self.identify_handler.clone()
    }

    #[must_use]
    pub fn simple_descriptor(&self) -> SimpleDescriptor {
        SimpleDescriptor {
            endpoint: self.id,
            profile_id: self.profile_id,
            device_id: self.device_id,
            device_version: self.device_version,
            in_clusters: self.clusters.in_clusters(),
            out_clusters: self.clusters.out_clusters(),
        }
    }

    pub fn read_attribute(
        &self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
    ) -> Result<&AttrValue, ZclError> {
        self.clusters.find(cluster_id, role)?.attributes().read(attr_id)
    }

    /// Remote write; requires the WRITE bit
    pub fn write_attribute(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
        value: AttrValue,
        now: u32,
    ) -> Result<bool, ZclError> {
        self.update_attribute(cluster_id, role, attr_id, value, now, false)
    }

    /// Local write from the application
    pub fn set_attribute(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
        value: AttrValue,
        now: u32,
    ) -> Result<bool, ZclError> {
        self.update_attribute(cluster_id, role, attr_id, value, now, true)
    }

    fn update_attribute(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
        value: AttrValue,
        now: u32,
        local: bool,
    ) -> Result<bool, ZclError> {
        let baseline = self
            .reporting
            .iter()
            .find(|r| r.is_send() && r.matches(cluster_id, role, attr_id))
            .and_then(ReportingInfo::baseline);
        let attrs = self.clusters.find_mut(cluster_id, role)?.attributes_mut();
        let identify_time = match (cluster_id, role, attr_id, &value) {
            (id::IDENTIFY, ClusterRole::Server, identify_attrs::IDENTIFY_TIME, AttrValue::U16(t)) => {
                Some(*t)
            }
            _ => None,
        };

        let reportable = if local {
            attrs.set(attr_id, value, baseline)?
        } else {
            attrs.write(attr_id, value, baseline)?
        };

        for info in self
            .reporting
            .iter_mut()
            .filter(|r| r.matches(cluster_id, role, attr_id))
        {
            info.on_write(reportable, now);
        }

        if let Some(seconds) = identify_time {
            self.identify(seconds, now);
        }
        Ok(reportable)
    }

    fn identify(&mut self, seconds: u16, now: u32) {
        if seconds > 0 {
            self.identify_deadline = Some(now.wrapping_add(u32::from(seconds)));
            tracing::debug!("Endpoint {}: identify for {}s", self.id, seconds);
            self.pending.push(Notification::Identify(seconds));
        } else if self.identify_deadline.take().is_some() {
            tracing::debug!("Endpoint {}: identify stopped", self.id);
            self.pending.push(Notification::Identify(0));
        }
    }

    #[must_use]
    pub fn is_identifying(&self) -> bool {
        self.identify_deadline.is_some()
    }

    fn tick_identify(&mut self, now: u32) {
        let Some(deadline) = self.identify_deadline else {
            return;
        };
        let remaining = deadline.saturating_sub(now);
        if remaining == 0 {
            let stopped = self.set_attribute(
                id::IDENTIFY,
                ClusterRole::Server,
                identify_attrs::IDENTIFY_TIME,
                AttrValue::U16(0),
                now,
            );
            if stopped.is_err() {
                // Cluster vanished mid-identify; still tell the application
                self.identify(0, now);
            }
        } else if let Ok(cluster) = self.clusters.find_mut(id::IDENTIFY, ClusterRole::Server) {
            let remaining = u16::try_from(remaining).unwrap_or(u16::MAX);
            if let Err(e) = cluster.attributes_mut().set(
                identify_attrs::IDENTIFY_TIME,
                AttrValue::U16(remaining),
                None,
            ) {
                tracing::warn!("Endpoint {}: identify countdown: {}", self.id, e);
            }
        }
    }

    /// Create or update a reporting entry.
    ///
    /// An existing `(cluster, role, attribute)` entry is updated in place;
    /// a new one needs a free slot.
    pub fn configure_reporting(&mut self, mut info: ReportingInfo) -> Result<(), ZclError> {
        if info.endpoint != self.id {
            return Err(ZclError::InvalidArgument(format!(
                "reporting entry for endpoint {} configured on endpoint {}",
                info.endpoint, self.id
            )));
        }
        info.validate()?;

        if let Ok(cluster) = self.clusters.find(info.cluster_id, info.role) {
            if let Some(attr) = cluster.attributes().get(info.attr_id) {
                if info.is_send() {
                    if !attr.access().contains(Access::REPORTING) {
                        return Err(ZclError::AccessDenied {
                            attr_id: info.attr_id,
                            access: AccessKind::Report,
                        });
                    }
                    if let Some(delta) = info.send_info().and_then(|s| s.delta.as_ref()) {
                        if delta.data_type() != attr.data_type() {
                            return Err(ZclError::TypeMismatch {
                                expected: attr.data_type(),
                                actual: delta.data_type(),
                            });
                        }
                    }
                    info.seed(attr.value());
                }
            }
        }

        if let Some(existing) = self
            .reporting
            .iter_mut()
            .find(|r| r.matches(info.cluster_id, info.role, info.attr_id))
        {
            existing.reconfigure(info);
            tracing::debug!(
                "Endpoint {}: reconfigured reporting for cluster {:#06x} attr {:#06x}",
                self.id,
                existing.cluster_id,
                existing.attr_id
            );
            return Ok(());
        }

        if self.reporting.len() >= self.reporting_capacity {
            return Err(ZclError::CapacityExceeded(format!(
                "endpoint {} reporting table full ({} entries)",
                self.id, self.reporting_capacity
            )));
        }

        tracing::info!(
            "Endpoint {}: reporting configured for cluster {:#06x} attr {:#06x} ({:?})",
            self.id,
            info.cluster_id,
            info.attr_id,
            info.role
        );
        self.reporting.push(info);
        Ok(())
    }

    /// Stop reporting an attribute
    pub fn remove_reporting(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
    ) -> Result<ReportingInfo, ZclError> {
        let pos = self
            .reporting
            .iter()
            .position(|r| r.matches(cluster_id, role, attr_id))
            .ok_or(ZclError::NotFound(Missing::Reporting {
                cluster_id,
                attr_id,
            }))?;
        Ok(self.reporting.remove(pos))
    }

    /// Restore an entry's default intervals
    pub fn reset_reporting(
        &mut self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
    ) -> Result<(), ZclError> {
        self.reporting
            .iter_mut()
            .find(|r| r.matches(cluster_id, role, attr_id))
            .map(ReportingInfo::reset_to_defaults)
            .ok_or(ZclError::NotFound(Missing::Reporting {
                cluster_id,
                attr_id,
            }))
    }

    #[must_use]
    pub fn reporting_entry(
        &self,
        cluster_id: u16,
        role: ClusterRole,
        attr_id: u16,
    ) -> Option<&ReportingInfo> {
        self.reporting
            .iter()
            .find(|r| r.matches(cluster_id, role, attr_id))
    }

    pub fn reporting_entries(&self) -> impl Iterator<Item = &ReportingInfo> {
        self.reporting.iter()
    }

    /// Drop every reporting entry, returning how many there were
    pub fn cancel_reporting(&mut self) -> usize {
        let cancelled = self.reporting.len();
        self.reporting.clear();
        cancelled
    }

    /// Claim a free alarm slot
    pub fn allocate_alarm(
        &mut self,
        cluster_id: u16,
        attr_id: u16,
        alarm_buf_id: u8,
    ) -> Result<usize, ZclError> {
        let endpoint = self.id;
        let (slot, alarm) = self
            .alarms
            .iter_mut()
            .enumerate()
            .find(|(_, a)| !a.in_use)
            .ok_or_else(|| {
                ZclError::CapacityExceeded(format!("endpoint {endpoint} alarm slots exhausted"))
            })?;
        *alarm = AlarmVariable {
            endpoint,
            cluster_id,
            attr_id,
            alarm_buf_id,
            in_use: true,
        };
        Ok(slot)
    }

    pub fn release_alarm(&mut self, slot: usize) -> Result<AlarmVariable, ZclError> {
        let alarm = self
            .alarms
            .get_mut(slot)
            .filter(|a| a.in_use)
            .ok_or_else(|| ZclError::InvalidArgument(format!("alarm slot {slot} not in use")))?;
        Ok(std::mem::take(alarm))
    }

    #[must_use]
    pub fn alarms(&self) -> &[AlarmVariable] {
        &self.alarms
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    /// Advance timers and collect due reports in `(cluster, attribute)` order
    pub(crate) fn poll(&mut self, now: u32) -> PollOutcome {
        self.tick_identify(now);

        let mut outcome = PollOutcome::default();
        let mut order: Vec<usize> = (0..self.reporting.len()).collect();
        order.sort_by_key(|&i| self.reporting[i].sort_key());

        for i in order {
            let info = &mut self.reporting[i];

            if !info.is_send() {
                if info.check_timeout(now) {
                    let event = DeviceEvent::ReportTimeout {
                        cluster_id: info.cluster_id,
                        attr_id: info.attr_id,
                        source: Address::Short(info.dst.short_addr),
                    };
                    tracing::warn!("Endpoint {}: {:?}", self.id, event);
                    self.pending.push(Notification::Device(event));
                    outcome.timeouts += 1;
                }
                continue;
            }

            // Entries bound to a missing attribute stay dormant
            let Some((current, manuf_code)) = self
                .clusters
                .find(info.cluster_id, info.role)
                .ok()
                .and_then(|c| {
                    c.attributes()
                        .get(info.attr_id)
                        .map(|a| (a.value().clone(), c.manuf_code()))
                })
            else {
                continue;
            };

            if info.evaluate(&current, now) == ReportState::Due {
                outcome.reports.push(info.report_frame(current.clone(), manuf_code));
                info.mark_reported(current, now);
            }
        }

        outcome
    }

    /// Execute an inbound command and build its response
    pub(crate) fn handle_command(&mut self, cmd: &InboundCommand, now: u32) -> CommandOutcome {
        let role = cmd.opcode.target_role();
        let (status, value) = match self.execute(cmd, role, now) {
            Ok(value) => (ZclStatus::Success, value),
            Err(e) => {
                tracing::debug!(
                    "Endpoint {}: {:?} on cluster {:#06x} attr {:#06x} failed: {}",
                    self.id,
                    cmd.opcode,
                    cmd.cluster_id,
                    cmd.attr_id,
                    e
                );
                (e.status(), None)
            }
        };

        let kind = match cmd.opcode {
            Opcode::ReadAttributes => Some(FrameKind::ReadResponse(status)),
            Opcode::WriteAttributes => Some(FrameKind::WriteResponse(status)),
            Opcode::WriteAttributesNoResponse => None,
            Opcode::ConfigureReporting => Some(FrameKind::ConfigureReportingResponse(status)),
            Opcode::ReportAttributes => (status != ZclStatus::Success).then_some(
                FrameKind::DefaultResponse {
                    command_id: GlobalCommand::ReportAttributes as u8,
                    status,
                },
            ),
            Opcode::ClusterSpecific(command_id) => {
                Some(FrameKind::DefaultResponse { command_id, status })
            }
        };

        let response = kind.map(|kind| OutboundFrame {
            dst: cmd.src,
            dst_endpoint: cmd.src_endpoint,
            src_endpoint: self.id,
            profile_id: self.profile_id,
            cluster_id: cmd.cluster_id,
            attr_id: cmd.attr_id,
            value,
            kind,
            from_server: role == ClusterRole::Server,
            manuf_code: cmd.manuf_code,
        });

        CommandOutcome { status, response }
    }

    fn execute(
        &mut self,
        cmd: &InboundCommand,
        role: ClusterRole,
        now: u32,
    ) -> Result<Option<AttrValue>, ZclError> {
        let cluster = self.clusters.find(cmd.cluster_id, role)?;
        if !cluster.matches_manufacturer(cmd.manuf_code) {
            return Err(ZclError::NotFound(Missing::Cluster {
                cluster_id: cmd.cluster_id,
            }));
        }

        match cmd.opcode {
            Opcode::ReadAttributes => Ok(Some(cluster.attributes().read(cmd.attr_id)?.clone())),
            Opcode::WriteAttributes | Opcode::WriteAttributesNoResponse => {
                let value = AttrValue::decode_typed(&mut cmd.payload.as_slice())?;
                self.write_attribute(cmd.cluster_id, role, cmd.attr_id, value.clone(), now)?;
                self.pending
                    .push(Notification::Device(DeviceEvent::AttributeWritten {
                        cluster_id: cmd.cluster_id,
                        attr_id: cmd.attr_id,
                        value,
                    }));
                Ok(None)
            }
            Opcode::ConfigureReporting => {
                if !cluster.attributes().contains(cmd.attr_id) {
                    return Err(ZclError::NotFound(Missing::Attribute {
                        cluster_id: cmd.cluster_id,
                        attr_id: cmd.attr_id,
                    }));
                }
                let (min_interval, max_interval, delta) = parse_reporting_payload(&cmd.payload)?;
                let short_addr = cmd.src.short().ok_or_else(|| {
                    ZclError::InvalidArgument(format!("reports cannot be sent to {}", cmd.src))
                })?;
                let info = ReportingInfo::send(
                    self.id,
                    cmd.cluster_id,
                    cmd.attr_id,
                    min_interval,
                    max_interval,
                    delta,
                    ReportDestination {
                        short_addr,
                        endpoint: cmd.src_endpoint,
                        profile_id: self.profile_id,
                    },
                    now,
                );
                self.configure_reporting(info)?;
                Ok(None)
            }
            Opcode::ReportAttributes => {
                let value = AttrValue::decode_typed(&mut cmd.payload.as_slice())?;
                self.record_report(cmd, value, now);
                Ok(None)
            }
            Opcode::ClusterSpecific(command_id) => {
                self.cluster_command(cmd, command_id, now)?;
                Ok(None)
            }
        }
    }

    fn record_report(&mut self, cmd: &InboundCommand, value: AttrValue, now: u32) {
        if let Ok(cluster) = self.clusters.find_mut(cmd.cluster_id, ClusterRole::Client) {
            // Client clusters may mirror the reported attribute
            match cluster.attributes_mut().set(cmd.attr_id, value.clone(), None) {
                Ok(_) | Err(ZclError::NotFound(_)) => {}
                Err(e) => tracing::warn!("Endpoint {}: mirroring report: {}", self.id, e),
            }
        }
        for info in self.reporting.iter_mut().filter(|r| {
            r.matches(cmd.cluster_id, ClusterRole::Client, cmd.attr_id)
                && r.is_bound_source(&cmd.src)
        }) {
            info.on_report_received(now);
        }
        self.pending
            .push(Notification::Device(DeviceEvent::ReportReceived {
                cluster_id: cmd.cluster_id,
                attr_id: cmd.attr_id,
                source: cmd.src,
                value,
            }));
    }

    fn cluster_command(
        &mut self,
        cmd: &InboundCommand,
        command_id: u8,
        now: u32,
    ) -> Result<(), ZclError> {
        match cmd.cluster_id {
            id::IDENTIFY if command_id == identify_attrs::CMD_IDENTIFY => {
                let Some(bytes) = cmd.payload.get(..2) else {
                    return Err(CodecError::TooShort {
                        needed: 2,
                        actual: cmd.payload.len(),
                    }
                    .into());
                };
                let seconds = u16::from_le_bytes([bytes[0], bytes[1]]);
                self.set_attribute(
                    id::IDENTIFY,
                    ClusterRole::Server,
                    identify_attrs::IDENTIFY_TIME,
                    AttrValue::U16(seconds),
                    now,
                )?;
            }
            id::ON_OFF => {
                if let Some(op) = OnOffCommand::from_u8(command_id) {
                    let current = matches!(
                        self.read_attribute(id::ON_OFF, ClusterRole::Server, on_off_attrs::ON_OFF),
                        Ok(AttrValue::Bool(true))
                    );
                    let next = match op {
                        OnOffCommand::Off => false,
                        OnOffCommand::On => true,
                        OnOffCommand::Toggle => !current,
                    };
                    self.set_attribute(
                        id::ON_OFF,
                        ClusterRole::Server,
                        on_off_attrs::ON_OFF,
                        AttrValue::Bool(next),
                        now,
                    )?;
                }
            }
            _ => {}
        }

        self.pending.push(Notification::Device(DeviceEvent::Command {
            cluster_id: cmd.cluster_id,
            command_id,
            payload: cmd.payload.clone(),
        }));
        Ok(())
    }
}

/// `[min u16][max u16][optional typed delta]`
fn parse_reporting_payload(payload: &[u8]) -> Result<(u16, u16, Option<AttrValue>), ZclError> {
    if payload.len() < 4 {
        return Err(CodecError::TooShort {
            needed: 4,
            actual: payload.len(),
        }
        .into());
    }
    let min_interval = u16::from_le_bytes([payload[0], payload[1]]);
    let max_interval = u16::from_le_bytes([payload[2], payload[3]]);
    let mut rest = &payload[4..];
    let delta = if rest.is_empty() {
        None
    } else {
        Some(AttrValue::decode_typed(&mut rest)?)
    };
    Ok((min_interval, max_interval, delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::temperature_attrs;
    use crate::reporting::REPORTING_DISABLED;
    use zcl_types::profiles;

    fn sensor() -> Endpoint {
        let mut ep = Endpoint::new(10, profiles::HOME_AUTOMATION)
            .unwrap()
            .with_device(0x0302, 1);
        ep.add_cluster(
            id::TEMPERATURE_MEASUREMENT,
            ClusterRole::Server,
            vec![
                Attribute::new(
                    temperature_attrs::MEASURED_VALUE,
                    Access::READ_REPORTING,
                    AttrValue::I16(20),
                ),
                Attribute::new(
                    temperature_attrs::MIN_MEASURED_VALUE,
                    Access::READ_ONLY,
                    AttrValue::I16(-4000),
                ),
            ],
            None,
        )
        .unwrap();
        ep.add_cluster(
            id::IDENTIFY,
            ClusterRole::Server,
            vec![Attribute::new(
                identify_attrs::IDENTIFY_TIME,
                Access::READ_WRITE,
                AttrValue::U16(0),
            )],
            None,
        )
        .unwrap();
        ep.add_cluster(
            id::ON_OFF,
            ClusterRole::Server,
            vec![Attribute::new(
                on_off_attrs::ON_OFF,
                Access::READ_REPORTING,
                AttrValue::Bool(false),
            )],
            None,
        )
        .unwrap();
        ep
    }

    fn temperature_reporting(now: u32) -> ReportingInfo {
        ReportingInfo::send(
            10,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            10,
            60,
            Some(AttrValue::I16(5)),
            ReportDestination::new(0x0000, 1),
            now,
        )
    }

    fn set_temperature(ep: &mut Endpoint, value: i16, now: u32) {
        ep.set_attribute(
            id::TEMPERATURE_MEASUREMENT,
            ClusterRole::Server,
            temperature_attrs::MEASURED_VALUE,
            AttrValue::I16(value),
            now,
        )
        .unwrap();
    }

    fn command(opcode: Opcode, cluster_id: u16, attr_id: u16, payload: Vec<u8>) -> InboundCommand {
        InboundCommand::new(Address::Short(0x1234), 10, cluster_id, attr_id, opcode, payload)
            .from_endpoint(1)
    }

    #[test]
    fn test_endpoint_id_range() {
        assert!(matches!(
            Endpoint::new(0, profiles::HOME_AUTOMATION),
            Err(ZclError::InvalidArgument(_))
        ));
        assert!(matches!(
            Endpoint::new(241, profiles::HOME_AUTOMATION),
            Err(ZclError::InvalidArgument(_))
        ));
        assert!(Endpoint::new(240, profiles::HOME_AUTOMATION).is_ok());
    }

    #[test]
    fn test_delta_reporting_sequence() {
        let mut ep = sensor();
        ep.configure_reporting(temperature_reporting(0)).unwrap();

        // +3 within min_interval: armed, nothing sent
        set_temperature(&mut ep, 23, 5);
        let entry = ep
            .reporting_entry(
                id::TEMPERATURE_MEASUREMENT,
                ClusterRole::Server,
                temperature_attrs::MEASURED_VALUE,
            )
            .unwrap();
        assert_eq!(entry.state(), ReportState::Armed);
        assert!(ep.poll(5).reports.is_empty());

        // Cumulative +6 after min_interval: due and drained
        set_temperature(&mut ep, 26, 12);
        let outcome = ep.poll(12);
        assert_eq!(outcome.reports.len(), 1);
        let frame = &outcome.reports[0];
        assert_eq!(frame.value, Some(AttrValue::I16(26)));
        assert_eq!(frame.kind, FrameKind::Report);
        assert_eq!(frame.src_endpoint, 10);

        let entry = ep
            .reporting_entry(
                id::TEMPERATURE_MEASUREMENT,
                ClusterRole::Server,
                temperature_attrs::MEASURED_VALUE,
            )
            .unwrap();
        assert_eq!(
            entry.send_info().unwrap().reported_value,
            Some(AttrValue::I16(26))
        );
        assert_eq!(entry.state(), ReportState::Idle);
    }

    #[test]
    fn test_forced_report_once_per_max_interval() {
        let mut ep = sensor();
        ep.configure_reporting(temperature_reporting(0)).unwrap();

        assert!(ep.poll(59).reports.is_empty());
        assert_eq!(ep.poll(60).reports.len(), 1);
        assert!(ep.poll(61).reports.is_empty());
        let entry = ep.reporting_entries().next().unwrap();
        assert_eq!(entry.run_time, 120);
    }

    #[test]
    fn test_configure_unreportable_attribute() {
        let mut ep = sensor();
        let info = ReportingInfo::send(
            10,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MIN_MEASURED_VALUE,
            1,
            60,
            None,
            ReportDestination::new(0x0000, 1),
            0,
        );
        assert!(matches!(
            ep.configure_reporting(info),
            Err(ZclError::AccessDenied {
                access: AccessKind::Report,
                ..
            })
        ));
        assert_eq!(ep.reporting_entries().count(), 0);
    }

    #[test]
    fn test_configure_delta_type_mismatch() {
        let mut ep = sensor();
        let info = ReportingInfo::send(
            10,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            1,
            60,
            Some(AttrValue::U8(5)),
            ReportDestination::new(0x0000, 1),
            0,
        );
        assert!(matches!(
            ep.configure_reporting(info),
            Err(ZclError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_reconfigure_updates_in_place() {
        let mut ep = sensor();
        ep.configure_reporting(temperature_reporting(0)).unwrap();
        let mut info = temperature_reporting(0);
        if let crate::reporting::ReportParams::Send(send) = &mut info.params {
            send.max_interval = REPORTING_DISABLED;
        }
        ep.configure_reporting(info).unwrap();
        assert_eq!(ep.reporting_entries().count(), 1);
        assert!(ep.reporting_entries().next().unwrap().is_disabled());
    }

    #[test]
    fn test_reporting_capacity() {
        let mut ep = sensor().with_capacities(1, 1);
        ep.configure_reporting(temperature_reporting(0)).unwrap();
        let info = ReportingInfo::send(
            10,
            id::ON_OFF,
            on_off_attrs::ON_OFF,
            0,
            300,
            None,
            ReportDestination::new(0x0000, 1),
            0,
        );
        assert!(matches!(
            ep.configure_reporting(info),
            Err(ZclError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_remove_cluster_cancels_reporting() {
        let mut ep = sensor();
        ep.configure_reporting(temperature_reporting(0)).unwrap();
        let cancelled = ep
            .remove_cluster(id::TEMPERATURE_MEASUREMENT, ClusterRole::Server)
            .unwrap();
        assert_eq!(cancelled, 1);
        assert!(ep.poll(60).reports.is_empty());
    }

    #[test]
    fn test_identify_write_and_countdown() {
        let mut ep = sensor();
        ep.write_attribute(
            id::IDENTIFY,
            ClusterRole::Server,
            identify_attrs::IDENTIFY_TIME,
            AttrValue::U16(5),
            100,
        )
        .unwrap();
        assert!(ep.is_identifying());
        assert_eq!(ep.take_notifications(), vec![Notification::Identify(5)]);

        ep.poll(102);
        assert_eq!(
            ep.read_attribute(id::IDENTIFY, ClusterRole::Server, identify_attrs::IDENTIFY_TIME)
                .unwrap(),
            &AttrValue::U16(3)
        );
        assert!(ep.take_notifications().is_empty());

        ep.poll(105);
        assert!(!ep.is_identifying());
        assert_eq!(ep.take_notifications(), vec![Notification::Identify(0)]);
        assert_eq!(
            ep.read_attribute(id::IDENTIFY, ClusterRole::Server, identify_attrs::IDENTIFY_TIME)
                .unwrap(),
            &AttrValue::U16(0)
        );
    }

    #[test]
    fn test_identify_command_and_stop() {
        let mut ep = sensor();
        let cmd = command(
            Opcode::ClusterSpecific(identify_attrs::CMD_IDENTIFY),
            id::IDENTIFY,
            0,
            vec![0x0A, 0x00],
        );
        assert_eq!(ep.handle_command(&cmd, 0).status, ZclStatus::Success);
        let notes = ep.take_notifications();
        assert_eq!(notes[0], Notification::Identify(10));

        let stop = command(
            Opcode::ClusterSpecific(identify_attrs::CMD_IDENTIFY),
            id::IDENTIFY,
            0,
            vec![0x00, 0x00],
        );
        ep.handle_command(&stop, 3);
        assert_eq!(ep.take_notifications()[0], Notification::Identify(0));
        assert!(!ep.is_identifying());
    }

    #[test]
    fn test_read_and_write_statuses() {
        let mut ep = sensor();

        let read = command(
            Opcode::ReadAttributes,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            vec![],
        );
        let outcome = ep.handle_command(&read, 0);
        let response = outcome.response.unwrap();
        assert_eq!(response.kind, FrameKind::ReadResponse(ZclStatus::Success));
        assert_eq!(response.value, Some(AttrValue::I16(20)));
        assert_eq!(response.dst, Address::Short(0x1234));
        assert_eq!(response.dst_endpoint, 1);

        let missing = command(Opcode::ReadAttributes, id::TEMPERATURE_MEASUREMENT, 0x4000, vec![]);
        assert_eq!(
            ep.handle_command(&missing, 0).status,
            ZclStatus::UnsupportedAttribute
        );

        let no_cluster = command(Opcode::ReadAttributes, id::COLOR_CONTROL, 0, vec![]);
        assert_eq!(
            ep.handle_command(&no_cluster, 0).status,
            ZclStatus::UnsupportedCluster
        );

        let read_only = command(
            Opcode::WriteAttributes,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            vec![0x29, 0x10, 0x00],
        );
        assert_eq!(ep.handle_command(&read_only, 0).status, ZclStatus::ReadOnly);

        let wrong_type = command(
            Opcode::WriteAttributes,
            id::IDENTIFY,
            identify_attrs::IDENTIFY_TIME,
            vec![0x20, 0x05],
        );
        let outcome = ep.handle_command(&wrong_type, 0);
        assert_eq!(outcome.status, ZclStatus::InvalidDataType);
        assert_eq!(
            outcome.response.unwrap().kind,
            FrameKind::WriteResponse(ZclStatus::InvalidDataType)
        );
    }

    #[test]
    fn test_write_without_response_notifies() {
        let mut ep = sensor();
        let cmd = command(
            Opcode::WriteAttributesNoResponse,
            id::IDENTIFY,
            identify_attrs::IDENTIFY_TIME,
            vec![0x21, 0x00, 0x00],
        );
        let outcome = ep.handle_command(&cmd, 0);
        assert_eq!(outcome.status, ZclStatus::Success);
        assert!(outcome.response.is_none());
        assert_eq!(
            ep.take_notifications(),
            vec![Notification::Device(DeviceEvent::AttributeWritten {
                cluster_id: id::IDENTIFY,
                attr_id: identify_attrs::IDENTIFY_TIME,
                value: AttrValue::U16(0),
            })]
        );
    }

    #[test]
    fn test_on_off_toggle_triggers_report() {
        let mut ep = sensor();
        ep.configure_reporting(ReportingInfo::send(
            10,
            id::ON_OFF,
            on_off_attrs::ON_OFF,
            0,
            300,
            None,
            ReportDestination::new(0x0000, 1),
            0,
        ))
        .unwrap();

        let toggle = command(Opcode::ClusterSpecific(0x02), id::ON_OFF, 0, vec![]);
        let outcome = ep.handle_command(&toggle, 1);
        assert_eq!(
            outcome.response.unwrap().kind,
            FrameKind::DefaultResponse {
                command_id: 0x02,
                status: ZclStatus::Success
            }
        );
        assert_eq!(
            ep.read_attribute(id::ON_OFF, ClusterRole::Server, on_off_attrs::ON_OFF)
                .unwrap(),
            &AttrValue::Bool(true)
        );

        let reports = ep.poll(1).reports;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].value, Some(AttrValue::Bool(true)));
    }

    #[test]
    fn test_configure_reporting_command() {
        let mut ep = sensor();
        // min 1, max 30, delta I16(10)
        let cmd = command(
            Opcode::ConfigureReporting,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            vec![0x01, 0x00, 0x1E, 0x00, 0x29, 0x0A, 0x00],
        );
        let outcome = ep.handle_command(&cmd, 0);
        assert_eq!(outcome.status, ZclStatus::Success);

        let entry = ep.reporting_entries().next().unwrap();
        assert_eq!(entry.dst.short_addr, 0x1234);
        assert_eq!(entry.dst.endpoint, 1);
        let send = entry.send_info().unwrap();
        assert_eq!((send.min_interval, send.max_interval), (1, 30));
        assert_eq!(send.delta, Some(AttrValue::I16(10)));

        let short = command(
            Opcode::ConfigureReporting,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            vec![0x01],
        );
        assert_eq!(
            ep.handle_command(&short, 0).status,
            ZclStatus::MalformedCommand
        );
    }

    #[test]
    fn test_manufacturer_scoped_cluster() {
        let mut ep = sensor();
        ep.insert_cluster(
            Cluster::with_attributes(
                0xFC00,
                ClusterRole::Server,
                vec![Attribute::new(0x0000, Access::READ_ONLY, AttrValue::U8(7))],
            )
            .unwrap()
            .with_manufacturer(0x1037),
        )
        .unwrap();

        let plain = command(Opcode::ReadAttributes, 0xFC00, 0x0000, vec![]);
        assert_eq!(
            ep.handle_command(&plain, 0).status,
            ZclStatus::UnsupportedCluster
        );

        let scoped = plain.with_manufacturer(0x1037);
        let outcome = ep.handle_command(&scoped, 0);
        assert_eq!(outcome.status, ZclStatus::Success);
        assert_eq!(outcome.response.unwrap().manuf_code, Some(0x1037));
    }

    #[test]
    fn test_receive_timeout_notifies() {
        let mut ep = sensor();
        ep.add_cluster(id::TEMPERATURE_MEASUREMENT, ClusterRole::Client, vec![], None)
            .unwrap();
        ep.configure_reporting(ReportingInfo::receive(
            10,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            30,
            ReportDestination::new(0x1234, 1),
            0,
        ))
        .unwrap();

        let report = command(
            Opcode::ReportAttributes,
            id::TEMPERATURE_MEASUREMENT,
            temperature_attrs::MEASURED_VALUE,
            vec![0x29, 0x66, 0x08],
        );
        assert_eq!(ep.handle_command(&report, 20).status, ZclStatus::Success);
        ep.take_notifications();

        assert_eq!(ep.poll(49).timeouts, 0);
        assert_eq!(ep.poll(50).timeouts, 1);
        let notes = ep.take_notifications();
        let Notification::Device(event) = &notes[0] else {
            panic!("expected device event, got {notes:?}");
        };
        assert!(matches!(
            event.as_error(),
            Some(ZclError::ReportTimeout {
                source_addr: Address::Short(0x1234),
                ..
            })
        ));
        assert_eq!(ep.poll(51).timeouts, 0);
    }

    #[test]
    fn test_alarm_slots() {
        let mut ep = sensor().with_capacities(16, 2);
        let a = ep.allocate_alarm(id::TEMPERATURE_MEASUREMENT, 0, 1).unwrap();
        let b = ep.allocate_alarm(id::TEMPERATURE_MEASUREMENT, 0, 2).unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            ep.allocate_alarm(id::ON_OFF, 0, 3),
            Err(ZclError::CapacityExceeded(_))
        ));

        let released = ep.release_alarm(a).unwrap();
        assert_eq!(released.alarm_buf_id, 1);
        assert!(ep.release_alarm(a).is_err());
        assert_eq!(ep.allocate_alarm(id::ON_OFF, 0, 3).unwrap(), a);
    }

    #[test]
    fn test_simple_descriptor_encode_parse() {
        let mut ep = sensor();
        ep.add_cluster(id::IDENTIFY, ClusterRole::Client, vec![], None)
            .unwrap();
        let desc = ep.simple_descriptor();
        assert_eq!(
            desc.in_clusters,
            vec![id::TEMPERATURE_MEASUREMENT, id::IDENTIFY, id::ON_OFF]
        );
        assert_eq!(desc.out_clusters, vec![id::IDENTIFY]);

        let bytes = desc.encode();
        assert_eq!(&bytes[..6], &[10, 0x04, 0x01, 0x02, 0x03, 0x01]);
        assert_eq!(SimpleDescriptor::parse(&bytes).unwrap(), desc);
        assert!(matches!(
            SimpleDescriptor::parse(&bytes[..bytes.len() - 1]),
            Err(CodecError::TooShort { .. })
        ));
    }
}
