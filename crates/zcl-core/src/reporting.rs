//! Attribute reporting
//!
//! Each [`ReportingInfo`] binds an `(endpoint, cluster, role, attribute)`
//! tuple to either send-side parameters (server: when to report) or
//! receive-side parameters (client: how long a report may be absent).
//! Send-side entries move through `Idle -> Armed -> Due -> Idle`:
//!
//! - a write before `min_interval` has elapsed arms the entry;
//! - once `min_interval` has elapsed the entry is due if the value moved
//!   by the reportable change, or if `max_interval` elapsed without a report;
//! - draining a due entry emits one report and restarts both intervals.
//!
//! All times are seconds on the caller's monotonic clock.

use crate::attribute::{is_reportable_change, ReportBaseline};
use crate::cluster::ClusterRole;
use crate::error::ZclError;
use crate::registry::EndpointRegistry;
use crate::stack::{FrameKind, OutboundFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zcl_types::{profiles, Address, AttrValue};

/// `max_interval` value that switches reporting off for an attribute
pub const REPORTING_DISABLED: u16 = 0xFFFF;

/// Reporting state of a send-side entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    Idle,
    Armed,
    Due,
}

/// How an attribute should be reported (server side)
#[derive(Debug, Clone, PartialEq)]
pub struct SendInfo {
    pub min_interval: u16,
    /// Forced-report ceiling; 0 means no periodic report
    pub max_interval: u16,
    /// Reportable change for analog attributes
    pub delta: Option<AttrValue>,
    pub reported_value: Option<AttrValue>,
    pub def_min_interval: u16,
    pub def_max_interval: u16,
}

/// How a report is expected (client side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvInfo {
    /// Seconds without a report before the binding is flagged; 0 disables
    pub timeout: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportParams {
    Send(SendInfo),
    Receive(RecvInfo),
}

/// Where reports go (send side) or come from (receive side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDestination {
    pub short_addr: u16,
    pub endpoint: u8,
    #[serde(default = "default_profile")]
    pub profile_id: u16,
}

fn default_profile() -> u16 {
    profiles::HOME_AUTOMATION
}

impl ReportDestination {
    #[must_use]
    pub fn new(short_addr: u16, endpoint: u8) -> Self {
        Self {
            short_addr,
            endpoint,
            profile_id: profiles::HOME_AUTOMATION,
        }
    }
}

/// Reporting metadata for one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingInfo {
    pub endpoint: u8,
    pub cluster_id: u16,
    pub role: ClusterRole,
    pub attr_id: u16,
    pub params: ReportParams,
    pub dst: ReportDestination,
    /// Time of the next scheduled reporting activity
    pub run_time: u32,
    last_activity: u32,
    state: ReportState,
}

impl ReportingInfo {
    /// Send-side entry on a server cluster
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn send(
        endpoint: u8,
        cluster_id: u16,
        attr_id: u16,
        min_interval: u16,
        max_interval: u16,
        delta: Option<AttrValue>,
        dst: ReportDestination,
        now: u32,
    ) -> Self {
        let mut info = Self {
            endpoint,
            cluster_id,
            role: ClusterRole::Server,
            attr_id,
            params: ReportParams::Send(SendInfo {
                min_interval,
                max_interval,
                delta,
                reported_value: None,
                def_min_interval: min_interval,
                def_max_interval: max_interval,
            }),
            dst,
            run_time: 0,
            last_activity: now,
            state: ReportState::Idle,
        };
        info.reschedule();
        info
    }

    /// Receive-side entry on a client cluster; `dst` names the bound source
    #[must_use]
    pub fn receive(
        endpoint: u8,
        cluster_id: u16,
        attr_id: u16,
        timeout: u16,
        source: ReportDestination,
        now: u32,
    ) -> Self {
        let mut info = Self {
            endpoint,
            cluster_id,
            role: ClusterRole::Client,
            attr_id,
            params: ReportParams::Receive(RecvInfo { timeout }),
            dst: source,
            run_time: 0,
            last_activity: now,
            state: ReportState::Idle,
        };
        info.reschedule();
        info
    }

    /// Override the defaults restored by [`ReportingInfo::reset_to_defaults`]
    #[must_use]
    pub fn with_defaults(mut self, def_min_interval: u16, def_max_interval: u16) -> Self {
        if let ReportParams::Send(send) = &mut self.params {
            send.def_min_interval = def_min_interval;
            send.def_max_interval = def_max_interval;
        }
        self
    }

    #[must_use]
    pub fn state(&self) -> ReportState {
        self.state
    }

    #[must_use]
    pub fn is_send(&self) -> bool {
        matches!(self.params, ReportParams::Send(_))
    }

    #[must_use]
    pub fn send_info(&self) -> Option<&SendInfo> {
        match &self.params {
            ReportParams::Send(send) => Some(send),
            ReportParams::Receive(_) => None,
        }
    }

    /// Deterministic drain order within an endpoint
    #[must_use]
    pub fn sort_key(&self) -> (u16, u16, ClusterRole) {
        (self.cluster_id, self.attr_id, self.role)
    }

    #[must_use]
    pub fn matches(&self, cluster_id: u16, role: ClusterRole, attr_id: u16) -> bool {
        self.cluster_id == cluster_id && self.role == role && self.attr_id == attr_id
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(&self.params, ReportParams::Send(s) if s.max_interval == REPORTING_DISABLED)
    }

    /// Reference point a new value is compared against
    #[must_use]
    pub fn baseline(&self) -> Option<ReportBaseline<'_>> {
        self.send_info().map(|send| ReportBaseline {
            reported_value: send.reported_value.as_ref(),
            delta: send.delta.as_ref(),
        })
    }

    /// Check interval ordering
    pub fn validate(&self) -> Result<(), ZclError> {
        if let ReportParams::Send(send) = &self.params {
            let bounded = send.max_interval != 0 && send.max_interval != REPORTING_DISABLED;
            if bounded && send.max_interval < send.min_interval {
                return Err(ZclError::InvalidArgument(format!(
                    "max_interval {} below min_interval {} for attribute {:#06x}",
                    send.max_interval, send.min_interval, self.attr_id
                )));
            }
        }
        Ok(())
    }

    fn elapsed(&self, now: u32) -> u32 {
        now.wrapping_sub(self.last_activity)
    }

    fn reschedule(&mut self) {
        self.run_time = match (&self.params, self.state) {
            (ReportParams::Send(send), ReportState::Armed) => {
                self.last_activity.wrapping_add(u32::from(send.min_interval))
            }
            (ReportParams::Send(send), _) if send.max_interval != 0 => {
                self.last_activity.wrapping_add(u32::from(send.max_interval))
            }
            (ReportParams::Send(_), _) => 0,
            (ReportParams::Receive(recv), _) => {
                self.last_activity.wrapping_add(u32::from(recv.timeout))
            }
        };
    }

    /// Seed the last reported value if none is known yet
    pub(crate) fn seed(&mut self, current: &AttrValue) {
        if let ReportParams::Send(send) = &mut self.params {
            if send.reported_value.is_none() {
                send.reported_value = Some(current.clone());
            }
        }
    }

    /// Apply new parameters to an existing entry, keeping its history
    pub(crate) fn reconfigure(&mut self, other: ReportingInfo) {
        match (&mut self.params, other.params) {
            (ReportParams::Send(own), ReportParams::Send(new)) => {
                own.min_interval = new.min_interval;
                own.max_interval = new.max_interval;
                own.delta = new.delta;
                own.def_min_interval = new.def_min_interval;
                own.def_max_interval = new.def_max_interval;
            }
            (params, new) => *params = new,
        }
        self.dst = other.dst;
        self.state = ReportState::Idle;
        self.reschedule();
    }

    /// Restore the default intervals
    pub fn reset_to_defaults(&mut self) {
        if let ReportParams::Send(send) = &mut self.params {
            send.min_interval = send.def_min_interval;
            send.max_interval = send.def_max_interval;
        }
        self.reschedule();
    }

    /// The attribute was written; `reportable` tells whether the new value
    /// moved far enough from the last reported one
    pub fn on_write(&mut self, reportable: bool, now: u32) {
        let ReportParams::Send(send) = &self.params else {
            return;
        };
        if self.is_disabled() || self.state == ReportState::Due {
            return;
        }

        let next = if self.elapsed(now) < u32::from(send.min_interval) {
            ReportState::Armed
        } else if reportable {
            ReportState::Due
        } else {
            self.state
        };
        self.transition(next);
    }

    /// Re-evaluate on a timer tick against the attribute's current value
    pub fn evaluate(&mut self, current: &AttrValue, now: u32) -> ReportState {
        let ReportParams::Send(send) = &self.params else {
            return self.state;
        };
        if self.is_disabled() {
            self.transition(ReportState::Idle);
            return self.state;
        }
        if self.state == ReportState::Due {
            return self.state;
        }

        let elapsed = self.elapsed(now);
        if elapsed < u32::from(send.min_interval) {
            return self.state;
        }

        let changed =
            is_reportable_change(current, send.reported_value.as_ref(), send.delta.as_ref());
        let forced = send.max_interval != 0 && elapsed >= u32::from(send.max_interval);
        let next = if changed || forced {
            ReportState::Due
        } else {
            ReportState::Idle
        };
        self.transition(next);
        self.state
    }

    /// A report carrying `value` was handed to the stack
    pub fn mark_reported(&mut self, value: AttrValue, now: u32) {
        if let ReportParams::Send(send) = &mut self.params {
            send.reported_value = Some(value);
        }
        self.last_activity = now;
        self.state = ReportState::Idle;
        self.reschedule();
    }

    /// A report from the bound source arrived (receive side)
    pub fn on_report_received(&mut self, now: u32) {
        self.last_activity = now;
        self.reschedule();
    }

    /// Whether the receive-side timeout expired. Fires once per timeout
    /// window and keeps the binding.
    pub fn check_timeout(&mut self, now: u32) -> bool {
        let ReportParams::Receive(recv) = &self.params else {
            return false;
        };
        if recv.timeout == 0 || self.elapsed(now) < u32::from(recv.timeout) {
            return false;
        }
        self.last_activity = now;
        self.reschedule();
        true
    }

    /// Whether a report from `src` satisfies this receive-side binding
    #[must_use]
    pub fn is_bound_source(&self, src: &Address) -> bool {
        !self.is_send() && src.short() == Some(self.dst.short_addr)
    }

    /// Report frame for the current value
    #[must_use]
    pub fn report_frame(&self, value: AttrValue, manuf_code: Option<u16>) -> OutboundFrame {
        OutboundFrame {
            dst: Address::Short(self.dst.short_addr),
            dst_endpoint: self.dst.endpoint,
            src_endpoint: self.endpoint,
            profile_id: self.dst.profile_id,
            cluster_id: self.cluster_id,
            attr_id: self.attr_id,
            value: Some(value),
            kind: FrameKind::Report,
            from_server: self.role == ClusterRole::Server,
            manuf_code,
        }
    }

    fn transition(&mut self, next: ReportState) {
        if next != self.state {
            tracing::debug!(
                "Reporting ep {} cluster {:#06x} attr {:#06x}: {:?} -> {:?}",
                self.endpoint,
                self.cluster_id,
                self.attr_id,
                self.state,
                next
            );
            self.state = next;
            self.reschedule();
        }
    }
}

/// Outcome of one reporting tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub reports: usize,
    pub timeouts: usize,
}

/// Drains due reports across all endpoints
pub struct ReportingEngine {
    registry: Arc<EndpointRegistry>,
}

impl ReportingEngine {
    #[must_use]
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Evaluate every entry at `now` and emit due reports in ascending
    /// `(endpoint, cluster_id, attr_id)` order
    pub fn tick(&self, now: u32) -> TickSummary {
        let mut summary = TickSummary::default();

        for ep_id in self.registry.endpoint_ids() {
            // The endpoint may have been removed since the id snapshot
            let Ok(outcome) = self.registry.with_endpoint_mut(ep_id, |ep| ep.poll(now)) else {
                continue;
            };

            summary.timeouts += outcome.timeouts;
            for frame in outcome.reports {
                tracing::debug!(
                    "Report ep {} cluster {:#06x} attr {:#06x} -> {}",
                    frame.src_endpoint,
                    frame.cluster_id,
                    frame.attr_id,
                    frame.dst
                );
                self.registry.sink().emit_frame(frame);
                summary.reports += 1;
            }
        }

        summary
    }
}
