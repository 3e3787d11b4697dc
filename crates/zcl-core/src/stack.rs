//! Boundary with the Zigbee stack: inbound commands and outbound frames

use crate::cluster::ClusterRole;
use tokio::sync::mpsc;
use zcl_types::frame::{default_response, read_response_record, report_record, status_record};
use zcl_types::{Address, AttrValue, GlobalCommand, ZclFrame, ZclStatus};

/// Command category delivered by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    ReadAttributes,
    WriteAttributes,
    WriteAttributesNoResponse,
    ConfigureReporting,
    ReportAttributes,
    /// Cluster-specific command id
    ClusterSpecific(u8),
}

impl Opcode {
    /// Map a ZCL frame header to an opcode
    #[must_use]
    pub fn from_frame(frame: &ZclFrame) -> Option<Self> {
        if frame.is_cluster_specific() {
            return Some(Opcode::ClusterSpecific(frame.command_id()));
        }
        match GlobalCommand::from_u8(frame.command_id())? {
            GlobalCommand::ReadAttributes => Some(Opcode::ReadAttributes),
            GlobalCommand::WriteAttributes | GlobalCommand::WriteAttributesUndivided => {
                Some(Opcode::WriteAttributes)
            }
            GlobalCommand::WriteAttributesNoResponse => Some(Opcode::WriteAttributesNoResponse),
            GlobalCommand::ConfigureReporting => Some(Opcode::ConfigureReporting),
            GlobalCommand::ReportAttributes => Some(Opcode::ReportAttributes),
            _ => None,
        }
    }

    /// Cluster side the command is addressed to. Reports travel from
    /// server to client; everything else targets the server.
    #[must_use]
    pub fn target_role(&self) -> ClusterRole {
        match self {
            Opcode::ReportAttributes => ClusterRole::Client,
            _ => ClusterRole::Server,
        }
    }
}

/// A ZCL command handed to the core by the stack
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub src: Address,
    pub src_endpoint: u8,
    pub endpoint: u8,
    pub cluster_id: u16,
    pub attr_id: u16,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub manuf_code: Option<u16>,
}

impl InboundCommand {
    #[must_use]
    pub fn new(
        src: Address,
        endpoint: u8,
        cluster_id: u16,
        attr_id: u16,
        opcode: Opcode,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            src,
            src_endpoint: endpoint,
            endpoint,
            cluster_id,
            attr_id,
            opcode,
            payload,
            manuf_code: None,
        }
    }

    #[must_use]
    pub fn from_endpoint(mut self, src_endpoint: u8) -> Self {
        self.src_endpoint = src_endpoint;
        self
    }

    #[must_use]
    pub fn with_manufacturer(mut self, code: u16) -> Self {
        self.manuf_code = Some(code);
        self
    }
}

/// Kind of frame the core asks the stack to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ReadResponse(ZclStatus),
    WriteResponse(ZclStatus),
    ConfigureReportingResponse(ZclStatus),
    Report,
    DefaultResponse { command_id: u8, status: ZclStatus },
}

impl FrameKind {
    #[must_use]
    pub fn global_command(&self) -> GlobalCommand {
        match self {
            FrameKind::ReadResponse(_) => GlobalCommand::ReadAttributesResponse,
            FrameKind::WriteResponse(_) => GlobalCommand::WriteAttributesResponse,
            FrameKind::ConfigureReportingResponse(_) => GlobalCommand::ConfigureReportingResponse,
            FrameKind::Report => GlobalCommand::ReportAttributes,
            FrameKind::DefaultResponse { .. } => GlobalCommand::DefaultResponse,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<ZclStatus> {
        match self {
            FrameKind::ReadResponse(status)
            | FrameKind::WriteResponse(status)
            | FrameKind::ConfigureReportingResponse(status)
            | FrameKind::DefaultResponse { status, .. } => Some(*status),
            FrameKind::Report => None,
        }
    }
}

/// A frame the core hands to the stack for transmission
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub dst: Address,
    pub dst_endpoint: u8,
    pub src_endpoint: u8,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub attr_id: u16,
    pub value: Option<AttrValue>,
    pub kind: FrameKind,
    /// Whether the sending cluster is the server side
    pub from_server: bool,
    pub manuf_code: Option<u16>,
}

impl OutboundFrame {
    /// Build the ZCL frame for this message
    #[must_use]
    pub fn to_zcl_frame(&self, transaction_seq: u8) -> ZclFrame {
        let payload = match self.kind {
            FrameKind::Report => match &self.value {
                Some(value) => report_record(self.attr_id, value),
                None => Vec::new(),
            },
            FrameKind::ReadResponse(status) => {
                read_response_record(self.attr_id, status, self.value.as_ref())
            }
            FrameKind::WriteResponse(status) | FrameKind::ConfigureReportingResponse(status) => {
                status_record(self.attr_id, status)
            }
            FrameKind::DefaultResponse { command_id, status } => {
                default_response(command_id, status)
            }
        };
        let frame = ZclFrame::global(
            transaction_seq,
            self.kind.global_command(),
            self.from_server,
            payload,
        );
        match self.manuf_code {
            Some(code) => frame.with_manufacturer(code),
            None => frame,
        }
    }
}

/// Egress to the stack. Implementations must not block.
pub trait FrameSink: Send + Sync {
    fn emit_frame(&self, frame: OutboundFrame);
}

impl FrameSink for mpsc::Sender<OutboundFrame> {
    fn emit_frame(&self, frame: OutboundFrame) {
        match self.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(
                    "Outbound queue full, dropping {:?} for cluster {:#06x} to {}",
                    frame.kind,
                    frame.cluster_id,
                    frame.dst
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Outbound queue closed, frame discarded");
            }
        }
    }
}

impl FrameSink for mpsc::UnboundedSender<OutboundFrame> {
    fn emit_frame(&self, frame: OutboundFrame) {
        if self.send(frame).is_err() {
            tracing::debug!("Outbound queue closed, frame discarded");
        }
    }
}
