//! ZCL object model and attribute reporting
//!
//! This crate holds a node's local endpoints, their clusters and
//! attributes, and decides when attribute reports go out. The Zigbee
//! stack below it is reached only through [`stack::FrameSink`] for
//! outbound frames and [`registry::EndpointRegistry::deliver_command`]
//! for inbound ones.

pub mod arena;
pub mod attribute;
pub mod cluster;
pub mod endpoint;
pub mod error;
pub mod profile;
pub mod registry;
pub mod reporting;
pub mod scheduler;
pub mod stack;

pub use attribute::{Access, Attribute, AttributeRegistry};
pub use cluster::{Cluster, ClusterRole, ClusterTable};
pub use endpoint::{DeviceEvent, DeviceHandler, Endpoint, IdentifyHandler, SimpleDescriptor};
pub use error::{Missing, ZclError};
pub use profile::{build_endpoint, DeviceType, ProfileConfig};
pub use registry::{AttrOp, EndpointRegistry, RegistryEvent};
pub use reporting::{ReportDestination, ReportingEngine, ReportingInfo, TickSummary};
pub use scheduler::{Clock, ReportingScheduler};
pub use stack::{FrameKind, FrameSink, InboundCommand, Opcode, OutboundFrame};
