//! Error types for the ZCL registry

use thiserror::Error;
use zcl_types::{Address, CodecError, DataType, ZclStatus};

/// What a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Endpoint(u8),
    Cluster { cluster_id: u16 },
    Attribute { cluster_id: u16, attr_id: u16 },
    Reporting { cluster_id: u16, attr_id: u16 },
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Endpoint(ep) => write!(f, "endpoint {ep}"),
            Missing::Cluster { cluster_id } => write!(f, "cluster {cluster_id:#06x}"),
            Missing::Attribute {
                cluster_id,
                attr_id,
            } => write!(f, "attribute {attr_id:#06x} in cluster {cluster_id:#06x}"),
            Missing::Reporting {
                cluster_id,
                attr_id,
            } => write!(
                f,
                "reporting entry for attribute {attr_id:#06x} in cluster {cluster_id:#06x}"
            ),
        }
    }
}

/// Access that was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Report,
}

/// Errors that can occur in the ZCL registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZclError {
    /// Malformed identifier or out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Endpoint, cluster, attribute or reporting entry absent
    #[error("Not found: {0}")]
    NotFound(Missing),

    #[error("Attribute {attr_id:#06x} already defined in cluster {cluster_id:#06x}")]
    DuplicateAttribute { cluster_id: u16, attr_id: u16 },

    #[error("Cluster {cluster_id:#06x} ({role:?}) already registered on endpoint {endpoint}")]
    DuplicateCluster {
        endpoint: u8,
        cluster_id: u16,
        role: crate::cluster::ClusterRole,
    },

    #[error("Endpoint {0} already registered")]
    DuplicateEndpoint(u8),

    /// The attribute's access mask forbids the operation
    #[error("{access:?} access denied for attribute {attr_id:#06x}")]
    AccessDenied { attr_id: u16, access: AccessKind },

    /// Value type does not match the declared attribute type
    #[error("Type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch { expected: DataType, actual: DataType },

    /// A one-shot operation was repeated
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// A receive-side reporting binding went silent
    #[error("No report for attribute {attr_id:#06x} in cluster {cluster_id:#06x} from {source_addr} within timeout")]
    ReportTimeout {
        cluster_id: u16,
        attr_id: u16,
        source_addr: Address,
    },

    /// A fixed-capacity table is full
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ZclError {
    /// ZCL status code reported back to a remote peer for this error
    #[must_use]
    pub fn status(&self) -> ZclStatus {
        match self {
            ZclError::NotFound(Missing::Endpoint(_) | Missing::Cluster { .. }) => {
                ZclStatus::UnsupportedCluster
            }
            ZclError::NotFound(Missing::Attribute { .. }) => ZclStatus::UnsupportedAttribute,
            ZclError::NotFound(Missing::Reporting { .. }) => ZclStatus::NotFound,
            ZclError::AccessDenied {
                access: AccessKind::Read,
                ..
            } => ZclStatus::WriteOnly,
            ZclError::AccessDenied {
                access: AccessKind::Write,
                ..
            } => ZclStatus::ReadOnly,
            ZclError::AccessDenied {
                access: AccessKind::Report,
                ..
            } => ZclStatus::UnreportableAttribute,
            ZclError::TypeMismatch { .. } => ZclStatus::InvalidDataType,
            ZclError::Codec(CodecError::TooShort { .. }) => ZclStatus::MalformedCommand,
            ZclError::Codec(CodecError::UnknownDataType(_)) => ZclStatus::InvalidDataType,
            ZclError::Codec(_) | ZclError::InvalidArgument(_) => ZclStatus::InvalidValue,
            ZclError::CapacityExceeded(_) => ZclStatus::InsufficientSpace,
            ZclError::ReportTimeout { .. } => ZclStatus::Timeout,
            ZclError::DuplicateAttribute { .. }
            | ZclError::DuplicateCluster { .. }
            | ZclError::DuplicateEndpoint(_)
            | ZclError::FailedPrecondition(_) => ZclStatus::Failure,
        }
    }
}
