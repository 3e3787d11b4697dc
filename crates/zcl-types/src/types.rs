//! Common types used throughout the ZCL layer

use thiserror::Error;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("Unknown data type: {0:#04X}")]
    UnknownDataType(u8),

    #[error("Unknown address type: {0}")]
    UnknownAddressType(u8),

    #[error("Value {value} out of range for {data_type:?}")]
    OutOfRange { data_type: DataType, value: i64 },

    #[error("Invalid character string: {0}")]
    InvalidString(String),

    #[error("Data type {0:?} has no scalar representation")]
    NotScalar(DataType),

    #[error("{data_type:?} of {len} bytes exceeds {max}")]
    TooLong {
        data_type: DataType,
        len: usize,
        max: usize,
    },
}

/// ZCL data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    NoData = 0x00,
    Data8 = 0x08,
    Data16 = 0x09,
    Data24 = 0x0A,
    Data32 = 0x0B,
    Bool = 0x10,
    Bitmap8 = 0x18,
    Bitmap16 = 0x19,
    Bitmap24 = 0x1A,
    Bitmap32 = 0x1B,
    U8 = 0x20,
    U16 = 0x21,
    U24 = 0x22,
    U32 = 0x23,
    U48 = 0x25,
    I8 = 0x28,
    I16 = 0x29,
    I24 = 0x2A,
    I32 = 0x2B,
    I48 = 0x2D,
    Enum8 = 0x30,
    Enum16 = 0x31,
    Single = 0x39,
    OctetString = 0x41,
    CharString = 0x42,
    UtcTime = 0xE2,
    Ieee = 0xF0,
}

impl DataType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(DataType::NoData),
            0x08 => Some(DataType::Data8),
            0x09 => Some(DataType::Data16),
            0x0A => Some(DataType::Data24),
            0x0B => Some(DataType::Data32),
            0x10 => Some(DataType::Bool),
            0x18 => Some(DataType::Bitmap8),
            0x19 => Some(DataType::Bitmap16),
            0x1A => Some(DataType::Bitmap24),
            0x1B => Some(DataType::Bitmap32),
            0x20 => Some(DataType::U8),
            0x21 => Some(DataType::U16),
            0x22 => Some(DataType::U24),
            0x23 => Some(DataType::U32),
            0x25 => Some(DataType::U48),
            0x28 => Some(DataType::I8),
            0x29 => Some(DataType::I16),
            0x2A => Some(DataType::I24),
            0x2B => Some(DataType::I32),
            0x2D => Some(DataType::I48),
            0x30 => Some(DataType::Enum8),
            0x31 => Some(DataType::Enum16),
            0x39 => Some(DataType::Single),
            0x41 => Some(DataType::OctetString),
            0x42 => Some(DataType::CharString),
            0xE2 => Some(DataType::UtcTime),
            0xF0 => Some(DataType::Ieee),
            _ => None,
        }
    }

    /// Encoded width in bytes, `None` for length-prefixed strings
    #[must_use]
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::NoData => Some(0),
            DataType::Data8
            | DataType::Bool
            | DataType::Bitmap8
            | DataType::U8
            | DataType::I8
            | DataType::Enum8 => Some(1),
            DataType::Data16
            | DataType::Bitmap16
            | DataType::U16
            | DataType::I16
            | DataType::Enum16 => Some(2),
            DataType::Data24 | DataType::Bitmap24 | DataType::U24 | DataType::I24 => Some(3),
            DataType::Data32
            | DataType::Bitmap32
            | DataType::U32
            | DataType::I32
            | DataType::Single
            | DataType::UtcTime => Some(4),
            DataType::U48 | DataType::I48 => Some(6),
            DataType::Ieee => Some(8),
            DataType::OctetString | DataType::CharString => None,
        }
    }

    /// Analog types report on a change of at least the reportable delta;
    /// every other (discrete) type reports on any change.
    #[must_use]
    pub fn is_analog(&self) -> bool {
        matches!(
            self,
            DataType::U8
                | DataType::U16
                | DataType::U24
                | DataType::U32
                | DataType::U48
                | DataType::I8
                | DataType::I16
                | DataType::I24
                | DataType::I32
                | DataType::I48
                | DataType::Single
                | DataType::UtcTime
        )
    }
}

/// ZCL status codes carried in response frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZclStatus {
    Success = 0x00,
    Failure = 0x01,
    NotAuthorized = 0x7E,
    MalformedCommand = 0x80,
    UnsupClusterCommand = 0x81,
    UnsupGeneralCommand = 0x82,
    InvalidField = 0x85,
    UnsupportedAttribute = 0x86,
    InvalidValue = 0x87,
    ReadOnly = 0x88,
    InsufficientSpace = 0x89,
    NotFound = 0x8B,
    UnreportableAttribute = 0x8C,
    InvalidDataType = 0x8D,
    WriteOnly = 0x8F,
    Timeout = 0x94,
    UnsupportedCluster = 0xC3,
}

impl TryFrom<u8> for ZclStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(ZclStatus::Success),
            0x01 => Ok(ZclStatus::Failure),
            0x7E => Ok(ZclStatus::NotAuthorized),
            0x80 => Ok(ZclStatus::MalformedCommand),
            0x81 => Ok(ZclStatus::UnsupClusterCommand),
            0x82 => Ok(ZclStatus::UnsupGeneralCommand),
            0x85 => Ok(ZclStatus::InvalidField),
            0x86 => Ok(ZclStatus::UnsupportedAttribute),
            0x87 => Ok(ZclStatus::InvalidValue),
            0x88 => Ok(ZclStatus::ReadOnly),
            0x89 => Ok(ZclStatus::InsufficientSpace),
            0x8B => Ok(ZclStatus::NotFound),
            0x8C => Ok(ZclStatus::UnreportableAttribute),
            0x8D => Ok(ZclStatus::InvalidDataType),
            0x8F => Ok(ZclStatus::WriteOnly),
            0x94 => Ok(ZclStatus::Timeout),
            0xC3 => Ok(ZclStatus::UnsupportedCluster),
            _ => Err(value),
        }
    }
}

/// ZCL Global commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GlobalCommand {
    ReadAttributes = 0x00,
    ReadAttributesResponse = 0x01,
    WriteAttributes = 0x02,
    WriteAttributesUndivided = 0x03,
    WriteAttributesResponse = 0x04,
    WriteAttributesNoResponse = 0x05,
    ConfigureReporting = 0x06,
    ConfigureReportingResponse = 0x07,
    ReadReportingConfig = 0x08,
    ReadReportingConfigResponse = 0x09,
    ReportAttributes = 0x0A,
    DefaultResponse = 0x0B,
    DiscoverAttributes = 0x0C,
    DiscoverAttributesResponse = 0x0D,
}

impl GlobalCommand {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(GlobalCommand::ReadAttributes),
            0x01 => Some(GlobalCommand::ReadAttributesResponse),
            0x02 => Some(GlobalCommand::WriteAttributes),
            0x03 => Some(GlobalCommand::WriteAttributesUndivided),
            0x04 => Some(GlobalCommand::WriteAttributesResponse),
            0x05 => Some(GlobalCommand::WriteAttributesNoResponse),
            0x06 => Some(GlobalCommand::ConfigureReporting),
            0x07 => Some(GlobalCommand::ConfigureReportingResponse),
            0x08 => Some(GlobalCommand::ReadReportingConfig),
            0x09 => Some(GlobalCommand::ReadReportingConfigResponse),
            0x0A => Some(GlobalCommand::ReportAttributes),
            0x0B => Some(GlobalCommand::DefaultResponse),
            0x0C => Some(GlobalCommand::DiscoverAttributes),
            0x0D => Some(GlobalCommand::DiscoverAttributesResponse),
            _ => None,
        }
    }
}

/// ZCL profile IDs
pub mod profiles {
    pub const HOME_AUTOMATION: u16 = 0x0104;
}
