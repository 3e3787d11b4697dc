//! Device addresses as seen by the ZCL layer

use crate::types::CodecError;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Address type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressType {
    Short = 0x00,
    IeeeGpd = 0x01,
    SrcIdGpd = 0x02,
    Ieee = 0x03,
}

impl TryFrom<u8> for AddressType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(AddressType::Short),
            0x01 => Ok(AddressType::IeeeGpd),
            0x02 => Ok(AddressType::SrcIdGpd),
            0x03 => Ok(AddressType::Ieee),
            _ => Err(value),
        }
    }
}

/// Source or destination of a ZCL message
///
/// Green Power devices are addressed either by their IEEE address or by a
/// 32-bit source id instead of a network short address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "addr", rename_all = "snake_case")]
pub enum Address {
    Short(u16),
    IeeeGpd([u8; 8]),
    SrcIdGpd(u32),
    Ieee([u8; 8]),
}

impl Address {
    #[must_use]
    pub fn addr_type(&self) -> AddressType {
        match self {
            Address::Short(_) => AddressType::Short,
            Address::IeeeGpd(_) => AddressType::IeeeGpd,
            Address::SrcIdGpd(_) => AddressType::SrcIdGpd,
            Address::Ieee(_) => AddressType::Ieee,
        }
    }

    /// Network short address, if this is one
    #[must_use]
    pub fn short(&self) -> Option<u16> {
        match self {
            Address::Short(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Encode as tag byte followed by the little-endian address
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.addr_type() as u8);
        match self {
            Address::Short(addr) => buf.put_u16_le(*addr),
            Address::SrcIdGpd(id) => buf.put_u32_le(*id),
            Address::IeeeGpd(ieee) | Address::Ieee(ieee) => buf.put_slice(ieee),
        }
    }

    /// Decode from tag byte followed by the little-endian address
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        if buf.remaining() < 1 {
            return Err(CodecError::TooShort {
                needed: 1,
                actual: 0,
            });
        }
        let tag = buf.get_u8();
        let addr_type = AddressType::try_from(tag).map_err(CodecError::UnknownAddressType)?;

        let needed = match addr_type {
            AddressType::Short => 2,
            AddressType::SrcIdGpd => 4,
            AddressType::IeeeGpd | AddressType::Ieee => 8,
        };
        if buf.remaining() < needed {
            return Err(CodecError::TooShort {
                needed,
                actual: buf.remaining(),
            });
        }

        let addr = match addr_type {
            AddressType::Short => Address::Short(buf.get_u16_le()),
            AddressType::SrcIdGpd => Address::SrcIdGpd(buf.get_u32_le()),
            AddressType::IeeeGpd => {
                let mut ieee = [0u8; 8];
                buf.copy_to_slice(&mut ieee);
                Address::IeeeGpd(ieee)
            }
            AddressType::Ieee => {
                let mut ieee = [0u8; 8];
                buf.copy_to_slice(&mut ieee);
                Address::Ieee(ieee)
            }
        };
        Ok(addr)
    }
}

/// Format IEEE address as string (colon-separated hex)
#[must_use]
pub fn format_ieee(ieee: &[u8; 8]) -> String {
    // IEEE is stored little-endian, display big-endian
    ieee.iter()
        .rev()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Short(addr) => write!(f, "{addr:#06x}"),
            Address::SrcIdGpd(id) => write!(f, "gpd:{id:#010x}"),
            Address::IeeeGpd(ieee) => write!(f, "gpd:{}", format_ieee(ieee)),
            Address::Ieee(ieee) => write!(f, "{}", format_ieee(ieee)),
        }
    }
}
