//! Typed attribute values
//!
//! Every variant fixes its [`DataType`]. Values of different variants never
//! compare equal, so a `U16(5)` is not a `U32(5)` and nothing widens
//! implicitly between the registry and the wire.

use crate::types::{CodecError, DataType};
use bytes::{Buf, BufMut};

/// Unsigned 24-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U24(u32);

impl U24 {
    pub const MAX: u32 = 0x00FF_FFFF;

    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Signed 24-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct I24(i32);

impl I24 {
    pub const MIN: i32 = -0x0080_0000;
    pub const MAX: i32 = 0x007F_FFFF;

    #[must_use]
    pub fn new(value: i32) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> i32 {
        self.0
    }
}

/// Unsigned 48-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U48(u64);

impl U48 {
    pub const MAX: u64 = 0xFFFF_FFFF_FFFF;

    #[must_use]
    pub fn new(value: u64) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Signed 48-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct I48(i64);

impl I48 {
    pub const MIN: i64 = -0x8000_0000_0000;
    pub const MAX: i64 = 0x7FFF_FFFF_FFFF;

    #[must_use]
    pub fn new(value: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

/// Longest octet or character string; a length byte of 0xFF marks an
/// invalid string
pub const MAX_STRING_LEN: usize = 0xFE;

/// A ZCL attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    NoData,
    Data8(u8),
    Data16(u16),
    Data24(U24),
    Data32(u32),
    Bool(bool),
    Bitmap8(u8),
    Bitmap16(u16),
    Bitmap24(U24),
    Bitmap32(u32),
    U8(u8),
    U16(u16),
    U24(U24),
    U32(u32),
    U48(U48),
    I8(i8),
    I16(i16),
    I24(I24),
    I32(i32),
    I48(I48),
    Enum8(u8),
    Enum16(u16),
    Single(f32),
    OctetString(Vec<u8>),
    CharString(String),
    UtcTime(u32),
    Ieee([u8; 8]),
}

impl AttrValue {
    /// The type tag this value carries
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            AttrValue::NoData => DataType::NoData,
            AttrValue::Data8(_) => DataType::Data8,
            AttrValue::Data16(_) => DataType::Data16,
            AttrValue::Data24(_) => DataType::Data24,
            AttrValue::Data32(_) => DataType::Data32,
            AttrValue::Bool(_) => DataType::Bool,
            AttrValue::Bitmap8(_) => DataType::Bitmap8,
            AttrValue::Bitmap16(_) => DataType::Bitmap16,
            AttrValue::Bitmap24(_) => DataType::Bitmap24,
            AttrValue::Bitmap32(_) => DataType::Bitmap32,
            AttrValue::U8(_) => DataType::U8,
            AttrValue::U16(_) => DataType::U16,
            AttrValue::U24(_) => DataType::U24,
            AttrValue::U32(_) => DataType::U32,
            AttrValue::U48(_) => DataType::U48,
            AttrValue::I8(_) => DataType::I8,
            AttrValue::I16(_) => DataType::I16,
            AttrValue::I24(_) => DataType::I24,
            AttrValue::I32(_) => DataType::I32,
            AttrValue::I48(_) => DataType::I48,
            AttrValue::Enum8(_) => DataType::Enum8,
            AttrValue::Enum16(_) => DataType::Enum16,
            AttrValue::Single(_) => DataType::Single,
            AttrValue::OctetString(_) => DataType::OctetString,
            AttrValue::CharString(_) => DataType::CharString,
            AttrValue::UtcTime(_) => DataType::UtcTime,
            AttrValue::Ieee(_) => DataType::Ieee,
        }
    }

    /// Build a scalar value of the given type from an integer, rejecting
    /// anything that does not fit the type's width.
    pub fn from_i64(data_type: DataType, value: i64) -> Result<Self, CodecError> {
        let out_of_range = || CodecError::OutOfRange { data_type, value };
        let v = match data_type {
            DataType::Data8 => AttrValue::Data8(u8::try_from(value).map_err(|_| out_of_range())?),
            DataType::Data16 => {
                AttrValue::Data16(u16::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::Data24 => AttrValue::Data24(
                u32::try_from(value)
                    .ok()
                    .and_then(U24::new)
                    .ok_or_else(out_of_range)?,
            ),
            DataType::Data32 => {
                AttrValue::Data32(u32::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::Bool => match value {
                0 => AttrValue::Bool(false),
                1 => AttrValue::Bool(true),
                _ => return Err(out_of_range()),
            },
            DataType::Bitmap8 => {
                AttrValue::Bitmap8(u8::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::Bitmap16 => {
                AttrValue::Bitmap16(u16::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::Bitmap24 => AttrValue::Bitmap24(
                u32::try_from(value)
                    .ok()
                    .and_then(U24::new)
                    .ok_or_else(out_of_range)?,
            ),
            DataType::Bitmap32 => {
                AttrValue::Bitmap32(u32::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::U8 => AttrValue::U8(u8::try_from(value).map_err(|_| out_of_range())?),
            DataType::U16 => AttrValue::U16(u16::try_from(value).map_err(|_| out_of_range())?),
            DataType::U24 => AttrValue::U24(
                u32::try_from(value)
                    .ok()
                    .and_then(U24::new)
                    .ok_or_else(out_of_range)?,
            ),
            DataType::U32 => AttrValue::U32(u32::try_from(value).map_err(|_| out_of_range())?),
            DataType::U48 => AttrValue::U48(
                u64::try_from(value)
                    .ok()
                    .and_then(U48::new)
                    .ok_or_else(out_of_range)?,
            ),
            DataType::I8 => AttrValue::I8(i8::try_from(value).map_err(|_| out_of_range())?),
            DataType::I16 => AttrValue::I16(i16::try_from(value).map_err(|_| out_of_range())?),
            DataType::I24 => AttrValue::I24(
                i32::try_from(value)
                    .ok()
                    .and_then(I24::new)
                    .ok_or_else(out_of_range)?,
            ),
            DataType::I32 => AttrValue::I32(i32::try_from(value).map_err(|_| out_of_range())?),
            DataType::I48 => AttrValue::I48(I48::new(value).ok_or_else(out_of_range)?),
            DataType::Enum8 => AttrValue::Enum8(u8::try_from(value).map_err(|_| out_of_range())?),
            DataType::Enum16 => {
                AttrValue::Enum16(u16::try_from(value).map_err(|_| out_of_range())?)
            }
            DataType::UtcTime => {
                AttrValue::UtcTime(u32::try_from(value).map_err(|_| out_of_range())?)
            }
            #[allow(clippy::cast_precision_loss)]
            DataType::Single => AttrValue::Single(value as f32),
            DataType::NoData | DataType::OctetString | DataType::CharString | DataType::Ieee => {
                return Err(CodecError::NotScalar(data_type))
            }
        };
        Ok(v)
    }

    /// Numeric magnitude of an analog value.
    ///
    /// Every integer type here is at most 48 bits wide, so the conversion
    /// to `f64` is exact.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::U8(v) => Some(f64::from(*v)),
            AttrValue::U16(v) => Some(f64::from(*v)),
            AttrValue::U24(v) => Some(f64::from(v.get())),
            AttrValue::U32(v) | AttrValue::UtcTime(v) => Some(f64::from(*v)),
            AttrValue::U48(v) => Some(v.get() as f64),
            AttrValue::I8(v) => Some(f64::from(*v)),
            AttrValue::I16(v) => Some(f64::from(*v)),
            AttrValue::I24(v) => Some(f64::from(v.get())),
            AttrValue::I32(v) => Some(f64::from(*v)),
            AttrValue::I48(v) => Some(v.get() as f64),
            AttrValue::Single(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Check the value fits its wire encoding
    pub fn check_encodable(&self) -> Result<(), CodecError> {
        let len = match self {
            AttrValue::OctetString(bytes) => bytes.len(),
            AttrValue::CharString(s) => s.len(),
            _ => return Ok(()),
        };
        if len > MAX_STRING_LEN {
            return Err(CodecError::TooLong {
                data_type: self.data_type(),
                len,
                max: MAX_STRING_LEN,
            });
        }
        Ok(())
    }

    /// Encode the value bytes (without the type tag).
    ///
    /// Strings that fail [`AttrValue::check_encodable`] are truncated.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            AttrValue::NoData => {}
            AttrValue::Data8(v) | AttrValue::Bitmap8(v) | AttrValue::U8(v) | AttrValue::Enum8(v) => {
                buf.put_u8(*v);
            }
            AttrValue::Bool(v) => buf.put_u8(u8::from(*v)),
            AttrValue::I8(v) => buf.put_i8(*v),
            AttrValue::Data16(v)
            | AttrValue::Bitmap16(v)
            | AttrValue::U16(v)
            | AttrValue::Enum16(v) => buf.put_u16_le(*v),
            AttrValue::I16(v) => buf.put_i16_le(*v),
            AttrValue::Data24(v) | AttrValue::Bitmap24(v) | AttrValue::U24(v) => {
                buf.put_uint_le(u64::from(v.get()), 3);
            }
            AttrValue::I24(v) => buf.put_int_le(i64::from(v.get()), 3),
            AttrValue::Data32(v)
            | AttrValue::Bitmap32(v)
            | AttrValue::U32(v)
            | AttrValue::UtcTime(v) => buf.put_u32_le(*v),
            AttrValue::I32(v) => buf.put_i32_le(*v),
            AttrValue::U48(v) => buf.put_uint_le(v.get(), 6),
            AttrValue::I48(v) => buf.put_int_le(v.get(), 6),
            AttrValue::Single(v) => buf.put_f32_le(*v),
            AttrValue::OctetString(bytes) => {
                let len = bytes.len().min(MAX_STRING_LEN);
                buf.put_u8(len as u8);
                buf.put_slice(&bytes[..len]);
            }
            AttrValue::CharString(s) => {
                let mut end = s.len().min(MAX_STRING_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                buf.put_u8(end as u8);
                buf.put_slice(&s.as_bytes()[..end]);
            }
            AttrValue::Ieee(addr) => buf.put_slice(addr),
        }
    }

    /// Encode as an attribute record value: type tag followed by value bytes
    pub fn encode_typed<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.data_type() as u8);
        self.encode(buf);
    }

    /// Decode value bytes of a known type
    pub fn decode<B: Buf>(data_type: DataType, buf: &mut B) -> Result<Self, CodecError> {
        if let Some(size) = data_type.fixed_size() {
            ensure_remaining(buf, size)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        let value = match data_type {
            DataType::NoData => AttrValue::NoData,
            DataType::Data8 => AttrValue::Data8(buf.get_u8()),
            DataType::Data16 => AttrValue::Data16(buf.get_u16_le()),
            DataType::Data24 => AttrValue::Data24(U24(buf.get_uint_le(3) as u32)),
            DataType::Data32 => AttrValue::Data32(buf.get_u32_le()),
            DataType::Bool => AttrValue::Bool(buf.get_u8() != 0),
            DataType::Bitmap8 => AttrValue::Bitmap8(buf.get_u8()),
            DataType::Bitmap16 => AttrValue::Bitmap16(buf.get_u16_le()),
            DataType::Bitmap24 => AttrValue::Bitmap24(U24(buf.get_uint_le(3) as u32)),
            DataType::Bitmap32 => AttrValue::Bitmap32(buf.get_u32_le()),
            DataType::U8 => AttrValue::U8(buf.get_u8()),
            DataType::U16 => AttrValue::U16(buf.get_u16_le()),
            DataType::U24 => AttrValue::U24(U24(buf.get_uint_le(3) as u32)),
            DataType::U32 => AttrValue::U32(buf.get_u32_le()),
            DataType::U48 => AttrValue::U48(U48(buf.get_uint_le(6))),
            DataType::I8 => AttrValue::I8(buf.get_i8()),
            DataType::I16 => AttrValue::I16(buf.get_i16_le()),
            DataType::I24 => AttrValue::I24(I24(buf.get_int_le(3) as i32)),
            DataType::I32 => AttrValue::I32(buf.get_i32_le()),
            DataType::I48 => AttrValue::I48(I48(buf.get_int_le(6))),
            DataType::Enum8 => AttrValue::Enum8(buf.get_u8()),
            DataType::Enum16 => AttrValue::Enum16(buf.get_u16_le()),
            DataType::Single => AttrValue::Single(buf.get_f32_le()),
            DataType::UtcTime => AttrValue::UtcTime(buf.get_u32_le()),
            DataType::Ieee => {
                let mut addr = [0u8; 8];
                buf.copy_to_slice(&mut addr);
                AttrValue::Ieee(addr)
            }
            DataType::OctetString => AttrValue::OctetString(decode_prefixed(buf)?),
            DataType::CharString => {
                let raw = decode_prefixed(buf)?;
                let s = String::from_utf8(raw)
                    .map_err(|e| CodecError::InvalidString(e.to_string()))?;
                AttrValue::CharString(s)
            }
        };
        Ok(value)
    }

    /// Decode an attribute record value: type tag followed by value bytes
    pub fn decode_typed<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        ensure_remaining(buf, 1)?;
        let tag = buf.get_u8();
        let data_type = DataType::from_u8(tag).ok_or(CodecError::UnknownDataType(tag))?;
        Self::decode(data_type, buf)
    }
}

fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::TooShort {
            needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

fn decode_prefixed<B: Buf>(buf: &mut B) -> Result<Vec<u8>, CodecError> {
    ensure_remaining(buf, 1)?;
    let len = buf.get_u8();
    // 0xFF marks an invalid (absent) string
    if len == 0xFF {
        return Ok(Vec::new());
    }
    let len = usize::from(len);
    ensure_remaining(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}
