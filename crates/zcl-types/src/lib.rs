//! ZCL (Zigbee Cluster Library) wire vocabulary
//!
//! This crate holds the types shared between the attribute registry and
//! the stack boundary: data type tags, typed attribute values with their
//! exact-width integers, device addresses, status codes and the ZCL frame
//! header. Packing to and from bytes happens here and nowhere else.

pub mod address;
pub mod frame;
pub mod types;
pub mod value;

pub use address::{Address, AddressType};
pub use frame::ZclFrame;
pub use types::*;
pub use value::{AttrValue, I24, I48, MAX_STRING_LEN, U24, U48};
