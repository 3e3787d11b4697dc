//! ZCL frame header and global command payloads

use crate::types::{CodecError, GlobalCommand, ZclStatus};
use crate::value::AttrValue;

/// Frame control: cluster-specific command (vs global)
pub const FC_CLUSTER_SPECIFIC: u8 = 0x01;
/// Frame control: manufacturer code present
pub const FC_MANUFACTURER_SPECIFIC: u8 = 0x04;
/// Frame control: sent from server to client
pub const FC_SERVER_TO_CLIENT: u8 = 0x08;
/// Frame control: disable default response
pub const FC_DISABLE_DEFAULT_RESPONSE: u8 = 0x10;

/// ZCL frame (Zigbee Cluster Library)
///
/// Frame format:
/// ```text
/// [Frame control: 1 byte]
/// [Manufacturer code: 2 bytes LE] (only if FC_MANUFACTURER_SPECIFIC)
/// [Transaction sequence: 1 byte]
/// [Command ID: 1 byte]
/// [Payload: variable]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclFrame {
    frame_control: u8,
    manufacturer_code: Option<u16>,
    transaction_seq: u8,
    command_id: u8,
    payload: Vec<u8>,
}

impl ZclFrame {
    /// Parse a ZCL frame from raw ASDU bytes
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < 3 {
            return Err(CodecError::TooShort {
                needed: 3,
                actual: data.len(),
            });
        }

        let frame_control = data[0];
        let mut idx = 1;

        let manufacturer_code = if (frame_control & FC_MANUFACTURER_SPECIFIC) != 0 {
            if data.len() < idx + 4 {
                return Err(CodecError::TooShort {
                    needed: idx + 4,
                    actual: data.len(),
                });
            }
            let code = u16::from_le_bytes([data[idx], data[idx + 1]]);
            idx += 2;
            Some(code)
        } else {
            None
        };

        let transaction_seq = data[idx];
        idx += 1;
        let command_id = data[idx];
        idx += 1;

        Ok(Self {
            frame_control,
            manufacturer_code,
            transaction_seq,
            command_id,
            payload: data[idx..].to_vec(),
        })
    }

    /// Create a global (profile-wide) command frame
    #[must_use]
    pub fn global(
        transaction_seq: u8,
        command: GlobalCommand,
        from_server: bool,
        payload: Vec<u8>,
    ) -> Self {
        let mut frame_control = FC_DISABLE_DEFAULT_RESPONSE;
        if from_server {
            frame_control |= FC_SERVER_TO_CLIENT;
        }
        Self {
            frame_control,
            manufacturer_code: None,
            transaction_seq,
            command_id: command as u8,
            payload,
        }
    }

    /// Scope the frame to a manufacturer
    #[must_use]
    pub fn with_manufacturer(mut self, code: u16) -> Self {
        self.frame_control |= FC_MANUFACTURER_SPECIFIC;
        self.manufacturer_code = Some(code);
        self
    }

    #[must_use]
    pub fn frame_control(&self) -> u8 {
        self.frame_control
    }

    #[must_use]
    pub fn manufacturer_code(&self) -> Option<u16> {
        self.manufacturer_code
    }

    #[must_use]
    pub fn transaction_seq(&self) -> u8 {
        self.transaction_seq
    }

    /// Check if this is a cluster-specific command (vs global)
    #[must_use]
    pub fn is_cluster_specific(&self) -> bool {
        (self.frame_control & 0x03) == FC_CLUSTER_SPECIFIC
    }

    /// Check if this is from server to client (vs client to server)
    #[must_use]
    pub fn is_from_server(&self) -> bool {
        (self.frame_control & FC_SERVER_TO_CLIENT) != 0
    }

    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize to bytes
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(5 + self.payload.len());
        data.push(self.frame_control);
        if let Some(mfr) = self.manufacturer_code {
            data.extend_from_slice(&mfr.to_le_bytes());
        }
        data.push(self.transaction_seq);
        data.push(self.command_id);
        data.extend_from_slice(&self.payload);
        data
    }
}

/// Report Attributes record: `[attr id][type][value]`
#[must_use]
pub fn report_record(attr_id: u16, value: &AttrValue) -> Vec<u8> {
    let mut data = attr_id.to_le_bytes().to_vec();
    value.encode_typed(&mut data);
    data
}

/// Read Attributes Response record: `[attr id][status]` then `[type][value]` on success
#[must_use]
pub fn read_response_record(attr_id: u16, status: ZclStatus, value: Option<&AttrValue>) -> Vec<u8> {
    let mut data = attr_id.to_le_bytes().to_vec();
    data.push(status as u8);
    if let (ZclStatus::Success, Some(value)) = (status, value) {
        value.encode_typed(&mut data);
    }
    data
}

/// Write / Configure Reporting response record.
///
/// A fully successful response is the single status byte; a failure
/// names the attribute it applies to.
#[must_use]
pub fn status_record(attr_id: u16, status: ZclStatus) -> Vec<u8> {
    let mut data = vec![status as u8];
    if status != ZclStatus::Success {
        data.extend_from_slice(&attr_id.to_le_bytes());
    }
    data
}

/// Default Response payload: `[command id][status]`
#[must_use]
pub fn default_response(command_id: u8, status: ZclStatus) -> Vec<u8> {
    vec![command_id, status as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_too_short() {
        let result = ZclFrame::parse(&[0x00, 0x01]);
        assert!(matches!(result, Err(CodecError::TooShort { .. })));
    }

    #[test]
    fn test_parse_manufacturer_specific() {
        let frame = ZclFrame::parse(&[0x05, 0x0B, 0x10, 0x07, 0x02, 0xAA]).unwrap();
        assert!(frame.is_cluster_specific());
        assert_eq!(frame.manufacturer_code(), Some(0x100B));
        assert_eq!(frame.transaction_seq(), 0x07);
        assert_eq!(frame.command_id(), 0x02);
        assert_eq!(frame.payload(), &[0xAA]);
    }

    #[test]
    fn test_parse_manufacturer_specific_truncated() {
        let result = ZclFrame::parse(&[0x04, 0x0B, 0x10]);
        assert!(matches!(result, Err(CodecError::TooShort { .. })));
    }

    #[test]
    fn test_global_report_frame() {
        let payload = report_record(0x0000, &AttrValue::Bool(true));
        let frame = ZclFrame::global(3, GlobalCommand::ReportAttributes, true, payload);
        assert_eq!(frame.serialize(), vec![0x18, 0x03, 0x0A, 0x00, 0x00, 0x10, 0x01]);
        assert!(frame.is_from_server());
        assert!(!frame.is_cluster_specific());
    }

    #[test]
    fn test_read_response_record_failure_has_no_value() {
        let data = read_response_record(0x0005, ZclStatus::UnsupportedAttribute, None);
        assert_eq!(data, vec![0x05, 0x00, 0x86]);
    }

    #[test]
    fn test_status_record() {
        assert_eq!(status_record(0x0010, ZclStatus::Success), vec![0x00]);
        assert_eq!(status_record(0x0010, ZclStatus::ReadOnly), vec![0x88, 0x10, 0x00]);
    }
}
