/// Encoding and validation of single frames
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{FrameError, PayloadError},
    protocol::{CONSOLE_DEVICE_ID, CONTROLLER_DEVICE_ID, SOH, WRITE_BIT},
};

/// Smallest frame without SOH: byte count, device, command (2), checksum.
const MIN_FRAME_LEN: usize = 5;
/// The byte count covers the command and the payload.
const COMMAND_LEN: usize = 2;
/// Largest payload whose byte count still fits into a single byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - COMMAND_LEN;

/// Two's complement of the sum of all command and payload bytes.
///
/// Adding the checksum to that sum yields zero modulo 256.
pub fn checksum(command: u16, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .chain(command.to_be_bytes().iter())
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// A single framed message as it travels on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    device_id: u8,
    command: u16,
    payload: Bytes,
}

impl Frame {
    pub fn new(device_id: u8, command: u16, payload: impl Into<Bytes>) -> Frame {
        Frame {
            device_id,
            command,
            payload: payload.into(),
        }
    }

    /// A frame sent by the controller, addressed to the console.
    pub fn to_console(command: u16, payload: impl Into<Bytes>) -> Frame {
        Frame::new(CONSOLE_DEVICE_ID, command, payload)
    }

    /// A frame sent by the console, addressed to the controller.
    pub fn to_controller(command: u16, payload: impl Into<Bytes>) -> Frame {
        Frame::new(CONTROLLER_DEVICE_ID, command, payload)
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// The full command code, including the write bit.
    pub fn command(&self) -> u16 {
        self.command
    }

    /// The command code with the write bit cleared.
    pub fn base_command(&self) -> u16 {
        self.command & !WRITE_BIT
    }

    pub fn is_write(&self) -> bool {
        self.command & WRITE_BIT != 0
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn checksum(&self) -> u8 {
        checksum(self.command, &self.payload)
    }

    /// Number of bytes on the wire, including the leading SOH.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + COMMAND_LEN + 4
    }

    /// Appends `SOH, byteCount, deviceId, command, payload, checksum` to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<(), PayloadError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadError::TooLarge {
                len: self.payload.len(),
            });
        }
        dst.reserve(self.encoded_len());
        dst.put_u8(SOH);
        dst.put_u8((self.payload.len() + COMMAND_LEN) as u8);
        dst.put_u8(self.device_id);
        dst.put_u16(self.command);
        dst.put_slice(&self.payload);
        dst.put_u8(self.checksum());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes, PayloadError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Validates and decodes a frame whose leading SOH was already stripped.
    ///
    /// `expected_device` is the id the frame must be addressed to,
    /// [`CONTROLLER_DEVICE_ID`] for frames received by a controller.
    pub fn decode(bytes: &[u8], expected_device: u8) -> Result<Frame, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: bytes.len() });
        }
        let byte_count = bytes[0] as usize;
        if bytes.len() != byte_count + 3 {
            return Err(FrameError::ByteCountMismatch {
                expected: byte_count + 3,
                actual: bytes.len(),
            });
        }
        let device_id = bytes[1];
        if device_id != expected_device {
            return Err(FrameError::WrongDevice {
                expected: expected_device,
                actual: device_id,
            });
        }
        let command = u16::from_be_bytes([bytes[2], bytes[3]]);
        let payload = &bytes[4..bytes.len() - 1];
        let actual = bytes[bytes.len() - 1];
        let expected = checksum(command, payload);
        if actual != expected {
            return Err(FrameError::Checksum { expected, actual });
        }
        Ok(Frame {
            device_id,
            command,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Encodes a command from the controller into its complete wire form.
pub fn encode(command: u16, payload: &[u8]) -> Result<Bytes, PayloadError> {
    Frame::to_console(command, Bytes::copy_from_slice(payload)).to_bytes()
}

#[test]
fn encode_console_info_request() {
    let bytes = encode(0x0008, &[]).unwrap();
    assert_eq!(&bytes[..], &[0xF1, 0x02, 0x00, 0x00, 0x08, 0xF8]);
}

#[test]
fn decode_fader_level_reply() {
    let data = [0x04, CONTROLLER_DEVICE_ID, 0x00, 0x00, 0x00, 0x01, 0xFF];
    let frame = Frame::decode(&data, CONTROLLER_DEVICE_ID).unwrap();
    assert_eq!(frame.command(), 0x0000);
    assert_eq!(&frame.payload()[..], &[0x00, 0x01]);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{CONSOLE_DEVICE_ID, CONTROLLER_DEVICE_ID};

    fn sample_payloads() -> Vec<Vec<u8>> {
        vec![
            vec![],
            vec![0x00, 0x01],
            vec![0x00, 0x2A, 0x03, 0xFF],
            (0..=252u8).collect(),
            vec![0xFF; MAX_PAYLOAD_LEN],
        ]
    }

    #[test]
    fn round_trip() {
        for command in [0x0000, 0x0008, 0x8003, 0x0015, 0xFFFF] {
            for payload in sample_payloads() {
                let bytes = encode(command, &payload).unwrap();
                let frame = Frame::decode(&bytes[1..], CONSOLE_DEVICE_ID).unwrap();
                assert_eq!(frame.command(), command);
                assert_eq!(&frame.payload()[..], &payload[..]);
            }
        }
    }

    #[test]
    fn checksum_closes_sum() {
        for command in [0x0000, 0x1234, 0x8015] {
            for payload in sample_payloads() {
                let sum = payload
                    .iter()
                    .chain(u16::to_be_bytes(command).iter())
                    .fold(checksum(command, &payload), |acc, b| acc.wrapping_add(*b));
                assert_eq!(sum, 0);
            }
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode(0x8003, &payload),
            Err(PayloadError::TooLarge {
                len: MAX_PAYLOAD_LEN + 1
            })
        );
    }

    #[test]
    fn too_short() {
        let data = [0x02, CONTROLLER_DEVICE_ID, 0x00, 0x00];
        assert_eq!(
            Frame::decode(&data, CONTROLLER_DEVICE_ID),
            Err(FrameError::TooShort { len: 4 })
        );
    }

    #[test]
    fn byte_count_mismatch() {
        let data = [0x05, CONTROLLER_DEVICE_ID, 0x00, 0x00, 0x00, 0x01, 0xFF];
        assert_eq!(
            Frame::decode(&data, CONTROLLER_DEVICE_ID),
            Err(FrameError::ByteCountMismatch {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn wrong_device() {
        let data = [0x04, 0x07, 0x00, 0x00, 0x00, 0x01, 0xFF];
        assert_eq!(
            Frame::decode(&data, CONTROLLER_DEVICE_ID),
            Err(FrameError::WrongDevice {
                expected: CONTROLLER_DEVICE_ID,
                actual: 0x07
            })
        );
    }

    #[test]
    fn checksum_mismatch() {
        let data = [0x04, CONTROLLER_DEVICE_ID, 0x00, 0x00, 0x00, 0x01, 0x12];
        assert_eq!(
            Frame::decode(&data, CONTROLLER_DEVICE_ID),
            Err(FrameError::Checksum {
                expected: 0xFF,
                actual: 0x12
            })
        );
    }

    #[test]
    fn write_bit() {
        let frame = Frame::to_controller(0x8004, vec![0x00, 0x01, 0x00, 0x10]);
        assert!(frame.is_write());
        assert_eq!(frame.base_command(), 0x0004);
        assert_eq!(frame.encoded_len(), frame.to_bytes().unwrap().len());
    }
}
