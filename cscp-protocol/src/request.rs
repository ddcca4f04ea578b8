//! Outbound commands, the encoding counterpart of [`crate::Response`].
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    codec::{Frame, MAX_PAYLOAD_LEN},
    command::{Command, RequestKey, Shape},
    error::PayloadError,
    response::{StereoImage, encode_text, flag_byte, pack_bits},
};

/// Most routing destinations a single write can carry after the entity id.
pub const MAX_ROUTES: usize = (MAX_PAYLOAD_LEN - 2) * 8;

/// A command ready to be framed and sent to the console.
///
/// Reads carry the read code and at most an entity id; writes carry the
/// write code and the new state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    command: Command,
    write: bool,
    payload: Bytes,
}

impl Request {
    /// Queries a console wide value.
    pub fn query(command: Command) -> Request {
        Request {
            command,
            write: false,
            payload: Bytes::new(),
        }
    }

    /// Queries the value of a single fader or main.
    pub fn query_entity(command: Command, id: u16) -> Request {
        Request {
            command,
            write: false,
            payload: Bytes::copy_from_slice(&id.to_be_bytes()),
        }
    }

    fn write(command: Command, id: u16, extra: &[u8]) -> Request {
        let mut payload = BytesMut::with_capacity(2 + extra.len());
        payload.put_u16(id);
        payload.put_slice(extra);
        Request {
            command,
            write: true,
            payload: payload.freeze(),
        }
    }

    /// Sets a fader or main level in protocol units.
    pub fn set_level(command: Command, id: u16, level: u16) -> Request {
        Request::write(command, id, &level.to_be_bytes())
    }

    /// Sets a cut or PFL state; the cut inversion is applied here.
    pub fn set_flag(command: Command, id: u16, engaged: bool) -> Request {
        Request::write(command, id, &[flag_byte(command, engaged)])
    }

    /// Sets a label, space padded to the command's field width.
    pub fn set_label(command: Command, id: u16, label: &str) -> Request {
        let width = match command.shape() {
            Shape::Label { width, .. } => width,
            _ => label.len(),
        };
        Request::write(command, id, &encode_text(label, width))
    }

    /// Sets a routing bit array, one flag per destination.
    pub fn set_routing(command: Command, id: u16, routes: &[bool]) -> Request {
        Request::write(command, id, &pack_bits(routes))
    }

    pub fn set_stereo_image(id: u16, image: StereoImage) -> Request {
        Request::write(Command::StereoImage, id, &image.sources())
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    /// The code put on the wire.
    pub fn code(&self) -> u16 {
        if self.write {
            self.command.write_code()
        } else {
            self.command.code()
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Checks that the request fits into a single frame.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(PayloadError::TooLarge {
                len: self.payload.len(),
            });
        }
        Ok(())
    }

    /// Key under which the reply to this request is expected.
    pub fn key(&self) -> RequestKey {
        RequestKey::for_request(self.command, &self.payload)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::to_console(self.code(), self.payload.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::RequestKey;

    #[test]
    fn console_info_query() {
        let request = Request::query(Command::ConsoleInfo);
        assert_eq!(
            &request.to_frame().to_bytes().unwrap()[..],
            &[0xF1, 0x02, 0x00, 0x00, 0x08, 0xF8]
        );
        assert_eq!(request.key(), RequestKey::new(0x0008, None));
    }

    #[test]
    fn fader_level_write() {
        let request = Request::set_level(Command::FaderLevel, 1, 0x0200);
        assert!(request.is_write());
        assert_eq!(request.code(), 0x8000);
        assert_eq!(&request.payload()[..], &[0x00, 0x01, 0x02, 0x00]);
    }

    #[test]
    fn cut_write_is_inverted() {
        let request = Request::set_flag(Command::FaderCut, 2, true);
        assert_eq!(&request.payload()[..], &[0x00, 0x02, 0x00]);
    }

    #[test]
    fn label_write_is_padded() {
        let request = Request::set_label(Command::FaderLabel, 3, "KICK");
        assert_eq!(&request.payload()[..], b"\x00\x03KICK    ");
    }

    #[test]
    fn routing_write_is_packed() {
        let request = Request::set_routing(Command::AuxRouting, 9, &[false, true, true]);
        assert_eq!(request.code(), 0x8011);
        assert_eq!(&request.payload()[..], &[0x00, 0x09, 0b0000_0110]);
    }

    #[test]
    fn oversized_routing_does_not_fit_a_frame() {
        let widest = Request::set_routing(Command::AuxRouting, 1, &[true; MAX_ROUTES]);
        assert_eq!(widest.validate(), Ok(()));
        assert!(widest.to_frame().to_bytes().is_ok());

        let request = Request::set_routing(Command::AuxRouting, 1, &vec![true; MAX_ROUTES + 1]);
        assert_eq!(request.validate(), Err(PayloadError::TooLarge { len: 254 }));
    }
}
