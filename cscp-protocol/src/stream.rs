//! Reassembly of frames and sentinels from a raw byte stream.
use bytes::{Buf, Bytes, BytesMut};

use crate::{
    codec::Frame,
    error::FrameError,
    nak::NakReasons,
    protocol::{ACK, CONSOLE_DEVICE_ID, CONTROLLER_DEVICE_ID, NAK, SOH},
};

/// Bytes needed before the byte count of a frame is trusted.
const MIN_HEADER_LEN: usize = 4;
/// SOH, byte count, device id and checksum surround the counted bytes.
const FRAME_OVERHEAD: usize = 4;

/// Something meaningful found in the inbound byte stream.
///
/// ACK sentinels are consumed silently and never surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A valid frame
    Frame(Frame),
    /// A NAK with its reason bitmask
    Nak(NakReasons),
    /// A NAK sentinel whose reason byte never arrived
    MalformedNak,
    /// Bytes discarded while searching for the next SOH
    Noise(Bytes),
    /// A complete frame that failed validation
    Invalid(FrameError),
}

/// Pulls the next item out of `buf`, or returns `None` if more data is needed.
pub fn next_inbound(buf: &mut BytesMut, expected_device: u8) -> Option<Inbound> {
    loop {
        match *buf.first()? {
            ACK => {
                buf.advance(1);
                log::trace!("Received ACK");
                continue;
            }
            NAK => {
                // The reason byte may arrive in a later read. A NAK is only
                // malformed once the stream ends without it, see `finish`.
                if buf.len() < 2 {
                    return None;
                }
                let reasons = NakReasons::from_bits(buf[1]);
                buf.advance(2);
                return Some(Inbound::Nak(reasons));
            }
            SOH => {}
            _ => {
                let noise_len = buf.iter().position(|b| *b == SOH).unwrap_or(buf.len());
                let noise = buf.split_to(noise_len).freeze();
                log::warn!("Discarding {} bytes of noise: {:02x?}", noise.len(), &noise[..]);
                return Some(Inbound::Noise(noise));
            }
        }

        if buf.len() < MIN_HEADER_LEN {
            return None;
        }
        let frame_len = buf[1] as usize + FRAME_OVERHEAD;
        if buf.len() < frame_len {
            return None;
        }
        let raw = buf.split_to(frame_len);
        log::trace!("Received frame: {:02x?}", &raw[..]);
        return Some(match Frame::decode(&raw[1..], expected_device) {
            Ok(frame) => Inbound::Frame(frame),
            Err(err) => {
                log::warn!("Dropping invalid frame: {}", err);
                Inbound::Invalid(err)
            }
        });
    }
}

/// Drains what is left in `buf` once the stream has ended.
pub fn finish_inbound(buf: &mut BytesMut, expected_device: u8) -> Option<Inbound> {
    if let Some(inbound) = next_inbound(buf, expected_device) {
        return Some(inbound);
    }
    if buf.is_empty() {
        return None;
    }
    if buf[..] == [NAK] {
        buf.clear();
        log::warn!("Stream ended after a NAK without reason byte");
        return Some(Inbound::MalformedNak);
    }
    Some(Inbound::Noise(buf.split().freeze()))
}

/// Buffers inbound chunks and splits them into [`Inbound`] items.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    expected_device: u8,
}

impl StreamReassembler {
    pub fn new(expected_device: u8) -> StreamReassembler {
        StreamReassembler {
            buffer: BytesMut::with_capacity(256),
            expected_device,
        }
    }

    /// Reassembler for the controller side, accepting frames from the console.
    pub fn for_controller() -> StreamReassembler {
        StreamReassembler::new(CONTROLLER_DEVICE_ID)
    }

    /// Reassembler for the console side, accepting frames from a controller.
    pub fn for_console() -> StreamReassembler {
        StreamReassembler::new(CONSOLE_DEVICE_ID)
    }

    /// Appends `data` and returns every item that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Inbound> {
        self.buffer.extend_from_slice(data);
        let mut items = Vec::new();
        while let Some(item) = next_inbound(&mut self.buffer, self.expected_device) {
            items.push(item);
        }
        items
    }

    /// Flushes incomplete data at the end of the stream.
    pub fn finish(&mut self) -> Vec<Inbound> {
        let mut items = Vec::new();
        while let Some(item) = finish_inbound(&mut self.buffer, self.expected_device) {
            items.push(item);
        }
        items
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(feature = "tokio")]
mod tokio_codec {
    use std::io;

    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Inbound, finish_inbound, next_inbound};
    use crate::{
        codec::Frame,
        protocol::{CONSOLE_DEVICE_ID, CONTROLLER_DEVICE_ID},
    };

    /// `tokio-util` codec reading [`Inbound`] items and writing [`Frame`]s.
    ///
    /// Invalid frames are yielded as items, so a framed stream keeps running
    /// after a checksum or device id error.
    #[derive(Debug, Clone, Copy)]
    pub struct CscpCodec {
        expected_device: u8,
    }

    impl CscpCodec {
        pub fn new(expected_device: u8) -> CscpCodec {
            CscpCodec { expected_device }
        }

        pub fn for_controller() -> CscpCodec {
            CscpCodec::new(CONTROLLER_DEVICE_ID)
        }

        pub fn for_console() -> CscpCodec {
            CscpCodec::new(CONSOLE_DEVICE_ID)
        }
    }

    impl Decoder for CscpCodec {
        type Item = Inbound;
        type Error = io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
            Ok(next_inbound(src, self.expected_device))
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
            Ok(finish_inbound(src, self.expected_device))
        }
    }

    impl Encoder<Frame> for CscpCodec {
        type Error = io::Error;

        fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), io::Error> {
            frame
                .write_to(dst)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
        }
    }
}

#[cfg(feature = "tokio")]
pub use tokio_codec::CscpCodec;

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::Frame;

    fn reply(command: u16, payload: &[u8]) -> Vec<u8> {
        Frame::to_controller(command, payload.to_vec())
            .to_bytes()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn splits_concatenated_frames() {
        let mut data = reply(0x8000, &[0, 1, 0, 2]);
        data.extend(reply(0x8001, &[0, 1, 1]));
        let items = StreamReassembler::for_controller().push(&data);
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Inbound::Frame(f) if f.command() == 0x8000));
        assert!(matches!(&items[1], Inbound::Frame(f) if f.command() == 0x8001));
    }

    #[test]
    fn waits_for_fragmented_frame() {
        let data = reply(0x8000, &[0, 1, 0, 2]);
        let mut reassembler = StreamReassembler::for_controller();
        assert!(reassembler.push(&data[..3]).is_empty());
        assert!(reassembler.push(&data[3..6]).is_empty());
        let items = reassembler.push(&data[6..]);
        assert_eq!(items.len(), 1);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn ack_is_silent() {
        let mut data = vec![ACK, ACK];
        data.extend(reply(0x8005, &[0, 1, 1]));
        let items = StreamReassembler::for_controller().push(&data);
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Inbound::Frame(_)));
    }

    #[test]
    fn nak_carries_reasons() {
        let items = StreamReassembler::for_controller().push(&[NAK, 0x21]);
        assert_eq!(items, vec![Inbound::Nak(NakReasons::from_bits(0x21))]);
    }

    #[test]
    fn nak_waits_for_reason_byte() {
        let mut reassembler = StreamReassembler::for_controller();
        assert!(reassembler.push(&[ACK, NAK]).is_empty());
        assert_eq!(
            reassembler.push(&[0x01]),
            vec![Inbound::Nak(NakReasons::COMMAND_NOT_SUPPORTED)]
        );
    }

    #[test]
    fn lone_nak_at_end_is_malformed() {
        let mut reassembler = StreamReassembler::for_controller();
        assert!(reassembler.push(&[NAK]).is_empty());
        assert_eq!(reassembler.finish(), vec![Inbound::MalformedNak]);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn discards_noise_before_soh() {
        let mut data = vec![0x33, 0x44];
        data.extend(reply(0x8000, &[0, 1, 0, 2]));
        let items = StreamReassembler::for_controller().push(&data);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Inbound::Noise(Bytes::from_static(&[0x33, 0x44])));
        assert!(matches!(&items[1], Inbound::Frame(_)));
    }

    #[test]
    fn resynchronizes_after_bad_checksum() {
        let mut data = reply(0x8000, &[0, 1, 0, 2]);
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        data.extend(reply(0x8000, &[0, 2, 0, 3]));
        let items = StreamReassembler::for_controller().push(&data);
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            Inbound::Invalid(FrameError::Checksum { .. })
        ));
        assert!(matches!(&items[1], Inbound::Frame(f) if f.payload()[1] == 2));
    }

    #[test]
    fn rejects_frames_for_other_devices() {
        let data = Frame::to_console(0x8000, vec![0, 1, 0, 2]).to_bytes().unwrap();
        let items = StreamReassembler::for_controller().push(&data);
        assert!(matches!(
            items[0],
            Inbound::Invalid(FrameError::WrongDevice { .. })
        ));
    }
}
