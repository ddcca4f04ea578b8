//! # CSCP Protocol Library
//!
//! This crate implements the wire format of CSCP, the binary control protocol
//! spoken by broadcast audio mixing consoles over TCP. It contains no I/O of
//! its own; the `cscp-client` crate drives it over a socket.
//!
//! ## Overview
//!
//! - [`Frame`]: encoding and validation of a single framed message,
//!   including the checksum
//! - [`StreamReassembler`]: splitting a raw byte stream into frames, NAKs and
//!   discarded noise, resynchronizing on the next start-of-header byte
//! - [`Command`]: the closed table of known commands, their scope, payload
//!   shape and minimum protocol version
//! - [`Response`] / [`Request`]: decoding of reply payloads and encoding of
//!   queries and writes
//! - [`level`]: conversion between decibels and protocol levels
//!
//! ## Wire Format
//!
//! - **ACK**: `0x04`
//! - **NAK**: `0x05 <reason bitmask: u8>`
//! - **Frame**: `0xF1 <byte count: u8> <device id: u8> <command: u16 BE> <payload> <checksum: u8>`
//!
//! The byte count covers the command and the payload. The checksum is the
//! two's complement of the sum of the command and payload bytes. Bit 15 of the
//! command marks a write; replies and pushes from the console carry it too.
//!
//! ## Basic Usage
//!
//! ### Encoding a Query
//!
//! ```
//! use cscp_protocol::{Command, Request};
//!
//! let request = Request::query(Command::ConsoleInfo);
//! let bytes = request.to_frame().to_bytes().expect("Payload fits into a frame");
//! assert_eq!(&bytes[..], &[0xF1, 0x02, 0x00, 0x00, 0x08, 0xF8]);
//! ```
//!
//! ### Decoding Replies
//!
//! ```
//! use cscp_protocol::{Frame, Inbound, Response, StreamReassembler};
//!
//! let reply = Frame::to_controller(0x8000, vec![0x00, 0x01, 0x02, 0x00]);
//! let mut reassembler = StreamReassembler::for_controller();
//! for item in reassembler.push(&reply.to_bytes().unwrap()) {
//!     if let Inbound::Frame(frame) = item {
//!         let response = Response::decode(frame.command(), frame.payload()).unwrap();
//!         assert_eq!(response, Response::FaderLevel { fader: 1, level: 512 });
//!     }
//! }
//! ```
//!
//! ### Converting Levels
//!
//! ```
//! use cscp_protocol::level;
//!
//! assert_eq!(level::db_to_channel_level(10.0), 1023);
//! assert_eq!(level::main_level_to_db(0), -100.0);
//! ```
//!
//! ## Error Handling
//!
//! Frame validation fails with [`error::FrameError`], payload interpretation
//! with [`error::PayloadError`].
//!
//! ## Features
//!
//! - `tokio`: adds `CscpCodec`, a `tokio-util` codec over [`Inbound`] and [`Frame`]

pub mod codec;
pub mod command;
pub mod error;
pub mod level;
pub mod nak;
pub mod protocol;
pub mod request;
pub mod response;
pub mod stream;

pub use codec::Frame;
pub use command::{Command, RequestKey, Scope, Shape};
pub use nak::NakReasons;
pub use protocol::*;
pub use request::Request;
pub use response::{Assignment, AudioType, AudioWidth, Response, StereoImage};
pub use stream::{Inbound, StreamReassembler};
#[cfg(feature = "tokio")]
pub use stream::CscpCodec;
