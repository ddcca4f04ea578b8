//! # CSCP Server Library
//!
//! The console side of CSCP. It lets tests and demos stand in for a real
//! mixing console.
//!
//! ## Architecture
//!
//! - **[`ConsoleBackend`] Trait**: answers queries and applies writes for a
//!   console's faders, mains and routing
//! - **[`server::Server`]**: accepts controller connections, reassembles their
//!   frames and dispatches them to the backend
//! - **[`simulator::SimulatedConsole`]**: an in-memory backend with a
//!   configurable number of faders, mains and aux outputs
//!
//! ## How It Works
//!
//! 1. A backend implements [`ConsoleBackend`]
//! 2. The backend is wrapped in a [`server::Server`]
//! 3. The server listens for TCP connections and reads controller frames
//! 4. Queries are answered with a reply frame; writes are acknowledged and
//!    the new state is pushed back
//! 5. Unknown commands and broken frames are answered with a NAK
//!
//! ## Basic Usage
//!
//! ```ignore
//! use cscp_protocol::{ConsoleInfo, ProtocolVersion};
//! use cscp_server::{server::Server, simulator::SimulatedConsole};
//!
//! let console = SimulatedConsole::new(ConsoleInfo::new(ProtocolVersion::V21, 24, 2, "Sim"));
//! let server = Server::new(console, Default::default());
//! server.listen("127.0.0.1:3322")?;
//! ```
//!
//! ## Logging
//!
//! This crate uses the `log` crate. Connections are logged at info level,
//! every processed frame at debug level.
//!
//! ## Thread Model
//!
//! The server processes one controller connection at a time on the calling
//! thread.
use std::sync::Arc;

use cscp_protocol::{Command, NakReasons};

pub mod server;
pub mod simulator;

/// Payload of a reply frame, or the reasons for rejecting the command.
pub type Reply = Result<Vec<u8>, NakReasons>;

/// Interface between the protocol server and the state of a console.
///
/// Payloads are exchanged without the frame around them. The server takes
/// care of the write bit, the device id and the checksum.
pub trait ConsoleBackend {
    /// Answers a query for `command`.
    ///
    /// `payload` is empty for console wide commands and carries the
    /// big endian fader or main id otherwise.
    fn query(&self, command: Command, payload: &[u8]) -> Reply;

    /// Applies a write and returns the payload describing the new state.
    ///
    /// The returned payload is pushed back to the controller, the same way
    /// a console reports a change made on its surface.
    fn write(&self, command: Command, payload: &[u8]) -> Reply;
}

impl<T: ConsoleBackend + ?Sized> ConsoleBackend for Arc<T> {
    fn query(&self, command: Command, payload: &[u8]) -> Reply {
        (**self).query(command, payload)
    }

    fn write(&self, command: Command, payload: &[u8]) -> Reply {
        (**self).write(command, payload)
    }
}
