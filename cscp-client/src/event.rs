use std::fmt::Display;

use bytes::Bytes;
use cscp_protocol::{
    ConsoleInfo, NakReasons, Response,
    error::{FrameError, PayloadError},
};

/// Lifecycle of the connection to the console.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Everything a [`crate::Client`] reports besides call results.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleEvent {
    StateChanged(ConnectionState),
    /// The initialization handshake finished, possibly with fallback info.
    Ready(ConsoleInfo),
    /// A state change pushed by the console that answers no pending request.
    Notification(Response),
    /// A NAK arrived while no request was pending.
    Nak(NakReasons),
    /// A NAK sentinel without its reason byte.
    MalformedNak,
    /// A frame failed validation and was dropped.
    FrameError(FrameError),
    /// An unsolicited frame could not be decoded.
    DecodeError(PayloadError),
    /// Bytes were discarded while resynchronizing.
    Noise(Bytes),
}
