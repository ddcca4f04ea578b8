use std::io;

use cscp_protocol::{
    NakReasons, ProtocolVersion,
    error::{FrameError, PayloadError},
};
use thiserror::Error;

/// Errors returned by [`crate::Client`] calls.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("malformed reply: {0}")]
    Payload(#[from] PayloadError),
    #[error("{command} requires protocol {required}, console speaks {negotiated}")]
    ProtocolVersion {
        command: &'static str,
        required: ProtocolVersion,
        negotiated: ProtocolVersion,
    },
    #[error("console rejected the command: {reasons}")]
    Nak { reasons: NakReasons },
    #[error("no reply to {command} in time")]
    Timeout { command: &'static str },
    #[error("not connected to a console")]
    NotConnected,
    #[error("{field} {value} is out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{command} request was replaced by a newer request for the same target")]
    Superseded { command: &'static str },
    #[error("unexpected reply to {command}")]
    UnexpectedResponse { command: &'static str },
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Io(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Checks that `value` lies within `min..=max`.
pub(crate) fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        return Err(ClientError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[test]
fn range_message_names_value_and_bounds() {
    let err = check_range("fader id", 0, 1, 42).unwrap_err();
    assert_eq!(err.to_string(), "fader id 0 is out of range 1..=42");
    assert!(check_range("level", 1023, 0, 1023).is_ok());
}
