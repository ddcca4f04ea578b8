use thiserror::Error;

/// Errors raised while validating a single frame.
///
/// None of these are fatal for a connection: the stream resynchronizes
/// on the next start-of-header byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum FrameError {
    #[error("frame too short: got {len} bytes, need at least 5")]
    TooShort { len: usize },
    #[error("byte count mismatch: header declares {expected} bytes, frame carries {actual}")]
    ByteCountMismatch { expected: usize, actual: usize },
    #[error("incorrect device id: expected {expected:#04x}, got {actual:#04x}")]
    WrongDevice { expected: u8, actual: u8 },
    #[error("checksum error: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
}

/// Errors raised when a frame's payload does not fit its command's shape.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum PayloadError {
    #[error("{command} payload too short: need {needed} bytes, got {actual}")]
    Truncated {
        command: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("{command} payload carries invalid value {value} at offset {offset}")]
    InvalidValue {
        command: &'static str,
        offset: usize,
        value: u16,
    },
    #[error("frame too large: {len} bytes do not fit the one-byte byte count")]
    TooLarge { len: usize },
}
