use std::fmt::Display;

/// Start-of-header byte that opens every framed message.
pub const SOH: u8 = 0xF1;
/// Bare positive acknowledgement sent outside the frame format.
pub const ACK: u8 = 0x04;
/// Negative acknowledgement, always followed by one reason bitmask byte.
pub const NAK: u8 = 0x05;

/// Device id carried by frames the controller sends to the console.
pub const CONSOLE_DEVICE_ID: u8 = 0x00;
/// Device id carried by frames the console sends to the controller.
pub const CONTROLLER_DEVICE_ID: u8 = 0x01;

/// Bit 15 of a command code marks a write (or a push from the console).
pub const WRITE_BIT: u16 = 0x8000;

/// Highest protocol level a fader may be set to.
pub const MAX_LEVEL: u16 = 1023;

/// The protocol version negotiated with the console.
///
/// Consoles report a single integer. Extension command blocks are only
/// available above certain versions, see [`crate::Command::min_version`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    /// The base command set
    pub const V1: ProtocolVersion = ProtocolVersion(1);
    /// Adds the aux routing family
    pub const V20: ProtocolVersion = ProtocolVersion(20);
    /// Adds main routing and stereo image
    pub const V21: ProtocolVersion = ProtocolVersion(21);

    pub const fn new(version: u16) -> ProtocolVersion {
        ProtocolVersion(version)
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

#[test]
fn version_ordering() {
    assert!(ProtocolVersion::V1 < ProtocolVersion::V20);
    assert!(ProtocolVersion::new(22) > ProtocolVersion::V21);
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V1
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Static facts about the console, exchanged once after connecting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsoleInfo {
    protocol_version: ProtocolVersion,
    max_faders: u16,
    max_mains: u16,
    desk_label: String,
}

impl ConsoleInfo {
    /// Label reported when the console could not be queried.
    pub const UNKNOWN_LABEL: &str = "Unknown";

    pub fn new(
        protocol_version: ProtocolVersion,
        max_faders: u16,
        max_mains: u16,
        desk_label: impl Into<String>,
    ) -> ConsoleInfo {
        ConsoleInfo {
            protocol_version,
            max_faders,
            max_mains,
            desk_label: desk_label.into(),
        }
    }

    /// Info used when the console does not answer the initial handshake.
    pub fn fallback(max_faders: u16, max_mains: u16) -> ConsoleInfo {
        ConsoleInfo::new(
            ProtocolVersion::V1,
            max_faders,
            max_mains,
            Self::UNKNOWN_LABEL,
        )
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Number of faders; fader ids run from 1 to this value.
    pub fn max_faders(&self) -> u16 {
        self.max_faders
    }

    /// Number of main outputs; main ids run from 1 to this value.
    pub fn max_mains(&self) -> u16 {
        self.max_mains
    }

    pub fn desk_label(&self) -> &str {
        &self.desk_label
    }

    /// Replaces the label, e.g. with the longer console name.
    pub fn with_desk_label(mut self, label: impl Into<String>) -> ConsoleInfo {
        self.desk_label = label.into();
        self
    }
}

#[test]
fn fallback_info() {
    let info = ConsoleInfo::fallback(42, 3);
    assert_eq!(info.protocol_version(), ProtocolVersion::V1);
    assert_eq!(info.max_faders(), 42);
    assert_eq!(info.max_mains(), 3);
    assert_eq!(info.desk_label(), "Unknown");
}
