use std::fmt::Display;

use crate::{
    codec::Frame,
    protocol::{ProtocolVersion, WRITE_BIT},
};

/// What a command addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Console wide, the request carries no id.
    Global,
    /// A fader, addressed by the big endian id leading the payload.
    Fader,
    /// A main output, addressed like a fader.
    Main,
}

/// Payload layout of a command's reply (and of its write counterpart).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Shape {
    /// `u16 id, u16 level`
    Level,
    /// `u16 id, u8 state` where 0 means cut
    Cut,
    /// `u16 id, u8 state` where 1 means on
    Pfl,
    /// Fixed width text field
    Label { offset: usize, width: usize },
    /// Fixed offset console info record
    ConsoleInfo,
    /// One bit per index, without a leading id
    BitArray,
    /// `u16 id` followed by one bit per index
    Routing,
    /// `u16 id, u8 left source, u8 right source`
    StereoImage,
    /// `u16 id, u8 type, u8 width, u16 internal id`
    Assignment,
}

/// Every command this client knows how to issue and decode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    FaderLevel,
    FaderCut,
    FaderPfl,
    FaderLabel,
    MainLevel,
    MainPfl,
    ConsoleName,
    ConsoleInfo,
    FaderAssignment,
    MainLabel,
    AvailableAux,
    AuxRouting,
    AvailableMains,
    MainRouting,
    StereoImage,
}

/// Static properties of a command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    pub code: u16,
    pub name: &'static str,
    pub scope: Scope,
    pub shape: Shape,
    pub min_version: ProtocolVersion,
    pub writable: bool,
}

const LABEL_WIDTH: usize = 8;
const CONSOLE_NAME_WIDTH: usize = 32;

const fn descriptor(
    code: u16,
    name: &'static str,
    scope: Scope,
    shape: Shape,
    min_version: ProtocolVersion,
    writable: bool,
) -> Descriptor {
    Descriptor {
        code,
        name,
        scope,
        shape,
        min_version,
        writable,
    }
}

impl Command {
    pub const ALL: [Command; 15] = [
        Command::FaderLevel,
        Command::FaderCut,
        Command::FaderPfl,
        Command::FaderLabel,
        Command::MainLevel,
        Command::MainPfl,
        Command::ConsoleName,
        Command::ConsoleInfo,
        Command::FaderAssignment,
        Command::MainLabel,
        Command::AvailableAux,
        Command::AuxRouting,
        Command::AvailableMains,
        Command::MainRouting,
        Command::StereoImage,
    ];

    pub const fn descriptor(self) -> Descriptor {
        use ProtocolVersion as V;
        use Scope::*;
        let label = Shape::Label {
            offset: 2,
            width: LABEL_WIDTH,
        };
        match self {
            Command::FaderLevel => descriptor(0x0000, "fader level", Fader, Shape::Level, V::V1, true),
            Command::FaderCut => descriptor(0x0001, "fader cut", Fader, Shape::Cut, V::V1, true),
            Command::FaderPfl => descriptor(0x0002, "fader PFL", Fader, Shape::Pfl, V::V1, true),
            Command::FaderLabel => descriptor(0x0003, "fader label", Fader, label, V::V1, true),
            Command::MainLevel => descriptor(0x0004, "main fader level", Main, Shape::Level, V::V1, true),
            Command::MainPfl => descriptor(0x0005, "main fader PFL", Main, Shape::Pfl, V::V1, true),
            Command::ConsoleName => descriptor(
                0x0007,
                "console name",
                Global,
                Shape::Label {
                    offset: 0,
                    width: CONSOLE_NAME_WIDTH,
                },
                V::V1,
                false,
            ),
            Command::ConsoleInfo => {
                descriptor(0x0008, "console info", Global, Shape::ConsoleInfo, V::V1, false)
            }
            Command::FaderAssignment => descriptor(
                0x000B,
                "fader assignment",
                Fader,
                Shape::Assignment,
                V::V1,
                false,
            ),
            Command::MainLabel => descriptor(0x000C, "main fader label", Main, label, V::V1, true),
            Command::AvailableAux => {
                descriptor(0x0010, "available aux", Global, Shape::BitArray, V::V20, false)
            }
            Command::AuxRouting => descriptor(0x0011, "aux routing", Fader, Shape::Routing, V::V20, true),
            Command::AvailableMains => {
                descriptor(0x0013, "available mains", Global, Shape::BitArray, V::V21, false)
            }
            Command::MainRouting => {
                descriptor(0x0014, "main routing", Fader, Shape::Routing, V::V21, true)
            }
            Command::StereoImage => {
                descriptor(0x0015, "stereo image", Fader, Shape::StereoImage, V::V21, true)
            }
        }
    }

    /// Looks up a command by its code; the write bit is ignored.
    pub fn from_code(code: u16) -> Option<Command> {
        let base = code & !WRITE_BIT;
        Command::ALL.into_iter().find(|c| c.code() == base)
    }

    /// The read (query) code.
    pub const fn code(self) -> u16 {
        self.descriptor().code
    }

    /// The write code, i.e. the read code with bit 15 set.
    pub const fn write_code(self) -> u16 {
        self.descriptor().code | WRITE_BIT
    }

    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub const fn scope(self) -> Scope {
        self.descriptor().scope
    }

    pub const fn shape(self) -> Shape {
        self.descriptor().shape
    }

    pub const fn min_version(self) -> ProtocolVersion {
        self.descriptor().min_version
    }

    pub const fn is_writable(self) -> bool {
        self.descriptor().writable
    }

    /// Level writes are high frequency traffic and get their own lane.
    pub const fn is_level(self) -> bool {
        matches!(self, Command::FaderLevel | Command::MainLevel)
    }

    pub fn is_supported_by(self, version: ProtocolVersion) -> bool {
        version >= self.min_version()
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.code())
    }
}

/// Identifies an outstanding request so that its reply can be matched.
///
/// Global commands are keyed by code alone, all others by code and the
/// entity id leading the payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RequestKey {
    command: u16,
    entity: Option<u16>,
}

impl RequestKey {
    pub fn new(command: u16, entity: Option<u16>) -> RequestKey {
        RequestKey {
            command: command & !WRITE_BIT,
            entity,
        }
    }

    /// Key for a request about to be sent.
    pub fn for_request(command: Command, payload: &[u8]) -> RequestKey {
        let entity = match command.scope() {
            Scope::Global => None,
            Scope::Fader | Scope::Main => leading_id(payload),
        };
        RequestKey::new(command.code(), entity)
    }

    /// Key a received frame would answer. Unknown commands are keyed by code.
    pub fn for_frame(frame: &Frame) -> RequestKey {
        match Command::from_code(frame.command()) {
            Some(command) => RequestKey::for_request(command, frame.payload()),
            None => RequestKey::new(frame.command(), None),
        }
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    pub fn entity(&self) -> Option<u16> {
        self.entity
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entity {
            Some(entity) => write!(f, "{:#06x}:{}", self.command, entity),
            None => write!(f, "{:#06x}", self.command),
        }
    }
}

fn leading_id(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}
