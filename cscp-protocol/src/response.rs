//! Interpretation of frame payloads, keyed by command code.
use bytes::Bytes;

use crate::{
    command::{Command, Shape},
    error::PayloadError,
    protocol::{ConsoleInfo, MAX_LEVEL, ProtocolVersion},
};

/// How the left and right outputs of a stereo fader are fed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StereoImage {
    /// Left to left, right to right
    Normal,
    /// Left and right swapped
    Reverse,
    /// Left input feeds both outputs
    LeftToBoth,
    /// Right input feeds both outputs
    RightToBoth,
}

const SOURCE_LEFT: u8 = 0;
const SOURCE_RIGHT: u8 = 1;

impl StereoImage {
    /// Source of the (left, right) outputs: 0 for the left input, 1 for the right.
    pub fn sources(self) -> [u8; 2] {
        match self {
            StereoImage::Normal => [SOURCE_LEFT, SOURCE_RIGHT],
            StereoImage::Reverse => [SOURCE_RIGHT, SOURCE_LEFT],
            StereoImage::LeftToBoth => [SOURCE_LEFT, SOURCE_LEFT],
            StereoImage::RightToBoth => [SOURCE_RIGHT, SOURCE_RIGHT],
        }
    }

    pub fn from_sources(left: u8, right: u8) -> Option<StereoImage> {
        match (left, right) {
            (SOURCE_LEFT, SOURCE_RIGHT) => Some(StereoImage::Normal),
            (SOURCE_RIGHT, SOURCE_LEFT) => Some(StereoImage::Reverse),
            (SOURCE_LEFT, SOURCE_LEFT) => Some(StereoImage::LeftToBoth),
            (SOURCE_RIGHT, SOURCE_RIGHT) => Some(StereoImage::RightToBoth),
            _ => None,
        }
    }
}

/// The kind of audio path assigned to a fader.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AudioType {
    Unassigned,
    Channel,
    Group,
    VcaMaster,
    Main,
    Track,
    Aux,
    Other(u8),
}

impl From<u8> for AudioType {
    fn from(value: u8) -> Self {
        match value {
            0 => AudioType::Unassigned,
            1 => AudioType::Channel,
            2 => AudioType::Group,
            3 => AudioType::VcaMaster,
            4 => AudioType::Main,
            5 => AudioType::Track,
            6 => AudioType::Aux,
            other => AudioType::Other(other),
        }
    }
}

impl From<AudioType> for u8 {
    fn from(value: AudioType) -> Self {
        match value {
            AudioType::Unassigned => 0,
            AudioType::Channel => 1,
            AudioType::Group => 2,
            AudioType::VcaMaster => 3,
            AudioType::Main => 4,
            AudioType::Track => 5,
            AudioType::Aux => 6,
            AudioType::Other(other) => other,
        }
    }
}

/// Channel width of the path assigned to a fader.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AudioWidth {
    NoWidth,
    Mono,
    Stereo,
    Surround,
    Other(u8),
}

impl From<u8> for AudioWidth {
    fn from(value: u8) -> Self {
        match value {
            0 => AudioWidth::NoWidth,
            1 => AudioWidth::Mono,
            2 => AudioWidth::Stereo,
            6 => AudioWidth::Surround,
            other => AudioWidth::Other(other),
        }
    }
}

impl From<AudioWidth> for u8 {
    fn from(value: AudioWidth) -> Self {
        match value {
            AudioWidth::NoWidth => 0,
            AudioWidth::Mono => 1,
            AudioWidth::Stereo => 2,
            AudioWidth::Surround => 6,
            AudioWidth::Other(other) => other,
        }
    }
}

/// What is assigned to a fader.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Assignment {
    pub fader: u16,
    pub audio_type: AudioType,
    pub width: AudioWidth,
    pub internal_id: u16,
}

/// A decoded reply or unsolicited push.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    FaderLevel { fader: u16, level: u16 },
    FaderCut { fader: u16, cut: bool },
    FaderPfl { fader: u16, on: bool },
    FaderLabel { fader: u16, label: String },
    MainLevel { main: u16, level: u16 },
    MainPfl { main: u16, on: bool },
    MainLabel { main: u16, label: String },
    ConsoleName(String),
    ConsoleInfo(ConsoleInfo),
    FaderAssignment(Assignment),
    AvailableAux(Vec<bool>),
    AuxRouting { fader: u16, routes: Vec<bool> },
    AvailableMains(Vec<bool>),
    MainRouting { fader: u16, routes: Vec<bool> },
    StereoImage { fader: u16, image: StereoImage },
    /// A command this client does not know, passed on untouched.
    Raw { command: u16, payload: Bytes },
}

impl Response {
    /// Decodes `payload` according to the command `code` (write bit ignored).
    pub fn decode(code: u16, payload: &[u8]) -> Result<Response, PayloadError> {
        let Some(command) = Command::from_code(code) else {
            return Ok(Response::Raw {
                command: code,
                payload: Bytes::copy_from_slice(payload),
            });
        };
        let response = match command {
            Command::FaderLevel => {
                let (fader, level) = level(command, payload)?;
                Response::FaderLevel { fader, level }
            }
            Command::FaderCut => {
                let (fader, cut) = flag(command, payload)?;
                Response::FaderCut { fader, cut }
            }
            Command::FaderPfl => {
                let (fader, on) = flag(command, payload)?;
                Response::FaderPfl { fader, on }
            }
            Command::FaderLabel => Response::FaderLabel {
                fader: id(command, payload)?,
                label: label(command, payload)?,
            },
            Command::MainLevel => {
                let (main, level) = level(command, payload)?;
                Response::MainLevel { main, level }
            }
            Command::MainPfl => {
                let (main, on) = flag(command, payload)?;
                Response::MainPfl { main, on }
            }
            Command::MainLabel => Response::MainLabel {
                main: id(command, payload)?,
                label: label(command, payload)?,
            },
            Command::ConsoleName => Response::ConsoleName(label(command, payload)?),
            Command::ConsoleInfo => Response::ConsoleInfo(console_info(command, payload)?),
            Command::FaderAssignment => Response::FaderAssignment(assignment(command, payload)?),
            Command::AvailableAux => Response::AvailableAux(unpack_bits(payload, None)),
            Command::AuxRouting => Response::AuxRouting {
                fader: id(command, payload)?,
                routes: unpack_bits(&payload[2..], None),
            },
            Command::AvailableMains => Response::AvailableMains(unpack_bits(payload, None)),
            Command::MainRouting => Response::MainRouting {
                fader: id(command, payload)?,
                routes: unpack_bits(&payload[2..], None),
            },
            Command::StereoImage => {
                let (fader, image) = stereo_image(command, payload)?;
                Response::StereoImage { fader, image }
            }
        };
        Ok(response)
    }

    /// The command this response belongs to, if it is a known one.
    pub fn command(&self) -> Option<Command> {
        let command = match self {
            Response::FaderLevel { .. } => Command::FaderLevel,
            Response::FaderCut { .. } => Command::FaderCut,
            Response::FaderPfl { .. } => Command::FaderPfl,
            Response::FaderLabel { .. } => Command::FaderLabel,
            Response::MainLevel { .. } => Command::MainLevel,
            Response::MainPfl { .. } => Command::MainPfl,
            Response::MainLabel { .. } => Command::MainLabel,
            Response::ConsoleName(_) => Command::ConsoleName,
            Response::ConsoleInfo(_) => Command::ConsoleInfo,
            Response::FaderAssignment(_) => Command::FaderAssignment,
            Response::AvailableAux(_) => Command::AvailableAux,
            Response::AuxRouting { .. } => Command::AuxRouting,
            Response::AvailableMains(_) => Command::AvailableMains,
            Response::MainRouting { .. } => Command::MainRouting,
            Response::StereoImage { .. } => Command::StereoImage,
            Response::Raw { .. } => return None,
        };
        Some(command)
    }
}

fn require(command: Command, payload: &[u8], needed: usize) -> Result<(), PayloadError> {
    if payload.len() < needed {
        return Err(PayloadError::Truncated {
            command: command.name(),
            needed,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn u16_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn id(command: Command, payload: &[u8]) -> Result<u16, PayloadError> {
    require(command, payload, 2)?;
    Ok(u16_at(payload, 0))
}

fn level(command: Command, payload: &[u8]) -> Result<(u16, u16), PayloadError> {
    require(command, payload, 4)?;
    let level = u16_at(payload, 2);
    if level > MAX_LEVEL {
        return Err(PayloadError::InvalidValue {
            command: command.name(),
            offset: 2,
            value: level,
        });
    }
    Ok((u16_at(payload, 0), level))
}

/// Cut is inverted on the wire: 0 means cut, 1 means not cut.
fn flag(command: Command, payload: &[u8]) -> Result<(u16, bool), PayloadError> {
    require(command, payload, 3)?;
    let engaged = match (command.shape(), payload[2]) {
        (Shape::Cut, 0) | (Shape::Pfl, 1) => true,
        (Shape::Cut, 1) | (Shape::Pfl, 0) => false,
        (_, value) => {
            return Err(PayloadError::InvalidValue {
                command: command.name(),
                offset: 2,
                value: value as u16,
            });
        }
    };
    Ok((u16_at(payload, 0), engaged))
}

/// Byte written for a cut or PFL state.
pub fn flag_byte(command: Command, engaged: bool) -> u8 {
    match command.shape() {
        Shape::Cut => u8::from(!engaged),
        _ => u8::from(engaged),
    }
}

fn label(command: Command, payload: &[u8]) -> Result<String, PayloadError> {
    let Shape::Label { offset, width } = command.shape() else {
        return Ok(String::new());
    };
    require(command, payload, offset)?;
    let end = payload.len().min(offset + width);
    Ok(decode_text(&payload[offset..end]))
}

fn decode_text(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

const INFO_VERSION_OFFSET: usize = 0;
const INFO_FADERS_OFFSET: usize = 2;
const INFO_MAINS_OFFSET: usize = 4;
const INFO_LABEL_OFFSET: usize = 8;
const INFO_LABEL_WIDTH: usize = 8;

fn console_info(command: Command, payload: &[u8]) -> Result<ConsoleInfo, PayloadError> {
    require(command, payload, INFO_LABEL_OFFSET)?;
    let end = payload.len().min(INFO_LABEL_OFFSET + INFO_LABEL_WIDTH);
    Ok(ConsoleInfo::new(
        ProtocolVersion::new(u16_at(payload, INFO_VERSION_OFFSET)),
        u16_at(payload, INFO_FADERS_OFFSET),
        u16_at(payload, INFO_MAINS_OFFSET),
        decode_text(&payload[INFO_LABEL_OFFSET..end]),
    ))
}

/// Encodes a console info record, as sent by a console.
pub fn encode_console_info(info: &ConsoleInfo) -> Vec<u8> {
    let mut payload = Vec::with_capacity(INFO_LABEL_OFFSET + INFO_LABEL_WIDTH);
    payload.extend_from_slice(&info.protocol_version().get().to_be_bytes());
    payload.extend_from_slice(&info.max_faders().to_be_bytes());
    payload.extend_from_slice(&info.max_mains().to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&encode_text(info.desk_label(), INFO_LABEL_WIDTH));
    payload
}

/// Pads (or cuts) `text` to exactly `width` bytes.
pub fn encode_text(text: &str, width: usize) -> Vec<u8> {
    let mut field: Vec<u8> = text.bytes().take(width).collect();
    field.resize(width, b' ');
    field
}

fn assignment(command: Command, payload: &[u8]) -> Result<Assignment, PayloadError> {
    require(command, payload, 6)?;
    Ok(Assignment {
        fader: u16_at(payload, 0),
        audio_type: AudioType::from(payload[2]),
        width: AudioWidth::from(payload[3]),
        internal_id: u16_at(payload, 4),
    })
}

/// Encodes an assignment record, as sent by a console.
pub fn encode_assignment(assignment: &Assignment) -> Vec<u8> {
    let mut payload = assignment.fader.to_be_bytes().to_vec();
    payload.push(assignment.audio_type.into());
    payload.push(assignment.width.into());
    payload.extend_from_slice(&assignment.internal_id.to_be_bytes());
    payload
}

fn stereo_image(command: Command, payload: &[u8]) -> Result<(u16, StereoImage), PayloadError> {
    require(command, payload, 4)?;
    let image = StereoImage::from_sources(payload[2], payload[3]).ok_or(
        PayloadError::InvalidValue {
            command: command.name(),
            offset: 2,
            value: u16_at(payload, 2),
        },
    )?;
    Ok((u16_at(payload, 0), image))
}

/// Unpacks one flag per bit, lowest bit of each byte first.
///
/// Stops after `max` flags if given, otherwise after every bit of `bytes`.
pub fn unpack_bits(bytes: &[u8], max: Option<usize>) -> Vec<bool> {
    let count = max.unwrap_or(usize::MAX).min(bytes.len() * 8);
    (0..count)
        .map(|index| bytes[index / 8] & (1 << (index % 8)) != 0)
        .collect()
}

/// Mirror of [`unpack_bits`]; the last byte is zero padded.
pub fn pack_bits(flags: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; flags.len().div_ceil(8)];
    for (index, _) in flags.iter().enumerate().filter(|(_, set)| **set) {
        bytes[index / 8] |= 1 << (index % 8);
    }
    bytes
}
