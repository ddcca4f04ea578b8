//! An in-memory console for tests and demos.
use std::sync::{Mutex, MutexGuard};

use cscp_protocol::{
    Assignment, AudioType, AudioWidth, Command, ConsoleInfo, NakReasons, Response, Scope,
    StereoImage,
    response::{encode_assignment, encode_console_info, encode_text, flag_byte, pack_bits},
};

use crate::{ConsoleBackend, Reply};

const LABEL_WIDTH: usize = 8;
const NAME_WIDTH: usize = 32;
const DEFAULT_AUX_COUNT: usize = 8;

/// State of one fader strip.
#[derive(Clone, Debug, PartialEq)]
pub struct FaderState {
    pub level: u16,
    pub cut: bool,
    pub pfl: bool,
    pub label: String,
    pub aux: Vec<bool>,
    pub mains: Vec<bool>,
    pub image: StereoImage,
    pub assignment: Assignment,
}

/// State of one main output.
#[derive(Clone, Debug, PartialEq)]
pub struct MainState {
    pub level: u16,
    pub pfl: bool,
    pub label: String,
}

#[derive(Debug)]
struct Desk {
    faders: Vec<FaderState>,
    mains: Vec<MainState>,
    aux_count: usize,
}

/// A console that keeps its whole state in memory.
///
/// Faders start at level 0, not cut, labelled `CH n` and routed to the first
/// main; mains start at level 0, labelled `MAIN n`. Commands newer than the
/// configured protocol version are rejected like on a real console.
#[derive(Debug)]
pub struct SimulatedConsole {
    info: ConsoleInfo,
    desk: Mutex<Desk>,
}

impl SimulatedConsole {
    pub fn new(info: ConsoleInfo) -> SimulatedConsole {
        SimulatedConsole::with_aux_count(info, DEFAULT_AUX_COUNT)
    }

    pub fn with_aux_count(info: ConsoleInfo, aux_count: usize) -> SimulatedConsole {
        let main_count = usize::from(info.max_mains());
        let faders = (1..=info.max_faders())
            .map(|id| FaderState {
                level: 0,
                cut: false,
                pfl: false,
                label: format!("CH {}", id),
                aux: vec![false; aux_count],
                mains: (0..main_count).map(|index| index == 0).collect(),
                image: StereoImage::Normal,
                assignment: Assignment {
                    fader: id,
                    audio_type: AudioType::Channel,
                    width: AudioWidth::Stereo,
                    internal_id: id,
                },
            })
            .collect();
        let mains = (1..=info.max_mains())
            .map(|id| MainState {
                level: 0,
                pfl: false,
                label: format!("MAIN {}", id),
            })
            .collect();
        SimulatedConsole {
            info,
            desk: Mutex::new(Desk {
                faders,
                mains,
                aux_count,
            }),
        }
    }

    pub fn info(&self) -> &ConsoleInfo {
        &self.info
    }

    /// Snapshot of a fader, 1-based.
    pub fn fader(&self, id: u16) -> Option<FaderState> {
        let index = usize::from(id).checked_sub(1)?;
        self.desk().faders.get(index).cloned()
    }

    /// Snapshot of a main, 1-based.
    pub fn main(&self, id: u16) -> Option<MainState> {
        let index = usize::from(id).checked_sub(1)?;
        self.desk().mains.get(index).cloned()
    }

    fn desk(&self) -> MutexGuard<'_, Desk> {
        // A panic while holding the lock leaves the desk usable.
        self.desk.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn global(&self, command: Command, desk: &Desk) -> Reply {
        match command {
            Command::ConsoleInfo => Ok(encode_console_info(&self.info)),
            Command::ConsoleName => Ok(encode_text(self.info.desk_label(), NAME_WIDTH)),
            Command::AvailableAux => Ok(pack_bits(&vec![true; desk.aux_count])),
            Command::AvailableMains => Ok(pack_bits(&vec![true; desk.mains.len()])),
            _ => Err(NakReasons::COMMAND_NOT_SUPPORTED),
        }
    }

    fn fader_state(command: Command, id: u16, fader: &FaderState) -> Reply {
        let mut payload = id.to_be_bytes().to_vec();
        match command {
            Command::FaderLevel => payload.extend_from_slice(&fader.level.to_be_bytes()),
            Command::FaderCut => payload.push(flag_byte(command, fader.cut)),
            Command::FaderPfl => payload.push(flag_byte(command, fader.pfl)),
            Command::FaderLabel => payload.extend(encode_text(&fader.label, LABEL_WIDTH)),
            Command::FaderAssignment => return Ok(encode_assignment(&fader.assignment)),
            Command::AuxRouting => payload.extend(pack_bits(&fader.aux)),
            Command::MainRouting => payload.extend(pack_bits(&fader.mains)),
            Command::StereoImage => payload.extend_from_slice(&fader.image.sources()),
            _ => return Err(NakReasons::COMMAND_NOT_SUPPORTED),
        }
        Ok(payload)
    }

    fn main_state(command: Command, id: u16, main: &MainState) -> Reply {
        let mut payload = id.to_be_bytes().to_vec();
        match command {
            Command::MainLevel => payload.extend_from_slice(&main.level.to_be_bytes()),
            Command::MainPfl => payload.push(flag_byte(command, main.pfl)),
            Command::MainLabel => payload.extend(encode_text(&main.label, LABEL_WIDTH)),
            _ => return Err(NakReasons::COMMAND_NOT_SUPPORTED),
        }
        Ok(payload)
    }

    fn check_version(&self, command: Command) -> Result<(), NakReasons> {
        if command.is_supported_by(self.info.protocol_version()) {
            Ok(())
        } else {
            log::debug!(
                "{} needs protocol {}, simulating {}",
                command,
                command.min_version(),
                self.info.protocol_version()
            );
            Err(NakReasons::COMMAND_NOT_SUPPORTED)
        }
    }
}

/// Resolves the 1-based id leading `payload` to an index below `count`.
fn entity_index(payload: &[u8], count: usize) -> Result<(u16, usize), NakReasons> {
    let bytes: [u8; 2] = payload
        .get(..2)
        .and_then(|id| id.try_into().ok())
        .ok_or(NakReasons::BYTE_COUNT_ERROR)?;
    let id = u16::from_be_bytes(bytes);
    match usize::from(id).checked_sub(1) {
        Some(index) if index < count => Ok((id, index)),
        _ => Err(NakReasons::PROTOCOL_ERROR),
    }
}

impl ConsoleBackend for SimulatedConsole {
    fn query(&self, command: Command, payload: &[u8]) -> Reply {
        self.check_version(command)?;
        let desk = self.desk();
        match command.scope() {
            Scope::Global => self.global(command, &desk),
            Scope::Fader => {
                let (id, index) = entity_index(payload, desk.faders.len())?;
                SimulatedConsole::fader_state(command, id, &desk.faders[index])
            }
            Scope::Main => {
                let (id, index) = entity_index(payload, desk.mains.len())?;
                SimulatedConsole::main_state(command, id, &desk.mains[index])
            }
        }
    }

    fn write(&self, command: Command, payload: &[u8]) -> Reply {
        self.check_version(command)?;
        let response = Response::decode(command.code(), payload).map_err(|err| {
            log::warn!("Rejecting write: {}", err);
            match err {
                cscp_protocol::error::PayloadError::Truncated { .. } => {
                    NakReasons::BYTE_COUNT_ERROR
                }
                _ => NakReasons::PROTOCOL_ERROR,
            }
        })?;

        let mut desk = self.desk();
        let fader_count = desk.faders.len();
        let main_count = desk.mains.len();
        let aux_count = desk.aux_count;
        match command.scope() {
            Scope::Fader => {
                let (id, index) = entity_index(payload, fader_count)?;
                let fader = &mut desk.faders[index];
                match response {
                    Response::FaderLevel { level, .. } => fader.level = level,
                    Response::FaderCut { cut, .. } => fader.cut = cut,
                    Response::FaderPfl { on, .. } => fader.pfl = on,
                    Response::FaderLabel { label, .. } => fader.label = label,
                    Response::AuxRouting { mut routes, .. } => {
                        routes.resize(aux_count, false);
                        fader.aux = routes;
                    }
                    Response::MainRouting { mut routes, .. } => {
                        routes.resize(main_count, false);
                        fader.mains = routes;
                    }
                    Response::StereoImage { image, .. } => fader.image = image,
                    _ => return Err(NakReasons::COMMAND_NOT_SUPPORTED),
                }
                SimulatedConsole::fader_state(command, id, fader)
            }
            Scope::Main => {
                let (id, index) = entity_index(payload, main_count)?;
                let main = &mut desk.mains[index];
                match response {
                    Response::MainLevel { level, .. } => main.level = level,
                    Response::MainPfl { on, .. } => main.pfl = on,
                    Response::MainLabel { label, .. } => main.label = label,
                    _ => return Err(NakReasons::COMMAND_NOT_SUPPORTED),
                }
                SimulatedConsole::main_state(command, id, main)
            }
            Scope::Global => Err(NakReasons::COMMAND_NOT_SUPPORTED),
        }
    }
}
