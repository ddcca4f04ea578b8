use std::{
    io::{self, ErrorKind, Read, Write},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::Duration,
};

use cscp_protocol::{
    ACK, Command, Frame, Inbound, NAK, NakReasons, StreamReassembler, error::FrameError,
};

use crate::ConsoleBackend;

#[derive(Debug, Clone)]
pub struct Config {
    /// Close a connection after this long without input. `None` waits forever.
    pub read_write_timeout: Option<Duration>,
    /// Send an ACK byte before pushing the state changed by a write.
    pub ack_writes: bool,
    /// Commands that are swallowed without any answer.
    pub muted: Vec<Command>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_write_timeout: None,
            ack_writes: true,
            muted: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Server<T: ConsoleBackend> {
    backend: T,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use cscp_server::server::Builder;
/// use cscp_protocol::Command;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .rw_timeout(Duration::from_secs(20))
///     .mute(Command::FaderLabel)
///     .build(console);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the TCP read and write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = Some(timeout);
        self
    }

    pub fn ack_writes(mut self, enabled: bool) -> Self {
        self.config.ack_writes = enabled;
        self
    }

    /// Never answer `command`, so controllers run into their reply timeout.
    pub fn mute(mut self, command: Command) -> Self {
        self.config.muted.push(command);
        self
    }

    /// Build and return the server
    pub fn build<T: ConsoleBackend>(self, backend: T) -> Server<T> {
        Server::new(backend, self.config)
    }
}

/// NAK reasons reported for a frame that failed validation.
fn reasons_for(err: FrameError) -> NakReasons {
    match err {
        FrameError::TooShort { .. } | FrameError::ByteCountMismatch { .. } => {
            NakReasons::BYTE_COUNT_ERROR
        }
        FrameError::Checksum { .. } => NakReasons::CHECKSUM_ERROR,
        FrameError::WrongDevice { .. } => NakReasons::PROTOCOL_ERROR,
    }
}

fn send_nak(tcp: &mut TcpStream, reasons: NakReasons) -> io::Result<()> {
    log::debug!("Sending NAK: {}", reasons);
    tcp.write_all(&[NAK, reasons.bits()])
}

impl<T: ConsoleBackend> Server<T> {
    pub fn new(backend: T, config: Config) -> Server<T> {
        Server { backend, config }
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub fn listen(&self, addr: impl ToSocketAddrs) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// Serves controllers on an already bound listener, one at a time.
    pub fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Console listening on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(tcp) => {
                    if let Ok(addr) = tcp.peer_addr() {
                        log::info!("New controller connection from {}", addr);
                    }
                    if let Err(e) = self.handle_client(tcp) {
                        log::error!("Controller error: {}", e);
                    }
                    log::info!("Controller disconnected");
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
        Ok(())
    }

    fn handle_client(&self, mut tcp: TcpStream) -> io::Result<()> {
        tcp.set_read_timeout(self.config.read_write_timeout)?;
        tcp.set_write_timeout(self.config.read_write_timeout)?;
        tcp.set_nodelay(true)?;

        let mut reassembler = StreamReassembler::for_console();
        let mut buf = [0u8; 1024];
        loop {
            let read = match tcp.read(&mut buf) {
                Ok(0) => {
                    for item in reassembler.finish() {
                        self.process(item, &mut tcp)?;
                    }
                    break;
                }
                Ok(read) => read,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    log::error!("Controller read timeout, closing connection");
                    break;
                }
                // Controller disconnected
                Err(err)
                    if err.kind() == ErrorKind::ConnectionAborted
                        || err.kind() == ErrorKind::ConnectionReset =>
                {
                    break;
                }
                Err(err) => return Err(err),
            };
            for item in reassembler.push(&buf[..read]) {
                self.process(item, &mut tcp)?;
            }
        }
        Ok(())
    }

    fn process(&self, item: Inbound, tcp: &mut TcpStream) -> io::Result<()> {
        match item {
            Inbound::Frame(frame) => self.process_frame(frame, tcp),
            Inbound::Nak(reasons) => {
                log::warn!("Controller sent NAK: {}", reasons);
                Ok(())
            }
            Inbound::MalformedNak => {
                log::warn!("Controller sent a NAK without reasons");
                Ok(())
            }
            Inbound::Noise(bytes) => {
                log::debug!("Discarding {} bytes: {:02x?}", bytes.len(), &bytes[..]);
                Ok(())
            }
            Inbound::Invalid(err) => {
                log::warn!("Rejecting frame: {}", err);
                send_nak(tcp, reasons_for(err))
            }
        }
    }

    /// Dispatches a frame to the backend and sends its reply.
    fn process_frame(&self, frame: Frame, tcp: &mut TcpStream) -> io::Result<()> {
        let Some(command) = Command::from_code(frame.command()) else {
            log::warn!("Unknown command {:#06x}", frame.command());
            return send_nak(tcp, NakReasons::COMMAND_NOT_SUPPORTED);
        };
        if self.config.muted.contains(&command) {
            log::debug!("Ignoring muted {}", command);
            return Ok(());
        }

        let reply = if frame.is_write() {
            log::debug!("Received write {}: {:02x?}", command, &frame.payload()[..]);
            if command.is_writable() {
                self.backend.write(command, frame.payload())
            } else {
                Err(NakReasons::COMMAND_NOT_SUPPORTED)
            }
        } else {
            log::debug!("Received query {}: {:02x?}", command, &frame.payload()[..]);
            self.backend.query(command, frame.payload())
        };

        match reply {
            Ok(payload) => {
                if frame.is_write() && self.config.ack_writes {
                    tcp.write_all(&[ACK])?;
                }
                let bytes = Frame::to_controller(command.write_code(), payload)
                    .to_bytes()
                    .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
                log::trace!("Reply: {:02x?}", &bytes[..]);
                tcp.write_all(&bytes)
            }
            Err(reasons) => send_nak(tcp, reasons),
        }
    }
}
