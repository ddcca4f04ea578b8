//! The engine task: owns the socket, the queues and the pending requests.
//!
//! All mutable engine state lives in [`ConnectionManager`], which runs as a
//! single tokio task. Handles talk to it through [`Control`] messages; the
//! task wakes up for socket input, control messages, the completion of a
//! connect or handshake, and the earliest of its deadlines (scheduler
//! cooldown, request timeout, reconnect delay).
use std::{future::Future, io, pin::Pin};

use cscp_protocol::{
    Command, ConsoleInfo, CscpCodec, Inbound, ProtocolVersion, Request, RequestKey, Response,
};
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{broadcast, mpsc, oneshot, watch},
    time::Instant,
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    config::Config,
    correlator::{RequestCorrelator, Responder},
    error::{ClientError, Result},
    event::{ConnectionState, ConsoleEvent},
    scheduler::{CommandScheduler, Lane, Tick},
};

/// Requests from a [`crate::Client`] handle to the engine task.
pub(crate) enum Control {
    Connect {
        reply: oneshot::Sender<Result<ConsoleInfo>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Query {
        request: Request,
        reply: Responder<Response>,
    },
    Write {
        request: Request,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A command waiting in one of the scheduler lanes.
pub(crate) struct QueueEntry {
    request: Request,
    /// Present for reads; moved into the correlator once sent.
    responder: Option<Responder<Response>>,
}

type Reader = FramedRead<OwnedReadHalf, CscpCodec>;
type Writer = FramedWrite<OwnedWriteHalf, CscpCodec>;
type Connecting = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;
type Handshake = Pin<Box<dyn Future<Output = ConsoleInfo> + Send>>;

pub(crate) struct ConnectionManager {
    control: mpsc::UnboundedReceiver<Control>,
    config: watch::Receiver<Config>,
    state: watch::Sender<ConnectionState>,
    console: watch::Sender<Option<ConsoleInfo>>,
    events: broadcast::Sender<ConsoleEvent>,
    scheduler: CommandScheduler<QueueEntry>,
    correlator: RequestCorrelator<Response>,
    reader: Option<Reader>,
    writer: Option<Writer>,
    connecting: Option<Connecting>,
    handshake: Option<Handshake>,
    reconnect_at: Option<Instant>,
    scheduler_wake: Option<Instant>,
    /// Set by a user initiated disconnect; suppresses auto reconnect.
    user_closed: bool,
    ready_waiters: Vec<oneshot::Sender<Result<ConsoleInfo>>>,
    /// Queries and writes that arrived while the handshake was running.
    deferred: Vec<Control>,
}

async fn wait_for<F: Future + Unpin>(future: &mut Option<F>) -> F::Output {
    match future {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn read_next(reader: &mut Option<Reader>) -> Option<io::Result<Inbound>> {
    match reader {
        Some(reader) => reader.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ConnectionManager {
    pub(crate) fn new(
        control: mpsc::UnboundedReceiver<Control>,
        config: watch::Receiver<Config>,
        state: watch::Sender<ConnectionState>,
        console: watch::Sender<Option<ConsoleInfo>>,
        events: broadcast::Sender<ConsoleEvent>,
    ) -> ConnectionManager {
        let scheduler = {
            let config = config.borrow();
            CommandScheduler::new(config.global_command_rate, config.fader_lane_spacing())
        };
        ConnectionManager {
            control,
            config,
            state,
            console,
            events,
            scheduler,
            correlator: RequestCorrelator::new(),
            reader: None,
            writer: None,
            connecting: None,
            handshake: None,
            reconnect_at: None,
            scheduler_wake: None,
            user_closed: false,
            ready_waiters: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Runs until every handle has been dropped.
    pub(crate) async fn run(mut self) {
        loop {
            let wake = [
                self.scheduler_wake,
                self.correlator.next_deadline(),
                self.reconnect_at,
            ]
            .into_iter()
            .flatten()
            .min();

            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => break,
                },

                result = wait_for(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_socket_opened(result);
                }

                info = wait_for(&mut self.handshake) => {
                    self.handshake = None;
                    self.on_ready(info);
                }

                inbound = read_next(&mut self.reader) => self.on_inbound(inbound),

                _ = sleep_until(wake) => {}
            }

            self.on_deadlines(Instant::now());
            self.pump().await;
        }

        log::debug!("All client handles dropped, shutting down");
        self.user_closed = true;
        self.shut_down(ClientError::NotConnected);
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Connect { reply } => self.connect(reply),
            Control::Disconnect { reply } => {
                log::info!("Disconnecting on request");
                self.user_closed = true;
                self.reconnect_at = None;
                self.shut_down(ClientError::NotConnected);
                self.set_state(ConnectionState::Disconnected);
                let _ = reply.send(());
            }
            // Admitted once the console reported its protocol version.
            control if self.handshake.is_some() => self.deferred.push(control),
            Control::Query { request, reply } => match self.admit(&request) {
                Ok(lane) => self.scheduler.enqueue(
                    lane,
                    QueueEntry {
                        request,
                        responder: Some(reply),
                    },
                ),
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Control::Write { request, reply } => {
                let admitted = self.admit(&request);
                if let Ok(lane) = admitted {
                    self.scheduler.enqueue(
                        lane,
                        QueueEntry {
                            request,
                            responder: None,
                        },
                    );
                }
                // Writes complete once queued; the console confirms with a push.
                let _ = reply.send(admitted.map(|_| ()));
            }
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<Result<ConsoleInfo>>) {
        self.user_closed = false;
        let state = *self.state.borrow();
        match state {
            ConnectionState::Connected if self.handshake.is_none() => {
                if let Some(info) = self.console.borrow().clone() {
                    let _ = reply.send(Ok(info));
                    return;
                }
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
            _ => {
                self.ready_waiters.push(reply);
                self.reconnect_at = None;
                self.start_connect();
                return;
            }
        }
        self.ready_waiters.push(reply);
    }

    /// Checks that `request` may be sent now and picks its lane.
    fn admit(&self, request: &Request) -> Result<Lane> {
        request.validate()?;
        if *self.state.borrow() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let command = request.command();
        let negotiated = self.negotiated_version();
        if !command.is_supported_by(negotiated) {
            return Err(ClientError::ProtocolVersion {
                command: command.name(),
                required: command.min_version(),
                negotiated,
            });
        }
        if request.is_write() && command.is_level() {
            Ok(Lane::FaderLevel)
        } else {
            Ok(Lane::General)
        }
    }

    fn negotiated_version(&self) -> ProtocolVersion {
        self.console
            .borrow()
            .as_ref()
            .map(|info| info.protocol_version())
            .unwrap_or_default()
    }

    fn start_connect(&mut self) {
        let (address, timeout) = {
            let config = self.config.borrow();
            (config.address(), config.connect_timeout)
        };
        log::info!("Connecting to {}", address);
        self.set_state(ConnectionState::Connecting);
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out opening connection",
                )),
            }
        }));
    }

    fn on_socket_opened(&mut self, result: io::Result<TcpStream>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("Connection failed: {}", err);
                self.connection_lost(Some(err));
                return;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            log::debug!("Could not disable Nagle's algorithm: {}", err);
        }
        if let Ok(peer) = stream.peer_addr() {
            log::info!("Connected to console at {}", peer);
        }
        let (read, write) = stream.into_split();
        self.reader = Some(FramedRead::new(read, CscpCodec::for_controller()));
        self.writer = Some(FramedWrite::new(write, CscpCodec::for_controller()));
        self.scheduler.reset();
        self.set_state(ConnectionState::Connected);
        self.start_handshake();
    }

    /// Queries console info and name; falls back to configured defaults.
    fn start_handshake(&mut self) {
        let (info_tx, info_rx) = oneshot::channel();
        let (name_tx, name_rx) = oneshot::channel();
        for (command, responder) in [(Command::ConsoleInfo, info_tx), (Command::ConsoleName, name_tx)] {
            self.scheduler.enqueue(
                Lane::General,
                QueueEntry {
                    request: Request::query(command),
                    responder: Some(responder),
                },
            );
        }

        let (fallback, timeout) = {
            let config = self.config.borrow();
            (
                ConsoleInfo::fallback(config.max_fader_count, config.max_main_count),
                config.initialization_timeout,
            )
        };
        self.handshake = Some(Box::pin(async move {
            let exchange = async {
                let info = match info_rx.await {
                    Ok(Ok(Response::ConsoleInfo(info))) => info,
                    Ok(Err(err)) => return Err(err),
                    Ok(Ok(_)) => {
                        return Err(ClientError::UnexpectedResponse {
                            command: Command::ConsoleInfo.name(),
                        });
                    }
                    Err(_) => return Err(ClientError::NotConnected),
                };
                match name_rx.await {
                    Ok(Ok(Response::ConsoleName(name))) if !name.is_empty() => {
                        Ok(info.with_desk_label(name))
                    }
                    _ => Ok(info),
                }
            };
            match tokio::time::timeout(timeout, exchange).await {
                Ok(Ok(info)) => info,
                Ok(Err(err)) => {
                    log::warn!("Console info unavailable ({}), using defaults", err);
                    fallback
                }
                Err(_) => {
                    log::warn!("Console initialization timed out, using defaults");
                    fallback
                }
            }
        }));
    }

    fn on_ready(&mut self, info: ConsoleInfo) {
        log::info!(
            "Console '{}' ready: protocol {}, {} faders, {} mains",
            info.desk_label(),
            info.protocol_version(),
            info.max_faders(),
            info.max_mains()
        );
        self.console.send_replace(Some(info.clone()));
        self.emit(ConsoleEvent::Ready(info.clone()));
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Ok(info.clone()));
        }
        for control in std::mem::take(&mut self.deferred) {
            self.handle_control(control);
        }
    }

    fn on_inbound(&mut self, inbound: Option<io::Result<Inbound>>) {
        let inbound = match inbound {
            Some(Ok(inbound)) => inbound,
            Some(Err(err)) => {
                log::error!("Read error: {}", err);
                self.connection_lost(Some(err));
                return;
            }
            None => {
                log::info!("Console closed the connection");
                self.connection_lost(None);
                return;
            }
        };
        match inbound {
            Inbound::Frame(frame) => {
                let key = RequestKey::for_frame(&frame);
                let decoded = Response::decode(frame.command(), frame.payload());
                match self.correlator.take(&key) {
                    Some((command, responder)) => {
                        log::debug!("Reply for {} ({})", key, command.name());
                        let _ = responder.send(decoded.map_err(ClientError::from));
                    }
                    None => match decoded {
                        Ok(response) => {
                            log::debug!("Unsolicited {:?}", response);
                            self.emit(ConsoleEvent::Notification(response));
                        }
                        Err(err) => {
                            log::warn!("Could not decode push {}: {}", key, err);
                            self.emit(ConsoleEvent::DecodeError(err));
                        }
                    },
                }
            }
            Inbound::Nak(reasons) => {
                log::warn!("Console sent NAK: {}", reasons);
                if !self.correlator.reject_oldest(ClientError::Nak { reasons }) {
                    self.emit(ConsoleEvent::Nak(reasons));
                }
            }
            Inbound::MalformedNak => self.emit(ConsoleEvent::MalformedNak),
            Inbound::Noise(bytes) => self.emit(ConsoleEvent::Noise(bytes)),
            Inbound::Invalid(err) => self.emit(ConsoleEvent::FrameError(err)),
        }
    }

    fn on_deadlines(&mut self, now: Instant) {
        self.correlator.expire(now);
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            self.start_connect();
        }
    }

    /// Sends everything the scheduler releases right now.
    async fn pump(&mut self) {
        self.scheduler_wake = None;
        if self.writer.is_none() {
            return;
        }
        let timeout = {
            let config = self.config.borrow();
            self.scheduler
                .set_spacing(config.global_command_rate, config.fader_lane_spacing());
            config.command_response_timeout
        };
        loop {
            let now = Instant::now();
            match self.scheduler.tick(now) {
                Tick::Send(entry) => {
                    if let Err(err) = self.send(entry, now, timeout).await {
                        log::error!("Write error: {}", err);
                        self.connection_lost(Some(err));
                        return;
                    }
                }
                Tick::WaitUntil(at) => {
                    self.scheduler_wake = Some(at);
                    return;
                }
                Tick::Idle => return,
            }
        }
    }

    async fn send(
        &mut self,
        entry: QueueEntry,
        now: Instant,
        timeout: std::time::Duration,
    ) -> io::Result<()> {
        let QueueEntry { request, responder } = entry;
        if let Err(err) = request.validate() {
            log::warn!("Dropping {} request: {}", request.command().name(), err);
            if let Some(responder) = responder {
                let _ = responder.send(Err(err.into()));
            }
            return Ok(());
        }
        let frame = request.to_frame();
        log::debug!(
            "Sending {} {} ({:#06x})",
            if request.is_write() { "write" } else { "query" },
            request.command().name(),
            frame.command()
        );
        if let Some(responder) = responder {
            self.correlator
                .register(request.key(), request.command(), responder, now, timeout);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        writer.send(frame).await
    }

    /// Handles a closed or failed transport and decides about reconnecting.
    fn connection_lost(&mut self, error: Option<io::Error>) {
        let failure = match error {
            Some(err) => {
                self.set_state(ConnectionState::Error);
                ClientError::from(err)
            }
            None => ClientError::NotConnected,
        };
        self.shut_down(failure);
        self.set_state(ConnectionState::Disconnected);

        let (auto_reconnect, interval) = {
            let config = self.config.borrow();
            (config.auto_reconnect, config.reconnect_interval)
        };
        if auto_reconnect && !self.user_closed {
            log::info!("Reconnecting in {:?}", interval);
            self.reconnect_at = Some(Instant::now() + interval);
            self.set_state(ConnectionState::Reconnecting);
        }
    }

    /// Drops the transport and rejects every outstanding call.
    fn shut_down(&mut self, waiter_error: ClientError) {
        self.connecting = None;
        self.handshake = None;
        self.reader = None;
        self.writer = None;
        self.scheduler_wake = None;
        self.correlator.reject_all(ClientError::NotConnected);
        for entry in self.scheduler.drain() {
            if let Some(responder) = entry.responder {
                let _ = responder.send(Err(ClientError::NotConnected));
            }
        }
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Err(waiter_error.clone()));
        }
        for control in self.deferred.drain(..) {
            match control {
                Control::Query { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
                Control::Write { reply, .. } => {
                    let _ = reply.send(Err(ClientError::NotConnected));
                }
                Control::Connect { .. } | Control::Disconnect { .. } => {}
            }
        }
        self.console.send_replace(None);
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::info!("Connection state {} -> {}", previous, state);
            self.emit(ConsoleEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ConsoleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod test {
    use std::{collections::VecDeque, time::Duration};

    use cscp_protocol::{
        Frame, NakReasons, StreamReassembler,
        error::PayloadError,
        response::{encode_console_info, encode_text},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use crate::{Builder, Client, ClientError, ConnectionState, ConsoleEvent, config::Config};

    use super::*;

    /// A hand driven console on the other end of the socket.
    struct Peer {
        stream: TcpStream,
        reassembler: StreamReassembler,
        received: VecDeque<Frame>,
    }

    impl Peer {
        async fn accept(listener: &TcpListener) -> Peer {
            let (stream, _) = listener.accept().await.unwrap();
            Peer {
                stream,
                reassembler: StreamReassembler::for_console(),
                received: VecDeque::new(),
            }
        }

        async fn next_frame(&mut self) -> Frame {
            let mut buf = [0u8; 256];
            loop {
                if let Some(frame) = self.received.pop_front() {
                    return frame;
                }
                let read = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                    .await
                    .expect("client sent nothing")
                    .unwrap();
                assert_ne!(read, 0, "client closed the connection");
                for item in self.reassembler.push(&buf[..read]) {
                    match item {
                        Inbound::Frame(frame) => self.received.push_back(frame),
                        other => panic!("unexpected {:?}", other),
                    }
                }
            }
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        async fn reply(&mut self, command: Command, payload: Vec<u8>) {
            let frame = Frame::to_controller(command.write_code(), payload);
            self.send_raw(&frame.to_bytes().unwrap()).await;
        }

        async fn answer_handshake(&mut self, info: &ConsoleInfo, name: &str) {
            let query = self.next_frame().await;
            assert_eq!(query.command(), Command::ConsoleInfo.code());
            self.reply(Command::ConsoleInfo, encode_console_info(info)).await;
            let query = self.next_frame().await;
            assert_eq!(query.command(), Command::ConsoleName.code());
            self.reply(Command::ConsoleName, encode_text(name, 32)).await;
        }
    }

    async fn listener() -> (TcpListener, Config) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = Builder::new()
            .host("127.0.0.1")
            .port(listener.local_addr().unwrap().port())
            .auto_reconnect(false)
            .reconnect_interval(Duration::from_millis(50))
            .global_command_rate(Duration::from_millis(1))
            .fader_level_rate(Duration::from_millis(5))
            .command_response_timeout(Duration::from_millis(200))
            .initialization_timeout(Duration::from_millis(400))
            .build();
        (listener, config)
    }

    fn desk() -> ConsoleInfo {
        ConsoleInfo::new(ProtocolVersion::V21, 8, 2, "Desk")
    }

    async fn connected(info: ConsoleInfo) -> (Client, Peer, TcpListener) {
        let (listener, config) = listener().await;
        let client = Client::new(config);
        let (result, peer) = tokio::join!(client.connect(), async {
            let mut peer = Peer::accept(&listener).await;
            peer.answer_handshake(&info, "Studio One").await;
            peer
        });
        result.unwrap();
        (client, peer, listener)
    }

    async fn next_event(events: &mut broadcast::Receiver<ConsoleEvent>) -> ConsoleEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event")
            .unwrap()
    }

    #[tokio::test]
    async fn connect_performs_handshake() {
        let (listener, config) = listener().await;
        let client = Client::new(config);
        let mut events = client.subscribe();
        let (result, _peer) = tokio::join!(client.connect(), async {
            let mut peer = Peer::accept(&listener).await;
            peer.answer_handshake(&desk(), "Studio One").await;
            peer
        });

        let info = result.unwrap();
        assert_eq!(info.protocol_version(), ProtocolVersion::V21);
        assert_eq!(info.max_faders(), 8);
        assert_eq!(info.desk_label(), "Studio One");
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.console(), Some(info.clone()));

        assert_eq!(
            next_event(&mut events).await,
            ConsoleEvent::StateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            ConsoleEvent::StateChanged(ConnectionState::Connected)
        );
        assert_eq!(next_event(&mut events).await, ConsoleEvent::Ready(info));
    }

    #[tokio::test]
    async fn silent_console_falls_back_to_configured_size() {
        let (listener, config) = listener().await;
        let client = Client::new(config);
        let (result, _peer) = tokio::join!(client.connect(), Peer::accept(&listener));
        let info = result.unwrap();
        assert_eq!(info, ConsoleInfo::fallback(42, 3));
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (client, _peer, _listener) = connected(desk()).await;
        let info = client.connect().await.unwrap();
        assert_eq!(info.desk_label(), "Studio One");
    }

    #[tokio::test]
    async fn refused_connection_reports_error() {
        let (listener, config) = listener().await;
        drop(listener);
        let client = Client::new(config);
        assert!(matches!(client.connect().await, Err(ClientError::Io(_))));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn query_is_answered() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let (level, ()) = tokio::join!(client.fader_level(3), async {
            let query = peer.next_frame().await;
            assert_eq!(query.command(), 0x0000);
            assert_eq!(&query.payload()[..], &[0x00, 0x03]);
            peer.reply(Command::FaderLevel, vec![0x00, 0x03, 0x02, 0x00]).await;
        });
        assert_eq!(level.unwrap(), 512);
    }

    #[tokio::test]
    async fn short_reply_still_settles_the_read() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let (level, ()) = tokio::join!(client.fader_level(1), async {
            peer.next_frame().await;
            peer.send_raw(&[0xF1, 0x04, 0x01, 0x00, 0x00, 0x00, 0x01, 0xFF])
                .await;
        });
        assert!(matches!(
            level,
            Err(ClientError::Payload(
                cscp_protocol::error::PayloadError::Truncated { needed: 4, actual: 2, .. }
            ))
        ));
    }

    #[tokio::test]
    async fn level_write_uses_write_code() {
        let (client, mut peer, _listener) = connected(desk()).await;
        client.set_fader_level(2, 700).await.unwrap();
        let write = peer.next_frame().await;
        assert_eq!(write.command(), 0x8000);
        assert_eq!(&write.payload()[..], &[0x00, 0x02, 0x02, 0xBC]);
    }

    #[tokio::test]
    async fn unanswered_query_times_out() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let (result, _) = tokio::join!(client.fader_cut(1), peer.next_frame());
        assert!(matches!(
            result,
            Err(ClientError::Timeout { command: "fader cut" })
        ));
    }

    #[tokio::test]
    async fn nak_rejects_pending_read() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let (result, ()) = tokio::join!(client.fader_label(1), async {
            peer.next_frame().await;
            peer.send_raw(&[0x05, 0x01]).await;
        });
        match result {
            Err(ClientError::Nak { reasons }) => {
                assert!(reasons.contains(NakReasons::COMMAND_NOT_SUPPORTED))
            }
            other => panic!("expected NAK, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsolicited_push_is_notified() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let mut events = client.subscribe();
        peer.reply(Command::FaderCut, vec![0x00, 0x04, 0x00]).await;
        peer.send_raw(&[0x05, 0x40]).await;
        assert_eq!(
            next_event(&mut events).await,
            ConsoleEvent::Notification(Response::FaderCut { fader: 4, cut: true })
        );
        assert_eq!(
            next_event(&mut events).await,
            ConsoleEvent::Nak(NakReasons::from_bits(0x40))
        );
    }

    #[tokio::test]
    async fn newer_commands_fail_on_old_consoles() {
        let info = ConsoleInfo::new(ProtocolVersion::V1, 8, 2, "Old");
        let (client, _peer, _listener) = connected(info).await;
        assert!(matches!(
            client.stereo_image(1).await,
            Err(ClientError::ProtocolVersion {
                command: "stereo image",
                required: ProtocolVersion::V21,
                negotiated: ProtocolVersion::V1,
            })
        ));
        assert!(client.fader_pfl(9).await.is_err());
    }

    #[tokio::test]
    async fn calls_fail_when_not_connected() {
        let (_listener, config) = listener().await;
        let client = Client::new(config);
        assert!(matches!(
            client.fader_level(1).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.set_main_pfl(1, true).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_rejects_pending_reads() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let (result, ()) = tokio::join!(client.main_level(1), async {
            peer.next_frame().await;
            client.disconnect().await;
        });
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.console(), None);
    }

    #[tokio::test]
    async fn dropped_connection_reconnects() {
        let (client, mut peer, listener) = connected(desk()).await;
        client.update_config(|config| config.auto_reconnect = true);
        let mut states = client.state_changes();

        let (result, ()) = tokio::join!(client.main_pfl(1), async {
            peer.next_frame().await;
            drop(peer);
        });
        assert!(matches!(result, Err(ClientError::NotConnected)));

        let mut peer = Peer::accept(&listener).await;
        peer.answer_handshake(&desk(), "Studio One").await;
        tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
        let info = client.connect().await.unwrap();
        assert_eq!(info.max_mains(), 2);
    }

    #[tokio::test]
    async fn oversized_write_fails_without_touching_the_connection() {
        let (client, mut peer, _listener) = connected(desk()).await;
        let routes = vec![true; 2100];
        let result = client
            .write(Request::set_routing(Command::AuxRouting, 1, &routes))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Payload(PayloadError::TooLarge { len: 265 }))
        ));

        let (level, ()) = tokio::join!(client.fader_level(2), async {
            let query = peer.next_frame().await;
            assert_eq!(query.command(), Command::FaderLevel.code());
            peer.reply(Command::FaderLevel, vec![0x00, 0x02, 0x01, 0x00]).await;
        });
        assert_eq!(level.unwrap(), 256);
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn requests_during_handshake_wait_for_ready() {
        let (listener, config) = listener().await;
        let client = Client::new(config);
        let mut states = client.state_changes();
        let connect = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });
        let mut peer = Peer::accept(&listener).await;
        states
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();

        let early = client.query_console_info();
        tokio::pin!(early);
        assert!(futures::poll!(early.as_mut()).is_pending());

        peer.answer_handshake(&desk(), "Studio One").await;
        let (early, ()) = tokio::join!(early, async {
            let query = peer.next_frame().await;
            assert_eq!(query.command(), Command::ConsoleInfo.code());
            peer.reply(Command::ConsoleInfo, encode_console_info(&desk()))
                .await;
        });
        assert_eq!(early.unwrap().max_faders(), 8);

        let info = connect.await.unwrap().unwrap();
        assert_eq!(info.protocol_version(), ProtocolVersion::V21);
        assert_eq!(info.desk_label(), "Studio One");
    }

    #[tokio::test]
    async fn fader_spacing_follows_config_updates() {
        let (client, mut peer, _listener) = connected(desk()).await;
        client.update_config(|config| config.fader_level_rate = Duration::from_millis(150));

        client.set_fader_level(1, 100).await.unwrap();
        client.set_fader_level(2, 200).await.unwrap();
        let first = peer.next_frame().await;
        let first_at = Instant::now();
        let second = peer.next_frame().await;
        assert_eq!(&first.payload()[..2], &[0x00, 0x01]);
        assert_eq!(&second.payload()[..2], &[0x00, 0x02]);
        assert!(first_at.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn response_timeout_follows_config_updates() {
        let (client, mut peer, _listener) = connected(desk()).await;
        client.update_config(|config| {
            config.command_response_timeout = Duration::from_millis(800)
        });

        // Answered well after the timeout the client was created with.
        let (level, ()) = tokio::join!(client.fader_level(4), async {
            peer.next_frame().await;
            tokio::time::sleep(Duration::from_millis(400)).await;
            peer.reply(Command::FaderLevel, vec![0x00, 0x04, 0x01, 0x00]).await;
        });
        assert_eq!(level.unwrap(), 256);
    }
}
