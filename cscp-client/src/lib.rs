//! # CSCP Client
//!
//! An async client for mixing consoles that speak CSCP, the binary control
//! protocol carried over TCP.
//!
//! ## Overview
//!
//! A [`Client`] is a cheap handle onto a background task that owns the TCP
//! connection. The task
//!
//! - connects, performs the initialization handshake and reconnects after
//!   the connection drops,
//! - paces outbound commands so the console is never flooded, with a
//!   separate, slower lane for fader level writes,
//! - matches replies to outstanding reads by command and fader/main id and
//!   times out reads that never get an answer,
//! - turns everything else the console sends into [`ConsoleEvent`]s.
//!
//! Read calls resolve with the console's reply. Write calls resolve once the
//! command is queued; the console confirms a write by pushing the new state,
//! which arrives as a [`ConsoleEvent::Notification`].
//!
//! For the wire format, see the [`cscp_protocol`](https://docs.rs/cscp-protocol/) crate.
//!
//! ## Basic Usage
//!
//! ### Connecting to a Console
//!
//! ```ignore
//! use cscp_client::{Builder, Client};
//!
//! let client = Client::new(Builder::new().host("192.168.1.20").build());
//! let info = client.connect().await?;
//! println!("{} faders, protocol {}", info.max_faders(), info.protocol_version());
//! ```
//!
//! ### Moving a Fader
//!
//! ```ignore
//! client.set_fader_level_db(1, -10.0).await?;
//! let level = client.fader_level(1).await?;
//! ```
//!
//! ### Watching the Console
//!
//! ```ignore
//! use cscp_client::ConsoleEvent;
//!
//! let mut events = client.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let ConsoleEvent::Notification(response) = event {
//!         println!("{:?}", response);
//!     }
//! }
//! ```
//!
//! ## Related Crates
//!
//! - [`cscp_protocol`](https://docs.rs/cscp-protocol/) - Frame encoding and payload decoding
//! - [`cscp_server`](https://docs.rs/cscp-server/) - A simulated console for tests and demos
use cscp_protocol::{ConsoleInfo, Request, Response};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

mod config;
mod connection;
mod controls;
pub mod correlator;
pub mod error;
mod event;
pub mod scheduler;

pub use config::{Builder, Config};
pub use error::{ClientError, Result};
pub use event::{ConnectionState, ConsoleEvent};

use connection::{ConnectionManager, Control};

const EVENT_CAPACITY: usize = 256;

/// Handle to a console connection.
///
/// Cloning the handle shares the underlying connection. The background task
/// stops once the last handle is dropped.
#[derive(Clone)]
pub struct Client {
    control: mpsc::UnboundedSender<Control>,
    config: watch::Sender<Config>,
    state: watch::Receiver<ConnectionState>,
    console: watch::Receiver<Option<ConsoleInfo>>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl Client {
    /// Creates a client and spawns its connection task.
    ///
    /// Must be called from within a tokio runtime. No connection is opened
    /// until [`Client::connect`] is called.
    pub fn new(config: Config) -> Client {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (config_tx, config_rx) = watch::channel(config);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (console_tx, console_rx) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager =
            ConnectionManager::new(control_rx, config_rx, state_tx, console_tx, events.clone());
        tokio::spawn(manager.run());

        Client {
            control: control_tx,
            config: config_tx,
            state: state_rx,
            console: console_rx,
            events,
        }
    }

    /// Connects and waits for the initialization handshake.
    ///
    /// Returns the console info the client settled on, which is the
    /// configured fallback if the console did not answer in time. Calling
    /// this while connecting or connected waits for, or returns, the same
    /// result without opening another connection.
    pub async fn connect(&self) -> Result<ConsoleInfo> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::Connect { reply })?;
        rx.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Closes the connection and rejects everything in flight.
    ///
    /// Disables automatic reconnection until the next [`Client::connect`].
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Control::Disconnect { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribes to notifications, NAKs and stream errors.
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// The console info of the current connection, once initialized.
    pub fn console(&self) -> Option<ConsoleInfo> {
        self.console.borrow().clone()
    }

    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    /// Changes the configuration of the running client.
    ///
    /// # Example
    ///
    /// ```ignore
    /// client.update_config(|config| config.auto_reconnect = false);
    /// ```
    pub fn update_config(&self, update: impl FnOnce(&mut Config)) {
        self.config.send_modify(update);
    }

    /// Sends a read request and waits for its reply.
    ///
    /// Requests made while the initialization handshake runs are held back
    /// until it finished. Requests that do not fit into a frame fail with
    /// [`ClientError::Payload`] without reaching the console.
    pub async fn query(&self, request: Request) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::Query { request, reply })?;
        rx.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Queues a write request.
    pub async fn write(&self, request: Request) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::Write { request, reply })?;
        rx.await.map_err(|_| ClientError::NotConnected)?
    }

    fn send(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .map_err(|_| ClientError::NotConnected)
    }
}
