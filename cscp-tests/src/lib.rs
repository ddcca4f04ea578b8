//! Shared fixtures for the end-to-end tests: a simulated console on an
//! ephemeral port and a client configured with short timings.
use std::{net::TcpListener, sync::Arc, thread, time::Duration};

use cscp_client::{Builder, Client, Config};
use cscp_protocol::{ConsoleInfo, ProtocolVersion};
use cscp_server::{server, simulator::SimulatedConsole};

/// A simulated console serving on a background thread.
pub struct Console {
    pub port: u16,
    pub state: Arc<SimulatedConsole>,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn desk_info(version: ProtocolVersion) -> ConsoleInfo {
    ConsoleInfo::new(version, 16, 2, "Sim")
}

/// Starts a console that answers everything.
pub fn start_console(info: ConsoleInfo) -> Console {
    start_console_with(info, server::Builder::new())
}

pub fn start_console_with(info: ConsoleInfo, builder: server::Builder) -> Console {
    init_logging();
    let state = Arc::new(SimulatedConsole::new(info));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("bound address").port();
    let server = builder.build(state.clone());
    thread::spawn(move || {
        if let Err(err) = server.serve(listener) {
            log::error!("Simulated console stopped: {}", err);
        }
    });
    Console { port, state }
}

/// Client settings scaled down so tests finish quickly.
pub fn fast_config(port: u16) -> Config {
    Builder::new()
        .host("127.0.0.1")
        .port(port)
        .auto_reconnect(false)
        .reconnect_interval(Duration::from_millis(50))
        .connect_timeout(Duration::from_millis(500))
        .global_command_rate(Duration::from_millis(2))
        .fader_level_rate(Duration::from_millis(10))
        .command_response_timeout(Duration::from_millis(300))
        .initialization_timeout(Duration::from_millis(600))
        .build()
}

pub async fn connected_client(console: &Console) -> Client {
    let client = Client::new(fast_config(console.port));
    client.connect().await.expect("connect to simulated console");
    client
}

/// Polls `condition` until it holds or two seconds have passed.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
