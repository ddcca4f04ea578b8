//! # CSCP Command Line Tool
//!
//! Talks to a mixing console over CSCP from the command line, or stands in
//! for one with the simulator from [`cscp_server`](https://docs.rs/cscp-server/).
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use cscp_client::{Builder, Client, ClientError, ConsoleEvent};
use cscp_protocol::{ConsoleInfo, ProtocolVersion, Response};
use cscp_server::{server, simulator::SimulatedConsole};
use env_logger::Env;
use tokio::sync::broadcast::{Receiver, error::RecvError};

const DEFAULT_PORT: u16 = 3322;

/// Selects a fader or a main output.
#[derive(Args, Clone, Copy)]
#[group(required = true, multiple = false)]
struct Target {
    #[arg(short, long, help = "1-based fader number")]
    fader: Option<u16>,
    #[arg(short, long, help = "1-based main output number")]
    main: Option<u16>,
}

#[derive(Subcommand)]
enum Action {
    /// Print the console's info record and name
    Info,
    /// Read a fader or main level
    GetLevel {
        #[command(flatten)]
        target: Target,
        #[arg(long, help = "Print the level in dB")]
        db: bool,
    },
    /// Set a fader or main level
    SetLevel {
        #[command(flatten)]
        target: Target,
        #[arg(allow_negative_numbers = true)]
        level: f64,
        #[arg(long, help = "Interpret the level as dB")]
        db: bool,
    },
    /// Print every change the console reports until interrupted
    Watch,
    /// Run a simulated console
    Simulate {
        #[arg(long, default_value = "24")]
        faders: u16,
        #[arg(long, default_value = "2")]
        mains: u16,
        #[arg(long, default_value = "8")]
        aux: usize,
        #[arg(long, default_value = "21", help = "Protocol version to report")]
        protocol: u16,
        #[arg(long, default_value = "Simulator")]
        name: String,
    },
}

#[derive(Parser)]
#[command(about = "Control a CSCP mixing console", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,

    #[arg(short, long, default_value = "5", help = "Reply timeout in seconds")]
    timeout: u64,

    #[clap(subcommand)]
    action: Action,
}

fn simulate(addr: SocketAddr, info: ConsoleInfo, aux: usize) -> Result<(), Box<dyn Error>> {
    log::info!(
        "Simulating '{}' with {} faders and {} mains, protocol {}",
        info.desk_label(),
        info.max_faders(),
        info.max_mains(),
        info.protocol_version()
    );
    let console = SimulatedConsole::with_aux_count(info, aux);
    let server = server::Server::new(console, server::Config::default());
    server.listen(addr)
}

fn missing_target() -> ClientError {
    ClientError::InvalidArgument("either --fader or --main is required".to_string())
}

async fn get_level(client: &Client, target: Target, db: bool) -> cscp_client::Result<String> {
    let text = match (target.fader, target.main, db) {
        (Some(fader), _, false) => client.fader_level(fader).await?.to_string(),
        (Some(fader), _, true) => format!("{:.1} dB", client.fader_level_db(fader).await?),
        (None, Some(main), false) => client.main_level(main).await?.to_string(),
        (None, Some(main), true) => format!("{:.1} dB", client.main_level_db(main).await?),
        (None, None, _) => return Err(missing_target()),
    };
    Ok(text)
}

async fn set_level(client: &Client, target: Target, level: f64, db: bool) -> cscp_client::Result<()> {
    if !db && (level.fract() != 0.0 || level < 0.0 || level > f64::from(u16::MAX)) {
        return Err(ClientError::InvalidArgument(format!(
            "{} is not a protocol level",
            level
        )));
    }
    match (target.fader, target.main, db) {
        (Some(fader), _, false) => client.set_fader_level(fader, level as u16).await,
        (Some(fader), _, true) => client.set_fader_level_db(fader, level).await,
        (None, Some(main), false) => client.set_main_level(main, level as u16).await,
        (None, Some(main), true) => client.set_main_level_db(main, level).await,
        (None, None, _) => Err(missing_target()),
    }
}

/// Waits for the level the console pushes after a write to `target`.
async fn confirmation(
    events: &mut Receiver<ConsoleEvent>,
    target: Target,
) -> cscp_client::Result<u16> {
    loop {
        match events.recv().await {
            Ok(ConsoleEvent::Notification(Response::FaderLevel { fader, level }))
                if target.fader == Some(fader) =>
            {
                return Ok(level);
            }
            Ok(ConsoleEvent::Notification(Response::MainLevel { main, level }))
                if target.fader.is_none() && target.main == Some(main) =>
            {
                return Ok(level);
            }
            Ok(ConsoleEvent::Nak(reasons)) => return Err(ClientError::Nak { reasons }),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err(ClientError::NotConnected),
        }
    }
}

async fn watch(client: &Client) -> Result<(), Box<dyn Error>> {
    let mut events = client.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(ConsoleEvent::Notification(response)) => println!("{:?}", response),
                Ok(ConsoleEvent::StateChanged(state)) => println!("connection {}", state),
                Ok(ConsoleEvent::Nak(reasons)) => println!("NAK: {}", reasons),
                Ok(other) => log::debug!("{:?}", other),
                Err(RecvError::Lagged(missed)) => log::warn!("Missed {} events", missed),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn control(cli: &Cli, action: Action) -> Result<(), Box<dyn Error>> {
    let config = Builder::new()
        .host(cli.ip.to_string())
        .port(cli.port)
        .auto_reconnect(matches!(action, Action::Watch))
        .command_response_timeout(Duration::from_secs(cli.timeout))
        .build();
    let client = Client::new(config);
    let info = client.connect().await?;
    log::debug!("Connected: {:?}", info);

    match action {
        Action::Info => {
            println!("name:     {}", info.desk_label());
            println!("protocol: {}", info.protocol_version());
            println!("faders:   {}", info.max_faders());
            println!("mains:    {}", info.max_mains());
        }
        Action::GetLevel { target, db } => println!("{}", get_level(&client, target, db).await?),
        Action::SetLevel { target, level, db } => {
            let mut events = client.subscribe();
            set_level(&client, target, level, db).await?;
            // Disconnecting drops writes that are still queued.
            let timeout = Duration::from_secs(cli.timeout);
            match tokio::time::timeout(timeout, confirmation(&mut events, target)).await {
                Ok(level) => log::info!("Console confirmed level {}", level?),
                Err(_) => log::warn!("No confirmation from the console within {:?}", timeout),
            }
        }
        Action::Watch => watch(&client).await?,
        Action::Simulate { .. } => {}
    }
    client.disconnect().await;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut cli = Cli::parse();
    let addr = SocketAddr::new(cli.ip, cli.port);
    log::debug!("Parsed arguments: ip={}, port={}", cli.ip, cli.port);

    match std::mem::replace(&mut cli.action, Action::Info) {
        Action::Simulate {
            faders,
            mains,
            aux,
            protocol,
            name,
        } => {
            let info = ConsoleInfo::new(ProtocolVersion::new(protocol), faders, mains, name);
            simulate(addr, info, aux)
        }
        action => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(control(&cli, action))
        }
    }
}
