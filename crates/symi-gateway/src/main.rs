use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use symi_gateway::symi_protocol::{CurtainAction, MacAddress, MsgType};
use symi_gateway::symi_registry::{DeviceRecord, DeviceRegistry};
use symi_gateway::{
    event_channel, EventReceiver, GatewayConfig, GatewayEvent, GatewaySession, TcpConnector,
};
use symi_metrics::{describe_metrics, InMemoryRecorder};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long the link must stay quiet before a device-list read counts as done.
const LIST_SETTLE: Duration = Duration::from_millis(1500);

/// How long to wait for responses after a one-shot command.
const RESPONSE_WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "symi", version, about = "Talk to a Symi mesh gateway")]
struct Cli {
    /// YAML config file
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Gateway host (overrides the config file)
    #[arg(long, global = true, value_name = "HOST")]
    host: Option<String>,
    /// Gateway port (overrides the config file)
    #[arg(long, global = true, value_name = "PORT")]
    port: Option<u16>,
    /// Print collected metrics when the command finishes
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    metrics_output: Option<MetricsFormat>,
    /// Serve Prometheus metrics on this address while running
    #[cfg(feature = "prometheus")]
    #[arg(long, global = true, value_name = "ADDR", conflicts_with = "metrics_output")]
    metrics_listen: Option<std::net::SocketAddr>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stream gateway events until Ctrl-C
    Monitor,
    /// Read the device list and print it
    Devices {
        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan for new devices until the scan window closes
    Scan,
    /// Control one device
    Control {
        /// Device id or MAC address
        device: String,
        #[command(subcommand)]
        action: ControlAction,
    },
    /// Trigger a scene
    Scene {
        scene_id: u8,
    },
    /// Ask a device to report its state
    Query {
        /// Device id or MAC address
        device: String,
        /// Message type to query (decimal or 0x-prefixed hex)
        #[arg(long, default_value = "0x00", value_parser = parse_u8)]
        msg_type: u8,
    },
    /// Print gateway version, MAC and device count
    Info,
    /// Reboot the gateway
    Reboot,
    /// Remove every paired node from the gateway
    FactoryReset {
        /// Required; this cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ControlAction {
    /// Switch on (all channels unless --channel is given)
    On {
        /// 1-based channel
        #[arg(long)]
        channel: Option<u8>,
    },
    /// Switch off (all channels unless --channel is given)
    Off {
        /// 1-based channel
        #[arg(long)]
        channel: Option<u8>,
    },
    /// Set brightness in percent
    Brightness { percent: u8 },
    /// Set colour temperature in percent
    ColorTemp { percent: u8 },
    /// Move a curtain
    Curtain {
        #[arg(value_enum)]
        motion: CurtainArg,
    },
    /// Set curtain position in percent
    Position { percent: u8 },
    /// Send raw parameter bytes
    Raw {
        /// Message type (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u8)]
        msg_type: u8,
        /// Parameter bytes as hex, e.g. `0a`
        params: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricsFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CurtainArg {
    Open,
    Close,
    Stop,
}

impl From<CurtainArg> for CurtainAction {
    fn from(arg: CurtainArg) -> Self {
        match arg {
            CurtainArg::Open => CurtainAction::Open,
            CurtainArg::Close => CurtainAction::Close,
            CurtainArg::Stop => CurtainAction::Stop,
        }
    }
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let recorder = install_metrics(&cli)?;

    let (events_tx, mut events) = event_channel();
    let session = GatewaySession::new(TcpConnector::from_config(&config), config.clone(), events_tx);

    if let Some(path) = &config.snapshot_path {
        restore_snapshot(&session, path)?;
    }

    session
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.endpoint()))?;

    let result = run(&cli.command, &session, &mut events).await;

    if let Some(path) = &config.snapshot_path {
        if let Err(e) = save_snapshot(&session, path) {
            warn!(path = %path.display(), error = %e, "failed to save registry snapshot");
        }
    }
    session.disconnect().await;

    if let (Some(recorder), Some(format)) = (&recorder, cli.metrics_output) {
        let snapshot = recorder.snapshot();
        match format {
            MetricsFormat::Text => print!("{}", snapshot.to_text()),
            MetricsFormat::Json => println!("{}", snapshot.to_json()?),
        }
    }
    result
}

/// Install the recorder the command line asks for. Returns the in-memory
/// recorder when metrics are printed at exit.
fn install_metrics(cli: &Cli) -> Result<Option<InMemoryRecorder>> {
    #[cfg(feature = "prometheus")]
    if let Some(listen) = cli.metrics_listen {
        symi_metrics::install_prometheus(listen)
            .with_context(|| format!("starting metrics listener on {}", listen))?;
        info!(%listen, "serving Prometheus metrics");
        return Ok(None);
    }

    if cli.metrics_output.is_none() {
        return Ok(None);
    }
    let recorder = InMemoryRecorder::new();
    symi_metrics::metrics::set_global_recorder(recorder.clone())
        .map_err(|_| anyhow!("a metrics recorder is already installed"))?;
    describe_metrics();
    Ok(Some(recorder))
}

fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

async fn run(
    command: &Commands,
    session: &GatewaySession<TcpConnector>,
    events: &mut EventReceiver,
) -> Result<()> {
    match command {
        Commands::Monitor => monitor(session, events).await,
        Commands::Devices { json } => {
            sync_devices(session, events).await?;
            if *json {
                println!("{}", session.with_registry(|r| r.to_json())?);
            } else {
                print_devices(&session.devices());
            }
            Ok(())
        }
        Commands::Scan => scan(session, events).await,
        Commands::Control { device, action } => {
            sync_devices(session, events).await?;
            let id = resolve_device(session, device)?;
            control(session, &id, action).await?;
            drain_for(events, RESPONSE_WAIT).await;
            Ok(())
        }
        Commands::Scene { scene_id } => {
            session.control_scene(*scene_id).await?;
            drain_for(events, RESPONSE_WAIT).await;
            Ok(())
        }
        Commands::Query { device, msg_type } => {
            sync_devices(session, events).await?;
            let id = resolve_device(session, device)?;
            let network_address = session
                .device(&id)
                .map(|d| d.network_address)
                .unwrap_or_default();
            if network_address == 0 {
                bail!("device '{}' has no network address yet", device);
            }
            session
                .query_device_status(network_address, MsgType::from(*msg_type))
                .await?;
            drain_for(events, RESPONSE_WAIT).await;
            if let Some(device) = session.device(&id) {
                print_devices(&[device]);
            }
            Ok(())
        }
        Commands::Info => {
            session.read_gateway_info().await?;
            drain_for(events, RESPONSE_WAIT).await;
            println!("{}", session.gateway_info());
            Ok(())
        }
        Commands::Reboot => {
            session.reboot().await?;
            Ok(())
        }
        Commands::FactoryReset { yes } => {
            if !yes {
                bail!("factory reset removes every paired device; pass --yes to confirm");
            }
            session.factory_reset().await?;
            Ok(())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn monitor(session: &GatewaySession<TcpConnector>, events: &mut EventReceiver) -> Result<()> {
    session.read_device_list().await?;
    info!("monitoring; press Ctrl-C to stop");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn scan(session: &GatewaySession<TcpConnector>, events: &mut EventReceiver) -> Result<()> {
    session.start_scan().await?;
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    let confirm_by = tokio::time::Instant::now() + RESPONSE_WAIT;
    let mut started = session.is_scanning();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(GatewayEvent::ScanStateChanged { scanning: true }) => {
                    started = true;
                    info!(timeout_secs = session.config().scan_timeout_secs, "scanning");
                }
                Some(GatewayEvent::ScanStateChanged { scanning: false }) => break,
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tick.tick() => {
                // Closes the window once the timeout has passed.
                session.link_state();
                if !started && tokio::time::Instant::now() >= confirm_by {
                    bail!("gateway did not confirm the scan");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.stop_scan().await?;
                break;
            }
        }
    }
    print_devices(&session.devices());
    Ok(())
}

async fn control(
    session: &GatewaySession<TcpConnector>,
    id: &str,
    action: &ControlAction,
) -> Result<()> {
    match action {
        ControlAction::On { channel } => {
            session.set_switch(id, to_zero_based(*channel)?, true).await?
        }
        ControlAction::Off { channel } => {
            session.set_switch(id, to_zero_based(*channel)?, false).await?
        }
        ControlAction::Brightness { percent } => session.set_brightness(id, *percent).await?,
        ControlAction::ColorTemp { percent } => session.set_color_temp(id, *percent).await?,
        ControlAction::Curtain { motion } => session.set_curtain(id, (*motion).into()).await?,
        ControlAction::Position { percent } => session.set_curtain_position(id, *percent).await?,
        ControlAction::Raw { msg_type, params } => {
            let params = hex::decode(params).context("parameter bytes must be hex")?;
            session
                .control_device_by_id(id, MsgType::from(*msg_type), &params)
                .await?
        }
    }
    Ok(())
}

fn to_zero_based(channel: Option<u8>) -> Result<Option<u8>> {
    match channel {
        Some(0) => bail!("channels are numbered from 1"),
        Some(ch) => Ok(Some(ch - 1)),
        None => Ok(None),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Read the device list and wait until the gateway stops sending records.
async fn sync_devices(session: &GatewaySession<TcpConnector>, events: &mut EventReceiver) -> Result<()> {
    session.read_device_list().await?;
    drain_for(events, LIST_SETTLE).await;
    Ok(())
}

/// Print events until none arrives for `quiet`.
async fn drain_for(events: &mut EventReceiver, quiet: Duration) {
    while let Ok(Some(event)) = tokio::time::timeout(quiet, events.recv()).await {
        print_event(&event);
    }
}

fn resolve_device(session: &GatewaySession<TcpConnector>, device: &str) -> Result<String> {
    let id = match MacAddress::from_str(device) {
        Ok(mac) => mac.unique_id(),
        Err(_) => device.to_lowercase(),
    };
    if session.device(&id).is_none() {
        bail!("unknown device '{}'; run `symi devices` to list known ids", device);
    }
    Ok(id)
}

fn restore_snapshot(session: &GatewaySession<TcpConnector>, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let registry = DeviceRegistry::from_json(&json)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    session.replace_registry(registry);
    Ok(())
}

fn save_snapshot(session: &GatewaySession<TcpConnector>, path: &Path) -> Result<()> {
    let json = session.with_registry(|r| r.to_json())?;
    std::fs::write(path, json).with_context(|| format!("writing snapshot {}", path.display()))?;
    Ok(())
}

fn print_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::ConnectionChanged { connected } => {
            println!("link {}", if *connected { "up" } else { "down" })
        }
        GatewayEvent::ScanStateChanged { scanning } => {
            println!("scan {}", if *scanning { "started" } else { "stopped" })
        }
        GatewayEvent::DeviceDiscovered(device) => println!("new     {}", device_line(device)),
        GatewayEvent::DeviceUpdated(device) => println!("updated {}", device_line(device)),
        GatewayEvent::DeviceStateChanged { device, changed } => {
            let values: Vec<String> = changed
                .iter()
                .map(|key| match device.state_value(key) {
                    Some(value) => format!("{}={}", key, value),
                    None => key.clone(),
                })
                .collect();
            println!("state   {} {}", device.unique_id, values.join(" "));
        }
        GatewayEvent::DeviceAnomaly(anomaly) => println!(
            "anomaly {} stored type {}/{} reported {}/{}",
            anomaly.unique_id,
            anomaly.stored_type,
            anomaly.stored_sub_type,
            anomaly.reported_type,
            anomaly.reported_sub_type
        ),
        GatewayEvent::GatewayInfoUpdated(info) => println!("gateway {}", info),
    }
}

fn device_line(device: &DeviceRecord) -> String {
    format!(
        "{:<12}  0x{:04X}  {:<7}  {:<28}  {}",
        device.unique_id,
        device.network_address,
        if device.online { "online" } else { "offline" },
        device.name,
        device.capabilities.iter().cloned().collect::<Vec<_>>().join(",")
    )
}

fn print_devices(devices: &[DeviceRecord]) {
    println!(
        "{:<12}  {:<6}  {:<7}  {:<28}  {}",
        "ID", "NADDR", "STATUS", "NAME", "CAPABILITIES"
    );
    for device in devices {
        println!("{}", device_line(device));
    }
    println!("{} device(s)", devices.len());
}
