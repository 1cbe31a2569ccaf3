mod link;
mod status;

use clap::Parser;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use beacon_protocol::config::{
    validate_device_id, HeartbeatSection, NetworkSection, ReplyAddressing,
};
use beacon_protocol::listener::Listener;
use beacon_protocol::monitor::LivenessMonitor;
use beacon_protocol::peers::PeerLivenessTable;
use beacon_protocol::responder::Responder;
use beacon_protocol::socket::bind_udp;
use beacon_protocol::BeaconError;

use crate::link::CoordinatorLink;
use crate::status::{DeviceState, FailSafe};

#[derive(Parser, Debug)]
#[command(name = "beacon-client", about = "Liveness beacon field device")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/client.toml")]
    config: PathBuf,

    /// Device id (overrides the config file)
    #[arg(long, env = "BEACON_DEVICE_ID")]
    id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Unique device id; random when unset
    #[serde(default = "rand_device_id")]
    pub id: u64,
    #[serde(default)]
    pub reply_addressing: ReplyAddressing,
    /// Release the fail-safe stop automatically when the coordinator returns
    #[serde(default)]
    pub clear_stop_on_recovery: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            id: rand_device_id(),
            reply_addressing: ReplyAddressing::default(),
            clear_stop_on_recovery: false,
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<(), BeaconError> {
        validate_device_id(self.client.id)?;
        self.heartbeat.validate()
    }
}

/// Spawn a protocol role. Losing the listener means losing the beacons, so
/// any role ending early shuts the device down.
fn spawn_role<F>(
    name: &'static str,
    cancel: CancellationToken,
    role: F,
) -> JoinHandle<Result<(), BeaconError>>
where
    F: Future<Output = Result<(), BeaconError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = role.await;
        if let Err(ref e) = result {
            error!(role = name, "Role failed: {}", e);
        }
        cancel.cancel();
        result
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config: ClientConfig = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        toml::from_str(&config_str)?
    } else {
        info!("No config file found, using defaults");
        toml::from_str("")?
    };
    if let Some(id) = args.id {
        config.client.id = id;
    }
    config.validate()?;

    let hb = &config.heartbeat;
    let own_id = config.client.id;
    let bind = SocketAddr::new(config.network.bind_addr, config.network.hello_port);
    let socket = Arc::new(bind_udp(bind)?);

    info!(
        device_id = own_id,
        listen = %bind,
        reply = ?config.client.reply_addressing,
        deadline_ms = hb.deadline_ms,
        "Beacon client starting"
    );

    let state = Arc::new(DeviceState::new());
    let peers = Arc::new(PeerLivenessTable::new());
    let cancel = CancellationToken::new();

    let responder = Responder::new(
        own_id,
        Arc::clone(&socket),
        {
            let state = Arc::clone(&state);
            move || state.status_payload()
        },
        config.client.reply_addressing.target(&config.network),
    );
    let link = Arc::new(CoordinatorLink::new(own_id, Arc::clone(&state), responder));
    let fail_safe = Arc::new(FailSafe::new(
        Arc::clone(&state),
        config.client.clear_stop_on_recovery,
    ));

    let listener = Listener::new(
        own_id,
        Arc::clone(&socket),
        Arc::clone(&peers),
        link.clone(),
        fail_safe.clone(),
        hb.recv_timeout(),
    );
    let listener_handle = spawn_role("listener", cancel.clone(), listener.run(cancel.clone()));

    let monitor = LivenessMonitor::new(
        Arc::clone(&peers),
        fail_safe,
        hb.check_interval(),
        hb.deadline(),
    );
    let monitor_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    info!("Client running, waiting for coordinator beacons...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
        _ = cancel.cancelled() => error!("Protocol role stopped, shutting down"),
    }
    cancel.cancel();

    // Leaving supervision is itself a loss of control
    let prev = state.engage_stop();
    info!(
        previous = ?prev,
        coordinator = ?link.coordinator(),
        "Fail-safe stop engaged for shutdown"
    );

    let result = listener_handle.await?;
    monitor_handle.await?;

    result.map_err(Into::into)
}

fn rand_device_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    (seed ^ (seed >> 32)) | 1
}
