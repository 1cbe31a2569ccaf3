mod roster;

use clap::Parser;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use beacon_protocol::config::{validate_device_id, HeartbeatSection, NetworkSection};
use beacon_protocol::emitter::BeaconEmitter;
use beacon_protocol::listener::Listener;
use beacon_protocol::monitor::LivenessMonitor;
use beacon_protocol::peers::PeerLivenessTable;
use beacon_protocol::socket::bind_udp;
use beacon_protocol::BeaconError;

use crate::roster::ClientRoster;

#[derive(Parser, Debug)]
#[command(name = "beacon-server", about = "Liveness beacon coordinator")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_id")]
    pub id: u64,
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            id: default_server_id(),
            name: default_server_name(),
        }
    }
}

fn default_server_id() -> u64 { 1 }
fn default_server_name() -> String { "coordinator".to_string() }

impl ServerConfig {
    fn validate(&self) -> Result<(), BeaconError> {
        validate_device_id(self.server.id)?;
        self.heartbeat.validate()
    }
}

/// Spawn a protocol role. Any role ending early takes the whole process
/// down: a dead listener or emitter would otherwise fail silently.
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

    let config: ServerConfig = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await.map_err(|e| {
            error!("Failed to read config file {:?}: {}", args.config, e);
            e
        })?;
        toml::from_str(&config_str).map_err(|e| {
            error!("Failed to parse config: {}", e);
            e
        })?
    } else {
        info!("No config file found, using defaults");
        toml::from_str("")?
    };
    config.validate()?;

    let hb = &config.heartbeat;
    let bind = SocketAddr::new(config.network.bind_addr, config.network.response_port);
    let socket = Arc::new(bind_udp(bind)?);

    info!(
        server_id = config.server.id,
        name = %config.server.name,
        listen = %bind,
        beacon_target = %config.network.hello_target(),
        interval_ms = hb.interval_ms,
        deadline_ms = hb.deadline_ms,
        "Beacon server starting"
    );

    let peers = Arc::new(PeerLivenessTable::new());
    let roster = Arc::new(ClientRoster::new(config.server.id));
    let cancel = CancellationToken::new();

    let emitter = BeaconEmitter::new(
        Arc::clone(&socket),
        config.network.hello_target(),
        config.server.id,
        hb.interval(),
    );
    let emitter_handle = {
        let token = cancel.clone();
        spawn_role("emitter", cancel.clone(), async move {
            emitter.run(token).await.map(|_| ())
        })
    };

    let listener = Listener::new(
        config.server.id,
        Arc::clone(&socket),
        Arc::clone(&peers),
        roster.clone(),
        roster.clone(),
        hb.recv_timeout(),
    );
    let listener_handle = spawn_role("listener", cancel.clone(), listener.run(cancel.clone()));

    let monitor = LivenessMonitor::new(
        Arc::clone(&peers),
        roster.clone(),
        hb.check_interval(),
        hb.deadline(),
    );
    let monitor_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    info!("Beacon server running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
        _ = cancel.cancelled() => error!("Protocol role stopped, shutting down"),
    }
    cancel.cancel();

    let mut failure = None;
    for handle in [emitter_handle, listener_handle] {
        if let Err(e) = handle.await? {
            failure.get_or_insert(e);
        }
    }
    monitor_handle.await?;

    for (client_id, report) in roster.snapshot() {
        info!(
            client_id,
            addr = %report.addr,
            online = report.online,
            status = ?report.status.first(),
            reports = report.reports,
            silent_ms = report.last_report.elapsed().as_millis() as u64,
            "Client summary"
        );
    }
    let (online, offline) = roster.counts();
    info!(online, offline, tracked = peers.len(), "Beacon server stopped");

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
