/// Configuration sections shared by the server and client daemons.
///
/// Every field has a serde default so a partial (or missing) TOML file
/// still yields a usable configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::error::BeaconError;
use crate::responder::ReplyTarget;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: IpAddr,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    #[serde(default = "default_hello_port")]
    pub hello_port: u16,
    #[serde(default = "default_response_port")]
    pub response_port: u16,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            broadcast_addr: default_broadcast_addr(),
            bind_addr: default_bind_addr(),
            hello_port: default_hello_port(),
            response_port: default_response_port(),
        }
    }
}

impl NetworkSection {
    /// Where beacons are sent.
    pub fn hello_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.hello_port)
    }

    /// Where broadcast answers are sent.
    pub fn response_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.response_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSection {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    /// Silence longer than this declares a peer lost
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,
    #[serde(default = "default_recv_timeout")]
    pub recv_timeout_ms: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            deadline_ms: default_deadline(),
            check_interval_ms: default_check_interval(),
            recv_timeout_ms: default_recv_timeout(),
        }
    }
}

impl HeartbeatSection {
    pub fn validate(&self) -> Result<(), BeaconError> {
        let fields = [
            ("interval_ms", self.interval_ms),
            ("deadline_ms", self.deadline_ms),
            ("check_interval_ms", self.check_interval_ms),
            ("recv_timeout_ms", self.recv_timeout_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(BeaconError::Config(format!("heartbeat.{name} must be non-zero")));
            }
        }
        if self.deadline_ms <= self.interval_ms {
            return Err(BeaconError::Config(format!(
                "heartbeat.deadline_ms ({}) must exceed interval_ms ({})",
                self.deadline_ms, self.interval_ms
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// How a client addresses its answers to beacons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAddressing {
    /// Back to the beacon sender's address
    #[default]
    Unicast,
    /// To the broadcast address; for networks where the sender address is unusable
    Broadcast,
}

impl ReplyAddressing {
    pub fn target(&self, network: &NetworkSection) -> ReplyTarget {
        match self {
            Self::Unicast => ReplyTarget::Unicast {
                port: network.response_port,
            },
            Self::Broadcast => ReplyTarget::Broadcast(network.response_target()),
        }
    }
}

/// Device ids share the wire with the broadcast sentinel.
pub fn validate_device_id(id: u64) -> Result<(), BeaconError> {
    if id == crate::BROADCAST_ID {
        return Err(BeaconError::Config(format!(
            "device id {id} is reserved for broadcast"
        )));
    }
    Ok(())
}

fn default_broadcast_addr() -> IpAddr { IpAddr::V4(crate::DEFAULT_BROADCAST_ADDR) }
fn default_bind_addr() -> IpAddr { IpAddr::V4(crate::DEFAULT_BIND_ADDR) }
fn default_hello_port() -> u16 { crate::DEFAULT_HELLO_PORT }
fn default_response_port() -> u16 { crate::DEFAULT_RESPONSE_PORT }
fn default_interval() -> u64 { crate::DEFAULT_BEACON_INTERVAL_MS }
fn default_deadline() -> u64 { crate::DEFAULT_LIVENESS_DEADLINE_MS }
fn default_check_interval() -> u64 { crate::DEFAULT_CHECK_INTERVAL_MS }
fn default_recv_timeout() -> u64 { crate::DEFAULT_RECV_TIMEOUT_MS }
