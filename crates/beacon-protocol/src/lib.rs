use std::net::Ipv4Addr;

pub mod config;
pub mod emitter;
pub mod error;
pub mod listener;
pub mod message;
pub mod monitor;
pub mod packets;
pub mod peers;
pub mod responder;
pub mod socket;

pub use error::{BeaconError, DecodeError, EncodeError};
pub use message::{HeartbeatMessage, MessageType};

/// First byte of every packet
pub const PREAMBLE: u8 = 0x10;

/// ASCII project tag following the preamble
pub const PROJECT_TAG: [u8; 11] = *b"izzymessage";

/// Receiver id meaning "any device"
pub const BROADCAST_ID: u64 = 0;

/// Default addressing
pub const DEFAULT_BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;
pub const DEFAULT_BIND_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Default ports: beacons travel server → clients on the hello port,
/// answers travel clients → server on the response port.
pub const DEFAULT_HELLO_PORT: u16 = 9001;
pub const DEFAULT_RESPONSE_PORT: u16 = 9000;

/// Heartbeat timing defaults
pub const DEFAULT_BEACON_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_LIVENESS_DEADLINE_MS: u64 = 3000;
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 500;
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 250;
