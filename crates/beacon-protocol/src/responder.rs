/// Client-side responder: answers each beacon with a `HERE` carrying the
/// device's current status payload. Purely reactive.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::BeaconError;
use crate::listener::MessageHandler;
use crate::message::{HeartbeatMessage, MessageType};
use crate::packets::encode;

/// Supplies the status bytes embedded in each answer (at most 209 bytes).
/// Called inline on every beacon, so it must not block.
pub trait StatusProvider: Send + Sync {
    fn current_status_payload(&self) -> Vec<u8>;
}

impl<F> StatusProvider for F
where
    F: Fn() -> Vec<u8> + Send + Sync,
{
    fn current_status_payload(&self) -> Vec<u8> {
        self()
    }
}

/// Where answers are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Back to the beacon's source address, on the given port
    Unicast { port: u16 },
    /// To a fixed (broadcast) address
    Broadcast(SocketAddr),
}

impl ReplyTarget {
    pub fn resolve(&self, beacon_from: SocketAddr) -> SocketAddr {
        match *self {
            Self::Unicast { port } => SocketAddr::new(beacon_from.ip(), port),
            Self::Broadcast(addr) => addr,
        }
    }
}

pub struct Responder<S> {
    own_id: u64,
    socket: Arc<UdpSocket>,
    status: S,
    target: ReplyTarget,
}

impl<S: StatusProvider> Responder<S> {
    pub fn new(own_id: u64, socket: Arc<UdpSocket>, status: S, target: ReplyTarget) -> Self {
        Self {
            own_id,
            socket,
            status,
            target,
        }
    }

    /// Build the answer to `msg`, or `None` if it does not call for one.
    pub fn compose_reply(&self, msg: &HeartbeatMessage) -> Option<HeartbeatMessage> {
        if msg.message_type() != MessageType::Hello || !msg.is_addressed_to(self.own_id) {
            return None;
        }
        let payload = self.status.current_status_payload();
        Some(HeartbeatMessage::here(self.own_id, msg.sender_id(), payload))
    }
}

#[async_trait]
impl<S: StatusProvider> MessageHandler for Responder<S> {
    async fn on_message(
        &self,
        msg: &HeartbeatMessage,
        from: SocketAddr,
    ) -> Result<(), BeaconError> {
        let Some(reply) = self.compose_reply(msg) else {
            return Ok(());
        };

        let buf = match encode(&reply) {
            Ok(buf) => buf,
            Err(e) => {
                warn!(receiver = reply.receiver_id(), "Reply skipped: {}", e);
                return Ok(());
            }
        };

        let dest = self.target.resolve(from);
        self.socket.send_to(&buf, dest).await?;
        debug!(to = %dest, receiver = reply.receiver_id(), len = buf.len(), "Reply sent");
        Ok(())
    }
}
