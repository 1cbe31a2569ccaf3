/// Inbound datagram listener.
///
/// Receives with a bounded timeout so cancellation is seen even on a silent
/// network. Datagrams that fail to decode are dropped; foreign traffic on a
/// shared broadcast domain must never stop the loop. Valid packets refresh
/// the peer table and are then passed to the handler, inline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::BeaconError;
use crate::message::HeartbeatMessage;
use crate::monitor::LivenessSink;
use crate::packets::decode;
use crate::peers::{PeerLivenessTable, Transition};

/// Large enough to receive (and reject) oversized datagrams whole.
const RECV_BUF_SIZE: usize = 1024;

/// Consumer of decoded messages. Runs inside the receive loop, so it must not
/// block; an error ends the listener.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(
        &self,
        msg: &HeartbeatMessage,
        from: SocketAddr,
    ) -> Result<(), BeaconError>;
}

pub struct Listener {
    own_id: u64,
    socket: Arc<UdpSocket>,
    peers: Arc<PeerLivenessTable>,
    handler: Arc<dyn MessageHandler>,
    liveness: Arc<dyn LivenessSink>,
    recv_timeout: Duration,
}

impl Listener {
    pub fn new(
        own_id: u64,
        socket: Arc<UdpSocket>,
        peers: Arc<PeerLivenessTable>,
        handler: Arc<dyn MessageHandler>,
        liveness: Arc<dyn LivenessSink>,
        recv_timeout: Duration,
    ) -> Self {
        Self {
            own_id,
            socket,
            peers,
            handler,
            liveness,
            recv_timeout,
        }
    }

    /// Run until `cancel` fires or the socket fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BeaconError> {
        let mut buf = [0u8; RECV_BUF_SIZE];

        match self.socket.local_addr() {
            Ok(addr) => info!(own_id = self.own_id, local = %addr, "Listener started"),
            Err(_) => info!(own_id = self.own_id, "Listener started"),
        }

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut buf)) => r,
            };

            let (len, from) = match received {
                Err(_elapsed) => continue,
                Ok(Err(e)) => {
                    error!("Listener receive error: {}", e);
                    return Err(e.into());
                }
                Ok(Ok(r)) => r,
            };

            self.handle_datagram(&buf[..len], from).await?;
        }

        info!("Listener stopped");
        Ok(())
    }

    /// Process one received datagram. Only handler errors propagate.
    pub async fn handle_datagram(
        &self,
        data: &[u8],
        from: SocketAddr,
    ) -> Result<(), BeaconError> {
        let msg = match decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                trace!(from = %from, len = data.len(), "Discarding datagram: {}", e);
                return Ok(());
            }
        };

        if msg.sender_id() == self.own_id {
            trace!(from = %from, "Ignoring own packet");
            return Ok(());
        }

        let peer_id = msg.sender_id();
        let transition = self.peers.record_and_notify(
            peer_id,
            msg.message_type(),
            from,
            Instant::now(),
            &*self.liveness,
        );
        match transition {
            Transition::FirstContact => {
                info!(peer_id, from = %from, kind = msg.message_type().as_str(), "New peer");
            }
            Transition::Recovered => {
                info!(peer_id, from = %from, "Peer liveness recovered");
            }
            Transition::Refreshed => {
                debug!(peer_id, kind = msg.message_type().as_str(), "Packet received");
            }
        }

        self.handler.on_message(&msg, from).await
    }
}
