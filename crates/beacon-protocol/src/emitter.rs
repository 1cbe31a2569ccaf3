/// Server-side beacon emitter.
///
/// Broadcasts a `HELLO` every interval until cancelled. The first beacon goes
/// out one interval after start. A lost beacon is never resent; the next tick
/// stands in for it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BeaconError;
use crate::message::HeartbeatMessage;
use crate::packets::{encode_into, HEADER_SIZE};

pub struct BeaconEmitter {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    sender_id: u64,
    interval: Duration,
}

impl BeaconEmitter {
    pub fn new(
        socket: Arc<UdpSocket>,
        target: SocketAddr,
        sender_id: u64,
        interval: Duration,
    ) -> Self {
        Self {
            socket,
            target,
            sender_id,
            interval,
        }
    }

    /// Run until `cancel` fires. Returns the number of beacons sent, or the
    /// transport error that stopped the loop.
    pub async fn run(self, cancel: CancellationToken) -> Result<u64, BeaconError> {
        let hello = HeartbeatMessage::hello(self.sender_id);
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        let mut pulses: u64 = 0;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            sender_id = self.sender_id,
            target = %self.target,
            interval_ms = self.interval.as_millis() as u64,
            "Beacon emitter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = encode_into(&hello, &mut buf) {
                warn!("Beacon skipped: {}", e);
                continue;
            }

            self.socket.send_to(&buf, self.target).await?;
            pulses += 1;
            debug!(pulses, "Beacon sent");
        }

        info!(pulses, "Beacon emitter stopped");
        Ok(pulses)
    }
}
