/// Liveness monitor.
///
/// Periodically scans the peer table and reports every peer that has been
/// silent past the deadline. The sink decides what loss means for its side:
/// a client stops motion, a server marks the device offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::peers::PeerLivenessTable;

/// Receives liveness transitions. Calls are made from the protocol tasks
/// while the peer table is locked: they must return promptly and must not
/// call back into the table.
pub trait LivenessSink: Send + Sync {
    /// A tracked peer went silent past the deadline. Fired once per episode.
    fn on_liveness_lost(&self, peer_id: u64);

    /// A lost peer was heard from again.
    fn on_liveness_recovered(&self, peer_id: u64);
}

pub struct LivenessMonitor {
    peers: Arc<PeerLivenessTable>,
    sink: Arc<dyn LivenessSink>,
    check_interval: Duration,
    deadline: Duration,
}

impl LivenessMonitor {
    pub fn new(
        peers: Arc<PeerLivenessTable>,
        sink: Arc<dyn LivenessSink>,
        check_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            peers,
            sink,
            check_interval,
            deadline,
        }
    }

    /// Scan once at `now`, delivering a loss event for each newly lost peer.
    pub fn check(&self, now: Instant) -> Vec<u64> {
        let lost = self.peers.scan_and_notify(now, self.deadline, &*self.sink);
        for &peer_id in &lost {
            warn!(
                peer_id,
                deadline_ms = self.deadline.as_millis() as u64,
                "Peer liveness lost"
            );
        }
        lost
    }

    pub async fn run(self, cancel: CancellationToken) {
        let start = Instant::now() + self.check_interval;
        let mut ticker = tokio::time::interval_at(start, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            check_interval_ms = self.check_interval.as_millis() as u64,
            deadline_ms = self.deadline.as_millis() as u64,
            "Liveness monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.check(Instant::now());
        }

        info!("Liveness monitor stopped");
    }
}
