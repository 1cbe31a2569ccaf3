/// Shared peer liveness table.
///
/// The only state shared between the listener (writes last-seen) and the
/// liveness monitor (scans for silent peers). All access goes through a
/// single mutex; it is never held across an await point.
///
/// The `*_and_notify` variants deliver liveness events to a sink while the
/// lock is still held, so a sink sees one peer's transitions in the order
/// the table made them.
///
/// Per-peer state machine:
///
/// ```text
/// Unknown --packet--> Alive --deadline exceeded--> Lost --packet--> Alive
/// ```
///
/// Records are never expired. A lost peer stays in the table so it can be
/// recognised when it comes back; only `remove` deletes a record.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::message::MessageType;
use crate::monitor::LivenessSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Never heard from
    Unknown,
    Alive,
    /// Silent past the liveness deadline
    Lost,
}

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub last_seen: Instant,
    pub last_type: MessageType,
    pub last_addr: SocketAddr,
    pub state: PeerState,
}

/// Point-in-time view of one peer, as returned by `snapshot`.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub peer_id: u64,
    pub state: PeerState,
    pub last_type: MessageType,
    pub last_addr: SocketAddr,
    pub silent_for: Duration,
}

/// State transition caused by recording a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First packet ever from this peer
    FirstContact,
    /// Peer was lost and has been heard from again
    Recovered,
    /// Peer was already alive
    Refreshed,
}

#[derive(Default)]
pub struct PeerLivenessTable {
    peers: Mutex<HashMap<u64, PeerRecord>>,
}

impl PeerLivenessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PeerRecord>> {
        // A panic while holding the lock cannot leave a record half-written,
        // so a poisoned table is still usable.
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a valid packet from `peer_id` received at `now`.
    pub fn record(
        &self,
        peer_id: u64,
        message_type: MessageType,
        from: SocketAddr,
        now: Instant,
    ) -> Transition {
        update(&mut self.lock(), peer_id, message_type, from, now)
    }

    /// Like `record`, delivering `on_liveness_recovered` before the lock is
    /// released when the peer comes back from `Lost`.
    pub fn record_and_notify(
        &self,
        peer_id: u64,
        message_type: MessageType,
        from: SocketAddr,
        now: Instant,
        sink: &dyn LivenessSink,
    ) -> Transition {
        let mut peers = self.lock();
        let transition = update(&mut peers, peer_id, message_type, from, now);
        if transition == Transition::Recovered {
            sink.on_liveness_recovered(peer_id);
        }
        transition
    }

    /// Mark every alive peer silent for longer than `deadline` as lost and
    /// return their ids. Each silence episode is reported once.
    pub fn scan(&self, now: Instant, deadline: Duration) -> Vec<u64> {
        mark_lost(&mut self.lock(), now, deadline)
    }

    /// Like `scan`, delivering `on_liveness_lost` for each id, in id order,
    /// before the lock is released.
    pub fn scan_and_notify(
        &self,
        now: Instant,
        deadline: Duration,
        sink: &dyn LivenessSink,
    ) -> Vec<u64> {
        let mut peers = self.lock();
        let lost = mark_lost(&mut peers, now, deadline);
        for &peer_id in &lost {
            sink.on_liveness_lost(peer_id);
        }
        lost
    }

    pub fn state(&self, peer_id: u64) -> PeerState {
        self.lock()
            .get(&peer_id)
            .map(|r| r.state)
            .unwrap_or(PeerState::Unknown)
    }

    pub fn get(&self, peer_id: u64) -> Option<PeerRecord> {
        self.lock().get(&peer_id).cloned()
    }

    /// Consistent view of every tracked peer, ordered by id.
    pub fn snapshot(&self, now: Instant) -> Vec<PeerStatus> {
        let peers = self.lock();
        let mut out: Vec<PeerStatus> = peers
            .iter()
            .map(|(&peer_id, r)| PeerStatus {
                peer_id,
                state: r.state,
                last_type: r.last_type,
                last_addr: r.last_addr,
                silent_for: now.saturating_duration_since(r.last_seen),
            })
            .collect();
        out.sort_unstable_by_key(|p| p.peer_id);
        out
    }

    /// Administrative removal. Returns the removed record, if any.
    pub fn remove(&self, peer_id: u64) -> Option<PeerRecord> {
        self.lock().remove(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn update(
    peers: &mut HashMap<u64, PeerRecord>,
    peer_id: u64,
    message_type: MessageType,
    from: SocketAddr,
    now: Instant,
) -> Transition {
    match peers.get_mut(&peer_id) {
        Some(record) => {
            let was = record.state;
            record.last_seen = now;
            record.last_type = message_type;
            record.last_addr = from;
            record.state = PeerState::Alive;
            if was == PeerState::Lost {
                Transition::Recovered
            } else {
                Transition::Refreshed
            }
        }
        None => {
            peers.insert(
                peer_id,
                PeerRecord {
                    last_seen: now,
                    last_type: message_type,
                    last_addr: from,
                    state: PeerState::Alive,
                },
            );
            Transition::FirstContact
        }
    }
}

fn mark_lost(peers: &mut HashMap<u64, PeerRecord>, now: Instant, deadline: Duration) -> Vec<u64> {
    let mut lost = Vec::new();
    for (&peer_id, record) in peers.iter_mut() {
        if record.state == PeerState::Alive
            && now.saturating_duration_since(record.last_seen) > deadline
        {
            record.state = PeerState::Lost;
            lost.push(peer_id);
        }
    }
    lost.sort_unstable();
    lost
}
