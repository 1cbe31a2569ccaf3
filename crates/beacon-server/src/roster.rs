/// Client roster for the coordinator.
///
/// Records each device's last reported status and marks devices offline or
/// back online as the liveness monitor and listener report transitions.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use beacon_protocol::listener::MessageHandler;
use beacon_protocol::monitor::LivenessSink;
use beacon_protocol::{BeaconError, HeartbeatMessage, MessageType};

#[derive(Debug, Clone)]
pub struct ClientReport {
    pub addr: SocketAddr,
    /// Last `HERE` payload, as sent by the device
    pub status: Vec<u8>,
    pub last_report: Instant,
    pub reports: u64,
    pub online: bool,
}

pub struct ClientRoster {
    own_id: u64,
    clients: RwLock<HashMap<u64, ClientReport>>,
}

impl ClientRoster {
    pub fn new(own_id: u64) -> Self {
        Self {
            own_id,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Every known client, ordered by id.
    pub fn snapshot(&self) -> Vec<(u64, ClientReport)> {
        let clients = self.clients.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<_> = clients.iter().map(|(&id, r)| (id, r.clone())).collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    /// (online, offline) device counts
    pub fn counts(&self) -> (usize, usize) {
        let clients = self.clients.read().unwrap_or_else(|p| p.into_inner());
        let online = clients.values().filter(|c| c.online).count();
        (online, clients.len() - online)
    }

    fn record_report(&self, msg: &HeartbeatMessage, from: SocketAddr) {
        let client_id = msg.sender_id();
        let mut clients = self.clients.write().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();

        let report = match clients.entry(client_id) {
            Entry::Vacant(slot) => {
                let status = msg.payload().first();
                info!(client_id, from = %from, status = ?status, "Client registered");
                slot.insert(ClientReport {
                    addr: from,
                    status: msg.payload().to_vec(),
                    last_report: now,
                    reports: 1,
                    online: true,
                });
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        // Status byte leads the payload; the rest (uptime) changes every report
        if report.status.first() != msg.payload().first() {
            info!(
                client_id,
                previous = ?report.status.first(),
                status = ?msg.payload().first(),
                "Client status changed"
            );
        }
        if report.addr != from {
            info!(client_id, previous = %report.addr, addr = %from, "Client address changed");
        }
        report.addr = from;
        report.status = msg.payload().to_vec();
        report.last_report = now;
        report.reports += 1;
        report.online = true;
    }

    /// Returns the updated report, or None for a device this roster never
    /// heard a report from.
    fn set_online(&self, client_id: u64, online: bool) -> Option<ClientReport> {
        let mut clients = self.clients.write().unwrap_or_else(|p| p.into_inner());
        let report = clients.get_mut(&client_id)?;
        report.online = online;
        Some(report.clone())
    }
}

#[async_trait]
impl MessageHandler for ClientRoster {
    async fn on_message(
        &self,
        msg: &HeartbeatMessage,
        from: SocketAddr,
    ) -> Result<(), BeaconError> {
        match msg.message_type() {
            MessageType::Here if msg.is_addressed_to(self.own_id) => {
                debug!(
                    client_id = msg.sender_id(),
                    from = %from,
                    status_len = msg.payload().len(),
                    "Status report"
                );
                self.record_report(msg, from);
            }
            MessageType::Estop | MessageType::SetupError | MessageType::OscComError => {
                warn!(
                    client_id = msg.sender_id(),
                    kind = msg.message_type().as_str(),
                    "Device reported a fault"
                );
            }
            MessageType::Hello => {
                // Another coordinator on the same segment
                warn!(peer_id = msg.sender_id(), from = %from, "Foreign beacon received");
            }
            _ => {}
        }
        Ok(())
    }
}

impl LivenessSink for ClientRoster {
    fn on_liveness_lost(&self, peer_id: u64) {
        let Some(report) = self.set_online(peer_id, false) else {
            debug!(peer_id, "Unregistered peer went silent");
            return;
        };
        let (online, offline) = self.counts();
        warn!(
            client_id = peer_id,
            addr = %report.addr,
            last_status = ?report.status.first(),
            online,
            offline,
            "Client offline"
        );
    }

    fn on_liveness_recovered(&self, peer_id: u64) {
        let Some(report) = self.set_online(peer_id, true) else {
            debug!(peer_id, "Unregistered peer heard again");
            return;
        };
        let (online, offline) = self.counts();
        info!(client_id = peer_id, addr = %report.addr, online, offline, "Client back online");
    }
}
