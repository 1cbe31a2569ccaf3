/// Coordinator link: remembers which coordinator this device answers to and
/// acts on control messages addressed to it, then hands beacons on to the
/// responder.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info, warn};

use beacon_protocol::listener::MessageHandler;
use beacon_protocol::{BeaconError, HeartbeatMessage, MessageType};

use crate::status::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinator {
    pub id: u64,
    pub addr: SocketAddr,
}

pub struct CoordinatorLink<H> {
    own_id: u64,
    state: Arc<DeviceState>,
    responder: H,
    coordinator: Mutex<Option<Coordinator>>,
}

impl<H> CoordinatorLink<H> {
    pub fn new(own_id: u64, state: Arc<DeviceState>, responder: H) -> Self {
        Self {
            own_id,
            state,
            responder,
            coordinator: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> Option<Coordinator> {
        *self.coordinator.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn observe_beacon(&self, id: u64, addr: SocketAddr) {
        let mut current = self.coordinator.lock().unwrap_or_else(|p| p.into_inner());
        match *current {
            None => info!(coordinator = id, addr = %addr, "Bound to coordinator"),
            Some(prev) if prev.id != id => warn!(
                previous = prev.id,
                coordinator = id,
                addr = %addr,
                "Coordinator changed"
            ),
            Some(prev) if prev.addr != addr => {
                info!(coordinator = id, addr = %addr, "Coordinator address changed")
            }
            Some(_) => return,
        }
        *current = Some(Coordinator { id, addr });
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for CoordinatorLink<H> {
    async fn on_message(
        &self,
        msg: &HeartbeatMessage,
        from: SocketAddr,
    ) -> Result<(), BeaconError> {
        if !msg.is_addressed_to(self.own_id) {
            return Ok(());
        }

        match msg.message_type() {
            MessageType::Hello => self.observe_beacon(msg.sender_id(), from),
            MessageType::Estop => {
                let prev = self.state.engage_stop();
                error!(
                    coordinator = msg.sender_id(),
                    previous = ?prev,
                    "Stop commanded by coordinator"
                );
            }
            _ => {}
        }

        self.responder.on_message(msg, from).await
    }
}
