/// Device status and the fail-safe stop.
///
/// The status byte travels in every `HERE` answer. Loss of the coordinator
/// latches `Estop`; only an explicit clear (or recovery, when configured)
/// releases it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use beacon_protocol::monitor::LivenessSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceStatus {
    Available = 0x01,
    Moving = 0x02,
    Following = 0x03,
    Estop = 0x04,
}

impl DeviceStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Available),
            0x02 => Some(Self::Moving),
            0x03 => Some(Self::Following),
            0x04 => Some(Self::Estop),
            _ => None,
        }
    }
}

pub struct DeviceState {
    status: AtomicU8,
    start_time: Instant,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(DeviceStatus::Available as u8),
            start_time: Instant::now(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(DeviceStatus::Estop)
    }

    /// Latch the stop. Returns the status it replaced.
    pub fn engage_stop(&self) -> DeviceStatus {
        let prev = self.status.swap(DeviceStatus::Estop as u8, Ordering::AcqRel);
        DeviceStatus::from_u8(prev).unwrap_or(DeviceStatus::Estop)
    }

    /// Release a latched stop. Returns false if no stop was engaged.
    pub fn clear_stop(&self) -> bool {
        self.status
            .compare_exchange(
                DeviceStatus::Estop as u8,
                DeviceStatus::Available as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// status(1) + uptime seconds(4, big-endian)
    pub fn status_payload(&self) -> Vec<u8> {
        let uptime = self.start_time.elapsed().as_secs().min(u32::MAX as u64) as u32;
        let mut payload = Vec::with_capacity(5);
        payload.push(self.status() as u8);
        payload.extend_from_slice(&uptime.to_be_bytes());
        payload
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Safety action for coordinator loss: stop motion.
pub struct FailSafe {
    state: Arc<DeviceState>,
    clear_on_recovery: bool,
}

impl FailSafe {
    pub fn new(state: Arc<DeviceState>, clear_on_recovery: bool) -> Self {
        Self {
            state,
            clear_on_recovery,
        }
    }
}

impl LivenessSink for FailSafe {
    fn on_liveness_lost(&self, peer_id: u64) {
        let prev = self.state.engage_stop();
        error!(
            coordinator = peer_id,
            previous = ?prev,
            "Supervisory control lost, fail-safe stop engaged"
        );
    }

    fn on_liveness_recovered(&self, peer_id: u64) {
        if self.clear_on_recovery {
            if self.state.clear_stop() {
                info!(coordinator = peer_id, "Supervisory control restored, stop cleared");
            }
        } else if self.state.status() == DeviceStatus::Estop {
            warn!(
                coordinator = peer_id,
                "Supervisory control restored, stop remains latched"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let state = DeviceState::new();
        let payload = state.status_payload();
        assert_eq!(payload.len(), 5);
        assert_eq!(payload[0], DeviceStatus::Available as u8);
        assert_eq!(&payload[1..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_stop_is_latched() {
        let state = DeviceState::new();
        assert_eq!(state.engage_stop(), DeviceStatus::Available);
        assert_eq!(state.engage_stop(), DeviceStatus::Estop);
        assert_eq!(state.status(), DeviceStatus::Estop);
        assert_eq!(state.status_payload()[0], DeviceStatus::Estop as u8);

        assert!(state.clear_stop());
        assert!(!state.clear_stop());
        assert_eq!(state.status(), DeviceStatus::Available);
    }

    #[test]
    fn test_fail_safe_latches_by_default() {
        let state = Arc::new(DeviceState::new());
        let sink = FailSafe::new(Arc::clone(&state), false);

        sink.on_liveness_lost(1);
        assert_eq!(state.status(), DeviceStatus::Estop);

        sink.on_liveness_recovered(1);
        assert_eq!(state.status(), DeviceStatus::Estop);
    }

    #[test]
    fn test_fail_safe_clears_when_configured() {
        let state = Arc::new(DeviceState::new());
        let sink = FailSafe::new(Arc::clone(&state), true);

        sink.on_liveness_lost(1);
        assert_eq!(state.status(), DeviceStatus::Estop);
        sink.on_liveness_recovered(1);
        assert_eq!(state.status(), DeviceStatus::Available);
    }
}
