use crate::BROADCAST_ID;

// -- Message types --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Beacon probe from the coordinator
    Hello = 0x01,
    /// Device answer to a beacon, carries a status payload
    Here = 0x02,
    SetupError = 0x03,
    Moving = 0x04,
    Following = 0x05,
    Estop = 0x06,
    OscComError = 0x07,
    NotValid = 0x08,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Here),
            0x03 => Some(Self::SetupError),
            0x04 => Some(Self::Moving),
            0x05 => Some(Self::Following),
            0x06 => Some(Self::Estop),
            0x07 => Some(Self::OscComError),
            0x08 => Some(Self::NotValid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Here => "here",
            Self::SetupError => "setup_error",
            Self::Moving => "moving",
            Self::Following => "following",
            Self::Estop => "estop",
            Self::OscComError => "osc_com_error",
            Self::NotValid => "not_valid",
        }
    }
}

// -- Heartbeat message --

/// One protocol packet in structured form. Fields are fixed at construction;
/// payload size is checked when the message is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMessage {
    sender_id: u64,
    receiver_id: u64,
    message_type: MessageType,
    payload: Vec<u8>,
}

impl HeartbeatMessage {
    pub fn new(
        sender_id: u64,
        receiver_id: u64,
        message_type: MessageType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            message_type,
            payload,
        }
    }

    /// Beacon probe addressed to every device.
    pub fn hello(sender_id: u64) -> Self {
        Self::new(sender_id, BROADCAST_ID, MessageType::Hello, Vec::new())
    }

    /// Answer to a beacon from `receiver_id`.
    pub fn here(sender_id: u64, receiver_id: u64, payload: Vec<u8>) -> Self {
        Self::new(sender_id, receiver_id, MessageType::Here, payload)
    }

    pub fn sender_id(&self) -> u64 {
        self.sender_id
    }

    pub fn receiver_id(&self) -> u64 {
        self.receiver_id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver_id == BROADCAST_ID
    }

    /// True if this message targets `device_id` directly or every device.
    pub fn is_addressed_to(&self, device_id: u64) -> bool {
        self.is_broadcast() || self.receiver_id == device_id
    }
}
