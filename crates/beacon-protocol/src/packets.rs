use crate::error::{DecodeError, EncodeError};
use crate::message::{HeartbeatMessage, MessageType};
use crate::{PREAMBLE, PROJECT_TAG};

// -- Heartbeat packet framing --
//
// preamble(1) + project tag(11) + total length(1) + sender(8) + receiver(8)
// + type(1) + payload(0..=209). Ids are big-endian.

/// Fixed header size, everything before the payload.
pub const HEADER_SIZE: usize = 30;

/// Largest payload a packet may carry.
pub const MAX_PAYLOAD: usize = 209;

/// Largest packet the encoder produces or the decoder accepts.
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD;

const TAG_RANGE: std::ops::Range<usize> = 1..12;
const LENGTH_OFFSET: usize = 12;
const SENDER_OFFSET: usize = 13;
const RECEIVER_OFFSET: usize = 21;
const TYPE_OFFSET: usize = 29;

/// Encode `msg` into a freshly allocated buffer.
pub fn encode(msg: &HeartbeatMessage) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + msg.payload().len());
    encode_into(msg, &mut buf)?;
    Ok(buf)
}

/// Encode `msg` into `buf`, replacing its contents. `buf` is left empty on error.
pub fn encode_into(msg: &HeartbeatMessage, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    buf.clear();

    let payload = msg.payload();
    if payload.len() > MAX_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    buf.push(PREAMBLE);
    buf.extend_from_slice(&PROJECT_TAG);
    buf.push((HEADER_SIZE + payload.len()) as u8);
    buf.extend_from_slice(&msg.sender_id().to_be_bytes());
    buf.extend_from_slice(&msg.receiver_id().to_be_bytes());
    buf.push(msg.message_type() as u8);
    buf.extend_from_slice(payload);
    Ok(())
}

/// Decode one datagram. Never panics on malformed input.
pub fn decode(data: &[u8]) -> Result<HeartbeatMessage, DecodeError> {
    if data.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort {
            len: data.len(),
            min: HEADER_SIZE,
        });
    }
    if data[0] != PREAMBLE {
        return Err(DecodeError::BadPreamble(data[0]));
    }
    if data[TAG_RANGE] != PROJECT_TAG {
        return Err(DecodeError::BadProjectTag);
    }

    let declared = data[LENGTH_OFFSET];
    if declared as usize != data.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }
    if data.len() > MAX_PACKET_SIZE {
        return Err(DecodeError::TooLong {
            len: data.len(),
            max: MAX_PACKET_SIZE,
        });
    }

    let message_type = MessageType::from_u8(data[TYPE_OFFSET])
        .ok_or(DecodeError::UnknownMessageType(data[TYPE_OFFSET]))?;

    Ok(HeartbeatMessage::new(
        read_u64(data, SENDER_OFFSET),
        read_u64(data, RECEIVER_OFFSET),
        message_type,
        data[HEADER_SIZE..].to_vec(),
    ))
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}
