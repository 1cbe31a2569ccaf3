use std::io;

use thiserror::Error;

/// Why a datagram was rejected by the codec. Checks run in declaration order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short: {len} bytes (min: {min})")]
    TooShort { len: usize, min: usize },

    #[error("bad preamble byte 0x{0:02x}")]
    BadPreamble(u8),

    #[error("project tag mismatch")]
    BadProjectTag,

    #[error("declared length {declared} does not match received {actual} bytes")]
    LengthMismatch { declared: u8, actual: usize },

    #[error("packet too long: {len} bytes (max: {max})")]
    TooLong { len: usize, max: usize },

    #[error("unrecognized message type 0x{0:02x}")]
    UnknownMessageType(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Terminal failure of one of the protocol roles.
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
