//! Error types for UDP-over-TCP framing and address handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UotError {
    #[error("invalid address type: {0:#04x}")]
    InvalidAddressType(u8),

    #[error("truncated address")]
    TruncatedAddress(#[source] std::io::Error),

    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("truncated packet: expected {expected} bytes, received {received}")]
    TruncatedPacket {
        expected: usize,
        received: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("buffer too small: packet is {needed} bytes, buffer holds {available}")]
    ShortBuffer { needed: usize, available: usize },

    #[error("packet too large: {size} bytes exceeds limit of {limit}")]
    PacketTooLarge { size: usize, limit: usize },

    #[error("invalid handshake input: {0}")]
    InvalidHandshakeInput(String),

    #[error("protocol state error: {0}")]
    ProtocolState(&'static str),

    #[error("stream is closed")]
    Closed,

    #[error("invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UotError> for std::io::Error {
    fn from(e: UotError) -> Self {
        use std::io::ErrorKind;
        let kind = match &e {
            UotError::Io(inner) => inner.kind(),
            UotError::TruncatedAddress(_) | UotError::TruncatedPacket { .. } => {
                ErrorKind::UnexpectedEof
            }
            UotError::InvalidAddressType(_) | UotError::InvalidHostname(_) => {
                ErrorKind::InvalidData
            }
            UotError::ShortBuffer { .. }
            | UotError::PacketTooLarge { .. }
            | UotError::InvalidHandshakeInput(_)
            | UotError::Config(_) => ErrorKind::InvalidInput,
            UotError::ProtocolState(_) => ErrorKind::BrokenPipe,
            UotError::Closed => ErrorKind::NotConnected,
        };
        match e {
            UotError::Io(inner) => inner,
            other => std::io::Error::new(kind, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, UotError>;
