use shared::{PacketError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("Could not resolve server address {0}")]
    Resolve(String),

    #[error("Server closed the connection")]
    Disconnected,
}
