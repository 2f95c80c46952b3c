//! Error types shared by the client and the server

use crate::ClientId;
use thiserror::Error;

/// Packet codec error. Never fatal: the offending packet is dropped.
#[derive(Debug, Error)]
pub enum PacketError {
    /// Too short, unknown kind, or a length that does not match the kind
    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Client {0} is already registered")]
    DuplicateClient(ClientId),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Connection to {0} timed out during handshake")]
    HandshakeTimeout(std::net::SocketAddr),

    #[error("No available peer slots")]
    NoPeerSlots,

    #[error("Connection rejected by {0}")]
    Rejected(std::net::SocketAddr),

    #[error("Unknown peer {0}")]
    UnknownPeer(ClientId),
}
