use shared::{PacketError, RegistryError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
