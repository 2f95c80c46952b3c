//! Channelized peer-to-peer delivery over UDP
//!
//! A [`Host`] owns one socket and any number of peers. Channel
//! [`Channel::Control`] is reliable and ordered; [`Channel::State`] is fire
//! and forget. Nothing happens in the background: incoming datagrams are
//! processed inside [`Host::service`] and queued outgoing data only reaches
//! the wire on [`Host::flush`].

pub mod frame;
pub mod host;
pub mod peer;

pub use host::Host;

use crate::ClientId;
use std::net::SocketAddr;
use std::time::Duration;

/// Peer ids double as client ids on the protocol layer.
pub type PeerId = ClientId;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DISCONNECT_DRAIN: Duration = Duration::from_secs(3);
pub const PEER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    /// Join, part, ping and the join bootstrap
    Control = 0,
    /// Full states and deltas
    State = 1,
}

impl Channel {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Channel::Control),
            1 => Some(Channel::State),
            _ => None,
        }
    }

    pub fn is_reliable(self) -> bool {
        self == Channel::Control
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Connect {
        peer: PeerId,
        addr: SocketAddr,
    },
    Receive {
        peer: PeerId,
        channel: Channel,
        data: Vec<u8>,
    },
    Disconnect {
        peer: PeerId,
    },
}
