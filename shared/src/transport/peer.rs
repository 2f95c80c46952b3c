//! Per-connection sequencing state

use super::frame::{Frame, FrameKind};
use super::{Channel, PeerId};
use crate::error::TransportError;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unacked reliable frames go out again after this long.
pub const RESEND_AFTER: Duration = Duration::from_millis(200);

/// How far past the next expected sequence a reliable frame may arrive and
/// still be buffered. Anything further is dropped unacked and resent later.
pub const RELIABLE_WINDOW: u32 = 256;

/// Handshake progress. Only connected peers deliver data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
}

#[derive(Debug)]
struct Unacked {
    datagram: Vec<u8>,
    last_sent: Option<Instant>,
}

/// Per-connection channel state
///
/// Holds both sequence counters, the reliable frames still waiting for an
/// ack, reliable frames that arrived ahead of order, and the datagrams
/// queued since the last flush. The peer never touches the socket itself;
/// [`Host`](super::Host) collects its datagrams and routes frames to it.
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub session: u32,
    pub state: PeerState,
    pub last_heard: Instant,
    next_reliable: u32,
    next_unreliable: u32,
    next_expected: u32,
    unacked: BTreeMap<u32, Unacked>,
    early: BTreeMap<u32, (Channel, Vec<u8>)>,
    outbox: Vec<Vec<u8>>,
}

impl Peer {
    pub fn new(id: PeerId, addr: SocketAddr, session: u32, state: PeerState) -> Self {
        Self {
            id,
            addr,
            session,
            state,
            last_heard: Instant::now(),
            next_reliable: 0,
            next_unreliable: 0,
            next_expected: 0,
            unacked: BTreeMap::new(),
            early: BTreeMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    /// Queues `data` until the next flush.
    pub fn queue(&mut self, channel: Channel, data: &[u8]) -> Result<(), TransportError> {
        if channel.is_reliable() {
            let sequence = self.next_reliable;
            self.next_reliable = self.next_reliable.wrapping_add(1);
            let datagram = self.frame(FrameKind::Reliable, channel, sequence, data).encode()?;
            self.unacked.insert(
                sequence,
                Unacked {
                    datagram,
                    last_sent: None,
                },
            );
        } else {
            let sequence = self.next_unreliable;
            self.next_unreliable = self.next_unreliable.wrapping_add(1);
            let datagram = self
                .frame(FrameKind::Unreliable, channel, sequence, data)
                .encode()?;
            self.outbox.push(datagram);
        }
        Ok(())
    }

    /// Queues a handshake, ack or disconnect frame. These are never resent.
    pub fn queue_control(&mut self, kind: FrameKind, sequence: u32) -> Result<(), TransportError> {
        let datagram = Frame::control(kind, self.session, sequence).encode()?;
        self.outbox.push(datagram);
        Ok(())
    }

    /// Stops resending `sequence`. Unknown or repeated acks are harmless.
    pub fn on_ack(&mut self, sequence: u32) {
        self.unacked.remove(&sequence);
    }

    /// Takes in a reliable frame and returns what is now deliverable, in
    /// sequence order.
    ///
    /// Sequences are compared with wrapping arithmetic. A frame at or past
    /// [`RELIABLE_WINDOW`] ahead of the next expected one is dropped without
    /// an ack, so the buffer of early frames stays bounded and the sender
    /// resends it later. Every other copy is acked, duplicates of delivered
    /// frames included, since the sender only stops resending once an ack
    /// gets through.
    pub fn on_reliable(
        &mut self,
        sequence: u32,
        channel: Channel,
        data: Vec<u8>,
    ) -> Result<Vec<(Channel, Vec<u8>)>, TransportError> {
        let ahead = sequence.wrapping_sub(self.next_expected);
        let already_delivered = ahead > u32::MAX / 2;
        if ahead >= RELIABLE_WINDOW && !already_delivered {
            return Ok(Vec::new());
        }

        self.queue_control(FrameKind::Ack, sequence)?;
        if already_delivered || self.early.contains_key(&sequence) {
            return Ok(Vec::new());
        }
        self.early.insert(sequence, (channel, data));

        let mut ready = Vec::new();
        while let Some(message) = self.early.remove(&self.next_expected) {
            ready.push(message);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        Ok(ready)
    }

    /// Datagrams due at `now`: everything queued plus reliable frames that
    /// were never sent or have waited past [`RESEND_AFTER`].
    pub fn take_datagrams(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let mut datagrams = std::mem::take(&mut self.outbox);
        for pending in self.unacked.values_mut() {
            let due = match pending.last_sent {
                None => true,
                Some(sent) => now.duration_since(sent) >= RESEND_AFTER,
            };
            if due {
                pending.last_sent = Some(now);
                datagrams.push(pending.datagram.clone());
            }
        }
        datagrams
    }

    /// Nothing queued and every reliable frame acknowledged.
    pub fn is_drained(&self) -> bool {
        self.outbox.is_empty() && self.unacked.is_empty()
    }

    fn frame(&self, kind: FrameKind, channel: Channel, sequence: u32, data: &[u8]) -> Frame {
        Frame {
            kind,
            channel: channel as u8,
            session: self.session,
            sequence,
            payload: data.to_vec(),
        }
    }
}
