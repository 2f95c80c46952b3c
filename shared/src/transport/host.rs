use super::frame::{Frame, FrameKind};
use super::peer::{Peer, PeerState, RESEND_AFTER};
use super::{Channel, HostEvent, PeerId, PEER_TIMEOUT};
use crate::error::TransportError;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{ToSocketAddrs, UdpSocket};

const RECV_BUFFER_SIZE: usize = 2048;
const CONNECT_RETRY: Duration = Duration::from_millis(250);

/// One UDP socket and the peers reachable through it.
pub struct Host {
    socket: UdpSocket,
    max_peers: usize,
    /// Accepts incoming connects and confirms remote disconnects
    listening: bool,
    peers: HashMap<PeerId, Peer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    events: VecDeque<HostEvent>,
}

impl Host {
    /// Binds a host that accepts up to `max_peers` incoming connections.
    pub async fn bind(addr: impl ToSocketAddrs, max_peers: usize) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Transport listening on {}", socket.local_addr()?);
        Ok(Self::from_socket(socket, max_peers, true))
    }

    /// Binds an ephemeral host for a single outgoing connection.
    pub async fn outbound() -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        Ok(Self::from_socket(socket, 1, false))
    }

    fn from_socket(socket: UdpSocket, max_peers: usize, listening: bool) -> Self {
        Self {
            socket,
            max_peers,
            listening,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    /// Address the socket is bound to; the real port when bound to port 0
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of established connections.
    pub fn peer_count(&self) -> usize {
        self.peers.values().filter(|peer| peer.is_connected()).count()
    }

    /// Remote address of `peer`, connected or still handshaking
    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer).map(|peer| peer.addr)
    }

    /// Opens a connection and waits for the remote host to accept it.
    ///
    /// The connect request is repeated until accepted, rejected, or
    /// `timeout` runs out. Datagrams from other addresses received in the
    /// meantime are processed normally.
    pub async fn connect(
        &mut self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<PeerId, TransportError> {
        let id = self.free_slot().ok_or(TransportError::NoPeerSlots)?;
        let session = rand::random::<u32>();
        self.insert_peer(Peer::new(id, addr, session, PeerState::Connecting));
        let hello = Frame::control(FrameKind::Connect, session, 0).encode()?;

        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        loop {
            let now = Instant::now();
            if now >= deadline {
                self.remove_peer(id);
                return Err(TransportError::HandshakeTimeout(addr));
            }
            self.send_raw(&hello, addr).await;

            let retry_at = now + CONNECT_RETRY.min(deadline - now);
            loop {
                let remaining = retry_at.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                    Err(_) => break,
                    Ok(Ok((len, from))) => self.process_datagram(from, &buffer[..len]).await?,
                    Ok(Err(e)) if is_transient(&e) => debug!("Ignoring socket error: {}", e),
                    Ok(Err(e)) => {
                        self.remove_peer(id);
                        return Err(e.into());
                    }
                }

                match self.peers.get(&id) {
                    Some(peer) if peer.is_connected() => {
                        info!("Connected to {} as peer {}", addr, id);
                        return Ok(id);
                    }
                    Some(_) => {}
                    None => return Err(TransportError::Rejected(addr)),
                }
            }
        }
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// A zero timeout drains what is already on the socket and returns
    /// `Ok(None)` once nothing is left.
    pub async fn service(&mut self, timeout: Duration) -> Result<Option<HostEvent>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        // lets the runtime refresh socket readiness before a zero-timeout poll
        tokio::task::yield_now().await;

        loop {
            self.expire_silent_peers();
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                Err(_) => return Ok(None),
                Ok(Ok((len, from))) => self.process_datagram(from, &buffer[..len]).await?,
                Ok(Err(e)) if is_transient(&e) => debug!("Ignoring socket error: {}", e),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Queues `data` for `peer`. Nothing is sent before [`Host::flush`].
    pub fn send(&mut self, peer: PeerId, channel: Channel, data: &[u8]) -> Result<(), TransportError> {
        match self.peers.get_mut(&peer) {
            Some(target) if target.is_connected() => target.queue(channel, data),
            _ => Err(TransportError::UnknownPeer(peer)),
        }
    }

    /// Sends everything queued and resends reliable data still unacked.
    pub async fn flush(&mut self) {
        let now = Instant::now();
        let mut outgoing = Vec::new();
        for peer in self.peers.values_mut() {
            let addr = peer.addr;
            outgoing.extend(
                peer.take_datagrams(now)
                    .into_iter()
                    .map(|datagram| (addr, datagram)),
            );
        }

        for (addr, datagram) in outgoing {
            self.send_raw(&datagram, addr).await;
        }
    }

    /// Drops `peer` immediately. No event is raised for it.
    pub async fn disconnect(&mut self, peer: PeerId) -> Result<(), TransportError> {
        let removed = self
            .remove_peer(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let bye = Frame::control(FrameKind::Disconnect, removed.session, 0).encode()?;
        self.send_raw(&bye, removed.addr).await;
        info!("Disconnected peer {}", peer);
        Ok(())
    }

    /// Delivers queued reliable data, then tears the connection down.
    ///
    /// Waits at most `drain` in total. Anything else that arrives from the
    /// peer during the wait is discarded.
    pub async fn disconnect_gracefully(
        &mut self,
        peer: PeerId,
        drain: Duration,
    ) -> Result<(), TransportError> {
        if !self.peers.contains_key(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }

        let deadline = Instant::now() + drain;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        while !self.is_drained(peer) && Instant::now() < deadline {
            self.flush().await;
            let until = deadline.min(Instant::now() + RESEND_AFTER);
            if self.discard_until(peer, until, false, &mut buffer).await? {
                self.remove_peer(peer);
                info!("Peer {} left while draining", peer);
                return Ok(());
            }
        }

        if let Some(target) = self.peers.get(&peer) {
            let bye = Frame::control(FrameKind::Disconnect, target.session, 0).encode()?;
            let addr = target.addr;
            self.send_raw(&bye, addr).await;
        }

        if !self.listening {
            self.discard_until(peer, deadline, true, &mut buffer).await?;
        }
        self.remove_peer(peer);
        info!("Disconnected peer {}", peer);
        Ok(())
    }

    /// Reads from the socket until `until`, keeping only acks and a
    /// disconnect from `peer`. Returns true once the peer disconnected.
    async fn discard_until(
        &mut self,
        peer: PeerId,
        until: Instant,
        wait_for_reply: bool,
        buffer: &mut [u8],
    ) -> Result<bool, TransportError> {
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            let (len, from) =
                match tokio::time::timeout(remaining, self.socket.recv_from(buffer)).await {
                    Err(_) => return Ok(false),
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) if is_transient(&e) => continue,
                    Ok(Err(e)) => return Err(e.into()),
                };

            let target = match self.peers.get_mut(&peer) {
                Some(target) => target,
                None => return Ok(false),
            };
            let frame = match Frame::decode(&buffer[..len]) {
                Some(frame) if from == target.addr && frame.session == target.session => frame,
                _ => continue,
            };

            match frame.kind {
                FrameKind::Ack => {
                    target.on_ack(frame.sequence);
                    if !wait_for_reply && target.is_drained() {
                        return Ok(false);
                    }
                }
                FrameKind::Disconnect => return Ok(true),
                kind => debug!("Discarding {:?} from peer {} while disconnecting", kind, peer),
            }
        }
    }

    async fn process_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        let frame = match Frame::decode(bytes) {
            Some(frame) => frame,
            None => {
                debug!("Dropping {} stray bytes from {}", bytes.len(), from);
                return Ok(());
            }
        };

        let id = match self.by_addr.get(&from) {
            Some(&id) => id,
            None => return self.handle_stranger(from, frame).await,
        };

        let peer = match self.peers.get_mut(&id) {
            Some(peer) => peer,
            None => return Ok(()),
        };

        if frame.session != peer.session {
            if frame.kind == FrameKind::Connect && self.listening {
                // remote end restarted on the same address
                self.drop_peer(id);
                return self.handle_stranger(from, frame).await;
            }
            debug!("Dropping {:?} from stale session at {}", frame.kind, from);
            return Ok(());
        }
        peer.last_heard = Instant::now();

        match frame.kind {
            FrameKind::Connect => {
                // our accept got lost
                let accept = Frame::control(FrameKind::Accept, frame.session, 0).encode()?;
                self.send_raw(&accept, from).await;
            }
            FrameKind::Accept => self.mark_connected(id),
            FrameKind::Ack => peer.on_ack(frame.sequence),
            FrameKind::Reliable | FrameKind::Unreliable => {
                let channel = match Channel::from_byte(frame.channel) {
                    Some(channel) => channel,
                    None => {
                        warn!("Dropping frame on unknown channel {} from {}", frame.channel, from);
                        return Ok(());
                    }
                };

                // data before the accept means the accept was lost
                self.mark_connected(id);

                if frame.kind == FrameKind::Reliable {
                    let delivered = match self.peers.get_mut(&id) {
                        Some(peer) => peer.on_reliable(frame.sequence, channel, frame.payload)?,
                        None => Vec::new(),
                    };
                    for (channel, data) in delivered {
                        self.events.push_back(HostEvent::Receive {
                            peer: id,
                            channel,
                            data,
                        });
                    }
                } else {
                    self.events.push_back(HostEvent::Receive {
                        peer: id,
                        channel,
                        data: frame.payload,
                    });
                }
            }
            FrameKind::Disconnect => {
                if self.listening {
                    let reply = Frame::control(FrameKind::Disconnect, frame.session, 0).encode()?;
                    self.send_raw(&reply, from).await;
                }
                self.drop_peer(id);
            }
        }
        Ok(())
    }

    async fn handle_stranger(&mut self, from: SocketAddr, frame: Frame) -> Result<(), TransportError> {
        if frame.kind != FrameKind::Connect || !self.listening {
            debug!("Ignoring {:?} from unknown address {}", frame.kind, from);
            return Ok(());
        }

        match self.free_slot() {
            Some(id) => {
                self.insert_peer(Peer::new(id, from, frame.session, PeerState::Connected));
                let accept = Frame::control(FrameKind::Accept, frame.session, 0).encode()?;
                self.send_raw(&accept, from).await;
                self.events
                    .push_back(HostEvent::Connect { peer: id, addr: from });
            }
            None => {
                warn!("Rejecting {}: all {} peer slots in use", from, self.max_peers);
                let reject = Frame::control(FrameKind::Disconnect, frame.session, 0).encode()?;
                self.send_raw(&reject, from).await;
            }
        }
        Ok(())
    }

    async fn send_raw(&self, datagram: &[u8], addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(datagram, addr).await {
            warn!("Failed to send to {}: {}", addr, e);
        }
    }

    fn free_slot(&self) -> Option<PeerId> {
        (0..self.max_peers as PeerId).find(|id| !self.peers.contains_key(id))
    }

    fn insert_peer(&mut self, peer: Peer) {
        self.by_addr.insert(peer.addr, peer.id);
        self.peers.insert(peer.id, peer);
    }

    fn remove_peer(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    /// Removes a peer the remote side lost, raising a disconnect event if
    /// it ever got connected.
    fn drop_peer(&mut self, id: PeerId) {
        if let Some(peer) = self.remove_peer(id) {
            if peer.is_connected() {
                self.events.push_back(HostEvent::Disconnect { peer: id });
            }
        }
    }

    fn mark_connected(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            if peer.state == PeerState::Connecting {
                peer.state = PeerState::Connected;
                self.events.push_back(HostEvent::Connect {
                    peer: id,
                    addr: peer.addr,
                });
            }
        }
    }

    fn is_drained(&self, peer: PeerId) -> bool {
        self.peers.get(&peer).map_or(true, Peer::is_drained)
    }

    fn expire_silent_peers(&mut self) {
        let silent: Vec<PeerId> = self
            .peers
            .values()
            .filter(|peer| peer.last_heard.elapsed() > PEER_TIMEOUT)
            .map(|peer| peer.id)
            .collect();

        for id in silent {
            info!("Peer {} timed out", id);
            self.drop_peer(id);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CONNECT_TIMEOUT, DISCONNECT_DRAIN};

    async fn next_event(host: &mut Host) -> HostEvent {
        for _ in 0..20 {
            if let Some(event) = host.service(Duration::from_millis(100)).await.unwrap() {
                return event;
            }
        }
        panic!("No event within two seconds");
    }

    async fn connect(server: &mut Host) -> (Host, PeerId) {
        let addr = server.local_addr().unwrap();
        let mut client = Host::outbound().await.unwrap();
        let (connected, event) = tokio::join!(
            client.connect(addr, CONNECT_TIMEOUT),
            next_event(server)
        );
        connected.unwrap();

        let peer = match event {
            HostEvent::Connect { peer, .. } => peer,
            other => panic!("Expected connect, got {:?}", other),
        };

        // connect() leaves its own event behind
        assert!(matches!(
            client.service(Duration::ZERO).await.unwrap(),
            Some(HostEvent::Connect { .. })
        ));
        (client, peer)
    }

    #[tokio::test]
    async fn test_handshake() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        let (client, peer) = connect(&mut server).await;

        assert_eq!(peer, 0);
        assert_eq!(server.peer_count(), 1);
        assert_eq!(client.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_reliable_ordered_delivery() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        let (mut client, _) = connect(&mut server).await;

        for i in 0..10u8 {
            client.send(0, Channel::Control, &[i]).unwrap();
        }
        client.flush().await;

        for i in 0..10u8 {
            match next_event(&mut server).await {
                HostEvent::Receive { channel, data, .. } => {
                    assert_eq!(channel, Channel::Control);
                    assert_eq!(data, vec![i]);
                }
                other => panic!("Unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_unreliable_delivery_both_ways() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        let (mut client, peer) = connect(&mut server).await;

        client.send(0, Channel::State, &[1, 2, 3]).unwrap();
        client.flush().await;
        assert_eq!(
            next_event(&mut server).await,
            HostEvent::Receive {
                peer,
                channel: Channel::State,
                data: vec![1, 2, 3]
            }
        );

        server.send(peer, Channel::State, &[4]).unwrap();
        server.flush().await;
        assert_eq!(
            next_event(&mut client).await,
            HostEvent::Receive {
                peer: 0,
                channel: Channel::State,
                data: vec![4]
            }
        );
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        assert!(matches!(
            server.send(3, Channel::State, &[0]),
            Err(TransportError::UnknownPeer(3))
        ));
    }

    #[tokio::test]
    async fn test_peer_ids_are_reused() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        let (mut first, first_id) = connect(&mut server).await;
        let (_second, second_id) = connect(&mut server).await;
        assert_eq!((first_id, second_id), (0, 1));

        first.disconnect(0).await.unwrap();
        assert_eq!(
            next_event(&mut server).await,
            HostEvent::Disconnect { peer: 0 }
        );

        let (_third, third_id) = connect(&mut server).await;
        assert_eq!(third_id, 0);
    }

    #[tokio::test]
    async fn test_full_host_rejects() {
        let mut server = Host::bind("127.0.0.1:0", 1).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (_first, _) = connect(&mut server).await;

        let mut late = Host::outbound().await.unwrap();
        let (result, _) = tokio::join!(
            late.connect(addr, Duration::from_secs(2)),
            server.service(Duration::from_millis(500))
        );
        assert!(matches!(result, Err(TransportError::Rejected(_))));
        assert_eq!(server.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        // bound but never serviced
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let mut client = Host::outbound().await.unwrap();
        let result = client.connect(addr, Duration::from_millis(300)).await;
        assert!(matches!(result, Err(TransportError::HandshakeTimeout(_))));
        assert_eq!(client.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_graceful_disconnect_delivers_queued_data() {
        let mut server = Host::bind("127.0.0.1:0", 4).await.unwrap();
        let (mut client, peer) = connect(&mut server).await;

        client.send(0, Channel::Control, b"bye").unwrap();
        let (result, events) = tokio::join!(
            client.disconnect_gracefully(0, DISCONNECT_DRAIN),
            async {
                let mut events = Vec::new();
                loop {
                    let event = next_event(&mut server).await;
                    server.flush().await;
                    let done = matches!(event, HostEvent::Disconnect { .. });
                    events.push(event);
                    if done {
                        return events;
                    }
                }
            }
        );

        result.unwrap();
        assert_eq!(
            events,
            vec![
                HostEvent::Receive {
                    peer,
                    channel: Channel::Control,
                    data: b"bye".to_vec()
                },
                HostEvent::Disconnect { peer },
            ]
        );
        assert_eq!(client.peer_count(), 0);
        assert_eq!(server.peer_count(), 0);
    }
}
