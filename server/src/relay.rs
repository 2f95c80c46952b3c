//! Server-side relay: fans actor state out to every other peer and keeps
//! the last-known state of each one for late joiners.
//!
//! The relay never touches the socket. Every operation queues [`Outgoing`]
//! messages that the network loop sends and flushes once per tick, which
//! keeps the fan-out rules testable without a transport.

use crate::error::ServerError;
use log::{debug, info};
use shared::packet::{
    decode_client_packet, ClientInfo, ClientPart, Envelope, FullState, HostName, Message, Ping,
    PingEcho, RelayedFullState,
};
use shared::ping::PingEstimator;
use shared::transport::Channel;
use shared::{ClientId, ClientRegistry};

/// What the server knows about one connected peer
#[derive(Debug)]
pub struct ClientRecord {
    /// Transport connection id, also the actor id on the wire
    pub client_id: ClientId,
    /// Display name; the peer address until the client announces a name
    pub host: HostName,
    /// Last known state in wire form
    pub state: FullState,
    /// Whether `state` has ever been set by a full state
    pub has_full_state: bool,
    /// Ping schedule and last measured RTT
    pub ping: PingEstimator,
}

impl ClientRecord {
    /// Record for a fresh connection, named `host` until it announces itself
    pub fn new(client_id: ClientId, host: &str) -> Self {
        Self {
            client_id,
            host: HostName::new(host),
            state: FullState::default(),
            has_full_state: false,
            ping: PingEstimator::new(),
        }
    }

    fn relayed_state(&self) -> RelayedFullState {
        RelayedFullState {
            ping: self.ping.wire_ping(),
            state: self.state,
        }
    }
}

/// A server-shaped packet addressed to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub peer: ClientId,
    pub channel: Channel,
    pub data: Vec<u8>,
}

/// Relay state and its queue of messages for the wire
///
/// The relay never touches a socket. Each event handler updates the client
/// records and queues [`Outgoing`] packets, which the network loop drains
/// and sends once per tick. That keeps every rule here testable without a
/// network.
#[derive(Debug, Default)]
pub struct Relay {
    clients: ClientRegistry<ClientRecord>,
    outgoing: Vec<Outgoing>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Looks up the record for a connected client
    pub fn client(&self, id: ClientId) -> Option<&ClientRecord> {
        self.clients.find_by_id(id)
    }

    /// Hands over everything queued since the last call.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    /// Registers a new peer and queues its bootstrap.
    ///
    /// Existing peers learn about the newcomer. The newcomer learns every
    /// existing peer followed by its cached full state, all on the control
    /// channel so each state lands after the matching info. The first ping
    /// closes the sequence.
    pub fn on_connect(&mut self, id: ClientId, host: &str, now_ms: u32) -> Result<(), ServerError> {
        self.clients.new_client(id, ClientRecord::new(id, host))?;
        info!("Client {} joined from {}", id, host);

        let announce = Envelope::new(ClientInfo::new(host)).encode_as_server(id)?;
        self.broadcast(id, Channel::Control, &announce);

        for (other_id, other) in self.clients.iter() {
            if other_id == id {
                continue;
            }

            let info = Envelope::new(ClientInfo { host: other.host }).encode_as_server(other_id)?;
            self.outgoing.push(Outgoing {
                peer: id,
                channel: Channel::Control,
                data: info,
            });

            if other.has_full_state {
                let state = Envelope::new(other.relayed_state()).encode_as_server(other_id)?;
                self.outgoing.push(Outgoing {
                    peer: id,
                    channel: Channel::Control,
                    data: state,
                });
            }
        }

        if let Some(record) = self.clients.find_by_id_mut(id) {
            if let Some(timestamp) = record.ping.poll(now_ms) {
                let ping = Envelope::new(Ping { timestamp }).encode_as_server(id)?;
                self.outgoing.push(Outgoing {
                    peer: id,
                    channel: Channel::Control,
                    data: ping,
                });
            }
        }
        Ok(())
    }

    /// Removes the peer and tells everyone left.
    pub fn on_disconnect(&mut self, id: ClientId) -> Result<(), ServerError> {
        if self.clients.free_client(id).is_none() {
            debug!("Disconnect for unknown client {}", id);
            return Ok(());
        }
        info!("Client {} left", id);

        let part = Envelope::new(ClientPart).encode_as_server(id)?;
        self.broadcast(id, Channel::Control, &part);
        Ok(())
    }

    /// Handles one client-shaped packet from `id`.
    ///
    /// Malformed packets come back as [`ServerError::Packet`] for the caller
    /// to log; packets from peers without a record are dropped silently.
    pub fn on_packet(
        &mut self,
        id: ClientId,
        channel: Channel,
        bytes: &[u8],
        now_ms: u32,
    ) -> Result<(), ServerError> {
        let message = decode_client_packet(bytes)?;

        let record = match self.clients.find_by_id_mut(id) {
            Some(record) => record,
            None => {
                debug!("Dropping {:?} from unknown client {}", message.kind(), id);
                return Ok(());
            }
        };

        match message {
            Message::ActorState(delta) => {
                record.state.apply_delta(&delta);
                debug!("Relaying delta from {}", id);
                let data = Envelope::new(delta).encode_as_server(id)?;
                self.broadcast(id, channel, &data);
            }
            Message::ActorFullState(full) => {
                record.state = full;
                record.has_full_state = true;
                debug!("Relaying full state from {}", id);
                let data = Envelope::new(record.relayed_state()).encode_as_server(id)?;
                self.broadcast(id, channel, &data);
            }
            Message::Ping(ping) => {
                let echo = Envelope::new(PingEcho::from(ping)).encode_as_server(id)?;
                self.outgoing.push(Outgoing {
                    peer: id,
                    channel: Channel::Control,
                    data: echo,
                });
            }
            Message::PingEcho(echo) => {
                if !record.ping.on_echo(echo.timestamp, now_ms) {
                    debug!("Ignoring stale ping echo from client {}", id);
                }
            }
            Message::ClientInfo(info) => {
                record.host = info.host;
                info!("Client {} is now known as {}", id, info.host);
                let data = Envelope::new(info).encode_as_server(id)?;
                self.broadcast(id, Channel::Control, &data);
            }
            Message::ClientPart(_) => {
                debug!("Ignoring part from client {}; waiting for the disconnect", id);
            }
        }
        Ok(())
    }

    /// Queues a ping to every peer whose ping interval has elapsed.
    ///
    /// Each peer runs its own schedule from the moment it connected, so
    /// peers are not all pinged in the same tick.
    pub fn poll_pings(&mut self, now_ms: u32) -> Result<(), ServerError> {
        for (id, record) in self.clients.iter_mut() {
            if let Some(timestamp) = record.ping.poll(now_ms) {
                self.outgoing.push(Outgoing {
                    peer: id,
                    channel: Channel::Control,
                    data: Envelope::new(Ping { timestamp }).encode_as_server(id)?,
                });
            }
        }
        Ok(())
    }

    fn broadcast(&mut self, from: ClientId, channel: Channel, data: &[u8]) {
        for peer in self.clients.ids() {
            if peer != from {
                self.outgoing.push(Outgoing {
                    peer,
                    channel,
                    data: data.to_vec(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::packet::{decode_server_packet, ServerMessage, StateDelta};
    use shared::{ActorFlags, ActorState, Vec3};

    fn relay_with(ids: &[ClientId]) -> Relay {
        let mut relay = Relay::new();
        for &id in ids {
            relay
                .on_connect(id, &format!("10.0.0.{}:4000", id), 0)
                .unwrap();
        }
        relay.drain_outgoing();
        relay
    }

    fn full_state_packet() -> Vec<u8> {
        Envelope::new(FullState::from_state(&ActorState {
            flags: ActorFlags::FORWARD,
            rotation: 90.0,
            position: Vec3::new(1.0, 0.0, 2.0),
        }))
        .encode_as_client()
        .unwrap()
    }

    fn decode(outgoing: &Outgoing) -> (ClientId, ServerMessage) {
        let packet = decode_server_packet(&outgoing.data).unwrap();
        (packet.client_id, packet.message)
    }

    #[test]
    fn test_full_state_fans_out_to_others_only() {
        let mut relay = relay_with(&[0, 1, 2]);
        relay
            .on_packet(0, Channel::State, &full_state_packet(), 10)
            .unwrap();

        let mut sent = relay.drain_outgoing();
        sent.sort_by_key(|o| o.peer);
        assert_eq!(sent.iter().map(|o| o.peer).collect::<Vec<_>>(), vec![1, 2]);

        for outgoing in &sent {
            assert_eq!(outgoing.channel, Channel::State);
            assert_eq!(outgoing.data.len(), 15);
            match decode(outgoing) {
                (0, Message::ActorFullState(relayed)) => {
                    assert_eq!(relayed.ping, 0);
                    assert_eq!(relayed.state.flags(), ActorFlags::FORWARD);
                    assert_eq!(relayed.state.rotation, 64);
                }
                other => panic!("Unexpected relay {:?}", other),
            }
        }

        let record = relay.client(0).unwrap();
        assert!(record.has_full_state);
        assert_eq!(record.state.rotation, 64);
    }

    #[test]
    fn test_delta_fans_out_and_updates_cache() {
        let mut relay = relay_with(&[0, 1]);
        relay
            .on_packet(0, Channel::State, &full_state_packet(), 0)
            .unwrap();
        relay.drain_outgoing();

        let delta = StateDelta::new(ActorFlags::empty(), 180.0);
        let bytes = Envelope::new(delta).encode_as_client().unwrap();
        relay.on_packet(0, Channel::State, &bytes, 0).unwrap();

        let sent = relay.drain_outgoing();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, 1);
        assert_eq!(sent[0].data.len(), 7);
        assert_eq!(decode(&sent[0]), (0, Message::ActorState(delta)));

        let cached = relay.client(0).unwrap().state;
        assert_eq!(cached.flags(), ActorFlags::empty());
        assert_eq!(cached.rotation, 128);
        // the delta does not carry a position
        assert_eq!(
            cached.position,
            FullState::from_state(&ActorState {
                position: Vec3::new(1.0, 0.0, 2.0),
                ..Default::default()
            })
            .position
        );
    }

    #[test]
    fn test_join_announces_to_existing_peers() {
        let mut relay = relay_with(&[0, 1]);
        relay.on_connect(2, "10.0.0.2:4000", 0).unwrap();

        let sent = relay.drain_outgoing();
        let mut announced: Vec<ClientId> = sent
            .iter()
            .filter(|o| o.peer != 2)
            .map(|o| {
                match decode(o) {
                    (2, Message::ClientInfo(info)) => {
                        assert_eq!(info.host.to_string(), "10.0.0.2:4000")
                    }
                    other => panic!("Unexpected announce {:?}", other),
                }
                o.peer
            })
            .collect();
        announced.sort();
        assert_eq!(announced, vec![0, 1]);
    }

    #[test]
    fn test_late_joiner_bootstrap() {
        let mut relay = relay_with(&[0]);
        relay
            .on_packet(0, Channel::State, &full_state_packet(), 0)
            .unwrap();
        relay.drain_outgoing();

        relay.on_connect(1, "10.0.0.1:4000", 500).unwrap();
        let to_newcomer: Vec<Outgoing> = relay
            .drain_outgoing()
            .into_iter()
            .filter(|o| o.peer == 1)
            .collect();

        assert_eq!(to_newcomer.len(), 3);
        assert!(to_newcomer.iter().all(|o| o.channel == Channel::Control));
        assert!(matches!(decode(&to_newcomer[0]), (0, Message::ClientInfo(_))));
        match decode(&to_newcomer[1]) {
            (0, Message::ActorFullState(relayed)) => {
                assert_eq!(relayed.state.flags(), ActorFlags::FORWARD)
            }
            other => panic!("Expected cached full state, got {:?}", other),
        }
        assert_eq!(
            decode(&to_newcomer[2]),
            (1, Message::Ping(Ping { timestamp: 500 }))
        );
    }

    #[test]
    fn test_late_joiner_skips_peers_without_full_state() {
        let mut relay = relay_with(&[0]);
        relay.on_connect(1, "10.0.0.1:4000", 0).unwrap();

        let to_newcomer: Vec<ServerMessage> = relay
            .drain_outgoing()
            .iter()
            .filter(|o| o.peer == 1)
            .map(|o| decode(o).1)
            .collect();
        assert_eq!(to_newcomer.len(), 2);
        assert!(matches!(to_newcomer[0], Message::ClientInfo(_)));
        assert!(matches!(to_newcomer[1], Message::Ping(_)));
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let mut relay = relay_with(&[4]);
        assert!(matches!(
            relay.on_connect(4, "x", 0),
            Err(ServerError::Registry(_))
        ));
    }

    #[test]
    fn test_part_broadcast_to_remaining() {
        let mut relay = relay_with(&[0, 1, 2]);
        relay.on_disconnect(1).unwrap();

        let mut sent = relay.drain_outgoing();
        sent.sort_by_key(|o| o.peer);
        assert_eq!(sent.len(), 2);
        for (outgoing, expected_peer) in sent.iter().zip([0, 2]) {
            assert_eq!(outgoing.peer, expected_peer);
            assert_eq!(decode(outgoing), (1, Message::ClientPart(ClientPart)));
        }
        assert!(relay.client(1).is_none());
        assert_eq!(relay.client_count(), 2);
    }

    #[test]
    fn test_disconnect_of_unknown_client_is_quiet() {
        let mut relay = relay_with(&[0]);
        relay.on_disconnect(9).unwrap();
        assert!(relay.drain_outgoing().is_empty());
    }

    #[test]
    fn test_unsolicited_ping_echoed_to_sender_only() {
        let mut relay = relay_with(&[0, 1]);
        let bytes = Envelope::new(Ping { timestamp: 4242 })
            .encode_as_client()
            .unwrap();
        relay.on_packet(1, Channel::Control, &bytes, 100).unwrap();

        let sent = relay.drain_outgoing();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, 1);
        assert_eq!(
            decode(&sent[0]),
            (1, Message::PingEcho(PingEcho { timestamp: 4242 }))
        );
    }

    #[test]
    fn test_ping_echo_sets_ping_in_relayed_state() {
        let mut relay = Relay::new();
        relay.on_connect(0, "a", 1_000).unwrap();
        relay.on_connect(1, "b", 1_000).unwrap();
        relay.drain_outgoing();

        // client 0 echoes the ping sent at connect time
        let echo = Envelope::new(PingEcho { timestamp: 1_000 })
            .encode_as_client()
            .unwrap();
        relay.on_packet(0, Channel::Control, &echo, 1_080).unwrap();
        assert!(relay.drain_outgoing().is_empty());
        assert_eq!(relay.client(0).unwrap().ping.rtt_ms(), Some(80));

        relay
            .on_packet(0, Channel::State, &full_state_packet(), 1_100)
            .unwrap();
        let sent = relay.drain_outgoing();
        match decode(&sent[0]) {
            (0, Message::ActorFullState(relayed)) => assert_eq!(relayed.ping, 80),
            other => panic!("Unexpected relay {:?}", other),
        }
    }

    #[test]
    fn test_ping_matching_outstanding_timestamp_still_echoed() {
        let mut relay = Relay::new();
        relay.on_connect(0, "a", 1_000).unwrap();
        relay.drain_outgoing();

        // the client's clock happens to read what ours read at connect
        let ping = Envelope::new(Ping { timestamp: 1_000 })
            .encode_as_client()
            .unwrap();
        relay.on_packet(0, Channel::Control, &ping, 1_010).unwrap();

        let sent = relay.drain_outgoing();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            decode(&sent[0]),
            (0, Message::PingEcho(PingEcho { timestamp: 1_000 }))
        );
        assert_eq!(relay.client(0).unwrap().ping.rtt_ms(), None);
    }

    #[test]
    fn test_stale_echo_ignored() {
        let mut relay = Relay::new();
        relay.on_connect(0, "a", 1_000).unwrap();
        relay.drain_outgoing();

        let echo = Envelope::new(PingEcho { timestamp: 999 })
            .encode_as_client()
            .unwrap();
        relay.on_packet(0, Channel::Control, &echo, 1_050).unwrap();

        assert!(relay.drain_outgoing().is_empty());
        assert_eq!(relay.client(0).unwrap().ping.rtt_ms(), None);
    }

    #[test]
    fn test_poll_pings_on_interval() {
        let mut relay = relay_with(&[0, 1]);
        relay.poll_pings(5_000).unwrap();
        assert!(relay.drain_outgoing().is_empty());

        relay.poll_pings(shared::ping::PING_INTERVAL_MS).unwrap();
        let sent = relay.drain_outgoing();
        assert_eq!(sent.len(), 2);
        for outgoing in &sent {
            assert_eq!(decode(outgoing).0, outgoing.peer);
        }
    }

    #[test]
    fn test_unknown_client_ignored() {
        let mut relay = relay_with(&[0]);
        relay
            .on_packet(9, Channel::State, &full_state_packet(), 0)
            .unwrap();
        assert!(relay.drain_outgoing().is_empty());
        assert!(relay.client(9).is_none());
    }

    #[test]
    fn test_malformed_packet_is_an_error() {
        let mut relay = relay_with(&[0, 1]);
        let result = relay.on_packet(0, Channel::State, &[4, 1, 2], 0);
        assert!(matches!(result, Err(ServerError::Packet(_))));
        assert!(relay.drain_outgoing().is_empty());
    }

    #[test]
    fn test_client_info_renames_and_rebroadcasts() {
        let mut relay = relay_with(&[0, 1]);
        let bytes = Envelope::new(ClientInfo::new("alice"))
            .encode_as_client()
            .unwrap();
        relay.on_packet(0, Channel::Control, &bytes, 0).unwrap();

        assert_eq!(relay.client(0).unwrap().host.to_string(), "alice");
        let sent = relay.drain_outgoing();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, 1);
        assert_eq!(
            decode(&sent[0]),
            (0, Message::ClientInfo(ClientInfo::new("alice")))
        );
    }

    #[test]
    fn test_client_part_packet_ignored() {
        let mut relay = relay_with(&[0, 1]);
        let bytes = Envelope::new(ClientPart).encode_as_client().unwrap();
        relay.on_packet(0, Channel::Control, &bytes, 0).unwrap();
        assert!(relay.drain_outgoing().is_empty());
        assert_eq!(relay.client_count(), 2);
    }
}
