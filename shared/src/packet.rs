//! Wire protocol: fixed-size packet layouts and their two header shapes.
//!
//! Clients prefix every payload with a one-byte kind. The server prefixes
//! the kind and the id of the actor the payload describes, because a
//! broadcast is about a third party rather than the recipient. Every kind
//! has exactly one length per header shape; anything else is malformed.
//!
//! All multi-byte integers are big-endian. The byte order is fixed by
//! [`wire_options`] so the codec is the only place that knows about it.

use crate::bams::{decode_angle, decode_vector, encode_angle, encode_vector, WireVector3};
use crate::error::PacketError;
use crate::{ActorFlags, ActorState, ClientId};
use bincode::Options;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kind byte only
pub const CLIENT_HEADER_SIZE: usize = 1;
/// Kind byte plus the big-endian id of the actor described
pub const SERVER_HEADER_SIZE: usize = 5;
pub const HOST_NAME_CAPACITY: usize = 45;

/// Fixed-width, big-endian, no trailing bytes.
pub fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
}

/// The first byte of every packet
///
/// The kind alone fixes the payload layout. Together with the header shape
/// it also fixes the exact packet length, see [`PacketKind::wire_len`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    ClientInfo = 0,
    ClientPart = 1,
    ActorState = 2,
    Ping = 3,
    ActorFullState = 4,
    PingEcho = 5,
}

/// Which of the two headers precedes the payload
///
/// Clients send the client shape; the server always answers and relays in
/// the server shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    Client,
    Server,
}

impl HeaderShape {
    /// Header length in bytes
    pub fn header_size(self) -> usize {
        match self {
            HeaderShape::Client => CLIENT_HEADER_SIZE,
            HeaderShape::Server => SERVER_HEADER_SIZE,
        }
    }
}

impl PacketKind {
    /// Maps a kind byte back to its kind, or None for an unknown byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PacketKind::ClientInfo),
            1 => Some(PacketKind::ClientPart),
            2 => Some(PacketKind::ActorState),
            3 => Some(PacketKind::Ping),
            4 => Some(PacketKind::ActorFullState),
            5 => Some(PacketKind::PingEcho),
            _ => None,
        }
    }

    /// Exact length of a packet of this kind, header included.
    pub fn wire_len(self, shape: HeaderShape) -> usize {
        let payload = match (self, shape) {
            (PacketKind::ClientInfo, _) => ClientInfo::SIZE,
            (PacketKind::ClientPart, _) => ClientPart::SIZE,
            (PacketKind::Ping, _) => Ping::SIZE,
            (PacketKind::PingEcho, _) => PingEcho::SIZE,
            (PacketKind::ActorState, _) => StateDelta::SIZE,
            (PacketKind::ActorFullState, HeaderShape::Client) => FullState::SIZE,
            (PacketKind::ActorFullState, HeaderShape::Server) => RelayedFullState::SIZE,
        };
        shape.header_size() + payload
    }
}

/// A message body with a fixed kind and encoded size.
pub trait Payload: Serialize + DeserializeOwned {
    const KIND: PacketKind;
    const SIZE: usize;
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientHeader {
    kind: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerHeader {
    kind: u8,
    client_id: u32,
}

/// NUL-padded display name. Longer names are cut silently.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HostName([u8; HOST_NAME_CAPACITY]);

impl HostName {
    /// Copies `name` into the fixed buffer
    ///
    /// Anything past the capacity is dropped, backing off to the previous
    /// UTF-8 character boundary so the stored prefix always decodes.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(HOST_NAME_CAPACITY);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; HOST_NAME_CAPACITY];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        HostName(bytes)
    }

    fn text_len(&self) -> usize {
        self.0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(HOST_NAME_CAPACITY)
    }
}

impl Default for HostName {
    fn default() -> Self {
        HostName([0u8; HOST_NAME_CAPACITY])
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0[..self.text_len()]))
    }
}

impl fmt::Debug for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName({:?})", self.to_string())
    }
}

// Serialized as a fixed tuple so no length prefix reaches the wire.
impl Serialize for HostName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(HOST_NAME_CAPACITY)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for HostName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HostNameVisitor;

        impl<'de> Visitor<'de> for HostNameVisitor {
            type Value = HostName;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} host name bytes", HOST_NAME_CAPACITY)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<HostName, A::Error> {
                let mut bytes = [0u8; HOST_NAME_CAPACITY];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(HostName(bytes))
            }
        }

        deserializer.deserialize_tuple(HOST_NAME_CAPACITY, HostNameVisitor)
    }
}

/// Join announcement; the id lives in the server header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub host: HostName,
}

impl ClientInfo {
    /// Announcement for `host`, truncated to fit [`HOST_NAME_CAPACITY`]
    pub fn new(host: &str) -> Self {
        Self {
            host: HostName::new(host),
        }
    }
}

/// Leave announcement; the id lives in the server header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientPart;

/// A round-trip ping carrying the sender's own clock.
///
/// Both sides ping. The receiver never interprets the timestamp; it only
/// hands it back unchanged as a [`PingEcho`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: u32,
}

/// The answer to a [`Ping`], carrying the ping's timestamp untouched.
///
/// A separate kind keeps echoes apart from fresh pings, since the two
/// clocks are unrelated and a timestamp alone says nothing about origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PingEcho {
    pub timestamp: u32,
}

impl From<Ping> for PingEcho {
    fn from(ping: Ping) -> Self {
        Self {
            timestamp: ping.timestamp,
        }
    }
}

/// Flags and rotation only; position is dead reckoned by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateDelta {
    pub flags: u8,
    pub rotation: u8,
}

impl StateDelta {
    /// Builds a delta from live state, quantizing the rotation to a BAM
    pub fn new(flags: ActorFlags, rotation_degrees: f32) -> Self {
        Self {
            flags: flags.bits(),
            rotation: encode_angle(rotation_degrees),
        }
    }

    /// Decoded flags; unknown bits are dropped
    pub fn flags(&self) -> ActorFlags {
        ActorFlags::from_bits_truncate(self.flags)
    }

    pub fn rotation_degrees(&self) -> f32 {
        decode_angle(self.rotation)
    }
}

/// Complete actor snapshot as a client sends it
///
/// Position is carried as three truncated floats, so a round trip keeps
/// about three significant decimal digits. This is also the shape the
/// server caches for late joiners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FullState {
    pub flags: u8,
    pub rotation: u8,
    pub position: WireVector3,
}

impl FullState {
    /// Quantizes a live actor state for the wire
    pub fn from_state(state: &ActorState) -> Self {
        Self {
            flags: state.flags.bits(),
            rotation: encode_angle(state.rotation),
            position: encode_vector(&state.position),
        }
    }

    /// Expands the wire values back into a live actor state
    pub fn to_state(&self) -> ActorState {
        ActorState {
            flags: self.flags(),
            rotation: decode_angle(self.rotation),
            position: decode_vector(&self.position),
        }
    }

    pub fn flags(&self) -> ActorFlags {
        ActorFlags::from_bits_truncate(self.flags)
    }

    /// Folds a delta into this snapshot, leaving the position as is.
    pub fn apply_delta(&mut self, delta: &StateDelta) {
        self.flags = delta.flags;
        self.rotation = delta.rotation;
    }
}

/// Full state as the server relays it, carrying the sender's measured RTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayedFullState {
    pub ping: u16,
    pub state: FullState,
}

impl Payload for ClientInfo {
    const KIND: PacketKind = PacketKind::ClientInfo;
    const SIZE: usize = HOST_NAME_CAPACITY;
}

impl Payload for ClientPart {
    const KIND: PacketKind = PacketKind::ClientPart;
    const SIZE: usize = 0;
}

impl Payload for Ping {
    const KIND: PacketKind = PacketKind::Ping;
    const SIZE: usize = 4;
}

impl Payload for PingEcho {
    const KIND: PacketKind = PacketKind::PingEcho;
    const SIZE: usize = 4;
}

impl Payload for StateDelta {
    const KIND: PacketKind = PacketKind::ActorState;
    const SIZE: usize = 2;
}

impl Payload for FullState {
    const KIND: PacketKind = PacketKind::ActorFullState;
    const SIZE: usize = 8;
}

impl Payload for RelayedFullState {
    const KIND: PacketKind = PacketKind::ActorFullState;
    const SIZE: usize = 10;
}

/// A payload on its way to the wire. The header shape is picked at encode
/// time, so one payload type serves both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope<P> {
    pub payload: P,
}

impl<P: Payload> Envelope<P> {
    pub fn new(payload: P) -> Self {
        Self { payload }
    }

    /// Encodes with the one-byte client header
    ///
    /// The result is always exactly the kind's client-shape length. Errors
    /// only come from the serializer and do not happen for our fixed
    /// layouts in practice.
    pub fn encode_as_client(&self) -> Result<Vec<u8>, PacketError> {
        let header = ClientHeader {
            kind: P::KIND as u8,
        };
        let bytes = wire_options().serialize(&(header, &self.payload))?;
        debug_assert_eq!(bytes.len(), CLIENT_HEADER_SIZE + P::SIZE);
        Ok(bytes)
    }

    /// Encodes with the server header naming `client_id`
    ///
    /// `client_id` is the actor the payload is about, which for a relayed
    /// state is the sender rather than the recipient.
    pub fn encode_as_server(&self, client_id: ClientId) -> Result<Vec<u8>, PacketError> {
        let header = ServerHeader {
            kind: P::KIND as u8,
            client_id,
        };
        let bytes = wire_options().serialize(&(header, &self.payload))?;
        debug_assert_eq!(bytes.len(), SERVER_HEADER_SIZE + P::SIZE);
        Ok(bytes)
    }
}

/// A decoded message; `F` is the full-state shape of the direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message<F> {
    ClientInfo(ClientInfo),
    ClientPart(ClientPart),
    Ping(Ping),
    PingEcho(PingEcho),
    ActorState(StateDelta),
    ActorFullState(F),
}

/// What the server receives from a client.
pub type ClientMessage = Message<FullState>;

/// What a client receives from the server.
pub type ServerMessage = Message<RelayedFullState>;

/// A decoded server-shaped packet: which actor it is about, and what
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerPacket {
    pub client_id: ClientId,
    pub message: ServerMessage,
}

impl<F> Message<F> {
    /// The kind byte this message encodes with
    pub fn kind(&self) -> PacketKind {
        match self {
            Message::ClientInfo(_) => PacketKind::ClientInfo,
            Message::ClientPart(_) => PacketKind::ClientPart,
            Message::Ping(_) => PacketKind::Ping,
            Message::PingEcho(_) => PacketKind::PingEcho,
            Message::ActorState(_) => PacketKind::ActorState,
            Message::ActorFullState(_) => PacketKind::ActorFullState,
        }
    }
}

fn check_framing(bytes: &[u8], shape: HeaderShape) -> Result<PacketKind, PacketError> {
    if bytes.len() < shape.header_size() {
        return Err(PacketError::Malformed(format!(
            "{} bytes is shorter than the {} byte header",
            bytes.len(),
            shape.header_size()
        )));
    }

    let kind = PacketKind::from_byte(bytes[0])
        .ok_or_else(|| PacketError::Malformed(format!("unknown packet kind {}", bytes[0])))?;

    let expected = kind.wire_len(shape);
    if bytes.len() != expected {
        return Err(PacketError::Malformed(format!(
            "{:?} must be {} bytes, got {}",
            kind,
            expected,
            bytes.len()
        )));
    }

    Ok(kind)
}

fn decode_payload<P: Payload>(body: &[u8]) -> Result<P, PacketError> {
    wire_options()
        .deserialize(body)
        .map_err(|e| PacketError::Malformed(e.to_string()))
}

fn decode_body<F: Payload>(kind: PacketKind, body: &[u8]) -> Result<Message<F>, PacketError> {
    Ok(match kind {
        PacketKind::ClientInfo => Message::ClientInfo(decode_payload(body)?),
        PacketKind::ClientPart => Message::ClientPart(decode_payload(body)?),
        PacketKind::Ping => Message::Ping(decode_payload(body)?),
        PacketKind::PingEcho => Message::PingEcho(decode_payload(body)?),
        PacketKind::ActorState => Message::ActorState(decode_payload(body)?),
        PacketKind::ActorFullState => Message::ActorFullState(decode_payload(body)?),
    })
}

/// Decodes a client-shaped packet as received by the server.
pub fn decode_client_packet(bytes: &[u8]) -> Result<ClientMessage, PacketError> {
    let kind = check_framing(bytes, HeaderShape::Client)?;
    decode_body(kind, &bytes[CLIENT_HEADER_SIZE..])
}

/// Decodes a server-shaped packet as received by a client.
pub fn decode_server_packet(bytes: &[u8]) -> Result<ServerPacket, PacketError> {
    let kind = check_framing(bytes, HeaderShape::Server)?;
    let header: ServerHeader = wire_options()
        .deserialize(&bytes[..SERVER_HEADER_SIZE])
        .map_err(|e| PacketError::Malformed(e.to_string()))?;

    Ok(ServerPacket {
        client_id: header.client_id,
        message: decode_body(kind, &bytes[SERVER_HEADER_SIZE..])?,
    })
}
