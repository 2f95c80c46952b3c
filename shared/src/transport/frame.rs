//! Datagram framing below the packet codec

use crate::error::TransportError;
use crate::packet::wire_options;
use bincode::Options;
use serde::{Deserialize, Serialize};

pub const FRAME_HEADER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Connect = 0,
    Accept = 1,
    Reliable = 2,
    Unreliable = 3,
    Ack = 4,
    Disconnect = 5,
}

impl FrameKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FrameKind::Connect),
            1 => Some(FrameKind::Accept),
            2 => Some(FrameKind::Reliable),
            3 => Some(FrameKind::Unreliable),
            4 => Some(FrameKind::Ack),
            5 => Some(FrameKind::Disconnect),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameHeader {
    kind: u8,
    channel: u8,
    session: u32,
    sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub channel: u8,
    pub session: u32,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A payload-less frame used for handshakes, acks and teardown.
    pub fn control(kind: FrameKind, session: u32, sequence: u32) -> Self {
        Self {
            kind,
            channel: 0,
            session,
            sequence,
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let header = FrameHeader {
            kind: self.kind as u8,
            channel: self.channel,
            session: self.session,
            sequence: self.sequence,
        };
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        wire_options().serialize_into(&mut bytes, &header)?;
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// None for anything that is not one of our frames.
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let header: FrameHeader = wire_options()
            .deserialize(&bytes[..FRAME_HEADER_SIZE])
            .ok()?;

        Some(Frame {
            kind: FrameKind::from_byte(header.kind)?,
            channel: header.channel,
            session: header.session,
            sequence: header.sequence,
            payload: bytes[FRAME_HEADER_SIZE..].to_vec(),
        })
    }
}
