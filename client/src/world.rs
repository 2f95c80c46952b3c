//! Client simulation context: the local actor plus every known remote one.

use crate::input::{InputSample, TURN_RATE};
use crate::reconciler::RemoteActor;
use crate::replicator::{Replicator, Update};
use log::{debug, info};
use shared::bams::encode_angle;
use shared::packet::{FullState, Message, ServerPacket, StateDelta};
use shared::{movement_velocity, ActorState, ClientId, ClientRegistry, ACTOR_SPEED};

/// The actor driven by this client's input. Lives outside the registry so
/// no part message can remove it.
#[derive(Debug, Clone, Default)]
pub struct LocalActor {
    pub host: String,
    pub state: ActorState,
}

/// A state update ready for encoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outbound {
    Full(FullState),
    Delta(StateDelta),
}

/// Everything one client simulates
///
/// The world is passed explicitly to whatever needs it. Remote actors come
/// and go with relayed info and part packets, while the local actor is only
/// ever changed by input. Time is simulated seconds, advanced by the frame
/// delta rather than read from a wall clock.
#[derive(Debug)]
pub struct World {
    /// Our id on the server, learned from the first ping
    pub local_id: Option<ClientId>,
    pub me: LocalActor,
    pub remotes: ClientRegistry<RemoteActor>,
    /// Simulated seconds since start
    pub time: f64,
    replicator: Replicator,
}

impl World {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            local_id: None,
            me: LocalActor {
                host: host.into(),
                state: ActorState::default(),
            },
            remotes: ClientRegistry::new(),
            time: 0.0,
            replicator: Replicator::new(),
        }
    }

    /// Records the id the server uses for us.
    ///
    /// From then on packets about that id are ignored, so our own actor
    /// never shows up among the remotes.
    pub fn set_local_id(&mut self, id: ClientId) {
        if self.local_id != Some(id) {
            info!("Server knows us as client {}", id);
            self.local_id = Some(id);
        }
    }

    /// Full state announcing the local actor right after connecting.
    pub fn initial_state(&mut self) -> Outbound {
        let state = self.me.state;
        self.replicator
            .initial(self.time, state.flags, encode_angle(state.rotation));
        Outbound::Full(FullState::from_state(&state))
    }

    /// Applies one frame of input to the local actor.
    pub fn step_local(&mut self, input: &InputSample, dt: f32) {
        let state = &mut self.me.state;
        state.flags = input.flags;
        state.rotation = (state.rotation + input.turn * TURN_RATE * dt).rem_euclid(360.0);
        state.position =
            state.position + movement_velocity(state.flags, state.rotation, ACTOR_SPEED) * dt;
    }

    /// Reconciles every remote actor and advances the clock.
    pub fn advance(&mut self, dt: f32) {
        for (_, actor) in self.remotes.iter_mut() {
            actor.tick(dt);
        }
        self.time += dt as f64;
    }

    /// What, if anything, the local actor should send this tick.
    pub fn replicate(&mut self) -> Option<Outbound> {
        let state = self.me.state;
        let update = self
            .replicator
            .tick(self.time, state.flags, encode_angle(state.rotation))?;

        Some(match update {
            Update::Full => Outbound::Full(FullState::from_state(&state)),
            Update::Delta => Outbound::Delta(StateDelta::new(state.flags, state.rotation)),
        })
    }

    /// Applies a relayed packet about some actor. Pings are handled by the
    /// network layer and ignored here.
    pub fn apply(&mut self, packet: ServerPacket) {
        let id = packet.client_id;
        if Some(id) == self.local_id {
            debug!("Ignoring {:?} about ourselves", packet.message.kind());
            return;
        }

        match packet.message {
            Message::ClientInfo(info) => {
                let host = info.host.to_string();
                match self.remotes.find_by_id_mut(id) {
                    Some(actor) => actor.host = host,
                    None => match self.remotes.new_client(id, RemoteActor::new(host)) {
                        Ok(actor) => info!("Client {} ({}) joined", id, actor.host),
                        Err(e) => debug!("Ignoring announcement: {}", e),
                    },
                }
            }
            Message::ClientPart(_) => {
                if let Some(actor) = self.remotes.free_client(id) {
                    info!("Client {} ({}) left", id, actor.host);
                }
            }
            Message::ActorState(delta) => match self.remotes.find_by_id_mut(id) {
                Some(actor) => actor.apply_delta(&delta),
                None => debug!("Delta for unknown client {}", id),
            },
            Message::ActorFullState(full) => match self.remotes.find_by_id_mut(id) {
                Some(actor) => actor.queue_full(full),
                None => debug!("Full state for unknown client {}", id),
            },
            Message::Ping(_) | Message::PingEcho(_) => {}
        }
    }
}
