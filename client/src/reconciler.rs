//! Receiver-side reconciliation of remote actors
//!
//! Every remote actor has a rendered state and a target. Packets only move
//! the target; once per tick the rendered state is dead reckoned along the
//! velocity implied by the actor's flags and then blended toward the
//! target.

use shared::bams::angle_delta;
use shared::packet::{RelayedFullState, StateDelta};
use shared::{movement_velocity, ActorFlags, Vec3, ACTOR_SPEED};

pub const MOVING_BLEND: f32 = 0.25;
pub const IDLE_BLEND: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteActor {
    pub host: String,
    pub flags: ActorFlags,
    pub rotation: f32,
    pub to_rotation: f32,
    pub position: Vec3,
    pub to_position: Vec3,
    /// False until the first full state has placed the actor
    pub should_interpolate: bool,
    /// The sender's RTT to the server, in milliseconds
    pub ping: u16,
    /// Latest full state not yet folded in by a tick
    pending_full: Option<RelayedFullState>,
}

impl RemoteActor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            flags: ActorFlags::empty(),
            rotation: 0.0,
            to_rotation: 0.0,
            position: Vec3::ZERO,
            to_position: Vec3::ZERO,
            should_interpolate: false,
            ping: 0,
            pending_full: None,
        }
    }

    pub fn apply_delta(&mut self, delta: &StateDelta) {
        self.flags = delta.flags();
        self.to_rotation = delta.rotation_degrees();
        if let Some(pending) = self.pending_full.as_mut() {
            pending.state.apply_delta(delta);
        }
    }

    /// Keeps the newest full state for the next tick.
    pub fn queue_full(&mut self, full: RelayedFullState) {
        self.pending_full = Some(full);
    }

    /// Velocity the actor is assumed to travel at between updates.
    pub fn implied_velocity(&self) -> Vec3 {
        movement_velocity(self.flags, self.to_rotation, ACTOR_SPEED)
    }

    /// Fraction of the remaining gap closed per tick. Laggier senders get
    /// a gentler blend.
    pub fn blend_factor(&self) -> f32 {
        let base = if self.flags.is_moving() {
            MOVING_BLEND
        } else {
            IDLE_BLEND
        };
        base * 100.0 / (100.0 + self.ping as f32)
    }

    /// Advances one tick with whatever full state arrived since the last.
    pub fn tick(&mut self, dt: f32) {
        let observed = self.pending_full.take();
        self.reconcile(observed.as_ref(), dt);
    }

    /// Folds an observed full state into the target, then dead reckons and
    /// blends. The first full state snaps instead.
    pub fn reconcile(&mut self, observed_full: Option<&RelayedFullState>, dt: f32) {
        if let Some(full) = observed_full {
            let state = full.state.to_state();
            self.flags = state.flags;
            self.to_rotation = state.rotation;
            self.to_position = state.position;
            self.ping = full.ping;

            if !self.should_interpolate {
                self.position = self.to_position;
                self.rotation = self.to_rotation;
                self.should_interpolate = true;
                return;
            }
        }

        if !self.should_interpolate {
            return;
        }

        let travel = self.implied_velocity() * dt;
        self.position += travel;
        self.to_position += travel;

        let alpha = self.blend_factor();
        self.position = self.position.lerp(self.to_position, alpha);
        self.rotation =
            (self.rotation + angle_delta(self.rotation, self.to_rotation) * alpha).rem_euclid(360.0);
    }
}
