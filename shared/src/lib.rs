pub mod bams;
pub mod error;
pub mod packet;
pub mod ping;
pub mod registry;
pub mod transport;

use bitflags::bitflags;
use std::time::Instant;

pub use glam::Vec3;

pub use error::{PacketError, RegistryError, TransportError};
pub use registry::ClientRegistry;

/// Transport connection id, reused after the connection is gone.
pub type ClientId = u32;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const SERVER_HOST_ENV: &str = "BIRTH_SERVER_HOST";
pub const MAX_PEERS: usize = 32;

pub const ACTOR_SPEED: f32 = 5.0;
pub const SPRINT_MULTIPLIER: f32 = 2.0;

bitflags! {
    /// Movement and action intents of one actor, one byte on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActorFlags: u8 {
        const FORWARD  = 1;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
        const JUMP     = 1 << 4;
        const ATTACK   = 1 << 5;
        const SPRINT   = 1 << 6;
    }
}

impl ActorFlags {
    /// Only forward/backward intent classifies an actor as moving.
    pub fn is_moving(self) -> bool {
        self.intersects(ActorFlags::FORWARD | ActorFlags::BACKWARD)
    }
}

/// Authoritative movement snapshot of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActorState {
    pub flags: ActorFlags,
    /// Yaw in degrees.
    pub rotation: f32,
    pub position: Vec3,
}

/// Unit direction implied by the intent flags at the given yaw.
///
/// Yaw 0 faces +Z; positive yaw turns toward +X. Opposing intents cancel.
pub fn movement_direction(flags: ActorFlags, yaw_degrees: f32) -> Vec3 {
    let yaw = yaw_degrees.to_radians();
    let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
    let right = Vec3::new(yaw.cos(), 0.0, -yaw.sin());

    let mut dir = Vec3::ZERO;
    if flags.contains(ActorFlags::FORWARD) {
        dir += forward;
    }
    if flags.contains(ActorFlags::BACKWARD) {
        dir -= forward;
    }
    if flags.contains(ActorFlags::RIGHT) {
        dir += right;
    }
    if flags.contains(ActorFlags::LEFT) {
        dir -= right;
    }
    dir.normalize_or_zero()
}

/// Velocity an actor with these intents travels at, used for both local
/// movement and dead reckoning of remote actors.
pub fn movement_velocity(flags: ActorFlags, yaw_degrees: f32, speed: f32) -> Vec3 {
    let speed = if flags.contains(ActorFlags::SPRINT) {
        speed * SPRINT_MULTIPLIER
    } else {
        speed
    };
    movement_direction(flags, yaw_degrees) * speed
}

/// Monotonic millisecond clock. Wraps after ~49 days, so differences must
/// use `wrapping_sub`.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
