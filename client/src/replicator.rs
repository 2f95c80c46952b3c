//! Decides, once per simulation tick, whether the local actor's state goes
//! out as a full snapshot, a delta, or not at all.

use log::debug;
use shared::ActorFlags;

/// Longest a moving actor goes without a full state.
pub const HEARTBEAT_SECS: f64 = 5.0;

/// A stop this long after the previous reported stop goes out as a full
/// state. Starts in between do not restart the window.
pub const COOLDOWN_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Full,
    Delta,
}

#[derive(Debug, Clone)]
pub struct Replicator {
    last_flags: ActorFlags,
    last_rotation: u8,
    /// When movement was last reported as stopped
    last_stop_time: f64,
    /// Heartbeat timer
    last_full_time: f64,
}

impl Replicator {
    pub fn new() -> Self {
        Self {
            last_flags: ActorFlags::empty(),
            last_rotation: 0,
            last_stop_time: 0.0,
            last_full_time: 0.0,
        }
    }

    /// The full state sent right after connecting. Starts the heartbeat.
    pub fn initial(&mut self, now: f64, flags: ActorFlags, rotation: u8) -> Update {
        self.last_flags = flags;
        self.last_rotation = rotation;
        self.last_stop_time = now;
        self.last_full_time = now;
        Update::Full
    }

    /// `rotation` is the wire (BAM) rotation, so turns smaller than one
    /// step do not count as a change.
    pub fn tick(&mut self, now: f64, flags: ActorFlags, rotation: u8) -> Option<Update> {
        let moving = flags.is_moving();
        let was_moving = self.last_flags.is_moving();
        let changed = flags != self.last_flags || rotation != self.last_rotation;

        let update = if moving && now - self.last_full_time >= HEARTBEAT_SECS {
            self.last_full_time = now;
            Some(Update::Full)
        } else if changed {
            if was_moving && !moving {
                let settled = now - self.last_stop_time > COOLDOWN_SECS;
                self.last_stop_time = now;
                if settled {
                    self.last_full_time = now;
                    Some(Update::Full)
                } else {
                    Some(Update::Delta)
                }
            } else {
                Some(Update::Delta)
            }
        } else {
            None
        };

        self.last_flags = flags;
        self.last_rotation = rotation;

        if let Some(update) = update {
            debug!("Replicating {:?} at {:.3}s ({:?})", update, now, flags);
        }
        update
    }
}

impl Default for Replicator {
    fn default() -> Self {
        Self::new()
    }
}
