//! Keyboard sampling into movement intents

use macroquad::prelude::*;
use shared::ActorFlags;

/// Degrees per second while a turn key is held.
pub const TURN_RATE: f32 = 120.0;

/// Raw key state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub jump: bool,
    pub attack: bool,
    pub sprint: bool,
}

impl KeyState {
    pub fn flags(&self) -> ActorFlags {
        let mut flags = ActorFlags::empty();
        flags.set(ActorFlags::FORWARD, self.forward);
        flags.set(ActorFlags::BACKWARD, self.backward);
        flags.set(ActorFlags::LEFT, self.left);
        flags.set(ActorFlags::RIGHT, self.right);
        flags.set(ActorFlags::JUMP, self.jump);
        flags.set(ActorFlags::ATTACK, self.attack);
        flags.set(ActorFlags::SPRINT, self.sprint);
        flags
    }

    /// -1 turning left, 1 turning right, 0 for neither or both.
    pub fn turn(&self) -> f32 {
        match (self.turn_left, self.turn_right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

/// What the simulation needs from one frame of input
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    pub flags: ActorFlags,
    /// Signed turn direction, scaled by [`TURN_RATE`] when applied
    pub turn: f32,
}

impl From<KeyState> for InputSample {
    fn from(keys: KeyState) -> Self {
        Self {
            flags: keys.flags(),
            turn: keys.turn(),
        }
    }
}

/// Reads the keyboard through macroquad
#[derive(Debug, Default)]
pub struct InputManager {
    prev_quit: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self) -> InputSample {
        let keys = KeyState {
            forward: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            backward: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A),
            right: is_key_down(KeyCode::D),
            turn_left: is_key_down(KeyCode::Q) || is_key_down(KeyCode::Left),
            turn_right: is_key_down(KeyCode::E) || is_key_down(KeyCode::Right),
            jump: is_key_down(KeyCode::Space),
            attack: is_key_down(KeyCode::F),
            sprint: is_key_down(KeyCode::LeftShift),
        };
        keys.into()
    }

    /// True on the frame Escape goes down.
    pub fn quit_pressed(&mut self) -> bool {
        let down = is_key_down(KeyCode::Escape);
        let pressed = down && !self.prev_quit;
        self.prev_quit = down;
        pressed
    }
}
