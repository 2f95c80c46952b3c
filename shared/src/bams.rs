//! Compact wire representations for angles and vectors.
//!
//! Rotations travel as 8-bit binary angle measurements (one step is
//! 360/256 degrees). Vector components travel as the upper half of their
//! IEEE-754 bit pattern, which keeps sign, exponent and 8 mantissa bits.

use crate::Vec3;
use serde::{Deserialize, Serialize};

/// Number of distinct 8-bit BAM values in a full turn.
pub const BAM_STEPS: f32 = 256.0;

/// Angular resolution of the wire rotation, in degrees.
pub const BAM_STEP_DEGREES: f32 = 360.0 / BAM_STEPS;

/// A position as it is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireVector3 {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

/// Degrees to an 8-bit BAM, rounding to the nearest step and wrapping.
pub fn encode_angle(degrees: f32) -> u8 {
    let normalized = degrees.rem_euclid(360.0);
    ((normalized / 360.0 * BAM_STEPS).round() as u32 % 256) as u8
}

pub fn decode_angle(bam: u8) -> f32 {
    bam as f32 / BAM_STEPS * 360.0
}

/// Shortest signed turn from `from` to `to`, in [-180, 180).
pub fn angle_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(360.0);
    if delta >= 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Float to its upper 16 bits, rounding half to even on the dropped half.
pub fn encode_scalar(value: f32) -> u16 {
    let bits = value.to_bits();
    if value.is_nan() {
        // keep it a NaN after truncation
        return ((bits >> 16) as u16) | 0x0040;
    }
    let rounding = 0x7FFF + ((bits >> 16) & 1);
    (bits.wrapping_add(rounding) >> 16) as u16
}

pub fn decode_scalar(encoded: u16) -> f32 {
    f32::from_bits((encoded as u32) << 16)
}

pub fn encode_vector(v: &Vec3) -> WireVector3 {
    WireVector3 {
        x: encode_scalar(v.x),
        y: encode_scalar(v.y),
        z: encode_scalar(v.z),
    }
}

pub fn decode_vector(w: &WireVector3) -> Vec3 {
    Vec3::new(decode_scalar(w.x), decode_scalar(w.y), decode_scalar(w.z))
}
