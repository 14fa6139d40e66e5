//! Arena Siege - simulation core for a wave-based arena combat game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (agents, formations, waves, damage, combo)
//! - `tuning`: Data-driven game balance
//!
//! Rendering, physics integration, audio and input are collaborators that plug
//! into the traits in [`sim::collab`].

pub mod sim;
pub mod tuning;

pub use sim::{CombatCoordinator, CombatStats, GameEvent, SimContext};
pub use tuning::{ConfigError, Tuning};

use glam::Vec3;

/// Simulation constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Distance under which `move_towards` reports arrival
    pub const ARRIVAL_EPSILON: f32 = 0.5;
    /// Chase gives up once the target is this many detection ranges away
    pub const CHASE_GIVE_UP_FACTOR: f32 = 1.5;

    /// Entity id reserved for the player
    pub const PLAYER_ID: u32 = 0;
    /// Collision radius used for agent bodies
    pub const AGENT_BODY_RADIUS: f32 = 0.6;
    /// Collision radius used for the player body
    pub const PLAYER_BODY_RADIUS: f32 = 0.5;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Exponentially damp `current` toward `target` along the shortest arc.
///
/// `rate` is in 1/s; the fraction covered per step is `1 - e^(-rate·dt)`, so
/// the result never overshoots and is frame-rate independent.
#[inline]
pub fn damp_angle(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    let delta = normalize_angle(target - current);
    let t = 1.0 - (-rate * dt).exp();
    normalize_angle(current + delta * t)
}

/// Heading (yaw) that faces along `dir` on the ground plane
#[inline]
pub fn heading(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}

/// Point on the ground plane at radius `r` and angle `theta`
#[inline]
pub fn polar_to_ground(r: f32, theta: f32) -> Vec3 {
    Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
}

/// Rotate a local offset about the up axis by `yaw` radians
#[inline]
pub fn rotate_yaw(offset: Vec3, yaw: f32) -> Vec3 {
    let (s, c) = yaw.sin_cos();
    Vec3::new(offset.x * c + offset.z * s, offset.y, -offset.x * s + offset.z * c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_normalize_angle_wraps() {
        assert!((normalize_angle(3.0 * PI) - (-PI)).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert_eq!(normalize_angle(0.25), 0.25);
    }

    #[test]
    fn test_damp_angle_takes_short_way() {
        // From just below +π to just above -π is a tiny step, not a full turn
        let next = damp_angle(PI - 0.1, -PI + 0.1, 10.0, 0.1);
        assert!(next.abs() > PI - 0.2);
    }

    #[test]
    fn test_damp_angle_never_overshoots() {
        let mut facing = 0.0;
        for _ in 0..200 {
            facing = damp_angle(facing, 1.0, 8.0, 1.0 / 60.0);
            assert!(facing <= 1.0 + 1e-5);
        }
        assert!((facing - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_heading_matches_yaw_rotation() {
        // Rotating +Z by a heading yields a vector with that heading
        let yaw = 0.7;
        let dir = rotate_yaw(Vec3::Z, yaw);
        assert!((heading(dir) - yaw).abs() < 1e-5);
    }
}
