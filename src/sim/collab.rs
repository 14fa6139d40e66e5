//! Collaborator interfaces
//!
//! Physics integration, rendering and level geometry live outside the core.
//! The simulation talks to them only through these traits, injected into the
//! [`SimContext`](super::SimContext) at construction time.
//!
//! Lightweight implementations are provided so the core runs headless:
//! [`SimplePhysics`] (point masses with ray/sphere casts), [`NullScene`],
//! [`LogScene`], [`OpenGround`] and [`PillarCover`].

use glam::Vec3;

use super::EntityId;
use super::events::{EffectKind, EffectParams, IndicatorKind};

/// Result of a successful raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: EntityId,
    pub point: Vec3,
    /// Surface normal at the hit point (pointing back toward the ray origin side)
    pub normal: Vec3,
    pub distance: f32,
}

/// Physics world: body bookkeeping, integration and ray queries
pub trait Physics {
    /// Advance body integration by `dt`
    fn step(&mut self, dt: f32);
    fn add_body(&mut self, id: EntityId, position: Vec3, radius: f32);
    fn remove_body(&mut self, id: EntityId);
    fn set_velocity(&mut self, id: EntityId, velocity: Vec3);
    /// Hard-set a body position (teleports, player sync)
    fn set_position(&mut self, id: EntityId, position: Vec3);
    fn body_position(&self, id: EntityId) -> Option<Vec3>;
    /// Nearest body hit along `direction` within `max_distance` whose id passes `filter`
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &dyn Fn(EntityId) -> bool,
    ) -> Option<RayHit>;
    fn apply_impulse(&mut self, id: EntityId, impulse: Vec3);
}

/// Renderer-side effect sink (fire-and-forget)
pub trait Scene {
    fn spawn_visual_effect(&mut self, kind: EffectKind, position: Vec3, params: &EffectParams);
    fn attach_indicator(&mut self, agent: EntityId, kind: IndicatorKind);
}

/// Level geometry queries used by soldiers
pub trait CoverSystem {
    /// A position within `max_distance` of `from` that hides it from `threat`
    fn find_cover_position(&self, from: Vec3, threat: Vec3, max_distance: f32) -> Option<Vec3>;
    /// Whether something blocks the line between `position` and `threat`
    fn is_behind_cover(&self, position: Vec3, threat: Vec3) -> bool;
}

/// A physics body tracked by [`SimplePhysics`]
#[derive(Debug, Clone)]
struct Body {
    id: EntityId,
    position: Vec3,
    velocity: Vec3,
    /// Impulse-driven velocity, decays each step
    knockback: Vec3,
    radius: f32,
}

/// Knockback decay rate (1/s)
const KNOCKBACK_DAMPING: f32 = 6.0;

/// Minimal kinematic physics: bodies are spheres moving at their set velocity
#[derive(Debug, Clone, Default)]
pub struct SimplePhysics {
    /// Sorted by id for deterministic iteration
    bodies: Vec<Body>,
}

impl SimplePhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn find(&self, id: EntityId) -> Option<&Body> {
        self.bodies
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bodies[i])
    }

    fn find_mut(&mut self, id: EntityId) -> Option<&mut Body> {
        match self.bodies.binary_search_by_key(&id, |b| b.id) {
            Ok(i) => Some(&mut self.bodies[i]),
            Err(_) => None,
        }
    }
}

impl Physics for SimplePhysics {
    fn step(&mut self, dt: f32) {
        let damping = (-KNOCKBACK_DAMPING * dt).exp();
        for body in &mut self.bodies {
            body.position += (body.velocity + body.knockback) * dt;
            body.knockback *= damping;
        }
    }

    fn add_body(&mut self, id: EntityId, position: Vec3, radius: f32) {
        let body = Body {
            id,
            position,
            velocity: Vec3::ZERO,
            knockback: Vec3::ZERO,
            radius,
        };
        match self.bodies.binary_search_by_key(&id, |b| b.id) {
            Ok(i) => self.bodies[i] = body,
            Err(i) => self.bodies.insert(i, body),
        }
    }

    fn remove_body(&mut self, id: EntityId) {
        if let Ok(i) = self.bodies.binary_search_by_key(&id, |b| b.id) {
            self.bodies.remove(i);
        }
    }

    fn set_velocity(&mut self, id: EntityId, velocity: Vec3) {
        if let Some(body) = self.find_mut(id) {
            body.velocity = velocity;
        }
    }

    fn set_position(&mut self, id: EntityId, position: Vec3) {
        if let Some(body) = self.find_mut(id) {
            body.position = position;
        }
    }

    fn body_position(&self, id: EntityId) -> Option<Vec3> {
        self.find(id).map(|b| b.position)
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &dyn Fn(EntityId) -> bool,
    ) -> Option<RayHit> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let mut best: Option<RayHit> = None;
        for body in &self.bodies {
            if !filter(body.id) {
                continue;
            }
            // Ray/sphere: solve |o + t·d - c|² = r² for the nearest t ≥ 0
            let oc = origin - body.position;
            let b = oc.dot(dir);
            let c = oc.length_squared() - body.radius * body.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let sqrt_disc = disc.sqrt();
            let t = if -b - sqrt_disc >= 0.0 {
                -b - sqrt_disc
            } else {
                -b + sqrt_disc
            };
            if t < 0.0 || t > max_distance {
                continue;
            }
            if best.is_some_and(|hit| hit.distance <= t) {
                continue;
            }
            let point = origin + dir * t;
            best = Some(RayHit {
                entity: body.id,
                point,
                normal: (point - body.position).normalize_or_zero(),
                distance: t,
            });
        }
        best
    }

    fn apply_impulse(&mut self, id: EntityId, impulse: Vec3) {
        if let Some(body) = self.find_mut(id) {
            body.knockback += impulse;
        }
    }
}

/// Scene that drops every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScene;

impl Scene for NullScene {
    fn spawn_visual_effect(&mut self, _kind: EffectKind, _position: Vec3, _params: &EffectParams) {}
    fn attach_indicator(&mut self, _agent: EntityId, _kind: IndicatorKind) {}
}

/// Scene that traces every request to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScene;

impl Scene for LogScene {
    fn spawn_visual_effect(&mut self, kind: EffectKind, position: Vec3, params: &EffectParams) {
        log::trace!("effect {:?} at {} ({:?})", kind, position, params);
    }

    fn attach_indicator(&mut self, agent: EntityId, kind: IndicatorKind) {
        log::trace!("indicator {:?} on agent {}", kind, agent);
    }
}

/// Flat arena with nothing to hide behind
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGround;

impl CoverSystem for OpenGround {
    fn find_cover_position(&self, _from: Vec3, _threat: Vec3, _max_distance: f32) -> Option<Vec3> {
        None
    }

    fn is_behind_cover(&self, _position: Vec3, _threat: Vec3) -> bool {
        false
    }
}

/// A cylindrical obstacle on the ground plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pillar {
    pub center: Vec3,
    pub radius: f32,
}

/// Cover made of round pillars; hiding spots sit just behind each pillar
#[derive(Debug, Clone, Default)]
pub struct PillarCover {
    pillars: Vec<Pillar>,
}

/// Gap kept between a hiding spot and its pillar
const COVER_STANDOFF: f32 = 1.0;

impl PillarCover {
    pub fn new(pillars: Vec<Pillar>) -> Self {
        Self { pillars }
    }

    /// `count` pillars evenly spaced on a ring around the origin
    pub fn ring(count: u32, ring_radius: f32, pillar_radius: f32) -> Self {
        let pillars = (0..count)
            .map(|i| {
                let theta = std::f32::consts::TAU * i as f32 / count.max(1) as f32;
                Pillar {
                    center: crate::polar_to_ground(ring_radius, theta),
                    radius: pillar_radius,
                }
            })
            .collect();
        Self { pillars }
    }

    pub fn pillars(&self) -> &[Pillar] {
        &self.pillars
    }
}

impl CoverSystem for PillarCover {
    fn find_cover_position(&self, from: Vec3, threat: Vec3, max_distance: f32) -> Option<Vec3> {
        self.pillars
            .iter()
            .filter_map(|p| {
                let away = (p.center - threat).with_y(0.0).normalize_or_zero();
                if away == Vec3::ZERO {
                    return None;
                }
                let spot = p.center + away * (p.radius + COVER_STANDOFF);
                let dist_sq = spot.distance_squared(from);
                (dist_sq <= max_distance * max_distance).then_some((spot, dist_sq))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(spot, _)| spot)
    }

    fn is_behind_cover(&self, position: Vec3, threat: Vec3) -> bool {
        // Segment/circle test on the ground plane
        let a = position.with_y(0.0);
        let b = threat.with_y(0.0);
        let ab = b - a;
        let len_sq = ab.length_squared();
        self.pillars.iter().any(|p| {
            let c = p.center.with_y(0.0);
            let t = if len_sq > 0.0 {
                ((c - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (a + ab * t).distance_squared(c) < p.radius * p.radius
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raycast_hits_nearest_body() {
        let mut physics = SimplePhysics::new();
        physics.add_body(1, Vec3::new(0.0, 0.0, 10.0), 1.0);
        physics.add_body(2, Vec3::new(0.0, 0.0, 5.0), 1.0);

        let hit = physics
            .raycast(Vec3::ZERO, Vec3::Z, 100.0, &|_| true)
            .unwrap();
        assert_eq!(hit.entity, 2);
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn test_raycast_respects_filter_and_range() {
        let mut physics = SimplePhysics::new();
        physics.add_body(1, Vec3::new(0.0, 0.0, 10.0), 1.0);
        physics.add_body(2, Vec3::new(0.0, 0.0, 5.0), 1.0);

        let hit = physics.raycast(Vec3::ZERO, Vec3::Z, 100.0, &|id| id != 2).unwrap();
        assert_eq!(hit.entity, 1);
        assert!(physics.raycast(Vec3::ZERO, Vec3::Z, 3.0, &|_| true).is_none());
        assert!(physics.raycast(Vec3::ZERO, Vec3::X, 100.0, &|_| true).is_none());
    }

    #[test]
    fn test_step_integrates_velocity_and_knockback() {
        let mut physics = SimplePhysics::new();
        physics.add_body(7, Vec3::ZERO, 0.5);
        physics.set_velocity(7, Vec3::new(2.0, 0.0, 0.0));
        physics.step(0.5);
        assert_eq!(physics.body_position(7), Some(Vec3::new(1.0, 0.0, 0.0)));

        physics.set_velocity(7, Vec3::ZERO);
        physics.apply_impulse(7, Vec3::new(0.0, 0.0, 4.0));
        physics.step(0.1);
        let z = physics.body_position(7).unwrap().z;
        assert!(z > 0.0 && z <= 0.4 + 1e-5);

        physics.remove_body(7);
        assert_eq!(physics.body_position(7), None);
    }

    #[test]
    fn test_pillar_cover_hides_behind_pillar() {
        let cover = PillarCover::new(vec![Pillar {
            center: Vec3::new(0.0, 0.0, 5.0),
            radius: 1.0,
        }]);
        let threat = Vec3::ZERO;
        let spot = cover
            .find_cover_position(Vec3::new(1.0, 0.0, 6.0), threat, 10.0)
            .unwrap();
        assert!((spot - Vec3::new(0.0, 0.0, 7.0)).length() < 1e-4);
        assert!(cover.is_behind_cover(spot, threat));
        assert!(!cover.is_behind_cover(Vec3::new(5.0, 0.0, 0.0), threat));
    }

    #[test]
    fn test_pillar_cover_out_of_reach() {
        let cover = PillarCover::ring(4, 20.0, 1.0);
        assert_eq!(cover.pillars().len(), 4);
        assert!(cover.find_cover_position(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 5.0).is_none());
    }
}
