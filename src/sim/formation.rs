//! Formations
//!
//! A formation owns a fixed set of slots generated from a [`Layout`]. Each
//! tick it moves as a unit and pushes every occupied slot's world position to
//! its agent as a movement target; the agent's own state machine decides
//! whether to go there.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::EntityId;
use super::agent::AgentKind;
use super::layout::Layout;
use super::pool::AgentPool;
use crate::{damp_angle, heading, rotate_yaw};

/// Weighted kind table used for slots without a fixed role
#[derive(Debug, Clone, PartialEq)]
pub struct KindDistribution {
    /// In config order; weights sum to 1
    entries: Vec<(AgentKind, f32)>,
}

impl KindDistribution {
    pub fn new(entries: Vec<(AgentKind, f32)>) -> Self {
        let mut entries: Vec<(AgentKind, f32)> = entries
            .into_iter()
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .collect();
        if entries.is_empty() {
            log::warn!("Empty enemy type distribution, using drones");
            entries.push((AgentKind::Drone, 1.0));
        }
        let total: f32 = entries.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > 1e-3 {
            log::debug!("Normalizing enemy type weights (sum {})", total);
            for (_, w) in &mut entries {
                *w /= total;
            }
        }
        Self { entries }
    }

    /// Equal weight for each listed kind
    pub fn uniform(kinds: &[AgentKind]) -> Self {
        Self::new(kinds.iter().map(|&k| (k, 1.0)).collect())
    }

    pub fn entries(&self) -> &[(AgentKind, f32)] {
        &self.entries
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> AgentKind {
        self.sample_with(rng.random::<f32>())
    }

    /// Cumulative selection for a draw `u` in [0, 1)
    pub fn sample_with(&self, u: f32) -> AgentKind {
        let mut cumulative = 0.0;
        for &(kind, weight) in &self.entries {
            cumulative += weight;
            if u < cumulative {
                return kind;
            }
        }
        // Rounding left the draw past the last bucket
        self.entries[0].0
    }
}

impl Default for KindDistribution {
    fn default() -> Self {
        Self::new(vec![(AgentKind::Drone, 1.0)])
    }
}

/// Group-level tactical phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormationPhase {
    /// No target; drift in place
    #[default]
    Hold,
    /// Close in on the target
    Approach,
    /// Orbit the target, spread wide
    Attack,
    /// Depleted; hold ground, packed tight
    Defend,
}

/// Group movement tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationMotion {
    pub move_speed: f32,
    /// Idle spin (rad/s); applies while holding or with no player.
    /// Engaged formations turn toward the player at `face_rate` instead.
    pub rotation_speed: f32,
    /// Rate at which an engaged formation turns to face its target (1/s)
    pub face_rate: f32,
    pub wave_amplitude: f32,
    pub wave_frequency: f32,
    /// Approach -> Attack within this distance
    pub attack_trigger: f32,
    /// Attack -> Approach beyond this distance
    pub attack_release: f32,
    pub orbit_radius: f32,
    /// Rad/s
    pub orbit_speed: f32,
    /// Layout scale while attacking
    pub attack_spread: f32,
    /// Layout scale while defending
    pub defend_spread: f32,
    /// Defend once the living fraction of slots drops under this
    pub defend_threshold: f32,
}

impl Default for FormationMotion {
    fn default() -> Self {
        Self {
            move_speed: 4.0,
            rotation_speed: 0.0,
            face_rate: 2.0,
            wave_amplitude: 0.0,
            wave_frequency: 1.0,
            attack_trigger: 25.0,
            attack_release: 40.0,
            orbit_radius: 20.0,
            orbit_speed: 0.4,
            attack_spread: 1.3,
            defend_spread: 0.7,
            defend_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Formation {
    pub id: u32,
    layout: Layout,
    /// Current layout scale
    spread: f32,
    /// Local-space offsets, fixed count
    offsets: Vec<Vec3>,
    kinds: Vec<AgentKind>,
    slots: Vec<Option<EntityId>>,
    /// Slots ever filled since configure; layouts may be larger than the roster
    populated: usize,
    pub center: Vec3,
    pub target_center: Vec3,
    /// Yaw (radians)
    pub rotation: f32,
    phase: FormationPhase,
    /// Accumulator for the vertical wave term
    wave_phase: f32,
    orbit_angle: f32,
    pub motion: FormationMotion,
    active: bool,
}

impl Formation {
    pub fn new(id: u32, layout: Layout, motion: FormationMotion, center: Vec3) -> Self {
        let mut formation = Self {
            id,
            layout,
            spread: 1.0,
            offsets: Vec::new(),
            kinds: Vec::new(),
            slots: Vec::new(),
            populated: 0,
            center,
            target_center: center,
            rotation: 0.0,
            phase: FormationPhase::Hold,
            wave_phase: 0.0,
            orbit_angle: 0.0,
            motion,
            active: false,
        };
        formation.configure(id, layout, motion, center);
        formation
    }

    /// Reinitialize for reuse; slot count is fixed from here on
    pub fn configure(&mut self, id: u32, layout: Layout, motion: FormationMotion, center: Vec3) {
        self.id = id;
        self.layout = layout;
        self.spread = 1.0;
        self.offsets = layout.positions();
        self.kinds = vec![AgentKind::default(); self.offsets.len()];
        self.slots = vec![None; self.offsets.len()];
        self.populated = 0;
        self.center = center;
        self.target_center = center;
        self.rotation = 0.0;
        self.phase = FormationPhase::Hold;
        self.wave_phase = 0.0;
        self.orbit_angle = 0.0;
        self.motion = motion;
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.populated = 0;
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn phase(&self) -> FormationPhase {
        self.phase
    }

    pub fn spread(&self) -> f32 {
        self.spread
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Option<EntityId>] {
        &self.slots
    }

    pub fn offsets(&self) -> &[Vec3] {
        &self.offsets
    }

    pub fn slot_kind(&self, slot: usize) -> Option<AgentKind> {
        self.kinds.get(slot).copied()
    }

    /// Fixed layout roles first, then the distribution for the rest
    pub fn assign_kinds<R: Rng>(&mut self, distribution: &KindDistribution, rng: &mut R) {
        self.kinds = self
            .layout
            .slot_roles()
            .into_iter()
            .map(|role| role.unwrap_or_else(|| distribution.sample(rng)))
            .collect();
    }

    /// Slot indices whose assigned kind is `kind`
    pub fn slots_of_kind(&self, kind: AgentKind) -> Vec<usize> {
        self.kinds
            .iter()
            .enumerate()
            .filter(|&(_, k)| *k == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// World position of a slot, including the vertical wave term
    pub fn slot_world_position(&self, slot: usize) -> Option<Vec3> {
        let offset = *self.offsets.get(slot)?;
        let mut world = self.center + rotate_yaw(offset, self.rotation);
        if self.motion.wave_amplitude != 0.0 {
            let slot_phase = TAU * slot as f32 / self.offsets.len() as f32;
            world.y += (self.wave_phase * self.motion.wave_frequency + slot_phase).sin()
                * self.motion.wave_amplitude;
        }
        Some(world)
    }

    /// Occupy a slot; out-of-range indices are ignored
    pub fn assign_slot(&mut self, slot: usize, agent: EntityId) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                if s.is_none() {
                    self.populated += 1;
                }
                *s = Some(agent);
                true
            }
            None => {
                log::warn!(
                    "Formation {}: slot {} out of range ({} slots)",
                    self.id,
                    slot,
                    self.slots.len()
                );
                false
            }
        }
    }

    /// Empty the slot held by `agent`, if any
    pub fn vacate(&mut self, agent: EntityId) {
        for slot in &mut self.slots {
            if *slot == Some(agent) {
                *slot = None;
            }
        }
    }

    /// Occupants that are still fighting
    pub fn living_count(&self, pool: &AgentPool) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|&&id| pool.get(id).is_some_and(|a| a.is_active() && a.is_alive()))
            .count()
    }

    /// True iff every occupant is inactive or dead
    pub fn is_defeated(&self, pool: &AgentPool) -> bool {
        self.living_count(pool) == 0
    }

    fn regenerate(&mut self, spread: f32) {
        if (self.spread - spread).abs() < f32::EPSILON {
            return;
        }
        self.spread = spread;
        self.offsets = self.layout.scaled(spread).positions();
    }

    fn enter_phase(&mut self, phase: FormationPhase) {
        if self.phase == phase {
            return;
        }
        log::debug!("Formation {} {:?} -> {:?}", self.id, self.phase, phase);
        self.phase = phase;
        let spread = match phase {
            FormationPhase::Attack => self.motion.attack_spread,
            FormationPhase::Defend => self.motion.defend_spread,
            FormationPhase::Hold | FormationPhase::Approach => 1.0,
        };
        self.regenerate(spread);
    }

    /// Advance group motion and push slot targets to the occupants
    pub fn update(&mut self, dt: f32, player: Option<Vec3>, pool: &mut AgentPool) {
        if !self.active {
            return;
        }
        self.wave_phase += dt;
        self.update_phase(dt, player, pool);

        match (self.phase, player) {
            (FormationPhase::Hold, _) | (_, None) => {
                self.rotation = crate::normalize_angle(self.rotation + self.motion.rotation_speed * dt);
            }
            (_, Some(p)) => {
                let to = (p - self.center).with_y(0.0);
                if to.length_squared() > f32::EPSILON {
                    self.rotation = damp_angle(self.rotation, heading(to), self.motion.face_rate, dt);
                }
            }
        }

        // Ease toward the target without overshooting
        let to = self.target_center - self.center;
        let step = self.motion.move_speed * dt;
        if to.length() <= step {
            self.center = self.target_center;
        } else {
            self.center += to.normalize() * step;
        }

        for slot in 0..self.slots.len() {
            let Some(id) = self.slots[slot] else {
                continue;
            };
            let world = self.slot_world_position(slot);
            match pool.get_mut(id) {
                Some(agent) if agent.is_active() => {
                    if agent.is_alive() {
                        agent.move_target = world;
                    }
                }
                _ => self.slots[slot] = None,
            }
        }
    }

    fn update_phase(&mut self, dt: f32, player: Option<Vec3>, pool: &AgentPool) {
        if self.populated > 0
            && self.phase != FormationPhase::Defend
            && (self.living_count(pool) as f32 / self.populated as f32) < self.motion.defend_threshold
        {
            self.enter_phase(FormationPhase::Defend);
        }

        let Some(p) = player else {
            if self.phase != FormationPhase::Defend {
                self.enter_phase(FormationPhase::Hold);
            }
            self.target_center = self.center;
            return;
        };
        let distance = self.center.with_y(0.0).distance(p.with_y(0.0));

        match self.phase {
            FormationPhase::Hold => self.enter_phase(FormationPhase::Approach),
            FormationPhase::Approach if distance <= self.motion.attack_trigger => {
                let rel = self.center - p;
                self.orbit_angle = rel.z.atan2(rel.x);
                self.enter_phase(FormationPhase::Attack);
            }
            FormationPhase::Attack if distance > self.motion.attack_release => {
                self.enter_phase(FormationPhase::Approach);
            }
            _ => {}
        }

        self.target_center = match self.phase {
            FormationPhase::Approach => p.with_y(self.center.y),
            FormationPhase::Attack => {
                self.orbit_angle = (self.orbit_angle + self.motion.orbit_speed * dt).rem_euclid(TAU);
                p.with_y(self.center.y) + crate::polar_to_ground(self.motion.orbit_radius, self.orbit_angle)
            }
            FormationPhase::Hold | FormationPhase::Defend => self.center,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::context::SimContext;
    use crate::sim::damage::DamageSource;
    use crate::tuning::Tuning;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn grid(rows: u32, columns: u32) -> Layout {
        Layout::Grid {
            rows,
            columns,
            spacing: 2.0,
        }
    }

    /// Formation with every slot filled by a fresh agent
    fn populated(layout: Layout, center: Vec3, pool: &mut AgentPool, ctx: &mut SimContext) -> Formation {
        let tuning = Tuning::default();
        let mut formation = Formation::new(1, layout, FormationMotion::default(), center);
        for slot in 0..formation.slot_count() {
            let pos = formation.slot_world_position(slot).unwrap_or(center);
            let id = pool.acquire(AgentKind::Drone, tuning.stats(AgentKind::Drone), &tuning, pos, ctx);
            formation.assign_slot(slot, id);
        }
        formation
    }

    #[test]
    fn test_distribution_cumulative_selection() {
        let dist = KindDistribution::new(vec![(AgentKind::Drone, 0.5), (AgentKind::Soldier, 0.5)]);
        assert_eq!(dist.sample_with(0.0), AgentKind::Drone);
        assert_eq!(dist.sample_with(0.49), AgentKind::Drone);
        assert_eq!(dist.sample_with(0.5), AgentKind::Soldier);
        // Past every bucket: first listed kind
        assert_eq!(dist.sample_with(1.0), AgentKind::Drone);
    }

    #[test]
    fn test_distribution_normalizes_and_falls_back() {
        let dist = KindDistribution::new(vec![(AgentKind::Elite, 3.0), (AgentKind::Soldier, 1.0)]);
        assert_eq!(dist.entries()[0], (AgentKind::Elite, 0.75));
        let empty = KindDistribution::new(vec![(AgentKind::Elite, 0.0)]);
        assert_eq!(empty.entries(), &[(AgentKind::Drone, 1.0)]);
    }

    #[test]
    fn test_distribution_sampling_is_seeded() {
        let dist = KindDistribution::uniform(&[AgentKind::Drone, AgentKind::Soldier, AgentKind::Elite]);
        let draw = |seed| {
            let mut rng = Pcg32::seed_from_u64(seed);
            (0..32).map(|_| dist.sample(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
    }

    #[test]
    fn test_pincer_soldier_slots() {
        let layout = Layout::Pincer {
            arms: 2,
            enemies_per_arm: 5,
            arm_angle: 120.0,
            arm_length: 20.0,
            curvature: 0.0,
        };
        let mut formation = Formation::new(1, layout, FormationMotion::default(), Vec3::ZERO);
        let mut rng = Pcg32::seed_from_u64(4);
        formation.assign_kinds(&KindDistribution::default(), &mut rng);
        assert_eq!(formation.slot_count(), 10);
        assert_eq!(formation.slots_of_kind(AgentKind::Soldier), vec![4, 9]);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut formation = Formation::new(1, grid(1, 2), FormationMotion::default(), Vec3::ZERO);
        assert!(!formation.assign_slot(5, 9));
        assert_eq!(formation.slots(), &[None, None]);
    }

    #[test]
    fn test_center_eases_without_overshoot() {
        let mut ctx = SimContext::new(1);
        let mut pool = AgentPool::with_capacity(4, &Tuning::default());
        let mut formation = populated(grid(1, 1), Vec3::ZERO, &mut pool, &mut ctx);
        formation.target_center = Vec3::new(1.0, 0.0, 0.0);

        // No player: Hold pins the target to the current center
        formation.update(0.1, None, &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Hold);
        assert_eq!(formation.center, Vec3::ZERO);

        // A step of 0.4 lands exactly on a target 0.3 away
        formation.motion.attack_trigger = -1.0;
        let player = Vec3::new(0.3, 0.0, 0.0);
        formation.update(0.1, Some(player), &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Approach);
        assert_eq!(formation.center, player);
    }

    #[test]
    fn test_approach_then_attack_with_hysteresis() {
        let mut ctx = SimContext::new(1);
        let mut pool = AgentPool::with_capacity(4, &Tuning::default());
        let mut formation = populated(grid(2, 2), Vec3::new(0.0, 0.0, 60.0), &mut pool, &mut ctx);
        let player = Vec3::ZERO;

        formation.update(0.1, Some(player), &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Approach);
        let before = formation.center.distance(player);
        formation.update(0.5, Some(player), &mut pool);
        assert!(formation.center.distance(player) < before);

        for _ in 0..200 {
            formation.update(0.1, Some(player), &mut pool);
        }
        assert_eq!(formation.phase(), FormationPhase::Attack);
        assert!((formation.spread() - 1.3).abs() < 1e-6);

        // Between trigger and release: stay in Attack
        formation.update(0.0, Some(Vec3::new(0.0, 0.0, -10.0)), &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Attack);
        formation.update(0.0, Some(Vec3::new(0.0, 0.0, -200.0)), &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Approach);
    }

    #[test]
    fn test_occupants_receive_slot_targets() {
        let mut ctx = SimContext::new(1);
        let mut pool = AgentPool::with_capacity(4, &Tuning::default());
        let mut formation = populated(grid(1, 3), Vec3::new(10.0, 0.0, 0.0), &mut pool, &mut ctx);
        formation.update(0.016, None, &mut pool);

        for (slot, id) in formation.slots().iter().enumerate() {
            let id = id.unwrap();
            assert_eq!(
                pool.get(id).and_then(|a| a.move_target),
                formation.slot_world_position(slot)
            );
        }
    }

    #[test]
    fn test_defeat_and_defend() {
        let mut ctx = SimContext::new(1);
        let mut pool = AgentPool::with_capacity(4, &Tuning::default());
        let mut formation = populated(grid(1, 4), Vec3::ZERO, &mut pool, &mut ctx);
        let ids: Vec<EntityId> = formation.slots().iter().flatten().copied().collect();

        for &id in &ids[..3] {
            if let Some(agent) = pool.get_mut(id) {
                agent.take_damage(1000.0, DamageSource::player(), &mut ctx);
            }
        }
        formation.update(0.016, Some(Vec3::new(0.0, 0.0, 100.0)), &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Defend);
        assert!((formation.spread() - 0.7).abs() < 1e-6);
        assert!(!formation.is_defeated(&pool));

        pool.despawn(ids[3]);
        pool.commit(&mut ctx);
        assert!(formation.is_defeated(&pool));
        formation.update(0.016, None, &mut pool);
        assert_eq!(formation.slots()[3], None);
    }

    #[test]
    fn test_spin_only_while_idle() {
        let mut pool = AgentPool::with_capacity(1, &Tuning::default());
        let motion = FormationMotion {
            rotation_speed: 1.0,
            ..FormationMotion::default()
        };
        let mut formation = Formation::new(1, grid(1, 2), motion, Vec3::ZERO);

        formation.update(0.5, None, &mut pool);
        assert_eq!(formation.phase(), FormationPhase::Hold);
        assert!((formation.rotation - 0.5).abs() < 1e-6);

        // Engaged: face the player, no spin on top
        let player = Vec3::new(100.0, 0.0, 0.0);
        for _ in 0..20 {
            formation.update(0.1, Some(player), &mut pool);
        }
        assert_eq!(formation.phase(), FormationPhase::Approach);
        assert!((formation.rotation - std::f32::consts::FRAC_PI_2).abs() < 0.05);
    }

    #[test]
    fn test_vertical_wave_offsets_slots() {
        let motion = FormationMotion {
            wave_amplitude: 1.0,
            ..FormationMotion::default()
        };
        let mut formation = Formation::new(1, grid(1, 4), motion, Vec3::ZERO);
        formation.wave_phase = 0.3;
        let ys: Vec<f32> = (0..4)
            .filter_map(|s| formation.slot_world_position(s))
            .map(|p| p.y)
            .collect();
        assert!(ys.iter().all(|y| y.abs() <= 1.0));
        assert!((ys[0] - ys[1]).abs() > 1e-3);
    }
}
