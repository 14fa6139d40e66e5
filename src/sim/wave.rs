//! Wave orchestration
//!
//! An encounter is an ordered list of waves; a wave is a list of formation
//! specs, each with a spawn delay relative to wave start. The orchestrator
//! plans every formation when the wave starts (so the enemy total is known
//! up front), spawns them as their delays run out, counts defeats and moves
//! on to the next wave after an intermission.

use std::collections::BTreeSet;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::EntityId;
use super::agent::{AgentKind, SlotRef};
use super::context::SimContext;
use super::events::{EffectRequest, GameEvent, IndicatorKind};
use super::formation::{Formation, FormationMotion, KindDistribution};
use super::layout::{Layout, LayoutKind, MAX_DIAMOND_LAYERS};
use super::pool::AgentPool;
use crate::consts::PLAYER_ID;
use crate::tuning::{AgentStats, ConfigError, Tuning};

/// Per-wave growth of each difficulty factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyGrowth {
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub points: f32,
    pub enemy_count: f32,
}

impl Default for DifficultyGrowth {
    fn default() -> Self {
        Self {
            health: 1.15,
            damage: 1.1,
            speed: 1.03,
            points: 1.2,
            enemy_count: 1.1,
        }
    }
}

/// Multipliers in effect for one wave
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifficultyScaling {
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub points: f32,
    pub enemy_count: f32,
}

impl Default for DifficultyScaling {
    fn default() -> Self {
        Self {
            health: 1.0,
            damage: 1.0,
            speed: 1.0,
            points: 1.0,
            enemy_count: 1.0,
        }
    }
}

impl DifficultyScaling {
    /// Factors for the wave with zero-based index `index` (`growth^index`);
    /// growth under 1 is treated as 1 so difficulty never drops
    pub fn for_wave(growth: &DifficultyGrowth, index: u32) -> Self {
        let n = index.min(i32::MAX as u32) as i32;
        let f = |g: f32| g.max(1.0).powi(n);
        Self {
            health: f(growth.health),
            damage: f(growth.damage),
            speed: f(growth.speed),
            points: f(growth.points),
            enemy_count: f(growth.enemy_count),
        }
    }

    /// Scaled copy of base stats
    pub fn apply(&self, base: &AgentStats) -> AgentStats {
        AgentStats {
            max_health: base.max_health * self.health,
            max_shield: base.max_shield * self.health,
            damage: base.damage * self.damage,
            move_speed: base.move_speed * self.speed,
            points: (base.points as f32 * self.points).round() as u32,
            ..base.clone()
        }
    }

    /// Scaled enemy count, never below one
    pub fn count(&self, base: u32) -> u32 {
        ((base as f32 * self.enemy_count).round() as u32).max(1)
    }
}

/// Optional layout parameters; anything missing is derived or defaulted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub spacing: Option<f32>,
    pub layers: Option<u32>,
    pub arms: Option<u32>,
    pub enemies_per_arm: Option<u32>,
    pub arm_angle: Option<f32>,
    pub arm_length: Option<f32>,
    pub curvature: Option<f32>,
    pub center: Option<bool>,
    pub inner_count: Option<u32>,
    pub inner_radius: Option<f32>,
    pub outer_count: Option<u32>,
    pub outer_radius: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindWeight {
    pub kind: String,
    pub weight: f32,
}

/// One formation entry of a wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationSpec {
    #[serde(rename = "type")]
    pub formation_type: String,
    /// Enemy count before scaling; sizes the layout when set
    pub count: Option<u32>,
    pub position: Vec3,
    /// Sampled uniformly when no distribution is given
    pub enemy_types: Vec<String>,
    pub enemy_type_distribution: Vec<KindWeight>,
    /// Seconds after wave start
    pub spawn_delay: f32,
    pub layout: LayoutParams,
    pub motion: FormationMotion,
}

impl Default for FormationSpec {
    fn default() -> Self {
        Self {
            formation_type: "grid".to_string(),
            count: None,
            position: Vec3::new(0.0, 0.0, 45.0),
            enemy_types: Vec::new(),
            enemy_type_distribution: Vec::new(),
            spawn_delay: 0.0,
            layout: LayoutParams::default(),
            motion: FormationMotion::default(),
        }
    }
}

impl FormationSpec {
    pub fn layout_kind(&self) -> LayoutKind {
        LayoutKind::from_name_or_default(&self.formation_type)
    }

    /// Concrete layout for an optional target enemy count; oversized
    /// parameters are clamped with a warning
    pub fn build_layout(&self, count: Option<u32>) -> Layout {
        let p = &self.layout;
        let layout = match self.layout_kind() {
            LayoutKind::Grid => {
                let n = count.unwrap_or(12).max(1);
                let columns = p
                    .columns
                    .unwrap_or_else(|| (n as f32).sqrt().ceil() as u32)
                    .max(1);
                Layout::Grid {
                    rows: p.rows.unwrap_or(n.div_ceil(columns)),
                    columns,
                    spacing: p.spacing.unwrap_or(3.0),
                }
            }
            LayoutKind::Diamond => {
                let layers = p.layers.unwrap_or_else(|| match count {
                    Some(n) => (0..=MAX_DIAMOND_LAYERS)
                        .find(|&l| 1 + 2 * l * (l + 1) >= n)
                        .unwrap_or(MAX_DIAMOND_LAYERS),
                    None => 2,
                });
                Layout::Diamond {
                    layers,
                    spacing: p.spacing.unwrap_or(4.0),
                }
            }
            LayoutKind::Pincer => {
                let arms = p.arms.unwrap_or(2).max(1);
                Layout::Pincer {
                    arms,
                    enemies_per_arm: p
                        .enemies_per_arm
                        .unwrap_or_else(|| count.map_or(5, |n| n.div_ceil(arms))),
                    arm_angle: p.arm_angle.unwrap_or(90.0),
                    arm_length: p.arm_length.unwrap_or(20.0),
                    curvature: p.curvature.unwrap_or(0.15),
                }
            }
            LayoutKind::EliteSquad => {
                let center = p.center.unwrap_or(true);
                let ring_total = count.map(|n| n.saturating_sub(center as u32));
                let inner_count = p
                    .inner_count
                    .unwrap_or_else(|| ring_total.map_or(4, |r| (r / 3).clamp(1, 6).min(r)));
                let outer_count = p
                    .outer_count
                    .unwrap_or_else(|| ring_total.map_or(6, |r| r.saturating_sub(inner_count)));
                Layout::EliteSquad {
                    center,
                    inner_count,
                    inner_radius: p.inner_radius.unwrap_or(4.0),
                    outer_count,
                    outer_radius: p.outer_radius.unwrap_or(9.0),
                }
            }
        };
        layout.clamped()
    }

    /// Kind table for slots without a fixed role
    pub fn distribution(&self) -> KindDistribution {
        if !self.enemy_type_distribution.is_empty() {
            KindDistribution::new(
                self.enemy_type_distribution
                    .iter()
                    .map(|w| (AgentKind::from_name_or_default(&w.kind), w.weight))
                    .collect(),
            )
        } else if !self.enemy_types.is_empty() {
            let kinds: Vec<AgentKind> = self
                .enemy_types
                .iter()
                .map(|name| AgentKind::from_name_or_default(name))
                .collect();
            KindDistribution::uniform(&kinds)
        } else {
            KindDistribution::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub formations: Vec<FormationSpec>,
}

/// Complete encounter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    pub waves: Vec<WaveConfig>,
    /// Intermission between waves (seconds)
    pub wave_delay: f32,
    /// Keep repeating the last wave instead of finishing
    pub endless: bool,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        fn spec(
            formation_type: &str,
            count: Option<u32>,
            position: Vec3,
            types: &[(&str, f32)],
            spawn_delay: f32,
        ) -> FormationSpec {
            FormationSpec {
                formation_type: formation_type.to_string(),
                count,
                position,
                enemy_type_distribution: types
                    .iter()
                    .map(|&(kind, weight)| KindWeight {
                        kind: kind.to_string(),
                        weight,
                    })
                    .collect(),
                spawn_delay,
                ..FormationSpec::default()
            }
        }
        Self {
            waves: vec![
                WaveConfig {
                    formations: vec![
                        spec("grid", Some(6), Vec3::new(0.0, 0.0, 45.0), &[("drone", 1.0)], 0.0),
                        spec(
                            "pincer",
                            Some(8),
                            Vec3::new(0.0, 0.0, -45.0),
                            &[("drone", 0.7), ("soldier", 0.3)],
                            4.0,
                        ),
                    ],
                },
                WaveConfig {
                    formations: vec![
                        spec(
                            "grid",
                            Some(8),
                            Vec3::new(-40.0, 0.0, 20.0),
                            &[("drone", 0.5), ("soldier", 0.5)],
                            0.0,
                        ),
                        spec("elite-squad", Some(7), Vec3::new(40.0, 0.0, 20.0), &[], 3.0),
                    ],
                },
                WaveConfig {
                    formations: vec![
                        spec("diamond", None, Vec3::new(0.0, 0.0, 50.0), &[], 0.0),
                        spec(
                            "pincer",
                            Some(10),
                            Vec3::new(0.0, 0.0, -50.0),
                            &[("drone", 0.6), ("soldier", 0.3), ("elite", 0.1)],
                            5.0,
                        ),
                    ],
                },
            ],
            wave_delay: 5.0,
            endless: false,
        }
    }
}

impl EncounterConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&json)?;
        log::info!(
            "Loaded encounter with {} waves from {}",
            config.waves.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Config for 1-based wave `wave`; endless encounters repeat the last one
    pub fn wave(&self, wave: u32) -> Option<&WaveConfig> {
        let index = wave.checked_sub(1)? as usize;
        self.waves
            .get(index)
            .or_else(|| if self.endless { self.waves.last() } else { None })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub enum WavePhase {
    /// Nothing started yet
    #[default]
    Idle,
    Active,
    /// Countdown to the next wave
    Intermission { remaining: f32 },
    /// Encounter exhausted
    Finished,
}

/// A planned formation waiting for its spawn delay
#[derive(Debug, Clone)]
struct PendingFormation {
    formation: Formation,
    delay: f32,
    /// Slots to populate, in slot order
    placed: usize,
}

#[derive(Debug, Clone)]
pub struct WaveOrchestrator {
    config: EncounterConfig,
    phase: WavePhase,
    /// Current 1-based wave number, 0 before the first wave
    wave: u32,
    scaling: DifficultyScaling,
    pending: Vec<PendingFormation>,
    formations: Vec<Formation>,
    /// Retired formations kept for reuse
    spare: Vec<Formation>,
    /// Live agents counted toward the current wave
    members: BTreeSet<EntityId>,
    total_enemies: u32,
    remaining: u32,
    next_formation_id: u32,
}

impl WaveOrchestrator {
    pub fn new(config: EncounterConfig) -> Self {
        Self {
            config,
            phase: WavePhase::Idle,
            wave: 0,
            scaling: DifficultyScaling::default(),
            pending: Vec::new(),
            formations: Vec::new(),
            spare: Vec::new(),
            members: BTreeSet::new(),
            total_enemies: 0,
            remaining: 0,
            next_formation_id: 1,
        }
    }

    pub fn config(&self) -> &EncounterConfig {
        &self.config
    }

    pub fn phase(&self) -> WavePhase {
        self.phase
    }

    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn scaling(&self) -> DifficultyScaling {
        self.scaling
    }

    pub fn total_enemies(&self) -> u32 {
        self.total_enemies
    }

    /// Enemies of the current wave not yet defeated
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn formations(&self) -> &[Formation] {
        &self.formations
    }

    pub fn pending_formations(&self) -> usize {
        self.pending.len()
    }

    pub fn is_member(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    fn take_formation(&mut self, layout: Layout, motion: FormationMotion, center: Vec3) -> Formation {
        let id = self.next_formation_id;
        self.next_formation_id += 1;
        match self.spare.pop() {
            Some(mut formation) => {
                formation.configure(id, layout, motion, center);
                formation
            }
            None => Formation::new(id, layout, motion, center),
        }
    }

    fn retire_formations(&mut self) {
        for mut formation in self.formations.drain(..) {
            formation.deactivate();
            self.spare.push(formation);
        }
        for pending in self.pending.drain(..) {
            let mut formation = pending.formation;
            formation.deactivate();
            self.spare.push(formation);
        }
    }

    /// Start wave `wave` (or the next one); returns false when there is none
    pub fn start_wave(
        &mut self,
        wave: Option<u32>,
        pool: &mut AgentPool,
        tuning: &Tuning,
        ctx: &mut SimContext,
    ) -> bool {
        let wave = wave.unwrap_or(self.wave + 1).max(1);
        let Some(config) = self.config.wave(wave).cloned() else {
            log::warn!("No wave {} configured", wave);
            self.finish(ctx);
            return false;
        };

        self.retire_formations();
        self.members.clear();
        self.wave = wave;
        self.scaling = DifficultyScaling::for_wave(&tuning.difficulty, wave - 1);

        for spec in &config.formations {
            let count = spec.count.map(|c| self.scaling.count(c));
            let layout = spec.build_layout(count);
            let mut formation = self.take_formation(layout, spec.motion, spec.position);
            formation.assign_kinds(&spec.distribution(), &mut ctx.rng);
            let placed = count.map_or(formation.slot_count(), |c| (c as usize).min(formation.slot_count()));
            self.pending.push(PendingFormation {
                formation,
                delay: spec.spawn_delay,
                placed,
            });
        }

        self.total_enemies = self.pending.iter().map(|p| p.placed as u32).sum();
        self.remaining = self.total_enemies;
        self.phase = WavePhase::Active;
        log::info!(
            "Wave {} started: {} formations, {} enemies (health x{:.2}, damage x{:.2})",
            wave,
            config.formations.len(),
            self.total_enemies,
            self.scaling.health,
            self.scaling.damage
        );
        ctx.emit(GameEvent::WaveStarted {
            wave,
            total_enemies: self.total_enemies,
        });

        self.spawn_due(pool, tuning, ctx);
        true
    }

    /// Instantiate every pending formation whose delay has run out
    fn spawn_due(&mut self, pool: &mut AgentPool, tuning: &Tuning, ctx: &mut SimContext) {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.delay <= 0.0);
        self.pending = waiting;

        for pending in due {
            let mut formation = pending.formation;
            self.populate(&mut formation, pending.placed, pool, tuning, ctx);
            self.formations.push(formation);
        }
    }

    fn populate(
        &mut self,
        formation: &mut Formation,
        placed: usize,
        pool: &mut AgentPool,
        tuning: &Tuning,
        ctx: &mut SimContext,
    ) {
        let drones = (0..placed)
            .filter(|&s| formation.slot_kind(s) == Some(AgentKind::Drone))
            .count() as u32;
        let mut drone_index = 0;

        for slot in 0..placed {
            let (Some(kind), Some(position)) = (formation.slot_kind(slot), formation.slot_world_position(slot))
            else {
                continue;
            };
            let stats = self.scaling.apply(tuning.stats(kind));
            let id = pool.acquire(kind, &stats, tuning, position, ctx);
            if let Some(agent) = pool.get_mut(id) {
                agent.set_target(Some(PLAYER_ID));
                agent.slot = Some(SlotRef {
                    formation: formation.id,
                    slot,
                });
                agent.move_target = Some(position);
                if kind == AgentKind::Drone {
                    agent.set_swarm_slot(drone_index, drones);
                    drone_index += 1;
                }
            }
            formation.assign_slot(slot, id);
            self.members.insert(id);
            Self::attach_indicator(kind, id, ctx);
        }
        log::debug!(
            "Formation {} ({:?}) spawned {} agents at {}",
            formation.id,
            formation.layout().kind(),
            placed,
            formation.center
        );
    }

    fn attach_indicator(kind: AgentKind, id: EntityId, ctx: &mut SimContext) {
        let indicator = match kind {
            AgentKind::Elite => IndicatorKind::Shield,
            AgentKind::Commander => IndicatorKind::CommandAura,
            _ => return,
        };
        ctx.request_effect(EffectRequest::Indicator {
            agent: id,
            kind: indicator,
        });
    }

    /// Extra enemies (commander summons) counted toward the current wave
    pub fn add_reinforcements(
        &mut self,
        around: Vec3,
        count: u32,
        pool: &mut AgentPool,
        tuning: &Tuning,
        ctx: &mut SimContext,
    ) -> Vec<EntityId> {
        if self.phase != WavePhase::Active || count == 0 {
            return Vec::new();
        }
        let stats = self.scaling.apply(tuning.stats(AgentKind::Drone));
        let ids: Vec<EntityId> = (0..count)
            .map(|i| {
                let angle = std::f32::consts::TAU * i as f32 / count as f32;
                let position = around + crate::polar_to_ground(3.0, angle);
                let id = pool.acquire(AgentKind::Drone, &stats, tuning, position, ctx);
                if let Some(agent) = pool.get_mut(id) {
                    agent.set_target(Some(PLAYER_ID));
                    agent.set_swarm_slot(i, count);
                }
                id
            })
            .collect();
        self.members.extend(ids.iter().copied());
        self.total_enemies += count;
        self.remaining += count;
        log::debug!("{} reinforcements joined wave {}", count, self.wave);
        ids
    }

    /// Count a defeat; returns false for agents not in this wave or already counted
    pub fn notify_agent_defeated(&mut self, id: EntityId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        true
    }

    pub fn update(
        &mut self,
        dt: f32,
        player: Option<Vec3>,
        pool: &mut AgentPool,
        tuning: &Tuning,
        ctx: &mut SimContext,
    ) {
        match self.phase {
            WavePhase::Idle | WavePhase::Finished => {}
            WavePhase::Intermission { remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.start_wave(None, pool, tuning, ctx);
                } else {
                    self.phase = WavePhase::Intermission { remaining };
                }
            }
            WavePhase::Active => {
                for pending in &mut self.pending {
                    pending.delay -= dt;
                }
                self.spawn_due(pool, tuning, ctx);

                for formation in &mut self.formations {
                    formation.update(dt, player, pool);
                }

                // Members that vanished without a defeat notification
                let lost: Vec<EntityId> = self
                    .members
                    .iter()
                    .copied()
                    .filter(|&id| !pool.get(id).is_some_and(|a| a.is_alive()))
                    .collect();
                for id in lost {
                    self.notify_agent_defeated(id);
                }

                let (defeated, fighting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.formations)
                    .into_iter()
                    .partition(|f| f.is_defeated(pool));
                self.formations = fighting;
                for mut formation in defeated {
                    log::debug!("Formation {} defeated", formation.id);
                    formation.deactivate();
                    self.spare.push(formation);
                }

                if self.remaining == 0 && self.pending.is_empty() {
                    self.complete_wave(ctx);
                }
            }
        }
    }

    fn complete_wave(&mut self, ctx: &mut SimContext) {
        log::info!("Wave {} complete", self.wave);
        ctx.emit(GameEvent::WaveCompleted { wave: self.wave });
        self.retire_formations();
        if self.config.wave(self.wave + 1).is_some() {
            self.phase = WavePhase::Intermission {
                remaining: self.config.wave_delay,
            };
        } else {
            self.finish(ctx);
        }
    }

    fn finish(&mut self, ctx: &mut SimContext) {
        if self.phase == WavePhase::Finished {
            return;
        }
        log::info!("All waves complete");
        self.phase = WavePhase::Finished;
        ctx.emit(GameEvent::AllWavesComplete);
    }

    /// Despawn the wave's agents and return to the pre-encounter state
    pub fn reset(&mut self, pool: &mut AgentPool, ctx: &mut SimContext) {
        for &id in &self.members {
            pool.despawn(id);
        }
        pool.commit(ctx);
        self.retire_formations();
        self.members.clear();
        self.phase = WavePhase::Idle;
        self.wave = 0;
        self.scaling = DifficultyScaling::default();
        self.total_enemies = 0;
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::damage::DamageSource;
    use crate::sim::formation::FormationPhase;
    use proptest::prelude::*;

    fn grid_spec(count: u32, delay: f32) -> FormationSpec {
        FormationSpec {
            formation_type: "grid".into(),
            count: Some(count),
            spawn_delay: delay,
            ..FormationSpec::default()
        }
    }

    fn encounter(waves: Vec<Vec<FormationSpec>>) -> EncounterConfig {
        EncounterConfig {
            waves: waves
                .into_iter()
                .map(|formations| WaveConfig { formations })
                .collect(),
            wave_delay: 2.0,
            endless: false,
        }
    }

    /// Tuning with flat difficulty so counts stay as configured
    fn flat() -> Tuning {
        Tuning {
            difficulty: DifficultyGrowth {
                health: 1.0,
                damage: 1.0,
                speed: 1.0,
                points: 1.0,
                enemy_count: 1.0,
            },
            ..Tuning::default()
        }
    }

    fn kill_all(pool: &mut AgentPool, orchestrator: &mut WaveOrchestrator, ctx: &mut SimContext) {
        for id in pool.active_ids() {
            if let Some(agent) = pool.get_mut(id) {
                if agent.take_damage(1e6, DamageSource::player(), ctx) {
                    orchestrator.notify_agent_defeated(id);
                }
            }
        }
    }

    #[test]
    fn test_total_matches_placed_agents() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let diamond = FormationSpec {
            formation_type: "diamond".into(),
            layout: LayoutParams {
                layers: Some(2),
                ..LayoutParams::default()
            },
            spawn_delay: 1.0,
            ..FormationSpec::default()
        };
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![vec![grid_spec(5, 0.0), diamond]]));

        assert!(orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx));
        assert_eq!(orchestrator.total_enemies(), 5 + 13);
        assert_eq!(pool.active_count(), 5);
        assert_eq!(orchestrator.pending_formations(), 1);

        orchestrator.update(1.1, None, &mut pool, &tuning, &mut ctx);
        assert_eq!(pool.active_count(), 18);
        assert_eq!(orchestrator.remaining(), 18);
        assert_eq!(
            ctx.events().first(),
            Some(&GameEvent::WaveStarted {
                wave: 1,
                total_enemies: 18
            })
        );
    }

    #[test]
    fn test_partial_diamond_approaches_at_full_strength() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let diamond = FormationSpec {
            formation_type: "diamond".into(),
            count: Some(6),
            ..FormationSpec::default()
        };
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![vec![diamond]]));
        orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx);
        orchestrator.update(0.1, Some(Vec3::ZERO), &mut pool, &tuning, &mut ctx);

        let formation = &orchestrator.formations()[0];
        assert_eq!(formation.slot_count(), 13);
        assert_eq!(formation.living_count(&pool), 6);
        assert_eq!(formation.phase(), FormationPhase::Approach);
        assert_eq!(formation.spread(), 1.0);
    }

    #[test]
    fn test_completion_intermission_and_finish() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let mut orchestrator =
            WaveOrchestrator::new(encounter(vec![vec![grid_spec(3, 0.0)], vec![grid_spec(2, 0.0)]]));

        orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx);
        kill_all(&mut pool, &mut orchestrator, &mut ctx);
        orchestrator.update(0.1, None, &mut pool, &tuning, &mut ctx);
        assert!(matches!(orchestrator.phase(), WavePhase::Intermission { .. }));
        assert!(ctx.events().contains(&GameEvent::WaveCompleted { wave: 1 }));

        orchestrator.update(2.5, None, &mut pool, &tuning, &mut ctx);
        assert_eq!(orchestrator.wave(), 2);
        assert_eq!(orchestrator.phase(), WavePhase::Active);
        assert_eq!(orchestrator.total_enemies(), 2);

        kill_all(&mut pool, &mut orchestrator, &mut ctx);
        orchestrator.update(0.1, None, &mut pool, &tuning, &mut ctx);
        assert_eq!(orchestrator.phase(), WavePhase::Finished);
        let finished = ctx
            .events()
            .iter()
            .filter(|e| **e == GameEvent::AllWavesComplete)
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn test_wave_waits_for_delayed_formations() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let mut orchestrator =
            WaveOrchestrator::new(encounter(vec![vec![grid_spec(2, 0.0), grid_spec(2, 3.0)]]));

        orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx);
        kill_all(&mut pool, &mut orchestrator, &mut ctx);
        orchestrator.update(0.5, None, &mut pool, &tuning, &mut ctx);
        assert_eq!(orchestrator.phase(), WavePhase::Active);
        assert_eq!(orchestrator.remaining(), 2);
    }

    #[test]
    fn test_endless_repeats_last_wave_with_scaling() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let mut config = encounter(vec![vec![grid_spec(4, 0.0)]]);
        config.endless = true;
        let mut orchestrator = WaveOrchestrator::new(config);

        assert!(orchestrator.start_wave(Some(8), &mut pool, &tuning, &mut ctx));
        assert_eq!(orchestrator.wave(), 8);
        // 4 × 1.1^7 ≈ 7.8
        assert_eq!(orchestrator.total_enemies(), 8);
        assert!(orchestrator.scaling().health > 2.0);
    }

    #[test]
    fn test_missing_wave_finishes() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(1, &tuning);
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![]));
        assert!(!orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx));
        assert_eq!(orchestrator.phase(), WavePhase::Finished);
        assert_eq!(ctx.events(), &[GameEvent::AllWavesComplete]);
    }

    #[test]
    fn test_unknown_formation_type_falls_back_to_grid() {
        let spec = FormationSpec {
            formation_type: "hexagon".into(),
            count: Some(4),
            enemy_types: vec!["drone".into(), "mech".into()],
            ..FormationSpec::default()
        };
        assert!(matches!(spec.build_layout(Some(4)), Layout::Grid { rows: 2, columns: 2, .. }));
        let distribution = spec.distribution();
        assert!(distribution.entries().iter().all(|&(kind, _)| kind == AgentKind::Drone));
    }

    #[test]
    fn test_oversized_layout_params_are_clamped() {
        let huge_grid = FormationSpec {
            layout: LayoutParams {
                rows: Some(70_000),
                columns: Some(70_000),
                ..LayoutParams::default()
            },
            ..FormationSpec::default()
        };
        assert_eq!(huge_grid.build_layout(None).slot_count(), 64 * 64);

        let huge_diamond = FormationSpec {
            formation_type: "diamond".into(),
            layout: LayoutParams {
                layers: Some(50_000),
                ..LayoutParams::default()
            },
            ..FormationSpec::default()
        };
        assert!(matches!(huge_diamond.build_layout(None), Layout::Diamond { layers: 16, .. }));

        // Derived from a count too large for any layout
        let counted = FormationSpec {
            formation_type: "diamond".into(),
            ..FormationSpec::default()
        };
        assert!(matches!(counted.build_layout(Some(u32::MAX)), Layout::Diamond { layers: 16, .. }));
    }

    #[test]
    fn test_reinforcements_extend_the_wave() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![vec![grid_spec(2, 0.0)]]));
        orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx);

        let ids = orchestrator.add_reinforcements(Vec3::ZERO, 3, &mut pool, &tuning, &mut ctx);
        assert_eq!(ids.len(), 3);
        assert_eq!(orchestrator.total_enemies(), 5);
        assert_eq!(orchestrator.remaining(), 5);
        assert!(ids.iter().all(|&id| orchestrator.is_member(id)));
        assert!(orchestrator.notify_agent_defeated(ids[0]));
        assert!(!orchestrator.notify_agent_defeated(ids[0]));
        assert_eq!(orchestrator.remaining(), 4);
    }

    #[test]
    fn test_reset_despawns_wave() {
        let tuning = flat();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![vec![grid_spec(4, 0.0)]]));
        orchestrator.start_wave(None, &mut pool, &tuning, &mut ctx);
        orchestrator.reset(&mut pool, &mut ctx);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(orchestrator.phase(), WavePhase::Idle);
        assert!(orchestrator.formations().is_empty());
    }

    #[test]
    fn test_elites_get_indicators_and_scaled_stats() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(5);
        let mut pool = AgentPool::with_capacity(8, &tuning);
        let squad = FormationSpec {
            formation_type: "elite-squad".into(),
            layout: LayoutParams {
                inner_count: Some(2),
                outer_count: Some(0),
                ..LayoutParams::default()
            },
            ..FormationSpec::default()
        };
        let mut orchestrator = WaveOrchestrator::new(encounter(vec![vec![squad.clone()], vec![squad]]));
        orchestrator.start_wave(Some(2), &mut pool, &tuning, &mut ctx);

        let indicators = ctx
            .effects()
            .iter()
            .filter(|e| matches!(e, EffectRequest::Indicator { .. }))
            .count();
        assert_eq!(indicators, 3);
        let elite = pool.iter_active().find(|a| a.kind == AgentKind::Elite).unwrap();
        assert!((elite.max_health - 120.0 * 1.15).abs() < 1e-3);
    }

    #[test]
    fn test_encounter_json_uses_type_key() {
        let json = r#"{
            "waves": [{ "formations": [
                { "type": "pincer", "count": 6, "position": [0.0, 0.0, 30.0],
                  "enemy_type_distribution": [{ "kind": "soldier", "weight": 1.0 }] }
            ]}],
            "endless": true
        }"#;
        let config = EncounterConfig::from_json(json).unwrap();
        let spec = &config.waves[0].formations[0];
        assert_eq!(spec.layout_kind(), LayoutKind::Pincer);
        assert_eq!(spec.position, Vec3::new(0.0, 0.0, 30.0));
        assert_eq!(config.wave_delay, EncounterConfig::default().wave_delay);
        assert!(config.wave(5).is_some());
    }

    #[test]
    fn test_demo_encounter_reloads_from_json() {
        let config = EncounterConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"type\": \"elite-squad\""));
        assert_eq!(EncounterConfig::from_json(&json).unwrap(), config);
    }

    proptest! {
        #[test]
        fn prop_scaling_compounds_monotonically(n in 0u32..40) {
            let growth = DifficultyGrowth::default();
            let a = DifficultyScaling::for_wave(&growth, n);
            let b = DifficultyScaling::for_wave(&growth, n + 1);
            prop_assert!(b.health >= a.health);
            prop_assert!(b.damage >= a.damage);
            prop_assert!(b.speed >= a.speed);
            prop_assert!(b.points >= a.points);
            prop_assert!(b.enemy_count >= a.enemy_count);
        }

        #[test]
        fn prop_counted_layouts_hold_enough_slots(n in 1u32..60) {
            for name in ["grid", "diamond", "pincer", "elite-squad"] {
                let spec = FormationSpec { formation_type: name.into(), ..FormationSpec::default() };
                prop_assert!(spec.build_layout(Some(n)).slot_count() >= n as usize);
            }
        }
    }
}
