//! Combat coordinator
//!
//! Owns one combat session and advances it by one `update(dt)` per fixed
//! step. Order within a tick:
//! 1. physics step, body positions synced back onto agents
//! 2. commander buffs
//! 3. agent state machines (target snapshot taken before any agent moves)
//! 4. wave orchestrator and formations
//! 5. queued agent actions (attacks on the player, pulses, summons)
//! 6. combo decay
//! 7. pool commit (agents deactivated this tick leave the active set)
//! 8. effect flush to the scene

use glam::Vec3;
use serde::Serialize;

use super::EntityId;
use super::agent::AgentKind;
use super::combo::{BreakReason, ComboTracker};
use super::context::SimContext;
use super::damage::{AppliedDamage, AreaEffect, DamageResolver, DamageSource, DamageType, Damageable};
use super::events::{AgentAction, EffectKind, EffectParams, EffectRequest, GameEvent};
use super::pool::AgentPool;
use super::wave::{EncounterConfig, WaveOrchestrator};
use crate::consts::{PLAYER_BODY_RADIUS, PLAYER_ID};
use crate::tuning::Tuning;

/// Initial agent pool size; the pool grows past it on demand
const INITIAL_POOL_CAPACITY: usize = 32;

/// The player as seen by the combat core
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerState {
    pub position: Vec3,
    health: f32,
    pub max_health: f32,
    alive: bool,
}

impl PlayerState {
    pub fn new(max_health: f32, position: Vec3) -> Self {
        Self {
            position,
            health: max_health,
            max_health,
            alive: max_health > 0.0,
        }
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Damageable for PlayerState {
    fn entity_id(&self) -> EntityId {
        PLAYER_ID
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn can_take_damage(&self) -> bool {
        self.alive
    }

    fn take_damage(&mut self, amount: f32, _source: DamageSource, _ctx: &mut SimContext) -> bool {
        if !self.alive || amount <= 0.0 {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.alive = false;
            return true;
        }
        false
    }
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombatStats {
    pub shots_fired: u32,
    /// Shots from `fire` that hit an agent
    pub shots_hit: u32,
    /// Every damaging player hit, including area damage
    pub hits: u32,
    pub criticals: u32,
    pub kills: u32,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub max_combo: u32,
    pub score: u64,
    pub waves_completed: u32,
}

impl CombatStats {
    /// Fraction of fired shots that hit, 0 before the first shot
    pub fn accuracy(&self) -> f32 {
        if self.shots_fired == 0 {
            0.0
        } else {
            self.shots_hit as f32 / self.shots_fired as f32
        }
    }
}

/// Outcome of one player hit on an agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitReport {
    pub target: EntityId,
    pub amount: f32,
    pub critical: bool,
    pub killed: bool,
    pub position: Vec3,
}

pub struct CombatCoordinator {
    ctx: SimContext,
    tuning: Tuning,
    pool: AgentPool,
    orchestrator: WaveOrchestrator,
    resolver: DamageResolver,
    combo: ComboTracker,
    player: PlayerState,
    stats: CombatStats,
}

impl CombatCoordinator {
    pub fn new(mut ctx: SimContext, tuning: Tuning, encounter: EncounterConfig) -> Self {
        let player = PlayerState::new(tuning.player.max_health, Vec3::ZERO);
        ctx.physics.add_body(PLAYER_ID, player.position, PLAYER_BODY_RADIUS);
        Self {
            pool: AgentPool::with_capacity(INITIAL_POOL_CAPACITY, &tuning),
            orchestrator: WaveOrchestrator::new(encounter),
            resolver: DamageResolver::new(tuning.damage.clone()),
            combo: ComboTracker::new(tuning.combo.clone()),
            player,
            stats: CombatStats::default(),
            ctx,
            tuning,
        }
    }

    pub fn ctx(&self) -> &SimContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn orchestrator(&self) -> &WaveOrchestrator {
        &self.orchestrator
    }

    pub fn combo(&self) -> &ComboTracker {
        &self.combo
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn stats(&self) -> &CombatStats {
        &self.stats
    }

    /// Begin the encounter at its first wave
    pub fn start(&mut self) -> bool {
        self.start_wave(None)
    }

    /// Jump to wave `wave`, or the next one
    pub fn start_wave(&mut self, wave: Option<u32>) -> bool {
        self.orchestrator
            .start_wave(wave, &mut self.pool, &self.tuning, &mut self.ctx)
    }

    pub fn set_player_position(&mut self, position: Vec3) {
        self.player.position = position;
        self.ctx.physics.set_position(PLAYER_ID, position);
    }

    /// Hitscan shot: raycast through the physics collaborator and damage the
    /// first living agent hit
    pub fn fire(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        base: f32,
        damage_type: DamageType,
    ) -> Option<HitReport> {
        if !self.player.is_alive() {
            return None;
        }
        self.stats.shots_fired += 1;

        let pool = &self.pool;
        let hit = self.ctx.physics.raycast(
            origin,
            direction.normalize_or_zero(),
            max_distance,
            &|id| id != PLAYER_ID && pool.get(id).is_some_and(|a| a.is_alive()),
        )?;

        let report = self.apply_hit(hit.entity, base, damage_type)?;
        self.stats.shots_hit += 1;
        Some(report)
    }

    /// Damage an agent hit by a player projectile detected elsewhere
    pub fn apply_hit(&mut self, target: EntityId, base: f32, damage_type: DamageType) -> Option<HitReport> {
        let agent = self.pool.get_mut(target).filter(|a| a.can_take_damage())?;
        let position = agent.position;
        let applied = self
            .resolver
            .apply(&mut self.ctx, base, damage_type, DamageSource::player(), agent);
        Some(self.record_hit(applied, position))
    }

    /// Player area damage with linear falloff and knockback
    pub fn detonate(&mut self, center: Vec3, radius: f32, base: f32, damage_type: DamageType) -> Vec<HitReport> {
        self.ctx.request_effect(EffectRequest::Visual {
            kind: EffectKind::Explosion,
            position: center,
            params: EffectParams {
                radius,
                intensity: 1.0,
                source: Some(PLAYER_ID),
                ..EffectParams::default()
            },
        });

        let area = AreaEffect {
            center,
            radius,
            base,
            damage_type,
            source: DamageSource::player(),
        };
        let applied = self
            .resolver
            .resolve_area_effect(&mut self.ctx, &area, self.pool.iter_active_mut(), &[]);

        let knockback = self.tuning.player.explosion_knockback;
        applied
            .into_iter()
            .map(|hit| {
                let position = self.pool.get(hit.target).map_or(center, |a| a.position);
                if knockback > 0.0 {
                    let away = (position - center).with_y(0.0).normalize_or_zero();
                    let scale = self.resolver.falloff(position.distance(center), radius);
                    self.ctx.physics.apply_impulse(hit.target, away * knockback * scale);
                }
                self.record_hit(hit, position)
            })
            .collect()
    }

    /// Stun an agent; returns false when it cannot be stunned
    pub fn stun(&mut self, target: EntityId, duration: f32) -> bool {
        match self.pool.get_mut(target) {
            Some(agent) if agent.is_alive() => {
                agent.stun(duration, &mut self.ctx);
                true
            }
            _ => false,
        }
    }

    fn record_hit(&mut self, applied: AppliedDamage, position: Vec3) -> HitReport {
        self.stats.hits += 1;
        self.stats.damage_dealt += applied.amount;
        if applied.critical {
            self.stats.criticals += 1;
        }

        self.ctx.emit(GameEvent::Hit {
            target: applied.target,
            amount: applied.amount,
            critical: applied.critical,
            position,
        });
        let impact = if applied.critical {
            EffectKind::CriticalImpact
        } else {
            EffectKind::Impact
        };
        self.ctx.request_effect(EffectRequest::visual(impact, position));

        if self.combo.register_hit(applied.amount, applied.critical) {
            self.stats.max_combo = self.stats.max_combo.max(self.combo.count());
            self.ctx.emit(GameEvent::ComboUpdated {
                count: self.combo.count(),
                multiplier: self.combo.multiplier(),
            });
        }

        if applied.killed {
            self.on_kill(applied.target, position);
        }

        HitReport {
            target: applied.target,
            amount: applied.amount,
            critical: applied.critical,
            killed: applied.killed,
            position,
        }
    }

    fn on_kill(&mut self, id: EntityId, position: Vec3) {
        let (kind, points) = self
            .pool
            .get(id)
            .map_or((AgentKind::default(), 0), |a| (a.kind, a.points));
        let awarded = (points as f32 * self.combo.multiplier()).round() as u64;
        self.stats.kills += 1;
        self.stats.score += awarded;
        log::debug!(
            "{} {} defeated for {} points (x{:.2})",
            kind.name(),
            id,
            awarded,
            self.combo.multiplier()
        );
        self.ctx.emit(GameEvent::EnemyDefeated {
            id,
            kind,
            points: awarded,
            position,
        });
        self.orchestrator.notify_agent_defeated(id);
    }

    fn damage_player(&mut self, base: f32, damage_type: DamageType, source: EntityId) {
        if !self.player.is_alive() {
            return;
        }
        let applied = self.resolver.apply(
            &mut self.ctx,
            base,
            damage_type,
            DamageSource::enemy(source),
            &mut self.player,
        );
        self.on_player_hit(applied, source);
    }

    fn on_player_hit(&mut self, applied: AppliedDamage, source: EntityId) {
        if applied.amount <= 0.0 {
            return;
        }
        self.stats.damage_taken += applied.amount;
        self.ctx.emit(GameEvent::PlayerDamaged {
            amount: applied.amount,
            source,
        });

        let reason = if applied.killed {
            BreakReason::PlayerDied
        } else {
            BreakReason::PlayerDamaged
        };
        if let Some(count) = self.combo.break_combo(reason) {
            self.ctx.emit(GameEvent::ComboBroken { count, reason });
        }

        if applied.killed {
            log::info!("Player killed by agent {}", source);
            self.ctx.emit(GameEvent::PlayerDied);
        }
    }

    fn resolve_actions(&mut self) {
        for action in self.ctx.take_actions() {
            match action {
                AgentAction::Attack {
                    source,
                    target,
                    damage,
                    damage_type,
                    ..
                } => {
                    if target == PLAYER_ID {
                        self.damage_player(damage, damage_type, source);
                    } else {
                        log::trace!("Agent {} attack on non-player {} ignored", source, target);
                    }
                }
                AgentAction::AreaPulse {
                    source,
                    center,
                    radius,
                    damage,
                    damage_type,
                } => {
                    let area = AreaEffect {
                        center,
                        radius,
                        base: damage,
                        damage_type,
                        source: DamageSource::enemy(source),
                    };
                    let hits = self.resolver.resolve_area_effect(
                        &mut self.ctx,
                        &area,
                        std::iter::once(&mut self.player),
                        &[source],
                    );
                    for hit in hits {
                        self.on_player_hit(hit, source);
                    }
                }
                AgentAction::Summon {
                    commander,
                    position,
                    count,
                } => {
                    let ids = self.orchestrator.add_reinforcements(
                        position,
                        count,
                        &mut self.pool,
                        &self.tuning,
                        &mut self.ctx,
                    );
                    log::debug!("Commander {} summoned {} agents", commander, ids.len());
                }
            }
        }
    }

    /// Advance the session by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.ctx.advance(dt);

        self.ctx.physics.step(dt);
        for agent in self.pool.iter_active_mut() {
            if let Some(position) = self.ctx.physics.body_position(agent.id) {
                agent.position = position;
            }
        }

        self.pool.apply_commander_buffs();

        let player = self.player.is_alive().then_some(self.player.position);
        let extra: Vec<(EntityId, Vec3)> = player.map(|p| (PLAYER_ID, p)).into_iter().collect();
        let snapshot = self.pool.snapshot(&extra);
        self.pool.update_agents(dt, &mut self.ctx, &snapshot);
        for agent in self.pool.iter_active() {
            self.ctx.physics.set_velocity(agent.id, agent.velocity);
        }

        let seen = self.ctx.events().len();
        self.orchestrator
            .update(dt, player, &mut self.pool, &self.tuning, &mut self.ctx);
        self.stats.waves_completed += self.ctx.events()[seen..]
            .iter()
            .filter(|e| matches!(e, GameEvent::WaveCompleted { .. }))
            .count() as u32;

        self.resolve_actions();

        if let Some(count) = self.combo.update(dt) {
            self.ctx.emit(GameEvent::ComboBroken {
                count,
                reason: BreakReason::Timeout,
            });
        }

        self.pool.commit(&mut self.ctx);
        self.ctx.flush_effects();
    }

    /// Events emitted since the last drain, for UI and audio
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.ctx.drain_events()
    }

    /// Back to a fresh session with the same seed
    pub fn reset(&mut self) {
        self.orchestrator.reset(&mut self.pool, &mut self.ctx);
        self.pool.release_all(&mut self.ctx);
        self.ctx.restart();
        self.combo.reset();
        self.stats = CombatStats::default();
        self.player = PlayerState::new(self.tuning.player.max_health, Vec3::ZERO);
        self.ctx.physics.set_position(PLAYER_ID, self.player.position);
        log::info!("Combat session reset (seed {})", self.ctx.seed());
    }
}

impl std::fmt::Debug for CombatCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatCoordinator")
            .field("ctx", &self.ctx)
            .field("wave", &self.orchestrator.wave())
            .field("active_agents", &self.pool.active_count())
            .field("player", &self.player)
            .field("stats", &self.stats)
            .finish()
    }
}
