//! Enemy agents and their state machine
//!
//! An agent is a tagged variant: the FSM core here is shared by every kind,
//! and kind-specific tactics are injected through the behavior table in
//! [`super::behavior`]. Waiting (stun, death animation, charges) is always a
//! countdown field decremented by `dt`, never a timer callback.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::EntityId;
use super::behavior::{self, KindState, Override};
use super::context::SimContext;
use super::damage::{DamageSource, DamageType, Damageable, Shield};
use super::events::{AgentAction, EffectKind, EffectParams, EffectRequest};
use super::pool::TargetSnapshot;
use crate::consts::{ARRIVAL_EPSILON, CHASE_GIVE_UP_FACTOR};
use crate::tuning::{AgentStats, Tuning};
use crate::{damp_angle, heading};

/// Enemy archetypes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AgentKind {
    #[default]
    Drone,
    Soldier,
    Elite,
    Commander,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Drone,
        AgentKind::Soldier,
        AgentKind::Elite,
        AgentKind::Commander,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Drone => "drone",
            AgentKind::Soldier => "soldier",
            AgentKind::Elite => "elite",
            AgentKind::Commander => "commander",
        }
    }

    /// Parse a config name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Parse a config name, falling back to [`AgentKind::Drone`] with a warning
    pub fn from_name_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown enemy type '{}', using drone", name);
            Self::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Faction {
    Player,
    #[default]
    Hostile,
}

/// FSM state with its per-state data
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Patrol,
    Chase,
    Attack,
    Flee,
    Stunned {
        remaining: f32,
    },
    /// Terminal until the death animation runs out
    Dead {
        remaining: f32,
    },
    /// Soldier: moving to a hiding spot
    Cover {
        destination: Vec3,
    },
    /// Elite: charging a teleport
    Teleport {
        destination: Vec3,
        charge: f32,
    },
    /// Elite: charging an area pulse
    SpecialAttack {
        charge: f32,
    },
    /// Commander: calling reinforcements
    Summon {
        remaining: f32,
    },
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Patrol => "patrol",
            AgentState::Chase => "chase",
            AgentState::Attack => "attack",
            AgentState::Flee => "flee",
            AgentState::Stunned { .. } => "stunned",
            AgentState::Dead { .. } => "dead",
            AgentState::Cover { .. } => "cover",
            AgentState::Teleport { .. } => "teleport",
            AgentState::SpecialAttack { .. } => "special_attack",
            AgentState::Summon { .. } => "summon",
        }
    }

    /// Kind-specific extension states
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            AgentState::Cover { .. }
                | AgentState::Teleport { .. }
                | AgentState::SpecialAttack { .. }
                | AgentState::Summon { .. }
        )
    }

    fn same_variant(&self, other: &AgentState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Back-reference to the formation slot an agent occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub formation: u32,
    pub slot: usize,
}

/// A single enemy
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: EntityId,
    pub kind: AgentKind,
    pub faction: Faction,

    health: f32,
    pub max_health: f32,
    pub shield: Option<Shield>,
    alive: bool,
    /// Pooled agents are inactive and excluded from every query
    active: bool,

    pub position: Vec3,
    pub velocity: Vec3,
    /// Yaw in radians
    pub facing: f32,
    pub move_speed: f32,
    pub turn_speed: f32,

    /// Weak reference, resolved each tick through a [`TargetSnapshot`]
    target: Option<EntityId>,
    pub detection_range: f32,
    pub attack_range: f32,
    /// Attacks per second
    pub attack_rate: f32,
    last_attack: f32,
    pub damage: f32,
    pub damage_type: DamageType,
    /// Commander aura multiplier, recomputed every tick
    pub damage_buff: f32,
    pub points: u32,
    pub flee_threshold: Option<f32>,
    pub resistances: BTreeMap<DamageType, f32>,

    state: AgentState,
    /// Seconds spent in the current state
    state_time: f32,
    pub slot: Option<SlotRef>,
    /// Formation slot position pushed each tick
    pub move_target: Option<Vec3>,
    pub waypoints: Vec<Vec3>,
    pub waypoint_index: usize,

    pub(crate) kind_state: KindState,
    death_animation: f32,
    last_damage_source: Option<DamageSource>,
}

impl Agent {
    /// A pooled (inactive) agent configured for `kind`
    pub fn new(id: EntityId, kind: AgentKind, stats: &AgentStats, tuning: &Tuning) -> Self {
        let mut agent = Self {
            id,
            kind,
            faction: Faction::Hostile,
            health: 0.0,
            max_health: 0.0,
            shield: None,
            alive: false,
            active: false,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            facing: 0.0,
            move_speed: 0.0,
            turn_speed: 0.0,
            target: None,
            detection_range: 0.0,
            attack_range: 0.0,
            attack_rate: 0.0,
            last_attack: f32::NEG_INFINITY,
            damage: 0.0,
            damage_type: DamageType::default(),
            damage_buff: 1.0,
            points: 0,
            flee_threshold: None,
            resistances: BTreeMap::new(),
            state: AgentState::Idle,
            state_time: 0.0,
            slot: None,
            move_target: None,
            waypoints: Vec::new(),
            waypoint_index: 0,
            kind_state: KindState::for_kind(kind, tuning),
            death_animation: tuning.death_animation,
            last_damage_source: None,
        };
        agent.configure(kind, stats, tuning);
        agent
    }

    /// Load kind and stats; vitals are set on [`Agent::activate`]
    pub fn configure(&mut self, kind: AgentKind, stats: &AgentStats, tuning: &Tuning) {
        self.kind = kind;
        self.max_health = stats.max_health.max(1.0);
        self.shield = (stats.max_shield > 0.0).then(|| {
            Shield::new(
                stats.max_shield,
                stats.shield_regen_rate,
                stats.shield_regen_delay,
                tuning.damage.shield_overflow,
            )
        });
        self.move_speed = stats.move_speed;
        self.turn_speed = stats.turn_speed;
        self.detection_range = stats.detection_range;
        self.attack_range = stats.attack_range;
        self.attack_rate = stats.attack_rate;
        self.damage = stats.damage;
        self.damage_type = stats.damage_type;
        self.points = stats.points;
        self.flee_threshold = stats.flee_threshold;
        self.resistances = stats.resistances.clone();
        self.kind_state = KindState::for_kind(kind, tuning);
        self.death_animation = tuning.death_animation;
    }

    /// Place in the world with full vitals, state Idle
    pub fn activate(&mut self, position: Vec3) {
        self.health = self.max_health;
        self.alive = true;
        self.active = true;
        if let Some(shield) = self.shield.as_mut() {
            shield.restore();
        }
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.facing = 0.0;
        self.target = None;
        self.last_attack = f32::NEG_INFINITY;
        self.damage_buff = 1.0;
        self.state = AgentState::Idle;
        self.state_time = 0.0;
        self.waypoints.clear();
        self.waypoint_index = 0;
        self.kind_state.reset();
        self.last_damage_source = None;
    }

    /// Return to the pool; drops every reference the agent held
    pub fn deactivate(&mut self) {
        self.active = false;
        self.target = None;
        self.velocity = Vec3::ZERO;
        self.slot = None;
        self.move_target = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn health_fraction(&self) -> f32 {
        self.health / self.max_health
    }

    pub fn shield_strength(&self) -> Option<f32> {
        self.shield.map(|s| s.strength)
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn state_time(&self) -> f32 {
        self.state_time
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn last_damage_source(&self) -> Option<DamageSource> {
        self.last_damage_source
    }

    /// Ignored while inactive
    pub fn set_target(&mut self, target: Option<EntityId>) {
        if !self.active || target == Some(self.id) {
            return;
        }
        self.target = target;
    }

    pub fn set_waypoints(&mut self, waypoints: Vec<Vec3>) {
        self.waypoints = waypoints;
        self.waypoint_index = 0;
    }

    /// Apply already-resolved damage; returns true exactly on the killing hit
    pub fn take_damage(&mut self, amount: f32, source: DamageSource, ctx: &mut SimContext) -> bool {
        if !self.active || !self.alive || amount <= 0.0 {
            return false;
        }
        self.last_damage_source = Some(source);

        let position = self.position;
        let mut remaining = amount;
        if let Some(shield) = self.shield.as_mut() {
            if shield.is_up() {
                let hit = shield.absorb(amount);
                ctx.request_effect(EffectRequest::visual(EffectKind::ShieldHit, position));
                if hit.broke {
                    log::debug!("Agent {} shield broken", self.id);
                    ctx.request_effect(EffectRequest::visual(EffectKind::ShieldBreak, position));
                }
                remaining = hit.overflow;
            } else {
                shield.note_hit();
            }
        }
        if remaining <= 0.0 {
            return false;
        }

        self.health = (self.health - remaining).max(0.0);
        if self.health <= 0.0 {
            self.die(ctx);
            return true;
        }
        false
    }

    fn die(&mut self, ctx: &mut SimContext) {
        self.health = 0.0;
        self.alive = false;
        self.velocity = Vec3::ZERO;
        self.target = None;
        log::debug!("Agent {} ({}) died", self.id, self.kind.name());
        self.set_state(
            AgentState::Dead {
                remaining: self.death_animation,
            },
            ctx,
        );
        ctx.request_effect(EffectRequest::visual(EffectKind::Death, self.position));
    }

    /// Freeze for `duration` seconds
    pub fn stun(&mut self, duration: f32, ctx: &mut SimContext) {
        if !self.active || !self.alive || duration <= 0.0 {
            return;
        }
        self.set_state(AgentState::Stunned { remaining: duration }, ctx);
        ctx.request_effect(EffectRequest::visual(EffectKind::Stun, self.position));
    }

    /// Switch state, running exit/enter hooks; re-entering the same variant
    /// only replaces its data
    pub fn set_state(&mut self, next: AgentState, ctx: &mut SimContext) {
        if self.state.same_variant(&next) {
            self.state = next;
            return;
        }
        let behavior = behavior::for_kind(self.kind);
        let previous = self.state;
        behavior.on_exit(self, previous, ctx);
        log::debug!(
            "Agent {} ({}) {} -> {}",
            self.id,
            self.kind.name(),
            previous.name(),
            next.name()
        );
        self.state = next;
        self.state_time = 0.0;
        match next {
            AgentState::Stunned { .. } | AgentState::Attack => self.velocity = Vec3::ZERO,
            _ => {}
        }
        behavior.on_enter(self, next, ctx);
    }

    /// Update the data of the current state without hooks
    pub(crate) fn refresh_state(&mut self, state: AgentState) {
        self.state = state;
    }

    /// One FSM tick
    pub fn update(&mut self, dt: f32, ctx: &mut SimContext, targets: &TargetSnapshot) {
        if !self.active {
            return;
        }
        if let Some(shield) = self.shield.as_mut() {
            shield.tick(dt);
        }
        self.state_time += dt;

        if let AgentState::Dead { remaining } = self.state {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                self.deactivate();
            } else {
                self.state = AgentState::Dead { remaining };
            }
            return;
        }
        if self.health <= 0.0 {
            self.die(ctx);
            return;
        }

        // Stale weak references are dropped here
        let target_pos = match self.target {
            Some(id) => {
                let pos = targets.position_of(id);
                if pos.is_none() {
                    log::trace!("Agent {} lost target {}", self.id, id);
                    self.target = None;
                }
                pos
            }
            None => None,
        };

        let behavior = behavior::for_kind(self.kind);
        behavior.tick(self, dt, ctx, target_pos);
        match behavior.override_state(self, dt, ctx, target_pos) {
            Override::Pass => {}
            Override::Stay => return,
            Override::Goto(next) => {
                self.set_state(next, ctx);
                return;
            }
        }

        match self.state {
            AgentState::Idle => self.update_idle(dt, ctx, target_pos),
            AgentState::Patrol => self.update_patrol(dt, ctx, target_pos),
            AgentState::Chase => {
                let Some(tp) = target_pos else {
                    return self.set_state(AgentState::Idle, ctx);
                };
                let dist = self.position.distance(tp);
                if self.should_flee() {
                    self.set_state(AgentState::Flee, ctx);
                } else if dist > self.detection_range * CHASE_GIVE_UP_FACTOR {
                    self.set_state(AgentState::Idle, ctx);
                } else if dist <= self.attack_range {
                    self.set_state(AgentState::Attack, ctx);
                } else {
                    let point = behavior.chase_point(self, tp);
                    self.move_towards(point, dt);
                }
            }
            AgentState::Attack => {
                let Some(tp) = target_pos else {
                    return self.set_state(AgentState::Idle, ctx);
                };
                let dist = self.position.distance(tp);
                if self.should_flee() {
                    self.set_state(AgentState::Flee, ctx);
                } else if dist > self.attack_range {
                    let next = if dist <= self.detection_range {
                        AgentState::Chase
                    } else {
                        AgentState::Idle
                    };
                    self.set_state(next, ctx);
                } else {
                    self.velocity = Vec3::ZERO;
                    self.face_towards(tp, dt);
                    behavior.attack(self, dt, ctx, tp);
                }
            }
            AgentState::Flee => {
                let Some(tp) = target_pos else {
                    return self.set_state(AgentState::Idle, ctx);
                };
                if self.position.distance(tp) > self.detection_range * CHASE_GIVE_UP_FACTOR {
                    self.set_state(AgentState::Idle, ctx);
                } else {
                    let away = (self.position - tp).with_y(0.0).normalize_or(Vec3::X);
                    self.move_towards(self.position + away * self.detection_range, dt);
                }
            }
            AgentState::Stunned { remaining } => {
                self.velocity = Vec3::ZERO;
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.set_state(AgentState::Idle, ctx);
                } else {
                    self.state = AgentState::Stunned { remaining };
                }
            }
            AgentState::Dead { .. } => {}
            _ => behavior.update_special(self, dt, ctx, target_pos),
        }
    }

    fn update_idle(&mut self, dt: f32, ctx: &mut SimContext, target_pos: Option<Vec3>) {
        if let Some(tp) = target_pos {
            if self.position.distance(tp) <= self.detection_range {
                let next = if self.should_flee() {
                    AgentState::Flee
                } else {
                    AgentState::Chase
                };
                return self.set_state(next, ctx);
            }
        }
        if !self.waypoints.is_empty() {
            return self.set_state(AgentState::Patrol, ctx);
        }
        match self.move_target {
            Some(point) => {
                self.move_towards(point, dt);
            }
            None => self.velocity = Vec3::ZERO,
        }
    }

    fn update_patrol(&mut self, dt: f32, ctx: &mut SimContext, target_pos: Option<Vec3>) {
        if target_pos.is_some_and(|tp| self.position.distance(tp) <= self.detection_range) {
            return self.set_state(AgentState::Chase, ctx);
        }
        if self.waypoints.is_empty() {
            return self.set_state(AgentState::Idle, ctx);
        }
        let index = self.waypoint_index % self.waypoints.len();
        if self.move_towards(self.waypoints[index], dt) {
            self.waypoint_index = (index + 1) % self.waypoints.len();
        }
    }

    fn should_flee(&self) -> bool {
        self.flee_threshold
            .is_some_and(|threshold| self.health_fraction() < threshold)
    }

    /// State to resume once a special action ends
    pub(crate) fn combat_state_for(&self, target_pos: Option<Vec3>) -> AgentState {
        match target_pos.map(|tp| self.position.distance(tp)) {
            Some(d) if d <= self.attack_range => AgentState::Attack,
            Some(d) if d <= self.detection_range => AgentState::Chase,
            _ => AgentState::Idle,
        }
    }

    /// Steer toward `point` at full speed; returns true once within the
    /// arrival radius
    pub fn move_towards(&mut self, point: Vec3, dt: f32) -> bool {
        let to = point - self.position;
        let dist = to.length();
        if dist < ARRIVAL_EPSILON {
            self.velocity = Vec3::ZERO;
            return true;
        }
        let dir = to / dist;
        self.velocity = dir * self.move_speed;
        if dir.x.abs() > f32::EPSILON || dir.z.abs() > f32::EPSILON {
            self.facing = damp_angle(self.facing, heading(dir), self.turn_speed, dt);
        }
        false
    }

    fn face_towards(&mut self, point: Vec3, dt: f32) {
        let dir = (point - self.position).with_y(0.0);
        if dir.length_squared() > f32::EPSILON {
            self.facing = damp_angle(self.facing, heading(dir), self.turn_speed, dt);
        }
    }

    /// Attack the current target if off cooldown and in range
    pub fn attack_target(&mut self, now: f32, target_pos: Vec3, ctx: &mut SimContext) -> bool {
        if !self.active || !self.alive || self.target.is_none() || self.attack_rate <= 0.0 {
            return false;
        }
        if now - self.last_attack < 1.0 / self.attack_rate {
            return false;
        }
        if self.position.distance_squared(target_pos) > self.attack_range * self.attack_range {
            return false;
        }
        self.last_attack = now;
        self.fire_at(target_pos, ctx);
        true
    }

    /// Emit one shot at the target without cooldown checks
    pub(crate) fn fire_at(&mut self, target_pos: Vec3, ctx: &mut SimContext) {
        let Some(target) = self.target else {
            return;
        };
        let kind = behavior::for_kind(self.kind).attack_effect();
        ctx.request_effect(EffectRequest::Visual {
            kind,
            position: self.position,
            params: EffectParams {
                source: Some(self.id),
                direction: Some((target_pos - self.position).normalize_or_zero()),
                intensity: self.damage_buff,
                ..EffectParams::default()
            },
        });
        ctx.queue_action(AgentAction::Attack {
            source: self.id,
            target,
            damage: self.damage * self.damage_buff,
            damage_type: self.damage_type,
            origin: self.position,
        });
    }
}

impl Damageable for Agent {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn can_take_damage(&self) -> bool {
        self.active && self.alive
    }

    fn resistance(&self, damage_type: DamageType) -> Option<f32> {
        self.resistances.get(&damage_type).copied()
    }

    fn take_damage(&mut self, amount: f32, source: DamageSource, ctx: &mut SimContext) -> bool {
        Agent::take_damage(self, amount, source, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{PLAYER_ID, SIM_DT};
    use proptest::prelude::*;

    fn spawn(kind: AgentKind, position: Vec3) -> Agent {
        let tuning = Tuning::default();
        let mut agent = Agent::new(1, kind, tuning.stats(kind), &tuning);
        agent.activate(position);
        agent
    }

    fn player_at(pos: Vec3) -> TargetSnapshot {
        let mut snapshot = TargetSnapshot::default();
        snapshot.insert(PLAYER_ID, pos);
        snapshot
    }

    /// Tick and integrate the agent's own velocity
    fn step(agent: &mut Agent, ctx: &mut SimContext, targets: &TargetSnapshot) {
        ctx.advance(SIM_DT);
        agent.update(SIM_DT, ctx, targets);
        agent.position += agent.velocity * SIM_DT;
    }

    #[test]
    fn test_kind_names_parse_with_fallback() {
        assert_eq!(AgentKind::from_name("Soldier"), Some(AgentKind::Soldier));
        assert_eq!(AgentKind::from_name("tank"), None);
        assert_eq!(AgentKind::from_name_or_default("tank"), AgentKind::Drone);
    }

    #[test]
    fn test_activate_resets_vitals() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Soldier, Vec3::ZERO);
        agent.set_target(Some(PLAYER_ID));
        agent.take_damage(20.0, DamageSource::player(), &mut ctx);
        agent.stun(1.0, &mut ctx);

        agent.activate(Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(agent.health(), agent.max_health);
        assert!(agent.is_alive());
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.target(), None);
        assert_eq!(agent.position, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_killing_hit_reported_once() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Drone, Vec3::ZERO);
        assert!(!agent.take_damage(10.0, DamageSource::player(), &mut ctx));
        assert!(agent.take_damage(500.0, DamageSource::player(), &mut ctx));
        assert_eq!(agent.health(), 0.0);
        assert!(!agent.is_alive());
        assert!(matches!(agent.state(), AgentState::Dead { .. }));
        assert!(!agent.take_damage(10.0, DamageSource::player(), &mut ctx));
    }

    #[test]
    fn test_elite_shield_absorbs_whole_hit() {
        let mut ctx = SimContext::new(1);
        let mut elite = spawn(AgentKind::Elite, Vec3::ZERO);
        assert_eq!(elite.shield_strength(), Some(50.0));

        assert!(!elite.take_damage(80.0, DamageSource::player(), &mut ctx));
        assert_eq!(elite.shield_strength(), Some(0.0));
        assert_eq!(elite.health(), elite.max_health);

        // Later hits go to health and do not break the shield again
        elite.take_damage(10.0, DamageSource::player(), &mut ctx);
        assert_eq!(elite.health(), elite.max_health - 10.0);
        let breaks = ctx
            .effects()
            .iter()
            .filter(|e| e.visual_kind() == Some(EffectKind::ShieldBreak))
            .count();
        assert_eq!(breaks, 1);
    }

    #[test]
    fn test_idle_chase_attack_progression() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Soldier, Vec3::new(0.0, 0.0, 30.0));
        agent.set_target(Some(PLAYER_ID));
        let targets = player_at(Vec3::ZERO);

        step(&mut agent, &mut ctx, &targets);
        assert_eq!(agent.state(), AgentState::Chase);

        for _ in 0..600 {
            step(&mut agent, &mut ctx, &targets);
            if agent.state() == AgentState::Attack {
                break;
            }
        }
        assert_eq!(agent.state(), AgentState::Attack);
        assert!(agent.position.distance(Vec3::ZERO) <= agent.attack_range + 0.5);
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Drone, Vec3::new(0.0, 0.0, 2.0));
        agent.set_target(Some(PLAYER_ID));

        assert!(agent.attack_target(1.0, Vec3::ZERO, &mut ctx));
        // 2 attacks per second: 0.5s cooldown
        assert!(!agent.attack_target(1.3, Vec3::ZERO, &mut ctx));
        assert!(agent.attack_target(1.5, Vec3::ZERO, &mut ctx));
        // Out of range
        assert!(!agent.attack_target(5.0, Vec3::new(0.0, 0.0, 50.0), &mut ctx));

        let attacks = ctx
            .take_actions()
            .into_iter()
            .filter(|a| matches!(a, AgentAction::Attack { target: PLAYER_ID, .. }))
            .count();
        assert_eq!(attacks, 2);
    }

    #[test]
    fn test_chase_gives_up_with_hysteresis() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Commander, Vec3::ZERO);
        agent.set_target(Some(PLAYER_ID));
        let detection = agent.detection_range;

        // Inside the band between detection and give-up: keep chasing
        agent.set_state(AgentState::Chase, &mut ctx);
        agent.update(SIM_DT, &mut ctx, &player_at(Vec3::new(0.0, 0.0, detection * 1.2)));
        assert_eq!(agent.state(), AgentState::Chase);

        agent.update(SIM_DT, &mut ctx, &player_at(Vec3::new(0.0, 0.0, detection * 1.6)));
        assert_eq!(agent.state(), AgentState::Idle);

        // Idle does not re-acquire inside the band
        agent.update(SIM_DT, &mut ctx, &player_at(Vec3::new(0.0, 0.0, detection * 1.2)));
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[test]
    fn test_stun_counts_down_to_idle() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Soldier, Vec3::ZERO);
        let targets = TargetSnapshot::default();
        agent.stun(0.5, &mut ctx);
        assert!(matches!(agent.state(), AgentState::Stunned { .. }));

        for _ in 0..20 {
            agent.update(SIM_DT, &mut ctx, &targets);
        }
        assert!(matches!(agent.state(), AgentState::Stunned { .. }));
        assert_eq!(agent.velocity, Vec3::ZERO);
        for _ in 0..15 {
            agent.update(SIM_DT, &mut ctx, &targets);
        }
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[test]
    fn test_missing_target_fails_soft_to_idle() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Soldier, Vec3::ZERO);
        agent.set_target(Some(42));
        agent.set_state(AgentState::Attack, &mut ctx);

        agent.update(SIM_DT, &mut ctx, &TargetSnapshot::default());
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.target(), None);
    }

    #[test]
    fn test_death_animation_then_deactivate() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Drone, Vec3::ZERO);
        agent.set_target(Some(PLAYER_ID));
        agent.take_damage(1000.0, DamageSource::player(), &mut ctx);
        let targets = player_at(Vec3::ZERO);

        for _ in 0..30 {
            agent.update(SIM_DT, &mut ctx, &targets);
        }
        assert!(agent.is_active());
        for _ in 0..40 {
            agent.update(SIM_DT, &mut ctx, &targets);
        }
        assert!(!agent.is_active());
        assert_eq!(agent.target(), None);

        // Inactive agents refuse targets
        agent.set_target(Some(PLAYER_ID));
        assert_eq!(agent.target(), None);
    }

    #[test]
    fn test_low_health_drone_flees() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Drone, Vec3::new(0.0, 0.0, 4.0));
        agent.set_target(Some(PLAYER_ID));
        agent.take_damage(25.0, DamageSource::player(), &mut ctx);
        let targets = player_at(Vec3::ZERO);

        step(&mut agent, &mut ctx, &targets);
        assert_eq!(agent.state(), AgentState::Flee);
        let before = agent.position.distance(Vec3::ZERO);
        for _ in 0..30 {
            step(&mut agent, &mut ctx, &targets);
        }
        assert!(agent.position.distance(Vec3::ZERO) > before);
    }

    #[test]
    fn test_move_towards_reports_arrival() {
        let mut agent = spawn(AgentKind::Drone, Vec3::ZERO);
        let goal = Vec3::new(10.0, 0.0, 0.0);
        assert!(!agent.move_towards(goal, SIM_DT));
        assert!((agent.velocity.length() - agent.move_speed).abs() < 1e-4);

        agent.position = Vec3::new(9.7, 0.0, 0.0);
        assert!(agent.move_towards(goal, SIM_DT));
        assert_eq!(agent.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_patrol_cycles_waypoints() {
        let mut ctx = SimContext::new(1);
        let mut agent = spawn(AgentKind::Soldier, Vec3::ZERO);
        agent.set_waypoints(vec![Vec3::new(2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 2.0)]);
        let targets = TargetSnapshot::default();

        step(&mut agent, &mut ctx, &targets);
        assert_eq!(agent.state(), AgentState::Patrol);
        // First leg takes about 20 ticks, the second about 25 more
        for _ in 0..30 {
            step(&mut agent, &mut ctx, &targets);
        }
        assert_eq!(agent.waypoint_index, 1);
        assert!(agent.velocity.z > 0.0);
    }

    proptest! {
        #[test]
        fn prop_health_stays_in_bounds(hits in proptest::collection::vec(-10.0f32..200.0, 0..40)) {
            let mut ctx = SimContext::new(5);
            let mut agent = spawn(AgentKind::Elite, Vec3::ZERO);
            for amount in hits {
                agent.take_damage(amount, DamageSource::player(), &mut ctx);
                prop_assert!(agent.health() >= 0.0 && agent.health() <= agent.max_health);
                prop_assert_eq!(agent.is_alive(), agent.health() > 0.0);
                if let Some(strength) = agent.shield_strength() {
                    prop_assert!(strength >= 0.0 && strength <= 50.0);
                }
            }
        }
    }
}
