//! Kind-specific tactics
//!
//! Each [`AgentKind`] maps to a stateless strategy object implementing
//! [`KindBehavior`]. Per-agent transient data lives in [`KindState`] on the
//! agent itself, so the FSM core in [`super::agent`] never branches on kind.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;

use super::agent::{Agent, AgentKind, AgentState};
use super::context::SimContext;
use super::damage::DamageType;
use super::events::{AgentAction, EffectKind, EffectParams, EffectRequest};
use crate::consts::CHASE_GIVE_UP_FACTOR;
use crate::polar_to_ground;
use crate::tuning::{CommanderTuning, DroneTuning, EliteTuning, SoldierTuning, Tuning};

/// Result of a behavior's pre-emptive state check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Override {
    /// Run the base state rules
    Pass,
    /// Skip the base rules this tick
    Stay,
    /// Transition and skip the base rules
    Goto(AgentState),
}

/// Strategy hooks the FSM core calls into
pub trait KindBehavior {
    /// Advance kind timers; runs every tick before any transition
    fn tick(&self, _agent: &mut Agent, _dt: f32, _ctx: &mut SimContext, _target: Option<Vec3>) {}

    /// Pre-empt the base transition rules
    fn override_state(
        &self,
        _agent: &mut Agent,
        _dt: f32,
        _ctx: &mut SimContext,
        _target: Option<Vec3>,
    ) -> Override {
        Override::Pass
    }

    /// Where to steer while chasing a target at `target`
    fn chase_point(&self, _agent: &Agent, target: Vec3) -> Vec3 {
        target
    }

    /// Called every tick in Attack with the target in range
    fn attack(&self, agent: &mut Agent, _dt: f32, ctx: &mut SimContext, target: Vec3) {
        agent.attack_target(ctx.now(), target, ctx);
    }

    /// Drive a kind extension state
    fn update_special(&self, agent: &mut Agent, _dt: f32, ctx: &mut SimContext, _target: Option<Vec3>) {
        log::warn!(
            "Agent {} ({}) has no handler for {}",
            agent.id,
            agent.kind.name(),
            agent.state().name()
        );
        agent.set_state(AgentState::Idle, ctx);
    }

    fn on_enter(&self, _agent: &mut Agent, _state: AgentState, _ctx: &mut SimContext) {}

    fn on_exit(&self, _agent: &mut Agent, _state: AgentState, _ctx: &mut SimContext) {}

    /// Effect emitted for each shot
    fn attack_effect(&self) -> EffectKind;
}

pub struct DroneBehavior;
pub struct SoldierBehavior;
pub struct EliteBehavior;
pub struct CommanderBehavior;

/// Behavior table lookup
pub fn for_kind(kind: AgentKind) -> &'static dyn KindBehavior {
    match kind {
        AgentKind::Drone => &DroneBehavior,
        AgentKind::Soldier => &SoldierBehavior,
        AgentKind::Elite => &EliteBehavior,
        AgentKind::Commander => &CommanderBehavior,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DroneState {
    pub tuning: DroneTuning,
    /// Orbit phase (radians)
    pub phase: f32,
    pub swarm_index: u32,
    pub swarm_size: u32,
}

/// A reached hiding spot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverHold {
    pub position: Vec3,
    /// Came from the cover system rather than the retreat fallback
    pub sheltered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoldierState {
    pub tuning: SoldierTuning,
    /// Follow-up shots left in the current burst
    pub burst_remaining: u32,
    pub burst_timer: f32,
    pub cover: Option<CoverHold>,
    /// Whether the destination being moved to is real cover
    pub pending_shelter: bool,
    pub recheck_timer: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EliteState {
    pub tuning: EliteTuning,
    /// Shared teleport/special cooldown remaining
    pub ability_cooldown: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommanderState {
    pub tuning: CommanderTuning,
    /// Seconds until the next summon is allowed
    pub summon_timer: f32,
}

/// Per-agent data owned by the kind behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KindState {
    Drone(DroneState),
    Soldier(SoldierState),
    Elite(EliteState),
    Commander(CommanderState),
}

impl KindState {
    pub fn for_kind(kind: AgentKind, tuning: &Tuning) -> Self {
        let mut state = match kind {
            AgentKind::Drone => KindState::Drone(DroneState {
                tuning: tuning.drone,
                phase: 0.0,
                swarm_index: 0,
                swarm_size: 1,
            }),
            AgentKind::Soldier => KindState::Soldier(SoldierState {
                tuning: tuning.soldier,
                burst_remaining: 0,
                burst_timer: 0.0,
                cover: None,
                pending_shelter: false,
                recheck_timer: 0.0,
            }),
            AgentKind::Elite => KindState::Elite(EliteState {
                tuning: tuning.elite,
                ability_cooldown: 0.0,
            }),
            AgentKind::Commander => KindState::Commander(CommanderState {
                tuning: tuning.commander,
                summon_timer: 0.0,
            }),
        };
        state.reset();
        state
    }

    /// Clear transient data on (re)activation
    pub fn reset(&mut self) {
        match self {
            KindState::Drone(s) => s.phase = 0.0,
            KindState::Soldier(s) => {
                s.burst_remaining = 0;
                s.burst_timer = 0.0;
                s.cover = None;
                s.pending_shelter = false;
                s.recheck_timer = 0.0;
            }
            KindState::Elite(s) => s.ability_cooldown = s.tuning.ability_cooldown,
            KindState::Commander(s) => s.summon_timer = s.tuning.summon_cooldown,
        }
    }

    pub fn drone(&self) -> Option<&DroneState> {
        match self {
            KindState::Drone(s) => Some(s),
            _ => None,
        }
    }

    pub fn drone_mut(&mut self) -> Option<&mut DroneState> {
        match self {
            KindState::Drone(s) => Some(s),
            _ => None,
        }
    }

    pub fn soldier(&self) -> Option<&SoldierState> {
        match self {
            KindState::Soldier(s) => Some(s),
            _ => None,
        }
    }

    pub fn soldier_mut(&mut self) -> Option<&mut SoldierState> {
        match self {
            KindState::Soldier(s) => Some(s),
            _ => None,
        }
    }

    pub fn elite_mut(&mut self) -> Option<&mut EliteState> {
        match self {
            KindState::Elite(s) => Some(s),
            _ => None,
        }
    }

    pub fn commander(&self) -> Option<&CommanderState> {
        match self {
            KindState::Commander(s) => Some(s),
            _ => None,
        }
    }

    pub fn commander_mut(&mut self) -> Option<&mut CommanderState> {
        match self {
            KindState::Commander(s) => Some(s),
            _ => None,
        }
    }
}

impl Agent {
    /// Place a drone in its swarm so orbits spread evenly
    pub fn set_swarm_slot(&mut self, index: u32, size: u32) {
        if let Some(s) = self.kind_state.drone_mut() {
            s.swarm_index = index;
            s.swarm_size = size.max(1);
        }
    }

    pub fn kind_state(&self) -> &KindState {
        &self.kind_state
    }
}

/// Unit vector on the ground plane pointing from `threat` to `from`
fn away_from(from: Vec3, threat: Vec3) -> Vec3 {
    (from - threat).with_y(0.0).normalize_or(Vec3::X)
}

// ---------------------------------------------------------------------------
// Drone

impl KindBehavior for DroneBehavior {
    fn tick(&self, agent: &mut Agent, dt: f32, _ctx: &mut SimContext, _target: Option<Vec3>) {
        if let Some(s) = agent.kind_state.drone_mut() {
            s.phase = (s.phase + s.tuning.swarm_angular_speed * dt).rem_euclid(TAU);
        }
    }

    fn chase_point(&self, agent: &Agent, target: Vec3) -> Vec3 {
        match agent.kind_state.drone() {
            Some(s) => {
                let offset = TAU * s.swarm_index as f32 / s.swarm_size.max(1) as f32;
                target + polar_to_ground(s.tuning.swarm_radius, s.phase + offset)
            }
            None => target,
        }
    }

    fn attack_effect(&self) -> EffectKind {
        EffectKind::DroneZap
    }
}

// ---------------------------------------------------------------------------
// Soldier

impl SoldierBehavior {
    /// Ask the cover system for a spot, else retreat straight away from the threat
    fn cover_destination(agent: &mut Agent, ctx: &SimContext, threat: Vec3) -> Option<Vec3> {
        let tuning = agent.kind_state.soldier()?.tuning;
        let found = ctx
            .cover
            .find_cover_position(agent.position, threat, tuning.cover_search_distance);
        let (destination, sheltered) = match found {
            Some(spot) => (spot, true),
            None => (
                agent.position + away_from(agent.position, threat) * tuning.cover_fallback_distance,
                false,
            ),
        };
        if let Some(s) = agent.kind_state.soldier_mut() {
            s.pending_shelter = sheltered;
            s.cover = None;
        }
        log::debug!(
            "Soldier {} seeking cover at {} (sheltered: {})",
            agent.id,
            destination,
            sheltered
        );
        Some(destination)
    }
}

impl KindBehavior for SoldierBehavior {
    fn tick(&self, agent: &mut Agent, dt: f32, _ctx: &mut SimContext, _target: Option<Vec3>) {
        if let Some(s) = agent.kind_state.soldier_mut() {
            if s.burst_remaining > 0 {
                s.burst_timer -= dt;
            }
            if s.cover.is_some() {
                s.recheck_timer -= dt;
            }
        }
    }

    fn override_state(
        &self,
        agent: &mut Agent,
        _dt: f32,
        ctx: &mut SimContext,
        target: Option<Vec3>,
    ) -> Override {
        let Some(tp) = target else {
            return Override::Pass;
        };
        let Some(s) = agent.kind_state.soldier().copied() else {
            return Override::Pass;
        };
        let state = agent.state();
        // Stun, death and flee run to completion in the base machine
        if !matches!(
            state,
            AgentState::Idle
                | AgentState::Patrol
                | AgentState::Chase
                | AgentState::Attack
                | AgentState::Cover { .. }
        ) {
            return Override::Pass;
        }
        let dist = agent.position.distance(tp);

        let Some(hold) = s.cover else {
            let wants_cover = agent.health_fraction() < s.tuning.cover_threshold
                && match state {
                    AgentState::Chase | AgentState::Attack => true,
                    AgentState::Idle => dist <= agent.detection_range,
                    _ => false,
                };
            if wants_cover {
                if let Some(destination) = Self::cover_destination(agent, ctx, tp) {
                    return Override::Goto(AgentState::Cover { destination });
                }
            }
            return Override::Pass;
        };

        if dist > agent.detection_range * CHASE_GIVE_UP_FACTOR {
            if let Some(s) = agent.kind_state.soldier_mut() {
                s.cover = None;
            }
            return Override::Pass;
        }

        if hold.sheltered && s.recheck_timer <= 0.0 {
            if let Some(s) = agent.kind_state.soldier_mut() {
                s.recheck_timer = s.tuning.cover_recheck_interval;
            }
            if !ctx.cover.is_behind_cover(hold.position, tp) {
                if let Some(destination) = Self::cover_destination(agent, ctx, tp) {
                    return Override::Goto(AgentState::Cover { destination });
                }
            }
        }

        // Holding cover: fight from here, never chase
        match state {
            AgentState::Idle if dist <= agent.attack_range => Override::Goto(AgentState::Attack),
            AgentState::Idle | AgentState::Patrol => {
                agent.velocity = Vec3::ZERO;
                Override::Stay
            }
            AgentState::Attack if dist > agent.attack_range => Override::Goto(AgentState::Idle),
            AgentState::Chase => Override::Goto(AgentState::Idle),
            _ => Override::Pass,
        }
    }

    fn attack(&self, agent: &mut Agent, _dt: f32, ctx: &mut SimContext, target: Vec3) {
        let Some(s) = agent.kind_state.soldier().copied() else {
            return;
        };
        if s.burst_remaining > 0 {
            if s.burst_timer <= 0.0 {
                agent.fire_at(target, ctx);
                if let Some(s) = agent.kind_state.soldier_mut() {
                    s.burst_remaining -= 1;
                    s.burst_timer = s.tuning.burst_interval;
                }
            }
            return;
        }
        if agent.attack_target(ctx.now(), target, ctx) {
            if let Some(s) = agent.kind_state.soldier_mut() {
                s.burst_remaining = s.tuning.burst_count.saturating_sub(1);
                s.burst_timer = s.tuning.burst_interval;
            }
        }
    }

    fn update_special(&self, agent: &mut Agent, dt: f32, ctx: &mut SimContext, target: Option<Vec3>) {
        let AgentState::Cover { destination } = agent.state() else {
            return agent.set_state(AgentState::Idle, ctx);
        };
        if !agent.move_towards(destination, dt) {
            return;
        }
        if let Some(s) = agent.kind_state.soldier_mut() {
            s.cover = Some(CoverHold {
                position: destination,
                sheltered: s.pending_shelter,
            });
            s.recheck_timer = s.tuning.cover_recheck_interval;
        }
        let next = match target {
            Some(tp) if agent.position.distance(tp) <= agent.attack_range => AgentState::Attack,
            _ => AgentState::Idle,
        };
        agent.set_state(next, ctx);
    }

    fn on_enter(&self, agent: &mut Agent, state: AgentState, _ctx: &mut SimContext) {
        if state == AgentState::Attack {
            if let Some(s) = agent.kind_state.soldier_mut() {
                s.burst_remaining = 0;
                s.burst_timer = 0.0;
            }
        }
    }

    fn attack_effect(&self) -> EffectKind {
        EffectKind::SoldierShot
    }
}

// ---------------------------------------------------------------------------
// Elite

impl KindBehavior for EliteBehavior {
    fn tick(&self, agent: &mut Agent, dt: f32, _ctx: &mut SimContext, _target: Option<Vec3>) {
        if let Some(s) = agent.kind_state.elite_mut() {
            s.ability_cooldown = (s.ability_cooldown - dt).max(0.0);
        }
    }

    fn override_state(
        &self,
        agent: &mut Agent,
        _dt: f32,
        ctx: &mut SimContext,
        target: Option<Vec3>,
    ) -> Override {
        let Some(tp) = target else {
            return Override::Pass;
        };
        if !matches!(
            agent.state(),
            AgentState::Idle | AgentState::Chase | AgentState::Attack
        ) {
            return Override::Pass;
        }
        let Some(s) = agent.kind_state.elite_mut() else {
            return Override::Pass;
        };
        if s.ability_cooldown > 0.0 {
            return Override::Pass;
        }
        let tuning = s.tuning;
        let dist = agent.position.distance(tp);

        if agent.health_fraction() < tuning.escape_threshold
            && ctx.rng.random::<f32>() < tuning.teleport_chance
        {
            let jitter = Vec3::new(
                ctx.rng.random_range(-2.0..2.0),
                0.0,
                ctx.rng.random_range(-2.0..2.0),
            );
            let destination =
                agent.position + away_from(agent.position, tp) * tuning.teleport_distance + jitter;
            if let Some(s) = agent.kind_state.elite_mut() {
                s.ability_cooldown = tuning.ability_cooldown;
            }
            return Override::Goto(AgentState::Teleport {
                destination,
                charge: tuning.teleport_charge,
            });
        }

        if dist <= tuning.special_range && ctx.rng.random::<f32>() < tuning.special_chance {
            if let Some(s) = agent.kind_state.elite_mut() {
                s.ability_cooldown = tuning.ability_cooldown;
            }
            return Override::Goto(AgentState::SpecialAttack {
                charge: tuning.special_charge,
            });
        }
        Override::Pass
    }

    fn update_special(&self, agent: &mut Agent, dt: f32, ctx: &mut SimContext, target: Option<Vec3>) {
        agent.velocity = Vec3::ZERO;
        match agent.state() {
            AgentState::Teleport { destination, charge } => {
                let charge = charge - dt;
                if charge > 0.0 {
                    return agent.refresh_state(AgentState::Teleport { destination, charge });
                }
                let from = agent.position;
                agent.position = destination;
                ctx.physics.set_position(agent.id, destination);
                ctx.request_effect(EffectRequest::Visual {
                    kind: EffectKind::Teleport,
                    position: destination,
                    params: EffectParams {
                        source: Some(agent.id),
                        direction: Some((destination - from).normalize_or_zero()),
                        ..EffectParams::default()
                    },
                });
                log::debug!("Elite {} teleported {} -> {}", agent.id, from, destination);
                let next = agent.combat_state_for(target);
                agent.set_state(next, ctx);
            }
            AgentState::SpecialAttack { charge } => {
                let charge = charge - dt;
                if charge > 0.0 {
                    return agent.refresh_state(AgentState::SpecialAttack { charge });
                }
                let Some(tuning) = agent.kind_state.elite_mut().map(|s| s.tuning) else {
                    return agent.set_state(AgentState::Idle, ctx);
                };
                ctx.queue_action(AgentAction::AreaPulse {
                    source: agent.id,
                    center: agent.position,
                    radius: tuning.special_radius,
                    damage: tuning.special_damage * agent.damage_buff,
                    damage_type: DamageType::Special,
                });
                ctx.request_effect(EffectRequest::Visual {
                    kind: EffectKind::EnergyPulse,
                    position: agent.position,
                    params: EffectParams {
                        radius: tuning.special_radius,
                        source: Some(agent.id),
                        ..EffectParams::default()
                    },
                });
                let next = agent.combat_state_for(target);
                agent.set_state(next, ctx);
            }
            _ => agent.set_state(AgentState::Idle, ctx),
        }
    }

    fn on_enter(&self, agent: &mut Agent, state: AgentState, ctx: &mut SimContext) {
        let kind = match state {
            AgentState::Teleport { .. } => EffectKind::TeleportCharge,
            AgentState::SpecialAttack { .. } => EffectKind::PulseCharge,
            _ => return,
        };
        agent.velocity = Vec3::ZERO;
        ctx.request_effect(EffectRequest::visual(kind, agent.position));
    }

    fn attack_effect(&self) -> EffectKind {
        EffectKind::EliteBeam
    }
}

// ---------------------------------------------------------------------------
// Commander

impl KindBehavior for CommanderBehavior {
    fn tick(&self, agent: &mut Agent, dt: f32, _ctx: &mut SimContext, _target: Option<Vec3>) {
        if let Some(s) = agent.kind_state.commander_mut() {
            s.summon_timer = (s.summon_timer - dt).max(0.0);
        }
    }

    fn override_state(
        &self,
        agent: &mut Agent,
        _dt: f32,
        ctx: &mut SimContext,
        target: Option<Vec3>,
    ) -> Override {
        if target.is_none()
            || !matches!(
                agent.state(),
                AgentState::Idle | AgentState::Chase | AgentState::Attack
            )
        {
            return Override::Pass;
        }
        let Some(s) = agent.kind_state.commander().copied() else {
            return Override::Pass;
        };
        if s.summon_timer > 0.0 {
            return Override::Pass;
        }
        let desperate = agent.health_fraction() < s.tuning.summon_health_threshold;
        if desperate || ctx.rng.random::<f32>() < s.tuning.summon_chance {
            if let Some(s) = agent.kind_state.commander_mut() {
                s.summon_timer = s.tuning.summon_cooldown;
            }
            return Override::Goto(AgentState::Summon {
                remaining: s.tuning.summon_duration,
            });
        }
        Override::Pass
    }

    fn update_special(&self, agent: &mut Agent, dt: f32, ctx: &mut SimContext, target: Option<Vec3>) {
        let AgentState::Summon { remaining } = agent.state() else {
            return agent.set_state(AgentState::Idle, ctx);
        };
        agent.velocity = Vec3::ZERO;
        let remaining = remaining - dt;
        if remaining > 0.0 {
            return agent.refresh_state(AgentState::Summon { remaining });
        }
        let count = agent
            .kind_state
            .commander()
            .map_or(0, |s| s.tuning.summon_count);
        log::debug!("Commander {} summons {} minions", agent.id, count);
        ctx.queue_action(AgentAction::Summon {
            commander: agent.id,
            position: agent.position,
            count,
        });
        let next = agent.combat_state_for(target);
        agent.set_state(next, ctx);
    }

    fn on_enter(&self, agent: &mut Agent, state: AgentState, ctx: &mut SimContext) {
        if let AgentState::Summon { .. } = state {
            ctx.request_effect(EffectRequest::Visual {
                kind: EffectKind::SummonPortal,
                position: agent.position,
                params: EffectParams {
                    radius: 2.0,
                    source: Some(agent.id),
                    ..EffectParams::default()
                },
            });
        }
    }

    fn attack_effect(&self) -> EffectKind {
        EffectKind::CommanderBarrage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{PLAYER_ID, SIM_DT};
    use crate::sim::collab::{Pillar, PillarCover};
    use crate::sim::damage::DamageSource;
    use crate::sim::pool::TargetSnapshot;

    fn spawn_with(kind: AgentKind, position: Vec3, tuning: &Tuning) -> Agent {
        let mut agent = Agent::new(1, kind, tuning.stats(kind), tuning);
        agent.activate(position);
        agent.set_target(Some(PLAYER_ID));
        agent
    }

    fn player_at(pos: Vec3) -> TargetSnapshot {
        let mut snapshot = TargetSnapshot::default();
        snapshot.insert(PLAYER_ID, pos);
        snapshot
    }

    fn step(agent: &mut Agent, ctx: &mut SimContext, targets: &TargetSnapshot) {
        ctx.advance(SIM_DT);
        agent.update(SIM_DT, ctx, targets);
        agent.position += agent.velocity * SIM_DT;
    }

    #[test]
    fn test_table_dispatches_attack_effects() {
        assert_eq!(for_kind(AgentKind::Drone).attack_effect(), EffectKind::DroneZap);
        assert_eq!(for_kind(AgentKind::Soldier).attack_effect(), EffectKind::SoldierShot);
        assert_eq!(for_kind(AgentKind::Elite).attack_effect(), EffectKind::EliteBeam);
        assert_eq!(
            for_kind(AgentKind::Commander).attack_effect(),
            EffectKind::CommanderBarrage
        );
    }

    #[test]
    fn test_swarm_spreads_chase_points() {
        let tuning = Tuning::default();
        let target = Vec3::new(5.0, 0.0, 5.0);
        let points: Vec<Vec3> = (0..4)
            .map(|i| {
                let mut drone = spawn_with(AgentKind::Drone, Vec3::ZERO, &tuning);
                drone.set_swarm_slot(i, 4);
                DroneBehavior.chase_point(&drone, target)
            })
            .collect();
        for p in &points {
            assert!((p.distance(target) - tuning.drone.swarm_radius).abs() < 1e-4);
        }
        // Opposite swarm members sit on opposite sides of the target
        assert!((points[0] + points[2] - 2.0 * target).length() < 1e-4);
        assert!(points[0].distance(points[1]) > 1.0);
    }

    #[test]
    fn test_swarm_phase_advances() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(1);
        let mut drone = spawn_with(AgentKind::Drone, Vec3::ZERO, &tuning);
        let before = DroneBehavior.chase_point(&drone, Vec3::ZERO);
        DroneBehavior.tick(&mut drone, 0.25, &mut ctx, None);
        let after = DroneBehavior.chase_point(&drone, Vec3::ZERO);
        assert!(before.distance(after) > 0.1);
    }

    #[test]
    fn test_wounded_soldier_takes_cover_without_chasing() {
        let tuning = Tuning {
            soldier_stats: crate::tuning::AgentStats {
                max_health: 50.0,
                ..Tuning::default().soldier_stats
            },
            ..Tuning::default()
        };
        let cover = PillarCover::new(vec![Pillar {
            center: Vec3::new(0.0, 0.0, 8.0),
            radius: 1.0,
        }]);
        let mut ctx = SimContext::new(3).with_cover(cover);
        let mut soldier = spawn_with(AgentKind::Soldier, Vec3::new(1.5, 0.0, 8.5), &tuning);
        let targets = player_at(Vec3::ZERO);

        step(&mut soldier, &mut ctx, &targets);
        assert_eq!(soldier.state(), AgentState::Chase);
        step(&mut soldier, &mut ctx, &targets);
        assert_eq!(soldier.state(), AgentState::Attack);

        // 40 of 50 health lost: 20% < 30%
        soldier.take_damage(40.0, DamageSource::player(), &mut ctx);
        let mut seen = vec![soldier.state().name()];
        for _ in 0..300 {
            step(&mut soldier, &mut ctx, &targets);
            let name = soldier.state().name();
            if seen.last() != Some(&name) {
                seen.push(name);
            }
        }
        assert_eq!(&seen[..3], &["attack", "cover", "attack"]);
        assert!(!seen.contains(&"chase"));
        let hold = soldier.kind_state().soldier().and_then(|s| s.cover).unwrap();
        assert!(hold.sheltered);
        assert!(ctx.cover.is_behind_cover(soldier.position, Vec3::ZERO));
    }

    #[test]
    fn test_stun_outlasts_cover_recheck() {
        let tuning = Tuning {
            soldier_stats: crate::tuning::AgentStats {
                max_health: 50.0,
                ..Tuning::default().soldier_stats
            },
            ..Tuning::default()
        };
        let cover = PillarCover::new(vec![Pillar {
            center: Vec3::new(0.0, 0.0, 8.0),
            radius: 1.0,
        }]);
        let mut ctx = SimContext::new(3).with_cover(cover);
        let mut soldier = spawn_with(AgentKind::Soldier, Vec3::new(1.5, 0.0, 8.5), &tuning);
        let targets = player_at(Vec3::ZERO);
        step(&mut soldier, &mut ctx, &targets);
        step(&mut soldier, &mut ctx, &targets);
        soldier.take_damage(40.0, DamageSource::player(), &mut ctx);
        for _ in 0..300 {
            step(&mut soldier, &mut ctx, &targets);
        }
        assert!(soldier.kind_state().soldier().and_then(|s| s.cover).is_some_and(|h| h.sheltered));

        // Flank the soldier so every recheck finds the cover exposed
        soldier.stun(10.0, &mut ctx);
        let flanked = player_at(Vec3::new(10.0, 0.0, 9.0));
        let stun_ticks = (10.0 / SIM_DT) as usize;
        for tick in 0..stun_ticks - 2 {
            step(&mut soldier, &mut ctx, &flanked);
            assert!(
                matches!(soldier.state(), AgentState::Stunned { .. }),
                "left stun after {} ticks: {:?}",
                tick + 1,
                soldier.state()
            );
        }
        for _ in 0..4 {
            step(&mut soldier, &mut ctx, &flanked);
        }
        assert!(!matches!(soldier.state(), AgentState::Stunned { .. }));
    }

    #[test]
    fn test_soldier_falls_back_without_cover() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(3);
        let mut soldier = spawn_with(AgentKind::Soldier, Vec3::new(0.0, 0.0, 10.0), &tuning);
        soldier.take_damage(50.0, DamageSource::player(), &mut ctx);
        soldier.update(SIM_DT, &mut ctx, &player_at(Vec3::ZERO));
        match soldier.state() {
            AgentState::Cover { destination } => {
                assert!((destination - Vec3::new(0.0, 0.0, 16.0)).length() < 1e-4);
            }
            other => panic!("expected cover, got {:?}", other),
        }
    }

    #[test]
    fn test_soldier_fires_bursts() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(3);
        let mut soldier = spawn_with(AgentKind::Soldier, Vec3::new(0.0, 0.0, 10.0), &tuning);
        soldier.set_state(AgentState::Attack, &mut ctx);
        let targets = player_at(Vec3::ZERO);

        // Half a second: one burst, well before the 1.25s cooldown ends
        for _ in 0..30 {
            step(&mut soldier, &mut ctx, &targets);
        }
        let shots = ctx
            .take_actions()
            .into_iter()
            .filter(|a| matches!(a, AgentAction::Attack { .. }))
            .count();
        assert_eq!(shots, tuning.soldier.burst_count as usize);
    }

    #[test]
    fn test_elite_teleports_away_when_wounded() {
        let tuning = Tuning {
            elite: EliteTuning {
                teleport_chance: 1.0,
                ..EliteTuning::default()
            },
            ..Tuning::default()
        };
        let mut ctx = SimContext::new(9);
        let start = Vec3::new(0.0, 0.0, 10.0);
        let mut elite = spawn_with(AgentKind::Elite, start, &tuning);
        elite.shield = None;
        elite.take_damage(100.0, DamageSource::player(), &mut ctx);
        if let Some(s) = elite.kind_state.elite_mut() {
            s.ability_cooldown = 0.0;
        }
        let targets = player_at(Vec3::ZERO);

        step(&mut elite, &mut ctx, &targets);
        assert!(matches!(elite.state(), AgentState::Teleport { .. }));
        for _ in 0..40 {
            step(&mut elite, &mut ctx, &targets);
        }
        assert!(!matches!(elite.state(), AgentState::Teleport { .. }));
        assert!(elite.position.distance(Vec3::ZERO) > start.length() + 5.0);
        assert!(ctx.effects().iter().any(|e| e.visual_kind() == Some(EffectKind::Teleport)));
    }

    #[test]
    fn test_elite_pulse_queues_area_damage() {
        let tuning = Tuning {
            elite: EliteTuning {
                special_chance: 1.0,
                ..EliteTuning::default()
            },
            ..Tuning::default()
        };
        let mut ctx = SimContext::new(9);
        let mut elite = spawn_with(AgentKind::Elite, Vec3::new(0.0, 0.0, 5.0), &tuning);
        if let Some(s) = elite.kind_state.elite_mut() {
            s.ability_cooldown = 0.0;
        }
        let targets = player_at(Vec3::ZERO);

        step(&mut elite, &mut ctx, &targets);
        assert!(matches!(elite.state(), AgentState::SpecialAttack { .. }));
        for _ in 0..70 {
            step(&mut elite, &mut ctx, &targets);
        }
        let pulses = ctx
            .take_actions()
            .into_iter()
            .filter(|a| matches!(a, AgentAction::AreaPulse { .. }))
            .count();
        // The shared cooldown allows only one pulse
        assert_eq!(pulses, 1);
    }

    #[test]
    fn test_commander_summons_when_hurt() {
        let tuning = Tuning::default();
        let mut ctx = SimContext::new(9);
        let mut commander = spawn_with(AgentKind::Commander, Vec3::new(0.0, 0.0, 10.0), &tuning);
        commander.take_damage(200.0, DamageSource::player(), &mut ctx);
        if let Some(s) = commander.kind_state.commander_mut() {
            s.summon_timer = 0.0;
        }
        let targets = player_at(Vec3::ZERO);

        step(&mut commander, &mut ctx, &targets);
        assert!(matches!(commander.state(), AgentState::Summon { .. }));
        for _ in 0..120 {
            step(&mut commander, &mut ctx, &targets);
        }
        let summons: Vec<u32> = ctx
            .take_actions()
            .into_iter()
            .filter_map(|a| match a {
                AgentAction::Summon { count, .. } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(summons, vec![tuning.commander.summon_count]);
    }
}
