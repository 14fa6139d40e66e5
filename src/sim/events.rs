//! Outbound traffic from the simulation
//!
//! The core never calls into presentation code mid-tick. It queues:
//! - [`EffectRequest`]s: fire-and-forget visuals forwarded to the scene
//! - [`AgentAction`]s: combat intents resolved later in the same tick
//! - [`GameEvent`]s: gameplay notifications drained by UI/audio

use glam::Vec3;
use serde::Serialize;

use super::EntityId;
use super::agent::AgentKind;
use super::combo::BreakReason;
use super::damage::DamageType;

/// Visual effect kinds understood by the scene collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectKind {
    DroneZap,
    SoldierShot,
    EliteBeam,
    CommanderBarrage,
    ShieldHit,
    ShieldBreak,
    TeleportCharge,
    Teleport,
    PulseCharge,
    EnergyPulse,
    SummonPortal,
    Stun,
    Death,
    Impact,
    CriticalImpact,
    Explosion,
}

/// Persistent markers attached to an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndicatorKind {
    Shield,
    CommandAura,
}

/// Optional tuning for a visual effect
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EffectParams {
    pub radius: f32,
    pub intensity: f32,
    /// Entity the effect originates from
    pub source: Option<EntityId>,
    /// Aim direction for directional effects
    pub direction: Option<Vec3>,
}

/// A fire-and-forget request for the scene collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EffectRequest {
    Visual {
        kind: EffectKind,
        position: Vec3,
        params: EffectParams,
    },
    Indicator {
        agent: EntityId,
        kind: IndicatorKind,
    },
}

impl EffectRequest {
    pub fn visual(kind: EffectKind, position: Vec3) -> Self {
        Self::Visual {
            kind,
            position,
            params: EffectParams::default(),
        }
    }

    /// Kind of a visual request, `None` for indicators
    pub fn visual_kind(&self) -> Option<EffectKind> {
        match self {
            Self::Visual { kind, .. } => Some(*kind),
            Self::Indicator { .. } => None,
        }
    }
}

/// Combat intents raised by agents during their update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentAction {
    /// Single-target attack on `target`
    Attack {
        source: EntityId,
        target: EntityId,
        damage: f32,
        damage_type: DamageType,
        origin: Vec3,
    },
    /// Area pulse centred on the source
    AreaPulse {
        source: EntityId,
        center: Vec3,
        radius: f32,
        damage: f32,
        damage_type: DamageType,
    },
    /// Commander reinforcement call
    Summon {
        commander: EntityId,
        position: Vec3,
        count: u32,
    },
}

/// Gameplay notifications for UI, audio and feedback collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GameEvent {
    Hit {
        target: EntityId,
        amount: f32,
        critical: bool,
        position: Vec3,
    },
    ComboUpdated {
        count: u32,
        multiplier: f32,
    },
    ComboBroken {
        count: u32,
        reason: BreakReason,
    },
    EnemyDefeated {
        id: EntityId,
        kind: AgentKind,
        points: u64,
        position: Vec3,
    },
    PlayerDamaged {
        amount: f32,
        source: EntityId,
    },
    PlayerDied,
    WaveStarted {
        wave: u32,
        total_enemies: u32,
    },
    WaveCompleted {
        wave: u32,
    },
    AllWavesComplete,
}
