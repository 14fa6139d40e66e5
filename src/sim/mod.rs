//! Deterministic simulation module
//!
//! All combat logic lives here. This module must be pure and deterministic:
//! - Time advances only through `update(dt)` calls
//! - Seeded RNG only, carried by [`SimContext`]
//! - Stable iteration order (by entity ID)
//! - No rendering, audio or platform dependencies

pub mod agent;
pub mod behavior;
pub mod collab;
pub mod combo;
pub mod context;
pub mod damage;
pub mod events;
pub mod formation;
pub mod layout;
pub mod pool;
pub mod tick;
pub mod wave;

/// Stable identifier of a simulated entity (agents and the player)
pub type EntityId = u32;

pub use agent::{Agent, AgentKind, AgentState, Faction};
pub use collab::{
    CoverSystem, LogScene, NullScene, OpenGround, Physics, Pillar, PillarCover, RayHit, Scene, SimplePhysics,
};
pub use combo::{BreakReason, ComboConfig, ComboState, ComboTracker};
pub use context::SimContext;
pub use damage::{DamageResolver, DamageSource, DamageType, Damageable, Shield, ShieldOverflow};
pub use events::{AgentAction, EffectKind, EffectRequest, GameEvent};
pub use formation::{Formation, FormationMotion, FormationPhase, KindDistribution};
pub use layout::{Layout, LayoutKind};
pub use pool::{AgentPool, TargetSnapshot};
pub use tick::{CombatCoordinator, CombatStats, HitReport, PlayerState};
pub use wave::{
    DifficultyGrowth, DifficultyScaling, EncounterConfig, FormationSpec, LayoutParams, WaveConfig, WaveOrchestrator,
    WavePhase,
};
