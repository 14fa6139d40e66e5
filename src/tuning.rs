//! Data-driven game balance
//!
//! Every number the simulation reads for agent stats, damage, combo and
//! difficulty lives here. Loaded from JSON; missing fields fall back to the
//! defaults below.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::agent::AgentKind;
use crate::sim::combo::ComboConfig;
use crate::sim::damage::{DamageConfig, DamageType};
use crate::sim::wave::DifficultyGrowth;

/// Errors raised while reading or writing configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Base stats shared by every enemy kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentStats {
    pub max_health: f32,
    /// 0 disables the shield entirely
    pub max_shield: f32,
    /// Shield points regenerated per second once the grace period has passed
    pub shield_regen_rate: f32,
    /// Seconds without damage before the shield starts regenerating
    pub shield_regen_delay: f32,
    pub move_speed: f32,
    /// Facing smoothing rate (1/s)
    pub turn_speed: f32,
    pub detection_range: f32,
    pub attack_range: f32,
    /// Attacks per second
    pub attack_rate: f32,
    pub damage: f32,
    pub damage_type: DamageType,
    pub points: u32,
    /// Health fraction under which the agent flees, if any
    pub flee_threshold: Option<f32>,
    /// Per-type damage multipliers taken by this kind
    pub resistances: BTreeMap<DamageType, f32>,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            max_health: 50.0,
            max_shield: 0.0,
            shield_regen_rate: 0.0,
            shield_regen_delay: 0.0,
            move_speed: 5.0,
            turn_speed: 8.0,
            detection_range: 30.0,
            attack_range: 10.0,
            attack_rate: 1.0,
            damage: 5.0,
            damage_type: DamageType::Kinetic,
            points: 10,
            flee_threshold: None,
            resistances: BTreeMap::new(),
        }
    }
}

/// Drone swarm parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneTuning {
    pub swarm_radius: f32,
    /// Radians per second
    pub swarm_angular_speed: f32,
}

impl Default for DroneTuning {
    fn default() -> Self {
        Self {
            swarm_radius: 3.0,
            swarm_angular_speed: 2.0,
        }
    }
}

/// Soldier cover and burst-fire parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoldierTuning {
    /// Health fraction under which the soldier seeks cover
    pub cover_threshold: f32,
    pub cover_search_distance: f32,
    /// Retreat distance used when the cover system has nothing to offer
    pub cover_fallback_distance: f32,
    /// Seconds between checks that the held cover still shelters
    pub cover_recheck_interval: f32,
    pub burst_count: u32,
    pub burst_interval: f32,
}

impl Default for SoldierTuning {
    fn default() -> Self {
        Self {
            cover_threshold: 0.3,
            cover_search_distance: 15.0,
            cover_fallback_distance: 6.0,
            cover_recheck_interval: 2.0,
            burst_count: 3,
            burst_interval: 0.12,
        }
    }
}

/// Elite teleport and special attack parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EliteTuning {
    /// Health fraction under which escape teleports are considered
    pub escape_threshold: f32,
    /// Per-tick probability of an escape teleport
    pub teleport_chance: f32,
    pub teleport_distance: f32,
    pub teleport_charge: f32,
    /// Per-tick probability of a special attack
    pub special_chance: f32,
    pub special_range: f32,
    pub special_radius: f32,
    pub special_damage: f32,
    pub special_charge: f32,
    /// Cooldown shared by teleport and special attack
    pub ability_cooldown: f32,
}

impl Default for EliteTuning {
    fn default() -> Self {
        Self {
            escape_threshold: 0.3,
            teleport_chance: 0.02,
            teleport_distance: 12.0,
            teleport_charge: 0.6,
            special_chance: 0.01,
            special_range: 10.0,
            special_radius: 6.0,
            special_damage: 25.0,
            special_charge: 1.0,
            ability_cooldown: 6.0,
        }
    }
}

/// Commander aura and summon parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderTuning {
    pub buff_radius: f32,
    pub buff_multiplier: f32,
    pub summon_cooldown: f32,
    pub summon_duration: f32,
    pub summon_count: u32,
    /// Per-tick summon probability while healthy
    pub summon_chance: f32,
    /// Under this health fraction a ready summon always fires
    pub summon_health_threshold: f32,
}

impl Default for CommanderTuning {
    fn default() -> Self {
        Self {
            buff_radius: 15.0,
            buff_multiplier: 1.25,
            summon_cooldown: 12.0,
            summon_duration: 1.5,
            summon_count: 3,
            summon_chance: 0.005,
            summon_health_threshold: 0.5,
        }
    }
}

/// Player vitals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub max_health: f32,
    /// Impulse applied at the centre of a player detonation, scaled by falloff
    pub explosion_knockback: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            explosion_knockback: 8.0,
        }
    }
}

/// Complete balance sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub drone_stats: AgentStats,
    pub soldier_stats: AgentStats,
    pub elite_stats: AgentStats,
    pub commander_stats: AgentStats,
    pub drone: DroneTuning,
    pub soldier: SoldierTuning,
    pub elite: EliteTuning,
    pub commander: CommanderTuning,
    pub player: PlayerTuning,
    pub damage: DamageConfig,
    pub combo: ComboConfig,
    pub difficulty: DifficultyGrowth,
    /// Seconds a dead agent lingers before returning to the pool
    pub death_animation: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            drone_stats: AgentStats {
                max_health: 30.0,
                move_speed: 7.0,
                turn_speed: 10.0,
                detection_range: 30.0,
                attack_range: 6.0,
                attack_rate: 2.0,
                damage: 4.0,
                damage_type: DamageType::Energy,
                points: 10,
                flee_threshold: Some(0.2),
                ..AgentStats::default()
            },
            soldier_stats: AgentStats {
                max_health: 60.0,
                move_speed: 4.5,
                turn_speed: 6.0,
                detection_range: 35.0,
                attack_range: 18.0,
                attack_rate: 0.8,
                damage: 8.0,
                damage_type: DamageType::Kinetic,
                points: 25,
                ..AgentStats::default()
            },
            elite_stats: AgentStats {
                max_health: 120.0,
                max_shield: 50.0,
                shield_regen_rate: 10.0,
                shield_regen_delay: 3.0,
                move_speed: 5.0,
                turn_speed: 8.0,
                detection_range: 40.0,
                attack_range: 14.0,
                attack_rate: 1.0,
                damage: 14.0,
                damage_type: DamageType::Energy,
                points: 60,
                resistances: BTreeMap::from([(DamageType::Energy, 0.75)]),
                ..AgentStats::default()
            },
            commander_stats: AgentStats {
                max_health: 250.0,
                move_speed: 3.0,
                turn_speed: 4.0,
                detection_range: 45.0,
                attack_range: 20.0,
                attack_rate: 0.5,
                damage: 20.0,
                damage_type: DamageType::Explosive,
                points: 150,
                resistances: BTreeMap::from([(DamageType::Explosive, 0.5)]),
                ..AgentStats::default()
            },
            drone: DroneTuning::default(),
            soldier: SoldierTuning::default(),
            elite: EliteTuning::default(),
            commander: CommanderTuning::default(),
            player: PlayerTuning::default(),
            damage: DamageConfig::default(),
            combo: ComboConfig::default(),
            difficulty: DifficultyGrowth::default(),
            death_animation: 1.0,
        }
    }
}

impl Tuning {
    /// Base stats for a kind
    pub fn stats(&self, kind: AgentKind) -> &AgentStats {
        match kind {
            AgentKind::Drone => &self.drone_stats,
            AgentKind::Soldier => &self.soldier_stats,
            AgentKind::Elite => &self.elite_stats,
            AgentKind::Commander => &self.commander_stats,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load tuning from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let tuning = Self::from_json(&json)?;
        log::info!("Loaded tuning from {}", path.as_ref().display());
        Ok(tuning)
    }

    /// Save tuning as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Tuning saved to {}", path.as_ref().display());
        Ok(())
    }
}
