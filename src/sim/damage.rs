//! Damage resolution
//!
//! Turns a base amount into applied damage:
//! `base × global × sourceModifier[source] × resistance[type]`, then a
//! critical roll, then rounding. Area effects gather targets with a squared
//! distance test and scale by a linear falloff before the same resolution.
//!
//! Shields are routed first by the target itself; see [`ShieldOverflow`] for
//! what happens to damage beyond the remaining shield.

use std::collections::BTreeMap;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::EntityId;
use super::context::SimContext;
use crate::consts::PLAYER_ID;

/// Damage channels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum DamageType {
    #[default]
    Kinetic,
    Energy,
    Explosive,
    Special,
}

/// Who dealt the damage, for source modifiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum SourceKind {
    #[default]
    Player,
    Enemy,
    Environment,
}

/// Originator of a damage instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageSource {
    pub id: EntityId,
    pub kind: SourceKind,
}

impl DamageSource {
    pub const fn player() -> Self {
        Self {
            id: PLAYER_ID,
            kind: SourceKind::Player,
        }
    }

    pub const fn enemy(id: EntityId) -> Self {
        Self {
            id,
            kind: SourceKind::Enemy,
        }
    }
}

/// What a shield does with damage beyond its remaining strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShieldOverflow {
    /// Hard barrier: any hit landing on a raised shield is fully consumed,
    /// the excess is discarded and health is untouched
    #[default]
    Absorb,
    /// The excess beyond the remaining shield carries through to health
    SpillToHealth,
}

/// Outcome of routing a hit into a shield
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShieldHit {
    /// Shield points removed
    pub absorbed: f32,
    /// Damage left for health
    pub overflow: f32,
    /// This hit took the shield from up to down
    pub broke: bool,
}

/// Regenerating damage buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shield {
    pub strength: f32,
    pub max: f32,
    pub regen_rate: f32,
    pub regen_delay: f32,
    pub overflow: ShieldOverflow,
    /// Seconds since the last hit
    since_hit: f32,
}

impl Shield {
    pub fn new(max: f32, regen_rate: f32, regen_delay: f32, overflow: ShieldOverflow) -> Self {
        Self {
            strength: max,
            max,
            regen_rate,
            regen_delay,
            overflow,
            since_hit: 0.0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.strength > 0.0
    }

    /// Refill completely (spawn)
    pub fn restore(&mut self) {
        self.strength = self.max;
        self.since_hit = 0.0;
    }

    /// Restart the regeneration grace period
    pub fn note_hit(&mut self) {
        self.since_hit = 0.0;
    }

    /// Route `amount` into the shield according to its overflow policy
    pub fn absorb(&mut self, amount: f32) -> ShieldHit {
        self.note_hit();
        if !self.is_up() || amount <= 0.0 {
            return ShieldHit {
                absorbed: 0.0,
                overflow: amount.max(0.0),
                broke: false,
            };
        }

        let absorbed = amount.min(self.strength);
        let excess = amount - absorbed;
        self.strength -= absorbed;
        let broke = self.strength <= 0.0;
        if broke {
            self.strength = 0.0;
        }
        let overflow = match self.overflow {
            ShieldOverflow::Absorb => 0.0,
            ShieldOverflow::SpillToHealth => excess,
        };
        ShieldHit {
            absorbed,
            overflow,
            broke,
        }
    }

    /// Regenerate after the grace period
    pub fn tick(&mut self, dt: f32) {
        self.since_hit += dt;
        if self.since_hit >= self.regen_delay && self.strength < self.max {
            self.strength = (self.strength + self.regen_rate * dt).min(self.max);
        }
    }
}

/// Anything the resolver can hurt
pub trait Damageable {
    fn entity_id(&self) -> EntityId;
    fn position(&self) -> Vec3;
    /// Active and alive
    fn can_take_damage(&self) -> bool;
    /// Per-target multiplier for `damage_type`; `None` defers to the resolver table
    fn resistance(&self, _damage_type: DamageType) -> Option<f32> {
        None
    }
    /// Apply already-resolved damage; returns true on the killing hit
    fn take_damage(&mut self, amount: f32, source: DamageSource, ctx: &mut SimContext) -> bool;
}

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    pub global_multiplier: f32,
    pub critical_chance: f32,
    pub critical_multiplier: f32,
    /// Missing sources count as 1.0
    pub source_modifiers: BTreeMap<SourceKind, f32>,
    /// Missing types count as 1.0
    pub resistances: BTreeMap<DamageType, f32>,
    /// Smallest falloff factor inside an area effect
    pub min_falloff: f32,
    pub shield_overflow: ShieldOverflow,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            global_multiplier: 1.0,
            critical_chance: 0.1,
            critical_multiplier: 2.0,
            source_modifiers: BTreeMap::new(),
            resistances: BTreeMap::new(),
            min_falloff: 0.1,
            shield_overflow: ShieldOverflow::Absorb,
        }
    }
}

/// Damage after modifiers and the critical roll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDamage {
    pub amount: f32,
    pub critical: bool,
}

/// Damage that was resolved and handed to a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedDamage {
    pub target: EntityId,
    pub amount: f32,
    pub critical: bool,
    pub killed: bool,
}

/// Parameters of a radial damage instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaEffect {
    pub center: Vec3,
    pub radius: f32,
    pub base: f32,
    pub damage_type: DamageType,
    pub source: DamageSource,
}

#[derive(Debug, Clone, Default)]
pub struct DamageResolver {
    config: DamageConfig,
}

impl DamageResolver {
    pub fn new(config: DamageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DamageConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DamageConfig {
        &mut self.config
    }

    fn source_modifier(&self, source: SourceKind) -> f32 {
        self.config.source_modifiers.get(&source).copied().unwrap_or(1.0)
    }

    fn resistance<T: Damageable + ?Sized>(&self, damage_type: DamageType, target: &T) -> f32 {
        target
            .resistance(damage_type)
            .or_else(|| self.config.resistances.get(&damage_type).copied())
            .unwrap_or(1.0)
    }

    /// Scale, roll critical and round; does not touch the target
    pub fn resolve_single_target<R, T>(
        &self,
        rng: &mut R,
        base: f32,
        damage_type: DamageType,
        source: SourceKind,
        target: &T,
    ) -> ResolvedDamage
    where
        R: Rng,
        T: Damageable + ?Sized,
    {
        let mut amount = base
            * self.config.global_multiplier
            * self.source_modifier(source)
            * self.resistance(damage_type, target);

        let critical = rng.random::<f32>() < self.config.critical_chance;
        if critical {
            amount *= self.config.critical_multiplier;
        }

        ResolvedDamage {
            amount: amount.round().max(0.0),
            critical,
        }
    }

    /// Resolve and apply to a single target
    pub fn apply<T: Damageable + ?Sized>(
        &self,
        ctx: &mut SimContext,
        base: f32,
        damage_type: DamageType,
        source: DamageSource,
        target: &mut T,
    ) -> AppliedDamage {
        let resolved =
            self.resolve_single_target(&mut ctx.rng, base, damage_type, source.kind, &*target);
        let killed = target.take_damage(resolved.amount, source, ctx);
        AppliedDamage {
            target: target.entity_id(),
            amount: resolved.amount,
            critical: resolved.critical,
            killed,
        }
    }

    /// Linear falloff with a floor: `max(min_falloff, 1 - d/r)`
    pub fn falloff(&self, distance: f32, radius: f32) -> f32 {
        if radius <= 0.0 {
            return self.config.min_falloff;
        }
        (1.0 - distance / radius).max(self.config.min_falloff)
    }

    /// Damage every eligible target within the radius
    pub fn resolve_area_effect<'a, T, I>(
        &self,
        ctx: &mut SimContext,
        area: &AreaEffect,
        targets: I,
        excluded: &[EntityId],
    ) -> Vec<AppliedDamage>
    where
        T: Damageable + ?Sized + 'a,
        I: IntoIterator<Item = &'a mut T>,
    {
        let radius_sq = area.radius * area.radius;
        let mut hits = Vec::new();

        for target in targets {
            if !target.can_take_damage() || excluded.contains(&target.entity_id()) {
                continue;
            }
            let dist_sq = target.position().distance_squared(area.center);
            if dist_sq > radius_sq {
                continue;
            }
            let scaled = area.base * self.falloff(dist_sq.sqrt(), area.radius);
            hits.push(self.apply(ctx, scaled, area.damage_type, area.source, target));
        }

        hits
    }
}
