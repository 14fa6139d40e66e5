//! Hit-streak combo tracking
//!
//! Every qualifying hit bumps the count and refills a timer; the multiplier
//! comes from a threshold table. The timer drains each tick and the combo
//! breaks when it runs out, or immediately when the player is hurt.

use serde::{Deserialize, Serialize};

/// One row of the multiplier table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComboTier {
    /// Minimum combo count for this tier
    pub hits: u32,
    pub multiplier: f32,
}

/// Combo tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    /// Hits below this damage do not count
    pub min_damage: f32,
    /// Seconds a combo survives without a hit
    pub duration: f32,
    /// Timer drain per second
    pub decay_rate: f32,
    /// Count added by a normal hit
    pub hit_increment: u32,
    /// Count added by a critical hit
    pub critical_increment: u32,
    pub max_multiplier: f32,
    /// Ascending by `hits`
    pub tiers: Vec<ComboTier>,
}

impl Default for ComboConfig {
    fn default() -> Self {
        let tier = |hits, multiplier| ComboTier { hits, multiplier };
        Self {
            min_damage: 1.0,
            duration: 3.0,
            decay_rate: 1.0,
            hit_increment: 1,
            critical_increment: 2,
            max_multiplier: 4.0,
            tiers: vec![
                tier(0, 1.0),
                tier(5, 1.25),
                tier(10, 1.5),
                tier(20, 2.0),
                tier(35, 2.5),
                tier(50, 3.0),
                tier(75, 3.5),
                tier(100, 4.0),
            ],
        }
    }
}

/// Why a combo ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakReason {
    Timeout,
    PlayerDamaged,
    PlayerDied,
    Reset,
}

/// Session-scoped combo counters, read by the UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComboState {
    pub count: u32,
    pub multiplier: f32,
    /// Seconds left before the combo breaks
    pub timer: f32,
    /// Best streak this session
    pub max_combo: u32,
}

impl Default for ComboState {
    fn default() -> Self {
        Self {
            count: 0,
            multiplier: 1.0,
            timer: 0.0,
            max_combo: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComboTracker {
    config: ComboConfig,
    state: ComboState,
}

impl ComboTracker {
    pub fn new(mut config: ComboConfig) -> Self {
        if !config.tiers.windows(2).all(|w| w[0].hits <= w[1].hits) {
            log::warn!("Combo tiers are not ascending; sorting them");
            config.tiers.sort_by_key(|t| t.hits);
        }
        // A later tier never pays less than an earlier one
        let mut best = 1.0f32;
        for tier in &mut config.tiers {
            best = best.max(tier.multiplier);
            tier.multiplier = best;
        }
        Self {
            config,
            state: ComboState::default(),
        }
    }

    pub fn state(&self) -> &ComboState {
        &self.state
    }

    pub fn count(&self) -> u32 {
        self.state.count
    }

    pub fn multiplier(&self) -> f32 {
        self.state.multiplier
    }

    /// Multiplier of the highest tier whose threshold does not exceed `count`
    pub fn multiplier_for(&self, count: u32) -> f32 {
        self.config
            .tiers
            .iter()
            .take_while(|t| t.hits <= count)
            .last()
            .map_or(1.0, |t| t.multiplier)
            .min(self.config.max_multiplier)
    }

    /// Count a hit; returns false when it was below the damage floor
    pub fn register_hit(&mut self, damage: f32, critical: bool) -> bool {
        if damage < self.config.min_damage {
            return false;
        }
        let increment = if critical {
            self.config.critical_increment
        } else {
            self.config.hit_increment
        };
        self.state.count = self.state.count.saturating_add(increment);
        self.state.timer = self.config.duration;
        self.state.multiplier = self.multiplier_for(self.state.count);
        self.state.max_combo = self.state.max_combo.max(self.state.count);
        true
    }

    /// End the current streak; returns the broken count if there was one
    pub fn break_combo(&mut self, reason: BreakReason) -> Option<u32> {
        let count = self.state.count;
        self.state.count = 0;
        self.state.multiplier = 1.0;
        self.state.timer = 0.0;
        if count > 0 {
            log::debug!("Combo of {} broken: {:?}", count, reason);
            Some(count)
        } else {
            None
        }
    }

    /// Drain the timer; returns the broken count on timeout
    pub fn update(&mut self, dt: f32) -> Option<u32> {
        if self.state.count == 0 {
            return None;
        }
        self.state.timer -= dt * self.config.decay_rate;
        if self.state.timer <= 0.0 {
            return self.break_combo(BreakReason::Timeout);
        }
        None
    }

    /// Session start: clear everything including the best streak
    pub fn reset(&mut self) {
        self.state = ComboState::default();
    }
}

impl Default for ComboTracker {
    fn default() -> Self {
        Self::new(ComboConfig::default())
    }
}
