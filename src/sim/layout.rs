//! Formation layouts
//!
//! Pure functions from layout parameters to local-space slot offsets on the
//! ground plane (+Z is the formation's forward). Regenerating with the same
//! parameters always yields the same offsets in the same slot order.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::agent::AgentKind;
use crate::polar_to_ground;

/// Upper bounds for count parameters read from configs
pub const MAX_GRID_SIDE: u32 = 64;
pub const MAX_DIAMOND_LAYERS: u32 = 16;
pub const MAX_PINCER_ARMS: u32 = 16;
pub const MAX_ENEMIES_PER_ARM: u32 = 64;
pub const MAX_RING_COUNT: u32 = 128;

fn cap(name: &str, value: u32, max: u32) -> u32 {
    if value > max {
        log::warn!("Layout {} {} exceeds {}, clamping", name, value, max);
        max
    } else {
        value
    }
}

/// Layout families, as named in wave configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutKind {
    #[default]
    Grid,
    Diamond,
    Pincer,
    EliteSquad,
}

impl LayoutKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "grid" => Some(LayoutKind::Grid),
            "diamond" => Some(LayoutKind::Diamond),
            "pincer" => Some(LayoutKind::Pincer),
            "elitesquad" | "ring" | "squad" => Some(LayoutKind::EliteSquad),
            _ => None,
        }
    }

    /// Parse a config name, falling back to [`LayoutKind::Grid`] with a warning
    pub fn from_name_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown formation type '{}', using grid", name);
            Self::default()
        })
    }
}

/// A parameterized layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    Grid {
        rows: u32,
        columns: u32,
        spacing: f32,
    },
    /// Concentric layers; layer `l` holds `4l` slots at radius `l·spacing`
    Diamond { layers: u32, spacing: f32 },
    Pincer {
        arms: u32,
        enemies_per_arm: u32,
        /// Total angle spanned by the arms (degrees)
        arm_angle: f32,
        arm_length: f32,
        /// Lateral bend as a fraction of arm length
        curvature: f32,
    },
    EliteSquad {
        center: bool,
        inner_count: u32,
        inner_radius: f32,
        outer_count: u32,
        outer_radius: f32,
    },
}

impl Layout {
    pub fn kind(&self) -> LayoutKind {
        match self {
            Layout::Grid { .. } => LayoutKind::Grid,
            Layout::Diamond { .. } => LayoutKind::Diamond,
            Layout::Pincer { .. } => LayoutKind::Pincer,
            Layout::EliteSquad { .. } => LayoutKind::EliteSquad,
        }
    }

    /// Number of slots without generating them
    pub fn slot_count(&self) -> usize {
        match *self {
            Layout::Grid { rows, columns, .. } => (rows as usize).saturating_mul(columns as usize),
            Layout::Diamond { layers, .. } => {
                let l = layers as usize;
                l.saturating_mul(l.saturating_add(1)).saturating_mul(2).saturating_add(1)
            }
            Layout::Pincer {
                arms,
                enemies_per_arm,
                ..
            } => (arms as usize).saturating_mul(enemies_per_arm as usize),
            Layout::EliteSquad {
                center,
                inner_count,
                outer_count,
                ..
            } => (center as usize)
                .saturating_add(inner_count as usize)
                .saturating_add(outer_count as usize),
        }
    }

    /// Same layout with every count parameter within its bound
    pub fn clamped(&self) -> Layout {
        let mut layout = *self;
        match &mut layout {
            Layout::Grid { rows, columns, .. } => {
                *rows = cap("rows", *rows, MAX_GRID_SIDE);
                *columns = cap("columns", *columns, MAX_GRID_SIDE);
            }
            Layout::Diamond { layers, .. } => *layers = cap("layers", *layers, MAX_DIAMOND_LAYERS),
            Layout::Pincer {
                arms,
                enemies_per_arm,
                ..
            } => {
                *arms = cap("arms", *arms, MAX_PINCER_ARMS);
                *enemies_per_arm = cap("enemies_per_arm", *enemies_per_arm, MAX_ENEMIES_PER_ARM);
            }
            Layout::EliteSquad {
                inner_count,
                outer_count,
                ..
            } => {
                *inner_count = cap("inner_count", *inner_count, MAX_RING_COUNT);
                *outer_count = cap("outer_count", *outer_count, MAX_RING_COUNT);
            }
        }
        layout
    }

    /// Local-space slot offsets
    pub fn positions(&self) -> Vec<Vec3> {
        match *self {
            Layout::Grid {
                rows,
                columns,
                spacing,
            } => {
                let half_w = (columns.saturating_sub(1)) as f32 / 2.0;
                let half_d = (rows.saturating_sub(1)) as f32 / 2.0;
                (0..rows)
                    .flat_map(|r| {
                        (0..columns).map(move |c| {
                            Vec3::new((c as f32 - half_w) * spacing, 0.0, (r as f32 - half_d) * spacing)
                        })
                    })
                    .collect()
            }
            Layout::Diamond { layers, spacing } => {
                let mut out = vec![Vec3::ZERO];
                for layer in 1..=layers {
                    let count = 4 * layer;
                    let radius = layer as f32 * spacing;
                    out.extend(
                        (0..count).map(|k| polar_to_ground(radius, TAU * k as f32 / count as f32)),
                    );
                }
                out
            }
            Layout::Pincer {
                arms,
                enemies_per_arm,
                arm_angle,
                arm_length,
                curvature,
            } => {
                let span = arm_angle.to_radians();
                let mut out = Vec::with_capacity(self.slot_count());
                for arm in 0..arms {
                    let angle = if arms > 1 {
                        -span / 2.0 + span * arm as f32 / (arms - 1) as f32
                    } else {
                        0.0
                    };
                    // Spoke direction by heading, and its right-hand normal
                    let (s, c) = angle.sin_cos();
                    let dir = Vec3::new(s, 0.0, c);
                    let side = Vec3::new(c, 0.0, -s);
                    for i in 0..enemies_per_arm {
                        let frac = (i + 1) as f32 / enemies_per_arm as f32;
                        let bend = (PI * frac).sin() * curvature * arm_length;
                        out.push(dir * frac * arm_length + side * bend);
                    }
                }
                out
            }
            Layout::EliteSquad {
                center,
                inner_count,
                inner_radius,
                outer_count,
                outer_radius,
            } => {
                let mut out = Vec::new();
                if center {
                    out.push(Vec3::ZERO);
                }
                out.extend((0..inner_count).map(|k| {
                    polar_to_ground(inner_radius, TAU * k as f32 / inner_count as f32)
                }));
                // Outer ring is staggered half a step
                out.extend((0..outer_count).map(|k| {
                    polar_to_ground(outer_radius, TAU * (k as f32 + 0.5) / outer_count as f32)
                }));
                out
            }
        }
    }

    /// Same layout with every distance multiplied by `factor`
    pub fn scaled(&self, factor: f32) -> Layout {
        let mut layout = *self;
        match &mut layout {
            Layout::Grid { spacing, .. } | Layout::Diamond { spacing, .. } => *spacing *= factor,
            Layout::Pincer { arm_length, .. } => *arm_length *= factor,
            Layout::EliteSquad {
                inner_radius,
                outer_radius,
                ..
            } => {
                *inner_radius *= factor;
                *outer_radius *= factor;
            }
        }
        layout
    }

    /// Fixed kind per slot; `None` slots are sampled from the distribution
    pub fn slot_roles(&self) -> Vec<Option<AgentKind>> {
        match *self {
            Layout::Grid { .. } => vec![None; self.slot_count()],
            Layout::Diamond { layers, .. } => {
                let mut roles = vec![Some(AgentKind::Commander)];
                for layer in 1..=layers {
                    let kind = match layer {
                        1 => AgentKind::Elite,
                        2 => AgentKind::Soldier,
                        _ => AgentKind::Drone,
                    };
                    roles.extend(std::iter::repeat_n(Some(kind), (4 * layer) as usize));
                }
                roles
            }
            Layout::Pincer {
                arms,
                enemies_per_arm,
                ..
            } => (0..arms)
                .flat_map(|_| {
                    (0..enemies_per_arm).map(move |i| {
                        (i + 1 == enemies_per_arm).then_some(AgentKind::Soldier)
                    })
                })
                .collect(),
            Layout::EliteSquad {
                center,
                inner_count,
                outer_count,
                ..
            } => {
                let mut roles = Vec::new();
                if center {
                    roles.push(Some(AgentKind::Commander));
                }
                roles.extend(std::iter::repeat_n(Some(AgentKind::Elite), inner_count as usize));
                roles.extend(std::iter::repeat_n(Some(AgentKind::Soldier), outer_count as usize));
                roles
            }
        }
    }
}
