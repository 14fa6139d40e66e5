//! Agent pool
//!
//! Agents are allocated once and recycled. Ids are never reused, so a stale
//! weak reference to a despawned agent simply fails to resolve. The active
//! set is only rebuilt in [`AgentPool::commit`] (filter, then swap), so
//! nothing iterating it mid-tick ever sees a half-removed agent.

use std::collections::BTreeMap;

use glam::Vec3;

use super::EntityId;
use super::agent::{Agent, AgentKind, AgentState};
use super::behavior::KindState;
use super::context::SimContext;
use crate::consts::AGENT_BODY_RADIUS;
use crate::tuning::{AgentStats, Tuning};

/// Positions of everything an agent may target this tick, sorted by id
#[derive(Debug, Clone, Default)]
pub struct TargetSnapshot {
    entries: Vec<(EntityId, Vec3)>,
}

impl TargetSnapshot {
    pub fn insert(&mut self, id: EntityId, position: Vec3) {
        match self.entries.binary_search_by_key(&id, |e| e.0) {
            Ok(i) => self.entries[i].1 = position,
            Err(i) => self.entries.insert(i, (id, position)),
        }
    }

    pub fn position_of(&self, id: EntityId) -> Option<Vec3> {
        self.entries
            .binary_search_by_key(&id, |e| e.0)
            .ok()
            .map(|i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<Agent>,
    /// Indices into `agents` that are in the world, ascending
    active: Vec<usize>,
    /// Indices available for reuse
    free: Vec<usize>,
    /// Live id -> index
    index: BTreeMap<EntityId, usize>,
    next_id: EntityId,
}

impl AgentPool {
    /// Pre-allocate `capacity` pooled agents
    pub fn with_capacity(capacity: usize, tuning: &Tuning) -> Self {
        let kind = AgentKind::default();
        let agents: Vec<Agent> = (0..capacity)
            .map(|_| Agent::new(0, kind, tuning.stats(kind), tuning))
            .collect();
        Self {
            free: (0..capacity).rev().collect(),
            agents,
            active: Vec::with_capacity(capacity),
            index: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Take an agent from the pool (growing it if exhausted), configure and
    /// activate it at `position`, and register its physics body
    pub fn acquire(
        &mut self,
        kind: AgentKind,
        stats: &AgentStats,
        tuning: &Tuning,
        position: Vec3,
        ctx: &mut SimContext,
    ) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;

        let slot = match self.free.pop() {
            Some(slot) => {
                self.agents[slot].configure(kind, stats, tuning);
                slot
            }
            None => {
                self.agents.push(Agent::new(id, kind, stats, tuning));
                log::debug!("Agent pool grown to {}", self.agents.len());
                self.agents.len() - 1
            }
        };

        let agent = &mut self.agents[slot];
        agent.id = id;
        agent.activate(position);
        ctx.physics.add_body(id, position, AGENT_BODY_RADIUS);

        let at = self.active.partition_point(|&i| i < slot);
        self.active.insert(at, slot);
        self.index.insert(id, slot);
        log::trace!("Spawned {} {} at {}", kind.name(), id, position);
        id
    }

    /// Look up a live agent
    pub fn get(&self, id: EntityId) -> Option<&Agent> {
        self.index.get(&id).map(|&i| &self.agents[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Agent> {
        self.index.get(&id).map(|&i| &mut self.agents[i])
    }

    /// Deactivate immediately; the slot is reclaimed at the next commit
    pub fn despawn(&mut self, id: EntityId) {
        if let Some(agent) = self.get_mut(id) {
            agent.deactivate();
        }
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Agent> {
        self.active
            .iter()
            .map(|&i| &self.agents[i])
            .filter(|a| a.is_active())
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        // `active` is ascending, so walk it alongside the backing vector
        let mut wanted = self.active.iter().copied().peekable();
        self.agents.iter_mut().enumerate().filter_map(move |(i, agent)| {
            if wanted.next_if_eq(&i).is_some() {
                agent.is_active().then_some(agent)
            } else {
                None
            }
        })
    }

    /// Active ids in ascending order
    pub fn active_ids(&self) -> Vec<EntityId> {
        self.index
            .iter()
            .filter(|&(_, &i)| self.agents[i].is_active())
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    /// Active and alive
    pub fn living_count(&self) -> usize {
        self.iter_active().filter(|a| a.is_alive()).count()
    }

    /// Total pooled capacity, active or not
    pub fn capacity(&self) -> usize {
        self.agents.len()
    }

    /// Positions of every living agent, plus `extra` (e.g. the player)
    pub fn snapshot(&self, extra: &[(EntityId, Vec3)]) -> TargetSnapshot {
        let mut snapshot = TargetSnapshot::default();
        for agent in self.iter_active().filter(|a| a.is_alive()) {
            snapshot.insert(agent.id, agent.position);
        }
        for &(id, position) in extra {
            snapshot.insert(id, position);
        }
        snapshot
    }

    /// Recompute every agent's commander damage buff (strongest aura wins)
    pub fn apply_commander_buffs(&mut self) {
        let auras: Vec<(EntityId, Vec3, f32, f32)> = self
            .iter_active()
            .filter(|a| a.is_alive())
            .filter_map(|a| match a.kind_state() {
                KindState::Commander(s) => Some((
                    a.id,
                    a.position,
                    s.tuning.buff_radius * s.tuning.buff_radius,
                    s.tuning.buff_multiplier,
                )),
                _ => None,
            })
            .collect();

        for agent in self.iter_active_mut() {
            agent.damage_buff = 1.0;
            if !agent.is_alive() {
                continue;
            }
            for &(commander, center, radius_sq, multiplier) in &auras {
                if commander != agent.id && agent.position.distance_squared(center) <= radius_sq {
                    agent.damage_buff = agent.damage_buff.max(multiplier);
                }
            }
        }
    }

    /// Run every active agent's state machine, in id order
    pub fn update_agents(&mut self, dt: f32, ctx: &mut SimContext, targets: &TargetSnapshot) {
        for id in self.active_ids() {
            if let Some(agent) = self.get_mut(id) {
                agent.update(dt, ctx, targets);
            }
        }
    }

    /// Rebuild the active set without the agents deactivated this tick and
    /// return their ids
    pub fn commit(&mut self, ctx: &mut SimContext) -> Vec<EntityId> {
        let (keep, gone): (Vec<usize>, Vec<usize>) = self
            .active
            .iter()
            .partition(|&&i| self.agents[i].is_active());

        let mut removed = Vec::with_capacity(gone.len());
        for slot in gone {
            let id = self.agents[slot].id;
            self.index.remove(&id);
            ctx.physics.remove_body(id);
            self.free.push(slot);
            removed.push(id);
        }
        self.active = keep;
        removed
    }

    /// Despawn everything (session reset)
    pub fn release_all(&mut self, ctx: &mut SimContext) {
        for &i in &self.active {
            self.agents[i].deactivate();
        }
        let removed = self.commit(ctx);
        if !removed.is_empty() {
            log::debug!("Released {} agents", removed.len());
        }
    }

    /// Ids of agents currently in `state`'s variant
    pub fn ids_in_state(&self, state: &AgentState) -> Vec<EntityId> {
        let wanted = std::mem::discriminant(state);
        self.iter_active()
            .filter(|a| std::mem::discriminant(&a.state()) == wanted)
            .map(|a| a.id)
            .collect()
    }
}
