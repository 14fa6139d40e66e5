//! Simulation context
//!
//! Everything an update call may touch besides the entities themselves:
//! the seeded RNG, the simulation clock, collaborator handles and the
//! outbound queues. One context per session; no global state.

use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::collab::{CoverSystem, NullScene, OpenGround, Physics, Scene, SimplePhysics};
use super::events::{AgentAction, EffectRequest, GameEvent};

pub struct SimContext {
    /// Run seed for reproducibility
    seed: u64,
    /// The only randomness source the simulation may use
    pub rng: Pcg32,
    /// Simulation time in seconds
    time: f32,
    pub physics: Box<dyn Physics>,
    pub scene: Box<dyn Scene>,
    pub cover: Box<dyn CoverSystem>,
    effects: Vec<EffectRequest>,
    actions: Vec<AgentAction>,
    events: Vec<GameEvent>,
}

impl SimContext {
    /// Headless context: simple physics, no scene, no cover
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            time: 0.0,
            physics: Box::new(SimplePhysics::new()),
            scene: Box::new(NullScene),
            cover: Box::new(OpenGround),
            effects: Vec::new(),
            actions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_physics(mut self, physics: impl Physics + 'static) -> Self {
        self.physics = Box::new(physics);
        self
    }

    pub fn with_scene(mut self, scene: impl Scene + 'static) -> Self {
        self.scene = Box::new(scene);
        self
    }

    pub fn with_cover(mut self, cover: impl CoverSystem + 'static) -> Self {
        self.cover = Box::new(cover);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Current simulation time (seconds)
    pub fn now(&self) -> f32 {
        self.time
    }

    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
    }

    /// Reseed the RNG and rewind the clock (session restart)
    pub fn restart(&mut self) {
        self.rng = Pcg32::seed_from_u64(self.seed);
        self.time = 0.0;
        self.effects.clear();
        self.actions.clear();
        self.events.clear();
    }

    pub fn request_effect(&mut self, effect: EffectRequest) {
        self.effects.push(effect);
    }

    /// Effects queued since the last flush
    pub fn effects(&self) -> &[EffectRequest] {
        &self.effects
    }

    /// Forward queued effects to the scene collaborator
    pub fn flush_effects(&mut self) {
        for effect in self.effects.drain(..) {
            match effect {
                EffectRequest::Visual {
                    kind,
                    position,
                    params,
                } => self.scene.spawn_visual_effect(kind, position, &params),
                EffectRequest::Indicator { agent, kind } => self.scene.attach_indicator(agent, kind),
            }
        }
    }

    pub fn queue_action(&mut self, action: AgentAction) {
        self.actions.push(action);
    }

    pub fn take_actions(&mut self) -> Vec<AgentAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Events emitted since the last drain
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("seed", &self.seed)
            .field("time", &self.time)
            .field("effects", &self.effects.len())
            .field("actions", &self.actions.len())
            .field("events", &self.events.len())
            .finish()
    }
}
