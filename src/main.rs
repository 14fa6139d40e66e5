//! Arena Siege headless runner
//!
//! Drives a combat session from the command line with a scripted player that
//! stands in the middle of the arena and shoots the nearest enemy. Useful for
//! balance passes: the final statistics are printed as JSON.

use std::path::PathBuf;

use clap::Parser;
use glam::Vec3;
use serde::Serialize;

use arena_siege::consts::{MAX_SUBSTEPS, SIM_DT};
use arena_siege::sim::collab::{LogScene, PillarCover};
use arena_siege::sim::{DamageType, EncounterConfig, GameEvent, WavePhase};
use arena_siege::{CombatCoordinator, CombatStats, ConfigError, SimContext, Tuning};

/// Run an arena combat session without rendering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RNG seed; the same seed and inputs replay the same session
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of frames to run
    #[arg(long, default_value_t = 7200)]
    frames: u32,

    /// Frame duration in seconds, split into fixed simulation steps
    #[arg(long, default_value_t = SIM_DT)]
    frame_dt: f32,

    /// Balance sheet (JSON); defaults are used when omitted
    #[arg(long)]
    tuning: Option<PathBuf>,

    /// Encounter definition (JSON); the built-in demo when omitted
    #[arg(long)]
    encounter: Option<PathBuf>,

    /// Seconds between scripted player shots (0 disables shooting)
    #[arg(long, default_value_t = 0.25)]
    fire_interval: f32,

    /// Base damage of a player shot
    #[arg(long, default_value_t = 15.0)]
    shot_damage: f32,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    seed: u64,
    sim_time: f32,
    wave: u32,
    phase: WavePhase,
    player_health: f32,
    stats: &'a CombatStats,
}

/// Unit direction from the player to the nearest living agent
fn aim(session: &CombatCoordinator) -> Option<Vec3> {
    let origin = session.player().position;
    session
        .pool()
        .iter_active()
        .filter(|a| a.is_alive())
        .min_by(|a, b| {
            a.position
                .distance_squared(origin)
                .total_cmp(&b.position.distance_squared(origin))
        })
        .map(|a| (a.position - origin).normalize_or_zero())
}

fn main() -> Result<(), ConfigError> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let tuning = match &args.tuning {
        Some(path) => Tuning::load(path)?,
        None => Tuning::default(),
    };
    let encounter = match &args.encounter {
        Some(path) => EncounterConfig::load(path)?,
        None => EncounterConfig::default(),
    };

    log::info!("Arena Siege (headless) starting, seed {}", args.seed);
    let ctx = SimContext::new(args.seed)
        .with_scene(LogScene)
        .with_cover(PillarCover::ring(8, 18.0, 1.5));
    let mut session = CombatCoordinator::new(ctx, tuning, encounter);
    session.start();

    let mut accumulator = 0.0;
    let mut fire_cooldown = 0.0;
    'frames: for _ in 0..args.frames {
        accumulator += args.frame_dt.max(0.0);

        let mut substeps = 0;
        while accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            fire_cooldown -= SIM_DT;
            if args.fire_interval > 0.0 && fire_cooldown <= 0.0 {
                if let Some(direction) = aim(&session) {
                    let origin = session.player().position;
                    session.fire(origin, direction, 120.0, args.shot_damage, DamageType::Kinetic);
                }
                fire_cooldown = args.fire_interval;
            }

            session.update(SIM_DT);
            accumulator -= SIM_DT;
            substeps += 1;

            for event in session.drain_events() {
                match event {
                    GameEvent::WaveStarted { wave, total_enemies } => {
                        log::info!("Wave {} incoming: {} enemies", wave, total_enemies)
                    }
                    GameEvent::ComboBroken { count, reason } if count >= 10 => {
                        log::info!("Combo of {} lost ({:?})", count, reason)
                    }
                    GameEvent::PlayerDied => {
                        log::info!("Player down at t={:.1}s", session.ctx().now());
                        break 'frames;
                    }
                    GameEvent::AllWavesComplete => {
                        log::info!("Encounter cleared at t={:.1}s", session.ctx().now());
                        break 'frames;
                    }
                    _ => {}
                }
            }
        }
        // Drop time we could not simulate this frame
        if substeps == MAX_SUBSTEPS {
            accumulator = 0.0;
        }
    }

    let summary = Summary {
        seed: args.seed,
        sim_time: session.ctx().now(),
        wave: session.orchestrator().wave(),
        phase: session.orchestrator().phase(),
        player_health: session.player().health(),
        stats: session.stats(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
