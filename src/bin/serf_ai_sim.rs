//! Headless AI Simulation
//!
//! Runs one or more AI players against a generated in-memory map and prints
//! a JSON summary of what each of them built.

use std::collections::BTreeMap;

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serf_ai::ai::AiController;
use serf_ai::core::error::{AiError, Result};
use serf_ai::core::types::{MapObject, PlayerIndex, Terrain};
use serf_ai::core::{load_profile, AiConfig};
use serf_ai::spatial::{MapGeometry, MapPos};
use serf_ai::world::{SharedWorld, SimWorld, World};

/// Headless AI Simulation - AI players on a generated map
#[derive(Parser, Debug)]
#[command(name = "serf_ai_sim")]
#[command(about = "Run AI players on a generated map and print what they built")]
struct Args {
    /// AI profile name (loaded from data/ai_profiles/)
    #[arg(long, default_value = "default")]
    profile: String,

    /// Number of AI players
    #[arg(long, default_value_t = 1)]
    players: u32,

    /// AI cycles per player
    #[arg(long, default_value_t = 60)]
    cycles: u64,

    /// Game ticks simulated between cycles
    #[arg(long, default_value_t = 2_000)]
    ticks_per_cycle: u64,

    /// Map width in tiles
    #[arg(long, default_value_t = 96)]
    width: u32,

    /// Map height in tiles
    #[arg(long, default_value_t = 96)]
    height: u32,

    /// Random seed for deterministic runs
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Serialize)]
struct PlayerSummary {
    player: PlayerIndex,
    loops: u64,
    castle: Option<MapPos>,
    status: String,
    flags: usize,
    buildings: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct SimSummary {
    seed: u64,
    profile: String,
    cycles: u64,
    final_tick: u64,
    players: Vec<PlayerSummary>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("serf_ai=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(match e {
                AiError::NoCastleSite { .. } => 2,
                _ => 1,
            });
        }
    }
}

fn run(args: &Args) -> Result<SimSummary> {
    let config = load_profile(&args.profile).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load profile '{}': {}", args.profile, e);
        eprintln!("Using default profile");
        AiConfig::new()
    });
    if let Err(reason) = config.validate() {
        return Err(AiError::InvalidConfig(reason));
    }

    let geometry = MapGeometry::new(args.width, args.height);
    let world = SharedWorld::new(generate_map(geometry, args.seed));

    let mut players: Vec<AiController<SimWorld>> = (0..args.players)
        .map(|p| AiController::with_seed(world.clone(), p, config.clone(), args.seed.wrapping_add(u64::from(p))))
        .collect();

    for cycle in 0..args.cycles {
        for ai in players.iter_mut() {
            ai.run_cycles(1)?;
        }
        world.write(|w| w.advance(args.ticks_per_cycle));
        if cycle % 10 == 0 {
            tracing::debug!(cycle, tick = world.read(|w| w.tick()), "simulation progress");
        }
    }

    let summaries = players
        .iter()
        .map(|ai| {
            let player = ai.player();
            world.read(|w| {
                let mut buildings = BTreeMap::new();
                for b in w.player_buildings(player) {
                    *buildings.entry(b.kind.to_string()).or_insert(0) += 1;
                }
                PlayerSummary {
                    player,
                    loops: ai.loop_count(),
                    castle: w.castle_of(player),
                    status: ai.status().get(),
                    flags: w.flag_count(player),
                    buildings,
                }
            })
        })
        .collect();

    Ok(SimSummary {
        seed: args.seed,
        profile: config.name.clone(),
        cycles: args.cycles,
        final_tick: world.read(|w| w.tick()),
        players: summaries,
    })
}

/// Grassland scattered with forests, stone piles, lakes and hills
fn generate_map(geometry: MapGeometry, seed: u64) -> SimWorld {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut world = SimWorld::new(geometry);
    let area = geometry.tile_count();
    let random_pos = |rng: &mut ChaCha8Rng| {
        geometry.pos(
            rng.gen_range(0..geometry.cols() as i32),
            rng.gen_range(0..geometry.rows() as i32),
        )
    };

    for _ in 0..(area / 1_500).max(1) {
        let center = random_pos(&mut rng);
        world.paint_terrain(center, rng.gen_range(2..5), Terrain::Water1);
    }
    for _ in 0..(area / 1_200).max(1) {
        let center = random_pos(&mut rng);
        let rings = rng.gen_range(3..6);
        world.paint_terrain(center, rings, Terrain::Tundra1);
        world.paint_terrain(center, rings / 2, Terrain::Snow0);
    }
    for _ in 0..area / 300 {
        let center = random_pos(&mut rng);
        let rings = rng.gen_range(2..4);
        let tiles: Vec<MapPos> = geometry.spiral_rings(center, rings).collect();
        for pos in tiles {
            if world.terrain_at(pos).is_grass() && rng.gen_bool(0.5) {
                world.set_object(pos, MapObject::Tree(rng.gen_range(0..8)));
            }
        }
    }
    for _ in 0..area / 600 {
        let center = random_pos(&mut rng);
        let tiles: Vec<MapPos> = geometry.spiral_rings(center, 1).collect();
        for pos in tiles {
            if world.terrain_at(pos).is_grass() && rng.gen_bool(0.6) {
                world.set_object(pos, MapObject::Stone(rng.gen_range(0..4)));
            }
        }
    }
    world
}
