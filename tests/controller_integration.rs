//! Integration tests for the AI controller
//!
//! These tests drive whole cycles against the in-memory world:
//! - First cycle places a castle, later cycles grow the settlement
//! - Several controllers share one world without stepping on each other
//! - Stop handles, threads and status text behave across threads
//! - Self-healing timers fire once, on schedule

use std::thread;
use std::time::Duration;

use serf_ai::ai::{AiController, Hysteresis, STATUS_END_OF_LOOP};
use serf_ai::core::config::AiConfig;
use serf_ai::core::types::{MapObject, SerfState, SerfType};
use serf_ai::placement::{count_objects_near_pos, CandidateSet, ObjectClass};
use serf_ai::spatial::{spiral_dist, MapGeometry};
use serf_ai::world::sim::Command;
use serf_ai::world::{SharedWorld, SimWorld, World};

/// Grassland with a forest and a quarry either side of the middle
fn settled_world(size: u32) -> (SimWorld, MapGeometry) {
    let geom = MapGeometry::new(size, size);
    let mut world = SimWorld::new(geom);
    let middle = size as i32 / 2;
    for pos in geom.spiral_rings(geom.pos(middle + 6, middle), 3) {
        world.set_object(pos, MapObject::Tree(2));
    }
    for pos in geom.spiral_rings(geom.pos(middle - 6, middle), 1) {
        world.set_object(pos, MapObject::Stone(0));
    }
    (world, geom)
}

fn headless(shared: &SharedWorld<SimWorld>, player: u32, seed: u64) -> AiController<SimWorld> {
    AiController::with_seed(shared.clone(), player, AiConfig::headless(), seed)
}

// ============================================================================
// Cycle Tests
// ============================================================================

/// Integration test: a settlement grows over a few dozen cycles
///
/// 1. First cycle places the castle
/// 2. Each later cycle runs after the world has advanced
/// 3. Every building ends up on the player's own land with its flag
#[test]
fn test_settlement_grows_over_cycles() {
    let (world, geom) = settled_world(80);
    let shared = SharedWorld::new(world);
    let mut ai = headless(&shared, 0, 21);

    for _ in 0..30 {
        ai.run_cycles(1).expect("map has castle sites");
        shared.write(|w| w.advance(2_000));
    }

    assert_eq!(ai.loop_count(), 30);
    assert_eq!(ai.status().get(), STATUS_END_OF_LOOP);
    assert!(ai.castle_flag().is_some());

    let buildings = shared.read(|w| w.player_buildings(0));
    assert!(buildings.len() > 1, "only the castle after 30 cycles");
    shared.read(|w| {
        for b in &buildings {
            assert_eq!(w.owner_of(b.pos), Some(0), "{} at {} on foreign land", b.kind, b.pos);
            assert!(w.has_flag(geom.flag_of_building(b.pos)));
        }
    });
}

#[test]
fn test_two_players_share_a_world() {
    let (world, _) = settled_world(96);
    let shared = SharedWorld::new(world);
    let mut red = headless(&shared, 0, 3);
    let mut blue = headless(&shared, 1, 4);

    for _ in 0..5 {
        red.run_cycles(1).expect("red castle");
        blue.run_cycles(1).expect("blue castle");
        shared.write(|w| w.advance(1_000));
    }

    let (a, b) = shared.read(|w| (w.castle_of(0), w.castle_of(1)));
    let (a, b) = (a.expect("red castle placed"), b.expect("blue castle placed"));
    assert_ne!(a, b);
    shared.read(|w| {
        for building in w.player_buildings(1) {
            assert_ne!(w.owner_of(building.pos), Some(0));
        }
    });
}

#[test]
fn test_controller_thread_stops_on_request() {
    let (world, _) = settled_world(64);
    let shared = SharedWorld::new(world);
    let ai = headless(&shared, 0, 8);
    let handle = ai.spawn().expect("thread spawns");

    thread::sleep(Duration::from_millis(50));
    let status = handle.status.clone();
    handle.stop_and_join().expect("clean shutdown");
    assert!(!status.get().is_empty());
    assert!(shared.read(|w| w.castle_of(0)).is_some());
}

#[test]
fn test_blacklist_starts_empty_after_restart() {
    let (world, _) = settled_world(64);
    let shared = SharedWorld::new(world);
    let mut first = headless(&shared, 0, 5);
    first.run_cycles(3).expect("castle placed");
    drop(first);

    // nothing rejected in an earlier session is remembered
    let second = headless(&shared, 0, 5);
    assert!(second.blacklist().is_empty());
}

// ============================================================================
// Timer and Threshold Tests
// ============================================================================

/// Integration test: a stuck serf is recalled once, on schedule
///
/// 1. Serf starts waiting on a road at tick T
/// 2. Nothing happens one tick before T + delay
/// 3. Exactly one recall at T + delay
/// 4. The timer is gone on the next cycle
#[test]
fn test_stuck_serf_recalled_once_on_schedule() {
    let (world, geom) = settled_world(64);
    let shared = SharedWorld::new(world);
    let mut ai = headless(&shared, 0, 13);
    ai.run_cycles(1).expect("castle placed");

    let start = 50_000;
    let delay = ai.config().timing.stuck_serf_delay;
    let serf = shared.write(|w| {
        w.set_tick(start);
        w.add_serf(SerfType::Transporter, SerfState::WaitIdleOnPath, geom.pos(32, 32), 0)
    });
    let recalls = |shared: &SharedWorld<SimWorld>| {
        shared.read(|w| {
            w.commands()
                .iter()
                .filter(|c| **c == Command::SetSerfLost(serf))
                .count()
        })
    };

    ai.run_cycles(1).expect("cycle");
    shared.write(|w| w.set_tick(start + delay - 1));
    ai.run_cycles(1).expect("cycle");
    assert_eq!(recalls(&shared), 0);

    shared.write(|w| w.set_tick(start + delay));
    ai.run_cycles(1).expect("cycle");
    assert_eq!(recalls(&shared), 1);

    shared.write(|w| w.set_tick(start + 3 * delay));
    ai.run_cycles(1).expect("cycle");
    assert_eq!(recalls(&shared), 1);
}

#[test]
fn test_hysteresis_fires_only_past_the_buffer() {
    let gate = Hysteresis::new(35, 6);
    assert!(!gate.exceeded(35 + 6 - 1));
    assert!(gate.exceeded(35 + 6));
    assert!(gate.exceeded(35 + 6 + 1));
}

#[test]
fn test_corner_needs_enough_trees() {
    let geom = MapGeometry::new(64, 64);
    let corner = geom.pos(30, 30);
    let score = |trees: usize| {
        let mut world = SimWorld::new(geom);
        for pos in geom.spiral(corner, spiral_dist(4)).skip(1).take(trees) {
            world.set_object(pos, MapObject::Tree(0));
        }
        count_objects_near_pos(&world, corner, spiral_dist(4), ObjectClass::Trees)
    };

    let mut rich = CandidateSet::with_minimum(10);
    assert!(rich.insert(corner, score(12)));
    assert_eq!(rich.ranked_positions(), vec![corner]);

    let mut poor = CandidateSet::with_minimum(10);
    assert!(!poor.insert(corner, score(4)));
    assert!(poor.is_empty());
    assert!(!poor.contains(corner));
}
