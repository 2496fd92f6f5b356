//! Property tests for the hex grid and the exact path search
//!
//! - Spiral enumeration visits every tile of a ring area once, inner rings first
//! - Moving and moving back returns to the start anywhere on the wrapping map
//! - Paths found over existing roads replay exactly onto their target

use ahash::AHashSet;
use proptest::prelude::*;
use serf_ai::road::{find_existing_path, PathResult, Road};
use serf_ai::spatial::{spiral_dist, Direction, MapGeometry, MapPos};
use serf_ai::world::{SimWorld, World};

fn direction() -> impl Strategy<Value = Direction> {
    (0usize..6).prop_map(Direction::from_index)
}

proptest! {
    #[test]
    fn prop_spiral_is_distinct_and_ordered(col in 0i32..64, row in 0i32..64, rings in 1u32..12) {
        let geom = MapGeometry::new(64, 64);
        let center = geom.pos(col, row);
        let area: Vec<MapPos> = geom.spiral(center, spiral_dist(rings)).collect();

        prop_assert_eq!(area.len() as u32, spiral_dist(rings));
        let unique: AHashSet<MapPos> = area.iter().copied().collect();
        prop_assert_eq!(unique.len(), area.len());
        prop_assert_eq!(area[0], center);
        prop_assert_eq!(area.iter().filter(|p| **p == center).count(), 1);

        let rings_seen: Vec<u32> = area.iter().map(|p| geom.distance(center, *p)).collect();
        prop_assert!(rings_seen.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(*rings_seen.last().unwrap(), rings);
    }

    #[test]
    fn prop_move_and_back_round_trips(
        cols in 8u32..80,
        rows in 8u32..80,
        col in 0i32..80,
        row in 0i32..80,
        dir in direction(),
    ) {
        let geom = MapGeometry::new(cols, rows);
        let pos = geom.pos(col % cols as i32, row % rows as i32);
        let moved = geom.move_pos(pos, dir);
        prop_assert_eq!(geom.move_pos(moved, dir.reverse()), pos);
    }

    #[test]
    fn prop_found_paths_replay_onto_target(
        dirs in prop::collection::vec(direction(), 1..8),
        len in 2usize..5,
    ) {
        let geom = MapGeometry::new(96, 96);
        let mut world = SimWorld::new(geom);
        world.claim_area(geom.pos(48, 48), 40, 0);

        // chain of straight roads, skipping turns that double back
        let start = geom.pos(48, 48);
        let mut flag = start;
        let mut used: AHashSet<MapPos> = AHashSet::new();
        used.insert(start);
        world.place_flag(start, 0);
        for dir in dirs {
            let road = Road::from_dirs(&geom, flag, vec![dir; len]);
            let tiles = road.positions(&geom);
            if tiles[1..].iter().any(|p| used.contains(p) || geom.neighbors(*p).iter().any(|n| used.contains(n) && *n != flag)) {
                continue;
            }
            used.extend(tiles.iter().copied());
            world.place_flag(road.end(), 0);
            world.place_road(&road);
            flag = road.end();
        }
        prop_assume!(flag != start);

        match find_existing_path(&world, start, flag) {
            PathResult::Found(path) => {
                let mut pos = path.source();
                for dir in path.dirs() {
                    prop_assert!(world.has_path(pos, *dir));
                    pos = geom.move_pos(pos, *dir);
                }
                prop_assert_eq!(pos, flag);
                prop_assert_eq!(path.end(), flag);
            }
            other => prop_assert!(false, "expected a path, got {:?}", other),
        }
    }
}

#[test]
fn test_two_rings_hold_nineteen_tiles() {
    let geom = MapGeometry::new(32, 32);
    let area: Vec<MapPos> = geom.spiral(geom.pos(0, 0), spiral_dist(2)).collect();
    assert_eq!(spiral_dist(2), 19);
    assert_eq!(area.len(), 19);
    assert_eq!(area.iter().filter(|p| geom.distance(geom.pos(0, 0), **p) == 1).count(), 6);
    assert_eq!(area.iter().filter(|p| geom.distance(geom.pos(0, 0), **p) == 2).count(), 12);
}

#[test]
fn test_no_path_between_separate_roads() {
    let geom = MapGeometry::new(32, 32);
    let mut world = SimWorld::new(geom);
    world.claim_area(geom.pos(16, 16), 12, 0);
    let a = Road::from_dirs(&geom, geom.pos(8, 8), vec![Direction::Right; 3]);
    let b = Road::from_dirs(&geom, geom.pos(8, 20), vec![Direction::Right; 3]);
    for road in [&a, &b] {
        world.place_flag(road.source(), 0);
        world.place_flag(road.end(), 0);
        world.place_road(road);
    }
    assert_eq!(find_existing_path(&world, a.source(), b.end()), PathResult::NoPath);
    assert_eq!(find_existing_path(&world, a.source(), a.source()), PathResult::Trivial);
}
