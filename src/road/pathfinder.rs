//! Road searches over the hex map
//!
//! - [`find_existing_path`]: exact A* restricted to existing path segments
//! - [`trace_existing_road`]: deterministic walk along one road to the next flag
//! - [`plot_road`]: A* over open tiles for a brand-new road, collecting
//!   split-road solutions along the way
//! - [`find_flag_and_tile_dist`]: flag-to-flag search scoring a route
//!
//! All functions take a plain `&W` and are meant to run inside a single
//! [`SharedWorld::read`](crate::world::SharedWorld::read) call.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::types::PlayerIndex;
use crate::road::route::{PathResult, Road};
use crate::spatial::{Direction, MapGeometry, MapPos};
use crate::world::{SegmentKind, World};

/// Cost of one step by height difference (0..=4)
pub const WALK_COST: [u32; 5] = [255, 319, 383, 447, 511];

fn walk_cost(h_diff: u32) -> u32 {
    WALK_COST[(h_diff as usize).min(WALK_COST.len() - 1)]
}

/// Cost of walking from `pos` one step in `dir`
pub fn step_cost<W: World + ?Sized>(world: &W, pos: MapPos, dir: Direction) -> u32 {
    let next = world.geometry().move_pos(pos, dir);
    walk_cost(world.height_at(pos).abs_diff(world.height_at(next)))
}

/// Distance estimate spreading the overall climb evenly over the steps
pub fn heuristic_cost<W: World + ?Sized>(world: &W, start: MapPos, end: MapPos) -> u32 {
    let dist = world.geometry().distance(start, end);
    if dist == 0 {
        return 0;
    }
    let h_diff = world.height_at(start).abs_diff(world.height_at(end));
    dist * walk_cost(h_diff / dist)
}

/// Distance times the cheapest step; never overestimates
fn admissible_cost(geometry: &MapGeometry, start: MapPos, end: MapPos) -> u32 {
    geometry.distance(start, end) * WALK_COST[0]
}

/// Node in the A* open set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathNode {
    pos: MapPos,
    g_cost: u32,
    f_cost: u32, // g_cost + heuristic
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, ties go to the lower position
        (other.f_cost, other.pos, other.g_cost).cmp(&(self.f_cost, self.pos, self.g_cost))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rebuild the road from `start` to `end` out of the parent links
fn reconstruct_road(
    geometry: &MapGeometry,
    came_from: &AHashMap<MapPos, (MapPos, Direction)>,
    start: MapPos,
    end: MapPos,
) -> Road {
    let mut dirs = Vec::new();
    let mut current = end;
    while current != start {
        let Some(&(prev, dir)) = came_from.get(&current) else {
            break;
        };
        dirs.push(dir);
        current = prev;
    }
    dirs.reverse();
    Road::from_dirs(geometry, start, dirs)
}

// ============================================================================
// Exact search over existing paths
// ============================================================================

/// Lowest-cost walk from `start` to `target` along existing paths only
///
/// Flags belonging to another player are dead ends unless they are the
/// target. Never proposes a new segment.
pub fn find_existing_path<W: World + ?Sized>(world: &W, start: MapPos, target: MapPos) -> PathResult {
    if start == target {
        return PathResult::Trivial;
    }
    let geometry = world.geometry();
    let owner = world.flag_at(start).map(|f| f.owner).or_else(|| world.owner_of(start));

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<MapPos, (MapPos, Direction)> = AHashMap::new();
    let mut g_scores: AHashMap<MapPos, u32> = AHashMap::new();

    g_scores.insert(start, 0);
    open_set.push(PathNode {
        pos: start,
        g_cost: 0,
        f_cost: admissible_cost(&geometry, start, target),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == target {
            return PathResult::Found(reconstruct_road(&geometry, &came_from, start, target));
        }
        if current.g_cost > g_scores.get(&current.pos).copied().unwrap_or(u32::MAX) {
            continue;
        }

        for dir in Direction::ALL {
            if !world.has_path(current.pos, dir) {
                continue;
            }
            let next = geometry.move_pos(current.pos, dir);
            if next != target {
                if let Some(flag) = world.flag_at(next) {
                    if Some(flag.owner) != owner {
                        continue;
                    }
                }
            }

            let tentative_g = current.g_cost + step_cost(world, current.pos, dir);
            if tentative_g < g_scores.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, (current.pos, dir));
                g_scores.insert(next, tentative_g);
                open_set.push(PathNode {
                    pos: next,
                    g_cost: tentative_g,
                    f_cost: tentative_g + admissible_cost(&geometry, next, target),
                });
            }
        }
    }

    PathResult::NoPath
}

/// Follow the road leaving `start` in `dir` up to the next flag
///
/// `start` itself need not be a flag, so positions where a flag could split
/// a road can be traced too. Returns `None` when there is no path in `dir`.
pub fn trace_existing_road<W: World + ?Sized>(world: &W, start: MapPos, dir: Direction) -> Option<Road> {
    if !world.has_path(start, dir) {
        return None;
    }
    let geometry = world.geometry();
    let mut road = Road::new(start);
    let mut dir = dir;
    for _ in 0..geometry.tile_count() {
        road.extend(&geometry, dir);
        let pos = road.end();
        if pos != start && world.has_flag(pos) {
            return Some(road);
        }
        let back = dir.reverse();
        dir = Direction::ALL
            .into_iter()
            .find(|d| *d != back && world.has_path(pos, *d))?;
    }
    None
}

/// Every flag reachable from `flag` over existing roads, `flag` included
pub fn flag_network<W: World + ?Sized>(world: &W, flag: MapPos) -> AHashSet<MapPos> {
    let mut seen = AHashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(flag);
    queue.push_back(flag);
    while let Some(pos) = queue.pop_front() {
        for dir in Direction::ALL {
            if let Some(road) = trace_existing_road(world, pos, dir) {
                if seen.insert(road.end()) {
                    queue.push_back(road.end());
                }
            }
        }
    }
    seen
}

// ============================================================================
// Plotting new roads
// ============================================================================

/// Restrictions on where [`plot_road`] may lay new path
#[derive(Debug, Clone)]
pub struct PlotConstraints {
    /// Upper bound on collected split-road solutions
    pub max_split_roads: usize,
    pub allow_water: bool,
    /// Tile the road must not cross, e.g. a reserved building site
    pub hold_pos: Option<MapPos>,
    /// Center and radius of an area the road must stay out of
    pub avoid_area: Option<(MapPos, u32)>,
    /// Direction tried first at every node; rotating it lets repeated
    /// attempts get around obstacles in a different way
    pub first_dir: Direction,
}

impl PlotConstraints {
    pub fn new(max_split_roads: usize) -> Self {
        Self {
            max_split_roads,
            allow_water: false,
            hold_pos: None,
            avoid_area: None,
            first_dir: Direction::Right,
        }
    }

    fn excludes(&self, geometry: &MapGeometry, pos: MapPos, end: MapPos) -> bool {
        if self.hold_pos == Some(pos) {
            return true;
        }
        match self.avoid_area {
            Some((center, rings)) => pos != end && geometry.distance(center, pos) <= rings,
            None => false,
        }
    }
}

/// Outcome of [`plot_road`]
#[derive(Debug, Clone, Default)]
pub struct PlotResult {
    /// New road from the start flag to the requested end flag
    pub direct: Option<Road>,
    /// New roads ending on an existing road where a flag could be placed
    pub split_roads: Vec<Road>,
}

/// Plot a new road from `start` to `end` across open, owned tiles
///
/// Whenever the search bumps into an existing road at a tile where a flag
/// could be built, the partial route to that tile is kept as a split-road
/// solution.
pub fn plot_road<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    start: MapPos,
    end: MapPos,
    constraints: &PlotConstraints,
) -> PlotResult {
    let mut result = PlotResult::default();
    if start == end {
        return result;
    }
    let geometry = world.geometry();

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<MapPos, (MapPos, Direction)> = AHashMap::new();
    let mut g_scores: AHashMap<MapPos, u32> = AHashMap::new();
    let mut closed: AHashSet<MapPos> = AHashSet::new();
    let mut split_ends: AHashSet<MapPos> = AHashSet::new();

    g_scores.insert(start, 0);
    open_set.push(PathNode {
        pos: start,
        g_cost: 0,
        f_cost: heuristic_cost(world, start, end),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == end {
            result.direct = Some(reconstruct_road(&geometry, &came_from, start, end));
            break;
        }
        if !closed.insert(current.pos) {
            continue;
        }

        for dir in constraints.first_dir.cycle_from() {
            let next = geometry.move_pos(current.pos, dir);
            if closed.contains(&next) || constraints.excludes(&geometry, next, end) {
                continue;
            }
            let segment_ok = match world.road_segment(current.pos, dir) {
                SegmentKind::Blocked => false,
                SegmentKind::Water => constraints.allow_water,
                SegmentKind::Land => true,
            };
            if !segment_ok {
                continue;
            }

            if next != end {
                if world.has_flag(next) {
                    continue;
                }
                if world.has_any_path(next) {
                    if result.split_roads.len() < constraints.max_split_roads
                        && !split_ends.contains(&next)
                        && world.can_build_flag(next, player)
                    {
                        let mut road = reconstruct_road(&geometry, &came_from, start, current.pos);
                        road.extend(&geometry, dir);
                        trace!(end = %next, len = road.len(), "split-road solution");
                        split_ends.insert(next);
                        result.split_roads.push(road);
                    }
                    continue;
                }
                if world.owner_of(next) != Some(player) {
                    continue;
                }
            }

            let tentative_g = current.g_cost + step_cost(world, current.pos, dir);
            if tentative_g < g_scores.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, (current.pos, dir));
                g_scores.insert(next, tentative_g);
                open_set.push(PathNode {
                    pos: next,
                    g_cost: tentative_g,
                    f_cost: tentative_g + heuristic_cost(world, next, end),
                });
            }
        }
    }

    result
}

// ============================================================================
// Flag-path scoring
// ============================================================================

/// How far a flag is from a target over the existing network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagScore {
    /// Roads walked
    pub flag_dist: u32,
    /// Tiles walked
    pub tile_dist: u32,
    /// The route passes through the castle flag before reaching the target
    pub contains_castle_flag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlagNode {
    pos: MapPos,
    flag_dist: u32,
    tile_dist: u32,
}

impl Ord for FlagNode {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.flag_dist, other.tile_dist, other.pos).cmp(&(self.flag_dist, self.tile_dist, self.pos))
    }
}

impl PartialOrd for FlagNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fewest-roads route from the flag at `flag` to the flag at `target`
///
/// Only flags of the same owner are crossed. `None` when the two flags are
/// not in the same network.
pub fn find_flag_and_tile_dist<W: World + ?Sized>(
    world: &W,
    flag: MapPos,
    target: MapPos,
    castle_flag: Option<MapPos>,
) -> Option<FlagScore> {
    if flag == target {
        return Some(FlagScore::default());
    }
    let owner = world.flag_at(flag)?.owner;

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<MapPos, MapPos> = AHashMap::new();
    let mut best: AHashMap<MapPos, (u32, u32)> = AHashMap::new();

    best.insert(flag, (0, 0));
    open_set.push(FlagNode {
        pos: flag,
        flag_dist: 0,
        tile_dist: 0,
    });

    while let Some(current) = open_set.pop() {
        if current.pos == target {
            let mut contains_castle_flag = false;
            let mut pos = target;
            while let Some(&prev) = came_from.get(&pos) {
                if Some(prev) == castle_flag {
                    contains_castle_flag = true;
                }
                pos = prev;
            }
            return Some(FlagScore {
                flag_dist: current.flag_dist,
                tile_dist: current.tile_dist,
                contains_castle_flag,
            });
        }
        if (current.flag_dist, current.tile_dist) > best.get(&current.pos).copied().unwrap_or((u32::MAX, u32::MAX)) {
            continue;
        }

        for dir in Direction::ALL {
            let Some(road) = trace_existing_road(world, current.pos, dir) else {
                continue;
            };
            let next = road.end();
            if next == current.pos || world.flag_at(next).map(|f| f.owner) != Some(owner) {
                continue;
            }
            let candidate = (current.flag_dist + 1, current.tile_dist + road.len() as u32);
            if candidate < best.get(&next).copied().unwrap_or((u32::MAX, u32::MAX)) {
                best.insert(next, candidate);
                came_from.insert(next, current.pos);
                open_set.push(FlagNode {
                    pos: next,
                    flag_dist: candidate.0,
                    tile_dist: candidate.1,
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MapObject;
    use crate::world::SimWorld;

    fn world() -> (SimWorld, MapGeometry) {
        let geom = MapGeometry::new(32, 32);
        let mut world = SimWorld::new(geom);
        world.claim_area(geom.pos(10, 10), 9, 0);
        (world, geom)
    }

    fn connect(world: &mut SimWorld, geom: &MapGeometry, from: MapPos, dirs: Vec<Direction>) -> Road {
        let road = Road::from_dirs(geom, from, dirs);
        world.place_flag(from, 0);
        world.place_flag(road.end(), 0);
        world.place_road(&road);
        road
    }

    #[test]
    fn test_heuristic_is_zero_at_target() {
        let (world, geom) = world();
        let pos = geom.pos(3, 3);
        assert_eq!(heuristic_cost(&world, pos, pos), 0);
        assert_eq!(heuristic_cost(&world, pos, geom.pos(6, 3)), 3 * 255);
    }

    #[test]
    fn test_step_cost_grows_with_height() {
        let (mut world, geom) = world();
        let pos = geom.pos(5, 5);
        world.set_height(geom.move_pos(pos, Direction::Right), 2);
        world.set_height(geom.move_pos(pos, Direction::Down), 9);
        assert_eq!(step_cost(&world, pos, Direction::Left), 255);
        assert_eq!(step_cost(&world, pos, Direction::Right), 383);
        assert_eq!(step_cost(&world, pos, Direction::Down), 511);
    }

    #[test]
    fn test_existing_path_follows_roads_across_flags() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 10);
        let first = connect(&mut world, &geom, a, vec![Direction::Right; 3]);
        let second = connect(&mut world, &geom, first.end(), vec![Direction::Down, Direction::Down]);

        let result = find_existing_path(&world, a, second.end());
        let road = result.road().expect("connected flags");
        assert_eq!(road.len(), 5);
        assert_eq!(road.end(), second.end());
        let mut pos = a;
        for dir in road.dirs() {
            assert!(world.has_path(pos, *dir));
            pos = geom.move_pos(pos, *dir);
        }
    }

    #[test]
    fn test_foreign_flags_block_the_search_own_flags_do_not() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 10);
        let middle = connect(&mut world, &geom, a, vec![Direction::Right; 3]).end();
        let end = connect(&mut world, &geom, middle, vec![Direction::Right; 3]).end();
        assert!(find_existing_path(&world, a, end).road().is_some());

        world.place_flag(middle, 1);
        assert_eq!(find_existing_path(&world, a, end), PathResult::NoPath);
        // a foreign flag is still a valid destination
        assert!(find_existing_path(&world, a, middle).road().is_some());
    }

    #[test]
    fn test_existing_path_trivial_and_missing() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 10);
        let b = geom.pos(12, 10);
        world.place_flag(a, 0);
        world.place_flag(b, 0);
        assert_eq!(find_existing_path(&world, a, a), PathResult::Trivial);
        assert_eq!(find_existing_path(&world, a, b), PathResult::NoPath);
    }

    #[test]
    fn test_trace_stops_at_next_flag() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 8);
        let road = connect(
            &mut world,
            &geom,
            a,
            vec![Direction::Right, Direction::Right, Direction::Down, Direction::DownRight],
        );
        let traced = trace_existing_road(&world, a, Direction::Right).expect("road exists");
        assert_eq!(traced, road);
        assert!(trace_existing_road(&world, a, Direction::Up).is_none());

        let middle = geom.move_n(a, Direction::Right, 2);
        let half = trace_existing_road(&world, middle, Direction::Down).expect("from mid-road");
        assert_eq!(half.end(), road.end());
        assert_eq!(half.len(), 2);
    }

    #[test]
    fn test_flag_network_collects_reachable_flags() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 10);
        let first = connect(&mut world, &geom, a, vec![Direction::Right; 3]);
        connect(&mut world, &geom, first.end(), vec![Direction::Right; 2]);
        let lonely = geom.pos(4, 14);
        world.place_flag(lonely, 0);

        let network = flag_network(&world, a);
        assert_eq!(network.len(), 3);
        assert!(!network.contains(&lonely));
    }

    #[test]
    fn test_plot_straight_road() {
        let (mut world, geom) = world();
        let start = geom.pos(5, 10);
        let end = geom.pos(10, 10);
        world.place_flag(start, 0);
        world.place_flag(end, 0);
        let plot = plot_road(&world, 0, start, end, &PlotConstraints::new(10));
        let road = plot.direct.expect("open ground");
        assert_eq!(road.len(), 5);
        assert_eq!(road.end(), end);
        assert!(plot.split_roads.is_empty());
    }

    #[test]
    fn test_plot_goes_around_obstacles() {
        let (mut world, geom) = world();
        let start = geom.pos(5, 10);
        let end = geom.pos(10, 10);
        world.place_flag(start, 0);
        world.place_flag(end, 0);
        for row in 8..=12 {
            world.set_object(geom.pos(8, row), MapObject::Tree(0));
        }
        let road = plot_road(&world, 0, start, end, &PlotConstraints::new(10))
            .direct
            .expect("detour exists");
        assert!(road.len() > 5);
        assert!(!road.has_pos(&geom, geom.pos(8, 10)));
    }

    #[test]
    fn test_plot_collects_split_roads() {
        let (mut world, geom) = world();
        connect(&mut world, &geom, geom.pos(10, 5), vec![Direction::Down; 10]);
        let start = geom.pos(6, 10);
        let end = geom.pos(14, 10);
        world.place_flag(start, 0);
        world.place_flag(end, 0);

        let plot = plot_road(&world, 0, start, end, &PlotConstraints::new(10));
        assert!(!plot.split_roads.is_empty());
        for split in &plot.split_roads {
            assert_eq!(split.source(), start);
            assert!(world.has_any_path(split.end()));
            assert!(!world.has_flag(split.end()));
        }
        if let Some(direct) = plot.direct {
            assert!(!direct.has_pos(&geom, geom.pos(10, 10)));
        }
    }

    #[test]
    fn test_plot_respects_split_limit_and_hold_pos() {
        let (mut world, geom) = world();
        connect(&mut world, &geom, geom.pos(10, 5), vec![Direction::Down; 10]);
        let start = geom.pos(6, 10);
        let end = geom.pos(14, 10);
        world.place_flag(start, 0);
        world.place_flag(end, 0);

        let mut constraints = PlotConstraints::new(1);
        constraints.hold_pos = Some(geom.pos(7, 10));
        let plot = plot_road(&world, 0, start, end, &constraints);
        assert!(plot.split_roads.len() <= 1);
        for road in plot.split_roads.iter().chain(plot.direct.iter()) {
            assert!(!road.has_pos(&geom, geom.pos(7, 10)));
        }
    }

    #[test]
    fn test_flag_and_tile_dist() {
        let (mut world, geom) = world();
        let a = geom.pos(4, 10);
        let first = connect(&mut world, &geom, a, vec![Direction::Right; 3]);
        let second = connect(&mut world, &geom, first.end(), vec![Direction::Right; 3]);
        let b = first.end();
        let c = second.end();

        let score = find_flag_and_tile_dist(&world, a, c, None).expect("same network");
        assert_eq!(score.flag_dist, 2);
        assert_eq!(score.tile_dist, 6);
        assert!(!score.contains_castle_flag);

        let via_castle = find_flag_and_tile_dist(&world, a, c, Some(b)).expect("same network");
        assert!(via_castle.contains_castle_flag);
        let at_castle = find_flag_and_tile_dist(&world, a, c, Some(c)).expect("same network");
        assert!(!at_castle.contains_castle_flag);

        let lonely = geom.pos(4, 16);
        world.place_flag(lonely, 0);
        assert!(find_flag_and_tile_dist(&world, lonely, c, None).is_none());
        assert_eq!(find_flag_and_tile_dist(&world, c, c, None), Some(FlagScore::default()));
    }
}
