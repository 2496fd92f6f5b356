//! Heuristic "best road" construction
//!
//! Architecture: gather, score, commit
//! - Targets come from an explicit request, the building's affinities, or
//!   the nearest inventory
//! - Candidate end flags are collected in a spiral around the halfway point
//!   and new roads plotted to each, plus any split-road solutions found on
//!   the way
//! - Candidates are scored as tiles + new length x penalty + flags (+ castle
//!   flag penalty) and committed best first; a flag created for a split road
//!   is demolished again if its road cannot be built

use std::time::Instant;

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use tracing::{debug, info, warn};

use crate::core::config::RoadConfig;
use crate::core::types::{BuildingType, PlayerIndex};
use crate::road::affinity::{affinity_targets, find_nearest_inventory};
use crate::road::options::{RoadOption, RoadOptions};
use crate::road::pathfinder::{
    find_existing_path, find_flag_and_tile_dist, flag_network, plot_road, trace_existing_road,
    FlagScore, PlotConstraints,
};
use crate::road::route::{Road, RoadOutcome};
use crate::spatial::{spiral_dist, Direction, MapPos};
use crate::world::{SegmentKind, SharedWorld, World};

/// What to connect and how
#[derive(Debug, Clone)]
pub struct RoadRequest {
    pub source: MapPos,
    pub options: RoadOptions,
    /// Building the road is being planned for; implies `HoldBuildingPos`
    pub building: Option<BuildingType>,
    /// Flag (or building, meaning its flag) to connect to
    pub target: Option<MapPos>,
    /// Only accept end flags whose resources would go to this stock flag
    pub verify_stock: Option<MapPos>,
}

impl RoadRequest {
    pub fn new(source: MapPos, options: RoadOptions) -> Self {
        Self {
            source,
            options,
            building: None,
            target: None,
            verify_stock: None,
        }
    }

    pub fn for_building(mut self, kind: BuildingType) -> Self {
        self.building = Some(kind);
        self
    }

    pub fn to_target(mut self, target: MapPos) -> Self {
        self.target = Some(target);
        self
    }

    pub fn verify_stock(mut self, stock_flag: MapPos) -> Self {
        self.verify_stock = Some(stock_flag);
        self
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    road: Road,
    score: OrderedFloat<f64>,
}

/// Builds roads for one player against a shared world
pub struct RoadBuilder<'a, W: World> {
    world: &'a SharedWorld<W>,
    player: PlayerIndex,
    config: &'a RoadConfig,
    castle_flag: Option<MapPos>,
    home_flag: Option<MapPos>,
    first_dir: Direction,
}

impl<'a, W: World> RoadBuilder<'a, W> {
    pub fn new(world: &'a SharedWorld<W>, player: PlayerIndex, config: &'a RoadConfig) -> Self {
        Self {
            world,
            player,
            config,
            castle_flag: None,
            home_flag: None,
            first_dir: Direction::Right,
        }
    }

    pub fn castle_flag(mut self, flag: Option<MapPos>) -> Self {
        self.castle_flag = flag;
        self
    }

    /// Fallback target when nothing better is known, normally the flag of
    /// the stock currently being worked on
    pub fn home_flag(mut self, flag: Option<MapPos>) -> Self {
        self.home_flag = flag;
        self
    }

    pub fn first_dir(mut self, dir: Direction) -> Self {
        self.first_dir = dir;
        self
    }

    /// Connect `request.source` to the network as well as the options allow
    pub fn build_best_road(&self, request: &RoadRequest) -> RoadOutcome {
        let started = Instant::now();
        let outcome = self.build(request, request.options);
        debug!(
            player = self.player,
            source = %request.source,
            options = ?request.options,
            succeeded = outcome.succeeded(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build_best_road finished"
        );
        outcome
    }

    fn build(&self, request: &RoadRequest, mut options: RoadOptions) -> RoadOutcome {
        let source = request.source;
        let (owner, connected) = self
            .world
            .read(|w| (w.owner_of(source), w.is_connected(source)));
        if owner != Some(self.player) {
            debug!(source = %source, "source not owned by player");
            return RoadOutcome::Failed;
        }
        if request.building.is_some() {
            options.insert(RoadOption::HoldBuildingPos);
        }

        let targets = self.select_targets(request);
        if targets.is_empty() {
            debug!(source = %source, "no road target");
            return RoadOutcome::Failed;
        }
        let targets: Vec<MapPos> = targets.into_iter().filter(|t| *t != source).collect();
        if targets.is_empty() {
            return RoadOutcome::AlreadyConnected;
        }

        let improve = options.contains(RoadOption::Improve);
        if connected {
            if !improve {
                let primary = targets[0];
                let reachable = self
                    .world
                    .read(|w| find_existing_path(w, source, primary).succeeded());
                if reachable {
                    return RoadOutcome::AlreadyConnected;
                }
            }
            let can_branch = self.world.read(|w| {
                Direction::ALL
                    .iter()
                    .any(|d| !w.has_path(source, *d) && w.road_segment(source, *d) != SegmentKind::Blocked)
            });
            if !can_branch {
                debug!(source = %source, "no free direction left at source flag");
                return RoadOutcome::Failed;
            }
        }

        let target_count = targets.len().min(2) as u32;
        let mut roads_built = 0;
        let mut best_road: Option<Road> = None;

        for target in targets.into_iter().take(2) {
            if options.contains(RoadOption::Direct) {
                return self.build_direct(source, target, options);
            }

            let candidates = self.collect_candidates(request, target, options, connected && improve);
            let existing_score = if connected && improve {
                self.best_existing_score(source, target, options)
            } else {
                None
            };
            debug!(
                source = %source,
                target = %target,
                candidates = candidates.len(),
                existing = ?existing_score,
                "scored road candidates"
            );

            for candidate in candidates {
                if roads_built >= target_count {
                    break;
                }
                if let Some(existing) = existing_score {
                    let bar = candidate.score.0 * self.config.improve_factor + self.config.improve_margin;
                    if existing <= bar {
                        debug!(existing, bar, "existing road is good enough");
                        break;
                    }
                }
                if options.contains(RoadOption::PlotOnlyNoBuild) {
                    return RoadOutcome::Planned(candidate.road);
                }
                if self.commit(source, &candidate.road, options) {
                    roads_built += 1;
                    best_road.get_or_insert(candidate.road);
                }
            }
        }

        match best_road {
            Some(road) => RoadOutcome::Built { road, roads_built },
            None => RoadOutcome::Failed,
        }
    }

    fn select_targets(&self, request: &RoadRequest) -> Vec<MapPos> {
        let source = request.source;
        let player = self.player;
        if let Some(target) = request.target {
            return self.world.read(|w| {
                if w.has_flag(target) {
                    vec![target]
                } else if w.has_building(target) {
                    vec![w.geometry().flag_of_building(target)]
                } else {
                    warn!(target = %target, "road target has neither flag nor building");
                    Vec::new()
                }
            });
        }

        let mut targets = self
            .world
            .read(|w| affinity_targets(w, player, source, request.building));
        if targets.is_empty() {
            let nearest = self.world.read(|w| {
                let attached = w.geometry().building_of_flag(source);
                if w.has_flag(source) && w.has_building(attached) {
                    find_nearest_inventory(w, player, source)
                } else {
                    None
                }
            });
            targets.extend(nearest.or(self.home_flag));
        }
        targets
    }

    fn constraints(&self, source: MapPos, options: RoadOptions) -> PlotConstraints {
        let geometry = self.world.read(|w| w.geometry());
        let mut constraints = PlotConstraints::new(self.config.max_fake_flags);
        constraints.allow_water = options.contains(RoadOption::AllowWaterRoad);
        constraints.first_dir = self.first_dir;
        if options.contains(RoadOption::HoldBuildingPos) {
            constraints.hold_pos = Some(geometry.building_of_flag(source));
        }
        if options.contains(RoadOption::AvoidCastleArea) {
            constraints.avoid_area = self.castle_flag.map(|c| (c, self.config.castle_area_rings));
        }
        constraints
    }

    fn build_direct(&self, source: MapPos, target: MapPos, options: RoadOptions) -> RoadOutcome {
        let constraints = self.constraints(source, options);
        let plot = self
            .world
            .read(|w| plot_road(w, self.player, source, target, &constraints));
        let Some(road) = plot.direct else {
            debug!(source = %source, target = %target, "no direct road possible");
            return RoadOutcome::Failed;
        };
        if options.contains(RoadOption::PlotOnlyNoBuild) {
            return RoadOutcome::Planned(road);
        }
        if self.commit(source, &road, options) {
            RoadOutcome::Built {
                road,
                roads_built: 1,
            }
        } else {
            RoadOutcome::Failed
        }
    }

    /// End flags worth plotting a road to, target first
    fn nearby_flags(&self, source: MapPos, target: MapPos, options: RoadOptions, improve: bool) -> Vec<MapPos> {
        let player = self.player;
        let castle_flag = self.castle_flag;
        let rings = self.config.candidate_rings;
        let early_stop = spiral_dist(self.config.candidate_rings_early_stop);

        self.world.read(|w| {
            let geometry = w.geometry();
            let mut nearby = Vec::new();
            if improve {
                for dir in Direction::ALL {
                    if let Some(road) = trace_existing_road(w, source, dir) {
                        if !nearby.contains(&road.end()) {
                            nearby.push(road.end());
                        }
                    }
                }
            }
            if !nearby.contains(&target) {
                nearby.push(target);
            }

            let halfway = geometry.halfway(source, target);
            for (i, pos) in geometry.spiral_rings(halfway, rings).enumerate() {
                if pos == source || !w.has_flag(pos) || w.owner_of(pos) != Some(player) {
                    continue;
                }
                if !w.is_connected(pos) && Some(pos) != castle_flag {
                    continue;
                }
                if nearby.contains(&pos) {
                    continue;
                }
                nearby.push(pos);
                if i as u32 >= early_stop && nearby.len() >= 2 {
                    break;
                }
            }

            if options.contains(RoadOption::ReconnectNetwork) {
                let network = flag_network(w, source);
                nearby.retain(|pos| !network.contains(pos));
            }
            nearby
        })
    }

    fn collect_candidates(
        &self,
        request: &RoadRequest,
        target: MapPos,
        options: RoadOptions,
        improve: bool,
    ) -> Vec<Candidate> {
        let source = request.source;
        let nearby = self.nearby_flags(source, target, options, improve);
        let constraints = self.constraints(source, options);
        let ideal = self
            .world
            .read(|w| w.geometry().distance(source, target).max(1));
        let max_convolution = options.max_convolution(self.config);
        let acceptable = |road: &Road| {
            !road.is_empty() && (road.len() as f64 / ideal as f64) < max_convolution
        };

        // One road per end position, shortest wins
        let mut proads: Vec<Road> = Vec::new();
        let mut add = |road: Road| match proads.iter_mut().find(|r| r.end() == road.end()) {
            Some(existing) if existing.len() > road.len() => *existing = road,
            Some(_) => {}
            None => proads.push(road),
        };

        for end in nearby {
            let plot = self
                .world
                .read(|w| plot_road(w, self.player, source, end, &constraints));
            if let Some(road) = plot.direct {
                if acceptable(&road) && self.feeds_stock(request, &[end]) {
                    add(road);
                }
            }
            if !options.contains(RoadOption::SplitRoads) {
                continue;
            }
            for split in plot.split_roads {
                if !acceptable(&split) {
                    continue;
                }
                let neighbors = self.world.read(|w| {
                    Direction::ALL
                        .iter()
                        .filter_map(|d| trace_existing_road(w, split.end(), *d))
                        .map(|r| r.end())
                        .collect::<Vec<_>>()
                });
                if self.feeds_stock(request, &neighbors) {
                    add(split);
                }
            }
        }

        let mut scores: AHashMap<MapPos, Option<FlagScore>> = AHashMap::new();
        let penalty = options.new_length_penalty(self.config);
        let mut candidates: Vec<Candidate> = proads
            .into_iter()
            .filter_map(|road| {
                let score = self.score_flag(&mut scores, road.end(), target, options)?;
                let mut value = score.tile_dist as f64
                    + road.len() as f64 * penalty
                    + score.flag_dist as f64;
                if options.contains(RoadOption::PenalizeCastleFlag) && score.contains_castle_flag {
                    value += self.config.castle_flag_penalty;
                }
                Some(Candidate {
                    road,
                    score: OrderedFloat(value),
                })
            })
            .collect();
        candidates.sort_by_key(|c| (c.score, c.road.end()));
        candidates
    }

    /// With a stock to verify, every flag in `flags` must deliver there
    fn feeds_stock(&self, request: &RoadRequest, flags: &[MapPos]) -> bool {
        let Some(stock) = request.verify_stock else {
            return true;
        };
        self.world.read(|w| {
            flags
                .iter()
                .all(|flag| find_nearest_inventory(w, self.player, *flag) == Some(stock))
        })
    }

    /// Route score from `end` to `target`; positions without a flag are
    /// scored through the better of the two flags their road joins
    fn score_flag(
        &self,
        cache: &mut AHashMap<MapPos, Option<FlagScore>>,
        end: MapPos,
        target: MapPos,
        options: RoadOptions,
    ) -> Option<FlagScore> {
        if let Some(score) = cache.get(&end) {
            return *score;
        }
        let castle_flag = self.castle_flag;
        let score = self.world.read(|w| {
            if end == target {
                return Some(FlagScore::default());
            }
            if w.has_flag(end) {
                return find_flag_and_tile_dist(w, end, target, castle_flag);
            }
            let penalty = |s: &FlagScore| {
                let castle = options.contains(RoadOption::PenalizeCastleFlag) && s.contains_castle_flag;
                s.tile_dist + s.flag_dist + if castle { 1_000 } else { 0 }
            };
            Direction::ALL
                .iter()
                .filter_map(|d| trace_existing_road(w, end, *d))
                .filter_map(|half| {
                    let adjacent = half.end();
                    let base = if adjacent == target {
                        FlagScore::default()
                    } else {
                        find_flag_and_tile_dist(w, adjacent, target, castle_flag)?
                    };
                    Some(FlagScore {
                        flag_dist: base.flag_dist + 1,
                        tile_dist: base.tile_dist + half.len() as u32,
                        contains_castle_flag: base.contains_castle_flag,
                    })
                })
                .min_by_key(penalty)
        });
        cache.insert(end, score);
        score
    }

    /// Score of the best route the source already has toward `target`
    fn best_existing_score(&self, source: MapPos, target: MapPos, options: RoadOptions) -> Option<f64> {
        let castle_flag = self.castle_flag;
        let castle_penalty = self.config.castle_flag_penalty;
        self.world.read(|w| {
            Direction::ALL
                .iter()
                .filter_map(|d| trace_existing_road(w, source, *d))
                .filter_map(|road| {
                    let score = if road.end() == target {
                        FlagScore::default()
                    } else {
                        find_flag_and_tile_dist(w, road.end(), target, castle_flag)?
                    };
                    let mut value = (score.tile_dist + road.len() as u32 + score.flag_dist + 1) as f64;
                    if options.contains(RoadOption::PenalizeCastleFlag) && score.contains_castle_flag {
                        value += castle_penalty;
                    }
                    Some(OrderedFloat(value))
                })
                .min()
                .map(|v| v.0)
        })
    }

    /// Build `road`, creating its end flag first if needed
    ///
    /// Either the whole road is committed or nothing is left behind.
    fn commit(&self, source: MapPos, road: &Road, options: RoadOptions) -> bool {
        let player = self.player;
        let is_water = self.world.read(|w| {
            let geometry = w.geometry();
            let mut pos = road.source();
            road.dirs().iter().any(|dir| {
                let water = w.road_segment(pos, *dir) == SegmentKind::Water;
                pos = geometry.move_pos(pos, *dir);
                water
            })
        });
        if is_water {
            if !options.contains(RoadOption::AllowWaterRoad) {
                return false;
            }
            // Serfs cannot ride boats, so a land route must exist as well
            let land_options = options.without(RoadOption::AllowWaterRoad);
            let land = self.build(&RoadRequest::new(source, land_options), land_options);
            if !land.succeeded() {
                debug!(source = %source, "no land road to back a water road");
                return false;
            }
        }

        let end = road.end();
        let mut created_flag = false;
        if !self.world.read(|w| w.has_flag(end)) {
            if !self.world.write(|w| w.build_flag(end, player)) {
                warn!(pos = %end, "could not place flag to split road");
                return false;
            }
            created_flag = true;
        }

        if self.world.write(|w| w.build_road(road, player)) {
            info!(
                player,
                source = %road.source(),
                end = %end,
                len = road.len(),
                split = created_flag,
                "built road"
            );
            return true;
        }

        warn!(source = %road.source(), end = %end, "road could not be built");
        if created_flag {
            self.world.write(|w| w.demolish_flag(end, player));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MapObject;
    use crate::road::PathResult;
    use crate::spatial::MapGeometry;
    use crate::world::SimWorld;

    struct Fixture {
        shared: SharedWorld<SimWorld>,
        geom: MapGeometry,
        castle_flag: MapPos,
        config: RoadConfig,
    }

    fn fixture() -> Fixture {
        let geom = MapGeometry::new(48, 48);
        let mut world = SimWorld::new(geom);
        let castle = geom.pos(5, 5);
        world.claim_area(castle, 14, 0);
        world.place_building(castle, BuildingType::Castle, 0, true, true);
        Fixture {
            shared: SharedWorld::new(world),
            geom,
            castle_flag: geom.flag_of_building(castle),
            config: RoadConfig::default(),
        }
    }

    impl Fixture {
        fn builder(&self) -> RoadBuilder<'_, SimWorld> {
            RoadBuilder::new(&self.shared, 0, &self.config)
                .castle_flag(Some(self.castle_flag))
                .home_flag(Some(self.castle_flag))
        }

        fn command_count(&self) -> usize {
            self.shared.read(|w| w.commands().len())
        }
    }

    #[test]
    fn test_connects_lonely_flag_to_castle() {
        let fx = fixture();
        let source = fx.geom.pos(12, 6);
        fx.shared.write(|w| w.place_flag(source, 0));

        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, RoadOptions::default()));
        assert!(matches!(outcome, RoadOutcome::Built { .. }));
        let path = fx.shared.read(|w| find_existing_path(w, source, fx.castle_flag));
        assert!(path.is_found());
    }

    #[test]
    fn test_second_call_issues_no_commands() {
        let fx = fixture();
        let source = fx.geom.pos(12, 6);
        fx.shared.write(|w| w.place_flag(source, 0));
        let request = RoadRequest::new(source, RoadOptions::default()).to_target(fx.castle_flag);

        assert!(fx.builder().build_best_road(&request).built_road().is_some());
        let before = fx.command_count();
        assert_eq!(fx.builder().build_best_road(&request), RoadOutcome::AlreadyConnected);
        assert_eq!(fx.command_count(), before);
    }

    #[test]
    fn test_boxed_in_flag_fails_cleanly() {
        let fx = fixture();
        let source = fx.geom.pos(14, 12);
        fx.shared.write(|w| {
            w.place_flag(source, 0);
            for n in fx.geom.neighbors(source) {
                w.set_object(n, MapObject::Stone(0));
            }
        });
        let flags_before = fx.shared.read(|w| w.flag_count(0));

        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, RoadOptions::default()));
        assert_eq!(outcome, RoadOutcome::Failed);
        assert_eq!(fx.command_count(), 0);
        assert_eq!(fx.shared.read(|w| w.flag_count(0)), flags_before);
        assert_eq!(fx.shared.read(|w| w.path_segment_count()), 0);
    }

    #[test]
    fn test_unowned_source_fails() {
        let fx = fixture();
        let source = fx.geom.pos(29, 5);
        fx.shared.write(|w| w.place_flag(source, 0));
        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, RoadOptions::default()));
        assert_eq!(outcome, RoadOutcome::Failed);
    }

    #[test]
    fn test_without_split_roads_ends_on_existing_flag() {
        let fx = fixture();
        fx.shared.write(|w| {
            let far = fx.geom.pos(18, 6);
            w.place_flag(far, 0);
            w.place_road(&Road::from_dirs(&fx.geom, fx.castle_flag, vec![Direction::Right; 12]));
        });
        let source = fx.geom.pos(12, 10);
        fx.shared.write(|w| w.place_flag(source, 0));

        let options = RoadOptions::default().without(RoadOption::SplitRoads);
        let outcome = fx.builder().build_best_road(&RoadRequest::new(source, options));
        let road = outcome.built_road().expect("road built").clone();
        assert!(fx.shared.read(|w| w.has_flag(road.end())));
        assert!(fx
            .shared
            .read(|w| w.commands().iter().all(|c| !matches!(c, crate::world::sim::Command::BuildFlag(_)))));
    }

    #[test]
    fn test_split_road_joins_passing_road() {
        let fx = fixture();
        fx.shared.write(|w| {
            let far = fx.geom.pos(18, 6);
            w.place_flag(far, 0);
            w.place_road(&Road::from_dirs(&fx.geom, fx.castle_flag, vec![Direction::Right; 12]));
        });
        let source = fx.geom.pos(12, 10);
        fx.shared.write(|w| w.place_flag(source, 0));

        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, RoadOptions::default()));
        assert!(outcome.built_road().is_some());
        let path = fx.shared.read(|w| find_existing_path(w, source, fx.castle_flag));
        assert!(path.is_found());
    }

    #[test]
    fn test_improve_skips_when_existing_road_is_fine() {
        let fx = fixture();
        let source = fx.geom.pos(12, 6);
        fx.shared.write(|w| {
            w.place_flag(source, 0);
            w.place_road(&Road::from_dirs(&fx.geom, fx.castle_flag, vec![Direction::Right; 6]));
        });
        let options = RoadOptions::default().with(RoadOption::Improve);
        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, options).to_target(fx.castle_flag));
        assert_eq!(outcome, RoadOutcome::Failed);
        assert_eq!(fx.command_count(), 0);
    }

    #[test]
    fn test_improve_replaces_detour() {
        let fx = fixture();
        let source = fx.geom.pos(10, 6);
        fx.shared.write(|w| {
            w.place_flag(source, 0);
            let mut detour = vec![Direction::Down; 8];
            detour.extend(vec![Direction::Right; 4]);
            detour.extend(vec![Direction::Up; 8]);
            let road = Road::from_dirs(&fx.geom, fx.castle_flag, detour);
            assert_eq!(road.end(), source);
            w.place_road(&road);
        });
        let options = RoadOptions::default().with(RoadOption::Improve);
        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, options).to_target(fx.castle_flag));
        let road = outcome.built_road().expect("shortcut built");
        assert_eq!(road.len(), 4);
        assert_eq!(fx.shared.read(|w| w.path_segment_count()), 24);
    }

    #[test]
    fn test_direct_and_plot_only() {
        let fx = fixture();
        let source = fx.geom.pos(12, 6);
        fx.shared.write(|w| w.place_flag(source, 0));

        let plan = RoadOptions::default()
            .with(RoadOption::Direct)
            .with(RoadOption::PlotOnlyNoBuild);
        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, plan).to_target(fx.castle_flag));
        assert!(matches!(outcome, RoadOutcome::Planned(_)));
        assert_eq!(fx.command_count(), 0);

        let direct = RoadOptions::default().with(RoadOption::Direct);
        let outcome = fx
            .builder()
            .build_best_road(&RoadRequest::new(source, direct).to_target(fx.castle_flag));
        let road = outcome.built_road().expect("direct road");
        assert_eq!(road.end(), fx.castle_flag);
        assert_eq!(
            fx.shared.read(|w| find_existing_path(w, source, fx.castle_flag)),
            PathResult::Found(road.clone())
        );
    }
}
