//! Construction primitives shared by the economy tasks
//!
//! Architecture: scan, prepare, commit
//! - `build_near_pos` walks a spiral and takes the first site that survives
//!   the ownership, feasibility and blacklist checks
//! - A non-mine site gets a flag and a road first; a site that cannot be
//!   connected is cleaned up and blacklisted
//! - Castle placement and border expansion are the two callers that look
//!   beyond owned land

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::ai::blacklist::SiteKind;
use crate::ai::controller::AiController;
use crate::ai::inventory::nearest_stock;
use crate::ai::tasks::Flow;
use crate::core::config::PlacementConfig;
use crate::core::error::{AiError, Result};
use crate::core::types::{BuildingSize, BuildingType, PlayerIndex};
use crate::placement::{
    count_building_sites, count_objects_near_pos, count_stones_near_pos, rank_corners, score_area,
    CandidateSet, Feature, ObjectClass, PlacementResult,
};
use crate::road::RoadRequest;
use crate::spatial::{spiral_dist, MapPos};
use crate::world::{BuildingInfo, World};

/// Corner distances used when looking for resource sites around military buildings
const CORNER_DISTANCES: [u32; 2] = [4, 8];

/// Steps walked outward from a military building looking for the border
const BORDER_SEARCH_STEPS: u32 = 11;

/// Placing these never counts against the unfinished-building limit
fn exempt_from_site_limit(kind: BuildingType) -> bool {
    kind.is_mine()
        || matches!(
            kind,
            BuildingType::Sawmill
                | BuildingType::Lumberjack
                | BuildingType::Stonecutter
                | BuildingType::Hut
                | BuildingType::Forester
        )
}

/// Buildings whose road must lead to the stock they are placed for
fn verifies_stock(kind: BuildingType) -> bool {
    !matches!(
        kind,
        BuildingType::Fisher
            | BuildingType::Stock
            | BuildingType::Hut
            | BuildingType::Tower
            | BuildingType::Fortress
            | BuildingType::Castle
    )
}

/// Whether `pos` has enough trees, stones and building room for a castle
///
/// Every requirement shrinks by one step per `desperation` level, reaching
/// zero once all levels are used up.
pub fn castle_site_acceptable<W: World + ?Sized>(
    world: &W,
    pos: MapPos,
    desperation: u32,
    config: &PlacementConfig,
) -> bool {
    let levels = (config.castle_max_tries / config.castle_desperation_interval.max(1)).max(1);
    let scale = levels.saturating_sub(desperation) as f64 / levels as f64;
    let area = spiral_dist(9);
    let meets = |count: u32, required: u32| count as f64 >= required as f64 * scale;

    meets(
        count_objects_near_pos(world, pos, area, ObjectClass::Trees),
        config.near_trees_min * 4,
    ) && meets(count_stones_near_pos(world, pos, area), config.near_stones_min)
        && meets(count_building_sites(world, pos, area), config.near_building_sites_min)
}

fn foreign_land_near<W: World + ?Sized>(world: &W, player: PlayerIndex, center: MapPos, distance: u32) -> bool {
    world
        .geometry()
        .spiral(center, distance)
        .any(|pos| matches!(world.owner_of(pos), Some(owner) if owner != player))
}

impl<W: World> AiController<W> {
    // ========================================================================
    // Castle
    // ========================================================================

    pub(crate) fn place_castle(&mut self) -> Result<Flow> {
        if self.castle_pos.is_some() {
            return Ok(Flow::Continue);
        }
        let player = self.player;
        let existing = self.world.read(|w| {
            w.player_buildings(player)
                .into_iter()
                .find(|b| b.kind == BuildingType::Castle)
                .map(|b| b.pos)
        });
        if let Some(pos) = existing {
            self.set_castle(pos);
            return Ok(Flow::Continue);
        }

        let max_tries = self.config.placement.castle_max_tries;
        let interval = self.config.placement.castle_desperation_interval.max(1);
        let tiles = self.world.read(|w| w.geometry().tile_count());
        for attempt in 1..=max_tries {
            let desperation = (attempt - 1) / interval;
            let pos = MapPos(self.rng.gen_range(0..tiles));
            let placement = &self.config.placement;
            let acceptable = self.world.read(|w| {
                w.can_build_castle(pos, player) && castle_site_acceptable(w, pos, desperation, placement)
            });
            if !acceptable {
                continue;
            }
            if self.world.write(|w| w.build_castle(pos, player)) {
                info!(player, pos = %pos, attempt, desperation, "castle placed");
                self.set_castle(pos);
                self.pause(self.config.timing.action_pause_ms);
                return Ok(Flow::Continue);
            }
        }

        error!(player, tries = max_tries, "no viable castle site");
        Err(AiError::NoCastleSite {
            player,
            tries: max_tries,
        })
    }

    fn set_castle(&mut self, pos: MapPos) {
        let flag = self.world.read(|w| w.geometry().flag_of_building(pos));
        self.castle_pos = Some(pos);
        self.castle_flag = Some(flag);
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Place `kind` on the first usable site within `distance` of `center`
    pub(crate) fn build_near_pos(&mut self, center: MapPos, distance: u32, kind: BuildingType) -> PlacementResult {
        let limits = &self.config.placement;
        if kind == BuildingType::Hut && self.stock.buildings.unfinished_huts >= limits.max_unfinished_huts {
            debug!(kind = %kind, "too many unfinished huts");
            return PlacementResult::StopSearch;
        }
        if !exempt_from_site_limit(kind) && self.stock.buildings.unfinished >= limits.max_unfinished_buildings {
            debug!(kind = %kind, "too many unfinished buildings");
            return PlacementResult::StopSearch;
        }

        let player = self.player;
        if kind.size() == BuildingSize::Large
            && !kind.is_military()
            && self
                .world
                .read(|w| foreign_land_near(w, player, center, spiral_dist(8)))
        {
            debug!(kind = %kind, center = %center, "too close to enemy border");
            return PlacementResult::NotFound;
        }

        let sites: Vec<MapPos> = self.world.read(|w| {
            w.geometry()
                .spiral(center, distance)
                .filter(|pos| w.owner_of(*pos) == Some(player) && w.can_build_building(*pos, kind, player))
                .collect()
        });

        for pos in sites {
            if self.blacklist.contains(pos, SiteKind::Building(kind)) {
                continue;
            }
            if kind == BuildingType::Hut && self.hut_nearby(pos) {
                continue;
            }
            // an earlier site in this loop may have taken the ground
            if !self.world.read(|w| w.can_build_building(pos, kind, player)) {
                continue;
            }
            if !kind.is_mine() && !self.prepare_site_road(pos, kind) {
                continue;
            }
            if self.place_prepared_site(pos, kind) {
                return PlacementResult::Found(pos);
            }
        }
        PlacementResult::NotFound
    }

    /// Place `kind` on a site whose flag is already in place
    fn place_prepared_site(&mut self, pos: MapPos, kind: BuildingType) -> bool {
        let player = self.player;
        if self.world.write(|w| w.build_building(pos, kind, player)) {
            info!(player, kind = %kind, pos = %pos, stock = %self.stock.flag, "building placed");
            self.stock.buildings.note_placed(kind);
            self.realm.buildings.note_placed(kind);
            self.pause(self.config.timing.action_pause_ms);
            return true;
        }
        warn!(kind = %kind, pos = %pos, "building rejected after site checks");
        self.blacklist.insert(pos, SiteKind::Building(kind));
        false
    }

    fn hut_nearby(&self, pos: MapPos) -> bool {
        self.world.read(|w| {
            w.geometry()
                .spiral(pos, spiral_dist(5))
                .any(|p| w.building_at(p).map_or(false, |b| b.kind == BuildingType::Hut))
        })
    }

    /// Give the site at `pos` a connected flag, or clean up and blacklist it
    fn prepare_site_road(&mut self, pos: MapPos, kind: BuildingType) -> bool {
        let player = self.player;
        let (flag, has_flag, connected) = self.world.read(|w| {
            let flag = w.geometry().flag_of_building(pos);
            (flag, w.has_flag(flag), w.is_connected(flag))
        });
        if connected {
            return true;
        }
        if !has_flag && !self.world.write(|w| w.build_flag(flag, player)) {
            return false;
        }

        let mut request = RoadRequest::new(flag, self.road_options).for_building(kind);
        if verifies_stock(kind) {
            request = request.verify_stock(self.stock.flag);
        }
        if self.road_builder().build_best_road(&request).succeeded() {
            return true;
        }

        debug!(kind = %kind, pos = %pos, "site could not be connected");
        self.world.write(|w| {
            if w.flag_at(flag).map_or(false, |f| !f.has_building()) {
                w.demolish_flag(flag, player);
            }
        });
        self.blacklist.insert(pos, SiteKind::Building(kind));
        false
    }

    /// Build a flag at `pos` and connect it, removing it again on failure
    pub(crate) fn build_connected_flag(&mut self, pos: MapPos) -> bool {
        let player = self.player;
        if !self.world.write(|w| w.build_flag(pos, player)) {
            return false;
        }
        let request = RoadRequest::new(pos, self.road_options);
        if self.road_builder().build_best_road(&request).succeeded() {
            return true;
        }
        self.world.write(|w| w.demolish_flag(pos, player));
        false
    }

    // ========================================================================
    // Demolition and lookups
    // ========================================================================

    /// Demolish a building and its flag
    pub(crate) fn demolish_site(&mut self, pos: MapPos, reason: &str) {
        let player = self.player;
        let removed = self.world.write(|w| {
            let flag = w.geometry().flag_of_building(pos);
            let removed = w.demolish_building(pos, player);
            if removed {
                w.demolish_flag(flag, player);
            }
            removed
        });
        if removed {
            info!(player, pos = %pos, reason, "demolished building");
            self.pause(self.config.timing.action_pause_ms);
        } else {
            warn!(player, pos = %pos, reason, "building to demolish is gone");
        }
    }

    /// Own buildings of `kind` anywhere in the realm
    pub(crate) fn realm_buildings_of(&self, kind: BuildingType) -> Vec<BuildingInfo> {
        let player = self.player;
        let mut buildings: Vec<BuildingInfo> = self.world.read(|w| {
            w.player_buildings(player)
                .into_iter()
                .filter(|b| b.kind == kind)
                .collect()
        });
        buildings.sort_by_key(|b| b.pos);
        buildings
    }

    /// Own buildings of `kind` that belong to the current stock
    pub(crate) fn stock_buildings_of(&self, kind: BuildingType) -> Vec<BuildingInfo> {
        let geometry = self.world.read(|w| w.geometry());
        let stocks = &self.stocks;
        let here = self.stock.flag;
        self.realm_buildings_of(kind)
            .into_iter()
            .filter(|b| {
                nearest_stock(&geometry, stocks, geometry.flag_of_building(b.pos))
                    .map_or(true, |s| s == here)
            })
            .collect()
    }

    /// Corners around the stock's military buildings scoring at least `minimum`
    pub(crate) fn resource_corners(&self, feature: Feature, scan_distance: u32, minimum: u32) -> CandidateSet {
        let mut centers = self.stock.buildings.occupied_military.clone();
        if centers.is_empty() {
            centers.push(self.stock.flag);
        }
        self.corners_around(&centers, feature, scan_distance, minimum)
    }

    /// Corners around `centers` at every corner distance, merged
    pub(crate) fn corners_around(
        &self,
        centers: &[MapPos],
        feature: Feature,
        scan_distance: u32,
        minimum: u32,
    ) -> CandidateSet {
        let first_dir = self.first_dir;
        self.world.read(|w| {
            let mut merged = CandidateSet::with_minimum(minimum);
            for distance in CORNER_DISTANCES {
                let set = rank_corners(w, centers, distance, scan_distance, feature, minimum, first_dir);
                for candidate in set.ranked() {
                    merged.insert(candidate.pos, candidate.score);
                }
            }
            merged
        })
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    /// Push the border out with huts where the current goals point
    pub(crate) fn expand_borders(&mut self) -> PlacementResult {
        if self.cannot_expand {
            return PlacementResult::StopSearch;
        }
        if self.stock.buildings.unfinished_huts >= self.config.placement.max_unfinished_huts {
            return PlacementResult::StopSearch;
        }
        let realm = &self.realm.buildings;
        let all_mines = [BuildingType::CoalMine, BuildingType::IronMine, BuildingType::GoldMine]
            .iter()
            .all(|kind| realm.placed(*kind) > 0);
        if all_mines && self.realm.serfs.idle_knights() <= self.config.knights.knights_min {
            debug!("keeping knights home, all mine types exist");
            return PlacementResult::StopSearch;
        }

        let player = self.player;
        let first_dir = self.first_dir;
        let military = self.stock.buildings.occupied_military.clone();
        let goals = &self.goals;
        let weights = &self.config.placement;
        let borders = self.world.read(|w| {
            let geometry = w.geometry();
            let mut set = CandidateSet::new();
            for center in &military {
                for dir in first_dir.cycle_from() {
                    let mut pos = *center;
                    for _ in 0..BORDER_SEARCH_STEPS {
                        pos = geometry.move_pos(pos, dir);
                        if w.owner_of(pos) != Some(player) {
                            let score = score_area(w, player, pos, spiral_dist(6), goals, weights);
                            set.insert(pos, score);
                            break;
                        }
                    }
                }
            }
            set
        });

        let mut result = PlacementResult::NotFound;
        for border in borders.ranked_positions() {
            match self.build_near_pos(border, spiral_dist(4), BuildingType::Hut) {
                PlacementResult::Found(pos) => {
                    debug!(border = %border, hut = %pos, "expanding toward border");
                    result = PlacementResult::Found(pos);
                }
                PlacementResult::StopSearch => break,
                PlacementResult::NotFound => {}
            }
        }
        if !result.is_found() {
            debug!(player, "no hut site found, cannot expand this cycle");
            self.cannot_expand = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AiConfig;
    use crate::core::types::{MapObject, Terrain};
    use crate::spatial::{Direction, MapGeometry};
    use crate::world::{SharedWorld, SimWorld};

    fn started(world: SimWorld, castle: MapPos) -> (AiController<SimWorld>, SharedWorld<SimWorld>) {
        let shared = SharedWorld::new(world);
        shared.write(|w| w.build_castle(castle, 0));
        let mut ai = AiController::with_seed(shared.clone(), 0, AiConfig::headless(), 3);
        ai.next_loop().expect("castle already exists");
        (ai, shared)
    }

    #[test]
    fn test_castle_site_requirements_relax() {
        let geom = MapGeometry::new(64, 64);
        let world = SimWorld::new(geom);
        let config = PlacementConfig::default();
        let pos = geom.pos(30, 30);
        // open grass, no trees or stones
        assert!(!castle_site_acceptable(&world, pos, 0, &config));
        let levels = config.castle_max_tries / config.castle_desperation_interval.max(1);
        assert!(castle_site_acceptable(&world, pos, levels, &config));
    }

    #[test]
    fn test_zero_desperation_interval_treated_as_one() {
        let geom = MapGeometry::new(64, 64);
        let world = SimWorld::new(geom);
        let config = PlacementConfig {
            castle_desperation_interval: 0,
            ..PlacementConfig::default()
        };
        let pos = geom.pos(30, 30);
        assert!(!castle_site_acceptable(&world, pos, 0, &config));
        assert!(castle_site_acceptable(&world, pos, config.castle_max_tries, &config));
    }

    #[test]
    fn test_castle_site_with_resources() {
        let geom = MapGeometry::new(64, 64);
        let mut world = SimWorld::new(geom);
        let pos = geom.pos(30, 30);
        for p in geom.spiral_rings(geom.pos(36, 30), 2) {
            world.set_object(p, MapObject::Tree(0));
        }
        for p in geom.spiral_rings(geom.pos(24, 30), 1) {
            world.set_object(p, MapObject::Stone(7));
        }
        assert!(castle_site_acceptable(&world, pos, 0, &PlacementConfig::default()));
    }

    #[test]
    fn test_build_near_pos_skips_blacklisted_sites() {
        let geom = MapGeometry::new(64, 64);
        let castle = geom.pos(20, 20);
        let (mut ai, shared) = started(SimWorld::new(geom), castle);
        let center = geom.pos(25, 20);
        let first = shared.read(|w| {
            geom.spiral(center, spiral_dist(3))
                .find(|p| w.can_build_building(*p, BuildingType::Lumberjack, 0))
        });
        let first = first.expect("owned grassland");
        ai.blacklist.insert(first, SiteKind::Building(BuildingType::Lumberjack));
        let result = ai.build_near_pos(center, spiral_dist(3), BuildingType::Lumberjack);
        assert!(result.is_found());
        assert_ne!(result.pos(), Some(first));
    }

    #[test]
    fn test_rejected_building_blacklists_its_site() {
        let geom = MapGeometry::new(64, 64);
        let castle = geom.pos(20, 20);
        let (mut ai, shared) = started(SimWorld::new(geom), castle);
        let site = shared
            .read(|w| {
                geom.spiral(geom.pos(25, 20), spiral_dist(3))
                    .find(|p| w.can_build_building(*p, BuildingType::Mill, 0))
            })
            .expect("owned grassland");
        // the ground is taken between the road and the building
        shared.write(|w| w.set_object(site, MapObject::Stone(3)));
        assert!(!ai.place_prepared_site(site, BuildingType::Mill));
        assert!(ai.blacklist.contains(site, SiteKind::Building(BuildingType::Mill)));
        assert!(shared.read(|w| w.building_at(site).is_none()));
    }

    #[test]
    fn test_build_near_pos_stops_at_site_limit() {
        let geom = MapGeometry::new(64, 64);
        let (mut ai, _) = started(SimWorld::new(geom), geom.pos(20, 20));
        ai.stock.buildings.unfinished = ai.config.placement.max_unfinished_buildings;
        let result = ai.build_near_pos(geom.pos(24, 22), spiral_dist(3), BuildingType::Mill);
        assert_eq!(result, PlacementResult::StopSearch);
        // exempt kinds still go ahead
        let result = ai.build_near_pos(geom.pos(24, 22), spiral_dist(3), BuildingType::Lumberjack);
        assert!(result.is_found());
    }

    #[test]
    fn test_unowned_land_is_not_found() {
        let geom = MapGeometry::new(64, 64);
        let (mut ai, _) = started(SimWorld::new(geom), geom.pos(20, 20));
        let result = ai.build_near_pos(geom.pos(50, 50), spiral_dist(2), BuildingType::Lumberjack);
        assert_eq!(result, PlacementResult::NotFound);
    }

    #[test]
    fn test_mines_need_no_road() {
        let geom = MapGeometry::new(64, 64);
        let mut world = SimWorld::new(geom);
        let hill = geom.move_n(geom.pos(20, 20), Direction::Right, 5);
        world.paint_terrain(hill, 1, Terrain::Tundra0);
        let (mut ai, shared) = started(world, geom.pos(20, 20));
        let result = ai.build_near_pos(hill, spiral_dist(1), BuildingType::CoalMine);
        let pos = result.pos().expect("hill inside castle land");
        let flag = geom.flag_of_building(pos);
        assert!(!shared.read(|w| w.is_connected(flag)));
    }

    #[test]
    fn test_expand_borders_builds_a_hut() {
        let geom = MapGeometry::new(64, 64);
        let (mut ai, shared) = started(SimWorld::new(geom), geom.pos(20, 20));
        ai.cannot_expand = false;
        ai.stock.buildings.unfinished_huts = 0;
        let before = shared.read(|w| w.building_count(0, BuildingType::Hut));
        let result = ai.expand_borders();
        if result.is_found() {
            assert!(shared.read(|w| w.building_count(0, BuildingType::Hut)) > before);
        } else {
            assert!(ai.cannot_expand);
        }
    }
}
