//! Mines and geologists
//!
//! Mines are placed on good signs as soon as they are found but only
//! connected once the ore is actually needed, so a good site is held
//! without spending planks and stones on it.

use tracing::{debug, info, warn};

use crate::ai::blacklist::SiteKind;
use crate::ai::controller::AiController;
use crate::core::types::{BuildingType, MapObject, Ore, ResourceType, SerfType, Sign, TerrainRange};
use crate::placement::{
    count_empty_terrain_near_pos, count_geologist_sign_density, count_objects_near_pos, get_corners,
    CandidateSet, ObjectClass, PlacementResult,
};
use crate::road::RoadRequest;
use crate::spatial::{spiral_dist, MapPos};
use crate::world::World;

/// Corner distance used for mine and geologist searches
const MINE_CORNER_DISTANCE: u32 = 6;

/// Ore behind a mine type
pub fn mine_ore(kind: BuildingType) -> Option<Ore> {
    match kind {
        BuildingType::CoalMine => Some(Ore::Coal),
        BuildingType::IronMine => Some(Ore::Iron),
        BuildingType::GoldMine => Some(Ore::Gold),
        BuildingType::StoneMine => Some(Ore::Stone),
        _ => None,
    }
}

/// Signs of any kind per empty hill tile around `center`
///
/// `None` when there are no signs or no hills to judge by.
pub fn mine_sign_density<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> Option<f64> {
    let signs = count_objects_near_pos(world, center, distance, ObjectClass::Signs);
    let hills = count_empty_terrain_near_pos(world, center, distance, TerrainRange::HILLS);
    if signs == 0 || hills == 0 {
        return None;
    }
    Some(f64::from(signs) / f64::from(hills))
}

/// Whether the sign at a site is good enough for a mine of `ore`
pub fn sign_supports_mine(object: MapObject, ore: Ore, density: f64, density_min: f64) -> bool {
    match object {
        MapObject::Sign(Sign::Large(o)) => o == ore,
        MapObject::Sign(Sign::Small(o)) => o == ore && density >= density_min,
        _ => false,
    }
}

/// Mine output in `progress` is a bit history of recent shifts, newest in
/// the lowest bit; nothing in the last six means the deposit is spent
pub fn mine_exhausted(progress: u32) -> bool {
    progress & 0b11_1111 == 0
}

impl<W: World> AiController<W> {
    fn mine_limits(&self, kind: BuildingType) -> (bool, u32, f64) {
        let p = &self.config.placement;
        let needs = &self.stock.needs;
        match kind {
            BuildingType::CoalMine => (needs.coal, p.max_coalmines, p.coal_sign_density_min),
            BuildingType::IronMine => (needs.iron_ore, p.max_ironmines, p.iron_sign_density_min),
            BuildingType::GoldMine => (needs.gold_ore, p.max_goldmines, p.gold_sign_density_min),
            _ => (false, 0, 1.0),
        }
    }

    /// Reserve a mine site on a good sign near the stock's military buildings
    pub(crate) fn place_mines(&mut self, kind: BuildingType) -> PlacementResult {
        let Some(ore) = mine_ore(kind) else {
            return PlacementResult::NotFound;
        };
        let (needed, max, density_min) = self.mine_limits(kind);
        if !needed {
            debug!(kind = %kind, "ore not needed");
            return PlacementResult::NotFound;
        }
        if self.realm.buildings.placed(kind) >= max {
            debug!(kind = %kind, max, "enough mines placed");
            return PlacementResult::NotFound;
        }

        let player = self.player;
        let first_dir = self.first_dir;
        // newest military buildings first
        let centers: Vec<MapPos> = self.stock.buildings.occupied_military.iter().rev().copied().collect();
        let sites: Vec<MapPos> = self.world.read(|w| {
            let geometry = w.geometry();
            let mut sites = Vec::new();
            for center in &centers {
                for corner in get_corners(&geometry, *center, MINE_CORNER_DISTANCE, first_dir) {
                    let Some(density) = mine_sign_density(w, corner, spiral_dist(4)) else {
                        continue;
                    };
                    let same_kind_near = geometry
                        .spiral(corner, spiral_dist(12))
                        .any(|p| w.building_at(p).map_or(false, |b| b.owner == player && b.kind == kind));
                    if same_kind_near {
                        continue;
                    }
                    for pos in geometry.spiral(corner, spiral_dist(4)) {
                        if w.owner_of(pos) == Some(player)
                            && w.can_build_building(pos, kind, player)
                            && sign_supports_mine(w.object_at(pos), ore, density, density_min)
                            && !sites.contains(&pos)
                        {
                            sites.push(pos);
                        }
                    }
                }
            }
            sites
        });

        for pos in sites {
            match self.build_near_pos(pos, 1, kind) {
                PlacementResult::Found(at) => {
                    info!(kind = %kind, pos = %at, "mine site reserved");
                    return PlacementResult::Found(at);
                }
                PlacementResult::StopSearch => return PlacementResult::StopSearch,
                PlacementResult::NotFound => {}
            }
        }
        PlacementResult::NotFound
    }

    /// Connect one reserved mine of `kind` once its ore is needed
    pub(crate) fn connect_mines(&mut self, kind: BuildingType) {
        let (needed, _, _) = self.mine_limits(kind);
        if !needed {
            return;
        }
        // spare the last miners for a second kind of ore
        let miners = self.realm.serfs.available(SerfType::Miner);
        let realm = &self.realm.buildings;
        if miners < 3 {
            let other_occupied = [BuildingType::CoalMine, BuildingType::IronMine, BuildingType::GoldMine]
                .into_iter()
                .filter(|k| *k != kind)
                .any(|k| realm.occupied(k) > 0);
            if realm.occupied(kind) >= 1 && !other_occupied {
                debug!(kind = %kind, miners, "saving miners for another ore");
                return;
            }
        }

        let player = self.player;
        let pending: Vec<MapPos> = self
            .stock_buildings_of(kind)
            .into_iter()
            .map(|b| b.pos)
            .filter(|pos| {
                self.world.read(|w| {
                    let flag = w.geometry().flag_of_building(*pos);
                    !w.is_connected(flag)
                })
            })
            .collect();

        for pos in pending {
            let flag = self.world.read(|w| w.geometry().flag_of_building(pos));
            let request = RoadRequest::new(flag, self.road_options)
                .for_building(kind)
                .verify_stock(self.stock.flag);
            if self.road_builder().build_best_road(&request).succeeded() {
                info!(player, kind = %kind, pos = %pos, "connected mine");
                self.stock.buildings.unfinished += 1;
                break;
            }
            warn!(player, kind = %kind, pos = %pos, "mine could not be connected");
            self.demolish_site(pos, "unconnectable mine");
        }
    }

    pub(crate) fn demolish_unproductive_mines(&mut self) {
        let player = self.player;
        let now = self.tick();
        let probation = self.config.timing.mine_probation;
        let mines: Vec<_> = self.world.read(|w| {
            w.player_buildings(player)
                .into_iter()
                .filter(|b| b.kind.is_mine() && b.done && !b.burning)
                .collect()
        });

        self.active_mines
            .retain(|pos, _| mines.iter().any(|m| m.pos == *pos));

        for mine in mines {
            if mine.occupied && mine.active && !self.active_mines.contains_key(&mine.pos) {
                self.active_mines.insert(mine.pos, now);
                continue;
            }
            let Some(first_seen) = self.active_mines.get(&mine.pos).copied() else {
                continue;
            };
            if now.saturating_sub(first_seen) < probation || !mine_exhausted(mine.progress) {
                continue;
            }
            info!(player, kind = %mine.kind, pos = %mine.pos, progress = mine.progress, "mine exhausted");
            let removed = self.world.write(|w| w.demolish_building(mine.pos, player));
            if removed {
                self.active_mines.remove(&mine.pos);
                self.blacklist.insert(mine.pos, SiteKind::Building(mine.kind));
                self.pause(self.config.timing.action_pause_ms);
            }
        }
    }

    /// Send one geologist to an unexplored hill area near the stock
    pub(crate) fn send_geologists(&mut self) {
        let player = self.player;
        let now = self.tick();
        if self.realm.buildings.occupied(BuildingType::Hut) >= 6 {
            if let Some(last) = self.last_geologist_tick {
                if last + self.config.timing.geologist_interval > now {
                    return;
                }
            }
        }

        let serfs = &self.realm.serfs;
        let total = serfs.total(SerfType::Geologist);
        let idle = serfs.idle(SerfType::Geologist);
        let max = 2 + self.config.placement.geologists_max * self.stocks.len() as u32;
        if total.saturating_sub(idle) >= max {
            debug!(working = total - idle, max, "enough geologists out");
            return;
        }
        let spare_hammers = self
            .realm
            .resources
            .get(ResourceType::Hammer)
            .saturating_sub(self.config.thresholds.hammers_min);
        let can_make = total < max && spare_hammers > 0;
        if idle == 0 && !can_make {
            debug!("no geologist available");
            return;
        }

        let placement = &self.config.placement;
        let mut corners = CandidateSet::with_minimum(placement.hills_min);
        let centers = self.stock.buildings.occupied_military.clone();
        let first_dir = self.first_dir;
        let density_max = placement.geologist_sign_density_max;
        self.world.read(|w| {
            let geometry = w.geometry();
            for center in &centers {
                for corner in get_corners(&geometry, *center, MINE_CORNER_DISTANCE, first_dir) {
                    let hills = count_empty_terrain_near_pos(w, corner, spiral_dist(4), TerrainRange::HILLS);
                    if count_geologist_sign_density(w, corner, spiral_dist(4)) > density_max {
                        continue;
                    }
                    corners.insert(corner, hills);
                }
            }
        });

        for corner in corners.ranked_positions() {
            let hill_tiles: Vec<MapPos> = self.world.read(|w| {
                w.geometry()
                    .spiral(corner, spiral_dist(4))
                    .filter(|p| TerrainRange::HILLS.contains(w.terrain_at(*p)) && w.owner_of(*p) == Some(player))
                    .collect()
            });
            for pos in hill_tiles {
                if !self.geologist_flag(pos) {
                    continue;
                }
                let sent = self.world.write(|w| w.send_geologist(pos, player));
                if sent {
                    info!(player, flag = %pos, "sent geologist");
                    self.last_geologist_tick = Some(now);
                    self.pause(self.config.timing.action_pause_ms);
                } else {
                    debug!(flag = %pos, "geologist not dispatched");
                }
                return;
            }
        }
        debug!(player, "no hill area needs a geologist");
    }

    /// Make sure a connected flag stands at `pos`, building one if the area
    /// has no flag yet
    fn geologist_flag(&mut self, pos: MapPos) -> bool {
        let player = self.player;
        let (has_flag, connected, can_build, crowded) = self.world.read(|w| {
            let crowded = w.geometry().spiral(pos, spiral_dist(5)).any(|p| w.has_flag(p));
            (w.has_flag(pos), w.is_connected(pos), w.can_build_flag(pos, player), crowded)
        });
        if has_flag {
            return connected && self.world.read(|w| w.owner_of(pos) == Some(player));
        }
        if !can_build || crowded || self.blacklist.contains(pos, SiteKind::Flag) {
            return false;
        }
        if self.build_connected_flag(pos) {
            debug!(flag = %pos, "flag built for geologist");
            return true;
        }
        self.blacklist.insert(pos, SiteKind::Flag);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Terrain;
    use crate::spatial::MapGeometry;
    use crate::world::SimWorld;

    #[test]
    fn test_sign_rules() {
        let large = MapObject::Sign(Sign::Large(Ore::Coal));
        let small = MapObject::Sign(Sign::Small(Ore::Coal));
        assert!(sign_supports_mine(large, Ore::Coal, 0.0, 0.5));
        assert!(!sign_supports_mine(large, Ore::Iron, 1.0, 0.5));
        assert!(!sign_supports_mine(small, Ore::Coal, 0.4, 0.5));
        assert!(sign_supports_mine(small, Ore::Coal, 0.5, 0.5));
        assert!(!sign_supports_mine(MapObject::Sign(Sign::Empty), Ore::Coal, 1.0, 0.5));
    }

    #[test]
    fn test_exhaustion_looks_at_recent_shifts() {
        assert!(mine_exhausted(0));
        assert!(mine_exhausted(0b1000_0000));
        assert!(!mine_exhausted(0b1000_0001));
        assert!(!mine_exhausted(0b10_0000));
    }

    #[test]
    fn test_sign_density() {
        let geom = MapGeometry::new(32, 32);
        let mut world = SimWorld::new(geom);
        let center = geom.pos(10, 10);
        assert_eq!(mine_sign_density(&world, center, spiral_dist(1)), None);
        world.paint_terrain(center, 1, Terrain::Tundra0);
        world.set_object(center, MapObject::Sign(Sign::Large(Ore::Iron)));
        world.set_object(geom.move_pos(center, crate::spatial::Direction::Right), MapObject::Sign(Sign::Empty));
        let density = mine_sign_density(&world, center, spiral_dist(1)).expect("signs on hills");
        assert!((density - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_mine_ore_mapping() {
        assert_eq!(mine_ore(BuildingType::GoldMine), Some(Ore::Gold));
        assert_eq!(mine_ore(BuildingType::Farm), None);
    }
}
