//! Road network maintenance
//!
//! Architecture: repair, then densify
//! - Disconnected flags and isolated networks are reattached or removed
//! - Important producers get a second chance at a shorter road
//! - Flags near the castle and cross links between outer flags add capacity
//!   where the star-shaped network congests
//! - Dead-end stubs are removed once nothing needs them

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::ai::controller::AiController;
use crate::core::types::BuildingType;
use crate::placement::count_geologist_sign_density;
use crate::road::{find_flag_and_tile_dist, flag_network, Road, RoadOption, RoadRequest};
use crate::spatial::{spiral_dist, Direction, MapPos, SpiralIter};
use crate::world::World;

/// Flags sampled per isolated network when looking for a reconnection
const RECONNECT_SAMPLE: usize = 5;

/// Flag pairs tried per spiderweb run
const SPIDERWEB_ATTEMPTS: usize = 10;

/// Sectors of the ring whose flags are paired with each other
const SPIDERWEB_SECTORS: usize = 7;

/// Flags already this far apart over the network are always worth a link
const SPIDERWEB_DETOUR_TILES: u32 = 30;

/// Removal passes before star-road cleanup gives up
const STAR_ROAD_PASSES: u32 = 50;

/// Producers whose output is worth a better road
const IMPORTANT_BUILDINGS: [BuildingType; 8] = [
    BuildingType::WeaponSmith,
    BuildingType::SteelSmelter,
    BuildingType::GoldSmelter,
    BuildingType::CoalMine,
    BuildingType::IronMine,
    BuildingType::GoldMine,
    BuildingType::Baker,
    BuildingType::Butcher,
];

/// The only road leaving `flag`, if it has exactly one and carries nothing
pub fn stub_direction<W: World + ?Sized>(world: &W, flag: MapPos) -> Option<Direction> {
    let info = world.flag_at(flag)?;
    if !info.resources.is_empty() {
        return None;
    }
    let mut dirs = Direction::ALL.into_iter().filter(|d| world.has_path(flag, *d));
    let dir = dirs.next()?;
    dirs.next().is_none().then_some(dir)
}

/// Flags that star-road cleanup may strip: bare flags and finished huts,
/// towers, fortresses and fishers
fn star_cleanup_candidate<W: World + ?Sized>(world: &W, flag: MapPos) -> bool {
    let Some(info) = world.flag_at(flag) else {
        return false;
    };
    match info.building {
        None => true,
        Some(kind) => {
            matches!(
                kind,
                BuildingType::Fisher | BuildingType::Hut | BuildingType::Tower | BuildingType::Fortress
            ) && world
                .building_at(world.geometry().building_of_flag(flag))
                .map_or(false, |b| b.done)
        }
    }
}

impl<W: World> AiController<W> {
    pub(crate) fn connect_disconnected_flags(&mut self) {
        let player = self.player;
        let castle_flag = self.castle_flag;
        let flags: Vec<(MapPos, Option<BuildingType>)> = self.world.read(|w| {
            w.flags()
                .into_iter()
                .filter(|f| f.owner == player && !f.connected && Some(f.pos) != castle_flag)
                .map(|f| (f.pos, f.building))
                .collect()
        });

        for (flag, kind) in flags {
            let building = self.world.read(|w| w.building_at(w.geometry().building_of_flag(flag)));
            if let Some(b) = &building {
                // unfinished mines are connected once their ore is wanted
                if b.kind.is_mine() && !b.done {
                    continue;
                }
                // a working forester needs no road
                if b.kind == BuildingType::Forester && b.done && b.occupied {
                    continue;
                }
            }

            let request = RoadRequest::new(flag, self.road_options);
            if self.road_builder().build_best_road(&request).succeeded() {
                debug!(flag = %flag, "reconnected flag");
                continue;
            }

            match (kind, building) {
                (Some(kind), _) if kind.is_military() => {
                    // freshly captured buildings often cannot be reached yet
                    warn!(player, flag = %flag, kind = %kind, "military building cannot be connected");
                }
                (Some(kind), Some(b)) => {
                    info!(player, flag = %flag, kind = %kind, "burning building that cannot be connected");
                    self.demolish_site(b.pos, "cannot be connected");
                }
                _ => {
                    info!(player, flag = %flag, "removing flag that cannot be connected");
                    self.world.write(|w| w.demolish_flag(flag, player));
                }
            }
        }
    }

    /// Join road networks that have lost contact with the castle's
    pub(crate) fn connect_disconnected_road_networks(&mut self) {
        let player = self.player;
        let Some(castle_flag) = self.castle_flag else {
            return;
        };
        let networks: Vec<Vec<MapPos>> = self.world.read(|w| {
            let main = flag_network(w, castle_flag);
            let mut seen = main;
            let mut networks = Vec::new();
            for flag in w.flags() {
                if flag.owner != player || !flag.connected || seen.contains(&flag.pos) {
                    continue;
                }
                let network = flag_network(w, flag.pos);
                let mut members: Vec<MapPos> = network.iter().copied().collect();
                members.sort();
                seen.extend(network);
                if members.len() > 1 {
                    networks.push(members);
                }
            }
            networks
        });
        if networks.is_empty() {
            return;
        }
        info!(player, networks = networks.len(), "found isolated road networks");

        let options = self
            .road_options
            .with(RoadOption::Improve)
            .with(RoadOption::PlotOnlyNoBuild)
            .with(RoadOption::ReconnectNetwork);
        for members in networks {
            let mut plans: Vec<Road> = Vec::new();
            for flag in members.into_iter().take(RECONNECT_SAMPLE) {
                let request = RoadRequest::new(flag, options).to_target(castle_flag);
                if let Some(road) = self.road_builder().build_best_road(&request).road() {
                    if !road.is_empty() {
                        plans.push(road.clone());
                    }
                }
            }
            plans.sort_by_key(|r| r.len());

            for road in plans {
                let end = road.end();
                let built = self.world.write(|w| {
                    let new_flag = !w.has_flag(end) && w.build_flag(end, player);
                    if w.build_road(&road, player) {
                        return true;
                    }
                    if new_flag {
                        w.demolish_flag(end, player);
                    }
                    false
                });
                if built {
                    info!(player, from = %road.source(), to = %end, "reconnected road network");
                    self.pause(self.config.timing.action_pause_ms);
                    break;
                }
            }
        }
    }

    pub(crate) fn build_better_roads(&mut self) {
        let options = self.road_options.with(RoadOption::Improve);
        let player = self.player;
        let buildings: Vec<(MapPos, BuildingType)> = self.world.read(|w| {
            let geometry = w.geometry();
            w.player_buildings(player)
                .into_iter()
                .filter(|b| b.done && !b.burning && IMPORTANT_BUILDINGS.contains(&b.kind))
                .map(|b| (geometry.flag_of_building(b.pos), b.kind))
                .collect()
        });
        for (flag, kind) in buildings {
            let request = RoadRequest::new(flag, options).for_building(kind);
            if let Some(road) = self.road_builder().build_best_road(&request).built_road() {
                info!(player, kind = %kind, len = road.len(), "built better road");
            }
        }
    }

    /// Split the busy roads around the castle with extra flags
    pub(crate) fn pollute_castle_area_roads(&mut self) {
        let player = self.player;
        let Some(castle_flag) = self.castle_flag else {
            return;
        };
        let candidates: Vec<MapPos> = self.world.read(|w| {
            w.geometry()
                .spiral(castle_flag, spiral_dist(8))
                .filter(|&pos| w.has_any_path(pos) && w.can_build_flag(pos, player))
                .collect()
        });
        let pause = self.config.timing.action_pause_ms;
        let mut created = 0u32;
        // earlier flags can rule out later candidates, so each one is rechecked
        for pos in candidates {
            if self.world.write(|w| w.can_build_flag(pos, player) && w.build_flag(pos, player)) {
                created += 1;
                self.pause(pause);
            }
        }
        debug!(player, created, "castle area flags");
    }

    pub(crate) fn remove_road_stubs(&mut self) {
        let player = self.player;
        let pause = self.config.timing.action_pause_ms;
        let mut removed = 0u32;

        // a working forester does not need its road
        for forester in self.realm_buildings_of(BuildingType::Forester) {
            if !forester.done || !forester.occupied {
                continue;
            }
            let gone = self.world.write(|w| {
                let flag = w.geometry().flag_of_building(forester.pos);
                match stub_direction(w, flag) {
                    Some(dir) => w.demolish_road(flag, dir, player),
                    None => false,
                }
            });
            if gone {
                debug!(pos = %forester.pos, "removed forester road");
                removed += 1;
                self.pause(pause);
            }
        }

        let density_max = self.config.placement.geologist_sign_density_max;
        let candidates: Vec<MapPos> = self.world.read(|w| {
            w.flags()
                .into_iter()
                .filter(|f| f.owner == player && f.connected && !f.has_building())
                .map(|f| f.pos)
                .collect()
        });
        for flag in candidates {
            let gone = self.world.write(|w| {
                if w.terrain_at(flag).is_hills() {
                    // geologist flags stay while the area is still worth searching
                    let searched = count_geologist_sign_density(w, flag, spiral_dist(4)) > density_max;
                    let crowded = w.geometry().spiral(flag, spiral_dist(2)).skip(1).any(|p| {
                        w.terrain_at(p).is_hills()
                            && w.flag_at(p).map_or(false, |f| f.owner == player && f.connected)
                    });
                    if !searched && !crowded {
                        return false;
                    }
                }
                let Some(dir) = stub_direction(w, flag) else {
                    return false;
                };
                w.demolish_road(flag, dir, player) && w.demolish_flag(flag, player)
            });
            if gone {
                debug!(flag = %flag, "removed road stub");
                removed += 1;
                self.pause(pause);
            }
        }
        if removed > 0 {
            info!(player, removed, "removed road stubs");
        }
    }

    /// Link flags in a ring around the stock so traffic can bypass the center
    pub(crate) fn spiderweb_roads(&mut self) {
        let center = self.stock.flag;
        let geometry = self.world.read(|w| w.geometry());
        let start = spiral_dist(14);
        let ring_len = spiral_dist(15) - start;
        // rotate the ring start so successive runs favor different sides
        let offset = self.rng.gen_range(0..ring_len);
        let ring: Vec<MapPos> = SpiralIter::range(geometry, center, start, start + ring_len)
            .cycle()
            .skip(offset as usize)
            .take(ring_len as usize)
            .step_by(4)
            .collect();

        let player = self.player;
        let options = self
            .road_options
            .with(RoadOption::Improve)
            .with(RoadOption::ReducedNewLengthPenalty);
        let mut sectors: Vec<Vec<MapPos>> = Vec::new();
        let mut attempts = 0usize;
        let mut tried: Vec<(MapPos, MapPos)> = Vec::new();

        for ring_pos in ring {
            let sector: Vec<MapPos> = self.world.read(|w| {
                w.geometry()
                    .spiral(ring_pos, spiral_dist(5))
                    .filter(|p| w.flag_at(*p).map_or(false, |f| f.owner == player && f.connected))
                    .collect()
            });
            sectors.push(sector);
            if sectors.len() > SPIDERWEB_SECTORS {
                sectors.remove(0);
            }
            let mut flags: Vec<MapPos> = sectors.iter().flatten().copied().collect();
            flags.sort();
            flags.dedup();
            flags.shuffle(&mut self.rng);

            for a in &flags {
                for b in &flags {
                    if a == b || tried.contains(&(*a, *b)) || tried.contains(&(*b, *a)) {
                        continue;
                    }
                    tried.push((*a, *b));
                    let worth_it = self.world.read(|w| {
                        find_flag_and_tile_dist(w, *a, *b, Some(center))
                            .map_or(true, |s| s.contains_castle_flag || s.tile_dist > SPIDERWEB_DETOUR_TILES)
                    });
                    if !worth_it {
                        continue;
                    }
                    attempts += 1;
                    let request = RoadRequest::new(*a, options).to_target(*b);
                    if let Some(road) = self.road_builder().build_best_road(&request).built_road() {
                        info!(player, from = %a, to = %b, len = road.len(), "built spiderweb road");
                        self.pause(self.config.timing.action_pause_ms);
                        return;
                    }
                    if attempts >= SPIDERWEB_ATTEMPTS {
                        debug!(attempts, "no spiderweb road this time");
                        return;
                    }
                }
            }
        }
    }

    /// Strip dead-end roads around a newly finished warehouse so traffic
    /// reorganizes around it
    pub(crate) fn create_star_roads(&mut self) {
        let stock = self.stock.flag;
        if !self.new_stocks.remove(&stock) || Some(stock) == self.castle_flag {
            return;
        }
        let player = self.player;
        let eligible: Vec<MapPos> = self.world.read(|w| {
            w.geometry()
                .spiral(stock, spiral_dist(14))
                .filter(|p| star_cleanup_candidate(w, *p))
                .collect()
        });

        let mut removed = 0u32;
        for pass in 1..=STAR_ROAD_PASSES {
            let mut again = false;
            for flag in &eligible {
                let gone = self.world.write(|w| {
                    let connected = w.flag_at(*flag).map_or(false, |f| f.connected);
                    let dirs: Vec<Direction> = Direction::ALL.into_iter().filter(|d| w.has_path(*flag, *d)).collect();
                    connected && dirs.len() == 1 && w.demolish_road(*flag, dirs[0], player)
                });
                if gone {
                    removed += 1;
                    again = true;
                }
            }
            if !again {
                break;
            }
            if pass == STAR_ROAD_PASSES {
                warn!(stock = %stock, "star road cleanup did not settle");
            }
        }
        info!(player, stock = %stock, removed, "cleared roads around new warehouse");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AiConfig;
    use crate::spatial::MapGeometry;
    use crate::world::sim::Command;
    use crate::world::{SharedWorld, SimWorld};

    fn setup() -> (AiController<SimWorld>, SharedWorld<SimWorld>, MapGeometry) {
        let geom = MapGeometry::new(48, 48);
        let mut world = SimWorld::new(geom);
        world.claim_area(geom.pos(20, 20), 12, 0);
        let shared = SharedWorld::new(world);
        let ai = AiController::with_seed(shared.clone(), 0, AiConfig::headless(), 9);
        (ai, shared, geom)
    }

    fn lay_road(shared: &SharedWorld<SimWorld>, geom: &MapGeometry, from: MapPos, dir: Direction, len: usize) -> MapPos {
        let road = Road::from_dirs(geom, from, vec![dir; len]);
        let end = road.end();
        shared.write(|w| {
            w.place_flag(from, 0);
            w.place_flag(end, 0);
            w.place_road(&road);
        });
        end
    }

    #[test]
    fn test_stub_direction() {
        let (_, shared, geom) = setup();
        let a = geom.pos(20, 20);
        let b = lay_road(&shared, &geom, a, Direction::Right, 3);
        lay_road(&shared, &geom, b, Direction::Right, 3);
        shared.read(|w| {
            assert_eq!(stub_direction(w, a), Some(Direction::Right));
            assert_eq!(stub_direction(w, b), None);
        });
        shared.write(|w| w.add_flag_resource(a, crate::core::types::ResourceType::Plank));
        assert_eq!(shared.read(|w| stub_direction(w, a)), None);
    }

    #[test]
    fn test_unreachable_flag_is_removed_but_military_kept() {
        let (mut ai, shared, geom) = setup();
        // outside the claimed area nothing can be built
        let lonely = geom.pos(2, 2);
        let hut = geom.pos(40, 40);
        shared.write(|w| {
            w.place_flag(lonely, 0);
            w.place_building(hut, BuildingType::Hut, 0, true, true);
        });
        ai.connect_disconnected_flags();
        let commands = shared.read(|w| w.commands().to_vec());
        assert!(commands.contains(&Command::DemolishFlag(lonely)));
        assert!(!commands.contains(&Command::DemolishBuilding(hut)));
    }

    #[test]
    fn test_pollute_splits_castle_road_one_flag_per_lock() {
        let (mut ai, shared, geom) = setup();
        let castle_flag = geom.pos(20, 20);
        lay_road(&shared, &geom, castle_flag, Direction::Right, 6);
        ai.castle_flag = Some(castle_flag);
        let writes_before = shared.write_count();
        ai.pollute_castle_area_roads();
        let writes = shared.write_count() - writes_before;
        let flags = shared.read(|w| {
            w.commands()
                .iter()
                .filter(|c| matches!(c, Command::BuildFlag(_)))
                .count() as u64
        });
        // tiles two and four of the six-tile road
        assert_eq!(flags, 2);
        assert!(writes >= flags);
    }

    #[test]
    fn test_dead_end_flag_is_removed() {
        let (mut ai, shared, geom) = setup();
        let site = geom.pos(19, 19);
        shared.write(|w| w.place_building(site, BuildingType::Stock, 0, true, true));
        let stock_flag = geom.flag_of_building(site);
        let end = lay_road(&shared, &geom, stock_flag, Direction::Right, 4);
        ai.remove_road_stubs();
        let commands = shared.read(|w| w.commands().to_vec());
        assert!(commands.contains(&Command::DemolishRoad(end, Direction::Left)));
        assert!(commands.contains(&Command::DemolishFlag(end)));
        // the flag with a building keeps its road end
        assert!(!commands.contains(&Command::DemolishFlag(stock_flag)));
    }

    #[test]
    fn test_star_roads_unwind_chains_once() {
        let (mut ai, shared, geom) = setup();
        let site = geom.pos(19, 19);
        shared.write(|w| w.place_building(site, BuildingType::Stock, 0, true, true));
        let stock_flag = geom.flag_of_building(site);
        let middle = lay_road(&shared, &geom, stock_flag, Direction::Right, 3);
        lay_road(&shared, &geom, middle, Direction::Right, 3);

        ai.stock.flag = stock_flag;
        ai.new_stocks.insert(stock_flag);
        ai.create_star_roads();
        let removed = shared.read(|w| {
            w.commands()
                .iter()
                .filter(|c| matches!(c, Command::DemolishRoad(..)))
                .count()
        });
        assert_eq!(removed, 2);
        assert!(!ai.new_stocks.contains(&stock_flag));

        // a stock is only unwound once
        shared.write(|w| w.clear_commands());
        ai.create_star_roads();
        assert!(shared.read(|w| w.commands().is_empty()));
    }
}
