//! Economy tasks: what to build for the current stock, and what to burn
//!
//! Architecture: corners first
//! - Every site search starts from corners around the stock's occupied
//!   military buildings, ranked by whatever the building lives on
//! - `build_near_pos` does the actual placing; tasks only decide where to
//!   look and when to stop
//! - Demolition tasks mirror the build tasks and use the same thresholds
//!   plus the anti-flapping buffer

use tracing::{debug, info};

use crate::ai::blacklist::SiteKind;
use crate::ai::controller::AiController;
use crate::ai::inventory::{adjusted_food, Hysteresis};
use crate::ai::tasks::Flow;
use crate::core::types::{BuildingType, MapObject, ResourceType, SerfType, TerrainRange};
use crate::placement::{
    count_farmable_land, count_objects_near_pos, count_stones_near_pos, get_corners, CandidateSet, Feature,
    ObjectClass, PlacementResult,
};
use crate::spatial::{spiral_dist, MapPos};
use crate::world::World;

/// Corner distance used for warehouse sites
const WAREHOUSE_CORNER_DISTANCE: u32 = 8;

/// Warehouses stay at least this far from the castle and from each other
const WAREHOUSE_SPACING: u32 = 40;

/// Open-space corners closer than this to the castle are penalized
const CASTLE_CROWDING_DISTANCE: u32 = 9;
const CASTLE_CROWDING_PENALTY: u32 = 20;

/// Percentage of grass tiles around a forester that are still open
pub fn open_grass_percent<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> Option<u32> {
    let mut grass = 0u32;
    let mut open = 0u32;
    for pos in world.geometry().spiral(center, distance) {
        if !world.terrain_at(pos).is_grass() {
            continue;
        }
        grass += 1;
        if world.object_at(pos) == MapObject::None {
            open += 1;
        }
    }
    (grass > 0).then(|| open * 100 / grass)
}

/// Whether the realm is far enough along for another farm
///
/// The first farm is always wanted; a second one only once three mines,
/// a mill and a baker make use of the grain.
pub fn wants_farm(farms: usize, mills: usize, bakers: usize, mines: usize) -> bool {
    farms == 0 || (mines >= 3 && farms == 1 && mills >= 1 && bakers >= 1)
}

/// Open tiles a farm site needs, rising with idle knights that could claim
/// better land
pub fn farm_open_space_required(idle_knights: u32, min: u32, max: u32) -> u32 {
    (min + 2 * idle_knights).min(max)
}

impl<W: World> AiController<W> {
    fn building_near(&self, center: MapPos, distance: u32, kind: BuildingType) -> bool {
        let player = self.player;
        self.world.read(|w| {
            w.geometry()
                .spiral(center, distance)
                .any(|p| w.building_at(p).map_or(false, |b| b.owner == player && b.kind == kind))
        })
    }

    /// Try `kind` near each position in turn until one is placed
    fn build_near_any(&mut self, centers: &[MapPos], distance: u32, kind: BuildingType) -> PlacementResult {
        for center in centers {
            match self.build_near_pos(*center, distance, kind) {
                PlacementResult::NotFound => {}
                result => return result,
            }
        }
        PlacementResult::NotFound
    }

    /// Corners scored by open land, crowding near the castle penalized
    fn open_space_corners(&self) -> Vec<MapPos> {
        let ranked = self.resource_corners(Feature::OpenLand, spiral_dist(4), 0).ranked();
        let is_castle_stock = Some(self.stock.flag) == self.castle_flag;
        let (Some(castle), true) = (self.castle_pos, is_castle_stock) else {
            return ranked.into_iter().map(|c| c.pos).collect();
        };
        let geometry = self.world.read(|w| w.geometry());
        let mut set = CandidateSet::new();
        for candidate in ranked {
            let mut score = candidate.score;
            if geometry.distance(castle, candidate.pos) < CASTLE_CROWDING_DISTANCE {
                score = score.saturating_sub(CASTLE_CROWDING_PENALTY);
            }
            set.insert(candidate.pos, score);
        }
        set.ranked_positions()
    }

    // ========================================================================
    // Wood and stone
    // ========================================================================

    /// Hold the castle stock back until planks can be produced
    pub(crate) fn wait_for_sawmill(&mut self) -> Flow {
        let planks = self.stock.inventory.get(ResourceType::Plank);
        if planks >= self.config.thresholds.planks_min {
            return Flow::Continue;
        }
        let realm = &self.realm.buildings;
        if realm.completed(BuildingType::Sawmill) > 0 && realm.completed(BuildingType::Lumberjack) > 0 {
            return Flow::Continue;
        }
        debug!(planks, "waiting for sawmill and lumberjack");
        Flow::NextStock
    }

    pub(crate) fn build_sawmill_lumberjacks(&mut self) {
        if !self.stock.needs.wood {
            debug!("enough wood");
            return;
        }
        let placed = |ai: &Self, kind| ai.stock.buildings.placed(kind);
        if placed(self, BuildingType::Sawmill) >= 1 && placed(self, BuildingType::Lumberjack) >= 2 {
            return;
        }
        let trees_min = self.config.placement.near_trees_min;
        let mut search = self
            .resource_corners(Feature::Objects(ObjectClass::Trees), spiral_dist(4), trees_min)
            .ranked_positions();

        if placed(self, BuildingType::Sawmill) < 1 {
            match self.build_near_any(&search, spiral_dist(6), BuildingType::Sawmill) {
                PlacementResult::Found(pos) => {
                    info!(pos = %pos, "sawmill placed near trees");
                    // keep lumberjacks close to the sawmill
                    search.insert(0, pos);
                }
                _ => debug!(corners = search.len(), "no sawmill site"),
            }
        }
        if placed(self, BuildingType::Sawmill) == 0 {
            return;
        }

        for center in search {
            for _ in 0..2 {
                if placed(self, BuildingType::Lumberjack) >= 2 {
                    return;
                }
                match self.build_near_pos(center, spiral_dist(4), BuildingType::Lumberjack) {
                    PlacementResult::Found(pos) => info!(pos = %pos, "lumberjack placed"),
                    PlacementResult::StopSearch => return,
                    PlacementResult::NotFound => break,
                }
            }
        }
    }

    pub(crate) fn build_stonecutter(&mut self) {
        if !self.stock.needs.stone || self.stock.buildings.placed(BuildingType::Stonecutter) >= 1 {
            return;
        }
        let stones_min = self.config.placement.near_stones_min;
        let mut centers = self.stock.buildings.occupied_military.clone();
        if centers.is_empty() {
            centers.push(self.stock.flag);
        }
        let first_dir = self.first_dir;
        let corners = self.world.read(|w| {
            let geometry = w.geometry();
            let mut set = CandidateSet::with_minimum(stones_min);
            for center in &centers {
                for corner in get_corners(&geometry, *center, 4, first_dir) {
                    set.insert(corner, count_stones_near_pos(w, corner, spiral_dist(4)));
                }
            }
            set
        });

        for corner in corners.ranked_positions() {
            // each site must itself reach the stones, or the cutter is burned
            // again right after it is built
            let sites: Vec<MapPos> = self.world.read(|w| {
                w.geometry()
                    .spiral(corner, spiral_dist(4))
                    .filter(|p| count_stones_near_pos(w, *p, spiral_dist(4)) >= stones_min)
                    .collect()
            });
            for pos in sites {
                if self.blacklist.contains(pos, SiteKind::Building(BuildingType::Stonecutter)) {
                    continue;
                }
                match self.build_near_pos(pos, 1, BuildingType::Stonecutter) {
                    PlacementResult::Found(at) => {
                        info!(pos = %at, "stonecutter placed");
                        return;
                    }
                    PlacementResult::StopSearch => return,
                    PlacementResult::NotFound => {
                        self.blacklist.insert(pos, SiteKind::Building(BuildingType::Stonecutter));
                    }
                }
            }
        }
    }

    /// Foresters next to lumberjacks that are running out of trees
    pub(crate) fn build_rangers(&mut self) {
        if !self.stock.needs.wood {
            return;
        }
        let trees_min = self.config.placement.near_trees_min;
        for lumberjack in self.stock_buildings_of(BuildingType::Lumberjack) {
            let trees = self
                .world
                .read(|w| count_objects_near_pos(w, lumberjack.pos, spiral_dist(4), ObjectClass::Trees));
            if trees >= trees_min || self.building_near(lumberjack.pos, spiral_dist(8), BuildingType::Forester) {
                continue;
            }
            debug!(lumberjack = %lumberjack.pos, trees, "lumberjack short of trees");
            match self.build_near_pos(lumberjack.pos, spiral_dist(6), BuildingType::Forester) {
                PlacementResult::Found(pos) => info!(pos = %pos, "forester placed"),
                PlacementResult::StopSearch => return,
                PlacementResult::NotFound => {}
            }
        }
    }

    pub(crate) fn build_third_lumberjack(&mut self) {
        if !self.stock.needs.wood || self.stock.buildings.placed(BuildingType::Lumberjack) >= 3 {
            return;
        }
        let trees_min = self.config.placement.near_trees_min;
        let corners = self
            .resource_corners(Feature::Objects(ObjectClass::Trees), spiral_dist(4), trees_min)
            .ranked_positions();
        if let PlacementResult::Found(pos) = self.build_near_any(&corners, spiral_dist(4), BuildingType::Lumberjack) {
            info!(pos = %pos, "third lumberjack placed");
        }
    }

    // ========================================================================
    // Tools and metal
    // ========================================================================

    /// One toolmaker for the realm, and a steel smelter when steel is out
    pub(crate) fn build_toolmaker(&mut self) {
        if self.realm.buildings.placed(BuildingType::ToolMaker) < 1 {
            if self.need_tools {
                let flag = self.stock.flag;
                if let PlacementResult::Found(pos) = self.build_near_pos(flag, spiral_dist(24), BuildingType::ToolMaker)
                {
                    info!(pos = %pos, "toolmaker placed");
                }
            } else {
                debug!("no tools needed, no toolmaker");
            }
        }

        let stock = &self.stock;
        let steel_out = stock.held(ResourceType::Steel) == 0
            && stock.held(ResourceType::IronOre) > 0
            && stock.held(ResourceType::Coal) > 0;
        if stock.buildings.placed(BuildingType::SteelSmelter) < 1 && steel_out {
            self.build_steel_smelter();
        }
    }

    pub(crate) fn build_steel_smelter(&mut self) {
        let t = &self.config.thresholds;
        let steel = self.stock.held(ResourceType::Steel);
        if self.stock.buildings.placed(BuildingType::SteelSmelter) >= 1
            || steel > t.steel_max.saturating_sub(t.anti_flapping_buffer)
        {
            return;
        }
        if self.realm.buildings.occupied(BuildingType::Hut) < 4 {
            debug!("waiting for more huts before a steel smelter");
            return;
        }
        let corners = self.open_space_corners();
        if let PlacementResult::Found(pos) = self.build_near_any(&corners, spiral_dist(6), BuildingType::SteelSmelter) {
            info!(pos = %pos, steel, "steel smelter placed");
        }
    }

    pub(crate) fn build_blacksmith(&mut self) {
        if self.stock.buildings.placed(BuildingType::WeaponSmith) >= 1 {
            return;
        }
        let t = &self.config.thresholds;
        let stock = &self.stock;
        let done = |kind| stock.buildings.completed(kind) > 0;
        let coal = stock.held(ResourceType::Coal) >= t.coal_min || done(BuildingType::CoalMine);
        let iron = stock.held(ResourceType::IronOre) >= t.iron_ore_min
            || (done(BuildingType::IronMine) && done(BuildingType::SteelSmelter));
        let steel = stock.held(ResourceType::Steel) >= t.steel_min;
        if !((coal && iron) || steel) {
            debug!(coal, iron, steel, "not enough metal for a blacksmith");
            return;
        }
        let corners = self.open_space_corners();
        if let PlacementResult::Found(pos) = self.build_near_any(&corners, spiral_dist(6), BuildingType::WeaponSmith) {
            info!(pos = %pos, "blacksmith placed");
        }
    }

    pub(crate) fn build_gold_smelter_and_connect_gold_mines(&mut self) {
        let gold = self.stock.held(ResourceType::GoldOre);
        let buildings = &self.stock.buildings;
        let wanted = gold >= self.config.thresholds.gold_ore_min || buildings.completed(BuildingType::GoldMine) > 0;
        if wanted && buildings.placed(BuildingType::GoldSmelter) < 1 {
            let corners = self.open_space_corners();
            if let PlacementResult::Found(pos) = self.build_near_any(&corners, spiral_dist(6), BuildingType::GoldSmelter)
            {
                info!(pos = %pos, gold, "gold smelter placed");
            }
        }

        // the last miners go to coal and iron first
        let buildings = &self.stock.buildings;
        if self.realm.serfs.available(SerfType::Miner) < 3
            && (buildings.occupied(BuildingType::CoalMine) == 0 || buildings.occupied(BuildingType::IronMine) == 0)
        {
            debug!("saving miners for coal and iron");
            return;
        }
        self.connect_mines(BuildingType::GoldMine);
    }

    // ========================================================================
    // Food
    // ========================================================================

    pub(crate) fn build_food_buildings(&mut self) {
        if !self.stock.needs.food {
            return;
        }
        // keep farms away from the castle early on
        if self.realm.buildings.occupied(BuildingType::Hut) < 2 {
            debug!("waiting for two occupied huts before food");
            return;
        }
        self.build_fisher();

        let here = |kind| self.stock_buildings_of(kind);
        let farms = here(BuildingType::Farm);
        let mills = here(BuildingType::Mill);
        let bakers = here(BuildingType::Baker);
        let mines = [BuildingType::CoalMine, BuildingType::IronMine, BuildingType::GoldMine]
            .into_iter()
            .map(|kind| self.stock.buildings.completed(kind) as usize)
            .sum::<usize>();

        // the mill sits in the middle of the food chain and is the best neighbor
        let anchors: Vec<MapPos> = [mills.last(), farms.last(), bakers.last()]
            .into_iter()
            .flatten()
            .map(|b| b.pos)
            .collect();

        let mut farm_pos = farms.last().map(|b| b.pos);
        if wants_farm(farms.len(), mills.len(), bakers.len(), mines) {
            if let Some(pos) = self.build_farm(&anchors) {
                farm_pos.get_or_insert(pos);
            }
        }

        let Some(farm) = farm_pos else {
            return;
        };
        for kind in [BuildingType::Mill, BuildingType::Baker] {
            if self.stock.buildings.placed(kind) >= 1 {
                continue;
            }
            if let PlacementResult::Found(pos) = self.build_near_pos(farm, spiral_dist(12), kind) {
                info!(kind = %kind, pos = %pos, farm = %farm, "food building placed near farm");
            }
        }
    }

    fn build_fisher(&mut self) {
        let waters_min = self.config.placement.waters_min;
        let corners = self
            .resource_corners(Feature::Terrain(TerrainRange::WATER), spiral_dist(4), waters_min)
            .ranked_positions();
        for corner in corners {
            if self.building_near(corner, spiral_dist(8), BuildingType::Fisher) {
                continue;
            }
            match self.build_near_pos(corner, spiral_dist(4), BuildingType::Fisher) {
                PlacementResult::Found(pos) => {
                    info!(pos = %pos, "fisher placed");
                    return;
                }
                PlacementResult::StopSearch => return,
                PlacementResult::NotFound => {}
            }
        }
    }

    /// Place a farm next to existing food buildings, else on the best open land
    fn build_farm(&mut self, anchors: &[MapPos]) -> Option<MapPos> {
        if !anchors.is_empty() {
            let ranked = self.world.read(|w| {
                let mut set = CandidateSet::new();
                for anchor in anchors {
                    set.insert(*anchor, count_farmable_land(w, *anchor, spiral_dist(4)));
                }
                set.ranked_positions()
            });
            if let PlacementResult::Found(pos) = self.build_near_any(&ranked, spiral_dist(4), BuildingType::Farm) {
                info!(pos = %pos, "farm placed next to food buildings");
                return Some(pos);
            }
        }

        let p = &self.config.placement;
        let required = farm_open_space_required(
            self.realm.serfs.idle_knights(),
            p.farm_open_space_min,
            p.farm_open_space_max,
        );
        // the stock itself is tried last so the first farm lands out by a hut
        let mut centers: Vec<MapPos> = self.stock.buildings.occupied_military.iter().skip(1).copied().collect();
        centers.push(self.stock.flag);
        let corners = self
            .corners_around(&centers, Feature::FarmableLand, spiral_dist(4), required)
            .ranked_positions();
        match self.build_near_any(&corners, spiral_dist(4), BuildingType::Farm) {
            PlacementResult::Found(pos) => {
                info!(pos = %pos, required, "farm placed on open land");
                Some(pos)
            }
            _ => {
                debug!(required, corners = corners.len(), "no farm site");
                None
            }
        }
    }

    // ========================================================================
    // Warehouses
    // ========================================================================

    pub(crate) fn build_warehouse(&mut self) {
        let realm = &self.realm.buildings;
        let placed = realm.placed(BuildingType::Stock);
        if placed > realm.completed(BuildingType::Stock) {
            debug!("previous warehouse still under construction");
            return;
        }
        let t = &self.config.thresholds;
        let planks = self.realm.resources.get(ResourceType::Plank);
        let stones = self.realm.resources.get(ResourceType::Stone);
        if planks < t.planks_min + 4 * placed || stones < t.stones_min + 2 * placed {
            debug!(planks, stones, warehouses = placed, "not enough material for a warehouse");
            return;
        }
        let Some(castle) = self.castle_pos else {
            return;
        };

        let geometry = self.world.read(|w| w.geometry());
        let stocks: Vec<MapPos> = self
            .realm_buildings_of(BuildingType::Stock)
            .into_iter()
            .map(|b| b.pos)
            .collect();
        let first_dir = self.first_dir;
        for center in self.realm.buildings.occupied_military.clone() {
            for corner in get_corners(&geometry, center, WAREHOUSE_CORNER_DISTANCE, first_dir) {
                if geometry.distance(corner, castle) <= WAREHOUSE_SPACING {
                    continue;
                }
                if stocks.iter().any(|s| geometry.distance(*s, corner) <= WAREHOUSE_SPACING) {
                    continue;
                }
                match self.build_near_pos(corner, spiral_dist(5), BuildingType::Stock) {
                    PlacementResult::Found(pos) => {
                        info!(player = self.player, pos = %pos, "warehouse placed");
                        return;
                    }
                    PlacementResult::StopSearch => return,
                    PlacementResult::NotFound => {}
                }
            }
        }
    }

    // ========================================================================
    // Demolition
    // ========================================================================

    fn burn(&self, pos: MapPos, kind: BuildingType, reason: &str) -> bool {
        let player = self.player;
        let removed = self.world.write(|w| w.demolish_building(pos, player));
        if removed {
            info!(player, kind = %kind, pos = %pos, reason, "burned building");
            self.pause(self.config.timing.action_pause_ms);
        }
        removed
    }

    /// Burn a lumberjack crowded around a sawmill whose forester cannot keep up
    pub(crate) fn demolish_unproductive_lumberjacks(&mut self) {
        let player = self.player;
        let trees_min = self.config.placement.near_trees_min;
        for sawmill in self.realm_buildings_of(BuildingType::Sawmill) {
            let victim = self.world.read(|w| {
                let geometry = w.geometry();
                let lumberjacks: Vec<MapPos> = geometry
                    .spiral(sawmill.pos, spiral_dist(8))
                    .filter(|p| {
                        w.building_at(*p)
                            .map_or(false, |b| b.owner == player && b.kind == BuildingType::Lumberjack)
                    })
                    .collect();
                if lumberjacks.len() < 3 {
                    return None;
                }
                lumberjacks.into_iter().find(|lj| {
                    let ranger = geometry.spiral(*lj, spiral_dist(6)).any(|p| {
                        w.building_at(p).map_or(false, |b| {
                            b.owner == player && b.kind == BuildingType::Forester && b.done
                        })
                    });
                    ranger && count_objects_near_pos(w, *lj, spiral_dist(6), ObjectClass::Trees) < trees_min
                })
            });
            if let Some(pos) = victim {
                self.burn(pos, BuildingType::Lumberjack, "no trees despite forester");
            }
        }
    }

    pub(crate) fn demolish_unproductive_stonecutters(&mut self) {
        for cutter in self.realm_buildings_of(BuildingType::Stonecutter) {
            let stones = self
                .world
                .read(|w| count_stones_near_pos(w, cutter.pos, spiral_dist(4)));
            if stones > 0 {
                continue;
            }
            if self.burn(cutter.pos, cutter.kind, "no stones left") {
                // stone piles do not grow back
                self.blacklist.insert(cutter.pos, SiteKind::Building(cutter.kind));
            }
        }
    }

    /// Keep one working lumberjack once wood is plentiful
    pub(crate) fn demolish_excess_lumberjacks(&mut self) {
        if self.stock.needs.wood || self.stock.buildings.placed(BuildingType::Lumberjack) <= 1 {
            return;
        }
        let mut kept = false;
        for lumberjack in self.stock_buildings_of(BuildingType::Lumberjack) {
            if !kept && lumberjack.done && lumberjack.occupied {
                debug!(pos = %lumberjack.pos, "keeping lumberjack");
                kept = true;
                continue;
            }
            self.burn(lumberjack.pos, lumberjack.kind, "wood is plentiful");
        }
    }

    /// Burn foresters that have planted their area full once wood is plentiful
    pub(crate) fn demolish_excess_foresters(&mut self) {
        if self.stock.needs.wood {
            return;
        }
        let open_min = self.config.placement.forester_open_pct_min;
        for forester in self.stock_buildings_of(BuildingType::Forester) {
            let open = self
                .world
                .read(|w| open_grass_percent(w, forester.pos, spiral_dist(4)));
            if open.map_or(false, |pct| pct > open_min) {
                continue;
            }
            self.burn(forester.pos, forester.kind, "area planted full");
        }
    }

    /// Burn one raw food producer per run while the larder is over full
    pub(crate) fn demolish_excess_food_buildings(&mut self) {
        let t = &self.config.thresholds;
        let food = adjusted_food(&self.stock.inventory, &self.stock.at_flags, t.food_max);
        if !Hysteresis::new(t.food_max, t.anti_flapping_buffer).exceeded(food) {
            return;
        }
        let producers = [BuildingType::Fisher, BuildingType::Farm, BuildingType::PigFarm];
        let victim = producers
            .into_iter()
            .flat_map(|kind| self.stock_buildings_of(kind))
            .next();
        if let Some(building) = victim {
            info!(food, food_max = t.food_max, "food over limit");
            self.burn(building.pos, building.kind, "food is plentiful");
        }
    }
}
