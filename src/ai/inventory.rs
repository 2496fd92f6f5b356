//! Per-cycle snapshot of a realm
//!
//! Architecture: collect once, decide many times
//! - Stocks are the completed inventories, castle first
//! - Every building and every flag belongs to the stock nearest to its flag
//! - `ResourceNeeds` turns counts into needs and expansion goals

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::{PlacementConfig, ThresholdConfig};
use crate::core::types::{BuildingType, PlayerIndex, ResourceType, SerfState, SerfType};
use crate::placement::{ExpansionGoal, ExpansionGoals};
use crate::spatial::{MapGeometry, MapPos};
use crate::world::{BuildingInfo, ResourceCounts, SerfInfo, World};

// ============================================================================
// Buildings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingCount {
    pub placed: u32,
    pub completed: u32,
    pub occupied: u32,
    pub connected: u32,
}

/// Building counts of a stock zone or a whole realm
#[derive(Debug, Clone, Default)]
pub struct BuildingTally {
    counts: AHashMap<BuildingType, BuildingCount>,
    /// Construction sites other than huts
    pub unfinished: u32,
    pub unfinished_huts: u32,
    /// Finished and staffed military buildings, castle included
    pub occupied_military: Vec<MapPos>,
}

impl BuildingTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: BuildingType) -> BuildingCount {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn placed(&self, kind: BuildingType) -> u32 {
        self.count(kind).placed
    }

    pub fn completed(&self, kind: BuildingType) -> u32 {
        self.count(kind).completed
    }

    pub fn occupied(&self, kind: BuildingType) -> u32 {
        self.count(kind).occupied
    }

    pub fn connected(&self, kind: BuildingType) -> u32 {
        self.count(kind).connected
    }

    pub fn record(&mut self, info: &BuildingInfo, connected: bool) {
        let count = self.counts.entry(info.kind).or_default();
        count.placed += 1;
        if info.done {
            count.completed += 1;
        } else if info.kind == BuildingType::Hut {
            self.unfinished_huts += 1;
        } else {
            self.unfinished += 1;
        }
        if info.occupied {
            count.occupied += 1;
        }
        if connected {
            count.connected += 1;
        }
        if info.done && info.occupied && info.kind.is_military() {
            self.occupied_military.push(info.pos);
        }
    }

    /// Account for a construction site placed during this cycle
    pub fn note_placed(&mut self, kind: BuildingType) {
        self.counts.entry(kind).or_default().placed += 1;
        if kind == BuildingType::Hut {
            self.unfinished_huts += 1;
        } else {
            self.unfinished += 1;
        }
    }
}

/// Flags of all finished inventories, castle first
pub fn find_stocks<W: World + ?Sized>(world: &W, player: PlayerIndex) -> Vec<MapPos> {
    let geometry = world.geometry();
    let mut stocks: Vec<(bool, MapPos)> = world
        .player_buildings(player)
        .into_iter()
        .filter(|b| b.kind.is_inventory() && b.done && !b.burning)
        .map(|b| (b.kind != BuildingType::Castle, geometry.flag_of_building(b.pos)))
        .collect();
    stocks.sort();
    stocks.into_iter().map(|(_, flag)| flag).collect()
}

/// Stock closest to `pos` in a straight line; ties go to the earlier stock
pub fn nearest_stock(geometry: &MapGeometry, stocks: &[MapPos], pos: MapPos) -> Option<MapPos> {
    stocks
        .iter()
        .enumerate()
        .min_by_key(|(i, stock)| (geometry.distance(pos, **stock), *i))
        .map(|(_, stock)| *stock)
}

/// Realm-wide tally plus one tally per stock
pub fn tally_buildings<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    stocks: &[MapPos],
) -> (BuildingTally, AHashMap<MapPos, BuildingTally>) {
    let geometry = world.geometry();
    let mut realm = BuildingTally::new();
    let mut per_stock: AHashMap<MapPos, BuildingTally> =
        stocks.iter().map(|s| (*s, BuildingTally::new())).collect();

    let mut buildings = world.player_buildings(player);
    buildings.sort_by_key(|b| b.pos);
    for info in &buildings {
        let flag = geometry.flag_of_building(info.pos);
        let connected = world.is_connected(flag);
        realm.record(info, connected);
        if let Some(stock) = nearest_stock(&geometry, stocks, flag) {
            per_stock.entry(stock).or_default().record(info, connected);
        }
    }
    (realm, per_stock)
}

/// Resources waiting on connected flags, keyed by the stock they belong to
pub fn resources_at_flags<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    stocks: &[MapPos],
) -> AHashMap<MapPos, ResourceCounts> {
    let geometry = world.geometry();
    let mut by_stock: AHashMap<MapPos, ResourceCounts> = AHashMap::new();
    for flag in world.flags() {
        if flag.owner != player || !flag.connected || flag.resources.is_empty() {
            continue;
        }
        let Some(stock) = nearest_stock(&geometry, stocks, flag.pos) else {
            continue;
        };
        let counts = by_stock.entry(stock).or_default();
        for resource in &flag.resources {
            counts.add(*resource, 1);
        }
    }
    by_stock
}

// ============================================================================
// Serfs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SerfCounts {
    idle: AHashMap<SerfType, u32>,
    total: AHashMap<SerfType, u32>,
    /// Generic serfs that could take up a profession with the tools at hand
    potential: AHashMap<SerfType, u32>,
}

impl SerfCounts {
    pub fn collect(serfs: &[SerfInfo], resources: &ResourceCounts) -> Self {
        let mut counts = Self::default();
        for serf in serfs {
            *counts.total.entry(serf.kind).or_default() += 1;
            if serf.state == SerfState::IdleInStock {
                *counts.idle.entry(serf.kind).or_default() += 1;
            }
        }
        let generic = counts.idle(SerfType::Generic);
        for profession in SerfType::PROFESSIONS {
            let potential = match profession.tool() {
                Some(tool) => generic.min(resources.get(tool)),
                None => generic,
            };
            counts.potential.insert(profession, potential);
        }
        counts
    }

    pub fn idle(&self, kind: SerfType) -> u32 {
        self.idle.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self, kind: SerfType) -> u32 {
        self.total.get(&kind).copied().unwrap_or(0)
    }

    pub fn potential(&self, kind: SerfType) -> u32 {
        self.potential.get(&kind).copied().unwrap_or(0)
    }

    /// Idle serfs of a profession plus generics that could become one
    pub fn available(&self, kind: SerfType) -> u32 {
        self.idle(kind) + self.potential(kind)
    }

    pub fn idle_knights(&self) -> u32 {
        self.idle.iter().filter(|(k, _)| k.is_knight()).map(|(_, n)| *n).sum()
    }

    pub fn total_knights(&self) -> u32 {
        self.total.iter().filter(|(k, _)| k.is_knight()).map(|(_, n)| *n).sum()
    }
}

// ============================================================================
// Needs
// ============================================================================

/// Threshold with an anti-flapping margin on top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hysteresis {
    pub threshold: u32,
    pub buffer: u32,
}

impl Hysteresis {
    pub fn new(threshold: u32, buffer: u32) -> Self {
        Self { threshold, buffer }
    }

    /// The quantity has cleared threshold plus buffer
    pub fn exceeded(&self, quantity: u32) -> bool {
        quantity >= self.threshold.saturating_add(self.buffer)
    }
}

/// Food in store plus a bounded credit for food on its way
///
/// Raw inputs and food still on flags count, but each is capped near half
/// of `food_max` so a pile of wheat alone never looks like a full larder.
pub fn adjusted_food(inventory: &ResourceCounts, at_flags: &ResourceCounts, food_max: u32) -> u32 {
    let half = (food_max + 1) / 2;
    let stored = inventory.sum(&ResourceType::FOODS);
    let inputs = (inventory.sum(&ResourceType::FOOD_INPUTS) + at_flags.sum(&ResourceType::FOOD_INPUTS)).min(half);
    let on_flags = at_flags.sum(&ResourceType::FOODS).min(half);
    let extra = (inputs + on_flags).min(((food_max + 1) / 3) * 2);
    stored + extra
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNeeds {
    pub wood: bool,
    pub stone: bool,
    pub food: bool,
    pub coal: bool,
    pub iron_ore: bool,
    pub gold_ore: bool,
}

impl ResourceNeeds {
    /// Work out what a stock is short of and which way to expand for it
    pub fn check(
        inventory: &ResourceCounts,
        at_flags: &ResourceCounts,
        realm: &BuildingTally,
        thresholds: &ThresholdConfig,
        placement: &PlacementConfig,
    ) -> (Self, ExpansionGoals) {
        let t = thresholds;
        let held = |r: ResourceType| inventory.get(r) + at_flags.get(r);
        let mut goals = ExpansionGoals::new();

        let planks = held(ResourceType::Plank);
        let mut wood = planks;
        if planks >= t.planks_min && realm.connected(BuildingType::Sawmill) > 0 {
            wood += held(ResourceType::Lumber);
        }
        let needs_wood = !Hysteresis::new(t.planks_max, t.anti_flapping_buffer).exceeded(wood);
        if needs_wood {
            goals.insert(ExpansionGoal::Trees);
        }

        let needs_stone = held(ResourceType::Stone) < t.stones_max;
        if needs_stone {
            goals.insert(ExpansionGoal::Stones);
        }

        let needs_food = adjusted_food(inventory, at_flags, t.food_max) < t.food_max;
        if needs_food {
            goals.insert(ExpansionGoal::Foods);
        }

        let needs_coal = held(ResourceType::Coal) < t.coal_max;
        if needs_coal && realm.placed(BuildingType::CoalMine) < placement.max_coalmines {
            goals.insert(ExpansionGoal::Hills);
            goals.insert(ExpansionGoal::Coal);
        }

        let needs_iron = held(ResourceType::Steel) < t.steel_max && held(ResourceType::IronOre) < t.iron_ore_max;
        if needs_iron && realm.placed(BuildingType::IronMine) < placement.max_ironmines {
            goals.insert(ExpansionGoal::Hills);
            goals.insert(ExpansionGoal::IronOre);
        }

        let needs_gold = held(ResourceType::GoldOre) < t.gold_ore_max;
        if needs_gold && realm.placed(BuildingType::GoldMine) < placement.max_goldmines {
            goals.insert(ExpansionGoal::Hills);
            goals.insert(ExpansionGoal::GoldOre);
        }

        let needs = Self {
            wood: needs_wood,
            stone: needs_stone,
            food: needs_food,
            coal: needs_coal,
            iron_ore: needs_iron,
            gold_ore: needs_gold,
        };
        (needs, goals)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// The stock the per-stock tasks are currently working for
#[derive(Debug, Clone)]
pub struct StockState {
    pub flag: MapPos,
    pub buildings: BuildingTally,
    pub inventory: ResourceCounts,
    pub at_flags: ResourceCounts,
    pub needs: ResourceNeeds,
}

impl StockState {
    pub fn new(flag: MapPos) -> Self {
        Self {
            flag,
            buildings: BuildingTally::new(),
            inventory: ResourceCounts::new(),
            at_flags: ResourceCounts::new(),
            needs: ResourceNeeds::default(),
        }
    }

    /// Resources in the stock plus those waiting on its flags
    pub fn held(&self, resource: ResourceType) -> u32 {
        self.inventory.get(resource) + self.at_flags.get(resource)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RealmState {
    pub buildings: BuildingTally,
    pub resources: ResourceCounts,
    pub serfs: SerfCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SimWorld;

    fn info(pos: u32, kind: BuildingType, done: bool, occupied: bool) -> BuildingInfo {
        BuildingInfo {
            pos: MapPos(pos),
            owner: 0,
            kind,
            done,
            occupied,
            active: occupied,
            burning: false,
            progress: 0,
            knights: 0,
        }
    }

    #[test]
    fn test_tally_separates_huts_from_other_sites() {
        let mut tally = BuildingTally::new();
        tally.record(&info(1, BuildingType::Hut, false, false), false);
        tally.record(&info(2, BuildingType::Sawmill, false, false), true);
        tally.record(&info(3, BuildingType::Hut, true, true), true);
        tally.record(&info(4, BuildingType::Castle, true, true), true);
        assert_eq!(tally.unfinished_huts, 1);
        assert_eq!(tally.unfinished, 1);
        assert_eq!(tally.placed(BuildingType::Hut), 2);
        assert_eq!(tally.completed(BuildingType::Hut), 1);
        assert_eq!(tally.connected(BuildingType::Sawmill), 1);
        assert_eq!(tally.occupied_military, vec![MapPos(3), MapPos(4)]);

        tally.note_placed(BuildingType::Lumberjack);
        assert_eq!(tally.unfinished, 2);
        assert_eq!(tally.placed(BuildingType::Lumberjack), 1);
    }

    #[test]
    fn test_stocks_put_castle_first() {
        let geom = MapGeometry::new(64, 64);
        let mut world = SimWorld::new(geom);
        world.place_building(geom.pos(5, 5), BuildingType::Stock, 0, true, true);
        world.place_building(geom.pos(30, 30), BuildingType::Castle, 0, true, true);
        world.place_building(geom.pos(50, 10), BuildingType::Stock, 0, false, false);
        let stocks = find_stocks(&world, 0);
        assert_eq!(
            stocks,
            vec![geom.flag_of_building(geom.pos(30, 30)), geom.flag_of_building(geom.pos(5, 5))]
        );
    }

    #[test]
    fn test_buildings_go_to_nearest_stock() {
        let geom = MapGeometry::new(64, 64);
        let mut world = SimWorld::new(geom);
        world.place_building(geom.pos(10, 10), BuildingType::Castle, 0, true, true);
        world.place_building(geom.pos(40, 40), BuildingType::Stock, 0, true, true);
        world.place_building(geom.pos(14, 10), BuildingType::Lumberjack, 0, true, true);
        world.place_building(geom.pos(38, 40), BuildingType::Farm, 0, false, false);
        let stocks = find_stocks(&world, 0);
        let (realm, per_stock) = tally_buildings(&world, 0, &stocks);

        assert_eq!(realm.placed(BuildingType::Lumberjack), 1);
        assert_eq!(realm.unfinished, 1);
        assert_eq!(per_stock[&stocks[0]].placed(BuildingType::Lumberjack), 1);
        assert_eq!(per_stock[&stocks[0]].placed(BuildingType::Farm), 0);
        assert_eq!(per_stock[&stocks[1]].placed(BuildingType::Farm), 1);
    }

    #[test]
    fn test_potential_serfs_are_capped_by_tools() {
        let serfs: Vec<SerfInfo> = (0..4)
            .map(|i| SerfInfo {
                index: i,
                owner: 0,
                kind: SerfType::Generic,
                state: SerfState::IdleInStock,
                pos: MapPos(0),
            })
            .collect();
        let tools: ResourceCounts = [(ResourceType::Axe, 1)].into_iter().collect();
        let counts = SerfCounts::collect(&serfs, &tools);
        assert_eq!(counts.potential(SerfType::Lumberjack), 1);
        assert_eq!(counts.potential(SerfType::Miner), 0);
        assert_eq!(counts.potential(SerfType::Baker), 4);
        assert_eq!(counts.idle(SerfType::Generic), 4);
        assert_eq!(counts.idle_knights(), 0);
    }

    #[test]
    fn test_hysteresis_fires_at_threshold_plus_buffer() {
        let gate = Hysteresis::new(40, 6);
        assert!(!gate.exceeded(45));
        assert!(gate.exceeded(46));
        assert!(gate.exceeded(47));
    }

    #[test]
    fn test_adjusted_food_caps_inputs() {
        let inventory: ResourceCounts = [(ResourceType::Bread, 10), (ResourceType::Wheat, 100)]
            .into_iter()
            .collect();
        let none = ResourceCounts::new();
        // inputs capped at half of food_max + 1
        assert_eq!(adjusted_food(&inventory, &none, 35), 10 + 18);

        let on_flags: ResourceCounts = [(ResourceType::Fish, 30)].into_iter().collect();
        // both credits together capped at two thirds
        assert_eq!(adjusted_food(&inventory, &on_flags, 35), 10 + 24);
    }

    #[test]
    fn test_wood_need_uses_buffer() {
        let thresholds = ThresholdConfig::default();
        let placement = PlacementConfig::default();
        let realm = BuildingTally::new();
        let none = ResourceCounts::new();

        let short: ResourceCounts = [(ResourceType::Plank, 45)].into_iter().collect();
        let (needs, goals) = ResourceNeeds::check(&short, &none, &realm, &thresholds, &placement);
        assert!(needs.wood);
        assert!(goals.contains(ExpansionGoal::Trees));

        let plenty: ResourceCounts = [(ResourceType::Plank, 46)].into_iter().collect();
        let (needs, goals) = ResourceNeeds::check(&plenty, &none, &realm, &thresholds, &placement);
        assert!(!needs.wood);
        assert!(!goals.contains(ExpansionGoal::Trees));
        assert!(needs.coal);
        assert!(goals.contains(ExpansionGoal::Coal));
    }
}
