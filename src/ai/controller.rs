//! AI Controller - one long-lived decision loop per player
//!
//! Runs the task table against a shared world. Every world access goes
//! through `SharedWorld`, one logical operation per lock acquisition, so
//! several controllers and the simulation can share the same world.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, debug_span, info, warn};

use crate::ai::blacklist::Blacklist;
use crate::ai::inventory::{
    find_stocks, resources_at_flags, tally_buildings, BuildingTally, RealmState, ResourceNeeds,
    SerfCounts, StockState,
};
use crate::ai::knights::OccupationState;
use crate::ai::tasks::{Flow, Gate, Scope, TaskId, TaskSpec, FINAL_TASKS, REALM_TASKS, STOCK_TASKS};
use crate::ai::timers::Timers;
use crate::core::config::AiConfig;
use crate::core::error::{AiError, Result};
use crate::core::types::{BuildingType, PlayerIndex, ResourceType, Tick};
use crate::placement::{ExpansionGoal, ExpansionGoals};
use crate::road::{RoadBuilder, RoadOptions};
use crate::spatial::{spiral_dist, Direction, MapPos};
use crate::world::{ResourceCounts, SharedWorld, World};

pub const STATUS_INITIALIZING: &str = "INITIALIZING";
pub const STATUS_PAUSED: &str = "AI_PAUSED";
pub const STATUS_LOCKED: &str = "LOCKED";
pub const STATUS_END_OF_LOOP: &str = "END OF LOOP";

/// Poll interval while the game is paused or the AI is locked out
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Cooperative stop signal, checked once per outer loop iteration
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Human-readable status, readable from any thread
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<Mutex<String>>);

impl StatusHandle {
    pub fn set(&self, status: &str) {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clear();
        guard.push_str(status);
    }

    pub fn get(&self) -> String {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// A controller running on its own thread
pub struct AiHandle {
    pub stop: StopHandle,
    pub status: StatusHandle,
    pub join: JoinHandle<Result<()>>,
}

impl AiHandle {
    /// Ask the controller to stop and wait for it
    pub fn stop_and_join(self) -> Result<()> {
        self.stop.stop();
        self.join()
    }

    pub fn join(self) -> Result<()> {
        self.join
            .join()
            .map_err(|_| AiError::ThreadError("AI thread panicked".into()))?
    }
}

/// Decision loop for one player
pub struct AiController<W: World> {
    pub(crate) world: SharedWorld<W>,
    pub(crate) player: PlayerIndex,
    pub(crate) config: AiConfig,
    pub(crate) rng: ChaCha8Rng,
    stop: StopHandle,
    status: StatusHandle,

    pub(crate) loop_count: u64,
    pub(crate) castle_pos: Option<MapPos>,
    pub(crate) castle_flag: Option<MapPos>,
    pub(crate) has_inventory: bool,
    /// Direction corner searches start from; re-rolled every cycle
    pub(crate) first_dir: Direction,
    pub(crate) road_options: RoadOptions,
    pub(crate) goals: ExpansionGoals,

    pub(crate) stocks: Vec<MapPos>,
    known_stocks: AHashSet<MapPos>,
    /// Stocks first seen this cycle
    pub(crate) new_stocks: AHashSet<MapPos>,
    stock_buildings: AHashMap<MapPos, BuildingTally>,
    flag_resources: AHashMap<MapPos, ResourceCounts>,
    pub(crate) stock: StockState,
    pub(crate) realm: RealmState,

    pub(crate) cannot_expand: bool,
    pub(crate) need_tools: bool,
    pub(crate) last_geologist_tick: Option<Tick>,
    pub(crate) occupation: OccupationState,
    /// Mines seen done and active, with the tick they were first seen
    pub(crate) active_mines: AHashMap<MapPos, Tick>,
    pub(crate) stuck_serfs: Timers<u32>,
    pub(crate) missing_transporters: Timers<(MapPos, Direction)>,
    pub(crate) blacklist: Blacklist,
}

impl<W: World> AiController<W> {
    /// Create a controller with a seed derived from the player index
    pub fn new(world: SharedWorld<W>, player: PlayerIndex, config: AiConfig) -> Self {
        Self::with_seed(world, player, config, 0x5e7f_0000 + player as u64)
    }

    /// Create with specific RNG seed for deterministic behavior
    pub fn with_seed(world: SharedWorld<W>, player: PlayerIndex, config: AiConfig, seed: u64) -> Self {
        let status = StatusHandle::default();
        status.set(STATUS_INITIALIZING);
        Self {
            world,
            player,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stop: StopHandle::default(),
            status,
            loop_count: 0,
            castle_pos: None,
            castle_flag: None,
            has_inventory: false,
            first_dir: Direction::Right,
            road_options: RoadOptions::default(),
            goals: ExpansionGoals::new(),
            stocks: Vec::new(),
            known_stocks: AHashSet::new(),
            new_stocks: AHashSet::new(),
            stock_buildings: AHashMap::new(),
            flag_resources: AHashMap::new(),
            stock: StockState::new(MapPos(0)),
            realm: RealmState::default(),
            cannot_expand: false,
            need_tools: false,
            last_geologist_tick: None,
            occupation: OccupationState::default(),
            active_mines: AHashMap::new(),
            stuck_serfs: Timers::new(),
            missing_transporters: Timers::new(),
            blacklist: Blacklist::new(),
        }
    }

    pub fn player(&self) -> PlayerIndex {
        self.player
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    pub fn castle_flag(&self) -> Option<MapPos> {
        self.castle_flag
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Run until stopped
    ///
    /// The only error is a failed castle search, which ends this player's AI.
    pub fn run(&mut self) -> Result<()> {
        info!(player = self.player, profile = %self.config.name, "AI started");
        while !self.stop.is_stopped() {
            let (speed, locked) = self
                .world
                .read(|w| (w.game_speed(), w.is_locked(self.player)));
            if speed == 0 {
                self.status.set(STATUS_PAUSED);
                thread::sleep(IDLE_POLL);
                continue;
            }
            if locked {
                self.status.set(STATUS_LOCKED);
                thread::sleep(IDLE_POLL);
                continue;
            }
            self.next_loop()?;
        }
        info!(player = self.player, loops = self.loop_count, "AI stopped");
        Ok(())
    }

    /// Run exactly `cycles` cycles, ignoring pause and lock signals
    pub fn run_cycles(&mut self, cycles: u64) -> Result<()> {
        for _ in 0..cycles {
            if self.stop.is_stopped() {
                break;
            }
            self.next_loop()?;
        }
        Ok(())
    }

    /// One full pass over the task table
    pub fn next_loop(&mut self) -> Result<()> {
        self.loop_count += 1;
        let started = Instant::now();

        if self.run_table(REALM_TASKS)? == Flow::EndCycle {
            self.finish_loop(started);
            return Ok(());
        }

        for flag in self.stocks.clone() {
            self.enter_stock(flag);
            if self.run_table(STOCK_TASKS)? == Flow::EndCycle {
                self.finish_loop(started);
                return Ok(());
            }
        }

        if let Some(castle) = self.castle_flag {
            self.enter_stock(castle);
        }
        self.run_table(FINAL_TASKS)?;
        self.finish_loop(started);
        Ok(())
    }

    fn finish_loop(&mut self, started: Instant) {
        self.status.set(STATUS_END_OF_LOOP);
        debug!(
            player = self.player,
            loop_count = self.loop_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle finished"
        );
        self.pause(self.config.timing.loop_sleep_ms);
    }

    fn run_table(&mut self, table: &[TaskSpec]) -> Result<Flow> {
        for spec in table {
            if !self.is_due(spec) {
                continue;
            }
            match self.run_task(spec)? {
                Flow::Continue => {}
                Flow::NextStock => return Ok(Flow::NextStock),
                Flow::EndCycle => return Ok(Flow::EndCycle),
            }
        }
        Ok(Flow::Continue)
    }

    fn is_due(&self, spec: &TaskSpec) -> bool {
        let realm = &self.realm.buildings;
        let stocks = self.stocks.len();
        let scheduled = spec
            .recurrence
            .iter()
            .all(|r| r.holds(self.loop_count, stocks, |kind| realm.completed(kind)));
        scheduled && spec.gate.map_or(true, |gate| self.gate_open(gate))
    }

    fn gate_open(&self, gate: Gate) -> bool {
        let is_castle = Some(self.stock.flag) == self.castle_flag;
        match gate {
            Gate::CastleStock => is_castle,
            Gate::OtherStock => !is_castle,
            Gate::CanBuildOther => self.can_build_other(),
            Gate::CanBuildHuts => self.can_build_huts(),
        }
    }

    pub(crate) fn can_build_other(&self) -> bool {
        let t = &self.config.thresholds;
        self.realm.resources.get(ResourceType::Plank) >= t.planks_min
            && self.stock.buildings.unfinished < self.config.placement.max_unfinished_buildings
    }

    pub(crate) fn can_build_huts(&self) -> bool {
        let t = &self.config.thresholds;
        if self.realm.resources.get(ResourceType::Plank) < t.planks_min {
            return false;
        }
        if self.realm.buildings.completed(BuildingType::Hut) >= 3
            && self.realm.serfs.idle_knights() < self.config.knights.knights_min
        {
            return false;
        }
        self.stock.buildings.unfinished_huts < self.config.placement.max_unfinished_huts
    }

    fn run_task(&mut self, spec: &TaskSpec) -> Result<Flow> {
        let name = spec.id.name();
        self.status.set(&name);
        let stock = match spec.scope {
            Scope::Realm => None,
            Scope::Stock => Some(self.stock.flag),
        };
        let span = debug_span!("task", name = %name, player = self.player, stock = ?stock);
        let _enter = span.enter();
        let started = Instant::now();

        let flow = self.dispatch(spec.id, spec.scope)?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            flow = ?flow,
            "task finished"
        );
        Ok(flow)
    }

    fn dispatch(&mut self, id: TaskId, scope: Scope) -> Result<Flow> {
        let done = Flow::Continue;
        let flow = match id {
            TaskId::PlaceCastle => return self.place_castle(),
            TaskId::ConsiderCapitulation => self.consider_capitulation(),
            TaskId::UpdateClearReset => {
                self.update_clear_reset();
                done
            }
            TaskId::UpdateStocks => {
                self.update_stocks();
                done
            }
            TaskId::UpdateBuildings => {
                self.update_buildings(scope);
                done
            }
            TaskId::GetInventory => {
                self.get_inventory(scope);
                done
            }
            TaskId::GetSerfs => {
                self.get_serfs();
                done
            }
            TaskId::ConnectDisconnectedFlags => {
                self.connect_disconnected_flags();
                done
            }
            TaskId::ConnectDisconnectedRoadNetworks => {
                self.connect_disconnected_road_networks();
                done
            }
            TaskId::BuildBetterRoads => {
                self.build_better_roads();
                done
            }
            TaskId::PolluteCastleAreaRoads => {
                self.pollute_castle_area_roads();
                done
            }
            TaskId::FixStuckSerfs => {
                self.fix_stuck_serfs();
                done
            }
            TaskId::FixMissingTransporters => {
                self.fix_missing_transporters();
                done
            }
            TaskId::RemoveRoadStubs => {
                self.remove_road_stubs();
                done
            }
            TaskId::DemolishUnproductiveLumberjacks => {
                self.demolish_unproductive_lumberjacks();
                done
            }
            TaskId::DemolishUnproductiveStonecutters => {
                self.demolish_unproductive_stonecutters();
                done
            }
            TaskId::DemolishUnproductiveMines => {
                self.demolish_unproductive_mines();
                done
            }
            TaskId::ManageToolPriorities => {
                self.manage_tool_priorities();
                done
            }
            TaskId::ManageMineFoodPriorities => {
                self.manage_mine_food_priorities();
                done
            }
            TaskId::BalanceSwordShieldPriorities => {
                self.balance_sword_shield_priorities();
                done
            }
            TaskId::Attack => {
                self.attack();
                done
            }
            TaskId::ManageKnightOccupation => {
                self.manage_knight_occupation();
                done
            }
            TaskId::PromoteSerfs => {
                self.promote_serfs_to_knights();
                done
            }
            TaskId::CountResourcesAtFlags => {
                self.count_resources_at_flags();
                done
            }
            TaskId::CheckResourceNeeds => {
                self.check_resource_needs();
                done
            }
            TaskId::CreateStarRoads => {
                self.create_star_roads();
                done
            }
            TaskId::BuildSawmillLumberjacks => {
                self.build_sawmill_lumberjacks();
                done
            }
            TaskId::ExpandBorders => {
                self.expand_borders();
                done
            }
            TaskId::PlaceCoalMines => {
                self.place_mines(BuildingType::CoalMine);
                done
            }
            TaskId::PlaceIronMines => {
                self.place_mines(BuildingType::IronMine);
                done
            }
            TaskId::PlaceGoldMines => {
                self.place_mines(BuildingType::GoldMine);
                done
            }
            TaskId::WaitForSawmill => self.wait_for_sawmill(),
            TaskId::BuildStonecutter => {
                self.build_stonecutter();
                done
            }
            TaskId::BuildRangers => {
                self.build_rangers();
                done
            }
            TaskId::BuildToolmaker => {
                self.build_toolmaker();
                done
            }
            TaskId::BuildFood => {
                self.build_food_buildings();
                done
            }
            TaskId::BuildThirdLumberjack => {
                self.build_third_lumberjack();
                done
            }
            TaskId::ConnectCoalMines => {
                self.connect_mines(BuildingType::CoalMine);
                done
            }
            TaskId::ConnectIronMines => {
                self.connect_mines(BuildingType::IronMine);
                done
            }
            TaskId::BuildSteelSmelter => {
                self.build_steel_smelter();
                done
            }
            TaskId::BuildBlacksmith => {
                self.build_blacksmith();
                done
            }
            TaskId::BuildGoldSmelter => {
                self.build_gold_smelter_and_connect_gold_mines();
                done
            }
            TaskId::DemolishExcessLumberjacks => {
                self.demolish_excess_lumberjacks();
                done
            }
            TaskId::DemolishExcessForesters => {
                self.demolish_excess_foresters();
                done
            }
            TaskId::DemolishExcessFood => {
                self.demolish_excess_food_buildings();
                done
            }
            TaskId::SendGeologists => {
                self.send_geologists();
                done
            }
            TaskId::SpiderwebRoads => {
                self.spiderweb_roads();
                done
            }
            TaskId::BuildWarehouse => {
                self.build_warehouse();
                done
            }
        };
        Ok(flow)
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Sleep for `base_ms`, scaled by the current game speed
    pub(crate) fn pause(&self, base_ms: u64) {
        if base_ms == 0 {
            return;
        }
        let speed = self.world.read(|w| w.game_speed()).max(1) as u64;
        let reference = self.config.timing.reference_speed.max(1) as u64;
        let ms = base_ms * reference / speed;
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    /// Road builder bound to this player and the current stock
    pub(crate) fn road_builder(&self) -> RoadBuilder<'_, W> {
        RoadBuilder::new(&self.world, self.player, &self.config.roads)
            .castle_flag(self.castle_flag)
            .home_flag(Some(self.stock.flag))
            .first_dir(self.first_dir)
    }

    pub(crate) fn tick(&self) -> Tick {
        self.world.read(|w| w.tick())
    }

    fn enter_stock(&mut self, flag: MapPos) {
        let mut state = StockState::new(flag);
        if let Some(tally) = self.stock_buildings.get(&flag) {
            state.buildings = tally.clone();
        }
        self.stock = state;
    }

    // ========================================================================
    // Per-cycle refresh
    // ========================================================================

    pub(crate) fn update_clear_reset(&mut self) {
        self.road_options = RoadOptions::default();
        self.goals.clear();
        self.cannot_expand = false;
        self.new_stocks.clear();
        self.stock_buildings.clear();
        self.flag_resources.clear();
        self.first_dir = Direction::from_index(self.rng.gen_range(0..6));
    }

    pub(crate) fn update_stocks(&mut self) {
        let player = self.player;
        self.stocks = self.world.read(|w| find_stocks(w, player));
        for flag in &self.stocks {
            if self.known_stocks.insert(*flag) {
                info!(player, stock = %flag, "new stock");
                self.new_stocks.insert(*flag);
            }
        }
        self.has_inventory = !self.stocks.is_empty();
    }

    pub(crate) fn update_buildings(&mut self, scope: Scope) {
        match scope {
            Scope::Realm => {
                let player = self.player;
                let stocks = self.stocks.clone();
                let (realm, per_stock) = self.world.read(|w| tally_buildings(w, player, &stocks));
                self.realm.buildings = realm;
                self.stock_buildings = per_stock;
            }
            Scope::Stock => {
                if let Some(tally) = self.stock_buildings.get(&self.stock.flag) {
                    self.stock.buildings = tally.clone();
                }
            }
        }
    }

    pub(crate) fn get_inventory(&mut self, scope: Scope) {
        match scope {
            Scope::Realm => {
                let player = self.player;
                self.realm.resources = self.world.read(|w| w.player_resource_totals(player));
            }
            Scope::Stock => {
                let flag = self.stock.flag;
                match self.world.read(|w| w.inventory_at(flag)) {
                    Some(inventory) => self.stock.inventory = inventory,
                    None => warn!(stock = %flag, "stock inventory vanished"),
                }
            }
        }
    }

    pub(crate) fn get_serfs(&mut self) {
        let player = self.player;
        let serfs = self.world.read(|w| w.player_serfs(player));
        self.realm.serfs = SerfCounts::collect(&serfs, &self.realm.resources);
    }

    pub(crate) fn count_resources_at_flags(&mut self) {
        if self.flag_resources.is_empty() {
            let player = self.player;
            let stocks = self.stocks.clone();
            self.flag_resources = self.world.read(|w| resources_at_flags(w, player, &stocks));
        }
        self.stock.at_flags = self
            .flag_resources
            .get(&self.stock.flag)
            .cloned()
            .unwrap_or_default();
    }

    pub(crate) fn check_resource_needs(&mut self) {
        let (needs, goals) = ResourceNeeds::check(
            &self.stock.inventory,
            &self.stock.at_flags,
            &self.realm.buildings,
            &self.config.thresholds,
            &self.config.placement,
        );
        self.stock.needs = needs;
        self.goals = goals;

        // Unowned land close to the castle is worth claiming as a buffer
        if Some(self.stock.flag) == self.castle_flag {
            let (flag, player) = (self.stock.flag, self.player);
            let exposed = self.world.read(|w| {
                w.geometry()
                    .spiral(flag, spiral_dist(12))
                    .any(|pos| w.owner_of(pos) != Some(player))
            });
            if exposed {
                self.goals.insert(ExpansionGoal::CreateBuffer);
            }
        }
        debug!(needs = ?self.stock.needs, goals = ?self.goals.sorted(), "resource needs");
    }

    /// Stop for good once there is nothing left to fight with
    pub(crate) fn consider_capitulation(&mut self) -> Flow {
        let player = self.player;
        let (has_castle, military, knights) = self.world.read(|w| {
            let buildings = w.player_buildings(player);
            let has_castle = buildings.iter().any(|b| b.kind == BuildingType::Castle);
            let military = buildings.iter().any(|b| b.kind.is_military());
            let knights = w.player_serfs(player).iter().any(|s| s.kind.is_knight());
            (has_castle, military, knights)
        });
        if self.castle_pos.is_some() && !has_castle && !military && !knights {
            warn!(player, "castle lost with no knights left, giving up");
            self.stop.stop();
            return Flow::EndCycle;
        }
        let has_inventory = self.world.read(|w| !find_stocks(w, player).is_empty());
        if !has_inventory {
            debug!(player, "no usable inventory, skipping cycle");
            return Flow::EndCycle;
        }
        Flow::Continue
    }
}

impl<W: World + 'static> AiController<W> {
    /// Move the controller onto its own thread
    pub fn spawn(mut self) -> Result<AiHandle> {
        let stop = self.stop_handle();
        let status = self.status();
        let join = thread::Builder::new()
            .name(format!("ai-player-{}", self.player))
            .spawn(move || self.run())?;
        Ok(AiHandle { stop, status, join })
    }
}
