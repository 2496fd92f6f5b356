//! In-memory world used by tests and the demo binary
//!
//! Implements the full [`World`] contract over a flat tile array with a
//! deliberately tiny simulation: construction finishes after a fixed delay,
//! finished military buildings take a knight and claim land, and missing
//! transporters arrive on the next advance. Every successful mutation is
//! recorded so tests can assert on exactly what the AI did.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{
    BuildingSize, BuildingType, MapObject, PlayerIndex, ResourceType, SerfState, SerfType,
    Terrain, Tick,
};
use crate::road::Road;
use crate::spatial::{Direction, MapGeometry, MapPos};
use crate::world::records::{
    AttackTarget, BuildingInfo, FlagInfo, OccupationRange, PriorityKind, ResourceCounts,
    SegmentKind, SerfInfo, ThreatLevel,
};
use crate::world::World;

/// Ticks a connected construction site needs before it is finished
pub const BUILD_TICKS: Tick = 1_000;

/// Largest height difference a single road step may climb
const MAX_STEP_HEIGHT: u32 = 4;

/// A mutation the AI issued, recorded in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    BuildFlag(MapPos),
    BuildRoad(Road),
    BuildBuilding(MapPos, BuildingType),
    BuildCastle(MapPos),
    DemolishFlag(MapPos),
    DemolishBuilding(MapPos),
    DemolishRoad(MapPos, Direction),
    SetOccupation(ThreatLevel, OccupationRange),
    SetPriority(PriorityKind, u32),
    CallTransporter(MapPos, Direction),
    SetSerfLost(u32),
    Promote(u32),
    SendGeologist(MapPos),
    Attack(MapPos, u32),
}

impl Command {
    /// Commands that change what stands on the map
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Command::BuildFlag(_)
                | Command::BuildRoad(_)
                | Command::BuildBuilding(..)
                | Command::BuildCastle(_)
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Tile {
    terrain: Terrain,
    height: u32,
    object: MapObject,
    owner: Option<PlayerIndex>,
    paths: u8,
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            terrain: Terrain::Grass0,
            height: 0,
            object: MapObject::None,
            owner: None,
            paths: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct SimFlag {
    owner: PlayerIndex,
    resources: Vec<ResourceType>,
    transporter_expected: [bool; 6],
    transporter_present: [bool; 6],
}

#[derive(Debug, Clone)]
struct SimBuilding {
    owner: PlayerIndex,
    kind: BuildingType,
    done: bool,
    occupied: bool,
    active: bool,
    burning: bool,
    progress: u32,
    knights: u32,
    build_ticks: Tick,
}

#[derive(Debug, Clone)]
struct SimPlayer {
    occupation: AHashMap<ThreatLevel, OccupationRange>,
    priorities: AHashMap<PriorityKind, u32>,
    morale: u32,
    cycling: bool,
    locked: bool,
}

impl Default for SimPlayer {
    fn default() -> Self {
        Self {
            occupation: AHashMap::new(),
            priorities: AHashMap::new(),
            morale: 100,
            cycling: false,
            locked: false,
        }
    }
}

pub struct SimWorld {
    geometry: MapGeometry,
    tiles: Vec<Tile>,
    flags: AHashMap<MapPos, SimFlag>,
    buildings: AHashMap<MapPos, SimBuilding>,
    inventories: AHashMap<MapPos, ResourceCounts>,
    serfs: Vec<SerfInfo>,
    players: AHashMap<PlayerIndex, SimPlayer>,
    tick: Tick,
    speed: u32,
    commands: Vec<Command>,
}

impl SimWorld {
    /// Flat grassland with nothing on it
    pub fn new(geometry: MapGeometry) -> Self {
        Self {
            geometry,
            tiles: vec![Tile::default(); geometry.tile_count() as usize],
            flags: AHashMap::new(),
            buildings: AHashMap::new(),
            inventories: AHashMap::new(),
            serfs: Vec::new(),
            players: AHashMap::new(),
            tick: 0,
            speed: 2,
            commands: Vec::new(),
        }
    }

    fn tile(&self, pos: MapPos) -> &Tile {
        &self.tiles[pos.0 as usize]
    }

    fn tile_mut(&mut self, pos: MapPos) -> &mut Tile {
        &mut self.tiles[pos.0 as usize]
    }

    fn player_mut(&mut self, player: PlayerIndex) -> &mut SimPlayer {
        self.players.entry(player).or_default()
    }

    // ========================================================================
    // Scenario setup
    // ========================================================================

    pub fn set_terrain(&mut self, pos: MapPos, terrain: Terrain) {
        self.tile_mut(pos).terrain = terrain;
    }

    pub fn set_height(&mut self, pos: MapPos, height: u32) {
        self.tile_mut(pos).height = height;
    }

    pub fn set_object(&mut self, pos: MapPos, object: MapObject) {
        self.tile_mut(pos).object = object;
    }

    pub fn set_owner(&mut self, pos: MapPos, owner: Option<PlayerIndex>) {
        self.tile_mut(pos).owner = owner;
    }

    /// Give every unowned tile within `rings` of `center` to `player`
    pub fn claim_area(&mut self, center: MapPos, rings: u32, player: PlayerIndex) {
        let area: Vec<MapPos> = self.geometry.spiral_rings(center, rings).collect();
        for pos in area {
            let tile = self.tile_mut(pos);
            if tile.owner.is_none() {
                tile.owner = Some(player);
            }
        }
    }

    /// Fill the area within `rings` of `center` with one terrain
    pub fn paint_terrain(&mut self, center: MapPos, rings: u32, terrain: Terrain) {
        let area: Vec<MapPos> = self.geometry.spiral_rings(center, rings).collect();
        for pos in area {
            self.tile_mut(pos).terrain = terrain;
        }
    }

    /// Place a flag without any feasibility check
    pub fn place_flag(&mut self, pos: MapPos, owner: PlayerIndex) {
        self.tile_mut(pos).object = MapObject::Flag;
        let paths = self.tile(pos).paths;
        let mut present = [false; 6];
        for dir in Direction::ALL {
            present[dir.index()] = paths & (1 << dir.index()) != 0;
        }
        self.flags.insert(
            pos,
            SimFlag {
                owner,
                resources: Vec::new(),
                transporter_expected: present,
                transporter_present: present,
            },
        );
    }

    /// Place a building and its flag without any feasibility check
    pub fn place_building(
        &mut self,
        pos: MapPos,
        kind: BuildingType,
        owner: PlayerIndex,
        done: bool,
        occupied: bool,
    ) {
        let flag = self.geometry.flag_of_building(pos);
        if !self.flags.contains_key(&flag) {
            self.place_flag(flag, owner);
        }
        self.tile_mut(pos).object = object_for(kind);
        self.buildings.insert(
            pos,
            SimBuilding {
                owner,
                kind,
                done,
                occupied,
                active: occupied,
                burning: false,
                progress: 0,
                knights: if kind.is_military() && occupied { 1 } else { 0 },
                build_ticks: 0,
            },
        );
        if kind.is_inventory() && done {
            self.inventories.entry(flag).or_default();
        }
    }

    /// Lay path bits for a road between two existing flags, without checks
    pub fn place_road(&mut self, road: &Road) {
        let mut pos = road.source();
        for dir in road.dirs() {
            let next = self.geometry.move_pos(pos, *dir);
            self.tile_mut(pos).paths |= 1 << dir.index();
            self.tile_mut(next).paths |= 1 << dir.reverse().index();
            pos = next;
        }
        self.mark_road_ends(road, true);
    }

    fn mark_road_ends(&mut self, road: &Road, present: bool) {
        if let (Some(first), Some(last)) = (road.first_dir(), road.last_dir()) {
            if let Some(flag) = self.flags.get_mut(&road.source()) {
                flag.transporter_expected[first.index()] = true;
                flag.transporter_present[first.index()] = present;
            }
            if let Some(flag) = self.flags.get_mut(&road.end()) {
                let back = last.reverse().index();
                flag.transporter_expected[back] = true;
                flag.transporter_present[back] = present;
            }
        }
    }

    pub fn set_building_state(&mut self, pos: MapPos, done: bool, occupied: bool) {
        if let Some(b) = self.buildings.get_mut(&pos) {
            b.done = done;
            b.occupied = occupied;
            b.active = occupied;
        }
    }

    pub fn set_building_progress(&mut self, pos: MapPos, progress: u32) {
        if let Some(b) = self.buildings.get_mut(&pos) {
            b.progress = progress;
        }
    }

    pub fn set_building_knights(&mut self, pos: MapPos, knights: u32) {
        if let Some(b) = self.buildings.get_mut(&pos) {
            b.knights = knights;
        }
    }

    pub fn add_serf(
        &mut self,
        kind: SerfType,
        state: SerfState,
        pos: MapPos,
        owner: PlayerIndex,
    ) -> u32 {
        let index = self.serfs.len() as u32;
        self.serfs.push(SerfInfo {
            index,
            owner,
            kind,
            state,
            pos,
        });
        index
    }

    pub fn set_serf_state(&mut self, index: u32, state: SerfState) {
        if let Some(serf) = self.serfs.iter_mut().find(|s| s.index == index) {
            serf.state = state;
        }
    }

    pub fn remove_serf(&mut self, index: u32) {
        self.serfs.retain(|s| s.index != index);
    }

    pub fn inventory_mut(&mut self, flag: MapPos) -> &mut ResourceCounts {
        self.inventories.entry(flag).or_default()
    }

    pub fn add_flag_resource(&mut self, flag: MapPos, resource: ResourceType) {
        if let Some(f) = self.flags.get_mut(&flag) {
            f.resources.push(resource);
        }
    }

    pub fn set_transporter_present(&mut self, flag: MapPos, dir: Direction, present: bool) {
        if let Some(f) = self.flags.get_mut(&flag) {
            f.transporter_present[dir.index()] = present;
        }
    }

    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed;
    }

    pub fn set_locked(&mut self, player: PlayerIndex, locked: bool) {
        self.player_mut(player).locked = locked;
    }

    pub fn set_morale(&mut self, player: PlayerIndex, morale: u32) {
        self.player_mut(player).morale = morale;
    }

    pub fn set_cycling_knights(&mut self, player: PlayerIndex, cycling: bool) {
        self.player_mut(player).cycling = cycling;
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn flag_count(&self, player: PlayerIndex) -> usize {
        self.flags.values().filter(|f| f.owner == player).count()
    }

    pub fn building_count(&self, player: PlayerIndex, kind: BuildingType) -> usize {
        self.buildings
            .values()
            .filter(|b| b.owner == player && b.kind == kind)
            .count()
    }

    /// Total path steps on the map, each road step counted once
    pub fn path_segment_count(&self) -> u32 {
        self.tiles.iter().map(|t| t.paths.count_ones()).sum::<u32>() / 2
    }

    pub fn castle_of(&self, player: PlayerIndex) -> Option<MapPos> {
        self.buildings
            .iter()
            .find(|(_, b)| b.owner == player && b.kind == BuildingType::Castle)
            .map(|(pos, _)| *pos)
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Move the clock forward and let the tiny simulation catch up
    pub fn advance(&mut self, ticks: Tick) {
        self.tick += ticks;
        let geometry = self.geometry;

        let mut finished = Vec::new();
        for (pos, building) in self.buildings.iter_mut() {
            if building.done {
                continue;
            }
            let flag = geometry.flag_of_building(*pos);
            let connected = self.tiles[flag.0 as usize].paths != 0;
            if connected || building.kind == BuildingType::Castle {
                building.build_ticks += ticks;
                if building.build_ticks >= BUILD_TICKS {
                    building.done = true;
                    finished.push(*pos);
                }
            }
        }
        finished.sort();
        for pos in finished {
            if let Some(kind) = self.buildings.get(&pos).map(|b| b.kind) {
                if kind.is_inventory() {
                    self.inventories
                        .entry(geometry.flag_of_building(pos))
                        .or_default();
                }
            }
        }

        let mut waiting: Vec<MapPos> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.done && !b.occupied)
            .map(|(pos, _)| *pos)
            .collect();
        waiting.sort();
        for pos in waiting {
            self.occupy(pos);
        }

        for flag in self.flags.values_mut() {
            for dir in 0..6 {
                if flag.transporter_expected[dir] {
                    flag.transporter_present[dir] = true;
                }
            }
        }
    }

    fn occupy(&mut self, pos: MapPos) {
        let Some((owner, kind)) = self.buildings.get(&pos).map(|b| (b.owner, b.kind)) else {
            return;
        };
        if kind.is_military() {
            let knight = self.serfs.iter_mut().find(|s| {
                s.owner == owner && s.kind.is_knight() && s.state == SerfState::IdleInStock
            });
            let Some(knight) = knight else {
                return;
            };
            knight.state = SerfState::Working;
            knight.pos = pos;
            let rings = match kind {
                BuildingType::Hut => 5,
                BuildingType::Tower => 7,
                _ => 9,
            };
            self.claim_area(pos, rings, owner);
            if let Some(b) = self.buildings.get_mut(&pos) {
                b.knights = 1;
            }
        }
        if let Some(b) = self.buildings.get_mut(&pos) {
            b.occupied = true;
            b.active = true;
        }
    }

    fn stock_flags_of(&self, player: PlayerIndex) -> Vec<MapPos> {
        let mut flags: Vec<MapPos> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == player && b.kind.is_inventory() && b.done)
            .map(|(pos, _)| self.geometry.flag_of_building(*pos))
            .collect();
        flags.sort();
        flags
    }

    fn passable(object: MapObject) -> bool {
        matches!(
            object,
            MapObject::None | MapObject::Flag | MapObject::Sign(_) | MapObject::Seeds(_)
        )
    }

    fn buildable_ground(&self, pos: MapPos) -> bool {
        let tile = self.tile(pos);
        matches!(tile.object, MapObject::None | MapObject::Sign(_)) && tile.paths == 0
    }

    /// Remove the road leaving `flag` in `dir`, returning the far flag
    fn remove_road(&mut self, flag: MapPos, dir: Direction) -> Option<MapPos> {
        let mut pos = flag;
        let mut dir = dir;
        for _ in 0..self.geometry.tile_count() {
            if self.tile(pos).paths & (1 << dir.index()) == 0 {
                return None;
            }
            let next = self.geometry.move_pos(pos, dir);
            self.tile_mut(pos).paths &= !(1 << dir.index());
            self.tile_mut(next).paths &= !(1 << dir.reverse().index());
            if pos == flag {
                if let Some(f) = self.flags.get_mut(&flag) {
                    f.transporter_expected[dir.index()] = false;
                    f.transporter_present[dir.index()] = false;
                }
            }
            if let Some(f) = self.flags.get_mut(&next) {
                f.transporter_expected[dir.reverse().index()] = false;
                f.transporter_present[dir.reverse().index()] = false;
                return Some(next);
            }
            let paths = self.tile(next).paths;
            let onward = Direction::ALL
                .into_iter()
                .find(|d| paths & (1 << d.index()) != 0)?;
            pos = next;
            dir = onward;
        }
        None
    }
}

fn object_for(kind: BuildingType) -> MapObject {
    match kind.size() {
        BuildingSize::Large => MapObject::LargeBuilding,
        BuildingSize::Castle => MapObject::Castle,
        _ => MapObject::SmallBuilding,
    }
}

/// Resources a freshly founded castle starts with
fn starting_inventory() -> ResourceCounts {
    use ResourceType::*;
    [
        (Plank, 40),
        (Stone, 20),
        (Lumber, 10),
        (Fish, 4),
        (Bread, 4),
        (Meat, 4),
        (Coal, 8),
        (IronOre, 6),
        (Steel, 4),
        (Sword, 8),
        (Shield, 8),
        (Shovel, 2),
        (Hammer, 6),
        (Axe, 2),
        (Saw, 1),
        (Pick, 2),
        (Scythe, 1),
        (Rod, 1),
        (Cleaver, 1),
        (Pincer, 1),
    ]
    .into_iter()
    .collect()
}

impl World for SimWorld {
    fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    fn terrain_at(&self, pos: MapPos) -> Terrain {
        self.tile(pos).terrain
    }

    fn height_at(&self, pos: MapPos) -> u32 {
        self.tile(pos).height
    }

    fn object_at(&self, pos: MapPos) -> MapObject {
        self.tile(pos).object
    }

    fn owner_of(&self, pos: MapPos) -> Option<PlayerIndex> {
        self.tile(pos).owner
    }

    fn has_flag(&self, pos: MapPos) -> bool {
        self.flags.contains_key(&pos)
    }

    fn has_path(&self, pos: MapPos, dir: Direction) -> bool {
        self.tile(pos).paths & (1 << dir.index()) != 0
    }

    fn has_building(&self, pos: MapPos) -> bool {
        self.buildings.contains_key(&pos)
    }

    fn flag_at(&self, pos: MapPos) -> Option<FlagInfo> {
        let flag = self.flags.get(&pos)?;
        let building = self
            .buildings
            .get(&self.geometry.building_of_flag(pos))
            .map(|b| b.kind);
        Some(FlagInfo {
            pos,
            owner: flag.owner,
            connected: self.tile(pos).paths != 0,
            building,
            resources: flag.resources.clone(),
            transporter_expected: flag.transporter_expected,
        })
    }

    fn building_at(&self, pos: MapPos) -> Option<BuildingInfo> {
        let b = self.buildings.get(&pos)?;
        Some(BuildingInfo {
            pos,
            owner: b.owner,
            kind: b.kind,
            done: b.done,
            occupied: b.occupied,
            active: b.active,
            burning: b.burning,
            progress: b.progress,
            knights: b.knights,
        })
    }

    fn road_segment(&self, pos: MapPos, dir: Direction) -> SegmentKind {
        if self.has_path(pos, dir) {
            return SegmentKind::Blocked;
        }
        let next = self.geometry.move_pos(pos, dir);
        let (from, to) = (self.tile(pos), self.tile(next));
        if !Self::passable(to.object) {
            return SegmentKind::Blocked;
        }
        if from.height.abs_diff(to.height) > MAX_STEP_HEIGHT {
            return SegmentKind::Blocked;
        }
        if from.terrain.is_water() && to.terrain.is_water() {
            SegmentKind::Water
        } else {
            SegmentKind::Land
        }
    }

    fn road_has_transporter(&self, flag: MapPos, dir: Direction) -> bool {
        self.flags
            .get(&flag)
            .map(|f| f.transporter_present[dir.index()])
            .unwrap_or(false)
    }

    fn can_build_flag(&self, pos: MapPos, player: PlayerIndex) -> bool {
        let tile = self.tile(pos);
        if tile.owner != Some(player) || tile.terrain.is_water() {
            return false;
        }
        if !matches!(tile.object, MapObject::None | MapObject::Sign(_)) {
            return false;
        }
        !self
            .geometry
            .neighbors(pos)
            .iter()
            .any(|n| self.flags.contains_key(n))
    }

    fn can_build_building(&self, pos: MapPos, kind: BuildingType, player: PlayerIndex) -> bool {
        if kind == BuildingType::Castle {
            return self.can_build_castle(pos, player);
        }
        let flag = self.geometry.flag_of_building(pos);
        if self.tile(pos).owner != Some(player) || self.tile(flag).owner != Some(player) {
            return false;
        }
        if !self.buildable_ground(pos) {
            return false;
        }
        let flag_ok = match self.flags.get(&flag) {
            Some(f) => f.owner == player,
            None => self.can_build_flag(flag, player),
        };
        if !flag_ok {
            return false;
        }
        let terrain = self.tile(pos).terrain;
        match kind.size() {
            BuildingSize::Mine => terrain.is_hills(),
            BuildingSize::Small => !terrain.is_water() && !terrain.is_hills(),
            BuildingSize::Large | BuildingSize::Castle => {
                !terrain.is_water()
                    && !terrain.is_hills()
                    && [Direction::Left, Direction::UpLeft, Direction::Up]
                        .iter()
                        .all(|d| self.buildable_ground(self.geometry.move_pos(pos, *d)))
            }
        }
    }

    fn can_build_castle(&self, pos: MapPos, player: PlayerIndex) -> bool {
        if self.castle_of(player).is_some() {
            return false;
        }
        let flag = self.geometry.flag_of_building(pos);
        self.geometry.spiral_rings(pos, 1).chain([flag]).all(|p| {
            let tile = self.tile(p);
            tile.terrain.is_grass()
                && tile.object == MapObject::None
                && tile.paths == 0
                && (tile.owner.is_none() || tile.owner == Some(player))
        })
    }

    fn site_size(&self, pos: MapPos) -> Option<BuildingSize> {
        let terrain = self.tile(pos).terrain;
        if !self.buildable_ground(pos) || terrain.is_water() {
            return None;
        }
        if terrain.is_hills() {
            return Some(BuildingSize::Mine);
        }
        let large = [Direction::Left, Direction::UpLeft, Direction::Up]
            .iter()
            .all(|d| self.buildable_ground(self.geometry.move_pos(pos, *d)));
        Some(if large { BuildingSize::Large } else { BuildingSize::Small })
    }

    fn build_flag(&mut self, pos: MapPos, player: PlayerIndex) -> bool {
        if !self.can_build_flag(pos, player) {
            return false;
        }
        self.place_flag(pos, player);
        self.commands.push(Command::BuildFlag(pos));
        true
    }

    fn build_road(&mut self, road: &Road, player: PlayerIndex) -> bool {
        if road.is_empty() || road.source() == road.end() {
            return false;
        }
        let owns_flag = |w: &Self, p: MapPos| w.flags.get(&p).map(|f| f.owner) == Some(player);
        if !owns_flag(self, road.source()) || !owns_flag(self, road.end()) {
            return false;
        }
        let positions = road.positions(&self.geometry);
        let inner = &positions[1..positions.len() - 1];
        for (i, pos) in inner.iter().enumerate() {
            let tile = self.tile(*pos);
            if tile.owner != Some(player) || tile.paths != 0 || self.flags.contains_key(pos) {
                return false;
            }
            if positions[..i + 1].contains(pos) {
                return false;
            }
        }
        if self.tile(road.end()).owner != Some(player) {
            return false;
        }
        let mut water_steps = 0;
        let mut pos = road.source();
        for dir in road.dirs() {
            match self.road_segment(pos, *dir) {
                SegmentKind::Blocked => return false,
                SegmentKind::Water => water_steps += 1,
                SegmentKind::Land => {}
            }
            pos = self.geometry.move_pos(pos, *dir);
        }
        if water_steps != 0 && water_steps != road.len() {
            return false;
        }

        let mut pos = road.source();
        for dir in road.dirs() {
            let next = self.geometry.move_pos(pos, *dir);
            self.tile_mut(pos).paths |= 1 << dir.index();
            self.tile_mut(next).paths |= 1 << dir.reverse().index();
            pos = next;
        }
        self.mark_road_ends(road, false);
        self.commands.push(Command::BuildRoad(road.clone()));
        true
    }

    fn build_building(&mut self, pos: MapPos, kind: BuildingType, player: PlayerIndex) -> bool {
        if kind == BuildingType::Castle {
            return self.build_castle(pos, player);
        }
        if !self.can_build_building(pos, kind, player) {
            return false;
        }
        self.place_building(pos, kind, player, false, false);
        self.commands.push(Command::BuildBuilding(pos, kind));
        true
    }

    fn build_castle(&mut self, pos: MapPos, player: PlayerIndex) -> bool {
        if !self.can_build_castle(pos, player) {
            return false;
        }
        self.claim_area(pos, 9, player);
        self.place_building(pos, BuildingType::Castle, player, true, true);
        let flag = self.geometry.flag_of_building(pos);
        self.inventories.insert(flag, starting_inventory());
        let castle_serfs = [
            (SerfType::Knight0, 5),
            (SerfType::Generic, 20),
            (SerfType::Transporter, 5),
            (SerfType::Builder, 2),
            (SerfType::Geologist, 2),
        ];
        for (kind, count) in castle_serfs {
            for _ in 0..count {
                self.add_serf(kind, SerfState::IdleInStock, pos, player);
            }
        }
        self.commands.push(Command::BuildCastle(pos));
        true
    }

    fn demolish_flag(&mut self, pos: MapPos, player: PlayerIndex) -> bool {
        if self.flags.get(&pos).map(|f| f.owner) != Some(player) {
            return false;
        }
        for dir in Direction::ALL {
            if self.has_path(pos, dir) {
                self.remove_road(pos, dir);
            }
        }
        let building = self.geometry.building_of_flag(pos);
        if self.buildings.remove(&building).is_some() {
            self.tile_mut(building).object = MapObject::None;
        }
        self.flags.remove(&pos);
        self.inventories.remove(&pos);
        self.tile_mut(pos).object = MapObject::None;
        self.commands.push(Command::DemolishFlag(pos));
        true
    }

    fn demolish_building(&mut self, pos: MapPos, player: PlayerIndex) -> bool {
        if self.buildings.get(&pos).map(|b| b.owner) != Some(player) {
            return false;
        }
        self.buildings.remove(&pos);
        self.tile_mut(pos).object = MapObject::None;
        self.inventories.remove(&self.geometry.flag_of_building(pos));
        self.commands.push(Command::DemolishBuilding(pos));
        true
    }

    fn demolish_road(&mut self, flag: MapPos, dir: Direction, player: PlayerIndex) -> bool {
        if self.flags.get(&flag).map(|f| f.owner) != Some(player) {
            return false;
        }
        if self.remove_road(flag, dir).is_none() {
            return false;
        }
        self.commands.push(Command::DemolishRoad(flag, dir));
        true
    }

    fn set_knight_occupation(
        &mut self,
        player: PlayerIndex,
        threat: ThreatLevel,
        range: OccupationRange,
    ) {
        self.player_mut(player).occupation.insert(threat, range);
        self.commands.push(Command::SetOccupation(threat, range));
    }

    fn set_priority(&mut self, player: PlayerIndex, kind: PriorityKind, value: u32) {
        self.player_mut(player).priorities.insert(kind, value);
        self.commands.push(Command::SetPriority(kind, value));
    }

    fn call_transporter(&mut self, flag: MapPos, dir: Direction, player: PlayerIndex) -> bool {
        if self.flags.get(&flag).map(|f| f.owner) != Some(player) || !self.has_path(flag, dir) {
            return false;
        }
        self.commands.push(Command::CallTransporter(flag, dir));
        true
    }

    fn set_serf_lost(&mut self, serf: u32) -> bool {
        let Some(s) = self.serfs.iter_mut().find(|s| s.index == serf) else {
            return false;
        };
        s.state = SerfState::Lost;
        self.commands.push(Command::SetSerfLost(serf));
        true
    }

    fn promote_serfs_to_knights(&mut self, player: PlayerIndex, count: u32) -> u32 {
        let stocks = self.stock_flags_of(player);
        let mut promoted = 0;
        for serf in self.serfs.iter_mut() {
            if promoted >= count {
                break;
            }
            if serf.owner != player
                || serf.kind != SerfType::Generic
                || serf.state != SerfState::IdleInStock
            {
                continue;
            }
            let Some(stock) = stocks.iter().find(|flag| {
                self.inventories.get(*flag).map_or(false, |inv| {
                    inv.get(ResourceType::Sword) > 0 && inv.get(ResourceType::Shield) > 0
                })
            }) else {
                break;
            };
            if let Some(inv) = self.inventories.get_mut(stock) {
                inv.take(ResourceType::Sword, 1);
                inv.take(ResourceType::Shield, 1);
            }
            serf.kind = SerfType::Knight0;
            promoted += 1;
        }
        if promoted > 0 {
            self.commands.push(Command::Promote(promoted));
        }
        promoted
    }

    fn send_geologist(&mut self, flag: MapPos, player: PlayerIndex) -> bool {
        let geologist = self.serfs.iter_mut().find(|s| {
            s.owner == player && s.kind == SerfType::Geologist && s.state == SerfState::IdleInStock
        });
        let Some(geologist) = geologist else {
            return false;
        };
        geologist.state = SerfState::Working;
        geologist.pos = flag;
        self.commands.push(Command::SendGeologist(flag));
        true
    }

    fn attack(&mut self, player: PlayerIndex, target: MapPos, knights: u32) -> bool {
        let reachable = self
            .attack_targets(player)
            .iter()
            .any(|t| t.pos == target && t.available_attackers >= knights);
        if !reachable || knights == 0 {
            return false;
        }
        self.commands.push(Command::Attack(target, knights));
        true
    }

    fn knight_occupation(&self, player: PlayerIndex, threat: ThreatLevel) -> OccupationRange {
        self.players
            .get(&player)
            .and_then(|p| p.occupation.get(&threat).copied())
            .unwrap_or_default()
    }

    fn priority(&self, player: PlayerIndex, kind: PriorityKind) -> u32 {
        self.players
            .get(&player)
            .and_then(|p| p.priorities.get(&kind).copied())
            .unwrap_or(0)
    }

    fn knight_morale(&self, player: PlayerIndex) -> u32 {
        self.players.get(&player).map(|p| p.morale).unwrap_or(100)
    }

    fn cycling_knights(&self, player: PlayerIndex) -> bool {
        self.players.get(&player).map(|p| p.cycling).unwrap_or(false)
    }

    fn player_buildings(&self, player: PlayerIndex) -> Vec<BuildingInfo> {
        let mut positions: Vec<MapPos> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == player)
            .map(|(pos, _)| *pos)
            .collect();
        positions.sort();
        positions
            .into_iter()
            .filter_map(|pos| self.building_at(pos))
            .collect()
    }

    fn player_serfs(&self, player: PlayerIndex) -> Vec<SerfInfo> {
        self.serfs
            .iter()
            .filter(|s| s.owner == player)
            .copied()
            .collect()
    }

    fn serf(&self, index: u32) -> Option<SerfInfo> {
        self.serfs.iter().find(|s| s.index == index).copied()
    }

    fn flags(&self) -> Vec<FlagInfo> {
        let mut positions: Vec<MapPos> = self.flags.keys().copied().collect();
        positions.sort();
        positions
            .into_iter()
            .filter_map(|pos| self.flag_at(pos))
            .collect()
    }

    fn player_resource_totals(&self, player: PlayerIndex) -> ResourceCounts {
        let mut totals = ResourceCounts::new();
        for flag in self.stock_flags_of(player) {
            if let Some(inv) = self.inventories.get(&flag) {
                totals.merge(inv);
            }
        }
        totals
    }

    fn inventory_at(&self, flag: MapPos) -> Option<ResourceCounts> {
        self.inventories.get(&flag).cloned()
    }

    fn attack_targets(&self, player: PlayerIndex) -> Vec<AttackTarget> {
        let idle_knights = self
            .serfs
            .iter()
            .filter(|s| s.owner == player && s.kind.is_knight() && s.state == SerfState::IdleInStock)
            .count() as u32;
        let own_military: Vec<MapPos> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner == player && b.kind.is_military() && b.occupied)
            .map(|(pos, _)| *pos)
            .collect();
        let mut targets: Vec<AttackTarget> = self
            .buildings
            .iter()
            .filter(|(_, b)| b.owner != player && b.kind.is_military() && b.done)
            .filter(|(pos, _)| {
                own_military
                    .iter()
                    .any(|own| self.geometry.distance(*own, **pos) <= 16)
            })
            .map(|(pos, b)| AttackTarget {
                pos: *pos,
                owner: b.owner,
                kind: b.kind,
                defenders: b.knights,
                available_attackers: idle_knights,
            })
            .collect();
        targets.sort_by_key(|t| t.pos);
        targets
    }

    fn tick(&self) -> Tick {
        self.tick
    }

    fn game_speed(&self) -> u32 {
        self.speed
    }

    fn is_locked(&self, player: PlayerIndex) -> bool {
        self.players.get(&player).map(|p| p.locked).unwrap_or(false)
    }
}
