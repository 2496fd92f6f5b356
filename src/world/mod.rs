//! World query façade - the only way the AI touches the game
//!
//! Architecture: Trait + shared handle
//! - `World` lists every query, mutation and bulk enumeration the AI needs
//! - `SharedWorld` wraps a world in the single global lock and hands out
//!   scoped access, one logical operation per acquisition
//! - `SimWorld` is a small in-memory implementation for tests and demos

pub mod records;
pub mod shared;
pub mod sim;

pub use records::{
    AttackTarget, BuildingInfo, FlagInfo, OccupationLevel, OccupationRange, PriorityKind,
    ResourceCounts, SegmentKind, SerfInfo, ThreatLevel,
};
pub use shared::SharedWorld;
pub use sim::SimWorld;

use crate::core::types::{BuildingSize, BuildingType, MapObject, PlayerIndex, Terrain, Tick};
use crate::road::Road;
use crate::spatial::{Direction, MapGeometry, MapPos};

/// Contract the game model must fulfil for the AI
///
/// Implementations are driven from AI threads through [`SharedWorld`], so
/// they never need internal locking of their own.
pub trait World: Send {
    // --- Map queries ---

    fn geometry(&self) -> MapGeometry;
    fn terrain_at(&self, pos: MapPos) -> Terrain;
    fn height_at(&self, pos: MapPos) -> u32;
    fn object_at(&self, pos: MapPos) -> MapObject;
    fn owner_of(&self, pos: MapPos) -> Option<PlayerIndex>;
    fn has_flag(&self, pos: MapPos) -> bool;
    fn has_path(&self, pos: MapPos, dir: Direction) -> bool;
    fn has_building(&self, pos: MapPos) -> bool;
    fn flag_at(&self, pos: MapPos) -> Option<FlagInfo>;
    fn building_at(&self, pos: MapPos) -> Option<BuildingInfo>;

    /// How a new road step from `pos` in `dir` would cross the map
    fn road_segment(&self, pos: MapPos, dir: Direction) -> SegmentKind;

    /// A transporter is physically walking the road leaving `flag` in `dir`
    fn road_has_transporter(&self, flag: MapPos, dir: Direction) -> bool;

    fn has_any_path(&self, pos: MapPos) -> bool {
        Direction::ALL.iter().any(|dir| self.has_path(pos, *dir))
    }

    fn is_connected(&self, flag: MapPos) -> bool {
        self.flag_at(flag).map(|f| f.connected).unwrap_or(false)
    }

    // --- Feasibility ---

    fn can_build_flag(&self, pos: MapPos, player: PlayerIndex) -> bool;
    fn can_build_building(&self, pos: MapPos, kind: BuildingType, player: PlayerIndex) -> bool;
    fn can_build_castle(&self, pos: MapPos, player: PlayerIndex) -> bool;

    /// Largest footprint the ground at `pos` could take, ignoring ownership
    fn site_size(&self, pos: MapPos) -> Option<BuildingSize>;

    // --- Mutations ---

    fn build_flag(&mut self, pos: MapPos, player: PlayerIndex) -> bool;
    fn build_road(&mut self, road: &Road, player: PlayerIndex) -> bool;
    fn build_building(&mut self, pos: MapPos, kind: BuildingType, player: PlayerIndex) -> bool;
    fn build_castle(&mut self, pos: MapPos, player: PlayerIndex) -> bool;
    fn demolish_flag(&mut self, pos: MapPos, player: PlayerIndex) -> bool;
    fn demolish_building(&mut self, pos: MapPos, player: PlayerIndex) -> bool;
    /// Remove the whole road leaving `flag` in `dir`
    fn demolish_road(&mut self, flag: MapPos, dir: Direction, player: PlayerIndex) -> bool;
    fn set_knight_occupation(
        &mut self,
        player: PlayerIndex,
        threat: ThreatLevel,
        range: OccupationRange,
    );
    fn set_priority(&mut self, player: PlayerIndex, kind: PriorityKind, value: u32);
    /// Ask for a transporter to be dispatched onto the road at `flag`/`dir`
    fn call_transporter(&mut self, flag: MapPos, dir: Direction, player: PlayerIndex) -> bool;
    /// Force a serf into the lost state so it walks back to a stock
    fn set_serf_lost(&mut self, serf: u32) -> bool;
    /// Returns how many serfs were actually promoted
    fn promote_serfs_to_knights(&mut self, player: PlayerIndex, count: u32) -> u32;
    fn send_geologist(&mut self, flag: MapPos, player: PlayerIndex) -> bool;
    fn attack(&mut self, player: PlayerIndex, target: MapPos, knights: u32) -> bool;

    // --- Player state ---

    fn knight_occupation(&self, player: PlayerIndex, threat: ThreatLevel) -> OccupationRange;
    fn priority(&self, player: PlayerIndex, kind: PriorityKind) -> u32;
    /// Knight morale as a percentage of nominal
    fn knight_morale(&self, player: PlayerIndex) -> u32;
    /// Knights are currently being swapped for stronger ones
    fn cycling_knights(&self, player: PlayerIndex) -> bool;

    // --- Bulk enumeration ---

    fn player_buildings(&self, player: PlayerIndex) -> Vec<BuildingInfo>;
    fn player_serfs(&self, player: PlayerIndex) -> Vec<SerfInfo>;
    fn serf(&self, index: u32) -> Option<SerfInfo>;
    fn flags(&self) -> Vec<FlagInfo>;
    fn player_resource_totals(&self, player: PlayerIndex) -> ResourceCounts;
    /// Contents of the inventory whose flag is at `flag`
    fn inventory_at(&self, flag: MapPos) -> Option<ResourceCounts>;
    fn attack_targets(&self, player: PlayerIndex) -> Vec<AttackTarget>;

    // --- Lifecycle signals ---

    fn tick(&self) -> Tick;
    /// Current game speed; zero means paused
    fn game_speed(&self) -> u32;
    /// External gate keeping the AI from acting, e.g. while a setup
    /// dialog is still open
    fn is_locked(&self, player: PlayerIndex) -> bool;

    fn is_paused(&self) -> bool {
        self.game_speed() == 0
    }
}
