//! Plain records copied out of the world
//!
//! Everything here is an owned snapshot; holding one never keeps the world
//! locked and it may be stale by the time it is used.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{BuildingType, PlayerIndex, ResourceType, SerfState, SerfType};
use crate::spatial::{Direction, MapPos};

/// Flag as seen by the AI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagInfo {
    pub pos: MapPos,
    pub owner: PlayerIndex,
    /// At least one road leaves this flag
    pub connected: bool,
    /// Building attached up-left of the flag, if any
    pub building: Option<BuildingType>,
    /// Resources waiting on the flag
    pub resources: Vec<ResourceType>,
    /// Directions in which the flag believes a transporter is assigned
    pub transporter_expected: [bool; 6],
}

impl FlagInfo {
    pub fn has_building(&self) -> bool {
        self.building.is_some()
    }

    pub fn expects_transporter(&self, dir: Direction) -> bool {
        self.transporter_expected[dir.index()]
    }
}

/// Building as seen by the AI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingInfo {
    pub pos: MapPos,
    pub owner: PlayerIndex,
    pub kind: BuildingType,
    /// Construction finished
    pub done: bool,
    /// Worker or knight present
    pub occupied: bool,
    pub active: bool,
    pub burning: bool,
    /// Recent output history, newest result in the lowest bit
    pub progress: u32,
    /// Knights stationed (military buildings only)
    pub knights: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerfInfo {
    pub index: u32,
    pub owner: PlayerIndex,
    pub kind: SerfType,
    pub state: SerfState,
    pub pos: MapPos,
}

/// Enemy building the player could send knights against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackTarget {
    pub pos: MapPos,
    pub owner: PlayerIndex,
    pub kind: BuildingType,
    pub defenders: u32,
    /// Own knights able to reach this target right now
    pub available_attackers: u32,
}

/// Resource quantities keyed by type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    counts: AHashMap<ResourceType, u32>,
}

impl ResourceCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: ResourceType) -> u32 {
        self.counts.get(&resource).copied().unwrap_or(0)
    }

    pub fn set(&mut self, resource: ResourceType, amount: u32) {
        self.counts.insert(resource, amount);
    }

    pub fn add(&mut self, resource: ResourceType, amount: u32) {
        *self.counts.entry(resource).or_insert(0) += amount;
    }

    /// Remove up to `amount`, returning how many were actually taken
    pub fn take(&mut self, resource: ResourceType, amount: u32) -> u32 {
        let entry = self.counts.entry(resource).or_insert(0);
        let taken = amount.min(*entry);
        *entry -= taken;
        taken
    }

    pub fn sum(&self, resources: &[ResourceType]) -> u32 {
        resources.iter().map(|r| self.get(*r)).sum()
    }

    pub fn merge(&mut self, other: &ResourceCounts) {
        for (resource, amount) in &other.counts {
            self.add(*resource, *amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceType, u32)> + '_ {
        self.counts.iter().map(|(r, n)| (*r, *n))
    }
}

impl FromIterator<(ResourceType, u32)> for ResourceCounts {
    fn from_iter<I: IntoIterator<Item = (ResourceType, u32)>>(iter: I) -> Self {
        let mut counts = ResourceCounts::new();
        for (resource, amount) in iter {
            counts.add(resource, amount);
        }
        counts
    }
}

/// How a single road step crosses the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Blocked,
    Land,
    Water,
}

/// Distance of military buildings from the enemy, as the game classifies it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatLevel {
    Interior,
    Outer,
    Near,
    Border,
}

/// Knight staffing levels of a military building, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OccupationLevel {
    Minimum,
    Weak,
    Medium,
    Good,
    Full,
}

impl OccupationLevel {
    pub const ALL: [OccupationLevel; 5] = [
        OccupationLevel::Minimum,
        OccupationLevel::Weak,
        OccupationLevel::Medium,
        OccupationLevel::Good,
        OccupationLevel::Full,
    ];

    /// Knights a building of `kind` holds at this level
    pub fn slots(&self, kind: BuildingType) -> u32 {
        const HUT: [u32; 5] = [1, 1, 2, 2, 3];
        const TOWER: [u32; 5] = [1, 2, 3, 4, 6];
        const FORTRESS: [u32; 5] = [1, 3, 6, 9, 12];
        let i = *self as usize;
        match kind {
            BuildingType::Hut => HUT[i],
            BuildingType::Tower => TOWER[i],
            BuildingType::Fortress => FORTRESS[i],
            _ => 0,
        }
    }
}

/// Lower and upper staffing bound the game keeps military buildings within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccupationRange {
    pub lower: OccupationLevel,
    pub upper: OccupationLevel,
}

impl OccupationRange {
    pub const fn new(lower: OccupationLevel, upper: OccupationLevel) -> Self {
        Self { lower, upper }
    }
}

impl Default for OccupationRange {
    fn default() -> Self {
        Self::new(OccupationLevel::Minimum, OccupationLevel::Minimum)
    }
}

/// Distribution priorities a player can tune
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityKind {
    /// Which tool the toolmaker makes next
    Tool(ResourceType),
    /// Order in which transporters pick up resources from flags
    FlagTransport(ResourceType),
    SteelToolmaker,
    SteelWeaponsmith,
    PlanksToolmaker,
    PlanksConstruction,
    CoalSteelsmelter,
    CoalGoldsmelter,
    CoalWeaponsmith,
    FoodStonemine,
    FoodCoalmine,
    FoodIronmine,
    FoodGoldmine,
}
