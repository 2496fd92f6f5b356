//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Game tick counter (simulation time unit)
pub type Tick = u64;

/// Index of a player in the game
pub type PlayerIndex = u32;

/// Terrain classes, ordered the way the map stores them so that ranges
/// such as "all hills" are contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Water0,
    Water1,
    Water2,
    Water3,
    Grass0,
    Grass1,
    Grass2,
    Grass3,
    Desert0,
    Desert1,
    Desert2,
    Tundra0,
    Tundra1,
    Tundra2,
    Snow0,
    Snow1,
}

impl Terrain {
    pub fn is_water(&self) -> bool {
        *self <= Terrain::Water3
    }

    pub fn is_grass(&self) -> bool {
        (Terrain::Grass0..=Terrain::Grass3).contains(self)
    }

    /// Mountain terrain where mines can be built and geologists search
    pub fn is_hills(&self) -> bool {
        (Terrain::Tundra0..=Terrain::Snow0).contains(self)
    }

    pub fn is_snow(&self) -> bool {
        *self >= Terrain::Snow0
    }
}

/// Inclusive range of terrain classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainRange {
    pub min: Terrain,
    pub max: Terrain,
}

impl TerrainRange {
    pub const WATER: TerrainRange = TerrainRange::new(Terrain::Water0, Terrain::Water3);
    pub const GRASS: TerrainRange = TerrainRange::new(Terrain::Grass0, Terrain::Grass3);
    pub const HILLS: TerrainRange = TerrainRange::new(Terrain::Tundra0, Terrain::Snow0);

    pub const fn new(min: Terrain, max: Terrain) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, terrain: Terrain) -> bool {
        terrain >= self.min && terrain <= self.max
    }
}

/// Ore (and stone) deposits that geologists can mark with signs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ore {
    Coal,
    Iron,
    Gold,
    Stone,
}

/// Geologist sign left on a mountain tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    Large(Ore),
    Small(Ore),
    Empty,
}

/// Object occupying a map tile
///
/// Stone piles are numbered from 0 (full) to 7 (nearly exhausted), trees
/// from 0 to 7 by growth stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MapObject {
    #[default]
    None,
    Flag,
    SmallBuilding,
    LargeBuilding,
    Castle,
    Tree(u8),
    Pine(u8),
    Stone(u8),
    Field(u8),
    Seeds(u8),
    Sign(Sign),
    /// Anything else that blocks construction (stubs, crosses, palms)
    Obstacle,
}

impl MapObject {
    pub fn is_tree(&self) -> bool {
        matches!(self, MapObject::Tree(_) | MapObject::Pine(_))
    }

    pub fn is_stone(&self) -> bool {
        matches!(self, MapObject::Stone(_))
    }

    pub fn is_sign(&self) -> bool {
        matches!(self, MapObject::Sign(_))
    }

    pub fn is_building(&self) -> bool {
        matches!(
            self,
            MapObject::SmallBuilding | MapObject::LargeBuilding | MapObject::Castle
        )
    }

    pub fn is_field(&self) -> bool {
        matches!(self, MapObject::Field(_) | MapObject::Seeds(_))
    }

    /// How many stones a pile still holds: a full pile counts 8, the last
    /// remnant counts 1.
    pub fn stone_value(&self) -> u32 {
        match self {
            MapObject::Stone(stage) => 1 + 7u32.saturating_sub(u32::from(*stage)),
            _ => 0,
        }
    }
}

/// Footprint a building needs on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingSize {
    Small,
    Large,
    Mine,
    Castle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuildingType {
    Fisher,
    Lumberjack,
    Boatbuilder,
    Stonecutter,
    StoneMine,
    CoalMine,
    IronMine,
    GoldMine,
    Forester,
    Stock,
    Hut,
    Farm,
    Butcher,
    PigFarm,
    Mill,
    Baker,
    Sawmill,
    SteelSmelter,
    ToolMaker,
    WeaponSmith,
    Tower,
    Fortress,
    GoldSmelter,
    Castle,
}

impl BuildingType {
    pub const ALL: [BuildingType; 24] = [
        BuildingType::Fisher,
        BuildingType::Lumberjack,
        BuildingType::Boatbuilder,
        BuildingType::Stonecutter,
        BuildingType::StoneMine,
        BuildingType::CoalMine,
        BuildingType::IronMine,
        BuildingType::GoldMine,
        BuildingType::Forester,
        BuildingType::Stock,
        BuildingType::Hut,
        BuildingType::Farm,
        BuildingType::Butcher,
        BuildingType::PigFarm,
        BuildingType::Mill,
        BuildingType::Baker,
        BuildingType::Sawmill,
        BuildingType::SteelSmelter,
        BuildingType::ToolMaker,
        BuildingType::WeaponSmith,
        BuildingType::Tower,
        BuildingType::Fortress,
        BuildingType::GoldSmelter,
        BuildingType::Castle,
    ];

    pub fn size(&self) -> BuildingSize {
        use BuildingType::*;
        match self {
            StoneMine | CoalMine | IronMine | GoldMine => BuildingSize::Mine,
            Castle => BuildingSize::Castle,
            Farm | PigFarm | Stock | Sawmill | SteelSmelter | ToolMaker | WeaponSmith
            | Fortress | GoldSmelter | Boatbuilder => BuildingSize::Large,
            _ => BuildingSize::Small,
        }
    }

    pub fn is_mine(&self) -> bool {
        self.size() == BuildingSize::Mine
    }

    pub fn is_military(&self) -> bool {
        matches!(
            self,
            BuildingType::Hut | BuildingType::Tower | BuildingType::Fortress | BuildingType::Castle
        )
    }

    /// Buildings that store resources and serve as economic hubs
    pub fn is_inventory(&self) -> bool {
        matches!(self, BuildingType::Stock | BuildingType::Castle)
    }

    pub fn name(&self) -> &'static str {
        use BuildingType::*;
        match self {
            Fisher => "fisher",
            Lumberjack => "lumberjack",
            Boatbuilder => "boatbuilder",
            Stonecutter => "stonecutter",
            StoneMine => "stone mine",
            CoalMine => "coal mine",
            IronMine => "iron mine",
            GoldMine => "gold mine",
            Forester => "forester",
            Stock => "stock",
            Hut => "hut",
            Farm => "farm",
            Butcher => "butcher",
            PigFarm => "pig farm",
            Mill => "mill",
            Baker => "baker",
            Sawmill => "sawmill",
            SteelSmelter => "steel smelter",
            ToolMaker => "toolmaker",
            WeaponSmith => "weaponsmith",
            Tower => "tower",
            Fortress => "fortress",
            GoldSmelter => "gold smelter",
            Castle => "castle",
        }
    }
}

impl std::fmt::Display for BuildingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Fish,
    Pig,
    Meat,
    Wheat,
    Flour,
    Bread,
    Lumber,
    Plank,
    Boat,
    Stone,
    IronOre,
    Steel,
    Coal,
    GoldOre,
    GoldBar,
    Shovel,
    Hammer,
    Rod,
    Cleaver,
    Scythe,
    Axe,
    Saw,
    Pick,
    Pincer,
    Sword,
    Shield,
}

impl ResourceType {
    pub const TOOLS: [ResourceType; 9] = [
        ResourceType::Shovel,
        ResourceType::Hammer,
        ResourceType::Rod,
        ResourceType::Cleaver,
        ResourceType::Scythe,
        ResourceType::Axe,
        ResourceType::Saw,
        ResourceType::Pick,
        ResourceType::Pincer,
    ];

    /// Food ready to be eaten by miners
    pub const FOODS: [ResourceType; 3] = [ResourceType::Bread, ResourceType::Meat, ResourceType::Fish];

    /// Raw inputs that will become food
    pub const FOOD_INPUTS: [ResourceType; 3] =
        [ResourceType::Pig, ResourceType::Wheat, ResourceType::Flour];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SerfType {
    Transporter,
    Sailor,
    Digger,
    Builder,
    Lumberjack,
    Sawmiller,
    Stonecutter,
    Forester,
    Miner,
    Smelter,
    Fisher,
    PigFarmer,
    Butcher,
    Farmer,
    Miller,
    Baker,
    BoatBuilder,
    Toolmaker,
    WeaponSmith,
    Geologist,
    Generic,
    Knight0,
    Knight1,
    Knight2,
    Knight3,
    Knight4,
}

impl SerfType {
    /// Professions that need a tool to be created from a generic serf
    pub const PROFESSIONS: [SerfType; 20] = [
        SerfType::Transporter,
        SerfType::Sailor,
        SerfType::Digger,
        SerfType::Builder,
        SerfType::Lumberjack,
        SerfType::Sawmiller,
        SerfType::Stonecutter,
        SerfType::Forester,
        SerfType::Miner,
        SerfType::Smelter,
        SerfType::Fisher,
        SerfType::PigFarmer,
        SerfType::Butcher,
        SerfType::Farmer,
        SerfType::Miller,
        SerfType::Baker,
        SerfType::BoatBuilder,
        SerfType::Toolmaker,
        SerfType::WeaponSmith,
        SerfType::Geologist,
    ];

    pub fn is_knight(&self) -> bool {
        *self >= SerfType::Knight0
    }

    /// Tool a generic serf needs to take up this profession, if any
    pub fn tool(&self) -> Option<ResourceType> {
        use SerfType::*;
        match self {
            Sailor => Some(ResourceType::Rod),
            Digger => Some(ResourceType::Shovel),
            Builder | Geologist | WeaponSmith | BoatBuilder | Toolmaker => {
                Some(ResourceType::Hammer)
            }
            Lumberjack => Some(ResourceType::Axe),
            Sawmiller => Some(ResourceType::Saw),
            Stonecutter | Miner => Some(ResourceType::Pick),
            Smelter | Miller | Baker => None,
            Fisher => Some(ResourceType::Rod),
            Butcher => Some(ResourceType::Cleaver),
            Farmer => Some(ResourceType::Scythe),
            Forester => Some(ResourceType::Shovel),
            _ => None,
        }
    }
}

/// Coarse serf activity, as far as the AI cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerfState {
    IdleInStock,
    IdleOnPath,
    /// Transporter parked on its road waiting for a free slot; can get stuck
    WaitIdleOnPath,
    Transporting,
    Walking,
    Working,
    Lost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_ranges() {
        assert!(Terrain::Water2.is_water());
        assert!(!Terrain::Grass0.is_water());
        assert!(Terrain::Tundra1.is_hills());
        assert!(Terrain::Snow0.is_hills());
        assert!(!Terrain::Snow1.is_hills());
        assert!(TerrainRange::GRASS.contains(Terrain::Grass3));
        assert!(!TerrainRange::GRASS.contains(Terrain::Desert0));
    }

    #[test]
    fn test_stone_value_by_pile_stage() {
        assert_eq!(MapObject::Stone(0).stone_value(), 8);
        assert_eq!(MapObject::Stone(7).stone_value(), 1);
        assert_eq!(MapObject::Tree(3).stone_value(), 0);
    }

    #[test]
    fn test_building_sizes() {
        assert_eq!(BuildingType::CoalMine.size(), BuildingSize::Mine);
        assert_eq!(BuildingType::Farm.size(), BuildingSize::Large);
        assert_eq!(BuildingType::Hut.size(), BuildingSize::Small);
        assert!(BuildingType::Hut.is_military());
        assert!(BuildingType::Stock.is_inventory());
    }

    #[test]
    fn test_knight_types() {
        assert!(SerfType::Knight3.is_knight());
        assert!(!SerfType::Geologist.is_knight());
        assert_eq!(SerfType::Miner.tool(), Some(ResourceType::Pick));
    }
}
