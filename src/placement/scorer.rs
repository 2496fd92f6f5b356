//! Feature counting over spiral areas
//!
//! Every scan walks the first `distance` spiral positions around a center,
//! where `distance` is normally `spiral_dist(rings)`.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::core::config::PlacementConfig;
use crate::core::types::{BuildingSize, MapObject, Ore, PlayerIndex, Sign, TerrainRange};
use crate::spatial::{Direction, MapPos};
use crate::world::World;

/// Object classes the scorer can count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Trees,
    /// Stone piles, one per pile regardless of size
    Stones,
    /// Any geologist sign, including empty ones
    Signs,
    /// Signs reporting a find of this ore, large or small
    OreSigns(Ore),
    LargeSign(Ore),
    SmallSign(Ore),
    Fields,
}

impl ObjectClass {
    pub fn matches(&self, object: MapObject) -> bool {
        match self {
            ObjectClass::Trees => object.is_tree(),
            ObjectClass::Stones => object.is_stone(),
            ObjectClass::Signs => object.is_sign(),
            ObjectClass::OreSigns(ore) => matches!(
                object,
                MapObject::Sign(Sign::Large(o)) | MapObject::Sign(Sign::Small(o)) if o == *ore
            ),
            ObjectClass::LargeSign(ore) => object == MapObject::Sign(Sign::Large(*ore)),
            ObjectClass::SmallSign(ore) => object == MapObject::Sign(Sign::Small(*ore)),
            ObjectClass::Fields => object.is_field(),
        }
    }
}

/// What a scan counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Terrain(TerrainRange),
    /// Terrain in range with nothing standing on it (signs and fields are fine)
    EmptyTerrain(TerrainRange),
    Objects(ObjectClass),
    /// Grass with no path and nothing blocking a farmer
    FarmableLand,
    /// Grass or water where nothing stands yet
    OpenLand,
}

impl Feature {
    pub fn matches<W: World + ?Sized>(&self, world: &W, pos: MapPos) -> bool {
        match self {
            Feature::Terrain(range) => range.contains(world.terrain_at(pos)),
            Feature::EmptyTerrain(range) => {
                let object = world.object_at(pos);
                range.contains(world.terrain_at(pos))
                    && (matches!(object, MapObject::None | MapObject::Sign(_)) || object.is_field())
            }
            Feature::Objects(class) => class.matches(world.object_at(pos)),
            Feature::FarmableLand => {
                let object = world.object_at(pos);
                TerrainRange::GRASS.contains(world.terrain_at(pos))
                    && (object == MapObject::None || object.is_field())
                    && !world.has_any_path(pos)
            }
            Feature::OpenLand => {
                let terrain = world.terrain_at(pos);
                world.object_at(pos) == MapObject::None
                    && (terrain.is_grass() || terrain.is_water())
            }
        }
    }
}

/// A bounded spiral scan for one feature
#[derive(Debug, Clone, Copy)]
pub struct Scan {
    pub center: MapPos,
    pub distance: u32,
    pub feature: Feature,
}

impl Scan {
    pub fn new(center: MapPos, distance: u32, feature: Feature) -> Self {
        Self {
            center,
            distance,
            feature,
        }
    }

    pub fn count<W: World + ?Sized>(&self, world: &W) -> u32 {
        world
            .geometry()
            .spiral(self.center, self.distance)
            .filter(|pos| self.feature.matches(world, *pos))
            .count() as u32
    }

    /// Matching positions in visiting order, for diagnostic overlays
    pub fn positions<W: World + ?Sized>(&self, world: &W) -> Vec<MapPos> {
        world
            .geometry()
            .spiral(self.center, self.distance)
            .filter(|pos| self.feature.matches(world, *pos))
            .collect()
    }
}

pub fn count_terrain_near_pos<W: World + ?Sized>(
    world: &W,
    center: MapPos,
    distance: u32,
    range: TerrainRange,
) -> u32 {
    Scan::new(center, distance, Feature::Terrain(range)).count(world)
}

pub fn count_empty_terrain_near_pos<W: World + ?Sized>(
    world: &W,
    center: MapPos,
    distance: u32,
    range: TerrainRange,
) -> u32 {
    Scan::new(center, distance, Feature::EmptyTerrain(range)).count(world)
}

pub fn count_objects_near_pos<W: World + ?Sized>(
    world: &W,
    center: MapPos,
    distance: u32,
    class: ObjectClass,
) -> u32 {
    Scan::new(center, distance, Feature::Objects(class)).count(world)
}

pub fn count_farmable_land<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> u32 {
    Scan::new(center, distance, Feature::FarmableLand).count(world)
}

/// Weighted stone count: a full pile is worth 8, the last remnant 1
///
/// Piles with a building down-right of them cannot be reached by a
/// stonecutter and count nothing.
pub fn count_stones_near_pos<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> u32 {
    let geometry = world.geometry();
    geometry
        .spiral(center, distance)
        .filter(|pos| !world.has_building(geometry.move_pos(*pos, Direction::DownRight)))
        .map(|pos| world.object_at(pos).stone_value())
        .sum()
}

/// Signs per empty hill tile; zero when there are no hills at all
pub fn count_geologist_sign_density<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> f64 {
    let signs = count_objects_near_pos(world, center, distance, ObjectClass::Signs);
    let hills = count_empty_terrain_near_pos(world, center, distance, TerrainRange::HILLS);
    if hills == 0 {
        return 0.0;
    }
    f64::from(signs) / f64::from(hills)
}

/// Building-site capacity: large sites count three, small sites one
///
/// Ownership is ignored, so this also rates land nobody has claimed yet.
pub fn count_building_sites<W: World + ?Sized>(world: &W, center: MapPos, distance: u32) -> u32 {
    world
        .geometry()
        .spiral(center, distance)
        .map(|pos| match world.site_size(pos) {
            Some(BuildingSize::Large) => 3,
            Some(BuildingSize::Small) => 1,
            _ => 0,
        })
        .sum()
}

// ============================================================================
// Expansion scoring
// ============================================================================

/// Reasons to push the border in some direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExpansionGoal {
    Foods,
    Trees,
    Stones,
    Hills,
    IronOre,
    Coal,
    GoldOre,
    /// Shield own civilian buildings from nearby enemy land
    CreateBuffer,
}

/// Goals active this cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionGoals {
    goals: AHashSet<ExpansionGoal>,
}

impl ExpansionGoals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, goal: ExpansionGoal) {
        self.goals.insert(goal);
    }

    pub fn contains(&self, goal: ExpansionGoal) -> bool {
        self.goals.contains(&goal)
    }

    pub fn clear(&mut self) {
        self.goals.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    /// Goals in a stable order, for logging
    pub fn sorted(&self) -> Vec<ExpansionGoal> {
        let mut goals: Vec<ExpansionGoal> = self.goals.iter().copied().collect();
        goals.sort();
        goals
    }

    fn weight(&self, goal: ExpansionGoal, weight: u32) -> u32 {
        if self.contains(goal) {
            weight
        } else {
            0
        }
    }
}

impl FromIterator<ExpansionGoal> for ExpansionGoals {
    fn from_iter<I: IntoIterator<Item = ExpansionGoal>>(iter: I) -> Self {
        Self {
            goals: iter.into_iter().collect(),
        }
    }
}

fn sign_strength(object: MapObject, ore: Ore) -> u32 {
    match object {
        MapObject::Sign(Sign::Large(o)) if o == ore => 3,
        MapObject::Sign(Sign::Small(o)) if o == ore => 1,
        _ => 0,
    }
}

/// Value of the area around `center` for the current expansion goals
pub fn score_area<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    center: MapPos,
    distance: u32,
    goals: &ExpansionGoals,
    weights: &PlacementConfig,
) -> u32 {
    let mut total = 0;
    for pos in world.geometry().spiral(center, distance) {
        let object = world.object_at(pos);
        let terrain = world.terrain_at(pos);
        let mut value = 0;

        let open = object == MapObject::None && (terrain.is_grass() || terrain.is_water());
        if open || object.is_field() {
            value += goals.weight(ExpansionGoal::Foods, weights.foods_weight);
        }
        if object.is_tree() {
            value += goals.weight(ExpansionGoal::Trees, weights.trees_weight);
        }
        value += goals.weight(ExpansionGoal::Stones, weights.stones_weight) * object.stone_value();
        if terrain.is_hills() && !object.is_sign() {
            value += goals.weight(ExpansionGoal::Hills, weights.hills_weight);
        }
        value += goals.weight(ExpansionGoal::GoldOre, weights.gold_ore_weight) * sign_strength(object, Ore::Gold);
        value += goals.weight(ExpansionGoal::IronOre, weights.iron_ore_weight) * sign_strength(object, Ore::Iron);
        value += goals.weight(ExpansionGoal::Coal, weights.coal_weight) * sign_strength(object, Ore::Coal);
        value += goals.weight(ExpansionGoal::Stones, weights.stone_signs_weight) * sign_strength(object, Ore::Stone);

        if goals.contains(ExpansionGoal::CreateBuffer) {
            match world.owner_of(pos) {
                Some(owner) if owner == player => {
                    let civilian = world.building_at(pos).map_or(false, |b| !b.kind.is_military());
                    if civilian {
                        value += match object {
                            MapObject::LargeBuilding => 3,
                            MapObject::SmallBuilding => 1,
                            _ => 0,
                        };
                    }
                }
                Some(_) => value += 1,
                None => {}
            }
        }
        total += value;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BuildingType, Terrain};
    use crate::spatial::{spiral_dist, MapGeometry};
    use crate::world::SimWorld;

    fn world() -> (SimWorld, MapGeometry) {
        let geom = MapGeometry::new(32, 32);
        (SimWorld::new(geom), geom)
    }

    #[test]
    fn test_count_objects_in_radius() {
        let (mut world, geom) = world();
        let center = geom.pos(10, 10);
        world.set_object(geom.pos(11, 10), MapObject::Tree(0));
        world.set_object(geom.pos(12, 12), MapObject::Pine(3));
        world.set_object(geom.pos(20, 20), MapObject::Tree(1));
        assert_eq!(count_objects_near_pos(&world, center, spiral_dist(3), ObjectClass::Trees), 2);
        assert_eq!(count_objects_near_pos(&world, center, spiral_dist(1), ObjectClass::Trees), 1);
        assert_eq!(count_objects_near_pos(&world, center, spiral_dist(3), ObjectClass::Stones), 0);
    }

    #[test]
    fn test_empty_terrain_ignores_blocked_tiles() {
        let (mut world, geom) = world();
        let center = geom.pos(8, 8);
        world.paint_terrain(center, 1, Terrain::Tundra0);
        world.set_object(center, MapObject::Stone(0));
        world.set_object(geom.pos(9, 8), MapObject::Sign(Sign::Empty));
        assert_eq!(count_terrain_near_pos(&world, center, spiral_dist(1), TerrainRange::HILLS), 7);
        assert_eq!(count_empty_terrain_near_pos(&world, center, spiral_dist(1), TerrainRange::HILLS), 6);
    }

    #[test]
    fn test_stone_value_skips_unreachable_piles() {
        let (mut world, geom) = world();
        let center = geom.pos(10, 10);
        let pile = geom.pos(10, 11);
        world.set_object(center, MapObject::Stone(0));
        world.set_object(pile, MapObject::Stone(6));
        assert_eq!(count_stones_near_pos(&world, center, spiral_dist(2)), 8 + 2);

        world.place_building(geom.move_pos(pile, Direction::DownRight), BuildingType::Hut, 0, true, true);
        assert_eq!(count_stones_near_pos(&world, center, spiral_dist(2)), 8);
    }

    #[test]
    fn test_farmable_land_excludes_paths() {
        let (mut world, geom) = world();
        let center = geom.pos(10, 10);
        let all = count_farmable_land(&world, center, spiral_dist(1));
        assert_eq!(all, 7);
        world.set_object(center, MapObject::Field(2));
        world.set_object(geom.pos(11, 10), MapObject::Tree(0));
        assert_eq!(count_farmable_land(&world, center, spiral_dist(1)), 6);
    }

    #[test]
    fn test_sign_density() {
        let (mut world, geom) = world();
        let center = geom.pos(10, 10);
        assert_eq!(count_geologist_sign_density(&world, center, spiral_dist(1)), 0.0);
        world.paint_terrain(center, 1, Terrain::Tundra1);
        world.set_object(center, MapObject::Sign(Sign::Small(Ore::Coal)));
        let density = count_geologist_sign_density(&world, center, spiral_dist(1));
        assert!((density - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_area_follows_goals() {
        let (mut world, geom) = world();
        let center = geom.pos(16, 16);
        world.paint_terrain(center, 4, Terrain::Desert0);
        world.set_object(geom.pos(17, 16), MapObject::Tree(0));
        world.set_object(geom.pos(16, 17), MapObject::Sign(Sign::Large(Ore::Gold)));
        let weights = PlacementConfig::default();

        let none = ExpansionGoals::new();
        assert_eq!(score_area(&world, 0, center, spiral_dist(2), &none, &weights), 0);

        let trees: ExpansionGoals = [ExpansionGoal::Trees].into_iter().collect();
        assert_eq!(score_area(&world, 0, center, spiral_dist(2), &trees, &weights), 2);

        let gold: ExpansionGoals = [ExpansionGoal::GoldOre].into_iter().collect();
        assert_eq!(score_area(&world, 0, center, spiral_dist(2), &gold, &weights), 15);
    }

    #[test]
    fn test_building_sites_ignore_ownership() {
        let (mut world, geom) = world();
        let center = geom.pos(16, 16);
        let open = count_building_sites(&world, center, spiral_dist(1));
        assert_eq!(open, 7 * 3);

        world.paint_terrain(center, 1, Terrain::Water0);
        assert_eq!(count_building_sites(&world, center, spiral_dist(1)), 0);
    }
}
