//! Preferred road targets per building type
//!
//! A building's products travel best when its flag sits close (in flags) to
//! the buildings consuming them, so new roads aim for those first.

use crate::core::types::{BuildingType, PlayerIndex};
use crate::road::pathfinder::find_flag_and_tile_dist;
use crate::spatial::MapPos;
use crate::world::World;

/// Up to two building types a building of `kind` should be connected toward
pub fn affinity(kind: BuildingType) -> [Option<BuildingType>; 2] {
    use BuildingType::*;
    match kind {
        Lumberjack => [Some(Sawmill), None],
        StoneMine => [Some(Baker), None],
        CoalMine => [Some(WeaponSmith), Some(SteelSmelter)],
        IronMine => [Some(Baker), Some(SteelSmelter)],
        GoldMine => [Some(Baker), Some(GoldSmelter)],
        Farm => [Some(Mill), None],
        Butcher => [Some(GoldMine), Some(IronMine)],
        PigFarm => [Some(Butcher), Some(CoalMine)],
        Mill => [Some(Farm), None],
        Baker => [Some(Mill), Some(CoalMine)],
        SteelSmelter => [Some(IronMine), Some(CoalMine)],
        WeaponSmith => [Some(SteelSmelter), Some(CoalMine)],
        GoldSmelter => [Some(GoldMine), Some(CoalMine)],
        _ => [None, None],
    }
}

/// Flag of the nearest building of `kind` whose flag has a road
pub fn find_nearest_connected_building<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    pos: MapPos,
    kind: BuildingType,
) -> Option<MapPos> {
    let geometry = world.geometry();
    world
        .player_buildings(player)
        .into_iter()
        .filter(|b| b.kind == kind && !b.burning)
        .map(|b| geometry.flag_of_building(b.pos))
        .filter(|flag| world.is_connected(*flag))
        .min_by_key(|flag| (geometry.distance(pos, *flag), *flag))
}

/// Affinity target flags for a road starting at `flag`
///
/// `kind` names the building the road is for; without it the building
/// attached to `flag` is used. Stops at the first affinity with no
/// connected building.
pub fn affinity_targets<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    flag: MapPos,
    kind: Option<BuildingType>,
) -> Vec<MapPos> {
    let request = kind.or_else(|| world.flag_at(flag).and_then(|f| f.building));
    let Some(request) = request else {
        return Vec::new();
    };
    let mut targets = Vec::new();
    for wanted in affinity(request).into_iter().flatten() {
        match find_nearest_connected_building(world, player, flag, wanted) {
            Some(target) => targets.push(target),
            None => break,
        }
    }
    targets
}

/// Flag of the inventory the resources at `pos` would go to
///
/// Prefers the fewest tiles over the existing network and falls back to
/// straight-line distance for inventories not reachable by road.
pub fn find_nearest_inventory<W: World + ?Sized>(
    world: &W,
    player: PlayerIndex,
    pos: MapPos,
) -> Option<MapPos> {
    let geometry = world.geometry();
    let inventories: Vec<MapPos> = world
        .player_buildings(player)
        .into_iter()
        .filter(|b| b.kind.is_inventory() && b.done && !b.burning)
        .map(|b| geometry.flag_of_building(b.pos))
        .collect();

    if world.has_flag(pos) {
        let by_road = inventories
            .iter()
            .filter_map(|inv| {
                find_flag_and_tile_dist(world, pos, *inv, None).map(|s| (s.tile_dist, *inv))
            })
            .min();
        if let Some((_, inv)) = by_road {
            return Some(inv);
        }
    }
    inventories
        .into_iter()
        .min_by_key(|inv| (geometry.distance(pos, *inv), *inv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::Road;
    use crate::spatial::{Direction, MapGeometry};
    use crate::world::SimWorld;

    #[test]
    fn test_affinity_table() {
        assert_eq!(
            affinity(BuildingType::CoalMine),
            [Some(BuildingType::WeaponSmith), Some(BuildingType::SteelSmelter)]
        );
        assert_eq!(affinity(BuildingType::Hut), [None, None]);
    }

    #[test]
    fn test_affinity_targets_need_connected_buildings() {
        let geom = MapGeometry::new(32, 32);
        let mut world = SimWorld::new(geom);
        let castle = geom.pos(5, 5);
        world.place_building(castle, BuildingType::Castle, 0, true, true);
        let sawmill = geom.pos(10, 5);
        world.place_building(sawmill, BuildingType::Sawmill, 0, true, true);
        let flag = geom.pos(12, 12);
        world.place_flag(flag, 0);

        let targets = affinity_targets(&world, 0, flag, Some(BuildingType::Lumberjack));
        assert!(targets.is_empty());

        let road = Road::from_dirs(
            &geom,
            geom.flag_of_building(castle),
            vec![Direction::Right; 5],
        );
        world.place_road(&road);
        let targets = affinity_targets(&world, 0, flag, Some(BuildingType::Lumberjack));
        assert_eq!(targets, vec![geom.flag_of_building(sawmill)]);
    }

    #[test]
    fn test_nearest_inventory_prefers_road_distance() {
        let geom = MapGeometry::new(48, 48);
        let mut world = SimWorld::new(geom);
        let castle = geom.pos(4, 10);
        let stock = geom.pos(12, 17);
        world.place_building(castle, BuildingType::Castle, 0, true, true);
        world.place_building(stock, BuildingType::Stock, 0, true, true);
        let flag = geom.pos(12, 20);
        world.place_flag(flag, 0);

        assert_eq!(find_nearest_inventory(&world, 0, flag), Some(geom.flag_of_building(stock)));

        let castle_flag = geom.flag_of_building(castle);
        let road = Road::from_dirs(&geom, castle_flag, vec![Direction::Down; 9]);
        world.place_flag(road.end(), 0);
        world.place_road(&road);
        let link = Road::from_dirs(&geom, road.end(), vec![Direction::Right; 7]);
        world.place_road(&link);
        assert_eq!(link.end(), flag);
        assert_eq!(find_nearest_inventory(&world, 0, flag), Some(castle_flag));
    }
}
