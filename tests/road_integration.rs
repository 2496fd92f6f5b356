//! Integration tests for the road builder against a simulated world
//!
//! - An already satisfied request issues no commands, whatever the policy
//! - A request that cannot be satisfied leaves the world exactly as it was

use proptest::prelude::*;
use serf_ai::core::config::RoadConfig;
use serf_ai::core::types::{BuildingType, MapObject};
use serf_ai::road::{RoadBuilder, RoadOption, RoadOptions, RoadOutcome, RoadRequest};
use serf_ai::spatial::{MapGeometry, MapPos};
use serf_ai::world::{SharedWorld, SimWorld};

struct Scenario {
    shared: SharedWorld<SimWorld>,
    geom: MapGeometry,
    castle_flag: MapPos,
    config: RoadConfig,
}

fn scenario() -> Scenario {
    let geom = MapGeometry::new(48, 48);
    let mut world = SimWorld::new(geom);
    let castle = geom.pos(10, 10);
    world.claim_area(castle, 14, 0);
    world.place_building(castle, BuildingType::Castle, 0, true, true);
    Scenario {
        shared: SharedWorld::new(world),
        geom,
        castle_flag: geom.flag_of_building(castle),
        config: RoadConfig::default(),
    }
}

impl Scenario {
    fn builder(&self) -> RoadBuilder<'_, SimWorld> {
        RoadBuilder::new(&self.shared, 0, &self.config)
            .castle_flag(Some(self.castle_flag))
            .home_flag(Some(self.castle_flag))
    }
}

/// Options picked by bit mask, never including `Improve`
fn options_from_mask(mask: u16, allow_improve: bool) -> RoadOptions {
    let mut options = RoadOptions::empty();
    for (i, option) in RoadOption::ALL.into_iter().enumerate() {
        if mask & (1 << i) != 0 && (allow_improve || option != RoadOption::Improve) {
            options.insert(option);
        }
    }
    options
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_satisfied_request_is_a_no_op(mask in 0u16..4096) {
        let sc = scenario();
        let source = sc.geom.pos(17, 12);
        sc.shared.write(|w| w.place_flag(source, 0));
        let first = sc
            .builder()
            .build_best_road(&RoadRequest::new(source, RoadOptions::default()).to_target(sc.castle_flag));
        prop_assert!(first.built_road().is_some());
        let commands = sc.shared.read(|w| w.commands().len());

        let options = options_from_mask(mask, false);
        let again = sc
            .builder()
            .build_best_road(&RoadRequest::new(source, options).to_target(sc.castle_flag));
        prop_assert_eq!(again, RoadOutcome::AlreadyConnected);
        prop_assert_eq!(sc.shared.read(|w| w.commands().len()), commands);
    }

    #[test]
    fn prop_impossible_request_changes_nothing(mask in 0u16..4096) {
        let sc = scenario();
        let source = sc.geom.pos(18, 18);
        sc.shared.write(|w| {
            w.place_flag(source, 0);
            for n in sc.geom.neighbors(source) {
                w.set_object(n, MapObject::Stone(0));
            }
        });
        let flags = sc.shared.read(|w| w.flag_count(0));

        let options = options_from_mask(mask, true);
        let outcome = sc.builder().build_best_road(&RoadRequest::new(source, options));
        prop_assert_eq!(outcome, RoadOutcome::Failed);
        prop_assert!(sc.shared.read(|w| w.commands().is_empty()));
        prop_assert_eq!(sc.shared.read(|w| w.flag_count(0)), flags);
        prop_assert_eq!(sc.shared.read(|w| w.path_segment_count()), 0);
    }
}

#[test]
fn test_plot_only_leaves_world_untouched() {
    let sc = scenario();
    let source = sc.geom.pos(20, 14);
    sc.shared.write(|w| w.place_flag(source, 0));
    let options = RoadOptions::default().with(RoadOption::PlotOnlyNoBuild);
    let outcome = sc
        .builder()
        .build_best_road(&RoadRequest::new(source, options).to_target(sc.castle_flag));
    assert!(matches!(outcome, RoadOutcome::Planned(_)));
    assert!(sc.shared.read(|w| w.commands().is_empty()));
    assert_eq!(sc.shared.read(|w| w.path_segment_count()), 0);
}
