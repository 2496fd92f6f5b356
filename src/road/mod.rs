//! Road network search and construction
//!
//! Architecture: exact search + heuristic builder
//! - `pathfinder` walks existing roads (A*) and plots new ones
//! - `builder` picks targets, scores candidate routes under a `RoadOptions`
//!   policy and commits the best one, or nothing at all
//! - `affinity` knows which buildings a new road should aim for

pub mod affinity;
pub mod builder;
pub mod options;
pub mod pathfinder;
pub mod route;

pub use affinity::{affinity, affinity_targets, find_nearest_inventory};
pub use builder::{RoadBuilder, RoadRequest};
pub use options::{RoadOption, RoadOptions};
pub use pathfinder::{
    find_existing_path, find_flag_and_tile_dist, flag_network, plot_road, trace_existing_road,
    FlagScore, PlotConstraints, PlotResult,
};
pub use route::{PathResult, Road, RoadOutcome};
