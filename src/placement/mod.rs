//! Site evaluation for new buildings
//!
//! Architecture: count, rank, try
//! - `scorer` counts terrain and objects inside spiral areas
//! - `candidates` collects scored positions and hands them back best first
//! - Callers try candidates in order and report a [`PlacementResult`]

pub mod candidates;
pub mod scorer;

pub use candidates::{get_corners, rank_corners, Candidate, CandidateSet};
pub use scorer::{
    count_building_sites, count_empty_terrain_near_pos, count_farmable_land,
    count_geologist_sign_density, count_objects_near_pos, count_stones_near_pos,
    count_terrain_near_pos, score_area, ExpansionGoal, ExpansionGoals, Feature, ObjectClass, Scan,
};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::spatial::MapPos;

/// Outcome of trying to place something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum PlacementResult {
    /// Placed at this position
    #[display(fmt = "found {}", _0)]
    Found(MapPos),
    /// Nothing suitable here; other areas may still work
    #[display(fmt = "not found")]
    NotFound,
    /// A limit was hit; callers should stop placing for now
    #[display(fmt = "stop search")]
    StopSearch,
}

impl PlacementResult {
    pub fn is_found(&self) -> bool {
        matches!(self, PlacementResult::Found(_))
    }

    pub fn pos(&self) -> Option<MapPos> {
        match self {
            PlacementResult::Found(pos) => Some(*pos),
            _ => None,
        }
    }
}
