//! Ranked candidate positions
//!
//! Scores are collected per position and handed back best first. Ties keep
//! the order in which positions were discovered.

use serde::{Deserialize, Serialize};

use crate::placement::scorer::Scan;
use crate::placement::Feature;
use crate::spatial::{Direction, MapGeometry, MapPos};
use crate::world::World;

/// Candidate site and its score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub pos: MapPos,
    pub score: u32,
}

/// Scored positions with an optional acceptance floor
///
/// Positions scoring below the floor never enter the set. Inserting a
/// position twice keeps the higher score and the earlier discovery slot.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<Candidate>,
    minimum: u32,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minimum(minimum: u32) -> Self {
        Self {
            entries: Vec::new(),
            minimum,
        }
    }

    /// Returns whether the candidate was accepted
    pub fn insert(&mut self, pos: MapPos, score: u32) -> bool {
        if score < self.minimum {
            return false;
        }
        match self.entries.iter_mut().find(|c| c.pos == pos) {
            Some(existing) => existing.score = existing.score.max(score),
            None => self.entries.push(Candidate { pos, score }),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pos: MapPos) -> bool {
        self.entries.iter().any(|c| c.pos == pos)
    }

    /// Candidates best first
    pub fn ranked(&self) -> Vec<Candidate> {
        let mut ranked = self.entries.clone();
        // stable sort keeps discovery order among equal scores
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    pub fn ranked_positions(&self) -> Vec<MapPos> {
        self.ranked().into_iter().map(|c| c.pos).collect()
    }

    /// Candidates worst first
    pub fn ranked_ascending(&self) -> Vec<Candidate> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| a.score.cmp(&b.score));
        ranked
    }
}

/// The six positions `distance` straight steps out from `center`, one per
/// direction, starting with `first_dir` and going clockwise
pub fn get_corners(geometry: &MapGeometry, center: MapPos, distance: u32, first_dir: Direction) -> Vec<MapPos> {
    first_dir
        .cycle_from()
        .iter()
        .map(|dir| geometry.move_n(center, *dir, distance))
        .collect()
}

/// Score the corners around every center by `feature` within `scan_distance`
/// and keep those reaching `minimum`
pub fn rank_corners<W: World + ?Sized>(
    world: &W,
    centers: &[MapPos],
    corner_distance: u32,
    scan_distance: u32,
    feature: Feature,
    minimum: u32,
    first_dir: Direction,
) -> CandidateSet {
    let geometry = world.geometry();
    let mut set = CandidateSet::with_minimum(minimum);
    for center in centers {
        for corner in get_corners(&geometry, *center, corner_distance, first_dir) {
            let score = Scan::new(corner, scan_distance, feature).count(world);
            set.insert(corner, score);
        }
    }
    set
}
