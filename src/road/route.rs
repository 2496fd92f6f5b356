//! Road representation and the outcomes of road searches

use serde::{Deserialize, Serialize};

use crate::spatial::{Direction, MapGeometry, MapPos};

/// Ordered list of steps from a source position
///
/// Length is the number of steps, not tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Road {
    source: MapPos,
    end: MapPos,
    dirs: Vec<Direction>,
}

impl Road {
    /// Empty road sitting at `source`
    pub fn new(source: MapPos) -> Self {
        Self {
            source,
            end: source,
            dirs: Vec::new(),
        }
    }

    /// Replay `dirs` from `source`
    pub fn from_dirs(geometry: &MapGeometry, source: MapPos, dirs: Vec<Direction>) -> Self {
        let end = dirs
            .iter()
            .fold(source, |pos, dir| geometry.move_pos(pos, *dir));
        Self { source, end, dirs }
    }

    pub fn source(&self) -> MapPos {
        self.source
    }

    pub fn end(&self) -> MapPos {
        self.end
    }

    pub fn dirs(&self) -> &[Direction] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn first_dir(&self) -> Option<Direction> {
        self.dirs.first().copied()
    }

    pub fn last_dir(&self) -> Option<Direction> {
        self.dirs.last().copied()
    }

    pub fn extend(&mut self, geometry: &MapGeometry, dir: Direction) {
        self.end = geometry.move_pos(self.end, dir);
        self.dirs.push(dir);
    }

    /// Every tile the road touches, source and end included
    pub fn positions(&self, geometry: &MapGeometry) -> Vec<MapPos> {
        let mut positions = Vec::with_capacity(self.dirs.len() + 1);
        let mut pos = self.source;
        positions.push(pos);
        for dir in &self.dirs {
            pos = geometry.move_pos(pos, *dir);
            positions.push(pos);
        }
        positions
    }

    pub fn has_pos(&self, geometry: &MapGeometry, pos: MapPos) -> bool {
        self.positions(geometry).contains(&pos)
    }

    /// Same road walked from the other end
    pub fn reversed(&self) -> Road {
        Road {
            source: self.end,
            end: self.source,
            dirs: self.dirs.iter().rev().map(|d| d.reverse()).collect(),
        }
    }

    /// Append `other`, which must start where this road ends
    pub fn join(&mut self, other: &Road) {
        debug_assert_eq!(self.end, other.source);
        self.dirs.extend_from_slice(&other.dirs);
        self.end = other.end;
    }
}

/// Outcome of a path search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResult {
    /// A path of at least one step
    Found(Road),
    /// Source and target coincide; nothing to walk
    Trivial,
    /// No path exists right now
    NoPath,
}

impl PathResult {
    pub fn is_found(&self) -> bool {
        matches!(self, PathResult::Found(_))
    }

    pub fn succeeded(&self) -> bool {
        !matches!(self, PathResult::NoPath)
    }

    pub fn road(self) -> Option<Road> {
        match self {
            PathResult::Found(road) => Some(road),
            _ => None,
        }
    }
}

/// Outcome of a road construction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoadOutcome {
    /// New roads were committed; the best one is returned
    Built { road: Road, roads_built: u32 },
    /// Best road found but deliberately not built
    Planned(Road),
    /// Already satisfied; no command was issued
    AlreadyConnected,
    /// Nothing was committed
    Failed,
}

impl RoadOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, RoadOutcome::Failed)
    }

    pub fn built_road(&self) -> Option<&Road> {
        match self {
            RoadOutcome::Built { road, .. } => Some(road),
            _ => None,
        }
    }

    /// Any road the outcome carries, built or only planned
    pub fn road(&self) -> Option<&Road> {
        match self {
            RoadOutcome::Built { road, .. } | RoadOutcome::Planned(road) => Some(road),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_tracks_end() {
        let geom = MapGeometry::new(32, 32);
        let start = geom.pos(4, 4);
        let mut road = Road::new(start);
        assert!(road.is_empty());
        road.extend(&geom, Direction::Right);
        road.extend(&geom, Direction::Down);
        assert_eq!(road.len(), 2);
        assert_eq!(road.end(), geom.pos(5, 5));
        assert_eq!(road.positions(&geom).len(), 3);
        assert!(road.has_pos(&geom, geom.pos(5, 4)));
    }

    #[test]
    fn test_reversed_road_ends_at_source() {
        let geom = MapGeometry::new(32, 32);
        let start = geom.pos(10, 10);
        let road = Road::from_dirs(
            &geom,
            start,
            vec![Direction::Right, Direction::Right, Direction::DownRight],
        );
        let back = road.reversed();
        assert_eq!(back.source(), road.end());
        assert_eq!(back.end(), start);
        assert_eq!(back.first_dir(), Some(Direction::UpLeft));
        assert_eq!(Road::from_dirs(&geom, back.source(), back.dirs().to_vec()).end(), start);
    }

    #[test]
    fn test_join_roads() {
        let geom = MapGeometry::new(32, 32);
        let a = Road::from_dirs(&geom, geom.pos(0, 0), vec![Direction::Right]);
        let b = Road::from_dirs(&geom, a.end(), vec![Direction::Down, Direction::Down]);
        let mut joined = a.clone();
        joined.join(&b);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.end(), geom.pos(1, 2));
    }

    #[test]
    fn test_outcome_success_flags() {
        assert!(RoadOutcome::AlreadyConnected.succeeded());
        assert!(!RoadOutcome::Failed.succeeded());
        assert!(PathResult::Trivial.succeeded());
        assert!(!PathResult::NoPath.succeeded());
        assert!(PathResult::NoPath.road().is_none());
    }
}
