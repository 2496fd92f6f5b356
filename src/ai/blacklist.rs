//! Positions the AI has given up on for this session
//!
//! Entries are only ever added. Nothing is persisted, so a new controller
//! starts with an empty list.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::core::types::BuildingType;
use crate::spatial::MapPos;

/// What was rejected at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteKind {
    /// A lone flag, e.g. for geologists
    Flag,
    Building(BuildingType),
}

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: AHashSet<(MapPos, SiteKind)>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the entry was already present
    pub fn insert(&mut self, pos: MapPos, kind: SiteKind) -> bool {
        self.entries.insert((pos, kind))
    }

    pub fn contains(&self, pos: MapPos, kind: SiteKind) -> bool {
        self.entries.contains(&(pos, kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_keyed_by_kind() {
        let mut list = Blacklist::new();
        let pos = MapPos(42);
        assert!(list.insert(pos, SiteKind::Building(BuildingType::Stonecutter)));
        assert!(!list.insert(pos, SiteKind::Building(BuildingType::Stonecutter)));
        assert!(list.contains(pos, SiteKind::Building(BuildingType::Stonecutter)));
        assert!(!list.contains(pos, SiteKind::Building(BuildingType::Lumberjack)));
        assert!(!list.contains(pos, SiteKind::Flag));
        assert_eq!(list.len(), 1);
    }
}
