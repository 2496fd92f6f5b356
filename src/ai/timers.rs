//! Deadline timers for self-healing checks
//!
//! A suspect condition is armed once with a future deadline. Re-arming an
//! armed key leaves the original deadline alone, so a condition that keeps
//! being rediscovered still fires on schedule.

use std::hash::Hash;

use ahash::AHashMap;

use crate::core::types::Tick;

#[derive(Debug, Clone)]
pub struct Timers<K: Eq + Hash + Copy + Ord> {
    deadlines: AHashMap<K, Tick>,
}

impl<K: Eq + Hash + Copy + Ord> Default for Timers<K> {
    fn default() -> Self {
        Self {
            deadlines: AHashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy + Ord> Timers<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer expiring `delay` ticks after `now`
    ///
    /// Returns false if `key` was already armed.
    pub fn arm(&mut self, key: K, now: Tick, delay: Tick) -> bool {
        if self.deadlines.contains_key(&key) {
            return false;
        }
        self.deadlines.insert(key, now.saturating_add(delay));
        true
    }

    pub fn deadline(&self, key: K) -> Option<Tick> {
        self.deadlines.get(&key).copied()
    }

    pub fn contains(&self, key: K) -> bool {
        self.deadlines.contains_key(&key)
    }

    pub fn remove(&mut self, key: K) -> Option<Tick> {
        self.deadlines.remove(&key)
    }

    /// Keys whose deadline is at or before `now`, in key order
    pub fn due(&self, now: Tick) -> Vec<K> {
        let mut due: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        due.sort();
        due
    }

    /// Every armed key, in key order
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.deadlines.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_is_not_due_before_deadline() {
        let mut timers: Timers<u32> = Timers::new();
        assert!(timers.arm(7, 500, 10_000));
        assert!(timers.due(10_499).is_empty());
        assert_eq!(timers.due(10_500), vec![7]);
        assert_eq!(timers.due(50_000), vec![7]);
    }

    #[test]
    fn test_rearm_keeps_original_deadline() {
        let mut timers: Timers<u32> = Timers::new();
        assert!(timers.arm(1, 0, 100));
        assert!(!timers.arm(1, 90, 100));
        assert_eq!(timers.deadline(1), Some(100));
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_due_is_sorted_and_remove_clears() {
        let mut timers: Timers<u32> = Timers::new();
        timers.arm(9, 0, 5);
        timers.arm(3, 0, 5);
        timers.arm(5, 0, 50);
        assert_eq!(timers.due(10), vec![3, 9]);
        assert_eq!(timers.remove(3), Some(5));
        assert!(!timers.contains(3));
        assert_eq!(timers.due(10), vec![9]);
    }
}
