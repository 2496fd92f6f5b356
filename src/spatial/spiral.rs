//! Spiral enumeration of positions by increasing ring distance
//!
//! Index 0 is the center, indices 1..=6 are ring 1, the next 12 are ring 2,
//! and so on. Every area scan in the AI walks this order with an upper
//! bound taken from [`spiral_dist`].

use crate::spatial::hex::{Direction, MapGeometry, MapPos};

/// Number of positions in ring `r`
pub fn ring_size(r: u32) -> u32 {
    if r == 0 {
        1
    } else {
        6 * r
    }
}

/// Total positions within radius `r`, center included
pub fn spiral_dist(r: u32) -> u32 {
    1 + 3 * r * (r + 1)
}

/// Ring an index of the spiral falls on
pub fn ring_of_index(index: u32) -> u32 {
    let mut r = 0;
    while spiral_dist(r) <= index {
        r += 1;
    }
    r
}

/// Column/row offset of the spiral position at `index`
///
/// Ring `r` starts `r` steps up-left of the center and walks each of the six
/// sides clockwise, `r` steps per side.
pub fn spiral_offset(index: u32) -> (i32, i32) {
    if index == 0 {
        return (0, 0);
    }
    let r = ring_of_index(index);
    let k = index - spiral_dist(r - 1);
    let side = (k / r) as usize;
    let step = (k % r) as i32;
    let r = r as i32;

    let (sc, sr) = Direction::UpLeft.offset();
    let (mut dc, mut dr) = (sc * r, sr * r);
    for dir in &Direction::ALL[..side] {
        let (oc, or) = dir.offset();
        dc += oc * r;
        dr += or * r;
    }
    let (oc, or) = Direction::ALL[side].offset();
    (dc + oc * step, dr + or * step)
}

/// Lazy, restartable walk over the first `end` spiral positions around a center
#[derive(Debug, Clone)]
pub struct SpiralIter {
    geometry: MapGeometry,
    center: MapPos,
    index: u32,
    end: u32,
}

impl SpiralIter {
    pub fn new(geometry: MapGeometry, center: MapPos, end: u32) -> Self {
        Self {
            geometry,
            center,
            index: 0,
            end,
        }
    }

    /// Walk only the indices `start..end`
    pub fn range(geometry: MapGeometry, center: MapPos, start: u32, end: u32) -> Self {
        Self {
            geometry,
            center,
            index: start.min(end),
            end,
        }
    }

    pub fn center(&self) -> MapPos {
        self.center
    }
}

impl Iterator for SpiralIter {
    type Item = MapPos;

    fn next(&mut self) -> Option<MapPos> {
        if self.index >= self.end {
            return None;
        }
        let (dc, dr) = spiral_offset(self.index);
        self.index += 1;
        Some(self.geometry.move_by(self.center, dc, dr))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.end - self.index) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SpiralIter {}

impl MapGeometry {
    /// Spiral walk over the first `count` positions around `center`
    pub fn spiral(&self, center: MapPos, count: u32) -> SpiralIter {
        SpiralIter::new(*self, center, count)
    }

    /// Spiral walk covering every position within `rings` of `center`
    pub fn spiral_rings(&self, center: MapPos, rings: u32) -> SpiralIter {
        SpiralIter::new(*self, center, spiral_dist(rings))
    }

    /// Position at spiral `index` around `center`
    pub fn pos_add_spirally(&self, center: MapPos, index: u32) -> MapPos {
        let (dc, dr) = spiral_offset(index);
        self.move_by(center, dc, dr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;

    #[test]
    fn test_spiral_dist_values() {
        assert_eq!(spiral_dist(0), 1);
        assert_eq!(spiral_dist(1), 7);
        assert_eq!(spiral_dist(2), 19);
        assert_eq!(spiral_dist(4), 61);
    }

    #[test]
    fn test_ring_sizes() {
        assert_eq!(ring_size(0), 1);
        assert_eq!(ring_size(1), 6);
        assert_eq!(ring_size(3), 18);
        for r in 1..10 {
            assert_eq!(spiral_dist(r) - spiral_dist(r - 1), ring_size(r));
        }
    }

    #[test]
    fn test_ring_two_scenario() {
        let geom = MapGeometry::new(64, 64);
        let center = geom.pos(0, 0);
        let positions: Vec<MapPos> = geom.spiral_rings(center, 2).collect();
        assert_eq!(positions.len(), 19);
        assert_eq!(positions[0], center);

        let unique: AHashSet<MapPos> = positions.iter().copied().collect();
        assert_eq!(unique.len(), 19);

        let ring_counts = positions.iter().fold([0; 3], |mut acc, p| {
            acc[geom.distance(center, *p) as usize] += 1;
            acc
        });
        assert_eq!(ring_counts, [1, 6, 12]);
    }

    #[test]
    fn test_rings_are_visited_in_order() {
        let geom = MapGeometry::new(128, 128);
        let center = geom.pos(40, 40);
        let mut last_ring = 0;
        for (i, pos) in geom.spiral_rings(center, 6).enumerate() {
            let ring = geom.distance(center, pos);
            assert!(ring >= last_ring, "index {} went back to ring {}", i, ring);
            assert_eq!(ring, ring_of_index(i as u32));
            last_ring = ring;
        }
    }

    #[test]
    fn test_ring_one_is_neighbors() {
        let geom = MapGeometry::new(32, 32);
        let center = geom.pos(10, 10);
        let ring: AHashSet<MapPos> = SpiralIter::range(geom, center, 1, 7).collect();
        let neighbors: AHashSet<MapPos> = geom.neighbors(center).into_iter().collect();
        assert_eq!(ring, neighbors);
    }

    #[test]
    fn test_spiral_is_restartable() {
        let geom = MapGeometry::new(32, 32);
        let center = geom.pos(3, 3);
        let iter = geom.spiral(center, spiral_dist(3));
        let first: Vec<MapPos> = iter.clone().collect();
        let second: Vec<MapPos> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(geom.pos_add_spirally(center, 11), first[11]);
    }

    #[test]
    fn test_exact_size() {
        let geom = MapGeometry::new(32, 32);
        let iter = geom.spiral_rings(geom.pos(0, 0), 4);
        assert_eq!(iter.len(), 61);
    }
}
