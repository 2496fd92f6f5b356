//! Spatial primitives - hexagonal positions on a wrapping map
//!
//! Pure arithmetic with no shared state: moving, measuring, and spiral
//! enumeration of the area around a center.

pub mod hex;
pub mod spiral;

pub use hex::{Direction, MapGeometry, MapPos};
pub use spiral::{ring_of_index, ring_size, spiral_dist, spiral_offset, SpiralIter};
