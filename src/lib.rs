//! Serf AI - computer opponents for a settlement-building strategy game

pub mod ai;
pub mod core;
pub mod placement;
pub mod road;
pub mod spatial;
pub mod world;
