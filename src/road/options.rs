//! Road policy flags
//!
//! A `RoadOptions` value is a small bit set. Flags combine additively in the
//! builder's cost function; only `Direct` and `Improve` change the shape of
//! the search itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::RoadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadOption {
    /// Plot straight to the target flag only, no intermediate flags
    Direct,
    /// Allow new flags on existing roads when that splits a road usefully
    SplitRoads,
    /// Prefer joining existing roads over laying new length
    PenalizeNewLength,
    /// Keep new roads out of the ring around the castle flag
    AvoidCastleArea,
    /// Penalize routes whose flag path runs through the castle flag
    PenalizeCastleFlag,
    /// Build even when the source already has a road, if the new route
    /// clearly beats the existing one
    Improve,
    /// Milder length penalty; overrides `PenalizeNewLength`
    ReducedNewLengthPenalty,
    /// Accept water roads, but only once a land road also exists
    AllowWaterRoad,
    /// Never route through the building position of the source flag
    HoldBuildingPos,
    /// Tighter convolution limit
    MostlyStraight,
    /// Find the best road but do not build it
    PlotOnlyNoBuild,
    /// Only accept end flags outside the source's own road network
    ReconnectNetwork,
}

impl RoadOption {
    pub const ALL: [RoadOption; 12] = [
        RoadOption::Direct,
        RoadOption::SplitRoads,
        RoadOption::PenalizeNewLength,
        RoadOption::AvoidCastleArea,
        RoadOption::PenalizeCastleFlag,
        RoadOption::Improve,
        RoadOption::ReducedNewLengthPenalty,
        RoadOption::AllowWaterRoad,
        RoadOption::HoldBuildingPos,
        RoadOption::MostlyStraight,
        RoadOption::PlotOnlyNoBuild,
        RoadOption::ReconnectNetwork,
    ];

    fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Set of [`RoadOption`] flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoadOptions {
    bits: u16,
}

impl RoadOptions {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, option: RoadOption) -> bool {
        self.bits & option.bit() != 0
    }

    pub fn insert(&mut self, option: RoadOption) {
        self.bits |= option.bit();
    }

    pub fn remove(&mut self, option: RoadOption) {
        self.bits &= !option.bit();
    }

    pub fn set(&mut self, option: RoadOption, enabled: bool) {
        if enabled {
            self.insert(option);
        } else {
            self.remove(option);
        }
    }

    /// Copy with `option` switched on
    pub fn with(mut self, option: RoadOption) -> Self {
        self.insert(option);
        self
    }

    /// Copy with `option` switched off
    pub fn without(mut self, option: RoadOption) -> Self {
        self.remove(option);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = RoadOption> + '_ {
        RoadOption::ALL.into_iter().filter(|o| self.contains(*o))
    }

    /// Multiplier applied to the length of newly laid road
    pub fn new_length_penalty(&self, config: &RoadConfig) -> f64 {
        if self.contains(RoadOption::ReducedNewLengthPenalty) {
            config.reduced_new_length_penalty
        } else if self.contains(RoadOption::PenalizeNewLength) {
            config.new_length_penalty
        } else {
            1.0
        }
    }

    /// Largest accepted ratio of new road length to straight-line distance
    pub fn max_convolution(&self, config: &RoadConfig) -> f64 {
        if self.contains(RoadOption::MostlyStraight) {
            (config.max_convolution - 1.0).max(1.0)
        } else {
            config.max_convolution
        }
    }
}

impl Default for RoadOptions {
    fn default() -> Self {
        Self::empty()
            .with(RoadOption::SplitRoads)
            .with(RoadOption::PenalizeNewLength)
            .with(RoadOption::PenalizeCastleFlag)
    }
}

impl fmt::Debug for RoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<RoadOption> for RoadOptions {
    fn from_iter<I: IntoIterator<Item = RoadOption>>(iter: I) -> Self {
        let mut options = RoadOptions::empty();
        for option in iter {
            options.insert(option);
        }
        options
    }
}
