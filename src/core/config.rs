//! AI configuration with documented constants
//!
//! All tunable numbers of the decision loop are collected here. Profiles are
//! TOML documents under `data/ai_profiles/`; any section or field left out
//! falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::core::error::{AiError, Result};

/// Resource stock thresholds that drive build and demolish decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Never convert serfs into knights below this many idle generic serfs
    pub serfs_min: u32,

    /// Only build wood buildings while planks are below this value
    pub planks_crit: u32,

    /// Below this many planks nothing but the sawmill and lumberjacks is
    /// built. Also the floor for building warehouses and huts.
    pub planks_min: u32,

    /// Wood is "needed" while planks stay below this value (plus the
    /// anti-flapping buffer). Above it excess lumberjacks are burned.
    pub planks_max: u32,

    pub stones_min: u32,
    /// Build a stonecutter while stones are below this value
    pub stones_max: u32,

    /// Food buildings are burned once adjusted food exceeds this value
    /// plus the anti-flapping buffer
    pub food_max: u32,

    pub coal_min: u32,
    pub coal_max: u32,
    pub iron_ore_min: u32,
    pub iron_ore_max: u32,
    pub gold_ore_min: u32,
    pub gold_ore_max: u32,
    pub steel_min: u32,
    pub steel_max: u32,

    /// Geologists are only created while this many hammers stay in reserve
    pub hammers_min: u32,

    /// Hysteresis margin applied to thresholds that trigger demolition
    ///
    /// A quantity hovering at a threshold would otherwise flip a building
    /// between "needed" and "excess" every cycle.
    pub anti_flapping_buffer: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            serfs_min: 5,
            planks_crit: 5,
            planks_min: 24,
            planks_max: 40,
            stones_min: 10,
            stones_max: 25,
            food_max: 35,
            coal_min: 12,
            coal_max: 60,
            iron_ore_min: 8,
            iron_ore_max: 30,
            gold_ore_min: 8,
            gold_ore_max: 40,
            steel_min: 8,
            steel_max: 60,
            hammers_min: 6,
            anti_flapping_buffer: 6,
        }
    }
}

/// Placement and site-scoring parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Building-site capacity required around a castle site
    /// (large sites count 3, small sites 1)
    pub near_building_sites_min: u32,
    /// Trees required near a sawmill corner; the castle wants 4x this
    pub near_trees_min: u32,
    /// Weighted stone count required near a stonecutter or castle
    pub near_stones_min: u32,
    /// Hill tiles required before geologists are sent
    pub hills_min: u32,
    /// Water tiles required before a fisher is placed
    pub waters_min: u32,
    /// Farm open-space floor; raised by two per idle knight up to the ceiling
    pub farm_open_space_min: u32,
    pub farm_open_space_max: u32,
    /// Foresters surrounded by less open land than this percentage are
    /// burned when wood is no longer needed
    pub forester_open_pct_min: u32,

    pub max_unfinished_buildings: u32,
    pub max_unfinished_huts: u32,
    pub max_coalmines: u32,
    pub max_ironmines: u32,
    pub max_goldmines: u32,
    pub geologists_max: u32,

    /// Small signs only justify a mine once this fraction of nearby hill
    /// tiles carries a sign of any kind
    pub coal_sign_density_min: f64,
    pub iron_sign_density_min: f64,
    pub gold_sign_density_min: f64,
    /// Never send geologists to a flag whose surroundings are this well
    /// surveyed already
    pub geologist_sign_density_max: f64,

    /// Castle site sampling budget; failure after this many tries is fatal
    pub castle_max_tries: u32,
    /// Requirements are relaxed one step every this many failed tries
    pub castle_desperation_interval: u32,

    /// Expansion weights, multiplied into `score_area` per goal
    pub foods_weight: u32,
    pub trees_weight: u32,
    pub stones_weight: u32,
    pub stone_signs_weight: u32,
    pub hills_weight: u32,
    pub iron_ore_weight: u32,
    pub coal_weight: u32,
    pub gold_ore_weight: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            near_building_sites_min: 250,
            near_trees_min: 4,
            near_stones_min: 5,
            hills_min: 9,
            waters_min: 24,
            farm_open_space_min: 25,
            farm_open_space_max: 40,
            forester_open_pct_min: 30,
            max_unfinished_buildings: 2,
            max_unfinished_huts: 2,
            max_coalmines: 3,
            max_ironmines: 2,
            max_goldmines: 1,
            geologists_max: 4,
            coal_sign_density_min: 0.50,
            iron_sign_density_min: 0.50,
            gold_sign_density_min: 0.30,
            geologist_sign_density_max: 0.70,
            castle_max_tries: 1500,
            castle_desperation_interval: 120,
            foods_weight: 2,
            trees_weight: 2,
            stones_weight: 2,
            stone_signs_weight: 1,
            hills_weight: 2,
            iron_ore_weight: 3,
            coal_weight: 2,
            gold_ore_weight: 5,
        }
    }
}

/// Cost policy of the best-road builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    /// A candidate road longer than this multiple of the straight-line
    /// distance is rejected outright
    pub max_convolution: f64,
    /// Multiplier on new road length when new length is penalized
    pub new_length_penalty: f64,
    pub reduced_new_length_penalty: f64,
    /// Fixed penalty for routes passing through the castle flag
    pub castle_flag_penalty: f64,
    /// In improve mode the existing route must score worse than
    /// `new * improve_factor + improve_margin`
    pub improve_factor: f64,
    pub improve_margin: f64,
    /// Upper bound on split-road solutions collected by a single plot
    pub max_fake_flags: usize,
    /// Radius (in rings) searched for candidate flags
    pub candidate_rings: u32,
    /// Stop widening the search after this many rings once two
    /// candidates are known
    pub candidate_rings_early_stop: u32,
    /// Radius (in rings) around the castle that AvoidCastleArea keeps clear
    pub castle_area_rings: u32,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            max_convolution: 3.0,
            new_length_penalty: 2.5,
            reduced_new_length_penalty: 1.75,
            castle_flag_penalty: 10.0,
            improve_factor: 1.5,
            improve_margin: 2.0,
            max_fake_flags: 10,
            candidate_rings: 15,
            candidate_rings_early_stop: 6,
            castle_area_rings: 3,
        }
    }
}

/// Pacing of the decision loop and housekeeping timers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Real-time pause between cycles at normal game speed (milliseconds)
    ///
    /// Scaled down as the game speed goes up. Zero disables sleeping, which
    /// is what tests and headless runs use.
    pub loop_sleep_ms: u64,
    /// Pause after each visible action (demolition, road built)
    pub action_pause_ms: u64,
    /// Game speed at which sleeps last exactly as configured
    pub reference_speed: u32,
    /// Ticks a transporter may sit in a wait-idle state before being recalled
    pub stuck_serf_delay: u64,
    /// Ticks a road may lack its transporter before one is dispatched
    pub missing_transporter_delay: u64,
    /// Minimum ticks between geologist dispatches once the realm is settled
    pub geologist_interval: u64,
    /// Ticks an active mine is watched before its output is judged
    pub mine_probation: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            loop_sleep_ms: 2000,
            action_pause_ms: 3000,
            reference_speed: 2,
            stuck_serf_delay: 10_000,
            missing_transporter_delay: 10_000,
            geologist_interval: 10_000,
            mine_probation: 100_000,
        }
    }
}

impl TimingConfig {
    /// Timing with every real-time sleep disabled
    pub fn instant() -> Self {
        Self {
            loop_sleep_ms: 0,
            action_pause_ms: 0,
            ..Self::default()
        }
    }
}

/// Knight staffing and attack parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnightConfig {
    pub knights_min: u32,
    pub knights_med: u32,
    pub knights_max: u32,
    /// Hysteresis applied after the occupation level last moved
    pub occupation_change_buffer: i32,
    /// Morale (percent of nominal) needed for opportunistic attacks
    pub morale_min: u32,
    pub morale_max: u32,
    /// Attack only when sending this many times the defenders
    pub min_attack_ratio: f64,
}

impl Default for KnightConfig {
    fn default() -> Self {
        Self {
            knights_min: 3,
            knights_med: 18,
            knights_max: 50,
            occupation_change_buffer: 4,
            morale_min: 60,
            morale_max: 110,
            min_attack_ratio: 2.0,
        }
    }
}

/// Complete AI profile
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// Name of this profile (set from filename)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub roads: RoadConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub knights: KnightConfig,
}

impl AiConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            ..Self::default()
        }
    }

    /// Default values with all real-time sleeps disabled
    pub fn headless() -> Self {
        Self {
            name: "headless".to_string(),
            timing: TimingConfig::instant(),
            ..Self::default()
        }
    }

    /// Parse a profile from a TOML document and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AiConfig = toml::from_str(contents)?;
        config.validate().map_err(AiError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        let t = &self.thresholds;
        if t.planks_crit > t.planks_min || t.planks_min > t.planks_max {
            return Err(format!(
                "plank thresholds must be ordered: crit ({}) <= min ({}) <= max ({})",
                t.planks_crit, t.planks_min, t.planks_max
            ));
        }
        for (label, min, max) in [
            ("stones", t.stones_min, t.stones_max),
            ("coal", t.coal_min, t.coal_max),
            ("iron_ore", t.iron_ore_min, t.iron_ore_max),
            ("gold_ore", t.gold_ore_min, t.gold_ore_max),
            ("steel", t.steel_min, t.steel_max),
        ] {
            if min > max {
                return Err(format!("{}_min ({}) exceeds {}_max ({})", label, min, label, max));
            }
        }

        let k = &self.knights;
        if !(k.knights_min <= k.knights_med && k.knights_med <= k.knights_max) {
            return Err(format!(
                "knight thresholds must be ordered: min ({}) <= med ({}) <= max ({})",
                k.knights_min, k.knights_med, k.knights_max
            ));
        }
        if k.occupation_change_buffer < 0 {
            return Err("occupation_change_buffer must not be negative".into());
        }

        let r = &self.roads;
        if r.max_convolution < 1.0 {
            return Err(format!("max_convolution ({}) must be at least 1.0", r.max_convolution));
        }
        if r.candidate_rings_early_stop > r.candidate_rings {
            return Err("candidate_rings_early_stop must not exceed candidate_rings".into());
        }

        let p = &self.placement;
        if p.castle_max_tries == 0 || p.castle_desperation_interval == 0 {
            return Err("castle search budget must be positive".into());
        }
        if p.farm_open_space_min > p.farm_open_space_max {
            return Err("farm_open_space_min exceeds farm_open_space_max".into());
        }

        Ok(())
    }
}

/// Load an AI profile from TOML
///
/// Loads from `data/ai_profiles/{name}.toml`
pub fn load_profile(name: &str) -> Result<AiConfig> {
    let path = profile_path(name);
    let contents = fs::read_to_string(&path)?;
    let mut config = AiConfig::from_toml_str(&contents)?;
    config.name = name.to_string();
    Ok(config)
}

/// Get path to profile file
fn profile_path(name: &str) -> PathBuf {
    PathBuf::from("data/ai_profiles").join(format!("{}.toml", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AiConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.planks_min, 24);
        assert_eq!(config.knights.knights_max, 50);
        assert_eq!(config.roads.max_convolution, 3.0);
    }

    #[test]
    fn test_headless_disables_sleep() {
        let config = AiConfig::headless();
        assert_eq!(config.timing.loop_sleep_ms, 0);
        assert_eq!(config.timing.action_pause_ms, 0);
        assert_eq!(config.timing.stuck_serf_delay, 10_000);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = AiConfig::from_toml_str(
            r#"
            [thresholds]
            planks_max = 60

            [knights]
            knights_max = 40
            "#,
        )
        .expect("partial profile should parse");
        assert_eq!(config.thresholds.planks_max, 60);
        assert_eq!(config.thresholds.planks_min, 24);
        assert_eq!(config.knights.knights_max, 40);
        assert_eq!(config.placement.max_coalmines, 3);
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let result = AiConfig::from_toml_str(
            r#"
            [knights]
            knights_min = 30
            knights_med = 18
            "#,
        );
        assert!(matches!(result, Err(AiError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = AiConfig::from_toml_str("[thresholds\nplanks_max = ");
        assert!(matches!(result, Err(AiError::ConfigParse(_))));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = AiConfig::from_toml_str("[trading]\nenabled = true\n");
        assert!(matches!(result, Err(AiError::ConfigParse(_))));
    }

    #[test]
    fn test_load_default_profile() {
        let config = load_profile("default").expect("Should load default profile");
        assert_eq!(config.name, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_builder_profile() {
        let config = load_profile("builder").expect("Should load builder profile");
        assert!(config.knights.knights_max > KnightConfig::default().knights_max);
    }
}
