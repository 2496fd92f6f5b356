//! Knights: recruitment, border staffing and attacks

use tracing::{debug, info};

use crate::ai::controller::AiController;
use crate::core::config::KnightConfig;
use crate::core::types::{BuildingType, ResourceType, SerfType};
use crate::world::{AttackTarget, OccupationLevel, OccupationRange, ThreatLevel, World};

/// Staffing tiers, best first: (required idle knights, resulting range)
fn occupation_tiers(config: &KnightConfig) -> [(u32, OccupationRange); 3] {
    use OccupationLevel::*;
    [
        (config.knights_max, OccupationRange::new(Medium, Full)),
        (config.knights_med, OccupationRange::new(Weak, Good)),
        (config.knights_min, OccupationRange::new(Minimum, Medium)),
    ]
}

/// Memory of the border occupation level between cycles
///
/// After the level went up the next change needs `buffer` more idle knights;
/// after it went down it needs `buffer` fewer. This keeps knights from
/// being pulled in and out of huts around a threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupationState {
    pub last_upper: Option<OccupationLevel>,
    pub buffer: i32,
}

impl OccupationState {
    /// Record the level currently in force and update the buffer direction
    pub fn observe(&mut self, upper: OccupationLevel, change_buffer: i32) {
        if let Some(last) = self.last_upper {
            if last > upper {
                self.buffer = -change_buffer;
            } else if last < upper {
                self.buffer = change_buffer;
            }
        }
        self.last_upper = Some(upper);
    }
}

/// Extra knights the buildings would pull out of stock when moving from
/// `from` to `to`
pub fn knights_affected(buildings: &[BuildingType], from: OccupationLevel, to: OccupationLevel) -> u32 {
    buildings
        .iter()
        .map(|kind| to.slots(*kind).saturating_sub(from.slots(*kind)))
        .sum()
}

/// Border occupation range for the given idle knights and buildings
pub fn choose_occupation(
    idle_knights: u32,
    buildings: &[BuildingType],
    current: OccupationLevel,
    state: &OccupationState,
    config: &KnightConfig,
) -> OccupationRange {
    for (required, range) in occupation_tiers(config) {
        let affected = knights_affected(buildings, current, range.upper) as i64;
        let spare = idle_knights as i64 - affected + state.buffer as i64;
        if spare >= required as i64 {
            return range;
        }
    }
    OccupationRange::default()
}

/// Knights a single attack may send against a building of `kind`
fn attack_cap(kind: BuildingType) -> u32 {
    match kind {
        BuildingType::Hut => 3,
        BuildingType::Tower => 6,
        BuildingType::Fortress => 12,
        _ => 20,
    }
}

/// Attacker to defender ratio an attack must reach, or `None` to stay home
pub fn required_attack_ratio(idle_knights: u32, morale: u32, config: &KnightConfig) -> Option<f64> {
    let (min, med, max) = (config.knights_min, config.knights_med, config.knights_max);
    if (idle_knights >= max && morale >= config.morale_max) || idle_knights >= 2 * max {
        Some(0.0)
    } else if (idle_knights >= max && morale >= config.morale_min)
        || (morale >= config.morale_max && idle_knights >= med)
    {
        Some(1.0)
    } else if idle_knights >= max || (morale >= config.morale_min && idle_knights >= med) {
        Some(config.min_attack_ratio)
    } else {
        debug!(idle_knights, morale, knights_min = min, "not attacking");
        None
    }
}

/// Best target reaching `required` and the number of knights to send
///
/// Ties keep the earlier target.
pub fn pick_attack_target(targets: &[AttackTarget], required: f64) -> Option<(AttackTarget, u32)> {
    let mut best: Option<(AttackTarget, u32, f64)> = None;
    for target in targets {
        let send = target.available_attackers.min(attack_cap(target.kind));
        if send == 0 {
            continue;
        }
        let ratio = send as f64 / target.defenders.max(1) as f64;
        if ratio < required {
            continue;
        }
        if best.map_or(true, |(_, _, r)| ratio > r) {
            best = Some((*target, send, ratio));
        }
    }
    best.map(|(target, send, _)| (target, send))
}

impl<W: World> AiController<W> {
    pub(crate) fn promote_serfs_to_knights(&mut self) {
        let idle = self.realm.serfs.idle(SerfType::Generic);
        let excess = idle.saturating_sub(self.config.thresholds.serfs_min);
        let swords = self.realm.resources.get(ResourceType::Sword);
        let shields = self.realm.resources.get(ResourceType::Shield);
        let promotable = excess.min(swords).min(shields);
        if promotable == 0 {
            debug!(idle, swords, shields, "nothing to promote");
            return;
        }
        let player = self.player;
        let promoted = self
            .world
            .write(|w| w.promote_serfs_to_knights(player, promotable));
        info!(player, promotable, promoted, "promoted serfs to knights");
    }

    pub(crate) fn manage_knight_occupation(&mut self) {
        let player = self.player;
        let (cycling, current, buildings) = self.world.read(|w| {
            let buildings: Vec<BuildingType> = w
                .player_buildings(player)
                .into_iter()
                .filter(|b| b.kind.is_military() && b.kind != BuildingType::Castle && b.occupied)
                .map(|b| b.kind)
                .collect();
            (
                w.cycling_knights(player),
                w.knight_occupation(player, ThreatLevel::Border),
                buildings,
            )
        });
        if cycling {
            debug!("knights are cycling, leaving occupation alone");
            return;
        }

        let knights = &self.config.knights;
        self.occupation
            .observe(current.upper, knights.occupation_change_buffer);
        let idle = self.realm.serfs.idle_knights();
        let desired = choose_occupation(idle, &buildings, current.upper, &self.occupation, knights);
        if desired == current {
            return;
        }
        info!(
            player,
            idle,
            buffer = self.occupation.buffer,
            from = ?current,
            to = ?desired,
            "changing border occupation"
        );
        self.world
            .write(|w| w.set_knight_occupation(player, ThreatLevel::Border, desired));
    }

    pub(crate) fn attack(&mut self) {
        let player = self.player;
        let (morale, targets) = self
            .world
            .read(|w| (w.knight_morale(player), w.attack_targets(player)));
        let idle = self.realm.serfs.idle_knights();
        let Some(required) = required_attack_ratio(idle, morale, &self.config.knights) else {
            return;
        };
        let Some((target, knights)) = pick_attack_target(&targets, required) else {
            debug!(targets = targets.len(), required, "no target worth attacking");
            return;
        };
        let sent = self.world.write(|w| w.attack(player, target.pos, knights));
        if sent {
            info!(
                player,
                target = %target.pos,
                enemy = target.owner,
                knights,
                defenders = target.defenders,
                "attacking"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::MapPos;
    use OccupationLevel::*;

    fn target(pos: u32, kind: BuildingType, defenders: u32, attackers: u32) -> AttackTarget {
        AttackTarget {
            pos: MapPos(pos),
            owner: 1,
            kind,
            defenders,
            available_attackers: attackers,
        }
    }

    #[test]
    fn test_occupation_tiers() {
        let config = KnightConfig::default();
        let state = OccupationState::default();
        let none: [BuildingType; 0] = [];
        assert_eq!(
            choose_occupation(60, &none, Minimum, &state, &config),
            OccupationRange::new(Medium, Full)
        );
        assert_eq!(
            choose_occupation(20, &none, Minimum, &state, &config),
            OccupationRange::new(Weak, Good)
        );
        assert_eq!(
            choose_occupation(3, &none, Minimum, &state, &config),
            OccupationRange::new(Minimum, Medium)
        );
        assert_eq!(choose_occupation(2, &none, Minimum, &state, &config), OccupationRange::default());
    }

    #[test]
    fn test_occupation_counts_knights_buildings_would_take() {
        let config = KnightConfig::default();
        let state = OccupationState::default();
        // ten huts going from minimum to medium take ten more knights
        let huts = [BuildingType::Hut; 10];
        assert_eq!(knights_affected(&huts, Minimum, Medium), 10);
        assert_eq!(
            choose_occupation(12, &huts, Minimum, &state, &config),
            OccupationRange::default()
        );
        assert_eq!(
            choose_occupation(13, &huts, Minimum, &state, &config),
            OccupationRange::new(Minimum, Medium)
        );
    }

    #[test]
    fn test_buffer_follows_last_change() {
        let mut state = OccupationState::default();
        state.observe(Medium, 4);
        assert_eq!(state.buffer, 0);
        state.observe(Good, 4);
        assert_eq!(state.buffer, 4);
        state.observe(Good, 4);
        assert_eq!(state.buffer, 4);
        state.observe(Minimum, 4);
        assert_eq!(state.buffer, -4);
    }

    #[test]
    fn test_attack_tiers() {
        let config = KnightConfig::default();
        assert_eq!(required_attack_ratio(2, 200, &config), None);
        assert_eq!(required_attack_ratio(20, 50, &config), None);
        assert_eq!(required_attack_ratio(20, 70, &config), Some(config.min_attack_ratio));
        assert_eq!(required_attack_ratio(20, 120, &config), Some(1.0));
        assert_eq!(required_attack_ratio(100, 10, &config), Some(0.0));
    }

    #[test]
    fn test_pick_best_ratio_target() {
        let targets = [
            target(1, BuildingType::Tower, 3, 10),
            target(2, BuildingType::Hut, 1, 10),
            target(3, BuildingType::Fortress, 12, 10),
        ];
        let (best, send) = pick_attack_target(&targets, 2.0).expect("hut is weak");
        assert_eq!(best.pos, MapPos(2));
        assert_eq!(send, 3);
        assert!(pick_attack_target(&targets[2..], 1.0).is_none());
    }
}
