//! Distribution priorities: tools, food for mines, sword/shield transport

use tracing::{debug, info};

use crate::ai::controller::AiController;
use crate::core::types::{BuildingType, ResourceType, SerfType};
use crate::world::{PriorityKind, World};

/// Highest priority value the game accepts
pub const PRIORITY_MAX: u32 = 65_500;
/// Half of the maximum, "want one more"
pub const PRIORITY_MEDIUM: u32 = 32_750;
/// Barely above zero
pub const PRIORITY_TRICKLE: u32 = 6_550;

/// Gold mines get this much food when knights run short
const GOLD_FOOD_KNIGHTS_SHORT: u32 = 25_000;

/// Steel and coal distribution that favors tools over weapons
const TOOLING_BASELINE: [(PriorityKind, u32); 6] = [
    (PriorityKind::SteelToolmaker, 0),
    (PriorityKind::SteelWeaponsmith, PRIORITY_MAX),
    (PriorityKind::PlanksToolmaker, 0),
    (PriorityKind::CoalSteelsmelter, PRIORITY_MEDIUM),
    (PriorityKind::CoalGoldsmelter, PRIORITY_MAX),
    (PriorityKind::CoalWeaponsmith, 52_400),
];

/// Toolmaker priority for a tool with `count` in stock
pub fn tool_priority(count: u32) -> u32 {
    match count {
        0 => PRIORITY_MAX,
        1 => PRIORITY_MEDIUM,
        _ => 0,
    }
}

/// Food priority of a mine whose ore sits at `count` in stock
pub fn mine_food_priority(count: u32, min: u32, max: u32, default: u32) -> u32 {
    if count > max {
        0
    } else if count > min {
        PRIORITY_TRICKLE
    } else {
        default
    }
}

/// New (sword, shield) flag priorities if the one in surplus is ahead
pub fn balance_swords_shields(swords: u32, shields: u32, sword_prio: u32, shield_prio: u32) -> Option<(u32, u32)> {
    let swap = (swords >= shields + 2 && sword_prio > shield_prio)
        || (shields >= swords + 2 && shield_prio > sword_prio);
    swap.then_some((shield_prio, sword_prio))
}

impl<W: World> AiController<W> {
    /// Set a priority, skipping the call when it already has that value
    fn update_priority(&self, kind: PriorityKind, value: u32) -> bool {
        let player = self.player;
        self.world.write(|w| {
            if w.priority(player, kind) == value {
                return false;
            }
            w.set_priority(player, kind, value);
            true
        })
    }

    pub(crate) fn manage_tool_priorities(&mut self) {
        for (kind, value) in TOOLING_BASELINE {
            self.update_priority(kind, value);
        }

        let serfs = &self.realm.serfs;
        let short: Vec<SerfType> = SerfType::PROFESSIONS
            .iter()
            .copied()
            .filter(|p| *p != SerfType::Sailor && p.tool().is_some() && serfs.available(*p) < 2)
            .collect();
        self.need_tools = !short.is_empty();
        if !self.need_tools {
            debug!("no profession short of tools");
            return;
        }
        if self.realm.buildings.completed(BuildingType::ToolMaker) == 0 {
            debug!(short = ?short, "tools needed but no toolmaker yet");
            return;
        }

        let farmers = self.realm.serfs.total(SerfType::Farmer) + self.realm.serfs.potential(SerfType::Farmer);
        for tool in ResourceType::TOOLS {
            let value = if farmers == 0 {
                // nothing else matters until someone can farm
                if tool == ResourceType::Scythe {
                    PRIORITY_MAX
                } else {
                    0
                }
            } else {
                tool_priority(self.realm.resources.get(tool))
            };
            if self.update_priority(PriorityKind::Tool(tool), value) {
                debug!(tool = ?tool, value, "tool priority");
            }
        }
        info!(player = self.player, short = ?short, "steering toolmaker");
    }

    pub(crate) fn manage_mine_food_priorities(&mut self) {
        let t = &self.config.thresholds;
        let inv = &self.realm.resources;
        let coal = mine_food_priority(inv.get(ResourceType::Coal), t.coal_min, t.coal_max, 45_850);
        let iron = mine_food_priority(inv.get(ResourceType::IronOre), t.iron_ore_min, t.iron_ore_max, 45_850);
        let mut gold = mine_food_priority(inv.get(ResourceType::GoldOre), t.gold_ore_min, t.gold_ore_max, PRIORITY_MAX);
        if self.realm.serfs.idle_knights() <= self.config.knights.knights_min {
            gold = GOLD_FOOD_KNIGHTS_SHORT;
        }

        self.update_priority(PriorityKind::FoodStonemine, 13_100);
        self.update_priority(PriorityKind::FoodCoalmine, coal);
        self.update_priority(PriorityKind::FoodIronmine, iron);
        self.update_priority(PriorityKind::FoodGoldmine, gold);
        debug!(coal, iron, gold, "mine food priorities");
    }

    pub(crate) fn balance_sword_shield_priorities(&mut self) {
        let swords = self.realm.resources.get(ResourceType::Sword);
        let shields = self.realm.resources.get(ResourceType::Shield);
        let player = self.player;
        let sword_kind = PriorityKind::FlagTransport(ResourceType::Sword);
        let shield_kind = PriorityKind::FlagTransport(ResourceType::Shield);
        let (sword_prio, shield_prio) = self
            .world
            .read(|w| (w.priority(player, sword_kind), w.priority(player, shield_kind)));

        if let Some((sword, shield)) = balance_swords_shields(swords, shields, sword_prio, shield_prio) {
            info!(player, swords, shields, "swapping sword and shield transport priority");
            self.world.write(|w| {
                w.set_priority(player, sword_kind, sword);
                w.set_priority(player, shield_kind, shield);
            });
        }
    }
}
