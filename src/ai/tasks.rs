//! Declarative task table of the decision loop
//!
//! Each row names a task, where it runs, how often, and what must hold
//! before it may run. The controller evaluates every row the same way;
//! tasks never re-check their own scheduling.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::types::BuildingType;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskId {
    // Realm
    #[display(fmt = "place castle")]
    PlaceCastle,
    #[display(fmt = "consider capitulation")]
    ConsiderCapitulation,
    #[display(fmt = "update clear reset")]
    UpdateClearReset,
    #[display(fmt = "update stocks")]
    UpdateStocks,
    #[display(fmt = "update buildings")]
    UpdateBuildings,
    #[display(fmt = "get inventory")]
    GetInventory,
    #[display(fmt = "get serfs")]
    GetSerfs,
    #[display(fmt = "connect disconnected flags")]
    ConnectDisconnectedFlags,
    #[display(fmt = "connect disconnected road networks")]
    ConnectDisconnectedRoadNetworks,
    #[display(fmt = "build better roads")]
    BuildBetterRoads,
    #[display(fmt = "pollute castle area roads")]
    PolluteCastleAreaRoads,
    #[display(fmt = "fix stuck serfs")]
    FixStuckSerfs,
    #[display(fmt = "fix missing transporters")]
    FixMissingTransporters,
    #[display(fmt = "remove road stubs")]
    RemoveRoadStubs,
    #[display(fmt = "demolish unproductive third lumberjacks")]
    DemolishUnproductiveLumberjacks,
    #[display(fmt = "demolish unproductive stonecutters")]
    DemolishUnproductiveStonecutters,
    #[display(fmt = "demolish unproductive mines")]
    DemolishUnproductiveMines,
    #[display(fmt = "manage tool priorities")]
    ManageToolPriorities,
    #[display(fmt = "manage mine food priorities")]
    ManageMineFoodPriorities,
    #[display(fmt = "balance sword shield priorities")]
    BalanceSwordShieldPriorities,
    #[display(fmt = "attack")]
    Attack,
    #[display(fmt = "manage knight occupation")]
    ManageKnightOccupation,

    // Stock
    #[display(fmt = "promote serfs to knights")]
    PromoteSerfs,
    #[display(fmt = "count resources at flags")]
    CountResourcesAtFlags,
    #[display(fmt = "check resource needs")]
    CheckResourceNeeds,
    #[display(fmt = "create star roads")]
    CreateStarRoads,
    #[display(fmt = "build sawmill and lumberjacks")]
    BuildSawmillLumberjacks,
    #[display(fmt = "expand borders")]
    ExpandBorders,
    #[display(fmt = "place coal mines")]
    PlaceCoalMines,
    #[display(fmt = "place iron mines")]
    PlaceIronMines,
    #[display(fmt = "place gold mines")]
    PlaceGoldMines,
    #[display(fmt = "wait for sawmill")]
    WaitForSawmill,
    #[display(fmt = "build stonecutter")]
    BuildStonecutter,
    #[display(fmt = "build rangers")]
    BuildRangers,
    #[display(fmt = "build toolmaker")]
    BuildToolmaker,
    #[display(fmt = "build food buildings")]
    BuildFood,
    #[display(fmt = "build third lumberjack")]
    BuildThirdLumberjack,
    #[display(fmt = "connect coal mines")]
    ConnectCoalMines,
    #[display(fmt = "connect iron mines")]
    ConnectIronMines,
    #[display(fmt = "build steel smelter")]
    BuildSteelSmelter,
    #[display(fmt = "build blacksmith")]
    BuildBlacksmith,
    #[display(fmt = "build gold smelter and connect gold mines")]
    BuildGoldSmelter,
    #[display(fmt = "demolish excess lumberjacks")]
    DemolishExcessLumberjacks,
    #[display(fmt = "demolish excess foresters")]
    DemolishExcessForesters,
    #[display(fmt = "demolish excess food buildings")]
    DemolishExcessFood,
    #[display(fmt = "send geologists")]
    SendGeologists,
    #[display(fmt = "spiderweb roads")]
    SpiderwebRoads,

    // After all stocks
    #[display(fmt = "build warehouse")]
    BuildWarehouse,
}

impl TaskId {
    /// Status text published while the task runs
    pub fn name(&self) -> String {
        self.to_string()
    }
}

/// Whether a task runs once per cycle or once per stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Realm,
    Stock,
}

/// When a task is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    Always,
    /// Every `n + per_stock * stocks` cycles
    EveryN { n: u64, per_stock: u64 },
    /// Completed buildings of `building` across the realm within `min..=max`
    CountRange {
        building: BuildingType,
        min: u32,
        max: u32,
    },
}

impl Recurrence {
    pub fn holds(&self, loop_count: u64, stocks: usize, completed: impl Fn(BuildingType) -> u32) -> bool {
        match *self {
            Recurrence::Always => true,
            Recurrence::EveryN { n, per_stock } => {
                let period = n + per_stock * stocks as u64;
                period == 0 || loop_count % period == 0
            }
            Recurrence::CountRange { building, min, max } => {
                let count = completed(building);
                count >= min && count <= max
            }
        }
    }
}

/// Extra preconditions on the current stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// Only for the castle's stock
    CastleStock,
    /// Only for warehouses
    OtherStock,
    /// Enough planks and few enough construction sites for civil buildings
    CanBuildOther,
    /// Enough planks, idle knights and few enough hut sites to expand
    CanBuildHuts,
}

/// What the loop does after a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Continue,
    /// Skip the remaining tasks of the current stock
    NextStock,
    /// Skip the rest of the cycle
    EndCycle,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub id: TaskId,
    pub scope: Scope,
    /// All must hold
    pub recurrence: &'static [Recurrence],
    pub gate: Option<Gate>,
}

const fn realm(id: TaskId) -> TaskSpec {
    TaskSpec {
        id,
        scope: Scope::Realm,
        recurrence: &[Recurrence::Always],
        gate: None,
    }
}

const fn stock(id: TaskId, gate: Option<Gate>) -> TaskSpec {
    TaskSpec {
        id,
        scope: Scope::Stock,
        recurrence: &[Recurrence::Always],
        gate,
    }
}

/// Once per cycle, before any stock
pub const REALM_TASKS: &[TaskSpec] = &[
    realm(TaskId::PlaceCastle),
    realm(TaskId::ConsiderCapitulation),
    realm(TaskId::UpdateClearReset),
    realm(TaskId::UpdateStocks),
    realm(TaskId::UpdateBuildings),
    realm(TaskId::GetInventory),
    realm(TaskId::GetSerfs),
    realm(TaskId::ConnectDisconnectedFlags),
    realm(TaskId::ConnectDisconnectedRoadNetworks),
    TaskSpec {
        id: TaskId::BuildBetterRoads,
        scope: Scope::Realm,
        recurrence: &[
            Recurrence::EveryN { n: 10, per_stock: 5 },
            Recurrence::CountRange {
                building: BuildingType::Hut,
                min: 14,
                max: u32::MAX,
            },
        ],
        gate: None,
    },
    TaskSpec {
        id: TaskId::PolluteCastleAreaRoads,
        scope: Scope::Realm,
        recurrence: &[
            Recurrence::EveryN { n: 30, per_stock: 0 },
            Recurrence::CountRange {
                building: BuildingType::Hut,
                min: 15,
                max: 35,
            },
        ],
        gate: None,
    },
    realm(TaskId::FixStuckSerfs),
    realm(TaskId::FixMissingTransporters),
    realm(TaskId::RemoveRoadStubs),
    realm(TaskId::DemolishUnproductiveLumberjacks),
    realm(TaskId::DemolishUnproductiveStonecutters),
    realm(TaskId::DemolishUnproductiveMines),
    realm(TaskId::ManageToolPriorities),
    realm(TaskId::ManageMineFoodPriorities),
    realm(TaskId::BalanceSwordShieldPriorities),
    realm(TaskId::Attack),
    realm(TaskId::ManageKnightOccupation),
];

/// Once per stock, castle first
pub const STOCK_TASKS: &[TaskSpec] = &[
    stock(TaskId::UpdateBuildings, None),
    stock(TaskId::GetInventory, None),
    stock(TaskId::PromoteSerfs, None),
    stock(TaskId::CountResourcesAtFlags, None),
    stock(TaskId::CheckResourceNeeds, None),
    stock(TaskId::CreateStarRoads, None),
    stock(TaskId::BuildSawmillLumberjacks, None),
    stock(TaskId::ExpandBorders, Some(Gate::CanBuildHuts)),
    stock(TaskId::PlaceCoalMines, None),
    stock(TaskId::PlaceIronMines, None),
    stock(TaskId::PlaceGoldMines, None),
    stock(TaskId::WaitForSawmill, Some(Gate::CastleStock)),
    stock(TaskId::BuildStonecutter, None),
    stock(TaskId::BuildRangers, None),
    stock(TaskId::BuildToolmaker, Some(Gate::CanBuildOther)),
    stock(TaskId::BuildFood, Some(Gate::CanBuildOther)),
    stock(TaskId::BuildThirdLumberjack, Some(Gate::CanBuildOther)),
    stock(TaskId::ConnectCoalMines, Some(Gate::CanBuildOther)),
    stock(TaskId::ConnectIronMines, Some(Gate::CanBuildOther)),
    stock(TaskId::BuildSteelSmelter, Some(Gate::CanBuildOther)),
    stock(TaskId::BuildBlacksmith, Some(Gate::CanBuildOther)),
    stock(TaskId::BuildGoldSmelter, Some(Gate::CanBuildOther)),
    stock(TaskId::DemolishExcessLumberjacks, None),
    stock(TaskId::DemolishExcessForesters, None),
    stock(TaskId::DemolishExcessFood, None),
    stock(TaskId::SendGeologists, None),
    TaskSpec {
        id: TaskId::SpiderwebRoads,
        scope: Scope::Stock,
        recurrence: &[
            Recurrence::EveryN { n: 30, per_stock: 0 },
            Recurrence::CountRange {
                building: BuildingType::Hut,
                min: 8,
                max: 20,
            },
        ],
        gate: Some(Gate::CastleStock),
    },
    TaskSpec {
        id: TaskId::SpiderwebRoads,
        scope: Scope::Stock,
        recurrence: &[
            Recurrence::EveryN { n: 30, per_stock: 0 },
            Recurrence::CountRange {
                building: BuildingType::Hut,
                min: 16,
                max: 36,
            },
        ],
        gate: Some(Gate::OtherStock),
    },
];

/// Once per cycle, after every stock
pub const FINAL_TASKS: &[TaskSpec] = &[TaskSpec {
    id: TaskId::BuildWarehouse,
    scope: Scope::Realm,
    recurrence: &[
        Recurrence::EveryN { n: 10, per_stock: 0 },
        Recurrence::CountRange {
            building: BuildingType::Hut,
            min: 16,
            max: u32::MAX,
        },
    ],
    gate: None,
}];
