//! Per-player computer opponent
//!
//! Architecture: one controller per player, one thread each
//! - `controller` owns the cycle: refresh state, then run the task table
//!   for the realm, for every stock and once more at the end
//! - `tasks` is the declarative table of what runs when
//! - `construction`, `economy`, `mines`, `roads` decide what to build or burn
//! - `knights`, `priorities` and `housekeeping` tune the running economy
//! - `inventory`, `timers` and `blacklist` hold the per-cycle and
//!   cross-cycle state the tasks share

pub mod blacklist;
pub mod construction;
pub mod controller;
pub mod economy;
pub mod housekeeping;
pub mod inventory;
pub mod knights;
pub mod mines;
pub mod priorities;
pub mod roads;
pub mod tasks;
pub mod timers;

pub use blacklist::{Blacklist, SiteKind};
pub use controller::{
    AiController, AiHandle, StatusHandle, StopHandle, STATUS_END_OF_LOOP, STATUS_INITIALIZING, STATUS_LOCKED,
    STATUS_PAUSED,
};
pub use inventory::{BuildingTally, Hysteresis, ResourceNeeds};
pub use knights::OccupationState;
pub use tasks::{Flow, Scope, TaskId};
pub use timers::Timers;
