//! Self-healing timers for serfs and roads that get stuck
//!
//! Architecture: detect, wait, fire once
//! - A suspect condition arms a timer the first time it is seen
//! - A timer whose condition clears is dropped
//! - A due timer fires its corrective action once and is dropped whatever
//!   the outcome; a condition that persists is rediscovered on a later cycle

use ahash::AHashSet;
use tracing::{debug, info, warn};

use crate::ai::controller::AiController;
use crate::core::types::SerfState;
use crate::spatial::{Direction, MapPos};
use crate::world::World;

impl<W: World> AiController<W> {
    pub(crate) fn fix_stuck_serfs(&mut self) {
        let player = self.player;
        let now = self.tick();
        let delay = self.config.timing.stuck_serf_delay;

        // drop timers whose serf moved on or vanished
        let tracked = self.stuck_serfs.keys();
        let states = self
            .world
            .read(|w| tracked.iter().map(|i| (*i, w.serf(*i).map(|s| s.state))).collect::<Vec<_>>());
        for (index, state) in states {
            if state != Some(SerfState::WaitIdleOnPath) {
                self.stuck_serfs.remove(index);
            }
        }

        let mut fired = AHashSet::new();
        for index in self.stuck_serfs.due(now) {
            self.stuck_serfs.remove(index);
            fired.insert(index);
            let booted = self.world.write(|w| {
                w.serf(index).map_or(false, |s| s.state == SerfState::WaitIdleOnPath) && w.set_serf_lost(index)
            });
            if booted {
                info!(player, serf = index, "recalled serf stuck waiting on a road");
            } else {
                warn!(player, serf = index, "stuck serf could not be recalled");
            }
        }

        let waiting: Vec<u32> = self.world.read(|w| {
            w.player_serfs(player)
                .into_iter()
                .filter(|s| s.state == SerfState::WaitIdleOnPath)
                .map(|s| s.index)
                .collect()
        });
        for index in waiting {
            if !fired.contains(&index) && self.stuck_serfs.arm(index, now, delay) {
                debug!(serf = index, trigger = now + delay, "serf waiting on road");
            }
        }
    }

    pub(crate) fn fix_missing_transporters(&mut self) {
        let player = self.player;
        let now = self.tick();
        let delay = self.config.timing.missing_transporter_delay;

        let mut fired = AHashSet::new();
        for (flag, dir) in self.missing_transporters.due(now) {
            self.missing_transporters.remove((flag, dir));
            fired.insert((flag, dir));
            let called = self.world.write(|w| {
                let owned = w.flag_at(flag).map_or(false, |f| f.owner == player);
                if !owned || !w.has_path(flag, dir) || w.road_has_transporter(flag, dir) {
                    return None;
                }
                Some(w.call_transporter(flag, dir, player))
            });
            match called {
                Some(true) => info!(player, flag = %flag, dir = ?dir, "called missing transporter"),
                Some(false) => warn!(player, flag = %flag, dir = ?dir, "transporter call refused"),
                None => debug!(flag = %flag, dir = ?dir, "road fixed itself"),
            }
        }

        let castle_flag = self.castle_flag;
        let missing: Vec<(MapPos, Direction)> = self.world.read(|w| {
            let mut missing = Vec::new();
            for flag in w.flags() {
                if flag.owner != player || !flag.connected || Some(flag.pos) == castle_flag {
                    continue;
                }
                for dir in Direction::ALL {
                    if !w.has_path(flag.pos, dir) || !flag.expects_transporter(dir) {
                        continue;
                    }
                    // a step that has a path already reports blocked; look
                    // at the terrain on both ends instead
                    let next = w.geometry().move_pos(flag.pos, dir);
                    if w.terrain_at(flag.pos).is_water() && w.terrain_at(next).is_water() {
                        continue;
                    }
                    if !w.road_has_transporter(flag.pos, dir) {
                        missing.push((flag.pos, dir));
                    }
                }
            }
            missing
        });
        for key in missing {
            if !fired.contains(&key) && self.missing_transporters.arm(key, now, delay) {
                debug!(flag = %key.0, dir = ?key.1, trigger = now + delay, "road without transporter");
            }
        }
    }
}
