//! Shared world handle with scoped lock acquisition
//!
//! One mutex guards the whole world. Every call takes the lock, runs a
//! single logical operation, and releases it before returning, including on
//! early exits, so the lock is never held across a sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::world::World;

pub struct SharedWorld<W: World> {
    inner: Arc<Mutex<W>>,
    writes: Arc<AtomicU64>,
}

impl<W: World> Clone for SharedWorld<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<W: World> SharedWorld<W> {
    pub fn new(world: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run a read-only operation under the lock
    pub fn read<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        let guard = self.lock();
        f(&guard)
    }

    /// Run a mutating operation under the lock
    pub fn write<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.lock();
        self.writes.fetch_add(1, Ordering::Relaxed);
        f(&mut guard)
    }

    /// A panic on another thread leaves the world as it was mid-call; the
    /// AI carries on with whatever state is there.
    fn lock(&self) -> MutexGuard<'_, W> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutating lock acquisitions made through any handle
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of handles sharing this world
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
