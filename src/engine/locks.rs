use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

type SlotKey = (Ulid, String);

/// One async mutex per `(room_id, date)`.
///
/// Admissions on the same room and date serialize; anything else proceeds
/// independently. Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
pub struct SlotLocks {
    locks: DashMap<SlotKey, Arc<Mutex<()>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on `(room_id, date)`. Dropping the future while it
    /// waits still cleans up the key's entry.
    pub async fn acquire(&self, room_id: Ulid, date: &str) -> SlotGuard<'_> {
        // Declared before the lock handle so a cancelled wait drops it last
        let mut slot = SlotGuard {
            locks: self,
            key: (room_id, date.to_string()),
            guard: None,
        };
        let lock = self.locks.entry(slot.key.clone()).or_default().clone();
        slot.guard = Some(lock.lock_owned().await);
        slot
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn release(&self, key: &SlotKey) {
        // Only the map's own reference left: no holder, no waiter.
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct SlotGuard<'a> {
    locks: &'a SlotLocks,
    key: SlotKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.key);
    }
}
