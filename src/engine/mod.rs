mod admission;
mod conflict;
mod error;
mod locks;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use locks::{SlotGuard, SlotLocks};

use std::sync::Arc;

use crate::store::{BookingRepository, RoomRepository};

/// Booking admission and the read views over rooms and bookings.
///
/// Storage is injected; the engine itself only owns the per-(room, date)
/// lock table that makes admission atomic.
pub struct Engine {
    rooms: Arc<dyn RoomRepository>,
    bookings: Arc<dyn BookingRepository>,
    locks: SlotLocks,
}

impl Engine {
    pub fn new(rooms: Arc<dyn RoomRepository>, bookings: Arc<dyn BookingRepository>) -> Self {
        Self {
            rooms,
            bookings,
            locks: SlotLocks::new(),
        }
    }

    /// Engine over one store that serves both repositories.
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: RoomRepository + BookingRepository + 'static,
    {
        Self::new(store.clone(), store)
    }
}
