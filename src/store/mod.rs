mod memory;
mod wal_store;

pub use memory::MemoryStore;
pub use wal_store::WalStore;

use std::sync::Mutex;

use async_trait::async_trait;
use ulid::{Generator, Ulid};

use crate::model::{Booking, Room};

/// Fields for a room that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoom {
    pub number_of_seats: u32,
    pub amenities: Vec<String>,
    pub price_per_hour: f64,
}

/// Fields for a booking that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub room_id: Ulid,
    pub customer_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn create(&self, fields: NewRoom) -> Result<Room, StoreError>;

    async fn get_by_id(&self, id: Ulid) -> Result<Option<Room>, StoreError>;

    /// All rooms in creation order.
    async fn list_all(&self) -> Result<Vec<Room>, StoreError>;

    /// Resolve a display name as produced by [`Room::display_name`].
    async fn find_by_display_name(&self, name: &str) -> Result<Option<Room>, StoreError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, fields: NewBooking) -> Result<Booking, StoreError>;

    /// All bookings in creation order.
    async fn list_all(&self) -> Result<Vec<Booking>, StoreError>;

    async fn find_by_room_and_date(&self, room_id: Ulid, date: &str) -> Result<Vec<Booking>, StoreError>;

    async fn find_by_customer_and_room(
        &self,
        customer_name: &str,
        room_id: Ulid,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// Hands out ULIDs that sort in creation order, even within one millisecond.
pub(crate) struct IdSource {
    generator: Mutex<Generator>,
}

impl IdSource {
    pub(crate) fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }

    pub(crate) fn next(&self) -> Result<Ulid, StoreError> {
        let mut generator = self.generator.lock().map_err(|_| StoreError::Poisoned)?;
        generator.generate().map_err(|_| StoreError::IdSpaceExhausted)
    }
}

#[derive(Debug)]
pub enum StoreError {
    Wal(String),
    IdSpaceExhausted,
    Poisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::IdSpaceExhausted => write!(f, "id space exhausted for this millisecond"),
            StoreError::Poisoned => write!(f, "id generator lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}
