use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{BookingRepository, IdSource, NewBooking, NewRoom, RoomRepository, StoreError};

type DayKey = (Ulid, String);

/// Rooms and bookings held in memory.
///
/// Bookings are indexed per `(room_id, date)`, each day kept sorted by
/// `start_time`, so the admission check only reads one day's bookings.
pub struct MemoryStore {
    rooms: DashMap<Ulid, Room>,
    bookings: DashMap<Ulid, Booking>,
    days: DashMap<DayKey, Vec<Booking>>,
    ids: IdSource,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            days: DashMap::new(),
            ids: IdSource::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub(crate) fn next_id(&self) -> Result<Ulid, StoreError> {
        self.ids.next()
    }

    pub(crate) fn insert_room(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    /// Insert maintaining the day index sort order by start_time.
    pub(crate) fn insert_booking(&self, booking: Booking) {
        let key = (booking.room_id, booking.date.clone());
        let mut day = self.days.entry(key).or_default();
        let pos = day
            .binary_search_by(|b| b.start_time.cmp(&booking.start_time))
            .unwrap_or_else(|e| e);
        day.insert(pos, booking.clone());
        drop(day);
        self.bookings.insert(booking.id, booking);
    }

    /// Apply a replayed WAL event.
    pub(crate) fn apply_event(&self, event: Event) {
        match event {
            Event::RoomCreated {
                id,
                number_of_seats,
                amenities,
                price_per_hour,
            } => self.insert_room(Room {
                id,
                number_of_seats,
                amenities,
                price_per_hour,
            }),
            Event::BookingAdmitted {
                id,
                room_id,
                customer_name,
                date,
                start_time,
                end_time,
            } => self.insert_booking(Booking {
                id,
                room_id,
                customer_name,
                date,
                start_time,
                end_time,
            }),
        }
    }

    pub(crate) fn build_room(&self, fields: NewRoom) -> Result<Room, StoreError> {
        Ok(Room {
            id: self.next_id()?,
            number_of_seats: fields.number_of_seats,
            amenities: fields.amenities,
            price_per_hour: fields.price_per_hour,
        })
    }

    pub(crate) fn build_booking(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        Ok(Booking {
            id: self.next_id()?,
            room_id: fields.room_id,
            customer_name: fields.customer_name,
            date: fields.date,
            start_time: fields.start_time,
            end_time: fields.end_time,
        })
    }

    pub(crate) fn rooms_in_order(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub(crate) fn bookings_in_order(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| b.id);
        bookings
    }

    pub(crate) fn room(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(crate) fn room_by_display_name(&self, name: &str) -> Option<Room> {
        let id = name.strip_prefix("Room ")?;
        let id = Ulid::from_string(id.trim()).ok()?;
        self.room(&id)
    }

    pub(crate) fn day(&self, room_id: Ulid, date: &str) -> Vec<Booking> {
        self.days
            .get(&(room_id, date.to_string()))
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn customer_bookings(&self, customer_name: &str, room_id: Ulid) -> Vec<Booking> {
        let mut found: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.room_id == room_id && e.customer_name == customer_name)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|b| b.id);
        found
    }
}

#[async_trait]
impl RoomRepository for MemoryStore {
    async fn create(&self, fields: NewRoom) -> Result<Room, StoreError> {
        let room = self.build_room(fields)?;
        self.insert_room(room.clone());
        Ok(room)
    }

    async fn get_by_id(&self, id: Ulid) -> Result<Option<Room>, StoreError> {
        Ok(self.room(&id))
    }

    async fn list_all(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms_in_order())
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.room_by_display_name(name))
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create(&self, fields: NewBooking) -> Result<Booking, StoreError> {
        let booking = self.build_booking(fields)?;
        self.insert_booking(booking.clone());
        Ok(booking)
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.bookings_in_order())
    }

    async fn find_by_room_and_date(&self, room_id: Ulid, date: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self.day(room_id, date))
    }

    async fn find_by_customer_and_room(
        &self,
        customer_name: &str,
        room_id: Ulid,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self.customer_bookings(customer_name, room_id))
    }
}
