use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

const UNKNOWN_ROOM: &str = "Unknown";

impl Engine {
    /// Every room with its bookings, both in creation order.
    pub async fn rooms_with_bookings(&self) -> Result<Vec<RoomWithBookings>, EngineError> {
        let rooms = self.rooms.list_all().await?;
        let bookings = self.bookings.list_all().await?;

        let mut by_room: HashMap<Ulid, Vec<Booking>> = HashMap::new();
        for b in bookings {
            by_room.entry(b.room_id).or_default().push(b);
        }

        Ok(rooms
            .into_iter()
            .map(|room| {
                let bookings = by_room.remove(&room.id).unwrap_or_default();
                RoomWithBookings { room, bookings }
            })
            .collect())
    }

    /// Every booking paired with its room's display name. A booking whose
    /// room is missing gets "Unknown" rather than failing the view.
    pub async fn customers_with_bookings(&self) -> Result<Vec<CustomerBooking>, EngineError> {
        let bookings = self.bookings.list_all().await?;
        let rooms = self.rooms.list_all().await?;
        let names: HashMap<Ulid, String> = rooms.iter().map(|r| (r.id, r.display_name())).collect();

        Ok(bookings
            .into_iter()
            .map(|b| CustomerBooking {
                booking_id: b.id,
                room_name: names
                    .get(&b.room_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_ROOM.to_string()),
                customer_name: b.customer_name,
                date: b.date,
                start_time: b.start_time,
                end_time: b.end_time,
            })
            .collect())
    }

    pub async fn customer_room_history(
        &self,
        customer_name: &str,
        room_name: &str,
    ) -> Result<CustomerHistory, EngineError> {
        let room = self
            .rooms
            .find_by_display_name(room_name)
            .await?
            .ok_or_else(|| EngineError::RoomNotFound(room_name.to_string()))?;

        let bookings = self
            .bookings
            .find_by_customer_and_room(customer_name, room.id)
            .await?;

        Ok(CustomerHistory {
            customer_name: customer_name.to_string(),
            room_name: room.display_name(),
            bookings: bookings
                .into_iter()
                .map(|b| HistoryEntry {
                    booking_id: b.id,
                    booked_at: b.booked_at(),
                    date: b.date,
                    start_time: b.start_time,
                    end_time: b.end_time,
                    status: BookingStatus::Confirmed,
                })
                .collect(),
        })
    }
}
