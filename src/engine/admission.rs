use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::ADMISSIONS_TOTAL;
use crate::store::{NewBooking, NewRoom};

use super::conflict::{first_conflict, validate_request, validate_room};
use super::{Engine, EngineError};

fn record_outcome(result: &Result<Booking, EngineError>) {
    let outcome = match result {
        Ok(_) => "admitted",
        Err(EngineError::SlotConflict(_)) => "conflict",
        Err(EngineError::RoomNotFound(_)) => "room_not_found",
        Err(EngineError::InvalidInterval(_) | EngineError::InvalidRoom(_)) => "invalid",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::StorageFailure(_)) => "storage_failure",
    };
    metrics::counter!(ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

impl Engine {
    pub async fn create_room(
        &self,
        number_of_seats: u32,
        amenities: Vec<String>,
        price_per_hour: f64,
    ) -> Result<Room, EngineError> {
        validate_room(number_of_seats, &amenities, price_per_hour)?;
        let room = self
            .rooms
            .create(NewRoom {
                number_of_seats,
                amenities,
                price_per_hour,
            })
            .await?;
        info!("created {}", room.display_name());
        Ok(room)
    }

    /// Admit a booking unless it overlaps an existing one for the same room
    /// and date.
    ///
    /// The conflict check and the insert run under the `(room_id, date)`
    /// lock, so concurrent overlapping admits cannot both succeed. A
    /// conflict fails immediately; nothing is retried.
    pub async fn admit(
        &self,
        room_id: Ulid,
        customer_name: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<Booking, EngineError> {
        let result = self
            .admit_inner(room_id, customer_name, date, start_time, end_time)
            .await;
        record_outcome(&result);
        result
    }

    async fn admit_inner(
        &self,
        room_id: Ulid,
        customer_name: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<Booking, EngineError> {
        let slot = validate_request(customer_name, date, start_time, end_time)?;

        if self.rooms.get_by_id(room_id).await?.is_none() {
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        }

        let _guard = self.locks.acquire(room_id, &slot.date).await;

        let existing = self.bookings.find_by_room_and_date(room_id, &slot.date).await?;
        if let Some(hit) = first_conflict(&existing, &slot.span) {
            debug!(
                "rejecting [{}, {}) on room {room_id} {}: overlaps booking {}",
                slot.span.start, slot.span.end, slot.date, hit.id
            );
            return Err(EngineError::SlotConflict(hit.id));
        }
        if existing.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings for this room and date"));
        }

        let booking = self
            .bookings
            .create(NewBooking {
                room_id,
                customer_name: customer_name.to_string(),
                date: slot.date,
                start_time: slot.span.start,
                end_time: slot.span.end,
            })
            .await?;
        info!(
            "admitted booking {} for {} on room {room_id} {} [{}, {})",
            booking.id, booking.customer_name, booking.date, booking.start_time, booking.end_time
        );
        Ok(booking)
    }
}
