use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn validate_token(token: &str, missing: &'static str) -> Result<(), EngineError> {
    if token.trim().is_empty() {
        return Err(EngineError::InvalidInterval(missing));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(EngineError::LimitExceeded("date or time token too long"));
    }
    Ok(())
}

/// Structural checks on an admission request. Returns the candidate slot.
pub(crate) fn validate_request(
    customer_name: &str,
    date: &str,
    start_time: &str,
    end_time: &str,
) -> Result<Slot, EngineError> {
    if customer_name.trim().is_empty() {
        return Err(EngineError::InvalidInterval("customer name is required"));
    }
    if customer_name.len() > MAX_CUSTOMER_NAME_LEN {
        return Err(EngineError::LimitExceeded("customer name too long"));
    }
    validate_token(date, "date is required")?;
    validate_token(start_time, "start time is required")?;
    validate_token(end_time, "end time is required")?;
    Slot::new(date, start_time, end_time)
        .ok_or(EngineError::InvalidInterval("start time must be before end time"))
}

pub(crate) fn validate_room(
    number_of_seats: u32,
    amenities: &[String],
    price_per_hour: f64,
) -> Result<(), EngineError> {
    if number_of_seats == 0 {
        return Err(EngineError::InvalidRoom("number of seats must be positive"));
    }
    if !price_per_hour.is_finite() || price_per_hour < 0.0 {
        return Err(EngineError::InvalidRoom("price per hour must be a non-negative number"));
    }
    if amenities.len() > MAX_AMENITIES {
        return Err(EngineError::LimitExceeded("too many amenities"));
    }
    if amenities.iter().any(|a| a.len() > MAX_AMENITY_LEN) {
        return Err(EngineError::LimitExceeded("amenity too long"));
    }
    Ok(())
}

/// First existing booking whose span overlaps `span`. Callers pass bookings
/// for a single (room, date).
pub(crate) fn first_conflict<'a>(existing: &'a [Booking], span: &Span) -> Option<&'a Booking> {
    existing.iter().find(|b| b.overlaps(span))
}
