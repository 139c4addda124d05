use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Half-open time-of-day interval `[start, end)`.
///
/// Tokens compare lexicographically, so callers must use a sortable encoding
/// such as zero-padded 24-hour `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: String,
    pub end: String,
}

impl Span {
    /// Returns `None` unless `start < end`.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Option<Self> {
        let (start, end) = (start.into(), end.into());
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// The temporal footprint of a booking: one date plus a span on that date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: String,
    pub span: Span,
}

impl Slot {
    pub fn new(date: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Option<Self> {
        Some(Self {
            date: date.into(),
            span: Span::new(start, end)?,
        })
    }

    /// Slots on different dates never overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.date == other.date && self.span.overlaps(&other.span)
    }
}

/// Display name of a room. Query views and history lookups resolve rooms by it.
pub fn room_display_name(id: &Ulid) -> String {
    format!("Room {id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub number_of_seats: u32,
    pub amenities: Vec<String>,
    pub price_per_hour: f64,
}

impl Room {
    pub fn display_name(&self) -> String {
        room_display_name(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub customer_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span {
            start: self.start_time.clone(),
            end: self.end_time.clone(),
        }
    }

    pub fn overlaps(&self, span: &Span) -> bool {
        self.start_time < span.end && span.start < self.end_time
    }

    /// Creation time, taken from the timestamp half of the ULID.
    pub fn booked_at(&self) -> Ms {
        self.id.timestamp_ms() as Ms
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        number_of_seats: u32,
        amenities: Vec<String>,
        price_per_hour: f64,
    },
    BookingAdmitted {
        id: Ulid,
        room_id: Ulid,
        customer_name: String,
        date: String,
        start_time: String,
        end_time: String,
    },
}

impl From<&Room> for Event {
    fn from(room: &Room) -> Self {
        Event::RoomCreated {
            id: room.id,
            number_of_seats: room.number_of_seats,
            amenities: room.amenities.clone(),
            price_per_hour: room.price_per_hour,
        }
    }
}

impl From<&Booking> for Event {
    fn from(b: &Booking) -> Self {
        Event::BookingAdmitted {
            id: b.id,
            room_id: b.room_id,
            customer_name: b.customer_name.clone(),
            date: b.date.clone(),
            start_time: b.start_time.clone(),
            end_time: b.end_time.clone(),
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomWithBookings {
    pub room: Room,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerBooking {
    pub booking_id: Ulid,
    pub customer_name: String,
    pub room_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingStatus {
    Confirmed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "Confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub booking_id: Ulid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub booked_at: Ms,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerHistory {
    pub customer_name: String,
    pub room_name: String,
    pub bookings: Vec<HistoryEntry>,
}
