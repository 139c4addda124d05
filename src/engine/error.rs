use ulid::Ulid;

use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Reversed or empty interval, or a missing required field.
    InvalidInterval(&'static str),
    InvalidRoom(&'static str),
    /// Room id or display name that does not resolve.
    RoomNotFound(String),
    /// Carries the id of the admitted booking that overlaps the request.
    SlotConflict(Ulid),
    LimitExceeded(&'static str),
    StorageFailure(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval(msg) => write!(f, "invalid interval: {msg}"),
            EngineError::InvalidRoom(msg) => write!(f, "invalid room: {msg}"),
            EngineError::RoomNotFound(room) => write!(f, "room not found: {room}"),
            EngineError::SlotConflict(id) => {
                write!(f, "room is already booked at this time (conflicts with booking {id})")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageFailure(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StorageFailure(e.to_string())
    }
}
