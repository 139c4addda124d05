pub const MAX_BOOKINGS_PER_DAY: usize = 10_000;
pub const MAX_CUSTOMER_NAME_LEN: usize = 256;
/// Dates and times of day.
pub const MAX_TOKEN_LEN: usize = 64;
pub const MAX_AMENITIES: usize = 64;
pub const MAX_AMENITY_LEN: usize = 128;
