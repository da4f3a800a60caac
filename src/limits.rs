use crate::model::Ms;

pub const MAX_STUDIOS: usize = 1_000;
pub const MAX_MOVIES: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SEAT_CAPACITY: u32 = 10_000;
pub const MAX_PAYMENT_METHOD_LEN: usize = 64;
pub const MAX_PROMO_CODE_LEN: usize = 64;

/// Longest movie the allocator will try to place (24h).
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;
/// Longest turnaround after a showing.
pub const MAX_BUFFER_MINUTES: u32 = 24 * 60;

/// Widest allocation run accepted in one call.
pub const MAX_ALLOCATION_DAYS: i64 = 366;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
