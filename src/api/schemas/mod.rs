pub mod conversations;
pub mod health;
pub mod uploads;

use time::OffsetDateTime;

pub(crate) fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
