//! Inventory store: every seat-count mutation and the booking status write
//! that causes it happen inside one transaction scope obtained here.
//!
//! Seat arithmetic is guarded by conditional updates
//! (`... WHERE seats_available >= N AND is_active`), so two scopes racing
//! for the last seat cannot both win regardless of isolation level.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::trip;
use crate::error::{AppError, AppResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 50;

/// Retry an operation on transient storage failures, with exponential
/// backoff and jitter. Anything the operation committed before a transient
/// error is never replayed: callers pass whole-transaction closures.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut delay = BASE_BACKOFF_MS;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let jitter = rand::thread_rng().gen_range(0..delay / 2 + 1);
                tracing::warn!(attempt, %err, "transient storage error, retrying");
                tokio::time::sleep(StdDuration::from_millis(delay + jitter)).await;
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

pub async fn trip_by_id<C: ConnectionTrait>(conn: &C, trip_id: Uuid) -> AppResult<Option<trip::Model>> {
    Ok(trip::Entity::find_by_id(trip_id).one(conn).await?)
}

pub async fn booking_by_id<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
) -> AppResult<Option<booking::Model>> {
    Ok(booking::Entity::find_by_id(booking_id).one(conn).await?)
}

/// The passenger's booking on this trip that still holds seats, if any.
pub async fn active_booking_for<C: ConnectionTrait>(
    conn: &C,
    trip_id: Uuid,
    passenger_id: Uuid,
) -> AppResult<Option<booking::Model>> {
    Ok(booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::PassengerId.eq(passenger_id))
        .filter(booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]))
        .one(conn)
        .await?)
}

/// All bookings on a trip that still hold seats.
pub async fn seat_holding_bookings<C: ConnectionTrait>(
    conn: &C,
    trip_id: Uuid,
) -> AppResult<Vec<booking::Model>> {
    Ok(booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]))
        .all(conn)
        .await?)
}

pub async fn has_confirmed_bookings<C: ConnectionTrait>(conn: &C, trip_id: Uuid) -> AppResult<bool> {
    let found = booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
        .one(conn)
        .await?;
    Ok(found.is_some())
}

/// Candidate set for the expiry sweep. Only ids: each booking is then
/// re-read and re-checked inside its own transaction.
pub async fn pending_booking_ids<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<Uuid>> {
    let rows = booking::Entity::find()
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .order_by_asc(booking::Column::BookingTime)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(|b| b.id).collect())
}

/// Atomically claim `seats` from the trip's inventory. Returns false when
/// the trip is gone, inactive, or short on seats; the caller decides which
/// of those it is by re-reading the row.
pub async fn reserve_seats<C: ConnectionTrait>(conn: &C, trip_id: Uuid, seats: i32) -> AppResult<bool> {
    let result = trip::Entity::update_many()
        .col_expr(
            trip::Column::SeatsAvailable,
            Expr::col(trip::Column::SeatsAvailable).sub(seats),
        )
        .filter(trip::Column::Id.eq(trip_id))
        .filter(trip::Column::IsActive.eq(true))
        .filter(trip::Column::SeatsAvailable.gte(seats))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Return `seats` to the trip's inventory. Guarded against climbing past
/// the capacity at creation, which would mean a corrupted transition path.
pub async fn release_seats<C: ConnectionTrait>(conn: &C, trip_id: Uuid, seats: i32) -> AppResult<()> {
    let result = trip::Entity::update_many()
        .col_expr(
            trip::Column::SeatsAvailable,
            Expr::col(trip::Column::SeatsAvailable).add(seats),
        )
        .filter(trip::Column::Id.eq(trip_id))
        .filter(
            Expr::expr(Expr::col(trip::Column::SeatsAvailable).add(seats))
                .lte(Expr::col(trip::Column::TotalSeats)),
        )
        .exec(conn)
        .await?;

    if result.rows_affected != 1 {
        return Err(AppError::Internal(format!(
            "seat release of {} on trip {} would exceed capacity",
            seats, trip_id
        )));
    }
    Ok(())
}

/// Best-effort parse of a stored booking instant.
///
/// Legacy rows carry timestamps in a few encodings; anything unparseable
/// yields None and the caller must skip the row rather than guess.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_instant("2025-03-01T10:30:00+00:00").unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let dt = parse_instant("2025-03-01T10:30:00+08:00").unwrap();
        assert_eq!(dt.hour(), 2);
    }

    #[test]
    fn parses_legacy_sqlite_formats() {
        assert!(parse_instant("2025-03-01 10:30:00").is_some());
        assert!(parse_instant("2025-03-01 10:30:00.123456").is_some());
        assert!(parse_instant("2025-03-01T10:30:00").is_some());
    }

    #[test]
    fn rejects_garbage_instead_of_guessing() {
        assert!(parse_instant("").is_none());
        assert!(parse_instant("   ").is_none());
        assert!(parse_instant("yesterday-ish").is_none());
        assert!(parse_instant("01/03/2025").is_none());
    }
}
