//! Background maintenance: the expiry sweep over PENDING bookings and the
//! retention cleanup of long-past trips. Both run on their own schedule,
//! concurrently with request-driven operations, and commit per item so one
//! failure never aborts a whole cycle.

use std::time::Duration;

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, TransactionTrait};

use crate::entities::booking::{self, BookingStatus};
use crate::entities::trip;
use crate::reservation::service;
use crate::store;
use crate::AppState;

const CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Spawn both background loops. They hold a clone of the app state and
/// live for the life of the process.
pub fn spawn(state: AppState) {
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(sweep_state.config.sweep_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a restart loop
        // cannot hammer the store.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&sweep_state).await;
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cleanup_once(&state).await;
        }
    });
}

/// One sweep: expire every PENDING booking past its TTL. Returns how many
/// were expired. Per-booking errors are logged and skipped.
pub async fn sweep_once(state: &AppState) -> usize {
    let candidates = match store::pending_booking_ids(&state.db).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::error!(%err, "expiry sweep could not list pending bookings");
            return 0;
        }
    };

    let mut expired = 0;
    for booking_id in candidates {
        match service::expire_booking(state, booking_id).await {
            Ok(true) => expired += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::error!(booking = %booking_id, %err, "expiry sweep failed for booking");
            }
        }
    }

    if expired > 0 {
        tracing::info!(
            expired,
            ttl_minutes = state.config.pending_ttl_minutes,
            "expired pending bookings"
        );
    }
    expired
}

/// One retention pass: hard-delete trips whose window ended more than the
/// retention period ago, bookings included. Trips still carrying a
/// non-terminal booking are left alone.
pub async fn cleanup_once(state: &AppState) -> usize {
    // Bound as the column's own type so the comparison encodes identically
    // on every backend.
    let cutoff: sea_orm::prelude::DateTimeWithTimeZone =
        (Utc::now() - state.config.cleanup_retention()).into();

    let old_trips = match trip::Entity::find()
        .filter(trip::Column::EndTime.lt(cutoff))
        .all(&state.db)
        .await
    {
        Ok(trips) => trips,
        Err(err) => {
            tracing::error!(%err, "cleanup could not list old trips");
            return 0;
        }
    };

    let mut removed = 0;
    for old in old_trips {
        match delete_trip(state, &old).await {
            Ok(true) => removed += 1,
            Ok(false) => {
                tracing::warn!(trip = %old.id, "old trip kept: non-terminal bookings remain");
            }
            Err(err) => {
                tracing::error!(trip = %old.id, %err, "cleanup failed for trip");
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, retention_days = state.config.cleanup_retention_days, "cleaned up old trips");
    }
    removed
}

async fn delete_trip(state: &AppState, old: &trip::Model) -> crate::AppResult<bool> {
    let txn = state.db.begin().await?;

    let lingering = booking::Entity::find()
        .filter(booking::Column::TripId.eq(old.id))
        .filter(booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]))
        .one(&txn)
        .await?;
    if lingering.is_some() {
        return Ok(false);
    }

    booking::Entity::delete_many()
        .filter(booking::Column::TripId.eq(old.id))
        .exec(&txn)
        .await?;
    old.clone().delete(&txn).await?;
    txn.commit().await?;
    Ok(true)
}
