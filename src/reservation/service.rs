//! The reservation operation surface. Each operation wraps exactly one
//! inventory-store transaction: guards run first, the state-machine
//! transition and its seat delta commit together, and notifications go
//! out only after the commit.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::trip;
use crate::entities::user;
use crate::error::{AppError, AppResult, ConflictKind};
use crate::locations;
use crate::moderation;
use crate::notify::Notification;
use crate::store;
use crate::AppState;

use super::state::{logically_expired, transition, BookingEvent, SeatEffect};

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub departure: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub seats: i32,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TripEdit {
    pub departure: Option<String>,
    pub destination: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
}

/// Publish a trip. Seat inventory starts at full capacity; both endpoints
/// must resolve against the location directory.
pub async fn create_trip(state: &AppState, actor: Uuid, input: NewTrip) -> AppResult<trip::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;

    let max_seats = state.config.max_seats_per_booking;
    if input.seats < 1 || input.seats > max_seats {
        return Err(AppError::Validation(format!(
            "Seat count must be between 1 and {}",
            max_seats
        )));
    }
    if input.price.is_some_and(|p| p < 0.0) {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    if input.departure_time <= Utc::now() {
        return Err(AppError::Validation(
            "Departure time must be in the future".to_string(),
        ));
    }
    let end_time = input.end_time.unwrap_or(input.departure_time);
    if end_time < input.departure_time {
        return Err(AppError::Validation(
            "End of the trip window cannot precede its start".to_string(),
        ));
    }

    let departure = locations::resolve(&state.db, &input.departure).await?;
    let destination = locations::resolve(&state.db, &input.destination).await?;
    if departure.id == destination.id {
        return Err(AppError::Validation(
            "Departure and destination must be different".to_string(),
        ));
    }

    let new_trip = trip::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(actor),
        departure_id: Set(departure.id),
        destination_id: Set(destination.id),
        departure_time: Set(input.departure_time.into()),
        end_time: Set(end_time.into()),
        total_seats: Set(input.seats),
        seats_available: Set(input.seats),
        price: Set(input.price),
        vehicle: Set(input.vehicle),
        is_active: Set(true),
        created_at: Set(Utc::now().into()),
    };

    let created = new_trip.insert(&state.db).await?;
    tracing::info!(trip = %created.id, driver = %actor, seats = created.total_seats, "trip published");
    Ok(created)
}

/// Edit a published trip. Disallowed outright once any booking is
/// CONFIRMED; seat capacity is immutable after creation.
pub async fn update_trip(
    state: &AppState,
    actor: Uuid,
    trip_id: Uuid,
    edit: TripEdit,
) -> AppResult<trip::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| try_update_trip(state, actor, trip_id, edit.clone())).await
}

async fn try_update_trip(
    state: &AppState,
    actor: Uuid,
    trip_id: Uuid,
    edit: TripEdit,
) -> AppResult<trip::Model> {
    let txn = state.db.begin().await?;

    let trip = store::trip_by_id(&txn, trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;
    if trip.driver_id != actor {
        return Err(AppError::Forbidden(
            "Only the trip's driver can edit it".to_string(),
        ));
    }
    if !trip.is_active {
        return Err(ConflictKind::TripInactive.into());
    }
    if store::has_confirmed_bookings(&txn, trip_id).await? {
        return Err(ConflictKind::HasConfirmedBookings.into());
    }

    let departure_time = edit
        .departure_time
        .unwrap_or_else(|| trip.departure_time.with_timezone(&Utc));
    // Point-in-time trips (end == start) keep their end glued to the
    // start when only the departure moves.
    let end_time = match edit.end_time {
        Some(end) => end,
        None if trip.end_time == trip.departure_time => departure_time,
        None => trip.end_time.with_timezone(&Utc),
    };
    if departure_time <= Utc::now() {
        return Err(AppError::Validation(
            "Departure time must be in the future".to_string(),
        ));
    }
    if end_time < departure_time {
        return Err(AppError::Validation(
            "End of the trip window cannot precede its start".to_string(),
        ));
    }
    if edit.price.is_some_and(|p| p < 0.0) {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }

    let mut active: trip::ActiveModel = trip.clone().into();
    if let Some(name) = &edit.departure {
        active.departure_id = Set(locations::resolve(&txn, name).await?.id);
    }
    if let Some(name) = &edit.destination {
        active.destination_id = Set(locations::resolve(&txn, name).await?.id);
    }
    active.departure_time = Set(departure_time.into());
    active.end_time = Set(end_time.into());
    if let Some(price) = edit.price {
        active.price = Set(Some(price));
    }
    if let Some(vehicle) = edit.vehicle {
        active.vehicle = Set(Some(vehicle));
    }

    let updated = active.update(&txn).await?;
    if updated.departure_id == updated.destination_id {
        return Err(AppError::Validation(
            "Departure and destination must be different".to_string(),
        ));
    }
    txn.commit().await?;
    Ok(updated)
}

/// Reserve seats on a trip. Seats are deducted now, optimistically: the
/// driver has until the TTL to confirm, after which the sweep reclaims
/// them.
pub async fn create_booking(
    state: &AppState,
    actor: Uuid,
    trip_id: Uuid,
    seats: i32,
) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;

    let max_seats = state.config.max_seats_per_booking;
    if seats < 1 || seats > max_seats {
        return Err(AppError::Validation(format!(
            "Seat count must be between 1 and {}",
            max_seats
        )));
    }

    store::with_backoff(|| try_create_booking(state, actor, trip_id, seats)).await
}

async fn try_create_booking(
    state: &AppState,
    actor: Uuid,
    trip_id: Uuid,
    seats: i32,
) -> AppResult<booking::Model> {
    let txn = state.db.begin().await?;

    let trip = store::trip_by_id(&txn, trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id == actor {
        return Err(AppError::Forbidden(
            "You cannot book a seat on your own trip".to_string(),
        ));
    }
    if !trip.is_active {
        return Err(ConflictKind::TripInactive.into());
    }
    if trip.departure_time.with_timezone(&Utc) < Utc::now() {
        return Err(ConflictKind::TripDeparted.into());
    }
    if store::active_booking_for(&txn, trip_id, actor).await?.is_some() {
        return Err(ConflictKind::DuplicateBooking.into());
    }
    if seats > trip.seats_available {
        return Err(ConflictKind::InsufficientSeats {
            available: trip.seats_available,
        }
        .into());
    }

    // The conditional update is what actually decides the race; the read
    // above only produces a friendlier error for the common case.
    if !store::reserve_seats(&txn, trip_id, seats).await? {
        let available = store::trip_by_id(&txn, trip_id)
            .await?
            .map(|t| t.seats_available)
            .unwrap_or(0);
        return Err(ConflictKind::InsufficientSeats { available }.into());
    }

    let passenger = user::Entity::find_by_id(actor)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let new_booking = booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        trip_id: Set(trip_id),
        passenger_id: Set(actor),
        seats: Set(seats),
        status: Set(BookingStatus::Pending),
        booking_time: Set(Utc::now().to_rfc3339()),
        notify_ref: Set(None),
        trip_outcome: Set(None),
        rating: Set(None),
        rating_comment: Set(None),
        rated_at: Set(None),
    };
    let created = new_booking.insert(&txn).await?;
    txn.commit().await?;

    state
        .notifier
        .send(Notification::DriverNewBooking {
            driver_id: trip.driver_id,
            booking_id: created.id,
            trip_id,
            seats,
            passenger_name: passenger.name,
            passenger_contact: passenger.email,
        })
        .await;

    Ok(created)
}

pub async fn confirm(state: &AppState, actor: Uuid, booking_id: Uuid) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| finalize_pending(state, actor, booking_id, BookingEvent::Confirm)).await
}

pub async fn reject(state: &AppState, actor: Uuid, booking_id: Uuid) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| finalize_pending(state, actor, booking_id, BookingEvent::Reject)).await
}

/// Shared confirm/reject path. Re-checks the TTL inside the transaction:
/// if the booking is logically expired the sweep simply has not reached it
/// yet, so this commits the EXPIRED transition instead and reports the
/// expiry. The two paths can never both win.
async fn finalize_pending(
    state: &AppState,
    actor: Uuid,
    booking_id: Uuid,
    event: BookingEvent,
) -> AppResult<booking::Model> {
    let txn = state.db.begin().await?;

    let booking = store::booking_by_id(&txn, booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    let trip = store::trip_by_id(&txn, booking.trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != actor {
        return Err(AppError::Forbidden(
            "Only the trip's driver can decide this booking".to_string(),
        ));
    }
    if booking.status != BookingStatus::Pending {
        return Err(ConflictKind::AlreadyFinalized {
            status: booking.status.as_str(),
        }
        .into());
    }

    let expired = store::parse_instant(&booking.booking_time)
        .map(|t| logically_expired(t, state.config.pending_ttl(), Utc::now()))
        .unwrap_or(false);
    if expired {
        let updated = apply_transition(&txn, booking, &trip, BookingEvent::Expire).await?;
        txn.commit().await?;
        state
            .notifier
            .send(Notification::PassengerBookingExpired {
                passenger_id: updated.passenger_id,
                booking_id: updated.id,
                trip_id: trip.id,
                ttl_minutes: state.config.pending_ttl_minutes,
            })
            .await;
        return Err(ConflictKind::BookingExpired.into());
    }

    let updated = apply_transition(&txn, booking, &trip, event).await?;
    txn.commit().await?;

    let note = match event {
        BookingEvent::Confirm => Some(Notification::PassengerBookingConfirmed {
            passenger_id: updated.passenger_id,
            booking_id: updated.id,
            trip_id: trip.id,
            seats: updated.seats,
        }),
        BookingEvent::Reject => Some(Notification::PassengerBookingRejected {
            passenger_id: updated.passenger_id,
            booking_id: updated.id,
            trip_id: trip.id,
        }),
        _ => None,
    };
    if let Some(note) = note {
        state.notifier.send(note).await;
    }

    Ok(updated)
}

pub async fn cancel_by_passenger(
    state: &AppState,
    actor: Uuid,
    booking_id: Uuid,
) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| try_cancel(state, actor, booking_id, BookingEvent::CancelByPassenger))
        .await
}

pub async fn cancel_by_driver(
    state: &AppState,
    actor: Uuid,
    booking_id: Uuid,
) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| try_cancel(state, actor, booking_id, BookingEvent::CancelByDriver)).await
}

async fn try_cancel(
    state: &AppState,
    actor: Uuid,
    booking_id: Uuid,
    event: BookingEvent,
) -> AppResult<booking::Model> {
    let txn = state.db.begin().await?;

    let booking = store::booking_by_id(&txn, booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    let trip = store::trip_by_id(&txn, booking.trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    match event {
        BookingEvent::CancelByPassenger => {
            if booking.passenger_id != actor {
                return Err(AppError::Forbidden(
                    "You can only cancel your own bookings".to_string(),
                ));
            }
        }
        BookingEvent::CancelByDriver => {
            if trip.driver_id != actor {
                return Err(AppError::Forbidden(
                    "Only the trip's driver can cancel this booking".to_string(),
                ));
            }
        }
        _ => {
            return Err(AppError::Internal(
                "cancel path invoked with a non-cancel event".to_string(),
            ));
        }
    }

    if trip.end_time.with_timezone(&Utc) < Utc::now() {
        return Err(ConflictKind::TripDeparted.into());
    }

    let passenger_name = user::Entity::find_by_id(booking.passenger_id)
        .one(&txn)
        .await?
        .map(|u| u.name)
        .unwrap_or_default();

    let updated = apply_transition(&txn, booking, &trip, event).await?;
    txn.commit().await?;

    let note = match event {
        BookingEvent::CancelByPassenger => Notification::DriverBookingCancelled {
            driver_id: trip.driver_id,
            booking_id: updated.id,
            trip_id: trip.id,
            seats: updated.seats,
            passenger_name,
        },
        _ => Notification::PassengerBookingCancelled {
            passenger_id: updated.passenger_id,
            booking_id: updated.id,
            trip_id: trip.id,
        },
    };
    state.notifier.send(note).await;

    Ok(updated)
}

/// Cancel a whole trip: soft-retire it and cancel every booking that still
/// holds seats, one notification per affected passenger. Idempotent:
/// cancelling an already-cancelled trip is a no-op, not an error.
pub async fn cancel_trip(state: &AppState, actor: Uuid, trip_id: Uuid) -> AppResult<u64> {
    moderation::ensure_not_banned(&state.db, actor).await?;
    store::with_backoff(|| try_cancel_trip(state, actor, trip_id)).await
}

async fn try_cancel_trip(state: &AppState, actor: Uuid, trip_id: Uuid) -> AppResult<u64> {
    let txn = state.db.begin().await?;

    let trip = store::trip_by_id(&txn, trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;
    if trip.driver_id != actor {
        return Err(AppError::Forbidden(
            "Only the trip's driver can cancel it".to_string(),
        ));
    }
    if !trip.is_active {
        return Ok(0);
    }

    let holding = store::seat_holding_bookings(&txn, trip_id).await?;
    let mut notes = Vec::with_capacity(holding.len());
    for booking in holding {
        let passenger_id = booking.passenger_id;
        let booking_id = booking.id;
        let updated = apply_transition(&txn, booking, &trip, BookingEvent::CancelByDriver).await?;
        debug_assert!(updated.status.is_terminal());
        notes.push(Notification::PassengerTripCancelled {
            passenger_id,
            booking_id,
            trip_id,
        });
    }

    let mut active: trip::ActiveModel = trip.into();
    active.is_active = Set(false);
    active.update(&txn).await?;
    txn.commit().await?;

    let cancelled = notes.len() as u64;
    for note in notes {
        state.notifier.send(note).await;
    }
    tracing::info!(trip = %trip_id, bookings = cancelled, "trip cancelled");

    Ok(cancelled)
}

/// Expire one PENDING booking if its TTL has elapsed. Owned by the sweep;
/// commits per booking so one failure never blocks the rest of a cycle.
/// Returns false when there was nothing to do.
pub async fn expire_booking(state: &AppState, booking_id: Uuid) -> AppResult<bool> {
    store::with_backoff(|| try_expire_booking(state, booking_id)).await
}

async fn try_expire_booking(state: &AppState, booking_id: Uuid) -> AppResult<bool> {
    let txn = state.db.begin().await?;

    let Some(booking) = store::booking_by_id(&txn, booking_id).await? else {
        return Ok(false);
    };
    if booking.status != BookingStatus::Pending {
        return Ok(false);
    }

    // Unparseable timestamps are skipped, never guessed at.
    let Some(booked_at) = store::parse_instant(&booking.booking_time) else {
        tracing::warn!(
            booking = %booking.id,
            raw = %booking.booking_time,
            "unparseable booking_time, skipping expiry"
        );
        return Ok(false);
    };
    if !logically_expired(booked_at, state.config.pending_ttl(), Utc::now()) {
        return Ok(false);
    }

    let trip = store::trip_by_id(&txn, booking.trip_id)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!("booking {} references a missing trip", booking.id))
        })?;

    let updated = apply_transition(&txn, booking, &trip, BookingEvent::Expire).await?;
    txn.commit().await?;

    state
        .notifier
        .send(Notification::PassengerBookingExpired {
            passenger_id: updated.passenger_id,
            booking_id: updated.id,
            trip_id: trip.id,
            ttl_minutes: state.config.pending_ttl_minutes,
        })
        .await;

    Ok(true)
}

/// Record post-trip feedback on a confirmed booking. No effect on seat
/// inventory.
pub async fn rate_booking(
    state: &AppState,
    actor: Uuid,
    booking_id: Uuid,
    outcome: Option<String>,
    rating: Option<i32>,
    comment: Option<String>,
) -> AppResult<booking::Model> {
    moderation::ensure_not_banned(&state.db, actor).await?;

    if rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return Err(AppError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }

    let booking = store::booking_by_id(&state.db, booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    if booking.passenger_id != actor {
        return Err(AppError::Forbidden(
            "You can only rate your own bookings".to_string(),
        ));
    }
    if booking.status != BookingStatus::Confirmed {
        return Err(AppError::Validation(
            "Only confirmed bookings can be rated".to_string(),
        ));
    }
    let trip = store::trip_by_id(&state.db, booking.trip_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;
    if trip.end_time.with_timezone(&Utc) > Utc::now() {
        return Err(AppError::Validation(
            "Feedback opens once the trip has ended".to_string(),
        ));
    }

    let mut active: booking::ActiveModel = booking.into();
    if let Some(outcome) = outcome {
        active.trip_outcome = Set(Some(outcome));
    }
    if let Some(rating) = rating {
        active.rating = Set(Some(rating));
    }
    if let Some(comment) = comment {
        active.rating_comment = Set(Some(comment));
    }
    active.rated_at = Set(Some(Utc::now().into()));

    Ok(active.update(&state.db).await?)
}

/// Apply a state-machine transition and its seat delta in one scope. The
/// caller owns the transaction and commits after this returns.
async fn apply_transition(
    txn: &sea_orm::DatabaseTransaction,
    booking: booking::Model,
    trip: &trip::Model,
    event: BookingEvent,
) -> AppResult<booking::Model> {
    let (next, effect) = transition(&booking.status, event)?;
    if effect == SeatEffect::Release {
        store::release_seats(txn, trip.id, booking.seats).await?;
    }
    let mut active: booking::ActiveModel = booking.into();
    active.status = Set(next);
    Ok(active.update(txn).await?)
}
