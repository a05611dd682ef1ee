use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{location, trip};
use crate::error::{AppError, AppResult};
use crate::reservation::service;
use crate::reservation::{execute, CommandOutcome, ReservationCommand};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub seats: i32,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub departure: String,
    pub destination: String,
    pub departure_time: Option<DateTime<Utc>>,
    pub seats: i32,
    pub status: BookingStatus,
}

fn booking_response(
    b: &booking::Model,
    trips: &[trip::Model],
    all_locations: &[location::Model],
) -> BookingResponse {
    let trip = trips.iter().find(|t| t.id == b.trip_id);
    let name_of = |id: i32| {
        all_locations
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.name.clone())
            .unwrap_or_default()
    };

    BookingResponse {
        id: b.id,
        trip_id: b.trip_id,
        departure: trip.map(|t| name_of(t.departure_id)).unwrap_or_default(),
        destination: trip.map(|t| name_of(t.destination_id)).unwrap_or_default(),
        departure_time: trip.map(|t| t.departure_time.with_timezone(&Utc)),
        seats: b.seats,
        status: b.status.clone(),
    }
}

fn into_booking(outcome: CommandOutcome) -> AppResult<booking::Model> {
    match outcome {
        CommandOutcome::Booking(b) => Ok(b),
        CommandOutcome::TripCancelled { .. } => {
            Err(AppError::Internal("unexpected command outcome".to_string()))
        }
    }
}

/// Request seats on a trip
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<Json<booking::Model>> {
    let outcome = execute(
        &state,
        claims.sub,
        ReservationCommand::CreateBooking {
            trip_id: payload.trip_id,
            seats: payload.seats,
        },
    )
    .await?;

    Ok(Json(into_booking(outcome)?))
}

/// List the logged-in user's bookings
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let bookings = booking::Entity::find()
        .filter(booking::Column::PassengerId.eq(claims.sub))
        .all(&state.db)
        .await?;
    let trips = trip::Entity::find().all(&state.db).await?;
    let all_locations = location::Entity::find().all(&state.db).await?;

    let responses = bookings
        .iter()
        .map(|b| booking_response(b, &trips, &all_locations))
        .collect();

    Ok(Json(responses))
}

/// Driver confirms a pending booking
pub async fn confirm_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<booking::Model>> {
    let outcome = execute(&state, claims.sub, ReservationCommand::Confirm { booking_id }).await?;
    Ok(Json(into_booking(outcome)?))
}

/// Driver rejects a pending booking
pub async fn reject_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<booking::Model>> {
    let outcome = execute(&state, claims.sub, ReservationCommand::Reject { booking_id }).await?;
    Ok(Json(into_booking(outcome)?))
}

/// Cancel a booking. The passenger cancels their own; the trip's driver
/// cancels administratively. The actor picks the path here, and the
/// service re-validates ownership inside its transaction.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<booking::Model>> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    let command = if booking.passenger_id == claims.sub {
        ReservationCommand::CancelByPassenger { booking_id }
    } else {
        ReservationCommand::CancelByDriver { booking_id }
    };

    let outcome = execute(&state, claims.sub, command).await?;
    Ok(Json(into_booking(outcome)?))
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub outcome: Option<String>,
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

/// Post-trip feedback from the passenger
pub async fn rate_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> AppResult<Json<booking::Model>> {
    let updated = service::rate_booking(
        &state,
        claims.sub,
        booking_id,
        payload.outcome,
        payload.rating,
        payload.comment,
    )
    .await?;

    Ok(Json(updated))
}
