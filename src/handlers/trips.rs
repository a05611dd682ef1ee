use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{location, trip, user};
use crate::error::{AppError, AppResult};
use crate::locations;
use crate::reservation::service::{self, NewTrip, TripEdit};
use crate::reservation::{execute, CommandOutcome, ReservationCommand};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub departure: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_seats: i32,
    pub seats_available: i32,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
    pub driver_name: String,
    pub is_active: bool,
}

pub(crate) fn trip_response(
    trip: &trip::Model,
    locations: &[location::Model],
    drivers: &[user::Model],
) -> TripResponse {
    let name_of = |id: i32| {
        locations
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.name.clone())
            .unwrap_or_default()
    };

    TripResponse {
        id: trip.id,
        departure: name_of(trip.departure_id),
        destination: name_of(trip.destination_id),
        departure_time: trip.departure_time.with_timezone(&Utc),
        end_time: trip.end_time.with_timezone(&Utc),
        total_seats: trip.total_seats,
        seats_available: trip.seats_available,
        price: trip.price,
        vehicle: trip.vehicle.clone(),
        driver_name: drivers
            .iter()
            .find(|d| d.id == trip.driver_id)
            .map(|d| d.name.clone())
            .unwrap_or_default(),
        is_active: trip.is_active,
    }
}

#[derive(Debug, Deserialize)]
pub struct TripFilter {
    pub departure: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
}

/// List upcoming active trips with seats left, optionally filtered by
/// endpoint names and date.
pub async fn list_trips(
    State(state): State<AppState>,
    Query(filter): Query<TripFilter>,
) -> AppResult<Json<Vec<TripResponse>>> {
    let now = Utc::now();
    let trips = trip::Entity::find()
        .filter(trip::Column::IsActive.eq(true))
        .all(&state.db)
        .await?;
    let all_locations = location::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find().all(&state.db).await?;

    let departure_filter = filter.departure.as_deref().map(locations::normalize);
    let destination_filter = filter.destination.as_deref().map(locations::normalize);

    let responses: Vec<TripResponse> = trips
        .iter()
        .filter(|t| t.departure_time.with_timezone(&Utc) >= now && t.seats_available > 0)
        .map(|t| trip_response(t, &all_locations, &drivers))
        .filter(|r| {
            departure_filter
                .as_ref()
                .is_none_or(|f| &locations::normalize(&r.departure) == f)
        })
        .filter(|r| {
            destination_filter
                .as_ref()
                .is_none_or(|f| &locations::normalize(&r.destination) == f)
        })
        .filter(|r| {
            filter
                .date
                .is_none_or(|d| r.departure_time.date_naive() == d)
        })
        .collect();

    Ok(Json(responses))
}

/// Get one trip
pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    let all_locations = location::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find().all(&state.db).await?;

    Ok(Json(trip_response(&trip, &all_locations, &drivers)))
}

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub departure: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub seats: i32,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
}

/// Publish a trip
pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTripRequest>,
) -> AppResult<Json<trip::Model>> {
    let created = service::create_trip(
        &state,
        claims.sub,
        NewTrip {
            departure: payload.departure,
            destination: payload.destination,
            departure_time: payload.departure_time,
            end_time: payload.end_time,
            seats: payload.seats,
            price: payload.price,
            vehicle: payload.vehicle,
        },
    )
    .await?;

    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTripRequest {
    pub departure: Option<String>,
    pub destination: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub price: Option<f64>,
    pub vehicle: Option<String>,
}

/// Edit a published trip (rejected once any booking is confirmed)
pub async fn update_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<UpdateTripRequest>,
) -> AppResult<Json<trip::Model>> {
    let updated = service::update_trip(
        &state,
        claims.sub,
        trip_id,
        TripEdit {
            departure: payload.departure,
            destination: payload.destination,
            departure_time: payload.departure_time,
            end_time: payload.end_time,
            price: payload.price,
            vehicle: payload.vehicle,
        },
    )
    .await?;

    Ok(Json(updated))
}

/// Cancel a trip and every booking still holding seats on it
pub async fn cancel_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let outcome = execute(&state, claims.sub, ReservationCommand::CancelTrip { trip_id }).await?;
    let cancelled = match outcome {
        CommandOutcome::TripCancelled { bookings_cancelled } => bookings_cancelled,
        CommandOutcome::Booking(_) => 0,
    };

    Ok(Json(serde_json::json!({
        "message": "Trip cancelled",
        "bookings_cancelled": cancelled,
    })))
}

/// List trips published by the logged-in driver
pub async fn my_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<TripResponse>>> {
    let trips = trip::Entity::find()
        .filter(trip::Column::DriverId.eq(claims.sub))
        .all(&state.db)
        .await?;
    let all_locations = location::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find().all(&state.db).await?;

    let responses = trips
        .iter()
        .map(|t| trip_response(t, &all_locations, &drivers))
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct PassengerInfo {
    pub booking_id: Uuid,
    pub passenger_name: String,
    pub passenger_contact: String,
    pub seats: i32,
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct TripPassengersResponse {
    pub trip_id: Uuid,
    pub passengers: Vec<PassengerInfo>,
}

/// Passenger manifest for a trip; drivers only see their own trips
pub async fn trip_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripPassengersResponse>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != claims.sub {
        return Err(AppError::Forbidden(
            "You are not the driver of this trip".to_string(),
        ));
    }

    let bookings = booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .filter(booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]))
        .all(&state.db)
        .await?;
    let users = user::Entity::find().all(&state.db).await?;

    let passengers = bookings
        .into_iter()
        .map(|b| {
            let passenger = users.iter().find(|u| u.id == b.passenger_id);
            PassengerInfo {
                booking_id: b.id,
                passenger_name: passenger.map(|u| u.name.clone()).unwrap_or_default(),
                passenger_contact: passenger.map(|u| u.email.clone()).unwrap_or_default(),
                seats: b.seats,
                status: b.status,
            }
        })
        .collect();

    Ok(Json(TripPassengersResponse {
        trip_id,
        passengers,
    }))
}

// ============ Location directory ============

/// List the canonical location set
pub async fn list_locations(State(state): State<AppState>) -> AppResult<Json<Vec<location::Model>>> {
    Ok(Json(location::Entity::find().all(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub q: String,
    pub limit: Option<usize>,
}

/// Ranked location candidates for a partial name
pub async fn suggest_locations(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> AppResult<Json<Vec<String>>> {
    let limit = query.limit.unwrap_or(8).min(25);
    Ok(Json(locations::suggest(&state.db, &query.q, limit).await?))
}
