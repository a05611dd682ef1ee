use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::{admin_log, location, trip};
use crate::error::AppResult;
use crate::handlers::trips::TripResponse;
use crate::moderation;
use crate::reservation::sweeper;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub is_banned: bool,
    pub banned_until: Option<DateTime<Utc>>,
    pub ban_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            is_banned: u.is_banned,
            banned_until: u.banned_until.map(|t| t.with_timezone(&Utc)),
            ban_reason: u.ban_reason,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

/// List all users (admin)
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = user::Entity::find().all(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Ban a user (admin); `until` absent means indefinitely
pub async fn ban_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<BanRequest>,
) -> AppResult<Json<UserResponse>> {
    let banned =
        moderation::ban_user(&state.db, claims.sub, user_id, payload.until, payload.reason).await?;
    Ok(Json(banned.into()))
}

/// Lift a user's ban (admin)
pub async fn unban_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let unbanned = moderation::unban_user(&state.db, claims.sub, user_id).await?;
    Ok(Json(unbanned.into()))
}

/// List all trips, active or not (admin)
pub async fn list_trips(State(state): State<AppState>) -> AppResult<Json<Vec<TripResponse>>> {
    let trips = trip::Entity::find().all(&state.db).await?;
    let all_locations = location::Entity::find().all(&state.db).await?;
    let users = user::Entity::find().all(&state.db).await?;

    let responses = trips
        .iter()
        .map(|t| crate::handlers::trips::trip_response(t, &all_locations, &users))
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct BookingInfo {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_name: String,
    pub passenger_email: String,
    pub seats: i32,
    pub status: BookingStatus,
    pub booking_time: String,
}

/// List all bookings (admin)
pub async fn list_bookings(State(state): State<AppState>) -> AppResult<Json<Vec<BookingInfo>>> {
    let bookings = booking::Entity::find().all(&state.db).await?;
    let users = user::Entity::find().all(&state.db).await?;

    let responses = bookings
        .into_iter()
        .map(|b| {
            let passenger = users.iter().find(|u| u.id == b.passenger_id);
            BookingInfo {
                id: b.id,
                trip_id: b.trip_id,
                passenger_name: passenger.map(|u| u.name.clone()).unwrap_or_default(),
                passenger_email: passenger.map(|u| u.email.clone()).unwrap_or_default(),
                seats: b.seats,
                status: b.status,
                booking_time: b.booking_time,
            }
        })
        .collect();

    Ok(Json(responses))
}

/// Read the admin audit trail, newest first (admin)
pub async fn list_logs(State(state): State<AppState>) -> AppResult<Json<Vec<admin_log::Model>>> {
    let entries = admin_log::Entity::find()
        .order_by_desc(admin_log::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(entries))
}

/// Trigger a retention cleanup pass outside its schedule (admin)
pub async fn run_cleanup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = sweeper::cleanup_once(&state).await;
    moderation::log_admin_action(
        &state.db,
        claims.sub,
        "run_cleanup",
        Some(format!("removed={}", removed)),
    )
    .await;

    Ok(Json(serde_json::json!({ "trips_removed": removed })))
}
