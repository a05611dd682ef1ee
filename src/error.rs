use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Conflicts are the richest error category: callers need to tell
/// "already confirmed" apart from "expired" apart from "not enough seats"
/// to respond accurately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictKind {
    #[error("trip is no longer active")]
    TripInactive,
    #[error("trip has already departed")]
    TripDeparted,
    #[error("only {available} seats are available")]
    InsufficientSeats { available: i32 },
    #[error("an active booking for this trip already exists")]
    DuplicateBooking,
    #[error("booking is already {status}")]
    AlreadyFinalized { status: &'static str },
    #[error("the confirmation window for this booking has expired")]
    BookingExpired,
    #[error("trip has confirmed bookings and can no longer be edited")]
    HasConfirmedBookings,
    #[error("email is already registered")]
    EmailTaken,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TripInactive => "trip_inactive",
            Self::TripDeparted => "trip_departed",
            Self::InsufficientSeats { .. } => "insufficient_seats",
            Self::DuplicateBooking => "duplicate_booking",
            Self::AlreadyFinalized { .. } => "already_finalized",
            Self::BookingExpired => "booking_expired",
            Self::HasConfirmedBookings => "has_confirmed_bookings",
            Self::EmailTaken => "email_taken",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(ConflictKind),
    /// Transient storage failure; nothing was committed and the operation
    /// is safe to retry from scratch.
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Transient errors are the only ones the store boundary retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ConflictKind> for AppError {
    fn from(kind: ConflictKind) -> Self {
        Self::Conflict(kind)
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match &err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => Self::Unavailable(err.to_string()),
            DbErr::Exec(_) | DbErr::Query(_) => {
                let msg = err.to_string();
                let transient = ["database is locked", "database is busy", "deadlock", "could not serialize"];
                if transient.iter().any(|needle| msg.contains(needle)) {
                    Self::Unavailable(msg)
                } else {
                    Self::Internal(msg)
                }
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(kind) => (StatusCode::CONFLICT, kind.code()),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(%self, "request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}
