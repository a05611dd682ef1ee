//! The closed set of reservation actions. Every inbound mutation is
//! expressed as one of these variants and dispatched exhaustively; there
//! is no stringly-typed action routing anywhere in the engine.

use uuid::Uuid;

use crate::entities::booking;
use crate::error::AppResult;
use crate::AppState;

use super::service;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationCommand {
    CreateBooking { trip_id: Uuid, seats: i32 },
    Confirm { booking_id: Uuid },
    Reject { booking_id: Uuid },
    CancelByPassenger { booking_id: Uuid },
    CancelByDriver { booking_id: Uuid },
    CancelTrip { trip_id: Uuid },
}

#[derive(Debug)]
pub enum CommandOutcome {
    Booking(booking::Model),
    TripCancelled { bookings_cancelled: u64 },
}

pub async fn execute(
    state: &AppState,
    actor: Uuid,
    command: ReservationCommand,
) -> AppResult<CommandOutcome> {
    match command {
        ReservationCommand::CreateBooking { trip_id, seats } => {
            service::create_booking(state, actor, trip_id, seats)
                .await
                .map(CommandOutcome::Booking)
        }
        ReservationCommand::Confirm { booking_id } => service::confirm(state, actor, booking_id)
            .await
            .map(CommandOutcome::Booking),
        ReservationCommand::Reject { booking_id } => service::reject(state, actor, booking_id)
            .await
            .map(CommandOutcome::Booking),
        ReservationCommand::CancelByPassenger { booking_id } => {
            service::cancel_by_passenger(state, actor, booking_id)
                .await
                .map(CommandOutcome::Booking)
        }
        ReservationCommand::CancelByDriver { booking_id } => {
            service::cancel_by_driver(state, actor, booking_id)
                .await
                .map(CommandOutcome::Booking)
        }
        ReservationCommand::CancelTrip { trip_id } => service::cancel_trip(state, actor, trip_id)
            .await
            .map(|bookings_cancelled| CommandOutcome::TripCancelled { bookings_cancelled }),
    }
}
