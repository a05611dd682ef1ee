//! Best-effort delivery of reservation events to drivers and passengers.
//!
//! Events are emitted strictly after the reservation transaction commits;
//! a delivery failure is logged and never rolls back or surfaces as a
//! reservation error.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    DriverNewBooking {
        driver_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
        seats: i32,
        passenger_name: String,
        passenger_contact: String,
    },
    PassengerBookingConfirmed {
        passenger_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
        seats: i32,
    },
    PassengerBookingRejected {
        passenger_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
    },
    PassengerBookingExpired {
        passenger_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
        ttl_minutes: i64,
    },
    PassengerBookingCancelled {
        passenger_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
    },
    DriverBookingCancelled {
        driver_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
        seats: i32,
        passenger_name: String,
    },
    PassengerTripCancelled {
        passenger_id: Uuid,
        booking_id: Uuid,
        trip_id: Uuid,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DriverNewBooking { .. } => "driver_new_booking",
            Self::PassengerBookingConfirmed { .. } => "passenger_booking_confirmed",
            Self::PassengerBookingRejected { .. } => "passenger_booking_rejected",
            Self::PassengerBookingExpired { .. } => "passenger_booking_expired",
            Self::PassengerBookingCancelled { .. } => "passenger_booking_cancelled",
            Self::DriverBookingCancelled { .. } => "driver_booking_cancelled",
            Self::PassengerTripCancelled { .. } => "passenger_trip_cancelled",
        }
    }
}

#[derive(Clone)]
pub enum Notifier {
    /// Log-only sink; the default when no webhook is configured.
    Tracing,
    /// JSON POST to an external delivery service.
    Webhook { client: reqwest::Client, url: String },
    /// Buffering sink for tests.
    Memory(Arc<Mutex<Vec<Notification>>>),
}

impl Notifier {
    pub fn from_config(config: &Config) -> Self {
        match &config.notify_webhook_url {
            Some(url) => Self::Webhook {
                client: reqwest::Client::new(),
                url: url.clone(),
            },
            None => Self::Tracing,
        }
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    pub async fn send(&self, event: Notification) {
        match self {
            Self::Tracing => {
                tracing::info!(kind = event.kind(), payload = ?event, "notification");
            }
            Self::Webhook { client, url } => {
                match client.post(url).json(&event).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        tracing::warn!(
                            kind = event.kind(),
                            status = %resp.status(),
                            "notification delivery rejected"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(kind = event.kind(), %err, "notification delivery failed");
                    }
                    Ok(_) => {}
                }
            }
            Self::Memory(sink) => {
                if let Ok(mut sink) = sink.lock() {
                    sink.push(event);
                }
            }
        }
    }

    /// Drain everything captured by the memory sink. Empty for the other
    /// sinks.
    pub fn drain(&self) -> Vec<Notification> {
        match self {
            Self::Memory(sink) => sink.lock().map(|mut s| std::mem::take(&mut *s)).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
