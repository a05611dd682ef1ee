//! The booking state machine and the seat-count side effect of each
//! transition. Pure: callers apply the returned effect inside the same
//! transaction as the status write.

use chrono::{DateTime, Duration, Utc};

use crate::entities::booking::BookingStatus;
use crate::error::ConflictKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    /// Driver accepts the request.
    Confirm,
    /// Driver turns the request down.
    Reject,
    /// TTL elapsed; only the sweep and the re-check inside confirm/reject
    /// raise this.
    Expire,
    CancelByPassenger,
    CancelByDriver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatEffect {
    /// Seats stay deducted (they were claimed at creation time).
    Keep,
    /// Seats return to the trip's inventory.
    Release,
}

/// Resolve an event against the current status. Terminal states absorb
/// every event as an "already finalized" conflict.
pub fn transition(
    current: &BookingStatus,
    event: BookingEvent,
) -> Result<(BookingStatus, SeatEffect), ConflictKind> {
    use BookingEvent::*;
    use BookingStatus::*;

    match (current, event) {
        (Pending, Confirm) => Ok((Confirmed, SeatEffect::Keep)),
        (Pending, Reject) => Ok((Rejected, SeatEffect::Release)),
        (Pending, Expire) => Ok((Expired, SeatEffect::Release)),
        (Pending | Confirmed, CancelByPassenger) => Ok((Cancelled, SeatEffect::Release)),
        (Pending | Confirmed, CancelByDriver) => Ok((Cancelled, SeatEffect::Release)),
        (current, _) => Err(ConflictKind::AlreadyFinalized {
            status: current.as_str(),
        }),
    }
}

/// The one definition of "this PENDING booking has outlived its TTL".
/// Both the sweep and the confirm/reject entry points call this, so the
/// two paths cannot drift apart.
pub fn logically_expired(booking_time: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - booking_time >= ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingEvent::*;
    use BookingStatus::*;

    #[test]
    fn pending_transitions() {
        assert_eq!(transition(&Pending, Confirm), Ok((Confirmed, SeatEffect::Keep)));
        assert_eq!(transition(&Pending, Reject), Ok((Rejected, SeatEffect::Release)));
        assert_eq!(transition(&Pending, Expire), Ok((Expired, SeatEffect::Release)));
        assert_eq!(
            transition(&Pending, CancelByPassenger),
            Ok((Cancelled, SeatEffect::Release))
        );
        assert_eq!(
            transition(&Pending, CancelByDriver),
            Ok((Cancelled, SeatEffect::Release))
        );
    }

    #[test]
    fn confirmed_can_only_be_cancelled() {
        assert_eq!(
            transition(&Confirmed, CancelByPassenger),
            Ok((Cancelled, SeatEffect::Release))
        );
        assert_eq!(
            transition(&Confirmed, CancelByDriver),
            Ok((Cancelled, SeatEffect::Release))
        );
        for event in [Confirm, Reject, Expire] {
            assert_eq!(
                transition(&Confirmed, event),
                Err(ConflictKind::AlreadyFinalized { status: "confirmed" })
            );
        }
    }

    #[test]
    fn terminal_states_absorb_everything() {
        for status in [Rejected, Cancelled, Expired] {
            for event in [Confirm, Reject, Expire, CancelByPassenger, CancelByDriver] {
                let result = transition(&status, event);
                assert_eq!(
                    result,
                    Err(ConflictKind::AlreadyFinalized {
                        status: status.as_str()
                    }),
                    "{:?} must not leave terminal state {:?}",
                    event,
                    status
                );
            }
        }
    }

    #[test]
    fn expiry_predicate_is_inclusive_at_the_deadline() {
        let ttl = Duration::minutes(15);
        let now = Utc::now();
        assert!(logically_expired(now - Duration::minutes(16), ttl, now));
        assert!(logically_expired(now - Duration::minutes(15), ttl, now));
        assert!(!logically_expired(now - Duration::minutes(14), ttl, now));
        assert!(!logically_expired(now, ttl, now));
    }
}
