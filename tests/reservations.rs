//! End-to-end reservation engine tests against in-memory SQLite.
//!
//! The pool is capped at one connection so every transaction serializes
//! exactly as the inventory store requires, and the shared in-memory
//! database stays visible to all tasks.

use carpool_backend::config::Config;
use carpool_backend::entities::booking::{self, BookingStatus};
use carpool_backend::entities::user::{self, UserRole};
use carpool_backend::entities::{admin_log, location, trip};
use carpool_backend::error::{AppError, ConflictKind};
use carpool_backend::locations;
use carpool_backend::moderation;
use carpool_backend::notify::Notifier;
use carpool_backend::reservation::service::{self, NewTrip, TripEdit};
use carpool_backend::reservation::sweeper;
use carpool_backend::AppState;
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, EntityTrait,
    QueryFilter, Schema, Set,
};
use uuid::Uuid;

async fn test_state() -> AppState {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.expect("connect sqlite");

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    for stmt in [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(location::Entity),
        schema.create_table_from_entity(trip::Entity),
        schema.create_table_from_entity(booking::Entity),
        schema.create_table_from_entity(admin_log::Entity),
    ] {
        db.execute(backend.build(&stmt)).await.expect("create table");
    }

    let state = AppState {
        db,
        config: Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_hours: 24,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            pending_ttl_minutes: 15,
            max_seats_per_booking: 5,
            cleanup_retention_days: 7,
            sweep_interval_secs: 60,
            notify_webhook_url: None,
        },
        notifier: Notifier::memory(),
    };

    locations::seed(
        &state.db,
        &["Riverton".to_string(), "Lakewood".to_string(), "Eastfield".to_string()],
    )
    .await
    .expect("seed locations");

    state
}

async fn mk_user(state: &AppState, name: &str, role: UserRole) -> Uuid {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        email: Set(format!("{}-{}@example.com", name, id)),
        password_hash: Set("unused".to_string()),
        name: Set(name.to_string()),
        role: Set(role),
        is_banned: Set(false),
        banned_until: Set(None),
        ban_reason: Set(None),
        banned_at: Set(None),
        banned_by: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await
    .expect("insert user");
    id
}

async fn mk_trip(state: &AppState, driver: Uuid, seats: i32) -> trip::Model {
    service::create_trip(
        state,
        driver,
        NewTrip {
            departure: "Riverton".to_string(),
            destination: "Lakewood".to_string(),
            departure_time: Utc::now() + Duration::hours(3),
            end_time: None,
            seats,
            price: Some(12.5),
            vehicle: None,
        },
    )
    .await
    .expect("create trip")
}

async fn reload_trip(state: &AppState, trip_id: Uuid) -> trip::Model {
    trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await
        .expect("query trip")
        .expect("trip exists")
}

async fn reload_booking(state: &AppState, booking_id: Uuid) -> booking::Model {
    booking::Entity::find_by_id(booking_id)
        .one(&state.db)
        .await
        .expect("query booking")
        .expect("booking exists")
}

async fn backdate_booking(state: &AppState, booking_id: Uuid, minutes: i64) {
    let model = reload_booking(state, booking_id).await;
    let mut active: booking::ActiveModel = model.into();
    active.booking_time = Set((Utc::now() - Duration::minutes(minutes)).to_rfc3339());
    active.update(&state.db).await.expect("backdate booking");
}

/// seats_available plus all seat-holding bookings must always equal the
/// capacity at creation.
async fn assert_capacity_invariant(state: &AppState, trip_id: Uuid) {
    let trip = reload_trip(state, trip_id).await;
    let held: i32 = booking::Entity::find()
        .filter(booking::Column::TripId.eq(trip_id))
        .all(&state.db)
        .await
        .expect("query bookings")
        .iter()
        .filter(|b| b.status.holds_seats())
        .map(|b| b.seats)
        .sum();
    assert_eq!(
        trip.seats_available + held,
        trip.total_seats,
        "seat conservation violated for trip {}",
        trip_id
    );
}

fn assert_conflict(err: AppError, expected: ConflictKind) {
    match err {
        AppError::Conflict(kind) => assert_eq!(kind, expected),
        other => panic!("expected Conflict({:?}), got {:?}", expected, other),
    }
}

#[tokio::test]
async fn booking_and_confirmation_keep_seats_deducted() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let passenger = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let booking = service::create_booking(&state, passenger, trip.id, 2)
        .await
        .expect("booking created");
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 1);

    let confirmed = service::confirm(&state, driver, booking.id)
        .await
        .expect("confirmed");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    // Seats were already deducted at creation; confirmation changes nothing.
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 1);
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["driver_new_booking", "passenger_booking_confirmed"]);
}

#[tokio::test]
async fn overbooking_is_rejected_without_creating_a_record() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let carol = mk_user(&state, "carol", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    service::create_booking(&state, alice, trip.id, 2)
        .await
        .expect("alice books");
    service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect("bob books");
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 0);

    let err = service::create_booking(&state, carol, trip.id, 1)
        .await
        .expect_err("no seats left");
    assert_conflict(err, ConflictKind::InsufficientSeats { available: 0 });

    let carol_rows = booking::Entity::find()
        .filter(booking::Column::PassengerId.eq(carol))
        .all(&state.db)
        .await
        .expect("query");
    assert!(carol_rows.is_empty(), "rejected request must leave no row");
    assert_capacity_invariant(&state, trip.id).await;
}

#[tokio::test]
async fn sweep_expires_stale_pending_and_reclaims_seats() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let booking = service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect("bob books");
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 2);
    state.notifier.drain();

    // Not yet stale: the sweep must leave it alone.
    assert_eq!(sweeper::sweep_once(&state).await, 0);
    assert_eq!(reload_booking(&state, booking.id).await.status, BookingStatus::Pending);

    backdate_booking(&state, booking.id, 20).await;
    assert_eq!(sweeper::sweep_once(&state).await, 1);

    let expired = reload_booking(&state, booking.id).await;
    assert_eq!(expired.status, BookingStatus::Expired);
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 3);
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["passenger_booking_expired"]);

    // A later sweep finds nothing; terminal states stay terminal.
    assert_eq!(sweeper::sweep_once(&state).await, 0);
}

#[tokio::test]
async fn sweep_skips_unparseable_timestamps() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let trip = mk_trip(&state, driver, 2).await;

    let booking = service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect("bob books");

    let mut active: booking::ActiveModel = reload_booking(&state, booking.id).await.into();
    active.booking_time = Set("not-a-timestamp".to_string());
    active.update(&state.db).await.expect("corrupt timestamp");

    assert_eq!(sweeper::sweep_once(&state).await, 0);
    assert_eq!(reload_booking(&state, booking.id).await.status, BookingStatus::Pending);
    assert_capacity_invariant(&state, trip.id).await;
}

#[tokio::test]
async fn confirm_of_logically_expired_booking_commits_expiry_instead() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let trip = mk_trip(&state, driver, 2).await;

    let booking = service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect("bob books");
    state.notifier.drain();
    backdate_booking(&state, booking.id, 16).await;

    // The sweep has not run yet, but the confirm path re-checks the TTL
    // and must lose to expiry.
    let err = service::confirm(&state, driver, booking.id)
        .await
        .expect_err("confirmation window closed");
    assert_conflict(err, ConflictKind::BookingExpired);

    let expired = reload_booking(&state, booking.id).await;
    assert_eq!(expired.status, BookingStatus::Expired);
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 2);
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["passenger_booking_expired"]);

    // The sweep then has nothing left to do for it.
    assert_eq!(sweeper::sweep_once(&state).await, 0);
}

#[tokio::test]
async fn reject_releases_seats_and_notifies_passenger() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let trip = mk_trip(&state, driver, 2).await;

    let booking = service::create_booking(&state, bob, trip.id, 2)
        .await
        .expect("bob books");
    state.notifier.drain();

    let rejected = service::reject(&state, driver, booking.id)
        .await
        .expect("rejected");
    assert_eq!(rejected.status, BookingStatus::Rejected);
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 2);
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["passenger_booking_rejected"]);

    // Terminal: a second decision reports the finalized status.
    let err = service::confirm(&state, driver, booking.id)
        .await
        .expect_err("already finalized");
    assert_conflict(err, ConflictKind::AlreadyFinalized { status: "rejected" });
}

#[tokio::test]
async fn passenger_cancels_confirmed_booking_before_trip_start() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let booking = service::create_booking(&state, alice, trip.id, 2)
        .await
        .expect("alice books");
    service::confirm(&state, driver, booking.id)
        .await
        .expect("confirmed");
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 1);
    state.notifier.drain();

    let cancelled = service::cancel_by_passenger(&state, alice, booking.id)
        .await
        .expect("cancelled");
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 3);
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["driver_booking_cancelled"]);
}

#[tokio::test]
async fn cancel_trip_cascades_and_is_idempotent() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let booking = service::create_booking(&state, alice, trip.id, 2)
        .await
        .expect("alice books");
    service::confirm(&state, driver, booking.id)
        .await
        .expect("confirmed");
    state.notifier.drain();

    let cancelled = service::cancel_trip(&state, driver, trip.id)
        .await
        .expect("trip cancelled");
    assert_eq!(cancelled, 1);

    let trip_row = reload_trip(&state, trip.id).await;
    assert!(!trip_row.is_active);
    assert_eq!(trip_row.seats_available, 3);
    assert_eq!(
        reload_booking(&state, booking.id).await.status,
        BookingStatus::Cancelled
    );
    assert_capacity_invariant(&state, trip.id).await;

    let kinds: Vec<&str> = state.notifier.drain().iter().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec!["passenger_trip_cancelled"]);

    // Re-running the cancellation is a no-op, not an error.
    let again = service::cancel_trip(&state, driver, trip.id)
        .await
        .expect("idempotent retry");
    assert_eq!(again, 0);
    assert!(state.notifier.drain().is_empty());

    // The retired trip no longer takes bookings.
    let bob = mk_user(&state, "bob", UserRole::User).await;
    let err = service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect_err("inactive trip");
    assert_conflict(err, ConflictKind::TripInactive);
}

#[tokio::test]
async fn last_seat_race_admits_exactly_the_capacity() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let trip = mk_trip(&state, driver, 2).await;

    let mut tasks = Vec::new();
    for i in 0..3 {
        let state = state.clone();
        let passenger = mk_user(&state, &format!("racer{}", i), UserRole::User).await;
        let trip_id = trip.id;
        tasks.push(tokio::spawn(async move {
            service::create_booking(&state, passenger, trip_id, 1).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for task in tasks {
        match task.await.expect("task completed") {
            Ok(_) => won += 1,
            Err(err) => {
                assert_conflict(err, ConflictKind::InsufficientSeats { available: 0 });
                lost += 1;
            }
        }
    }

    assert_eq!((won, lost), (2, 1));
    assert_eq!(reload_trip(&state, trip.id).await.seats_available, 0);
    assert_capacity_invariant(&state, trip.id).await;
}

#[tokio::test]
async fn duplicate_and_self_bookings_are_refused() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 4).await;

    service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect("first booking");

    let err = service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect_err("one active booking per trip and passenger");
    assert_conflict(err, ConflictKind::DuplicateBooking);

    let err = service::create_booking(&state, driver, trip.id, 1)
        .await
        .expect_err("drivers cannot book their own trip");
    assert!(matches!(err, AppError::Forbidden(_)));

    assert_capacity_invariant(&state, trip.id).await;
}

#[tokio::test]
async fn seat_quantity_bounds_are_validated() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 4).await;

    for seats in [0, -1, 6] {
        let err = service::create_booking(&state, alice, trip.id, seats)
            .await
            .expect_err("out of bounds");
        assert!(matches!(err, AppError::Validation(_)), "seats={}", seats);
    }

    // Within the per-request cap but above what is left.
    let err = service::create_booking(&state, alice, trip.id, 5)
        .await
        .expect_err("more than available");
    assert_conflict(err, ConflictKind::InsufficientSeats { available: 4 });
}

#[tokio::test]
async fn departed_trips_take_no_bookings_or_cancellations() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let booking = service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect("alice books");
    service::confirm(&state, driver, booking.id)
        .await
        .expect("confirmed");

    // Shift the whole trip window into the past.
    let mut active: trip::ActiveModel = reload_trip(&state, trip.id).await.into();
    active.departure_time = Set((Utc::now() - Duration::hours(4)).into());
    active.end_time = Set((Utc::now() - Duration::hours(2)).into());
    active.update(&state.db).await.expect("backdate trip");

    let bob = mk_user(&state, "bob", UserRole::User).await;
    let err = service::create_booking(&state, bob, trip.id, 1)
        .await
        .expect_err("departed");
    assert_conflict(err, ConflictKind::TripDeparted);

    let err = service::cancel_by_passenger(&state, alice, booking.id)
        .await
        .expect_err("window closed");
    assert_conflict(err, ConflictKind::TripDeparted);
}

#[tokio::test]
async fn banned_actors_are_refused_until_the_ban_lapses() {
    let state = test_state().await;
    let admin = mk_user(&state, "admin", UserRole::Admin).await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    moderation::ban_user(&state.db, admin, alice, None, Some("spam".to_string()))
        .await
        .expect("ban");

    let err = service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect_err("banned");
    assert!(matches!(err, AppError::Forbidden(_)));

    // An expired ban lifts itself on the next check.
    let expired_ban = Utc::now() - Duration::minutes(1);
    moderation::ban_user(&state.db, admin, alice, Some(expired_ban), None)
        .await
        .expect("re-ban with elapsed expiry");
    service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect("ban already lapsed");

    let alice_row = user::Entity::find_by_id(alice)
        .one(&state.db)
        .await
        .expect("query")
        .expect("exists");
    assert!(!alice_row.is_banned);
}

#[tokio::test]
async fn trips_with_confirmed_bookings_cannot_be_edited() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let trip = mk_trip(&state, driver, 3).await;

    let edit = TripEdit {
        departure_time: Some(Utc::now() + Duration::hours(6)),
        ..Default::default()
    };

    // While only PENDING bookings exist the window can still move.
    let booking = service::create_booking(&state, alice, trip.id, 1)
        .await
        .expect("alice books");
    service::update_trip(&state, driver, trip.id, edit.clone())
        .await
        .expect("editable while pending only");

    service::confirm(&state, driver, booking.id)
        .await
        .expect("confirmed");
    let err = service::update_trip(&state, driver, trip.id, edit)
        .await
        .expect_err("frozen once confirmed");
    assert_conflict(err, ConflictKind::HasConfirmedBookings);
}

#[tokio::test]
async fn unknown_locations_fail_trip_creation_with_suggestions() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;

    let err = service::create_trip(
        &state,
        driver,
        NewTrip {
            departure: "Rivert".to_string(),
            destination: "Lakewood".to_string(),
            departure_time: Utc::now() + Duration::hours(3),
            end_time: None,
            seats: 3,
            price: None,
            vehicle: None,
        },
    )
    .await
    .expect_err("unresolved departure");

    match err {
        AppError::Validation(msg) => assert!(msg.contains("Riverton"), "msg: {}", msg),
        other => panic!("expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn cleanup_removes_only_fully_terminal_past_trips() {
    let state = test_state().await;
    let driver = mk_user(&state, "driver", UserRole::User).await;
    let alice = mk_user(&state, "alice", UserRole::User).await;
    let bob = mk_user(&state, "bob", UserRole::User).await;

    let stale = mk_trip(&state, driver, 3).await;
    let stuck = mk_trip(&state, driver, 3).await;

    let stale_booking = service::create_booking(&state, alice, stale.id, 1)
        .await
        .expect("alice books");
    service::reject(&state, driver, stale_booking.id)
        .await
        .expect("terminal booking");
    let stuck_booking = service::create_booking(&state, bob, stuck.id, 1)
        .await
        .expect("bob books");
    service::confirm(&state, driver, stuck_booking.id)
        .await
        .expect("still confirmed");

    for old in [stale.id, stuck.id] {
        let mut active: trip::ActiveModel = reload_trip(&state, old).await.into();
        active.departure_time = Set((Utc::now() - Duration::days(10)).into());
        active.end_time = Set((Utc::now() - Duration::days(10)).into());
        active.update(&state.db).await.expect("age trip");
    }

    assert_eq!(sweeper::cleanup_once(&state).await, 1);

    assert!(trip::Entity::find_by_id(stale.id)
        .one(&state.db)
        .await
        .expect("query")
        .is_none());
    assert!(booking::Entity::find_by_id(stale_booking.id)
        .one(&state.db)
        .await
        .expect("query")
        .is_none());
    // The trip with a live booking is retained untouched.
    assert!(trip::Entity::find_by_id(stuck.id)
        .one(&state.db)
        .await
        .expect("query")
        .is_some());
}
