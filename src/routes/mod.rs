use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{admin, auth, bookings, trips};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::middleware::rate_limit::{create_public_governor, create_user_governor};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let public_governor = create_public_governor();
    let user_governor = create_user_governor();

    // Public routes (IP rate limited)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    let public_routes = Router::new()
        .route("/trips", get(trips::list_trips))
        .route("/trips/{id}", get(trips::get_trip))
        .route("/locations", get(trips::list_locations))
        .route("/locations/suggest", get(trips::suggest_locations))
        .layer(public_governor);

    // Authenticated routes (rate limited per user)
    let user_routes = Router::new()
        // Trip publication and management
        .route("/trips", post(trips::create_trip))
        .route("/trips/mine", get(trips::my_trips))
        .route("/trips/{id}", put(trips::update_trip))
        .route("/trips/{id}", delete(trips::cancel_trip))
        .route("/trips/{id}/passengers", get(trips::trip_passengers))
        // Reservations
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings", get(bookings::my_bookings))
        .route("/bookings/{id}/confirm", post(bookings::confirm_booking))
        .route("/bookings/{id}/reject", post(bookings::reject_booking))
        .route("/bookings/{id}", delete(bookings::cancel_booking))
        .route("/bookings/{id}/rating", post(bookings::rate_booking))
        .layer(user_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}/ban", post(admin::ban_user))
        .route("/users/{id}/unban", post(admin::unban_user))
        .route("/trips", get(admin::list_trips))
        .route("/bookings", get(admin::list_bookings))
        .route("/logs", get(admin::list_logs))
        .route("/cleanup", post(admin::run_cleanup))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Public and authenticated routers share paths (e.g. GET vs POST
    // /trips), so they are merged before nesting; each keeps its own
    // middleware stack.
    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes.merge(user_routes))
        .nest("/api/admin", admin_routes)
        .with_state(state)
}
