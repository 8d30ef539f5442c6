//! Router configuration for the back office.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{buses, payments, routes, schedules, session, stops, tickets, trips, users};
use axum::{
    routing::{get, post, put},
    Router,
};
use busdesk_web::correlation_id_layer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Configures all routes including:
/// - Health checks
/// - Admin session and account management
/// - Fleet, route, stop, and timetable catalogs
/// - Trips, tickets, and payments
///
/// Every request runs inside a correlation-id span and is traced by
/// `tower_http`.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/register", post(session::register_admin))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .route("/me", get(session::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    let api_routes = Router::new()
        .nest("/admin", admin_routes)
        // Fleet and network
        .route("/buses", get(buses::list_buses).post(buses::create_bus))
        .route(
            "/buses/:id",
            get(buses::get_bus)
                .put(buses::update_bus)
                .delete(buses::delete_bus),
        )
        .route("/routes", get(routes::list_routes).post(routes::create_route))
        .route(
            "/routes/:id",
            get(routes::get_route)
                .put(routes::update_route)
                .delete(routes::delete_route),
        )
        .route("/stops", get(stops::list_stops).post(stops::create_stop))
        .route(
            "/stops/:id",
            get(stops::get_stop)
                .put(stops::update_stop)
                .delete(stops::delete_stop),
        )
        .route(
            "/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/schedules/:id",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        // Trips
        .route("/trips", get(trips::list_trips).post(trips::create_trip))
        .route(
            "/trips/:id",
            get(trips::get_trip)
                .put(trips::update_trip)
                .delete(trips::delete_trip),
        )
        // Tickets
        .route("/tickets/my", get(tickets::my_tickets))
        .route("/tickets/admin-tickets", get(tickets::all_tickets))
        .route("/tickets/generate", post(tickets::generate_ticket))
        .route(
            "/tickets/:id",
            get(tickets::get_ticket).delete(tickets::delete_ticket),
        )
        // Payments
        .route("/payments", get(payments::list_payments))
        .route("/payments/online", post(payments::online_payment))
        .route("/payments/staff-payment", post(payments::staff_payment))
        .route("/payments/:id/status", put(payments::update_payment_status));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
