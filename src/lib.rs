pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::cors::CorsLayer;

use crate::services::notifications::NotificationDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub notifier: NotificationDispatcher,
    pub booking_ref_prefix: String,
    pub start_time: Instant,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/bookings/reference/:reference",
            get(handlers::bookings::get_booking_by_reference),
        )
        .route("/bookings/:id/status", post(handlers::bookings::transition_booking))
        .route("/bookings/:id/assign", post(handlers::assignments::assign_agent))
        .route("/bookings/:id/accept", post(handlers::assignments::accept_booking))
        .route("/bookings/:id/reject", post(handlers::assignments::reject_booking))
        .route(
            "/coupons",
            post(handlers::coupons::create_coupon).get(handlers::coupons::list_coupons),
        )
        .route("/coupons/validate", post(handlers::coupons::validate_coupon))
        .route(
            "/coupons/:id",
            get(handlers::coupons::get_coupon).patch(handlers::coupons::update_coupon),
        )
        .route("/coupons/:id/redeem", post(handlers::coupons::redeem_coupon))
        .route(
            "/agents",
            post(handlers::agents::create_agent).get(handlers::agents::list_agents),
        )
        .route(
            "/agents/:id",
            get(handlers::agents::get_agent).patch(handlers::agents::update_agent),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
