pub mod admin;
pub mod availability;
pub mod booking;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/availability", get(availability::check_availability))
        .route("/api/overlap", get(availability::check_overlap))
        .route("/api/catalog/:category", get(availability::catalog))
        .route("/api/bookings", post(booking::submit_booking))
        .route("/api/bookings/:id", get(booking::get_booking_status))
        .route("/webhook/payment", post(webhook::payment_webhook))
        .route("/api/admin/bookings", get(admin::list_bookings))
        .route("/api/admin/bookings/:id/status", post(admin::update_status))
        .route(
            "/api/admin/bookings/:id/confirm-payment",
            post(admin::confirm_payment),
        )
        .route("/api/admin/bookings/:id/refund", post(admin::refund_payment))
        .route(
            "/api/admin/bookings/:id/retry-payment",
            post(admin::retry_payment),
        )
        .route("/api/admin/cutoff", get(admin::get_cutoffs))
        .route("/api/admin/cutoff/:category", post(admin::toggle_cutoff))
        .route("/api/admin/slots", post(admin::create_slots))
        .route("/api/admin/audit", get(admin::audit_log))
        .route("/api/admin/revenue", get(admin::revenue))
        .route("/api/admin/events", get(admin::events_stream))
        .with_state(state)
}
