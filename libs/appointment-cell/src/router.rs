// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        // Student booking surface
        .route("/student/bookings", post(handlers::create_booking))
        .route("/student/bookings", get(handlers::get_my_bookings))
        .route("/student/bookings/{appointment_id}", get(handlers::get_booking))
        .route("/student/bookings/{appointment_id}/qr", get(handlers::get_booking_qr))

        // Nurse schedule and triage surface
        .route("/nurse/appointments", get(handlers::get_nurse_appointments))
        .route("/nurse/appointments/{appointment_id}/status", put(handlers::update_appointment_status))
        .route("/nurse/scan-appointment-qr", post(handlers::scan_appointment_qr))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
