use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    // Every availability surface requires an authenticated user
    let protected_routes = Router::new()
        // Nurse slot management
        .route("/nurse/availability", post(handlers::create_availability))
        .route("/nurse/availability", get(handlers::get_my_availability))
        .route("/nurse/availability/{slot_id}", put(handlers::update_availability))
        .route("/nurse/availability/{slot_id}", delete(handlers::delete_availability))

        // Student view of their assigned nurses' open slots
        .route("/student/availability", get(handlers::get_student_availability))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
