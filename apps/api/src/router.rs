use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    Json,
};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use availability_cell::router::availability_routes;
use lifecycle_cell::router::lifecycle_routes;
use medical_record_cell::router::medical_record_routes;
use notification_cell::router::notification_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    // Cell routers carry their own role prefixes, so they merge flat
    // under /api
    let api_routes = Router::new()
        .merge(availability_routes(state.clone()))
        .merge(appointment_routes(state.clone()))
        .merge(medical_record_routes(state.clone()))
        .merge(notification_routes(state.clone()))
        .merge(lifecycle_routes(state));

    Router::new()
        .route("/", get(|| async { "Campus Clinic API is running!" }))
        .route("/health", get(health_check))
        .nest("/api", api_routes)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "campus-clinic-api"
    }))
}
