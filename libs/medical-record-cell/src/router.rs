use std::sync::Arc;

use axum::{
    Router,
    routing::{post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn medical_record_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/nurse/medical-records", post(handlers::create_medical_record))
        .route("/nurse/medical-records/{record_id}/complete", put(handlers::complete_medical_record))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
