use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn lifecycle_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/admin/lifecycle/status", get(handlers::get_lifecycle_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
