use std::sync::Arc;
use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::LifecycleRules;

fn require_admin(user: &User) -> Result<(), AppError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Student | Role::Nurse => {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// Read-only view of the timing rules the worker runs under. Sweeps are
/// driven by the interval alone; nothing here triggers one.
#[axum::debug_handler]
pub async fn get_lifecycle_status(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    debug!("Admin {} read lifecycle status", user.id);

    let rules = LifecycleRules::from_config(&state);

    Ok(Json(json!({
        "success": true,
        "no_show_grace_minutes": rules.no_show_grace_minutes,
        "retention_months": rules.retention_months,
        "sweep_interval_seconds": state.sweep_interval_seconds,
    })))
}
