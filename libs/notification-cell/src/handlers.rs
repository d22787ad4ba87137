use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{NotificationError, NotificationListQuery};
use crate::services::NotificationService;

#[axum::debug_handler]
pub async fn get_notifications(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<NotificationListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let notification_service = NotificationService::new(&state);

    let notifications = notification_service
        .list_for_user(&user.id, query.unread.unwrap_or(false), token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "notifications": notifications,
        "total": notifications.len()
    })))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    State(state): State<Arc<AppConfig>>,
    Path(notification_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let notification_service = NotificationService::new(&state);

    let notification = notification_service
        .mark_read(notification_id, &user.id, token)
        .await
        .map_err(|e| match e {
            NotificationError::NotFound => AppError::NotFound("Notification not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "notification": notification
    })))
}
