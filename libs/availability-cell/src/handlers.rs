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
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{
    AvailabilityError, AvailabilityDayQuery, AvailabilityListQuery,
    CreateAvailabilityRequest, UpdateAvailabilityRequest,
};
use crate::services::{AssignmentService, AvailabilityService};

fn require_nurse(user: &User) -> Result<Uuid, AppError> {
    match user.role {
        Role::Nurse => {}
        Role::Student | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only nurses can manage availability slots".to_string(),
            ));
        }
    }

    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid nurse ID".to_string()))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let availability_service = AvailabilityService::new(&state);

    let slot = availability_service.create_slot(nurse_id, request, token).await
        .map_err(|e| match e {
            AvailabilityError::SlotExists { date } => {
                AppError::Conflict(format!("An availability slot already exists for {}", date))
            },
            AvailabilityError::InvalidWindow(msg) => AppError::BadRequest(msg),
            AvailabilityError::ValidationError(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "slot": slot
    })))
}

#[axum::debug_handler]
pub async fn get_my_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let availability_service = AvailabilityService::new(&state);

    let slots = availability_service.get_nurse_slots(nurse_id, query.date, token).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    require_nurse(&user)?;

    let availability_service = AvailabilityService::new(&state);

    let slot = availability_service.get_slot(slot_id, token).await
        .map_err(|e| match e {
            AvailabilityError::NotFound => AppError::NotFound("Availability slot not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    // Only the owning nurse can modify a slot
    if slot.nurse_id.to_string() != user.id {
        return Err(AppError::Forbidden("Not authorized to modify this availability slot".to_string()));
    }

    let updated = availability_service.update_slot(slot_id, request, token).await
        .map_err(|e| match e {
            AvailabilityError::NotFound => AppError::NotFound("Availability slot not found".to_string()),
            AvailabilityError::InvalidWindow(msg) => AppError::BadRequest(msg),
            AvailabilityError::ValidationError(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "slot": updated
    })))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    require_nurse(&user)?;

    let availability_service = AvailabilityService::new(&state);

    let slot = availability_service.get_slot(slot_id, token).await
        .map_err(|e| match e {
            AvailabilityError::NotFound => AppError::NotFound("Availability slot not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    if slot.nurse_id.to_string() != user.id {
        return Err(AppError::Forbidden("Not authorized to delete this availability slot".to_string()));
    }

    availability_service.delete_slot(slot_id, token).await
        .map_err(|e| match e {
            AvailabilityError::NotFound => AppError::NotFound("Availability slot not found".to_string()),
            AvailabilityError::SlotInUse => {
                AppError::Conflict("Slot window still has pending or confirmed appointments".to_string())
            },
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Availability slot deleted"
    })))
}

#[axum::debug_handler]
pub async fn get_student_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityDayQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    match user.role {
        Role::Student => {}
        Role::Nurse | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only students can view assigned availability".to_string(),
            ));
        }
    }

    let assignment_service = AssignmentService::new(&state);
    let availability_service = AvailabilityService::new(&state);

    let assignments = assignment_service.list_active_assignments(&user.id, token).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let nurse_ids: Vec<Uuid> = assignments.iter().map(|a| a.nurse_id).collect();

    let slots = availability_service.get_open_slots(&nurse_ids, query.date, token).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "date": query.date,
        "slots": slots
    })))
}
