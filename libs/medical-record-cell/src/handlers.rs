use std::sync::Arc;

use axum::{
    extract::{Path, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{CreateMedicalRecordRequest, MedicalRecordError};
use crate::services::MedicalRecordService;

fn require_nurse(user: &User) -> Result<Uuid, AppError> {
    match user.role {
        Role::Nurse => {}
        Role::Student | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only nurses can manage medical records".to_string(),
            ));
        }
    }

    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid nurse ID".to_string()))
}

#[axum::debug_handler]
pub async fn create_medical_record(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMedicalRecordRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let record_service = MedicalRecordService::new(&state);

    let record = record_service.create_record(nurse_id, request, token).await
        .map_err(|e| match e {
            MedicalRecordError::AppointmentNotFound => {
                AppError::NotFound("Appointment not found".to_string())
            },
            MedicalRecordError::Unauthorized => {
                AppError::Forbidden("This appointment belongs to another nurse".to_string())
            },
            MedicalRecordError::NotAssigned => {
                AppError::Forbidden("Student is not assigned to you".to_string())
            },
            MedicalRecordError::InvalidAppointmentState(status) => {
                AppError::BadRequest(format!("Cannot attach a record to an {} appointment", status))
            },
            MedicalRecordError::ValidationError(msg) => {
                AppError::BadRequest(msg)
            },
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "record": record,
        "message": "Medical record created successfully"
    })))
}

#[axum::debug_handler]
pub async fn complete_medical_record(
    State(state): State<Arc<AppConfig>>,
    Path(record_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let record_service = MedicalRecordService::new(&state);

    let record = record_service.complete_record(nurse_id, record_id, token).await
        .map_err(|e| match e {
            MedicalRecordError::NotFound => {
                AppError::NotFound("Medical record not found".to_string())
            },
            MedicalRecordError::AppointmentNotFound => {
                AppError::NotFound("Appointment not found".to_string())
            },
            MedicalRecordError::Unauthorized => {
                AppError::Forbidden("This record belongs to another nurse".to_string())
            },
            MedicalRecordError::AlreadyCompleted => {
                AppError::Conflict("Record is already completed".to_string())
            },
            MedicalRecordError::InvalidAppointmentState(status) => {
                AppError::BadRequest(format!("Cannot complete appointment from status: {}", status))
            },
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "record": record,
        "message": "Medical record completed successfully"
    })))
}
