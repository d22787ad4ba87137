// libs/appointment-cell/src/handlers.rs
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
    AppointmentError, AppointmentStatus, BookingListQuery, CreateBookingRequest,
    NurseAppointmentsQuery, ScanQrRequest, UpdateStatusRequest,
};
use crate::services::booking::BookingService;
use crate::services::checkin::CheckInService;
use crate::services::lifecycle::AppointmentLifecycleService;

fn require_student(user: &User) -> Result<Uuid, AppError> {
    match user.role {
        Role::Student => {}
        Role::Nurse | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only students can manage their own bookings".to_string(),
            ));
        }
    }

    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid student ID".to_string()))
}

fn require_nurse(user: &User) -> Result<Uuid, AppError> {
    match user.role {
        Role::Nurse => {}
        Role::Student | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only nurses can access this endpoint".to_string(),
            ));
        }
    }

    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid nurse ID".to_string()))
}

// ==============================================================================
// STUDENT BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let student_id = require_student(&user)?;

    let booking_service = BookingService::new(&state);

    let appointment = booking_service.book_appointment(student_id, request, token).await
        .map_err(|e| match e {
            AppointmentError::NotAssigned => {
                AppError::Forbidden("You are not assigned to this nurse".to_string())
            },
            AppointmentError::SlotUnavailable => {
                AppError::BadRequest("No availability covers the requested time".to_string())
            },
            AppointmentError::SlotFull => {
                AppError::Conflict("The requested time is fully booked".to_string())
            },
            AppointmentError::LockContention => {
                AppError::Conflict("Could not secure the slot, please retry".to_string())
            },
            AppointmentError::RateLimited => {
                AppError::RateLimited("Too many booking attempts, please slow down".to_string())
            },
            AppointmentError::InvalidTime(msg) => {
                AppError::BadRequest(msg)
            },
            AppointmentError::ValidationError(msg) => {
                AppError::BadRequest(msg)
            },
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment requested successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_my_bookings(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<BookingListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let student_id = require_student(&user)?;

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .get_student_appointments(&student_id.to_string(), params.status, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, token).await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    // The student who booked, the nurse involved, or an admin can view
    match user.role {
        Role::Student => {
            if appointment.student_id.to_string() != user.id {
                return Err(AppError::Forbidden(
                    "Not authorized to view this appointment".to_string(),
                ));
            }
        }
        Role::Nurse => {
            if appointment.nurse_id.to_string() != user.id {
                return Err(AppError::Forbidden(
                    "Not authorized to view this appointment".to_string(),
                ));
            }
        }
        Role::Admin => {}
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_booking_qr(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let student_id = require_student(&user)?;

    let booking_service = BookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, token).await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    if appointment.student_id != student_id {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    if !matches!(appointment.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed) {
        return Err(AppError::BadRequest(format!(
            "QR codes are not issued for {} appointments",
            appointment.status
        )));
    }

    let checkin_service = CheckInService::new(&state);
    let qr_token = checkin_service.issue_token(appointment.id)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "appointment_id": appointment.id,
        "qr_token": qr_token
    })))
}

// ==============================================================================
// NURSE APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_nurse_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<NurseAppointmentsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .get_nurse_appointments(&nurse_id.to_string(), params.date, params.status, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Nurses accept or decline through this endpoint; every other status
    // is driven by the lifecycle machinery, not by hand
    match request.status {
        AppointmentStatus::Confirmed | AppointmentStatus::Cancelled => {}
        _ => {
            return Err(AppError::BadRequest(
                "Status must be one of: confirmed, cancelled".to_string(),
            ));
        }
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, token).await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    match user.role {
        Role::Nurse => {
            if appointment.nurse_id.to_string() != user.id {
                return Err(AppError::Forbidden(
                    "Not authorized to update this appointment".to_string(),
                ));
            }
        }
        Role::Admin => {}
        Role::Student => {
            return Err(AppError::Forbidden(
                "Students cannot update appointment status".to_string(),
            ));
        }
    }

    let lifecycle_service = AppointmentLifecycleService::new(&state);

    let updated = lifecycle_service.update_status(appointment_id, request.status, token).await
        .map_err(|e| match e {
            AppointmentError::InvalidStatusTransition(status) => {
                AppError::BadRequest(format!("Cannot transition from current status: {}", status))
            },
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated,
        "message": "Appointment status updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn scan_appointment_qr(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ScanQrRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let nurse_id = require_nurse(&user)?;

    let checkin_service = CheckInService::new(&state);

    let (appointment, action) = checkin_service.scan(nurse_id, &request.token, token).await
        .map_err(|e| match e {
            AppointmentError::InvalidQrToken => {
                AppError::BadRequest("Invalid or expired QR token".to_string())
            },
            AppointmentError::NotFound => {
                AppError::NotFound("Appointment not found".to_string())
            },
            AppointmentError::Unauthorized => {
                AppError::Forbidden("This appointment belongs to another nurse".to_string())
            },
            AppointmentError::InvalidStatusTransition(status) => {
                AppError::BadRequest(format!("Cannot check in appointment in status: {}", status))
            },
            AppointmentError::AlreadyCheckedIn => {
                AppError::Conflict("Student is already checked in".to_string())
            },
            AppointmentError::AlreadyCheckedOut => {
                AppError::Conflict("Student has already checked out".to_string())
            },
            AppointmentError::ValidationError(msg) => {
                AppError::BadRequest(msg)
            },
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "action": action,
        "appointment": appointment
    })))
}
