use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use appointment_cell::models::AppointmentStatus;

/// Suffix appended to record_type when the retention sweep archives a
/// record. Archived records are tagged, never deleted.
pub const ARCHIVED_RECORD_SUFFIX: &str = "_archived";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub student_id: Uuid,
    pub nurse_id: Uuid,
    pub record_type: String,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalRecord {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMedicalRecordRequest {
    /// When set, the record hangs off an appointment the nurse owns.
    pub appointment_id: Option<Uuid>,
    /// Required for standalone records; derived from the appointment otherwise.
    pub student_id: Option<Uuid>,
    pub record_type: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum MedicalRecordError {
    #[error("Medical record not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Record belongs to another nurse")]
    Unauthorized,

    #[error("Record is already completed")]
    AlreadyCompleted,

    #[error("Student is not assigned to this nurse")]
    NotAssigned,

    #[error("Appointment cannot be completed from status: {0}")]
    InvalidAppointmentState(AppointmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
