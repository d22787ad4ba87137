use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};

/// A nurse's bookable window on a single calendar date.
///
/// At most one slot exists per (nurse_id, date); the table carries a
/// unique index on that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub nurse_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_concurrent: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An active care assignment linking a student to a nurse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseAssignment {
    pub id: Uuid,
    pub nurse_id: Uuid,
    pub student_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_concurrent: Option<i32>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub max_concurrent: Option<i32>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityListQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityDayQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Availability slot not found")]
    NotFound,

    #[error("An availability slot already exists for this nurse on {date}")]
    SlotExists { date: NaiveDate },

    #[error("Slot window still has pending or confirmed appointments")]
    SlotInUse,

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
