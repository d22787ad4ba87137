use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use availability_cell::services::AssignmentService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CreateMedicalRecordRequest, MedicalRecord, MedicalRecordError, ARCHIVED_RECORD_SUFFIX,
};

const DEFAULT_RECORD_TYPE: &str = "consultation";

pub struct MedicalRecordService {
    supabase: SupabaseClient,
    lifecycle: AppointmentLifecycleService,
    assignments: AssignmentService,
}

impl MedicalRecordService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: AppointmentLifecycleService::new(config),
            assignments: AssignmentService::new(config),
        }
    }

    /// Create a record, either hanging off an appointment the nurse owns
    /// or standalone for an assigned student.
    pub async fn create_record(
        &self,
        nurse_id: Uuid,
        request: CreateMedicalRecordRequest,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record_type = request.record_type
            .unwrap_or_else(|| DEFAULT_RECORD_TYPE.to_string());

        if record_type.is_empty() {
            return Err(MedicalRecordError::ValidationError(
                "record_type must not be empty".to_string(),
            ));
        }
        if record_type.ends_with(ARCHIVED_RECORD_SUFFIX) {
            return Err(MedicalRecordError::ValidationError(
                "record_type must not carry the archive suffix".to_string(),
            ));
        }

        let student_id = match request.appointment_id {
            Some(appointment_id) => {
                let appointment = self.fetch_appointment(appointment_id, auth_token).await?;
                if appointment.nurse_id != nurse_id {
                    return Err(MedicalRecordError::Unauthorized);
                }
                if appointment.status == AppointmentStatus::Archived {
                    return Err(MedicalRecordError::InvalidAppointmentState(appointment.status));
                }
                appointment.student_id
            }
            None => {
                let student_id = request.student_id.ok_or_else(|| {
                    MedicalRecordError::ValidationError(
                        "student_id is required for standalone records".to_string(),
                    )
                })?;

                let assigned = self.assignments
                    .is_assigned(&student_id.to_string(), nurse_id, auth_token)
                    .await
                    .map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;
                if !assigned {
                    return Err(MedicalRecordError::NotAssigned);
                }
                student_id
            }
        };

        let now = Utc::now();
        let record_data = json!({
            "id": Uuid::new_v4(),
            "appointment_id": request.appointment_id,
            "student_id": student_id,
            "nurse_id": nurse_id,
            "record_type": record_type,
            "diagnosis": request.diagnosis,
            "treatment": request.treatment,
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/medical_records",
            Some(auth_token),
            Some(record_data),
            Some(headers),
        ).await.map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(MedicalRecordError::DatabaseError(
                "Failed to create medical record".to_string(),
            ));
        }

        let record: MedicalRecord = serde_json::from_value(result[0].clone())
            .map_err(|e| MedicalRecordError::DatabaseError(format!("Failed to parse record: {}", e)))?;

        info!("Medical record {} created by nurse {}", record.id, nurse_id);
        Ok(record)
    }

    pub async fn get_record(
        &self,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/medical_records?id=eq.{}", record_id),
            Some(auth_token),
            None,
        ).await.map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(MedicalRecordError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| MedicalRecordError::DatabaseError(format!("Failed to parse record: {}", e)))
    }

    /// Finalize a record. When the record is linked to an appointment the
    /// appointment moves to completed first; a record stamp without the
    /// ledger transition would leave the visit half-closed.
    pub async fn complete_record(
        &self,
        nurse_id: Uuid,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, MedicalRecordError> {
        let record = self.get_record(record_id, auth_token).await?;

        if record.nurse_id != nurse_id {
            return Err(MedicalRecordError::Unauthorized);
        }
        if record.is_completed() {
            return Err(MedicalRecordError::AlreadyCompleted);
        }

        if let Some(appointment_id) = record.appointment_id {
            self.lifecycle.complete_via_record(appointment_id, auth_token).await
                .map_err(|e| match e {
                    AppointmentError::NotFound => MedicalRecordError::AppointmentNotFound,
                    AppointmentError::InvalidStatusTransition(status) => {
                        MedicalRecordError::InvalidAppointmentState(status)
                    }
                    other => MedicalRecordError::DatabaseError(other.to_string()),
                })?;
        }

        let update_data = json!({
            "completed_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        // The is-null filter keeps completion single-shot under
        // concurrent requests
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!(
                "/rest/v1/medical_records?id=eq.{}&completed_at=is.null",
                record_id
            ),
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(MedicalRecordError::AlreadyCompleted);
        }

        let completed: MedicalRecord = serde_json::from_value(result[0].clone())
            .map_err(|e| MedicalRecordError::DatabaseError(format!("Failed to parse record: {}", e)))?;

        info!("Medical record {} completed by nurse {}", record_id, nurse_id);
        Ok(completed)
    }

    /// Tag records older than the cutoff with the archive suffix. Each
    /// row is patched on its own so one bad row cannot stall the sweep.
    pub async fn archive_records_older_than(
        &self,
        cutoff: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<u32, MedicalRecordError> {
        let cutoff_str = cutoff.to_rfc3339();
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/medical_records?created_at=lte.{}&record_type=not.like.*{}&select=id,record_type",
                urlencoding::encode(&cutoff_str),
                ARCHIVED_RECORD_SUFFIX
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        let mut archived = 0u32;
        for row in rows {
            let Some(id) = row.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let record_type = row.get("record_type")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_RECORD_TYPE);

            // The query filter is coarse; this check owns idempotence
            if record_type.ends_with(ARCHIVED_RECORD_SUFFIX) {
                continue;
            }

            let update_data = json!({
                "record_type": format!("{}{}", record_type, ARCHIVED_RECORD_SUFFIX),
                "updated_at": Utc::now().to_rfc3339()
            });

            let patched: Result<Vec<Value>, _> = self.supabase.request(
                Method::PATCH,
                &format!("/rest/v1/medical_records?id=eq.{}", id),
                Some(auth_token),
                Some(update_data),
            ).await;

            match patched {
                Ok(_) => {
                    debug!("Archived medical record {}", id);
                    archived += 1;
                }
                Err(e) => {
                    warn!("Failed to archive medical record {}: {}", id, e);
                }
            }
        }

        Ok(archived)
    }

    async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, MedicalRecordError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
            Some(auth_token),
            None,
        ).await.map_err(|e| MedicalRecordError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(MedicalRecordError::AppointmentNotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| MedicalRecordError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }
}
