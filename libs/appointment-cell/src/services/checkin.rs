// libs/appointment-cell/src/services/checkin.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::qr_token::{decode_token, encode_token, APPOINTMENT_TOKEN_TYPE};

use crate::models::{Appointment, AppointmentError, AppointmentStatus, CheckInAction};

pub struct CheckInService {
    supabase: SupabaseClient,
    qr_secret: String,
}

impl CheckInService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            qr_secret: config.qr_token_secret.clone(),
        }
    }

    /// Signed token the student renders as a QR code.
    pub fn issue_token(&self, appointment_id: Uuid) -> Result<String, AppointmentError> {
        encode_token(APPOINTMENT_TOKEN_TYPE, appointment_id, &self.qr_secret)
            .map_err(AppointmentError::ValidationError)
    }

    /// Process a nurse's QR scan.
    ///
    /// First scan on the appointment's calendar date checks the student
    /// in; a second scan checks them out. check_in_time is written at
    /// most once, enforced by an is-null filter on the patch.
    pub async fn scan(
        &self,
        nurse_id: Uuid,
        token: &str,
        auth_token: &str,
    ) -> Result<(Appointment, CheckInAction), AppointmentError> {
        let payload = decode_token(token, &self.qr_secret)
            .map_err(|_| AppointmentError::InvalidQrToken)?;

        if payload.token_type != APPOINTMENT_TOKEN_TYPE {
            return Err(AppointmentError::InvalidQrToken);
        }

        let appointment = self.fetch_appointment(payload.id, auth_token).await?;

        if appointment.nurse_id != nurse_id {
            return Err(AppointmentError::Unauthorized);
        }

        if !matches!(appointment.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed) {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        match (appointment.check_in_time, appointment.check_out_time) {
            (None, _) => {
                // Check-in must happen on the scheduled UTC calendar date
                if appointment.scheduled_date() != Utc::now().date_naive() {
                    return Err(AppointmentError::ValidationError(
                        "Check-in is only allowed on the appointment date".to_string(),
                    ));
                }
                let updated = self.record_check_in(appointment.id, auth_token).await?;
                info!("Student checked in for appointment {}", appointment.id);
                Ok((updated, CheckInAction::CheckedIn))
            }
            (Some(_), None) => {
                let updated = self.record_check_out(appointment.id, auth_token).await?;
                info!("Student checked out of appointment {}", appointment.id);
                Ok((updated, CheckInAction::CheckedOut))
            }
            (Some(_), Some(_)) => Err(AppointmentError::AlreadyCheckedOut),
        }
    }

    async fn record_check_in(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Recording check-in for appointment {}", appointment_id);

        let update_data = json!({
            "check_in_time": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        // The is-null filter loses the race when a concurrent scan
        // already wrote the timestamp
        let result = self.patch_appointment(
            &format!(
                "/rest/v1/appointments?id=eq.{}&check_in_time=is.null",
                appointment_id
            ),
            update_data,
            auth_token,
        ).await?;

        result.ok_or(AppointmentError::AlreadyCheckedIn)
    }

    async fn record_check_out(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Recording check-out for appointment {}", appointment_id);

        let update_data = json!({
            "check_out_time": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result = self.patch_appointment(
            &format!(
                "/rest/v1/appointments?id=eq.{}&check_out_time=is.null",
                appointment_id
            ),
            update_data,
            auth_token,
        ).await?;

        result.ok_or(AppointmentError::AlreadyCheckedOut)
    }

    async fn patch_appointment(
        &self,
        path: &str,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            path,
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match result.first() {
            Some(row) => {
                let appointment = serde_json::from_value(row.clone())
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;
                Ok(Some(appointment))
            }
            None => Ok(None),
        }
    }

    async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }
}
