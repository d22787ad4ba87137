// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc, Duration};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::models::{DispatchNotificationRequest, NotificationType};
use notification_cell::services::NotificationDispatchService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    dispatcher: NotificationDispatchService,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            dispatcher: NotificationDispatchService::new(config),
        }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {:?} to {:?}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {:?} -> {:?}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(*current_status));
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states move only into the archive, and only the
            // retention sweep drives that edge
            AppointmentStatus::Completed => vec![AppointmentStatus::Archived],
            AppointmentStatus::Cancelled => vec![AppointmentStatus::Archived],
            AppointmentStatus::NoShow => vec![AppointmentStatus::Archived],
            AppointmentStatus::Archived => vec![],
        }
    }

    /// Apply a validated transition and notify the student.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;
        self.validate_status_transition(&appointment.status, &new_status)?;

        let updated = self.apply_transition(&appointment, new_status, auth_token).await?;

        if new_status != AppointmentStatus::Archived {
            self.notify_student_of_status(&updated, auth_token).await;
        }

        info!("Appointment {} moved {} -> {}", appointment_id, appointment.status, new_status);
        Ok(updated)
    }

    /// Explicit completion through a finalized medical record. Completion
    /// has no other entry point.
    pub async fn complete_via_record(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment {} via medical record", appointment_id);
        self.update_status(appointment_id, AppointmentStatus::Completed, auth_token).await
    }

    /// Whether the sweep should flip this row to no-show.
    pub fn should_mark_no_show(
        &self,
        status: &AppointmentStatus,
        check_in_time: Option<DateTime<Utc>>,
        scheduled_at: DateTime<Utc>,
        grace_minutes: i64,
        current_time: DateTime<Utc>,
    ) -> bool {
        if *status != AppointmentStatus::Confirmed {
            return false;
        }
        if check_in_time.is_some() {
            return false;
        }

        current_time > scheduled_at + Duration::minutes(grace_minutes)
    }

    /// The status filter makes the patch a compare-and-swap: a row that
    /// already moved on is left untouched and reported as a stale
    /// transition.
    async fn apply_transition(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let update_data = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!(
                "/rest/v1/appointments?id=eq.{}&status=eq.{}",
                appointment.id, appointment.status
            ),
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn notify_student_of_status(&self, appointment: &Appointment, auth_token: &str) {
        let (title, message) = match appointment.status {
            AppointmentStatus::Confirmed => (
                "Appointment confirmed",
                format!("Your appointment on {} was confirmed",
                        appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            ),
            AppointmentStatus::Cancelled => (
                "Appointment cancelled",
                format!("Your appointment on {} was cancelled",
                        appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            ),
            AppointmentStatus::Completed => (
                "Appointment completed",
                "Your visit was completed and recorded".to_string(),
            ),
            AppointmentStatus::NoShow => (
                "Appointment marked as no-show",
                format!("You did not check in for your appointment on {}",
                        appointment.scheduled_at.format("%Y-%m-%d %H:%M")),
            ),
            _ => return,
        };

        let notification = DispatchNotificationRequest {
            user_id: appointment.student_id,
            title: title.to_string(),
            message,
            notification_type: NotificationType::StatusChanged,
            related_id: Some(appointment.id),
            related_type: Some("appointment".to_string()),
        };

        if let Err(e) = self.dispatcher.dispatch(notification, auth_token).await {
            warn!("Failed to dispatch status notification: {}", e);
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
