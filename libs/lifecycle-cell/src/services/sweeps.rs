use chrono::{DateTime, Duration, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::AppointmentLifecycleService;
use medical_record_cell::services::MedicalRecordService;
use notification_cell::models::{DispatchNotificationRequest, NotificationType};
use notification_cell::services::{NotificationDispatchService, NotificationService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{LifecycleError, LifecycleRules, SweepReport};

/// Time-driven transitions over the whole ledger. Every sweep is written
/// so a second runner doing the same pass is harmless: candidates are
/// selected by state filters and each write carries its own
/// compare-and-swap filter.
pub struct LifecycleSweepService {
    supabase: SupabaseClient,
    rules: LifecycleRules,
    lifecycle: AppointmentLifecycleService,
    records: MedicalRecordService,
    notifications: NotificationService,
    dispatcher: NotificationDispatchService,
}

impl LifecycleSweepService {
    pub fn new(config: &AppConfig, rules: LifecycleRules) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            rules,
            lifecycle: AppointmentLifecycleService::new(config),
            records: MedicalRecordService::new(config),
            notifications: NotificationService::new(config),
            dispatcher: NotificationDispatchService::new(config),
        }
    }

    pub fn rules(&self) -> &LifecycleRules {
        &self.rules
    }

    /// Run every sweep once. A failing sweep is logged and the rest
    /// still run.
    #[instrument(skip(self, auth_token))]
    pub async fn run_all(&self, now: DateTime<Utc>, auth_token: &str) -> SweepReport {
        let mut report = SweepReport::default();

        match self.sweep_no_shows(now, auth_token).await {
            Ok(n) => report.no_shows_marked = n,
            Err(e) => warn!("No-show sweep failed: {}", e),
        }

        match self.sweep_reminders(now, auth_token).await {
            Ok(n) => report.reminders_sent = n,
            Err(e) => warn!("Reminder sweep failed: {}", e),
        }

        match self.sweep_archives(now, auth_token).await {
            Ok(n) => report.appointments_archived = n,
            Err(e) => warn!("Archive sweep failed: {}", e),
        }

        let cutoff = self.rules.archive_cutoff(now);

        match self.records.archive_records_older_than(cutoff, auth_token).await {
            Ok(n) => report.records_archived = n,
            Err(e) => warn!("Record archive sweep failed: {}", e),
        }

        match self.notifications.delete_older_than(cutoff, auth_token).await {
            Ok(n) => report.notifications_deleted = n,
            Err(e) => warn!("Notification retention sweep failed: {}", e),
        }

        report
    }

    /// Flip confirmed appointments nobody checked in to past the grace
    /// period to no-show. The student is notified through the normal
    /// transition path.
    #[instrument(skip(self, auth_token))]
    pub async fn sweep_no_shows(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<u32, LifecycleError> {
        let threshold = now - Duration::minutes(self.rules.no_show_grace_minutes);

        let candidates = self.fetch_appointments(
            &format!(
                "/rest/v1/appointments?status=eq.confirmed&check_in_time=is.null&scheduled_at=lte.{}",
                urlencoding::encode(&threshold.to_rfc3339())
            ),
            auth_token,
        ).await?;

        let mut marked = 0u32;
        for appointment in candidates {
            // The query is only a coarse filter; this predicate decides
            if !self.lifecycle.should_mark_no_show(
                &appointment.status,
                appointment.check_in_time,
                appointment.scheduled_at,
                self.rules.no_show_grace_minutes,
                now,
            ) {
                continue;
            }

            match self.lifecycle.update_status(
                appointment.id,
                AppointmentStatus::NoShow,
                auth_token,
            ).await {
                Ok(_) => {
                    info!("Appointment {} marked as no-show", appointment.id);
                    marked += 1;
                }
                Err(e) => warn!("Could not mark appointment {} as no-show: {}", appointment.id, e),
            }
        }

        Ok(marked)
    }

    /// Remind students about tomorrow's confirmed appointments. The row
    /// is claimed through `reminder_sent_at` before anything is sent, so
    /// concurrent sweepers cannot double-remind.
    #[instrument(skip(self, auth_token))]
    pub async fn sweep_reminders(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<u32, LifecycleError> {
        let window_start = (now + Duration::days(1))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let window_end = window_start + Duration::days(1);

        let candidates = self.fetch_appointments(
            &format!(
                "/rest/v1/appointments?status=eq.confirmed&reminder_sent_at=is.null&scheduled_at=gte.{}&scheduled_at=lt.{}",
                urlencoding::encode(&window_start.to_rfc3339()),
                urlencoding::encode(&window_end.to_rfc3339())
            ),
            auth_token,
        ).await?;

        let mut sent = 0u32;
        for appointment in candidates {
            let claimed = match self.claim_reminder(appointment.id, now, auth_token).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    debug!("Reminder for appointment {} already claimed", appointment.id);
                    continue;
                }
                Err(e) => {
                    warn!("Could not claim reminder for appointment {}: {}", appointment.id, e);
                    continue;
                }
            };

            let notification = DispatchNotificationRequest {
                user_id: claimed.student_id,
                title: "Appointment reminder".to_string(),
                message: format!(
                    "You have an appointment tomorrow at {}",
                    claimed.scheduled_at.format("%H:%M")
                ),
                notification_type: NotificationType::AppointmentReminder,
                related_id: Some(claimed.id),
                related_type: Some("appointment".to_string()),
            };

            match self.dispatcher.dispatch(notification, auth_token).await {
                Ok(_) => sent += 1,
                // The claim already stuck; delivery is not retried
                Err(e) => warn!("Reminder for appointment {} claimed but not delivered: {}", claimed.id, e),
            }
        }

        Ok(sent)
    }

    /// Move terminal appointments past retention into the archive. No
    /// notification goes out for this edge.
    #[instrument(skip(self, auth_token))]
    pub async fn sweep_archives(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<u32, LifecycleError> {
        let cutoff = self.rules.archive_cutoff(now);

        let candidates = self.fetch_appointments(
            &format!(
                "/rest/v1/appointments?status=in.(completed,cancelled,no_show)&scheduled_at=lte.{}",
                urlencoding::encode(&cutoff.to_rfc3339())
            ),
            auth_token,
        ).await?;

        let mut archived = 0u32;
        for appointment in candidates {
            match self.lifecycle.update_status(
                appointment.id,
                AppointmentStatus::Archived,
                auth_token,
            ).await {
                Ok(_) => {
                    debug!("Appointment {} archived", appointment.id);
                    archived += 1;
                }
                Err(e) => warn!("Could not archive appointment {}: {}", appointment.id, e),
            }
        }

        if archived > 0 {
            info!("Archived {} appointments past the {}-month retention window",
                  archived, self.rules.retention_months);
        }
        Ok(archived)
    }

    /// Stamp `reminder_sent_at` if and only if nobody else has. Returns
    /// the row when this sweeper won the claim.
    async fn claim_reminder(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, LifecycleError> {
        let update_data = json!({
            "reminder_sent_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!(
                "/rest/v1/appointments?id=eq.{}&reminder_sent_at=is.null",
                appointment_id
            ),
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await.map_err(|e| LifecycleError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Ok(None);
        }

        serde_json::from_value(result[0].clone())
            .map(Some)
            .map_err(|e| LifecycleError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, LifecycleError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| LifecycleError::DatabaseError(e.to_string()))?;

        let mut appointments = Vec::with_capacity(result.len());
        for row in result {
            match serde_json::from_value::<Appointment>(row) {
                Ok(appointment) => appointments.push(appointment),
                Err(e) => warn!("Skipping malformed appointment row: {}", e),
            }
        }
        Ok(appointments)
    }
}
