// libs/appointment-cell/src/services/booking.rs
use chrono::{Utc, NaiveDate, Duration, TimeZone};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::AvailabilityError;
use availability_cell::services::{AssignmentService, AvailabilityService};
use notification_cell::models::{DispatchNotificationRequest, NotificationType};
use notification_cell::services::NotificationDispatchService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, CreateBookingRequest};
use crate::services::rate_limit::BookingRateLimiter;
use crate::services::slot_lock::SlotLockService;

pub struct BookingService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    assignments: AssignmentService,
    dispatcher: NotificationDispatchService,
    slot_locks: SlotLockService,
    rate_limiter: BookingRateLimiter,
    max_retry_attempts: u32,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
            assignments: AssignmentService::new(config),
            dispatcher: NotificationDispatchService::new(config),
            slot_locks: SlotLockService::new(config),
            rate_limiter: BookingRateLimiter::new(config),
            max_retry_attempts: 3,
        }
    }

    /// Book an appointment for a student.
    ///
    /// Order of checks: rate limit, assignment, covering slot, then the
    /// capacity count and insert under a per-timestamp lock. Capacity
    /// counts only pending and confirmed rows at the exact requested
    /// instant.
    pub async fn book_appointment(
        &self,
        student_id: Uuid,
        request: CreateBookingRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Booking request from student {} with nurse {} at {}",
               student_id, request.nurse_id, request.scheduled_at);

        self.rate_limiter.check_and_count(&student_id.to_string()).await?;

        if request.scheduled_at <= Utc::now() {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }

        let assigned = self.assignments
            .is_assigned(&student_id.to_string(), request.nurse_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        if !assigned {
            return Err(AppointmentError::NotAssigned);
        }

        let slot = self.availability
            .find_covering_slot(request.nurse_id, request.scheduled_at, auth_token)
            .await
            .map_err(|e| match e {
                AvailabilityError::NotFound => AppointmentError::SlotUnavailable,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let lock_key = self.slot_locks.generate_lock_key(request.nurse_id, request.scheduled_at);

        for attempt in 1..=self.max_retry_attempts {
            match self.try_booking_under_lock(
                &lock_key,
                student_id,
                &request,
                slot.max_concurrent,
                auth_token,
            ).await {
                Ok(appointment) => {
                    info!("Booking created for student {} - appointment {}",
                          student_id, appointment.id);
                    self.notify_nurse_of_booking(&appointment, auth_token).await;
                    return Ok(appointment);
                }
                Err(AppointmentError::LockContention) if attempt < self.max_retry_attempts => {
                    warn!("Slot lock contention, retrying attempt {}/{}",
                          attempt, self.max_retry_attempts);
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppointmentError::LockContention)
    }

    async fn try_booking_under_lock(
        &self,
        lock_key: &str,
        student_id: Uuid,
        request: &CreateBookingRequest,
        max_concurrent: i32,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let acquired = self.slot_locks.acquire_lock(lock_key, request.nurse_id).await?;
        if !acquired {
            return Err(AppointmentError::LockContention);
        }

        let result = self.count_then_insert(student_id, request, max_concurrent, auth_token).await;

        match result {
            Ok(appointment) => {
                self.slot_locks.release_lock(lock_key).await?;
                Ok(appointment)
            }
            Err(e) => {
                self.slot_locks.release_lock(lock_key).await?;
                Err(e)
            }
        }
    }

    /// Count active rows at the exact timestamp, then insert pending.
    /// Runs only while the caller holds the slot lock.
    async fn count_then_insert(
        &self,
        student_id: Uuid,
        request: &CreateBookingRequest,
        max_concurrent: i32,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let ts = request.scheduled_at.to_rfc3339();
        let encoded_ts = urlencoding::encode(&ts);

        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/appointments?nurse_id=eq.{}&scheduled_at=eq.{}&status=in.(pending,confirmed)&select=id",
                request.nurse_id, encoded_ts
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if existing.len() as i32 >= max_concurrent {
            return Err(AppointmentError::SlotFull);
        }

        let now = Utc::now();
        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "student_id": student_id,
            "nurse_id": request.nurse_id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "reason": request.reason,
            "status": AppointmentStatus::Pending,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to create appointment".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn notify_nurse_of_booking(&self, appointment: &Appointment, auth_token: &str) {
        let notification = DispatchNotificationRequest {
            user_id: appointment.nurse_id,
            title: "New booking request".to_string(),
            message: format!(
                "A student requested an appointment at {}",
                appointment.scheduled_at.format("%Y-%m-%d %H:%M")
            ),
            notification_type: NotificationType::BookingRequested,
            related_id: Some(appointment.id),
            related_type: Some("appointment".to_string()),
        };

        if let Err(e) = self.dispatcher.dispatch(notification, auth_token).await {
            warn!("Failed to dispatch booking notification: {}", e);
        }
    }

    pub async fn get_appointment(
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

    /// A student's own bookings, newest first. Archived rows stay out
    /// of this view.
    pub async fn get_student_appointments(
        &self,
        student_id: &str,
        status: Option<AppointmentStatus>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?student_id=eq.{}&order=scheduled_at.desc",
            student_id
        );
        match status {
            Some(status) => path.push_str(&format!("&status=eq.{}", status)),
            None => path.push_str("&status=neq.archived"),
        }

        self.fetch_appointments(&path, auth_token).await
    }

    /// A nurse's schedule, optionally narrowed to one date and status.
    pub async fn get_nurse_appointments(
        &self,
        nurse_id: &str,
        date: Option<NaiveDate>,
        status: Option<AppointmentStatus>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?nurse_id=eq.{}&order=scheduled_at.asc",
            nurse_id
        );

        if let Some(date) = date {
            let day_start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
            let day_end = day_start + Duration::days(1);
            let start_str = day_start.to_rfc3339();
            let end_str = day_end.to_rfc3339();
            path.push_str(&format!(
                "&scheduled_at=gte.{}&scheduled_at=lt.{}",
                urlencoding::encode(&start_str),
                urlencoding::encode(&end_str),
            ));
        }
        match status {
            Some(status) => path.push_str(&format!("&status=eq.{}", status)),
            None => path.push_str("&status=neq.archived"),
        }

        self.fetch_appointments(&path, auth_token).await
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }
}
