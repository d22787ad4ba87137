use chrono::{DateTime, Utc, NaiveDate, TimeZone};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilitySlot, AvailabilityError,
    CreateAvailabilityRequest, UpdateAvailabilityRequest,
};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create the availability slot for a nurse on one calendar date.
    ///
    /// The table enforces a unique (nurse_id, date) pair, so a concurrent
    /// create for the same date surfaces as a conflict even when the
    /// pre-check passes.
    pub async fn create_slot(
        &self,
        nurse_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        debug!("Creating availability slot for nurse {} on {}", nurse_id, request.date);

        if request.start_time >= request.end_time {
            return Err(AvailabilityError::InvalidWindow(
                "start_time must be before end_time".to_string(),
            ));
        }

        let max_concurrent = request.max_concurrent.unwrap_or(1);
        if max_concurrent < 1 {
            return Err(AvailabilityError::ValidationError(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/availability_slots?nurse_id=eq.{}&date=eq.{}&select=id",
                nurse_id, request.date
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(AvailabilityError::SlotExists { date: request.date });
        }

        let slot_data = json!({
            "nurse_id": nurse_id,
            "date": request.date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "max_concurrent": max_concurrent,
            "is_available": request.is_available.unwrap_or(true),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/availability_slots",
            Some(auth_token),
            Some(slot_data),
            Some(headers),
        ).await.map_err(|e| {
            let msg = e.to_string();
            if msg.starts_with("Conflict") {
                AvailabilityError::SlotExists { date: request.date }
            } else {
                AvailabilityError::DatabaseError(msg)
            }
        })?;

        if result.is_empty() {
            return Err(AvailabilityError::DatabaseError(
                "Failed to create availability slot".to_string(),
            ));
        }

        let slot: AvailabilitySlot = serde_json::from_value(result[0].clone())
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slot: {}", e)))?;
        debug!("Availability slot created with ID: {}", slot.id);

        Ok(slot)
    }

    pub async fn get_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/availability_slots?id=eq.{}", slot_id),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AvailabilityError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// List a nurse's slots, optionally narrowed to one date.
    pub async fn get_nurse_slots(
        &self,
        nurse_id: Uuid,
        date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/availability_slots?nurse_id=eq.{}&order=date.asc,start_time.asc",
            nurse_id
        );
        if let Some(date) = date {
            path.push_str(&format!("&date=eq.{}", date));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilitySlot>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slots: {}", e)))
    }

    /// Patch an existing slot. Capacity changes apply to future bookings
    /// only; rows already inside the window are never re-validated.
    pub async fn update_slot(
        &self,
        slot_id: Uuid,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        debug!("Updating availability slot: {}", slot_id);

        let current = self.get_slot(slot_id, auth_token).await?;

        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        if start >= end {
            return Err(AvailabilityError::InvalidWindow(
                "start_time must be before end_time".to_string(),
            ));
        }
        if let Some(max_concurrent) = request.max_concurrent {
            if max_concurrent < 1 {
                return Err(AvailabilityError::ValidationError(
                    "max_concurrent must be at least 1".to_string(),
                ));
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(start_time) = request.start_time {
            update_data.insert("start_time".to_string(), json!(start_time.format("%H:%M:%S").to_string()));
        }
        if let Some(end_time) = request.end_time {
            update_data.insert("end_time".to_string(), json!(end_time.format("%H:%M:%S").to_string()));
        }
        if let Some(max_concurrent) = request.max_concurrent {
            update_data.insert("max_concurrent".to_string(), json!(max_concurrent));
        }
        if let Some(is_available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(is_available));
        }

        if update_data.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "No fields to update".to_string(),
            ));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/availability_slots?id=eq.{}", slot_id),
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(headers),
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AvailabilityError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// Delete a slot, refusing while any pending or confirmed appointment
    /// sits inside its window.
    pub async fn delete_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!("Deleting availability slot: {}", slot_id);

        let slot = self.get_slot(slot_id, auth_token).await?;

        let active = self.count_window_appointments(&slot, auth_token).await?;
        if active > 0 {
            return Err(AvailabilityError::SlotInUse);
        }

        let _: Vec<Value> = self.supabase.request(
            Method::DELETE,
            &format!("/rest/v1/availability_slots?id=eq.{}", slot_id),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Find the slot whose window contains `scheduled_at` for this nurse.
    ///
    /// A slot flagged unavailable is treated the same as a missing slot.
    pub async fn find_covering_slot(
        &self,
        nurse_id: Uuid,
        scheduled_at: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        let date = scheduled_at.date_naive();
        let time = scheduled_at.time();

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/availability_slots?nurse_id=eq.{}&date=eq.{}&is_available=eq.true",
                nurse_id, date
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let slots: Vec<AvailabilitySlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilitySlot>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        // Window containment is half-open: start inclusive, end exclusive
        slots.into_iter()
            .find(|slot| slot.start_time <= time && time < slot.end_time)
            .ok_or(AvailabilityError::NotFound)
    }

    /// Open slots across a set of nurses on one date, for the student view.
    pub async fn get_open_slots(
        &self,
        nurse_ids: &[Uuid],
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        if nurse_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = nurse_ids.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/availability_slots?nurse_id=in.({})&date=eq.{}&is_available=eq.true&order=start_time.asc",
                ids, date
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilitySlot>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse slots: {}", e)))
    }

    async fn count_window_appointments(
        &self,
        slot: &AvailabilitySlot,
        auth_token: &str,
    ) -> Result<usize, AvailabilityError> {
        let window_start = Utc.from_utc_datetime(&slot.date.and_time(slot.start_time));
        let window_end = Utc.from_utc_datetime(&slot.date.and_time(slot.end_time));

        let start_str = window_start.to_rfc3339();
        let end_str = window_end.to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?nurse_id=eq.{}&status=in.(pending,confirmed)&scheduled_at=gte.{}&scheduled_at=lt.{}&select=id",
            slot.nurse_id,
            urlencoding::encode(&start_str),
            urlencoding::encode(&end_str),
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(result.len())
    }
}
