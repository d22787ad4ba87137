// libs/appointment-cell/src/services/slot_lock.rs
//
// Row-based locking for booking serialization. Every count-then-insert
// runs under a lock keyed by (nurse_id, requested timestamp), so two
// bookings for the same instant can never interleave their capacity
// checks.

use chrono::{DateTime, Utc, Duration};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

pub struct SlotLockService {
    supabase: SupabaseClient,
    lock_timeout_seconds: u64,
}

impl SlotLockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lock_timeout_seconds: 30,
        }
    }

    /// Lock key for one nurse at one exact timestamp.
    pub fn generate_lock_key(&self, nurse_id: Uuid, scheduled_at: DateTime<Utc>) -> String {
        format!("slot_{}_{}", nurse_id, scheduled_at.timestamp())
    }

    /// Try to take the lock. The lock table has a unique index on
    /// lock_key, so the insert itself is the arbiter under concurrency.
    pub async fn acquire_lock(
        &self,
        lock_key: &str,
        nurse_id: Uuid,
    ) -> Result<bool, AppointmentError> {
        match self.try_insert_lock(lock_key, nurse_id).await {
            Ok(()) => {
                debug!("Slot lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => {
                // Lock row exists; reclaim it only if its holder expired
                let cleaned_up = self.check_and_cleanup_expired_lock(lock_key).await?;
                if cleaned_up {
                    match self.try_insert_lock(lock_key, nurse_id).await {
                        Ok(()) => {
                            debug!("Slot lock acquired after cleanup: {}", lock_key);
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub async fn release_lock(&self, lock_key: &str) -> Result<(), AppointmentError> {
        let _: Vec<Value> = self.supabase.request(
            reqwest::Method::DELETE,
            &format!("/rest/v1/slot_locks?lock_key=eq.{}", lock_key),
            None,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock released: {}", lock_key);
        Ok(())
    }

    async fn try_insert_lock(&self, lock_key: &str, nurse_id: Uuid) -> Result<(), anyhow::Error> {
        let lock_data = json!({
            "lock_key": lock_key,
            "nurse_id": nurse_id,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds as i64)).to_rfc3339(),
            "holder_id": format!("booking_{}", Uuid::new_v4())
        });

        // Lock table is internal, no user auth rides on these requests
        let _: Vec<Value> = self.supabase.request(
            reqwest::Method::POST,
            "/rest/v1/slot_locks",
            None,
            Some(lock_data),
        ).await?;

        Ok(())
    }

    async fn check_and_cleanup_expired_lock(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            reqwest::Method::GET,
            &format!("/rest/v1/slot_locks?lock_key=eq.{}&select=*", lock_key),
            None,
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = result.first() {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        self.release_lock(lock_key).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}
