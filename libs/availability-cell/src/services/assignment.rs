use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityError, NurseAssignment};

pub struct AssignmentService {
    supabase: SupabaseClient,
}

impl AssignmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Active assignments for a student, newest first.
    pub async fn list_active_assignments(
        &self,
        student_id: &str,
        auth_token: &str,
    ) -> Result<Vec<NurseAssignment>, AvailabilityError> {
        debug!("Listing active assignments for student: {}", student_id);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/nurse_student_assignments?student_id=eq.{}&is_active=eq.true&order=created_at.desc",
                student_id
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<NurseAssignment>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse assignments: {}", e)))
    }

    /// Whether this student currently has an active assignment to this nurse.
    pub async fn is_assigned(
        &self,
        student_id: &str,
        nurse_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AvailabilityError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!(
                "/rest/v1/nurse_student_assignments?student_id=eq.{}&nurse_id=eq.{}&is_active=eq.true&select=id",
                student_id, nurse_id
            ),
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }
}
