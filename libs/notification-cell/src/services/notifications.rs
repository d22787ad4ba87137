use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Notification, NotificationError};

pub struct NotificationService {
    supabase: SupabaseClient,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Notifications for one user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut path = format!(
            "/rest/v1/notifications?user_id=eq.{}&order=created_at.desc",
            user_id
        );
        if unread_only {
            path.push_str("&is_read=eq.false");
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Notification>, _>>()
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notifications: {}", e)))
    }

    /// Mark one of the user's notifications as read.
    ///
    /// The user filter rides in the query so nobody can flip another
    /// user's rows.
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        debug!("Marking notification {} read for user {}", notification_id, user_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!(
                "/rest/v1/notifications?id=eq.{}&user_id=eq.{}",
                notification_id, user_id
            ),
            Some(auth_token),
            Some(json!({"is_read": true})),
            Some(headers),
        ).await.map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(NotificationError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notification: {}", e)))
    }

    /// Hard-delete notifications created before the cutoff. Notifications
    /// are never archived, they just age out.
    pub async fn delete_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        auth_token: &str,
    ) -> Result<u32, NotificationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &format!(
                "/rest/v1/notifications?created_at=lte.{}",
                urlencoding::encode(&cutoff.to_rfc3339())
            ),
            Some(auth_token),
            None,
            Some(headers),
        ).await.map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let deleted = result.len() as u32;
        if deleted > 0 {
            debug!("Deleted {} notifications older than {}", deleted, cutoff);
        }
        Ok(deleted)
    }
}
