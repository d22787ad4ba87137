use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DispatchNotificationRequest, Notification, NotificationError};
use crate::services::mailer::MailerService;

pub struct NotificationDispatchService {
    supabase: SupabaseClient,
    mailer: MailerService,
}

impl NotificationDispatchService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            mailer: MailerService::new(config),
        }
    }

    /// Persist the notification row, then attempt an email copy.
    ///
    /// The row insert is the contract; the email is best-effort and a
    /// send failure only produces a warning.
    pub async fn dispatch(
        &self,
        request: DispatchNotificationRequest,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        debug!("Dispatching {:?} notification to user {}", request.notification_type, request.user_id);

        let notification_data = json!({
            "user_id": request.user_id,
            "title": request.title,
            "message": request.message,
            "notification_type": request.notification_type,
            "related_id": request.related_id,
            "related_type": request.related_type,
            "is_read": false,
            "created_at": chrono::Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/notifications",
            Some(auth_token),
            Some(notification_data),
            Some(headers),
        ).await.map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(NotificationError::DatabaseError(
                "Failed to persist notification".to_string(),
            ));
        }

        let notification: Notification = serde_json::from_value(result[0].clone())
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse notification: {}", e)))?;

        if let Err(e) = self.send_email_copy(&notification, auth_token).await {
            warn!("Failed to send notification email to user {}: {}", notification.user_id, e);
        }

        Ok(notification)
    }

    async fn send_email_copy(
        &self,
        notification: &Notification,
        auth_token: &str,
    ) -> anyhow::Result<()> {
        if !self.mailer.is_configured() {
            debug!("Mail API not configured, skipping email copy");
            return Ok(());
        }

        let recipient = match self.lookup_email(notification.user_id, auth_token).await? {
            Some(email) => email,
            None => {
                debug!("No email on file for user {}", notification.user_id);
                return Ok(());
            }
        };

        let body_html = format!("<p>{}</p>", notification.message);
        self.mailer.send(&recipient, &notification.title, &body_html).await
    }

    async fn lookup_email(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> anyhow::Result<Option<String>> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &format!("/rest/v1/profiles?id=eq.{}&select=email", user_id),
            Some(auth_token),
            None,
        ).await?;

        let email = result.first()
            .and_then(|profile| profile.get("email"))
            .and_then(|value| value.as_str())
            .filter(|email| !email.is_empty())
            .map(|email| email.to_string());

        Ok(email)
    }
}
