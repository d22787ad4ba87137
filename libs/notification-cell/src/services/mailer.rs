use anyhow::{Result, anyhow};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;

/// Thin client for the transactional mail API.
///
/// Callers treat every send as best-effort; a failure here must never
/// roll back the work that triggered the email.
pub struct MailerService {
    client: Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl MailerService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from_address: config.mail_from_address.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.api_key.is_empty()
    }

    pub async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
        if !self.is_configured() {
            return Err(anyhow!("Mail API is not configured"));
        }

        debug!("Sending email to {} with subject: {}", to, subject);

        let response = self.client
            .post(format!("{}/emails", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "from": self.from_address,
                "to": [to],
                "subject": subject,
                "html": body_html
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Mail API error ({}): {}", status, error_text));
        }

        Ok(())
    }
}
