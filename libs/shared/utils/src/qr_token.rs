use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Tokens older than this are rejected by the codec itself; callers never
/// re-check expiry.
pub const QR_TOKEN_TTL_HOURS: i64 = 24;

pub const APPOINTMENT_TOKEN_TYPE: &str = "appointment";

/// Payload carried inside a check-in QR token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrTokenPayload {
    pub token_type: String,
    pub id: Uuid,
    pub issued_at: i64,
}

/// Produce a signed token string: base64(payload).base64(hmac). Rendering
/// the string as an actual QR image is left to the frontend.
pub fn encode_token(token_type: &str, id: Uuid, secret: &str) -> Result<String, String> {
    if secret.is_empty() {
        return Err("QR token secret is not set".to_string());
    }

    let payload = QrTokenPayload {
        token_type: token_type.to_string(),
        id,
        issued_at: Utc::now().timestamp(),
    };

    let payload_json = serde_json::to_string(&payload)
        .map_err(|_| "Failed to serialize token payload".to_string())?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(payload_b64.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify the signature and the 24-hour window, then return the payload.
pub fn decode_token(token: &str, secret: &str) -> Result<QrTokenPayload, String> {
    if secret.is_empty() {
        return Err("QR token secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err("Invalid token format".to_string());
    }

    let payload_b64 = parts[0];
    let signature_b64 = parts[1];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode QR token signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(payload_b64.as_bytes());

    if let Err(_) = mac.verify_slice(&signature) {
        debug!("QR token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let payload_json = match URL_SAFE_NO_PAD.decode(payload_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid payload encoding".to_string()),
        },
        Err(_) => return Err("Invalid payload encoding".to_string()),
    };

    let payload: QrTokenPayload = serde_json::from_str(&payload_json)
        .map_err(|_| "Invalid payload format".to_string())?;

    let expires_at = payload.issued_at + Duration::hours(QR_TOKEN_TTL_HOURS).num_seconds();
    if Utc::now().timestamp() > expires_at {
        debug!("QR token expired (issued at {})", payload.issued_at);
        return Err("Token expired".to_string());
    }

    Ok(payload)
}

pub fn validate_token(token: &str, secret: &str) -> bool {
    decode_token(token, secret).is_ok()
}
