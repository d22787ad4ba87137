// libs/notification-cell/tests/dispatch_test.rs
// The dispatcher's contract: the row always lands, email never blocks it.

use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use notification_cell::models::{DispatchNotificationRequest, NotificationType};
use notification_cell::services::NotificationDispatchService;
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

fn dispatch_request(user_id: Uuid) -> DispatchNotificationRequest {
    DispatchNotificationRequest {
        user_id,
        title: "Booking requested".to_string(),
        message: "A student requested an appointment".to_string(),
        notification_type: NotificationType::BookingRequested,
        related_id: Some(Uuid::new_v4()),
        related_type: Some("appointment".to_string()),
    }
}

#[tokio::test]
async fn test_dispatch_persists_notification_without_mailer() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(&user_id.to_string())
        ])))
        .mount(&mock_server)
        .await;

    let service = NotificationDispatchService::new(&config);
    let result = service.dispatch(dispatch_request(user_id), "test-token").await;

    assert!(result.is_ok(), "Expected dispatch to succeed, but got error: {:?}", result.err());
    let notification = result.unwrap();
    assert_eq!(notification.user_id, user_id);
    assert!(!notification.is_read);
}

#[tokio::test]
async fn test_dispatch_succeeds_when_email_send_fails() {
    let mock_server = MockServer::start().await;
    let mut config = mock_config(&mock_server);
    config.mail_api_url = mock_server.uri();
    config.mail_api_key = "test-mail-key".to_string();

    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(&user_id.to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "student@example.com"}
        ])))
        .mount(&mock_server)
        .await;

    // Mail API is down; the dispatch must still return the persisted row
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "upstream down"})))
        .mount(&mock_server)
        .await;

    let service = NotificationDispatchService::new(&config);
    let result = service.dispatch(dispatch_request(user_id), "test-token").await;

    assert!(result.is_ok(), "Email failure must not fail dispatch, but got: {:?}", result.err());
}

#[tokio::test]
async fn test_dispatch_sends_email_when_configured() {
    let mock_server = MockServer::start().await;
    let mut config = mock_config(&mock_server);
    config.mail_api_url = mock_server.uri();
    config.mail_api_key = "test-mail-key".to_string();

    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(&user_id.to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "student@example.com"}
        ])))
        .mount(&mock_server)
        .await;

    let email_mock = Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "email-1"})))
        .expect(1);
    email_mock.mount(&mock_server).await;

    let service = NotificationDispatchService::new(&config);
    let result = service.dispatch(dispatch_request(user_id), "test-token").await;

    assert!(result.is_ok(), "Expected dispatch to succeed, but got error: {:?}", result.err());
}

#[tokio::test]
async fn test_dispatch_fails_when_row_persist_fails() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "database offline"})))
        .mount(&mock_server)
        .await;

    let service = NotificationDispatchService::new(&config);
    let result = service.dispatch(dispatch_request(Uuid::new_v4()), "test-token").await;

    assert!(result.is_err(), "A failed row persist must surface to the caller");
}
