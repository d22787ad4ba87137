// libs/notification-cell/tests/handlers_test.rs

use std::sync::Arc;
use axum::extract::{Extension, Path, Query, State};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use notification_cell::handlers::*;
use notification_cell::models::NotificationListQuery;
use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

fn create_test_user_extension(role: Role, id: &str) -> Extension<User> {
    Extension(User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", role)),
        role,
        metadata: None,
        created_at: Some(Utc::now()),
    })
}

fn create_auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    let auth = Authorization::bearer(token).unwrap();
    TypedHeader(auth)
}

#[tokio::test]
async fn test_get_notifications_for_user() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let student_user = TestUser::student("student@example.com");
    let token = JwtTestUtils::create_test_token(&student_user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::notification_response(&student_user.id)
        ])))
        .mount(&mock_server)
        .await;

    let result = get_notifications(
        State(Arc::new(config)),
        Query(NotificationListQuery { unread: None }),
        create_auth_header(&token),
        create_test_user_extension(Role::Student, &student_user.id),
    ).await;

    assert!(result.is_ok(), "Expected get_notifications to succeed, but got error: {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["success"], true);
    assert_eq!(response["total"], 1);
    assert_eq!(response["notifications"][0]["user_id"], student_user.id);
}

#[tokio::test]
async fn test_mark_notification_read() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let mut updated = MockSupabaseResponses::notification_response(&nurse_user.id);
    updated["is_read"] = json!(true);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .mount(&mock_server)
        .await;

    let result = mark_notification_read(
        State(Arc::new(config)),
        Path(Uuid::new_v4()),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
    ).await;

    assert!(result.is_ok(), "Expected mark_notification_read to succeed, but got error: {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["notification"]["is_read"], true);
}

#[tokio::test]
async fn test_mark_notification_read_not_found() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    // No row matches the id + user pair
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = mark_notification_read(
        State(Arc::new(config)),
        Path(Uuid::new_v4()),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::NotFound(msg) => assert!(msg.contains("Notification not found")),
        _ => panic!("Expected NotFound error"),
    }
}

#[tokio::test]
async fn test_retention_delete_targets_rows_before_cutoff() {
    use notification_cell::services::NotificationService;
    use wiremock::matchers::query_param;

    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let cutoff = Utc::now() - chrono::Months::new(12);

    // Only the created_at filter decides what goes; the server reports
    // the purged rows back so the sweep can count them.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("created_at", format!("lte.{}", cutoff.to_rfc3339())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::notification_response(&Uuid::new_v4().to_string()),
            MockSupabaseResponses::notification_response(&Uuid::new_v4().to_string()),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = NotificationService::new(&config);
    let deleted = service.delete_older_than(cutoff, "test-token").await;

    assert!(deleted.is_ok(), "Expected delete to succeed, but got error: {:?}", deleted.err());
    assert_eq!(deleted.unwrap(), 2);
}
