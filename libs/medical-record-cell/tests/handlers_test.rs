use std::sync::Arc;
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use medical_record_cell::handlers::*;
use medical_record_cell::models::*;
use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = create_test_config();
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

fn record_request(appointment_id: Option<Uuid>, student_id: Option<Uuid>) -> CreateMedicalRecordRequest {
    CreateMedicalRecordRequest {
        appointment_id,
        student_id,
        record_type: None,
        diagnosis: Some("Seasonal allergies".to_string()),
        treatment: Some("Antihistamines".to_string()),
        notes: None,
    }
}

#[tokio::test]
async fn test_create_record_for_own_appointment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let student_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let mut appointment = MockSupabaseResponses::appointment_response(
        &student_id.to_string(), &nurse_user.id, "2030-05-06T10:00:00Z", "confirmed",
    );
    appointment["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::medical_record_response(
                &nurse_user.id, &student_id.to_string(), Some(&appointment_id.to_string()),
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = create_medical_record(
        State(Arc::new(config)),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
        Json(record_request(Some(appointment_id), None)),
    ).await;

    assert!(result.is_ok(), "Expected record creation to succeed, but got error: {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["success"], true);
    assert_eq!(response["record"]["nurse_id"], nurse_user.id);
    assert_eq!(response["record"]["record_type"], "consultation");
}

#[tokio::test]
async fn test_create_record_rejects_student() {
    let config = Arc::new(create_test_config());
    let student_user = TestUser::student("student@example.com");
    let token = JwtTestUtils::create_test_token(&student_user, &config.supabase_jwt_secret, Some(24));

    let result = create_medical_record(
        State(config),
        create_auth_header(&token),
        create_test_user_extension(Role::Student, &student_user.id),
        Json(record_request(Some(Uuid::new_v4()), None)),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Forbidden(msg) => assert!(msg.contains("Only nurses")),
        other => panic!("Expected Forbidden error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_record_for_foreign_appointment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let appointment_id = Uuid::new_v4();
    let mut appointment = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), "2030-05-06T10:00:00Z", "confirmed",
    );
    appointment["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;

    let result = create_medical_record(
        State(Arc::new(config)),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
        Json(record_request(Some(appointment_id), None)),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Forbidden(msg) => assert!(msg.contains("another nurse")),
        other => panic!("Expected Forbidden error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_standalone_record_requires_assignment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/nurse_student_assignments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = create_medical_record(
        State(Arc::new(config)),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
        Json(record_request(None, Some(Uuid::new_v4()))),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Forbidden(msg) => assert!(msg.contains("not assigned")),
        other => panic!("Expected Forbidden error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_standalone_record_requires_student_id() {
    let config = Arc::new(create_test_config());
    let nurse_user = TestUser::nurse("nurse@example.com");
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let result = create_medical_record(
        State(config),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
        Json(record_request(None, None)),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("student_id")),
        other => panic!("Expected BadRequest error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_record_transitions_appointment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let student_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let record_id = Uuid::new_v4();
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let mut record = MockSupabaseResponses::medical_record_response(
        &nurse_user.id, &student_id.to_string(), Some(&appointment_id.to_string()),
    );
    record["id"] = json!(record_id);
    let mut completed_record = record.clone();
    completed_record["completed_at"] = json!(Utc::now().to_rfc3339());

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record])))
        .mount(&mock_server)
        .await;

    let mut appointment = MockSupabaseResponses::appointment_response(
        &student_id.to_string(), &nurse_user.id, "2030-05-06T10:00:00Z", "confirmed",
    );
    appointment["id"] = json!(appointment_id);
    let mut completed_appointment = appointment.clone();
    completed_appointment["status"] = json!("completed");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;

    // The ledger transition must fire exactly once
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed_appointment])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(&student_id.to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed_record])))
        .mount(&mock_server)
        .await;

    let result = complete_medical_record(
        State(Arc::new(config)),
        Path(record_id),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
    ).await;

    assert!(result.is_ok(), "Expected completion to succeed, but got error: {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["success"], true);
    assert!(response["record"]["completed_at"].is_string());
}

#[tokio::test]
async fn test_complete_record_already_completed() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let record_id = Uuid::new_v4();
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let mut record = MockSupabaseResponses::medical_record_response(
        &nurse_user.id, &Uuid::new_v4().to_string(), None,
    );
    record["id"] = json!(record_id);
    record["completed_at"] = json!("2025-02-01T09:00:00Z");

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record])))
        .mount(&mock_server)
        .await;

    let result = complete_medical_record(
        State(Arc::new(config)),
        Path(record_id),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Conflict(msg) => assert!(msg.contains("already completed")),
        other => panic!("Expected Conflict error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_record_blocked_by_pending_appointment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let nurse_user = TestUser::nurse("nurse@example.com");
    let student_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let record_id = Uuid::new_v4();
    let token = JwtTestUtils::create_test_token(&nurse_user, &config.supabase_jwt_secret, Some(24));

    let mut record = MockSupabaseResponses::medical_record_response(
        &nurse_user.id, &student_id.to_string(), Some(&appointment_id.to_string()),
    );
    record["id"] = json!(record_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record])))
        .mount(&mock_server)
        .await;

    // The nurse never confirmed the visit, so completion has no valid edge
    let mut appointment = MockSupabaseResponses::appointment_response(
        &student_id.to_string(), &nurse_user.id, "2030-05-06T10:00:00Z", "pending",
    );
    appointment["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;

    let result = complete_medical_record(
        State(Arc::new(config)),
        Path(record_id),
        create_auth_header(&token),
        create_test_user_extension(Role::Nurse, &nurse_user.id),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("pending")),
        other => panic!("Expected BadRequest error, got {:?}", other),
    }
}
