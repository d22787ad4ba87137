// libs/appointment-cell/tests/lifecycle_test.rs

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path};

use appointment_cell::models::{AppointmentError, AppointmentStatus};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = create_test_config();
    config.supabase_url = mock_server.uri();
    config
}

#[tokio::test]
async fn test_transition_table() {
    let service = AppointmentLifecycleService::new(&create_test_config());

    // Requested appointments can be accepted or declined
    assert!(service.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Confirmed).is_ok());
    assert!(service.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Cancelled).is_ok());
    assert!(service.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::Completed).is_err());
    assert!(service.validate_status_transition(&AppointmentStatus::Pending, &AppointmentStatus::NoShow).is_err());

    // Confirmed appointments resolve to completed, cancelled, or no-show
    assert!(service.validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::Completed).is_ok());
    assert!(service.validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::Cancelled).is_ok());
    assert!(service.validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::NoShow).is_ok());
    assert!(service.validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::Pending).is_err());

    // Terminal states only age into the archive
    for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled, AppointmentStatus::NoShow] {
        assert_eq!(service.get_valid_transitions(&terminal), vec![AppointmentStatus::Archived]);
    }

    // Archived rows never move again
    assert!(service.get_valid_transitions(&AppointmentStatus::Archived).is_empty());
}

#[tokio::test]
async fn test_update_status_rejects_invalid_transition() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let appointment_id = Uuid::new_v4();
    let mut row = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), "2030-05-06T10:00:00Z", "completed",
    );
    row["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let service = AppointmentLifecycleService::new(&config);
    let result = service.update_status(appointment_id, AppointmentStatus::Cancelled, "test-token").await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed)));
}

#[tokio::test]
async fn test_update_status_detects_lost_race() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let appointment_id = Uuid::new_v4();
    let mut row = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), "2030-05-06T10:00:00Z", "pending",
    );
    row["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    // Another writer moved the row between the read and the patch, so
    // the status-filtered patch matches nothing
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = AppointmentLifecycleService::new(&config);
    let result = service.update_status(appointment_id, AppointmentStatus::Confirmed, "test-token").await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Pending)));
}

#[tokio::test]
async fn test_complete_via_record_transitions_confirmed() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let appointment_id = Uuid::new_v4();
    let student_id = Uuid::new_v4();
    let mut confirmed = MockSupabaseResponses::appointment_response(
        &student_id.to_string(), &Uuid::new_v4().to_string(), "2030-05-06T10:00:00Z", "confirmed",
    );
    confirmed["id"] = json!(appointment_id);
    let mut completed = confirmed.clone();
    completed["status"] = json!("completed");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::notification_response(&student_id.to_string())
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentLifecycleService::new(&config);
    let result = service.complete_via_record(appointment_id, "test-token").await;

    assert!(result.is_ok(), "Expected completion to succeed, but got error: {:?}", result.err());
    assert_eq!(result.unwrap().status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn test_should_mark_no_show() {
    let service = AppointmentLifecycleService::new(&create_test_config());
    let now = Utc::now();
    let grace = 15;

    // Confirmed, never checked in, grace elapsed
    assert!(service.should_mark_no_show(
        &AppointmentStatus::Confirmed, None, now - Duration::minutes(20), grace, now,
    ));

    // Still inside the grace window
    assert!(!service.should_mark_no_show(
        &AppointmentStatus::Confirmed, None, now - Duration::minutes(10), grace, now,
    ));

    // Checked in students are never no-shows
    assert!(!service.should_mark_no_show(
        &AppointmentStatus::Confirmed, Some(now - Duration::minutes(18)), now - Duration::minutes(20), grace, now,
    ));

    // Pending rows are skipped, the nurse never confirmed them
    assert!(!service.should_mark_no_show(
        &AppointmentStatus::Pending, None, now - Duration::minutes(20), grace, now,
    ));

    // Exactly at the boundary the row is still safe
    assert!(!service.should_mark_no_show(
        &AppointmentStatus::Confirmed, None, now - Duration::minutes(grace), grace, now,
    ));
}
