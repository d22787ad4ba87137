use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use medical_record_cell::services::MedicalRecordService;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

fn mock_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

#[tokio::test]
async fn test_archive_tags_old_records() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    // Already-archived rows must be excluded by the query itself
    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .and(query_param("record_type", "not.like.*_archived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": Uuid::new_v4(), "record_type": "consultation"},
            {"id": Uuid::new_v4(), "record_type": "vaccination"},
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = MedicalRecordService::new(&config);
    let cutoff = Utc::now() - Duration::days(365);
    let archived = service.archive_records_older_than(cutoff, "test-token").await;

    assert_eq!(archived.unwrap(), 2);
}

#[tokio::test]
async fn test_archive_keeps_sweeping_past_a_failed_row() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": Uuid::new_v4(), "record_type": "consultation"},
            {"id": Uuid::new_v4(), "record_type": "consultation"},
        ])))
        .mount(&mock_server)
        .await;

    // First patch blows up, the second row still gets archived
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/medical_records"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let service = MedicalRecordService::new(&config);
    let cutoff = Utc::now() - Duration::days(365);
    let archived = service.archive_records_older_than(cutoff, "test-token").await;

    assert_eq!(archived.unwrap(), 1);
}
