use std::sync::Arc;
use axum::extract::{Extension, State};
use chrono::Utc;
use uuid::Uuid;

use lifecycle_cell::handlers::get_lifecycle_status;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::test_utils::TestConfig;

fn create_test_user_extension(role: Role, id: &str) -> Extension<User> {
    Extension(User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", role)),
        role,
        metadata: None,
        created_at: Some(Utc::now()),
    })
}

#[tokio::test]
async fn test_admin_reads_effective_rules() {
    let mut config = TestConfig::default().to_app_config();
    config.archive_retention_months = Some(6);

    let result = get_lifecycle_status(
        State(Arc::new(config)),
        create_test_user_extension(Role::Admin, &Uuid::new_v4().to_string()),
    ).await;

    assert!(result.is_ok(), "Expected status read to succeed, but got error: {:?}", result.err());
    let response = result.unwrap().0;
    assert_eq!(response["success"], true);
    assert_eq!(response["no_show_grace_minutes"], 15);
    assert_eq!(response["retention_months"], 6);
    assert_eq!(response["sweep_interval_seconds"], 300);
}

#[tokio::test]
async fn test_lifecycle_status_rejects_non_admins() {
    for role in [Role::Student, Role::Nurse] {
        let config = TestConfig::default().to_app_config();

        let result = get_lifecycle_status(
            State(Arc::new(config)),
            create_test_user_extension(role, &Uuid::new_v4().to_string()),
        ).await;

        assert!(result.is_err());
        match result.unwrap_err() {
            AppError::Forbidden(msg) => assert!(msg.contains("Admin access required")),
            other => panic!("Expected Forbidden error, got {:?}", other),
        }
    }
}
