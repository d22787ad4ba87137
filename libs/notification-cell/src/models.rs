use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// An in-app notification row.
///
/// Rows past the retention window are hard-deleted by the lifecycle
/// sweep. Notifications have no archived state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub related_id: Option<Uuid>,
    pub related_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BookingRequested,
    StatusChanged,
    AppointmentReminder,
}

/// Input for the dispatcher. The row is persisted before any email
/// leaves the building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub related_id: Option<Uuid>,
    pub related_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListQuery {
    pub unread: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
