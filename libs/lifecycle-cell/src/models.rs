use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use shared_config::AppConfig;

/// Minutes a confirmed appointment may run late before the sweep flips
/// it to no-show.
pub const DEFAULT_NO_SHOW_GRACE_MINUTES: i64 = 15;

/// Baked-in retention fallback. Admins override it per deployment via
/// `ARCHIVE_RETENTION_MONTHS`; the two values are deliberately separate
/// knobs.
pub const DEFAULT_RETENTION_MONTHS: u32 = 12;

/// Effective timing rules the sweeps run under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecycleRules {
    pub no_show_grace_minutes: i64,
    pub retention_months: u32,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            no_show_grace_minutes: DEFAULT_NO_SHOW_GRACE_MINUTES,
            retention_months: DEFAULT_RETENTION_MONTHS,
        }
    }
}

impl LifecycleRules {
    /// Resolve the rules for this deployment. The environment override
    /// wins; the constant is only the fallback.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            no_show_grace_minutes: DEFAULT_NO_SHOW_GRACE_MINUTES,
            retention_months: config
                .archive_retention_months
                .unwrap_or(DEFAULT_RETENTION_MONTHS),
        }
    }

    /// Everything at or before this instant is past retention.
    pub fn archive_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Months::new(self.retention_months)
    }
}

/// What one full sweep pass touched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub no_shows_marked: u32,
    pub reminders_sent: u32,
    pub appointments_archived: u32,
    pub records_archived: u32,
    pub notifications_deleted: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum LifecycleError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}
