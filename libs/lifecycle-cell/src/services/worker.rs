use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{LifecycleRules, SweepReport};
use crate::services::sweeps::LifecycleSweepService;

/// Periodic driver for the sweeps. One instance is spawned at startup
/// and ticks until shutdown.
pub struct LifecycleWorker {
    app_config: Arc<AppConfig>,
    sweeps: LifecycleSweepService,
    sweep_gate: tokio::sync::Mutex<()>,
    is_shutdown: tokio::sync::RwLock<bool>,
}

impl LifecycleWorker {
    pub fn new(app_config: Arc<AppConfig>) -> Self {
        let rules = LifecycleRules::from_config(&app_config);
        Self {
            sweeps: LifecycleSweepService::new(&app_config, rules),
            app_config,
            sweep_gate: tokio::sync::Mutex::new(()),
            is_shutdown: tokio::sync::RwLock::new(false),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        let rules = self.sweeps.rules();
        info!(
            "Starting lifecycle worker: every {}s, {}min no-show grace, {} month retention",
            self.app_config.sweep_interval_seconds,
            rules.no_show_grace_minutes,
            rules.retention_months,
        );

        let mut ticker = interval(Duration::from_secs(self.app_config.sweep_interval_seconds));
        // A slow sweep delays the next tick instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if *self.is_shutdown.read().await {
                break;
            }

            self.run_once().await;
        }

        debug!("Lifecycle worker stopped");
    }

    /// One sweep pass. Returns `None` when a previous pass is still
    /// running; ticks never overlap.
    pub async fn run_once(&self) -> Option<SweepReport> {
        let _gate = match self.sweep_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                warn!("Previous sweep is still running, skipping this tick");
                return None;
            }
        };

        let started = Instant::now();
        // Sweeps run under the service identity, not a user session
        let auth_token = self.app_config.supabase_anon_key.clone();

        let report = self.sweeps.run_all(Utc::now(), &auth_token).await;

        info!(
            "Sweep finished in {}ms: {} no-shows, {} reminders, {} appointments archived, {} records archived, {} notifications purged",
            started.elapsed().as_millis(),
            report.no_shows_marked,
            report.reminders_sent,
            report.appointments_archived,
            report.records_archived,
            report.notifications_deleted,
        );

        Some(report)
    }

    pub async fn shutdown(&self) {
        info!("Stopping lifecycle worker");
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
