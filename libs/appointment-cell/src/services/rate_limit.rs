// libs/appointment-cell/src/services/rate_limit.rs
use deadpool_redis::{Config, Runtime, Pool};
use redis::AsyncCommands;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::AppointmentError;

/// Per-student booking throttle backed by a Redis counter with a TTL.
///
/// The limiter fails open: when Redis is missing or unreachable the
/// booking proceeds and the outage is logged.
pub struct BookingRateLimiter {
    pool: Option<Pool>,
    limit: u32,
    window_seconds: u64,
}

impl BookingRateLimiter {
    pub fn new(config: &AppConfig) -> Self {
        let pool = if config.is_redis_configured() {
            match Config::from_url(config.redis_url.clone()).create_pool(Some(Runtime::Tokio1)) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Failed to create Redis pool for booking rate limiter: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            pool,
            limit: config.booking_rate_limit,
            window_seconds: config.booking_rate_window_seconds,
        }
    }

    /// Count one booking attempt against the student's window.
    pub async fn check_and_count(&self, student_id: &str) -> Result<(), AppointmentError> {
        let pool = match &self.pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Booking rate limiter unavailable, allowing request: {}", e);
                return Ok(());
            }
        };

        let key = format!("rate:booking:{}", student_id);
        let count: u32 = match conn.incr(&key, 1).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Booking rate limiter INCR failed, allowing request: {}", e);
                return Ok(());
            }
        };

        // First hit in the window owns setting the expiry
        if count == 1 {
            if let Err(e) = conn.expire::<_, ()>(&key, self.window_seconds as i64).await {
                warn!("Failed to set rate limit expiry for {}: {}", key, e);
            }
        }

        if count > self.limit {
            debug!("Student {} exceeded booking rate limit ({} in window)", student_id, count);
            return Err(AppointmentError::RateLimited);
        }

        Ok(())
    }
}
