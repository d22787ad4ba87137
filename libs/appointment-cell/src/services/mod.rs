pub mod booking;
pub mod lifecycle;
pub mod checkin;
pub mod slot_lock;
pub mod rate_limit;

pub use booking::BookingService;
pub use lifecycle::AppointmentLifecycleService;
pub use checkin::CheckInService;
pub use slot_lock::SlotLockService;
pub use rate_limit::BookingRateLimiter;
