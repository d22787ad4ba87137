pub mod availability;
pub mod assignment;

pub use availability::AvailabilityService;
pub use assignment::AssignmentService;
