pub mod sweeps;
pub mod worker;

pub use sweeps::LifecycleSweepService;
pub use worker::LifecycleWorker;
