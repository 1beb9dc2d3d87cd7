// Pipeline composition: per-interval orchestration and the refresh scheduler.
pub mod orchestrator;
pub mod publisher;
pub mod scheduler;
pub mod timer;

pub use orchestrator::Orchestrator;
pub use publisher::{CycleUpdate, Publisher, WatchPublisher};
pub use scheduler::{RefreshHandle, RefreshScheduler};
pub use timer::{Timer, TokioTimer};
