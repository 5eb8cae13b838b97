pub mod config;
pub mod controller;
pub mod recovery;
pub mod scheduler;
pub mod status;

pub use config::EngineConfig;
pub use controller::{CycleOutcome, ReconciliationEngine};
pub use recovery::{recover, Recovery, RecoverySource};
pub use scheduler::Scheduler;
pub use status::{Diagnostics, EngineStatus};
