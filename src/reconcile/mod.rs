pub mod aggregate;
pub mod backfill;
pub mod config;
pub mod machine;

pub use aggregate::{format_duration, format_time_of_day, summarize, DaySummary};
pub use backfill::{apply_backfill, needs_backfill};
pub use config::ReconcileConfig;
pub use machine::{close_active, phase, roll_over, step, Phase, RollOver, Transition, TransitionKind};
