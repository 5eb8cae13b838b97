pub mod day;
pub mod session;
pub mod snapshot;

pub use day::DayKey;
pub use session::{Session, SessionState};
pub use snapshot::{RecentActivity, Snapshot};
