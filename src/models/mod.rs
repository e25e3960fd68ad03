pub mod config;
pub mod month;
pub mod month_state;
pub mod phase;
pub mod summary;

pub use config::{PipelineConfig, DEFAULT_CONFIG_FILE, STATE_FILE_NAME};
pub use month::MonthKey;
pub use month_state::{MonthState, OverallStatus, RunState};
pub use phase::{PhaseKind, PhaseRecord, PhaseStatus};
pub use summary::{RunOutcome, RunSummary};
