//! Pipeline orchestration
//!
//! - `PhaseExecutor`: one phase under a deadline and a persisted retry budget
//! - `MonthPipeline`: the ordered phases of a single month
//! - `RunCoordinator`: every target month, sequentially

mod cancel;
mod coordinator;
mod executor;
mod pipeline;

pub use cancel::CancelToken;
pub use coordinator::RunCoordinator;
pub use executor::{verify_artifacts, PhaseExecutor, PhaseOutcome, RetryPolicy};
pub use pipeline::MonthPipeline;
