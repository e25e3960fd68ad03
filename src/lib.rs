// jpx-monthly - Monthly ETF/REIT report pipeline orchestrator
// Drives each target month through acquire → transform → validate → package with resumable state

pub mod cli;
pub mod collaborators;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod state;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use error::{CollaboratorError, PipelineError, PipelineResult};
pub use models::{MonthKey, MonthState, PhaseKind, PhaseRecord, PipelineConfig, RunOutcome, RunSummary};
pub use orchestrator::{CancelToken, MonthPipeline, PhaseExecutor, PhaseOutcome, RetryPolicy, RunCoordinator};
pub use state::StateStore;
