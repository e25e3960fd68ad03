use super::MonthKey;
use serde::Serialize;
use std::time::Duration;

/// How a run ended, mapped onto distinct process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every month completed or was already complete
    Success,
    /// Some months completed, some failed
    Partial,
    /// No month completed
    TotalFailure,
    /// Operator abort stopped the run early
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::TotalFailure => 1,
            RunOutcome::Partial => 2,
            RunOutcome::Interrupted => 130,
        }
    }
}

/// Per-month classification of a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub completed: Vec<MonthKey>,
    pub failed: Vec<MonthKey>,
    pub skipped: Vec<MonthKey>,
    /// Months left untouched because the run was interrupted
    pub not_processed: Vec<MonthKey>,
    pub interrupted: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len() + self.not_processed.len()
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.interrupted {
            return RunOutcome::Interrupted;
        }
        let succeeded = self.completed.len() + self.skipped.len();
        match (succeeded, self.failed.len()) {
            (_, 0) => RunOutcome::Success,
            (0, _) => RunOutcome::TotalFailure,
            _ => RunOutcome::Partial,
        }
    }
}
