use super::{MonthKey, PhaseKind, PhaseRecord, PhaseStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate status of a month
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn name(&self) -> &'static str {
        match self {
            OverallStatus::NotStarted => "not started",
            OverallStatus::InProgress => "in progress",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            OverallStatus::NotStarted => "⏳",
            OverallStatus::InProgress => "🔄",
            OverallStatus::Completed => "✅",
            OverallStatus::Failed => "❌",
        }
    }
}

/// Per-month progress across all phases
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthState {
    pub month: MonthKey,

    #[serde(default)]
    pub phases: BTreeMap<PhaseKind, PhaseRecord>,

    #[serde(default)]
    pub overall_status: OverallStatus,
}

/// Every known month, keyed and ordered by month
pub type RunState = BTreeMap<MonthKey, MonthState>;

impl MonthState {
    pub fn new(month: MonthKey) -> Self {
        Self {
            month,
            phases: BTreeMap::new(),
            overall_status: OverallStatus::NotStarted,
        }
    }

    pub fn record(&self, phase: PhaseKind) -> Option<&PhaseRecord> {
        self.phases.get(&phase)
    }

    /// Record for a phase, or a fresh pending one if it never ran
    pub fn record_or_pending(&self, phase: PhaseKind) -> PhaseRecord {
        self.phases
            .get(&phase)
            .cloned()
            .unwrap_or_else(|| PhaseRecord::pending(phase))
    }

    pub fn is_succeeded(&self, phase: PhaseKind) -> bool {
        self.record(phase).is_some_and(PhaseRecord::is_succeeded)
    }

    pub fn is_completed(&self) -> bool {
        self.overall_status == OverallStatus::Completed
    }

    /// First phase in execution order that has not succeeded
    pub fn next_pending_phase(&self) -> Option<PhaseKind> {
        PhaseKind::ALL
            .into_iter()
            .find(|phase| !self.is_succeeded(*phase))
    }

    /// The phase that failed, if the month is blocked on one
    pub fn failed_phase(&self) -> Option<&PhaseRecord> {
        self.phases
            .values()
            .find(|record| record.status == PhaseStatus::Failed)
    }

    /// Derive the overall status from the phase records
    pub fn recompute_overall(&mut self) {
        self.overall_status = self.derive_overall();
    }

    fn derive_overall(&self) -> OverallStatus {
        if PhaseKind::ALL.iter().all(|phase| self.is_succeeded(*phase)) {
            return OverallStatus::Completed;
        }

        let blocked = self.phases.values().any(|failed| {
            failed.status == PhaseStatus::Failed
                && !self
                    .phases
                    .values()
                    .any(|later| later.phase > failed.phase && later.is_succeeded())
        });
        if blocked {
            return OverallStatus::Failed;
        }

        let untouched = self
            .phases
            .values()
            .all(|r| r.status == PhaseStatus::Pending && r.attempts == 0);
        if untouched {
            OverallStatus::NotStarted
        } else {
            OverallStatus::InProgress
        }
    }
}
