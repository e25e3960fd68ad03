use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One step in processing a month, strictly ordered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Fetch the raw spreadsheet(s) for the month
    Acquire,
    /// Convert raw files into canonical rows
    Transform,
    /// Check the canonical output
    Validate,
    /// Build the delivery archive and its metadata
    Package,
}

impl PhaseKind {
    /// Execution order. A phase runs only after every earlier phase succeeded.
    pub const ALL: [PhaseKind; 4] = [
        PhaseKind::Acquire,
        PhaseKind::Transform,
        PhaseKind::Validate,
        PhaseKind::Package,
    ];

    pub fn index(&self) -> usize {
        match self {
            PhaseKind::Acquire => 0,
            PhaseKind::Transform => 1,
            PhaseKind::Validate => 2,
            PhaseKind::Package => 3,
        }
    }

    pub fn next(&self) -> Option<PhaseKind> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhaseKind::Acquire => "acquire",
            PhaseKind::Transform => "transform",
            PhaseKind::Validate => "validate",
            PhaseKind::Package => "package",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            PhaseKind::Acquire => "📥",
            PhaseKind::Transform => "🔄",
            PhaseKind::Validate => "📋",
            PhaseKind::Package => "📦",
        }
    }

    /// Whether a successful run of this phase must leave files behind
    pub fn produces_files(&self) -> bool {
        !matches!(self, PhaseKind::Validate)
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a single phase
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl PhaseStatus {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in progress",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
        }
    }
}

/// Persisted progress of one phase for one month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseRecord {
    pub phase: PhaseKind,

    #[serde(default)]
    pub status: PhaseStatus,

    /// Attempts started so far, across process restarts
    #[serde(default)]
    pub attempts: u32,

    /// Summary of the most recent failure
    #[serde(default)]
    pub last_error: Option<String>,

    /// Files produced by the phase, in the order reported
    #[serde(default)]
    pub artifact_paths: Vec<PathBuf>,

    pub updated_at: DateTime<Utc>,
}

impl PhaseRecord {
    pub fn pending(phase: PhaseKind) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            attempts: 0,
            last_error: None,
            artifact_paths: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record that another attempt is starting
    pub fn start_attempt(&self) -> Self {
        Self {
            status: PhaseStatus::InProgress,
            attempts: self.attempts + 1,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Record a failed attempt that will be retried
    pub fn attempt_failed(&self, error: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::InProgress,
            last_error: Some(error.into()),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn succeeded(&self, artifacts: Vec<PathBuf>) -> Self {
        Self {
            status: PhaseStatus::Succeeded,
            last_error: None,
            artifact_paths: artifacts,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Failed,
            last_error: Some(error.into()),
            artifact_paths: Vec::new(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == PhaseStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert_eq!(PhaseKind::Acquire.next(), Some(PhaseKind::Transform));
        assert_eq!(PhaseKind::Validate.next(), Some(PhaseKind::Package));
        assert_eq!(PhaseKind::Package.next(), None);
        assert!(PhaseKind::Acquire < PhaseKind::Package);
        for (i, phase) in PhaseKind::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn test_only_validate_may_succeed_without_files() {
        assert!(PhaseKind::Acquire.produces_files());
        assert!(PhaseKind::Transform.produces_files());
        assert!(!PhaseKind::Validate.produces_files());
        assert!(PhaseKind::Package.produces_files());
    }

    #[test]
    fn test_record_transitions_keep_attempts() {
        let record = PhaseRecord::pending(PhaseKind::Acquire);
        let first = record.start_attempt();
        assert_eq!(first.status, PhaseStatus::InProgress);
        assert_eq!(first.attempts, 1);

        let retrying = first.attempt_failed("timeout").start_attempt();
        assert_eq!(retrying.attempts, 2);
        assert_eq!(retrying.last_error.as_deref(), Some("timeout"));

        let done = retrying.succeeded(vec![PathBuf::from("raw/etf_m2506.xls")]);
        assert!(done.is_succeeded());
        assert_eq!(done.attempts, 2);
        assert!(done.last_error.is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PhaseStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let json = serde_json::to_string(&PhaseKind::Transform).unwrap();
        assert_eq!(json, "\"transform\"");
    }
}
