//! StateStore - processing_state.json persistence
//!
//! The store owns the only copy of the run state. Every mutation goes through
//! `update`/`reset_month`, which persist the whole state before returning.
//! Writes go to a sibling temp file that is fsynced and renamed over the
//! state file, so a crash leaves either the old or the new file on disk.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{MonthKey, MonthState, PhaseKind, PhaseRecord, RunState};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current on-disk schema version
const SCHEMA_VERSION: u32 = 1;

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    #[serde(default)]
    months: RunState,
}

/// Durable month → phase progress store
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: RunState,
}

impl StateStore {
    /// Load persisted state, or start empty when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let state = Self::load(&path)?;
        tracing::debug!(path = %path.display(), months = state.len(), "loaded processing state");
        Ok(Self { path, state })
    }

    fn load(path: &Path) -> PipelineResult<RunState> {
        if !path.exists() {
            return Ok(RunState::new());
        }

        let content = std::fs::read(path)?;
        let corrupt = |reason: String| PipelineError::StoreCorrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file: StateFile = serde_json::from_slice(&content).map_err(|e| corrupt(e.to_string()))?;
        if file.schema_version != SCHEMA_VERSION {
            return Err(corrupt(format!(
                "unsupported schema_version {}",
                file.schema_version
            )));
        }

        let mut state = file.months;
        for (key, month_state) in state.iter_mut() {
            if month_state.month != *key {
                return Err(corrupt(format!(
                    "entry '{}' describes month {}",
                    key, month_state.month
                )));
            }
            if let Some((phase, record)) = month_state
                .phases
                .iter()
                .find(|(phase, record)| record.phase != **phase)
            {
                return Err(corrupt(format!(
                    "{} record under '{}' is labelled {}",
                    key, phase, record.phase
                )));
            }
            month_state.recompute_overall();
        }

        Ok(state)
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state (read-only)
    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    pub fn month(&self, month: MonthKey) -> Option<&MonthState> {
        self.state.get(&month)
    }

    /// Create an in-memory NotStarted entry the first time a month is targeted
    pub fn ensure_month(&mut self, month: MonthKey) -> &MonthState {
        self.state
            .entry(month)
            .or_insert_with(|| MonthState::new(month))
    }

    /// Replace one phase record and persist the whole state
    ///
    /// On a failed write the in-memory change is rolled back, so memory never
    /// runs ahead of disk.
    pub fn update(
        &mut self,
        month: MonthKey,
        phase: PhaseKind,
        record: PhaseRecord,
    ) -> PipelineResult<&MonthState> {
        debug_assert_eq!(record.phase, phase);
        let previous = self.state.get(&month).cloned();

        let entry = self
            .state
            .entry(month)
            .or_insert_with(|| MonthState::new(month));
        entry.phases.insert(phase, record);
        entry.recompute_overall();

        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => {
                    self.state.insert(month, prev);
                }
                None => {
                    self.state.remove(&month);
                }
            }
            return Err(e);
        }

        Ok(&self.state[&month])
    }

    /// Forget everything recorded for a month so it is processed from scratch
    pub fn reset_month(&mut self, month: MonthKey) -> PipelineResult<bool> {
        let Some(previous) = self.state.remove(&month) else {
            return Ok(false);
        };

        if let Err(e) = self.persist() {
            self.state.insert(month, previous);
            return Err(e);
        }
        Ok(true)
    }

    /// Snapshot of every known month, ascending by month
    pub fn status_report(&self) -> Vec<MonthState> {
        self.state.values().cloned().collect()
    }

    fn persist(&self) -> PipelineResult<()> {
        let file = StateFile {
            schema_version: SCHEMA_VERSION,
            months: self.state.clone(),
        };
        let content = serde_json::to_vec_pretty(&file).map_err(|e| PipelineError::StoreWrite {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        write_atomic(&self.path, &content).map_err(|source| PipelineError::StoreWrite {
            path: self.path.clone(),
            source,
        })?;

        tracing::trace!(path = %self.path.display(), "processing state saved");
        Ok(())
    }
}

/// Write `content` to `path` via fsynced temp file + rename
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    std::fs::File::open(dir)?.sync_all()?;

    Ok(())
}
