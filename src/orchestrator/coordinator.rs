use super::{CancelToken, MonthPipeline};
use crate::collaborators::Collaborators;
use crate::error::PipelineResult;
use crate::models::{MonthKey, OverallStatus, PipelineConfig, RunSummary};
use crate::state::StateStore;
use std::time::Instant;
use tracing::Instrument;

/// Runs the month pipeline over every target month, one month at a time
pub struct RunCoordinator<'a> {
    config: &'a PipelineConfig,
    pipeline: MonthPipeline<'a>,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(config: &'a PipelineConfig, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            pipeline: MonthPipeline::new(config, collaborators),
        }
    }

    /// Process `months` in order and classify each one
    ///
    /// Completed months are skipped without touching the pipeline. A month
    /// that fails does not stop the others; only a state store error aborts
    /// the run.
    pub async fn run_all(
        &self,
        store: &mut StateStore,
        months: &[MonthKey],
        cancel: &CancelToken,
    ) -> PipelineResult<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut ran_previous = false;

        for (index, &month) in months.iter().enumerate() {
            if store.month(month).is_some_and(|m| m.is_completed()) {
                tracing::info!(%month, "⏭️ already completed, skipping");
                summary.skipped.push(month);
                continue;
            }

            if ran_previous && !cancel.sleep(self.config.month_pause()).await {
                tracing::debug!("pause between months interrupted");
            }
            if cancel.is_cancelled() {
                summary.not_processed.extend_from_slice(&months[index..]);
                summary.interrupted = true;
                break;
            }

            tracing::info!(%month, "📅 processing month");
            let span = tracing::info_span!("month", %month);
            let state = self
                .pipeline
                .process(store, month, cancel)
                .instrument(span)
                .await?;
            ran_previous = true;

            match state.overall_status {
                OverallStatus::Completed => {
                    tracing::info!(%month, "✅ month completed");
                    summary.completed.push(month);
                }
                OverallStatus::Failed => {
                    tracing::error!(%month, "❌ month failed");
                    summary.failed.push(month);
                }
                // Pipeline only returns early without a verdict when cancelled
                OverallStatus::NotStarted | OverallStatus::InProgress => {
                    summary.not_processed.extend_from_slice(&months[index..]);
                    summary.interrupted = true;
                    break;
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            not_processed = summary.not_processed.len(),
            elapsed = ?summary.elapsed,
            "run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{PhaseContext, PhaseOperation};
    use crate::error::CollaboratorError;
    use crate::models::RunOutcome;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Succeeds for every month except `fail_month`
    struct Selective {
        fail_month: Option<MonthKey>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PhaseOperation for Selective {
        fn describe(&self) -> String {
            "selective".to_string()
        }

        async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(ctx.month) == self.fail_month {
                return Err(CollaboratorError::MissingOutput("no report published".into()));
            }
            let path = ctx.output_dir.join("file.out");
            std::fs::write(&path, "x")?;
            Ok(vec![path])
        }
    }

    fn setup(temp: &TempDir, fail_month: Option<&str>) -> (PipelineConfig, Collaborators, Arc<Selective>) {
        let mut config = PipelineConfig::starter();
        config.output_base_dir = temp.path().join("out");
        config.month_pause_secs = 0;
        config.acquire.retry.backoff_secs = Some(0);
        let op = Arc::new(Selective {
            fail_month: fail_month.map(|m| MonthKey::parse(m).unwrap()),
            calls: AtomicU32::new(0),
        });
        let collaborators = Collaborators {
            acquire: op.clone(),
            transform: op.clone(),
            validate: op.clone(),
            package: op.clone(),
        };
        (config, collaborators, op)
    }

    fn months(list: &[&str]) -> Vec<MonthKey> {
        list.iter().map(|m| MonthKey::parse(m).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_month() {
        let temp = TempDir::new().unwrap();
        let (config, collaborators, _) = setup(&temp, Some("2025-05"));
        let mut store = StateStore::open(config.state_path()).unwrap();

        let summary = RunCoordinator::new(&config, &collaborators)
            .run_all(&mut store, &months(&["2025-05", "2025-06"]), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(summary.failed, months(&["2025-05"]));
        assert_eq!(summary.completed, months(&["2025-06"]));
        assert_eq!(summary.outcome(), RunOutcome::Partial);
    }

    #[tokio::test]
    async fn test_completed_months_are_skipped() {
        let temp = TempDir::new().unwrap();
        let (config, collaborators, op) = setup(&temp, None);
        let mut store = StateStore::open(config.state_path()).unwrap();
        let coordinator = RunCoordinator::new(&config, &collaborators);
        let targets = months(&["2025-06"]);

        coordinator
            .run_all(&mut store, &targets, &CancelToken::new())
            .await
            .unwrap();
        let calls = op.calls.load(Ordering::SeqCst);

        let summary = coordinator
            .run_all(&mut store, &targets, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.skipped, targets);
        assert_eq!(op.calls.load(Ordering::SeqCst), calls);
        assert_eq!(summary.outcome(), RunOutcome::Success);
    }

    #[tokio::test]
    async fn test_cancelled_run_lists_remaining_months() {
        let temp = TempDir::new().unwrap();
        let (config, collaborators, op) = setup(&temp, None);
        let mut store = StateStore::open(config.state_path()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let targets = months(&["2025-05", "2025-06"]);
        let summary = RunCoordinator::new(&config, &collaborators)
            .run_all(&mut store, &targets, &cancel)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.not_processed, targets);
        assert_eq!(summary.outcome(), RunOutcome::Interrupted);
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }
}
