use super::{CancelToken, PhaseExecutor, PhaseOutcome};
use crate::collaborators::{Collaborators, PhaseContext};
use crate::error::PipelineResult;
use crate::models::{MonthKey, MonthState, PhaseKind, PhaseStatus, PipelineConfig};
use crate::state::StateStore;
use std::path::PathBuf;
use tracing::Instrument;

/// Drives one month through Acquire → Transform → Validate → Package
pub struct MonthPipeline<'a> {
    config: &'a PipelineConfig,
    collaborators: &'a Collaborators,
    executor: PhaseExecutor,
}

impl<'a> MonthPipeline<'a> {
    pub fn new(config: &'a PipelineConfig, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            collaborators,
            executor: PhaseExecutor::new(),
        }
    }

    /// Advance `month` as far as possible and return its resulting state
    ///
    /// Succeeded phases are skipped, so calling this again after a crash or a
    /// failure resumes at the first unfinished phase. A failed phase stops the
    /// month; later phases are not attempted.
    pub async fn process(
        &self,
        store: &mut StateStore,
        month: MonthKey,
        cancel: &CancelToken,
    ) -> PipelineResult<MonthState> {
        store.ensure_month(month);

        for phase in PhaseKind::ALL {
            if store.month(month).is_some_and(|m| m.is_succeeded(phase)) {
                tracing::debug!(%month, %phase, "phase already succeeded, skipping");
                continue;
            }
            if cancel.is_cancelled() {
                tracing::warn!(%month, %phase, "run cancelled before phase");
                break;
            }

            let span = tracing::info_span!("phase", %month, phase = phase.name());
            let keep_going = self.run_phase(store, month, phase, cancel).instrument(span).await?;
            if !keep_going {
                break;
            }
        }

        Ok(store
            .month(month)
            .cloned()
            .unwrap_or_else(|| MonthState::new(month)))
    }

    /// Run one phase and persist its terminal record; false stops the month
    async fn run_phase(
        &self,
        store: &mut StateStore,
        month: MonthKey,
        phase: PhaseKind,
        cancel: &CancelToken,
    ) -> PipelineResult<bool> {
        let current = store
            .ensure_month(month)
            .record_or_pending(phase);

        if phase == PhaseKind::Validate && !self.config.validation_enabled {
            tracing::info!("⏭️ validation disabled, marking {} as succeeded", phase);
            store.update(month, phase, current.succeeded(Vec::new()))?;
            return Ok(true);
        }

        let ctx = PhaseContext::new(
            month,
            phase,
            self.inputs_for(store, month, phase),
            self.config.phase_output_dir(month, phase),
        );
        let policy = self.config.retry_policy(phase);
        let operation = self.collaborators.for_phase(phase);

        let outcome = self
            .executor
            .run(store, ctx, operation, &policy, cancel)
            .await?;

        // Executor may have persisted attempts; build on the stored record
        let latest = store
            .ensure_month(month)
            .record_or_pending(phase);

        match outcome {
            PhaseOutcome::Succeeded(artifacts) => {
                store.update(month, phase, latest.succeeded(artifacts))?;
                Ok(true)
            }
            PhaseOutcome::Failed(reason) => {
                tracing::error!(%reason, "❌ {} failed for {}", phase, month);
                let unchanged = latest.status == PhaseStatus::Failed
                    && latest.last_error.as_deref() == Some(reason.as_str());
                if !unchanged {
                    store.update(month, phase, latest.failed(reason))?;
                }
                Ok(false)
            }
            PhaseOutcome::Cancelled => {
                tracing::warn!("🛑 {} cancelled for {}", phase, month);
                Ok(false)
            }
        }
    }

    /// Artifacts of the prerequisite phase
    fn inputs_for(&self, store: &StateStore, month: MonthKey, phase: PhaseKind) -> Vec<PathBuf> {
        let source = match phase {
            PhaseKind::Acquire => return Vec::new(),
            PhaseKind::Transform => PhaseKind::Acquire,
            PhaseKind::Validate | PhaseKind::Package => PhaseKind::Transform,
        };
        store
            .month(month)
            .and_then(|m| m.record(source))
            .map(|r| r.artifact_paths.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PhaseOperation;
    use crate::error::CollaboratorError;
    use crate::models::OverallStatus;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Writes `<phase>.out` and remembers the inputs it was given
    #[derive(Default)]
    struct Recorder {
        seen_inputs: Mutex<Vec<Vec<PathBuf>>>,
        fail: bool,
    }

    #[async_trait]
    impl PhaseOperation for Recorder {
        fn describe(&self) -> String {
            "recorder".to_string()
        }

        async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
            self.seen_inputs.lock().unwrap().push(ctx.inputs.clone());
            if self.fail {
                return Err(CollaboratorError::MissingOutput("boom".into()));
            }
            let path = ctx.output_dir.join(format!("{}.out", ctx.phase));
            std::fs::write(&path, ctx.phase.name())?;
            Ok(vec![path])
        }
    }

    fn config(temp: &TempDir, validation_enabled: bool) -> PipelineConfig {
        let mut config = PipelineConfig::starter();
        config.output_base_dir = temp.path().join("out");
        config.validation_enabled = validation_enabled;
        config.acquire.retry.backoff_secs = Some(0);
        config.transform.retry.backoff_secs = Some(0);
        config.validate.retry.backoff_secs = Some(0);
        config.package.retry.backoff_secs = Some(0);
        config
    }

    fn collaborators(
        acquire: Arc<Recorder>,
        transform: Arc<Recorder>,
        validate: Arc<Recorder>,
        package: Arc<Recorder>,
    ) -> Collaborators {
        Collaborators {
            acquire,
            transform,
            validate,
            package,
        }
    }

    #[tokio::test]
    async fn test_artifacts_flow_between_phases() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let (a, t, v, p) = (
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
        );
        let collabs = collaborators(a.clone(), t.clone(), v.clone(), p.clone());
        let mut store = StateStore::open(config.state_path()).unwrap();
        let month = MonthKey::parse("2025-06").unwrap();

        let state = MonthPipeline::new(&config, &collabs)
            .process(&mut store, month, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(state.overall_status, OverallStatus::Completed);
        let acquire_out = config.phase_output_dir(month, PhaseKind::Acquire).join("acquire.out");
        let transform_out = config
            .phase_output_dir(month, PhaseKind::Transform)
            .join("transform.out");
        assert_eq!(t.seen_inputs.lock().unwrap()[0], vec![acquire_out]);
        assert_eq!(v.seen_inputs.lock().unwrap()[0], vec![transform_out.clone()]);
        assert_eq!(p.seen_inputs.lock().unwrap()[0], vec![transform_out]);
    }

    #[tokio::test]
    async fn test_validation_disabled_skips_collaborator() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, false);
        let v = Arc::new(Recorder::default());
        let collabs = collaborators(
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            v.clone(),
            Arc::new(Recorder::default()),
        );
        let mut store = StateStore::open(config.state_path()).unwrap();
        let month = MonthKey::parse("2025-06").unwrap();

        let state = MonthPipeline::new(&config, &collabs)
            .process(&mut store, month, &CancelToken::new())
            .await
            .unwrap();

        assert!(state.is_completed());
        assert!(v.seen_inputs.lock().unwrap().is_empty());
        let record = state.record(PhaseKind::Validate).unwrap();
        assert_eq!(record.status, PhaseStatus::Succeeded);
        assert!(record.artifact_paths.is_empty());
    }

    #[tokio::test]
    async fn test_failed_phase_stops_month() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let t = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let v = Arc::new(Recorder::default());
        let collabs = collaborators(
            Arc::new(Recorder::default()),
            t.clone(),
            v.clone(),
            Arc::new(Recorder::default()),
        );
        let mut store = StateStore::open(config.state_path()).unwrap();
        let month = MonthKey::parse("2025-06").unwrap();

        let state = MonthPipeline::new(&config, &collabs)
            .process(&mut store, month, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(state.overall_status, OverallStatus::Failed);
        let record = state.record(PhaseKind::Transform).unwrap();
        assert_eq!(record.status, PhaseStatus::Failed);
        assert_eq!(record.attempts, config.retry_policy(PhaseKind::Transform).ceiling);
        assert_eq!(t.seen_inputs.lock().unwrap().len() as u32, record.attempts);
        assert!(v.seen_inputs.lock().unwrap().is_empty());
        assert!(state.record(PhaseKind::Validate).is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let a = Arc::new(Recorder::default());
        let collabs = collaborators(
            a.clone(),
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
        );
        let mut store = StateStore::open(config.state_path()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let state = MonthPipeline::new(&config, &collabs)
            .process(&mut store, MonthKey::parse("2025-06").unwrap(), &cancel)
            .await
            .unwrap();

        assert_eq!(state.overall_status, OverallStatus::NotStarted);
        assert!(a.seen_inputs.lock().unwrap().is_empty());
    }
}
