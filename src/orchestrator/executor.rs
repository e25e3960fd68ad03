//! Phase executor: one external operation under a deadline and a bounded
//! retry loop.
//!
//! Attempts are counted in the state store, so a phase that already used two
//! of three attempts before a restart gets exactly one more. Transient
//! failures stay inside this module; callers only see the terminal outcome.

use super::CancelToken;
use crate::collaborators::{PhaseContext, PhaseOperation};
use crate::error::PipelineResult;
use crate::models::{PhaseKind, PhaseRecord};
use crate::state::StateStore;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry ceiling, per-attempt deadline and backoff for one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub ceiling: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Progressive wait after the given failed attempt; timeouts wait twice as long
    pub fn backoff_after(&self, attempt: u32, timed_out: bool) -> Duration {
        let wait = self.backoff.saturating_mul(attempt.max(1));
        if timed_out {
            wait.saturating_mul(2)
        } else {
            wait
        }
    }
}

/// Terminal result of running a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Operation succeeded and its artifacts passed verification
    Succeeded(Vec<PathBuf>),
    /// Retry ceiling exhausted or permanent failure; carries the last error
    Failed(String),
    /// Operator abort observed before the phase finished
    Cancelled,
}

/// Why a single attempt did not succeed
#[derive(Debug)]
enum AttemptFailure {
    /// Collaborator error, timeout, or missing/empty output: worth retrying
    Transient { reason: String, timed_out: bool },
    /// The collaborator reported a result another attempt would repeat
    Permanent(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseExecutor;

impl PhaseExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts
    /// `policy.ceiling`, or the run is cancelled.
    ///
    /// Every attempt start and every retried failure is persisted. The
    /// terminal record is left to the caller. Only state store errors are
    /// returned as `Err`.
    pub async fn run(
        &self,
        store: &mut StateStore,
        mut ctx: PhaseContext,
        operation: &dyn PhaseOperation,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> PipelineResult<PhaseOutcome> {
        let (month, phase) = (ctx.month, ctx.phase);
        let mut record = store
            .month(month)
            .map(|m| m.record_or_pending(phase))
            .unwrap_or_else(|| PhaseRecord::pending(phase));

        if record.is_succeeded() {
            return Ok(PhaseOutcome::Succeeded(record.artifact_paths));
        }

        loop {
            if record.attempts >= policy.ceiling {
                // Reruns report the recorded error unchanged
                let reason = record
                    .last_error
                    .clone()
                    .unwrap_or_else(|| format!("retry ceiling of {} reached", policy.ceiling));
                return Ok(PhaseOutcome::Failed(reason));
            }
            if cancel.is_cancelled() {
                return Ok(PhaseOutcome::Cancelled);
            }

            record = record.start_attempt();
            store.update(month, phase, record.clone())?;
            ctx.attempt = record.attempts;

            tracing::info!(
                attempt = record.attempts,
                ceiling = policy.ceiling,
                operation = %operation.describe(),
                "{} {} attempt {}/{}",
                phase.emoji(),
                phase,
                record.attempts,
                policy.ceiling
            );

            let failure = match self.attempt(&ctx, operation, policy).await {
                Ok(artifacts) => {
                    tracing::info!(artifacts = artifacts.len(), "✅ {} succeeded", phase);
                    return Ok(PhaseOutcome::Succeeded(artifacts));
                }
                Err(failure) => failure,
            };

            match failure {
                AttemptFailure::Permanent(reason) => {
                    tracing::error!(%reason, "❌ {} failed permanently", phase);
                    return Ok(PhaseOutcome::Failed(reason));
                }
                AttemptFailure::Transient { reason, timed_out } => {
                    tracing::warn!(attempt = record.attempts, %reason, "⚠️ {} attempt failed", phase);

                    if record.attempts >= policy.ceiling {
                        return Ok(PhaseOutcome::Failed(format!(
                            "all {} attempts failed; last error: {}",
                            policy.ceiling, reason
                        )));
                    }

                    record = record.attempt_failed(reason);
                    store.update(month, phase, record.clone())?;

                    let wait = policy.backoff_after(record.attempts, timed_out);
                    tracing::info!("⏳ waiting {:?} before retrying {}", wait, phase);
                    if !cancel.sleep(wait).await {
                        return Ok(PhaseOutcome::Cancelled);
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &PhaseContext,
        operation: &dyn PhaseOperation,
        policy: &RetryPolicy,
    ) -> Result<Vec<PathBuf>, AttemptFailure> {
        reset_output_dir(&ctx.output_dir).map_err(|e| AttemptFailure::Transient {
            reason: format!("could not prepare {}: {}", ctx.output_dir.display(), e),
            timed_out: false,
        })?;

        match tokio::time::timeout(policy.timeout, operation.execute(ctx)).await {
            Err(_) => Err(AttemptFailure::Transient {
                reason: format!("timed out after {:?}", policy.timeout),
                timed_out: true,
            }),
            Ok(Err(e)) if e.is_permanent() => Err(AttemptFailure::Permanent(e.to_string())),
            Ok(Err(e)) => Err(AttemptFailure::Transient {
                reason: e.to_string(),
                timed_out: false,
            }),
            Ok(Ok(artifacts)) => {
                verify_artifacts(ctx.phase, &artifacts).map_err(|reason| {
                    AttemptFailure::Transient {
                        reason: format!("malformed output: {}", reason),
                        timed_out: false,
                    }
                })?;
                Ok(artifacts)
            }
        }
    }
}

/// Start each attempt from an empty output dir so stale files from an
/// earlier attempt are never reported as artifacts
fn reset_output_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)
}

/// Reject "successful" results whose files are absent or empty
pub fn verify_artifacts(phase: PhaseKind, artifacts: &[PathBuf]) -> Result<(), String> {
    if phase.produces_files() && artifacts.is_empty() {
        return Err("no artifacts reported".to_string());
    }

    for path in artifacts {
        let metadata = std::fs::metadata(path)
            .map_err(|_| format!("artifact {} does not exist", path.display()))?;
        if !metadata.is_file() {
            return Err(format!("artifact {} is not a file", path.display()));
        }
        if metadata.len() == 0 {
            return Err(format!("artifact {} is empty", path.display()));
        }
    }
    Ok(())
}
