//! Phase collaborators
//!
//! Each phase delegates its real work to a collaborator:
//! - Acquire: the exchange downloader (external command) plus staging of the
//!   month's spreadsheets
//! - Transform: the spreadsheet parser (external command)
//! - Validate: built-in CSV checks, or an external command
//! - Package: built-in tar.gz + manifest, or an external command
//!
//! The orchestrator only sees the `PhaseOperation` contract: given a context,
//! produce files in the output directory and report their paths.

mod command;
mod packager;
mod staging;
mod validator;

pub use command::CommandOperation;
pub use packager::{ArchivePackager, PackageManifest};
pub use staging::StagedDownload;
pub use validator::{CsvValidator, ValidationReport};

use crate::error::{CollaboratorError, PipelineResult};
use crate::models::{MonthKey, PhaseKind, PipelineConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inputs for one attempt of one phase
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub month: MonthKey,
    pub phase: PhaseKind,
    /// 1-based attempt number, counted across restarts
    pub attempt: u32,
    /// Artifacts of the prerequisite phase
    pub inputs: Vec<PathBuf>,
    /// Exclusive output directory for this (month, phase)
    pub output_dir: PathBuf,
}

impl PhaseContext {
    pub fn new(month: MonthKey, phase: PhaseKind, inputs: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            month,
            phase,
            attempt: 0,
            inputs,
            output_dir,
        }
    }

    /// Directory holding the inputs (the prerequisite phase's output dir)
    pub fn input_dir(&self) -> &Path {
        self.inputs
            .first()
            .and_then(|p| p.parent())
            .unwrap_or(self.output_dir.as_path())
    }
}

/// An external operation executed by the phase executor
#[async_trait]
pub trait PhaseOperation: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Perform one attempt, returning the produced files
    async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError>;
}

/// The four collaborators used by a run
#[derive(Clone)]
pub struct Collaborators {
    pub acquire: Arc<dyn PhaseOperation>,
    pub transform: Arc<dyn PhaseOperation>,
    pub validate: Arc<dyn PhaseOperation>,
    pub package: Arc<dyn PhaseOperation>,
}

impl Collaborators {
    /// Wire collaborators from configuration
    pub fn from_config(config: &PipelineConfig) -> PipelineResult<Self> {
        let download = CommandOperation::from_settings(&config.acquire.command)?;
        let acquire: Arc<dyn PhaseOperation> = match &config.acquire.stage_from {
            Some(source_dir) => Arc::new(StagedDownload::new(download, source_dir.clone())),
            None => Arc::new(download),
        };

        let transform = Arc::new(CommandOperation::from_settings(&config.transform.command)?);

        let validate: Arc<dyn PhaseOperation> = if config.validate.command.program.is_some() {
            Arc::new(CommandOperation::from_settings(&config.validate.command)?)
        } else {
            Arc::new(CsvValidator::new(
                config.validate.expected_columns,
                config.validate.min_rows,
            ))
        };

        let package: Arc<dyn PhaseOperation> = if config.package.command.program.is_some() {
            Arc::new(CommandOperation::from_settings(&config.package.command)?)
        } else {
            Arc::new(ArchivePackager::new(config.package.archive_prefix.clone()))
        };

        Ok(Self {
            acquire,
            transform,
            validate,
            package,
        })
    }

    pub fn for_phase(&self, phase: PhaseKind) -> &dyn PhaseOperation {
        match phase {
            PhaseKind::Acquire => self.acquire.as_ref(),
            PhaseKind::Transform => self.transform.as_ref(),
            PhaseKind::Validate => self.validate.as_ref(),
            PhaseKind::Package => self.package.as_ref(),
        }
    }
}

/// Run blocking file work off the async runtime so phase timeouts still apply
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, CollaboratorError>
where
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CollaboratorError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_dir_falls_back_to_output_dir() {
        let month = MonthKey::parse("2025-06").unwrap();
        let ctx = PhaseContext::new(month, PhaseKind::Acquire, Vec::new(), PathBuf::from("out/2025-06/acquire"));
        assert_eq!(ctx.input_dir(), Path::new("out/2025-06/acquire"));

        let ctx = PhaseContext::new(
            month,
            PhaseKind::Transform,
            vec![PathBuf::from("out/2025-06/acquire/etf_m2506.xls")],
            PathBuf::from("out/2025-06/transform"),
        );
        assert_eq!(ctx.input_dir(), Path::new("out/2025-06/acquire"));
    }

    #[test]
    fn test_from_config_uses_builtins_without_programs() {
        let config = PipelineConfig::starter();
        let collaborators = Collaborators::from_config(&config).unwrap();
        assert!(collaborators.for_phase(PhaseKind::Acquire).describe().contains("python3"));
        assert!(collaborators.for_phase(PhaseKind::Validate).describe().contains("85 columns"));
        assert!(collaborators.for_phase(PhaseKind::Package).describe().contains("JTMD"));
    }
}
