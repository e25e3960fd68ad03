//! Run configuration (`jpx_config.toml`)
//!
//! Loaded once per run and treated as immutable afterwards. Every phase table
//! carries its own retry ceiling, timeout and backoff so network flakiness
//! and parser errors can be tuned independently.

use super::{MonthKey, PhaseKind};
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "jpx_config.toml";

/// State file name inside the output base directory
pub const STATE_FILE_NAME: &str = "processing_state.json";

// =============================================================================
// Phase Settings
// =============================================================================

/// Retry knobs shared by every phase table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum attempts before the phase is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_ceiling: Option<u32>,

    /// Deadline for a single attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Base wait between attempts (multiplied by the attempt number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_secs: Option<u64>,
}

/// External command that performs a phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Program to run. Validate and Package fall back to built-ins when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments; `{month}`, `{year}`, `{mm}`, `{code}`, `{input_dir}`,
    /// `{output_dir}` and `{inputs}` are substituted per attempt
    #[serde(default)]
    pub args: Vec<String>,

    /// Glob patterns (relative to the phase output dir) naming produced files
    #[serde(default)]
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquireSettings {
    #[serde(flatten)]
    pub retry: RetrySettings,

    #[serde(flatten)]
    pub command: CommandSettings,

    /// Directory the download command writes into. When set, the month's
    /// spreadsheets are located there and staged into the phase output dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_from: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformSettings {
    #[serde(flatten)]
    pub retry: RetrySettings,

    #[serde(flatten)]
    pub command: CommandSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSettings {
    #[serde(flatten)]
    pub retry: RetrySettings,

    #[serde(flatten)]
    pub command: CommandSettings,

    /// Fields expected in every canonical data row
    #[serde(default = "default_expected_columns")]
    pub expected_columns: usize,

    /// Minimum number of rows in a data file
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

fn default_expected_columns() -> usize {
    85
}

fn default_min_rows() -> usize {
    3
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            command: CommandSettings::default(),
            expected_columns: default_expected_columns(),
            min_rows: default_min_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSettings {
    #[serde(flatten)]
    pub retry: RetrySettings,

    #[serde(flatten)]
    pub command: CommandSettings,

    /// File name prefix of the delivery archive
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,
}

fn default_archive_prefix() -> String {
    "JTMD".to_string()
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            command: CommandSettings::default(),
            archive_prefix: default_archive_prefix(),
        }
    }
}

/// Built-in (ceiling, timeout secs, backoff secs) for each phase
fn phase_defaults(phase: PhaseKind) -> (u32, u64, u64) {
    match phase {
        PhaseKind::Acquire => (3, 1800, 30),
        PhaseKind::Transform => (2, 600, 30),
        PhaseKind::Validate => (1, 300, 5),
        PhaseKind::Package => (2, 300, 5),
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Months to process, in priority order (`YYYY-MM`)
    #[serde(default)]
    pub target_months: Vec<String>,

    /// Root of all per-month output and the state file
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: PathBuf,

    /// Run the Validate collaborator; when false the phase is a no-op
    #[serde(default)]
    pub validation_enabled: bool,

    /// Pause between months
    #[serde(default = "default_month_pause_secs")]
    pub month_pause_secs: u64,

    #[serde(default)]
    pub acquire: AcquireSettings,

    #[serde(default)]
    pub transform: TransformSettings,

    #[serde(default)]
    pub validate: ValidateSettings,

    #[serde(default)]
    pub package: PackageSettings,
}

fn default_output_base_dir() -> PathBuf {
    PathBuf::from("JPX_Processing_Output")
}

fn default_month_pause_secs() -> u64 {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_months: Vec::new(),
            output_base_dir: default_output_base_dir(),
            validation_enabled: false,
            month_pause_secs: default_month_pause_secs(),
            acquire: AcquireSettings::default(),
            transform: TransformSettings::default(),
            validate: ValidateSettings::default(),
            package: PackageSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Configuration written by `init`: drives the exchange downloader and
    /// the spreadsheet parser as external scripts
    pub fn starter() -> Self {
        Self {
            target_months: vec!["2025-06".to_string(), "2025-07".to_string()],
            acquire: AcquireSettings {
                retry: RetrySettings::default(),
                command: CommandSettings {
                    program: Some("python3".to_string()),
                    args: vec!["final.py".to_string()],
                    artifacts: Vec::new(),
                },
                stage_from: Some(PathBuf::from("JPX_Monthly_Reports")),
            },
            transform: TransformSettings {
                retry: RetrySettings::default(),
                command: CommandSettings {
                    program: Some("python3".to_string()),
                    args: vec![
                        "jtmd_scraper5.py".to_string(),
                        "--input".to_string(),
                        "{input_dir}".to_string(),
                        "--output".to_string(),
                        "{output_dir}".to_string(),
                    ],
                    artifacts: vec!["JTMD_DATA_*.csv".to_string(), "JTMD_META_*.csv".to_string()],
                },
            },
            ..Self::default()
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::ConfigInvalid(format!(
                "configuration file '{}' not found (run `jpx-monthly init` to create one)",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content).map_err(|e| {
            PipelineError::ConfigInvalid(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigInvalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would make a run meaningless before any phase starts
    pub fn validate(&self) -> PipelineResult<()> {
        self.months()?;

        for phase in PhaseKind::ALL {
            let retry = self.retry_settings(phase);
            if retry.retry_ceiling == Some(0) {
                return Err(PipelineError::ConfigInvalid(format!(
                    "[{}] retry_ceiling must be at least 1",
                    phase
                )));
            }
            if retry.timeout_secs == Some(0) {
                return Err(PipelineError::ConfigInvalid(format!(
                    "[{}] timeout_secs must be greater than 0",
                    phase
                )));
            }
        }

        for (phase, command) in [
            (PhaseKind::Acquire, &self.acquire.command),
            (PhaseKind::Transform, &self.transform.command),
        ] {
            if command.program.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(PipelineError::ConfigInvalid(format!(
                    "[{}] program is required",
                    phase
                )));
            }
        }

        if self.package.archive_prefix.trim().is_empty() {
            return Err(PipelineError::ConfigInvalid(
                "[package] archive_prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured months, parsed, with duplicates removed (first one wins)
    pub fn months(&self) -> PipelineResult<Vec<MonthKey>> {
        let mut months = Vec::with_capacity(self.target_months.len());
        for raw in &self.target_months {
            let month = MonthKey::parse(raw.trim())?;
            if !months.contains(&month) {
                months.push(month);
            }
        }
        Ok(months)
    }

    /// Months for this run: the single override, or the configured list
    pub fn resolve_targets(&self, month_override: Option<&str>) -> PipelineResult<Vec<MonthKey>> {
        let months = match month_override {
            Some(raw) => vec![MonthKey::parse(raw.trim())?],
            None => self.months()?,
        };
        if months.is_empty() {
            return Err(PipelineError::ConfigInvalid(
                "no target months configured".to_string(),
            ));
        }
        Ok(months)
    }

    pub fn retry_settings(&self, phase: PhaseKind) -> &RetrySettings {
        match phase {
            PhaseKind::Acquire => &self.acquire.retry,
            PhaseKind::Transform => &self.transform.retry,
            PhaseKind::Validate => &self.validate.retry,
            PhaseKind::Package => &self.package.retry,
        }
    }

    pub fn command_settings(&self, phase: PhaseKind) -> &CommandSettings {
        match phase {
            PhaseKind::Acquire => &self.acquire.command,
            PhaseKind::Transform => &self.transform.command,
            PhaseKind::Validate => &self.validate.command,
            PhaseKind::Package => &self.package.command,
        }
    }

    /// Effective retry policy for a phase
    pub fn retry_policy(&self, phase: PhaseKind) -> RetryPolicy {
        let (ceiling, timeout, backoff) = phase_defaults(phase);
        let settings = self.retry_settings(phase);
        RetryPolicy {
            ceiling: settings.retry_ceiling.unwrap_or(ceiling),
            timeout: Duration::from_secs(settings.timeout_secs.unwrap_or(timeout)),
            backoff: Duration::from_secs(settings.backoff_secs.unwrap_or(backoff)),
        }
    }

    pub fn month_pause(&self) -> Duration {
        Duration::from_secs(self.month_pause_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.output_base_dir.join(STATE_FILE_NAME)
    }

    /// Exclusive write target for one (month, phase) pair
    pub fn phase_output_dir(&self, month: MonthKey, phase: PhaseKind) -> PathBuf {
        self.output_base_dir
            .join(month.to_string())
            .join(phase.name())
    }
}
