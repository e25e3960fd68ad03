use super::{run_blocking, PhaseContext, PhaseOperation};
use crate::error::CollaboratorError;
use crate::models::MonthKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Report file written into the Validate output dir
pub const REPORT_FILE_NAME: &str = "validation_report.json";

/// Result of checking one month's canonical output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub month: MonthKey,
    pub passed: bool,
    pub issues: Vec<String>,
    pub files: Vec<PathBuf>,
}

/// Built-in Validate collaborator for the canonical CSV output
///
/// Checks that a data file and a metadata file are present and that every
/// data file has the fixed column count and a minimum number of rows.
#[derive(Debug, Clone)]
pub struct CsvValidator {
    expected_columns: usize,
    min_rows: usize,
}

impl CsvValidator {
    pub fn new(expected_columns: usize, min_rows: usize) -> Self {
        Self {
            expected_columns,
            min_rows,
        }
    }

    /// Inspect the canonical files and list every problem found
    pub fn check(&self, month: MonthKey, inputs: &[PathBuf]) -> ValidationReport {
        let mut issues = Vec::new();

        let data_files: Vec<&PathBuf> = inputs.iter().filter(|p| is_csv_named(p, "DATA")).collect();
        let meta_files: Vec<&PathBuf> = inputs.iter().filter(|p| is_csv_named(p, "META")).collect();

        if data_files.is_empty() {
            issues.push("No data CSV files found".to_string());
        }
        if meta_files.is_empty() {
            issues.push("No metadata CSV files found".to_string());
        }

        for file in &data_files {
            if let Err(issue) = self.check_data_file(file) {
                issues.push(issue);
            }
        }

        ValidationReport {
            month,
            passed: issues.is_empty(),
            issues,
            files: inputs.to_vec(),
        }
    }

    fn check_data_file(&self, path: &Path) -> Result<(), String> {
        let name = path.display();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| format!("Could not read {}: {}", name, e))?;

        let mut rows = 0usize;
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| format!("Could not read {}: {}", name, e))?;
            if record.len() != self.expected_columns {
                return Err(format!(
                    "{} row {} has {} columns, expected {}",
                    name,
                    index + 1,
                    record.len(),
                    self.expected_columns
                ));
            }
            rows += 1;
        }

        if rows < self.min_rows {
            return Err(format!(
                "{} has only {} rows, expected at least {}",
                name, rows, self.min_rows
            ));
        }
        Ok(())
    }
}

/// CSV whose `_`-separated name carries `marker` as a whole token
fn is_csv_named(path: &Path, marker: &str) -> bool {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    is_csv
        && path
            .file_stem()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.split('_').any(|token| token.eq_ignore_ascii_case(marker)))
}

#[async_trait]
impl PhaseOperation for CsvValidator {
    fn describe(&self) -> String {
        format!(
            "built-in CSV validator ({} columns, >= {} rows)",
            self.expected_columns, self.min_rows
        )
    }

    async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
        let validator = self.clone();
        let month = ctx.month;
        let inputs = ctx.inputs.clone();
        let report_path = ctx.output_dir.join(REPORT_FILE_NAME);

        run_blocking(move || {
            let report = validator.check(month, &inputs);
            if let Some(parent) = report_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;

            if report.passed {
                Ok(vec![report_path])
            } else {
                Err(CollaboratorError::ValidationFailed(report.issues.join("; ")))
            }
        })
        .await
    }
}
