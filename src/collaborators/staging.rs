use super::{run_blocking, CommandOperation, PhaseContext, PhaseOperation};
use crate::error::CollaboratorError;
use crate::models::MonthKey;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Spreadsheet extensions published by the exchange
const RAW_EXTENSIONS: &[&str] = &["xls", "xlsx"];

/// Acquire collaborator: runs the downloader, then stages the month's raw
/// spreadsheets from its download tree into the phase output dir.
///
/// The downloader fetches whole archive pages, so files are picked by the
/// report code embedded in their names (e.g. `etf_m2506.xls`).
#[derive(Debug, Clone)]
pub struct StagedDownload {
    download: CommandOperation,
    source_dir: PathBuf,
}

impl StagedDownload {
    pub fn new(download: CommandOperation, source_dir: PathBuf) -> Self {
        Self {
            download,
            source_dir,
        }
    }
}

#[async_trait]
impl PhaseOperation for StagedDownload {
    fn describe(&self) -> String {
        format!(
            "{} (staging from {})",
            self.download.describe(),
            self.source_dir.display()
        )
    }

    async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
        self.download.run(ctx).await?;

        let month = ctx.month;
        let source_dir = self.source_dir.clone();
        let output_dir = ctx.output_dir.clone();
        run_blocking(move || stage_month_files(month, &source_dir, &output_dir)).await
    }
}

/// Copy every raw spreadsheet for `month` found under `source_dir` into
/// `output_dir`, one copy per file name
pub fn stage_month_files(
    month: MonthKey,
    source_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CollaboratorError> {
    let code = month.report_code();
    if !source_dir.is_dir() {
        return Err(CollaboratorError::MissingOutput(format!(
            "download directory '{}' does not exist",
            source_dir.display()
        )));
    }

    std::fs::create_dir_all(output_dir)?;

    let mut seen = HashSet::new();
    let mut staged = Vec::new();

    for entry in WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_raw_report(path, &code) {
            continue;
        }

        let file_name = entry.file_name().to_os_string();
        if !seen.insert(file_name.clone()) {
            tracing::debug!(file = %path.display(), "duplicate raw file name, keeping first copy");
            continue;
        }

        let dest = output_dir.join(&file_name);
        std::fs::copy(path, &dest)?;
        tracing::info!(file = %path.display(), "staged raw file");
        staged.push(dest);
    }

    if staged.is_empty() {
        return Err(CollaboratorError::MissingOutput(format!(
            "no raw files for {} (expected names containing '{}') under '{}'",
            month,
            code,
            source_dir.display()
        )));
    }

    staged.sort();
    Ok(staged)
}

fn is_raw_report(path: &Path, code: &str) -> bool {
    let is_spreadsheet = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RAW_EXTENSIONS.iter().any(|r| ext.eq_ignore_ascii_case(r)));

    is_spreadsheet
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.to_lowercase().contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn month() -> MonthKey {
        MonthKey::parse("2025-06").unwrap()
    }

    #[test]
    fn test_stages_matching_files_only() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("JPX_Monthly_Reports");
        let june = source.join("2025").join("06_June");
        let may = source.join("2025").join("05_May");
        std::fs::create_dir_all(&june).unwrap();
        std::fs::create_dir_all(&may).unwrap();
        std::fs::write(june.join("etf_m2506.xls"), "etf").unwrap();
        std::fs::write(june.join("REIT_M2506.XLSX"), "reit").unwrap();
        std::fs::write(june.join("notes_m2506.txt"), "skip").unwrap();
        std::fs::write(may.join("etf_m2505.xls"), "may").unwrap();

        let out = temp.path().join("out");
        let staged = stage_month_files(month(), &source, &out).unwrap();
        let names: Vec<_> = staged
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["REIT_M2506.XLSX", "etf_m2506.xls"]);
        assert_eq!(std::fs::read_to_string(out.join("etf_m2506.xls")).unwrap(), "etf");
    }

    #[test]
    fn test_duplicate_names_staged_once() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        std::fs::create_dir_all(source.join("2025/06_June")).unwrap();
        std::fs::write(source.join("2025/etf_m2506.xls"), "a").unwrap();
        std::fs::write(source.join("2025/06_June/etf_m2506.xls"), "b").unwrap();

        let staged = stage_month_files(month(), &source, &temp.path().join("out")).unwrap();
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn test_no_match_is_missing_output() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("etf_m2505.xls"), "may").unwrap();

        let err = stage_month_files(month(), temp.path(), &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, CollaboratorError::MissingOutput(_)));
        assert!(err.to_string().contains("m2506"));
    }

    #[test]
    fn test_missing_source_dir() {
        let temp = TempDir::new().unwrap();
        let err = stage_month_files(month(), &temp.path().join("nope"), &temp.path().join("out"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
