use crate::models::{MonthKey, PipelineConfig};
use crate::state::StateStore;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Forget a month's recorded progress so the next run starts it from Acquire
///
/// Output files are left on disk; each phase clears its own directory before
/// running again.
pub async fn run(config_path: &Path, month: &str) -> Result<()> {
    let month = MonthKey::parse(month)?;
    let config = PipelineConfig::load(config_path)?;
    let mut store = StateStore::open(config.state_path())?;

    if store.reset_month(month)? {
        tracing::info!(%month, "month state reset");
        println!("{}", format!("🔄 Reset {}; it will be reprocessed on the next run", month).green());
    } else {
        println!("{}", format!("No recorded state for {}", month).yellow());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseKind, PhaseRecord};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reset_removes_month() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("jpx_config.toml");
        let mut config = PipelineConfig::starter();
        config.output_base_dir = temp.path().join("out");
        config.save(&config_path).unwrap();

        let june = MonthKey::parse("2025-06").unwrap();
        let july = MonthKey::parse("2025-07").unwrap();
        {
            let mut store = StateStore::open(config.state_path()).unwrap();
            let record = PhaseRecord::pending(PhaseKind::Acquire).start_attempt().failed("boom");
            store.update(june, PhaseKind::Acquire, record.clone()).unwrap();
            store.update(july, PhaseKind::Acquire, record).unwrap();
        }

        run(&config_path, "2025-06").await.unwrap();

        let store = StateStore::open(config.state_path()).unwrap();
        assert!(store.month(june).is_none());
        assert!(store.month(july).is_some());
    }

    #[tokio::test]
    async fn test_reset_rejects_malformed_month() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("jpx_config.toml");
        let mut config = PipelineConfig::starter();
        config.output_base_dir = temp.path().join("out");
        config.save(&config_path).unwrap();

        let err = run(&config_path, "June").await.unwrap_err();
        match err.downcast_ref::<crate::PipelineError>() {
            Some(crate::PipelineError::ConfigInvalid(message)) => {
                assert!(message.contains("'June' is not a month in YYYY-MM form"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!config.state_path().exists());
    }
}
