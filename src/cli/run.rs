use crate::collaborators::Collaborators;
use crate::models::{MonthKey, PipelineConfig, RunOutcome, RunSummary};
use crate::orchestrator::{CancelToken, RunCoordinator};
use crate::state::StateStore;
use crate::{Context, Result};
use colored::Colorize;
use std::path::Path;

/// Process every target month and report the outcome
pub async fn run(config_path: &Path, month: Option<&str>) -> Result<RunOutcome> {
    let config = PipelineConfig::load(config_path)?;
    let months = config.resolve_targets(month)?;
    let collaborators = Collaborators::from_config(&config)?;

    std::fs::create_dir_all(&config.output_base_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_base_dir.display()
        )
    })?;
    let mut store = StateStore::open(config.state_path())?;

    println!(
        "{}",
        format!("🚀 Processing {} month(s): {}", months.len(), join(&months)).cyan()
    );
    println!("   Output: {}", config.output_base_dir.display());
    if !config.validation_enabled {
        println!("   {}", "Validation disabled".bright_black());
    }
    println!();

    let cancel = CancelToken::new();
    cancel.cancel_on_ctrl_c();

    let summary = RunCoordinator::new(&config, &collaborators)
        .run_all(&mut store, &months, &cancel)
        .await?;

    print_summary(&summary, &store);
    Ok(summary.outcome())
}

fn print_summary(summary: &RunSummary, store: &StateStore) {
    println!();
    println!("{}", "📊 Run summary".cyan().bold());
    println!("   Elapsed:   {:.1}s", summary.elapsed.as_secs_f64());

    if !summary.completed.is_empty() {
        println!("   {} {}", "Completed:".green(), join(&summary.completed));
    }
    if !summary.skipped.is_empty() {
        println!("   {} {}", "Skipped:".bright_black(), join(&summary.skipped));
    }
    if !summary.failed.is_empty() {
        println!("   {} {}", "Failed:".red(), join(&summary.failed));
        for month in &summary.failed {
            if let Some(record) = store.month(*month).and_then(|m| m.failed_phase()) {
                println!(
                    "      {} {} after {} attempt(s): {}",
                    month,
                    record.phase,
                    record.attempts,
                    record.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    if !summary.not_processed.is_empty() {
        println!("   {} {}", "Not processed:".yellow(), join(&summary.not_processed));
    }
    println!();

    let line = match summary.outcome() {
        RunOutcome::Success => "✅ All months completed".green().bold(),
        RunOutcome::Partial => "⚠️  Some months failed".yellow().bold(),
        RunOutcome::TotalFailure => "❌ No month completed".red().bold(),
        RunOutcome::Interrupted => "🛑 Run interrupted; rerun to resume".yellow().bold(),
    };
    println!("{}", line);
}

fn join(months: &[MonthKey]) -> String {
    months
        .iter()
        .map(MonthKey::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
