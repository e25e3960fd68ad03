use crate::models::{MonthState, OverallStatus, PhaseKind, PhaseStatus, PipelineConfig};
use crate::state::StateStore;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Show every known month with its progress
pub async fn run(config_path: &Path, json: bool) -> Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let store = StateStore::open(config.state_path())?;
    let report = store.status_report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!("{}", "No months processed yet".yellow());
        println!("   State file: {}", store.path().display());
        return Ok(());
    }

    println!("{}", "📋 Processing status".cyan().bold());
    println!("   State file: {}", store.path().display());
    println!();

    for month in &report {
        print_month(month);
    }

    let completed = report.iter().filter(|m| m.is_completed()).count();
    println!();
    println!("   {}/{} month(s) completed", completed, report.len());

    Ok(())
}

fn print_month(state: &MonthState) {
    let status = state.overall_status;
    let label = match status {
        OverallStatus::NotStarted => status.name().bright_black(),
        OverallStatus::InProgress => status.name().blue(),
        OverallStatus::Completed => status.name().green(),
        OverallStatus::Failed => status.name().red(),
    };
    println!("{} {}  {}", status.emoji(), state.month.to_string().bold(), label);

    if state.is_completed() {
        return;
    }

    let Some(record) = state
        .failed_phase()
        .cloned()
        .or_else(|| state.next_pending_phase().map(|p| state.record_or_pending(p)))
    else {
        return;
    };

    let phase_status = match record.status {
        PhaseStatus::Failed => record.status.name().red(),
        PhaseStatus::InProgress => record.status.name().yellow(),
        _ => record.status.name().normal(),
    };
    println!(
        "     {} {:<10} {}  attempts: {}",
        record.phase.emoji(),
        record.phase.to_string(),
        phase_status,
        record.attempts
    );
    if let Some(error) = &record.last_error {
        println!("     {} {}", "Last error:".bright_black(), error);
    }

    let done: Vec<&str> = PhaseKind::ALL
        .iter()
        .filter(|p| state.is_succeeded(**p))
        .map(|p| p.name())
        .collect();
    if !done.is_empty() {
        println!("     {} {}", "Done:".bright_black(), done.join(", "));
    }
}
