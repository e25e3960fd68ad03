use crate::models::PipelineConfig;
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Write a starter configuration file
pub async fn run(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!(
            "{}",
            format!("⚠️  {} already exists", config_path.display()).yellow()
        );
        println!("   Run with --force to overwrite");
        return Ok(());
    }

    let config = PipelineConfig::starter();
    config.save(config_path)?;

    println!("{}", format!("✅ Wrote {}", config_path.display()).green());
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!("   1. Edit target_months and the [acquire]/[transform] commands");
    println!("   2. Run: jpx-monthly run");
    println!("   3. Check progress: jpx-monthly status");

    Ok(())
}
