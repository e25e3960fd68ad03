use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use jpx_monthly::models::DEFAULT_CONFIG_FILE;
use jpx_monthly::{PipelineError, Result};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jpx-monthly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Monthly ETF/REIT report pipeline orchestrator", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the target months (acquire → transform → validate → package)
    Run {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Process only this month (YYYY-MM) instead of the configured list
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Show per-month progress
    Status {
        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Forget a month's recorded progress so it is reprocessed
    Reset {
        /// Month to reset (YYYY-MM)
        month: String,

        /// Configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Write a starter configuration file
    Init {
        /// Configuration file to create
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to create tokio runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(run_async(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format!("Error: {:#}", e).red());
            e.downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Dispatch a command, returning the process exit code
async fn run_async(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run { config, month } => {
            let outcome = jpx_monthly::cli::run::run(&config, month.as_deref()).await?;
            return Ok(outcome.exit_code());
        }

        Commands::Status { config, json } => {
            jpx_monthly::cli::status::run(&config, json).await?;
        }

        Commands::Reset { month, config } => {
            jpx_monthly::cli::reset::run(&config, &month).await?;
        }

        Commands::Init { config, force } => {
            println!("{}", "🚀 Initializing jpx-monthly...".cyan());
            jpx_monthly::cli::init::run(&config, force).await?;
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "jpx-monthly", &mut io::stdout());
        }
    }

    Ok(0)
}
