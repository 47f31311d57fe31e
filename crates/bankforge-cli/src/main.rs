mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bankforge",
    version,
    about = "Checkpointed, resumable generator for synthetic bank data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the generation config YAML
    #[arg(short, long, default_value = "bankforge.yaml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate every stage, checkpointing each batch
    Run {
        /// Continue the most recent unfinished run
        #[arg(long, conflicts_with = "clear_history")]
        resume: bool,
        /// Mark every stage before this one completed and start here
        #[arg(long, value_name = "STAGE")]
        skip_to: Option<String>,
        /// Rows (or upstream keys) per batch; overrides the config
        #[arg(long)]
        batch_size: Option<usize>,
        /// Purge all checkpoint history before starting
        #[arg(long)]
        clear_history: bool,
    },
    /// Show run status and per-stage progress
    Status {
        /// Run to report on (default: most recently updated)
        #[arg(long)]
        run: Option<String>,
        /// List recent runs instead of one run's stages
        #[arg(long)]
        list: bool,
        /// Number of runs to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete checkpoint history; generated data is kept
    Clear {
        /// Every run
        #[arg(long, conflicts_with_all = ["run", "last"])]
        all: bool,
        /// One run by id
        #[arg(long, conflicts_with = "last")]
        run: Option<String>,
        /// Only the most recently updated run
        #[arg(long)]
        last: bool,
    },
    /// Print the resolved stage order and dependencies
    Stages,
    /// Validate config and registry and open both stores
    Check,
    /// Check generated data for missing fields and broken references
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            resume,
            skip_to,
            batch_size,
            clear_history,
        } => {
            let args = commands::run::RunArgs {
                resume,
                skip_to,
                batch_size,
                clear_history,
            };
            commands::run::execute(&cli.config, args).await
        }
        Commands::Status { run, list, limit } => {
            commands::status::execute(&cli.config, run.as_deref(), list, limit)
        }
        Commands::Clear { all, run, last } => {
            commands::clear::execute(&cli.config, all, run.as_deref(), last)
        }
        Commands::Stages => commands::stages::execute(&cli.config),
        Commands::Check => commands::check::execute(&cli.config),
        Commands::Validate => commands::validate::execute(&cli.config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
