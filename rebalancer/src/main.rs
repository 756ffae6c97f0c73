//! CLI entry point for the detf rebalancer.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use detf_rebalancer::config::Config;
use detf_rebalancer::execution::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Index vault rebalancer: classify, size, batch and submit")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one rebalance cycle against a vault
    Run {
        /// Path to the vault state file
        state: PathBuf,

        /// Assemble the batch without submitting it
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,

        /// Write the assembled batch as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run one cycle per vault on the worker pool (no prompts)
    RunAll {
        /// Paths to vault state files
        #[arg(required = true)]
        states: Vec<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Show vault composition and classification
    Positions {
        state: PathBuf,
    },

    /// Compare realized composition against targets
    Reconcile {
        state: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            state,
            dry_run,
            force,
            out,
        } => {
            let opts = RunOptions {
                dry_run,
                force,
                out,
            };
            execution::run(&config, &state, &opts)
        }
        Command::RunAll { states, dry_run } => execution::run_all(&config, &states, dry_run),
        Command::Positions { state } => execution::show_positions(&config, &state),
        Command::Reconcile { state } => execution::run_reconcile(&config, &state),
    };

    if let Err(e) = result {
        match e.exit_code() {
            0 => eprintln!("{e}"),
            2 => eprintln!("\nSubmission reverted, vault unchanged: {e}"),
            _ => eprintln!("Error: {e}"),
        }
        process::exit(e.exit_code());
    }
}
