//! Fibra demonstration programs
//!
//! Small programs that drive the scheduler through its public API:
//! timer fan-out, cross-thread wakes, bounded admission and socket I/O.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fibra")]
#[command(about = "Demonstration programs for the fibra cooperative scheduler", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `fibra=trace` (defaults to RUST_LOG, then `info`)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn many tasks that sleep for the same delay, then print their index
    Timers {
        /// Number of tasks
        #[arg(short, long, default_value_t = 10_000)]
        tasks: usize,
        /// Sleep per task, in milliseconds
        #[arg(short, long, default_value_t = 2_000)]
        delay_ms: u64,
        /// Only print the summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Tasks report progress to an OS thread that wakes a blocked task
    Block {
        /// Number of simulated requests
        #[arg(short, long, default_value_t = 100)]
        requests: usize,
        /// Simulated request latency, in milliseconds
        #[arg(short, long, default_value_t = 50)]
        work_ms: u64,
    },

    /// Run task bodies through a TaskLimiter and report peak concurrency
    Limit {
        /// Maximum bodies running at once
        #[arg(short, long, default_value_t = 4)]
        limit: usize,
        /// Number of bodies
        #[arg(short, long, default_value_t = 20)]
        tasks: usize,
        /// Time each body holds its slot, in milliseconds
        #[arg(short, long, default_value_t = 25)]
        work_ms: u64,
    },

    /// Bounce a message between two tasks over a unix socket pair
    Ping {
        /// Round trips to perform
        #[arg(short, long, default_value_t = 5)]
        rounds: usize,
        /// Per-wait timeout, in milliseconds
        #[arg(short, long, default_value_t = 1_000)]
        timeout_ms: u64,
    },
}

fn init_logging(filter: Option<&str>) -> anyhow::Result<()> {
    let env_filter = match filter {
        Some(filter) => EnvFilter::try_new(filter)
            .with_context(|| format!("invalid log filter `{}`", filter))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref())?;

    match cli.command {
        Commands::Timers {
            tasks,
            delay_ms,
            quiet,
        } => commands::timers::execute(tasks, Duration::from_millis(delay_ms), quiet),
        Commands::Block { requests, work_ms } => {
            commands::block::execute(requests, Duration::from_millis(work_ms))
        }
        Commands::Limit {
            limit,
            tasks,
            work_ms,
        } => commands::limit::execute(limit, tasks, Duration::from_millis(work_ms)),
        Commands::Ping { rounds, timeout_ms } => {
            commands::ping::execute(rounds, Duration::from_millis(timeout_ms))
        }
    }
}
