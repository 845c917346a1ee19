//! Bootmirror CLI - partition-local artifact cache daemon.
//!
//! `bootmirror run` starts the daemon: periodic sync cycles plus one HTTP
//! file server per enabled artifact kind. `bootmirror sync` runs a single
//! cycle and exits, which is handy for cron-less setups and for inspecting
//! the sync plan with `--dry-run`.

mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Parser)]
#[command(
    name = "bootmirror",
    version,
    about = "Caches OS images, PXE kernels and boot initrds close to the machines that boot them"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "BOOTMIRROR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG when set.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Write daily-rolling log files into this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Override the configured cache root path.
    #[arg(long, env = "BOOTMIRROR_CACHE_ROOT", global = true)]
    cache_root_path: Option<PathBuf>,

    /// Override the configured seconds between sync cycles.
    #[arg(long, global = true)]
    sync_interval_secs: Option<u64>,

    /// Compute and report plans without downloading or deleting anything.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cache daemon (default).
    Run,

    /// Run a single sync cycle and exit.
    Sync,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(&cli.log_level, cli.log_dir.as_deref());

    let mut config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "error reading config");
            return ExitCode::FAILURE;
        }
    };

    if let Some(cache_root_path) = cli.cache_root_path {
        config.cache_root_path = cache_root_path;
    }
    if let Some(sync_interval_secs) = cli.sync_interval_secs {
        config.sync_interval_secs = sync_interval_secs;
    }
    if cli.dry_run {
        config.dry_run = true;
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::execute(config),
        Commands::Sync => commands::sync::execute(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
