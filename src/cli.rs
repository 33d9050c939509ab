use clap::{Parser, Subcommand};

use crate::config::Config;
use std::path::PathBuf;

/// Command-line interface for the SEO signal watcher.
/// Exit codes: 0=success, 1=startup failure (no targets or unreachable store)
#[derive(Parser, Debug)]
#[command(name = "seowatch")]
#[command(about = "Watch pages and tracked links for SEO signal changes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduled watcher over the configured targets.
    Watch {
        #[arg(long, help = "CSV file with source,target link pairs to track")]
        links: Option<PathBuf>,

        #[arg(long, help = "Text file with page URLs to track, one per line")]
        pages: Option<PathBuf>,

        #[arg(
            long,
            default_value = Config::DEFAULT_DB_NAME,
            help = "SQLite database file for observations and differences"
        )]
        db: PathBuf,

        #[arg(
            short,
            long,
            default_value_t = Config::DEFAULT_INTERVAL_MINS,
            help = "Minutes between ticks (minimum 1)"
        )]
        interval: u64,

        #[arg(
            short,
            long,
            default_value_t = Config::DEFAULT_MAX_WORKERS,
            help = "Concurrent targets processed per tick"
        )]
        workers: usize,

        #[arg(
            short,
            long,
            default_value_t = Config::DEFAULT_TIMEOUT_SECS,
            help = "Per-request timeout in seconds"
        )]
        timeout: u64,

        #[arg(
            short,
            long,
            default_value = Config::DEFAULT_USER_AGENT,
            help = "User agent string for requests and robots.txt checks"
        )]
        user_agent: String,

        #[arg(long, help = "Require http(s) URLs; reject anything else up front")]
        strict: bool,

        #[arg(long, default_value = "./logs", help = "Directory for log files")]
        log_dir: PathBuf,
    },

    /// Export stored tables to CSV and optionally prune them.
    Export {
        #[arg(
            long,
            default_value = Config::DEFAULT_DB_NAME,
            help = "SQLite database file to read"
        )]
        db: PathBuf,

        #[arg(long, help = "Write the observation table to this CSV file")]
        observations: Option<PathBuf>,

        #[arg(long, help = "Write the difference table to this CSV file")]
        differences: Option<PathBuf>,

        #[arg(
            long,
            help = "After export, delete all but the newest observation per subject"
        )]
        keep_latest: bool,

        #[arg(long, help = "After export, empty the differences table")]
        clear_differences: bool,
    },
}
