pub mod jobs;
pub mod market;
pub mod notify;
pub mod sched;
pub mod server;
pub mod signal;
pub mod state;
pub mod watchlist;

use clap::Parser;
use std::path::PathBuf;

/// CLI args
#[derive(Parser, Debug, Clone, Default)]
#[command(
    version,
    about = "CoinGecko watchlist monitor with accumulation/profit-taking alerts + weekly digest"
)]
pub struct ServeArgs {
    /// Bind address for the HTTP surface
    #[arg(long)]
    pub bind: Option<String>,

    /// Path to the watchlist JSON file (array of CoinGecko coin ids)
    #[arg(long)]
    pub watchlist: Option<PathBuf>,

    /// Path to the alert-state JSON file
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// VS currency for every quote (e.g., gbp, usd)
    #[arg(long)]
    pub vs: Option<String>,

    /// Daily history window to request per coin (days)
    #[arg(long)]
    pub days: Option<u32>,

    /// Daily evaluation time, local HH:MM
    #[arg(long)]
    pub daily_at: Option<String>,

    /// Weekly digest day (e.g., sun)
    #[arg(long)]
    pub weekly_day: Option<String>,

    /// Weekly digest hour, local 0-23
    #[arg(long)]
    pub weekly_hour: Option<u32>,
}

/// One-shot job run, shared by the `daily` and `weekly` subcommands.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct RunArgs {
    /// Path to the watchlist JSON file (array of CoinGecko coin ids)
    #[arg(long)]
    pub watchlist: Option<PathBuf>,

    /// Path to the alert-state JSON file (used by daily runs)
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// VS currency for every quote (e.g., gbp, usd)
    #[arg(long)]
    pub vs: Option<String>,

    /// Daily history window to request per coin (days)
    #[arg(long)]
    pub days: Option<u32>,
}
