use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use chrono::Weekday;
use clap::{Parser, Subcommand};
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use crypto_watcher::{
    RunArgs, ServeArgs, jobs,
    market::CoinGecko,
    notify::Telegram,
    sched::{self, SchedStatus},
    server::{self, AppState},
    state::AlertStore,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP surface plus both scheduler loops
    Serve(ServeArgs),
    /// Run the daily evaluation job once and exit
    Daily(RunArgs),
    /// Run the weekly digest job once and exit
    Weekly(RunArgs),
}

fn get_default_serve_args() -> ServeArgs {
    ServeArgs {
        bind: Some("0.0.0.0:8000".to_string()),
        watchlist: Some(PathBuf::from("./watchlist.json")),
        state_file: Some(PathBuf::from("./data/alert_state.json")),
        vs: Some("gbp".to_string()),
        days: Some(400),
        daily_at: Some("07:00".to_string()),
        weekly_day: Some("sun".to_string()),
        weekly_hour: Some(9),
    }
}

fn apply_serve_defaults(args: &mut ServeArgs) {
    if args.bind.is_none() {
        args.bind = Some("0.0.0.0:8000".to_string());
    }
    if args.watchlist.is_none() {
        args.watchlist = Some(PathBuf::from("./watchlist.json"));
    }
    if args.state_file.is_none() {
        args.state_file = Some(PathBuf::from("./data/alert_state.json"));
    }
    if args.vs.is_none() {
        args.vs = Some("gbp".to_string());
    }
    if args.days.is_none() {
        args.days = Some(400);
    }
    if args.daily_at.is_none() {
        args.daily_at = Some("07:00".to_string());
    }
    if args.weekly_day.is_none() {
        args.weekly_day = Some("sun".to_string());
    }
    if args.weekly_hour.is_none() {
        args.weekly_hour = Some(9);
    }
}

fn apply_run_defaults(args: &mut RunArgs) {
    if args.watchlist.is_none() {
        args.watchlist = Some(PathBuf::from("./watchlist.json"));
    }
    if args.state_file.is_none() {
        args.state_file = Some(PathBuf::from("./data/alert_state.json"));
    }
    if args.vs.is_none() {
        args.vs = Some("gbp".to_string());
    }
    if args.days.is_none() {
        args.days = Some(400);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    match args.command {
        Some(Command::Serve(mut serve_args)) => {
            apply_serve_defaults(&mut serve_args);
            serve(&serve_args).await?;
        }
        Some(Command::Daily(mut run_args)) => {
            apply_run_defaults(&mut run_args);
            daily_once(&run_args).await?;
        }
        Some(Command::Weekly(mut run_args)) => {
            apply_run_defaults(&mut run_args);
            weekly_once(&run_args).await?;
        }
        None => {
            println!("Running with default arguments...");
            let serve_args = get_default_serve_args();
            serve(&serve_args).await?;
        }
    }
    Ok(())
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let daily_at = sched::parse_hhmm(args.daily_at.as_ref().unwrap())
        .context("invalid --daily-at (expected HH:MM)")?;
    let weekly_day: Weekday = args
        .weekly_day
        .as_ref()
        .unwrap()
        .parse()
        .map_err(|_| anyhow!("invalid --weekly-day (expected e.g. sun)"))?;
    let weekly_hour = args.weekly_hour.unwrap();
    if weekly_hour > 23 {
        return Err(anyhow!("invalid --weekly-hour (expected 0-23)"));
    }

    let state = AppState {
        market: Arc::new(CoinGecko::new(args.vs.as_ref().unwrap())?),
        notifier: Arc::new(Telegram::from_env()),
        store: AlertStore::new(args.state_file.clone().unwrap()),
        watchlist: args.watchlist.clone().unwrap(),
        days: args.days.unwrap(),
        prices: Arc::new(RwLock::new(BTreeMap::new())),
        sched: Arc::new(SchedStatus::default()),
    };

    tokio::spawn(sched::daily_loop(state.clone(), daily_at));
    tokio::spawn(sched::weekly_loop(state.clone(), weekly_day, weekly_hour));

    server::serve(state, args.bind.as_ref().unwrap()).await
}

async fn daily_once(args: &RunArgs) -> Result<()> {
    let market = CoinGecko::new(args.vs.as_ref().unwrap())?;
    let notifier = Telegram::from_env();
    let store = AlertStore::new(args.state_file.clone().unwrap());
    let today = chrono::Local::now().date_naive();

    let report = jobs::run_daily(
        &market,
        &notifier,
        &store,
        args.watchlist.as_ref().unwrap(),
        today,
        args.days.unwrap(),
    )
    .await;
    println!(
        "daily run: {} evaluated, {} skipped, {} alerts sent",
        report.evaluated, report.skipped, report.alerts_sent
    );
    Ok(())
}

async fn weekly_once(args: &RunArgs) -> Result<()> {
    let market = CoinGecko::new(args.vs.as_ref().unwrap())?;
    let notifier = Telegram::from_env();

    let report = jobs::run_weekly(
        &market,
        &notifier,
        args.watchlist.as_ref().unwrap(),
        args.days.unwrap(),
    )
    .await;
    println!(
        "weekly run: {} evaluated, {} skipped, digest sent: {}",
        report.evaluated, report.skipped, report.digest_sent
    );
    Ok(())
}
