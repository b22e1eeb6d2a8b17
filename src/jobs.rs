use std::{collections::BTreeMap, path::Path};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::market::MarketData;
use crate::notify::Notify;
use crate::signal::{self, MIN_SAMPLES, SignalType, TrendSnapshot};
use crate::state::{AlertRecord, AlertStore};
use crate::watchlist;

/// Outcome of one daily evaluation run.
#[derive(Debug, Default)]
pub struct DailyReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub alerts_sent: usize,
    /// Latest close per evaluated coin, for the server price cache.
    pub prices: BTreeMap<String, f64>,
}

/// Outcome of one weekly digest run.
#[derive(Debug, Default)]
pub struct WeeklyReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub digest_sent: bool,
    pub prices: BTreeMap<String, f64>,
}

/// Fetch and classify one coin. Any failure or short history turns into a
/// logged skip so the rest of the watchlist still runs.
async fn evaluate_coin<M: MarketData>(
    market: &M,
    coin: &str,
    days: u32,
) -> Option<(TrendSnapshot, SignalType)> {
    let series = match market.daily_series(coin, days).await {
        Ok(series) => series,
        Err(e) => {
            warn!("{}: fetch failed ({:#}); skipping", coin, e);
            return None;
        }
    };
    if series.len() < MIN_SAMPLES {
        info!(
            "{}: only {} samples, need {}; skipping",
            coin,
            series.len(),
            MIN_SAMPLES
        );
        return None;
    }
    let snap = signal::analyze(&series)?;
    Some((snap, signal::classify(&snap)))
}

/// Daily evaluation: classify every watchlist coin, notify new
/// (date, signal-type) pairs once, persist the alert state once at the end.
/// Re-running within the same reference day is a no-op for unchanged signals.
pub async fn run_daily<M: MarketData, N: Notify>(
    market: &M,
    notifier: &N,
    store: &AlertStore,
    watchlist_path: &Path,
    today: NaiveDate,
    days: u32,
) -> DailyReport {
    let coins = watchlist::load(watchlist_path);
    let mut records = store.load();
    let mut report = DailyReport::default();

    for coin in &coins {
        let Some((snap, sig)) = evaluate_coin(market, coin, days).await else {
            report.skipped += 1;
            continue;
        };
        report.evaluated += 1;
        report.prices.insert(coin.clone(), snap.current_price);

        if sig == SignalType::None {
            continue;
        }
        let already_sent = records
            .get(coin)
            .is_some_and(|r| r.last_alert_date == today && r.last_signal_type == sig);
        if already_sent {
            continue;
        }

        let text = alert_message(coin, sig, &snap);
        if let Err(e) = notifier.send(&text).await {
            warn!("{}: notification failed ({:#})", coin, e);
        }
        // Delivery is best-effort; the record is written either way so one
        // bad send does not re-alert every run for the rest of the day.
        records.insert(
            coin.clone(),
            AlertRecord {
                last_alert_date: today,
                last_signal_type: sig,
            },
        );
        report.alerts_sent += 1;
    }

    if let Err(e) = store.save(&records) {
        warn!("failed to persist alert state: {:#}", e);
    }
    info!(
        "daily run: {} evaluated, {} skipped, {} alerts",
        report.evaluated, report.skipped, report.alerts_sent
    );
    report
}

/// Weekly digest: classify every watchlist coin and send one aggregate
/// message. No de-duplication; an empty watchlist sends nothing.
pub async fn run_weekly<M: MarketData, N: Notify>(
    market: &M,
    notifier: &N,
    watchlist_path: &Path,
    days: u32,
) -> WeeklyReport {
    let coins = watchlist::load(watchlist_path);
    let mut report = WeeklyReport::default();
    let mut blocks = Vec::new();

    for coin in &coins {
        let Some((snap, sig)) = evaluate_coin(market, coin, days).await else {
            report.skipped += 1;
            continue;
        };
        report.evaluated += 1;
        report.prices.insert(coin.clone(), snap.current_price);
        blocks.push(digest_block(coin, sig, &snap));
    }

    if coins.is_empty() {
        info!("weekly run: empty watchlist, no digest");
        return report;
    }

    let body = if blocks.is_empty() {
        "No watchlist coin had enough history to evaluate.".to_string()
    } else {
        blocks.join("\n\n")
    };
    let digest = format!("\u{1F4CB} Weekly watchlist digest\n\n{}", body);
    match notifier.send(&digest).await {
        Ok(()) => report.digest_sent = true,
        Err(e) => warn!("weekly digest failed to send ({:#})", e),
    }
    info!(
        "weekly run: {} evaluated, {} skipped, digest sent: {}",
        report.evaluated, report.skipped, report.digest_sent
    );
    report
}

fn alert_message(coin: &str, sig: SignalType, snap: &TrendSnapshot) -> String {
    let dd = snap.drawdown_pct.unwrap_or(0.0);
    let ext = snap.extension_pct.unwrap_or(0.0);
    match sig {
        SignalType::Accumulation => format!(
            "\u{1F7E2} {} accumulation zone\nPrice {:.2} sits {:.1}% below the 180-day high and {:.1}% under the 200-day average.",
            coin.to_uppercase(),
            snap.current_price,
            dd.abs(),
            ext.abs()
        ),
        SignalType::ProfitTaking => format!(
            "\u{1F534} {} profit-taking zone\nPrice {:.2} is {:.1}% above the 200-day average.",
            coin.to_uppercase(),
            snap.current_price,
            ext
        ),
        // Never alerted; present to keep the match exhaustive.
        SignalType::None => String::new(),
    }
}

fn digest_block(coin: &str, sig: SignalType, snap: &TrendSnapshot) -> String {
    let dd = snap
        .drawdown_pct
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "n/a".to_string());
    let ext = snap
        .extension_pct
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{} \u{2014} {}\nprice {:.2} | drawdown {} | extension {}",
        coin.to_uppercase(),
        sig.status_label(),
        snap.current_price,
        dd,
        ext
    )
}
