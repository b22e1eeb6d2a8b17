use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Local;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

use crate::jobs;
use crate::market::{CoinGecko, MarketData};
use crate::notify::{Notify, Telegram};
use crate::sched::SchedStatus;
use crate::state::AlertStore;

/// Everything the handlers and the scheduler loops share.
#[derive(Clone)]
pub struct AppState {
    pub market: Arc<CoinGecko>,
    pub notifier: Arc<Telegram>,
    pub store: AlertStore,
    pub watchlist: PathBuf,
    pub days: u32,
    pub prices: Arc<RwLock<BTreeMap<String, f64>>>,
    pub sched: Arc<SchedStatus>,
}

impl AppState {
    pub async fn merge_prices(&self, fresh: &BTreeMap<String, f64>) {
        if fresh.is_empty() {
            return;
        }
        let mut cache = self.prices.write().await;
        for (coin, price) in fresh {
            cache.insert(coin.clone(), *price);
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/price/:coin", get(price_lookup))
        .route("/prices", get(cached_prices))
        .route("/run/daily", post(run_daily_now))
        .route("/run/weekly", post(run_weekly_now))
        .route("/notify/test", post(test_notification))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    info!("http surface listening on {}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home(State(state): State<AppState>) -> Json<serde_json::Value> {
    let next_daily = *state.sched.next_daily_fire.read().await;
    let last_daily = *state.sched.last_daily_run.read().await;
    let last_weekly = *state.sched.last_weekly_run.read().await;
    Json(json!({
        "status": "Crypto Watcher API running",
        "notifier_enabled": state.notifier.is_enabled(),
        "cached_prices": state.prices.read().await.len(),
        "next_daily_fire": next_daily.map(|t| t.to_rfc3339()),
        "last_daily_run": last_daily.map(|t| t.to_rfc3339()),
        "last_weekly_run": last_weekly.map(|t| t.to_rfc3339()),
        "timestamp": Local::now().to_rfc3339(),
    }))
}

/// On-demand single-coin lookup. The only path that surfaces a gateway
/// failure to the caller, as a structured error body.
async fn price_lookup(
    State(state): State<AppState>,
    Path(coin): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let coin = coin.to_lowercase();
    match state.market.current_price(&coin).await {
        Ok(Some(price)) => {
            state.prices.write().await.insert(coin.clone(), price);
            (
                StatusCode::OK,
                Json(json!({
                    "coin": coin,
                    "currency": state.market.vs(),
                    "price": price,
                })),
            )
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Coin not found" })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": format!("price lookup failed: {:#}", e) })),
        ),
    }
}

async fn cached_prices(State(state): State<AppState>) -> Json<BTreeMap<String, f64>> {
    Json(state.prices.read().await.clone())
}

/// Manual daily trigger; runs synchronously on the request path and leaves
/// the timers alone.
async fn run_daily_now(State(state): State<AppState>) -> Json<serde_json::Value> {
    let today = Local::now().date_naive();
    let report = jobs::run_daily(
        state.market.as_ref(),
        state.notifier.as_ref(),
        &state.store,
        &state.watchlist,
        today,
        state.days,
    )
    .await;
    state.merge_prices(&report.prices).await;
    Json(json!({
        "evaluated": report.evaluated,
        "skipped": report.skipped,
        "alerts_sent": report.alerts_sent,
    }))
}

async fn run_weekly_now(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = jobs::run_weekly(
        state.market.as_ref(),
        state.notifier.as_ref(),
        &state.watchlist,
        state.days,
    )
    .await;
    state.merge_prices(&report.prices).await;
    Json(json!({
        "evaluated": report.evaluated,
        "skipped": report.skipped,
        "digest_sent": report.digest_sent,
    }))
}

async fn test_notification(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state
        .notifier
        .send("\u{1F9EA} Crypto Watcher test notification")
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "enabled": state.notifier.is_enabled(),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": format!("{:#}", e) })),
        ),
    }
}
