use std::{env, time::Duration};

use anyhow::{Result, bail};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

/// Outbound text notifications. Implemented by [`Telegram`] and by fakes in
/// the job tests. Delivery is best-effort: callers log an `Err` and move on.
#[allow(async_fn_in_trait)]
pub trait Notify {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API notifier. When `TELEGRAM_BOT_TOKEN` or `TELEGRAM_CHAT_ID`
/// is missing from the environment the notifier stays disabled and sends are
/// silent no-ops.
#[derive(Debug, Clone)]
pub struct Telegram {
    client: Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl Telegram {
    pub fn from_env() -> Self {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN").ok();
        let chat_id = env::var("TELEGRAM_CHAT_ID").ok();

        if bot_token.is_some() && chat_id.is_some() {
            info!("telegram notifier enabled");
        } else {
            warn!("telegram notifier disabled - missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID");
        }

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| Client::new()),
            bot_token,
            chat_id,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

impl Notify for Telegram {
    async fn send(&self, text: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            debug!("notifier disabled, dropping message");
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("telegram sendMessage returned {}", resp.status());
        }
        Ok(())
    }
}
