use std::{fs, path::Path};

use tracing::warn;

/// Load the watchlist: a JSON array of CoinGecko coin ids, order preserved.
/// Read fresh on every job run. A missing or unparsable file yields an empty
/// list so the job evaluates zero coins instead of failing.
pub fn load(path: &Path) -> Vec<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => {
            warn!("watchlist {} missing; nothing to evaluate", path.display());
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(coins) => coins,
        Err(e) => {
            warn!(
                "watchlist {} unreadable ({}); nothing to evaluate",
                path.display(),
                e
            );
            Vec::new()
        }
    }
}
