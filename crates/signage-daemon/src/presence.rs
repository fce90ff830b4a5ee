//! Presence reporter.
//!
//! Periodically tells the backend this display is online and when it was
//! last seen.  Pure fire-and-forget: a failed report is logged and the next
//! tick tries again.

use chrono::Utc;
use tracing::{debug, warn};

const REPORT_INTERVAL_SECS: u64 = 60;

/// ISO-8601 UTC timestamp with second precision, e.g. `2026-08-26T14:03:07Z`.
fn last_seen_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Spawn the reporter.  Callers skip this entirely for unregistered devices
/// (`tv_id <= 0`).
pub fn start_reporter(
    client: reqwest::Client,
    base_url: String,
    tv_id: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let base = base_url.trim_end_matches('/').to_string();
        let mut tick =
            tokio::time::interval(tokio::time::Duration::from_secs(REPORT_INTERVAL_SECS));
        loop {
            tick.tick().await;
            let body = serde_json::json!({
                "status_online": true,
                "last_seen": last_seen_timestamp(),
            });
            let result = client
                .post(format!("{}/tvs", base))
                .query(&[("tv_id", tv_id)])
                .json(&body)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!("presence reported for tv {}", tv_id);
                }
                Ok(resp) => warn!("presence report rejected: status {}", resp.status()),
                Err(e) => warn!("presence report failed: {}", e),
            }
        }
    })
}
