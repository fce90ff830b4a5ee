//! Remote per-video view counter clients.
//!
//! Two incompatible backend contracts live behind one tagged-variant client:
//!
//!   - `Atomic`: the backend performs the read-modify-write itself in a
//!     single transactional round trip.
//!   - `ReadThenSet`: a GET of the current count followed by a POST of
//!     count+1.  This has an inherent lost-update window against other
//!     increment sources; counters are approximate analytics, so the
//!     accepted bound is "undercount, at most one stray unit over" and no
//!     locking is added.  If the GET response cannot be parsed into a
//!     usable count, no POST is sent.
//!
//! Neither contract retries.  Callers are expected to log and drop failures.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// Which counter contract the configured backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterMode {
    Atomic,
    ReadThenSet,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("counter request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("counter endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("view count missing or unreadable in response")]
    UnreadableCount,
}

#[derive(Clone)]
pub struct CounterClient {
    client: reqwest::Client,
    base_url: String,
    mode: CounterMode,
}

impl CounterClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, mode: CounterMode) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mode,
        }
    }

    pub fn mode(&self) -> CounterMode {
        self.mode
    }

    /// Increment the counter for `video_id` once, under whichever contract
    /// is configured.  Returns the new count when the backend reports one.
    pub async fn increment(&self, video_id: i64) -> Result<i64, TelemetryError> {
        match self.mode {
            CounterMode::Atomic => self.transactional_increment(video_id).await,
            CounterMode::ReadThenSet => self.read_then_set(video_id).await,
        }
    }

    /// Atomic contract: one round trip, the backend guarantees the
    /// read-modify-write is atomic relative to concurrent writers.
    async fn transactional_increment(&self, video_id: i64) -> Result<i64, TelemetryError> {
        let resp = self
            .client
            .post(format!("{}/counters/increment", self.base_url))
            .query(&[("video_id", video_id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TelemetryError::Status(resp.status()));
        }
        let body: Value = resp.json().await?;
        let views = body
            .get("views")
            .and_then(Value::as_i64)
            .ok_or(TelemetryError::UnreadableCount)?;
        debug!("atomic increment video_id={} -> views={}", video_id, views);
        Ok(views)
    }

    /// Non-atomic contract: GET current count, POST count+1.  An unreadable
    /// count abandons the increment before anything is written.
    async fn read_then_set(&self, video_id: i64) -> Result<i64, TelemetryError> {
        let resp = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[("video_id", video_id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TelemetryError::Status(resp.status()));
        }
        let body: Value = resp.json().await?;
        let current = parse_views(&body, video_id).ok_or(TelemetryError::UnreadableCount)?;

        let next = current + 1;
        let resp = self
            .client
            .post(format!("{}/videos", self.base_url))
            .query(&[("video_id", video_id)])
            .json(&json!({ "action": "set", "views": next }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TelemetryError::Status(resp.status()));
        }
        debug!("read-then-set video_id={}: {} -> {}", video_id, current, next);
        Ok(next)
    }
}

/// Extract the current view count for `video_id` from any of the three
/// response shapes the backend is known to produce:
/// `{video:{views}}`, `{views}`, or `{videos:[{id,views}...]}`.
pub fn parse_views(body: &Value, video_id: i64) -> Option<i64> {
    if let Some(views) = body
        .get("video")
        .and_then(|v| v.get("views"))
        .and_then(Value::as_i64)
    {
        return Some(views);
    }
    if let Some(views) = body.get("views").and_then(Value::as_i64) {
        return Some(views);
    }
    if let Some(items) = body.get("videos").and_then(Value::as_array) {
        return items
            .iter()
            .find(|e| e.get("id").and_then(Value::as_i64) == Some(video_id))
            .and_then(|e| e.get("views"))
            .and_then(Value::as_i64);
    }
    None
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_views_wrapped_object() {
        let body = json!({ "video": { "views": 7 } });
        assert_eq!(parse_views(&body, 1), Some(7));
    }

    #[test]
    fn test_parse_views_bare_object() {
        let body = json!({ "views": 0 });
        assert_eq!(parse_views(&body, 1), Some(0));
    }

    #[test]
    fn test_parse_views_list_matches_id() {
        let body = json!({ "videos": [
            { "id": 1, "views": 3 },
            { "id": 2, "views": 9 }
        ]});
        assert_eq!(parse_views(&body, 2), Some(9));
        assert_eq!(parse_views(&body, 5), None);
    }

    #[test]
    fn test_parse_views_unreadable() {
        assert_eq!(parse_views(&json!({}), 1), None);
        assert_eq!(parse_views(&json!({ "views": "many" }), 1), None);
        assert_eq!(parse_views(&json!([1, 2, 3]), 1), None);
    }
}
