//! Remote video catalog client.
//!
//! The catalog endpoint is the single source of truth for what the kiosk
//! plays.  One `GET /videos` per fetch cycle, optionally constrained by a
//! `filter_code` query parameter.  The response is normalised from two
//! accepted envelopes (an object with a `videos` array, or a bare array)
//! and each element is decoded defensively: a single bad record is dropped,
//! it never fails the whole fetch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Declared orientation of a catalog video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    #[default]
    Unspecified,
}

impl Orientation {
    /// Parse a backend orientation string.  Empty, absent, and unrecognised
    /// values all normalise to `Unspecified` so the record stays playable
    /// under any selector.
    pub fn parse(raw: &str) -> Self {
        match clean_field(raw).to_ascii_lowercase().as_str() {
            "landscape" => Self::Landscape,
            "portrait" => Self::Portrait,
            _ => Self::Unspecified,
        }
    }
}

/// One validated catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Stable catalog key, always positive.
    pub id: i64,
    /// Backend-specific row identifier.  May be absent or equal the id.
    pub remote_key: Option<String>,
    /// Absolute http(s) URL of the playable media.
    pub url: String,
    pub orientation: Orientation,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected catalog response shape")]
    UnexpectedShape,
}

/// Outcome of one fetch cycle.  `ok` is false on transport failure or an
/// unrecognised envelope; individual invalid records do not clear it.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub records: Vec<VideoRecord>,
    pub ok: bool,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the catalog.  Never returns an error: any failure is logged and
    /// yields an empty, not-ok snapshot.  Retry policy, if any, belongs to
    /// the caller.
    pub async fn fetch(&self, filter_code: Option<u32>) -> CatalogSnapshot {
        match self.try_fetch(filter_code).await {
            Ok(records) => {
                debug!("catalog fetch ok: {} valid records", records.len());
                CatalogSnapshot { records, ok: true }
            }
            Err(e) => {
                warn!("catalog fetch failed: {}", e);
                CatalogSnapshot::default()
            }
        }
    }

    async fn try_fetch(&self, filter_code: Option<u32>) -> Result<Vec<VideoRecord>, CatalogError> {
        let mut req = self.client.get(format!("{}/videos", self.base_url));
        if let Some(code) = filter_code.filter(|c| *c > 0) {
            req = req.query(&[("filter_code", code)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(CatalogError::Status(resp.status()));
        }
        let body: Value = resp.json().await?;
        decode_catalog(&body).ok_or(CatalogError::UnexpectedShape)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Normalise a catalog response body into validated records.
/// Returns `None` when the envelope itself is unrecognised.
pub fn decode_catalog(body: &Value) -> Option<Vec<VideoRecord>> {
    let entries = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.get("videos")?.as_array()?,
        _ => return None,
    };
    Some(entries.iter().filter_map(decode_record).collect())
}

/// Decode a single catalog element.  Missing/malformed `url` or a
/// non-positive `id` drops this record only.
fn decode_record(entry: &Value) -> Option<VideoRecord> {
    let id = entry.get("id").and_then(Value::as_i64).unwrap_or(0);
    if id <= 0 {
        debug!("dropping catalog record with invalid id: {}", entry);
        return None;
    }

    let url = clean_field(entry.get("url")?.as_str()?);
    if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
        debug!("dropping catalog record {} with invalid url", id);
        return None;
    }

    let remote_key = entry
        .get("key")
        .and_then(Value::as_str)
        .map(clean_field)
        .filter(|k| !k.is_empty());

    let orientation = entry
        .get("orientation")
        .and_then(Value::as_str)
        .map(Orientation::parse)
        .unwrap_or_default();

    Some(VideoRecord {
        id,
        remote_key,
        url,
        orientation,
    })
}

/// Strip whitespace and stray backticks that occasionally leak into
/// copy-pasted backend fields.
fn clean_field(raw: &str) -> String {
    raw.trim().trim_matches('`').trim().to_string()
}

// ── tests ─────────────────────────────────────────────────────────────────────
