//! Holdings snapshot loading.
//!
//! A snapshot is either a bare JSON array of rows or an object
//! `{ "source_used": "...", "items": [...] }`. Numeric fields may be numbers
//! or numeric strings; anything else counts as zero.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use tradeplan::HoldingRow;

use crate::error::{Error, Result};

/// Age reported for snapshots pulled live from an exchange API.
pub const API_DATA_AGE_MINUTES: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default, alias = "coin")]
    symbol: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    amount: Value,
    #[serde(default, alias = "value")]
    value_usd: Value,
    #[serde(default, alias = "exchange")]
    location: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSnapshot {
    Rows(Vec<RawRow>),
    Wrapped {
        #[serde(default)]
        source_used: Option<String>,
        items: Vec<RawRow>,
    },
}

/// Rows from one balance source, plus what the source said about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingsSnapshot {
    pub source_used: Option<String>,
    pub rows: Vec<HoldingRow>,
    /// Minutes since the snapshot was taken.
    pub data_age_minutes: f64,
}

impl HoldingsSnapshot {
    /// Load a snapshot file; its age comes from the file's modification time.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::HoldingsRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut snapshot = Self::from_json(&contents)?;
        snapshot.data_age_minutes = data_age_minutes(path, snapshot.source_used.as_deref());
        debug!(
            "holdings: {} rows from {}, {:.1} min old",
            snapshot.rows.len(),
            path.display(),
            snapshot.data_age_minutes
        );
        Ok(snapshot)
    }

    /// Parse from a JSON string. The age is left at zero.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(json).map_err(Error::HoldingsParse)?;
        let (source_used, items) = match raw {
            RawSnapshot::Rows(items) => (None, items),
            RawSnapshot::Wrapped { source_used, items } => (source_used, items),
        };
        Ok(Self {
            source_used,
            rows: items.into_iter().map(into_row).collect(),
            data_age_minutes: 0.0,
        })
    }

    pub fn total_usd(&self) -> f64 {
        self.rows.iter().map(|r| r.value_usd).sum()
    }
}

fn into_row(raw: RawRow) -> HoldingRow {
    let mut row = HoldingRow::new(&raw.symbol, coerce_f64(&raw.amount), coerce_f64(&raw.value_usd))
        .at(raw.location.as_deref().unwrap_or_default());
    if let Some(alias) = raw.alias.as_deref().filter(|a| !a.trim().is_empty()) {
        row = row.with_alias(alias.trim());
    }
    if let Some(group) = raw.group.as_deref().filter(|g| !g.trim().is_empty()) {
        row = row.in_group(group.trim());
    }
    row
}

/// Number or numeric string → f64; anything else → 0.0.
pub fn coerce_f64(v: &Value) -> f64 {
    let x = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if x.is_finite() { x } else { 0.0 }
}

/// Snapshot age in minutes.
///
/// API sources are treated as live. Otherwise the file's modification time
/// is used; if it cannot be read the snapshot counts as fresh.
pub fn data_age_minutes(path: &Path, source_used: Option<&str>) -> f64 {
    if source_used.is_some_and(|s| s.to_ascii_lowercase().contains("api")) {
        return API_DATA_AGE_MINUTES;
    }
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => age_minutes(modified.into(), Utc::now()),
        Err(_) => 0.0,
    }
}

/// Minutes from `then` to `now`, never negative.
pub fn age_minutes(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_milliseconds() as f64 / 60_000.0).max(0.0)
}
