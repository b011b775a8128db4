//! JSONL audit trail logging.
//!
//! Each planning run appends events to an audit.jsonl file, one JSON object
//! per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tradeplan::Plan;

use crate::error::Result;
use crate::holdings::HoldingsSnapshot;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a run start event.
pub fn log_run_started(
    audit: &mut AuditLog,
    holdings_file: &str,
    target_file: &str,
    pricing_mode: &str,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "holdings_file": holdings_file,
            "target_file": target_file,
            "pricing": pricing_mode,
        }),
    )
}

/// Convenience: log the loaded snapshot.
pub fn log_holdings_loaded(audit: &mut AuditLog, snapshot: &HoldingsSnapshot) -> Result<()> {
    audit.log(
        "holdings_loaded",
        serde_json::json!({
            "source_used": snapshot.source_used,
            "rows": snapshot.rows.len(),
            "total_usd": snapshot.total_usd(),
            "data_age_min": snapshot.data_age_minutes,
        }),
    )
}

/// Convenience: log the computed plan's actions.
pub fn log_plan_computed(audit: &mut AuditLog, plan: &Plan) -> Result<()> {
    let actions: Vec<_> = plan
        .actions
        .iter()
        .map(|a| {
            serde_json::json!({
                "symbol": a.symbol,
                "side": a.side().as_str(),
                "usd": a.usd,
                "location": a.location,
                "price_used": a.price_used,
                "est_quantity": a.est_quantity,
            })
        })
        .collect();

    audit.log(
        "plan_computed",
        serde_json::json!({
            "total_usd": plan.total_usd,
            "deviation_bps": plan.deviation_bps,
            "actions": actions,
            "unknown_aliases": plan.unknown_aliases,
            "unpriced_symbols": plan.meta.unpriced_symbols,
            "unplaced_usd": plan.meta.unplaced_usd,
        }),
    )
}

/// Convenience: log run completion.
pub fn log_run_completed(audit: &mut AuditLog, plan: &Plan, output: &str) -> Result<()> {
    let summary = plan.summary();
    audit.log(
        "run_completed",
        serde_json::json!({
            "buys": summary.buys,
            "sells": summary.sells,
            "priced": summary.priced,
            "fees_usd": summary.fees_usd,
            "output": output,
        }),
    )
}
