//! Plan rendering: terminal table, JSON and CSV.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use tradeplan::{HoldingRow, LocationRank, LocationTier, Plan, location_rank, normalize_location};

use crate::error::{Error, Result};

/// Output format for a rendered plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[default]
    Table,
    Json,
    Csv,
}

/// Column order of the CSV export.
pub const CSV_HEADER: &str = "group,alias,symbol,action,usd,est_quantity,price_used,exec_hint";

/// Render `plan` in the requested format.
pub fn render(plan: &Plan, format: Format) -> Result<String> {
    match format {
        Format::Table => Ok(PlanTable(plan).to_string()),
        Format::Json => Ok(serde_json::to_string_pretty(plan)?),
        Format::Csv => {
            let mut buf = Vec::new();
            write_csv(plan, &mut buf)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}

/// Human-readable plan table.
pub struct PlanTable<'a>(pub &'a Plan);

impl fmt::Display for PlanTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.0;
        writeln!(
            f,
            "Portfolio: ${:.2}   Deviation: {} bps",
            plan.total_usd, plan.deviation_bps
        )?;
        if let Some(note) = &plan.meta.note {
            writeln!(f, "Note: {note}")?;
        }
        for (group, usd) in &plan.meta.unplaced_usd {
            writeln!(f, "Unplaced: {group} ${usd:.2} (no tradeable symbol)")?;
        }
        if plan.actions.is_empty() {
            return writeln!(f, "No trades needed.");
        }

        writeln!(
            f,
            "{:<16} {:<8} {:<4} {:>12} {:>16} {:>12}  {}",
            "GROUP", "SYMBOL", "SIDE", "USD", "EST QTY", "PRICE", "EXECUTION"
        )?;
        for a in &plan.actions {
            let qty = a.est_quantity.map_or("-".to_string(), |q| format!("{q:.8}"));
            let price = a.price_used.map_or("-".to_string(), |p| format!("{p:.4}"));
            let hint = a
                .exec_hint
                .clone()
                .or_else(|| a.location.clone())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<16} {:<8} {:<4} {:>12.2} {:>16} {:>12}  {}",
                a.group,
                a.symbol,
                a.side().to_string(),
                a.usd,
                qty,
                price,
                hint
            )?;
        }
        writeln!(f, "{}", plan.summary())?;
        if !plan.meta.unpriced_symbols.is_empty() {
            writeln!(f, "Unpriced: {}", plan.meta.unpriced_symbols.join(", "))?;
        }
        if !plan.unknown_aliases.is_empty() {
            writeln!(f, "Unknown symbols: {}", plan.unknown_aliases.join(", "))?;
        }
        Ok(())
    }
}

/// Write the plan's actions as CSV, header first.
pub fn write_csv<W: Write>(plan: &Plan, w: &mut W) -> Result<()> {
    write_csv_rows(plan, w).map_err(Error::Csv)
}

fn write_csv_rows<W: Write>(plan: &Plan, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "{CSV_HEADER}")?;
    for a in &plan.actions {
        writeln!(
            w,
            "{},{},{},{},{:.2},{},{},{}",
            csv_field(&a.group),
            csv_field(&a.alias),
            csv_field(&a.symbol),
            a.side().as_str(),
            a.usd,
            a.est_quantity.map(|q| q.to_string()).unwrap_or_default(),
            a.price_used.map(|p| p.to_string()).unwrap_or_default(),
            csv_field(a.exec_hint.as_deref().unwrap_or_default()),
        )?;
    }
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One venue in a holdings breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationLine {
    pub location: String,
    pub rank: LocationRank,
    pub value_usd: f64,
    /// symbol → value held here
    pub symbols: BTreeMap<String, f64>,
}

impl LocationLine {
    pub fn tier(&self) -> LocationTier {
        self.rank.tier
    }
}

/// Holdings grouped by normalized venue, in sell-priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationBreakdown {
    pub lines: Vec<LocationLine>,
}

impl LocationBreakdown {
    pub fn from_rows(rows: &[HoldingRow]) -> Self {
        let mut by_loc: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.value_usd > 0.0) {
            *by_loc
                .entry(normalize_location(&row.location))
                .or_default()
                .entry(row.symbol.clone())
                .or_insert(0.0) += row.value_usd;
        }
        let mut lines: Vec<LocationLine> = by_loc
            .into_iter()
            .map(|(location, symbols)| LocationLine {
                rank: location_rank(&location),
                value_usd: symbols.values().sum(),
                location,
                symbols,
            })
            .collect();
        lines.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then(b.value_usd.total_cmp(&a.value_usd))
                .then(a.location.cmp(&b.location))
        });
        Self { lines }
    }
}

impl fmt::Display for LocationBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:<9} {:>14}  {}", "LOCATION", "TIER", "VALUE", "SYMBOLS")?;
        for line in &self.lines {
            let symbols: Vec<&str> = line.symbols.keys().map(String::as_str).collect();
            writeln!(
                f,
                "{:<24} {:<9} {:>14.2}  {}",
                line.location,
                line.tier().to_string(),
                line.value_usd,
                symbols.join(" ")
            )?;
        }
        Ok(())
    }
}
