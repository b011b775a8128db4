//! CURRENT→TARGET diff engine.
//!
//! Compares current weights (from holdings) with target weights and emits one
//! signed-USD [`Action`] per key whose imbalance is at least
//! `min_trade_usd`. Keys are either symbols or taxonomy groups; group actions
//! are expanded into per-symbol actions before they leave this module.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::target::TargetMap;
use crate::taxonomy::Taxonomy;
use crate::types::{Action, HoldingRow, round_to};

/// Default minimum trade size in USD.
pub const DEFAULT_MIN_TRADE_USD: f64 = 25.0;

/// Default dust cutoff in USD.
pub const DEFAULT_MIN_USD: f64 = 1.0;

/// Default fee rate used for per-trade fee estimates, in basis points.
pub const DEFAULT_FEE_BPS: f64 = 10.0;

/// Aggregation key used when comparing current and target weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Grouping {
    /// One key per symbol.
    #[default]
    Symbol,
    /// One key per taxonomy group.
    Group,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::Symbol => write!(f, "symbol"),
            Grouping::Group => write!(f, "group"),
        }
    }
}

impl FromStr for Grouping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "symbol" | "symbols" => Ok(Grouping::Symbol),
            "group" | "groups" => Ok(Grouping::Group),
            _ => Err(Error::InvalidGrouping(s.to_string())),
        }
    }
}

/// Thresholds for one plan computation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanParams {
    /// Rows worth less than this are ignored as dust.
    pub min_usd: f64,
    /// Trades (and sub-trades) smaller than this are not emitted.
    pub min_trade_usd: f64,
    pub grouping: Grouping,
    /// Fee rate for `fee_estimated_usd` on each trade.
    pub fee_bps: f64,
}

impl PlanParams {
    /// Check thresholds are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        if !self.min_usd.is_finite() || self.min_usd < 0.0 {
            return Err(Error::InvalidParams(format!(
                "min_usd must be >= 0 and finite, got {}",
                self.min_usd
            )));
        }
        if !self.min_trade_usd.is_finite() || self.min_trade_usd < 0.0 {
            return Err(Error::InvalidParams(format!(
                "min_trade_usd must be >= 0 and finite, got {}",
                self.min_trade_usd
            )));
        }
        if !self.fee_bps.is_finite() || self.fee_bps < 0.0 {
            return Err(Error::InvalidParams(format!(
                "fee_bps must be >= 0 and finite, got {}",
                self.fee_bps
            )));
        }
        Ok(())
    }
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            min_usd: DEFAULT_MIN_USD,
            min_trade_usd: DEFAULT_MIN_TRADE_USD,
            grouping: Grouping::Symbol,
            fee_bps: DEFAULT_FEE_BPS,
        }
    }
}

/// Rows whose value is at least `min_usd`.
///
/// The allocator must see the same rows as the diff engine, so callers
/// filter once and pass the result to both stages.
pub fn filter_dust(rows: &[HoldingRow], min_usd: f64) -> Vec<HoldingRow> {
    rows.iter()
        .filter(|r| r.value_usd >= min_usd)
        .cloned()
        .collect()
}

/// Per-key facts gathered from holdings.
#[derive(Default)]
struct KeyHoldings {
    value: f64,
    group: Option<String>,
    alias: Option<String>,
    /// symbol → (alias, value); only used for group expansion.
    symbols: BTreeMap<String, (String, f64)>,
}

/// Compute the raw buy/sell plan.
///
/// Dust rows (`value_usd < params.min_usd`) are skipped. A portfolio with
/// no value yields an empty plan with `deviation_bps == 0`. Keys are visited
/// in lexicographic order, so identical input always produces identical
/// action order.
pub fn build_plan(
    rows: &[HoldingRow],
    targets: &TargetMap,
    params: &PlanParams,
    taxonomy: &dyn Taxonomy,
) -> Plan {
    let targets = canonical_targets(targets, params.grouping);
    let mut plan = Plan::empty();
    plan.meta.grouping = Some(params.grouping);
    plan.meta.min_usd = Some(params.min_usd);
    plan.meta.min_trade_usd = Some(params.min_trade_usd);

    let mut held: BTreeMap<String, KeyHoldings> = BTreeMap::new();
    let mut total = 0.0_f64;
    for row in rows.iter().filter(|r| r.value_usd >= params.min_usd) {
        let group = row
            .group
            .clone()
            .unwrap_or_else(|| taxonomy.group_or_fallback(&row.symbol).to_string());
        let key = match params.grouping {
            Grouping::Symbol => row.symbol.clone(),
            Grouping::Group => group.clone(),
        };
        let entry = held.entry(key).or_default();
        entry.value += row.value_usd;
        entry.group.get_or_insert(group);
        entry.alias.get_or_insert_with(|| row.alias.clone());
        let sym = entry
            .symbols
            .entry(row.symbol.clone())
            .or_insert_with(|| (row.alias.clone(), 0.0));
        sym.1 += row.value_usd;
        total += row.value_usd;
    }

    plan.target_weights = targets.clone();

    if total <= 0.0 {
        plan.meta.note = Some("total portfolio value is zero; nothing to rebalance".into());
        return plan;
    }
    plan.total_usd = round_to(total, 2);

    let keys: BTreeSet<&String> = held.keys().chain(targets.keys()).collect();
    let mut deviation = 0.0_f64;

    for key in keys {
        let holding = held.get(key);
        let current_weight = holding.map_or(0.0, |h| h.value / total);
        let target_weight = targets.get(key).copied().unwrap_or(0.0);
        if holding.is_some() {
            plan.current_weights.insert(key.clone(), current_weight);
        }

        let diff_weight = target_weight - current_weight;
        deviation += diff_weight.abs();

        let usd = diff_weight * total;
        if usd.abs() < params.min_trade_usd {
            continue;
        }
        let usd = round_to(usd, 2);
        if usd == 0.0 {
            continue;
        }

        match params.grouping {
            Grouping::Symbol => {
                let group = holding
                    .and_then(|h| h.group.clone())
                    .unwrap_or_else(|| taxonomy.group_or_fallback(key).to_string());
                let alias = holding
                    .and_then(|h| h.alias.clone())
                    .unwrap_or_else(|| key.clone());
                plan.actions.push(Action::new(&group, key, &alias, usd));
            }
            Grouping::Group => {
                let symbols: Vec<(String, String, f64)> = holding
                    .map(|h| {
                        h.symbols
                            .iter()
                            .map(|(s, (a, v))| (s.clone(), a.clone(), *v))
                            .collect()
                    })
                    .unwrap_or_default();
                let actions = expand_group(key, usd, &symbols, taxonomy, params.min_trade_usd);
                if actions.is_empty() {
                    warn!("diff: no tradeable symbol for group {key:?}; ${usd:.2} left unplaced");
                    plan.meta.unplaced_usd.insert(key.clone(), usd);
                }
                plan.actions.extend(actions);
            }
        }
    }

    // Summing |Δw| counts every moved dollar twice: once leaving, once arriving.
    plan.deviation_bps = (deviation * 10_000.0 / 2.0).round() as u32;

    debug!(
        "diff: total=${total:.2} actions={} deviation={}bps",
        plan.actions.len(),
        plan.deviation_bps
    );
    plan
}

/// Target keys in the same form as holdings keys (symbols upper-cased).
fn canonical_targets(targets: &TargetMap, grouping: Grouping) -> TargetMap {
    match grouping {
        Grouping::Group => targets.clone(),
        Grouping::Symbol => {
            let mut out = TargetMap::new();
            for (key, w) in targets {
                *out.entry(key.trim().to_uppercase()).or_insert(0.0) += *w;
            }
            out
        }
    }
}

/// Spread a group-level trade over concrete symbols.
///
/// Sells follow current holdings in proportion to value. Buys go to the
/// group's primary symbols in equal parts when any are configured, else
/// follow current holdings. A group with neither falls back to the
/// taxonomy's default buy symbol; without one, no action is emitted.
fn expand_group(
    group: &str,
    usd: f64,
    held: &[(String, String, f64)],
    taxonomy: &dyn Taxonomy,
    min_trade_usd: f64,
) -> Vec<Action> {
    let primary = taxonomy.primary_symbols(group);
    let slices: Vec<(String, String, f64)> = if usd > 0.0 && !primary.is_empty() {
        let parts = split_proportional(usd, &vec![1.0; primary.len()]);
        primary
            .iter()
            .zip(parts)
            .map(|(s, part)| (s.clone(), s.clone(), part))
            .collect()
    } else if !held.is_empty() {
        let weights: Vec<f64> = held.iter().map(|(_, _, v)| *v).collect();
        let parts = split_proportional(usd, &weights);
        held.iter()
            .zip(parts)
            .map(|((s, a, _), part)| (s.clone(), a.clone(), part))
            .collect()
    } else if let Some(symbol) = taxonomy.default_buy_symbol(group) {
        vec![(symbol.clone(), symbol, usd)]
    } else {
        Vec::new()
    };

    fold_small_slices(slices, min_trade_usd)
        .into_iter()
        .map(|(symbol, alias, part)| Action::new(group, &symbol, &alias, part))
        .collect()
}

/// Split `total` by `weights`, in cents, with the last slice taking the
/// rounding remainder so the parts sum exactly to `total`.
fn split_proportional(total: f64, weights: &[f64]) -> Vec<f64> {
    let sum: f64 = weights.iter().sum();
    let n = weights.len();
    let mut parts = Vec::with_capacity(n);
    let mut allocated = 0.0_f64;
    for (i, w) in weights.iter().enumerate() {
        let part = if i + 1 == n {
            round_to(total - allocated, 2)
        } else if sum > 0.0 {
            round_to(total * w / sum, 2)
        } else {
            round_to(total / n as f64, 2)
        };
        allocated += part;
        parts.push(part);
    }
    parts
}

/// Merge slices below `min_trade_usd` into the largest slice.
fn fold_small_slices(
    mut slices: Vec<(String, String, f64)>,
    min_trade_usd: f64,
) -> Vec<(String, String, f64)> {
    let Some(largest) = slices
        .iter()
        .enumerate()
        .max_by(|a, b| (a.1).2.abs().total_cmp(&(b.1).2.abs()))
        .map(|(i, _)| i)
    else {
        return slices;
    };

    let mut folded = 0.0_f64;
    let mut i = 0;
    let mut largest_idx = largest;
    while i < slices.len() {
        if i != largest_idx && slices[i].2.abs() < min_trade_usd {
            folded += slices[i].2;
            slices.remove(i);
            if i < largest_idx {
                largest_idx -= 1;
            }
        } else {
            i += 1;
        }
    }
    slices[largest_idx].2 = round_to(slices[largest_idx].2 + folded, 2);
    slices
}
