//! Execution price resolution.
//!
//! Three strategies:
//!
//! | Mode | Price |
//! |------|-------|
//! | **local** | Σ value_usd / Σ amount from the holdings snapshot, no fallback |
//! | **auto** | External market price, no fallback |
//! | **hybrid** | Local while the snapshot is fresh, market once it is older than `hybrid_max_age_minutes`; each falls back to the other when missing |
//!
//! Resolution itself is pure: [`market_symbols_needed`] says which symbols to
//! look up, the caller performs that one batched lookup, and
//! [`resolve_prices`] applies the results. [`price_plan`] chains the steps
//! through a [`PriceSource`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::types::{HoldingRow, PriceOrigin, QUANTITY_DECIMALS, round_to};

/// Symbol → USD price.
pub type PriceMap = FxHashMap<String, f64>;

/// Symbol → USD price as returned by a market lookup (`None` = no quote).
pub type MarketQuotes = FxHashMap<String, Option<f64>>;

/// Batched market price lookup.
///
/// Implementations own all I/O and caching. Missing or failed symbols map to
/// `None` (or are absent); they leave the action unpriced rather than fail
/// the plan.
pub trait PriceSource {
    fn prices_usd(&self, symbols: &[String]) -> MarketQuotes;
}

impl PriceSource for PriceMap {
    fn prices_usd(&self, symbols: &[String]) -> MarketQuotes {
        symbols
            .iter()
            .map(|s| (s.clone(), self.get(s).copied()))
            .collect()
    }
}

/// Pricing strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PricingMode {
    #[default]
    Local,
    Auto,
    Hybrid,
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingMode::Local => write!(f, "local"),
            PricingMode::Auto => write!(f, "auto"),
            PricingMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for PricingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(PricingMode::Local),
            "auto" | "market" => Ok(PricingMode::Auto),
            "hybrid" => Ok(PricingMode::Hybrid),
            _ => Err(Error::InvalidPricingMode(s.to_string())),
        }
    }
}

/// Hybrid thresholds and diagnostics switch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PricingConfig {
    /// Snapshot age (minutes) beyond which hybrid prefers market prices.
    pub hybrid_max_age_minutes: f64,
    /// Recorded in plan metadata and diagnostics only.
    pub hybrid_max_deviation_pct: f64,
    /// Attach per-symbol pricing details to the plan metadata.
    pub diagnostics: bool,
}

impl PricingConfig {
    /// Validate the config. Returns `Err` with a description if any field is nonsensical.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.hybrid_max_age_minutes.is_finite() || self.hybrid_max_age_minutes < 0.0 {
            return Err(format!(
                "hybrid_max_age_minutes must be >= 0 and finite, got {}",
                self.hybrid_max_age_minutes
            ));
        }
        if !self.hybrid_max_deviation_pct.is_finite() || self.hybrid_max_deviation_pct < 0.0 {
            return Err(format!(
                "hybrid_max_deviation_pct must be >= 0 and finite, got {}",
                self.hybrid_max_deviation_pct
            ));
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            hybrid_max_age_minutes: 30.0,
            hybrid_max_deviation_pct: 5.0,
            diagnostics: false,
        }
    }
}

/// Everything the resolver needs besides the plan and rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PricingContext {
    pub mode: PricingMode,
    pub config: PricingConfig,
    /// Estimated age of the holdings snapshot, in minutes.
    pub data_age_minutes: f64,
}

impl PricingContext {
    pub fn new(mode: PricingMode, config: PricingConfig, data_age_minutes: f64) -> Self {
        Self {
            mode,
            config,
            data_age_minutes,
        }
    }

    /// Snapshot is older than the hybrid threshold.
    pub fn is_stale(&self) -> bool {
        self.data_age_minutes > self.config.hybrid_max_age_minutes
    }
}

/// Hybrid settings recorded on the plan.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HybridMeta {
    pub max_age_min: f64,
    pub max_deviation_pct: f64,
    pub data_age_min: f64,
}

/// Per-symbol pricing diagnostics.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PricingDetail {
    pub symbol: String,
    pub local_price: Option<f64>,
    pub market_price: Option<f64>,
    pub effective_price: Option<f64>,
    pub price_source: Option<PriceOrigin>,
    /// |local − market| / market × 100, when both are known.
    pub deviation_pct: Option<f64>,
}

/// Local prices: Σ value_usd / Σ amount per symbol over rows with both > 0.
pub fn local_prices(rows: &[HoldingRow]) -> PriceMap {
    let mut sums: FxHashMap<String, (f64, f64)> = FxHashMap::default();
    for row in rows {
        if row.symbol.is_empty() || row.value_usd <= 0.0 || row.amount <= 0.0 {
            continue;
        }
        let entry = sums.entry(row.symbol.to_uppercase()).or_insert((0.0, 0.0));
        entry.0 += row.value_usd;
        entry.1 += row.amount;
    }
    sums.into_iter()
        .map(|(sym, (value, amount))| (sym, value / amount))
        .collect()
}

/// Symbols the resolver will want market quotes for, sorted.
///
/// Auto: every unpriced action symbol. Hybrid: every unpriced action symbol
/// when the snapshot is stale, otherwise only those without a local price.
/// Local: none.
pub fn market_symbols_needed(plan: &Plan, local: &PriceMap, ctx: &PricingContext) -> Vec<String> {
    let unpriced: BTreeSet<String> = plan
        .actions
        .iter()
        .filter(|a| a.price_used.is_none() && !a.symbol.is_empty())
        .map(|a| a.symbol.to_uppercase())
        .collect();

    match ctx.mode {
        PricingMode::Local => Vec::new(),
        PricingMode::Auto => unpriced.into_iter().collect(),
        PricingMode::Hybrid if ctx.is_stale() => unpriced.into_iter().collect(),
        PricingMode::Hybrid => unpriced
            .into_iter()
            .filter(|s| !local.contains_key(s))
            .collect(),
    }
}

/// Attach `price_used`, `price_source` and `est_quantity` to unpriced actions.
///
/// Actions that already carry a price are left untouched, so running the
/// resolver twice is harmless. Symbols with no usable price stay unpriced and
/// are listed in `meta.unpriced_symbols`.
pub fn resolve_prices(
    mut plan: Plan,
    rows: &[HoldingRow],
    market: &MarketQuotes,
    ctx: &PricingContext,
) -> Plan {
    let local = local_prices(rows);
    let market: PriceMap = market
        .iter()
        .filter_map(|(s, p)| match p {
            Some(p) if p.is_finite() && *p > 0.0 => Some((s.to_uppercase(), *p)),
            _ => None,
        })
        .collect();

    let stale = ctx.is_stale();
    let mut details = Vec::new();
    let mut unpriced = BTreeSet::new();

    for action in plan.actions.iter_mut() {
        if action.price_used.is_some() || action.symbol.is_empty() {
            continue;
        }
        let symbol = action.symbol.to_uppercase();
        let local_price = local.get(&symbol).copied();
        let market_price = market.get(&symbol).copied();

        let chosen = match ctx.mode {
            PricingMode::Local => local_price.map(|p| (p, PriceOrigin::Local)),
            PricingMode::Auto => market_price.map(|p| (p, PriceOrigin::Market)),
            PricingMode::Hybrid if stale => market_price
                .map(|p| (p, PriceOrigin::Market))
                .or(local_price.map(|p| (p, PriceOrigin::Local))),
            PricingMode::Hybrid => local_price
                .map(|p| (p, PriceOrigin::Local))
                .or(market_price.map(|p| (p, PriceOrigin::Market))),
        };

        match chosen {
            Some((price, origin)) => {
                action.price_used = Some(price);
                action.price_source = Some(origin);
                action.est_quantity = Some(round_to(action.usd / price, QUANTITY_DECIMALS));
            }
            None => {
                unpriced.insert(symbol.clone());
            }
        }

        if ctx.config.diagnostics {
            details.push(PricingDetail {
                symbol,
                local_price,
                market_price,
                effective_price: chosen.map(|(p, _)| p),
                price_source: chosen.map(|(_, o)| o),
                deviation_pct: match (local_price, market_price) {
                    (Some(l), Some(m)) => Some((l - m).abs() / m * 100.0),
                    _ => None,
                },
            });
        }
    }

    if !unpriced.is_empty() {
        warn!(
            "pricing: no {} price for {}",
            ctx.mode,
            unpriced.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    plan.meta.pricing_mode = Some(ctx.mode);
    if ctx.mode == PricingMode::Hybrid {
        plan.meta.pricing_hybrid = Some(HybridMeta {
            max_age_min: ctx.config.hybrid_max_age_minutes,
            max_deviation_pct: ctx.config.hybrid_max_deviation_pct,
            data_age_min: ctx.data_age_minutes,
        });
    }
    if ctx.config.diagnostics {
        plan.meta.pricing_details = Some(details);
    }
    plan.meta.unpriced_symbols = unpriced.into_iter().collect();
    plan
}

/// Resolve prices, fetching market quotes from `source` in one batch if needed.
pub fn price_plan(
    plan: Plan,
    rows: &[HoldingRow],
    source: &dyn PriceSource,
    ctx: &PricingContext,
) -> Plan {
    let local = local_prices(rows);
    let wanted = market_symbols_needed(&plan, &local, ctx);
    let market = if wanted.is_empty() {
        MarketQuotes::default()
    } else {
        debug!("pricing: requesting {} market quote(s)", wanted.len());
        source.prices_usd(&wanted)
    };
    resolve_prices(plan, rows, &market, ctx)
}
