//! Plan assembly: the full normalize → diff → allocate → price pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::info;

use crate::allocate::assign_locations;
use crate::diff::{Grouping, PlanParams, build_plan, filter_dust};
use crate::error::{Error, Result};
use crate::location::exec_hint;
use crate::pricing::{
    HybridMeta, PriceSource, PricingConfig, PricingContext, PricingDetail, PricingMode, price_plan,
};
use crate::target::{TargetInput, TargetMap, normalize_targets};
use crate::taxonomy::Taxonomy;
use crate::types::{Action, HoldingRow, round_to};

/// Annotations accumulated by the pipeline stages.
///
/// Each stage fills only its own fields, so a later stage can never clobber
/// what an earlier one recorded.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanMeta {
    pub note: Option<String>,
    pub grouping: Option<Grouping>,
    pub min_usd: Option<f64>,
    pub min_trade_usd: Option<f64>,
    pub fee_bps: Option<f64>,
    pub source_used: Option<String>,
    pub items_count: Option<usize>,
    pub locations_assigned: Option<usize>,
    pub pricing_mode: Option<PricingMode>,
    pub pricing_hybrid: Option<HybridMeta>,
    pub pricing_details: Option<Vec<PricingDetail>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unpriced_symbols: Vec<String>,
    /// Group trades with no tradeable symbol to carry them, in USD.
    #[cfg_attr(feature = "serde", serde(default))]
    pub unplaced_usd: BTreeMap<String, f64>,
}

/// A rebalance plan for one request.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plan {
    pub total_usd: f64,
    pub deviation_bps: u32,
    pub actions: Vec<Action>,
    pub current_weights: BTreeMap<String, f64>,
    pub target_weights: TargetMap,
    pub meta: PlanMeta,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unknown_aliases: Vec<String>,
}

impl Plan {
    /// A plan with no actions and zero deviation.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Counts and totals over the plan's actions.
    pub fn summary(&self) -> PlanSummary {
        let mut s = PlanSummary::default();
        for a in &self.actions {
            if a.is_sell() {
                s.sells += 1;
                s.sell_usd += -a.usd;
            } else {
                s.buys += 1;
                s.buy_usd += a.usd;
            }
            if a.price_used.is_some() {
                s.priced += 1;
            }
            if a.has_concrete_location() {
                s.located += 1;
            }
            s.fees_usd += a.fee_estimated_usd.unwrap_or(0.0);
        }
        s
    }
}

/// Action counts and USD totals.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanSummary {
    pub buys: usize,
    pub sells: usize,
    pub priced: usize,
    pub located: usize,
    pub buy_usd: f64,
    pub sell_usd: f64,
    pub fees_usd: f64,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buys (${:.2}), {} sells (${:.2}), {} priced, {} located, ${:.2} est. fees",
            self.buys,
            self.buy_usd,
            self.sells,
            self.sell_usd,
            self.priced,
            self.located,
            self.fees_usd,
        )
    }
}

/// Inputs for one plan computation.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanRequest {
    pub rows: Vec<HoldingRow>,
    pub targets: TargetInput,
    pub params: PlanParams,
    pub pricing_mode: PricingMode,
    /// Age of the holdings snapshot in minutes, from the balance source.
    pub data_age_minutes: f64,
    /// Name of the balance source, recorded in the plan metadata.
    pub source_used: Option<String>,
}

impl PlanRequest {
    /// Request with default thresholds, local pricing and a fresh snapshot.
    pub fn new(rows: Vec<HoldingRow>, targets: TargetInput) -> Self {
        Self {
            rows,
            targets,
            params: PlanParams::default(),
            pricing_mode: PricingMode::Local,
            data_age_minutes: 0.0,
            source_used: None,
        }
    }
}

/// Runs the whole pipeline against a taxonomy and a market price source.
pub struct Planner<'a> {
    taxonomy: &'a dyn Taxonomy,
    prices: &'a dyn PriceSource,
    pricing: PricingConfig,
}

impl<'a> Planner<'a> {
    pub fn new(taxonomy: &'a dyn Taxonomy, prices: &'a dyn PriceSource) -> Self {
        Self {
            taxonomy,
            prices,
            pricing: PricingConfig::default(),
        }
    }

    /// Replace the hybrid thresholds / diagnostics switch.
    pub fn with_pricing_config(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    /// Compute a located, priced plan.
    ///
    /// Fails only on malformed configuration: bad target weights or
    /// out-of-range thresholds. Empty holdings, zero value and all-zero
    /// targets yield a valid plan.
    pub fn compute(&self, request: &PlanRequest) -> Result<Plan> {
        request.params.validate()?;
        self.pricing.validate().map_err(Error::InvalidParams)?;
        let targets = normalize_targets(&request.targets)?;

        let rows = filter_dust(&request.rows, request.params.min_usd);
        let plan = build_plan(&rows, &targets, &request.params, self.taxonomy);
        let plan = assign_locations(plan, &rows, request.params.min_trade_usd);

        let ctx = PricingContext::new(
            request.pricing_mode,
            self.pricing.clone(),
            request.data_age_minutes,
        );
        let mut plan = price_plan(plan, &rows, self.prices, &ctx);

        attach_exec_hints(&mut plan.actions);
        attach_fee_estimates(&mut plan.actions, request.params.fee_bps);
        plan.meta.fee_bps = Some(request.params.fee_bps);
        plan.meta.source_used = request.source_used.clone();
        plan.meta.items_count = Some(rows.len());
        plan.unknown_aliases = unknown_aliases(&rows, self.taxonomy);

        info!(
            "plan: ${:.2} total, {}bps deviation, {}",
            plan.total_usd,
            plan.deviation_bps,
            plan.summary()
        );
        Ok(plan)
    }
}

/// Fill `exec_hint` for actions with a concrete venue; existing hints are kept.
pub fn attach_exec_hints(actions: &mut [Action]) {
    for a in actions.iter_mut() {
        if a.exec_hint.is_some() || !a.has_concrete_location() {
            continue;
        }
        if let Some(loc) = a.location.as_deref() {
            a.exec_hint = Some(exec_hint(loc, a.side()));
        }
    }
}

/// Set `fee_estimated_usd` to `|usd| × fee_bps / 10 000`, in cents.
///
/// Runs after allocation so each venue leg carries its own fee.
pub fn attach_fee_estimates(actions: &mut [Action], fee_bps: f64) {
    for a in actions.iter_mut() {
        a.fee_estimated_usd = Some(round_to(a.usd.abs() * fee_bps / 10_000.0, 2));
    }
}

/// Symbols in `rows` the taxonomy has no entry for, sorted and de-duplicated.
pub fn unknown_aliases(rows: &[HoldingRow], taxonomy: &dyn Taxonomy) -> Vec<String> {
    rows.iter()
        .map(|r| r.symbol.to_uppercase())
        .filter(|s| !s.is_empty() && !taxonomy.is_known(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PriceMap;
    use crate::taxonomy::StaticTaxonomy;
    use crate::types::PriceOrigin;

    fn rows() -> Vec<HoldingRow> {
        vec![
            HoldingRow::new("BTC", 0.03, 1500.0).at("Kraken"),
            HoldingRow::new("BTC", 0.01, 500.0).at("Ledger"),
            HoldingRow::new("PEPE", 1_000_000.0, 40.0).at("MetaMask"),
            HoldingRow::new("SHIB", 1.0, 0.2).at("Binance"),
        ]
    }

    #[test]
    fn full_pipeline() {
        let tx = StaticTaxonomy::builtin();
        let market: PriceMap = [("ETH".to_string(), 2000.0)].into_iter().collect();
        let planner = Planner::new(&tx, &market);

        let mut req = PlanRequest::new(rows(), TargetInput::percentages(&[("BTC", 50.0), ("ETH", 50.0)]));
        req.pricing_mode = PricingMode::Hybrid;
        req.data_age_minutes = 5.0;
        req.source_used = Some("snapshot".into());

        let plan = planner.compute(&req).unwrap();

        // 2040 total: BTC 2000 → 1020, ETH 0 → 1020, PEPE 40 → 0
        assert_eq!(plan.total_usd, 2040.0);
        let btc: f64 = plan.actions.iter().filter(|a| a.symbol == "BTC").map(|a| a.usd).sum();
        assert!((btc + 980.0).abs() < 0.01);

        let btc_locs: Vec<&str> = plan
            .actions
            .iter()
            .filter(|a| a.symbol == "BTC")
            .filter_map(|a| a.location.as_deref())
            .collect();
        assert_eq!(btc_locs, vec!["Kraken"]);

        let eth = plan.actions.iter().find(|a| a.symbol == "ETH").unwrap();
        assert_eq!(eth.price_source, Some(PriceOrigin::Market));
        assert!(eth.location.is_none());
        assert!(eth.exec_hint.is_none());

        let pepe = plan.actions.iter().find(|a| a.symbol == "PEPE").unwrap();
        assert_eq!(pepe.location.as_deref(), Some("Metamask"));
        assert_eq!(pepe.exec_hint.as_deref(), Some("Sell on Metamask (DApp)"));
        assert_eq!(pepe.price_source, Some(PriceOrigin::Local));

        // SHIB is dust, PEPE is unknown to the taxonomy
        assert_eq!(plan.unknown_aliases, vec!["PEPE".to_string()]);
        assert_eq!(plan.meta.items_count, Some(3));
        assert_eq!(plan.meta.source_used.as_deref(), Some("snapshot"));
        assert_eq!(plan.meta.pricing_mode, Some(PricingMode::Hybrid));
        assert_eq!(plan.meta.min_trade_usd, Some(25.0));
        assert!(plan.meta.locations_assigned.is_some());
        assert_eq!(plan.meta.fee_bps, Some(10.0));
    }

    #[test]
    fn fees_follow_each_venue_leg() {
        let tx = StaticTaxonomy::builtin();
        let market = PriceMap::default();
        let rows = vec![
            HoldingRow::new("BTC", 0.01, 600.0).at("Binance"),
            HoldingRow::new("BTC", 0.01, 400.0).at("Ledger"),
            HoldingRow::new("USDC", 1000.0, 1000.0).at("Coinbase"),
        ];
        let mut req = PlanRequest::new(rows, TargetInput::weights(&[("BTC", 0.1), ("USDC", 0.9)]));
        req.params.fee_bps = 25.0;

        let plan = Planner::new(&tx, &market).compute(&req).unwrap();

        // BTC sells $800: $600 at Binance, $200 at Ledger
        let fees: Vec<(&str, f64, Option<f64>)> = plan
            .actions
            .iter()
            .map(|a| (a.symbol.as_str(), a.usd, a.fee_estimated_usd))
            .collect();
        assert_eq!(
            fees,
            vec![
                ("BTC", -600.0, Some(1.5)),
                ("BTC", -200.0, Some(0.5)),
                ("USDC", 800.0, Some(2.0)),
            ]
        );
        assert!((plan.summary().fees_usd - 4.0).abs() < 1e-9);
        assert_eq!(plan.meta.fee_bps, Some(25.0));
    }

    #[test]
    fn bad_target_is_an_error() {
        let tx = StaticTaxonomy::builtin();
        let market = PriceMap::default();
        let req = PlanRequest::new(
            rows(),
            TargetInput::Weights(vec![("BTC".into(), "fifty".into())]),
        );
        let err = Planner::new(&tx, &market).compute(&req).unwrap_err();
        assert!(matches!(err, Error::InvalidWeight { .. }));
    }

    #[test]
    fn empty_holdings_is_not_an_error() {
        let tx = StaticTaxonomy::builtin();
        let market = PriceMap::default();
        let req = PlanRequest::new(vec![], TargetInput::weights(&[("BTC", 1.0)]));
        let plan = Planner::new(&tx, &market).compute(&req).unwrap();
        assert!(plan.actions.is_empty());
        assert_eq!(plan.deviation_bps, 0);
        assert!(plan.meta.note.is_some());
    }

    #[test]
    fn summary_counts() {
        let mut plan = Plan::empty();
        plan.actions = vec![
            Action::new("BTC", "BTC", "BTC", -100.0),
            Action::new("ETH", "ETH", "ETH", 60.0),
            Action::new("SOL", "SOL", "SOL", 40.0),
        ];
        plan.actions[0].location = Some("Kraken".into());
        plan.actions[1].price_used = Some(2000.0);
        let s = plan.summary();
        assert_eq!((s.buys, s.sells, s.priced, s.located), (2, 1, 1, 1));
        assert_eq!(s.buy_usd, 100.0);
        assert_eq!(s.sell_usd, 100.0);
        assert!(format!("{s}").contains("2 buys"));
    }

    #[test]
    fn existing_hints_are_kept() {
        let mut actions = vec![Action::new("BTC", "BTC", "BTC", -100.0)];
        actions[0].location = Some("Kraken".into());
        actions[0].exec_hint = Some("OTC desk".into());
        attach_exec_hints(&mut actions);
        assert_eq!(actions[0].exec_hint.as_deref(), Some("OTC desk"));
    }
}
