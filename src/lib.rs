//! # tradeplan
//!
//! Deterministic rebalance planning for multi-venue crypto portfolios.
//!
//! Given a holdings snapshot and target weights, produce the buy/sell
//! actions that move the portfolio toward the targets, tell the operator
//! where each sell should execute, and attach a price and estimated
//! quantity to every action.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Target normalization | [`target`] | weights summing to 1.0 |
//! | Diff | [`diff`] | USD actions + deviation in bps |
//! | Location allocation | [`allocate`] | sells split across venues |
//! | Price resolution | [`pricing`] | `price_used`, `est_quantity` |
//! | Assembly | [`plan`] | exec hints, fee estimates, a finished [`Plan`] |
//!
//! ## Quick Start
//!
//! ```
//! use tradeplan::{HoldingRow, PlanRequest, Planner, PriceMap, StaticTaxonomy, TargetInput};
//!
//! let rows = vec![
//!     HoldingRow::new("BTC", 0.03, 1500.0).at("Kraken Balance"),
//!     HoldingRow::new("USDC", 500.0, 500.0).at("Coinbase"),
//! ];
//! let targets = TargetInput::percentages(&[("BTC", 50.0), ("USDC", 50.0)]);
//!
//! let taxonomy = StaticTaxonomy::builtin();
//! let market = PriceMap::default();
//! let plan = Planner::new(&taxonomy, &market)
//!     .compute(&PlanRequest::new(rows, targets))
//!     .unwrap();
//!
//! assert_eq!(plan.deviation_bps, 2500);
//! assert_eq!(plan.actions.len(), 2);
//!
//! let sell = &plan.actions[0];
//! assert_eq!(sell.usd, -500.0);
//! assert_eq!(sell.location.as_deref(), Some("Kraken"));
//! assert_eq!(sell.exec_hint.as_deref(), Some("Sell on Kraken"));
//! assert_eq!(sell.est_quantity, Some(-0.01));
//!
//! let buy = &plan.actions[1];
//! assert_eq!(buy.symbol, "USDC");
//! assert_eq!(buy.usd, 500.0);
//! assert!(buy.location.is_none());
//! ```
//!
//! ## Sell allocation
//!
//! A sell is spread over the venues holding the symbol in priority order
//! (exchanges, then software wallets, DeFi, cold storage). Pieces smaller
//! than the minimum trade size are skipped, and whatever is left over is
//! folded into the venue holding the most, so the USD total is conserved:
//!
//! ```
//! use tradeplan::{Action, HoldingRow, Plan, assign_locations};
//!
//! let rows = vec![
//!     HoldingRow::new("BTC", 0.8, 40.0).at("Kraken"),
//!     HoldingRow::new("BTC", 0.2, 10.0).at("Binance"),
//! ];
//! let mut plan = Plan::empty();
//! plan.actions.push(Action::new("BTC", "BTC", "BTC", -50.0));
//!
//! let plan = assign_locations(plan, &rows, 25.0);
//! assert_eq!(plan.actions.len(), 1);
//! assert_eq!(plan.actions[0].location.as_deref(), Some("Kraken"));
//! assert_eq!(plan.actions[0].usd, -50.0);
//! ```

pub mod allocate;
pub mod diff;
mod error;
pub mod location;
pub mod plan;
pub mod pricing;
mod side;
pub mod target;
pub mod taxonomy;
mod types;

// Re-export public API
pub use allocate::{assign_locations, holdings_by_location};
pub use diff::{DEFAULT_FEE_BPS, DEFAULT_MIN_TRADE_USD, DEFAULT_MIN_USD, Grouping, PlanParams, build_plan, filter_dust};
pub use error::{Error, Result};
pub use location::{LocationRank, LocationTier, exec_hint, location_rank, location_tier, normalize_location};
pub use plan::{Plan, PlanMeta, PlanRequest, PlanSummary, Planner};
pub use pricing::{
    HybridMeta, MarketQuotes, PriceMap, PriceSource, PricingConfig, PricingContext, PricingDetail,
    PricingMode, price_plan, resolve_prices,
};
pub use side::Side;
pub use target::{GroupWeight, TargetInput, TargetMap, WeightValue, normalize_targets};
pub use taxonomy::{FALLBACK_GROUP, StaticTaxonomy, Taxonomy};
pub use types::{Action, HoldingRow, PriceOrigin, QUANTITY_DECIMALS, UNKNOWN_LOCATION};
