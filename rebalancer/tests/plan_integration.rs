//! Integration tests for file-driven planning runs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tradeplan::{Grouping, PriceOrigin, PricingMode};
use tradeplan_rebalancer::config::Config;
use tradeplan_rebalancer::error::Error;
use tradeplan_rebalancer::report::{CSV_HEADER, Format};
use tradeplan_rebalancer::run::{self, RunOptions, Session};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn holdings_json() -> &'static str {
    r#"{
        "source_used": "snapshot",
        "items": [
            { "symbol": "BTC",  "amount": "0.0008", "value_usd": 40, "location": "kraken balance" },
            { "symbol": "BTC",  "amount": 0.0002,   "value_usd": 10, "location": "Binance" },
            { "symbol": "USDC", "amount": 50,       "value_usd": 50, "location": "Coinbase" },
            { "symbol": "DOGE", "amount": 3,        "value_usd": 0.3, "location": "Binance" }
        ]
    }"#
}

fn setup(targets: &str) -> (TempDir, RunOptions) {
    let dir = tempfile::tempdir().unwrap();
    let opts = RunOptions {
        holdings_file: write(dir.path(), "holdings.json", holdings_json()),
        target_file: write(dir.path(), "targets.json", targets),
        ..RunOptions::default()
    };
    (dir, opts)
}

// ============================================================================
// compute
// ============================================================================

#[test]
fn small_venue_collapses_into_largest_holder() {
    let (_dir, opts) = setup(r#"{"USDC": 100}"#);
    let plan = run::compute(&Config::default(), &opts).unwrap();

    assert_eq!(plan.total_usd, 100.0);
    assert_eq!(plan.deviation_bps, 5000);

    let btc: Vec<_> = plan.actions.iter().filter(|a| a.symbol == "BTC").collect();
    assert_eq!(btc.len(), 1);
    assert_eq!(btc[0].usd, -50.0);
    assert_eq!(btc[0].location.as_deref(), Some("Kraken"));
    assert_eq!(btc[0].exec_hint.as_deref(), Some("Sell on Kraken"));
    assert_eq!(btc[0].price_source, Some(PriceOrigin::Local));
    assert!((btc[0].est_quantity.unwrap() + 0.001).abs() < 1e-9);

    let usdc = plan.actions.iter().find(|a| a.symbol == "USDC").unwrap();
    assert_eq!(usdc.usd, 50.0);
    assert!(usdc.location.is_none());

    // DOGE is dust: dropped before planning
    assert_eq!(plan.meta.items_count, Some(3));
    assert_eq!(plan.meta.source_used.as_deref(), Some("snapshot"));
}

#[test]
fn stale_hybrid_uses_price_file() {
    let (dir, mut opts) = setup(r#"[{"group": "BTC", "weight_pct": 50}, {"group": "ETH", "weight_pct": 50}]"#);
    opts.prices_file = Some(write(dir.path(), "prices.json", r#"{"BTC": 60000, "ETH": 3000}"#));
    opts.pricing = Some(PricingMode::Hybrid);
    opts.data_age_min = Some(90.0);

    let plan = run::compute(&Config::default(), &opts).unwrap();

    let eth = plan.actions.iter().find(|a| a.symbol == "ETH").unwrap();
    assert_eq!(eth.usd, 50.0);
    assert_eq!(eth.price_used, Some(3000.0));
    assert_eq!(eth.price_source, Some(PriceOrigin::Market));

    let hybrid = plan.meta.pricing_hybrid.as_ref().unwrap();
    assert_eq!(hybrid.data_age_min, 90.0);
    assert_eq!(hybrid.max_age_min, 30.0);
}

#[test]
fn session_keeps_quotes_between_plans() {
    let (dir, mut opts) = setup(r#"{"USDC": 100}"#);
    let prices = write(dir.path(), "prices.json", r#"{"BTC": 50000, "USDC": 1}"#);
    opts.pricing = Some(PricingMode::Auto);
    opts.prices_file = Some(prices.clone());

    let config = Config::default();
    let session = Session::new(&config, Some(&prices)).unwrap();
    assert_eq!(session.cached_quotes(), 0);

    let first = session.compute(&opts).unwrap();
    assert!(first.meta.unpriced_symbols.is_empty());
    assert_eq!(session.cached_quotes(), 2);

    opts.target_file = write(dir.path(), "targets2.json", r#"{"BTC": 20, "USDC": 80}"#);
    let second = session.compute(&opts).unwrap();
    let btc = second.actions.iter().find(|a| a.symbol == "BTC").unwrap();
    assert_eq!(btc.price_used, Some(50000.0));
    assert_eq!(session.cached_quotes(), 2);
}

#[test]
fn auto_without_price_file_leaves_actions_unpriced() {
    let (_dir, mut opts) = setup(r#"{"USDC": 100}"#);
    opts.pricing = Some(PricingMode::Auto);

    let plan = run::compute(&Config::default(), &opts).unwrap();
    assert!(plan.actions.iter().all(|a| a.price_used.is_none()));
    assert_eq!(plan.meta.unpriced_symbols, vec!["BTC", "USDC"]);
}

#[test]
fn group_targets_buy_primary_symbols() {
    let (_dir, mut opts) = setup(
        r#"{
            "group_targets_pct": {"Stablecoins": 50, "L1/L0 majors": 50},
            "primary_symbols": {"L1/L0 majors": "ADA, AVAX"}
        }"#,
    );
    opts.grouping = Some(Grouping::Group);

    let plan = run::compute(&Config::default(), &opts).unwrap();

    let majors: Vec<_> = plan
        .actions
        .iter()
        .filter(|a| a.group == "L1/L0 majors")
        .map(|a| (a.symbol.as_str(), a.usd))
        .collect();
    assert_eq!(majors, [("ADA", 25.0), ("AVAX", 25.0)]);

    let btc: f64 = plan.actions.iter().filter(|a| a.symbol == "BTC").map(|a| a.usd).sum();
    assert_eq!(btc, -50.0);
}

#[test]
fn cli_thresholds_override_target_file() {
    let (_dir, mut opts) = setup(r#"{"targets": {"BTC": 45, "USDC": 55}, "min_trade_usd": 1}"#);
    let plan = run::compute(&Config::default(), &opts).unwrap();
    assert_eq!(plan.actions.len(), 2);

    opts.min_trade_usd = Some(10.0);
    let plan = run::compute(&Config::default(), &opts).unwrap();
    assert!(plan.actions.is_empty());
    assert_eq!(plan.deviation_bps, 500);
}

#[test]
fn bad_weight_is_reported() {
    let (_dir, opts) = setup(r#"{"BTC": "lots"}"#);
    let err = run::compute(&Config::default(), &opts).unwrap_err();
    assert!(matches!(err, Error::Plan(tradeplan::Error::InvalidWeight { .. })));
}

#[test]
fn missing_holdings_file() {
    let (_dir, mut opts) = setup(r#"{"BTC": 1}"#);
    opts.holdings_file = PathBuf::from("/nonexistent/holdings.json");
    assert!(matches!(
        run::compute(&Config::default(), &opts),
        Err(Error::HoldingsRead { .. })
    ));
}

// ============================================================================
// run (render + audit)
// ============================================================================

#[test]
fn run_renders_csv() {
    let (_dir, mut opts) = setup(r#"{"USDC": 100}"#);
    opts.format = Format::Csv;
    let out = run::run(&Config::default(), &opts).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("BTC,BTC,BTC,sell,-50.00,"));
    assert!(lines[1].ends_with(",Sell on Kraken"));
}

#[test]
fn run_appends_audit_trail() {
    let (dir, mut opts) = setup(r#"{"USDC": 100}"#);
    opts.audit = true;
    let log_dir = dir.path().join("logs");
    let config = Config::from_toml(&format!(
        "[logging]\ndir = {:?}\naudit_file = \"audit.jsonl\"\n",
        log_dir.display().to_string()
    ))
    .unwrap();

    run::run(&config, &opts).unwrap();
    run::run(&config, &opts).unwrap();

    let contents = std::fs::read_to_string(log_dir.join("audit.jsonl")).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 8);
    assert_eq!(events[0]["event"], "run_started");
    assert_eq!(events[2]["event"], "plan_computed");
    assert_eq!(events[2]["deviation_bps"], 5000);
    assert_eq!(events[3]["output"], "table");
}

// ============================================================================
// locations
// ============================================================================

#[test]
fn locations_breakdown() {
    let (_dir, opts) = setup("{}");
    let b = run::locations(&opts.holdings_file, 1.0).unwrap();
    let names: Vec<&str> = b.lines.iter().map(|l| l.location.as_str()).collect();
    assert_eq!(names, ["Binance", "Kraken", "Coinbase"]);
    assert_eq!(b.lines[0].value_usd, 10.0);
}
