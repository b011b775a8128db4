//! Run orchestrator: load inputs → plan → audit → render.

use std::path::{Path, PathBuf};

use log::{info, warn};
use tradeplan::{Grouping, Plan, PlanRequest, Planner, PricingMode};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::Result;
use crate::holdings::HoldingsSnapshot;
use crate::prices::{CachedPriceSource, PriceCache, PriceFile};
use crate::report::{self, Format, LocationBreakdown};
use crate::target::TargetFile;

/// Options for one planning run. `None` falls back to the target file, then
/// to the config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub holdings_file: PathBuf,
    pub target_file: PathBuf,
    pub prices_file: Option<PathBuf>,
    pub pricing: Option<PricingMode>,
    pub grouping: Option<Grouping>,
    pub min_usd: Option<f64>,
    pub min_trade_usd: Option<f64>,
    /// Override the snapshot age derived from the holdings file.
    pub data_age_min: Option<f64>,
    pub format: Format,
    pub audit: bool,
}

/// Planning session: a config plus one market price source whose quote cache
/// lives as long as the session, so consecutive plans share fresh quotes.
pub struct Session<'a> {
    config: &'a Config,
    prices: CachedPriceSource<PriceFile>,
}

impl<'a> Session<'a> {
    /// Load the price file (if any) and start with an empty quote cache.
    pub fn new(config: &'a Config, prices_file: Option<&Path>) -> Result<Self> {
        let quotes = match prices_file {
            Some(path) => PriceFile::load(path)?,
            None => PriceFile::default(),
        };
        Ok(Self {
            config,
            prices: CachedPriceSource::new(quotes, PriceCache::new(config.pricing.cache_ttl_secs)),
        })
    }

    /// Number of quotes currently cached.
    pub fn cached_quotes(&self) -> usize {
        self.prices.cache().len()
    }

    /// Compute a plan from files on disk without touching the audit trail.
    pub fn compute(&self, opts: &RunOptions) -> Result<Plan> {
        let snapshot = HoldingsSnapshot::load(&opts.holdings_file)?;
        self.plan_snapshot(opts, &snapshot)
    }

    fn plan_snapshot(&self, opts: &RunOptions, snapshot: &HoldingsSnapshot) -> Result<Plan> {
        let config = self.config;
        let target = TargetFile::load(&opts.target_file)?;

        let mut params = config.plan_params()?;
        if let Some(m) = target.min_trade_usd {
            params.min_trade_usd = m;
        }
        if let Some(m) = opts.min_trade_usd {
            params.min_trade_usd = m;
        }
        if let Some(m) = opts.min_usd {
            params.min_usd = m;
        }
        if let Some(g) = opts.grouping {
            params.grouping = g;
        }

        let mut taxonomy = config.taxonomy();
        for (group, symbols) in &target.primary_symbols {
            taxonomy.set_primary_symbols(group, symbols);
        }

        let mode = match opts.pricing {
            Some(m) => m,
            None => config.pricing_mode()?,
        };
        if mode != PricingMode::Local && opts.prices_file.is_none() {
            warn!("{mode} pricing without a price file; market prices unavailable");
        }

        let request = PlanRequest {
            rows: snapshot.rows.clone(),
            targets: target.input,
            params,
            pricing_mode: mode,
            data_age_minutes: opts.data_age_min.unwrap_or(snapshot.data_age_minutes),
            source_used: snapshot.source_used.clone(),
        };

        let plan = Planner::new(&taxonomy, &self.prices)
            .with_pricing_config(config.pricing_config())
            .compute(&request)?;

        if !plan.unknown_aliases.is_empty() {
            info!(
                "no taxonomy entry for {}; grouped as Others",
                plan.unknown_aliases.join(", ")
            );
        }
        Ok(plan)
    }

    /// Full run: plan, audit and render. Returns the rendered output.
    pub fn run(&self, opts: &RunOptions) -> Result<String> {
        let config = self.config;
        let mut audit = if opts.audit {
            Some(AuditLog::open(&config.audit_path())?)
        } else {
            None
        };
        let mode = match opts.pricing {
            Some(m) => m.to_string(),
            None => config.pricing.mode.clone(),
        };
        if let Some(log) = audit.as_mut() {
            audit::log_run_started(
                log,
                &opts.holdings_file.display().to_string(),
                &opts.target_file.display().to_string(),
                &mode,
            )?;
        }

        let snapshot = HoldingsSnapshot::load(&opts.holdings_file)?;
        if let Some(log) = audit.as_mut() {
            audit::log_holdings_loaded(log, &snapshot)?;
        }

        let plan = self.plan_snapshot(opts, &snapshot)?;
        if let Some(log) = audit.as_mut() {
            audit::log_plan_computed(log, &plan)?;
        }

        let output = report::render(&plan, opts.format)?;
        if let Some(log) = audit.as_mut() {
            let format = format!("{:?}", opts.format).to_lowercase();
            audit::log_run_completed(log, &plan, &format)?;
        }
        Ok(output)
    }
}

/// One-shot [`Session::compute`] using `opts.prices_file`.
pub fn compute(config: &Config, opts: &RunOptions) -> Result<Plan> {
    Session::new(config, opts.prices_file.as_deref())?.compute(opts)
}

/// One-shot [`Session::run`] using `opts.prices_file`.
pub fn run(config: &Config, opts: &RunOptions) -> Result<String> {
    Session::new(config, opts.prices_file.as_deref())?.run(opts)
}

/// Per-location breakdown of a holdings file.
pub fn locations(holdings_file: &Path, min_usd: f64) -> Result<LocationBreakdown> {
    let snapshot = HoldingsSnapshot::load(holdings_file)?;
    let rows = tradeplan::filter_dust(&snapshot.rows, min_usd);
    Ok(LocationBreakdown::from_rows(&rows))
}
