//! TOML configuration loading and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tradeplan::{
    DEFAULT_FEE_BPS, DEFAULT_MIN_TRADE_USD, DEFAULT_MIN_USD, Grouping, PlanParams, PricingConfig,
    PricingMode, StaticTaxonomy,
};

use crate::error::{Error, Result};
use crate::target::SymbolList;

/// Top-level configuration. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanningConfig {
    #[serde(default = "default_min_usd")]
    pub min_usd: f64,
    #[serde(default = "default_min_trade")]
    pub min_trade_usd: f64,
    #[serde(default = "default_grouping")]
    pub grouping: String,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: f64,
}

fn default_min_usd() -> f64 {
    DEFAULT_MIN_USD
}
fn default_min_trade() -> f64 {
    DEFAULT_MIN_TRADE_USD
}
fn default_grouping() -> String {
    "symbol".into()
}
fn default_fee_bps() -> f64 {
    DEFAULT_FEE_BPS
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            min_usd: default_min_usd(),
            min_trade_usd: default_min_trade(),
            grouping: default_grouping(),
            fee_bps: default_fee_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingSection {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_max_age")]
    pub hybrid_max_age_minutes: f64,
    #[serde(default = "default_max_deviation")]
    pub hybrid_max_deviation_pct: f64,
    /// Lifetime of cached market quotes. The cache belongs to a
    /// `run::Session`, so a one-shot CLI invocation always starts cold.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub diagnostics: bool,
}

fn default_mode() -> String {
    "local".into()
}
fn default_max_age() -> f64 {
    30.0
}
fn default_max_deviation() -> f64 {
    5.0
}
fn default_cache_ttl() -> u64 {
    120
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            hybrid_max_age_minutes: default_max_age(),
            hybrid_max_deviation_pct: default_max_deviation(),
            cache_ttl_secs: default_cache_ttl(),
            diagnostics: false,
        }
    }
}

/// Extra symbol → group entries layered over the built-in taxonomy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub primary_symbols: BTreeMap<String, SymbolList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        self.plan_params()?;
        self.pricing_mode()?;
        self.pricing_config().validate().map_err(Error::Config)?;
        if self.logging.audit_file.trim().is_empty() {
            return Err(Error::Config("audit_file must not be empty".into()));
        }
        Ok(())
    }

    /// Thresholds and grouping for the diff engine.
    pub fn plan_params(&self) -> Result<PlanParams> {
        let grouping: Grouping = self
            .planning
            .grouping
            .parse()
            .map_err(|e: tradeplan::Error| Error::Config(e.to_string()))?;
        let params = PlanParams {
            min_usd: self.planning.min_usd,
            min_trade_usd: self.planning.min_trade_usd,
            grouping,
            fee_bps: self.planning.fee_bps,
        };
        params
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(params)
    }

    pub fn pricing_mode(&self) -> Result<PricingMode> {
        self.pricing
            .mode
            .parse()
            .map_err(|e: tradeplan::Error| Error::Config(e.to_string()))
    }

    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            hybrid_max_age_minutes: self.pricing.hybrid_max_age_minutes,
            hybrid_max_deviation_pct: self.pricing.hybrid_max_deviation_pct,
            diagnostics: self.pricing.diagnostics,
        }
    }

    /// Built-in taxonomy with this config's aliases and primary symbols applied.
    pub fn taxonomy(&self) -> StaticTaxonomy {
        let mut taxonomy = StaticTaxonomy::builtin();
        for (symbol, group) in &self.taxonomy.aliases {
            taxonomy.insert(symbol, group);
        }
        for (group, list) in &self.taxonomy.primary_symbols {
            taxonomy.set_primary_symbols(group, &list.symbols());
        }
        taxonomy
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
