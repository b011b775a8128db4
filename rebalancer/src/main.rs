//! CLI entry point for the rebalance planner.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::warn;

use tradeplan::{Grouping, PricingMode};
use tradeplan_rebalancer::config::Config;
use tradeplan_rebalancer::report::Format;
use tradeplan_rebalancer::run::{self, RunOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalance planner: holdings + targets → located, priced trades")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults apply if it does not exist)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a rebalance plan
    Plan {
        /// Path to holdings.json
        holdings: PathBuf,

        /// Path to targets.json
        targets: PathBuf,

        /// Market prices (JSON map symbol → price)
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Pricing mode: local, auto (market) or hybrid
        #[arg(long, value_parser = parse_pricing)]
        pricing: Option<PricingMode>,

        /// Aggregate by symbol or by taxonomy group
        #[arg(long, value_parser = parse_grouping)]
        grouping: Option<Grouping>,

        /// Ignore holdings worth less than this (USD)
        #[arg(long)]
        min_usd: Option<f64>,

        /// Smallest trade to emit (USD)
        #[arg(long)]
        min_trade_usd: Option<f64>,

        /// Snapshot age in minutes, overriding the file timestamp
        #[arg(long)]
        data_age_min: Option<f64>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        /// Do not append to the audit trail
        #[arg(long)]
        no_audit: bool,
    },

    /// Show holdings per location, in sell-priority order
    Locations {
        /// Path to holdings.json
        holdings: PathBuf,

        /// Ignore holdings worth less than this (USD)
        #[arg(long, default_value_t = tradeplan::DEFAULT_MIN_USD)]
        min_usd: f64,
    },
}

fn parse_pricing(s: &str) -> Result<PricingMode, String> {
    s.parse().map_err(|e: tradeplan::Error| e.to_string())
}

fn parse_grouping(s: &str) -> Result<Grouping, String> {
    s.parse().map_err(|e: tradeplan::Error| e.to_string())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {e}");
                process::exit(1);
            }
        }
    } else {
        warn!("{} not found, using defaults", cli.config.display());
        Config::default()
    };

    let result = match cli.command {
        Command::Plan {
            holdings,
            targets,
            prices,
            pricing,
            grouping,
            min_usd,
            min_trade_usd,
            data_age_min,
            format,
            no_audit,
        } => {
            let opts = RunOptions {
                holdings_file: holdings,
                target_file: targets,
                prices_file: prices,
                pricing,
                grouping,
                min_usd,
                min_trade_usd,
                data_age_min,
                format,
                audit: !no_audit,
            };
            run::run(&config, &opts)
        }
        Command::Locations { holdings, min_usd } => {
            run::locations(&holdings, min_usd).map(|b| b.to_string())
        }
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
