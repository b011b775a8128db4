//! tradeplan-rebalancer: command-line rebalance planning on top of `tradeplan`.
//!
//! Reads a holdings snapshot and target weights from JSON files, computes a
//! located and priced plan, renders it as a table, JSON or CSV, and appends
//! the run to a JSONL audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod holdings;
pub mod prices;
pub mod report;
pub mod run;
pub mod target;
