//! Target file (targets.json) loading.
//!
//! Three shapes are accepted and resolved once, here, into a
//! [`TargetInput`]:
//!
//! - a map `{ "BTC": 50, "ETH": "30%" }`
//! - a list `[{ "group": "BTC", "weight_pct": 50 }, ...]`
//! - an object wrapping either under `targets` (or `group_targets_pct`),
//!   optionally with `primary_symbols` and `min_trade_usd`.

use std::collections::BTreeMap;
use std::path::Path;

use log::warn;
use serde::Deserialize;
use tradeplan::{GroupWeight, TargetInput, WeightValue};

use crate::error::{Error, Result};

/// A symbol list written either as `"A, B"` or `["A", "B"]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SymbolList {
    Csv(String),
    List(Vec<String>),
}

impl SymbolList {
    /// Upper-cased, trimmed, non-empty symbols in input order.
    pub fn symbols(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            SymbolList::Csv(s) => s.split(',').collect(),
            SymbolList::List(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetBody {
    List(Vec<GroupWeight>),
    Map(BTreeMap<String, WeightValue>),
}

impl TargetBody {
    fn into_input(self) -> TargetInput {
        match self {
            TargetBody::List(v) => TargetInput::Percentages(v),
            TargetBody::Map(m) => TargetInput::Weights(m.into_iter().collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Wrapped {
    #[serde(alias = "group_targets_pct")]
    targets: TargetBody,
    #[serde(default)]
    primary_symbols: BTreeMap<String, SymbolList>,
    #[serde(default)]
    min_trade_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetDocument {
    Wrapped(Wrapped),
    Body(TargetBody),
}

/// A resolved target file.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFile {
    pub input: TargetInput,
    /// group → symbols that receive the group's buys.
    pub primary_symbols: BTreeMap<String, Vec<String>>,
    /// Per-file override of the minimum trade size.
    pub min_trade_usd: Option<f64>,
}

impl TargetFile {
    /// Load a target file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::TargetRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: TargetDocument = serde_json::from_str(json).map_err(Error::TargetParse)?;
        let file = match doc {
            TargetDocument::Wrapped(w) => TargetFile {
                input: w.targets.into_input(),
                primary_symbols: w
                    .primary_symbols
                    .into_iter()
                    .map(|(group, list)| (group, list.symbols()))
                    .collect(),
                min_trade_usd: w.min_trade_usd,
            },
            TargetDocument::Body(b) => TargetFile {
                input: b.into_input(),
                primary_symbols: BTreeMap::new(),
                min_trade_usd: None,
            },
        };
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if let Some(m) = self.min_trade_usd {
            if !m.is_finite() || m < 0.0 {
                return Err(Error::Target(format!(
                    "min_trade_usd must be a non-negative number, got {m}"
                )));
            }
        }
        if self.input.is_empty() {
            warn!("target file has no targets; every holding will be sold");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_map_form() {
        let f = TargetFile::from_json(r#"{"BTC": 60, "ETH": "40%"}"#).unwrap();
        assert_eq!(
            f.input,
            TargetInput::Weights(vec![
                ("BTC".into(), WeightValue::Number(60.0)),
                ("ETH".into(), WeightValue::Text("40%".into())),
            ])
        );
        assert!(f.primary_symbols.is_empty());
    }

    #[test]
    fn parse_list_form() {
        let f = TargetFile::from_json(
            r#"[{"group": "BTC", "weight_pct": 70}, {"group": "ETH", "weight_pct": "30"}]"#,
        )
        .unwrap();
        match f.input {
            TargetInput::Percentages(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0].group, "BTC");
            }
            other => panic!("expected list form, got {other:?}"),
        }
    }

    #[test]
    fn parse_wrapped_form() {
        let f = TargetFile::from_json(
            r#"{
                "group_targets_pct": {"BTC": 50, "L1/L0 majors": 50},
                "primary_symbols": {"L1/L0 majors": "sol, avax", "BTC": ["btc"]},
                "min_trade_usd": 50
            }"#,
        )
        .unwrap();
        assert_eq!(f.min_trade_usd, Some(50.0));
        assert_eq!(f.primary_symbols["L1/L0 majors"], vec!["SOL", "AVAX"]);
        assert_eq!(f.primary_symbols["BTC"], vec!["BTC"]);
        let normalized = tradeplan::normalize_targets(&f.input).unwrap();
        assert!((normalized["BTC"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn map_and_list_forms_normalize_alike() {
        let map = TargetFile::from_json(r#"{"BTC": 0.25, "ETH": 0.75}"#).unwrap();
        let list = TargetFile::from_json(
            r#"[{"group": "BTC", "weight_pct": 25}, {"group": "ETH", "weight_pct": 75}]"#,
        )
        .unwrap();
        let a = tradeplan::normalize_targets(&map.input).unwrap();
        let b = tradeplan::normalize_targets(&list.input).unwrap();
        for key in ["BTC", "ETH"] {
            assert!((a[key] - b[key]).abs() < 1e-12);
        }
    }

    #[test]
    fn reject_negative_min_trade() {
        let json = r#"{"targets": {"BTC": 1}, "min_trade_usd": -5}"#;
        assert!(matches!(TargetFile::from_json(json), Err(Error::Target(_))));
    }

    #[test]
    fn reject_malformed_json() {
        assert!(matches!(
            TargetFile::from_json("[1, 2"),
            Err(Error::TargetParse(_))
        ));
    }

    #[test]
    fn empty_map_is_accepted() {
        let f = TargetFile::from_json("{}").unwrap();
        assert!(f.input.is_empty());
    }

    #[test]
    fn symbol_list_trims_and_skips_blanks() {
        let l = SymbolList::Csv(" eth , ,steth".into());
        assert_eq!(l.symbols(), vec!["ETH", "STETH"]);
    }
}
