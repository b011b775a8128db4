//! Target weight normalization.
//!
//! Targets arrive either as a key → weight mapping or as a list of
//! `{group, weight_pct}` entries (percent, 0 to 100). Both are resolved into a
//! [`TargetMap`] whose weights sum to 1.0 unless every weight is zero.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Target weight per group/symbol key, iterated in key order.
pub type TargetMap = BTreeMap<String, f64>;

/// Tolerance on the normalized weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A raw weight as supplied by the caller: a number or numeric text.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum WeightValue {
    Number(f64),
    Text(String),
}

impl WeightValue {
    fn parse(&self, key: &str) -> Result<f64> {
        let weight = match self {
            WeightValue::Number(w) => *w,
            WeightValue::Text(raw) => {
                raw.trim()
                    .trim_end_matches('%')
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidWeight {
                        key: key.to_string(),
                        raw: raw.clone(),
                    })?
            }
        };
        if !weight.is_finite() {
            return Err(Error::NonFiniteWeight {
                key: key.to_string(),
            });
        }
        if weight < 0.0 {
            return Err(Error::NegativeWeight {
                key: key.to_string(),
                weight,
            });
        }
        Ok(weight)
    }
}

impl From<f64> for WeightValue {
    fn from(w: f64) -> Self {
        WeightValue::Number(w)
    }
}

impl From<&str> for WeightValue {
    fn from(s: &str) -> Self {
        WeightValue::Text(s.to_string())
    }
}

/// One entry of the list form: a group and its weight in percent.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupWeight {
    pub group: String,
    pub weight_pct: WeightValue,
}

/// Target weights in either accepted shape.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetInput {
    /// Key → weight. Any scale; normalization rescales.
    Weights(Vec<(String, WeightValue)>),
    /// `{group, weight_pct}` with percentages in 0 to 100.
    Percentages(Vec<GroupWeight>),
}

impl TargetInput {
    /// Build the mapping form from plain `(key, weight)` pairs.
    pub fn weights<K: AsRef<str>>(pairs: &[(K, f64)]) -> Self {
        TargetInput::Weights(
            pairs
                .iter()
                .map(|(k, w)| (k.as_ref().to_string(), WeightValue::Number(*w)))
                .collect(),
        )
    }

    /// Build the list form from plain `(group, percent)` pairs.
    pub fn percentages<K: AsRef<str>>(pairs: &[(K, f64)]) -> Self {
        TargetInput::Percentages(
            pairs
                .iter()
                .map(|(g, pct)| GroupWeight {
                    group: g.as_ref().to_string(),
                    weight_pct: WeightValue::Number(*pct),
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TargetInput::Weights(w) => w.is_empty(),
            TargetInput::Percentages(p) => p.is_empty(),
        }
    }
}

/// Parse and normalize targets.
///
/// Every weight is validated first; a single unparseable, negative or
/// non-finite weight rejects the whole input. Duplicate keys are summed.
/// When the sum is positive and off 1.0 by more than
/// [`WEIGHT_SUM_TOLERANCE`], all weights are scaled by `1/sum`. An all-zero
/// map is returned unchanged.
pub fn normalize_targets(input: &TargetInput) -> Result<TargetMap> {
    let mut map = TargetMap::new();

    match input {
        TargetInput::Weights(pairs) => {
            for (key, value) in pairs {
                let key = clean_key(key)?;
                let w = value.parse(&key)?;
                *map.entry(key).or_insert(0.0) += w;
            }
        }
        TargetInput::Percentages(entries) => {
            for entry in entries {
                let key = clean_key(&entry.group)?;
                let pct = entry.weight_pct.parse(&key)?;
                *map.entry(key).or_insert(0.0) += pct / 100.0;
            }
        }
    }

    Ok(rescale(map))
}

/// Rescale an already-validated map so its weights sum to 1.0.
pub fn rescale(mut map: TargetMap) -> TargetMap {
    let sum: f64 = map.values().sum();
    if sum > 0.0 && (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        for w in map.values_mut() {
            *w /= sum;
        }
    }
    map
}

fn clean_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(map: &TargetMap) -> f64 {
        map.values().sum()
    }

    #[test]
    fn already_normalized_is_untouched() {
        let map = normalize_targets(&TargetInput::weights(&[("BTC", 0.6), ("ETH", 0.4)])).unwrap();
        assert_eq!(map["BTC"], 0.6);
        assert_eq!(map["ETH"], 0.4);
    }

    #[test]
    fn rescales_to_one() {
        let map = normalize_targets(&TargetInput::weights(&[("BTC", 3.0), ("ETH", 1.0)])).unwrap();
        assert!((sum(&map) - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        assert!((map["BTC"] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn percentages_are_converted() {
        let map = normalize_targets(&TargetInput::percentages(&[
            ("BTC", 40.0),
            ("ETH", 30.0),
            ("Stablecoins", 30.0),
        ]))
        .unwrap();
        assert!((map["BTC"] - 0.4).abs() < 1e-12);
        assert!((map["Stablecoins"] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn percentages_not_summing_to_hundred_are_rescaled() {
        let map =
            normalize_targets(&TargetInput::percentages(&[("BTC", 30.0), ("ETH", 30.0)])).unwrap();
        assert!((map["BTC"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_zero_left_unchanged() {
        let map = normalize_targets(&TargetInput::weights(&[("BTC", 0.0), ("ETH", 0.0)])).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(sum(&map), 0.0);
    }

    #[test]
    fn empty_input_gives_empty_map() {
        let map = normalize_targets(&TargetInput::Weights(vec![])).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn numeric_text_is_accepted() {
        let input = TargetInput::Weights(vec![
            ("BTC".into(), WeightValue::from("50")),
            ("ETH".into(), WeightValue::from("50 %")),
        ]);
        let map = normalize_targets(&input).unwrap();
        assert!((map["ETH"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reject_unparseable_weight() {
        let input = TargetInput::Weights(vec![
            ("BTC".into(), WeightValue::from(0.5)),
            ("ETH".into(), WeightValue::from("lots")),
        ]);
        let err = normalize_targets(&input).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidWeight {
                key: "ETH".into(),
                raw: "lots".into()
            }
        );
    }

    #[test]
    fn reject_negative_weight() {
        let err = normalize_targets(&TargetInput::weights(&[("BTC", -0.1)])).unwrap_err();
        assert!(matches!(err, Error::NegativeWeight { .. }));
    }

    #[test]
    fn reject_nan_weight() {
        let err = normalize_targets(&TargetInput::weights(&[("BTC", f64::NAN)])).unwrap_err();
        assert!(matches!(err, Error::NonFiniteWeight { .. }));
    }

    #[test]
    fn reject_empty_key() {
        let err = normalize_targets(&TargetInput::weights(&[("  ", 1.0)])).unwrap_err();
        assert_eq!(err, Error::EmptyKey);
    }

    #[test]
    fn duplicate_keys_are_summed() {
        let map = normalize_targets(&TargetInput::percentages(&[
            ("BTC", 25.0),
            ("BTC", 25.0),
            ("ETH", 50.0),
        ]))
        .unwrap();
        assert_eq!(map.len(), 2);
        assert!((map["BTC"] - 0.5).abs() < 1e-12);
    }
}
