//! Core types: HoldingRow, Action, PriceOrigin

use std::fmt;

use crate::side::Side;

/// Location label used when a holding or sell cannot be tied to a venue.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Decimal places kept on estimated quantities (crypto-asset precision).
pub const QUANTITY_DECIMALS: i32 = 8;

/// A quantity of one asset at one location with its USD value.
///
/// Rows are produced per request by a balance source and are immutable for
/// the duration of a plan computation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HoldingRow {
    pub symbol: String,
    pub alias: String,
    pub amount: f64,
    pub value_usd: f64,
    pub location: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub group: Option<String>,
}

impl HoldingRow {
    /// Create a row at the `"Unknown"` location.
    ///
    /// The symbol is upper-cased and doubles as the alias. Negative or
    /// non-finite amounts and values are clamped to zero.
    pub fn new(symbol: &str, amount: f64, value_usd: f64) -> Self {
        let symbol = symbol.trim().to_uppercase();
        Self {
            alias: symbol.clone(),
            symbol,
            amount: non_negative(amount),
            value_usd: non_negative(value_usd),
            location: UNKNOWN_LOCATION.to_string(),
            group: None,
        }
    }

    /// Set the holding location. Blank labels keep the `"Unknown"` sentinel.
    pub fn at(mut self, location: &str) -> Self {
        let location = location.trim();
        if !location.is_empty() {
            self.location = location.to_string();
        }
        self
    }

    /// Set the taxonomy group reported by the balance source.
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// Set the display alias.
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_uppercase();
        self
    }
}

fn non_negative(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 { x } else { 0.0 }
}

/// Where an action's execution price came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PriceOrigin {
    /// `value_usd / amount` from the holdings snapshot.
    Local,
    /// External market price lookup.
    Market,
}

impl fmt::Display for PriceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceOrigin::Local => write!(f, "local"),
            PriceOrigin::Market => write!(f, "market"),
        }
    }
}

/// One planned trade.
///
/// `usd` is signed (positive = buy, negative = sell) and is the only source
/// of truth for direction. Location and price fields are filled in by later
/// pipeline stages.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    pub group: String,
    pub symbol: String,
    pub alias: String,
    pub usd: f64,
    pub location: Option<String>,
    pub price_used: Option<f64>,
    pub price_source: Option<PriceOrigin>,
    pub est_quantity: Option<f64>,
    pub exec_hint: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fee_estimated_usd: Option<f64>,
}

impl Action {
    pub fn new(group: &str, symbol: &str, alias: &str, usd: f64) -> Self {
        Self {
            group: group.to_string(),
            symbol: symbol.to_string(),
            alias: alias.to_string(),
            usd,
            location: None,
            price_used: None,
            price_source: None,
            est_quantity: None,
            exec_hint: None,
            fee_estimated_usd: None,
        }
    }

    /// Direction derived from the sign of `usd`.
    #[inline]
    pub fn side(&self) -> Side {
        Side::from_usd(self.usd)
    }

    #[inline]
    pub fn is_sell(&self) -> bool {
        self.usd < 0.0
    }

    /// True if a venue has been chosen (anything but missing or `"Unknown"`).
    pub fn has_concrete_location(&self) -> bool {
        self.location
            .as_deref()
            .is_some_and(|loc| !loc.is_empty() && loc != UNKNOWN_LOCATION)
    }

    /// Copy of this action re-targeted at `location` for `usd`.
    pub fn split(&self, usd: f64, location: &str) -> Self {
        Self {
            usd,
            location: Some(location.to_string()),
            ..self.clone()
        }
    }
}

/// Round to `decimals` places.
pub(crate) fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}
