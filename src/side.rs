//! Trade direction derived from a signed USD amount.

use std::fmt;

/// Direction of a planned trade.
///
/// Never stored on its own: an [`Action`](crate::Action) carries a signed
/// `usd` and its side is derived from the sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side implied by a signed USD amount (positive = buy, otherwise sell).
    #[inline]
    pub fn from_usd(usd: f64) -> Self {
        if usd > 0.0 { Side::Buy } else { Side::Sell }
    }

    /// Lowercase label used in exports and hints.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
