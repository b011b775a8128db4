//! Holding-location names and sell priority.
//!
//! Upstream sources spell the same venue many ways ("kraken", "Kraken
//! Balance", "KRAKEN_WALLET"). [`normalize_location`] folds these into one
//! title-cased name, and [`location_rank`] orders venues for draining:
//! fast centralized exchanges first, cold storage and generic buckets last,
//! unlisted names after everything else.

use std::fmt;

use crate::side::Side;
use crate::types::UNKNOWN_LOCATION;

/// Venue class, in drain order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocationTier {
    FastExchange,
    SoftwareWallet,
    Defi,
    ColdStorage,
    Generic,
    Unlisted,
}

impl fmt::Display for LocationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocationTier::FastExchange => "CEX",
            LocationTier::SoftwareWallet => "Software",
            LocationTier::Defi => "DeFi",
            LocationTier::ColdStorage => "Cold",
            LocationTier::Generic => "Generic",
            LocationTier::Unlisted => "Unlisted",
        };
        f.write_str(s)
    }
}

/// Total order over venues: tier first, then position within the tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationRank {
    pub tier: LocationTier,
    pub rank: u8,
}

/// Named venues, in normalized form, ranked within their tier by position.
const PRIORITY_TABLE: &[(&str, LocationTier)] = &[
    ("Binance", LocationTier::FastExchange),
    ("Kraken", LocationTier::FastExchange),
    ("Coinbase", LocationTier::FastExchange),
    ("Bitget", LocationTier::FastExchange),
    ("Bybit", LocationTier::FastExchange),
    ("Okx", LocationTier::FastExchange),
    ("Huobi", LocationTier::FastExchange),
    ("Kucoin", LocationTier::FastExchange),
    ("Poloniex", LocationTier::FastExchange),
    ("Kraken Earn", LocationTier::FastExchange),
    ("Coinbase Pro", LocationTier::FastExchange),
    ("Bittrex", LocationTier::FastExchange),
    ("Bitstamp", LocationTier::FastExchange),
    ("Gemini", LocationTier::FastExchange),
    ("Swissborg", LocationTier::FastExchange),
    ("Metamask", LocationTier::SoftwareWallet),
    ("Phantom", LocationTier::SoftwareWallet),
    ("Rabby", LocationTier::SoftwareWallet),
    ("Trustwallet", LocationTier::SoftwareWallet),
    ("Trust", LocationTier::SoftwareWallet),
    ("Defi", LocationTier::Defi),
    ("Uniswap", LocationTier::Defi),
    ("Pancakeswap", LocationTier::Defi),
    ("Sushiswap", LocationTier::Defi),
    ("Curve", LocationTier::Defi),
    ("Aave", LocationTier::Defi),
    ("Lido", LocationTier::Defi),
    ("Rocket Pool", LocationTier::Defi),
    ("Jupiter", LocationTier::Defi),
    ("Osmosis", LocationTier::Defi),
    ("Thorchain", LocationTier::Defi),
    ("Ledger", LocationTier::ColdStorage),
    ("Trezor", LocationTier::ColdStorage),
    ("Cold Storage", LocationTier::ColdStorage),
    ("Portfolio", LocationTier::Generic),
    ("Cointracking", LocationTier::Generic),
    ("Demo", LocationTier::Generic),
    ("Manually", LocationTier::Generic),
    (UNKNOWN_LOCATION, LocationTier::Generic),
];

/// Fallback for names not in the table: chain wallets reported as
/// "<Chain> <address or label>". Matched on the normalized name's prefix and
/// ranked after every exact entry of the same tier.
const PREFIX_TABLE: &[(&str, LocationTier)] = &[
    ("Metamask", LocationTier::SoftwareWallet),
    ("Solana", LocationTier::SoftwareWallet),
    ("Ron", LocationTier::SoftwareWallet),
    ("Siacoin", LocationTier::SoftwareWallet),
    ("Vsync", LocationTier::SoftwareWallet),
];

const PREFIX_RANK_OFFSET: u8 = 100;

const LOCATION_SUFFIXES: &[&str] = &[" Balance", " Wallets", " Wallet", " Account"];

/// Canonical spelling of a location label.
///
/// Trims, maps `_`/`-` to spaces, collapses whitespace, title-cases each
/// word and strips one trailing `Balance`/`Wallet(s)`/`Account` suffix.
/// Blank labels become `"Unknown"`.
pub fn normalize_location(raw: &str) -> String {
    let spaced = raw.replace(['_', '-'], " ");
    let mut name = spaced
        .split_whitespace()
        .map(title_word)
        .collect::<Vec<_>>()
        .join(" ");

    for suffix in LOCATION_SUFFIXES {
        if name.len() > suffix.len() && name.ends_with(suffix) {
            name.truncate(name.len() - suffix.len());
            break;
        }
    }

    if name.is_empty() {
        UNKNOWN_LOCATION.to_string()
    } else {
        name
    }
}

fn title_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Drain priority of a raw location label (lower sorts first).
pub fn location_rank(raw: &str) -> LocationRank {
    let name = normalize_location(raw);

    if let Some(pos) = PRIORITY_TABLE.iter().position(|(n, _)| *n == name) {
        return LocationRank {
            tier: PRIORITY_TABLE[pos].1,
            rank: pos as u8,
        };
    }

    if let Some(pos) = PREFIX_TABLE
        .iter()
        .position(|(prefix, _)| name.starts_with(prefix))
    {
        return LocationRank {
            tier: PREFIX_TABLE[pos].1,
            rank: PREFIX_RANK_OFFSET + pos as u8,
        };
    }

    LocationRank {
        tier: LocationTier::Unlisted,
        rank: u8::MAX,
    }
}

/// Venue class of a raw location label.
pub fn location_tier(raw: &str) -> LocationTier {
    location_rank(raw).tier
}

/// Short execution guidance for a trade at `location`.
///
/// ```
/// use tradeplan::{exec_hint, Side};
///
/// assert_eq!(exec_hint("binance balance", Side::Sell), "Sell on Binance");
/// assert_eq!(exec_hint("Uniswap", Side::Buy), "Buy on Uniswap (DeFi)");
/// assert_eq!(exec_hint("Ledger Wallets", Side::Buy), "Buy on Ledger (manual)");
/// ```
pub fn exec_hint(location: &str, side: Side) -> String {
    let name = normalize_location(location);
    let verb = match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    };
    match (location_tier(&name), side) {
        (LocationTier::FastExchange, _) => format!("{verb} on {name}"),
        (LocationTier::SoftwareWallet, _) => format!("{verb} on {name} (DApp)"),
        (LocationTier::Defi, _) => format!("{verb} on {name} (DeFi)"),
        (_, Side::Sell) => format!("{verb} on {name} (complex)"),
        (_, Side::Buy) => format!("{verb} on {name} (manual)"),
    }
}
