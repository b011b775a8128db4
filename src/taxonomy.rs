//! Symbol → group taxonomy.
//!
//! The planning core only needs three answers from a taxonomy: which group a
//! symbol belongs to, whether the symbol is known at all (unknown symbols are
//! reported back for alias learning), and which symbols to buy when a group
//! is under-weight. [`StaticTaxonomy`] is an in-memory implementation seeded
//! with a small built-in alias table.

use rustc_hash::FxHashMap;

/// Group assigned to symbols the taxonomy does not recognise.
pub const FALLBACK_GROUP: &str = "Others";

/// Group holding fiat and stablecoins.
pub const STABLECOIN_GROUP: &str = "Stablecoins";

/// Symbol bought for an under-weight [`STABLECOIN_GROUP`] with no holdings.
pub const CASH_SYMBOL: &str = "USD";

/// Read-only taxonomy lookups used by the planner.
pub trait Taxonomy {
    /// Group for a symbol (already upper-cased), if known.
    fn group_of(&self, symbol: &str) -> Option<&str>;

    /// Whether the symbol has an explicit alias entry.
    fn is_known(&self, symbol: &str) -> bool;

    /// Preferred symbols to buy for a group. Empty means "no preference".
    fn primary_symbols(&self, group: &str) -> &[String];

    /// Group for a symbol, falling back to [`FALLBACK_GROUP`].
    fn group_or_fallback(&self, symbol: &str) -> &str {
        self.group_of(symbol).unwrap_or(FALLBACK_GROUP)
    }

    /// Symbol to buy for a group with no holdings and no primary symbols.
    ///
    /// Stablecoins resolve to [`CASH_SYMBOL`]; a group named after one of its
    /// own symbols (BTC, ETH, ...) resolves to that symbol. Any other group
    /// has no tradeable default.
    fn default_buy_symbol(&self, group: &str) -> Option<String> {
        if group == STABLECOIN_GROUP {
            return Some(CASH_SYMBOL.to_string());
        }
        let symbol = group.trim().to_uppercase();
        (self.group_of(&symbol) == Some(group)).then_some(symbol)
    }
}

const STABLES: &[&str] = &["USD", "USDT", "USDC", "EUR", "TUSD", "DAI"];

const L1_MAJORS: &[&str] = &[
    "XRP", "BNB", "XMR", "ADA", "NEAR", "ATOM", "XLM", "SUI", "TRX", "LTC", "DOT", "AVAX", "XTZ",
    "EGLD", "ETC", "TON", "ALGO", "KAVA", "FIL", "TIA", "APT", "ICP",
];

/// In-memory taxonomy: alias table plus per-group primary symbols.
#[derive(Clone, Debug, Default)]
pub struct StaticTaxonomy {
    aliases: FxHashMap<String, String>,
    primary: FxHashMap<String, Vec<String>>,
}

impl StaticTaxonomy {
    /// An empty taxonomy: every symbol is unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Taxonomy seeded with the built-in majors/stablecoin table.
    pub fn builtin() -> Self {
        let mut tx = Self::new();
        tx.insert("BTC", "BTC");
        for wrapped in ["WBTC", "TBTC"] {
            tx.insert(wrapped, "BTC");
        }
        tx.insert("ETH", "ETH");
        for staked in ["STETH", "WSTETH", "RETH", "WETH"] {
            tx.insert(staked, "ETH");
        }
        tx.insert("SOL", "SOL");
        tx.insert("JITOSOL", "SOL");
        for s in STABLES {
            tx.insert(s, STABLECOIN_GROUP);
        }
        for s in L1_MAJORS {
            tx.insert(s, "L1/L0 majors");
        }
        tx
    }

    /// Map a symbol to a group, replacing any previous mapping.
    pub fn insert(&mut self, symbol: &str, group: &str) {
        self.aliases
            .insert(symbol.trim().to_uppercase(), group.trim().to_string());
    }

    /// Set the preferred buy symbols for a group.
    pub fn set_primary_symbols(&mut self, group: &str, symbols: &[String]) {
        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.primary.insert(group.trim().to_string(), symbols);
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Taxonomy for StaticTaxonomy {
    fn group_of(&self, symbol: &str) -> Option<&str> {
        self.aliases.get(symbol).map(String::as_str)
    }

    fn is_known(&self, symbol: &str) -> bool {
        self.aliases.contains_key(symbol)
    }

    fn primary_symbols(&self, group: &str) -> &[String] {
        self.primary.get(group).map(Vec::as_slice).unwrap_or(&[])
    }
}
