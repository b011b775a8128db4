//! Market price sources: a JSON price file and a TTL cache in front of any
//! [`PriceSource`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rustc_hash::FxHashMap;
use tradeplan::{MarketQuotes, PriceSource};

use crate::error::{Error, Result};

/// Static quotes loaded from `{ "BTC": 65000.0, "FOO": null }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFile {
    quotes: BTreeMap<String, Option<f64>>,
}

impl PriceFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::PricesRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Option<f64>> =
            serde_json::from_str(json).map_err(Error::PricesParse)?;
        Ok(Self {
            quotes: raw
                .into_iter()
                .map(|(s, p)| (s.trim().to_uppercase(), p))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl PriceSource for PriceFile {
    fn prices_usd(&self, symbols: &[String]) -> MarketQuotes {
        symbols
            .iter()
            .map(|s| (s.clone(), self.quotes.get(&s.to_uppercase()).copied().flatten()))
            .collect()
    }
}

/// Time source for cache expiry.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// symbol → (price, fetched_at), valid for `ttl`.
pub struct PriceCache<C: Clock = SystemClock> {
    ttl: Duration,
    entries: RefCell<FxHashMap<String, (f64, DateTime<Utc>)>>,
    clock: C,
}

impl PriceCache<SystemClock> {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_clock(ttl_secs, SystemClock)
    }
}

impl<C: Clock> PriceCache<C> {
    pub fn with_clock(ttl_secs: u64, clock: C) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
            entries: RefCell::new(FxHashMap::default()),
            clock,
        }
    }

    /// Cached price if it is younger than the TTL.
    pub fn get(&self, symbol: &str) -> Option<f64> {
        let now = self.clock.now();
        self.entries
            .borrow()
            .get(symbol)
            .filter(|(_, at)| now - *at < self.ttl)
            .map(|(p, _)| *p)
    }

    pub fn insert(&self, symbol: &str, price: f64) {
        self.entries
            .borrow_mut()
            .insert(symbol.to_string(), (price, self.clock.now()));
    }

    /// Drop expired entries.
    pub fn purge(&self) {
        let now = self.clock.now();
        self.entries.borrow_mut().retain(|_, (_, at)| now - *at < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// A [`PriceSource`] that answers from the cache and fetches the misses from
/// `inner` in a single call.
pub struct CachedPriceSource<S, C: Clock = SystemClock> {
    inner: S,
    cache: PriceCache<C>,
}

impl<S: PriceSource, C: Clock> CachedPriceSource<S, C> {
    pub fn new(inner: S, cache: PriceCache<C>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &PriceCache<C> {
        &self.cache
    }
}

impl<S: PriceSource, C: Clock> PriceSource for CachedPriceSource<S, C> {
    fn prices_usd(&self, symbols: &[String]) -> MarketQuotes {
        let mut out = MarketQuotes::default();
        let mut misses = Vec::new();
        for s in symbols {
            let key = s.to_uppercase();
            match self.cache.get(&key) {
                Some(p) => {
                    out.insert(s.clone(), Some(p));
                }
                None => misses.push(s.clone()),
            }
        }
        if misses.is_empty() {
            return out;
        }

        debug!(
            "prices: {} cached, fetching {}",
            symbols.len() - misses.len(),
            misses.len()
        );
        let fetched = self.inner.prices_usd(&misses);
        for s in misses {
            let price = fetched
                .get(&s)
                .copied()
                .flatten()
                .filter(|p| p.is_finite() && *p > 0.0);
            if let Some(p) = price {
                self.cache.insert(&s.to_uppercase(), p);
            }
            out.insert(s, price);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        quotes: FxHashMap<String, f64>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl CountingSource {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Self {
                quotes: pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PriceSource for &CountingSource {
        fn prices_usd(&self, symbols: &[String]) -> MarketQuotes {
            self.calls.borrow_mut().push(symbols.to_vec());
            symbols
                .iter()
                .map(|s| (s.clone(), self.quotes.get(s).copied()))
                .collect()
        }
    }

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn price_file_lookup() {
        let f = PriceFile::from_json(r#"{"btc": 65000.5, "FOO": null}"#).unwrap();
        assert_eq!(f.len(), 2);
        let q = f.prices_usd(&syms(&["BTC", "FOO", "BAR"]));
        assert_eq!(q["BTC"], Some(65000.5));
        assert_eq!(q["FOO"], None);
        assert_eq!(q["BAR"], None);
    }

    #[test]
    fn price_file_rejects_garbage() {
        assert!(matches!(
            PriceFile::from_json(r#"{"BTC": "high"}"#),
            Err(Error::PricesParse(_))
        ));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let clock = ManualClock::new(Utc::now());
        let cache = PriceCache::with_clock(120, &clock);
        cache.insert("BTC", 65000.0);
        assert_eq!(cache.get("BTC"), Some(65000.0));

        clock.advance(Duration::seconds(119));
        assert_eq!(cache.get("BTC"), Some(65000.0));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("BTC"), None);
        assert_eq!(cache.len(), 1);
        cache.purge();
        assert!(cache.is_empty());
    }

    #[test]
    fn misses_are_fetched_in_one_batch() {
        let source = CountingSource::new(&[("BTC", 65000.0), ("ETH", 3000.0)]);
        let clock = ManualClock::new(Utc::now());
        let cached = CachedPriceSource::new(&source, PriceCache::with_clock(60, &clock));

        let q = cached.prices_usd(&syms(&["BTC", "ETH", "XYZ"]));
        assert_eq!(q["BTC"], Some(65000.0));
        assert_eq!(q["XYZ"], None);
        assert_eq!(source.calls.borrow().len(), 1);
        assert_eq!(source.calls.borrow()[0].len(), 3);

        // fresh hits are served without calling the source; the unknown symbol is retried
        let q = cached.prices_usd(&syms(&["BTC", "ETH", "XYZ"]));
        assert_eq!(q["ETH"], Some(3000.0));
        assert_eq!(source.calls.borrow().len(), 2);
        assert_eq!(source.calls.borrow()[1], syms(&["XYZ"]));

        let _ = cached.prices_usd(&syms(&["BTC"]));
        assert_eq!(source.calls.borrow().len(), 2);

        clock.advance(Duration::seconds(61));
        let _ = cached.prices_usd(&syms(&["BTC"]));
        assert_eq!(source.calls.borrow().len(), 3);
    }
}
