use crate::error::{PortfolioError, Result};
use crate::models::{Freshness, Quote, QuoteLookup, UpdateOutcome};
use crate::portfolio::normalize_symbol;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Anything the analyzer and alert engine can read quotes from.
pub trait QuoteSource {
    fn lookup(&self, symbol: &str, max_age: Duration) -> QuoteLookup;

    /// The instant staleness is judged against.
    fn as_of(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedQuote {
    price: Decimal,
    timestamp: DateTime<Utc>,
}

impl CachedQuote {
    fn to_quote(self, symbol: String, max_age: Duration, now: DateTime<Utc>) -> Quote {
        let freshness = if now - self.timestamp > max_age {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        Quote {
            symbol,
            price: self.price,
            timestamp: self.timestamp,
            freshness,
        }
    }
}

/// Latest accepted price per symbol. Safe to share between fetch tasks; updates
/// for one symbol are serialized by the map's per-shard lock.
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: DashMap<String, CachedQuote>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote unless it is older than the one already held.
    pub fn update(
        &self,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(PortfolioError::InvalidInput("symbol is empty".to_string()));
        }
        if price <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput(format!(
                "price must be positive for {}, got {}",
                symbol, price
            )));
        }

        let incoming = CachedQuote { price, timestamp };
        match self.quotes.entry(symbol) {
            Entry::Occupied(mut entry) => {
                if timestamp < entry.get().timestamp {
                    tracing::warn!(
                        "Rejected out-of-order quote for {}: {} is older than {}",
                        entry.key(),
                        timestamp,
                        entry.get().timestamp
                    );
                    return Ok(UpdateOutcome::Rejected);
                }
                entry.insert(incoming);
            }
            Entry::Vacant(entry) => {
                entry.insert(incoming);
            }
        }
        Ok(UpdateOutcome::Accepted)
    }

    /// Latest quote for `symbol`, judged against the current time.
    pub fn get(&self, symbol: &str, max_age: Duration) -> QuoteLookup {
        self.get_at(symbol, max_age, Utc::now())
    }

    /// Like `get`, with staleness judged against `now`.
    pub fn get_at(&self, symbol: &str, max_age: Duration, now: DateTime<Utc>) -> QuoteLookup {
        let symbol = normalize_symbol(symbol);
        match self.quotes.get(&symbol) {
            Some(cached) => QuoteLookup::Present(cached.to_quote(symbol, max_age, now)),
            None => QuoteLookup::Unavailable,
        }
    }

    /// Time elapsed since the stored quote's timestamp.
    pub fn age_of(&self, symbol: &str) -> Option<Duration> {
        self.age_of_at(symbol, Utc::now())
    }

    /// Like `age_of`, measured at `now`.
    pub fn age_of_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.quotes
            .get(&normalize_symbol(symbol))
            .map(|cached| now - cached.timestamp)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Snapshot stamped with the current time.
    pub fn snapshot(&self) -> QuoteSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Copy every entry out so a whole evaluation cycle sees one consistent view.
    pub fn snapshot_at(&self, taken_at: DateTime<Utc>) -> QuoteSnapshot {
        let quotes = self
            .quotes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        QuoteSnapshot { quotes, taken_at }
    }
}

impl QuoteSource for QuoteCache {
    fn lookup(&self, symbol: &str, max_age: Duration) -> QuoteLookup {
        self.get(symbol, max_age)
    }

    fn as_of(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Point-in-time copy of the cache. Staleness is judged against `taken_at`.
#[derive(Debug, Clone)]
pub struct QuoteSnapshot {
    quotes: HashMap<String, CachedQuote>,
    taken_at: DateTime<Utc>,
}

impl QuoteSnapshot {
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, symbol: &str, max_age: Duration) -> QuoteLookup {
        let symbol = normalize_symbol(symbol);
        match self.quotes.get(&symbol) {
            Some(cached) => QuoteLookup::Present(cached.to_quote(symbol, max_age, self.taken_at)),
            None => QuoteLookup::Unavailable,
        }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl QuoteSource for QuoteSnapshot {
    fn lookup(&self, symbol: &str, max_age: Duration) -> QuoteLookup {
        self.get(symbol, max_age)
    }

    fn as_of(&self) -> DateTime<Utc> {
        self.taken_at
    }
}
