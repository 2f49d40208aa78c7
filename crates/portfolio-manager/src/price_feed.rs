use crate::error::ProviderError;
use crate::models::{PriceTick, RefreshReport, UpdateOutcome};
use crate::portfolio::normalize_symbol;
use crate::quote_cache::QuoteCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Source of raw prices. Implementations must report failure explicitly;
/// callers never assume a fetch succeeds.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceTick, ProviderError>;
    fn name(&self) -> &str;
}

/// In-memory provider, mostly for wiring tests and demos.
#[derive(Debug, Default)]
pub struct StaticPriceProvider {
    prices: DashMap<String, PriceTick>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, tick: PriceTick) {
        self.prices.insert(normalize_symbol(symbol), tick);
    }

    pub fn clear(&self, symbol: &str) {
        self.prices.remove(&normalize_symbol(symbol));
    }
}

#[async_trait]
impl PriceProvider for StaticPriceProvider {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceTick, ProviderError> {
        self.prices
            .get(&normalize_symbol(symbol))
            .map(|tick| tick.value().clone())
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Reads a JSON map of `symbol -> {price, timestamp}` kept current by an
/// external process. The parsed map is reused until the file's modification
/// time or size changes, so a refresh over many symbols parses it once.
#[derive(Debug)]
pub struct FilePriceProvider {
    path: PathBuf,
    cached: Mutex<Option<CachedPrices>>,
    loads: AtomicUsize,
}

#[derive(Debug)]
struct CachedPrices {
    modified: SystemTime,
    len: u64,
    prices: HashMap<String, PriceTick>,
}

impl FilePriceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    fn io_error(&self, e: std::io::Error) -> ProviderError {
        ProviderError::Api(format!("{}: {}", self.path.display(), e))
    }

    async fn read_prices(&self) -> Result<HashMap<String, PriceTick>, ProviderError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let prices: HashMap<String, PriceTick> =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Api(e.to_string()))?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Loaded {} prices from {}", prices.len(), self.path.display());
        Ok(prices
            .into_iter()
            .map(|(symbol, tick)| (normalize_symbol(&symbol), tick))
            .collect())
    }
}

#[async_trait]
impl PriceProvider for FilePriceProvider {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceTick, ProviderError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.io_error(e))?;
        let len = metadata.len();

        let mut cached = self.cached.lock().await;
        let current = matches!(
            cached.as_ref(),
            Some(c) if c.modified == modified && c.len == len
        );
        if !current {
            let prices = self.read_prices().await?;
            *cached = Some(CachedPrices {
                modified,
                len,
                prices,
            });
        }

        cached
            .as_ref()
            .and_then(|c| c.prices.get(&normalize_symbol(symbol)).cloned())
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Fetch every symbol concurrently, each under its own timeout, and feed the
/// results into the cache. One symbol failing or timing out never affects
/// the others; its cache entry is simply left as it was. Every requested
/// symbol ends up in exactly one list of the report.
pub async fn refresh_quotes(
    provider: Arc<dyn PriceProvider>,
    cache: Arc<QuoteCache>,
    symbols: &[String],
    timeout: Duration,
) -> RefreshReport {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let mut pending = HashSet::new();
    let mut tasks = JoinSet::new();

    for symbol in symbols {
        if !pending.insert(symbol.clone()) {
            continue;
        }
        let provider = Arc::clone(&provider);
        let symbol = symbol.clone();
        tasks.spawn(async move {
            let result = match tokio::time::timeout(timeout, provider.fetch_price(&symbol)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout_ms)),
            };
            (symbol, result)
        });
    }

    let mut report = RefreshReport::default();

    while let Some(joined) = tasks.join_next().await {
        if let Ok((symbol, _)) = &joined {
            pending.remove(symbol);
        }
        match joined {
            Ok((symbol, Ok(tick))) => match cache.update(&symbol, tick.price, tick.timestamp) {
                Ok(UpdateOutcome::Accepted) => {
                    tracing::debug!("Updated {} @ {}", symbol, tick.price);
                    report.updated.push(symbol);
                }
                Ok(UpdateOutcome::Rejected) => report.rejected.push(symbol),
                Err(e) => {
                    tracing::warn!("Discarding price for {}: {}", symbol, e);
                    report.failed.push((symbol, e.to_string()));
                }
            },
            Ok((symbol, Err(e))) => {
                tracing::warn!("Failed to fetch {} from {}: {}", symbol, provider.name(), e);
                report.failed.push((symbol, e.to_string()));
            }
            Err(e) => {
                tracing::error!("Fetch task error: {}", e);
            }
        }
    }

    // Whatever is left belongs to a task that panicked or was cancelled
    for symbol in pending {
        report
            .failed
            .push((symbol, "fetch task ended without a result".to_string()));
    }

    // Join order is completion order
    report.updated.sort();
    report.rejected.sort();
    report.failed.sort();

    tracing::info!(
        "Quote refresh: {} updated, {} rejected, {} failed",
        report.updated.len(),
        report.rejected.len(),
        report.failed.len()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 15, minute, 0).unwrap()
    }

    fn tick(price: Decimal, minute: u32) -> PriceTick {
        PriceTick {
            price,
            timestamp: at(minute),
        }
    }

    /// Wraps the static provider; one symbol hangs, one always errors, one panics.
    struct FlakyProvider {
        inner: StaticPriceProvider,
    }

    #[async_trait]
    impl PriceProvider for FlakyProvider {
        async fn fetch_price(&self, symbol: &str) -> Result<PriceTick, ProviderError> {
            match symbol {
                "HANG" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ProviderError::Api("unreachable".to_string()))
                }
                "DOWN" => Err(ProviderError::Api("503 Service Unavailable".to_string())),
                "BOOM" => panic!("provider bug"),
                _ => self.inner.fetch_price(symbol).await,
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_refresh_updates_cache() {
        let provider = StaticPriceProvider::new();
        provider.set_price("AAPL", tick(dec!(150), 0));
        provider.set_price("MSFT", tick(dec!(400), 0));
        let cache = Arc::new(QuoteCache::new());

        let report = refresh_quotes(
            Arc::new(provider),
            Arc::clone(&cache),
            &symbols(&["AAPL", "MSFT", "NVDA"]),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.updated, vec!["AAPL", "MSFT"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "NVDA");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_symbol() {
        let inner = StaticPriceProvider::new();
        inner.set_price("AAPL", tick(dec!(151), 1));
        let provider: Arc<dyn PriceProvider> = Arc::new(FlakyProvider { inner });

        let cache = Arc::new(QuoteCache::new());
        cache.update("DOWN", dec!(20), at(0)).unwrap();

        let report = refresh_quotes(
            provider,
            Arc::clone(&cache),
            &symbols(&["HANG", "AAPL", "DOWN"]),
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(report.updated, vec!["AAPL"]);
        let failed: Vec<&str> = report.failed.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(failed, vec!["DOWN", "HANG"]);
        assert_eq!(report.failed[1].1, "Fetch timed out after 50ms");

        // The previous DOWN quote survives the failed fetch
        let lookup = cache.get_at("DOWN", chrono::Duration::minutes(5), at(1));
        assert_eq!(lookup.quote().unwrap().price, dec!(20));
    }

    #[tokio::test]
    async fn test_late_response_does_not_overwrite_newer_quote() {
        let provider = StaticPriceProvider::new();
        provider.set_price("AAPL", tick(dec!(140), 1));
        let cache = Arc::new(QuoteCache::new());
        cache.update("AAPL", dec!(155), at(5)).unwrap();

        let report = refresh_quotes(
            Arc::new(provider),
            Arc::clone(&cache),
            &symbols(&["AAPL"]),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.rejected, vec!["AAPL"]);
        let lookup = cache.get_at("AAPL", chrono::Duration::minutes(5), at(5));
        assert_eq!(lookup.quote().unwrap().price, dec!(155));
    }

    #[tokio::test]
    async fn test_file_provider() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"aapl": {{"price": "150.25", "timestamp": "2025-03-03T15:00:00Z"}}}}"#
        )
        .unwrap();

        let provider = FilePriceProvider::new(file.path());
        let tick = provider.fetch_price("AAPL").await.unwrap();
        assert_eq!(tick.price, dec!(150.25));
        assert_eq!(tick.timestamp, at(0));

        assert_eq!(
            provider.fetch_price("MSFT").await,
            Err(ProviderError::NotFound("MSFT".to_string()))
        );

        let missing = FilePriceProvider::new("/nonexistent/quotes.json");
        assert!(matches!(missing.fetch_price("AAPL").await, Err(ProviderError::Api(_))));
    }

    #[tokio::test]
    async fn test_panicked_fetch_is_reported_as_failed() {
        let inner = StaticPriceProvider::new();
        inner.set_price("AAPL", tick(dec!(151), 1));
        let provider: Arc<dyn PriceProvider> = Arc::new(FlakyProvider { inner });
        let cache = Arc::new(QuoteCache::new());

        let report = refresh_quotes(
            provider,
            Arc::clone(&cache),
            &symbols(&["BOOM", "AAPL", "AAPL"]),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.updated, vec!["AAPL"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "BOOM");
        assert!(report.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_file_provider_parses_once_until_file_changes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"AAPL": {"price": 150, "timestamp": "2025-03-03T15:00:00Z"},
                "MSFT": {"price": 400, "timestamp": "2025-03-03T15:00:00Z"}}"#,
        )
        .unwrap();

        let provider = Arc::new(FilePriceProvider::new(file.path()));
        let cache = Arc::new(QuoteCache::new());
        let report = refresh_quotes(
            Arc::clone(&provider) as Arc<dyn PriceProvider>,
            Arc::clone(&cache),
            &symbols(&["AAPL", "MSFT", "NVDA"]),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(report.updated, vec!["AAPL", "MSFT"]);
        assert_eq!(provider.loads.load(Ordering::Relaxed), 1);

        // Different size, so the change is seen even within one mtime tick
        std::fs::write(
            file.path(),
            r#"{"AAPL": {"price": 152.5, "timestamp": "2025-03-03T15:01:00Z"}}"#,
        )
        .unwrap();
        let tick = provider.fetch_price("AAPL").await.unwrap();
        assert_eq!(tick.price, dec!(152.5));
        assert_eq!(provider.loads.load(Ordering::Relaxed), 2);
    }
}
