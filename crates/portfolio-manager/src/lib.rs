//! Portfolio Manager
//!
//! Holdings, quote caching, point-in-time valuation and price alerts.
//! Everything here is synchronous and I/O free except the quote refresh,
//! which fans fetches out over tokio tasks.

pub mod alerts;
pub mod analyzer;
pub mod error;
pub mod loader;
pub mod models;
pub mod portfolio;
pub mod price_feed;
pub mod quote_cache;
pub mod risk_metrics;
pub mod shared_math;

pub use alerts::AlertManager;
pub use analyzer::Analyzer;
pub use error::{PortfolioError, ProviderError, Result};
pub use loader::{load_alerts_file, load_alerts_json, load_holdings_csv, load_holdings_file, LoadReport};
pub use models::*;
pub use portfolio::Portfolio;
pub use price_feed::{refresh_quotes, FilePriceProvider, PriceProvider, StaticPriceProvider};
pub use quote_cache::{QuoteCache, QuoteSnapshot, QuoteSource};
pub use risk_metrics::RiskCalculator;
