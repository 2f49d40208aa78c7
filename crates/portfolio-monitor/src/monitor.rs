use std::sync::Arc;
use std::time::Duration;

use portfolio_manager::{
    refresh_quotes, AlertManager, AlertTrigger, Analyzer, Portfolio, PortfolioMetrics,
    PriceProvider, QuoteCache, RefreshReport,
};

/// Everything one cycle produced, for the caller to log or deliver.
#[derive(Debug)]
pub struct CycleOutcome {
    pub refresh: RefreshReport,
    pub metrics: PortfolioMetrics,
    pub triggers: Vec<AlertTrigger>,
}

pub struct Monitor {
    portfolio: Portfolio,
    alerts: AlertManager,
    cache: Arc<QuoteCache>,
    provider: Arc<dyn PriceProvider>,
    fetch_timeout: Duration,
    quote_max_age: chrono::Duration,
    cycles_run: u64,
}

impl Monitor {
    pub fn new(
        portfolio: Portfolio,
        alerts: AlertManager,
        provider: Arc<dyn PriceProvider>,
        fetch_timeout: Duration,
        quote_max_age: chrono::Duration,
    ) -> Self {
        Self {
            portfolio,
            alerts,
            cache: Arc::new(QuoteCache::new()),
            provider,
            fetch_timeout,
            quote_max_age,
            cycles_run: 0,
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    /// Symbols worth fetching: every holding plus every alert symbol, once each.
    fn watched_symbols(&self) -> Vec<String> {
        let mut symbols = self.portfolio.symbols();
        for rule in self.alerts.all_alerts() {
            if !symbols.contains(&rule.symbol) {
                symbols.push(rule.symbol.clone());
            }
        }
        symbols
    }

    /// Refresh quotes, then value the portfolio and evaluate alerts against a
    /// single snapshot taken after the refresh.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let symbols = self.watched_symbols();
        let refresh = refresh_quotes(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            &symbols,
            self.fetch_timeout,
        )
        .await;

        let snapshot = self.cache.snapshot();
        let metrics = Analyzer::compute_metrics(&self.portfolio, &snapshot, self.quote_max_age);
        let triggers = self.alerts.evaluate(&snapshot, self.quote_max_age);

        self.cycles_run += 1;
        tracing::info!(
            "Cycle #{}: value {} | P&L {} | {}/{} valued | {} stale | {} alerts fired",
            self.cycles_run,
            metrics.total_value.round_dp(2),
            metrics.total_pnl.round_dp(2),
            metrics.valued_positions,
            metrics.total_positions,
            metrics.stale_quotes,
            triggers.len()
        );

        CycleOutcome {
            refresh,
            metrics,
            triggers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portfolio_manager::{AlertCondition, AlertInput, AlertState, PriceTick, StaticPriceProvider};
    use rust_decimal_macros::dec;

    fn build(provider: Arc<StaticPriceProvider>) -> Monitor {
        let mut portfolio = Portfolio::new();
        portfolio.add_holding("AAPL", dec!(10), dec!(150), Utc::now()).unwrap();
        portfolio.add_holding("MSFT", dec!(5), dec!(400), Utc::now()).unwrap();

        let mut alerts = AlertManager::new();
        alerts
            .create_alert(AlertInput {
                symbol: "NVDA".to_string(),
                condition: AlertCondition::Above,
                threshold: dec!(900),
                state: AlertState::Armed,
            })
            .unwrap();

        Monitor::new(
            portfolio,
            alerts,
            provider,
            Duration::from_secs(1),
            chrono::Duration::minutes(15),
        )
    }

    #[tokio::test]
    async fn test_cycle_values_portfolio_and_fires_alert_once() {
        let provider = Arc::new(StaticPriceProvider::new());
        provider.set_price("AAPL", PriceTick { price: dec!(160), timestamp: Utc::now() });
        provider.set_price("NVDA", PriceTick { price: dec!(950), timestamp: Utc::now() });
        let mut monitor = build(Arc::clone(&provider));

        let outcome = monitor.run_cycle().await;
        assert_eq!(outcome.refresh.updated, vec!["AAPL", "NVDA"]);
        assert_eq!(outcome.refresh.failed.len(), 1);
        assert_eq!(outcome.metrics.total_value, dec!(1600));
        assert_eq!(outcome.metrics.unavailable_quotes, 1);
        assert_eq!(outcome.triggers.len(), 1);
        assert_eq!(outcome.triggers[0].symbol, "NVDA");

        let outcome = monitor.run_cycle().await;
        assert!(outcome.triggers.is_empty());
        assert_eq!(monitor.cycles_run(), 2);
        assert_eq!(monitor.alerts().all_alerts()[0].state, AlertState::Triggered);
    }

    #[tokio::test]
    async fn test_quote_kept_when_provider_drops_symbol() {
        let provider = Arc::new(StaticPriceProvider::new());
        provider.set_price("AAPL", PriceTick { price: dec!(160), timestamp: Utc::now() });
        let mut monitor = build(Arc::clone(&provider));
        monitor.run_cycle().await;

        provider.clear("AAPL");
        let outcome = monitor.run_cycle().await;
        assert!(outcome.refresh.failed.iter().any(|(s, _)| s == "AAPL"));
        // Last good AAPL quote is still used
        assert_eq!(outcome.metrics.total_value, dec!(1600));
    }
}
