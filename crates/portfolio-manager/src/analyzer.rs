use crate::models::*;
use crate::portfolio::Portfolio;
use crate::quote_cache::QuoteSource;
use crate::risk_metrics::RiskCalculator;
use crate::shared_math;
use chrono::Duration;
use rust_decimal::Decimal;

pub struct Analyzer;

impl Analyzer {
    /// Value every holding against the quote source.
    ///
    /// Holdings whose quote is unavailable are still listed (flagged
    /// `price_unavailable`) but stay out of the totals, and weights are
    /// normalized over the holdings that could be valued. Stale quotes are
    /// used as-is and flagged through `freshness`. A holding whose value
    /// would not fit a `Decimal` keeps its price but is left unvalued.
    pub fn compute_metrics<Q>(portfolio: &Portfolio, quotes: &Q, max_age: Duration) -> PortfolioMetrics
    where
        Q: QuoteSource + ?Sized,
    {
        let mut holdings = Vec::with_capacity(portfolio.len());
        let mut total_value = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        let mut unvalued_cost_basis = Decimal::ZERO;
        let mut stale_quotes = 0usize;
        let mut unavailable_quotes = 0usize;

        for holding in portfolio.list_holdings() {
            let lookup = quotes.lookup(&holding.symbol, max_age);
            let holding_cost = holding.quantity.saturating_mul(holding.cost_basis_per_unit);

            let mut metrics = HoldingMetrics {
                holding: holding.clone(),
                total_cost: holding_cost,
                freshness: lookup.freshness(),
                price_unavailable: lookup.quote().is_none(),
                current_price: lookup.quote().map(|q| q.price),
                current_value: None,
                unrealized_pnl: None,
                unrealized_pnl_percent: None,
                weight: None,
            };

            match lookup.quote() {
                Some(quote) => {
                    if quote.freshness == Freshness::Stale {
                        stale_quotes += 1;
                    }
                    let valued = holding
                        .total_cost()
                        .zip(holding.quantity.checked_mul(quote.price))
                        .and_then(|(cost, value)| {
                            Some((
                                cost,
                                value,
                                total_cost.checked_add(cost)?,
                                total_value.checked_add(value)?,
                            ))
                        });

                    match valued {
                        Some((cost, value, new_total_cost, new_total_value)) => {
                            total_cost = new_total_cost;
                            total_value = new_total_value;
                            let unrealized_pnl = value - cost;
                            metrics.current_value = Some(value);
                            metrics.unrealized_pnl = Some(unrealized_pnl);
                            metrics.unrealized_pnl_percent =
                                shared_math::percent_of(unrealized_pnl, cost);
                        }
                        None => tracing::warn!(
                            "Value of {} {} @ {} is out of range, excluding from totals",
                            holding.quantity,
                            holding.symbol,
                            quote.price
                        ),
                    }
                }
                None => {
                    tracing::debug!("No quote for {}, excluding from totals", holding.symbol);
                    unavailable_quotes += 1;
                }
            }

            if metrics.current_value.is_none() {
                unvalued_cost_basis = unvalued_cost_basis.saturating_add(holding_cost);
            }
            holdings.push(metrics);
        }

        for metrics in holdings.iter_mut() {
            if let Some(value) = metrics.current_value {
                metrics.weight = shared_math::fraction_of(value, total_value);
            }
        }

        let valued_positions = holdings.iter().filter(|h| h.current_value.is_some()).count();
        let total_pnl = total_value - total_cost;
        let risk = RiskCalculator::compute(&holdings);

        PortfolioMetrics {
            computed_at: quotes.as_of(),
            total_positions: holdings.len(),
            valued_positions,
            stale_quotes,
            unavailable_quotes,
            total_value,
            total_cost,
            total_pnl,
            total_pnl_percent: shared_math::percent_of(total_pnl, total_cost),
            unvalued_cost_basis,
            holdings,
            risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote_cache::QuoteCache;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 15, minute, 0).unwrap()
    }

    fn sample_portfolio() -> Portfolio {
        let mut portfolio = Portfolio::new();
        portfolio.add_holding("AAPL", dec!(10), dec!(150), at(0)).unwrap();
        portfolio.add_holding("MSFT", dec!(5), dec!(400), at(0)).unwrap();
        portfolio.add_holding("TSLA", dec!(2), dec!(250), at(0)).unwrap();
        portfolio
    }

    #[test]
    fn test_metrics_with_all_prices() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(175), at(1)).unwrap();
        cache.update("MSFT", dec!(380), at(1)).unwrap();
        cache.update("TSLA", dec!(250), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(2)), Duration::minutes(5));

        let aapl = &metrics.holdings[0];
        assert_eq!(aapl.current_value, Some(dec!(1750)));
        assert_eq!(aapl.unrealized_pnl, Some(dec!(250)));
        // 250 / 1500 = 16.67%
        assert_eq!(aapl.unrealized_pnl_percent.unwrap().round_dp(2), dec!(16.67));

        let msft = &metrics.holdings[1];
        assert_eq!(msft.current_value, Some(dec!(1900)));
        assert_eq!(msft.unrealized_pnl, Some(dec!(-100)));
        assert_eq!(msft.unrealized_pnl_percent, Some(dec!(-5)));

        assert_eq!(metrics.total_value, dec!(4150));
        assert_eq!(metrics.total_cost, dec!(4000));
        assert_eq!(metrics.total_pnl, dec!(150));
        assert_eq!(metrics.total_pnl_percent, Some(dec!(3.75)));
        assert_eq!(metrics.valued_positions, 3);
        assert_eq!(metrics.computed_at, at(2));
    }

    #[test]
    fn test_current_value_is_quantity_times_price() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(123.45), at(1)).unwrap();
        cache.update("MSFT", dec!(0.01), at(1)).unwrap();
        cache.update("TSLA", dec!(999.999), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));
        for m in &metrics.holdings {
            assert_eq!(m.current_value, Some(m.holding.quantity * m.current_price.unwrap()));
        }
    }

    #[test]
    fn test_unavailable_quote_is_reported_but_excluded() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(200), at(1)).unwrap();
        cache.update("MSFT", dec!(400), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));

        assert_eq!(metrics.total_positions, 3);
        assert_eq!(metrics.valued_positions, 2);
        assert_eq!(metrics.unavailable_quotes, 1);

        let tsla = &metrics.holdings[2];
        assert_eq!(tsla.holding.symbol, "TSLA");
        assert!(tsla.price_unavailable);
        assert_eq!(tsla.freshness, Freshness::Unavailable);
        assert_eq!(tsla.holding.cost_basis_per_unit, dec!(250));
        assert!(tsla.current_value.is_none());
        assert!(tsla.weight.is_none());

        assert_eq!(metrics.total_value, dec!(4000));
        assert_eq!(metrics.total_cost, dec!(3500));
        assert_eq!(metrics.unvalued_cost_basis, dec!(500));

        // Weights renormalized over the two valued holdings
        assert_eq!(metrics.holdings[0].weight, Some(dec!(0.5)));
        assert_eq!(metrics.holdings[1].weight, Some(dec!(0.5)));
    }

    #[test]
    fn test_weights_sum_to_one() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(171.13), at(1)).unwrap();
        cache.update("MSFT", dec!(333.33), at(1)).unwrap();
        cache.update("TSLA", dec!(177.77), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));
        let sum: Decimal = metrics.holdings.iter().filter_map(|h| h.weight).sum();
        assert!((sum - Decimal::ONE).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_no_weights_when_nothing_valued() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));
        assert!(metrics.holdings.iter().all(|h| h.weight.is_none()));
        assert_eq!(metrics.total_value, Decimal::ZERO);
        assert_eq!(metrics.total_pnl_percent, None);
        assert_eq!(metrics.unvalued_cost_basis, dec!(4000));
    }

    #[test]
    fn test_stale_quote_still_valued() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(150), at(0)).unwrap();
        cache.update("MSFT", dec!(400), at(20)).unwrap();
        cache.update("TSLA", dec!(250), at(20)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(20)), Duration::minutes(5));
        assert_eq!(metrics.stale_quotes, 1);
        assert_eq!(metrics.holdings[0].freshness, Freshness::Stale);
        assert_eq!(metrics.holdings[0].current_value, Some(dec!(1500)));
        assert_eq!(metrics.total_value, dec!(4000));
    }

    #[test]
    fn test_zero_cost_basis_gives_no_percent() {
        // add_holding refuses a zero cost basis; a saved portfolio may carry one
        let portfolio: Portfolio = serde_json::from_str(
            r#"[{"symbol": "GIFT", "quantity": 10, "cost_basis_per_unit": 0, "acquired_at": "2025-03-03T15:00:00Z"}]"#,
        )
        .unwrap();
        let cache = QuoteCache::new();
        cache.update("GIFT", dec!(5), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));
        assert_eq!(metrics.holdings[0].unrealized_pnl, Some(dec!(50)));
        assert_eq!(metrics.holdings[0].unrealized_pnl_percent, None);
        assert_eq!(metrics.total_pnl_percent, None);
    }

    #[test]
    fn test_value_out_of_range_leaves_holding_unvalued() {
        let mut portfolio = Portfolio::new();
        portfolio.add_holding("HUGE", dec!(1000000000000000), dec!(1), at(0)).unwrap();
        portfolio.add_holding("AAPL", dec!(10), dec!(150), at(0)).unwrap();
        let cache = QuoteCache::new();
        cache.update("HUGE", dec!(1000000000000000), at(1)).unwrap();
        cache.update("AAPL", dec!(160), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));

        let huge = &metrics.holdings[0];
        assert_eq!(huge.current_price, Some(dec!(1000000000000000)));
        assert_eq!(huge.current_value, None);
        assert_eq!(huge.weight, None);
        assert!(!huge.price_unavailable);

        assert_eq!(metrics.valued_positions, 1);
        assert_eq!(metrics.unavailable_quotes, 0);
        assert_eq!(metrics.total_value, dec!(1600));
        assert_eq!(metrics.total_cost, dec!(1500));
        assert_eq!(metrics.unvalued_cost_basis, dec!(1000000000000000));
        assert_eq!(metrics.holdings[1].weight, Some(Decimal::ONE));
    }

    #[test]
    fn test_totals_out_of_range_leave_later_holdings_unvalued() {
        let mut portfolio = Portfolio::new();
        portfolio.add_holding("BIG1", dec!(10000000000000), dec!(1), at(0)).unwrap();
        portfolio.add_holding("BIG2", dec!(10000000000000), dec!(1), at(0)).unwrap();
        let cache = QuoteCache::new();
        // 1e13 × 5e15 = 5e28 each; the sum does not fit
        cache.update("BIG1", dec!(5000000000000000), at(1)).unwrap();
        cache.update("BIG2", dec!(5000000000000000), at(1)).unwrap();

        let metrics = Analyzer::compute_metrics(&portfolio, &cache.snapshot_at(at(1)), Duration::minutes(5));
        assert_eq!(metrics.valued_positions, 1);
        assert_eq!(metrics.holdings[0].current_value, Some(dec!(50000000000000000000000000000)));
        assert_eq!(metrics.holdings[1].current_value, None);
        assert_eq!(metrics.holdings[0].weight, Some(Decimal::ONE));
    }

    #[test]
    fn test_recomputation_is_deterministic() {
        let portfolio = sample_portfolio();
        let cache = QuoteCache::new();
        cache.update("AAPL", dec!(175.10), at(1)).unwrap();
        cache.update("MSFT", dec!(380.20), at(1)).unwrap();
        let snapshot = cache.snapshot_at(at(1));

        let first = Analyzer::compute_metrics(&portfolio, &snapshot, Duration::minutes(5));
        let second = Analyzer::compute_metrics(&portfolio, &snapshot, Duration::minutes(5));
        assert_eq!(first, second);
    }
}
