use crate::models::*;
use crate::shared_math;
use rust_decimal::Decimal;

pub struct RiskCalculator;

impl RiskCalculator {
    /// Summarize win/loss balance and concentration over valued holdings.
    /// Holdings without a price contribute nothing.
    pub fn compute(holdings: &[HoldingMetrics]) -> RiskSummary {
        let valued: Vec<&HoldingMetrics> = holdings
            .iter()
            .filter(|h| h.current_value.is_some())
            .collect();

        let pnls: Vec<Decimal> = valued.iter().filter_map(|h| h.unrealized_pnl).collect();
        let winning_positions = pnls.iter().filter(|p| **p > Decimal::ZERO).count();
        let losing_positions = pnls.iter().filter(|p| **p < Decimal::ZERO).count();

        let weights: Vec<HoldingWeight> = valued
            .iter()
            .filter_map(|h| {
                h.weight.map(|weight| HoldingWeight {
                    symbol: h.holding.symbol.clone(),
                    weight,
                })
            })
            .collect();
        let weight_values: Vec<Decimal> = weights.iter().map(|w| w.weight).collect();

        // Ties go to the first-inserted holding.
        let highest_concentration = weights
            .iter()
            .fold(None::<&HoldingWeight>, |best, w| match best {
                Some(b) if b.weight >= w.weight => Some(b),
                _ => Some(w),
            })
            .cloned();

        let performers: Vec<Performer> = valued
            .iter()
            .filter_map(|h| {
                h.unrealized_pnl_percent.map(|pnl_percent| Performer {
                    symbol: h.holding.symbol.clone(),
                    pnl_percent,
                })
            })
            .collect();
        let best_performer = performers
            .iter()
            .fold(None::<&Performer>, |best, p| match best {
                Some(b) if b.pnl_percent >= p.pnl_percent => Some(b),
                _ => Some(p),
            })
            .cloned();
        let worst_performer = performers
            .iter()
            .fold(None::<&Performer>, |worst, p| match worst {
                Some(w) if w.pnl_percent <= p.pnl_percent => Some(w),
                _ => Some(p),
            })
            .cloned();

        RiskSummary {
            winning_positions,
            losing_positions,
            profit_factor: shared_math::profit_factor(&pnls),
            highest_concentration,
            herfindahl_index: shared_math::herfindahl_index(&weight_values),
            best_performer,
            worst_performer,
        }
    }
}
