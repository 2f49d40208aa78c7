//! Pure decimal helpers for portfolio analytics.
//! Stateless, no I/O.

use rust_decimal::Decimal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// `part / whole * 100`, or `None` when `whole` is zero or the result is out of range.
pub fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    fraction_of(part, whole)?.checked_mul(HUNDRED)
}

/// `part / whole`, or `None` when `whole` is zero or the result is out of range.
pub fn fraction_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole.is_zero() {
        return None;
    }
    part.checked_div(whole)
}

/// Sum of squared weights. 1.0 for a single holding, 1/n for n equal weights.
pub fn herfindahl_index(weights: &[Decimal]) -> Option<Decimal> {
    if weights.is_empty() {
        return None;
    }
    Some(weights.iter().map(|w| w * w).sum())
}

/// Gross gains over gross losses. `None` when nothing lost money or a sum is out of range.
pub fn profit_factor(pnls: &[Decimal]) -> Option<Decimal> {
    let gains = pnls
        .iter()
        .filter(|p| p.is_sign_positive())
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))?;
    let losses = pnls
        .iter()
        .filter(|p| p.is_sign_negative() && !p.is_zero())
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.abs()))?;
    fraction_of(gains, losses)
}
