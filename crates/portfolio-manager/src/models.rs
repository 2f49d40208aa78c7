use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub cost_basis_per_unit: Decimal,
    pub acquired_at: DateTime<Utc>,
}

impl Holding {
    /// Quantity × cost basis per unit, `None` if it does not fit a `Decimal`.
    pub fn total_cost(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.cost_basis_per_unit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub freshness: Freshness,
}

/// Result of looking a symbol up in the quote cache. Never an error: a symbol
/// that was never priced is simply `Unavailable`.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteLookup {
    Present(Quote),
    Unavailable,
}

impl QuoteLookup {
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            QuoteLookup::Present(q) => Some(q),
            QuoteLookup::Unavailable => None,
        }
    }

    pub fn freshness(&self) -> Freshness {
        match self {
            QuoteLookup::Present(q) => q.freshness,
            QuoteLookup::Unavailable => Freshness::Unavailable,
        }
    }
}

/// Raw price observation handed over by a price provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTick {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted,
    /// An older timestamp than the stored quote; the newer quote was kept.
    Rejected,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingMetrics {
    #[serde(flatten)]
    pub holding: Holding,
    pub total_cost: Decimal,
    pub freshness: Freshness,
    pub price_unavailable: bool,
    pub current_price: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_percent: Option<Decimal>,
    /// Fraction of the total valued portfolio (0..=1).
    pub weight: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingWeight {
    pub symbol: String,
    pub weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Performer {
    pub symbol: String,
    pub pnl_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RiskSummary {
    pub winning_positions: usize,
    pub losing_positions: usize,
    pub profit_factor: Option<Decimal>,
    pub highest_concentration: Option<HoldingWeight>,
    pub herfindahl_index: Option<Decimal>,
    pub best_performer: Option<Performer>,
    pub worst_performer: Option<Performer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioMetrics {
    pub computed_at: DateTime<Utc>,
    pub total_positions: usize,
    pub valued_positions: usize,
    pub stale_quotes: usize,
    pub unavailable_quotes: usize,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percent: Option<Decimal>,
    /// Cost basis of holdings left out of the totals for lack of a price.
    pub unvalued_cost_basis: Decimal,
    pub holdings: Vec<HoldingMetrics>,
    pub risk: RiskSummary,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// price >= threshold
    #[serde(alias = ">=")]
    Above,
    /// price <= threshold
    #[serde(alias = "<=")]
    Below,
}

impl AlertCondition {
    pub fn is_met(&self, price: Decimal, threshold: Decimal) -> bool {
        match self {
            AlertCondition::Above => price >= threshold,
            AlertCondition::Below => price <= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AlertCondition::Above => ">=",
            AlertCondition::Below => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Armed,
    Triggered,
    Acknowledged,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: u64,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
}

/// Validated alert definition, before it is registered and given an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertInput {
    pub symbol: String,
    pub condition: AlertCondition,
    #[serde(alias = "target_price", alias = "price_threshold")]
    pub threshold: Decimal,
    #[serde(default)]
    pub state: AlertState,
}

/// Emitted once per armed → triggered transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertTrigger {
    pub rule_id: u64,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub observed_price: Decimal,
    pub quote_timestamp: DateTime<Utc>,
    pub freshness: Freshness,
    pub triggered_at: DateTime<Utc>,
}

impl AlertTrigger {
    pub fn message(&self) -> String {
        format!(
            "{} is now {} {} (current price: {})",
            self.symbol,
            match self.condition {
                AlertCondition::Above => "above",
                AlertCondition::Below => "below",
            },
            self.threshold,
            self.observed_price
        )
    }
}

// ---------------------------------------------------------------------------
// Ingestion / refresh reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowError {
    /// 1-based data row (CSV) or 0-based index (JSON list).
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshReport {
    pub updated: Vec<String>,
    pub rejected: Vec<String>,
    pub failed: Vec<(String, String)>,
}
