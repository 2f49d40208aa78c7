use crate::error::{PortfolioError, Result};
use crate::models::Holding;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalize a ticker the way every component keys it.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// In-memory set of holdings, one per symbol, in insertion order.
///
/// Serializes as a plain list of holdings. Deserializing goes through
/// `TryFrom<Vec<Holding>>`, so a saved portfolio is held to the same rules
/// as one built with `add_holding`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Holding>", into = "Vec<Holding>")]
pub struct Portfolio {
    holdings: Vec<Holding>,
}

impl TryFrom<Vec<Holding>> for Portfolio {
    type Error = PortfolioError;

    /// Accepts holdings as stored, without merging. Symbols must be unique and
    /// quantities positive. A zero cost basis is allowed here (gifted or
    /// spun-off shares) even though `add_holding` refuses it.
    fn try_from(holdings: Vec<Holding>) -> Result<Self> {
        let mut portfolio = Portfolio::new();
        for mut holding in holdings {
            holding.symbol = normalize_symbol(&holding.symbol);
            if holding.symbol.is_empty() {
                return Err(PortfolioError::InvalidInput("symbol is empty".to_string()));
            }
            if portfolio.get(&holding.symbol).is_some() {
                return Err(PortfolioError::InvalidInput(format!(
                    "duplicate holding for {}",
                    holding.symbol
                )));
            }
            if holding.quantity <= Decimal::ZERO {
                return Err(PortfolioError::InvalidInput(format!(
                    "quantity must be positive for {}, got {}",
                    holding.symbol, holding.quantity
                )));
            }
            if holding.cost_basis_per_unit < Decimal::ZERO {
                return Err(PortfolioError::InvalidInput(format!(
                    "cost basis must not be negative for {}, got {}",
                    holding.symbol, holding.cost_basis_per_unit
                )));
            }
            if holding.total_cost().is_none() {
                return Err(PortfolioError::InvalidInput(format!(
                    "position too large for {}",
                    holding.symbol
                )));
            }
            portfolio.holdings.push(holding);
        }
        Ok(portfolio)
    }
}

impl From<Portfolio> for Vec<Holding> {
    fn from(portfolio: Portfolio) -> Self {
        portfolio.holdings
    }
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a position, merging into an existing holding of the same symbol
    /// with a weighted-average cost basis.
    pub fn add_holding(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        cost_basis_per_unit: Decimal,
        acquired_at: DateTime<Utc>,
    ) -> Result<&Holding> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(PortfolioError::InvalidInput("symbol is empty".to_string()));
        }
        if quantity <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput(format!(
                "quantity must be positive for {}, got {}",
                symbol, quantity
            )));
        }
        if cost_basis_per_unit <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput(format!(
                "cost basis must be positive for {}, got {}",
                symbol, cost_basis_per_unit
            )));
        }

        let lot_cost = quantity.checked_mul(cost_basis_per_unit).ok_or_else(|| {
            PortfolioError::InvalidInput(format!(
                "position too large for {}: {} @ {}",
                symbol, quantity, cost_basis_per_unit
            ))
        })?;

        match self.holdings.iter().position(|h| h.symbol == symbol) {
            Some(idx) => {
                let existing = &mut self.holdings[idx];
                let (new_quantity, new_cost_basis) = existing
                    .total_cost()
                    .and_then(|held_cost| held_cost.checked_add(lot_cost))
                    .zip(existing.quantity.checked_add(quantity))
                    .and_then(|(combined_cost, new_quantity)| {
                        combined_cost
                            .checked_div(new_quantity)
                            .map(|cost| (new_quantity, cost))
                    })
                    .ok_or_else(|| {
                        PortfolioError::InvalidInput(format!(
                            "merged position too large for {}: {} + {}",
                            symbol, existing.quantity, quantity
                        ))
                    })?;
                existing.cost_basis_per_unit = new_cost_basis;
                existing.quantity = new_quantity;
                existing.acquired_at = existing.acquired_at.min(acquired_at);
                tracing::debug!(
                    "Merged {} into existing holding: {} @ {}",
                    symbol,
                    existing.quantity,
                    existing.cost_basis_per_unit
                );
                Ok(&self.holdings[idx])
            }
            None => {
                tracing::debug!("Added holding {}: {} @ {}", symbol, quantity, cost_basis_per_unit);
                self.holdings.push(Holding {
                    symbol,
                    quantity,
                    cost_basis_per_unit,
                    acquired_at,
                });
                Ok(&self.holdings[self.holdings.len() - 1])
            }
        }
    }

    /// Remove shares from a holding, dropping it entirely once it reaches zero.
    /// Returns the remaining holding, if any.
    pub fn remove_holding(&mut self, symbol: &str, quantity: Decimal) -> Result<Option<&Holding>> {
        let symbol = normalize_symbol(symbol);
        if quantity <= Decimal::ZERO {
            return Err(PortfolioError::InvalidInput(format!(
                "quantity to remove must be positive for {}, got {}",
                symbol, quantity
            )));
        }

        let Some(idx) = self.holdings.iter().position(|h| h.symbol == symbol) else {
            return Err(PortfolioError::InsufficientQuantity {
                symbol,
                requested: quantity,
                held: Decimal::ZERO,
            });
        };

        let held = self.holdings[idx].quantity;
        if quantity > held {
            return Err(PortfolioError::InsufficientQuantity {
                symbol,
                requested: quantity,
                held,
            });
        }

        if quantity == held {
            self.holdings.remove(idx);
            tracing::debug!("Removed holding {}", symbol);
            return Ok(None);
        }

        self.holdings[idx].quantity = held - quantity;
        Ok(Some(&self.holdings[idx]))
    }

    /// Holdings in insertion order.
    pub fn list_holdings(&self) -> &[Holding] {
        &self.holdings
    }

    /// Look up a holding by symbol (case-insensitive).
    pub fn get(&self, symbol: &str) -> Option<&Holding> {
        let symbol = normalize_symbol(symbol);
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    /// Every held symbol, in insertion order.
    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
