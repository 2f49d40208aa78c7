use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::AlertState;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient quantity for {symbol}: requested {requested}, held {held}")]
    InsufficientQuantity {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Alert not found: {0}")]
    AlertNotFound(u64),

    #[error("Invalid alert transition for rule {id}: cannot {action} from {from:?}")]
    InvalidTransition {
        id: u64,
        from: AlertState,
        action: &'static str,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Failure reported by a price provider for a single symbol.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No price for symbol: {0}")]
    NotFound(String),

    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),

    #[error("Provider error: {0}")]
    Api(String),
}
