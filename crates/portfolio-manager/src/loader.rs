use crate::alerts::AlertManager;
use crate::error::{PortfolioError, Result};
use crate::models::{AlertInput, RowError};
use crate::portfolio::Portfolio;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Outcome of an ingestion pass: what was built plus every rejected row.
#[derive(Debug)]
pub struct LoadReport<T> {
    pub loaded: T,
    pub accepted: usize,
    pub rejected: Vec<RowError>,
}

/// Raw CSV row. Column aliases cover the older tracker export.
#[derive(Debug, Deserialize)]
struct HoldingRow {
    symbol: String,
    #[serde(alias = "shares")]
    quantity: String,
    #[serde(alias = "buy_price", alias = "purchase_price")]
    cost_basis_per_unit: String,
    #[serde(alias = "purchase_date", default)]
    acquired_at: String,
}

fn parse_decimal(field: &str, value: &str) -> std::result::Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("invalid {} '{}': {}", field, value, e))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("missing acquired_at".to_string());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid acquired_at '{}'", value))
}

/// Build a portfolio from CSV with columns
/// `symbol, quantity, cost_basis_per_unit, acquired_at`.
///
/// Each valid row goes through `Portfolio::add_holding`, so duplicate symbols
/// merge. Malformed rows are skipped and reported, never fatal.
pub fn load_holdings_csv<R: std::io::Read>(reader: R) -> LoadReport<Portfolio> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut portfolio = Portfolio::new();
    let mut accepted = 0;
    let mut rejected = Vec::new();

    for (idx, result) in reader.deserialize::<HoldingRow>().enumerate() {
        let row = idx + 1;
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|r| {
                let quantity = parse_decimal("quantity", &r.quantity)?;
                let cost = parse_decimal("cost_basis_per_unit", &r.cost_basis_per_unit)?;
                let acquired_at = parse_timestamp(&r.acquired_at)?;
                portfolio
                    .add_holding(&r.symbol, quantity, cost, acquired_at)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });

        match outcome {
            Ok(()) => accepted += 1,
            Err(reason) => {
                tracing::warn!("Skipping holdings row {}: {}", row, reason);
                rejected.push(RowError { row, reason });
            }
        }
    }

    tracing::info!(
        "Loaded {} holding rows into {} holdings ({} rejected)",
        accepted,
        portfolio.len(),
        rejected.len()
    );

    LoadReport {
        loaded: portfolio,
        accepted,
        rejected,
    }
}

pub fn load_holdings_file(path: impl AsRef<Path>) -> Result<LoadReport<Portfolio>> {
    let file = std::fs::File::open(path.as_ref())?;
    Ok(load_holdings_csv(file))
}

/// Build an alert manager from a JSON list of `{symbol, condition, threshold, state?}`.
///
/// The list may also be wrapped as `{"price_alerts": [...]}` or `{"alerts": [...]}`.
/// Entries are validated one by one; a bad entry is rejected without
/// affecting the rest. A document that is not a list at all is an error.
pub fn load_alerts_json(json: &str) -> Result<LoadReport<AlertManager>> {
    let document: serde_json::Value = serde_json::from_str(json)?;
    let entries = match document {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => match map
            .remove("price_alerts")
            .or_else(|| map.remove("alerts"))
        {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => {
                return Err(PortfolioError::InvalidInput(
                    "alert configuration has no alert list".to_string(),
                ))
            }
        },
        _ => {
            return Err(PortfolioError::InvalidInput(
                "alert configuration must be a list".to_string(),
            ))
        }
    };

    let mut manager = AlertManager::new();
    let mut accepted = 0;
    let mut rejected = Vec::new();

    for (row, entry) in entries.into_iter().enumerate() {
        let outcome = serde_json::from_value::<AlertInput>(entry)
            .map_err(PortfolioError::from)
            .and_then(|input| manager.create_alert(input));

        match outcome {
            Ok(_) => accepted += 1,
            Err(e) => {
                tracing::warn!("Rejecting alert entry {}: {}", row, e);
                rejected.push(RowError {
                    row,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!("Loaded {} alert rules ({} rejected)", accepted, rejected.len());

    Ok(LoadReport {
        loaded: manager,
        accepted,
        rejected,
    })
}

pub fn load_alerts_file(path: impl AsRef<Path>) -> Result<LoadReport<AlertManager>> {
    let json = std::fs::read_to_string(path.as_ref())?;
    load_alerts_json(&json)
}
