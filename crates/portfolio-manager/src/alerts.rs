use crate::error::{PortfolioError, Result};
use crate::models::*;
use crate::portfolio::normalize_symbol;
use crate::quote_cache::QuoteSource;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Check every armed rule against the quote source, moving satisfied rules to
/// `Triggered` and returning one event per transition.
///
/// Rules in any other state are left alone, and an unavailable quote never
/// changes a rule's state.
pub fn evaluate<Q>(rules: &mut [AlertRule], quotes: &Q, max_age: Duration) -> Vec<AlertTrigger>
where
    Q: QuoteSource + ?Sized,
{
    let triggered_at = quotes.as_of();
    let mut triggers = Vec::new();

    for rule in rules.iter_mut().filter(|r| r.state == AlertState::Armed) {
        let lookup = quotes.lookup(&rule.symbol, max_age);
        let Some(quote) = lookup.quote() else {
            tracing::debug!("Skipping alert {} for {}: no quote", rule.id, rule.symbol);
            continue;
        };

        if !rule.condition.is_met(quote.price, rule.threshold) {
            continue;
        }

        rule.state = AlertState::Triggered;
        rule.last_triggered = Some(triggered_at);

        let trigger = AlertTrigger {
            rule_id: rule.id,
            symbol: rule.symbol.clone(),
            condition: rule.condition,
            threshold: rule.threshold,
            observed_price: quote.price,
            quote_timestamp: quote.timestamp,
            freshness: quote.freshness,
            triggered_at,
        };
        tracing::info!("Alert {} triggered: {}", rule.id, trigger.message());
        triggers.push(trigger);
    }

    triggers
}

/// Validate a raw alert definition at the ingestion boundary.
pub fn validate_alert(input: &AlertInput) -> Result<AlertInput> {
    let symbol = normalize_symbol(&input.symbol);
    if symbol.is_empty() {
        return Err(PortfolioError::InvalidInput("alert symbol is empty".to_string()));
    }
    if input.threshold <= Decimal::ZERO {
        return Err(PortfolioError::InvalidInput(format!(
            "alert threshold must be positive for {}, got {}",
            symbol, input.threshold
        )));
    }
    Ok(AlertInput {
        symbol,
        ..input.clone()
    })
}

/// Owns the alert rules and drives their lifecycle.
#[derive(Debug, Default)]
pub struct AlertManager {
    rules: Vec<AlertRule>,
    next_id: u64,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new alert, returning its id.
    pub fn create_alert(&mut self, input: AlertInput) -> Result<u64> {
        self.create_alert_at(input, Utc::now())
    }

    /// Like `create_alert`, with an explicit creation time.
    pub fn create_alert_at(&mut self, input: AlertInput, created_at: DateTime<Utc>) -> Result<u64> {
        let input = validate_alert(&input)?;
        let id = self.next_id;
        self.next_id += 1;

        self.rules.push(AlertRule {
            id,
            symbol: input.symbol,
            condition: input.condition,
            threshold: input.threshold,
            state: input.state,
            created_at,
            last_triggered: None,
        });
        Ok(id)
    }

    /// Look up a rule by id.
    pub fn get_alert(&self, id: u64) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Every rule in creation order, whatever its state.
    pub fn all_alerts(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Rules still waiting for their condition.
    pub fn active_alerts(&self) -> Vec<&AlertRule> {
        self.rules
            .iter()
            .filter(|r| r.state == AlertState::Armed)
            .collect()
    }

    /// Rules watching `symbol` (case-insensitive).
    pub fn alerts_for_symbol(&self, symbol: &str) -> Vec<&AlertRule> {
        let symbol = normalize_symbol(symbol);
        self.rules.iter().filter(|r| r.symbol == symbol).collect()
    }

    /// Remove a rule, returning it.
    pub fn delete_alert(&mut self, id: u64) -> Result<AlertRule> {
        let idx = self.index_of(id)?;
        Ok(self.rules.remove(idx))
    }

    /// Evaluate every armed rule; see [`evaluate`].
    pub fn evaluate<Q>(&mut self, quotes: &Q, max_age: Duration) -> Vec<AlertTrigger>
    where
        Q: QuoteSource + ?Sized,
    {
        evaluate(&mut self.rules, quotes, max_age)
    }

    /// Triggered → Acknowledged.
    pub fn acknowledge(&mut self, id: u64) -> Result<()> {
        let rule = self.rule_mut(id)?;
        if rule.state != AlertState::Triggered {
            return Err(PortfolioError::InvalidTransition {
                id,
                from: rule.state,
                action: "acknowledge",
            });
        }
        rule.state = AlertState::Acknowledged;
        Ok(())
    }

    /// Any state → Disabled.
    pub fn disable(&mut self, id: u64) -> Result<()> {
        self.rule_mut(id)?.state = AlertState::Disabled;
        Ok(())
    }

    /// Any state → Armed. The only way a fired rule can fire again.
    pub fn rearm(&mut self, id: u64) -> Result<()> {
        let rule = self.rule_mut(id)?;
        if rule.state != AlertState::Armed {
            tracing::debug!("Re-arming alert {} from {:?}", id, rule.state);
        }
        rule.state = AlertState::Armed;
        Ok(())
    }

    fn index_of(&self, id: u64) -> Result<usize> {
        self.rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(PortfolioError::AlertNotFound(id))
    }

    fn rule_mut(&mut self, id: u64) -> Result<&mut AlertRule> {
        let idx = self.index_of(id)?;
        Ok(&mut self.rules[idx])
    }
}
