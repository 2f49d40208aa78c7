use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    // Inputs
    pub portfolio_csv: PathBuf,      // data/portfolio.csv
    pub alerts_json: PathBuf,        // data/alerts.json
    pub quotes_file: PathBuf,        // data/quotes.json

    // Timing
    pub check_interval_seconds: u64, // 60
    pub quote_max_age_seconds: u64,  // 900 (15 minutes)
    pub fetch_timeout_seconds: u64,  // 10

    // Run a single cycle and exit
    pub run_once: bool,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            portfolio_csv: get("PORTFOLIO_CSV", "data/portfolio.csv").into(),
            alerts_json: get("ALERTS_JSON", "data/alerts.json").into(),
            quotes_file: get("QUOTES_FILE", "data/quotes.json").into(),

            check_interval_seconds: get("CHECK_INTERVAL_SECS", "60")
                .parse()
                .context("CHECK_INTERVAL_SECS must be a whole number of seconds")?,
            quote_max_age_seconds: get("QUOTE_MAX_AGE_SECS", "900")
                .parse()
                .context("QUOTE_MAX_AGE_SECS must be a whole number of seconds")?,
            fetch_timeout_seconds: get("FETCH_TIMEOUT_SECS", "10")
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a whole number of seconds")?,

            run_once: get("RUN_ONCE", "false")
                .parse()
                .context("RUN_ONCE must be true or false")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.check_interval_seconds > 0, "CHECK_INTERVAL_SECS must be > 0");
        ensure!(self.quote_max_age_seconds > 0, "QUOTE_MAX_AGE_SECS must be > 0");
        ensure!(self.fetch_timeout_seconds > 0, "FETCH_TIMEOUT_SECS must be > 0");
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn quote_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.quote_max_age_seconds as i64)
    }
}
