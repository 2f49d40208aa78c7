use std::sync::Arc;

use anyhow::{Context, Result};
use portfolio_manager::{load_alerts_file, load_holdings_file, FilePriceProvider};
use tokio::signal::unix::SignalKind;
use tokio::time;

mod config;
mod monitor;

use config::MonitorConfig;
use monitor::{CycleOutcome, Monitor};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    tracing::info!("Starting portfolio monitor");

    // 2. Configuration
    let config = MonitorConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Check interval: {} seconds", config.check_interval_seconds);
    tracing::info!("  Quote max age: {} seconds", config.quote_max_age_seconds);
    tracing::info!("  Fetch timeout: {} seconds", config.fetch_timeout_seconds);

    // 3. Holdings and alerts. Bad rows are skipped, unreadable files are fatal.
    let holdings = load_holdings_file(&config.portfolio_csv)
        .with_context(|| format!("loading holdings from {}", config.portfolio_csv.display()))?;
    tracing::info!(
        "Loaded {} holdings ({} rows accepted, {} rejected)",
        holdings.loaded.len(),
        holdings.accepted,
        holdings.rejected.len()
    );

    let alerts = load_alerts_file(&config.alerts_json)
        .with_context(|| format!("loading alerts from {}", config.alerts_json.display()))?;
    tracing::info!(
        "Loaded {} alerts ({} rejected)",
        alerts.loaded.all_alerts().len(),
        alerts.rejected.len()
    );
    for rule in alerts.loaded.all_alerts() {
        tracing::info!(
            "  #{} {} {} {} ({:?})",
            rule.id,
            rule.symbol,
            rule.condition.symbol(),
            rule.threshold,
            rule.state
        );
    }

    // 4. Price source
    let provider = Arc::new(FilePriceProvider::new(config.quotes_file.clone()));
    let mut monitor = Monitor::new(
        holdings.loaded,
        alerts.loaded,
        provider,
        config.fetch_timeout(),
        config.quote_max_age(),
    );

    if config.run_once {
        let outcome = monitor.run_cycle().await;
        deliver(&outcome)?;
        return Ok(());
    }

    // 5. Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut interval = time::interval(config.check_interval());
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = monitor.run_cycle().await;
                if let Err(e) = deliver(&outcome) {
                    tracing::error!("Failed to deliver cycle output: {}", e);
                }
            }
            _ = &mut shutdown => {
                tracing::info!(
                    "Shutdown signal received after {} cycles, exiting",
                    monitor.cycles_run()
                );
                break;
            }
        }
    }

    Ok(())
}

/// Log refresh failures and write each fired alert as one JSON line on stdout.
fn deliver(outcome: &CycleOutcome) -> Result<()> {
    for (symbol, reason) in &outcome.refresh.failed {
        tracing::warn!("Quote refresh failed for {}: {}", symbol, reason);
    }
    for symbol in &outcome.refresh.rejected {
        tracing::debug!("Ignored out-of-order quote for {}", symbol);
    }

    for trigger in &outcome.triggers {
        tracing::info!("ALERT: {}", trigger.message());
        println!("{}", serde_json::to_string(trigger)?);
    }
    Ok(())
}
