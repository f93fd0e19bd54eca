//! Application configuration loaded from environment variables.

use std::time::Duration;

use crate::account::AccountId;
use crate::errors::{Result, ViewError};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC ledger gateway endpoint
    pub gateway_url: String,
    /// The deployed campaign contract
    pub contract_address: AccountId,
    /// SQLite database holding the wallet session
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Classifier tick period in milliseconds (1..=1000)
    pub tick_interval_ms: u64,
    /// Concurrent record fetches inside one load
    pub load_concurrency: usize,
    /// How often (in seconds) to poll for a transaction receipt
    pub tx_poll_interval_secs: u64,
    /// How long to wait for a receipt before giving up
    pub tx_confirm_timeout_secs: u64,
    /// Timeout applied to every outbound HTTP request
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let contract_address = lookup("CONTRACT_ADDRESS").ok_or_else(|| {
            ViewError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
        })?;
        let contract_address = contract_address
            .parse()
            .map_err(|_| ViewError::Config("Invalid CONTRACT_ADDRESS".to_string()))?;

        let tick_interval_ms: u64 = parse(&var("TICK_INTERVAL_MS", "1000"), "TICK_INTERVAL_MS")?;
        if !(1..=1000).contains(&tick_interval_ms) {
            return Err(ViewError::Config(
                "TICK_INTERVAL_MS must be between 1 and 1000".to_string(),
            ));
        }

        let load_concurrency: usize = parse(&var("LOAD_CONCURRENCY", "4"), "LOAD_CONCURRENCY")?;
        if load_concurrency == 0 {
            return Err(ViewError::Config(
                "LOAD_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            gateway_url: var("GATEWAY_URL", "http://127.0.0.1:8545"),
            contract_address,
            database_url: var("DATABASE_URL", "sqlite:./campaign_view.db"),
            api_port: parse(&var("API_PORT", "3002"), "API_PORT")?,
            tick_interval_ms,
            load_concurrency,
            tx_poll_interval_secs: parse(
                &var("TX_POLL_INTERVAL_SECS", "2"),
                "TX_POLL_INTERVAL_SECS",
            )?,
            tx_confirm_timeout_secs: parse(
                &var("TX_CONFIRM_TIMEOUT_SECS", "300"),
                "TX_CONFIRM_TIMEOUT_SECS",
            )?,
            request_timeout_secs: parse(
                &var("REQUEST_TIMEOUT_SECS", "30"),
                "REQUEST_TIMEOUT_SECS",
            )?,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ViewError::Config(format!("Invalid {key}")))
}
