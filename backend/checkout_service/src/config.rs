//! Application configuration loaded from environment variables.

use checkout_engine::CheckoutConfig;
use rust_decimal::Decimal;

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// GraphQL endpoint of the marketplace backend
    pub api_url: String,
    /// OAuth token sent as a bearer credential
    pub api_token: String,
    /// Path to the SQLite checkout ledger
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Timeout (in seconds) for outbound GraphQL calls
    pub http_timeout_secs: u64,
    /// Size of the SQLite connection pool
    pub db_max_connections: u32,
    /// Stepper and no-reward amounts handed to every session
    pub checkout: CheckoutConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = CheckoutConfig::default();
        Ok(Config {
            api_url: env_var("API_URL")
                .unwrap_or_else(|_| "https://api.example-crowdfunding.test/graph".to_string()),
            api_token: env_var("API_TOKEN").map_err(|_| {
                ServiceError::Config("API_TOKEN environment variable is required".to_string())
            })?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./checkouts.db".to_string()),
            api_port: parse_or("API_PORT", 3001)?,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5)?,
            checkout: CheckoutConfig {
                pledge_step: parse_or("PLEDGE_STEP", defaults.pledge_step)?,
                bonus_step: parse_or("BONUS_STEP", defaults.bonus_step)?,
                no_reward_minimum: parse_or("NO_REWARD_MINIMUM", defaults.no_reward_minimum)?,
            },
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::Config(format!("Invalid {key}")))
}

/// Amounts must be strictly positive to be usable as steps or minimums.
pub fn positive_amount(key: &str, value: Decimal) -> Result<Decimal> {
    if value > Decimal::ZERO {
        Ok(value)
    } else {
        Err(ServiceError::Config(format!("{key} must be positive")))
    }
}

impl Config {
    /// Reject values that parse but make no sense.
    pub fn validated(self) -> Result<Self> {
        positive_amount("PLEDGE_STEP", self.checkout.pledge_step)?;
        positive_amount("BONUS_STEP", self.checkout.bonus_step)?;
        positive_amount("NO_REWARD_MINIMUM", self.checkout.no_reward_minimum)?;
        if self.db_max_connections == 0 {
            return Err(ServiceError::Config("DB_MAX_CONNECTIONS must be at least 1".into()));
        }
        Ok(self)
    }
}
