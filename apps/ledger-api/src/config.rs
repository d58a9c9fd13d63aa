//! Ledger API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// What the sale handler does when a tracked product oversells.
///
/// Overselling is never blocked: a stock-count disagreement must not lose
/// a sale record. The policy only decides whether the negative stock is
/// additionally flagged for manual reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Record the sale, let stock go negative silently (original behavior).
    #[default]
    AllowNegative,

    /// Record the sale AND a stock_discrepancies row when stock goes
    /// negative, so someone reconciles the count later.
    FlagDiscrepancy,
}

impl std::str::FromStr for StockPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow_negative" => Ok(StockPolicy::AllowNegative),
            "flag_discrepancy" => Ok(StockPolicy::FlagDiscrepancy),
            _ => Err(ConfigError::InvalidValue("STOCK_POLICY".to_string())),
        }
    }
}

/// Ledger API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// HTTP listen port
    pub port: u16,

    /// SQLite database path
    pub database_path: String,

    /// Redis connection string (optional)
    pub redis_url: Option<String>,

    /// JWT secret key for signing session tokens
    pub jwt_secret: String,

    /// JWT session token lifetime in seconds
    pub jwt_lifetime_secs: i64,

    /// Oversell handling for tracked products
    pub stock_policy: StockPolicy,

    /// Maximum items accepted per batch request
    pub batch_size_limit: usize,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = LedgerConfig {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,

            database_path: env::var("LEDGER_DATABASE_PATH")
                .unwrap_or_else(|_| "./ledger.db".to_string()),

            redis_url: env::var("REDIS_URL").ok(),

            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                // In production this MUST be set via environment variable
                "dukan-ledger-dev-secret-change-in-production".to_string()
            }),

            jwt_lifetime_secs: env::var("JWT_LIFETIME_SECS")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hour
                .parse()
                .map_err(|_| ConfigError::InvalidValue("JWT_LIFETIME_SECS".to_string()))?,

            stock_policy: env::var("STOCK_POLICY")
                .unwrap_or_else(|_| "allow_negative".to_string())
                .parse()?,

            batch_size_limit: env::var("BATCH_SIZE_LIMIT")
                .unwrap_or_else(|_| dukan_core::MAX_BATCH_ITEMS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BATCH_SIZE_LIMIT".to_string()))?,
        };

        Ok(config)
    }

    /// Config used by the integration tests: in-memory-friendly defaults.
    pub fn for_tests() -> Self {
        LedgerConfig {
            port: 0,
            database_path: ":memory:".to_string(),
            redis_url: None,
            jwt_secret: "test-secret".to_string(),
            jwt_lifetime_secs: 3600,
            stock_policy: StockPolicy::AllowNegative,
            batch_size_limit: dukan_core::MAX_BATCH_ITEMS,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_policy_parsing() {
        assert_eq!(
            "allow_negative".parse::<StockPolicy>().unwrap(),
            StockPolicy::AllowNegative
        );
        assert_eq!(
            "flag_discrepancy".parse::<StockPolicy>().unwrap(),
            StockPolicy::FlagDiscrepancy
        );
        assert!("block".parse::<StockPolicy>().is_err());
    }
}
