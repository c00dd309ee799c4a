//! Alert error types.

use thiserror::Error;

/// Result type for alert operations.
pub type AlertResult<T> = Result<T, AlertError>;

/// Errors that can occur while dispatching alerts.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Gateway rejected message: {0}")]
    GatewayRejected(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] haven_ledger::LedgerError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AlertError {
    pub fn gateway_rejected(msg: impl Into<String>) -> Self {
        Self::GatewayRejected(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
