//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Scoring failed: {0}")]
    ScoringFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] haven_media::MediaError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] haven_ledger::LedgerError),

    #[error("Alert error: {0}")]
    Alert(#[from] haven_alert::AlertError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    pub fn scoring_failed(msg: impl Into<String>) -> Self {
        Self::ScoringFailed(msg.into())
    }
}
