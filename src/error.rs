use thiserror::Error;

/// Main error type for the decision core
#[derive(Error, Debug)]
pub enum PumpGateError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for PumpGateError
pub type Result<T> = std::result::Result<T, PumpGateError>;

/// Field-level validation failures at the signal ingestion boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Non-positive price: {0}")]
    NonPositivePrice(String),

    #[error("Field {field} is not finite")]
    NotFinite { field: &'static str },

    #[error("Field {field} is negative: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),
}

impl From<SignalError> for PumpGateError {
    fn from(err: SignalError) -> Self {
        PumpGateError::Validation(err.to_string())
    }
}
