//! Error types for the weather station

/// Errors that can occur in the weather station
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    #[error("Sensor read failed: {0}")]
    Sensor(String),

    #[error("Invalid cascade: {0}")]
    Cascade(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Report sink error: {0}")]
    Sink(String),
}

/// Result type alias for weather station operations
pub type Result<T> = std::result::Result<T, StationError>;
