//! Error types for the camera viewer

/// Errors that can occur in the camera viewer
#[derive(Debug, thiserror::Error)]
pub enum CamviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for camera viewer operations
pub type Result<T> = std::result::Result<T, CamviewError>;
