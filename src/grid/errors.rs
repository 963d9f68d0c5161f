//! Grid-specific error types

use thiserror::Error;

/// Errors that can occur in grid trading operations
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error("Grid level not found: index {0}")]
    LevelNotFound(usize),

    /// Connection dropped or timed out; worth reconnecting and retrying
    #[error("Network error: {0}")]
    Network(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Exchange call '{operation}' failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl GridError {
    /// Network faults, including ones the retry wrapper already gave up on
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GridError::Network(_) | GridError::RetriesExhausted { .. }
        )
    }
}

impl From<crate::exchange::Error> for GridError {
    fn from(err: crate::exchange::Error) -> Self {
        use crate::exchange::Error as SdkError;

        if err.is_transient() {
            return GridError::Network(err.to_string());
        }
        match err {
            SdkError::AssetNotFound(asset) => GridError::AssetNotFound(asset),
            SdkError::JsonParse(e) => GridError::JsonParse(e),
            SdkError::PrivateKeyParse(e) => GridError::InvalidConfig(e),
            other => GridError::Exchange(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::JsonParse(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_errors_keep_transience() {
        let err: GridError = crate::exchange::Error::Network("connection reset".into()).into();
        assert!(matches!(err, GridError::Network(_)));

        let err: GridError = crate::exchange::Error::ServerRequest {
            status_code: 502,
            error_message: "bad gateway".into(),
        }
        .into();
        assert!(err.is_transient());

        let err: GridError = crate::exchange::Error::ClientRequest {
            status_code: 422,
            error_code: None,
            error_message: "bad input".into(),
        }
        .into();
        assert!(!err.is_transient());
    }
}
