use thiserror::Error;

/// Errors raised by the Hyperliquid HTTP/signing layer
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Client error: status code: {status_code}, error code: {error_code:?}, error message: {error_message}")]
    ClientRequest {
        status_code: u16,
        error_code: Option<u16>,
        error_message: String,
    },

    #[error("Server error: status code: {status_code}, error message: {error_message}")]
    ServerRequest {
        status_code: u16,
        error_message: String,
    },

    /// Connection dropped, reset or timed out before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    #[error("Generic request error: {0}")]
    GenericRequest(String),

    #[error("Json parse error: {0}")]
    JsonParse(String),

    #[error("Rmp parse error: {0}")]
    RmpParse(String),

    #[error("ECDSA signature failed: {0}")]
    SignatureFailure(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Private key parse error: {0}")]
    PrivateKeyParse(String),
}

impl Error {
    /// Whether retrying the same request on a fresh connection may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::ServerRequest { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
