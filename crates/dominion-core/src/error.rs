//! Error types for dominion.

use thiserror::Error;

/// Result type alias using dominion's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dominion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Geo-trace could not be decoded into cells
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Provider credential missing or could not be refreshed
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Activity feed call failed
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A polyline that cannot be turned into grid cells.
///
/// Recoverable per activity: the import loop tallies it and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The encoded path string is malformed.
    #[error("invalid polyline: {0}")]
    InvalidPolyline(String),

    /// A decoded sample lies outside the valid coordinate range.
    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

/// Failure to obtain a usable provider credential for a user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The user never connected the provider account.
    #[error("user {0} has no provider credential")]
    NotConnected(String),

    /// The refresh grant was rejected or returned no access token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The credential store could not be read or written.
    #[error("credential store unavailable: {0}")]
    Store(String),
}

/// Failure talking to the external activity feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The feed rejected the access token (expired or revoked).
    #[error("feed rejected credential: {0}")]
    Unauthorized(String),

    /// The feed answered with a non-success status.
    #[error("feed returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never completed (connect, timeout, TLS).
    #[error("feed transport error: {0}")]
    Transport(String),

    /// The feed answered but the body could not be understood.
    #[error("malformed feed response: {0}")]
    Malformed(String),
}

impl FeedError {
    /// Whether this failure means the access token must be refreshed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FeedError::Unauthorized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FeedError::Malformed(e.to_string())
        } else {
            FeedError::Transport(e.to_string())
        }
    }
}
