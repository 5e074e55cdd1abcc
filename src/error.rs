//! Error types for the custody service

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the custody service
#[derive(Error, Debug)]
pub enum Error {
    // Credential lookup errors
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    // Vault errors
    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Encryption failed: {0}")]
    EncryptionFailure(String),

    #[error("Incomplete credential: {0}")]
    IncompleteCredential(String),

    // Adapter errors
    #[error("Failed to create exchange client: {0}")]
    ClientCreationFailure(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classification surfaced to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CredentialNotFound,
    UnsupportedPlatform,
    DecryptionFailure,
    IncompleteCredential,
    ClientCreationFailure,
    InsufficientFunds,
    NetworkError,
    ExchangeError,
    NotFound,
    InvalidInput,
    Internal,
}

impl Error {
    /// Classify this error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CredentialNotFound(_) => ErrorKind::CredentialNotFound,
            Error::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            Error::DecryptionFailure => ErrorKind::DecryptionFailure,
            Error::IncompleteCredential(_) => ErrorKind::IncompleteCredential,
            Error::ClientCreationFailure(_) => ErrorKind::ClientCreationFailure,
            Error::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Error::Network(_) => ErrorKind::NetworkError,
            Error::Exchange(_) => ErrorKind::ExchangeError,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) | Error::Duplicate(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable (transient)
    ///
    /// Always false: withdrawals are single-shot and must never be
    /// duplicated by an automatic retry.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Check if this error was raised by the exchange during an invocation
    pub fn is_exchange_failure(&self) -> bool {
        matches!(
            self,
            Error::InsufficientFunds(_) | Error::Network(_) | Error::Exchange(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Transport failures surface as network errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}
