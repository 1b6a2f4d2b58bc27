// src/error.rs

use thiserror::Error;

/// Core error types for modcheck
///
/// Catalog failures are values, not panics: callers match on the variant and
/// decide whether the run degrades (a single mod stays unmatched) or stops
/// (authentication is unrecoverable without a new key).
#[derive(Error, Debug)]
pub enum Error {
    /// The catalog has no entry for the requested mod
    #[error("Not found in catalog")]
    NotFound,

    /// The catalog has the mod, but no version compatible with the target SPT version
    #[error("No version compatible with SPT {0}")]
    NoCompatibleVersion(String),

    /// The catalog throttled us and retries were exhausted
    #[error("Rate limited by the catalog after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// A request was malformed before it ever left the process
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The API key was rejected
    ///
    /// `should_delete_key` is true for definitive rejections (the stored
    /// credential is useless and should be removed), false for ambiguous
    /// failures where the key may still be valid.
    #[error("API key rejected by the catalog")]
    InvalidApiKey { should_delete_key: bool },

    /// The target SPT version is unknown to the catalog
    #[error("SPT version {0} is not known to the catalog")]
    InvalidSptVersion(String),

    /// Transport, decode, or server-side failure on a catalog call
    #[error("Catalog API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Startup/setup error
    #[error("Failed to initialize: {0}")]
    Init(String),

    /// The run was cancelled by the operator
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Build an `Api` error from a message alone
    pub fn api(message: impl Into<String>) -> Self {
        Error::Api {
            message: message.into(),
            status_code: None,
            cause: None,
        }
    }

    /// Build an `Api` error carrying the HTTP status that produced it
    pub fn api_status(message: impl Into<String>, status: u16) -> Self {
        Error::Api {
            message: message.into(),
            status_code: Some(status),
            cause: None,
        }
    }

    /// True when the run cannot meaningfully continue (auth or cancellation)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidApiKey { .. } | Error::Cancelled)
    }
}

/// Result type alias using modcheck's Error type
pub type Result<T> = std::result::Result<T, Error>;
