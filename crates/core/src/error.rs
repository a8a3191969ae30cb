//! Error types for data-source calls and screening operations

use thiserror::Error;

/// Failures reported by a [`DataSource`](crate::ingest::provider::DataSource).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider has no record for the symbol
    #[error("no data for {symbol}")]
    NotFound { symbol: String },

    /// The provider answered but the payload was empty or unusable
    #[error("data not available for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("provider rate limit exceeded")]
    RateLimited,

    /// Credentials were rejected. Every further call would fail the same way.
    #[error("provider authentication failed: {0}")]
    Authentication(String),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Systemic failures abort a whole scan instead of skipping one ticker.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Errors surfaced by the screener to its callers.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Caller supplied a filter or bound outside the accepted set
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Price history or fundamentals missing for one ticker
    #[error("data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("symbol not found: {0}")]
    NotFound(String),

    /// A provider failure that is not scoped to one ticker
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Internal(String),
}

impl ScanError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
