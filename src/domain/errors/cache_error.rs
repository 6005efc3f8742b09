//! Cache and loading error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while caching, fetching or decoding images.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Entry not found in cache.
    #[error("not found: {0}")]
    NotFound(String),
    /// Index and files on disk disagree.
    #[error("cache corruption: {0}")]
    CacheCorruption(String),
    /// Bytes could not be decoded or encoded.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Transport error or unexpected response while fetching.
    #[error("network error: {0}")]
    NetworkError(String),
    /// Entry is larger than the whole cache budget.
    #[error("entry too large: {0}")]
    EntryTooLarge(String),
    /// No async runtime was available to run background work.
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

impl CacheError {
    /// Creates not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::CacheCorruption(message.into())
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError(message.into())
    }

    /// Creates IO error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError(message.into())
    }

    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError(message.into())
    }

    /// Returns whether a later attempt may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::CacheCorruption(_) | Self::NotFound(_)
        )
    }

    /// Returns whether the entry can never fit in the cache.
    #[must_use]
    pub const fn is_too_large(&self) -> bool {
        matches!(self, Self::EntryTooLarge(_))
    }

    /// Returns whether the cached bytes themselves are bad.
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CacheError::network("timeout").is_recoverable());
        assert!(CacheError::corruption("missing file").is_recoverable());
        assert!(!CacheError::decode("bad header").is_recoverable());
        assert!(CacheError::decode("bad header").is_decode_error());
        assert!(CacheError::not_found("gone").is_recoverable());
        assert!(!CacheError::EntryTooLarge("64 > 32".into()).is_recoverable());
        assert!(CacheError::EntryTooLarge("64 > 32".into()).is_too_large());
    }

    #[test]
    fn test_io_conversion() {
        let err: CacheError = std::io::Error::other("disk full").into();
        assert!(matches!(err, CacheError::IoError(msg) if msg.contains("disk full")));
    }
}
