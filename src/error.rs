//! Error types for the rate limiting middleware
use std::fmt;
use std::time::Duration;

/// Errors produced when validating a rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `total` must be > 0.
    #[error("total must be > 0 (got {0})")]
    InvalidTotal(u64),
    /// `expire` must be at least one millisecond.
    #[error("expire must be at least 1ms (got {0:?})")]
    InvalidExpire(Duration),
    /// The key namespace must not be empty.
    #[error("namespace must not be empty")]
    EmptyNamespace,
}

/// A stored value could not be read back as a rate limit window.
#[derive(Debug, thiserror::Error)]
#[error("stored rate limit window is malformed: {0}")]
pub struct WindowCodecError(#[from] serde_json::Error);

/// Error returned by the rate limiting service.
///
/// Store failures are carried as-is in `Store`; nothing is wrapped or retried.
#[derive(Debug, Clone)]
pub enum RateLimitError<S, E> {
    /// The window store failed to read or write.
    Store(S),
    /// The wrapped service failed.
    Inner(E),
}

impl<S: fmt::Display, E: fmt::Display> fmt::Display for RateLimitError<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "rate limit store failed: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<S, E> std::error::Error for RateLimitError<S, E>
where
    S: std::error::Error + 'static,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Inner(e) => Some(e),
        }
    }
}

impl<S, E> RateLimitError<S, E> {
    /// Check if the store failed.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
    /// Check if the wrapped service failed.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Borrow the store error if present.
    pub fn as_store(&self) -> Option<&S> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
    /// Take the store error if present.
    pub fn into_store(self) -> Option<S> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
    /// Take the inner service error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);
    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}

    #[test]
    fn store_error_display_and_source() {
        let err: RateLimitError<DummyError, DummyError> = RateLimitError::Store(DummyError("down"));
        assert_eq!(err.to_string(), "rate limit store failed: down");
        assert_eq!(err.source().map(|e| e.to_string()), Some("down".to_string()));
        assert!(err.is_store());
        assert!(!err.is_inner());
    }

    #[test]
    fn inner_error_displays_transparently() {
        let err: RateLimitError<DummyError, DummyError> = RateLimitError::Inner(DummyError("boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(err.as_store().is_none());
        assert_eq!(err.into_inner(), Some(DummyError("boom")));
    }

    #[test]
    fn into_store_returns_exact_error() {
        let err: RateLimitError<DummyError, DummyError> = RateLimitError::Store(DummyError("uh oh"));
        assert_eq!(err.into_store(), Some(DummyError("uh oh")));
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(ConfigError::InvalidTotal(0).to_string(), "total must be > 0 (got 0)");
        assert!(ConfigError::InvalidExpire(Duration::ZERO).to_string().contains("expire"));
        assert_eq!(ConfigError::EmptyNamespace.to_string(), "namespace must not be empty");
    }

    #[test]
    fn codec_error_wraps_serde() {
        let serde_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err = WindowCodecError::from(serde_err);
        assert!(err.to_string().starts_with("stored rate limit window is malformed"));
    }
}
