//! Error type shared by all resolver layers.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tower::BoxError;

/// Error observed while resolving a value.
///
/// The underlying resolver error is reference-counted so layers can replay a
/// previously observed failure (for example while a cached error is still
/// within its TTL window) without invoking the resolver again. Cloning is
/// cheap and every clone refers to the same original error.
#[derive(Debug, Clone)]
pub struct ResolveError(Arc<dyn StdError + Send + Sync + 'static>);

impl ResolveError {
    /// Wrap a resolver error.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(Arc::from(err.into()))
    }

    /// Construct an error from a plain message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::new(msg.into())
    }

    /// Borrow the underlying resolver error.
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for ResolveError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<BoxError> for ResolveError {
    fn from(err: BoxError) -> Self {
        Self::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_transparent() {
        let err = ResolveError::msg("upstream unavailable");
        assert_eq!(err.to_string(), "upstream unavailable");
    }

    #[test]
    fn clones_share_the_original_error() {
        let err = ResolveError::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timeout",
        ));
        let replayed = err.clone();
        assert_eq!(err.to_string(), replayed.to_string());
        assert!(replayed.get_ref().is::<std::io::Error>());
    }
}
