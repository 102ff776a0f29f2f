//! Fetcher error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure modes of a release check
///
/// `RateLimited` is a backend-wide signal rather than a per-project failure;
/// the checker absorbs it by blocking the whole backend until the reset
/// instant. `Plugin` is an ordinary transient failure retried on the next
/// scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("backend rate limited until {reset_time}")]
    RateLimited { reset_time: DateTime<Utc> },

    #[error("{message}")]
    Plugin { message: String },
}

impl FetchError {
    /// Plugin failure from any printable reason
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::Plugin {
            message: message.into(),
        }
    }

    /// Rate limit that resets at the given UTC instant
    pub fn rate_limited(reset_time: DateTime<Utc>) -> Self {
        Self::RateLimited { reset_time }
    }

    /// Check if this is a backend-wide rate limit
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Get the reset instant if this is a rate limit
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_time } => Some(*reset_time),
            Self::Plugin { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_rate_limit() {
        let reset = Utc::now() + Duration::hours(1);
        assert!(FetchError::rate_limited(reset).is_rate_limit());
        assert!(!FetchError::plugin("boom").is_rate_limit());
    }

    #[test]
    fn test_reset_time() {
        let reset = Utc::now() + Duration::hours(1);
        assert_eq!(FetchError::rate_limited(reset).reset_time(), Some(reset));
        assert_eq!(FetchError::plugin("boom").reset_time(), None);
    }

    #[test]
    fn test_display() {
        let err = FetchError::plugin("version feed returned 404");
        assert_eq!(err.to_string(), "version feed returned 404");

        let reset = Utc::now();
        let err = FetchError::rate_limited(reset);
        assert!(err.to_string().contains("rate limited"));
    }
}
