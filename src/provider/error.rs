//! Provider error types

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the provider gateway
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("circuit open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("all {attempts} providers failed, last error: {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Transient errors: worth a local retry and eligible for failover
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status == 408 || *status >= 500,
            ProviderError::Network(_) => true,
            ProviderError::Timeout(_) => true,
            ProviderError::CircuitOpen { .. } => true,
            ProviderError::Auth(_) => false,
            ProviderError::InvalidResponse(_) => false,
            ProviderError::Exhausted { .. } => false,
            ProviderError::Json(_) => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(
            ProviderError::RateLimited {
                retry_after: Duration::from_secs(30)
            }
            .is_retryable()
        );
        assert!(
            ProviderError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            ProviderError::Api {
                status: 408,
                message: "request timeout".into()
            }
            .is_retryable()
        );
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(
            ProviderError::CircuitOpen {
                provider: "anthropic".into()
            }
            .is_retryable()
        );

        assert!(!ProviderError::Auth("bad key".into()).is_retryable());
        assert!(
            !ProviderError::Api {
                status: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::InvalidResponse("garbage".into()).is_retryable());
        assert!(
            !ProviderError::Exhausted {
                attempts: 3,
                last: "x".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_after() {
        let err = ProviderError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert!(err.is_rate_limit());

        let err = ProviderError::Timeout(Duration::from_secs(5));
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_rate_limit());
    }
}
