//! Failover composite provider
//!
//! Tries an ordered provider list per call, swallowing retryable errors
//! (timeout, rate limit, 5xx, circuit open). A non-retryable error from any
//! provider fails the call immediately: failover never hides auth or
//! request errors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::types::{ProviderRequest, ProviderResponse};
use super::Provider;

/// Ordered chain of providers tried in sequence
pub struct FailoverProvider {
    providers: Vec<Arc<dyn Provider>>,
}

impl FailoverProvider {
    /// Compose a chain, collapsing single-entry lists to the inner provider
    pub fn compose(providers: Vec<Arc<dyn Provider>>) -> Result<Arc<dyn Provider>, ProviderError> {
        match providers.len() {
            0 => Err(ProviderError::InvalidResponse("empty provider list".into())),
            1 => Ok(providers.into_iter().next().unwrap_or_else(|| unreachable!())),
            _ => Ok(Arc::new(Self { providers })),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl Provider for FailoverProvider {
    fn name(&self) -> &str {
        "failover"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for provider in &self.providers {
            debug!(provider = provider.name(), "failover: trying provider");
            match provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    warn!(provider = provider.name(), error = %e, "failover: provider failed, trying next");
                    last_err = Some(e);
                }
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "failover: fatal error, not failing over");
                    return Err(e);
                }
            }
        }

        let last = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no providers configured".to_string());
        Err(ProviderError::Exhausted {
            attempts: self.providers.len(),
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::TokenUsage;

    struct ScriptedProvider {
        name: &'static str,
        error: Option<fn() -> ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                error: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, error: fn() -> ProviderError) -> Arc<Self> {
            Arc::new(Self {
                name,
                error: Some(error),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(make_err) => Err(make_err()),
                None => Ok(ProviderResponse::text("ok", TokenUsage::new(1, 1))),
            }
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new(vec![super::super::types::ChatMessage::user("hi")])
    }

    #[test]
    fn test_compose_empty_rejected() {
        assert!(FailoverProvider::compose(vec![]).is_err());
    }

    #[test]
    fn test_compose_single_collapses() {
        let only = ScriptedProvider::ok("only");
        let composed = FailoverProvider::compose(vec![only]).unwrap();
        assert_eq!(composed.name(), "only");
    }

    #[tokio::test]
    async fn test_failover_skips_retryable_errors() {
        let primary = ScriptedProvider::failing("primary", || ProviderError::Timeout(Duration::from_secs(1)));
        let secondary = ScriptedProvider::ok("secondary");
        let chain = FailoverProvider::compose(vec![primary.clone(), secondary.clone()]).unwrap();

        let response = chain.complete(request()).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("ok"));
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failover_stops_on_fatal_error() {
        let primary = ScriptedProvider::failing("primary", || ProviderError::Auth("bad key".into()));
        let secondary = ScriptedProvider::ok("secondary");
        let chain = FailoverProvider::compose(vec![primary, secondary.clone()]).unwrap();

        let err = chain.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failover_exhaustion_carries_last_error() {
        let a = ScriptedProvider::failing("a", || ProviderError::Timeout(Duration::from_secs(1)));
        let b = ScriptedProvider::failing("b", || ProviderError::Api {
            status: 503,
            message: "unavailable".into(),
        });
        let chain = FailoverProvider::compose(vec![a, b]).unwrap();

        let err = chain.complete(request()).await.unwrap_err();
        match err {
            ProviderError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("503"));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failover_circuit_open_is_skipped() {
        let a = ScriptedProvider::failing("a", || ProviderError::CircuitOpen {
            provider: "a".into(),
        });
        let b = ScriptedProvider::ok("b");
        let chain = FailoverProvider::compose(vec![a, b]).unwrap();

        assert!(chain.complete(request()).await.is_ok());
    }
}
