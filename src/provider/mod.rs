//! Provider gateway
//!
//! One trait, one uniform request/response shape. Concrete vendors are all
//! reached through [`HttpProvider`]; ordered failover chains compose through
//! [`FailoverProvider`]. The engine receives a single `Arc<dyn Provider>`
//! constructed at start and passed by reference, never a global registry.

pub mod circuit;
pub mod error;
pub mod failover;
pub mod http;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::{debug, info};

pub use circuit::{CircuitBreaker, CircuitState, TokenBucket};
pub use error::ProviderError;
pub use failover::FailoverProvider;
pub use http::{HttpProvider, HttpProviderConfig};
pub use types::{ChatMessage, ChatRole, FinishReason, ProviderRequest, ProviderResponse, ToolCallRequest, ToolSpec};

/// One synchronous operation: messages and tools in, text and tool calls out
#[async_trait]
pub trait Provider: Send + Sync {
    /// Vendor name, used in logs and circuit reports
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// The supported vendor names, in no particular order
pub const KNOWN_VENDORS: [&str; 10] = [
    "anthropic",
    "openai",
    "google",
    "ollama",
    "groq",
    "mistral",
    "together",
    "deepseek",
    "fireworks",
    "cohere",
];

/// Chat-completions base URL for a vendor
pub fn base_url_for(vendor: &str) -> Option<&'static str> {
    match vendor {
        "anthropic" => Some("https://api.anthropic.com/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "google" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "mistral" => Some("https://api.mistral.ai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "fireworks" => Some("https://api.fireworks.ai/inference/v1"),
        "cohere" => Some("https://api.cohere.ai/compatibility/v1"),
        _ => None,
    }
}

/// Environment variable holding a vendor's API key, e.g. `ANTHROPIC_API_KEY`
pub fn api_key_env(vendor: &str) -> String {
    format!("{}_API_KEY", vendor.to_uppercase())
}

/// Default model per vendor when none is configured
pub fn default_model_for(vendor: &str) -> &'static str {
    match vendor {
        "anthropic" => "claude-sonnet-4-20250514",
        "openai" => "gpt-4o",
        "google" => "gemini-2.0-flash",
        "ollama" => "llama3.1",
        "groq" => "llama-3.3-70b-versatile",
        "mistral" => "mistral-large-latest",
        "deepseek" => "deepseek-chat",
        _ => "gpt-4o",
    }
}

/// Settings for building one vendor entry of a provider chain
#[derive(Debug, Clone)]
pub struct ProviderChainConfig {
    /// Ordered vendor names: first is primary, the rest are failover targets
    pub vendors: Vec<String>,
    /// Model override applied to every vendor; vendor default when None
    pub model: Option<String>,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub requests_per_sec: f64,
    pub burst: u32,
}

/// Build the provider chain the engine will use for a run
///
/// API keys come from the `<VENDOR>_API_KEY` environment variables. Ollama
/// needs no key and falls back to a placeholder.
pub fn create_provider(config: &ProviderChainConfig) -> Result<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(config.vendors.len());

    for vendor in &config.vendors {
        let base_url = base_url_for(vendor).ok_or_else(|| eyre::eyre!("unknown provider: {}", vendor))?;

        let env = api_key_env(vendor);
        let api_key = match std::env::var(&env) {
            Ok(key) => key,
            Err(_) if vendor == "ollama" => "ollama".to_string(),
            Err(_) => {
                return Err(eyre::eyre!("environment variable {} not set for provider {}", env, vendor));
            }
        };

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| default_model_for(vendor).to_string());

        debug!(%vendor, %model, "building provider");
        let provider = HttpProvider::new(HttpProviderConfig {
            name: vendor.clone(),
            model,
            api_key,
            base_url: base_url.to_string(),
            timeout: config.timeout,
            failure_threshold: config.failure_threshold,
            cooldown: config.cooldown,
            requests_per_sec: config.requests_per_sec,
            burst: config.burst,
        })
        .context("failed to build HTTP provider")?;

        providers.push(Arc::new(provider));
    }

    info!(chain_len = providers.len(), primary = %config.vendors.first().map(String::as_str).unwrap_or("none"), "provider chain ready");
    FailoverProvider::compose(providers).context("failed to compose provider chain")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_for_known_vendors() {
        for vendor in KNOWN_VENDORS {
            assert!(base_url_for(vendor).is_some(), "missing base url for {}", vendor);
        }
        assert!(base_url_for("acme").is_none());
    }

    #[test]
    fn test_api_key_env_shape() {
        assert_eq!(api_key_env("anthropic"), "ANTHROPIC_API_KEY");
        assert_eq!(api_key_env("deepseek"), "DEEPSEEK_API_KEY");
    }

    #[test]
    fn test_create_provider_unknown_vendor() {
        let config = ProviderChainConfig {
            vendors: vec!["acme".to_string()],
            model: None,
            timeout: Duration::from_secs(30),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            requests_per_sec: 5.0,
            burst: 10,
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_ollama_needs_no_key() {
        let config = ProviderChainConfig {
            vendors: vec!["ollama".to_string()],
            model: None,
            timeout: Duration::from_secs(30),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            requests_per_sec: 5.0,
            burst: 10,
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
