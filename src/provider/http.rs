//! HTTP provider
//!
//! Speaks the chat-completions wire shape shared by the supported vendors.
//! Wraps every call with the rate-limit bucket, the circuit breaker, and a
//! jittered exponential-backoff retry loop for transient failures.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::TokenUsage;

use super::circuit::{CircuitBreaker, TokenBucket};
use super::error::ProviderError;
use super::types::{ChatMessage, ChatRole, FinishReason, ProviderRequest, ProviderResponse, ToolCallRequest};
use super::Provider;

/// Local retry attempts for transient errors before failover sees them
const MAX_RETRIES: u32 = 3;

/// Base backoff delay, doubled per attempt with jitter
const INITIAL_BACKOFF_MS: u64 = 500;

/// Settings for one HTTP provider instance
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Vendor name, e.g. `anthropic` or `openai`
    pub name: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    /// Sustained requests per second admitted by the token bucket
    pub requests_per_sec: f64,
    /// Bucket burst capacity
    pub burst: u32,
}

/// A concrete provider reached over HTTP
pub struct HttpProvider {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    timeout: Duration,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        debug!(name = %config.name, model = %config.model, base_url = %config.base_url, "HttpProvider::new");
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            name: config.name,
            model: config.model,
            api_key: config.api_key,
            base_url: config.base_url,
            http,
            timeout: config.timeout,
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown),
            bucket: TokenBucket::new(config.burst, config.requests_per_sec),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        debug!(model = %self.model, max_tokens = request.max_tokens, "build_body: called");
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": convert_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            debug!(tool_count = request.tools.len(), "build_body: attaching tools");
            body["tools"] = serde_json::json!(request.tools.iter().map(|t| t.to_wire()).collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        } else {
            debug!("build_body: no tools");
        }

        body
    }

    async fn call_once(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, message_count = request.messages.len(), "call_once: called");
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(request);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Network(e)
                }
            })?;

        let status = response.status().as_u16();
        debug!(provider = %self.name, status, "call_once: response received");

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30);
            debug!(provider = %self.name, retry_after, "call_once: rate limited");
            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if status == 401 || status == 403 {
            debug!(provider = %self.name, status, "call_once: authentication rejected");
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(text));
        }

        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let wire: WireResponse = response.json().await.map_err(ProviderError::Network)?;
        parse_response(wire)
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, "complete: called");
        self.bucket.acquire().await;

        if !self.breaker.try_acquire() {
            debug!(provider = %self.name, "circuit open, failing fast");
            return Err(ProviderError::CircuitOpen {
                provider: self.name.clone(),
            });
        }

        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let jitter = rand::rng().random_range(0..=backoff.as_millis() as u64 / 2);
                let delay = backoff + Duration::from_millis(jitter);
                debug!(provider = %self.name, attempt, ?delay, "retrying after transient error");
                tokio::time::sleep(delay).await;
                backoff *= 2;
            }

            match self.call_once(&request).await {
                Ok(response) => {
                    debug!(provider = %self.name, attempt, finish_reason = ?response.finish_reason, "complete: call succeeded");
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    warn!(provider = %self.name, attempt, error = %e, "provider call failed, will retry");
                    last_err = Some(e);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }

        self.breaker.record_failure();
        Err(last_err.unwrap_or_else(|| ProviderError::InvalidResponse("retry loop exited without error".into())))
    }
}

/// Convert uniform messages into chat-completions wire values
fn convert_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    debug!(message_count = messages.len(), "convert_messages: called");
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => "tool",
            };

            let mut value = serde_json::json!({
                "role": role,
                "content": msg.content,
            });

            if !msg.tool_calls.is_empty() {
                value["tool_calls"] = serde_json::json!(
                    msg.tool_calls
                        .iter()
                        .map(|call| {
                            serde_json::json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments,
                                }
                            })
                        })
                        .collect::<Vec<_>>()
                );
            }

            if let Some(id) = &msg.tool_call_id {
                value["tool_call_id"] = serde_json::json!(id);
            }

            value
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn parse_response(wire: WireResponse) -> Result<ProviderResponse, ProviderError> {
    debug!(choices = wire.choices.len(), "parse_response: called");
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("response carried no choices".into()))?;

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .into_iter()
        .map(|c| ToolCallRequest {
            id: c.id,
            name: c.function.name,
            arguments: c.function.arguments,
        })
        .collect();

    let finish_reason = match choice.finish_reason.as_deref() {
        Some(reason) => FinishReason::from_wire(reason),
        None if !tool_calls.is_empty() => FinishReason::ToolCalls,
        None => FinishReason::Stop,
    };

    let usage = wire
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(ProviderResponse {
        content: choice.message.content,
        tool_calls,
        finish_reason,
        usage,
    })
}
