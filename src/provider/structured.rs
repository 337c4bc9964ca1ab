//! JSON-object completions with validation and bounded retry.

use super::{ChatMessage, CompletionOptions, SharedProvider};
use crate::error::ProviderError;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wraps a provider client so every call yields a JSON object carrying a known list field.
#[derive(Clone)]
pub struct StructuredCompleter {
    client: SharedProvider,
    options: CompletionOptions,
    max_retries: u32,
    backoff_base: Duration,
}

impl StructuredCompleter {
    pub fn new(client: SharedProvider, options: CompletionOptions) -> Self {
        Self {
            client,
            options: CompletionOptions {
                json_mode: true,
                ..options
            },
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff_base = backoff_base;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Issue the prompt and return the parsed object.
    ///
    /// Up to `max_retries` attempts, sleeping `base * 2^n` after the n-th failure. A retry
    /// whose backoff would end past `deadline` is not attempted. Authentication and
    /// model-not-found failures are returned at once.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
        list_field: &str,
        deadline: Instant,
    ) -> Result<Value, ProviderError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.attempt(system, user, list_field, deadline).await;
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_retryable(&err) || attempt >= self.max_retries {
                return Err(err);
            }
            let delay = self.backoff_base * 2u32.saturating_pow(attempt);
            if Instant::now() + delay >= deadline {
                debug!(attempt, "No time left for another provider attempt");
                return Err(err);
            }
            warn!(
                provider = self.client.provider_name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        system: &str,
        user: &str,
        list_field: &str,
        deadline: Instant,
    ) -> Result<Value, ProviderError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let call = self.client.complete(messages, self.options.clone());
        let response = tokio::time::timeout_at(deadline, call)
            .await
            .map_err(|_| ProviderError::Timeout("call exceeded its time budget".to_string()))??;
        parse_object(&response.content, list_field)
    }
}

fn is_retryable(err: &ProviderError) -> bool {
    !matches!(
        err,
        ProviderError::AuthFailed(_) | ProviderError::ModelNotFound(_) | ProviderError::Timeout(_)
    )
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse provider text into a JSON object whose `list_field` is an array.
pub fn parse_object(raw: &str, list_field: &str) -> Result<Value, ProviderError> {
    let text = strip_fences(raw);
    let value: Value = serde_json::from_str(text)
        .or_else(|first| {
            // tolerate prose around the object
            match (text.find('{'), text.rfind('}')) {
                (Some(start), Some(end)) if end > start => {
                    serde_json::from_str(&text[start..=end]).map_err(|_| first)
                }
                _ => Err(first),
            }
        })
        .map_err(|e| ProviderError::MalformedOutput(format!("response is not JSON: {}", e)))?;

    if !value.is_object() {
        return Err(ProviderError::MalformedOutput(
            "response is not a JSON object".to_string(),
        ));
    }
    match value.get(list_field) {
        Some(Value::Array(_)) => Ok(value),
        Some(_) => Err(ProviderError::MalformedOutput(format!(
            "field '{}' is not a list",
            list_field
        ))),
        None => Err(ProviderError::MalformedOutput(format!(
            "missing field '{}'",
            list_field
        ))),
    }
}
