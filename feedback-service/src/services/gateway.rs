//! Model gateway: one completion call with rate-limit retry and response
//! validation on top of a [`ChatProvider`].

use crate::services::metrics;
use crate::services::providers::{
    ChatMessage, ChatProvider, GenerationParams, ProviderError, ProviderResponse,
};
use service_core::retry::{RetryConfig, retry_async};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

/// Failures surfaced to the controllers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Still rate limited after the retry budget was spent.
    #[error("Model rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Model call failed: {0}")]
    Transport(String),
}

impl ModelError {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::RateLimited { .. } => "rate_limited",
            ModelError::EmptyResponse => "empty_response",
            ModelError::Transport(_) => "transport",
        }
    }
}

/// Everything the model sees for one call.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub system_instruction: String,
    /// Oldest first, ending with the message to answer.
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Wall time of the whole call, retries included.
    pub latency_ms: u64,
}

pub struct ModelGateway {
    provider: Arc<dyn ChatProvider>,
    params: GenerationParams,
    retry: RetryConfig,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn ChatProvider>, params: GenerationParams, retry: RetryConfig) -> Self {
        Self {
            provider,
            params,
            retry,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> Result<(), ProviderError> {
        self.provider.health_check().await
    }

    /// Run one completion. Only rate limiting is retried; an empty reply or any
    /// other provider failure is returned on the first occurrence.
    pub async fn complete(&self, context: &PromptContext) -> Result<Completion, ModelError> {
        let provider_name = self.provider.name();
        let started = Instant::now();
        let mut attempts = 0u32;

        let result = retry_async(
            &self.retry,
            "model_complete",
            |e: &ProviderError| matches!(e, ProviderError::RateLimited),
            || {
                attempts += 1;
                if attempts > 1 {
                    metrics::record_model_retry(provider_name);
                }
                self.provider
                    .invoke(&context.system_instruction, &context.messages, &self.params)
            },
        )
        .await;

        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_millis() as u64;

        let outcome = result
            .map_err(|e| match e {
                ProviderError::RateLimited => ModelError::RateLimited { attempts },
                ProviderError::ContentFiltered => ModelError::EmptyResponse,
                other => ModelError::Transport(other.to_string()),
            })
            .and_then(|response| extract_text(&response).map(|text| (text, response)));

        match outcome {
            Ok((text, response)) => {
                metrics::record_model_call(provider_name, "success", elapsed.as_secs_f64());
                metrics::record_tokens(provider_name, response.input_tokens, response.output_tokens);
                tracing::info!(
                    provider = provider_name,
                    attempts,
                    latency_ms,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Model call completed"
                );
                Ok(Completion { text, latency_ms })
            }
            Err(e) => {
                metrics::record_model_call(provider_name, e.kind(), elapsed.as_secs_f64());
                tracing::warn!(
                    provider = provider_name,
                    attempts,
                    latency_ms,
                    error = %e,
                    "Model call failed"
                );
                Err(e)
            }
        }
    }
}

fn extract_text(response: &ProviderResponse) -> Result<String, ModelError> {
    match response.text.as_deref() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ModelError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::{MockChatProvider, ScriptedReply};
    use std::time::Duration;

    fn gateway(provider: Arc<MockChatProvider>, retry: RetryConfig) -> ModelGateway {
        ModelGateway::new(provider, GenerationParams::default(), retry)
    }

    fn rate_limit_policy() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(2_000),
            max_backoff: Duration::from_millis(60_000),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(1_000),
            max_total_wait: Duration::from_millis(60_000),
        }
    }

    fn context() -> PromptContext {
        PromptContext {
            system_instruction: "interviewer".to_string(),
            messages: vec![ChatMessage::user("hello")],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_then_succeeds() {
        let provider = Arc::new(MockChatProvider::with_script([
            ScriptedReply::Error(ProviderError::RateLimited),
            ScriptedReply::Error(ProviderError::RateLimited),
            ScriptedReply::Error(ProviderError::RateLimited),
            ScriptedReply::Text("finally".to_string()),
        ]));
        let gateway = gateway(provider.clone(), rate_limit_policy());

        let started = Instant::now();
        let completion = gateway.complete(&context()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(completion.text, "finally");
        assert_eq!(provider.call_count().await, 4);
        // Three waits of 2s, 4s and 8s, each plus up to 1s jitter.
        assert!(elapsed >= Duration::from_secs(14), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(17), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_rate_limit_after_exhausting_attempts() {
        let provider = Arc::new(MockChatProvider::with_script(
            (0..6).map(|_| ScriptedReply::Error(ProviderError::RateLimited)),
        ));
        let gateway = gateway(provider.clone(), rate_limit_policy());

        let err = gateway.complete(&context()).await.unwrap_err();

        assert_eq!(err, ModelError::RateLimited { attempts: 5 });
        assert_eq!(provider.call_count().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn total_wait_budget_caps_retries() {
        let provider = Arc::new(MockChatProvider::with_script(
            (0..6).map(|_| ScriptedReply::Error(ProviderError::RateLimited)),
        ));
        let retry = RetryConfig {
            max_jitter: Duration::ZERO,
            max_total_wait: Duration::from_secs(10),
            ..rate_limit_policy()
        };
        let gateway = gateway(provider.clone(), retry);

        let err = gateway.complete(&context()).await.unwrap_err();

        // 2s + 4s fit in 10s, the next 8s does not
        assert_eq!(err, ModelError::RateLimited { attempts: 3 });
        assert_eq!(provider.call_count().await, 3);
    }

    #[tokio::test]
    async fn empty_text_is_not_success() {
        let provider = Arc::new(MockChatProvider::with_script([
            ScriptedReply::Empty,
            ScriptedReply::Text("   ".to_string()),
        ]));
        let gateway = gateway(provider.clone(), rate_limit_policy());

        assert_eq!(
            gateway.complete(&context()).await.unwrap_err(),
            ModelError::EmptyResponse
        );
        assert_eq!(
            gateway.complete(&context()).await.unwrap_err(),
            ModelError::EmptyResponse
        );
        assert_eq!(provider.call_count().await, 2);
    }

    #[tokio::test]
    async fn transport_and_filter_errors_are_not_retried() {
        let provider = Arc::new(MockChatProvider::with_script([
            ScriptedReply::Error(ProviderError::NetworkError("reset".to_string())),
            ScriptedReply::Error(ProviderError::ContentFiltered),
        ]));
        let gateway = gateway(provider.clone(), rate_limit_policy());

        let first = gateway.complete(&context()).await.unwrap_err();
        assert!(matches!(first, ModelError::Transport(msg) if msg.contains("reset")));
        assert_eq!(provider.call_count().await, 1);

        let second = gateway.complete(&context()).await.unwrap_err();
        assert_eq!(second, ModelError::EmptyResponse);
        assert_eq!(provider.call_count().await, 2);
    }

    #[tokio::test]
    async fn forwards_system_instruction_and_history() {
        let provider = Arc::new(MockChatProvider::new());
        let gateway = gateway(provider.clone(), RetryConfig::no_retry());

        let completion = gateway.complete(&context()).await.unwrap();

        assert_eq!(completion.text, "Mock response for: hello");
        let calls = provider.calls().await;
        assert_eq!(calls[0].system_instruction, "interviewer");
        assert_eq!(calls[0].messages, vec![ChatMessage::user("hello")]);
    }
}
