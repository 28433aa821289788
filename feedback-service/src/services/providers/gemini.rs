//! Gemini chat provider.
//!
//! Sends the whole conversation to `generateContent` with the interviewer
//! persona as `systemInstruction`. Assistant turns go out with Gemini's
//! `model` role.

use super::{
    ChatMessage, ChatProvider, ChatRole, FinishReason, GenerationParams, ProviderError,
    ProviderResponse,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

pub struct GeminiChatProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiChatProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_request(
        system_instruction: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> GenerateContentRequest {
        let contents = messages
            .iter()
            .map(|m| Content {
                role: Some(
                    match m.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![ContentPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        let system_instruction = (!system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![ContentPart {
                text: Some(system_instruction.to_string()),
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: Some(GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            }),
        }
    }
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("STOP") | None => FinishReason::Complete,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
            FinishReason::ContentFilter
        }
        Some(_) => FinishReason::Error,
    }
}

fn into_provider_response(api_response: GenerateContentResponse) -> ProviderResponse {
    let candidate = api_response.candidates.first();

    // Replies can be split across several text parts
    let text = candidate.and_then(|c| c.content.as_ref()).map(|content| {
        content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>()
    });

    let finish_reason = match (candidate, &api_response.prompt_feedback) {
        (None, Some(feedback)) if feedback.block_reason.is_some() => FinishReason::ContentFilter,
        (None, _) => FinishReason::Error,
        (Some(c), _) => parse_finish_reason(c.finish_reason.as_deref()),
    };

    let usage = api_response.usage_metadata.unwrap_or_default();

    ProviderResponse {
        text,
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        finish_reason,
    }
}

#[async_trait]
impl ChatProvider for GeminiChatProvider {
    async fn invoke(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if messages.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }

        let request = Self::build_request(system_instruction, messages, params);
        let url = self.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .traced_post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let parsed = into_provider_response(api_response);
        if parsed.finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        Ok(parsed)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let url = format!("{}/models", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .traced_get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_maps_roles_and_system_instruction() {
        let messages = vec![
            ChatMessage::user("start"),
            ChatMessage::assistant("first question"),
            ChatMessage::user("answer"),
        ];
        let params = GenerationParams {
            temperature: Some(0.7),
            max_tokens: Some(2048),
        };

        let request = GeminiChatProvider::build_request("be kind", &messages, &params);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "answer");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be kind");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn response_concatenates_text_parts() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "doctor."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let response = into_provider_response(parsed);

        assert_eq!(response.text.as_deref(), Some("Hello, doctor."));
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 3);
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn blocked_prompt_is_content_filter() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let response = into_provider_response(parsed);

        assert!(response.text.is_none());
        assert_eq!(response.finish_reason, FinishReason::ContentFilter);
    }

    #[test]
    fn safety_stop_is_content_filter() {
        assert_eq!(
            parse_finish_reason(Some("SAFETY")),
            FinishReason::ContentFilter
        );
        assert_eq!(parse_finish_reason(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(parse_finish_reason(Some("OTHER")), FinishReason::Error);
    }
}
