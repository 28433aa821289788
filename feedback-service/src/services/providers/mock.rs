//! Scripted provider for local runs and tests.

use super::{
    ChatMessage, ChatProvider, FinishReason, GenerationParams, ProviderError, ProviderResponse,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Calls kept for inspection. Older ones are dropped so a long-running mock
/// deployment stays bounded.
pub const MAX_RECORDED_CALLS: usize = 256;

/// One canned outcome for a provider call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// A candidate with no text.
    Empty,
    Error(ProviderError),
}

/// A call as the provider saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_instruction: String,
    pub messages: Vec<ChatMessage>,
}

/// Replays queued replies in order, then echoes the last user message.
#[derive(Default)]
pub struct MockChatProvider {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<VecDeque<RecordedCall>>,
    call_count: AtomicUsize,
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn push_reply(&self, reply: ScriptedReply) {
        self.script.lock().await.push_back(reply);
    }

    pub async fn push_text(&self, text: impl Into<String>) {
        self.push_reply(ScriptedReply::Text(text.into())).await;
    }

    /// The most recent calls, oldest first, at most [`MAX_RECORDED_CALLS`].
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.iter().cloned().collect()
    }

    /// Every call since construction, including ones no longer recorded.
    pub async fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn invoke(
        &self,
        system_instruction: &str,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        {
            let mut calls = self.calls.lock().await;
            if calls.len() >= MAX_RECORDED_CALLS {
                calls.pop_front();
            }
            calls.push_back(RecordedCall {
                system_instruction: system_instruction.to_string(),
                messages: messages.to_vec(),
            });
        }

        let reply = self.script.lock().await.pop_front();
        let text = match reply {
            Some(ScriptedReply::Error(e)) => return Err(e),
            Some(ScriptedReply::Empty) => None,
            Some(ScriptedReply::Text(text)) => Some(text),
            None => {
                let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
                Some(format!("Mock response for: {}", last))
            }
        };

        let input_tokens = messages.iter().map(|m| m.content.len() as i32 / 4).sum();
        let output_tokens = text.as_ref().map(|t| t.len() as i32 / 4).unwrap_or(0);

        Ok(ProviderResponse {
            text,
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::Complete,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_echoes() {
        let provider = MockChatProvider::with_script([
            ScriptedReply::Text("scripted".to_string()),
            ScriptedReply::Error(ProviderError::RateLimited),
        ]);
        let params = GenerationParams::default();
        let messages = [ChatMessage::user("hello")];

        let first = provider.invoke("sys", &messages, &params).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("scripted"));

        let second = provider.invoke("sys", &messages, &params).await;
        assert_eq!(second.unwrap_err(), ProviderError::RateLimited);

        let third = provider.invoke("sys", &messages, &params).await.unwrap();
        assert_eq!(third.text.as_deref(), Some("Mock response for: hello"));

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].system_instruction, "sys");
    }

    #[tokio::test]
    async fn recorder_keeps_only_recent_calls() {
        let provider = MockChatProvider::new();
        let params = GenerationParams::default();

        for i in 0..MAX_RECORDED_CALLS + 10 {
            let messages = [ChatMessage::user(format!("message {}", i))];
            provider.invoke("sys", &messages, &params).await.unwrap();
        }

        let calls = provider.calls().await;
        assert_eq!(calls.len(), MAX_RECORDED_CALLS);
        assert_eq!(calls[0].messages[0].content, "message 10");
        assert_eq!(provider.call_count().await, MAX_RECORDED_CALLS + 10);
    }
}
