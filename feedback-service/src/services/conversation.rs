//! Interview phase of a session: opening the conversation and exchanging
//! messages until feedback is requested.

use crate::models::{Phase, Role, Session, SessionSummary};
use crate::services::error::FeedbackError;
use crate::services::gateway::{ModelGateway, PromptContext};
use crate::services::locks::SessionLocks;
use crate::services::markers::FeedbackClassifier;
use crate::services::metrics;
use crate::services::prompts;
use crate::services::providers::ChatMessage;
use crate::services::store::{SessionQuery, SessionStore};
use serde::Serialize;
use std::sync::Arc;

pub const MAX_LIST_LIMIT: u32 = 100;

/// Reply to one preceptor message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOutcome {
    pub assistant_text: String,
    /// The reply looks like formal feedback. Advisory only; the reply is stored
    /// either way.
    pub is_premature_feedback: bool,
    pub turn_count: u32,
}

/// Rebuild what the model has seen so far: the opening instruction, then every
/// user/assistant turn in order. System turns are not replayed.
pub fn replay_history(session: &Session) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(session.history.len() + 1);
    messages.push(ChatMessage::user(prompts::bootstrap_instruction(
        &session.subject_name,
    )));
    for turn in &session.history {
        match turn.role {
            Role::User => messages.push(ChatMessage::user(turn.text.clone())),
            Role::Assistant => messages.push(ChatMessage::assistant(turn.text.clone())),
            Role::System => {}
        }
    }
    messages
}

pub struct ConversationController {
    store: Arc<dyn SessionStore>,
    gateway: Arc<ModelGateway>,
    classifier: Arc<dyn FeedbackClassifier>,
    locks: Arc<SessionLocks>,
    system_prompt: Arc<str>,
    max_turns: u32,
    done_phrases: Vec<String>,
}

impl ConversationController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<ModelGateway>,
        classifier: Arc<dyn FeedbackClassifier>,
        locks: Arc<SessionLocks>,
        system_prompt: Arc<str>,
        max_turns: u32,
        done_phrases: Vec<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            classifier,
            locks,
            system_prompt,
            max_turns,
            done_phrases,
        }
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Open a conversation about `subject_name` and get the model's opening
    /// message. Nothing is stored unless the model call succeeds.
    #[tracing::instrument(skip(self, subject_name))]
    pub async fn start_session(
        &self,
        user_id: &str,
        subject_name: &str,
    ) -> Result<Session, FeedbackError> {
        let subject_name = subject_name.trim();
        if subject_name.is_empty() {
            return Err(FeedbackError::Validation(
                "Student name must not be empty".to_string(),
            ));
        }

        let mut session = Session::new(user_id, subject_name);
        let context = PromptContext {
            system_instruction: self.system_prompt.to_string(),
            messages: replay_history(&session),
        };

        let completion = self.gateway.complete(&context).await?;
        session.append_opening(completion.text, completion.latency_ms);
        self.store.save_session(&session).await?;

        metrics::record_session_started();
        tracing::info!(session_id = %session.session_id, "Conversation started");
        Ok(session)
    }

    /// Forward a preceptor message and record the exchange.
    ///
    /// Checks run in order: phase, turn limit, then input.
    #[tracing::instrument(skip(self, user_text))]
    pub async fn send_message(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<MessageOutcome, FeedbackError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;

        if session.phase != Phase::Gathering {
            return Err(FeedbackError::State {
                operation: "send_message",
                phase: session.phase,
            });
        }
        if session.turn_count >= self.max_turns {
            return Err(FeedbackError::Boundary {
                max_turns: self.max_turns,
            });
        }
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(FeedbackError::Validation(
                "Message must not be empty".to_string(),
            ));
        }

        let mut messages = replay_history(&session);
        messages.push(ChatMessage::user(user_text));
        let context = PromptContext {
            system_instruction: self.system_prompt.to_string(),
            messages,
        };

        let completion = self.gateway.complete(&context).await?;
        let is_premature_feedback = self.classifier.classify(&completion.text);

        session.append_exchange(
            user_text.to_string(),
            completion.text.clone(),
            completion.latency_ms,
        );
        self.store.save_session(&session).await?;

        metrics::record_message(is_premature_feedback);
        if is_premature_feedback {
            tracing::warn!(
                session_id,
                turn_count = session.turn_count,
                "Model produced formal feedback during the interview"
            );
        }
        tracing::info!(
            session_id,
            turn_count = session.turn_count,
            latency_ms = completion.latency_ms,
            "Message exchanged"
        );

        Ok(MessageOutcome {
            assistant_text: completion.text,
            is_premature_feedback,
            turn_count: session.turn_count,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session, FeedbackError> {
        self.load(session_id).await
    }

    /// Summaries of `user_id`'s sessions, newest first. `limit` is clamped to
    /// 1..=100.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        phase: Option<Phase>,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<SessionSummary>, FeedbackError> {
        let query = SessionQuery {
            user_id: user_id.to_string(),
            phase,
            limit: limit.clamp(1, MAX_LIST_LIMIT),
            offset,
        };
        let sessions = self.store.list_sessions(&query).await?;

        // Feedback is only visible once the session has left Gathering
        Ok(sessions
            .iter()
            .map(|s| s.summary(s.phase != Phase::Gathering))
            .collect())
    }

    /// Hint that the interview can move on to feedback.
    pub fn should_conclude(&self, session: &Session) -> bool {
        session.should_conclude(self.max_turns, &self.done_phrases)
    }

    async fn load(&self, session_id: &str) -> Result<Session, FeedbackError> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(session_id.to_string()))
    }
}
