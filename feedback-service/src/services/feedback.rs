//! Feedback phase of a session: generation, refinement and archival.

use crate::models::{FeedbackRecord, Phase, Session, VersionKind};
use crate::services::conversation::replay_history;
use crate::services::error::FeedbackError;
use crate::services::gateway::{ModelGateway, PromptContext};
use crate::services::locks::SessionLocks;
use crate::services::metrics;
use crate::services::prompts;
use crate::services::providers::ChatMessage;
use crate::services::store::SessionStore;
use std::sync::Arc;

pub struct FeedbackManager {
    store: Arc<dyn SessionStore>,
    gateway: Arc<ModelGateway>,
    locks: Arc<SessionLocks>,
    system_prompt: Arc<str>,
}

impl FeedbackManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<ModelGateway>,
        locks: Arc<SessionLocks>,
        system_prompt: Arc<str>,
    ) -> Self {
        Self {
            store,
            gateway,
            locks,
            system_prompt,
        }
    }

    /// Produce the first feedback version and move the session to
    /// `FeedbackReady`. Allowed at the turn limit.
    ///
    /// The record is written before the session. If the session write fails
    /// the session stays in `Gathering`, the record is not served, and the next
    /// attempt overwrites it.
    #[tracing::instrument(skip(self))]
    pub async fn generate_feedback(&self, session_id: &str) -> Result<FeedbackRecord, FeedbackError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_session(session_id).await?;
        require_phase(&session, Phase::Gathering, "generate_feedback")?;

        let mut messages = replay_history(&session);
        messages.push(ChatMessage::user(prompts::FEEDBACK_INSTRUCTION));
        let context = PromptContext {
            system_instruction: self.system_prompt.to_string(),
            messages,
        };

        let completion = self.gateway.complete(&context).await?;
        let record = FeedbackRecord::new_initial(&session, completion.text);

        self.store.save_feedback(&record).await?;
        session.advance_to(Phase::FeedbackReady)?;
        self.store.save_session(&session).await?;

        metrics::record_feedback_version(VersionKind::Initial.as_str());
        tracing::info!(
            session_id,
            turn_count = session.turn_count,
            latency_ms = completion.latency_ms,
            "Feedback generated"
        );
        Ok(record)
    }

    /// Regenerate the feedback with the preceptor's change applied and append
    /// it as a new version.
    #[tracing::instrument(skip(self, request_text))]
    pub async fn refine_feedback(
        &self,
        session_id: &str,
        request_text: &str,
    ) -> Result<FeedbackRecord, FeedbackError> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        require_phase(&session, Phase::FeedbackReady, "refine_feedback")?;

        let request_text = request_text.trim();
        if request_text.is_empty() {
            return Err(FeedbackError::Validation(
                "Refinement request must not be empty".to_string(),
            ));
        }

        let mut record = self.load_record(session_id).await?;
        let previous = record
            .current()
            .map(|v| v.content.clone())
            .ok_or_else(|| FeedbackError::NotFound(session_id.to_string()))?;

        let mut messages = replay_history(&session);
        messages.push(ChatMessage::user(prompts::FEEDBACK_INSTRUCTION));
        messages.push(ChatMessage::assistant(previous));
        messages.push(ChatMessage::user(prompts::refinement_prompt(request_text)));
        let context = PromptContext {
            system_instruction: self.system_prompt.to_string(),
            messages,
        };

        let completion = self.gateway.complete(&context).await?;
        let version_index = record
            .push_refinement(request_text.to_string(), completion.text)
            .version_index;
        self.store.save_feedback(&record).await?;

        metrics::record_feedback_version(VersionKind::Refinement.as_str());
        tracing::info!(
            session_id,
            version_index,
            latency_ms = completion.latency_ms,
            "Feedback refined"
        );
        Ok(record)
    }

    /// Archive the session. Nothing on it can change afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn finish(&self, session_id: &str) -> Result<Session, FeedbackError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_session(session_id).await?;
        require_phase(&session, Phase::FeedbackReady, "finish")?;

        session.advance_to(Phase::Archived)?;
        self.store.save_session(&session).await?;

        metrics::record_session_archived();
        tracing::info!(session_id, "Conversation archived");
        Ok(session)
    }

    /// Current feedback record. A record left behind by a generation whose
    /// session write failed is reported as missing.
    pub async fn get_feedback(&self, session_id: &str) -> Result<FeedbackRecord, FeedbackError> {
        let session = self.load_session(session_id).await?;
        if session.phase == Phase::Gathering {
            return Err(FeedbackError::NotFound(format!("feedback for {}", session_id)));
        }
        self.load_record(session_id).await
    }

    async fn load_session(&self, session_id: &str) -> Result<Session, FeedbackError> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(session_id.to_string()))
    }

    async fn load_record(&self, session_id: &str) -> Result<FeedbackRecord, FeedbackError> {
        self.store
            .load_feedback(session_id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(format!("feedback for {}", session_id)))
    }
}

fn require_phase(
    session: &Session,
    expected: Phase,
    operation: &'static str,
) -> Result<(), FeedbackError> {
    if session.phase == expected {
        Ok(())
    } else {
        Err(FeedbackError::State {
            operation,
            phase: session.phase,
        })
    }
}
