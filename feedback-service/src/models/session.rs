//! Conversation session between a preceptor and the interviewer model.

use crate::services::error::FeedbackError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of `lastMessagePreview` in session summaries, in characters.
pub const PREVIEW_CHARS: usize = 100;

/// Coarse lifecycle stage of a session.
///
/// Only `Gathering -> FeedbackReady -> Archived` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Gathering,
    FeedbackReady,
    Archived,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Gathering => "GATHERING",
            Phase::FeedbackReady => "FEEDBACK_READY",
            Phase::Archived => "ARCHIVED",
        }
    }

    /// The single phase this one may advance to, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Gathering => Some(Phase::FeedbackReady),
            Phase::FeedbackReady => Some(Phase::Archived),
            Phase::Archived => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry in a session's history. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// 0 for the opening assistant message, then the exchange number.
    pub turn_index: u32,
    #[serde(rename = "timestampMs", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Model latency for assistant turns, 0 otherwise.
    pub latency_ms: u64,
}

/// A preceptor-student conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,

    /// Owner, as supplied by the identity boundary.
    pub user_id: String,

    /// Student the feedback is about.
    pub subject_name: String,

    pub phase: Phase,

    /// Completed user/assistant exchanges. The opening message does not count.
    pub turn_count: u32,

    pub history: Vec<Turn>,

    #[serde(rename = "createdAtMs", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAtMs", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    #[serde(
        rename = "archivedAtMs",
        with = "chrono::serde::ts_milliseconds_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A fresh session in `Gathering` with an empty history.
    pub fn new(user_id: impl Into<String>, subject_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            subject_name: subject_name.into(),
            phase: Phase::Gathering,
            turn_count: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    /// Record the model's opening message. Does not consume a turn.
    pub fn append_opening(&mut self, text: String, latency_ms: u64) {
        let now = Utc::now();
        self.history.push(Turn {
            role: Role::Assistant,
            text,
            turn_index: 0,
            timestamp: now,
            latency_ms,
        });
        self.updated_at = now;
    }

    /// Record a completed exchange and count it against the turn budget.
    pub fn append_exchange(&mut self, user_text: String, assistant_text: String, latency_ms: u64) {
        let now = Utc::now();
        let turn_index = self.turn_count + 1;
        self.history.push(Turn {
            role: Role::User,
            text: user_text,
            turn_index,
            timestamp: now,
            latency_ms: 0,
        });
        self.history.push(Turn {
            role: Role::Assistant,
            text: assistant_text,
            turn_index,
            timestamp: now,
            latency_ms,
        });
        self.turn_count = turn_index;
        self.updated_at = now;
    }

    /// Move to the next phase. Any other target is a state error and leaves
    /// the session untouched.
    pub fn advance_to(&mut self, to: Phase) -> Result<(), FeedbackError> {
        if self.phase.next() != Some(to) {
            return Err(FeedbackError::State {
                operation: match to {
                    Phase::Gathering => "reopen",
                    Phase::FeedbackReady => "generate_feedback",
                    Phase::Archived => "finish",
                },
                phase: self.phase,
            });
        }
        let now = Utc::now();
        self.phase = to;
        self.updated_at = now;
        if to == Phase::Archived {
            self.archived_at = Some(now);
        }
        Ok(())
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    /// Whether the interview looks finished: the turn budget is used up or the
    /// preceptor's last message contains one of `done_phrases`.
    pub fn should_conclude(&self, max_turns: u32, done_phrases: &[String]) -> bool {
        if self.turn_count >= max_turns {
            return true;
        }
        match self.last_user_text() {
            Some(text) => {
                let lowered = text.to_lowercase();
                done_phrases
                    .iter()
                    .any(|phrase| lowered.contains(&phrase.to_lowercase()))
            }
            None => false,
        }
    }

    pub fn summary(&self, has_feedback: bool) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            subject_name: self.subject_name.clone(),
            phase: self.phase,
            turn_count: self.turn_count,
            last_message_preview: self
                .history
                .last()
                .map(|t| preview(&t.text, PREVIEW_CHARS))
                .unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            has_feedback,
        }
    }
}

/// List view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub subject_name: String,
    pub phase: Phase,
    pub turn_count: u32,
    pub last_message_preview: String,
    #[serde(rename = "createdAtMs", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAtMs", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub has_feedback: bool,
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done_phrases() -> Vec<String> {
        vec!["done".to_string(), "that's all".to_string()]
    }

    #[test]
    fn serializes_with_stored_field_names() {
        let mut session = Session::new("user-1", "Jane Doe");
        session.append_opening("Hello".to_string(), 12);

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["subjectName"], "Jane Doe");
        assert_eq!(value["phase"], "GATHERING");
        assert_eq!(value["turnCount"], 0);
        assert_eq!(value["history"][0]["role"], "ASSISTANT");
        assert_eq!(value["history"][0]["turnIndex"], 0);
        assert_eq!(value["history"][0]["latencyMs"], 12);
        assert!(value["history"][0]["timestampMs"].is_i64());
        assert!(value["createdAtMs"].is_i64());
        assert!(value.get("archivedAtMs").is_none());

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back.history, session.history);
    }

    #[test]
    fn exchange_shares_turn_index_and_counts_once() {
        let mut session = Session::new("user-1", "Jane Doe");
        session.append_opening("Hello".to_string(), 0);
        session.append_exchange("Saw a patient".to_string(), "Tell me more".to_string(), 5);

        assert_eq!(session.turn_count, 1);
        assert_eq!(session.history.len(), 3);
        assert_eq!(session.history[1].role, Role::User);
        assert_eq!(session.history[1].turn_index, 1);
        assert_eq!(session.history[2].turn_index, 1);
        assert_eq!(session.history[2].latency_ms, 5);
    }

    #[test]
    fn phase_only_moves_forward_one_step() {
        let mut session = Session::new("user-1", "Jane Doe");
        let err = session.advance_to(Phase::Archived).unwrap_err();
        assert!(matches!(
            err,
            FeedbackError::State {
                operation: "finish",
                phase: Phase::Gathering
            }
        ));
        assert_eq!(session.phase, Phase::Gathering);
        assert!(session.archived_at.is_none());

        session.advance_to(Phase::FeedbackReady).unwrap();
        assert!(session.advance_to(Phase::FeedbackReady).is_err());
        assert_eq!(session.phase, Phase::FeedbackReady);
        session.advance_to(Phase::Archived).unwrap();
        assert!(session.archived_at.is_some());

        let archived_at = session.archived_at;
        assert!(session.advance_to(Phase::Gathering).is_err());
        assert_eq!(session.phase, Phase::Archived);
        assert_eq!(session.archived_at, archived_at);
    }

    #[test]
    fn should_conclude_on_turn_limit_or_done_phrase() {
        let mut session = Session::new("user-1", "Jane Doe");
        assert!(!session.should_conclude(10, &done_phrases()));

        session.append_exchange("She presented well".to_string(), "ok".to_string(), 0);
        assert!(!session.should_conclude(10, &done_phrases()));
        assert!(session.should_conclude(1, &done_phrases()));

        session.append_exchange("I think That's All".to_string(), "ok".to_string(), 0);
        assert!(session.should_conclude(10, &done_phrases()));
    }

    #[test]
    fn summary_truncates_preview() {
        let mut session = Session::new("user-1", "Jane Doe");
        session.append_opening("é".repeat(150), 0);

        let summary = session.summary(false);
        assert_eq!(summary.last_message_preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(summary.last_message_preview.ends_with("..."));
        assert!(!summary.has_feedback);
    }
}
