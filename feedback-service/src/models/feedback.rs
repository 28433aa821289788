//! Versioned feedback generated from a session.

use super::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionKind {
    Initial,
    Refinement,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionKind::Initial => "INITIAL",
            VersionKind::Refinement => "REFINEMENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackVersion {
    pub version_index: u32,
    pub content: String,
    #[serde(rename = "createdAtMs", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub kind: VersionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_request_text: Option<String>,
}

/// Append-only list of feedback versions for one session.
///
/// `current_version_index` always points at the last version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub session_id: String,
    pub user_id: String,
    pub subject_name: String,
    pub versions: Vec<FeedbackVersion>,
    pub current_version_index: u32,
    #[serde(rename = "createdAtMs", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAtMs", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// A record holding the first generated version.
    pub fn new_initial(session: &Session, content: String) -> Self {
        let now = Utc::now();
        Self {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            subject_name: session.subject_name.clone(),
            versions: vec![FeedbackVersion {
                version_index: 0,
                content,
                created_at: now,
                kind: VersionKind::Initial,
                refinement_request_text: None,
            }],
            current_version_index: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_refinement(&mut self, request_text: String, content: String) -> &FeedbackVersion {
        let now = Utc::now();
        let version_index = self.versions.len() as u32;
        self.versions.push(FeedbackVersion {
            version_index,
            content,
            created_at: now,
            kind: VersionKind::Refinement,
            refinement_request_text: Some(request_text),
        });
        self.current_version_index = version_index;
        self.updated_at = now;
        &self.versions[self.versions.len() - 1]
    }

    pub fn current(&self) -> Option<&FeedbackVersion> {
        self.versions.last()
    }

    /// Suggested file name for the plain-text export. Only ASCII letters,
    /// digits, `-` and `.` survive from the subject name; the rest become `_`
    /// so the name is always a valid header value.
    pub fn export_filename(&self) -> String {
        let stamp = self
            .current()
            .map(|v| v.created_at)
            .unwrap_or(self.updated_at)
            .format("%Y%m%d_%H%M%S");
        let subject: String = self
            .subject_name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("feedback_{}_{}.txt", stamp, subject)
    }

    /// Plain-text rendering of the current version with a short header.
    pub fn export_text(&self) -> String {
        let (generated, content) = match self.current() {
            Some(v) => (v.created_at, v.content.as_str()),
            None => (self.updated_at, ""),
        };
        format!(
            "Feedback for {}\nGenerated: {}\nVersion: {}\n{}\n\n{}",
            self.subject_name,
            generated.format("%Y-%m-%d %H:%M:%S"),
            self.current_version_index + 1,
            "=".repeat(80),
            content
        )
    }
}
