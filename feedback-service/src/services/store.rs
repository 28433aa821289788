//! Persistence boundary for sessions and feedback records.

use crate::models::{FeedbackRecord, Phase, Session};
use async_trait::async_trait;
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Filter and page for session listings.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    pub user_id: String,
    pub phase: Option<Phase>,
    pub limit: u32,
    pub offset: u64,
}

/// Single-document reads and writes keyed by session id.
///
/// Writes are whole-document upserts; no multi-document transactions are
/// assumed. Callers serialize writers per session.
///
/// A feedback record is written before its session moves to `FeedbackReady`,
/// so a failed session write can leave a record next to a `Gathering`
/// session. Readers must treat a record as absent unless the session has left
/// `Gathering`; the next generation overwrites it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError>;

    async fn save_session(&self, session: &Session) -> Result<(), AppError>;

    async fn load_feedback(&self, session_id: &str) -> Result<Option<FeedbackRecord>, AppError>;

    async fn save_feedback(&self, record: &FeedbackRecord) -> Result<(), AppError>;

    /// Sessions owned by `query.user_id`, most recently updated first.
    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Process-local store. The service always runs on MongoDB; this backs the
/// controller and HTTP tests, with switches to make writes fail.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: DashMap<String, Session>,
    feedback: DashMap<String, FeedbackRecord>,
    fail_writes: AtomicBool,
    fail_session_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only session saves fail until reset; feedback saves still land.
    pub fn set_fail_session_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "in-memory store rejected write"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.get(session_id).map(|s| s.value().clone()))
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        self.check_writable()?;
        if self.fail_session_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "in-memory store rejected session write"
            )));
        }
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn load_feedback(&self, session_id: &str) -> Result<Option<FeedbackRecord>, AppError> {
        Ok(self.feedback.get(session_id).map(|r| r.value().clone()))
    }

    async fn save_feedback(&self, record: &FeedbackRecord) -> Result<(), AppError> {
        self.check_writable()?;
        self.feedback
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, AppError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == query.user_id)
            .filter(|s| query.phase.map_or(true, |p| s.phase == p))
            .map(|s| s.value().clone())
            .collect();

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(sessions
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn session(user: &str, name: &str, age_secs: i64) -> Session {
        let mut s = Session::new(user, name);
        s.updated_at = Utc::now() - Duration::seconds(age_secs);
        s
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryStore::new();
        let s = session("u1", "Jane", 0);

        store.save_session(&s).await.unwrap();
        let loaded = store.load_session(&s.session_id).await.unwrap().unwrap();

        assert_eq!(loaded.subject_name, "Jane");
        assert!(store.load_session("missing").await.unwrap().is_none());
        assert!(store.load_feedback(&s.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_phase_newest_first() {
        let store = InMemoryStore::new();
        let old = session("u1", "Old", 60);
        let new = session("u1", "New", 0);
        let mut done = session("u1", "Done", 30);
        done.phase = Phase::FeedbackReady;
        let other = session("u2", "Other", 0);
        for s in [&old, &new, &done, &other] {
            store.save_session(s).await.unwrap();
        }

        let all = store
            .list_sessions(&SessionQuery {
                user_id: "u1".to_string(),
                phase: None,
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.subject_name.as_str()).collect();
        assert_eq!(names, vec!["New", "Done", "Old"]);

        let gathering = store
            .list_sessions(&SessionQuery {
                user_id: "u1".to_string(),
                phase: Some(Phase::Gathering),
                limit: 1,
                offset: 1,
            })
            .await
            .unwrap();
        assert_eq!(gathering.len(), 1);
        assert_eq!(gathering[0].subject_name, "Old");
    }

    #[tokio::test]
    async fn failed_writes_leave_previous_state() {
        let store = InMemoryStore::new();
        let mut s = session("u1", "Jane", 0);
        store.save_session(&s).await.unwrap();

        store.set_fail_writes(true);
        s.turn_count = 3;
        assert!(store.save_session(&s).await.is_err());

        let loaded = store.load_session(&s.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.turn_count, 0);
    }

    #[tokio::test]
    async fn session_only_failure_still_saves_feedback() {
        let store = InMemoryStore::new();
        let s = session("u1", "Jane", 0);
        store.save_session(&s).await.unwrap();

        store.set_fail_session_writes(true);
        let record = FeedbackRecord::new_initial(&s, "draft".to_string());
        store.save_feedback(&record).await.unwrap();
        assert!(store.save_session(&s).await.is_err());

        store.set_fail_session_writes(false);
        store.save_session(&s).await.unwrap();
        assert!(store.load_feedback(&s.session_id).await.unwrap().is_some());
    }
}
