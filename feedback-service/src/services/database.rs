//! MongoDB-backed session store.
//!
//! Sessions and feedback records live in separate collections, one document
//! per session, upserted whole.

use crate::models::{FeedbackRecord, Session};
use crate::services::metrics;
use crate::services::store::{SessionQuery, SessionStore};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

const SESSIONS: &str = "sessions";
const FEEDBACK: &str = "feedback";

#[derive(Clone)]
pub struct FeedbackDb {
    client: MongoClient,
    db: Database,
}

fn db_error(operation: &str, e: mongodb::error::Error) -> AppError {
    tracing::error!(operation, error = %e, "MongoDB operation failed");
    metrics::record_store_error(operation);
    AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
}

impl FeedbackDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for feedback-service");

        let session_id_index = IndexModel::builder()
            .keys(doc! { "sessionId": 1 })
            .options(
                IndexOptions::builder()
                    .name("session_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.sessions()
            .create_index(session_id_index, None)
            .await
            .map_err(|e| db_error("create_index", e))?;

        // Dashboard listing: owner, optional phase, newest first
        let owner_index = IndexModel::builder()
            .keys(doc! { "userId": 1, "phase": 1, "updatedAtMs": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_phase_updated_idx".to_string())
                    .build(),
            )
            .build();
        self.sessions()
            .create_index(owner_index, None)
            .await
            .map_err(|e| db_error("create_index", e))?;

        let feedback_index = IndexModel::builder()
            .keys(doc! { "sessionId": 1 })
            .options(
                IndexOptions::builder()
                    .name("feedback_session_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.feedback()
            .create_index(feedback_index, None)
            .await
            .map_err(|e| db_error("create_index", e))?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn sessions(&self) -> Collection<Session> {
        self.db.collection(SESSIONS)
    }

    pub fn feedback(&self) -> Collection<FeedbackRecord> {
        self.db.collection(FEEDBACK)
    }

    fn upsert() -> ReplaceOptions {
        ReplaceOptions::builder().upsert(true).build()
    }
}

#[async_trait]
impl SessionStore for FeedbackDb {
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        self.sessions()
            .find_one(doc! { "sessionId": session_id }, None)
            .await
            .map_err(|e| db_error("load_session", e))
    }

    async fn save_session(&self, session: &Session) -> Result<(), AppError> {
        self.sessions()
            .replace_one(
                doc! { "sessionId": session.session_id.as_str() },
                session,
                Self::upsert(),
            )
            .await
            .map_err(|e| db_error("save_session", e))?;
        Ok(())
    }

    async fn load_feedback(&self, session_id: &str) -> Result<Option<FeedbackRecord>, AppError> {
        self.feedback()
            .find_one(doc! { "sessionId": session_id }, None)
            .await
            .map_err(|e| db_error("load_feedback", e))
    }

    async fn save_feedback(&self, record: &FeedbackRecord) -> Result<(), AppError> {
        self.feedback()
            .replace_one(
                doc! { "sessionId": record.session_id.as_str() },
                record,
                Self::upsert(),
            )
            .await
            .map_err(|e| db_error("save_feedback", e))?;
        Ok(())
    }

    async fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<Session>, AppError> {
        let mut filter = doc! { "userId": query.user_id.as_str() };
        if let Some(phase) = query.phase {
            filter.insert("phase", phase.as_str());
        }

        let options = FindOptions::builder()
            .sort(doc! { "updatedAtMs": -1 })
            .skip(query.offset)
            .limit(query.limit as i64)
            .build();

        let cursor = self
            .sessions()
            .find(filter, options)
            .await
            .map_err(|e| db_error("list_sessions", e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| db_error("list_sessions", e))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        Ok(())
    }
}
