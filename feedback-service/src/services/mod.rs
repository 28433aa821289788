pub mod conversation;
pub mod database;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod locks;
pub mod markers;
pub mod metrics;
pub mod prompts;
pub mod providers;
pub mod store;

pub use conversation::{ConversationController, MessageOutcome};
pub use database::FeedbackDb;
pub use error::FeedbackError;
pub use feedback::FeedbackManager;
pub use gateway::{Completion, ModelError, ModelGateway, PromptContext};
pub use locks::SessionLocks;
pub use markers::{FeedbackClassifier, MarkerDetector};
pub use store::{InMemoryStore, SessionQuery, SessionStore};
