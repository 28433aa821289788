//! Domain models for the feedback service.

pub mod feedback;
pub mod session;

pub use feedback::{FeedbackRecord, FeedbackVersion, VersionKind};
pub use session::{Phase, Role, Session, SessionSummary, Turn};
