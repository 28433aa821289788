//! HTTP handlers for the feedback service.

pub mod conversations;
pub mod feedback;
pub mod health;
pub mod metrics;

pub use conversations::{get_session, list_sessions, send_message, start_session};
pub use feedback::{download_feedback, finish, generate_feedback, get_feedback, refine_feedback};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
