use crate::models::{Phase, Session, SessionSummary};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[validate(length(max = 200, message = "Student name is too long"))]
    pub subject_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(max = 10000, message = "Message is too long"))]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsParams {
    pub phase: Option<Phase>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub limit: u32,
    pub offset: u64,
}

/// Full session plus the hints the UI needs to steer the interview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub max_turns: u32,
    pub should_conclude: bool,
}
