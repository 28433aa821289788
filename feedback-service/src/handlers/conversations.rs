use crate::dtos::{
    ListSessionsParams, SendMessageRequest, SessionListResponse, SessionResponse,
    StartSessionRequest,
};
use crate::middleware::UserId;
use crate::models::Session;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

const DEFAULT_LIST_LIMIT: u32 = 20;

/// Load a session and check the caller owns it.
pub(crate) async fn authorize(
    state: &AppState,
    user_id: &UserId,
    session_id: &str,
) -> Result<Session, AppError> {
    let session = state.conversations.get_session(session_id).await?;
    if session.user_id != user_id.0 {
        tracing::warn!(
            session_id,
            user_id = %user_id.0,
            "Rejected access to another user's conversation"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Conversation belongs to another user"
        )));
    }
    Ok(session)
}

#[tracing::instrument(skip(state, user_id, request), fields(user_id = %user_id.0))]
pub async fn start_session(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let session = state
        .conversations
        .start_session(&user_id.0, &request.subject_name)
        .await?;

    let should_conclude = state.conversations.should_conclude(&session);
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session,
            max_turns: state.conversations.max_turns(),
            should_conclude,
        }),
    ))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    user_id: UserId,
    Query(params): Query<ListSessionsParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    let sessions = state
        .conversations
        .list_sessions(&user_id.0, params.phase, limit, offset)
        .await?;

    Ok(Json(SessionListResponse {
        sessions,
        limit,
        offset,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = authorize(&state, &user_id, &session_id).await?;
    let should_conclude = state.conversations.should_conclude(&session);

    Ok(Json(SessionResponse {
        session,
        max_turns: state.conversations.max_turns(),
        should_conclude,
    }))
}

#[tracing::instrument(skip(state, user_id, request), fields(user_id = %user_id.0))]
pub async fn send_message(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    authorize(&state, &user_id, &session_id).await?;

    let outcome = state
        .conversations
        .send_message(&session_id, &request.text)
        .await?;

    Ok(Json(outcome))
}
