use crate::dtos::{FeedbackResponse, RefineFeedbackRequest};
use crate::handlers::conversations::authorize;
use crate::middleware::UserId;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

#[tracing::instrument(skip(state, user_id), fields(user_id = %user_id.0))]
pub async fn generate_feedback(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user_id, &session_id).await?;

    let record = state.feedback.generate_feedback(&session_id).await?;

    Ok((StatusCode::CREATED, Json(FeedbackResponse::from(record))))
}

pub async fn get_feedback(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user_id, &session_id).await?;

    let record = state.feedback.get_feedback(&session_id).await?;

    Ok(Json(FeedbackResponse::from(record)))
}

#[tracing::instrument(skip(state, user_id, request), fields(user_id = %user_id.0))]
pub async fn refine_feedback(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
    Json(request): Json<RefineFeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    authorize(&state, &user_id, &session_id).await?;

    let record = state
        .feedback
        .refine_feedback(&session_id, &request.text)
        .await?;

    Ok(Json(FeedbackResponse::from(record)))
}

/// Current feedback version as a plain-text attachment.
pub async fn download_feedback(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user_id, &session_id).await?;

    let record = state.feedback.get_feedback(&session_id).await?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        record.export_filename()
    ))
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid filename header: {}", e)))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        record.export_text(),
    ))
}

#[tracing::instrument(skip(state, user_id), fields(user_id = %user_id.0))]
pub async fn finish(
    State(state): State<AppState>,
    user_id: UserId,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user_id, &session_id).await?;

    state.feedback.finish(&session_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
