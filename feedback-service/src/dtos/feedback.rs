use crate::models::FeedbackRecord;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RefineFeedbackRequest {
    #[validate(length(max = 1000, message = "Refinement request is too long"))]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    #[serde(flatten)]
    pub record: FeedbackRecord,
    pub current_content: String,
}

impl From<FeedbackRecord> for FeedbackResponse {
    fn from(record: FeedbackRecord) -> Self {
        let current_content = record
            .current()
            .map(|v| v.content.clone())
            .unwrap_or_default();
        Self {
            record,
            current_content,
        }
    }
}
