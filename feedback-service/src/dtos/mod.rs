pub mod conversations;
pub mod feedback;

pub use conversations::{
    ListSessionsParams, SendMessageRequest, SessionListResponse, SessionResponse,
    StartSessionRequest,
};
pub use feedback::{FeedbackResponse, RefineFeedbackRequest};
