//! Fixed prompt text sent to the model.

use service_core::error::AppError;
use std::path::Path;

/// Interviewer persona used when no `SYSTEM_PROMPT_PATH` is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an assistant that helps clinical preceptors give feedback on medical students.

Start every conversation with a short transparency statement: you are an AI assistant, you will ask the preceptor a few questions about the student, and the preceptor stays responsible for the final feedback.

During the interview:
- Ask one focused question at a time about what the preceptor observed (patient care, clinical reasoning, communication, professionalism).
- Ask for concrete examples when an answer is vague.
- Keep replies brief and conversational.
- Do not write the formal summary or narrative until the preceptor asks for it.

When asked for feedback, produce two outputs with these exact headers:

## Clerkship Director Summary
**Context of evaluation**
**Strengths**
**Areas for Improvement**
**Suggested Focus for Development**

## Student-Facing Narrative
One constructive paragraph with context, strengths, one or two actionable suggestions and encouragement.
"#;

/// Asks for both structured outputs from the conversation so far.
pub const FEEDBACK_INSTRUCTION: &str = "Based on our conversation, please generate both outputs:\n\n\
1. **Clerkship Director Summary** (structured bullets with Context, Strengths, Areas for Improvement, Suggested Focus)\n\
2. **Student-Facing Narrative** (constructive paragraph with context, strengths, 1-2 actionable suggestions, encouragement)\n\n\
Please format clearly with headers.";

/// Opening instruction for a new conversation about `subject_name`.
pub fn bootstrap_instruction(subject_name: &str) -> String {
    format!(
        "The preceptor is providing feedback on student: {}. Please provide your transparency statement and first question to the preceptor, acknowledging the student's name.",
        subject_name
    )
}

/// Asks for a revised version of the last feedback with no preamble.
pub fn refinement_prompt(request_text: &str) -> String {
    format!(
        "Based on the feedback you just generated, apply this refinement and regenerate BOTH outputs:\n\n\
{}\n\n\
Provide the updated Clerkship Director Summary and Student-Facing Narrative with the same formatting as before. \
Output only the revised feedback, with no introduction or explanation.",
        request_text
    )
}

/// Read the system prompt from `path`, or fall back to the built-in one.
///
/// A configured path that cannot be read is a startup error.
pub fn load_system_prompt(path: Option<&str>) -> Result<String, AppError> {
    let Some(path) = path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };

    let text = std::fs::read_to_string(Path::new(path)).map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "System prompt not readable at {}: {}",
            path,
            e
        ))
    })?;

    if text.trim().is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "System prompt at {} is empty",
            path
        )));
    }
    Ok(text)
}
