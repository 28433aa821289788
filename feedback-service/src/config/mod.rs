use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Section headers the feedback prompt asks for. Seeing them mid-interview means
/// the model jumped ahead.
pub const DEFAULT_FEEDBACK_MARKERS: &[&str] = &[
    "**Clerkship Director Summary",
    "**Student-Facing Narrative",
    "## Clerkship Director Summary",
    "## Student-Facing Narrative",
    "**Context of evaluation**",
    "**Strengths**",
    "**Areas for Improvement**",
    "**Suggested Focus for Development**",
];

/// Phrases in the preceptor's last message that suggest the interview is over.
pub const DEFAULT_DONE_PHRASES: &[&str] = &[
    "done",
    "that's all",
    "finished",
    "nothing else",
    "no more",
];

#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub models: ModelConfig,
    pub google: GoogleConfig,
    pub conversation: ConversationConfig,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Mock,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown GENAI_PROVIDER '{}', expected 'gemini' or 'mock'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    /// Chat model name, e.g. gemini-2.5-flash.
    pub model_name: String,
    /// Sampling temperature, 0.0 - 1.0.
    pub temperature: f32,
    pub max_output_tokens: i32,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub max_turns: u32,
    /// Ordered marker substrings for premature-feedback detection.
    pub feedback_markers: Vec<String>,
    /// How many distinct markers must appear before a reply counts as feedback.
    pub marker_threshold: usize,
    pub done_phrases: Vec<String>,
    pub system_prompt_path: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            feedback_markers: DEFAULT_FEEDBACK_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            marker_threshold: 1,
            done_phrases: DEFAULT_DONE_PHRASES.iter().map(|p| p.to_string()).collect(),
            system_prompt_path: None,
        }
    }
}

/// Backoff policy for rate-limited model calls.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_total_wait_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_total_wait_ms: 60_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.base_delay_ms),
            max_backoff: Duration::from_millis(self.max_total_wait_ms),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(self.jitter_ms),
            max_total_wait: Duration::from_millis(self.max_total_wait_ms),
        }
    }
}

impl FeedbackConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let provider: ProviderKind = get_env("GENAI_PROVIDER", Some("gemini"), is_prod)?.parse()?;
        let api_key = match provider {
            ProviderKind::Gemini => get_env("GOOGLE_API_KEY", None, is_prod)?,
            ProviderKind::Mock => env::var("GOOGLE_API_KEY").unwrap_or_default(),
        };

        let conversation_defaults = ConversationConfig::default();
        let retry_defaults = RetrySettings::default();

        let temperature: f32 = parse_env("GENAI_TEMPERATURE", "0.7", is_prod)?;
        if !(0.0..=1.0).contains(&temperature) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GENAI_TEMPERATURE must be between 0 and 1, got {}",
                temperature
            )));
        }

        let max_turns: u32 = parse_env("FEEDBACK_MAX_TURNS", "10", is_prod)?;
        if max_turns == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FEEDBACK_MAX_TURNS must be at least 1"
            )));
        }

        let feedback_markers = match env::var("FEEDBACK_MARKERS") {
            Ok(raw) => parse_list(&raw, '|'),
            Err(_) => conversation_defaults.feedback_markers,
        };
        if feedback_markers.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FEEDBACK_MARKERS must contain at least one marker"
            )));
        }

        Ok(FeedbackConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("feedback_db"), is_prod)?,
            },
            models: ModelConfig {
                provider,
                model_name: get_env("GENAI_MODEL_NAME", Some("gemini-2.5-flash"), is_prod)?,
                temperature,
                max_output_tokens: parse_env("GENAI_MAX_OUTPUT_TOKENS", "2048", is_prod)?,
                api_base: get_env("GENAI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
            },
            google: GoogleConfig {
                api_key: Secret::new(api_key),
            },
            conversation: ConversationConfig {
                max_turns,
                feedback_markers,
                marker_threshold: parse_env("FEEDBACK_MARKER_THRESHOLD", "1", is_prod)?,
                done_phrases: conversation_defaults.done_phrases,
                system_prompt_path: env::var("SYSTEM_PROMPT_PATH").ok(),
            },
            retry: RetrySettings {
                max_attempts: parse_env(
                    "GENAI_RETRY_MAX_ATTEMPTS",
                    &retry_defaults.max_attempts.to_string(),
                    is_prod,
                )?,
                base_delay_ms: parse_env(
                    "GENAI_RETRY_BASE_DELAY_MS",
                    &retry_defaults.base_delay_ms.to_string(),
                    is_prod,
                )?,
                max_total_wait_ms: parse_env(
                    "GENAI_RETRY_MAX_TOTAL_WAIT_MS",
                    &retry_defaults.max_total_wait_ms.to_string(),
                    is_prod,
                )?,
                jitter_ms: parse_env(
                    "GENAI_RETRY_JITTER_MS",
                    &retry_defaults.jitter_ms.to_string(),
                    is_prod,
                )?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Like `get_env`, but a value that does not parse is an error rather than a
/// silent fallback.
fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse::<T>().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

fn parse_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_drops_blank_entries() {
        let markers = parse_list("**Strengths** | | ## Summary|", '|');
        assert_eq!(markers, vec!["**Strengths**", "## Summary"]);
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" mock ".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn retry_defaults_match_rate_limit_policy() {
        let retry = RetrySettings::default().to_retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff_duration(0), Duration::from_secs(2));
        assert_eq!(retry.backoff_duration(3), Duration::from_secs(16));
        assert_eq!(retry.max_total_wait, Duration::from_secs(60));
    }

    #[test]
    fn parse_env_reads_environment_and_rejects_garbage() {
        assert_eq!(
            parse_env::<u32>("FEEDBACK_CONFIG_TEST_UNSET", "7", false).unwrap(),
            7
        );

        env::set_var("FEEDBACK_CONFIG_TEST_TURNS", " 12 ");
        assert_eq!(
            parse_env::<u32>("FEEDBACK_CONFIG_TEST_TURNS", "10", false).unwrap(),
            12
        );

        env::set_var("FEEDBACK_CONFIG_TEST_BAD", "many");
        assert!(parse_env::<u32>("FEEDBACK_CONFIG_TEST_BAD", "10", false).is_err());
        assert!(get_env("FEEDBACK_CONFIG_TEST_UNSET", Some("x"), true).is_err());
    }

    #[test]
    fn conversation_defaults() {
        let conversation = ConversationConfig::default();
        assert_eq!(conversation.max_turns, 10);
        assert_eq!(conversation.marker_threshold, 1);
        assert_eq!(conversation.feedback_markers.len(), DEFAULT_FEEDBACK_MARKERS.len());
    }
}
