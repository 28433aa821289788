#![allow(dead_code)]

use feedback_service::config::{
    ConversationConfig, FeedbackConfig, GoogleConfig, ModelConfig, MongoConfig, ProviderKind,
    RetrySettings, DEFAULT_GEMINI_API_BASE,
};
use feedback_service::services::providers::mock::MockChatProvider;
use feedback_service::services::InMemoryStore;
use feedback_service::startup::{AppState, Application};
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::Value;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use std::time::Duration;

pub const USER: &str = "preceptor-1";
pub const OTHER_USER: &str = "preceptor-2";

pub fn test_config() -> FeedbackConfig {
    FeedbackConfig {
        common: CoreConfig {
            port: 0,
            log_level: "warn".to_string(),
            otlp_endpoint: None,
        },
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: format!("feedback_test_{}", uuid::Uuid::new_v4()),
        },
        models: ModelConfig {
            provider: ProviderKind::Mock,
            model_name: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        },
        google: GoogleConfig {
            api_key: Secret::new("test-api-key".to_string()),
        },
        conversation: ConversationConfig::default(),
        retry: RetrySettings {
            max_attempts: 5,
            base_delay_ms: 10,
            max_total_wait_ms: 200,
            jitter_ms: 0,
        },
    }
}

/// Controllers wired over the in-memory store, without an HTTP listener.
pub struct Harness {
    pub state: AppState,
    pub provider: Arc<MockChatProvider>,
    pub store: Arc<InMemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_max_turns(max_turns: u32) -> Self {
        let mut config = test_config();
        config.conversation.max_turns = max_turns;
        Self::with_config(config)
    }

    pub fn with_config(config: FeedbackConfig) -> Self {
        let provider = Arc::new(MockChatProvider::new());
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(
            &config,
            store.clone(),
            provider.clone(),
            feedback_service::services::prompts::DEFAULT_SYSTEM_PROMPT.to_string(),
        );
        Self {
            state,
            provider,
            store,
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: Client,
    pub provider: Arc<MockChatProvider>,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: FeedbackConfig) -> Self {
        let provider = Arc::new(MockChatProvider::new());
        let store = Arc::new(InMemoryStore::new());

        let app = Application::build_with(config, store.clone(), provider.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let mut ready = false;
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(ready, "Server failed to become ready");

        Self {
            address,
            port,
            client,
            provider,
            store,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str, user: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("X-User-ID", user)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, user: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .header("X-User-ID", user)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Start a conversation as `user` and return its id.
    pub async fn start(&self, user: &str, subject_name: &str) -> String {
        let response = self
            .post(
                "/conversations",
                user,
                serde_json::json!({ "subjectName": subject_name }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("Invalid JSON");
        body["sessionId"]
            .as_str()
            .expect("sessionId missing")
            .to_string()
    }
}
