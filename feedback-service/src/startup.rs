//! Application startup and lifecycle management.

use crate::config::{FeedbackConfig, ProviderKind};
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::metrics;
use crate::services::prompts;
use crate::services::providers::gemini::{GeminiChatProvider, GeminiConfig};
use crate::services::providers::mock::MockChatProvider;
use crate::services::providers::{ChatProvider, GenerationParams};
use crate::services::{
    ConversationController, FeedbackDb, FeedbackManager, MarkerDetector, ModelGateway,
    SessionLocks, SessionStore,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, security_headers_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Timeout for a single provider HTTP call.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Whole-request ceiling. Covers the 60s retry budget plus a slow final call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(150);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub gateway: Arc<ModelGateway>,
    pub conversations: Arc<ConversationController>,
    pub feedback: Arc<FeedbackManager>,
}

impl AppState {
    /// Wire the controllers over `store` and `provider`.
    pub fn new(
        config: &FeedbackConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn ChatProvider>,
        system_prompt: String,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::new(
            provider,
            GenerationParams {
                temperature: Some(config.models.temperature),
                max_tokens: Some(config.models.max_output_tokens),
            },
            config.retry.to_retry_config(),
        ));
        let detector = Arc::new(MarkerDetector::new(
            config.conversation.feedback_markers.clone(),
            config.conversation.marker_threshold,
        ));
        let locks = Arc::new(SessionLocks::new());
        let system_prompt: Arc<str> = Arc::from(system_prompt);

        let conversations = Arc::new(ConversationController::new(
            store.clone(),
            gateway.clone(),
            detector,
            locks.clone(),
            system_prompt.clone(),
            config.conversation.max_turns,
            config.conversation.done_phrases.clone(),
        ));
        let feedback = Arc::new(FeedbackManager::new(
            store.clone(),
            gateway.clone(),
            locks,
            system_prompt,
        ));

        Self {
            store,
            gateway,
            conversations,
            feedback,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/conversations",
            post(handlers::start_session).get(handlers::list_sessions),
        )
        .route("/conversations/:id", get(handlers::get_session))
        .route("/conversations/:id/messages", post(handlers::send_message))
        .route(
            "/conversations/:id/feedback",
            post(handlers::generate_feedback).get(handlers::get_feedback),
        )
        .route(
            "/conversations/:id/feedback/refine",
            post(handlers::refine_feedback),
        )
        .route(
            "/conversations/:id/feedback/download",
            get(handlers::download_feedback),
        )
        .route("/conversations/:id/finish", post(handlers::finish))
        .route_layer(from_fn(http_metrics_middleware))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the production application: MongoDB store and the configured
    /// provider.
    pub async fn build(config: FeedbackConfig) -> Result<Self, AppError> {
        let db = FeedbackDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;

        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let provider: Arc<dyn ChatProvider> = match config.models.provider {
            ProviderKind::Gemini => {
                let gemini = GeminiChatProvider::new(GeminiConfig {
                    api_key: config.google.api_key.clone(),
                    model: config.models.model_name.clone(),
                    api_base: config.models.api_base.clone(),
                    timeout: PROVIDER_TIMEOUT,
                })
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
                Arc::new(gemini)
            }
            ProviderKind::Mock => {
                tracing::warn!("Using mock chat provider; replies are canned");
                Arc::new(MockChatProvider::new())
            }
        };

        tracing::info!(
            provider = provider.name(),
            model = %config.models.model_name,
            "Initialized chat provider"
        );

        Self::build_with(config, Arc::new(db), provider).await
    }

    /// Build over caller-supplied store and provider. Tests use this with the
    /// in-memory store and a scripted provider.
    pub async fn build_with(
        config: FeedbackConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<Self, AppError> {
        metrics::init_metrics();

        let system_prompt =
            prompts::load_system_prompt(config.conversation.system_prompt_path.as_deref())?;
        let state = AppState::new(&config, store, provider, system_prompt);

        // Non-fatal: a bad key shows up here instead of on the first conversation
        if let Err(e) = state.gateway.health_check().await {
            tracing::warn!(
                provider = state.gateway.provider_name(),
                error = %e,
                "Chat provider health check failed"
            );
        }

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            max_turns = config.conversation.max_turns,
            "Feedback service listening"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
