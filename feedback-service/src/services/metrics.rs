//! Prometheus metrics for feedback-service.
//!
//! Globals are set once by [`init_metrics`]; the `record_*` helpers are no-ops
//! before that, so library code and unit tests never need a registry.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use std::sync::{Once, OnceLock};

static INIT: Once = Once::new();

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Model gateway metrics
pub static MODEL_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static MODEL_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static MODEL_RETRIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static MODEL_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Conversation lifecycle metrics
pub static SESSIONS_STARTED_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static MESSAGES_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static PREMATURE_FEEDBACK_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static FEEDBACK_VERSIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SESSIONS_ARCHIVED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

// Store metrics
pub static STORE_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C, name: &str) -> C {
    registry
        .register(Box::new(collector.clone()))
        .unwrap_or_else(|e| panic!("Failed to register {}: {}", name, e));
    collector
}

/// Initialize all metrics. Called once at startup; later calls are ignored.
pub fn init_metrics() {
    INIT.call_once(install);
}

fn install() {
    let registry = Registry::new();

    let http_requests = register(
        &registry,
        IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("Failed to create http_requests_total metric"),
        "http_requests_total",
    );

    let http_duration = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            // Model calls with retries can take most of a minute
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["method", "path"],
        )
        .expect("Failed to create http_request_duration_seconds metric"),
        "http_request_duration_seconds",
    );

    let model_calls = register(
        &registry,
        IntCounterVec::new(
            Opts::new("model_calls_total", "Model gateway calls by outcome"),
            &["provider", "outcome"],
        )
        .expect("Failed to create model_calls_total metric"),
        "model_calls_total",
    );

    let model_latency = register(
        &registry,
        HistogramVec::new(
            HistogramOpts::new(
                "model_latency_seconds",
                "Model gateway latency in seconds, retries included",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["provider"],
        )
        .expect("Failed to create model_latency_seconds metric"),
        "model_latency_seconds",
    );

    let model_retries = register(
        &registry,
        IntCounterVec::new(
            Opts::new("model_retries_total", "Rate-limited model calls that were retried"),
            &["provider"],
        )
        .expect("Failed to create model_retries_total metric"),
        "model_retries_total",
    );

    let model_tokens = register(
        &registry,
        IntCounterVec::new(
            Opts::new("model_tokens_total", "Total tokens processed"),
            &["provider", "type"], // type: input, output
        )
        .expect("Failed to create model_tokens_total metric"),
        "model_tokens_total",
    );

    let sessions_started = register(
        &registry,
        IntCounter::new("sessions_started_total", "Conversations started")
            .expect("Failed to create sessions_started_total metric"),
        "sessions_started_total",
    );

    let messages = register(
        &registry,
        IntCounter::new("messages_total", "Completed preceptor/model exchanges")
            .expect("Failed to create messages_total metric"),
        "messages_total",
    );

    let premature = register(
        &registry,
        IntCounter::new(
            "premature_feedback_total",
            "Interview replies flagged as containing formal feedback",
        )
        .expect("Failed to create premature_feedback_total metric"),
        "premature_feedback_total",
    );

    let feedback_versions = register(
        &registry,
        IntCounterVec::new(
            Opts::new("feedback_versions_total", "Feedback versions created"),
            &["kind"],
        )
        .expect("Failed to create feedback_versions_total metric"),
        "feedback_versions_total",
    );

    let archived = register(
        &registry,
        IntCounter::new("sessions_archived_total", "Conversations finished")
            .expect("Failed to create sessions_archived_total metric"),
        "sessions_archived_total",
    );

    let store_errors = register(
        &registry,
        IntCounterVec::new(
            Opts::new("store_errors_total", "Total session store errors"),
            &["operation"],
        )
        .expect("Failed to create store_errors_total metric"),
        "store_errors_total",
    );

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_duration);
    let _ = MODEL_CALLS_TOTAL.set(model_calls);
    let _ = MODEL_LATENCY_SECONDS.set(model_latency);
    let _ = MODEL_RETRIES_TOTAL.set(model_retries);
    let _ = MODEL_TOKENS_TOTAL.set(model_tokens);
    let _ = SESSIONS_STARTED_TOTAL.set(sessions_started);
    let _ = MESSAGES_TOTAL.set(messages);
    let _ = PREMATURE_FEEDBACK_TOTAL.set(premature);
    let _ = FEEDBACK_VERSIONS_TOTAL.set(feedback_versions);
    let _ = SESSIONS_ARCHIVED_TOTAL.set(archived);
    let _ = STORE_ERRORS_TOTAL.set(store_errors);

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Record a finished gateway call. `outcome` is `success` or a `ModelError` kind.
pub fn record_model_call(provider: &str, outcome: &str, duration_secs: f64) {
    if let Some(counter) = MODEL_CALLS_TOTAL.get() {
        counter.with_label_values(&[provider, outcome]).inc();
    }
    if let Some(histogram) = MODEL_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider])
            .observe(duration_secs);
    }
}

pub fn record_model_retry(provider: &str) {
    if let Some(counter) = MODEL_RETRIES_TOTAL.get() {
        counter.with_label_values(&[provider]).inc();
    }
}

pub fn record_tokens(provider: &str, input_tokens: i32, output_tokens: i32) {
    if let Some(counter) = MODEL_TOKENS_TOTAL.get() {
        counter
            .with_label_values(&[provider, "input"])
            .inc_by(input_tokens.max(0) as u64);
        counter
            .with_label_values(&[provider, "output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}

pub fn record_session_started() {
    if let Some(counter) = SESSIONS_STARTED_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_message(premature_feedback: bool) {
    if let Some(counter) = MESSAGES_TOTAL.get() {
        counter.inc();
    }
    if premature_feedback {
        if let Some(counter) = PREMATURE_FEEDBACK_TOTAL.get() {
            counter.inc();
        }
    }
}

pub fn record_feedback_version(kind: &str) {
    if let Some(counter) = FEEDBACK_VERSIONS_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

pub fn record_session_archived() {
    if let Some(counter) = SESSIONS_ARCHIVED_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_store_error(operation: &str) {
    if let Some(counter) = STORE_ERRORS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}
