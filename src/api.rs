//! REST API server for the market analysis pipeline
//!
//! Exposes one pipeline run per request over HTTP.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, RunOutcome, RunRequest};
use crate::router::Route;

/// Answer returned when the query is not about investing.
pub const NOT_APPLICABLE_ANSWER: &str =
    "This request is not about investment advice or strategy, so no analysis was run.";

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
}

/// =============================
/// Helpers
/// =============================

/// The terminal narrative for the route taken.
pub fn answer(outcome: &RunOutcome) -> &str {
    match outcome.route {
        Route::Advice => &outcome.state.advice,
        Route::Strategy => &outcome.state.strategy,
        Route::NotApplicable => NOT_APPLICABLE_ANSWER,
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::Classification(_) | PipelineError::Generation { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<RunRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(query_chars = req.query.chars().count(), "Received analysis request");
    debug!(query = %req.query, "Analysis request query");

    match state.pipeline.run(req).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "run_id": outcome.run_id,
                "route": outcome.route,
                "applicable": outcome.is_applicable(),
                "answer": answer(&outcome),
                "symbols": outcome.state.symbols(),
                "market_trends": outcome.state.market_trends,
                "advice_forecast": outcome.state.advice_forecast,
                "trace": outcome.trace,
                "elapsed_ms": outcome.elapsed_ms,
            }))),
        ),
        Err(e) => {
            warn!(stage = %e.stage(), "Analysis failed: {}", e);
            (
                status_for(&e),
                Json(ApiResponse::error(format!("Analysis failed: {}", e))),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    let state = ApiState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<Pipeline>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{ScriptedModel, StaticClassifier, StubFundamentals, StubNewsProvider};
    use crate::collaborators::{Collaborators, GenerationTask};
    use crate::config::PipelineSettings;
    use crate::models::Usage;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router(usage: Usage, model: ScriptedModel) -> Router {
        let collaborators = Collaborators::new(
            Arc::new(StaticClassifier::new(usage, ["AAPL"])),
            Arc::new(StubNewsProvider::new(1)),
            Arc::new(StubFundamentals::new()),
            Arc::new(model),
        );
        let pipeline = Pipeline::new(collaborators, PipelineSettings::default()).unwrap();
        create_router(Arc::new(pipeline))
    }

    fn analyze_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read(response: axum::response::Response) -> ApiResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(Usage::Advice, ScriptedModel::new("X"));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_returns_advice() {
        let app = router(Usage::Advice, ScriptedModel::new("Hold AAPL"));
        let response = app
            .oneshot(analyze_request(serde_json::json!({"query": "Should I buy Apple?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read(response).await;
        assert!(body.success);
        let data = body.data.unwrap();
        assert_eq!(data["route"], "advice");
        assert_eq!(data["answer"], "Hold AAPL");
        assert_eq!(data["symbols"], serde_json::json!(["AAPL"]));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_query_text_stays_out_of_info_logs() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = router(Usage::Advice, ScriptedModel::new("X"));
        let response = app
            .oneshot(analyze_request(
                serde_json::json!({"query": "I earn 9000 a month, should I buy AAPL?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).to_string();
        assert!(output.contains("Received analysis request"));
        assert!(output.contains("query_chars=39"));
        assert!(!output.contains("I earn 9000"));
    }

    #[tokio::test]
    async fn test_analyze_not_applicable() {
        let app = router(Usage::Invalid, ScriptedModel::new("X"));
        let response = app
            .oneshot(analyze_request(serde_json::json!({"query": "Tell me a joke"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let data = read(response).await.data.unwrap();
        assert_eq!(data["applicable"], false);
        assert_eq!(data["answer"], NOT_APPLICABLE_ANSWER);
    }

    #[tokio::test]
    async fn test_empty_symbols_is_bad_request() {
        let app = router(Usage::Advice, ScriptedModel::new("X"));
        let response = app
            .oneshot(analyze_request(serde_json::json!({"query": "Buy?", "symbols": []})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read(response).await;
        assert!(!body.success);
        assert!(body.error.unwrap().contains("Validation"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_bad_gateway() {
        let app = router(Usage::Advice, ScriptedModel::new("X").fail(GenerationTask::Advice));
        let response = app
            .oneshot(analyze_request(serde_json::json!({"query": "Buy AAPL?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
