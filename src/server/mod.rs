//! HTTP surface: NDJSON chat and voice streams, session metrics.

pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, Instrument};

pub use error::AppError;

use crate::audio::{AzureSpeechSynthesizer, SpeechSynthesizer};
use crate::config::VaxConfig;
use crate::error::Result;
use crate::metrics::{MetricsService, PhoenixSpanSource, TracingSummary};
use crate::service::{ChatService, TurnRequest};
use crate::translator::ResponseMode;

pub const NDJSON: &str = "application/x-ndjson";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// None when speech is not configured; voice requests then fail with 503.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    /// None when tracing is not configured; metrics requests then fail with 503.
    pub metrics: Option<MetricsService>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
            speech: None,
            metrics: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build every collaborator from configuration. Speech acquires its first
    /// token here, so bad speech credentials fail startup.
    pub async fn from_config(config: &VaxConfig) -> Result<Self> {
        let mut state = Self::new(ChatService::from_config(config)?);
        if let Some(speech) = &config.speech {
            let synth = AzureSpeechSynthesizer::initialize(speech.clone()).await?;
            state = state.with_speech(Arc::new(synth));
        }
        if let Some(phoenix) = &config.phoenix {
            let source = PhoenixSpanSource::new(&phoenix.endpoint, &phoenix.api_key, &phoenix.project);
            state = state.with_metrics(MetricsService::new(Arc::new(source)));
        }
        Ok(state)
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricRequest {
    pub session_id: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/chat/stream", post(chat_stream))
        .route("/voice/stream", post(voice_stream))
        .route("/metrics", post(metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn start_server(config: &VaxConfig) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state);
    let addr: SocketAddr = config.bind;

    info!("vaxbot listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "detail": "Hello Agent!" }))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> std::result::Result<Response, AppError> {
    stream_turn(&state, request, ResponseMode::Chat).await
}

async fn voice_stream(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> std::result::Result<Response, AppError> {
    let speech = state
        .speech
        .clone()
        .ok_or_else(|| AppError::Unavailable("speech synthesis is not configured".into()))?;
    stream_turn(&state, request, ResponseMode::Voice(Some(speech))).await
}

/// Start the turn, then stream its chunks as NDJSON. A mid-stream failure
/// ends the body early; it is logged since the status line is already sent.
async fn stream_turn(
    state: &AppState,
    request: TurnRequest,
    mode: ResponseMode,
) -> std::result::Result<Response, AppError> {
    let session_id = request.session_id.clone();
    let span = tracing::info_span!("turn", session_id = %session_id);
    let chunks = state
        .chat
        .stream_turn(request, mode)
        .instrument(span)
        .await?;

    let body = chunks.map(move |chunk| {
        chunk.and_then(|c| c.to_ndjson()).map_err(|e| {
            error!(session_id = %session_id, error = %e, "response stream aborted");
            e
        })
    });
    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(body)).into_response())
}

async fn metrics(
    State(state): State<AppState>,
    Json(request): Json<MetricRequest>,
) -> std::result::Result<Json<TracingSummary>, AppError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("tracing is not configured".into()))?;
    metrics
        .tracing_info_by_session(&request.session_id)
        .await
        .map(Json)
        .map_err(|e| AppError::Internal(e.to_string()))
}
