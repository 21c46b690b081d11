//! Axum-based HTTP server for the gateway.

use axum::{
    extract::{DefaultBodyLimit, Json, MatchedPath, Multipart, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use metrics_exporter_prometheus::PrometheusHandle;
use playgate_core::config::ServerConfig;
use playgate_core::{
    BridgeResponse, Error, GameMeta, GameState, InputOutcome, LimitKind, ModuleStore,
    ModuleSummary, Operation, RateLimiter, Result, Session, SessionPhase, Settlement,
};
use playgate_governance::track_request;
use playgate_sandbox::{DisplayList, InstanceMode, SandboxHost};
use playgate_session::SessionManager;

use crate::error::{AgentId, ApiError, ApiResult};
use crate::intake::{read_submission, SubmissionService};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Upper bound for request bodies (submissions are the largest).
    pub max_body_bytes: usize,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: 128 * 1024 * 1024,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            max_body_bytes: server.max_body_bytes,
            ..Self::default()
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub submissions: SubmissionService,
    pub store: Arc<dyn ModuleStore>,
    pub sessions: Arc<SessionManager>,
    pub host: Arc<SandboxHost>,
    /// Charges UI instance traffic against the caller's call quota.
    pub limiter: Arc<dyn RateLimiter>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/games", post(submit_handler))
            .route("/v1/games/:id", get(game_handler))
            .route("/v1/games/:id/play", post(play_handler))
            .route("/v1/sessions", post(create_session_handler))
            .route("/v1/sessions/:id", get(session_handler))
            .route("/v1/sessions/:id/input", post(input_handler))
            .route("/v1/sessions/:id/state", get(state_handler))
            .route("/v1/sessions/:id/reset", post(reset_handler))
            .route("/v1/sessions/:id/end", post(end_handler))
            .route("/v1/instances/:id", delete(destroy_instance_handler))
            .route("/v1/instances/:id/call", post(instance_call_handler))
            .route("/v1/instances/:id/frame", get(frame_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        router = router
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(middleware::from_fn(metrics_middleware));

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::internal(format!("Failed to bind: {}", e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Request count and latency per matched route.
async fn metrics_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    track_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub live_instances: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub game_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub phase: SessionPhase,
    pub meta: GameMeta,
    pub state: GameState,
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub action: String,
}

/// Body of an end call. The settled score is always the last observed one.
#[derive(Debug, Default, Deserialize)]
pub struct EndRequest {
    pub final_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub instance_id: String,
    pub game_id: String,
    pub meta: GameMeta,
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub operation: Operation,
    #[serde(default)]
    pub args: Value,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        live_instances: state.host.live_count(),
    })
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ModuleSummary>)> {
    let submission = read_submission(&agent_id, multipart).await?;
    let record = state.submissions.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(record.summary())))
}

async fn game_handler(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> ApiResult<Json<ModuleSummary>> {
    let record = state
        .store
        .load(&game_id)
        .await?
        .ok_or(Error::GameNotFound(game_id))?;
    Ok(Json(record.summary()))
}

/// Stand up a realtime instance for a rendered UI, owned by the caller.
async fn play_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(game_id): Path<String>,
) -> ApiResult<(StatusCode, Json<PlayResponse>)> {
    state
        .limiter
        .check_and_increment(&agent_id, LimitKind::CallsPerHour)
        .await?;
    let record = state
        .store
        .load(&game_id)
        .await?
        .ok_or_else(|| Error::GameNotFound(game_id.clone()))?;

    let instance = state
        .host
        .instantiate(
            &record,
            state.host.options(InstanceMode::Realtime).owned_by(&agent_id),
        )
        .await?;
    let meta = match instance.read_meta().await {
        Ok(meta) => meta,
        Err(e) => {
            state.host.destroy(instance.id()).await.ok();
            return Err(e.into());
        }
    };

    tracing::info!(
        game_id = %game_id,
        agent_id = %agent_id,
        instance_id = instance.id(),
        "Play instance created"
    );
    Ok((
        StatusCode::CREATED,
        Json(PlayResponse {
            instance_id: instance.id().to_string(),
            game_id,
            meta,
        }),
    ))
}

async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Json(payload): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let start = state
        .sessions
        .create_session(&agent_id, &payload.game_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: start.session.id,
            phase: start.session.phase,
            meta: start.meta,
            state: start.state,
        }),
    ))
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state.sessions.get(&session_id).await?;
    if session.agent_id != agent_id {
        return Err(Error::NotSessionOwner(session_id).into());
    }
    Ok(Json(session))
}

async fn input_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(session_id): Path<String>,
    Json(payload): Json<InputRequest>,
) -> ApiResult<Json<InputOutcome>> {
    let outcome = state
        .sessions
        .send_input(&session_id, &agent_id, &payload.action)
        .await?;
    Ok(Json(outcome))
}

async fn state_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(session_id): Path<String>,
) -> ApiResult<Json<GameState>> {
    Ok(Json(
        state.sessions.read_state(&session_id, &agent_id).await?,
    ))
}

async fn reset_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(session_id): Path<String>,
) -> ApiResult<Json<GameState>> {
    Ok(Json(state.sessions.reset(&session_id, &agent_id).await?))
}

async fn end_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(session_id): Path<String>,
    payload: Option<Json<EndRequest>>,
) -> ApiResult<Json<Settlement>> {
    let claimed = payload.and_then(|Json(body)| body.final_score);
    let settlement = state.sessions.end_session(&session_id, &agent_id).await?;
    if let Some(claimed) = claimed.filter(|c| *c != settlement.score) {
        tracing::debug!(
            session_id = %session_id,
            claimed,
            settled = settlement.score,
            "Claimed final score differs from observed score"
        );
    }
    Ok(Json(settlement))
}

/// Raw bridge message from the instance owner. Failures come back inside
/// the response body.
async fn instance_call_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(instance_id): Path<String>,
    Json(payload): Json<CallRequest>,
) -> ApiResult<Json<BridgeResponse>> {
    let instance = state.host.get_for(&instance_id, &agent_id)?;
    state
        .limiter
        .check_and_increment(&agent_id, LimitKind::CallsPerHour)
        .await?;
    Ok(Json(instance.call(payload.operation, payload.args).await))
}

async fn frame_handler(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> ApiResult<Json<DisplayList>> {
    Ok(Json(state.host.get(&instance_id)?.latest_frame()))
}

/// Destroy a UI instance. Session instances end with their session.
async fn destroy_instance_handler(
    State(state): State<Arc<AppState>>,
    AgentId(agent_id): AgentId,
    Path(instance_id): Path<String>,
) -> ApiResult<StatusCode> {
    let instance = state.host.get_for(&instance_id, &agent_id)?;
    if let Some(session_id) = instance.session_id() {
        return Err(ApiError(Error::invalid_request(format!(
            "instance belongs to session {}; end the session instead",
            session_id
        ))));
    }
    state.host.destroy(&instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
