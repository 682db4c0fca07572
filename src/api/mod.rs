//! Local HTTP API: demo lifecycle, commands and the event socket.

pub mod ws;

use crate::demo::{CommandResponse, DemoSession, SessionFilter, SessionSummary};
use crate::error::DemoError;
use crate::state::AppState;
use axum::{
    extract::{Path as AxumPath, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub type ApiState = Arc<AppState>;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<T, ApiError>;

/// Concurrent requests admitted before callers queue
const MAX_CONCURRENT_REQUESTS: usize = 32;

/// API key authentication middleware.
/// Skips authentication for GET /api/health so monitors can check the server.
async fn api_key_auth(
    State(expected_key): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Log every API call with timing and outcome.
async fn request_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = started.elapsed().as_millis();
    if status.is_server_error() {
        tracing::warn!("{} {} -> {} ({}ms)", method, path, status.as_u16(), elapsed);
    } else {
        tracing::debug!("{} {} -> {} ({}ms)", method, path, status.as_u16(), elapsed);
    }
    response
}

/// Map service errors onto HTTP responses
fn api_error(e: DemoError) -> ApiError {
    let (status, code) = match &e {
        DemoError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
        DemoError::SessionExists(_) => (StatusCode::CONFLICT, "session_exists"),
        DemoError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        DemoError::Browser(_) => (StatusCode::BAD_GATEWAY, "browser_error"),
        DemoError::Llm(_) => (StatusCode::BAD_GATEWAY, "llm_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (
        status,
        Json(json!({
            "error": code,
            "message": e.to_string(),
        })),
    )
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/demos", get(list_demos).post(start_demo))
        .route("/api/demos/:id", get(get_demo).delete(end_demo))
        .route("/api/demos/:id/record", delete(delete_demo))
        .route("/api/demos/:id/summary", get(demo_summary))
        .route("/api/demos/:id/command", post(send_command))
        .route("/api/demos/:id/pause", post(pause_demo))
        .route("/api/demos/:id/resume", post(resume_demo))
        // WebSocket (real-time events)
        .route("/api/ws", get(ws::ws_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": crate::agent::types::now_ms(),
        "services": {
            "active_sessions": state.demos.active_sessions().await,
        }
    }))
}

// ---------------------------------------------------------------------------
// Demo lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartDemoRequest {
    pub website: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

async fn start_demo(
    State(state): State<ApiState>,
    Json(req): Json<StartDemoRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let session = state
        .demos
        .start_demo(&req.website, req.session_id)
        .await
        .map_err(api_error)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session.id,
            "website": session.website,
            "status": session.status,
        })),
    ))
}

async fn list_demos(
    State(state): State<ApiState>,
    Query(filter): Query<SessionFilter>,
) -> ApiResult<Json<Vec<DemoSession>>> {
    state.demos.list_sessions(&filter).await.map(Json).map_err(api_error)
}

async fn get_demo(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DemoSession>> {
    state.demos.get_session(&id).await.map(Json).map_err(api_error)
}

async fn pause_demo(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DemoSession>> {
    state.demos.pause_demo(&id).await.map(Json).map_err(api_error)
}

async fn resume_demo(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DemoSession>> {
    state.demos.resume_demo(&id).await.map(Json).map_err(api_error)
}

async fn demo_summary(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<SessionSummary>> {
    state.demos.session_summary(&id).await.map(Json).map_err(api_error)
}

async fn delete_demo(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    state
        .demos
        .delete_session(&id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

async fn end_demo(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DemoSession>> {
    state.demos.end_demo(&id).await.map(Json).map_err(api_error)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

async fn send_command(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    match state.demos.handle_command(&id, &req.command).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            state.broadcast_ws(ws::WsEvent::Error {
                session_id: Some(id),
                message: e.to_string(),
            });
            Err(api_error(e))
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-api-key"),
        ])
}

/// Build the full API app (router + optional API key auth + CORS).
/// Used by run_server and by integration tests to exercise the middleware.
pub fn app(state: ApiState) -> Router {
    use tower::limit::ConcurrencyLimitLayer;

    let (api_key, origins) = {
        let config = state.config.read();
        (config.server.api_key.clone(), config.server.cors_origins.clone())
    };

    let base_router = router(state);
    if let Some(key) = api_key {
        base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth))
    } else {
        base_router
    }
    .layer(middleware::from_fn(request_log))
    .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
    .layer(cors_layer(&origins))
}

/// Serve the API on localhost until `shutdown` resolves
pub async fn run_server<F>(state: ApiState, port: u16, shutdown: F) -> crate::error::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    let app = app(state);
    tracing::info!("Demo agent API listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
