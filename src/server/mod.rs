//! HTTP adapter: supplies `(session, snippet)` pairs to the engine.
//!
//! Session identity is an opaque `nbexec_session` cookie, issued on first
//! contact and reused afterwards.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::execution::{CanonicalResponse, ExecutionEngine, MetricsSnapshot};

pub const SESSION_COOKIE: &str = "nbexec_session";

#[derive(Clone)]
pub struct AppState {
    engine: Arc<ExecutionEngine>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub existed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub engine: MetricsSnapshot,
    pub sessions: usize,
}

pub fn router(engine: Arc<ExecutionEngine>) -> Router {
    Router::new()
        .route("/api/execute-code", post(execute_code))
        .route("/api/reset-session", post(reset_session))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    engine: Arc<ExecutionEngine>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("nbexec listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// The caller's session id and whether it was just issued.
fn session_identity(headers: &HeaderMap) -> (String, bool) {
    match session_cookie(headers) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
        .map(|id| id.to_string())
}

fn with_session_cookie(mut response: Response, id: &str) -> Response {
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    response
}

async fn execute_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let (session, issued) = session_identity(&headers);

    let (status, payload) = match body {
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            CanonicalResponse::failure(rejection.body_text()),
        ),
        Ok(Json(request)) => match state.engine.try_execute(&session, &request.code).await {
            Ok(response) if response.is_error() => (StatusCode::BAD_REQUEST, response),
            Ok(response) => (StatusCode::OK, response),
            Err(e) => {
                error!(session = %session, error = %e, "execution failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CanonicalResponse::failure(e.to_string()),
                )
            }
        },
    };

    let response = (status, Json(payload)).into_response();
    if issued {
        with_session_cookie(response, &session)
    } else {
        response
    }
}

async fn reset_session(State(state): State<AppState>, headers: HeaderMap) -> Json<ResetResponse> {
    let existed = session_cookie(&headers).is_some_and(|id| state.engine.reset(&id));
    Json(ResetResponse { status: "reset".into(), existed })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        sessions: state.engine.store().len(),
    })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        engine: state.engine.metrics().snapshot(),
        sessions: state.engine.store().len(),
    })
}
