//! Server wiring: the REST mirror of the tool surface, optional bearer auth,
//! and the MCP transports (stdio and streamable HTTP).
//!
//! REST handlers reject unknown query/body fields with `ERR_INVALID_FIELD`
//! and render every failure as the JSON envelope
//! `{error, message, code, timestamp}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use rmcp::ServiceExt;
use serde::Serialize;
use tracing::{error, info};

use crate::app::AppState;
use crate::config::MemexConfig;
use crate::error::Error;
use crate::memory::normalize::normalize_index_path;
use crate::memory::types::{
    ArbitrationHistoryInput, IndexInput, IngestMemoryInput, ListProjectsInput, MemoryAxes,
    MemoryChainInput, RollbackInput, SearchInput, TimelineInput,
};
use crate::memory::{history, index, ingest, metrics, search};
use crate::tools::MemexTools;

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    code: String,
    timestamp: i64,
}

/// Axum-facing wrapper around the service error.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Error::Internal(err) = &self.0 {
            error!(error = ?err, "request failed");
        }
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::BAD_REQUEST);
        let envelope = ErrorEnvelope {
            error: self.0.key().to_string(),
            message: self.0.public_message(),
            code: self.0.code().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        (status, Json(envelope)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Query helpers ─────────────────────────────────────────────────────────────

/// Ordered query pairs; preserves repeated keys (`ids`, `index_path`).
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn first(&self, key: &str) -> &str {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .unwrap_or("")
    }

    fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn reject_unknown(&self, allowed: &[&str]) -> Result<(), Error> {
        for (key, _) in &self.0 {
            if key == "token" {
                continue; // consumed by auth
            }
            if !allowed.contains(&key.as_str()) {
                return Err(Error::invalid_field(format!("unknown field: {key}")));
            }
        }
        Ok(())
    }

    fn opt_i64(&self, key: &str, code: &'static str) -> Result<i64, Error> {
        let raw = self.first(key);
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse::<i64>()
            .map_err(|_| Error::invalid(code, format!("{key} must be an integer")))
    }
}

fn parse_axes_query(raw: &str) -> Result<Option<MemoryAxes>, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<MemoryAxes>(trimmed)
        .map(Some)
        .map_err(|_| Error::invalid("ERR_INVALID_AXES", "axes must be a JSON object"))
}

/// `index_path` arrives as a JSON array, a comma list, or repeated params.
fn parse_index_path_query(values: &[String]) -> Result<Option<Vec<String>>, Error> {
    if values.is_empty() {
        return Ok(None);
    }
    if values.len() == 1 {
        let trimmed = values[0].trim();
        if trimmed.starts_with('[') {
            let path: Vec<String> = serde_json::from_str(trimmed).map_err(|_| {
                Error::invalid("ERR_INVALID_INDEX_PATH", "index_path must be a JSON array")
            })?;
            return Ok(Some(normalize_index_path(&path)));
        }
    }
    let mut path = Vec::new();
    for value in values {
        for part in value.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                path.push(part.to_string());
            }
        }
    }
    Ok(Some(normalize_index_path(&path)))
}

/// Decode a JSON body, mapping unknown-field errors to `ERR_INVALID_FIELD`.
fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Error> {
    serde_json::from_slice::<T>(body).map_err(|err| {
        let message = err.to_string();
        if let Some(field) = extract_unknown_field(&message) {
            Error::invalid_field(format!("unknown field: {field}"))
        } else {
            Error::invalid("ERR_INVALID_BODY", "failed to parse request body")
        }
    })
}

fn extract_unknown_field(message: &str) -> Option<&str> {
    if !message.contains("unknown field") {
        return None;
    }
    let start = message.find('`')? + 1;
    let end = message[start..].find('`')? + start;
    Some(&message[start..end])
}

/// Common project selector fields shared by most GET endpoints.
const SELECTOR_KEYS: [&str; 5] = [
    "owner_id",
    "project_key",
    "project_name",
    "machine_name",
    "project_path",
];

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn handle_ingest_memory(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Response> {
    let payload: IngestMemoryInput = parse_body(&body)?;
    let output = ingest::ingest_memory(&state, payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    let mut allowed = SELECTOR_KEYS.to_vec();
    allowed.extend(["query", "scope", "profile", "mode", "axes", "index_path", "limit"]);
    params.reject_unknown(&allowed)?;

    let mut payload = SearchInput {
        owner_id: params.first("owner_id").into(),
        project_key: params.first("project_key").into(),
        project_name: params.first("project_name").into(),
        machine_name: params.first("machine_name").into(),
        project_path: params.first("project_path").into(),
        query: params.first("query").into(),
        scope: params.first("scope").into(),
        profile: non_empty(params.first("profile")),
        mode: non_empty(params.first("mode")),
        ..Default::default()
    };
    payload.axes = parse_axes_query(params.first("axes"))?;
    payload.index_path = parse_index_path_query(&params.all("index_path"))?;
    payload.limit = params.opt_i64("limit", "ERR_INVALID_LIMIT")?;

    let output = search::search(&state, payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_get_memories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    params.reject_unknown(&["ids", "owner_id"])?;

    let mut ids = Vec::new();
    for raw in params.all("ids") {
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::invalid("ERR_INVALID_IDS", "ids must be non-empty").into());
            }
            ids.push(part.to_string());
        }
    }
    if ids.is_empty() {
        return Err(Error::invalid("ERR_INVALID_IDS", "ids is required").into());
    }
    if ids.len() > 10 {
        return Err(Error::invalid("ERR_INVALID_IDS", "at most 10 ids per call").into());
    }

    let output = state.get_memories(&ids).await?;
    Ok(Json(output).into_response())
}

async fn handle_timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    let mut allowed = SELECTOR_KEYS.to_vec();
    allowed.extend(["days", "limit"]);
    params.reject_unknown(&allowed)?;

    let payload = TimelineInput {
        owner_id: params.first("owner_id").into(),
        project_key: params.first("project_key").into(),
        project_name: params.first("project_name").into(),
        machine_name: params.first("machine_name").into(),
        project_path: params.first("project_path").into(),
        days: params.opt_i64("days", "ERR_INVALID_DAYS")?,
        limit: params.opt_i64("limit", "ERR_INVALID_LIMIT")?,
    };
    let output = state.timeline(payload).await?;
    Ok(Json(output).into_response())
}

fn index_input_from_query(params: &QueryParams) -> Result<IndexInput, Error> {
    let mut allowed = SELECTOR_KEYS.to_vec();
    allowed.extend(["index_path", "limit", "path_tree_depth", "path_tree_width"]);
    params.reject_unknown(&allowed)?;

    Ok(IndexInput {
        owner_id: params.first("owner_id").into(),
        project_key: params.first("project_key").into(),
        project_name: params.first("project_name").into(),
        machine_name: params.first("machine_name").into(),
        project_path: params.first("project_path").into(),
        index_path: parse_index_path_query(&params.all("index_path"))?,
        limit: params.opt_i64("limit", "ERR_INVALID_LIMIT")?,
        path_tree_depth: params.opt_i64("path_tree_depth", "ERR_INVALID_PATH_TREE_DEPTH")?,
        path_tree_width: params.opt_i64("path_tree_width", "ERR_INVALID_PATH_TREE_WIDTH")?,
    })
}

async fn handle_index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let payload = index_input_from_query(&QueryParams(params))?;
    let output = index::index_overview(&state, payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let payload = index_input_from_query(&QueryParams(params))?;
    let output = metrics::metrics(&state, payload).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        output.content,
    )
        .into_response())
}

async fn handle_list_projects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    params.reject_unknown(&["owner_id", "limit"])?;

    let payload = ListProjectsInput {
        owner_id: params.first("owner_id").into(),
        limit: params.opt_i64("limit", "ERR_INVALID_LIMIT")?,
    };
    let output = state.list_projects(payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_arbitration_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    params.reject_unknown(&["owner_id", "memory_id", "project_key", "limit"])?;

    let payload = ArbitrationHistoryInput {
        owner_id: params.first("owner_id").into(),
        memory_id: params.first("memory_id").into(),
        project_key: params.first("project_key").into(),
        limit: params.opt_i64("limit", "ERR_INVALID_LIMIT")?,
    };
    let output = history::arbitration_history(&state, payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_memory_chain(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let params = QueryParams(params);
    params.reject_unknown(&["owner_id", "memory_id"])?;

    let payload = MemoryChainInput {
        owner_id: params.first("owner_id").into(),
        memory_id: params.first("memory_id").into(),
    };
    let output = history::memory_chain(&state, payload).await?;
    Ok(Json(output).into_response())
}

async fn handle_rollback(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Response> {
    let payload: RollbackInput = parse_body(&body)?;
    let output = history::rollback(&state, payload).await?;
    Ok(Json(output).into_response())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ── Auth ──────────────────────────────────────────────────────────────────────

/// Accepts `Authorization: Bearer`, `X-Memex-Token`, or `?token=`.
pub fn match_token(headers: &HeaderMap, query: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if auth.len() >= 7 && auth[..7].eq_ignore_ascii_case("bearer ") {
            if auth[7..].trim() == expected {
                return true;
            }
        }
    }
    if let Some(token) = headers.get("x-memex-token").and_then(|v| v.to_str().ok()) {
        if token.trim() == expected {
            return true;
        }
    }
    query_token(query).is_some_and(|t| t == expected)
}

fn query_token(query: &str) -> Option<String> {
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some("token") {
            return Some(parts.next().unwrap_or("").trim().to_string());
        }
    }
    None
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let expected = state.config.server.http_token.trim();
    if expected.is_empty() {
        return next.run(request).await;
    }
    let query = request.uri().query().unwrap_or("");
    if match_token(request.headers(), query, expected) {
        next.run(request).await
    } else {
        ApiError(Error::Unauthorized).into_response()
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

fn rest_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/ingest/memory", post(handle_ingest_memory))
        .route("/memories/search", get(handle_search))
        .route("/memories", get(handle_get_memories))
        .route("/memories/timeline", get(handle_timeline))
        .route("/memories/index", get(handle_index))
        .route("/memories/metrics", get(handle_metrics))
        .route("/projects", get(handle_list_projects))
        .route("/arbitrations", get(handle_arbitration_history))
        .route("/memories/chain", get(handle_memory_chain))
        .route("/memories/rollback", post(handle_rollback))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ))
        .with_state(state)
}

/// Serve MCP over stdio. Logs stay on stderr so stdout carries JSON-RPC only.
pub async fn serve_stdio(config: MemexConfig) -> anyhow::Result<()> {
    let state = AppState::new(config).await?;
    state.ensure_schema(false).await?;

    let tools = MemexTools::new(state);
    let transport = rmcp::transport::stdio();
    let server = tools.serve(transport).await?;
    info!("MCP server running on stdio");
    server.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}

/// Serve the REST mirror plus the streamable-HTTP MCP transport at `/mcp`.
pub async fn serve_http(config: MemexConfig) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config).await?;
    state.ensure_schema(false).await?;

    let mcp_state = state.clone();
    let mcp_service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MemexTools::new(mcp_state.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = rest_router(state).nest_service("/mcp", mcp_service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            info!("shutting down");
        })
        .await?;
    Ok(())
}
