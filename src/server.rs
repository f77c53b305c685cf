//! HTTP servers: the control-plane API and the Airtable gateway.
//!
//! # Control-plane endpoints ([`run_server`])
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/servers` | List registered servers, newest first |
//! | `POST`   | `/servers` | Register a server (`name`, `endpoint`, `type`) |
//! | `DELETE` | `/servers/{id}` | Remove a server and its logs |
//! | `GET`    | `/servers/{id}/logs` | Log history, newest first (max 200) |
//! | `POST`   | `/servers/{id}/check` | Probe the server and record the result |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Gateway endpoints ([`run_gateway`])
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `*`    | `[gateway].path` (`/mcp`) | MCP Streamable HTTP (helpers + proxied upstream tools) |
//! | `GET`  | `/tools/list` | List helper tools with schemas |
//! | `POST` | `/tools/{name}` | Call a helper tool by name |
//! | `GET`  | `/health` | Health check, unauthenticated |
//!
//! Every gateway route except `/health` requires `Authorization: Bearer <token>`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Server not found." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `tool_error` (500), `internal` (500).

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::client::{McpConnector, RemoteConnector, RemoteSession};
use crate::config::Config;
use crate::error::Error;
use crate::gateway;
use crate::mcp::McpBridge;
use crate::models::{CheckOutcome, LogEntry, ServerRecord};
use crate::probe::{check_server, HealthProber};
use crate::store::RegistryStore;
use crate::traits::{validate_params, ToolContext, ToolInfo, ToolRegistry};

/// Shared state for control-plane handlers.
#[derive(Clone)]
struct AppState {
    store: RegistryStore,
    prober: HealthProber,
}

/// Shared state for gateway tool handlers.
#[derive(Clone)]
struct GatewayState {
    tools: Arc<ToolRegistry>,
    upstream: Arc<dyn RemoteSession>,
}

/// Starts the control-plane API on `[server].bind`.
///
/// Probes go through the `rmcp` client. Use [`run_server_with_connector`] to
/// supply a different [`RemoteConnector`].
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_connector(config, Arc::new(McpConnector)).await
}

pub async fn run_server_with_connector(
    config: &Config,
    connector: Arc<dyn RemoteConnector>,
) -> anyhow::Result<()> {
    let store = RegistryStore::open(config).await?;
    let prober = HealthProber::new(connector, config.probe.timeout());
    let app = control_plane_router(store, prober, &config.server.cors_origins)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "control-plane API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the control-plane router. `cors_origins` empty disables CORS.
pub fn control_plane_router(
    store: RegistryStore,
    prober: HealthProber,
    cors_origins: &[String],
) -> anyhow::Result<Router> {
    let app = Router::new()
        .route("/servers", get(handle_list_servers).post(handle_create_server))
        .route("/servers/{id}", delete(handle_delete_server))
        .route("/servers/{id}/logs", get(handle_get_logs))
        .route("/servers/{id}/check", post(handle_check_server))
        .route("/health", get(handle_health))
        .with_state(AppState { store, prober });

    Ok(match cors_layer(cors_origins)? {
        Some(cors) => app.layer(cors),
        None => app,
    })
}

fn cors_layer(origins: &[String]) -> anyhow::Result<Option<CorsLayer>> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(HeaderValue::from_str)
        .collect::<Result<_, _>>()?;
    if origins.is_empty() {
        return Ok(None);
    }

    // Credentials rule out wildcards, so methods and headers mirror the request.
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request()),
    ))
}

/// Starts the Airtable gateway on `[gateway].bind`.
///
/// Resolves credentials from the environment (missing values are fatal),
/// spawns the upstream Airtable MCP server, and serves the helper tools.
pub async fn run_gateway(config: &Config) -> anyhow::Result<()> {
    let credentials = config.gateway.credentials()?;
    let upstream = gateway::connect_upstream(&config.gateway, &credentials).await?;
    run_gateway_with_upstream(
        config,
        credentials.auth_token,
        upstream,
        Arc::new(ToolRegistry::with_builtins()),
    )
    .await
}

/// Like [`run_gateway`], but with an already-open upstream session and a
/// caller-supplied tool registry.
pub async fn run_gateway_with_upstream(
    config: &Config,
    auth_token: String,
    upstream: Arc<dyn RemoteSession>,
    tools: Arc<ToolRegistry>,
) -> anyhow::Result<()> {
    if tools.is_empty() {
        tracing::warn!("no helper tools registered; only upstream tools will be served");
    }
    let helper_count = tools.len();
    let app = gateway_router(config, auth_token, upstream, tools);

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind).await?;
    tracing::info!(
        bind = %config.gateway.bind,
        path = %config.gateway.path,
        helpers = helper_count,
        "gateway listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn gateway_router(
    config: &Config,
    auth_token: String,
    upstream: Arc<dyn RemoteSession>,
    tools: Arc<ToolRegistry>,
) -> Router {
    let bridge = McpBridge::new(config.gateway.name.clone(), tools.clone(), upstream.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let token: Arc<str> = Arc::from(auth_token);
    let protected = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .with_state(GatewayState { tools, upstream })
        .nest_service(&config.gateway.path, mcp_service)
        .layer(middleware::from_fn_with_state(token, require_bearer));

    Router::new()
        .route("/health", get(handle_health))
        .merge(protected)
}

async fn require_bearer(State(token): State<Arc<str>>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented == &*token);

    if !authorized {
        return unauthorized("missing or invalid bearer token").into_response();
    }
    next.run(request).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => bad_request(msg),
            Error::NotFound(msg) => not_found(msg),
            Error::Transport(msg) => tool_error(msg),
            other => {
                tracing::error!(error = %other, "request failed");
                internal(other.to_string())
            }
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// `Validation` maps to 400 and `NotFound` to 404; any other failure,
/// upstream errors included, is a `tool_error`.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{}: {:#}", tool_name, err);
    match err.downcast_ref::<Error>() {
        Some(Error::Validation(_)) => bad_request(msg),
        Some(Error::NotFound(_)) => not_found(msg),
        _ => tool_error(msg),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /servers ============

#[derive(Serialize)]
struct ServerListResponse {
    servers: Vec<ServerRecord>,
}

#[derive(Deserialize)]
struct CreateServerRequest {
    name: String,
    endpoint: String,
    #[serde(rename = "type")]
    transport: String,
}

#[derive(Serialize)]
struct ServerResponse {
    server: ServerRecord,
}

#[derive(Serialize)]
struct LogListResponse {
    logs: Vec<LogEntry>,
}

#[derive(Serialize)]
struct DeleteResponse {
    ok: bool,
}

async fn handle_list_servers(
    State(state): State<AppState>,
) -> Result<Json<ServerListResponse>, AppError> {
    let servers = state.store.list().await?;
    Ok(Json(ServerListResponse { servers }))
}

async fn handle_create_server(
    State(state): State<AppState>,
    Json(payload): Json<CreateServerRequest>,
) -> Result<Json<ServerResponse>, AppError> {
    let server = state
        .store
        .create(&payload.name, &payload.endpoint, &payload.transport)
        .await?;
    Ok(Json(ServerResponse { server }))
}

async fn handle_delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store.delete(&id).await?;
    Ok(Json(DeleteResponse { ok: true }))
}

async fn handle_get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogListResponse>, AppError> {
    let logs = state.store.logs(&id).await?;
    Ok(Json(LogListResponse { logs }))
}

async fn handle_check_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CheckOutcome>, AppError> {
    let outcome = check_server(&state.store, &state.prober, &id).await?;
    Ok(Json(outcome))
}

// ============ Gateway tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<GatewayState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::from_tool(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

async fn handle_tool_call(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated_params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.upstream.clone());
    let result = tool
        .execute(validated_params, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
