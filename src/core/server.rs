//! MCP Server Implementation
//!
//! This module contains the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response structures
//! - Tool registry with async tool handlers
//! - Method dispatch shared by both transports
//! - STDIO transport (newline-delimited JSON-RPC)
//! - HTTP transport with Actix Web
//! - `start_server`, which wires configuration, provider and transports

use actix_web::{
    App, HttpResponse, HttpServer,
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use anyhow::Context;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::cli::{CommandArguments, Transport};
use crate::core::{config, utils};
use crate::providers::{self, Provider};
use crate::tools;

/// MCP protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name announced in `initialize`.
pub const SERVER_NAME: &str = "llm-delegator";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC 2.0 request.
#[derive(Deserialize, Debug, Clone)]
pub struct McpRequest {
    /// JSON-RPC version (should be "2.0")
    #[serde(default)]
    pub jsonrpc: String,
    /// Request identifier; `None` only when the member is absent (a
    /// notification). An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    /// Method name to invoke
    pub method: String,
    /// Optional method parameters
    #[serde(default)]
    pub params: Option<Value>,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 response carrying either `result` or `error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request identifier echoed back from the request
    pub id: Option<Value>,
    /// Result data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct McpError {
    /// Error code (standard JSON-RPC codes)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Tool definition as listed by `tools/list`.
#[derive(Serialize, Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Async tool handler: JSON arguments in, result text or error message out.
pub type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

/// Registry of available MCP tools.
///
/// `tools` keeps registration order for listing; `handlers` maps tool names
/// to their handlers for execution.
#[derive(Default)]
pub struct ToolRegistry {
    pub tools: Vec<McpTool>,
    pub handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: McpTool, handler: ToolHandler) {
        let name = tool.name.clone();
        self.tools.push(tool);
        self.handlers.insert(name, handler);
    }
}

/// State shared by every request, whichever transport it arrived on.
pub struct ServerState {
    /// Server name reported in `initialize` and `/health`
    pub server_name: String,
    /// Crate version reported alongside the name
    pub server_version: String,
    /// Registered expert tools
    pub registry: Arc<ToolRegistry>,
    /// Messages dispatched since startup
    requests: AtomicU64,
}

impl ServerState {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            server_name: SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            registry,
            requests: AtomicU64::new(0),
        }
    }

    /// Number of messages dispatched since startup.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Create the tool registry with every expert tool bound to `provider`.
pub fn initialize_tools(provider: Arc<dyn Provider>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::experts::register(&mut registry, provider);
    Arc::new(registry)
}

/// Dispatch one JSON-RPC message. Notifications yield `None`.
pub async fn handle_request(state: &ServerState, req: McpRequest) -> Option<McpResponse> {
    state.requests.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("Received message: {}", req.method);

    let Some(id) = req.id else {
        if req.method != "notifications/initialized" {
            tracing::debug!("Ignoring notification: {}", req.method);
        }
        return None;
    };

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(state, Some(id)),
        "tools/list" => handle_tools_list(&state.registry, Some(id)),
        "tools/call" => handle_tools_call(&state.registry, Some(id), req.params).await,
        _ => McpResponse::failure(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };
    Some(response)
}

fn handle_initialize(state: &ServerState, id: Option<Value>) -> McpResponse {
    McpResponse::success(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": state.server_name,
                "version": state.server_version
            },
            "capabilities": {
                "tools": {}
            }
        }),
    )
}

fn handle_tools_list(registry: &ToolRegistry, id: Option<Value>) -> McpResponse {
    McpResponse::success(id, serde_json::json!({ "tools": registry.tools }))
}

/// Execute a tool.
///
/// A handler error still produces a JSON-RPC result, marked with
/// `isError: true`, so the client can show it to the model. Only a missing
/// `params` object or an unknown tool name is a protocol-level error.
///
/// # Arguments
/// * `registry` - Tool registry for looking up tool handlers
/// * `id` - Request ID from the client
/// * `params` - Method parameters containing tool name and arguments
async fn handle_tools_call(
    registry: &ToolRegistry,
    id: Option<Value>,
    params: Option<Value>,
) -> McpResponse {
    let Some(params) = params else {
        return McpResponse::failure(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let Some(handler) = registry.handlers.get(tool_name) else {
        return McpResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown tool: {}", tool_name));
    };

    let (text, is_error) = match handler(arguments).await {
        Ok(text) => (text, false),
        Err(e) => (format!("Error: {}", e), true),
    };
    McpResponse::success(
        id,
        serde_json::json!({
            "content": [
                {
                    "type": "text",
                    "text": text
                }
            ],
            "isError": is_error
        }),
    )
}

/// Turn one input line into a response, if one is owed.
async fn handle_line(state: &ServerState, line: &[u8]) -> Option<McpResponse> {
    let value: Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("JSON decode error: {}", e);
            return None;
        }
    };
    match McpRequest::deserialize(&value) {
        Ok(req) => handle_request(state, req).await,
        Err(e) => {
            tracing::error!("Invalid request: {}", e);
            value
                .get("id")
                .cloned()
                .map(|id| McpResponse::failure(Some(id), INVALID_REQUEST, format!("Invalid request: {}", e)))
        }
    }
}

/// Serve newline-delimited JSON-RPC from `reader` to `writer` until EOF.
///
/// Messages are processed one at a time and every response is flushed
/// before the next line is read.
pub async fn serve_lines<R, W>(state: &ServerState, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let Some(response) = handle_line(state, line).await else {
            continue;
        };

        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Error serializing response: {}", e);
                continue;
            }
        };
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Run the MCP server over stdin/stdout.
///
/// Uses 8KB buffers on both ends. Returns when stdin reaches EOF, which is
/// how MCP clients close a stdio session.
pub async fn run_server_stdio(state: Arc<ServerState>) -> std::io::Result<()> {
    tracing::info!("LLM Delegator MCP Server starting (STDIO mode)");
    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&state, stdin, stdout).await?;
    tracing::info!("stdin closed, shutting down");
    Ok(())
}

async fn health(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.server_name
    }))
}

async fn metrics(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "requests_total": state.request_count(),
        "status": "ok"
    }))
}

async fn mcp_handler(state: web::Data<ServerState>, req: web::Json<McpRequest>) -> HttpResponse {
    match handle_request(&state, req.into_inner()).await {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    }
}

/// Routes of the HTTP transport.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server over HTTP.
///
/// # Arguments
/// * `state` - Shared server state (tool registry, metadata, counters)
/// * `host` - Bind address (e.g., "0.0.0.0" for all interfaces)
/// * `port` - Port number to listen on
///
/// # Configuration
/// - Worker threads: CPU count capped at 16, or WORKER_THREADS
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(state: Arc<ServerState>, host: String, port: u16) -> std::io::Result<()> {
    use std::time::Duration;

    let bind_addr = format!("{}:{}", host, port);
    let data = web::Data::from(state);

    let workers = std::env::var("WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| num_cpus::get().clamp(1, 16));

    tracing::info!(
        bind = %bind_addr,
        workers,
        "LLM Delegator MCP Server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(workers)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Resolve configuration, create the provider and serve MCP until the
/// transport finishes.
pub async fn start_server(args: CommandArguments) -> anyhow::Result<()> {
    let settings = config::resolve(&args).context("invalid configuration")?;
    let backend = &settings.backend;

    tracing::info!("LLM Delegator MCP Server initialized");
    tracing::info!("Profile: {}", settings.profile);
    tracing::info!("Provider: {}", backend.provider);
    tracing::info!("Base URL: {}", backend.base_url);
    tracing::info!("Model: {}", backend.model);
    tracing::info!("API Key: {}", utils::mask_api_key(&settings.api_key));

    let provider = providers::create_provider(backend, settings.api_key.clone())
        .context("failed to initialize provider")?;
    let state = Arc::new(ServerState::new(initialize_tools(provider)));

    match args.transport {
        Transport::Stdio => run_server_stdio(state).await?,
        Transport::Http => run_server_http(state, args.host, args.port).await?,
        Transport::Both => {
            let stdio_state = Arc::clone(&state);
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = run_server_stdio(stdio_state).await {
                    tracing::error!("STDIO server error: {}", e);
                }
            });
            let http_result = run_server_http(state, args.host, args.port).await;
            stdio_handle.abort();
            http_result?
        }
    }
    Ok(())
}
