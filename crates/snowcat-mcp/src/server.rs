//! MCP server implementation.
//!
//! [`McpServer`] dispatches JSON-RPC requests to the resource router and the
//! query tool. On stdio every request runs on its own task, so a slow query
//! does not hold up catalog browsing; responses go through a single writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Value, json};
use snowcat_core::{McpConfig, QueryConfig, Transport};
use snowcat_warehouse::Warehouse;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::McpError;
use crate::http_transport::HttpServer;
use crate::protocol::*;
use crate::query::{QUERY_TOOL, QueryExecutor};
use crate::resources::ResourceRouter;
use crate::tools::ToolRegistry;

/// Requests still running, keyed by the JSON text of their id.
type InFlight = Arc<Mutex<HashMap<String, AbortHandle>>>;

/// The MCP server.
pub struct McpServer {
    config: McpConfig,
    tools: ToolRegistry,
    resources: ResourceRouter,
    query: QueryExecutor,
}

impl McpServer {
    /// Create a server answering from `warehouse`.
    pub fn new(config: McpConfig, warehouse: Arc<dyn Warehouse>, query: &QueryConfig) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(QueryExecutor::definition());

        Self {
            config,
            tools,
            resources: ResourceRouter::new(warehouse.clone()),
            query: QueryExecutor::new(warehouse, query),
        }
    }

    /// Start the MCP server on the configured transport.
    pub async fn run(self: Arc<Self>) -> Result<(), McpError> {
        match self.config.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http => self.run_http().await,
        }
    }

    /// Run the server with stdio transport.
    async fn run_stdio(self: Arc<Self>) -> Result<(), McpError> {
        tracing::info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Run the server with HTTP transport.
    pub async fn run_http(self: Arc<Self>) -> Result<(), McpError> {
        let addr = self.config.bind_addr();
        tracing::info!(%addr, "Starting MCP server with HTTP transport");
        HttpServer::new(addr, self).run().await
    }

    /// Serve newline-delimited JSON-RPC from `reader` until it is exhausted.
    ///
    /// Returns once every request read so far has been answered or cancelled.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            while let Some(response) = response_rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
            }
            Ok::<_, McpError>(())
        });

        let in_flight: InFlight = Arc::default();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed JSON-RPC message");
                    let _ = response_tx.send(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {e}"),
                    ));
                    continue;
                }
            };

            if request.method == "notifications/cancelled" {
                cancel(&in_flight, request.params);
                continue;
            }

            self.clone()
                .spawn_request(request, response_tx.clone(), in_flight.clone());
        }

        tracing::info!("Input closed, waiting for in-flight requests");
        drop(response_tx);
        writer_task
            .await
            .map_err(|e| McpError::Internal(e.into()))?
    }

    fn spawn_request(
        self: Arc<Self>,
        request: JsonRpcRequest,
        responses: mpsc::UnboundedSender<JsonRpcResponse>,
        in_flight: InFlight,
    ) {
        let key = request.id.as_ref().map(Value::to_string);
        let registry = in_flight.clone();
        let task_key = key.clone();

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut running = match in_flight.lock() {
            Ok(running) => running,
            Err(poisoned) => poisoned.into_inner(),
        };

        // A reused id would orphan the earlier task's abort handle
        if let Some(key) = key.as_ref().filter(|key| running.contains_key(*key)) {
            tracing::warn!(request_id = %key, "Rejecting request that reuses an in-flight id");
            let e = McpError::InvalidRequest(format!("request id {key} is already in flight"));
            let _ = responses.send(JsonRpcResponse::error(request.id, e.rpc_code(), e.to_string()));
            return;
        }

        let handle = tokio::spawn(async move {
            let response = self.handle_request(request).await;
            // Deregister before answering so the client may reuse the id at once
            if let Some(key) = task_key {
                if let Ok(mut running) = registry.lock() {
                    running.remove(&key);
                }
            }
            if let Some(response) = response {
                let _ = responses.send(response);
            }
        });

        if let Some(key) = key {
            running.insert(key, handle.abort_handle());
        }
    }

    /// Handle a JSON-RPC request. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!(method = %request.method, id = ?request.id, "Handling request");
        let id = request.id.clone();

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" | "notifications/initialized" => JsonRpcResponse::success(id, json!({})),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "resources/list" => respond(
                id,
                Ok(json!({ "resources": self.resources.resources() })),
            ),
            "resources/templates/list" => respond(
                id,
                Ok(json!({ "resourceTemplates": self.resources.templates() })),
            ),
            "resources/read" => self.handle_read_resource(id, request.params).await,
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        };

        if request.id.is_none() {
            return None;
        }
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "snowcat",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "resources": {
                    "subscribe": false,
                    "listChanged": false
                },
                "tools": {
                    "listChanged": false
                }
            }
        });
        JsonRpcResponse::success(id, result)
    }

    async fn handle_read_resource(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, -32602, message),
        };

        let result = self
            .resources
            .read(&params.uri)
            .await
            .map(|contents| ReadResourceResponse { contents });
        if let Err(e) = &result {
            tracing::warn!(uri = %params.uri, error = %e, "Resource read failed");
        }
        respond(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.tools.list().into_iter().cloned().collect();
        respond(id, Ok(ListToolsResponse { tools }))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, -32602, message),
        };

        let outcome = match params.name.as_str() {
            QUERY_TOOL => self.query.call(&params.arguments).await,
            other => Err(McpError::ToolNotFound {
                name: other.to_string(),
            }),
        };

        match outcome {
            Ok(text) => respond(id, Ok(CallToolResponse::text(text))),
            Err(e @ (McpError::ToolNotFound { .. } | McpError::InvalidArguments { .. })) => {
                JsonRpcResponse::error(id, e.rpc_code(), e.to_string())
            }
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Tool call failed");
                respond(id, Ok(CallToolResponse::failure(e.to_string())))
            }
        }
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        tracing::info!("MCP server shutdown requested");
        JsonRpcResponse::success(id, json!(null))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| format!("Invalid params: {}", e)),
        None => Err("Missing params".to_string()),
    }
}

fn respond<T: Serialize>(id: Option<Value>, result: Result<T, McpError>) -> JsonRpcResponse {
    match result.and_then(|value| serde_json::to_value(value).map_err(McpError::from)) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, e.rpc_code(), e.to_string()),
    }
}

fn cancel(in_flight: &InFlight, params: Option<Value>) {
    let params: CancelledParams = match parse_params(params) {
        Ok(params) => params,
        Err(message) => {
            tracing::warn!(%message, "Ignoring malformed cancellation");
            return;
        }
    };

    let key = params.request_id.to_string();
    let handle = in_flight.lock().ok().and_then(|mut running| running.remove(&key));
    match handle {
        Some(handle) => {
            tracing::info!(request_id = %key, reason = ?params.reason, "Cancelling request");
            handle.abort();
        }
        None => tracing::debug!(request_id = %key, "Cancellation for unknown or finished request"),
    }
}
