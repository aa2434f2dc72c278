use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::task_manager::{TaskDraft, TaskPatch};

const JSONRPC_VERSION: &str = "2.0";

pub const VALIDATION_ERROR_CODE: i32 = -32001;
pub const NOT_FOUND_ERROR_CODE: i32 = -32004;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self::custom(-32700, "Parse error".to_string(), None)
    }

    pub fn invalid_request() -> Self {
        Self::custom(-32600, "Invalid Request".to_string(), None)
    }

    pub fn method_not_found() -> Self {
        Self::custom(-32601, "Method not found".to_string(), None)
    }

    pub fn invalid_params() -> Self {
        Self::custom(-32602, "Invalid params".to_string(), None)
    }

    pub fn internal_error() -> Self {
        Self::custom(-32603, "Internal error".to_string(), None)
    }

    pub fn custom(code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            code,
            message,
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskParams {
    pub id: String,
    #[serde(default)]
    pub updates: TaskPatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeTaskParams {
    pub id: String,
    #[serde(alias = "snoozedUntil")]
    pub until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ImportTasksParams {
    pub tasks: Vec<TaskDraft>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportTasksParams {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BasicResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedResponse {
    pub message: String,
    pub affected: usize,
}

pub trait JsonRpcHandler: Send + Sync {
    fn handle_request(
        &self,
        request: JsonRpcRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = JsonRpcResponse> + Send + '_>>;
}

pub struct JsonRpcServer {
    handler: Box<dyn JsonRpcHandler>,
}

impl JsonRpcServer {
    pub fn new(handler: Box<dyn JsonRpcHandler>) -> Self {
        Self { handler }
    }

    pub async fn run_stdio(&self) -> anyhow::Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves one request per input line until EOF, writing one response
    /// line per request.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut line = String::new();
        info!("JSON-RPC server started");
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("JSON-RPC server shutting down");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let response = self.process_line(line).await;
                    let response_json = serde_json::to_string(&response)?;
                    output.write_all(response_json.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Err(e) => {
                    warn!(error = %e, "Error reading request stream");
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn process_line(&self, line: &str) -> JsonRpcResponse {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "Rejected unparseable request");
                return Self::error_response(None, JsonRpcError::parse_error());
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Self::error_response(request.id, JsonRpcError::invalid_request());
        }
        self.handler.handle_request(request).await
    }

    pub fn success_response(id: Option<Value>, result: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error_response(id: Option<Value>, error: JsonRpcError) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_manager::Patch;

    #[test]
    fn test_jsonrpc_request_serialization() {
        let request = JsonRpcRequest::new(
            "create_task",
            Some(serde_json::json!({ "text": "Buy milk" })),
            Some(Value::from(1)),
        );
        let json = serde_json::to_string(&request).unwrap();
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, "create_task");
        assert_eq!(parsed.jsonrpc, "2.0");
    }

    #[test]
    fn test_update_params_distinguish_null_from_missing() {
        let params: UpdateTaskParams = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "updates": { "dueDate": null, "text": "renamed" }
        }))
        .unwrap();
        assert_eq!(params.updates.due_date, Patch::Null);
        assert!(params.updates.category.is_absent());
        assert_eq!(params.updates.text.as_deref(), Some("renamed"));
    }

    #[test]
    fn test_jsonrpc_error() {
        let error = JsonRpcError::method_not_found();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }
}
