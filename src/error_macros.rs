/*!
 * Error Handling Macros for spicytodo
 *
 * Turns handler results into JSON-RPC responses in one place, so every
 * method reports failures with the same codes and debug context.
 */

use serde_json::{Value, json};

use crate::communication::{JsonRpcError, NOT_FOUND_ERROR_CODE, VALIDATION_ERROR_CODE};
use crate::error::TodoError;

/// Where and while doing what an error happened.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub operation: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub function: String,
    pub method_name: Option<String>,
    pub request_id: Option<Value>,
}

impl ErrorContext {
    pub fn new(operation: &str, file: &str, line: u32, column: u32, function: &str) -> Self {
        Self {
            operation: operation.to_string(),
            file: file.to_string(),
            line,
            column,
            function: function.to_string(),
            method_name: None,
            request_id: None,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method_name = Some(method.to_string());
        self
    }

    pub fn with_request_id(mut self, id: Option<Value>) -> Self {
        self.request_id = id;
        self
    }
}

/// JSON-RPC code for a handler failure: domain errors get their own codes,
/// anything else is internal.
pub fn error_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<TodoError>() {
        Some(TodoError::Validation(_)) => VALIDATION_ERROR_CODE,
        Some(TodoError::NotFound(_)) => NOT_FOUND_ERROR_CODE,
        None => JsonRpcError::internal_error().code,
    }
}

pub fn create_enhanced_error(
    error: &anyhow::Error,
    context: &ErrorContext,
    error_code: i32,
) -> JsonRpcError {
    let violations = error
        .downcast_ref::<TodoError>()
        .and_then(TodoError::validation_errors)
        .map(|errors| json!(errors));
    let error_message = format!("{}: {}", context.operation, error);
    let debug_data = json!({
        "operation": context.operation,
        "error_source": error.to_string(),
        "violations": violations,
        "location": {
            "file": context.file,
            "line": context.line,
            "column": context.column,
            "function": context.function
        },
        "method": context.method_name,
        "request_id": context.request_id,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    JsonRpcError::custom(error_code, error_message, Some(debug_data))
}

/// Converts a handler `anyhow::Result` into a JSON-RPC response.
#[macro_export]
macro_rules! handle_jsonrpc_method {
    (
        $request_id:expr,
        $method_name:expr,
        $operation:expr,
        $result:expr
    ) => {{
        let context = $crate::error_macros::ErrorContext::new(
            $operation,
            file!(),
            line!(),
            column!(),
            module_path!(),
        )
        .with_method($method_name)
        .with_request_id($request_id.clone());
        match $result {
            Ok(value) => {
                tracing::debug!(method = $method_name, "Operation '{}' completed", $operation);
                let json_value = match serde_json::to_value(&value) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(method = $method_name, error = %e, "Failed to serialize result");
                        serde_json::Value::Null
                    }
                };
                $crate::communication::JsonRpcServer::success_response($request_id, json_value)
            }
            Err(error) => {
                let code = $crate::error_macros::error_code_for(&error);
                let enhanced_error = $crate::error_macros::create_enhanced_error(&error, &context, code);
                tracing::warn!(method = $method_name, code, "Operation '{}' failed: {}", $operation, error);
                $crate::communication::JsonRpcServer::error_response($request_id, enhanced_error)
            }
        }
    }};
}

/// For methods that take no parameters.
#[macro_export]
macro_rules! handle_simple_method {
    (
        $request_id:expr,
        $method_name:expr,
        $operation:expr,
        $async_call:expr
    ) => {{
        let result = $async_call.await;
        $crate::handle_jsonrpc_method!($request_id, $method_name, $operation, result)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! invalid_params_response {
    ($request_id:expr, $method_name:expr, $param_type:ty, $error:expr) => {{
        let context = $crate::error_macros::ErrorContext::new(
            &format!("Parse {} parameters", stringify!($param_type)),
            file!(),
            line!(),
            column!(),
            module_path!(),
        )
        .with_method($method_name)
        .with_request_id($request_id.clone());
        let parse_error = $error;
        let error = anyhow::anyhow!("Parameter parsing failed: {}", parse_error);
        let enhanced_error = $crate::error_macros::create_enhanced_error(
            &error,
            &context,
            $crate::communication::JsonRpcError::invalid_params().code,
        );
        tracing::warn!(method = $method_name, error = %parse_error, "Parameter parsing failed");
        $crate::communication::JsonRpcServer::error_response($request_id, enhanced_error)
    }};
}

/// For methods with required parameters.
#[macro_export]
macro_rules! handle_parameterized_method {
    (
        $request:expr,
        $param_type:ty,
        $method_name:expr,
        $operation:expr,
        |$params:ident| $async_call:expr
    ) => {{
        match $request.params {
            Some(params) => match serde_json::from_value::<$param_type>(params) {
                Ok($params) => {
                    let result = $async_call.await;
                    $crate::handle_jsonrpc_method!($request.id, $method_name, $operation, result)
                }
                Err(e) => $crate::invalid_params_response!($request.id, $method_name, $param_type, e),
            },
            None => {
                tracing::warn!(method = $method_name, "Missing required parameters");
                $crate::communication::JsonRpcServer::error_response(
                    $request.id,
                    $crate::communication::JsonRpcError::invalid_params(),
                )
            }
        }
    }};
}

/// For methods whose parameters may be omitted entirely; a missing or null
/// `params` means `Default`.
#[macro_export]
macro_rules! handle_optional_method {
    (
        $request:expr,
        $param_type:ty,
        $method_name:expr,
        $operation:expr,
        |$params:ident| $async_call:expr
    ) => {{
        let parsed = match $request.params {
            Some(serde_json::Value::Null) | None => Ok(<$param_type>::default()),
            Some(params) => serde_json::from_value::<$param_type>(params),
        };
        match parsed {
            Ok($params) => {
                let result = $async_call.await;
                $crate::handle_jsonrpc_method!($request.id, $method_name, $operation, result)
            }
            Err(e) => $crate::invalid_params_response!($request.id, $method_name, $param_type, e),
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ValidationError, ValidationErrors};
    use anyhow::Result;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("toggle", "handler.rs", 42, 10, "spicytodo::handler")
            .with_method("toggle_task")
            .with_request_id(Some(json!(7)));
        assert_eq!(context.operation, "toggle");
        assert_eq!(context.line, 42);
        assert_eq!(context.method_name, Some("toggle_task".to_string()));
        assert_eq!(context.request_id, Some(json!(7)));
    }

    #[test]
    fn test_domain_errors_map_to_codes() {
        let not_found: anyhow::Error = TodoError::not_found("x").into();
        assert_eq!(error_code_for(&not_found), NOT_FOUND_ERROR_CODE);

        let invalid: anyhow::Error = TodoError::from(ValidationErrors::single(ValidationError::new(
            "text_required",
            "text",
            "text is required",
        )))
        .into();
        assert_eq!(error_code_for(&invalid), VALIDATION_ERROR_CODE);

        let context = ErrorContext::new("create", "handler.rs", 1, 1, "spicytodo::handler");
        let rpc = create_enhanced_error(&invalid, &context, VALIDATION_ERROR_CODE);
        let data = rpc.data.unwrap();
        assert_eq!(data["violations"][0]["field"], "text");

        assert_eq!(error_code_for(&anyhow::anyhow!("disk full")), -32603);
    }

    fn failing_lookup() -> Result<serde_json::Value> {
        Err(TodoError::not_found("missing").into())
    }

    #[test]
    fn test_macro_error_case() {
        let response = handle_jsonrpc_method!(Some(json!(1)), "get_task", "Get task", failing_lookup());
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, NOT_FOUND_ERROR_CODE);
        assert!(error.message.contains("Get task"));
        let data = error.data.unwrap();
        assert_eq!(data["request_id"], 1);
        assert_eq!(data["method"], "get_task");
    }

    #[test]
    fn test_macro_success_case() {
        let ok: Result<serde_json::Value> = Ok(json!({ "success": true }));
        let response = handle_jsonrpc_method!(Some(json!(1)), "health", "Health check", ok);
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }
}
