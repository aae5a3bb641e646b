//! Request handlers.
//!
//! [`handle_module`] is the CGI gateway: one HTTP request becomes one module
//! run, with the body on stdin and stdout as the response body. The rest are
//! operational endpoints.

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use wasm_cgi_common::RuntimeError;
use wasm_cgi_core::ExecutionRequest;

use crate::request::CgiRequest;
use crate::response::WasmHttpResponse;
use crate::state::AppState;

/// Run the module named by the path for this request.
#[instrument(skip(state, method, version, body), fields(module = %module_name))]
pub async fn handle_module(
    State(state): State<AppState>,
    Path(module_name): Path<String>,
    method: Method,
    version: Version,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = %request_id,
        body_bytes = body.len(),
        "Handling module request"
    );

    let request = ExecutionRequest {
        module: module_name,
        request_id,
        env: CgiRequest::new(&method, version).into_env(),
        timeout: None,
    };

    match state.dispatcher().dispatch_to_vec(request, body).await {
        Ok(output) => WasmHttpResponse::output(output).into_axum_response(),
        Err(e) => error_to_response(e).into_axum_response(),
    }
}

/// Convert RuntimeError to HTTP response.
pub fn error_to_response(error: RuntimeError) -> WasmHttpResponse {
    match error {
        RuntimeError::ModuleNotFound { module_id } => {
            WasmHttpResponse::error(404, &format!("Module not found: {module_id}"))
        }
        RuntimeError::ExecutionTimeout { duration_ms } => {
            WasmHttpResponse::error(504, &format!("Execution timeout after {duration_ms}ms"))
        }
        RuntimeError::ModuleExecution {
            exit_code,
            message,
            diagnostics,
        } => {
            warn!(exit_code, error = %message, "Module failed");
            WasmHttpResponse::module_failure(&message, exit_code, &diagnostics)
        }
        other => {
            error!(error = %other, "Request failed");
            WasmHttpResponse::error(500, "Internal server error")
        }
    }
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// The registry is frozen before the listener opens, so a running server
/// is always ready; the body reports what it is serving.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = state.dispatcher();

    let body = serde_json::json!({
        "status": "ready",
        "modules_loaded": dispatcher.registry().len(),
        "live_instances": dispatcher.live_instances(),
    });

    (StatusCode::OK, axum::Json(body))
}

/// List registered modules.
pub async fn list_modules(State(state): State<AppState>) -> impl IntoResponse {
    let modules = state.registry().names();
    axum::Json(serde_json::json!({
        "count": modules.len(),
        "modules": modules,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_response_not_found() {
        let err = RuntimeError::ModuleNotFound {
            module_id: "test".to_string(),
        };
        let resp = error_to_response(err);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_error_to_response_timeout() {
        let err = RuntimeError::ExecutionTimeout { duration_ms: 50 };
        let resp = error_to_response(err);
        assert_eq!(resp.status, 504);
        assert!(String::from_utf8_lossy(&resp.body).contains("50ms"));
    }

    #[test]
    fn test_error_to_response_module_failure() {
        let err = RuntimeError::module_execution(Some(2), "module exited with status 2", "bad\n");
        let resp = error_to_response(err);
        assert_eq!(resp.status, 500);

        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "module exited with status 2");
        assert_eq!(body["exit_code"], 2);
        assert_eq!(body["diagnostics"], "bad\n");
    }

    #[test]
    fn test_error_to_response_internal_hides_detail() {
        let err = RuntimeError::Io(std::io::Error::other("pipe closed"));
        let resp = error_to_response(err);
        assert_eq!(resp.status, 500);
        assert!(!String::from_utf8_lossy(&resp.body).contains("pipe closed"));
    }
}
