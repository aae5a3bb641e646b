//! HTTP responses built from dispatch outcomes.
//!
//! A successful run answers with the module's stdout as-is. Failures answer
//! with a small JSON document and never include partial module output.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

/// Response produced by the module handler.
#[derive(Debug, Clone)]
pub struct WasmHttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers as key-value pairs
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl WasmHttpResponse {
    /// Module output, passed through verbatim with no headers added.
    pub fn output(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    /// Create a JSON response.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }

    /// Create an error response with JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    /// A 500 describing a module that ran and failed.
    pub fn module_failure(message: &str, exit_code: Option<i32>, diagnostics: &str) -> Self {
        Self::json(
            500,
            &serde_json::json!({
                "error": message,
                "exit_code": exit_code,
                "diagnostics": diagnostics,
            }),
        )
    }

    /// Convert to Axum response.
    ///
    /// Headers that are not valid HTTP are skipped.
    pub fn into_axum_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().append(name, value);
            }
        }

        response
    }
}

impl IntoResponse for WasmHttpResponse {
    fn into_response(self) -> axum::response::Response {
        self.into_axum_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_verbatim() {
        let resp = WasmHttpResponse::output(b"Content-type: text/html\n\nHi".to_vec());
        assert_eq!(resp.status, 200);
        assert!(resp.headers.is_empty());
        assert_eq!(resp.body, b"Content-type: text/html\n\nHi");

        let axum_resp = resp.into_axum_response();
        assert_eq!(axum_resp.status(), StatusCode::OK);
        assert!(axum_resp.headers().get("content-type").is_none());
    }

    #[test]
    fn test_error_response() {
        let resp = WasmHttpResponse::error(404, "Not found");
        assert_eq!(resp.status, 404);
        assert_eq!(
            resp.headers[0],
            ("content-type".to_string(), "application/json".to_string())
        );

        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Not found");
    }

    #[test]
    fn test_module_failure_response() {
        let resp = WasmHttpResponse::module_failure("exited with status 3", Some(3), "boom\n");
        assert_eq!(resp.status, 500);

        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["exit_code"], 3);
        assert_eq!(body["diagnostics"], "boom\n");

        let resp = WasmHttpResponse::module_failure("trap", None, "");
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert!(body["exit_code"].is_null());
    }

    #[test]
    fn test_invalid_header_skipped() {
        let resp = WasmHttpResponse {
            status: 200,
            headers: vec![
                ("X-Request-Id".to_string(), "123".to_string()),
                ("bad header".to_string(), "value".to_string()),
            ],
            body: Vec::new(),
        }
        .into_axum_response();

        assert_eq!(resp.headers().len(), 1);
        assert_eq!(resp.headers()["x-request-id"], "123");
    }

    #[test]
    fn test_unknown_status_falls_back() {
        let resp = WasmHttpResponse::error(1000, "odd").into_axum_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
