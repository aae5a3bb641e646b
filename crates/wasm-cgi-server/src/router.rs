//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{handle_module, health_check, list_modules, readiness_check};
use crate::state::AppState;

/// Build the application router.
///
/// Routes:
/// - `GET /:module_name` - Run a module, CGI-style
/// - `GET /-/health` - Health check
/// - `GET /-/ready` - Readiness check
/// - `GET /-/modules` - List registered modules
///
/// Operational routes live under `/-/`, which is two path segments deep and
/// so never shadows a module name.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let ops_routes = Router::new()
        .route("/-/health", get(health_check))
        .route("/-/ready", get(readiness_check))
        .route("/-/modules", get(list_modules));

    Router::new()
        .route("/:module_name", get(handle_module))
        .merge(ops_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, Version};
    use tower::util::ServiceExt;
    use wasm_cgi_common::{EngineConfig, ExecutionConfig};
    use wasm_cgi_core::{Dispatcher, ModuleRegistry, WasmEngine};

    const HELLO_WAT: &str = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 64) "Content-type: text/html\n\nHello World")
            (func (export "_start")
                (i32.store (i32.const 0) (i32.const 64))
                (i32.store (i32.const 4) (i32.const 36))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16))))
        )
    "#;

    const ECHO_WAT: &str = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_read"
                (func $fd_read (param i32 i32 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (local $n i32)
                (i32.store (i32.const 0) (i32.const 64))
                (i32.store (i32.const 4) (i32.const 1024))
                (block $done
                    (loop $read
                        (br_if $done
                            (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 16)))
                        (local.set $n (i32.load (i32.const 16)))
                        (br_if $done (i32.eqz (local.get $n)))
                        (i32.store (i32.const 32) (i32.const 64))
                        (i32.store (i32.const 36) (local.get $n))
                        (drop
                            (call $fd_write (i32.const 1) (i32.const 32) (i32.const 1) (i32.const 20)))
                        (br $read))))
        )
    "#;

    /// Prints its environment block.
    const ENV_WAT: &str = r#"
        (module
            (import "wasi_snapshot_preview1" "environ_sizes_get"
                (func $environ_sizes_get (param i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "environ_get"
                (func $environ_get (param i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")
                (drop (call $environ_sizes_get (i32.const 0) (i32.const 4)))
                (drop (call $environ_get (i32.const 16) (i32.const 256)))
                (i32.store (i32.const 8) (i32.const 256))
                (i32.store (i32.const 12) (i32.load (i32.const 4)))
                (drop (call $fd_write (i32.const 1) (i32.const 8) (i32.const 1) (i32.const 200))))
        )
    "#;

    const FAIL_WAT: &str = r#"
        (module
            (import "wasi_snapshot_preview1" "fd_write"
                (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "proc_exit"
                (func $proc_exit (param i32)))
            (memory (export "memory") 1)
            (data (i32.const 64) "partial")
            (data (i32.const 96) "boom\n")
            (func (export "_start")
                (i32.store (i32.const 0) (i32.const 64))
                (i32.store (i32.const 4) (i32.const 7))
                (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
                (i32.store (i32.const 0) (i32.const 96))
                (i32.store (i32.const 4) (i32.const 5))
                (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 16)))
                (call $proc_exit (i32.const 3)))
        )
    "#;

    const SPIN_WAT: &str = r#"(module (func (export "_start") (loop $l (br $l))))"#;

    fn setup_router() -> Router {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            cache_compiled_modules: false,
            ..Default::default()
        })
        .unwrap();

        let mut builder = ModuleRegistry::builder(&engine);
        builder
            .add_wat("hello", HELLO_WAT)
            .unwrap()
            .add_wat("echo", ECHO_WAT)
            .unwrap()
            .add_wat("env", ENV_WAT)
            .unwrap()
            .add_wat("fail", FAIL_WAT)
            .unwrap()
            .add_wat("slow", SPIN_WAT)
            .unwrap();

        let exec_config = ExecutionConfig {
            timeout_ms: 1_000,
            module_timeouts: [("slow".to_string(), 20)].into_iter().collect(),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(engine, builder.build(), exec_config).unwrap();

        build_router(AppState::new(dispatcher), Duration::from_secs(30))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_module_output_verbatim() {
        let app = setup_router();

        let response = app.oneshot(get_request("/hello")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(
            body_bytes(response).await,
            b"Content-type: text/html\n\nHello World"
        );
    }

    #[tokio::test]
    async fn test_body_reaches_stdin() {
        let app = setup_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .body(Body::from("hi"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"hi");
    }

    #[tokio::test]
    async fn test_cgi_environment() {
        let app = setup_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/env")
                    .version(Version::HTTP_10)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            body_bytes(response).await,
            b"REQUEST_METHOD=GET\0SERVER_PROTOCOL=HTTP/1.0\0"
        );
    }

    #[tokio::test]
    async fn test_module_not_found() {
        let app = setup_router();

        let response = app.oneshot(get_request("/missing")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_module_timeout() {
        let app = setup_router();

        let response = app.oneshot(get_request("/slow")).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_module_failure_discards_output() {
        let app = setup_router();

        let response = app.oneshot(get_request("/fail")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_bytes(response).await;
        assert!(!String::from_utf8_lossy(&body).contains("partial"));

        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["exit_code"], 3);
        assert_eq!(body["diagnostics"], "boom\n");
    }

    #[tokio::test]
    async fn test_only_get_is_routed() {
        let app = setup_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/hello")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_nested_path_is_not_a_module() {
        let app = setup_router();

        let response = app.oneshot(get_request("/hello/world")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = setup_router();

        let response = app.oneshot(get_request("/-/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let app = setup_router();

        let response = app.oneshot(get_request("/-/ready")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["modules_loaded"], 5);
    }

    #[tokio::test]
    async fn test_list_modules() {
        let app = setup_router();

        let response = app.oneshot(get_request("/-/modules")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["count"], 5);
        assert_eq!(body["modules"][0], "echo");
    }
}
