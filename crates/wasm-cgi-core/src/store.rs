//! Per-request execution context and store management.
//!
//! This module provides:
//! - [`ExecutionEnv`]: Everything one instantiation sees of the outside world
//! - [`WorkerContext`]: Store data for a single instantiation
//! - [`LiveInstances`]: Counter of stores currently alive, used to detect leaked instances

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use wasmtime::Store;
use wasmtime_wasi::pipe::{AsyncReadStream, AsyncWriteStream, MemoryOutputPipe};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{AsyncStdinStream, AsyncStdoutStream, WasiCtxBuilder};

use crate::WasmEngine;

/// Execution configuration for one instantiation.
///
/// The module gets exactly what is listed here: no inherited host
/// environment, no preopened directories, no network.
pub struct ExecutionEnv<R, W> {
    /// `argv[0]` as seen by the module.
    pub program_name: String,
    /// Identifier used in logs for this execution.
    pub request_id: String,
    /// Environment variables, in order.
    pub env: Vec<(String, String)>,
    /// Bound to the module's stdin.
    pub stdin: R,
    /// Bound to the module's stdout. Writes are forwarded in order.
    pub stdout: W,
    /// Bytes stdout may buffer ahead of `stdout` draining them.
    pub output_write_budget: usize,
    /// Capacity of the stderr capture buffer.
    pub max_diagnostics_bytes: usize,
}

/// Per-request execution context.
///
/// This struct holds all state specific to a single WebAssembly execution.
/// It is created for each request and dropped together with its store,
/// whether the execution finished or was cancelled.
pub struct WorkerContext {
    /// WASI preview 1 context (env, stdio).
    wasi: WasiP1Ctx,

    /// Unique request identifier for tracing.
    pub request_id: String,

    /// Captured stderr.
    diagnostics: MemoryOutputPipe,

    _instance: InstanceGuard,
}

impl WorkerContext {
    /// Get the WASI context.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Whatever the module wrote to stderr so far, lossily decoded.
    pub fn diagnostics(&self) -> String {
        String::from_utf8_lossy(&self.diagnostics.contents()).into_owned()
    }
}

/// Counts stores that are currently alive.
///
/// Every [`WorkerContext`] holds a guard; the count drops when the store is
/// dropped, which is how tests verify that cancelled executions release
/// their instance.
#[derive(Debug, Clone, Default)]
pub struct LiveInstances {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicUsize,
    created: AtomicU64,
}

impl LiveInstances {
    /// Number of stores alive right now.
    pub fn count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Number of stores ever created.
    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> InstanceGuard {
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        self.inner.created.fetch_add(1, Ordering::SeqCst);
        InstanceGuard(Arc::clone(&self.inner))
    }
}

struct InstanceGuard(Arc<Counters>);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Create a new Wasmtime store wired to the given environment.
///
/// The store yields to the async executor on every epoch tick, so a
/// deadline applied to the execution future can fire even while the guest
/// is computing.
///
/// Must be called from within a Tokio runtime: the stdio adapters spawn
/// their pump tasks on it.
pub fn create_store<R, W>(
    engine: &WasmEngine,
    env: ExecutionEnv<R, W>,
    live: &LiveInstances,
) -> Store<WorkerContext>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let diagnostics = MemoryOutputPipe::new(env.max_diagnostics_bytes);

    let mut builder = WasiCtxBuilder::new();
    builder
        .stdin(AsyncStdinStream::new(AsyncReadStream::new(env.stdin)))
        .stdout(AsyncStdoutStream::new(AsyncWriteStream::new(
            env.output_write_budget,
            env.stdout,
        )))
        .stderr(diagnostics.clone())
        .arg(&env.program_name);

    for (key, value) in &env.env {
        builder.env(key, value);
    }

    let context = WorkerContext {
        wasi: builder.build_p1(),
        request_id: env.request_id,
        diagnostics,
        _instance: live.acquire(),
    };

    let mut store = Store::new(engine.inner(), context);
    store.set_epoch_deadline(1);
    store.epoch_deadline_async_yield_and_update(1);

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_cgi_common::EngineConfig;

    fn env() -> ExecutionEnv<&'static [u8], tokio::io::Sink> {
        ExecutionEnv {
            program_name: "test".into(),
            request_id: "test-request-123".into(),
            env: vec![("REQUEST_METHOD".into(), "GET".into())],
            stdin: &[],
            stdout: tokio::io::sink(),
            output_write_budget: 1024,
            max_diagnostics_bytes: 1024,
        }
    }

    #[test]
    fn test_live_instances_counts_guards() {
        let live = LiveInstances::default();
        let a = live.acquire();
        let b = live.acquire();
        assert_eq!(live.count(), 2);

        drop(a);
        assert_eq!(live.count(), 1);
        drop(b);
        assert_eq!(live.count(), 0);
        assert_eq!(live.created(), 2);
    }

    #[tokio::test]
    async fn test_store_creation() {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            cache_compiled_modules: false,
            ..Default::default()
        })
        .unwrap();
        let live = LiveInstances::default();

        let store = create_store(&engine, env(), &live);
        assert_eq!(store.data().request_id, "test-request-123");
        assert!(store.data().diagnostics().is_empty());
        assert_eq!(live.count(), 1);

        drop(store);
        assert_eq!(live.count(), 0);
    }
}
