//! Request dispatch.
//!
//! [`Dispatcher`] turns one inbound request into one bounded instantiation:
//! look the module up, build a fresh execution environment, run it under a
//! deadline and classify the outcome. The dispatcher holds no mutable
//! shared state beyond an atomic instance counter, so a single instance is
//! shared by all request tasks without locking.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use wasm_cgi_common::{ExecutionConfig, RuntimeError};

use crate::engine::EpochTicker;
use crate::store::{ExecutionEnv, LiveInstances, create_store};
use crate::{ExecutionResult, InstanceRunner, ModuleRegistry, WasmEngine};

/// Upper bound on a deadline; longer timeouts are clamped to it so the
/// deadline instant cannot overflow.
const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// One inbound invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Registry name of the module to run.
    pub module: String,
    /// Name of this execution, used in logs. A UUID is generated when empty.
    pub request_id: String,
    /// Environment variables handed to the module.
    pub env: Vec<(String, String)>,
    /// Deadline override; `None` uses the configured timeout for the module.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// A request for `module` with an empty environment.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Default::default()
        }
    }
}

/// Routes requests to compiled modules and runs them.
pub struct Dispatcher {
    engine: WasmEngine,
    runner: InstanceRunner,
    registry: Arc<ModuleRegistry>,
    exec_config: ExecutionConfig,
    live: LiveInstances,
    _ticker: EpochTicker,
}

impl Dispatcher {
    /// Create a dispatcher over a frozen registry.
    ///
    /// Starts the engine's epoch ticker; it stops when the dispatcher is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if WASI cannot be linked or the ticker cannot start.
    pub fn new(
        engine: WasmEngine,
        registry: ModuleRegistry,
        exec_config: ExecutionConfig,
    ) -> Result<Self, RuntimeError> {
        let runner = InstanceRunner::new(engine.inner())?;
        let ticker = engine.start_epoch_ticker()?;

        info!(
            modules = registry.len(),
            timeout_ms = exec_config.timeout_ms,
            "Dispatcher ready"
        );

        Ok(Self {
            engine,
            runner,
            registry: Arc::new(registry),
            exec_config,
            live: LiveInstances::default(),
            _ticker: ticker,
        })
    }

    /// Get the module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Number of module instances alive right now.
    pub fn live_instances(&self) -> usize {
        self.live.count()
    }

    /// Number of module instances created since startup.
    pub fn instances_created(&self) -> u64 {
        self.live.created()
    }

    /// Run one request against its module.
    ///
    /// `input` becomes the module's stdin and every byte the module writes
    /// to stdout is forwarded to `output` in write order. The deadline is
    /// measured from the start of this call; when it expires the execution
    /// is dropped together with its store. Output already forwarded before
    /// the deadline stays forwarded, so a timed-out response may be truncated.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ModuleNotFound`] if the name is not registered; the
    ///   engine is not touched
    /// - [`RuntimeError::ExecutionTimeout`] if the deadline expires
    /// - [`RuntimeError::ModuleExecution`] if the module fails, with its
    ///   stderr as diagnostics
    #[instrument(skip_all, fields(module = %request.module, request_id))]
    pub async fn dispatch<R, W>(
        &self,
        request: ExecutionRequest,
        input: R,
        output: W,
    ) -> Result<(), RuntimeError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let start = Instant::now();

        let Some(module) = self.registry.get(&request.module) else {
            debug!("Module not registered");
            return Err(RuntimeError::module_not_found(request.module));
        };

        let timeout = request
            .timeout
            .unwrap_or_else(|| self.exec_config.timeout_for(&request.module));

        let request_id = if request.request_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.request_id
        };
        tracing::Span::current().record("request_id", request_id.as_str());

        let env = ExecutionEnv {
            program_name: request.module,
            request_id,
            env: request.env,
            stdin: input,
            stdout: output,
            output_write_budget: self.exec_config.output_write_budget,
            max_diagnostics_bytes: self.exec_config.max_diagnostics_bytes,
        };
        let mut store = create_store(&self.engine, env, &self.live);

        let deadline = tokio::time::Instant::from_std(start + timeout.min(MAX_TIMEOUT));
        let outcome =
            tokio::time::timeout_at(deadline, self.runner.execute(&module, &mut store)).await;

        let Ok(result) = outcome else {
            drop(store);
            let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(duration_ms, "Execution timed out");
            return Err(RuntimeError::ExecutionTimeout { duration_ms });
        };

        let diagnostics = store.data().diagnostics();
        let elapsed_ms = start.elapsed().as_millis();

        match result {
            Ok(ExecutionResult::Success) => {
                if !diagnostics.is_empty() {
                    debug!(stderr = %diagnostics, "Module wrote to stderr");
                }
                info!(elapsed_ms, "Dispatch completed");
                Ok(())
            }
            Ok(ExecutionResult::Exit { code }) => Err(RuntimeError::module_execution(
                Some(code),
                format!("module exited with status {code}"),
                diagnostics,
            )),
            Ok(ExecutionResult::Trap { message, code }) => {
                let message = match code {
                    Some(code) => format!("trap ({code}): {message}"),
                    None => message,
                };
                Err(RuntimeError::module_execution(None, message, diagnostics))
            }
            Err(err) => Err(with_diagnostics(err, diagnostics)),
        }
    }

    /// Run one request with an in-memory body and collect the full output.
    ///
    /// The output is drained concurrently through a pipe, so the module's
    /// writes never wait on this call finishing. On error any partial output
    /// is discarded.
    pub async fn dispatch_to_vec(
        &self,
        request: ExecutionRequest,
        body: Bytes,
    ) -> Result<Vec<u8>, RuntimeError> {
        let (writer, mut reader) = tokio::io::duplex(self.exec_config.output_write_budget.max(1));

        let collector = tokio::spawn(async move {
            let mut output = Vec::new();
            reader.read_to_end(&mut output).await.map(|_| output)
        });

        if let Err(err) = self.dispatch(request, Cursor::new(body), writer).await {
            collector.abort();
            return Err(err);
        }

        collector
            .await
            .map_err(|e| RuntimeError::Io(std::io::Error::other(e)))?
            .map_err(RuntimeError::Io)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("live_instances", &self.live.count())
            .finish_non_exhaustive()
    }
}

/// Attach captured stderr to a module failure.
fn with_diagnostics(err: RuntimeError, diagnostics: String) -> RuntimeError {
    match err {
        RuntimeError::ModuleExecution {
            exit_code, message, ..
        } => RuntimeError::ModuleExecution {
            exit_code,
            message,
            diagnostics,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_cgi_common::EngineConfig;

    fn dispatcher() -> Dispatcher {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            cache_compiled_modules: false,
            ..Default::default()
        })
        .unwrap();
        let mut builder = ModuleRegistry::builder(&engine);
        builder
            .add_wat("noop", r#"(module (func (export "_start")))"#)
            .unwrap();
        Dispatcher::new(engine, builder.build(), ExecutionConfig::default()).unwrap()
    }

    #[test]
    fn test_execution_request_new() {
        let request = ExecutionRequest::new("echo");
        assert_eq!(request.module, "echo");
        assert!(request.request_id.is_empty());
        assert!(request.env.is_empty());
        assert!(request.timeout.is_none());
    }

    #[test]
    fn test_with_diagnostics() {
        let err = with_diagnostics(
            RuntimeError::module_execution(None, "Instantiation failed", ""),
            "stderr text".into(),
        );
        match err {
            RuntimeError::ModuleExecution { diagnostics, .. } => {
                assert_eq!(diagnostics, "stderr text");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = with_diagnostics(RuntimeError::module_not_found("x"), "ignored".into());
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_dispatch_noop() {
        let dispatcher = dispatcher();
        let output = dispatcher
            .dispatch_to_vec(ExecutionRequest::new("noop"), Bytes::new())
            .await
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(dispatcher.instances_created(), 1);
        assert_eq!(dispatcher.live_instances(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_unbounded_timeout() {
        let dispatcher = dispatcher();
        let request = ExecutionRequest {
            timeout: Some(Duration::MAX),
            ..ExecutionRequest::new("noop")
        };

        let output = dispatcher
            .dispatch_to_vec(request, Bytes::new())
            .await
            .unwrap();

        assert!(output.is_empty());
        assert_eq!(dispatcher.live_instances(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_module() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .dispatch_to_vec(ExecutionRequest::new("missing"), Bytes::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(dispatcher.instances_created(), 0);
    }
}
