//! WebAssembly instance lifecycle management.
//!
//! This module provides [`InstanceRunner`], which handles one run of a WASI
//! command module:
//!
//! 1. Link WASI preview 1 imports
//! 2. Instantiate the module into a fresh store
//! 3. Call the `_start` entry point
//! 4. Classify the outcome (normal return, `proc_exit`, trap)

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use wasmtime::{Engine, Linker, Store, Trap};
use wasmtime_wasi::I32Exit;

use crate::CompiledModule;
use crate::module::ENTRY_POINT;
use crate::store::WorkerContext;
use wasm_cgi_common::RuntimeError;

/// Result of executing a WebAssembly module to completion.
#[derive(Debug)]
pub enum ExecutionResult {
    /// `_start` returned, or the module called `proc_exit(0)`.
    Success,

    /// The module called `proc_exit` with a non-zero status.
    Exit {
        /// The exit status.
        code: i32,
    },

    /// Execution stopped on a trap (runtime error).
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },
}

/// Instance lifecycle manager.
///
/// Holds the linker with WASI preview 1 registered. Linking is done once and
/// shared; every execution uses its own [`Store`], so instances never share
/// memory, globals or file descriptors.
pub struct InstanceRunner {
    linker: Linker<WorkerContext>,
}

impl InstanceRunner {
    /// Create a new instance runner with WASI preview 1 linked.
    ///
    /// # Errors
    ///
    /// Returns an error if the WASI imports cannot be registered.
    pub fn new(engine: &Engine) -> Result<Self, RuntimeError> {
        let mut linker = Linker::new(engine);

        wasmtime_wasi::preview1::add_to_linker_async(&mut linker, |ctx: &mut WorkerContext| {
            ctx.wasi_mut()
        })
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to link WASI: {e}")))?;

        Ok(Self { linker })
    }

    /// Instantiate `module` into `store` and run its entry point.
    ///
    /// Dropping the returned future cancels the execution; the caller must
    /// then drop the store as well.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ModuleExecution`] if the module cannot be
    /// instantiated or has no entry point. Failures while running are
    /// reported through [`ExecutionResult`].
    #[instrument(skip(self, module, store), fields(request_id = %store.data().request_id))]
    pub async fn execute(
        &self,
        module: &CompiledModule,
        store: &mut Store<WorkerContext>,
    ) -> Result<ExecutionResult, RuntimeError> {
        let start = Instant::now();

        debug!("Instantiating module");

        let instance = self
            .linker
            .instantiate_async(&mut *store, module.module())
            .await
            .map_err(|e| {
                RuntimeError::module_execution(None, format!("Instantiation failed: {e}"), "")
            })?;

        let func = instance
            .get_typed_func::<(), ()>(&mut *store, ENTRY_POINT)
            .map_err(|_| {
                RuntimeError::module_execution(
                    None,
                    format!("Entry point '{ENTRY_POINT}' not found"),
                    "",
                )
            })?;

        debug!("Executing entry point");

        let result = func.call_async(&mut *store, ()).await;
        let duration = start.elapsed();

        match result {
            Ok(()) => {
                info!(duration_ms = duration.as_millis(), "Execution completed");
                Ok(ExecutionResult::Success)
            }
            Err(err) => {
                if let Some(exit) = err.downcast_ref::<I32Exit>() {
                    if exit.0 == 0 {
                        info!(duration_ms = duration.as_millis(), "Execution exited cleanly");
                        return Ok(ExecutionResult::Success);
                    }

                    warn!(
                        duration_ms = duration.as_millis(),
                        exit_code = exit.0,
                        "Module exited with failure status"
                    );
                    return Ok(ExecutionResult::Exit { code: exit.0 });
                }

                let (message, code) = extract_trap_info(&err);

                warn!(
                    duration_ms = duration.as_millis(),
                    trap_message = %message,
                    "Execution trapped"
                );

                Ok(ExecutionResult::Trap { message, code })
            }
        }
    }
}

/// Extract human-readable trap information.
fn extract_trap_info(error: &wasmtime::Error) -> (String, Option<String>) {
    let message = error.to_string();
    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));

    (message, code)
}

impl std::fmt::Debug for InstanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRunner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use crate::store::{ExecutionEnv, LiveInstances, create_store};
    use wasm_cgi_common::EngineConfig;

    async fn run(wat: &str) -> Result<ExecutionResult, RuntimeError> {
        let engine = WasmEngine::new(&EngineConfig {
            pooling_allocator: false,
            cache_compiled_modules: false,
            ..Default::default()
        })
        .unwrap();
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        let runner = InstanceRunner::new(engine.inner()).unwrap();

        let env = ExecutionEnv {
            program_name: "test".into(),
            request_id: "test-request".into(),
            env: Vec::new(),
            stdin: &b""[..],
            stdout: tokio::io::sink(),
            output_write_budget: 1024,
            max_diagnostics_bytes: 1024,
        };
        let mut store = create_store(&engine, env, &LiveInstances::default());

        let _ticker = engine.start_epoch_ticker().unwrap();
        runner.execute(&module, &mut store).await
    }

    fn exit_wat(code: i32) -> String {
        format!(
            r#"(module
                (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
                (func (export "_start") (call $exit (i32.const {code}))))"#
        )
    }

    #[tokio::test]
    async fn test_return_is_success() {
        let result = run(r#"(module (func (export "_start")))"#).await.unwrap();
        assert!(matches!(result, ExecutionResult::Success));
    }

    #[tokio::test]
    async fn test_exit_status() {
        let result = run(&exit_wat(0)).await.unwrap();
        assert!(matches!(result, ExecutionResult::Success));

        let result = run(&exit_wat(7)).await.unwrap();
        assert!(matches!(result, ExecutionResult::Exit { code: 7 }));
    }

    #[tokio::test]
    async fn test_trap_carries_code() {
        let result = run(r#"(module (func (export "_start") unreachable))"#)
            .await
            .unwrap();

        match result {
            ExecutionResult::Trap { code, .. } => {
                assert_eq!(code.as_deref(), Some("UnreachableCodeReached"));
            }
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let err = run("(module)").await.unwrap_err();
        assert!(matches!(err, RuntimeError::ModuleExecution { exit_code: None, .. }));
    }
}
