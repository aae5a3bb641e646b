//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! holding the compiled machine code for one module artifact. A module is
//! compiled once at startup and then instantiated for every request.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, Module};

use wasm_cgi_common::RuntimeError;

/// Entry point every WASI command module exports.
pub const ENTRY_POINT: &str = "_start";

/// A compiled WebAssembly module.
///
/// # Thread Safety
///
/// `CompiledModule` is thread-safe; cloning it shares the compiled code.
/// Every instantiation still gets its own memory, globals and tables.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    module: Module,

    /// Hash of the original Wasm bytes.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// With the engine's compilation cache enabled, identical bytes are
    /// served from the cache instead of being recompiled.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails (e.g., invalid Wasm).
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Compile a core module from WAT (WebAssembly Text Format).
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat).map_err(|e| {
            RuntimeError::compilation_failed(format!("WAT compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(wat.as_bytes());

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Whether the module exports the WASI command entry point.
    pub fn is_command(&self) -> bool {
        self.module.get_export(ENTRY_POINT).is_some()
    }

    /// Get the inner Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("is_command", &self.is_command())
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
