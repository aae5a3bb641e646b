//! Error types for wasm-cgi.
//!
//! [`RuntimeError`] covers both phases of the process lifetime:
//! - Startup errors (discovery, reading, compiling modules). These are fatal:
//!   the server must not start serving with an incomplete registry.
//! - Request errors (unknown module, timeout, failed module). These terminate
//!   only the offending request.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The module search could not run (missing root, permission denied, ...).
    #[error("Module discovery failed under {}: {reason}", root.display())]
    Discovery {
        /// The search root.
        root: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The module search ran but matched nothing.
    #[error("No modules found under {}", root.display())]
    NoModulesFound {
        /// The search root.
        root: PathBuf,
    },

    /// A discovered artifact could not be read.
    #[error("Failed to read module artifact {}: {source}", path.display())]
    ArtifactRead {
        /// Path of the artifact.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Two artifacts resolved to the same module name.
    #[error(
        "Duplicate module name '{name}': {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateModule {
        /// The conflicting module name.
        name: String,
        /// Path of the artifact registered first.
        first: PathBuf,
        /// Path of the conflicting artifact.
        second: PathBuf,
    },

    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The requested module is not in the registry.
    #[error("Module not found: {module_id}")]
    ModuleNotFound {
        /// The identifier of the module that was not found.
        module_id: String,
    },

    /// Execution exceeded its deadline and was aborted.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// The module ran and reported failure (non-zero exit, trap, failed link).
    #[error("Module execution failed: {message}")]
    ModuleExecution {
        /// Exit code passed to `proc_exit`, if the module exited explicitly.
        exit_code: Option<i32>,
        /// Description of the failure.
        message: String,
        /// Whatever the module wrote to stderr.
        diagnostics: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module_id: module_id.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `Discovery` error.
    pub fn discovery(root: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Discovery {
            root: root.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleExecution` error.
    pub fn module_execution(
        exit_code: Option<i32>,
        message: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::ModuleExecution {
            exit_code,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the module was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }

    /// Returns `true` if the execution was aborted at its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ExecutionTimeout { .. })
    }

    /// Returns `true` for errors that can only occur while building the registry.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. }
                | Self::NoModulesFound { .. }
                | Self::ArtifactRead { .. }
                | Self::DuplicateModule { .. }
                | Self::CompilationFailed { .. }
        )
    }
}
