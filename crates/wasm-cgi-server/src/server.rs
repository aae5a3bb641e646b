//! HTTP server implementation.
//!
//! This module provides the main [`CgiServer`] struct for serving modules
//! over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use wasm_cgi_common::{RuntimeError, ServerConfigFile};
use wasm_cgi_core::Dispatcher;

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server.
    pub bind_addr: SocketAddr,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable graceful shutdown on SIGTERM/SIGINT.
    pub graceful_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout_secs: 30,
            graceful_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` section of a config file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if `host:port` is not a socket address.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, RuntimeError> {
        let bind_addr = file.bind_addr().parse().map_err(|e| {
            RuntimeError::invalid_config(format!(
                "Invalid bind address '{}': {e}",
                file.bind_addr()
            ))
        })?;

        Ok(Self {
            bind_addr,
            request_timeout_secs: file.request_timeout_secs,
            graceful_shutdown: file.graceful_shutdown,
        })
    }

    /// Create a new server config with a custom port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Get the request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// wasm-cgi HTTP server.
///
/// The registry behind the dispatcher is complete before the server is
/// constructed, so the listener only opens once every module is compiled.
///
/// # Example
///
/// ```ignore
/// use wasm_cgi_core::{Dispatcher, ModuleRegistry, WasmEngine, discover};
/// use wasm_cgi_server::{CgiServer, ServerConfig};
///
/// let engine = WasmEngine::new(&config.engine)?;
/// let artifacts = discover("modules", "main.wasm")?;
/// let registry = ModuleRegistry::from_artifacts(&engine, &artifacts)?;
/// let dispatcher = Dispatcher::new(engine, registry, config.execution)?;
///
/// CgiServer::new(dispatcher, ServerConfig::default()).run().await?;
/// ```
pub struct CgiServer {
    /// Application state.
    state: AppState,
    /// Server configuration.
    config: ServerConfig,
}

impl CgiServer {
    /// Create a new server over a ready dispatcher.
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(dispatcher),
            config,
        }
    }

    /// Run the server until shutdown.
    ///
    /// This will block until the server is shut down via signal
    /// (SIGTERM/SIGINT) if graceful shutdown is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(self) -> Result<(), RuntimeError> {
        let app = build_router(self.state, self.config.request_timeout());

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| {
                RuntimeError::invalid_config(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_addr
                ))
            })?;

        info!(addr = %self.config.bind_addr, "Starting HTTP server");

        if self.config.graceful_shutdown {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        } else {
            axum::serve(listener, app).await?;
        }

        info!("Server shutdown complete");
        Ok(())
    }

    /// Start the server and return a handle for testing.
    ///
    /// The server binds to an ephemeral port (127.0.0.1:0) and
    /// returns a handle that can be used to get the actual address
    /// and shut down the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_test(dispatcher: Dispatcher) -> Result<TestHandle, RuntimeError> {
        let state = AppState::from_arc(Arc::new(dispatcher));
        let app = build_router(state.clone(), ServerConfig::default().request_timeout());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(TestHandle {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// Handle for a test server instance.
pub struct TestHandle {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestHandle {
    /// Get the server URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Shutdown the server gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
