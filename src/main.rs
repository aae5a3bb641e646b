//! wasm-cgi CLI entry point.
//!
//! Discovers and compiles every module under the modules directory, then
//! serves them over HTTP. Any startup failure exits non-zero before the
//! listener opens.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasm_cgi_common::ConfigFile;
use wasm_cgi_core::{Dispatcher, ModuleRegistry, WasmEngine, discover};
use wasm_cgi_server::{CgiServer, ServerConfig};

/// Serve precompiled WASI modules CGI-style: `GET /{module}`.
#[derive(Debug, Parser)]
#[command(name = "wasm-cgi", version, about)]
struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory searched for `<name>/main.wasm` artifacts [default: modules]
    #[arg(long, env = "MODULES_DIR")]
    modules_dir: Option<PathBuf>,

    /// Optional TOML configuration file; flags above take precedence
    #[arg(long, env = "WASM_CGI_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wasm_cgi=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wasm-cgi");

    let config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let modules_dir = cli
        .modules_dir
        .unwrap_or_else(|| PathBuf::from(&config.modules.root));

    let mut server_config =
        ServerConfig::from_file(&config.server).context("Invalid [server] configuration")?;
    if let Some(port) = cli.port {
        server_config = server_config.with_port(port);
    }

    let engine = WasmEngine::new(&config.runtime.engine).context("Failed to create engine")?;

    let artifacts = discover(&modules_dir, &config.modules.artifact_name)
        .with_context(|| format!("Failed to discover modules in {}", modules_dir.display()))?;

    let registry = ModuleRegistry::from_artifacts(&engine, &artifacts)
        .context("Failed to build module registry")?;

    info!(
        modules = ?registry.names(),
        bind_addr = %server_config.bind_addr,
        "Configuration loaded"
    );

    let dispatcher = Dispatcher::new(engine, registry, config.runtime.execution)
        .context("Failed to start dispatcher")?;

    info!("Server initialized. Available endpoints:");
    info!("  GET  /:module     - Run a module (body -> stdin, stdout -> response)");
    info!("  GET  /-/health    - Health check");
    info!("  GET  /-/ready     - Readiness check");
    info!("  GET  /-/modules   - List registered modules");

    CgiServer::new(dispatcher, server_config)
        .run()
        .await
        .context("Server error")?;

    Ok(())
}
