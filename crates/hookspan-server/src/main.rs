//! hookspan-server: ping server with request lifecycle tracing
//!
//! Run `hookspan-server init` to write a `.hookspan/config.toml`, then
//! `hookspan-server` (or `hookspan-server serve`) to start the server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookspan::TracingPlugin;
use hookspan_server::config::{CONFIG_FILE, Config, DEFAULT_CONFIG, HOOKSPAN_DIR};
use hookspan_server::session::{self, SessionId, SessionMetadata};
use hookspan_server::{PingServer, ServerConfig};
use tokio::signal;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Ping server with request lifecycle tracing
#[derive(Parser)]
#[command(name = "hookspan-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .hookspan directory (default: search for .hookspan/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to daily rotated files in this directory instead of stderr
    #[arg(long, global = true, env = "HOOKSPAN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ping server (default)
    Serve {
        /// Host to bind to (default: server.host from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Initialize a new .hookspan directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging to stderr, or to rotating files when `log_dir` is set.
fn init_logging(verbose: bool, log_dir: Option<&Path>) {
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter(verbose))
            .init();
        return;
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose, None);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "hookspan.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard would stop the writer thread
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(env_filter(verbose))
        .init();
}

/// Load configuration from an explicit path or by searching upwards.
///
/// Returns the config and the `.hookspan` directory, if one was found.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        // Explicit path override - a .hookspan directory or the file itself
        let config_file = if path.is_dir() {
            path.join(CONFIG_FILE)
        } else {
            path.clone()
        };
        let hookspan_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.clone());

        let config = Config::from_file(&config_file)?;
        info!("Loaded config from {}", config_file.display());
        return Ok((config, Some(hookspan_dir)));
    }

    match Config::find_and_load() {
        Ok(Some((config, hookspan_dir))) => {
            info!("Found config at {}", hookspan_dir.display());
            Ok((config, Some(hookspan_dir)))
        }
        Ok(None) => {
            tracing::debug!("No .hookspan/config.toml found, using defaults");
            Ok((Config::default(), None))
        }
        Err(e) => {
            tracing::warn!("Error searching for config: {}, using defaults", e);
            Ok((Config::default(), None))
        }
    }
}

async fn serve(config_path: Option<&PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let (config, config_dir) = load_config(config_path)?;

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("Invalid configuration: {}", error);
        }
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }

    let hookspan_dir = config_dir.unwrap_or_else(|| PathBuf::from(HOOKSPAN_DIR));

    let session_id = SessionId::generate();
    let session_dir = session::session_dir(&hookspan_dir, &session_id);
    std::fs::create_dir_all(&session_dir).with_context(|| {
        format!("Failed to create session directory: {}", session_dir.display())
    })?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}:{}", host, port))?;

    let plugin_config = config.plugin_config(&hookspan_dir, &session_dir);
    let service_name = plugin_config
        .tracer
        .service_name
        .clone()
        .unwrap_or_default();
    let mut metadata = SessionMetadata::new(&session_id, service_name, addr);
    if let Some(path) = &plugin_config.tracer.reporter.trace_path {
        metadata = metadata.with_trace_path(path);
    }
    session::write_metadata(&session_dir, &metadata)?;
    info!("Session: {} -> {}", session_id, session_dir.display());

    let plugin = Arc::new(TracingPlugin::register(plugin_config)?);
    let server = PingServer::new(
        ServerConfig {
            bind_addr: addr,
            enable_http_trace: config.server.enable_http_trace,
        },
        plugin,
    );

    server.run_with_shutdown(shutdown_signal()).await?;
    info!("Ping server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt, shutting down..."),
        Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
    }
}

fn init(force: bool) -> Result<()> {
    let hookspan_dir = PathBuf::from(HOOKSPAN_DIR);
    let config_path = Config::config_path(&hookspan_dir);

    if config_path.exists() && !force {
        anyhow::bail!(".hookspan/config.toml already exists. Use --force to overwrite.");
    }

    if !hookspan_dir.exists() {
        std::fs::create_dir_all(&hookspan_dir)?;
        info!("Created {}/", hookspan_dir.display());
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    info!("Created {}", config_path.display());
    info!("Next steps:");
    info!("  1. Edit .hookspan/config.toml to name your service");
    info!("  2. Run 'hookspan-server serve' and curl http://127.0.0.1:3100/hello");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_dir.as_deref());

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    match command {
        Commands::Serve { host, port } => serve(cli.config.as_ref(), host, port).await,
        Commands::Init { force } => init(force),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["hookspan-server", "--verbose"]);
        assert!(cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["hookspan-server", "serve", "--port", "0", "--host", "0.0.0.0"]);
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(0));
            }
            _ => panic!("expected serve"),
        }
    }
}
