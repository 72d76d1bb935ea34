use std::{env, io, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use p4_gateway::{
    build_router,
    config::{self, RuntimeMode},
    rate_limit::ClientRateLimiter,
    AppState,
};
use p4_runner::{CliRunner, P4Config};

#[derive(Parser, Debug)]
#[command(name = "p4-gateway", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Host binding for the HTTP server
    #[arg(long = "host", value_name = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port binding (falls back to GATEWAY_PORT, then 3000)
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Optional log filter (e.g. info, debug)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Backend CLI binary to invoke (overrides P4_BIN)
    #[arg(long = "p4-bin", value_name = "BINARY")]
    p4_bin: Option<String>,

    /// Working directory for backend commands (overrides P4_WORKSPACE_ROOT)
    #[arg(long = "workspace-root", value_name = "PATH")]
    workspace_root: Option<PathBuf>,

    /// Development mode: forward internal error detail to clients
    #[arg(long = "dev")]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let mut p4_config = P4Config::from_env();
    if let Some(binary) = &args.p4_bin {
        p4_config = p4_config.with_binary(binary);
    }
    if let Some(root) = &args.workspace_root {
        let canonical = root.canonicalize().with_context(|| {
            format!("Failed to canonicalize workspace root: {}", root.display())
        })?;
        p4_config = p4_config.with_workspace_root(canonical);
    }

    tracing::info!("backend connection: {}", p4_config.redacted_summary());

    let mode = if args.dev {
        RuntimeMode::Development
    } else {
        RuntimeMode::from_env()
    };
    let port = args
        .port
        .or_else(config::port_from_env)
        .unwrap_or(config::DEFAULT_PORT);

    let state = AppState::new(
        Arc::new(CliRunner::new(p4_config)),
        mode,
        ClientRateLimiter::default(),
    );
    let router = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.host, port))?;

    tracing::info!("gateway listening on {addr} ({mode:?} mode)");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {addr}"))?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("gateway encountered an unrecoverable error")?;

    Ok(())
}

fn init_tracing(args: &Args) {
    if let Some(level) = &args.log_level {
        env::set_var("RUST_LOG", level);
    }

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr);

    let _ = builder.try_init();
}
