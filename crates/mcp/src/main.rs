use std::{env, io, sync::Arc};

use anyhow::Result;
use clap::Parser;

use p4_mcp::{client::HttpGateway, tools, McpServer, ToolRegistry};

const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";

#[derive(Parser, Debug)]
#[command(name = "p4-mcp-server", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Base URL of the REST gateway (falls back to P4_GATEWAY_URL)
    #[arg(long = "gateway-url", value_name = "URL")]
    gateway_url: Option<String>,

    /// Optional log filter (e.g. info, debug)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let base_url = args
        .gateway_url
        .or_else(|| env::var("P4_GATEWAY_URL").ok())
        .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

    tracing::info!(gateway = %base_url, "starting MCP adapter on stdio");

    let gateway = Arc::new(HttpGateway::new(base_url).map_err(|err| anyhow::anyhow!("{err}"))?);
    let registry = ToolRegistry::new(tools::default_tools(gateway));
    let server = McpServer::new(registry);

    server.serve_stdio().await
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
