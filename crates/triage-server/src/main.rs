use anyhow::Result;
use clap::Parser;
use triage_server::{init_tracing, run_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ServerConfig::parse();
    run_server(config).await
}
