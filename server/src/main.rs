use anyhow::Result;
use clap::Parser;
use gameroom_server::{init_tracing, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(&config.log_level);
    gameroom_server::run(&config).await
}
