use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gameroom_client::{ClientConfig, NetworkSession};
use gameroom_server::{init_tracing, ServerConfig};
use tracing::info;

mod console;

#[derive(Parser)]
#[command(name = "gameroom")]
#[command(about = "Game room - server and console client launcher")]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a server and a console client attached to it
    Both {
        /// Port for the server
        #[arg(short, long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run only the server
    Server {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
        /// Port for the server
        #[arg(short, long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run only a console client
    Client(ClientArgs),
}

#[derive(Args)]
struct ClientArgs {
    /// Server WebSocket URL; defaults to GAMEROOM_SERVER_URL or localhost
    #[arg(long)]
    url: Option<String>,
    /// Dial attempts before giving up
    #[arg(long)]
    retries: Option<u32>,
    /// Seconds between dial attempts
    #[arg(long)]
    retry_delay: Option<u64>,
}

impl ClientArgs {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.url {
            config.server_url = url.clone();
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(secs) = self.retry_delay {
            config.retry_delay = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Both { port } => run_both(port).await,
        Commands::Server { bind, port } => {
            let config = ServerConfig {
                bind,
                port,
                log_level: cli.log_level,
            };
            gameroom_server::run(&config).await
        }
        Commands::Client(args) => run_client(args.config()).await,
    }
}

async fn run_both(port: u16) -> anyhow::Result<()> {
    println!("🚀 Starting game room server + console client on port {port}");
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let (addr, _server) = gameroom_server::start(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!(%addr, "embedded server up");

    run_client(ClientConfig::new(format!("ws://{addr}/ws"))).await
}

async fn run_client(config: ClientConfig) -> anyhow::Result<()> {
    println!("🔗 Connecting to {}...", config.server_url);
    let session = NetworkSession::connect(&config)
        .await
        .with_context(|| format!("could not connect to {}", config.server_url))?;
    println!("✅ Connected to server!");
    console::run(session).await
}
