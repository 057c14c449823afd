use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod player;
pub mod registry;
pub mod room;
pub mod ws;


pub use config::{init_tracing, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use registry::{Outbox, Registry};

/// Serves until the listener fails. All state lives in `dispatcher` and is
/// gone when the process exits.
pub async fn serve(listener: TcpListener, dispatcher: Dispatcher) -> std::io::Result<()> {
    axum::serve(listener, ws::router(dispatcher)).await
}

pub async fn run(config: &ServerConfig) -> anyhow::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(addr).await?;
    info!("server listening on ws://{addr}/ws");
    serve(listener, Dispatcher::new()).await?;
    Ok(())
}

/// Binds `addr` (port 0 picks a free one) and serves in the background.
/// Returns the bound address.
pub async fn start(addr: SocketAddr) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(err) = serve(listener, Dispatcher::new()).await {
            error!(error = %err, "server stopped");
        }
    });
    info!("server listening on ws://{local}/ws");
    Ok((local, handle))
}
