use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::fmt::Display;

use futures::{Sink, SinkExt, Stream, StreamExt};
use gameroom_protocol::Envelope;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::player::PlayerId;

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/", get(banner))
        .with_state(dispatcher)
}

async fn banner() -> &'static str {
    "Game server is running. Use a game client to connect."
}

async fn ws_handler(ws: WebSocketUpgrade, State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher))
}

/// Removes the player from the registry when the link ends, however it
/// ends.
struct DisconnectGuard {
    dispatcher: Dispatcher,
    player_id: PlayerId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.dispatcher.disconnect(&self.player_id);
    }
}

async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher) {
    let (sender, receiver) = socket.split();
    serve_link(dispatcher, sender, receiver).await;
}

/// Drives one player's link until either half gives out. A failed write
/// is a disconnect just like a failed read.
pub(crate) async fn serve_link<W, R, E>(dispatcher: Dispatcher, sender: W, receiver: R)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx_out, rx_out) = mpsc::unbounded_channel::<Envelope>();
    let player_id = dispatcher.connect(tx_out);
    let _guard = DisconnectGuard {
        dispatcher: dispatcher.clone(),
        player_id: player_id.clone(),
    };

    tokio::select! {
        _ = write_loop(&player_id, sender, rx_out) => {}
        _ = read_loop(&dispatcher, &player_id, receiver) => {}
    }
}

async fn write_loop<W>(player_id: &str, mut sender: W, mut rx_out: mpsc::UnboundedReceiver<Envelope>)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(envelope) = rx_out.recv().await {
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(player = %player_id, error = %err, "could not encode outbound message");
                continue;
            }
        };
        if let Err(err) = sender.send(Message::Text(text)).await {
            debug!(player = %player_id, error = %err, "write failed");
            return;
        }
    }
    let _ = sender.close().await;
}

async fn read_loop<R, E>(dispatcher: &Dispatcher, player_id: &str, mut receiver: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatcher.dispatch_text(player_id, &text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatcher.dispatch_text(player_id, text),
                Err(_) => dispatcher.reject(player_id, &DispatchError::InvalidMessage),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(player = %player_id, error = %err, "read failed");
                break;
            }
        }
    }
}
