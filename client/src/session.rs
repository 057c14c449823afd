use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::{SinkExt, StreamExt};
use gameroom_protocol::{
    ChatData, CreateRoomData, Envelope, ErrorData, JoinRoomData, MessageType, RoomInfo,
    RoomListData, SetAvatarData,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Callback for one message tag. Runs on the listen task, outside every
/// session lock.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default)]
struct SessionState {
    player_id: Option<String>,
    current_room: Option<String>,
    rooms: Vec<RoomInfo>,
    connected: bool,
    last_error: Option<String>,
}

#[derive(Debug)]
pub(crate) enum Outgoing {
    Envelope(Envelope),
    Close,
}

struct Inner {
    state: RwLock<SessionState>,
    handlers: RwLock<HashMap<MessageType, Handler>>,
    tx: mpsc::UnboundedSender<Outgoing>,
}

/// Client end of one server connection.
///
/// Cloning is cheap and every clone drives the same link. Sends never
/// block: they queue onto a writer task and only fail once the link is
/// known to be dead. Reads happen on a background listen task which keeps
/// the cached identity, room list and current room up to date and then
/// hands each envelope to the handler registered for its tag.
#[derive(Clone)]
pub struct NetworkSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSession")
            .field("state", &*self.inner.state.read())
            .finish_non_exhaustive()
    }
}

impl NetworkSession {
    /// Dials `config.server_url`, sleeping `retry_delay` between attempts.
    /// Returns the last dial error once the attempt budget is spent.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let url = config.validate()?;
        let attempts = config.attempts();
        let mut attempt = 1;
        loop {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    info!(%url, attempt, "connected");
                    return Ok(Self::spawn(socket));
                }
                Err(source) if attempt >= attempts => {
                    warn!(%url, attempts, error = %source, "giving up");
                    return Err(ClientError::Connect { attempts, source });
                }
                Err(err) => {
                    warn!(%url, attempt, attempts, error = %err, "connection failed, retrying in {:?}", config.retry_delay);
                    tokio::time::sleep(config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn spawn(socket: Socket) -> Self {
        let (sink, source) = socket.split();
        let (session, rx) = Self::detached();
        tokio::spawn(write_loop(Arc::downgrade(&session.inner), sink, rx));
        tokio::spawn(listen(Arc::downgrade(&session.inner), source));
        session
    }

    /// A connected session whose outbound queue is handed back to the
    /// caller instead of a socket.
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            state: RwLock::new(SessionState {
                connected: true,
                ..SessionState::default()
            }),
            handlers: RwLock::new(HashMap::new()),
            tx,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    /// Replaces any handler already registered for `kind`.
    pub fn register_handler<F>(&self, kind: MessageType, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.install_handler(kind, Arc::new(handler));
    }

    pub fn unregister_handler(&self, kind: MessageType) -> bool {
        self.inner.handlers.write().remove(&kind).is_some()
    }

    pub(crate) fn install_handler(&self, kind: MessageType, handler: Handler) {
        if self.inner.handlers.write().insert(kind, handler).is_some() {
            debug!(%kind, "handler replaced");
        }
    }

    /// Removes `handler` only if it is still the one registered for `kind`.
    pub(crate) fn release_handler(&self, kind: MessageType, handler: &Handler) -> bool {
        let mut handlers = self.inner.handlers.write();
        let ours = handlers
            .get(&kind)
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(handler)));
        if ours {
            handlers.remove(&kind);
        }
        ours
    }

    pub fn create_room(&self, game_type: &str, room_name: &str) -> Result<(), ClientError> {
        let data = CreateRoomData {
            game_type: game_type.to_string(),
            room_name: room_name.to_string(),
        };
        let envelope = Envelope::new(MessageType::CreateRoom).with_data(&data)?;
        self.switching_rooms();
        self.send(envelope)
    }

    pub fn join_room(&self, room_id: &str) -> Result<(), ClientError> {
        let data = JoinRoomData {
            room_id: room_id.to_string(),
        };
        let envelope = Envelope::new(MessageType::JoinRoom).with_data(&data)?;
        self.switching_rooms();
        self.send(envelope)
    }

    /// The server drops us from our current room before it looks at the
    /// target, so the old room is gone even when the request fails.
    /// `room_created` or our own `player_joined` sets it again.
    fn switching_rooms(&self) {
        self.inner.state.write().current_room = None;
    }

    pub fn leave_room(&self) -> Result<(), ClientError> {
        self.send(Envelope::new(MessageType::LeaveRoom))?;
        self.inner.state.write().current_room = None;
        Ok(())
    }

    pub fn start_game(&self) -> Result<(), ClientError> {
        self.send(Envelope::new(MessageType::StartGame))
    }

    /// The payload is relayed to the rest of the room untouched.
    pub fn send_move<T: Serialize>(&self, mv: &T) -> Result<(), ClientError> {
        self.send(Envelope::new(MessageType::GameMove).with_data(mv)?)
    }

    pub fn set_avatar(&self, avatar: i32) -> Result<(), ClientError> {
        self.send(Envelope::new(MessageType::SetAvatar).with_data(&SetAvatarData { avatar })?)
    }

    pub fn send_chat(&self, message: &str) -> Result<(), ClientError> {
        let data = ChatData {
            message: message.to_string(),
        };
        self.send(Envelope::new(MessageType::Chat).with_data(&data)?)
    }

    /// Sends a close frame. Later sends fail with `NotConnected`.
    pub fn close(&self) {
        let was_connected = std::mem::replace(&mut self.inner.state.write().connected, false);
        if was_connected {
            info!("closing connection");
            let _ = self.inner.tx.send(Outgoing::Close);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.read().connected
    }

    pub fn player_id(&self) -> Option<String> {
        self.inner.state.read().player_id.clone()
    }

    pub fn current_room(&self) -> Option<String> {
        self.inner.state.read().current_room.clone()
    }

    /// Last room list pushed by the server.
    pub fn rooms(&self) -> Vec<RoomInfo> {
        self.inner.state.read().rooms.clone()
    }

    pub fn joinable_rooms(&self) -> Vec<RoomInfo> {
        self.inner
            .state
            .read()
            .rooms
            .iter()
            .filter(|r| r.is_joinable())
            .cloned()
            .collect()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.read().last_error.clone()
    }

    #[cfg(test)]
    pub(crate) fn deliver(&self, envelope: Envelope) {
        self.inner.handle(envelope);
    }

    fn send(&self, envelope: Envelope) -> Result<(), ClientError> {
        if !self.is_connected() {
            warn!(kind = %envelope.kind, "cannot send, not connected");
            return Err(ClientError::NotConnected);
        }
        debug!(kind = %envelope.kind, "sending");
        self.inner.tx.send(Outgoing::Envelope(envelope)).map_err(|_| {
            self.inner.state.write().connected = false;
            ClientError::NotConnected
        })
    }
}

impl Inner {
    fn handle(&self, envelope: Envelope) {
        {
            let mut state = self.state.write();
            match envelope.kind {
                MessageType::Connected => {
                    info!(player = ?envelope.player_id, "assigned player id");
                    state.player_id = envelope.player_id.clone();
                }
                MessageType::RoomList => match envelope.decode_data::<RoomListData>() {
                    Ok(list) => {
                        debug!(rooms = list.rooms.len(), "room list updated");
                        state.rooms = list.rooms;
                    }
                    Err(err) => warn!(error = %err, "unreadable room list"),
                },
                MessageType::RoomCreated | MessageType::StartGame => {
                    if envelope.room_id.is_some() {
                        state.current_room = envelope.room_id.clone();
                    }
                }
                MessageType::PlayerJoined => {
                    if envelope.player_id.is_some() && envelope.player_id == state.player_id {
                        state.current_room = envelope.room_id.clone();
                    }
                }
                MessageType::GameEnded => {
                    info!(room = ?envelope.room_id, left = ?envelope.player_id, "game ended");
                    state.current_room = None;
                }
                MessageType::Error => {
                    let text = envelope
                        .decode_data::<ErrorData>()
                        .map(|e| e.error)
                        .unwrap_or_else(|err| err.to_string());
                    warn!(error = %text, "server error");
                    state.last_error = Some(text);
                }
                _ => {}
            }
        }

        let handler = self.handlers.read().get(&envelope.kind).cloned();
        if let Some(handler) = handler {
            handler(&envelope);
        }
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.write();
        if state.connected {
            info!("disconnected from server");
        }
        state.connected = false;
    }
}

async fn write_loop(
    inner: Weak<Inner>,
    mut sink: futures::stream::SplitSink<Socket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(out) = rx.recv().await {
        let envelope = match out {
            Outgoing::Envelope(envelope) => envelope,
            Outgoing::Close => break,
        };
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(kind = %envelope.kind, error = %err, "could not encode message");
                continue;
            }
        };
        if let Err(err) = sink.send(Message::Text(text)).await {
            warn!(error = %err, "write failed");
            if let Some(inner) = inner.upgrade() {
                inner.mark_disconnected();
            }
            return;
        }
    }
    let _ = sink.close().await;
}

/// Sole detector of link death: a read error or close marks the session
/// disconnected. No reconnect is attempted.
async fn listen(inner: Weak<Inner>, mut source: futures::stream::SplitStream<Socket>) {
    while let Some(frame) = source.next().await {
        let Some(session) = inner.upgrade() else {
            return;
        };
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("dropping non-utf8 frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "read failed");
                break;
            }
        };
        match Envelope::decode(&text) {
            Ok(envelope) => session.handle(envelope),
            Err(err) => warn!(error = %err, "dropping undecodable message"),
        }
    }
    if let Some(session) = inner.upgrade() {
        session.mark_disconnected();
    }
}
