use std::sync::Arc;

use chrono::Utc;
use gameroom_protocol::{
    CreateRoomData, Envelope, JoinRoomData, MessageType, ProtocolError, SetAvatarData,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::player::PlayerId;
use crate::registry::{Outbox, Registry};

/// Routes inbound envelopes to registry handlers. Each handler runs under
/// the registry lock and only queues messages; they are written out after
/// the lock is dropped so a slow client never stalls anyone else.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Arc<Mutex<Registry>> {
        &self.registry
    }

    pub fn connect(&self, tx: mpsc::UnboundedSender<Envelope>) -> PlayerId {
        let mut outbox = Outbox::new();
        let id = self.registry.lock().connect(tx, &mut outbox);
        outbox.flush();
        id
    }

    /// Safe to call more than once for the same id.
    pub fn disconnect(&self, player_id: &str) {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock();
            if let Err(err) = registry.disconnect(player_id, &mut outbox) {
                warn!(player = %player_id, error = %err, "disconnect cleanup incomplete");
            }
        }
        outbox.flush();
    }

    /// Entry point for one text frame off the socket.
    pub fn dispatch_text(&self, player_id: &str, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => self.dispatch(player_id, envelope),
            Err(err) => {
                debug!(player = %player_id, error = %err, "undecodable frame");
                let reply = match err {
                    ProtocolError::UnknownType(_) => DispatchError::UnknownMessageType,
                    _ => DispatchError::InvalidMessage,
                };
                self.reject(player_id, &reply);
            }
        }
    }

    pub fn dispatch(&self, player_id: &str, mut envelope: Envelope) {
        envelope.player_id = Some(player_id.to_string());
        envelope.timestamp = Utc::now();
        let kind = envelope.kind;
        debug!(player = %player_id, %kind, "received");

        self.with_registry(player_id, move |registry, out| match kind {
            MessageType::CreateRoom => {
                let data: CreateRoomData = envelope
                    .decode_data()
                    .map_err(|_| DispatchError::InvalidPayload("Invalid create room data"))?;
                registry
                    .create_room(player_id, &data.game_type, &data.room_name, out)
                    .map(drop)
            }
            MessageType::JoinRoom => {
                let data: JoinRoomData = envelope
                    .decode_data()
                    .map_err(|_| DispatchError::InvalidPayload("Invalid join room data"))?;
                registry.join_room(player_id, &data.room_id, out).map(drop)
            }
            MessageType::LeaveRoom => registry.leave_room(player_id, out),
            MessageType::StartGame => registry.start_game(player_id, out),
            MessageType::GameMove => registry.relay_move(player_id, envelope, out).map(drop),
            MessageType::Chat => registry.chat(player_id, envelope, out),
            MessageType::SetAvatar => {
                let data: SetAvatarData = envelope
                    .decode_data()
                    .map_err(|_| DispatchError::InvalidPayload("Invalid avatar data"))?;
                registry.set_avatar(player_id, data.avatar, out)
            }
            MessageType::Connected
            | MessageType::RoomList
            | MessageType::RoomCreated
            | MessageType::PlayerJoined
            | MessageType::PlayerLeft
            | MessageType::PlayerUpdate
            | MessageType::GameEnded
            | MessageType::Error => Err(DispatchError::UnknownMessageType),
        });
    }

    /// Answers the requester with an error without touching any state.
    pub fn reject(&self, player_id: &str, err: &DispatchError) {
        self.with_registry(player_id, |registry, out| {
            registry.send_error(player_id, err, out);
            Ok(())
        });
    }

    /// Runs one mutation under the lock; a failure is answered to the
    /// requester alone and never broadcast.
    fn with_registry<F>(&self, player_id: &str, f: F)
    where
        F: FnOnce(&mut Registry, &mut Outbox) -> Result<(), DispatchError>,
    {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock();
            if let Err(err) = f(&mut registry, &mut outbox) {
                warn!(player = %player_id, error = %err, "request rejected");
                registry.send_error(player_id, &err, &mut outbox);
            }
        }
        outbox.flush();
    }
}
