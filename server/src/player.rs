use gameroom_protocol::{avatar_name, Envelope, PlayerInfo, AVATAR_NAMES, DEFAULT_AVATAR};
use tokio::sync::mpsc;
use tracing::debug;

use crate::room::RoomId;

pub type PlayerId = String;

/// Outbound half of a player's transport. Every clone feeds the same
/// queue, and a single writer task drains it onto the socket, so two
/// broadcasts can never interleave on the wire.
#[derive(Debug, Clone)]
pub struct PlayerLink {
    player_id: PlayerId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl PlayerLink {
    pub fn new(player_id: PlayerId, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { player_id, tx }
    }

    /// Queues without blocking. Returns false once the writer is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        match self.tx.send(envelope) {
            Ok(()) => true,
            Err(err) => {
                debug!(player = %self.player_id, kind = %err.0.kind, "dropped message for closed link");
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: i32,
    pub link: PlayerLink,
    pub room: Option<RoomId>,
}

impl Player {
    pub fn new(id: PlayerId, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            link: PlayerLink::new(id.clone(), tx),
            id,
            name: AVATAR_NAMES[0].to_string(),
            avatar: DEFAULT_AVATAR,
            room: None,
        }
    }

    /// Out-of-range indices are stored but keep the current name.
    pub fn set_avatar(&mut self, avatar: i32) {
        self.avatar = avatar;
        if let Some(name) = avatar_name(avatar) {
            self.name = name.to_string();
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar,
        }
    }
}
