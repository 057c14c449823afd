use std::collections::HashMap;

use gameroom_protocol::{
    ChatData, Envelope, MessageType, PlayerUpdateData, RoomListData, StartGameData,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::player::{Player, PlayerId, PlayerLink};
use crate::room::{Room, RoomId};

/// Messages produced while the registry lock is held. They are only
/// written to player links by `flush`, after the lock is released.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<(PlayerLink, Envelope)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, link: &PlayerLink, envelope: Envelope) {
        self.deliveries.push((link.clone(), envelope));
    }

    pub fn flush(self) {
        for (link, envelope) in self.deliveries {
            link.send(envelope);
        }
    }
}

/// Authoritative in-memory store of players and rooms. Rooms refer to
/// players by id; every departure goes through `remove_from_room`.
#[derive(Debug, Default)]
pub struct Registry {
    players: HashMap<PlayerId, Player>,
    rooms: HashMap<RoomId, Room>,
    next_room_seq: u64,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Snapshot of every live room in creation order.
    pub fn room_list(&self) -> RoomListData {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by_key(|r| r.created_seq);
        RoomListData {
            rooms: rooms.into_iter().map(Room::info).collect(),
        }
    }

    pub fn connect(&mut self, tx: mpsc::UnboundedSender<Envelope>, out: &mut Outbox) -> PlayerId {
        let id = new_id();
        let player = Player::new(id.clone(), tx);
        out.push(
            &player.link,
            Envelope::new(MessageType::Connected).with_player(&id),
        );
        self.players.insert(id.clone(), player);
        info!(player = %id, online = self.players.len(), "player connected");

        if let Err(err) = self.send_room_list(&id, out) {
            warn!(player = %id, error = %err, "could not send initial room list");
        }
        id
    }

    /// Removes the player entirely. Returns false when the id is already
    /// gone, in which case nothing is emitted.
    pub fn disconnect(&mut self, player_id: &str, out: &mut Outbox) -> Result<bool, DispatchError> {
        let Some(player) = self.players.get(player_id) else {
            return Ok(false);
        };
        let was_in_room = player.room.is_some();
        self.remove_from_room(player_id, out);
        self.players.remove(player_id);
        info!(player = %player_id, online = self.players.len(), "player disconnected");

        if was_in_room {
            self.broadcast_room_list(out)?;
        }
        Ok(true)
    }

    pub fn create_room(
        &mut self,
        player_id: &str,
        game_type: &str,
        room_name: &str,
        out: &mut Outbox,
    ) -> Result<RoomId, DispatchError> {
        self.leave_before_switching(player_id, out)?;

        let room_id = new_id();
        self.next_room_seq += 1;
        let room = Room::new(
            room_id.clone(),
            room_name.to_string(),
            game_type.to_string(),
            player_id.to_string(),
            self.next_room_seq,
        );
        info!(
            player = %player_id,
            room = %room_id,
            game = %game_type,
            "room created ({}/{})",
            room.len(),
            room.max_players
        );
        self.rooms.insert(room_id.clone(), room);

        let player = self
            .players
            .get_mut(player_id)
            .ok_or(DispatchError::UnknownPlayer)?;
        player.room = Some(room_id.clone());
        out.push(
            &player.link,
            Envelope::new(MessageType::RoomCreated)
                .with_room(&room_id)
                .with_game_type(game_type),
        );

        self.broadcast_room_list(out)?;
        Ok(room_id)
    }

    pub fn join_room(&mut self, player_id: &str, room_id: &str, out: &mut Outbox) -> Result<usize, DispatchError> {
        self.leave_before_switching(player_id, out)?;

        let room = self.rooms.get_mut(room_id).ok_or(DispatchError::RoomNotFound)?;
        let seat = room.admit(player_id.to_string())?;
        if let Some(player) = self.players.get_mut(player_id) {
            player.room = Some(room_id.to_string());
        }
        info!(
            player = %player_id,
            room = %room_id,
            seat,
            "player joined ({}/{})",
            room.len(),
            room.max_players
        );

        let joined = Envelope::new(MessageType::PlayerJoined)
            .with_player(player_id)
            .with_room(room_id);
        for member in &room.roster {
            if let Some(p) = self.players.get(member) {
                out.push(&p.link, joined.clone());
            }
        }

        self.broadcast_room_list(out)?;
        Ok(seat)
    }

    pub fn leave_room(&mut self, player_id: &str, out: &mut Outbox) -> Result<(), DispatchError> {
        let player = self.players.get(player_id).ok_or(DispatchError::UnknownPlayer)?;
        if player.room.is_none() {
            return Err(DispatchError::NotInRoom);
        }
        self.remove_from_room(player_id, out);
        self.broadcast_room_list(out)
    }

    pub fn start_game(&mut self, player_id: &str, out: &mut Outbox) -> Result<(), DispatchError> {
        let room_id = self
            .players
            .get(player_id)
            .and_then(|p| p.room.clone())
            .ok_or(DispatchError::NotInRoom)?;
        let room = self.rooms.get_mut(&room_id).ok_or(DispatchError::NotInRoom)?;
        room.check_can_start()?;
        room.started = true;
        info!(room = %room_id, players = room.len(), game = %room.game_type, "game starting");

        let players: Vec<_> = room
            .roster
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(Player::info)
            .collect();
        for (seat, member) in room.roster.iter().enumerate() {
            let Some(p) = self.players.get(member) else {
                continue;
            };
            let start = StartGameData {
                player_number: seat,
                total_players: players.len(),
                players: players.clone(),
            };
            let envelope = Envelope::new(MessageType::StartGame)
                .with_room(&room_id)
                .with_game_type(&room.game_type)
                .with_data(&start)?;
            out.push(&p.link, envelope);
        }

        self.broadcast_room_list(out)
    }

    /// Forwards a move to every other member of the sender's room without
    /// looking at its payload. Returns how many members it was queued for.
    pub fn relay_move(&self, player_id: &str, envelope: Envelope, out: &mut Outbox) -> Result<usize, DispatchError> {
        let room = self.current_room(player_id)?;
        let mut relayed = 0;
        for member in room.roster.iter().filter(|m| m.as_str() != player_id) {
            if let Some(p) = self.players.get(member) {
                out.push(&p.link, envelope.clone());
                relayed += 1;
            }
        }
        debug!(player = %player_id, room = %room.id, relayed, "move relayed");
        Ok(relayed)
    }

    /// Room chat; unlike moves, the sender gets its own line back.
    pub fn chat(&self, player_id: &str, envelope: Envelope, out: &mut Outbox) -> Result<(), DispatchError> {
        let data: ChatData = envelope
            .decode_data()
            .map_err(|_| DispatchError::InvalidPayload("Invalid chat data"))?;
        if data.message.trim().is_empty() {
            return Err(DispatchError::InvalidPayload("Invalid chat data"));
        }
        let room = self.current_room(player_id)?;
        self.push_to_room(room, &envelope, out);
        Ok(())
    }

    pub fn set_avatar(&mut self, player_id: &str, avatar: i32, out: &mut Outbox) -> Result<(), DispatchError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(DispatchError::UnknownPlayer)?;
        player.set_avatar(avatar);
        debug!(player = %player_id, avatar, name = %player.name, "avatar updated");

        let update = PlayerUpdateData {
            player_id: player.id.clone(),
            avatar: player.avatar,
            name: player.name.clone(),
        };
        let Some(room) = player.room.as_ref().and_then(|id| self.rooms.get(id)) else {
            return Ok(());
        };
        let envelope = Envelope::new(MessageType::PlayerUpdate)
            .with_player(player_id)
            .with_room(&room.id)
            .with_data(&update)?;
        self.push_to_room(room, &envelope, out);
        Ok(())
    }

    pub fn send_error(&self, player_id: &str, err: &DispatchError, out: &mut Outbox) {
        if let Some(p) = self.players.get(player_id) {
            out.push(&p.link, Envelope::error(err.to_string()));
        }
    }

    pub fn broadcast_room_list(&self, out: &mut Outbox) -> Result<(), DispatchError> {
        let envelope = Envelope::new(MessageType::RoomList).with_data(&self.room_list())?;
        for p in self.players.values() {
            out.push(&p.link, envelope.clone());
        }
        Ok(())
    }

    fn send_room_list(&self, player_id: &str, out: &mut Outbox) -> Result<(), DispatchError> {
        let envelope = Envelope::new(MessageType::RoomList).with_data(&self.room_list())?;
        if let Some(p) = self.players.get(player_id) {
            out.push(&p.link, envelope);
        }
        Ok(())
    }

    fn current_room(&self, player_id: &str) -> Result<&Room, DispatchError> {
        self.players
            .get(player_id)
            .and_then(|p| p.room.as_ref())
            .and_then(|id| self.rooms.get(id))
            .ok_or(DispatchError::NotInRoom)
    }

    fn push_to_room(&self, room: &Room, envelope: &Envelope, out: &mut Outbox) {
        for member in &room.roster {
            if let Some(p) = self.players.get(member) {
                out.push(&p.link, envelope.clone());
            }
        }
    }

    /// Implicit leave ahead of create/join, so a player is never recorded
    /// in two rooms.
    fn leave_before_switching(&mut self, player_id: &str, out: &mut Outbox) -> Result<(), DispatchError> {
        let player = self.players.get(player_id).ok_or(DispatchError::UnknownPlayer)?;
        if let Some(old) = player.room.clone() {
            info!(player = %player_id, room = %old, "leaving previous room");
            self.remove_from_room(player_id, out);
            self.broadcast_room_list(out)?;
        }
        Ok(())
    }

    /// The single departure path. Deletes an emptied room; a started room
    /// is force-ended for everyone left in it.
    fn remove_from_room(&mut self, player_id: &str, out: &mut Outbox) {
        let Some(room_id) = self.players.get_mut(player_id).and_then(|p| p.room.take()) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.remove(player_id);
        debug!(player = %player_id, room = %room_id, remaining = room.len(), "removed from room");

        let was_started = room.started;
        if room.started && !room.meets_minimum() {
            room.started = false;
        }

        if room.is_empty() {
            self.rooms.remove(&room_id);
            info!(room = %room_id, "room deleted (empty)");
            return;
        }

        if was_started {
            let ended = Envelope::new(MessageType::GameEnded)
                .with_player(player_id)
                .with_room(&room_id);
            let remaining = std::mem::take(&mut room.roster);
            self.rooms.remove(&room_id);
            for member in remaining {
                if let Some(p) = self.players.get_mut(&member) {
                    p.room = None;
                    out.push(&p.link, ended.clone());
                }
            }
            info!(room = %room_id, left = %player_id, "game ended, room deleted");
        } else {
            let left = Envelope::new(MessageType::PlayerLeft)
                .with_player(player_id)
                .with_room(&room_id);
            for member in &room.roster {
                if let Some(p) = self.players.get(member) {
                    out.push(&p.link, left.clone());
                }
            }
        }
    }
}
