use gameroom_protocol::{max_players_for, players_needed_to_start, RoomInfo, TWO_SEAT_CAPACITY};

use crate::error::DispatchError;
use crate::player::PlayerId;

pub type RoomId = String;

/// A capacity-bounded group of players. Members are held by id only; the
/// registry owns the player records.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub game_type: String,
    /// arrival order == seat order
    pub roster: Vec<PlayerId>,
    pub max_players: usize,
    pub started: bool,
    pub(crate) created_seq: u64,
}

impl Room {
    pub fn new(id: RoomId, name: String, game_type: String, creator: PlayerId, created_seq: u64) -> Self {
        Self {
            id,
            name,
            max_players: max_players_for(&game_type),
            game_type,
            roster: vec![creator],
            started: false,
            created_seq,
        }
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.roster.len() >= self.max_players
    }

    pub fn seat_of(&self, player_id: &str) -> Option<usize> {
        self.roster.iter().position(|p| p == player_id)
    }

    /// Appends a player to the end of the roster and returns their seat.
    pub fn admit(&mut self, player_id: PlayerId) -> Result<usize, DispatchError> {
        if self.is_full() {
            return Err(DispatchError::RoomFull);
        }
        if self.started {
            return Err(DispatchError::GameAlreadyStarted);
        }
        self.roster.push(player_id);
        Ok(self.roster.len() - 1)
    }

    pub fn remove(&mut self, player_id: &str) -> bool {
        let before = self.roster.len();
        self.roster.retain(|p| p != player_id);
        self.roster.len() != before
    }

    pub fn meets_minimum(&self) -> bool {
        !self.roster.is_empty() && self.roster.len() >= players_needed_to_start(self.max_players)
    }

    pub fn check_can_start(&self) -> Result<(), DispatchError> {
        if self.max_players == TWO_SEAT_CAPACITY && self.roster.len() != TWO_SEAT_CAPACITY {
            return Err(DispatchError::InsufficientPlayers {
                needed: TWO_SEAT_CAPACITY,
                exact: true,
            });
        }
        if self.roster.is_empty() {
            return Err(DispatchError::InsufficientPlayers { needed: 1, exact: false });
        }
        Ok(())
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            game_type: self.game_type.clone(),
            players: self.roster.len(),
            max_players: self.max_players,
            started: self.started,
        }
    }
}
