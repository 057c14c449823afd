use std::sync::Arc;

use gameroom_protocol::{Envelope, MessageType, PlayerInfo, ProtocolError, StartGameData};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::session::{Handler, NetworkSession};

/// A move received from another seat.
#[derive(Debug, Clone, PartialEq)]
pub struct OpponentMove<M> {
    pub player_id: Option<String>,
    /// Seat of the sender, when it is on the roster.
    pub seat: Option<usize>,
    pub mv: M,
}

/// Glue between a running game and the session. The game decides what a
/// move looks like; this only knows seats and turn order.
///
/// Creating one takes over the session's `game_move` handler; dropping it
/// gives the handler back unless something newer has replaced it.
pub struct NetworkedGame<M> {
    session: NetworkSession,
    start: StartGameData,
    moves: mpsc::UnboundedReceiver<OpponentMove<M>>,
    handler: Handler,
}

impl<M> NetworkedGame<M>
where
    M: DeserializeOwned + Send + 'static,
{
    pub fn new(session: NetworkSession, start: StartGameData) -> Self {
        let (tx, moves) = mpsc::unbounded_channel();
        let roster: Vec<String> = start.players.iter().map(|p| p.id.clone()).collect();
        let handler: Handler = Arc::new(move |envelope: &Envelope| {
            let mv = match envelope.decode_data::<M>() {
                Ok(mv) => mv,
                Err(err) => {
                    warn!(from = ?envelope.player_id, error = %err, "dropping unreadable move");
                    return;
                }
            };
            let seat = envelope
                .player_id
                .as_ref()
                .and_then(|id| roster.iter().position(|p| p == id));
            let delivered = tx.send(OpponentMove {
                player_id: envelope.player_id.clone(),
                seat,
                mv,
            });
            if delivered.is_err() {
                debug!(from = ?envelope.player_id, "move arrived after the game was dropped");
            }
        });
        session.install_handler(MessageType::GameMove, handler.clone());
        debug!(seat = start.player_number, total = start.total_players, "networked game attached");
        Self {
            session,
            start,
            moves,
            handler,
        }
    }

    /// Builds from the `start_game` envelope the server sent this seat.
    pub fn from_envelope(session: NetworkSession, envelope: &Envelope) -> Result<Self, ProtocolError> {
        Ok(Self::new(session, envelope.decode_data()?))
    }

    pub fn seat(&self) -> usize {
        self.start.player_number
    }

    pub fn total_players(&self) -> usize {
        self.start.total_players
    }

    pub fn players(&self) -> &[PlayerInfo] {
        &self.start.players
    }

    pub fn is_my_turn(&self, turn: usize) -> bool {
        self.start.is_my_turn(turn)
    }

    pub fn send_move<T: Serialize>(&self, mv: &T) -> Result<(), ClientError> {
        self.session.send_move(mv)
    }

    /// Non-blocking; for frame loops.
    pub fn try_next_move(&mut self) -> Option<OpponentMove<M>> {
        self.moves.try_recv().ok()
    }

    pub async fn next_move(&mut self) -> Option<OpponentMove<M>> {
        self.moves.recv().await
    }

    pub fn session(&self) -> &NetworkSession {
        &self.session
    }
}

impl<M> Drop for NetworkedGame<M> {
    fn drop(&mut self) {
        if self.session.release_handler(MessageType::GameMove, &self.handler) {
            debug!(seat = self.start.player_number, "networked game detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Drop4 {
        column: u8,
    }

    fn roster() -> Vec<PlayerInfo> {
        ["p0", "p1", "p2"]
            .iter()
            .map(|id| PlayerInfo { id: id.to_string(), name: "Human".into(), avatar: 0 })
            .collect()
    }

    #[test]
    fn turn_ownership_wraps_around_the_table() {
        let (session, _rx) = NetworkSession::detached();
        let start = StartGameData { player_number: 1, total_players: 3, players: roster() };
        let game: NetworkedGame<Drop4> = NetworkedGame::new(session, start);
        assert_eq!(game.seat(), 1);
        assert_eq!(game.players().len(), 3);
        assert!(!game.is_my_turn(0));
        assert!(game.is_my_turn(1));
        assert!(game.is_my_turn(4));
        assert!(!game.is_my_turn(5));
    }

    #[test]
    fn incoming_moves_are_decoded_with_their_seat() {
        let (session, _rx) = NetworkSession::detached();
        let start = StartGameData { player_number: 0, total_players: 3, players: roster() };
        let mut game: NetworkedGame<Drop4> = NetworkedGame::new(session.clone(), start);

        session.deliver(
            Envelope::new(MessageType::GameMove)
                .with_player("p2")
                .with_data(&Drop4 { column: 5 })
                .unwrap(),
        );
        session.deliver(
            Envelope::new(MessageType::GameMove)
                .with_player("p1")
                .with_data(&serde_json::json!({"row": 1}))
                .unwrap(),
        );

        let got = game.try_next_move().unwrap();
        assert_eq!(got.seat, Some(2));
        assert_eq!(got.player_id.as_deref(), Some("p2"));
        assert_eq!(got.mv, Drop4 { column: 5 });
        assert!(game.try_next_move().is_none());
    }

    #[test]
    fn dropping_the_game_releases_the_move_handler() {
        let (session, _rx) = NetworkSession::detached();
        let start = || StartGameData { player_number: 0, total_players: 2, players: roster() };

        let game: NetworkedGame<Drop4> = NetworkedGame::new(session.clone(), start());
        drop(game);
        assert!(!session.unregister_handler(MessageType::GameMove));

        let old: NetworkedGame<Drop4> = NetworkedGame::new(session.clone(), start());
        let mut current: NetworkedGame<Drop4> = NetworkedGame::new(session.clone(), start());
        drop(old);
        session.deliver(
            Envelope::new(MessageType::GameMove)
                .with_player("p1")
                .with_data(&Drop4 { column: 2 })
                .unwrap(),
        );
        assert_eq!(current.try_next_move().unwrap().mv, Drop4 { column: 2 });
    }
}
