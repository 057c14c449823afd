/// Failures of a single client request. The Display text is what the
/// requester sees in the `error` envelope's `{"error": ...}` payload.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Need {} {} to start", quantifier(.exact), players(.needed))]
    InsufficientPlayers { needed: usize, exact: bool },
    #[error("{0}")]
    InvalidPayload(&'static str),
    #[error("Invalid message")]
    InvalidMessage,
    #[error("Unknown message type")]
    UnknownMessageType,
    #[error("Unknown player")]
    UnknownPlayer,
    #[error("Internal server error")]
    Encode(#[from] serde_json::Error),
}

fn quantifier(exact: &bool) -> &'static str {
    if *exact {
        "exactly"
    } else {
        "at least"
    }
}

fn players(needed: &usize) -> String {
    if *needed == 1 {
        "1 player".to_string()
    } else {
        format!("{needed} players")
    }
}
