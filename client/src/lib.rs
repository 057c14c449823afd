//! Client side of the game room: one `NetworkSession` per server
//! connection, plus the `NetworkedGame` adapter game modules use once a
//! room has started.

pub mod config;
pub mod error;
pub mod game;
pub mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use game::{NetworkedGame, OpponentMove};
pub use session::{Handler, NetworkSession};
